// Resource record types.
// Fetch status, last-known-good payload and the last error of one resource.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{CampusPayError, ErrorKind};

/// Lifecycle of a resource fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStatus {
    #[default]
    Idle,
    Fetching,
    Fetched,
    Errored,
}

impl FetchStatus {
    pub fn display(&self) -> &'static str {
        match self {
            FetchStatus::Idle => "idle",
            FetchStatus::Fetching => "fetching",
            FetchStatus::Fetched => "fetched",
            FetchStatus::Errored => "errored",
        }
    }
}

/// Snapshot of a failed fetch, kept on the record.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceError {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl From<&CampusPayError> for ResourceError {
    fn from(err: &CampusPayError) -> Self {
        Self {
            kind: err.kind(),
            status: err.status(),
            message: err.to_string(),
        }
    }
}

/// State of one named resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceRecord {
    pub status: FetchStatus,
    /// Payload of the last successful fetch.
    pub data: Option<Value>,
    pub error: Option<ResourceError>,
    /// When `data` was last replaced.
    pub fetched_at: Option<DateTime<Utc>>,
}

impl ResourceRecord {
    pub fn is_fetching(&self) -> bool {
        self.status == FetchStatus::Fetching
    }

    pub fn is_fetched(&self) -> bool {
        self.status == FetchStatus::Fetched
    }

    pub fn is_errored(&self) -> bool {
        self.status == FetchStatus::Errored
    }

    /// Enter `fetching`. Returns false (and changes nothing) if already fetching.
    pub(crate) fn begin(&mut self) -> bool {
        if self.is_fetching() {
            return false;
        }
        self.status = FetchStatus::Fetching;
        true
    }

    pub(crate) fn succeed(&mut self, payload: Value) {
        self.status = FetchStatus::Fetched;
        self.data = Some(payload);
        self.error = None;
        self.fetched_at = Some(Utc::now());
    }

    /// Enter `errored`, keeping the last-known-good payload.
    pub(crate) fn fail(&mut self, error: ResourceError) {
        self.status = FetchStatus::Errored;
        self.error = Some(error);
    }

    /// Leave `fetching` for a fetch that was abandoned before it settled.
    ///
    /// Returns false if the record was not fetching.
    pub(crate) fn abandon(&mut self) -> bool {
        if !self.is_fetching() {
            return false;
        }
        self.fail(ResourceError {
            kind: ErrorKind::Other,
            status: None,
            message: "fetch cancelled".to_string(),
        });
        true
    }
}
