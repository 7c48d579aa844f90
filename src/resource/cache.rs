// Resource cache.
// Single owner of every resource record; transitions and read accessors.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::record::{FetchStatus, ResourceError, ResourceRecord};
use crate::error::{CampusPayError, Result};

/// State container keyed by resource name.
///
/// Names are registered up front. Readers treat unknown names as idle and empty;
/// mutators reject them with `UnknownResource`.
#[derive(Debug, Default)]
pub struct ResourceCache {
    records: RwLock<HashMap<String, ResourceRecord>>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource name. Registering twice keeps the existing record.
    pub fn register(&self, name: &str) {
        self.write().entry(name.to_string()).or_default();
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Enter `fetching`, keeping cached data.
    ///
    /// Returns `Ok(false)` without touching the record when a fetch is already in
    /// flight; the caller must not issue another request.
    pub fn mark_fetching(&self, name: &str) -> Result<bool> {
        self.update(name, |record| {
            let started = record.begin();
            if !started {
                debug!(resource = name, "fetch already in flight");
            }
            started
        })
    }

    pub fn mark_fetched(&self, name: &str, payload: Value) -> Result<()> {
        self.update(name, |record| record.succeed(payload))
    }

    /// Enter `errored`, keeping the last-known-good data.
    pub fn mark_errored(&self, name: &str, error: &CampusPayError) -> Result<()> {
        warn!(resource = name, error = %error, "fetch failed");
        let snapshot = ResourceError::from(error);
        self.update(name, |record| record.fail(snapshot))
    }

    /// Move a fetch that will never settle out of `fetching`, keeping cached data.
    ///
    /// No-op when the resource is not fetching.
    pub fn abandon_fetch(&self, name: &str) {
        match self.update(name, ResourceRecord::abandon) {
            Ok(true) => warn!(resource = name, "fetch abandoned before completion"),
            Ok(false) => {}
            Err(e) => warn!(resource = name, error = %e, "cannot abandon fetch"),
        }
    }

    /// Cached data decoded as `T`, or `default` if never fetched (or not a `T`).
    pub fn get_data<T: DeserializeOwned>(&self, name: &str, default: T) -> T {
        let Some(data) = self.data(name) else {
            return default;
        };
        match serde_json::from_value(data) {
            Ok(value) => value,
            Err(e) => {
                warn!(resource = name, error = %e, "cached data has unexpected shape");
                default
            }
        }
    }

    /// Raw cached payload.
    pub fn data(&self, name: &str) -> Option<Value> {
        self.read().get(name).and_then(|record| record.data.clone())
    }

    pub fn status(&self, name: &str) -> FetchStatus {
        self.read()
            .get(name)
            .map(|record| record.status)
            .unwrap_or_default()
    }

    pub fn is_fetching(&self, name: &str) -> bool {
        self.status(name) == FetchStatus::Fetching
    }

    pub fn is_fetched(&self, name: &str) -> bool {
        self.status(name) == FetchStatus::Fetched
    }

    pub fn error(&self, name: &str) -> Option<ResourceError> {
        self.read().get(name).and_then(|record| record.error.clone())
    }

    /// Copy of the whole record (idle default for unknown names).
    pub fn snapshot(&self, name: &str) -> ResourceRecord {
        self.read().get(name).cloned().unwrap_or_default()
    }

    fn update<R>(&self, name: &str, f: impl FnOnce(&mut ResourceRecord) -> R) -> Result<R> {
        let mut records = self.write();
        let record = records
            .get_mut(name)
            .ok_or_else(|| CampusPayError::UnknownResource(name.to_string()))?;
        Ok(f(record))
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ResourceRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ResourceRecord>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}
