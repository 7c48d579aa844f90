// Service base shared by every backend.
// Owns URL assembly, the method preset and status policy; delegates to the executor.

use std::sync::Arc;

use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::executor::{CredentialsPolicy, Executor, RequestOptions, ResponseFormat, ValidStatus};
use crate::dispatch::DispatchTable;
use crate::error::{CampusPayError, Result};

/// A backend family exposing named operations.
pub trait Service: Send + Sync + 'static {
    /// Tag identifying the backend family (e.g. "github").
    const TYPE: &'static str;

    fn base(&self) -> &ServiceBase;

    /// Build the dispatch table of this service's operations.
    fn operations(self: Arc<Self>) -> DispatchTable;
}

/// Per-call overrides of the service defaults.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Treat the path as a full URL, bypassing the base URL.
    pub use_absolute_url: bool,
    pub method: Option<Method>,
    pub format: ResponseFormat,
    pub valid_status: Option<ValidStatus>,
    pub credentials: CredentialsPolicy,
}

/// Endpoint-building base that concrete services wrap.
#[derive(Clone)]
pub struct ServiceBase {
    type_tag: &'static str,
    base_url: String,
    method: Method,
    valid_status: ValidStatus,
    default_query: Vec<(String, String)>,
    executor: Executor,
}

impl ServiceBase {
    pub fn new(type_tag: &'static str, base_url: impl Into<String>, executor: Executor) -> Self {
        Self {
            type_tag,
            base_url: base_url.into(),
            method: Method::GET,
            valid_status: ValidStatus::default(),
            default_query: Vec::new(),
            executor,
        }
    }

    /// Use POST (JSON body) instead of GET (query string) for calls.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Query pairs appended to every relative call.
    pub fn with_default_query(mut self, key: &str, value: &str) -> Self {
        self.default_query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for a service-relative path.
    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    pub async fn call(&self, path: &str, params: Option<Value>) -> Result<Value> {
        self.call_with(path, params, CallOptions::default()).await
    }

    pub async fn call_with(
        &self,
        path: &str,
        params: Option<Value>,
        options: CallOptions,
    ) -> Result<Value> {
        let raw_url = if options.use_absolute_url {
            path.to_string()
        } else {
            self.url(path)
        };
        let mut url = Url::parse(&raw_url)
            .map_err(|e| CampusPayError::InvalidUrl(format!("{raw_url}: {e}")))?;

        if !options.use_absolute_url && !self.default_query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.default_query);
        }

        let method = options.method.unwrap_or_else(|| self.method.clone());
        debug!(service = self.type_tag, path, %method, "service call");
        let body = if method == Method::GET {
            if let Some(params) = params {
                append_query(&mut url, path, &params)?;
            }
            None
        } else {
            params
        };

        let request = RequestOptions {
            method,
            body,
            credentials: options.credentials,
            valid_status: options
                .valid_status
                .unwrap_or_else(|| self.valid_status.clone()),
            format: options.format,
            ..RequestOptions::default()
        };

        self.executor.execute(url.as_str(), request).await
    }

    /// Call and decode the payload into `T`.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        path: &str,
        params: Option<Value>,
    ) -> Result<T> {
        let payload = self.call(path, params).await?;
        decode_payload(&self.url(path), payload)
    }
}

/// Decode a JSON payload into a typed value, reporting mismatches as decode errors.
pub fn decode_payload<T: DeserializeOwned>(url: &str, payload: Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| CampusPayError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

/// Join a base URL and a relative path with exactly one slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn append_query(url: &mut Url, path: &str, params: &Value) -> Result<()> {
    let Value::Object(map) = params else {
        return Err(CampusPayError::InvalidArgument {
            method: path.to_string(),
            message: "query parameters must be a JSON object".to_string(),
        });
    };
    if map.values().all(Value::is_null) {
        return Ok(());
    }

    let mut pairs = url.query_pairs_mut();
    for (key, value) in map {
        match value {
            Value::Null => {}
            Value::String(s) => {
                pairs.append_pair(key, s);
            }
            other => {
                pairs.append_pair(key, &other.to_string());
            }
        }
    }
    Ok(())
}
