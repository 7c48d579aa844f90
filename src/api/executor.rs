// Request executor.
// Performs one HTTP call, enforces the valid-status policy and decodes the body.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::{Client, Method, Url};
use serde_json::Value;
use tracing::debug;

use crate::config::HttpConfig;
use crate::error::{CampusPayError, Result};

/// JSON header preset attached to every service call.
pub const HEADERS_JSON: [(&str, &str); 2] = [
    ("Accept", "application/json"),
    ("Content-Type", "application/json"),
];

/// Status codes treated as success when a call does not override them.
pub const VALID_STATUS: [u16; 4] = [200, 201, 202, 204];

/// Set of HTTP statuses a call treats as domain success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidStatus {
    /// Any 2xx status.
    Success,
    /// Exactly these codes.
    Codes(Vec<u16>),
}

impl Default for ValidStatus {
    fn default() -> Self {
        ValidStatus::Codes(VALID_STATUS.to_vec())
    }
}

impl ValidStatus {
    pub fn codes(codes: &[u16]) -> Self {
        ValidStatus::Codes(codes.to_vec())
    }

    pub fn accepts(&self, status: u16) -> bool {
        match self {
            ValidStatus::Success => (200..300).contains(&status),
            ValidStatus::Codes(codes) => codes.contains(&status),
        }
    }
}

/// How the response body is turned into a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Json,
    /// Keep the body as raw text (static assets).
    Text,
}

/// Whether stored credentials may be attached to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialsPolicy {
    Omit,
    #[default]
    SameOrigin,
}

/// A header-based credential scoped to one origin.
#[derive(Debug, Clone)]
pub struct Credential {
    pub origin: String,
    pub header: String,
    pub value: String,
}

impl Credential {
    pub fn new(base_url: &str, header: &str, value: &str) -> Result<Self> {
        Ok(Self {
            origin: origin_of(base_url)?,
            header: header.to_string(),
            value: value.to_string(),
        })
    }
}

/// Options bag for one executed request.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub credentials: CredentialsPolicy,
    pub valid_status: ValidStatus,
    pub format: ResponseFormat,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HEADERS_JSON
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            body: None,
            credentials: CredentialsPolicy::default(),
            valid_status: ValidStatus::default(),
            format: ResponseFormat::default(),
        }
    }
}

/// Fully assembled request handed to a transport.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Status and body of a received response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Sends requests over the wire. Any error means no response was obtained.
pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<RawResponse>>;
}

/// Transport backed by a shared reqwest client.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| CampusPayError::Config(e.to_string()))?;

        Ok(Self { client })
    }

    async fn send_request(&self, request: HttpRequest) -> Result<RawResponse> {
        let url = request.url.clone();
        let to_transport = |e: reqwest::Error| CampusPayError::Transport {
            url: url.clone(),
            message: e.to_string(),
        };

        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        let response = builder.send().await.map_err(to_transport)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(to_transport)?;

        Ok(RawResponse {
            status,
            body: body.to_vec(),
        })
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<RawResponse>> {
        self.send_request(request).boxed()
    }
}

/// Executes requests through a transport and normalizes the outcome.
#[derive(Clone)]
pub struct Executor {
    transport: Arc<dyn Transport>,
    credentials: Vec<Credential>,
}

impl Executor {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
            credentials: Vec::new(),
        }
    }

    /// Create an executor over a real HTTP client.
    pub fn reqwest(config: &HttpConfig) -> Result<Self> {
        Ok(Self::new(ReqwestTransport::new(config)?))
    }

    /// Add an origin-scoped credential.
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credentials.push(credential);
        self
    }

    /// Perform one request and decode its payload.
    ///
    /// Statuses outside `options.valid_status` reject with `HttpStatus`, carrying the
    /// body when it parses as JSON. Undecodable bodies reject with `Decode`.
    pub async fn execute(&self, url: &str, options: RequestOptions) -> Result<Value> {
        let mut headers = options.headers;
        if options.credentials == CredentialsPolicy::SameOrigin && !self.credentials.is_empty() {
            let origin = origin_of(url)?;
            for credential in self.credentials.iter().filter(|c| c.origin == origin) {
                headers.push((credential.header.clone(), credential.value.clone()));
            }
        }

        let request = HttpRequest {
            method: options.method.clone(),
            url: url.to_string(),
            headers,
            body: options.body,
        };

        debug!(method = %options.method, %url, "sending request");
        let response = self.transport.send(request).await?;
        debug!(%url, status = response.status, "received response");

        if !options.valid_status.accepts(response.status) {
            return Err(CampusPayError::HttpStatus {
                status: response.status,
                url: url.to_string(),
                body: serde_json::from_slice(&response.body).ok(),
            });
        }

        decode_body(url, &response.body, options.format)
    }
}

fn decode_body(url: &str, body: &[u8], format: ResponseFormat) -> Result<Value> {
    let decode_error = |message: String| CampusPayError::Decode {
        url: url.to_string(),
        message,
    };

    match format {
        ResponseFormat::Json if body.iter().all(u8::is_ascii_whitespace) => Ok(Value::Null),
        ResponseFormat::Json => {
            serde_json::from_slice(body).map_err(|e| decode_error(e.to_string()))
        }
        ResponseFormat::Text => String::from_utf8(body.to_vec())
            .map(Value::String)
            .map_err(|e| decode_error(e.to_string())),
    }
}

/// Scheme, host and port of a URL.
pub fn origin_of(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| CampusPayError::InvalidUrl(format!("{url}: {e}")))?;
    Ok(parsed.origin().ascii_serialization())
}
