// In-memory transport for tests.
// Replays queued replies and records every request it receives.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::Notify;

use super::executor::{HttpRequest, RawResponse, Transport};
use crate::error::{CampusPayError, Result};

enum Reply {
    Response(RawResponse),
    Offline,
}

#[derive(Default)]
struct Inner {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<HttpRequest>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_json(&self, status: u16, body: Value) {
        let body = serde_json::to_vec(&body).unwrap();
        self.push(Reply::Response(RawResponse { status, body }));
    }

    pub fn reply_raw(&self, status: u16, body: &[u8]) {
        self.push(Reply::Response(RawResponse {
            status,
            body: body.to_vec(),
        }));
    }

    pub fn reply_offline(&self) {
        self.push(Reply::Offline);
    }

    /// Hold every request in flight until the returned handle is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.inner.gate.lock().unwrap() = Some(Arc::clone(&notify));
        notify
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.inner.requests.lock().unwrap().clone()
    }

    fn push(&self, reply: Reply) {
        self.inner.replies.lock().unwrap().push_back(reply);
    }
}

impl MockTransport {
    async fn respond(&self, request: HttpRequest) -> Result<RawResponse> {
        let url = request.url.clone();
        self.inner.requests.lock().unwrap().push(request);

        let gate = self.inner.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let reply = self.inner.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::Offline) => Err(CampusPayError::Transport {
                url,
                message: "network unreachable".to_string(),
            }),
            None => Err(CampusPayError::Transport {
                url,
                message: "no reply queued".to_string(),
            }),
        }
    }
}

impl Transport for MockTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<RawResponse>> {
        self.respond(request).boxed()
    }
}
