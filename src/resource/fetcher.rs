// Resource fetcher.
// Binds resource names to operations and drives the fetching -> fetched|errored cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use super::cache::ResourceCache;
use crate::dispatch::{BoundCall, ServiceRegistry};
use crate::error::{CampusPayError, Result};

/// Retry behaviour for transport failures. Other errors are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    pub fn transport(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

/// Result of a refresh request.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched(Value),
    /// Another fetch for the same resource was already in flight.
    Skipped,
}

/// Refreshes cached resources through their bound operations.
pub struct ResourceFetcher {
    cache: Arc<ResourceCache>,
    services: Arc<ServiceRegistry>,
    bindings: HashMap<String, BoundCall>,
    retry: RetryPolicy,
}

impl ResourceFetcher {
    pub fn new(cache: Arc<ResourceCache>, services: Arc<ServiceRegistry>) -> Self {
        Self {
            cache,
            services,
            bindings: HashMap::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    /// Bind a resource to a service operation token and register it in the cache.
    ///
    /// Fails immediately with a lookup error if the operation does not exist.
    pub fn bind(&mut self, resource: &str, service: &str, token: &str) -> Result<()> {
        let call = self.services.resolve(service, token)?;
        self.cache.register(resource);
        self.bindings.insert(resource.to_string(), call);
        Ok(())
    }

    /// Bound resource names, sorted.
    pub fn resources(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Fetch a resource unless a fetch is already in flight.
    ///
    /// Failures are recorded on the resource (keeping earlier data) and also returned.
    pub async fn refresh(&self, resource: &str, args: Vec<Value>) -> Result<FetchOutcome> {
        let call = self
            .bindings
            .get(resource)
            .ok_or_else(|| CampusPayError::UnknownResource(resource.to_string()))?;

        if !self.cache.mark_fetching(resource)? {
            debug!(resource, "refresh skipped");
            return Ok(FetchOutcome::Skipped);
        }
        let in_flight = InFlight::new(&self.cache, resource);

        let result = self.call_with_retry(resource, call, args).await;
        in_flight.settle();
        match result {
            Ok(payload) => {
                debug!(resource, "refresh complete");
                self.cache.mark_fetched(resource, payload.clone())?;
                Ok(FetchOutcome::Fetched(payload))
            }
            Err(err) => {
                self.cache.mark_errored(resource, &err)?;
                Err(err)
            }
        }
    }

    /// Refresh several resources concurrently.
    pub async fn refresh_many(&self, resources: &[&str]) -> Vec<(String, Result<FetchOutcome>)> {
        let refreshes = resources
            .iter()
            .map(|resource| async move {
                let result = self.refresh(resource, Vec::new()).await;
                (resource.to_string(), result)
            });
        join_all(refreshes).await
    }

    async fn call_with_retry(
        &self,
        resource: &str,
        call: &BoundCall,
        args: Vec<Value>,
    ) -> Result<Value> {
        let mut attempt = 1;
        loop {
            match call.call(args.clone()).await {
                Err(err) if err.is_transport() && attempt < self.retry.max_attempts => {
                    warn!(resource, attempt, error = %err, "transport error, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.retry.delay).await;
                }
                result => return result,
            }
        }
    }
}

/// Marks a started fetch as abandoned if dropped before it settles.
///
/// Covers refresh futures that are cancelled (timeouts, `select!`, aborted tasks)
/// and handlers that panic.
struct InFlight<'a> {
    cache: &'a ResourceCache,
    resource: &'a str,
    settled: bool,
}

impl<'a> InFlight<'a> {
    fn new(cache: &'a ResourceCache, resource: &'a str) -> Self {
        Self {
            cache,
            resource,
            settled: false,
        }
    }

    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.cache.abandon_fetch(self.resource);
        }
    }
}
