// App wiring.
// Builds the executor, services, dispatch registry, resource cache and fetcher.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::{Credential, Executor, GitHub, PayUtc, Release, Service};
use crate::config::Config;
use crate::dispatch::ServiceRegistry;
use crate::error::{CampusPayError, Result};
use crate::resource::{FetchOutcome, ResourceCache, ResourceFetcher};

pub const WALLET_DETAILS: &str = "walletDetails";
pub const HISTORY: &str = "history";
pub const LOCK_STATUS: &str = "lockStatus";
pub const LATEST_RELEASE: &str = "latestRelease";
pub const CONTRIBUTORS: &str = "contributors";

/// Header carrying the wallet session.
const SESSION_HEADER: &str = "Authorization";

/// Resource name, service type and operation token of every cached resource.
const BINDINGS: [(&str, &str, &str); 5] = [
    (WALLET_DETAILS, PayUtc::TYPE, "getWalletDetails"),
    (HISTORY, PayUtc::TYPE, "getHistory"),
    (LOCK_STATUS, PayUtc::TYPE, "getLockStatus"),
    (LATEST_RELEASE, GitHub::TYPE, "getLatestRelease"),
    (CONTRIBUTORS, GitHub::TYPE, "getContributors"),
];

/// Application core shared by every screen.
pub struct App {
    pub github: Arc<GitHub>,
    pub payutc: Arc<PayUtc>,
    services: Arc<ServiceRegistry>,
    fetcher: ResourceFetcher,
}

impl App {
    /// Build the app over a real HTTP client.
    pub fn new(config: &Config) -> Result<Self> {
        let mut executor = Executor::reqwest(&config.http)?;
        if let Some(token) = Config::session_token() {
            debug!("attaching wallet session");
            executor = executor.with_credential(Credential::new(
                &config.payutc.api_url,
                SESSION_HEADER,
                &format!("Bearer {}", token),
            )?);
        }
        Self::with_executor(config, executor)
    }

    pub fn with_executor(config: &Config, executor: Executor) -> Result<Self> {
        let github = Arc::new(GitHub::new(&config.github, executor.clone()));
        let payutc = Arc::new(PayUtc::new(&config.payutc, executor));

        let mut registry = ServiceRegistry::new();
        registry.register(Arc::clone(&github));
        registry.register(Arc::clone(&payutc));
        let services = Arc::new(registry);

        let cache = Arc::new(ResourceCache::new());
        let mut fetcher = ResourceFetcher::new(cache, Arc::clone(&services));
        for (resource, service, token) in BINDINGS {
            fetcher.bind(resource, service, token)?;
        }

        Ok(Self {
            github,
            payutc,
            services,
            fetcher,
        })
    }

    pub fn cache(&self) -> &ResourceCache {
        self.fetcher.cache()
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn fetcher(&self) -> &ResourceFetcher {
        &self.fetcher
    }

    /// Invoke any registered operation by service type and token, bypassing the cache.
    pub async fn call(&self, service: &str, token: &str, args: Vec<Value>) -> Result<Value> {
        self.services.invoke(service, token, args).await
    }

    pub async fn refresh(&self, resource: &str) -> Result<FetchOutcome> {
        self.fetcher.refresh(resource, Vec::new()).await
    }

    /// Refresh the wallet screen's resources; ones already in flight are skipped.
    pub async fn refresh_home(&self) -> Vec<(String, Result<FetchOutcome>)> {
        self.fetcher.refresh_many(&[WALLET_DETAILS, HISTORY]).await
    }

    /// Lock or unlock the wallet, then refresh the cached lock status.
    ///
    /// Refuses while the lock status is being fetched. A failed follow-up refresh
    /// is recorded on the lock status resource; the toggle itself still succeeded.
    pub async fn set_lock(&self, locked: bool) -> Result<bool> {
        if self.cache().is_fetching(LOCK_STATUS) {
            return Err(CampusPayError::Busy(LOCK_STATUS.to_string()));
        }

        let status = self.payutc.set_lock_status(locked).await?;
        info!(locked = status, "lock status changed");

        if let Err(e) = self.refresh(LOCK_STATUS).await {
            warn!(error = %e, "lock status refresh failed after toggle");
        }
        Ok(status)
    }

    /// Refresh the latest release and return it when it differs from `app_version`.
    pub async fn check_for_update(&self, app_version: &str) -> Result<Option<Release>> {
        self.refresh(LATEST_RELEASE).await?;

        let Some(release) = self.cache().get_data::<Option<Release>>(LATEST_RELEASE, None) else {
            return Ok(None);
        };
        Ok(crate::api::github::update_available(&release, app_version).then_some(release))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockTransport;
    use crate::config::{GitHubConfig, PayUtcConfig};
    use crate::resource::FetchStatus;
    use serde_json::json;
    use std::time::Duration;

    fn config() -> Config {
        Config {
            github: GitHubConfig {
                api_url: "https://api.github.com/".to_string(),
                web_url: "https://github.com/".to_string(),
                repo: "campus/pay-app".to_string(),
                changelog_url: "https://raw.example.com/changelog/".to_string(),
            },
            payutc: PayUtcConfig {
                api_url: "https://pay.example.com/services/".to_string(),
                system_id: "campus".to_string(),
            },
            ..Config::default()
        }
    }

    fn app(mock: &MockTransport) -> App {
        App::with_executor(&config(), Executor::new(mock.clone())).unwrap()
    }

    #[test]
    fn test_bindings_registered() {
        let mock = MockTransport::new();
        let app = app(&mock);

        assert_eq!(
            app.cache().names(),
            vec!["contributors", "history", "latestRelease", "lockStatus", "walletDetails"]
        );
        assert_eq!(app.services().services().collect::<Vec<_>>(), vec!["github", "payutc"]);
        assert!(app.cache().names().iter().all(|n| app.cache().status(n) == FetchStatus::Idle));
    }

    #[tokio::test]
    async fn test_http_error_keeps_cached_wallet() {
        let mock = MockTransport::new();
        mock.reply_json(200, json!({"credit": 1000}));
        mock.reply_json(404, json!({"error": "gone"}));
        let app = app(&mock);

        app.refresh(WALLET_DETAILS).await.unwrap();
        let err = app.refresh(WALLET_DETAILS).await.unwrap_err();

        assert_eq!(err.status(), Some(404));
        assert_eq!(app.cache().status(WALLET_DETAILS), FetchStatus::Errored);
        assert_eq!(app.cache().get_data(WALLET_DETAILS, json!({})), json!({"credit": 1000}));
    }

    #[tokio::test]
    async fn test_overlapping_refreshes_issue_one_request() {
        let mock = MockTransport::new();
        mock.reply_json(200, json!({"historique": [{"id": 1}]}));
        let gate = mock.hold();
        let app = Arc::new(app(&mock));

        let first = {
            let app = Arc::clone(&app);
            tokio::spawn(async move { app.refresh(HISTORY).await })
        };
        while !app.cache().is_fetching(HISTORY) {
            tokio::task::yield_now().await;
        }

        let second = app.refresh(HISTORY).await.unwrap();
        assert_eq!(second, FetchOutcome::Skipped);

        gate.notify_one();
        let first = first.await.unwrap().unwrap();

        assert!(matches!(first, FetchOutcome::Fetched(_)));
        assert_eq!(mock.requests().len(), 1);
        assert_eq!(
            app.cache().get_data(HISTORY, json!({"historique": []})),
            json!({"historique": [{"id": 1}]})
        );
    }

    #[tokio::test]
    async fn test_timed_out_refresh_can_be_retried() {
        let mock = MockTransport::new();
        mock.reply_json(200, json!({"historique": [{"id": 2}]}));
        let gate = mock.hold();
        let app = app(&mock);

        let timed_out =
            tokio::time::timeout(Duration::from_millis(50), app.refresh(HISTORY)).await;
        assert!(timed_out.is_err());
        assert!(!app.cache().is_fetching(HISTORY));

        gate.notify_one();
        let outcome = app.refresh(HISTORY).await.unwrap();

        assert_eq!(outcome, FetchOutcome::Fetched(json!({"historique": [{"id": 2}]})));
        assert!(app.cache().is_fetched(HISTORY));
        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_home_fetches_wallet_and_history() {
        let mock = MockTransport::new();
        mock.reply_json(200, json!({"credit": 1}));
        mock.reply_json(200, json!({"historique": []}));
        let app = app(&mock);

        let results = app.refresh_home().await;

        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert!(app.cache().is_fetched(WALLET_DETAILS));
        assert!(app.cache().is_fetched(HISTORY));
        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_set_lock_refreshes_status() {
        let mock = MockTransport::new();
        mock.reply_json(200, json!(true));
        mock.reply_json(200, json!(true));
        let app = app(&mock);

        assert!(app.set_lock(true).await.unwrap());

        assert!(app.cache().get_data(LOCK_STATUS, false));
        let sent = mock.requests();
        assert!(sent[0].url.contains("MYACCOUNT/blockMe"));
        assert!(sent[1].url.contains("MYACCOUNT/isBlockedMe"));
    }

    #[tokio::test]
    async fn test_set_lock_succeeds_when_refresh_fails() {
        let mock = MockTransport::new();
        mock.reply_json(200, json!(true));
        mock.reply_offline();
        let app = app(&mock);

        assert!(app.set_lock(true).await.unwrap());

        assert_eq!(mock.requests().len(), 2);
        assert_eq!(app.cache().status(LOCK_STATUS), FetchStatus::Errored);
        assert_eq!(
            app.cache().error(LOCK_STATUS).map(|e| e.kind),
            Some(crate::error::ErrorKind::Transport)
        );
    }

    #[tokio::test]
    async fn test_set_lock_refused_while_fetching() {
        let mock = MockTransport::new();
        let app = app(&mock);
        app.cache().mark_fetching(LOCK_STATUS).unwrap();

        assert!(matches!(app.set_lock(true).await, Err(CampusPayError::Busy(_))));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_set_lock_rejects_non_boolean_answer() {
        let mock = MockTransport::new();
        mock.reply_json(200, json!({"error": "denied"}));
        let app = app(&mock);

        assert!(app.set_lock(false).await.is_err());
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_check_for_update() {
        let mock = MockTransport::new();
        mock.reply_json(200, json!({"tag_name": "v2.0.0"}));
        mock.reply_json(200, json!({"tag_name": "v2.0.0"}));
        let app = app(&mock);

        let newer = app.check_for_update("1.9.0").await.unwrap();
        assert_eq!(newer.map(|r| r.tag_name), Some("v2.0.0".to_string()));

        assert!(app.check_for_update("2.0.0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_operation_is_lookup_error() {
        let mock = MockTransport::new();
        let app = app(&mock);

        let err = app.call("github", "getRepository#1", vec![]).await.unwrap_err();

        assert!(matches!(err, CampusPayError::Lookup { .. }));
        assert!(mock.requests().is_empty());
    }
}
