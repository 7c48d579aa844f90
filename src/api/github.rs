// GitHub service.
// Repository links, contributors, users, releases and the changelog asset.

use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;

use super::executor::{Executor, ResponseFormat};
use super::service::{CallOptions, Service, ServiceBase, join_url};
use super::types::{Contributor, Release, User};
use crate::config::GitHubConfig;
use crate::dispatch::{DispatchTable, arg_string, to_payload};
use crate::error::{CampusPayError, Result};

/// GitHub REST service for the app repository.
pub struct GitHub {
    base: ServiceBase,
    web_url: String,
    repo: String,
    changelog_url: String,
}

impl GitHub {
    pub fn new(config: &GitHubConfig, executor: Executor) -> Self {
        Self {
            base: ServiceBase::new(Self::TYPE, config.api_url.clone(), executor),
            web_url: config.web_url.clone(),
            repo: config.repo.clone(),
            changelog_url: config.changelog_url.clone(),
        }
    }

    pub fn repo_url(&self) -> String {
        join_url(&self.web_url, &self.repo)
    }

    pub fn issue_url(&self) -> String {
        format!("{}/issues", self.repo_url())
    }

    pub fn version_url(&self, version: &str) -> String {
        format!("{}/releases/tag/{}", self.repo_url(), version)
    }

    pub async fn get_contributors(&self) -> Result<Vec<Contributor>> {
        self.base
            .call_as(&format!("repos/{}/contributors", self.repo), None)
            .await
    }

    pub async fn get_user(&self, user: &str) -> Result<User> {
        self.base.call_as(&format!("users/{}", user), None).await
    }

    pub async fn get_latest_release(&self) -> Result<Release> {
        self.base
            .call_as(&format!("repos/{}/releases/latest", self.repo), None)
            .await
    }

    /// Fetch the changelog asset for a language as raw text.
    pub async fn get_changelog(&self, lang: &str) -> Result<String> {
        let url = format!("{}{}.json", self.changelog_url, lang);
        let options = CallOptions {
            use_absolute_url: true,
            method: Some(Method::GET),
            format: ResponseFormat::Text,
            ..CallOptions::default()
        };

        match self.base.call_with(&url, None, options).await? {
            Value::String(text) => Ok(text),
            other => Err(CampusPayError::Decode {
                url,
                message: format!("expected text, got {other}"),
            }),
        }
    }
}

/// Whether a published release differs from the running app version.
pub fn update_available(release: &Release, app_version: &str) -> bool {
    !app_version.is_empty()
        && !release.tag_name.is_empty()
        && format!("v{}", app_version) != release.tag_name
}

impl Service for GitHub {
    const TYPE: &'static str = "github";

    fn base(&self) -> &ServiceBase {
        &self.base
    }

    fn operations(self: Arc<Self>) -> DispatchTable {
        let mut table = DispatchTable::new(Self::TYPE);

        let github = Arc::clone(&self);
        table.register("getRepoUrl", move |_| {
            let url = github.repo_url();
            async move { Ok(Value::String(url)) }
        });

        let github = Arc::clone(&self);
        table.register("getIssueUrl", move |_| {
            let url = github.issue_url();
            async move { Ok(Value::String(url)) }
        });

        let github = Arc::clone(&self);
        table.register("getVersionUrl", move |args| {
            let url = arg_string(&args, 0, "getVersionUrl").map(|v| github.version_url(&v));
            async move { url.map(Value::String) }
        });

        let github = Arc::clone(&self);
        table.register("getContributors", move |_| {
            let github = Arc::clone(&github);
            async move { to_payload(github.get_contributors().await?) }
        });

        let github = Arc::clone(&self);
        table.register("getUser", move |args| {
            let github = Arc::clone(&github);
            async move {
                let user = arg_string(&args, 0, "getUser")?;
                to_payload(github.get_user(&user).await?)
            }
        });

        let github = Arc::clone(&self);
        table.register("getLatestRelease", move |_| {
            let github = Arc::clone(&github);
            async move { to_payload(github.get_latest_release().await?) }
        });

        table.register("getChangelog", move |args| {
            let github = Arc::clone(&self);
            async move {
                let lang = arg_string(&args, 0, "getChangelog")?;
                Ok(Value::String(github.get_changelog(&lang).await?))
            }
        });

        table
    }
}
