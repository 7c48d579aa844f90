// Wallet and payment service.
// Wallet details, transaction history, card lock status and sign-out.

use std::sync::Arc;

use reqwest::Method;
use serde_json::{Value, json};

use super::executor::{Executor, ValidStatus};
use super::service::{CallOptions, Service, ServiceBase};
use crate::config::PayUtcConfig;
use crate::dispatch::{DispatchTable, arg_bool};
use crate::error::Result;

const WALLET_DETAILS_PATH: &str = "MYACCOUNT/getWalletDetails";
const HISTORY_PATH: &str = "MYACCOUNT/historique";
const LOCK_STATUS_PATH: &str = "MYACCOUNT/isBlockedMe";
const LOCK_PATH: &str = "MYACCOUNT/blockMe";
const UNLOCK_PATH: &str = "MYACCOUNT/unBlockMe";
const FORGET_PATH: &str = "MYACCOUNT/logout";

/// An already expired session is as good as a successful sign-out.
const FORGET_VALID_STATUS: [u16; 3] = [200, 204, 401];

/// Wallet service. Every call is a POST with the system id in the query.
pub struct PayUtc {
    base: ServiceBase,
}

impl PayUtc {
    pub fn new(config: &PayUtcConfig, executor: Executor) -> Self {
        let base = ServiceBase::new(Self::TYPE, config.api_url.clone(), executor)
            .with_method(Method::POST)
            .with_default_query("system_id", &config.system_id);

        Self { base }
    }

    /// Wallet details (balance, owner). Shape is passed through untouched.
    pub async fn get_wallet_details(&self) -> Result<Value> {
        self.base.call(WALLET_DETAILS_PATH, None).await
    }

    /// Transaction history, as `{ "historique": [...] }`.
    pub async fn get_history(&self) -> Result<Value> {
        self.base.call(HISTORY_PATH, None).await
    }

    pub async fn get_lock_status(&self) -> Result<bool> {
        self.base.call_as(LOCK_STATUS_PATH, None).await
    }

    /// Lock or unlock the wallet; returns the status reported by the server.
    pub async fn set_lock_status(&self, locked: bool) -> Result<bool> {
        let path = if locked { LOCK_PATH } else { UNLOCK_PATH };
        self.base.call_as(path, Some(json!({}))).await
    }

    /// Drop the server-side session.
    pub async fn forget(&self) -> Result<()> {
        let options = CallOptions {
            valid_status: Some(ValidStatus::codes(&FORGET_VALID_STATUS)),
            ..CallOptions::default()
        };
        self.base.call_with(FORGET_PATH, None, options).await?;
        Ok(())
    }
}

impl Service for PayUtc {
    const TYPE: &'static str = "payutc";

    fn base(&self) -> &ServiceBase {
        &self.base
    }

    fn operations(self: Arc<Self>) -> DispatchTable {
        let mut table = DispatchTable::new(Self::TYPE);

        let payutc = Arc::clone(&self);
        table.register("getWalletDetails", move |_| {
            let payutc = Arc::clone(&payutc);
            async move { payutc.get_wallet_details().await }
        });

        let payutc = Arc::clone(&self);
        table.register("getHistory", move |_| {
            let payutc = Arc::clone(&payutc);
            async move { payutc.get_history().await }
        });

        let payutc = Arc::clone(&self);
        table.register("getLockStatus", move |_| {
            let payutc = Arc::clone(&payutc);
            async move { Ok(Value::Bool(payutc.get_lock_status().await?)) }
        });

        let payutc = Arc::clone(&self);
        table.register("setLockStatus", move |args| {
            let payutc = Arc::clone(&payutc);
            async move {
                let locked = arg_bool(&args, 0, "setLockStatus")?;
                let status = payutc.set_lock_status(locked).await?;
                Ok(Value::Bool(status))
            }
        });

        table.register("forget", move |_| {
            let payutc = Arc::clone(&self);
            async move {
                payutc.forget().await?;
                Ok(Value::Null)
            }
        });

        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockTransport;
    use crate::error::{CampusPayError, ErrorKind};

    fn payutc(mock: &MockTransport) -> Arc<PayUtc> {
        let config = PayUtcConfig {
            api_url: "https://pay.example.com/services/".to_string(),
            system_id: "campus".to_string(),
        };
        Arc::new(PayUtc::new(&config, Executor::new(mock.clone())))
    }

    #[tokio::test]
    async fn test_wallet_details_is_post_with_system_id() {
        let mock = MockTransport::new();
        mock.reply_json(200, json!({"credit": 1250}));

        let details = payutc(&mock).get_wallet_details().await.unwrap();

        assert_eq!(details, json!({"credit": 1250}));
        let sent = mock.requests();
        assert_eq!(sent[0].method, Method::POST);
        assert_eq!(
            sent[0].url,
            "https://pay.example.com/services/MYACCOUNT/getWalletDetails?system_id=campus"
        );
    }

    #[tokio::test]
    async fn test_set_lock_status_picks_endpoint() {
        let mock = MockTransport::new();
        mock.reply_json(200, json!(true));
        mock.reply_json(200, json!(false));
        let service = payutc(&mock);

        assert!(service.set_lock_status(true).await.unwrap());
        assert!(!service.set_lock_status(false).await.unwrap());

        let sent = mock.requests();
        assert!(sent[0].url.contains("MYACCOUNT/blockMe"));
        assert!(sent[1].url.contains("MYACCOUNT/unBlockMe"));
    }

    #[tokio::test]
    async fn test_non_boolean_lock_answer_is_decode_error() {
        let mock = MockTransport::new();
        mock.reply_json(200, json!({"error": "nope"}));

        let err = payutc(&mock).get_lock_status().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[tokio::test]
    async fn test_forget_accepts_expired_session() {
        let mock = MockTransport::new();
        mock.reply_raw(401, b"");
        mock.reply_raw(500, b"");
        let service = payutc(&mock);

        service.forget().await.unwrap();
        let err = service.forget().await.unwrap_err();

        assert!(matches!(err, CampusPayError::HttpStatus { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_set_lock_status_token() {
        let mock = MockTransport::new();
        mock.reply_json(200, json!(true));
        let table = payutc(&mock).operations();

        let status = table.invoke("setLockStatus#true", vec![]).await.unwrap();

        assert_eq!(status, json!(true));
        assert!(table.invoke("setLockStatus#maybe", vec![]).await.is_err());
    }
}
