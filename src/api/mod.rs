// Backend API module.
// Request executor, service base and the concrete GitHub and wallet services.

pub mod executor;
pub mod github;
pub mod payutc;
pub mod service;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use executor::{
    Credential, CredentialsPolicy, Executor, RequestOptions, ResponseFormat, Transport,
    ValidStatus,
};
pub use github::GitHub;
pub use payutc::PayUtc;
pub use service::{CallOptions, Service, ServiceBase};
pub use types::*;
