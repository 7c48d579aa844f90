// Resource module.
// Per-resource fetch lifecycle and last-known-good payloads consumed by the UI.

pub mod cache;
pub mod fetcher;
pub mod record;

pub use cache::ResourceCache;
pub use fetcher::{FetchOutcome, ResourceFetcher, RetryPolicy};
pub use record::{FetchStatus, ResourceError, ResourceRecord};
