// campuspay library root.
// API client and remote-resource cache core for the campus payment app.

pub mod api;
pub mod app;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod resource;

pub use app::App;
pub use config::Config;
pub use error::{CampusPayError, Result};
