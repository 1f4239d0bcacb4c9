//! Client-side monitor and manager for a fleet of network servers.
//!
//! [`ServerService`] owns the in-memory fleet snapshot and turns list,
//! ping, filter, save and delete calls against the remote API into a stream
//! of [`AppState`] values for a presentation layer.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod service;
pub mod state;
pub mod store;
pub mod watch;

pub use api::{ServerApi, ServerClient};
pub use config::Config;
pub use error::{ConfigError, RemoteError};
pub use models::{NewServer, ResponseData, ResponseEnvelope, ServerRecord, Status, StatusFilter};
pub use notify::{Notifier, TracingNotifier};
pub use service::{ServerService, StalePolicy};
pub use state::AppState;
pub use store::ServerStore;
