//! Remote server API.

mod client;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::models::{NewServer, ResponseEnvelope};

pub use client::ServerClient;

/// The remote collaborator every operation talks to.
///
/// Implementations must treat any non-success transport result as an error.
#[async_trait]
pub trait ServerApi: Send + Sync {
    /// `GET /server/list`; `data.servers` populated.
    async fn list(&self) -> Result<ResponseEnvelope, RemoteError>;

    /// `GET /server/ping/{ip}`; `data.server` populated.
    async fn ping(&self, ip_address: &str) -> Result<ResponseEnvelope, RemoteError>;

    /// `POST /server/save`; `data.server` populated with the assigned id.
    async fn save(&self, server: &NewServer) -> Result<ResponseEnvelope, RemoteError>;

    /// `DELETE /server/delete/{id}`.
    async fn delete(&self, id: i64) -> Result<ResponseEnvelope, RemoteError>;
}
