//! Data models for the server manager API.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Reported reachability of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "SERVER_UP", alias = "UP")]
    Up,
    #[serde(rename = "SERVER_DOWN", alias = "DOWN")]
    Down,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Up => f.write_str("UP"),
            Status::Down => f.write_str("DOWN"),
        }
    }
}

/// Selector accepted by the filter operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Only(Status),
}

impl StatusFilter {
    /// Whether a record with `status` passes this selector.
    pub fn matches(&self, status: Status) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => *wanted == status,
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusFilter::All => f.write_str("ALL"),
            StatusFilter::Only(status) => write!(f, "{}", status),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALL" => Ok(StatusFilter::All),
            "UP" | "SERVER_UP" => Ok(StatusFilter::Only(Status::Up)),
            "DOWN" | "SERVER_DOWN" => Ok(StatusFilter::Only(Status::Down)),
            other => Err(format!(
                "Unknown status filter: {}. Valid values are: ALL, UP, DOWN",
                other
            )),
        }
    }
}

/// A monitored server. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    pub id: i64,
    pub name: String,
    pub ip_address: String,
    pub status: Status,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub image_url: String,
}

/// A server that has not been saved yet; the id is assigned remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewServer {
    pub name: String,
    pub ip_address: String,
    pub status: Status,
    #[serde(rename = "type")]
    pub kind: String,
    pub image_url: String,
}

/// Payload carried by a response envelope.
///
/// Bulk operations populate `servers`, single-record operations `server`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servers: Option<Vec<ServerRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerRecord>,
}

/// Metadata-wrapped payload returned by every remote call and every operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub time_stamp: Option<NaiveDateTime>,
    #[serde(default, alias = "satatusCode")]
    pub status_code: u16,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer_message: Option<String>,
    #[serde(default)]
    pub data: ResponseData,
}

impl ResponseEnvelope {
    /// An envelope holding an empty fleet and no metadata.
    pub fn empty() -> Self {
        Self {
            data: ResponseData {
                servers: Some(Vec::new()),
                server: None,
            },
            ..Self::default()
        }
    }

    /// The bulk sequence, or an empty slice when absent.
    pub fn servers(&self) -> &[ServerRecord] {
        self.data.servers.as_deref().unwrap_or(&[])
    }
}
