//! In-memory holder of the latest known fleet snapshot.
//!
//! Every write builds a fresh envelope and swaps the `Arc`, so snapshots
//! already handed out never change underneath their readers.

use std::sync::Arc;

use crate::models::{ResponseData, ResponseEnvelope, ServerRecord};

#[derive(Debug, Clone)]
pub struct ServerStore {
    current: Arc<ResponseEnvelope>,
}

impl Default for ServerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerStore {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            current: Arc::new(ResponseEnvelope::empty()),
        }
    }

    /// Adopt a full list response as the canonical snapshot.
    ///
    /// The received sequence is reversed once here, so the newest record
    /// the backend returned last is shown first.
    pub fn replace(&mut self, mut envelope: ResponseEnvelope) {
        let mut servers = envelope.data.servers.take().unwrap_or_default();
        servers.reverse();
        envelope.data = ResponseData {
            servers: Some(dedup_by_id(servers)),
            server: None,
        };
        self.current = Arc::new(envelope);
    }

    /// Replace the record with `id` in place. No-op if absent.
    pub fn update_one(&mut self, id: i64, record: ServerRecord) {
        let Some(position) = self.current.servers().iter().position(|s| s.id == id) else {
            return;
        };
        let mut servers = self.current.servers().to_vec();
        servers[position] = ServerRecord { id, ..record };
        self.swap_servers(servers);
    }

    /// Insert `record` at the front of the sequence.
    ///
    /// A record already present under the same id is dropped first.
    pub fn prepend(&mut self, record: ServerRecord) {
        let mut servers = Vec::with_capacity(self.current.servers().len() + 1);
        servers.push(record.clone());
        servers.extend(
            self.current
                .servers()
                .iter()
                .filter(|s| s.id != record.id)
                .cloned(),
        );
        self.swap_servers(servers);
    }

    /// Drop the record with `id`. No-op if absent.
    pub fn remove_by_id(&mut self, id: i64) {
        if !self.current.servers().iter().any(|s| s.id == id) {
            return;
        }
        let servers = self
            .current
            .servers()
            .iter()
            .filter(|s| s.id != id)
            .cloned()
            .collect();
        self.swap_servers(servers);
    }

    /// Take over the metadata (timestamp, status, message...) of `response`
    /// while keeping the current sequence.
    pub fn adopt_metadata(&mut self, response: &ResponseEnvelope) {
        let envelope = ResponseEnvelope {
            data: ResponseData {
                servers: Some(self.current.servers().to_vec()),
                server: None,
            },
            ..response.clone()
        };
        self.current = Arc::new(envelope);
    }

    /// The current snapshot, for read-only use.
    pub fn snapshot(&self) -> Arc<ResponseEnvelope> {
        Arc::clone(&self.current)
    }

    fn swap_servers(&mut self, servers: Vec<ServerRecord>) {
        let mut envelope = ResponseEnvelope::clone(&self.current);
        envelope.data = ResponseData {
            servers: Some(servers),
            server: None,
        };
        self.current = Arc::new(envelope);
    }
}

/// Keep the first occurrence of every id.
fn dedup_by_id(servers: Vec<ServerRecord>) -> Vec<ServerRecord> {
    let mut seen = std::collections::HashSet::with_capacity(servers.len());
    servers.into_iter().filter(|s| seen.insert(s.id)).collect()
}
