//! Operation set and state projection for the server fleet.
//!
//! Every operation emits two states on the state channel: a placeholder
//! (`Loading` for list, the current snapshot for everything else) and then
//! exactly one terminal `Loaded` or `Error`. The terminal state is also
//! returned to the caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::api::ServerApi;
use crate::error::RemoteError;
use crate::models::{NewServer, ResponseEnvelope, ServerRecord, StatusFilter};
use crate::notify::Notifier;
use crate::state::AppState;
use crate::store::ServerStore;

/// What to do with a completion when a newer call for the same target was
/// issued while it was in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StalePolicy {
    /// Apply every completion in the order it arrives.
    #[default]
    LastCompletionWins,
    /// Only the most recently issued list, or ping of an address, may change
    /// the store. Saves and deletes are always applied.
    DropStale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperationKind {
    List,
    Ping,
    Save,
    Delete,
}

impl OperationKind {
    fn name(self) -> &'static str {
        match self {
            OperationKind::List => "list",
            OperationKind::Ping => "ping",
            OperationKind::Save => "save",
            OperationKind::Delete => "delete",
        }
    }
}

/// Sole owner of the server store.
pub struct ServerService {
    api: Arc<dyn ServerApi>,
    notifier: Arc<dyn Notifier>,
    store: Mutex<ServerStore>,
    states: mpsc::UnboundedSender<AppState>,
    policy: StalePolicy,
    next_token: AtomicU64,
    latest_list: AtomicU64,
    latest_pings: Mutex<HashMap<String, u64>>,
    pinging: Mutex<Option<(u64, String)>>,
    saves_in_flight: AtomicUsize,
}

impl ServerService {
    /// Create a service and the receiving end of its state stream.
    pub fn new(
        api: Arc<dyn ServerApi>,
        notifier: Arc<dyn Notifier>,
        policy: StalePolicy,
    ) -> (Self, mpsc::UnboundedReceiver<AppState>) {
        let (states, rx) = mpsc::unbounded_channel();
        let service = Self {
            api,
            notifier,
            store: Mutex::new(ServerStore::new()),
            states,
            policy,
            next_token: AtomicU64::new(0),
            latest_list: AtomicU64::new(0),
            latest_pings: Mutex::new(HashMap::new()),
            pinging: Mutex::new(None),
            saves_in_flight: AtomicUsize::new(0),
        };
        (service, rx)
    }

    /// Current store snapshot.
    pub fn snapshot(&self) -> Arc<ResponseEnvelope> {
        self.lock_store().snapshot()
    }

    /// Address of the latest ping still awaiting its result.
    pub fn pinging(&self) -> Option<String> {
        lock(&self.pinging).as_ref().map(|(_, ip)| ip.clone())
    }

    /// Whether a save is in flight.
    pub fn is_saving(&self) -> bool {
        self.saves_in_flight.load(Ordering::SeqCst) > 0
    }

    /// Fetch the whole fleet and make it the canonical snapshot.
    pub async fn list(&self) -> AppState {
        self.emit(AppState::Loading);
        let ticket = self.issue_list();

        let result = self.api.list().await.and_then(|response| {
            if response.data.servers.is_none() {
                return Err(RemoteError::MissingPayload("servers"));
            }
            Ok(response)
        });

        match result {
            Ok(response) => {
                let message = response.message.clone();
                let count = response.servers().len();
                let (envelope, applied) = self.commit(OperationKind::List, &ticket, |store| {
                    store.replace(response)
                });
                if applied {
                    tracing::info!(count, "fleet loaded");
                }
                self.succeed(envelope, &message)
            }
            Err(e) => self.fail(OperationKind::List, e),
        }
    }

    /// Re-check reachability of `ip_address` and update its record.
    pub async fn ping(&self, ip_address: &str) -> AppState {
        self.emit(self.placeholder());
        let ticket = self.issue_ping(ip_address);
        let _pinging = PingGuard::set(&self.pinging, ticket.token, ip_address);

        let result = self.api.ping(ip_address).await.and_then(single_record);

        match result {
            Ok((response, record)) => {
                tracing::info!(id = record.id, status = %record.status, "ping result");
                let (envelope, _) = self.commit(OperationKind::Ping, &ticket, |store| {
                    store.update_one(record.id, record)
                });
                self.succeed(envelope, &response.message)
            }
            Err(e) => self.fail(OperationKind::Ping, e),
        }
    }

    /// Derive a view of the current snapshot restricted to `filter`.
    ///
    /// Never touches the store and never fails.
    pub fn filter(&self, filter: StatusFilter) -> AppState {
        let snapshot = self.snapshot();
        self.emit(AppState::loaded(Arc::clone(&snapshot)));

        let view = filter_envelope(&snapshot, filter);
        let message = view.message.clone();
        self.succeed(Arc::new(view), &message)
    }

    /// Create a server; the stored record goes to the front of the fleet.
    pub async fn save(&self, server: &NewServer) -> AppState {
        self.emit(self.placeholder());
        let ticket = self.issue_unconditional();
        let _saving = CountGuard::enter(&self.saves_in_flight);

        let result = self.api.save(server).await.and_then(single_record);

        match result {
            Ok((response, record)) => {
                tracing::info!(id = record.id, name = %record.name, "server saved");
                let (envelope, _) = self.commit(OperationKind::Save, &ticket, |store| {
                    store.adopt_metadata(&response);
                    store.prepend(record);
                });
                self.succeed(envelope, &response.message)
            }
            Err(e) => self.fail(OperationKind::Save, e),
        }
    }

    /// Delete the server with `id`.
    pub async fn delete(&self, id: i64) -> AppState {
        self.emit(self.placeholder());
        let ticket = self.issue_unconditional();

        match self.api.delete(id).await {
            Ok(response) => {
                tracing::info!(id, "server deleted");
                let (envelope, _) = self.commit(OperationKind::Delete, &ticket, |store| {
                    store.adopt_metadata(&response);
                    store.remove_by_id(id);
                });
                self.succeed(envelope, &response.message)
            }
            Err(e) => self.fail(OperationKind::Delete, e),
        }
    }

    fn placeholder(&self) -> AppState {
        AppState::loaded(self.snapshot())
    }

    fn next_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn issue_list(&self) -> Ticket {
        let token = self.next_token();
        self.latest_list.store(token, Ordering::SeqCst);
        Ticket {
            token,
            target: Target::List,
        }
    }

    fn issue_ping(&self, ip_address: &str) -> Ticket {
        let token = self.next_token();
        lock(&self.latest_pings).insert(ip_address.to_string(), token);
        Ticket {
            token,
            target: Target::Ping(ip_address.to_string()),
        }
    }

    fn issue_unconditional(&self) -> Ticket {
        Ticket {
            token: self.next_token(),
            target: Target::Unconditional,
        }
    }

    /// Newest token issued for the ticket's target, if it can be superseded.
    fn latest_for(&self, ticket: &Ticket) -> Option<u64> {
        match &ticket.target {
            Target::List => Some(self.latest_list.load(Ordering::SeqCst)),
            Target::Ping(ip) => lock(&self.latest_pings).get(ip).copied(),
            Target::Unconditional => None,
        }
    }

    /// Apply `update` to the store unless the completion is stale under
    /// the configured policy. Returns the resulting snapshot and whether
    /// the update was applied.
    fn commit<F>(
        &self,
        kind: OperationKind,
        ticket: &Ticket,
        update: F,
    ) -> (Arc<ResponseEnvelope>, bool)
    where
        F: FnOnce(&mut ServerStore),
    {
        let mut store = self.lock_store();
        if self.policy == StalePolicy::DropStale {
            if let Some(latest) = self.latest_for(ticket).filter(|l| *l != ticket.token) {
                tracing::warn!(
                    operation = kind.name(),
                    token = ticket.token,
                    latest,
                    "dropping stale completion"
                );
                return (store.snapshot(), false);
            }
        }
        update(&mut store);
        (store.snapshot(), true)
    }

    fn succeed(&self, envelope: Arc<ResponseEnvelope>, message: &str) -> AppState {
        self.notifier.on_default(message);
        let state = AppState::loaded(envelope);
        self.emit(state.clone());
        state
    }

    fn fail(&self, kind: OperationKind, error: RemoteError) -> AppState {
        let detail = error.detail();
        tracing::warn!(operation = kind.name(), "{}", detail);
        self.notifier.on_error(&detail);
        let state = AppState::error(detail);
        self.emit(state.clone());
        state
    }

    fn emit(&self, state: AppState) {
        // Nobody listening is fine; callers still get the terminal state.
        let _ = self.states.send(state);
    }

    fn lock_store(&self) -> MutexGuard<'_, ServerStore> {
        lock(&self.store)
    }
}

/// Identifies one call and what a newer call would supersede.
struct Ticket {
    token: u64,
    target: Target,
}

enum Target {
    List,
    /// Pings of the same address overwrite the same record.
    Ping(String),
    /// Saves and deletes touch distinct records and never go stale.
    Unconditional,
}

/// Build the filtered view of `envelope`.
pub fn filter_envelope(envelope: &ResponseEnvelope, filter: StatusFilter) -> ResponseEnvelope {
    let mut view = envelope.clone();
    if filter == StatusFilter::All {
        view.message = format!("Servers filtered by {} status", filter);
        return view;
    }

    let servers: Vec<ServerRecord> = envelope
        .servers()
        .iter()
        .filter(|s| filter.matches(s.status))
        .cloned()
        .collect();

    view.message = if servers.is_empty() {
        format!("No servers of {} found", filter)
    } else {
        format!("Servers filtered by {} status", filter)
    };
    view.data.servers = Some(servers);
    view.data.server = None;
    view
}

fn single_record(
    mut response: ResponseEnvelope,
) -> Result<(ResponseEnvelope, ServerRecord), RemoteError> {
    let record = response
        .data
        .server
        .take()
        .ok_or(RemoteError::MissingPayload("server"))?;
    Ok((response, record))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks an address as being pinged until dropped.
struct PingGuard<'a> {
    slot: &'a Mutex<Option<(u64, String)>>,
    token: u64,
}

impl<'a> PingGuard<'a> {
    fn set(slot: &'a Mutex<Option<(u64, String)>>, token: u64, ip_address: &str) -> Self {
        *lock(slot) = Some((token, ip_address.to_string()));
        Self { slot, token }
    }
}

impl Drop for PingGuard<'_> {
    fn drop(&mut self) {
        let mut slot = lock(self.slot);
        if matches!(slot.as_ref(), Some((token, _)) if *token == self.token) {
            *slot = None;
        }
    }
}

struct CountGuard<'a>(&'a AtomicUsize);

impl<'a> CountGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for CountGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[path = "tests/service_tests.rs"]
mod tests;
