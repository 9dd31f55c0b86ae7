use std::collections::{BTreeMap, VecDeque};
use std::net::SocketAddr;

use parking_lot::Mutex;
use tokio::sync::{mpsc, MutexGuard, Notify};
use tracing::{debug, info};

use crate::config::ExecutionConfig;
use crate::dispatcher::BatchJob;
use crate::protocol::ServerMessage;
use crate::registry::{ClientId, SubscriptionRegistry};

/// A connected client as seen by the server.
#[derive(Debug, Clone)]
pub struct ClientRecord {
    pub id: ClientId,
    pub addr: SocketAddr,
    pub config: ExecutionConfig,
    outbox: mpsc::UnboundedSender<ServerMessage>,
}

#[derive(Default)]
struct Inner {
    registry: SubscriptionRegistry,
    clients: BTreeMap<ClientId, ClientRecord>,
    jobs: VecDeque<BatchJob>,
    next_id: u64,
}

/// State shared by every session, the dispatcher, the worker and the console.
///
/// The registry, the client table and the job queue sit behind one lock so
/// that subscribe, drain and enqueue are each atomic. The lock is never held
/// across an await point. Messages are queued on the client's outbox and
/// written by its session task.
///
/// A second, independent lock guards batch execution.
pub struct ServerState {
    inner: Mutex<Inner>,
    work_ready: Notify,
    execution: tokio::sync::Mutex<()>,
    default_config: ExecutionConfig,
    server_info: String,
}

impl ServerState {
    pub fn new(default_config: ExecutionConfig, server_info: impl Into<String>) -> Self {
        ServerState {
            inner: Mutex::new(Inner::default()),
            work_ready: Notify::new(),
            execution: tokio::sync::Mutex::new(()),
            default_config,
            server_info: server_info.into(),
        }
    }

    pub fn server_info(&self) -> &str {
        &self.server_info
    }

    /// Registers a new connection with the default configuration.
    pub fn connect(&self, addr: SocketAddr, outbox: mpsc::UnboundedSender<ServerMessage>) -> ClientId {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = ClientId(inner.next_id);
        inner.clients.insert(
            id,
            ClientRecord {
                id,
                addr,
                config: self.default_config,
                outbox,
            },
        );
        id
    }

    /// Forgets the client and purges it from every event.
    pub fn disconnect(&self, client: ClientId) -> bool {
        let mut inner = self.inner.lock();
        inner.registry.remove_client(client);
        let known = inner.clients.remove(&client).is_some();
        if known {
            info!(client = %client, "Client disconnected");
        }
        known
    }

    pub fn is_connected(&self, client: ClientId) -> bool {
        self.inner.lock().clients.contains_key(&client)
    }

    pub fn config(&self, client: ClientId) -> Option<ExecutionConfig> {
        self.inner.lock().clients.get(&client).map(|record| record.config)
    }

    pub fn set_config(&self, client: ClientId, config: ExecutionConfig) -> bool {
        match self.inner.lock().clients.get_mut(&client) {
            Some(record) => {
                record.config = config;
                true
            }
            None => false,
        }
    }

    /// Returns `false` if the client is no longer connected.
    pub fn subscribe(&self, client: ClientId, event: &str) -> bool {
        let mut inner = self.inner.lock();
        if !inner.clients.contains_key(&client) {
            return false;
        }
        inner.registry.subscribe(client, event);
        true
    }

    pub fn unsubscribe(&self, client: ClientId, event: &str) -> bool {
        self.inner.lock().registry.unsubscribe(client, event)
    }

    pub fn add_event(&self, event: &str) -> bool {
        self.inner.lock().registry.add_event(event)
    }

    pub fn remove_event(&self, event: &str) -> bool {
        self.inner.lock().registry.remove_event(event)
    }

    /// Runs `f` against the registry while holding the lock.
    pub fn with_registry<R>(&self, f: impl FnOnce(&SubscriptionRegistry) -> R) -> R {
        f(&self.inner.lock().registry)
    }

    /// Drains the wait queue of `event`, dropping clients that have gone away.
    pub fn drain_waiting(&self, event: &str) -> Vec<ClientId> {
        let mut inner = self.inner.lock();
        let drained = inner.registry.drain_wait_queue(event);
        let (connected, stale): (Vec<_>, Vec<_>) =
            drained.into_iter().partition(|client| inner.clients.contains_key(client));
        for client in stale {
            debug!(client = %client, event, "Skipping disconnected client");
        }
        connected
    }

    /// Queues a batch for `client` using its current configuration.
    ///
    /// Returns `false` without queueing if the client has disconnected.
    pub fn enqueue(&self, client: ClientId, event: &str, files: Vec<String>) -> bool {
        let mut inner = self.inner.lock();
        let Some(config) = inner.clients.get(&client).map(|record| record.config) else {
            return false;
        };
        inner.jobs.push_back(BatchJob {
            client,
            event: event.to_string(),
            files,
            config,
        });
        true
    }

    pub fn pop_job(&self) -> Option<BatchJob> {
        self.inner.lock().jobs.pop_front()
    }

    pub fn pending_jobs(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    /// Wakes the batch worker.
    pub fn notify_work(&self) {
        self.work_ready.notify_one();
    }

    pub(crate) async fn wait_for_work(&self) {
        self.work_ready.notified().await;
    }

    pub(crate) async fn lock_execution(&self) -> MutexGuard<'_, ()> {
        self.execution.lock().await
    }

    /// Whether a batch currently holds the execution lock.
    pub fn is_executing(&self) -> bool {
        self.execution.try_lock().is_err()
    }

    /// Queues `message` for `client`. Returns `false` if it is not connected.
    pub fn send(&self, client: ClientId, message: ServerMessage) -> bool {
        let outbox = self.inner.lock().clients.get(&client).map(|record| record.outbox.clone());
        match outbox {
            Some(outbox) => outbox.send(message).is_ok(),
            None => {
                debug!(client = %client, "Dropping message for disconnected client");
                false
            }
        }
    }

    /// Queues `message` for every connected client and returns how many got it.
    pub fn broadcast(&self, message: ServerMessage) -> usize {
        let outboxes: Vec<_> = self
            .inner
            .lock()
            .clients
            .values()
            .map(|record| record.outbox.clone())
            .collect();
        outboxes
            .into_iter()
            .filter(|outbox| outbox.send(message.clone()).is_ok())
            .count()
    }

    /// The connected clients, ordered by id.
    pub fn clients(&self) -> Vec<ClientRecord> {
        self.inner.lock().clients.values().cloned().collect()
    }
}
