use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ExecutionConfig;
use crate::protocol::{BatchReport, ServerMessage};
use crate::registry::ClientId;
use crate::state::ServerState;

/// Files assigned to one client by one trigger.
///
/// `config` is the client's configuration when the job was queued; later
/// `SET_CONFIG` messages do not affect it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    pub client: ClientId,
    pub event: String,
    pub files: Vec<String>,
    pub config: ExecutionConfig,
}

/// Splits `items` into `parts` contiguous chunks whose sizes differ by at
/// most one. The first `items.len() % parts` chunks get the extra item.
pub fn partition<T>(items: &[T], parts: usize) -> Vec<&[T]> {
    if parts == 0 {
        return Vec::new();
    }
    let base = items.len() / parts;
    let extra = items.len() % parts;

    let mut chunks = Vec::with_capacity(parts);
    let mut start = 0;
    for index in 0..parts {
        let len = base + usize::from(index < extra);
        chunks.push(&items[start..start + len]);
        start += len;
    }
    chunks
}

/// Where the files handed out on a trigger come from.
pub trait FileSource: Send + Sync {
    /// The available file names, in the order they are partitioned.
    fn list(&self) -> io::Result<Vec<String>>;

    /// The path a worker opens for `name`.
    fn resolve(&self, name: &str) -> PathBuf;
}

/// Regular files with a given extension in one directory, sorted by name.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
    extension: String,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        DirectorySource {
            dir: dir.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FileSource for DirectorySource {
    fn list(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(self.extension.as_str()) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

/// What a trigger did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    UnknownEvent,
    NoClients,
    /// Every waiting client was told there is nothing to process.
    NoFiles { clients: usize },
    ListingFailed { clients: usize, error: String },
    Queued { clients: usize, files: usize, jobs: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerReport {
    pub event: String,
    pub outcome: TriggerOutcome,
}

impl fmt::Display for TriggerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let event = &self.event;
        match &self.outcome {
            TriggerOutcome::UnknownEvent => write!(f, "Event '{event}' not found."),
            TriggerOutcome::NoClients => write!(f, "No clients waiting for '{event}'."),
            TriggerOutcome::NoFiles { clients } => {
                write!(f, "No files to process for '{event}', notified {clients} client(s).")
            }
            TriggerOutcome::ListingFailed { clients, error } => {
                write!(f, "Could not list files for '{event}' ({error}), notified {clients} client(s).")
            }
            TriggerOutcome::Queued { clients, files, jobs } => write!(
                f,
                "Triggered '{event}': {files} file(s) across {clients} client(s), {jobs} batch(es) queued."
            ),
        }
    }
}

/// Turns triggers and `PROCESS_FILES` requests into queued batch jobs.
#[derive(Clone)]
pub struct BatchDispatcher {
    state: Arc<ServerState>,
    files: Arc<dyn FileSource>,
}

impl BatchDispatcher {
    pub fn new(state: Arc<ServerState>, files: Arc<dyn FileSource>) -> Self {
        BatchDispatcher { state, files }
    }

    pub fn files(&self) -> &Arc<dyn FileSource> {
        &self.files
    }

    /// Hands the available files out to the clients waiting on `event`.
    pub fn trigger(&self, event: &str) -> TriggerReport {
        let report = |outcome| TriggerReport {
            event: event.to_string(),
            outcome,
        };

        if !self.state.with_registry(|registry| registry.contains(event)) {
            return report(TriggerOutcome::UnknownEvent);
        }

        let clients = self.state.drain_waiting(event);
        if clients.is_empty() {
            info!(event, "Trigger with no waiting clients");
            return report(TriggerOutcome::NoClients);
        }

        let files = match self.files.list() {
            Ok(files) => files,
            Err(err) => {
                warn!(event, error = %err, "Failed to list files");
                let message = format!("Could not list files: {err}");
                for client in &clients {
                    self.state.send(
                        *client,
                        ServerMessage::ProcessingComplete(BatchReport::failed(event, message.clone())),
                    );
                }
                return report(TriggerOutcome::ListingFailed {
                    clients: clients.len(),
                    error: err.to_string(),
                });
            }
        };

        if files.is_empty() {
            for client in &clients {
                self.state.send(
                    *client,
                    ServerMessage::ProcessingComplete(BatchReport::empty(event, "No files to process.")),
                );
            }
            return report(TriggerOutcome::NoFiles { clients: clients.len() });
        }

        let mut jobs = 0;
        for (client, chunk) in clients.iter().zip(partition(&files, clients.len())) {
            if chunk.is_empty() {
                self.state.send(
                    *client,
                    ServerMessage::ProcessingComplete(BatchReport::empty(
                        event,
                        "No files assigned for this trigger.",
                    )),
                );
                continue;
            }
            if self.state.enqueue(*client, event, chunk.to_vec()) {
                jobs += 1;
            } else {
                warn!(client = %client, event, "Client left before its batch was queued");
            }
        }

        if jobs > 0 {
            self.state.notify_work();
        }
        info!(event, clients = clients.len(), files = files.len(), jobs, "Event triggered");
        report(TriggerOutcome::Queued {
            clients: clients.len(),
            files: files.len(),
            jobs,
        })
    }

    /// Queues one batch with exactly `files` for `client`.
    pub fn submit(&self, client: ClientId, event: &str, files: Vec<String>) -> bool {
        let count = files.len();
        if !self.state.enqueue(client, event, files) {
            return false;
        }
        info!(client = %client, event, files = count, "Batch requested by client");
        self.state.notify_work();
        true
    }
}
