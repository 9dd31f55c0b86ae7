//! The batch dispatch server.
//!
//! Clients connect over TCP and subscribe to named events. When the operator
//! triggers an event, the files in the text directory are split across the
//! clients waiting on it and one batch job per client is queued. A single
//! [`BatchWorker`] runs the jobs one at a time on a thread or process pool
//! sized by each client's [`ExecutionConfig`] and sends the results back.

mod config;
mod console;
mod dispatcher;
pub mod extract;
mod pool;
mod protocol;
mod registry;
mod server;
mod session;
mod state;
mod worker;

pub use config::{ConfigError, ExecutionConfig, ExecutionMode, ServerConfig};
pub use console::{Command, Console, ConsoleReply};
pub use dispatcher::{partition, BatchDispatcher, BatchJob, DirectorySource, FileSource, TriggerOutcome, TriggerReport};
pub use extract::{ExtractError, FileProcessor, TextExtractor};
pub use pool::{
    pool_size, DefaultPoolBuilder, PoolBuilder, PoolError, PoolExecutor, ProcessPool, ThreadPool, WorkerCommand,
};
pub use protocol::{
    AckStatus, BatchReport, BatchStatus, ClientMessage, ConfigAck, Extraction, FileResult, FileStatus, ProtocolError,
    ServerMessage,
};
pub use registry::{ClientId, SubscriptionRegistry};
pub use server::{Server, ServerError};
pub use session::ClientSession;
pub use state::{ClientRecord, ServerState};
pub use worker::BatchWorker;
