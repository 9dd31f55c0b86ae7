//! Worker pools that execute one batch.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;
use tracing::debug;

use crate::config::{ExecutionConfig, ExecutionMode};
use crate::extract::{display_name, process_path, FileProcessor};
use crate::protocol::FileResult;

/// Errors that fail a whole batch.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Failed to build worker pool: {0}")]
    Build(String),

    #[error("Worker executable {} is not available: {source}", .program.display())]
    WorkerMissing { program: PathBuf, source: io::Error },
}

/// Runs the file processor over a batch of files.
pub trait PoolExecutor: Send {
    /// Processes every file and returns one result per file, in input order.
    ///
    /// A file that cannot be processed yields an error entry; it never fails
    /// the rest of the batch.
    fn execute(&self, files: &[PathBuf]) -> Vec<FileResult>;

    /// Threads, or concurrent child processes, the pool runs with.
    fn workers(&self) -> usize;
}

/// Creates the pool for a batch from the configuration snapshot of its job.
pub trait PoolBuilder: Send + Sync {
    /// `files` is the size of the batch the pool is built for.
    fn build(&self, config: &ExecutionConfig, files: usize) -> Result<Box<dyn PoolExecutor>, PoolError>;
}

/// The requested worker count, capped by the number of files in the batch.
pub fn pool_size(requested: NonZeroUsize, files: usize) -> NonZeroUsize {
    NonZeroUsize::new(files).map_or(NonZeroUsize::MIN, |files| requested.min(files))
}

fn rayon_pool(count: NonZeroUsize, prefix: &'static str) -> Result<rayon::ThreadPool, PoolError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(count.get())
        .thread_name(move |i| format!("{prefix}-{i}"))
        .build()
        .map_err(|e| PoolError::Build(e.to_string()))
}

/// Processes files on a pool of threads inside the server.
pub struct ThreadPool {
    pool: rayon::ThreadPool,
    processor: Arc<dyn FileProcessor>,
}

impl ThreadPool {
    pub fn new(count: NonZeroUsize, processor: Arc<dyn FileProcessor>) -> Result<Self, PoolError> {
        Ok(ThreadPool {
            pool: rayon_pool(count, "batch")?,
            processor,
        })
    }
}

impl PoolExecutor for ThreadPool {
    fn execute(&self, files: &[PathBuf]) -> Vec<FileResult> {
        let pid = std::process::id();
        let processor = &*self.processor;
        self.pool
            .install(|| files.par_iter().map(|path| process_path(processor, path, pid)).collect())
    }

    fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }
}

/// The program a process pool runs for each file. The file path is appended
/// as the last argument and a JSON [`FileResult`] is expected on stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        WorkerCommand {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// This executable's `process-file` subcommand.
    pub fn current_exe() -> io::Result<Self> {
        Ok(WorkerCommand::new(env::current_exe()?, ["process-file"]))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn run(&self, path: &Path) -> FileResult {
        let filename = display_name(path);
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => return FileResult::error(0, filename, format!("Failed to start worker: {e}")),
        };

        let pid = child.id();
        debug!(pid, file = %filename, "Worker process started");
        let output = match child.wait_with_output() {
            Ok(output) => output,
            Err(e) => return FileResult::error(pid, filename, format!("Worker failed: {e}")),
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return FileResult::error(
                pid,
                filename,
                format!("Worker exited with {}: {}", output.status, stderr.trim()),
            );
        }
        match serde_json::from_slice::<FileResult>(&output.stdout) {
            Ok(result) => result,
            Err(e) => FileResult::error(pid, filename, format!("Invalid worker output: {e}")),
        }
    }
}

/// Processes each file in its own child process, at most `count` at once.
pub struct ProcessPool {
    slots: rayon::ThreadPool,
    command: WorkerCommand,
}

impl ProcessPool {
    pub fn new(count: NonZeroUsize, command: WorkerCommand) -> Result<Self, PoolError> {
        if let Err(source) = fs::metadata(&command.program) {
            return Err(PoolError::WorkerMissing {
                program: command.program,
                source,
            });
        }
        Ok(ProcessPool {
            slots: rayon_pool(count, "forks")?,
            command,
        })
    }
}

impl PoolExecutor for ProcessPool {
    fn execute(&self, files: &[PathBuf]) -> Vec<FileResult> {
        let command = &self.command;
        self.slots
            .install(|| files.par_iter().map(|path| command.run(path)).collect())
    }

    fn workers(&self) -> usize {
        self.slots.current_num_threads()
    }
}

/// Builds a [`ThreadPool`] or a [`ProcessPool`] depending on the mode.
#[derive(Clone)]
pub struct DefaultPoolBuilder {
    processor: Arc<dyn FileProcessor>,
    worker: WorkerCommand,
}

impl DefaultPoolBuilder {
    pub fn new(processor: Arc<dyn FileProcessor>, worker: WorkerCommand) -> Self {
        DefaultPoolBuilder { processor, worker }
    }
}

impl PoolBuilder for DefaultPoolBuilder {
    fn build(&self, config: &ExecutionConfig, files: usize) -> Result<Box<dyn PoolExecutor>, PoolError> {
        let count = pool_size(config.count, files);
        if count < config.count {
            debug!(requested = config.count.get(), count = count.get(), "Pool capped to batch size");
        }
        match config.mode {
            ExecutionMode::Threads => Ok(Box::new(ThreadPool::new(count, self.processor.clone())?)),
            ExecutionMode::Processes => Ok(Box::new(ProcessPool::new(count, self.worker.clone())?)),
        }
    }
}
