use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::{self, JoinHandle};
use tracing::{error, info};

use crate::dispatcher::{BatchJob, FileSource};
use crate::pool::{PoolBuilder, PoolError};
use crate::protocol::{BatchReport, ServerMessage};
use crate::state::ServerState;

/// The single consumer of the job queue.
///
/// Jobs run one at a time in queue order under the execution lock, so no two
/// worker pools ever exist at once.
pub struct BatchWorker {
    state: Arc<ServerState>,
    pools: Arc<dyn PoolBuilder>,
    files: Arc<dyn FileSource>,
}

impl BatchWorker {
    pub fn new(state: Arc<ServerState>, pools: Arc<dyn PoolBuilder>, files: Arc<dyn FileSource>) -> Self {
        BatchWorker { state, pools, files }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Waits for work and drains the queue, forever.
    pub async fn run(self) {
        loop {
            while let Some(job) = self.state.pop_job() {
                self.execute(job).await;
            }
            self.state.wait_for_work().await;
        }
    }

    /// Runs one job and reports the outcome to its client.
    ///
    /// Returns the report, or `None` if the client was gone before the job
    /// started.
    pub async fn execute(&self, job: BatchJob) -> Option<BatchReport> {
        if !self.state.is_connected(job.client) {
            info!(client = %job.client, event = %job.event, "Client gone, batch discarded");
            return None;
        }

        let _running = self.state.lock_execution().await;
        info!(
            client = %job.client,
            event = %job.event,
            files = job.files.len(),
            config = %job.config,
            "Batch started"
        );
        self.state.send(
            job.client,
            ServerMessage::StartProcessing {
                event: job.event.clone(),
                files: job.files.clone(),
            },
        );

        let paths: Vec<PathBuf> = job.files.iter().map(|name| self.files.resolve(name)).collect();
        let pools = self.pools.clone();
        let config = job.config;
        let started = Instant::now();
        let outcome = task::spawn_blocking(move || {
            let pool = pools.build(&config, paths.len())?;
            Ok::<_, PoolError>(pool.execute(&paths))
        })
        .await;

        let report = match outcome {
            Ok(Ok(results)) => {
                let duration = started.elapsed().as_secs_f64();
                info!(client = %job.client, event = %job.event, duration, "Batch completed");
                BatchReport::completed(job.event, results, duration)
            }
            Ok(Err(err)) => {
                error!(client = %job.client, event = %job.event, error = %err, "Batch failed");
                BatchReport::failed(job.event, err.to_string())
            }
            Err(err) => {
                error!(client = %job.client, event = %job.event, error = %err, "Batch aborted");
                BatchReport::failed(job.event, format!("Batch aborted: {err}"))
            }
        };

        // Delivery to a client that left meanwhile fails quietly.
        self.state
            .send(job.client, ServerMessage::ProcessingComplete(report.clone()));
        Some(report)
    }
}
