//! Command line front end.
//!
//! ```bash
//! # Serve ./text_files on the default port, operator console on stdin
//! runner serve
//!
//! # Compare every policy over a few files on two slots
//! runner simulate --compare --slots 2 text_files/*.txt
//!
//! # Connect, subscribe to "news" and simulate the batches with round robin
//! runner client --event news --policy rr --quantum 3 --mode forks --count 4
//! ```

use std::fs;
use std::net::IpAddr;
use std::num::{NonZeroU64, NonZeroUsize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dispatch::extract::process_path;
use dispatch::{DefaultPoolBuilder, ExecutionConfig, ExecutionMode, Server, ServerConfig, TextExtractor, WorkerCommand};
use processor::workload_from_files;
use scheduler::{Pid, Policy};
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod client;
mod simulation;

use simulation::{render, SimulationConfig};

#[derive(Parser, Debug)]
#[command(name = "runner")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the dispatch server with the operator console on stdin
    Serve(ServeArgs),

    /// Simulate scheduling the given files locally
    Simulate(SimulateArgs),

    /// Connect to a server and simulate every batch it assigns
    Client(ClientArgs),

    /// Process one file and print the result as JSON
    #[command(hide = true)]
    ProcessFile { path: PathBuf },
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<IpAddr>,

    #[arg(long)]
    port: Option<u16>,

    /// Directory holding the files handed out on a trigger
    #[arg(long)]
    text_dir: Option<PathBuf>,
}

impl ServeArgs {
    fn server_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ServerConfig::default(),
        };
        if let Some(host) = self.host {
            config.listen_addr.set_ip(host);
        }
        if let Some(port) = self.port {
            config.listen_addr.set_port(port);
        }
        if let Some(dir) = &self.text_dir {
            config.text_dir = dir.clone();
        }
        Ok(config)
    }
}

#[derive(Args, Debug, Clone)]
struct SimulationArgs {
    /// fcfs, sjf, srtf, rr, hrrn or priority
    #[arg(long, default_value = "fcfs")]
    policy: String,

    /// Round robin quantum in ticks
    #[arg(long, default_value_t = scheduler::DEFAULT_QUANTUM.get())]
    quantum: u64,

    /// Number of simulated execution threads
    #[arg(long, default_value = "1")]
    slots: NonZeroUsize,
}

impl SimulationArgs {
    fn config(&self) -> Result<SimulationConfig> {
        let policy = Policy::parse(&self.policy, self.quantum)?;
        Ok(SimulationConfig::new(policy, self.slots))
    }
}

#[derive(Args, Debug)]
struct SimulateArgs {
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[command(flatten)]
    simulation: SimulationArgs,

    /// Run every policy and print only their averages
    #[arg(long)]
    compare: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Mode {
    Threads,
    Forks,
}

impl From<Mode> for ExecutionMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Threads => ExecutionMode::Threads,
            Mode::Forks => ExecutionMode::Processes,
        }
    }
}

#[derive(Args, Debug)]
struct ClientArgs {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value = "65432")]
    port: u16,

    /// Event to subscribe to, may be repeated
    #[arg(long = "event", required = true)]
    events: Vec<String>,

    /// How the server should process this client's batches
    #[arg(long, value_enum, default_value = "threads")]
    mode: Mode,

    /// Threads or processes the server uses for this client's batches
    #[arg(long, default_value = "1")]
    count: NonZeroUsize,

    /// Local copy of the server's text directory, for burst estimates
    #[arg(long, default_value = "text_files")]
    text_dir: PathBuf,

    /// Subscribe again after every completed batch
    #[arg(long)]
    resubscribe: bool,

    #[command(flatten)]
    simulation: SimulationArgs,
}

fn load_config(path: &Path) -> Result<ServerConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout belongs to the console and to the worker's JSON output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .init();

    match cli.command {
        Commands::ProcessFile { path } => process_file(&path),
        Commands::Simulate(args) => simulate(&args),
        Commands::Serve(args) => block_on(serve(args)),
        Commands::Client(args) => {
            let options = client::ClientOptions {
                host: args.host,
                port: args.port,
                execution: ExecutionConfig::new(args.mode.into(), args.count),
                events: args.events,
                text_dir: args.text_dir,
                simulation: args.simulation.config()?,
                resubscribe: args.resubscribe,
            };
            block_on(client::run(options))
        }
    }
}

/// Runs `future` on a fresh runtime. Shutdown does not wait for a console
/// read that is still blocked on stdin.
fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    let result = runtime.block_on(future);
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = args.server_config()?;
    let worker = WorkerCommand::current_exe().context("Failed to locate the worker executable")?;
    let pools = Arc::new(DefaultPoolBuilder::new(Arc::new(TextExtractor), worker));

    let server = Server::bind(&config, pools).await.context("Failed to start server")?;
    info!(
        addr = %server.local_addr()?,
        text_dir = %config.text_dir.display(),
        default = %config.default_execution,
        "Dispatch server ready"
    );
    println!("Type 'help' for the list of commands.");

    let console = server.console();
    server
        .run(async move {
            tokio::select! {
                result = console.run(BufReader::new(tokio::io::stdin())) => {
                    if let Err(err) = result {
                        warn!(error = %err, "Console input failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => info!("Interrupted"),
            }
        })
        .await?;
    Ok(())
}

fn simulate(args: &SimulateArgs) -> Result<()> {
    let processes = workload_from_files(&args.files, 0, Pid::first());
    if args.compare {
        let quantum = NonZeroU64::new(args.simulation.quantum).context("--quantum must be greater than 0")?;
        for policy in Policy::all(quantum) {
            let clock = SimulationConfig::new(policy, args.simulation.slots).run(processes.clone());
            let name = policy.to_string();
            match clock.summary() {
                Some(summary) => println!("{name:<16} {summary}"),
                None => println!("{name:<16} no processes"),
            }
        }
        return Ok(());
    }

    let clock = args.simulation.config()?.run(processes);
    print!("{}", render(&clock));
    Ok(())
}

/// Entry point of a forks-pool worker: the result goes to stdout as one
/// JSON object.
fn process_file(path: &Path) -> Result<()> {
    let result = process_path(&TextExtractor, path, std::process::id());
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

#[cfg(test)]
mod tests;
