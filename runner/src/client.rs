//! A headless client: subscribes to events, simulates every batch it is
//! assigned and prints what the server sends back.

use std::path::PathBuf;

use anyhow::{Context, Result};
use dispatch::{BatchReport, BatchStatus, ClientMessage, ExecutionConfig, ServerMessage};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::simulation::{BatchSimulation, SimulationConfig};

pub struct ClientOptions {
    pub host: String,
    pub port: u16,
    pub execution: ExecutionConfig,
    pub events: Vec<String>,
    /// Where the assigned files are found locally, for burst estimates.
    pub text_dir: PathBuf,
    pub simulation: SimulationConfig,
    /// Subscribe again after each completed batch.
    pub resubscribe: bool,
}

pub async fn run(options: ClientOptions) -> Result<()> {
    let stream = TcpStream::connect((options.host.as_str(), options.port))
        .await
        .with_context(|| format!("Failed to connect to {}:{}", options.host, options.port))?;
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    writer
        .write_all(ClientMessage::SetConfig(options.execution).encode().as_bytes())
        .await?;
    for event in &options.events {
        writer
            .write_all(ClientMessage::Subscribe(event.clone()).encode().as_bytes())
            .await?;
    }

    let mut simulation = BatchSimulation::new(&options.simulation);

    while let Some(line) = lines.next_line().await? {
        let message = match ServerMessage::decode(&line) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "Ignoring message from server");
                continue;
            }
        };
        match message {
            ServerMessage::Welcome { server_info, client_id } => {
                println!("Connected to {server_info} as {client_id}");
            }
            ServerMessage::AckConfig(ack) => match ack.config {
                Some(config) => println!("Server configuration: {config}"),
                None => warn!(message = ?ack.message, "Configuration rejected"),
            },
            ServerMessage::AckSub(event) => println!("Subscribed to '{event}'"),
            ServerMessage::AckUnsub(event) => println!("Unsubscribed from '{event}'"),
            ServerMessage::StartProcessing { event, files } => {
                println!("Batch for '{event}': {}", files.join(", "));
                let paths: Vec<PathBuf> = files.iter().map(|name| options.text_dir.join(name)).collect();
                print!("{}", simulation.run_batch(&paths));
            }
            ServerMessage::ProcessingComplete(report) => {
                print_report(&report);
                if options.resubscribe && options.events.contains(&report.event) {
                    debug!(event = %report.event, "Subscribing again");
                    writer
                        .write_all(ClientMessage::Subscribe(report.event.clone()).encode().as_bytes())
                        .await?;
                }
            }
            ServerMessage::Error { message } => warn!(%message, "Server reported an error"),
            ServerMessage::ServerExit => {
                println!("Server is shutting down.");
                break;
            }
        }
    }
    info!("Disconnected");
    Ok(())
}

fn print_report(report: &BatchReport) {
    match report.status {
        BatchStatus::Success => {
            let duration = report
                .duration_seconds
                .map(|secs| format!(" in {secs:.2}s"))
                .unwrap_or_default();
            println!("Batch for '{}' completed{duration}", report.event);
        }
        BatchStatus::Failure => println!("Batch for '{}' failed", report.event),
    }
    if let Some(message) = &report.message {
        println!("  {message}");
    }
    for result in &report.results {
        match &result.error {
            Some(error) => println!("  [{}] {}: {error}", result.pid_server, result.filename),
            None => {
                let found: Vec<String> = result
                    .data
                    .categories
                    .iter()
                    .map(|(category, values)| format!("{category}={}", values.len()))
                    .collect();
                println!(
                    "  [{}] {}: {} words, {}",
                    result.pid_server,
                    result.filename,
                    result.data.word_count,
                    found.join(", ")
                );
            }
        }
    }
}
