//! Operator commands typed on the server's standard input.

use std::fmt::Write;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task;
use tracing::{info, warn};

use crate::dispatcher::BatchDispatcher;
use crate::state::ServerState;

const HELP: &str = "\
Commands:
  add <event>      create an event
  remove <event>   delete an event with its subscribers and wait queue
  trigger <event>  hand the available files out to the waiting clients
  list             show events, subscribers, wait queues and clients
  clients          show connected clients
  status           show whether a batch is running
  exit             notify clients and stop the server
  help             show this text";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add(String),
    Remove(String),
    Trigger(String),
    List,
    Clients,
    Status,
    Exit,
    Help,
    Empty,
    /// A known command missing its argument.
    Usage(&'static str),
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Command {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        match word.to_ascii_lowercase().as_str() {
            "" => Command::Empty,
            "add" => with_event(rest, Command::Add, "add <event>"),
            "remove" => with_event(rest, Command::Remove, "remove <event>"),
            "trigger" => with_event(rest, Command::Trigger, "trigger <event>"),
            "list" => Command::List,
            "clients" => Command::Clients,
            "status" => Command::Status,
            "exit" | "quit" => Command::Exit,
            "help" => Command::Help,
            _ => Command::Unknown(word.to_string()),
        }
    }
}

fn with_event(rest: &str, make: fn(String) -> Command, usage: &'static str) -> Command {
    if rest.is_empty() {
        Command::Usage(usage)
    } else {
        make(rest.to_string())
    }
}

/// Text to show the operator, and whether the server should stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleReply {
    pub output: String,
    pub exit: bool,
}

impl ConsoleReply {
    fn text(output: impl Into<String>) -> Self {
        ConsoleReply {
            output: output.into(),
            exit: false,
        }
    }
}

#[derive(Clone)]
pub struct Console {
    state: Arc<ServerState>,
    dispatcher: BatchDispatcher,
}

impl Console {
    pub fn new(state: Arc<ServerState>, dispatcher: BatchDispatcher) -> Self {
        Console { state, dispatcher }
    }

    pub fn execute(&self, command: Command) -> ConsoleReply {
        match command {
            Command::Add(event) => {
                if self.state.add_event(&event) {
                    info!(event = %event, "Event added");
                    ConsoleReply::text(format!("Event '{event}' added."))
                } else {
                    ConsoleReply::text(format!("Event '{event}' already exists."))
                }
            }
            Command::Remove(event) => {
                if self.state.remove_event(&event) {
                    info!(event = %event, "Event removed");
                    ConsoleReply::text(format!("Event '{event}' removed."))
                } else {
                    ConsoleReply::text(format!("Event '{event}' not found."))
                }
            }
            Command::Trigger(event) => ConsoleReply::text(self.dispatcher.trigger(&event).to_string()),
            Command::List => ConsoleReply::text(format!("{}\n{}", self.events(), self.clients())),
            Command::Clients => ConsoleReply::text(self.clients()),
            Command::Status => ConsoleReply::text(self.status()),
            Command::Exit => ConsoleReply {
                output: "Shutting down...".into(),
                exit: true,
            },
            Command::Help => ConsoleReply::text(HELP),
            Command::Empty => ConsoleReply::text(""),
            Command::Usage(usage) => ConsoleReply::text(format!("Usage: {usage}")),
            Command::Unknown(word) => ConsoleReply::text(format!("Unknown command '{word}'. Type 'help'.")),
        }
    }

    /// Reads commands from `input` and prints replies to stdout until `exit`
    /// or end of input.
    pub async fn run<R>(&self, input: R) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            let reply = match Command::parse(&line) {
                // Listing the text directory blocks.
                command @ Command::Trigger(_) => {
                    let console = self.clone();
                    match task::spawn_blocking(move || console.execute(command)).await {
                        Ok(reply) => reply,
                        Err(err) => {
                            warn!(error = %err, "Trigger did not complete");
                            continue;
                        }
                    }
                }
                command => self.execute(command),
            };
            if !reply.output.is_empty() {
                println!("{}", reply.output);
            }
            if reply.exit {
                return Ok(());
            }
        }
        info!("Console input closed");
        Ok(())
    }

    fn events(&self) -> String {
        self.state.with_registry(|registry| {
            let mut out = String::from("Events:");
            let mut any = false;
            for event in registry.events() {
                any = true;
                let subscribers = join(registry.subscribers(event));
                let waiting = join(registry.wait_queue(event));
                let _ = write!(out, "\n  {event}: subscribers [{subscribers}], waiting [{waiting}]");
            }
            if !any {
                out.push_str("\n  (none)");
            }
            out
        })
    }

    fn clients(&self) -> String {
        let clients = self.state.clients();
        let mut out = format!("Connected clients: {}", clients.len());
        for client in clients {
            let _ = write!(out, "\n  {} {} {}", client.id, client.addr, client.config);
        }
        out
    }

    fn status(&self) -> String {
        let queued = self.state.pending_jobs();
        if self.state.is_executing() || queued > 0 {
            format!("Busy ({queued} batch(es) queued)")
        } else {
            "Idle".to_string()
        }
    }
}

fn join<T: std::fmt::Display>(items: Vec<T>) -> String {
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
