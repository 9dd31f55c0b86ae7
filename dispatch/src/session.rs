use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::dispatcher::BatchDispatcher;
use crate::protocol::{ClientMessage, ConfigAck, ProtocolError, ServerMessage};
use crate::registry::ClientId;
use crate::state::ServerState;

/// Translates one client's messages into state changes and replies.
pub struct ClientSession {
    id: ClientId,
    state: Arc<ServerState>,
    dispatcher: BatchDispatcher,
}

impl ClientSession {
    pub fn new(id: ClientId, state: Arc<ServerState>, dispatcher: BatchDispatcher) -> Self {
        ClientSession { id, state, dispatcher }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Handles one raw line as read off the socket, newline included.
    pub fn handle_bytes(&self, raw: &[u8]) {
        match std::str::from_utf8(raw) {
            Ok(line) => self.handle_line(line),
            Err(err) => warn!(client = %self.id, error = %err, "Dropping line that is not UTF-8"),
        }
    }

    /// Handles one received line. Bad lines never end the session.
    pub fn handle_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match ClientMessage::decode(line) {
            Ok(message) => self.handle(message),
            Err(ProtocolError::InvalidConfig(err)) => {
                self.reply(ServerMessage::AckConfig(ConfigAck::rejected(err.to_string())));
            }
            Err(err @ ProtocolError::InvalidPayload { .. }) => {
                self.reply(ServerMessage::error(err.to_string()));
            }
            Err(err) => warn!(client = %self.id, error = %err, "Dropping message"),
        }
    }

    fn handle(&self, message: ClientMessage) {
        match message {
            ClientMessage::SetConfig(config) => {
                self.state.set_config(self.id, config);
                info!(client = %self.id, config = %config, "Configuration updated");
                self.reply(ServerMessage::AckConfig(ConfigAck::accepted(config)));
            }
            ClientMessage::Subscribe(event) => {
                if self.state.subscribe(self.id, &event) {
                    info!(client = %self.id, event = %event, "Subscribed");
                    self.reply(ServerMessage::AckSub(event));
                }
            }
            ClientMessage::Unsubscribe(event) => {
                self.state.unsubscribe(self.id, &event);
                info!(client = %self.id, event = %event, "Unsubscribed");
                self.reply(ServerMessage::AckUnsub(event));
            }
            ClientMessage::ProcessFiles { event, files } => {
                self.dispatcher.submit(self.id, &event, files);
            }
        }
    }

    fn reply(&self, message: ServerMessage) {
        self.state.send(self.id, message);
    }
}

/// Serves one connection until the peer leaves or `closing` turns true.
pub async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ServerState>,
    dispatcher: BatchDispatcher,
    mut closing: watch::Receiver<bool>,
) {
    let (reader, mut writer) = stream.into_split();
    let (outbox, mut pending) = mpsc::unbounded_channel::<ServerMessage>();

    let id = state.connect(peer, outbox);
    info!(client = %id, %peer, "Client connected");
    state.send(
        id,
        ServerMessage::Welcome {
            server_info: state.server_info().to_string(),
            client_id: id.to_string(),
        },
    );

    let writer_task = tokio::spawn(async move {
        while let Some(message) = pending.recv().await {
            let last = message == ServerMessage::ServerExit;
            let line = match message.encode() {
                Ok(line) => line,
                Err(err) => {
                    warn!(client = %id, error = %err, "Failed to encode message");
                    continue;
                }
            };
            if let Err(err) = writer.write_all(line.as_bytes()).await {
                debug!(client = %id, error = %err, "Write failed");
                break;
            }
            if last {
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    let session = ClientSession::new(id, state.clone(), dispatcher);
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        tokio::select! {
            read = reader.read_until(b'\n', &mut buf) => match read {
                Ok(0) => {
                    debug!(client = %id, "Peer closed the connection");
                    break;
                }
                Ok(_) => session.handle_bytes(&buf),
                Err(err) => {
                    debug!(client = %id, error = %err, "Read failed");
                    break;
                }
            },
            _ = closing.changed() => break,
        }
    }

    state.disconnect(id);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionConfig;
    use crate::dispatcher::DirectorySource;
    use crate::protocol::AckStatus;

    fn session() -> (ClientSession, mpsc::UnboundedReceiver<ServerMessage>) {
        let state = Arc::new(ServerState::new(ExecutionConfig::default(), "test"));
        let dispatcher = BatchDispatcher::new(state.clone(), Arc::new(DirectorySource::new("unused", "txt")));
        let (tx, rx) = mpsc::unbounded_channel();
        let id = state.connect(SocketAddr::from(([127, 0, 0, 1], 1)), tx);
        (ClientSession::new(id, state, dispatcher), rx)
    }

    #[test]
    fn rejected_config_keeps_the_previous_one() {
        let (session, mut rx) = session();
        session.handle_line(r#"{"type":"SET_CONFIG","payload":{"mode":"forks","count":-1}}"#);

        let ServerMessage::AckConfig(ack) = rx.try_recv().unwrap() else {
            panic!("expected ACK_CONFIG");
        };
        assert_eq!(ack.status, AckStatus::Error);
        assert_eq!(session.state.config(session.id()), Some(ExecutionConfig::default()));
    }

    #[test]
    fn bad_payloads_get_an_error_and_garbage_is_dropped() {
        let (session, mut rx) = session();
        session.handle_line(r#"{"type":"SUB","payload":[]}"#);
        assert!(matches!(rx.try_recv().unwrap(), ServerMessage::Error { .. }));

        session.handle_line("garbage");
        session.handle_line(r#"{"type":"NOPE"}"#);
        session.handle_line("   ");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn invalid_utf8_is_dropped() {
        let (session, mut rx) = session();
        session.handle_bytes(b"{\"type\":\"SUB\",\"payload\":\"\xff\"}\n");
        assert!(rx.try_recv().is_err());

        session.handle_bytes(b"{\"type\":\"SUB\",\"payload\":\"news\"}\r\n");
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::AckSub("news".into()));
    }

    #[test]
    fn subscribe_then_unsubscribe() {
        let (session, mut rx) = session();
        session.handle_line(r#"{"type":"SUB","payload":{"event_name":"news"}}"#);
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::AckSub("news".into()));
        assert_eq!(session.state.with_registry(|r| r.wait_queue("news")), vec![session.id()]);

        session.handle_line(r#"{"type":"UNSUB","payload":"news"}"#);
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::AckUnsub("news".into()));
        assert!(session.state.with_registry(|r| r.subscribers("news")).is_empty());
    }

    #[test]
    fn process_files_queues_a_job() {
        let (session, _rx) = session();
        session.handle_line(r#"{"type":"PROCESS_FILES","payload":{"event":"adhoc","files":["a.txt"]}}"#);
        let job = session.state.pop_job().unwrap();
        assert_eq!(job.client, session.id());
        assert_eq!(job.files, vec!["a.txt".to_string()]);
    }
}
