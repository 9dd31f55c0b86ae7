use std::fs;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use dispatch::{
    AckStatus, BatchStatus, ClientMessage, Command, DefaultPoolBuilder, ExecutionConfig, FileStatus, Server,
    ServerConfig, ServerMessage, ServerState, TextExtractor, WorkerCommand,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Client {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Client {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn send(&mut self, message: ClientMessage) {
        self.send_raw(&message.encode()).await;
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
    }

    async fn send_bytes(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    async fn recv(&mut self) -> Option<ServerMessage> {
        let line = timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("timed out waiting for the server")
            .unwrap()?;
        Some(ServerMessage::decode(&line).unwrap())
    }
}

struct Running {
    addr: SocketAddr,
    state: Arc<ServerState>,
    console: dispatch::Console,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
    _dir: tempfile::TempDir,
}

async fn start(files: &[(&str, &str)]) -> Running {
    let dir = tempfile::tempdir().unwrap();
    for (name, text) in files {
        fs::write(dir.path().join(name), text).unwrap();
    }
    let config = ServerConfig {
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        text_dir: dir.path().to_path_buf(),
        server_info: "test server".into(),
        ..Default::default()
    };
    let pools = Arc::new(DefaultPoolBuilder::new(
        Arc::new(TextExtractor),
        WorkerCommand::new("/definitely/not/a/worker", Vec::<String>::new()),
    ));

    let server = Server::bind(&config, pools).await.unwrap();
    let addr = server.local_addr().unwrap();
    let state = server.state().clone();
    let console = server.console();
    let (stop, stopped) = oneshot::channel();
    let handle = tokio::spawn(async move {
        server
            .run(async move {
                let _ = stopped.await;
            })
            .await
            .unwrap();
    });

    Running {
        addr,
        state,
        console,
        stop,
        handle,
        _dir: dir,
    }
}

#[tokio::test]
async fn subscribe_trigger_and_receive_results() {
    let server = start(&[("a.txt", "mail me at a@example.com"), ("b.txt", "due 2024-01-31")]).await;
    let mut client = Client::connect(server.addr).await;

    let Some(ServerMessage::Welcome { server_info, client_id }) = client.recv().await else {
        panic!("expected WELCOME");
    };
    assert_eq!(server_info, "test server");
    assert_eq!(client_id, "client-1");

    let config = ExecutionConfig::threads(NonZeroUsize::new(2).unwrap());
    client.send(ClientMessage::SetConfig(config)).await;
    let Some(ServerMessage::AckConfig(ack)) = client.recv().await else {
        panic!("expected ACK_CONFIG");
    };
    assert_eq!(ack.status, AckStatus::Success);
    assert_eq!(ack.config, Some(config));

    client.send(ClientMessage::Subscribe("news".into())).await;
    assert_eq!(client.recv().await, Some(ServerMessage::AckSub("news".into())));

    let reply = server.console.execute(Command::Trigger("news".into()));
    assert!(reply.output.contains("2 file(s) across 1 client(s)"), "{}", reply.output);

    assert_eq!(
        client.recv().await,
        Some(ServerMessage::StartProcessing {
            event: "news".into(),
            files: vec!["a.txt".into(), "b.txt".into()]
        })
    );
    let Some(ServerMessage::ProcessingComplete(report)) = client.recv().await else {
        panic!("expected PROCESSING_COMPLETE");
    };
    assert_eq!(report.status, BatchStatus::Success);
    assert_eq!(report.results.len(), 2);
    assert!(report.results.iter().all(|r| r.status == FileStatus::Success));
    assert_eq!(report.results[0].data.categories["emails"], vec!["a@example.com".to_string()]);
    assert_eq!(report.results[1].data.categories["dates"], vec!["2024-01-31".to_string()]);

    server.stop.send(()).unwrap();
    assert_eq!(client.recv().await, Some(ServerMessage::ServerExit));
    assert_eq!(client.recv().await, None);
    server.handle.await.unwrap();
}

#[tokio::test]
async fn bad_messages_do_not_end_the_session() {
    let server = start(&[]).await;
    let mut client = Client::connect(server.addr).await;
    assert!(matches!(client.recv().await, Some(ServerMessage::Welcome { .. })));

    client.send_raw("this is not json\n").await;
    client.send_raw("{\"type\":\"SET_CONFIG\",\"payload\":{\"mode\":\"fibers\",\"count\":1}}\n").await;
    let Some(ServerMessage::AckConfig(ack)) = client.recv().await else {
        panic!("expected ACK_CONFIG");
    };
    assert_eq!(ack.status, AckStatus::Error);

    client.send_raw("{\"type\":\"UNSUB\",\"payload\":7}\n").await;
    assert!(matches!(client.recv().await, Some(ServerMessage::Error { .. })));

    // The forks pool cannot start its worker here, so the batch fails as a whole.
    client
        .send(ClientMessage::SetConfig(ExecutionConfig::processes(NonZeroUsize::MIN)))
        .await;
    assert!(matches!(client.recv().await, Some(ServerMessage::AckConfig(_))));
    client
        .send(ClientMessage::ProcessFiles {
            event: "adhoc".into(),
            files: vec!["x.txt".into()],
        })
        .await;
    assert!(matches!(client.recv().await, Some(ServerMessage::StartProcessing { .. })));
    let Some(ServerMessage::ProcessingComplete(report)) = client.recv().await else {
        panic!("expected PROCESSING_COMPLETE");
    };
    assert_eq!(report.status, BatchStatus::Failure);
    assert!(report.results.is_empty());

    server.stop.send(()).unwrap();
    server.handle.await.unwrap();
}

#[tokio::test]
async fn line_that_is_not_utf8_keeps_the_session() {
    let server = start(&[]).await;
    let mut client = Client::connect(server.addr).await;
    assert!(matches!(client.recv().await, Some(ServerMessage::Welcome { .. })));

    client.send_bytes(b"{\"type\":\"SUB\",\"payload\":\"\xff\"}\n").await;
    client.send(ClientMessage::Subscribe("news".into())).await;
    assert_eq!(client.recv().await, Some(ServerMessage::AckSub("news".into())));
    assert_eq!(server.state.clients().len(), 1);

    server.stop.send(()).unwrap();
    server.handle.await.unwrap();
}

#[tokio::test]
async fn disconnect_cleans_up_the_registry() {
    let server = start(&[("a.txt", "x")]).await;
    let mut client = Client::connect(server.addr).await;
    assert!(matches!(client.recv().await, Some(ServerMessage::Welcome { .. })));
    client.send(ClientMessage::Subscribe("news".into())).await;
    assert!(matches!(client.recv().await, Some(ServerMessage::AckSub(_))));
    assert_eq!(server.state.clients().len(), 1);

    drop(client);
    for _ in 0..100 {
        if server.state.clients().is_empty() {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert!(server.state.clients().is_empty());
    assert!(server.state.with_registry(|r| r.subscribers("news").is_empty() && r.wait_queue("news").is_empty()));

    let reply = server.console.execute(Command::Trigger("news".into()));
    assert_eq!(reply.output, "No clients waiting for 'news'.");

    server.stop.send(()).unwrap();
    server.handle.await.unwrap();
}
