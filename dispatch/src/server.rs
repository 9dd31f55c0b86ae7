use std::fs;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::console::Console;
use crate::dispatcher::{BatchDispatcher, DirectorySource, FileSource};
use crate::pool::PoolBuilder;
use crate::protocol::ServerMessage;
use crate::session;
use crate::state::ServerState;
use crate::worker::BatchWorker;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// The TCP front end together with the worker it feeds.
pub struct Server {
    listener: TcpListener,
    state: Arc<ServerState>,
    dispatcher: BatchDispatcher,
    pools: Arc<dyn PoolBuilder>,
}

impl Server {
    /// Binds the listener and serves the files of `config.text_dir`, creating
    /// the directory if it does not exist.
    pub async fn bind(config: &ServerConfig, pools: Arc<dyn PoolBuilder>) -> Result<Server, ServerError> {
        if !config.text_dir.exists() {
            match fs::create_dir_all(&config.text_dir) {
                Ok(()) => info!(dir = %config.text_dir.display(), "Created text directory"),
                Err(err) => warn!(dir = %config.text_dir.display(), error = %err, "Could not create text directory"),
            }
        }
        let files = Arc::new(DirectorySource::new(&config.text_dir, &config.file_extension));
        Server::bind_with(config, pools, files).await
    }

    /// Like [`Server::bind`] with a custom source of files.
    pub async fn bind_with(
        config: &ServerConfig,
        pools: Arc<dyn PoolBuilder>,
        files: Arc<dyn FileSource>,
    ) -> Result<Server, ServerError> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.listen_addr,
                source,
            })?;
        let state = Arc::new(ServerState::new(config.default_execution, config.server_info.clone()));
        let dispatcher = BatchDispatcher::new(state.clone(), files);
        Ok(Server {
            listener,
            state,
            dispatcher,
            pools,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    pub fn dispatcher(&self) -> &BatchDispatcher {
        &self.dispatcher
    }

    /// The operator console for this server.
    pub fn console(&self) -> Console {
        Console::new(self.state.clone(), self.dispatcher.clone())
    }

    /// Accepts clients until `shutdown` resolves, then sends `SERVER_EXIT`
    /// to everyone and waits for the sessions to close.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<(), ServerError> {
        let Server {
            listener,
            state,
            dispatcher,
            pools,
        } = self;
        info!(addr = %listener.local_addr()?, "Server listening");

        let worker = BatchWorker::new(state.clone(), pools, dispatcher.files().clone()).spawn();
        let (closing, closed) = watch::channel(false);
        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        sessions.spawn(session::serve(
                            stream,
                            peer,
                            state.clone(),
                            dispatcher.clone(),
                            closed.clone(),
                        ));
                    }
                    Err(err) => warn!(error = %err, "Failed to accept connection"),
                },
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
            }
        }

        drop(listener);
        let notified = state.broadcast(ServerMessage::ServerExit);
        info!(clients = notified, "Server shutting down");
        let _ = closing.send(true);
        while sessions.join_next().await.is_some() {}
        worker.abort();
        Ok(())
    }
}
