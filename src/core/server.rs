//! Listening socket, accept loop, and the wiring that starts a relay

use log::{error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::core::connection::ClientSession;
use crate::core::filter::FilterChain;
use crate::core::queue::CommandQueue;
use crate::core::session::{create_session_manager, Sessions};
use crate::core::state::{ServerState, SharedState};
use crate::error::{ClickerError, Result};
use crate::handlers::commands::CommandController;
use crate::handlers::dispatcher::Dispatcher;
use crate::handlers::poller::VotePoller;
use crate::hardware::VoteSource;

// Back-off after the process runs out of descriptors or buffers
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts client connections and registers a session for each
pub struct ClickerServer {
    listener: TcpListener,
    sessions: Sessions,
    /// Where session input goes; without one it is only logged
    input: Option<CommandQueue>,
    outbound_queue_size: usize,
    max_line_length: usize,
}

impl ClickerServer {
    /// Bind the configured address. Failure here is fatal for the process.
    pub async fn bind(
        config: &ServerConfig,
        sessions: Sessions,
        input: Option<CommandQueue>,
    ) -> Result<Self> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ClickerError::Bind(format!("{}: {}", addr, e)))?;

        info!("Successfully listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            sessions,
            input,
            outbound_queue_size: config.outbound_queue_size,
            max_line_length: config.max_message_length,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept until the listening socket becomes unusable
    pub async fn run(self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _peer)) => {
                    let session = ClientSession::spawn(
                        stream,
                        self.outbound_queue_size,
                        self.max_line_length,
                        self.input.clone(),
                    );
                    if let Err(e) = self.sessions.register(session.clone()) {
                        error!("Failed to register {}: {}", session, e);
                        session.close();
                    }
                }
                Err(e) if is_transient_accept_error(&e) => {
                    warn!("Accept failed, continuing: {}", e);
                    if is_resource_exhaustion(&e) {
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
                Err(e) => {
                    error!("Server socket accept failed: {}", e);
                    return Err(ClickerError::Accept(e.to_string()));
                }
            }
        }
    }
}

fn is_transient_accept_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
    ) || is_resource_exhaustion(err)
}

// Errno values shared by Linux and the BSDs, except ENOBUFS
const EMFILE: i32 = 24;
const ENFILE: i32 = 23;
const ENOMEM: i32 = 12;
#[cfg(target_os = "linux")]
const ENOBUFS: i32 = 105;
#[cfg(not(target_os = "linux"))]
const ENOBUFS: i32 = 55;

fn is_resource_exhaustion(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(EMFILE | ENFILE | ENOBUFS | ENOMEM))
}

/// A running relay: acceptor, dispatcher and base station poller
pub struct RelayHandle {
    pub local_addr: SocketAddr,
    pub queue: CommandQueue,
    pub state: SharedState,
    pub sessions: Sessions,
    acceptor: JoinHandle<Result<()>>,
    dispatcher: JoinHandle<()>,
    poller: JoinHandle<()>,
}

impl RelayHandle {
    /// Wait for the acceptor; it only returns when the listener fails
    pub async fn wait(self) -> Result<()> {
        let outcome = match self.acceptor.await {
            Ok(result) => result,
            Err(e) => Err(ClickerError::Accept(format!("acceptor task failed: {}", e))),
        };
        self.dispatcher.abort();
        self.poller.abort();
        outcome
    }

    pub fn abort(&self) {
        self.acceptor.abort();
        self.dispatcher.abort();
        self.poller.abort();
    }
}

/// Bind the listener and start the acceptor, dispatcher and poller tasks
pub async fn start(
    config: &ServerConfig,
    source: Arc<dyn VoteSource>,
    filters: FilterChain,
) -> Result<RelayHandle> {
    let state = SharedState::new(ServerState::new(config.instructor_id.clone()));
    let filters = filters.initialize(&state);
    let sessions = create_session_manager(filters);
    let (queue, receiver) = CommandQueue::bounded(config.command_queue_size);

    let server = ClickerServer::bind(config, sessions.clone(), Some(queue.clone())).await?;
    let local_addr = server.local_addr()?;

    let controller = CommandController::new(state.clone(), sessions.clone());
    let dispatcher = Dispatcher::new(controller, receiver).spawn();
    let poller = VotePoller::new(source, queue.clone(), state.clone(), config.poll_interval).spawn();
    let acceptor = tokio::spawn(server.run());

    Ok(RelayHandle {
        local_addr,
        queue,
        state,
        sessions,
        acceptor,
        dispatcher,
        poller,
    })
}
