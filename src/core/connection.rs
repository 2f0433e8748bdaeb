//! Client connection management
//! Each accepted socket runs a reader loop and a writer loop around a bounded outbound queue

use log::{debug, info, warn};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;

use crate::core::queue::CommandQueue;
use crate::error::{ClickerError, Result};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// One connected client
pub struct ClientSession {
    pub id: u64,
    pub peer_addr: Option<SocketAddr>,
    pub connected_at: Instant,
    alive: AtomicBool,
    outbound: mpsc::Sender<String>,
    close_signal: watch::Sender<bool>,
}

/// Receiving ends owned by the session's I/O loops
pub struct SessionChannels {
    pub outbound: mpsc::Receiver<String>,
    pub closed: watch::Receiver<bool>,
}

impl ClientSession {
    /// Create a session with the next client id and an outbound queue of `capacity` lines
    pub fn new(capacity: usize, peer_addr: Option<SocketAddr>) -> (Arc<Self>, SessionChannels) {
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity.max(1));
        let (close_tx, close_rx) = watch::channel(false);

        let session = Arc::new(Self {
            id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
            peer_addr,
            connected_at: Instant::now(),
            alive: AtomicBool::new(true),
            outbound: outbound_tx,
            close_signal: close_tx,
        });

        let channels = SessionChannels {
            outbound: outbound_rx,
            closed: close_rx,
        };
        (session, channels)
    }

    /// Start the reader and writer loops for an accepted socket.
    ///
    /// Lines read from the socket go to `input`; without a queue they are
    /// only logged. A client sending a line longer than `max_line_length`
    /// bytes is disconnected.
    pub fn spawn(
        stream: TcpStream,
        capacity: usize,
        max_line_length: usize,
        input: Option<CommandQueue>,
    ) -> Arc<Self> {
        let peer_addr = stream.peer_addr().ok();
        let (session, channels) = Self::new(capacity, peer_addr);
        let (reader, writer) = stream.into_split();

        info!("Client {} connected.", session.id);

        tokio::spawn(read_loop(
            session.clone(),
            reader,
            channels.closed.clone(),
            max_line_length,
            input,
        ));
        tokio::spawn(write_loop(
            session.clone(),
            writer,
            channels.outbound,
            channels.closed,
        ));

        session
    }

    /// True while both I/O loops are running
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Queue one line for this client without waiting
    pub fn deliver(&self, message: &str) -> Result<()> {
        if !self.is_alive() {
            return Err(ClickerError::ConnectionClosed);
        }
        match self.outbound.try_send(message.to_string()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ClickerError::QueueFull),
            Err(TrySendError::Closed(_)) => {
                // Writer is gone
                self.close();
                Err(ClickerError::ConnectionClosed)
            }
        }
    }

    /// Like `deliver`, but a full queue is only logged. The line is lost for
    /// this client only.
    pub fn try_deliver(&self, message: &str) -> bool {
        match self.deliver(message) {
            Ok(()) => true,
            Err(ClickerError::QueueFull) => {
                warn!("{} for client {}, dropping message", ClickerError::QueueFull, self.id);
                false
            }
            Err(_) => false,
        }
    }

    /// Mark the session dead and stop both loops. Only the first call has
    /// any effect; returns whether this call closed the session.
    pub fn close(&self) -> bool {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.close_signal.send_replace(true);
        info!("Client {} finished.", self.id);
        debug!("Client {} was connected for {:?}", self.id, self.connection_duration());
        true
    }

    /// Calculate the connection duration
    pub fn connection_duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl fmt::Display for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client {}", self.id)
    }
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("alive", &self.is_alive())
            .finish()
    }
}

async fn read_loop(
    session: Arc<ClientSession>,
    reader: OwnedReadHalf,
    mut closed: watch::Receiver<bool>,
    max_line_length: usize,
    input: Option<CommandQueue>,
) {
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    // Room for the longest accepted line and its "\r\n"
    let limit = max_line_length as u64 + 2;

    loop {
        line.clear();
        let read = tokio::select! {
            result = read_bounded_line(&mut reader, &mut line, limit) => result,
            _ = closed.wait_for(|closed| *closed) => break,
        };

        match read {
            Ok(0) => {
                debug!("Client {} reached end of stream", session.id);
                break;
            }
            Ok(n) if n as u64 >= limit && !line.ends_with('\n') => {
                warn!(
                    "Client {} sent a line over {} bytes, disconnecting",
                    session.id, max_line_length
                );
                break;
            }
            Ok(_) => {
                let message = line.trim_end_matches(&['\r', '\n'][..]);
                if message.is_empty() {
                    continue;
                }
                match &input {
                    Some(queue) => {
                        queue.push(message, Some(session.clone()));
                    }
                    None => info!("INPUT: {}, client: {}", message, session.id),
                }
            }
            Err(e) => {
                warn!("Read error on client {}: {}", session.id, e);
                break;
            }
        }
    }

    session.close();
}

/// `read_line` that stops after `limit` bytes even without a newline
async fn read_bounded_line<R>(reader: &mut R, line: &mut String, limit: u64) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut bounded = (&mut *reader).take(limit);
    bounded.read_line(line).await
}

async fn write_loop(
    session: Arc<ClientSession>,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<String>,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        let next = tokio::select! {
            message = outbound.recv() => message,
            _ = closed.wait_for(|closed| *closed) => None,
        };

        let Some(message) = next else { break };

        if let Err(e) = write_line(&mut writer, &message).await {
            debug!("Write to client {} failed: {}", session.id, e);
            break;
        }
    }

    let _ = writer.shutdown().await;
    session.close();
}

async fn write_line(writer: &mut OwnedWriteHalf, message: &str) -> std::io::Result<()> {
    writer.write_all(message.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (server, client)
    }

    async fn wait_until_dead(session: &ClientSession) {
        timeout(Duration::from_secs(5), async {
            while session.is_alive() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session never died");
    }

    #[test]
    fn test_ids_are_monotonic() {
        let (first, _a) = ClientSession::new(4, None);
        let (second, _b) = ClientSession::new(4, None);
        assert!(second.id > first.id);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (session, channels) = ClientSession::new(4, None);
        assert!(session.close());
        assert!(!session.close());
        assert!(!session.is_alive());
        assert!(*channels.closed.borrow());
    }

    #[test]
    fn test_full_outbound_queue_drops() {
        let (session, mut channels) = ClientSession::new(1, None);
        assert!(session.try_deliver("first"));
        assert!(!session.try_deliver("second"));
        assert_eq!(channels.outbound.try_recv().unwrap(), "first");
        // The session survives an overflow
        assert!(session.is_alive());
    }

    #[test]
    fn test_writer_gone_closes_session() {
        let (session, channels) = ClientSession::new(1, None);
        drop(channels);
        assert!(!session.try_deliver("line"));
        assert!(!session.is_alive());
    }

    #[test]
    fn test_deliver_reports_why_a_line_was_lost() {
        let (session, _channels) = ClientSession::new(1, None);
        assert!(session.deliver("first").is_ok());
        assert!(matches!(session.deliver("second"), Err(ClickerError::QueueFull)));

        session.close();
        assert!(matches!(session.deliver("third"), Err(ClickerError::ConnectionClosed)));
        assert!(session.connection_duration() <= session.connected_at.elapsed());
    }

    #[tokio::test]
    async fn test_writer_preserves_order() {
        let (server, mut client) = socket_pair().await;
        let session = ClientSession::spawn(server, 16, 1024, None);

        for line in ["one", "two", "three"] {
            assert!(session.try_deliver(line));
        }

        let mut buf = vec![0u8; 14];
        timeout(Duration::from_secs(5), client.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(buf, b"one\ntwo\nthree\n");
    }

    #[tokio::test]
    async fn test_reader_tags_input_with_origin() {
        let (server, mut client) = socket_pair().await;
        let (queue, mut rx) = CommandQueue::bounded(8);
        let session = ClientSession::spawn(server, 16, 1024, Some(queue));

        client.write_all(b"{\"command\":\"ping\"}\r\n\n").await.unwrap();

        let cmd = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(cmd.message, "{\"command\":\"ping\"}");
        assert_eq!(cmd.origin.map(|s| s.id), Some(session.id));
    }

    #[tokio::test]
    async fn test_peer_disconnect_kills_session() {
        let (server, client) = socket_pair().await;
        let session = ClientSession::spawn(server, 16, 1024, None);

        drop(client);
        wait_until_dead(&session).await;
        assert!(!session.try_deliver("too late"));
    }

    #[tokio::test]
    async fn test_close_releases_socket() {
        let (server, mut client) = socket_pair().await;
        let session = ClientSession::spawn(server, 16, 1024, None);

        session.close();

        let mut buf = [0u8; 8];
        let read = timeout(Duration::from_secs(5), client.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read, 0);
    }

    #[tokio::test]
    async fn test_unterminated_oversized_line_disconnects() {
        let (server, mut client) = socket_pair().await;
        let (queue, mut rx) = CommandQueue::bounded(8);
        let session = ClientSession::spawn(server, 16, 64, Some(queue));

        // Never sends a newline
        client.write_all(&[b'a'; 4096]).await.unwrap();

        wait_until_dead(&session).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_line_at_the_limit_is_accepted() {
        let (server, mut client) = socket_pair().await;
        let (queue, mut rx) = CommandQueue::bounded(8);
        let session = ClientSession::spawn(server, 16, 8, Some(queue));

        client.write_all(b"12345678\r\n").await.unwrap();

        let cmd = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(cmd.message, "12345678");
        assert!(session.is_alive());
    }
}
