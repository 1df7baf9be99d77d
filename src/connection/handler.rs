//! Connection Session
//!
//! Each client connection runs its own decode-dispatch-respond loop in a
//! spawned task:
//!
//! ```text
//! ┌──────────────────────────────┐
//! │      Session Loop            │
//! │                              │
//! │  read bytes from socket      │
//! │          │                   │
//! │          ▼                   │
//! │  decode command frame        │
//! │          │                   │
//! │          ▼                   │
//! │  execute against the store   │
//! │          │                   │
//! │          ▼                   │
//! │  write reply, flush          │
//! │          │                   │
//! │     [loop back]              │
//! └──────────────────────────────┘
//! ```
//!
//! TCP is a stream, so a read may deliver half a frame or several frames
//! at once; a `BytesMut` buffer accumulates bytes and the decoder consumes
//! complete frames from its front.
//!
//! Command errors (unknown name, wrong arity, empty command) are answered
//! and the loop continues. Protocol errors are answered if the stream is
//! still writable and then close the connection. Neither ever reaches the
//! accept loop or any other connection.

use crate::commands::CommandHandler;
use crate::protocol::{decode, FrameError, Reply};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

/// Maximum size for the read buffer (64 KB)
const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn add_bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame; fatal to this connection only
    #[error("protocol error: {0}")]
    Protocol(#[from] FrameError),

    /// Client disconnected cleanly between frames
    #[error("client disconnected")]
    ClientDisconnected,

    /// Stream ended in the middle of a frame
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("buffer size limit exceeded")]
    BufferFull,

    /// Command execution panicked; reported to the client, then closed
    #[error("internal error during command execution")]
    Fault,
}

/// Handles a single client connection.
///
/// Owns the read buffer and the write half; holds no store state beyond
/// its handle to the shared command handler.
pub struct ConnectionHandler {
    /// The TCP stream for this connection
    stream: BufWriter<TcpStream>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// The command handler (shared store underneath)
    command_handler: CommandHandler,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,

    /// Server shutdown signal; interrupts a blocked read
    shutdown: broadcast::Receiver<()>,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            stats,
            shutdown,
        }
    }

    /// Runs the session until the client disconnects, a protocol error
    /// occurs, or the server shuts down.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.session_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client session ended"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    debug!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::Io(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        self.stats.connection_closed();
        result
    }

    /// The decode-dispatch-respond loop.
    async fn session_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            // Drain every complete frame already buffered (pipelining)
            loop {
                match decode(&self.buffer) {
                    Ok(Some((frame, consumed))) => {
                        let _ = self.buffer.split_to(consumed);
                        trace!(
                            client = %self.addr,
                            consumed,
                            remaining = self.buffer.len(),
                            "Decoded frame"
                        );

                        // A runtime fault in one command must never reach
                        // the listener or another connection
                        let handler = &self.command_handler;
                        let reply = match std::panic::catch_unwind(
                            std::panic::AssertUnwindSafe(|| handler.execute(frame)),
                        ) {
                            Ok(reply) => reply,
                            Err(_) => {
                                error!(client = %self.addr, "Command execution panicked");
                                let reply = Reply::error("ERR internal error");
                                let _ = self.send_reply(&reply).await;
                                return Err(ConnectionError::Fault);
                            }
                        };
                        self.stats.command_processed();
                        self.send_reply(&reply).await?;
                    }
                    Ok(None) => break, // Incomplete, need more bytes
                    Err(e) => {
                        warn!(client = %self.addr, error = %e, "Protocol error");
                        let reply = Reply::error(format!("ERR protocol error: {}", e));
                        // Best effort; the stream may already be gone
                        let _ = self.send_reply(&reply).await;
                        return Err(ConnectionError::Protocol(e));
                    }
                }
            }

            match self.read_or_shutdown().await {
                Ok(true) => {}
                Ok(false) => return Ok(()), // Server stopping
                Err(ConnectionError::UnexpectedEof) => {
                    let reply = Reply::error("ERR protocol error: unexpected end of stream");
                    let _ = self.send_reply(&reply).await;
                    return Err(ConnectionError::UnexpectedEof);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Waits for more bytes or the shutdown signal, whichever comes first.
    ///
    /// Returns `Ok(false)` when the server is shutting down.
    async fn read_or_shutdown(&mut self) -> Result<bool, ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        tokio::select! {
            _ = self.shutdown.recv() => {
                debug!(client = %self.addr, "Server shutdown, closing session");
                Ok(false)
            }
            result = self.stream.get_mut().read_buf(&mut self.buffer) => {
                let n = result?;
                if n == 0 {
                    // EOF: clean between frames, a protocol error mid-frame
                    return if self.buffer.is_empty() {
                        Err(ConnectionError::ClientDisconnected)
                    } else {
                        Err(ConnectionError::UnexpectedEof)
                    };
                }
                self.stats.add_bytes_read(n);
                trace!(client = %self.addr, bytes = n, "Read data");
                Ok(true)
            }
        }
    }

    /// Sends a reply to the client.
    async fn send_reply(&mut self, reply: &Reply) -> Result<(), ConnectionError> {
        let bytes = reply.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.add_bytes_written(bytes.len());
        trace!(client = %self.addr, bytes = bytes.len(), "Sent reply");
        Ok(())
    }
}

/// Runs a client connection to completion.
///
/// Convenience wrapper for spawning: swallows the expected ways a session
/// ends so the task result is unit.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    shutdown: broadcast::Receiver<()>,
) {
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats, shutdown);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::Io(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{shared, MemoryStore};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn create_test_server() -> (SocketAddr, Arc<ConnectionStats>, broadcast::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = shared(MemoryStore::new());
        let stats = Arc::new(ConnectionStats::new());
        let (shutdown_tx, _) = broadcast::channel(1);

        let handler = CommandHandler::new(store);
        let stats_clone = Arc::clone(&stats);
        let tx = shutdown_tx.clone();

        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let handler = handler.clone();
                let stats = Arc::clone(&stats_clone);
                let shutdown = tx.subscribe();
                tokio::spawn(handle_connection(
                    stream,
                    client_addr,
                    handler,
                    stats,
                    shutdown,
                ));
            }
        });

        (addr, stats, shutdown_tx)
    }

    async fn read_reply(client: &mut TcpStream) -> Vec<u8> {
        let mut buf = [0u8; 256];
        let n = client.read(&mut buf).await.unwrap();
        buf[..n].to_vec()
    }

    #[tokio::test]
    async fn test_set_get() {
        let (addr, _, _tx) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nAriz\r\n")
            .await
            .unwrap();
        assert_eq!(read_reply(&mut client).await, b"+OK\r\n");

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
            .await
            .unwrap();
        assert_eq!(read_reply(&mut client).await, b"$4\r\nAriz\r\n");
    }

    #[tokio::test]
    async fn test_get_missing_returns_nil() {
        let (addr, _, _tx) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$7\r\nmissing\r\n")
            .await
            .unwrap();
        assert_eq!(read_reply(&mut client).await, b"$-1\r\n");
    }

    #[tokio::test]
    async fn test_unknown_command_keeps_connection_usable() {
        let (addr, _, _tx) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"*1\r\n$6\r\nFOOBAR\r\n").await.unwrap();
        let reply = read_reply(&mut client).await;
        assert!(reply.starts_with(b"-ERR unknown command"));

        // The same connection still serves valid commands
        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n")
            .await
            .unwrap();
        assert_eq!(read_reply(&mut client).await, b"+OK\r\n");
    }

    #[tokio::test]
    async fn test_empty_command_keeps_connection_usable() {
        let (addr, _, _tx) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"*0\r\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, b"-ERR empty command\r\n");

        client
            .write_all(b"*2\r\n$6\r\nEXISTS\r\n$1\r\nk\r\n")
            .await
            .unwrap();
        assert_eq!(read_reply(&mut client).await, b":0\r\n");
    }

    #[tokio::test]
    async fn test_bad_header_closes_connection() {
        let (addr, _, _tx) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"+PING\r\n").await.unwrap();
        let reply = read_reply(&mut client).await;
        assert!(reply.starts_with(b"-ERR protocol error"));

        // Server closed its end; the next read reports EOF
        let mut buf = [0u8; 16];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_truncated_payload_is_protocol_error() {
        let (addr, _, _tx) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        // Bulk header declares 5 bytes, client sends 2 and hangs up
        client.write_all(b"*1\r\n$5\r\nab").await.unwrap();
        client.shutdown().await.unwrap();

        let mut collected = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            match client.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => collected.extend_from_slice(&buf[..n]),
            }
        }
        assert!(collected.starts_with(b"-ERR protocol error"));
    }

    #[tokio::test]
    async fn test_pipelined_commands() {
        let (addr, _, _tx) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$2\r\nk1\r\n$2\r\nv1\r\n*3\r\n$3\r\nSET\r\n$2\r\nk2\r\n$2\r\nv2\r\n*2\r\n$3\r\nGET\r\n$2\r\nk1\r\n")
            .await
            .unwrap();

        let mut collected = Vec::new();
        let mut buf = [0u8; 256];
        // Expected: +OK\r\n+OK\r\n$2\r\nv1\r\n (18 bytes)
        while collected.len() < 18 {
            let n = client.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
        }
        assert_eq!(collected, b"+OK\r\n+OK\r\n$2\r\nv1\r\n");
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let (addr, stats, _tx) = create_test_server().await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n")
            .await
            .unwrap();
        let _ = read_reply(&mut client).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);
        assert!(stats.commands_processed.load(Ordering::Relaxed) >= 1);
        assert!(stats.bytes_read.load(Ordering::Relaxed) > 0);
        assert!(stats.bytes_written.load(Ordering::Relaxed) > 0);

        drop(client);
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_idle_connection() {
        let (addr, stats, tx) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n")
            .await
            .unwrap();
        assert_eq!(read_reply(&mut client).await, b"+OK\r\n");

        // The session sits in a blocked read; the broadcast wakes it up
        tx.send(()).unwrap();
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }
}
