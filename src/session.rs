//! Line-framed agent sessions.
//!
//! A probe is one request/reply exchange: the orchestrator writes a single
//! `\n`-terminated command line and reads a single `\n`-terminated reply.
//! The trait keeps the dispatch pipeline testable with scripted sessions.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{split, AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::server::TlsStream;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no live session")]
    NotConnected,

    #[error("session closed by peer")]
    Closed,

    #[error("session i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One live link to a remote agent.
///
/// Implementations serialize concurrent exchanges internally; the fleet model
/// never holds its own locks across an exchange.
#[async_trait]
pub trait AgentSession: Send + Sync {
    /// Write `line\n`, read one `\n`-terminated reply line.
    async fn exchange(&self, line: &str) -> Result<String, SessionError>;
}

struct Halves {
    reader: BufReader<ReadHalf<TlsStream<TcpStream>>>,
    writer: WriteHalf<TlsStream<TcpStream>>,
}

/// TLS-backed agent session, bound by the acceptor after a successful
/// handshake.
pub struct TlsSession {
    peer: SocketAddr,
    io: Mutex<Halves>,
}

impl TlsSession {
    pub fn new(stream: TlsStream<TcpStream>, peer: SocketAddr) -> Self {
        let (reader, writer) = split(stream);
        Self {
            peer,
            io: Mutex::new(Halves {
                reader: BufReader::new(reader),
                writer,
            }),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

#[async_trait]
impl AgentSession for TlsSession {
    async fn exchange(&self, line: &str) -> Result<String, SessionError> {
        let mut io = self.io.lock().await;

        io.writer.write_all(line.as_bytes()).await?;
        io.writer.write_all(b"\n").await?;
        io.writer.flush().await?;

        let mut reply = String::new();
        let read = io.reader.read_line(&mut reply).await?;
        if read == 0 {
            return Err(SessionError::Closed);
        }
        Ok(reply)
    }
}
