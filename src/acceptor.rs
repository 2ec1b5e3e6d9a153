//! TLS session acceptor.
//!
//! Listens for inbound agent connections, performs the shared-secret line
//! handshake, and binds accepted sessions to the clients whose address
//! matches the peer. The accept loop survives per-connection failures;
//! only certificate problems at startup are fatal.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::fleet::Fleet;
use crate::session::{AgentSession, TlsSession};

/// Upper bound on the handshake line; anything longer is not a secret.
const MAX_HANDSHAKE_LINE: usize = 1024;

/// Load the server certificate chain and private key.
///
/// Missing or invalid key material is a startup-fatal error.
pub fn load_tls_config(cert_file: &str, key_file: &str) -> anyhow::Result<Arc<rustls::ServerConfig>> {
    let certs = load_certs(Path::new(cert_file))
        .with_context(|| format!("error loading certificate from {cert_file}"))?;
    let key = load_key(Path::new(key_file))
        .with_context(|| format!("error loading private key from {key_file}"))?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("error building TLS config")?;

    Ok(Arc::new(config))
}

fn load_certs(path: &Path) -> io::Result<Vec<rustls::pki_types::CertificateDer<'static>>> {
    rustls_pemfile::certs(&mut BufReader::new(File::open(path)?)).collect()
}

fn load_key(path: &Path) -> io::Result<rustls::pki_types::PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut BufReader::new(File::open(path)?))?
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no private key found"))
}

pub struct SessionAcceptor {
    fleet: Arc<Fleet>,
    password: Arc<str>,
}

impl SessionAcceptor {
    pub fn new(fleet: Arc<Fleet>, password: String) -> Self {
        Self {
            fleet,
            password: password.into(),
        }
    }

    /// Accept agent connections until shutdown. Each connection gets its own
    /// task; accept errors are logged and the loop continues.
    pub async fn run(
        self,
        listener: TcpListener,
        tls: Arc<rustls::ServerConfig>,
        shutdown: CancellationToken,
    ) {
        let acceptor = TlsAcceptor::from(tls);
        info!("waiting for agents");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            error!("error accepting connection: {err}");
                            continue;
                        }
                    };
                    info!("agent connecting from {peer}");

                    let acceptor = acceptor.clone();
                    let fleet = self.fleet.clone();
                    let password = self.password.clone();
                    tokio::spawn(async move {
                        let mut stream = match acceptor.accept(socket).await {
                            Ok(stream) => stream,
                            Err(err) => {
                                warn!("tls handshake with {peer} failed: {err}");
                                return;
                            }
                        };

                        match handshake(&mut stream, &password).await {
                            Ok(true) => {
                                info!("agent handshake accepted for {peer}");
                                let session: Arc<dyn AgentSession> =
                                    Arc::new(TlsSession::new(stream, peer));
                                attach_session(&fleet, &peer.ip().to_string(), session);
                            }
                            Ok(false) => {
                                info!("agent handshake declined for {peer}");
                            }
                            Err(err) => {
                                warn!("handshake with {peer} failed: {err:#}");
                            }
                        }
                    });
                }
                _ = shutdown.cancelled() => {
                    debug!("session acceptor stopping");
                    break;
                }
            }
        }
    }
}

/// Run the shared-secret exchange: one candidate line in, `accepted` or
/// `declined` out.
pub async fn handshake<S>(stream: &mut S, password: &str) -> anyhow::Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let candidate = read_line(stream)
        .await
        .context("connection disconnected")?;

    if candidate.trim() != password {
        stream.write_all(b"declined\n").await?;
        return Ok(false);
    }

    stream.write_all(b"accepted\n").await?;
    Ok(true)
}

/// Bind the session to every client whose address matches the peer IP,
/// replacing any prior session.
pub fn attach_session(fleet: &Fleet, ip: &str, session: Arc<dyn AgentSession>) {
    let mut matched = false;
    for client in fleet.snapshot() {
        if client.address() == ip {
            client.set_session(session.clone());
            matched = true;
        }
    }
    if !matched {
        warn!("no client registered for agent address {ip}");
    }
}

/// Read one `\n`-terminated line without buffering past it.
async fn read_line<S: AsyncRead + Unpin>(stream: &mut S) -> io::Result<String> {
    let mut line = Vec::new();
    loop {
        let byte = stream.read_u8().await?;
        if byte == b'\n' {
            break;
        }
        line.push(byte);
        if line.len() > MAX_HANDSHAKE_LINE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "handshake line too long",
            ));
        }
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}
