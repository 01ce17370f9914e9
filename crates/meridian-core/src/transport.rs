//! Transport abstraction for daemon RPC.
//!
//! Daemons listen on either a Unix socket (single-machine deployments, the
//! default) or a TCP port (when the pilot runs on a different host from the
//! hardware daemons). Callers hold a [`Transport`] from the registry and
//! dial it fresh for every request.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UnixStream};

/// Errors that can occur during transport operations.
#[derive(Error, Debug)]
pub enum TransportError {
    /// I/O error from the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection was refused by the remote endpoint.
    ///
    /// For a daemon endpoint this usually means the process is not running.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// The socket path does not exist.
    #[error("socket not found: {0}")]
    SocketNotFound(String),
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// A daemon endpoint: either a Unix socket path or a TCP address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Transport {
    /// Unix domain socket transport.
    Unix { path: PathBuf },
    /// TCP transport.
    Tcp { addr: SocketAddr },
}

impl Transport {
    /// Creates a Unix socket transport.
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Creates a TCP transport.
    #[must_use]
    pub const fn tcp(addr: SocketAddr) -> Self {
        Self::Tcp { addr }
    }

    /// Binds to the endpoint and returns a listener.
    ///
    /// For Unix sockets a stale socket file is removed first, so a daemon
    /// that crashed without cleanup can rebind.
    pub async fn bind(&self) -> Result<Box<dyn Listener>> {
        match self {
            Self::Unix { path } => Ok(Box::new(BoundUnixListener::bind(path)?)),
            Self::Tcp { addr } => {
                let inner = tokio::net::TcpListener::bind(*addr).await?;
                Ok(Box::new(BoundTcpListener { inner }))
            }
        }
    }

    /// Dials the endpoint.
    pub async fn connect(&self) -> Result<Box<dyn Connection>> {
        match self {
            Self::Unix { path } => {
                if !path.exists() {
                    return Err(TransportError::SocketNotFound(path.display().to_string()));
                }
                let stream = UnixStream::connect(path)
                    .await
                    .map_err(|e| refused(e, || path.display().to_string()))?;
                Ok(Box::new(Stream(stream)))
            }
            Self::Tcp { addr } => {
                let stream = TcpStream::connect(*addr)
                    .await
                    .map_err(|e| refused(e, || addr.to_string()))?;
                Ok(Box::new(Stream(stream)))
            }
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unix { path } => write!(f, "unix://{}", path.display()),
            Self::Tcp { addr } => write!(f, "tcp://{addr}"),
        }
    }
}

fn refused(e: std::io::Error, endpoint: impl FnOnce() -> String) -> TransportError {
    if e.kind() == std::io::ErrorKind::ConnectionRefused {
        TransportError::ConnectionRefused(endpoint())
    } else {
        TransportError::Io(e)
    }
}

/// A listener that accepts incoming connections.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Accepts a new incoming connection.
    async fn accept(&self) -> Result<Box<dyn Connection>>;

    /// Returns the local address this listener is bound to.
    fn local_addr(&self) -> Result<String>;
}

/// A bidirectional connection carrying framed protocol messages.
pub trait Connection: AsyncRead + AsyncWrite + Send + Sync + Unpin {}

/// Wrapper making a tokio stream a [`Connection`].
struct Stream<S>(S);

impl<S: AsyncRead + AsyncWrite + Send + Sync + Unpin> Connection for Stream<S> {}

impl<S: AsyncRead + Unpin> AsyncRead for Stream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Stream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

struct BoundTcpListener {
    inner: tokio::net::TcpListener,
}

#[async_trait]
impl Listener for BoundTcpListener {
    async fn accept(&self) -> Result<Box<dyn Connection>> {
        let (stream, _addr) = self.inner.accept().await?;
        Ok(Box::new(Stream(stream)))
    }

    fn local_addr(&self) -> Result<String> {
        Ok(self.inner.local_addr()?.to_string())
    }
}

struct BoundUnixListener {
    inner: tokio::net::UnixListener,
    path: PathBuf,
}

impl BoundUnixListener {
    fn bind(path: &Path) -> Result<Self> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let inner = tokio::net::UnixListener::bind(path)?;
        Ok(Self {
            inner,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for BoundUnixListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[async_trait]
impl Listener for BoundUnixListener {
    async fn accept(&self) -> Result<Box<dyn Connection>> {
        let (stream, _addr) = self.inner.accept().await?;
        Ok(Box::new(Stream(stream)))
    }

    fn local_addr(&self) -> Result<String> {
        Ok(format!("unix://{}", self.path.display()))
    }
}
