//! Dialing TCP and Unix-domain endpoints.
//!
//! [`Connector`] applies the dial timeout and TCP keep-alive from the client
//! configuration and runs the optional raw-socket hook on the freshly created
//! socket, before `connect(2)` is issued. A failing hook aborts the dial with
//! the hook's error.
//!
//! `Connector` is also a [`tower::Service`] from [`ResolvedAddr`] to
//! [`Stream`], so any other service with the same shape (a proxy dialer, a
//! test double) can be plugged into a client instead.

use crate::address::{Network, ResolvedAddr};
use crate::conn::Stream;
use redial_core::RedialError;
use futures::future::BoxFuture;
use socket2::{SockRef, TcpKeepalive};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::net::TcpSocket;
use tower::Service;

/// Hook invoked with the raw socket before it connects.
pub type SocketHook = Arc<dyn Fn(SockRef<'_>) -> io::Result<()> + Send + Sync>;

/// Type-erased dialer accepted by the client configuration.
pub type BoxConnector = tower::util::BoxCloneSyncService<ResolvedAddr, Stream, io::Error>;

/// Dials TCP and Unix-domain endpoints.
#[derive(Clone)]
pub struct Connector {
    dial_timeout: Duration,
    keep_alive: Duration,
    on_socket: Option<SocketHook>,
}

impl Connector {
    /// Creates a connector with a 2 second dial timeout and keep-alive.
    pub fn new() -> Self {
        Self {
            dial_timeout: Duration::from_secs(2),
            keep_alive: Duration::from_secs(2),
            on_socket: None,
        }
    }

    /// Sets the dial timeout. Zero disables it.
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Sets the TCP keep-alive idle time. Zero disables keep-alive.
    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Installs the raw-socket hook.
    pub fn on_socket(mut self, hook: Option<SocketHook>) -> Self {
        self.on_socket = hook;
        self
    }

    /// Dials `addr`, bounded by the dial timeout.
    pub async fn dial(&self, addr: &ResolvedAddr) -> io::Result<Stream> {
        let dial = async {
            match addr.network() {
                Network::Tcp => self.dial_tcp(addr.address()).await,
                Network::Unix => self.dial_unix(addr.address()).await,
            }
        };

        if self.dial_timeout.is_zero() {
            return dial.await;
        }
        match tokio::time::timeout(self.dial_timeout, dial).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("dial {addr} timed out after {:?}", self.dial_timeout),
            )),
        }
    }

    async fn dial_tcp(&self, address: &str) -> io::Result<Stream> {
        let mut last_err = None;
        let candidates = tokio::net::lookup_host(address)
            .await
            .map_err(|e| lookup_failed(address, e))?;
        for candidate in candidates {
            match self.connect_tcp(candidate).await {
                Ok(stream) => return Ok(Stream::Tcp(stream)),
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(%candidate, error = %e, "tcp candidate failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{address} resolved to no addresses"),
            )
        }))
    }

    async fn connect_tcp(&self, candidate: SocketAddr) -> io::Result<tokio::net::TcpStream> {
        let socket = if candidate.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        {
            let sock = SockRef::from(&socket);
            if !self.keep_alive.is_zero() {
                sock.set_tcp_keepalive(&TcpKeepalive::new().with_time(self.keep_alive))?;
            }
            self.run_hook(sock)?;
        }
        socket.connect(candidate).await
    }

    #[cfg(unix)]
    async fn dial_unix(&self, address: &str) -> io::Result<Stream> {
        use socket2::{Domain, Socket, Type};

        let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
        self.run_hook(SockRef::from(&socket))?;
        socket.set_nonblocking(true)?;
        let pending = match socket.connect(&unix_sockaddr(address)?) {
            Ok(()) => false,
            // Listener backlog is full.
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => true,
            Err(e) => return Err(e),
        };

        let stream = tokio::net::UnixStream::from_std(socket.into())?;
        stream.writable().await?;
        if let Some(e) = stream.take_error()? {
            return Err(e);
        }
        if pending {
            // Fails with NotConnected unless the connect went through after all.
            stream.peer_addr()?;
        }
        Ok(Stream::Unix(stream))
    }

    #[cfg(not(unix))]
    async fn dial_unix(&self, address: &str) -> io::Result<Stream> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("unix sockets are not supported on this platform: {address}"),
        ))
    }

    fn run_hook(&self, sock: SockRef<'_>) -> io::Result<()> {
        match &self.on_socket {
            Some(hook) => hook(sock),
            None => Ok(()),
        }
    }
}

/// Tags a resolver failure so it classifies as retryable.
///
/// getaddrinfo errors carry no usable kind, so a temporary failure (`EAI_AGAIN`)
/// and a missing name look the same.
fn lookup_failed(address: &str, err: io::Error) -> io::Error {
    io::Error::new(
        err.kind(),
        RedialError::LookupFailed {
            address: address.to_string(),
            reason: err.to_string(),
        },
    )
}

/// Builds the socket address, encoding `@name` as a Linux abstract name.
#[cfg(unix)]
fn unix_sockaddr(address: &str) -> io::Result<socket2::SockAddr> {
    match address.strip_prefix('@') {
        Some(name) => {
            let mut raw = Vec::with_capacity(name.len() + 1);
            raw.push(0u8);
            raw.extend_from_slice(name.as_bytes());
            let path = <std::ffi::OsStr as std::os::unix::ffi::OsStrExt>::from_bytes(&raw);
            socket2::SockAddr::unix(path)
        }
        None => socket2::SockAddr::unix(address),
    }
}

impl Default for Connector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("dial_timeout", &self.dial_timeout)
            .field("keep_alive", &self.keep_alive)
            .field("on_socket", &self.on_socket.is_some())
            .finish()
    }
}

impl Service<ResolvedAddr> for Connector {
    type Response = Stream;
    type Error = io::Error;
    type Future = BoxFuture<'static, io::Result<Stream>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, addr: ResolvedAddr) -> Self::Future {
        let connector = self.clone();
        Box::pin(async move { connector.dial(&addr).await })
    }
}
