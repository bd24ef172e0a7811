//! Established connections and their buffered I/O.

use crate::address::{Network, ResolvedAddr};
use redial_core::RedialError;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, ReadBuf, ReadHalf,
    WriteHalf,
};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// A connected TCP or Unix-domain stream.
#[derive(Debug)]
pub enum Stream {
    /// TCP connection.
    Tcp(TcpStream),
    /// Unix-domain connection.
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
}

impl Stream {
    /// Returns the transport of this stream.
    pub fn network(&self) -> Network {
        match self {
            Stream::Tcp(_) => Network::Tcp,
            #[cfg(unix)]
            Stream::Unix(_) => Network::Unix,
        }
    }

    /// Returns the local address as a display string.
    pub fn local_addr(&self) -> io::Result<String> {
        match self {
            Stream::Tcp(s) => s.local_addr().map(|a| a.to_string()),
            #[cfg(unix)]
            Stream::Unix(s) => s.local_addr().map(|a| unix_addr_string(&a)),
        }
    }

    /// Returns the peer address as a display string.
    pub fn peer_addr(&self) -> io::Result<String> {
        match self {
            Stream::Tcp(s) => s.peer_addr().map(|a| a.to_string()),
            #[cfg(unix)]
            Stream::Unix(s) => s.peer_addr().map(|a| unix_addr_string(&a)),
        }
    }
}

#[cfg(unix)]
fn unix_addr_string(addr: &tokio::net::unix::SocketAddr) -> String {
    match addr.as_pathname() {
        Some(path) => path.display().to_string(),
        None if addr.is_unnamed() => String::new(),
        None => "@".to_string(),
    }
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Description of an established connection, handed to lifecycle callbacks.
#[derive(Debug, Clone)]
pub struct ConnInfo {
    remote: ResolvedAddr,
    local_addr: String,
    peer_addr: String,
    connected_at: Instant,
}

impl ConnInfo {
    pub(crate) fn new(remote: &ResolvedAddr, stream: &Stream) -> Self {
        Self {
            remote: remote.clone(),
            local_addr: stream.local_addr().unwrap_or_default(),
            peer_addr: stream.peer_addr().unwrap_or_default(),
            connected_at: Instant::now(),
        }
    }

    /// The resolved address that was dialed.
    pub fn remote(&self) -> &ResolvedAddr {
        &self.remote
    }

    /// The transport of the connection.
    pub fn network(&self) -> Network {
        self.remote.network()
    }

    /// Local socket address, empty when the OS did not report one.
    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }

    /// Peer socket address, empty when the OS did not report one.
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// How long the connection has been established.
    pub fn uptime(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Deadlines {
    read: Option<Instant>,
    write: Option<Instant>,
}

/// The connection currently owned by a client.
///
/// Reads and writes lock separate halves so a blocked read never stalls a
/// writer. Closing cancels in-flight operations on both halves.
pub(crate) struct Active {
    info: ConnInfo,
    reader: tokio::sync::Mutex<BufReader<ReadHalf<Stream>>>,
    writer: tokio::sync::Mutex<BufWriter<WriteHalf<Stream>>>,
    deadlines: Mutex<Deadlines>,
    write_timeout: Duration,
    closed: CancellationToken,
}

impl Active {
    /// `closed` is normally a child of the client's token, so shutdown also
    /// interrupts pending reads and writes.
    pub(crate) fn new(
        stream: Stream,
        info: ConnInfo,
        write_timeout: Duration,
        closed: CancellationToken,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            info,
            reader: tokio::sync::Mutex::new(BufReader::new(read_half)),
            writer: tokio::sync::Mutex::new(BufWriter::new(write_half)),
            deadlines: Mutex::new(Deadlines::default()),
            write_timeout,
            closed,
        }
    }

    pub(crate) fn info(&self) -> &ConnInfo {
        &self.info
    }

    pub(crate) async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let deadline = self.deadlines().read;
        self.guarded(deadline, async {
            let mut reader = self.reader.lock().await;
            reader.read(buf).await
        })
        .await
    }

    pub(crate) async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let deadline = self.write_deadline();
        self.guarded(deadline, async {
            let mut writer = self.writer.lock().await;
            writer.write_all(buf).await?;
            Ok(buf.len())
        })
        .await
    }

    pub(crate) async fn flush(&self) -> io::Result<()> {
        let deadline = self.write_deadline();
        self.guarded(deadline, async {
            let mut writer = self.writer.lock().await;
            writer.flush().await
        })
        .await
    }

    /// Flushes what it can within the write timeout, then cancels pending I/O.
    pub(crate) async fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        let deadline = self.write_deadline();
        let _ = self
            .guarded(deadline, async {
                let mut writer = self.writer.lock().await;
                writer.shutdown().await
            })
            .await;
        self.closed.cancel();
    }

    pub(crate) fn set_read_deadline(&self, after: Duration) {
        self.update(|d| d.read = deadline_after(after));
    }

    pub(crate) fn set_write_deadline(&self, after: Duration) {
        self.update(|d| d.write = deadline_after(after));
    }

    pub(crate) fn set_deadline(&self, after: Duration) {
        let at = deadline_after(after);
        self.update(|d| {
            d.read = at;
            d.write = at;
        });
    }

    fn update(&self, f: impl FnOnce(&mut Deadlines)) {
        let mut deadlines = self.deadlines.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut deadlines);
    }

    fn deadlines(&self) -> Deadlines {
        *self.deadlines.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write_deadline(&self) -> Option<Instant> {
        self.deadlines().write.or_else(|| deadline_after(self.write_timeout))
    }

    async fn guarded<T, F>(&self, deadline: Option<Instant>, op: F) -> io::Result<T>
    where
        F: Future<Output = io::Result<T>>,
    {
        if self.closed.is_cancelled() {
            return Err(closed_error());
        }
        let bounded = async {
            match deadline {
                None => op.await,
                Some(at) => tokio::time::timeout_at(at.into(), op)
                    .await
                    .unwrap_or_else(|_| Err(deadline_error())),
            }
        };
        tokio::select! {
            result = bounded => result,
            _ = self.closed.cancelled() => Err(closed_error()),
        }
    }
}

/// Converts a relative duration into an absolute deadline; zero clears it.
pub(crate) fn deadline_after(after: Duration) -> Option<Instant> {
    if after.is_zero() {
        None
    } else {
        Instant::now().checked_add(after)
    }
}

pub(crate) fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, RedialError::NotConnected)
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, RedialError::Closed)
}

fn deadline_error() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "i/o deadline exceeded")
}
