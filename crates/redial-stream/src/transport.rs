//! The byte channel a session runs over.

use futures::future::BoxFuture;
use redial_client::Client;
use redial_core::RedialError;
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_util::sync::CancellationToken;

/// A connected byte channel with deadlines.
///
/// Implemented for [`Client`], so a session opened inside `on_session` reads
/// and writes the client's active connection. [`IoTransport`] adapts any
/// tokio I/O object.
pub trait Transport: Send + Sync + 'static {
    /// Reads into `buf`, returning 0 at end of stream.
    fn read<'a>(&'a self, buf: &'a mut [u8]) -> BoxFuture<'a, io::Result<usize>>;

    /// Writes all of `buf`.
    fn write<'a>(&'a self, buf: &'a [u8]) -> BoxFuture<'a, io::Result<usize>>;

    /// Flushes buffered writes.
    fn flush(&self) -> BoxFuture<'_, io::Result<()>>;

    /// Sets the read deadline `after` from now. Zero clears it.
    fn set_read_deadline(&self, after: Duration) -> io::Result<()>;

    /// Sets the write deadline `after` from now. Zero clears it.
    fn set_write_deadline(&self, after: Duration) -> io::Result<()>;

    /// Closes the channel; pending and later I/O fails.
    fn close(&self) -> BoxFuture<'_, ()>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn read<'a>(&'a self, buf: &'a mut [u8]) -> BoxFuture<'a, io::Result<usize>> {
        (**self).read(buf)
    }

    fn write<'a>(&'a self, buf: &'a [u8]) -> BoxFuture<'a, io::Result<usize>> {
        (**self).write(buf)
    }

    fn flush(&self) -> BoxFuture<'_, io::Result<()>> {
        (**self).flush()
    }

    fn set_read_deadline(&self, after: Duration) -> io::Result<()> {
        (**self).set_read_deadline(after)
    }

    fn set_write_deadline(&self, after: Duration) -> io::Result<()> {
        (**self).set_write_deadline(after)
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        (**self).close()
    }
}

impl Transport for Client {
    fn read<'a>(&'a self, buf: &'a mut [u8]) -> BoxFuture<'a, io::Result<usize>> {
        Box::pin(Client::read(self, buf))
    }

    fn write<'a>(&'a self, buf: &'a [u8]) -> BoxFuture<'a, io::Result<usize>> {
        Box::pin(Client::write(self, buf))
    }

    fn flush(&self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(Client::flush(self))
    }

    fn set_read_deadline(&self, after: Duration) -> io::Result<()> {
        Client::set_read_deadline(self, after)
    }

    fn set_write_deadline(&self, after: Duration) -> io::Result<()> {
        Client::set_write_deadline(self, after)
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.disconnect())
    }
}

/// Transport over any tokio I/O object, such as an in-memory duplex pipe.
pub struct IoTransport<S> {
    reader: tokio::sync::Mutex<ReadHalf<S>>,
    writer: tokio::sync::Mutex<WriteHalf<S>>,
    read_deadline: Mutex<Option<Instant>>,
    write_deadline: Mutex<Option<Instant>>,
    closed: CancellationToken,
}

impl<S> IoTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wraps `io`.
    pub fn new(io: S) -> Self {
        let (reader, writer) = tokio::io::split(io);
        Self {
            reader: tokio::sync::Mutex::new(reader),
            writer: tokio::sync::Mutex::new(writer),
            read_deadline: Mutex::new(None),
            write_deadline: Mutex::new(None),
            closed: CancellationToken::new(),
        }
    }

    /// Returns `true` once [`Transport::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    async fn bounded<T, F>(&self, deadline: &Mutex<Option<Instant>>, op: F) -> io::Result<T>
    where
        F: Future<Output = io::Result<T>>,
    {
        if self.closed.is_cancelled() {
            return Err(closed());
        }
        let at = *deadline.lock().unwrap_or_else(|e| e.into_inner());
        let op = async {
            match at {
                None => op.await,
                Some(at) => tokio::time::timeout_at(at.into(), op)
                    .await
                    .unwrap_or_else(|_| Err(io::Error::from(io::ErrorKind::TimedOut))),
            }
        };
        tokio::select! {
            result = op => result,
            _ = self.closed.cancelled() => Err(closed()),
        }
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, RedialError::Closed)
}

fn set(slot: &Mutex<Option<Instant>>, after: Duration) {
    let at = if after.is_zero() {
        None
    } else {
        Instant::now().checked_add(after)
    };
    *slot.lock().unwrap_or_else(|e| e.into_inner()) = at;
}

impl<S> Transport for IoTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    fn read<'a>(&'a self, buf: &'a mut [u8]) -> BoxFuture<'a, io::Result<usize>> {
        Box::pin(self.bounded(&self.read_deadline, async move {
            self.reader.lock().await.read(buf).await
        }))
    }

    fn write<'a>(&'a self, buf: &'a [u8]) -> BoxFuture<'a, io::Result<usize>> {
        Box::pin(self.bounded(&self.write_deadline, async move {
            self.writer.lock().await.write_all(buf).await?;
            Ok(buf.len())
        }))
    }

    fn flush(&self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(self.bounded(&self.write_deadline, async move {
            self.writer.lock().await.flush().await
        }))
    }

    fn set_read_deadline(&self, after: Duration) -> io::Result<()> {
        set(&self.read_deadline, after);
        Ok(())
    }

    fn set_write_deadline(&self, after: Duration) -> io::Result<()> {
        set(&self.write_deadline, after);
        Ok(())
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.closed.is_cancelled() {
                return;
            }
            // Fails pending I/O first, so a write stuck on a full pipe
            // releases the writer.
            self.closed.cancel();

            let at = *self.write_deadline.lock().unwrap_or_else(|e| e.into_inner());
            let shutdown = async {
                let _ = self.writer.lock().await.shutdown().await;
            };
            match at {
                Some(at) => {
                    let _ = tokio::time::timeout_at(at.into(), shutdown).await;
                }
                None => shutdown.await,
            }
        })
    }
}

impl<S> std::fmt::Debug for IoTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoTransport")
            .field("closed", &self.closed.is_cancelled())
            .finish_non_exhaustive()
    }
}
