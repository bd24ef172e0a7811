//! The reconnecting client and its dial loop.

use crate::address::ResolvedAddr;
use crate::config::Config;
use crate::conn::{not_connected, Active, ConnInfo, Stream};
use crate::events::ClientEvent;
use crate::group::{panic_message, TaskGroup};
use crate::state::{ClientState, ConnectionState};
use redial_core::classify::Verdict;
use redial_core::{BoxError, RedialError, SharedError};
use futures::FutureExt;
use std::future::Future;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

#[cfg(feature = "metrics")]
use metrics::{counter, gauge, histogram};

/// A client that keeps a connection to one remote alive.
///
/// Cloning is cheap; every clone drives the same connection. Callbacks
/// receive a clone so sessions can read, write and spawn supervised tasks.
///
/// ```no_run
/// use redial_client::{Client, Config};
/// use redial_core::BoxError;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::builder("localhost:7000")
///     .on_session(|client: Client| async move {
///         let mut buf = [0u8; 1024];
///         loop {
///             let n = client.read(&mut buf).await?;
///             if n == 0 {
///                 break;
///             }
///             client.write(&buf[..n]).await?;
///             client.flush().await?;
///         }
///         // Peer hung up; reconnect.
///         Err::<(), BoxError>(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into())
///     })
///     .build();
///
/// let client = Client::new(Arc::new(config))?;
/// client.connect()?;
/// client.shutdown(Duration::from_secs(5)).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<Config>,
    remote: ResolvedAddr,
    group: TaskGroup,
    state: ClientState,
    started: AtomicBool,
    active: Mutex<Option<Arc<Active>>>,
}

/// What the loop does after a dial or a session ends.
enum Next {
    Retry(String),
    Stop(Option<BoxError>),
}

impl Client {
    /// Binds `config` to a new client.
    ///
    /// Fails with an address error when the remote cannot be resolved and with
    /// [`RedialError::ConfigBusy`] when `config` was already bound to a client.
    /// A config binds once for its whole life, even after that client drops.
    pub fn new(config: Arc<Config>) -> Result<Self, RedialError> {
        let remote = config.resolved()?.clone();
        config.bind()?;
        let group = TaskGroup::with_classifier(config.classifier);

        #[cfg(feature = "tracing")]
        tracing::debug!(client = %config.name, %remote, "client created");

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                remote,
                group,
                state: ClientState::new(),
                started: AtomicBool::new(false),
                active: Mutex::new(None),
            }),
        })
    }

    /// Starts the dial loop in the background.
    ///
    /// Returns [`RedialError::Running`] on every call after the first and
    /// [`RedialError::AbnormalConnect`] when the client was shut down before it
    /// was started.
    pub fn connect(&self) -> Result<(), RedialError> {
        if self
            .inner
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RedialError::Running);
        }
        if self.inner.group.is_terminated() {
            return Err(RedialError::AbnormalConnect);
        }

        let client = self.clone();
        self.inner.group.go(async move {
            client.run().await;
            Ok(())
        });
        Ok(())
    }

    /// Cancels the client and waits up to `timeout` for its tasks to finish.
    ///
    /// A session blocked outside the client's own I/O is not interrupted; if it
    /// does not return in time, [`RedialError::ShutdownTimedOut`] is returned.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), RedialError> {
        #[cfg(feature = "tracing")]
        tracing::debug!(client = %self.inner.config.name, ?timeout, "shutdown requested");

        self.inner.group.shutdown(timeout).await
    }

    /// Waits until the client has terminated and all its tasks have finished.
    ///
    /// Stops requested by the caller (shutdown, [`RedialError::DoNotReconnect`],
    /// a session returning `Ok`) are reported as `Ok(())`.
    pub async fn wait(&self) -> Result<(), SharedError> {
        self.inner.group.wait().await
    }

    /// Returns the terminal error, if the client has stopped with one.
    pub fn err(&self) -> Option<SharedError> {
        self.inner.group.err()
    }

    /// Returns the client's cancellation token.
    pub fn token(&self) -> &CancellationToken {
        self.inner.group.token()
    }

    /// Resolves once the client has terminated.
    pub async fn cancelled(&self) {
        self.inner.group.cancelled().await
    }

    /// Returns the task group supervising the loop and session tasks.
    pub fn tasks(&self) -> &TaskGroup {
        &self.inner.group
    }

    /// Spawns a supervised task tied to this client's lifetime.
    pub fn go<F>(&self, fut: F)
    where
        F: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.inner.group.go(fut)
    }

    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state.state()
    }

    /// Returns the number of consecutive failed attempts.
    pub fn attempts(&self) -> u32 {
        self.inner.state.attempts()
    }

    /// Returns the number of successful connections so far.
    pub fn connections(&self) -> u32 {
        self.inner.state.connections()
    }

    /// Returns the resolved remote address.
    pub fn remote(&self) -> &ResolvedAddr {
        &self.inner.remote
    }

    /// Returns the configuration bound to this client.
    pub fn config(&self) -> &Arc<Config> {
        &self.inner.config
    }

    /// Returns `true` while a connection is active.
    pub fn is_connected(&self) -> bool {
        self.lock_active().is_some()
    }

    /// Returns information about the active connection.
    pub fn conn_info(&self) -> Option<ConnInfo> {
        self.lock_active().as_ref().map(|active| active.info().clone())
    }

    /// Returns the local address of the active connection.
    pub fn local_addr(&self) -> io::Result<String> {
        Ok(self.active()?.info().local_addr().to_string())
    }

    /// Returns the peer address of the active connection.
    pub fn peer_addr(&self) -> io::Result<String> {
        Ok(self.active()?.info().peer_addr().to_string())
    }

    /// Reads from the active connection.
    ///
    /// Bounded only by a read deadline set with [`Client::set_read_deadline`].
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.active()?.read(buf).await
    }

    /// Writes all of `buf` into the connection's write buffer.
    ///
    /// Data reaches the peer once the buffer fills up or on [`Client::flush`].
    pub async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.active()?.write(buf).await
    }

    /// Flushes buffered writes to the peer.
    pub async fn flush(&self) -> io::Result<()> {
        self.active()?.flush().await
    }

    /// Sets both deadlines `after` from now. Zero clears them.
    pub fn set_deadline(&self, after: Duration) -> io::Result<()> {
        self.active()?.set_deadline(after);
        Ok(())
    }

    /// Sets the read deadline `after` from now. Zero clears it.
    pub fn set_read_deadline(&self, after: Duration) -> io::Result<()> {
        self.active()?.set_read_deadline(after);
        Ok(())
    }

    /// Sets the write deadline `after` from now. Zero clears it, falling back
    /// to the configured write timeout.
    pub fn set_write_deadline(&self, after: Duration) -> io::Result<()> {
        self.active()?.set_write_deadline(after);
        Ok(())
    }

    /// Closes the active connection without stopping the client.
    ///
    /// Pending and later I/O on the connection fails with
    /// [`RedialError::Closed`]; the session is expected to return so the loop
    /// can redial.
    pub async fn disconnect(&self) {
        let active = self.lock_active().clone();
        if let Some(active) = active {
            active.close().await;
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<Arc<Active>>> {
        self.inner.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn active(&self) -> io::Result<Arc<Active>> {
        self.lock_active().clone().ok_or_else(not_connected)
    }

    fn replace_active(&self, next: Option<Arc<Active>>) -> Option<Arc<Active>> {
        std::mem::replace(&mut *self.lock_active(), next)
    }

    async fn run(&self) {
        let config = Arc::clone(&self.inner.config);
        let token = self.token().clone();

        loop {
            if token.is_cancelled() {
                self.finish(Some(RedialError::Cancelled.boxed()));
                return;
            }

            self.set_state(ConnectionState::Connecting);
            let (info, outcome) = match self.dial(&token).await {
                Ok(stream) => self.serve(stream).await,
                Err(err) => (None, Err(err)),
            };

            match self.judge(info.as_ref(), outcome) {
                Next::Stop(cause) => {
                    self.finish(cause);
                    return;
                }
                Next::Retry(error) => {
                    if token.is_cancelled() {
                        self.finish(Some(RedialError::Cancelled.boxed()));
                        return;
                    }
                    let attempt = self.inner.state.increment_attempts();
                    self.set_state(ConnectionState::Disconnected);

                    #[cfg(feature = "tracing")]
                    tracing::debug!(client = %config.name, attempt, %error, "reconnecting");

                    config.emit(ClientEvent::Reconnecting {
                        name: config.name.clone(),
                        timestamp: Instant::now(),
                        attempt,
                        error,
                    });

                    if let Err(veto) = config.waiter.wait(attempt, &token).await {
                        self.finish(Some(veto));
                        return;
                    }
                }
            }
        }
    }

    async fn dial(&self, token: &CancellationToken) -> Result<Stream, BoxError> {
        let config = &self.inner.config;
        let remote = &self.inner.remote;

        #[cfg(feature = "tracing")]
        tracing::trace!(client = %config.name, %remote, "dialing");

        #[cfg(feature = "metrics")]
        counter!("redial_dial_attempts_total", "client" => config.name.clone()).increment(1);

        config.emit(ClientEvent::Dialing {
            name: config.name.clone(),
            timestamp: Instant::now(),
            remote: remote.to_string(),
            attempt: self.inner.state.attempts().saturating_add(1),
        });

        let dialed = tokio::select! {
            _ = token.cancelled() => return Err(RedialError::Cancelled.boxed()),
            result = config.connector.clone().oneshot(remote.clone()) => result,
        };

        dialed.map_err(|err| {
            #[cfg(feature = "tracing")]
            tracing::debug!(client = %config.name, %remote, error = %err, "dial failed");

            #[cfg(feature = "metrics")]
            counter!("redial_dial_failures_total", "client" => config.name.clone()).increment(1);

            err.into()
        })
    }

    /// Runs the handshake and the session over one established connection.
    async fn serve(&self, mut stream: Stream) -> (Option<ConnInfo>, Result<(), BoxError>) {
        let config = Arc::clone(&self.inner.config);
        let info = ConnInfo::new(&self.inner.remote, &stream);

        if let Some(on_connect) = &config.on_connect {
            if let Err(err) = unpanic(on_connect(self.clone(), &mut stream)).await {
                #[cfg(feature = "tracing")]
                tracing::debug!(client = %config.name, error = %err, "connection rejected by on_connect");
                return (Some(info), Err(err));
            }
        }

        let active = Arc::new(Active::new(
            stream,
            info.clone(),
            config.write_timeout,
            self.token().child_token(),
        ));
        self.replace_active(Some(Arc::clone(&active)));
        let from = self.inner.state.mark_connected();
        self.emit_transition(from, ConnectionState::Connected);

        #[cfg(feature = "tracing")]
        tracing::info!(client = %config.name, peer = %info.peer_addr(), "connected");

        #[cfg(feature = "metrics")]
        {
            counter!("redial_connections_total", "client" => config.name.clone()).increment(1);
            gauge!("redial_connected", "client" => config.name.clone()).set(1.0);
        }

        config.emit(ClientEvent::Connected {
            name: config.name.clone(),
            timestamp: Instant::now(),
            peer_addr: info.peer_addr().to_string(),
        });

        let result = match &config.on_session {
            Some(on_session) => unpanic(on_session(self.clone())).await,
            None => {
                self.cancelled().await;
                Err(RedialError::Cancelled.boxed())
            }
        };

        if let Some(on_disconnect) = &config.on_disconnect {
            on_disconnect(self, &info);
        }
        if let Some(previous) = self.replace_active(None) {
            previous.close().await;
        }

        #[cfg(feature = "tracing")]
        match &result {
            Ok(()) => tracing::info!(client = %config.name, "session finished"),
            Err(err) => tracing::info!(client = %config.name, error = %err, "disconnected"),
        }

        #[cfg(feature = "metrics")]
        {
            counter!("redial_disconnects_total", "client" => config.name.clone()).increment(1);
            gauge!("redial_connected", "client" => config.name.clone()).set(0.0);
            histogram!("redial_session_duration_seconds", "client" => config.name.clone())
                .record(info.uptime().as_secs_f64());
        }

        config.emit(ClientEvent::Disconnected {
            name: config.name.clone(),
            timestamp: Instant::now(),
            uptime: info.uptime(),
            error: result.as_ref().err().map(|e| e.to_string()),
        });

        (Some(info), result)
    }

    /// Decides between retrying and stopping, giving `on_error` the final say.
    fn judge(&self, info: Option<&ConnInfo>, outcome: Result<(), BoxError>) -> Next {
        let config = &self.inner.config;
        let err = match outcome {
            Ok(()) => return Next::Stop(None),
            Err(err) => err,
        };
        let message = err.to_string();

        if let Some(on_error) = &config.on_error {
            return match on_error(info, err) {
                None => Next::Retry(message),
                Some(err) => Next::Stop(Some(err)),
            };
        }

        match config.classifier.classify(Some(&*err)) {
            Verdict::Retry => Next::Retry(message),
            Verdict::NonError | Verdict::Fatal => Next::Stop(Some(err)),
        }
    }

    fn finish(&self, cause: Option<BoxError>) {
        let config = &self.inner.config;
        let error = cause
            .as_ref()
            .filter(|err| !redial_core::is_non_error(Some(&***err)))
            .map(|err| err.to_string());

        self.inner.group.terminate(cause);
        self.set_state(ConnectionState::Terminated);

        #[cfg(feature = "tracing")]
        match &error {
            Some(error) => tracing::warn!(client = %config.name, %error, "client terminated"),
            None => tracing::info!(client = %config.name, "client stopped"),
        }

        #[cfg(feature = "metrics")]
        counter!("redial_terminations_total", "client" => config.name.clone()).increment(1);

        config.emit(ClientEvent::Terminated {
            name: config.name.clone(),
            timestamp: Instant::now(),
            error,
        });
    }

    fn set_state(&self, next: ConnectionState) {
        let from = self.inner.state.transition(next);
        self.emit_transition(from, next);
    }

    fn emit_transition(&self, from: ConnectionState, to: ConnectionState) {
        if from == to || from == ConnectionState::Terminated {
            return;
        }
        let config = &self.inner.config;

        #[cfg(feature = "tracing")]
        tracing::trace!(client = %config.name, ?from, ?to, "state transition");

        config.emit(ClientEvent::StateTransition {
            name: config.name.clone(),
            timestamp: Instant::now(),
            from,
            to,
        });
    }
}

/// Turns a panicking callback into [`RedialError::Panicked`].
async fn unpanic<F>(fut: F) -> Result<(), BoxError>
where
    F: Future<Output = Result<(), BoxError>>,
{
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            Err(RedialError::Panicked(panic_message(panic.as_ref())).boxed())
        })
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.inner.config.name)
            .field("remote", &self.inner.remote)
            .field("state", &self.state())
            .field("attempts", &self.attempts())
            .finish()
    }
}
