use crate::address::{resolve, ResolvedAddr};
use crate::client::Client;
use crate::conn::{ConnInfo, Stream};
use crate::connector::{BoxConnector, Connector, SocketHook};
use crate::events::ClientEvent;
use crate::state::ConnectionState;
use crate::waiter::{DelayWaiter, SharedWaiter, Waiter};
use futures::future::BoxFuture;
use redial_core::classify::{Classifier, UnknownErrorPolicy};
use redial_core::events::EventListeners;
use redial_core::{BoxError, RedialError};
use socket2::SockRef;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Default for every timeout and the keep-alive period.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default pause between attempts when no waiter is installed.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

pub(crate) type OnConnectFn = dyn for<'a> Fn(Client, &'a mut Stream) -> BoxFuture<'a, Result<(), BoxError>>
    + Send
    + Sync;
pub(crate) type OnSessionFn = dyn Fn(Client) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync;
pub(crate) type OnDisconnectFn = dyn Fn(&Client, &ConnInfo) + Send + Sync;
pub(crate) type OnErrorFn = dyn Fn(Option<&ConnInfo>, BoxError) -> Option<BoxError> + Send + Sync;

/// Configuration for a reconnecting client.
///
/// Built once with [`Config::builder`] and then bound to a single [`Client`]
/// through `Arc<Config>`. Any later client built from the same `Arc` is
/// rejected with [`RedialError::ConfigBusy`], even once the first has dropped.
pub struct Config {
    pub(crate) name: String,
    pub(crate) remote: String,
    pub(crate) keep_alive: Duration,
    pub(crate) dial_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) write_timeout: Duration,
    pub(crate) reconnect_delay: Duration,
    pub(crate) waiter: SharedWaiter,
    pub(crate) on_socket: Option<SocketHook>,
    pub(crate) connector: BoxConnector,
    pub(crate) classifier: Classifier,
    pub(crate) on_connect: Option<Arc<OnConnectFn>>,
    pub(crate) on_session: Option<Arc<OnSessionFn>>,
    pub(crate) on_disconnect: Option<Arc<OnDisconnectFn>>,
    pub(crate) on_error: Option<Arc<OnErrorFn>>,
    pub(crate) event_listeners: EventListeners<ClientEvent>,
    resolved: OnceLock<ResolvedAddr>,
    bound: AtomicBool,
}

impl Config {
    /// Creates a builder for the given remote address.
    pub fn builder(remote: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(remote)
    }

    /// Returns the client name used in events, logs and metrics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the remote address as configured.
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Returns the TCP keep-alive period.
    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    /// Returns the dial timeout.
    pub fn dial_timeout(&self) -> Duration {
        self.dial_timeout
    }

    /// Returns the read timeout sessions are expected to apply per read.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Returns the bound on writes and flushes without an explicit deadline.
    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Returns the delay used by the default waiter.
    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    /// Returns the policy for errors the classifier does not recognise.
    pub fn unknown_errors(&self) -> UnknownErrorPolicy {
        self.classifier.unknown_policy()
    }

    /// Resolves the remote address, caching the result.
    pub fn resolved(&self) -> Result<&ResolvedAddr, RedialError> {
        if let Some(addr) = self.resolved.get() {
            return Ok(addr);
        }
        let addr = resolve(&self.remote)?;
        let _ = self.resolved.set(addr);
        self.resolved.get().ok_or(RedialError::EmptyAddress)
    }

    pub(crate) fn bind(&self) -> Result<(), RedialError> {
        self.bound
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| RedialError::ConfigBusy)
    }

    pub(crate) fn emit(&self, event: ClientEvent) {
        if !self.event_listeners.is_empty() {
            self.event_listeners.emit(&event);
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("name", &self.name)
            .field("remote", &self.remote)
            .field("keep_alive", &self.keep_alive)
            .field("dial_timeout", &self.dial_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("unknown_errors", &self.classifier.unknown_policy())
            .field("on_socket", &self.on_socket.is_some())
            .field("on_connect", &self.on_connect.is_some())
            .field("on_session", &self.on_session.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("event_listeners", &self.event_listeners.len())
            .field("bound", &self.bound.load(Ordering::Acquire))
            .finish()
    }
}

/// Builder for [`Config`].
pub struct ConfigBuilder {
    name: String,
    remote: String,
    keep_alive: Duration,
    dial_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
    reconnect_delay: Duration,
    waiter: Option<SharedWaiter>,
    on_socket: Option<SocketHook>,
    connector: Option<BoxConnector>,
    unknown_errors: UnknownErrorPolicy,
    on_connect: Option<Arc<OnConnectFn>>,
    on_session: Option<Arc<OnSessionFn>>,
    on_disconnect: Option<Arc<OnDisconnectFn>>,
    on_error: Option<Arc<OnErrorFn>>,
    event_listeners: EventListeners<ClientEvent>,
}

impl ConfigBuilder {
    /// Creates a builder with default timeouts.
    pub fn new(remote: impl Into<String>) -> Self {
        Self {
            name: String::from("<unnamed>"),
            remote: remote.into(),
            keep_alive: DEFAULT_TIMEOUT,
            dial_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            waiter: None,
            on_socket: None,
            connector: None,
            unknown_errors: UnknownErrorPolicy::default(),
            on_connect: None,
            on_session: None,
            on_disconnect: None,
            on_error: None,
            event_listeners: EventListeners::new(),
        }
    }

    /// Names the client for events, logs and metrics labels.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the TCP keep-alive period. Zero disables keep-alive.
    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Sets the dial timeout. Zero disables it.
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Sets the read timeout exposed to sessions.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Bounds writes and flushes that have no explicit write deadline. Zero disables it.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the fixed pause used when no custom waiter is installed.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Installs a custom waiter, replacing the fixed reconnect delay.
    ///
    /// ```
    /// use redial_client::{waiter::BackoffWaiter, Config};
    /// use redial_core::ExponentialBackoff;
    /// use std::time::Duration;
    ///
    /// let config = Config::builder("localhost:7000")
    ///     .waiter(BackoffWaiter::new(ExponentialBackoff::new(Duration::from_millis(50))).max_attempts(5))
    ///     .build();
    /// ```
    pub fn waiter<W>(mut self, waiter: W) -> Self
    where
        W: Waiter + 'static,
    {
        self.waiter = Some(Arc::new(waiter));
        self
    }

    /// Installs a hook run on every raw socket before it connects.
    pub fn on_socket<F>(mut self, hook: F) -> Self
    where
        F: Fn(SockRef<'_>) -> io::Result<()> + Send + Sync + 'static,
    {
        self.on_socket = Some(Arc::new(hook));
        self
    }

    /// Replaces the built-in dialer.
    ///
    /// Dial timeout, keep-alive and the socket hook are the dialer's
    /// responsibility once replaced.
    pub fn connector(mut self, connector: BoxConnector) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Sets how errors the classifier does not recognise are treated.
    pub fn unknown_errors(mut self, policy: UnknownErrorPolicy) -> Self {
        self.unknown_errors = policy;
        self
    }

    /// Runs after every successful dial, before the session starts.
    ///
    /// Returning an error closes the connection; the error is then classified
    /// like any other.
    ///
    /// ```
    /// use redial_client::Config;
    /// use tokio::io::AsyncWriteExt;
    ///
    /// let config = Config::builder("localhost:7000")
    ///     .on_connect(|_client, stream| {
    ///         Box::pin(async move {
    ///             stream.write_all(b"HELLO\n").await?;
    ///             Ok(())
    ///         })
    ///     })
    ///     .build();
    /// ```
    pub fn on_connect<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(Client, &'a mut Stream) -> BoxFuture<'a, Result<(), BoxError>>
            + Send
            + Sync
            + 'static,
    {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Runs the session over the active connection.
    ///
    /// Returning `Ok(())` stops the client without an error. Returning an
    /// error ends the connection and hands the error to classification.
    pub fn on_session<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Client) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.on_session = Some(Arc::new(
            move |client| -> BoxFuture<'static, Result<(), BoxError>> { Box::pin(f(client)) },
        ));
        self
    }

    /// Runs after the session ends, before the connection is closed.
    pub fn on_disconnect<F>(mut self, f: F) -> Self
    where
        F: Fn(&Client, &ConnInfo) + Send + Sync + 'static,
    {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Overrides error classification.
    ///
    /// Called with every dial, handshake and session error. Returning `None`
    /// forces a retry; returning `Some(err)` terminates the client with `err`
    /// (reported unless it is a non-error such as
    /// [`RedialError::DoNotReconnect`]). The connection info is `None` for
    /// dial failures.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&ConnInfo>, BoxError) -> Option<BoxError> + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Registers a callback for state transitions.
    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(ConnectionState, ConnectionState) + Send + Sync + 'static,
    {
        self.event_listeners.add(move |event: &ClientEvent| {
            if let ClientEvent::StateTransition { from, to, .. } = event {
                f(*from, *to);
            }
        });
        self
    }

    /// Registers a callback receiving the attempt number before each wait.
    pub fn on_reconnect<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.event_listeners.add(move |event: &ClientEvent| {
            if let ClientEvent::Reconnecting { attempt, .. } = event {
                f(*attempt);
            }
        });
        self
    }

    /// Registers a callback receiving every client event.
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.event_listeners.add(f);
        self
    }

    /// Builds the configuration, filling defaults.
    ///
    /// The remote address is validated when the configuration is bound to a
    /// client.
    pub fn build(self) -> Config {
        #[cfg(feature = "metrics")]
        crate::describe_metrics();

        let waiter = self
            .waiter
            .unwrap_or_else(|| Arc::new(DelayWaiter::new(self.reconnect_delay)));
        let connector = self.connector.unwrap_or_else(|| {
            BoxConnector::new(
                Connector::new()
                    .dial_timeout(self.dial_timeout)
                    .keep_alive(self.keep_alive)
                    .on_socket(self.on_socket.clone()),
            )
        });

        Config {
            name: self.name,
            remote: self.remote,
            keep_alive: self.keep_alive,
            dial_timeout: self.dial_timeout,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            reconnect_delay: self.reconnect_delay,
            waiter,
            on_socket: self.on_socket,
            connector,
            classifier: Classifier::new(self.unknown_errors),
            on_connect: self.on_connect,
            on_session: self.on_session,
            on_disconnect: self.on_disconnect,
            on_error: self.on_error,
            event_listeners: self.event_listeners,
            resolved: OnceLock::new(),
            bound: AtomicBool::new(false),
        }
    }
}

impl std::fmt::Debug for ConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigBuilder")
            .field("name", &self.name)
            .field("remote", &self.remote)
            .field("waiter", &self.waiter.is_some())
            .field("connector", &self.connector.is_some())
            .field("event_listeners", &self.event_listeners.len())
            .finish_non_exhaustive()
    }
}
