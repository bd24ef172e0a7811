//! Typed message sessions: a reader task, a writer task and two queues.

use crate::error::StreamError;
use crate::framing::{Framing, LineFraming};
use crate::transport::Transport;
use bytes::{Bytes, BytesMut};
use redial_client::TaskGroup;
use redial_core::{BoxError, SharedError};
use std::fmt;
use std::io;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "metrics")]
use metrics::counter;

/// Capacity of the incoming queue: the reader hands over one message at a time.
const IN_CAPACITY: usize = 1;

/// Default capacity of the outgoing queue.
pub const DEFAULT_QUEUE_SIZE: usize = 1;

const READ_CHUNK: usize = 8 * 1024;

/// Hook run against the transport around each read or write.
pub type DeadlineHook = Arc<dyn Fn(&dyn Transport) -> io::Result<()> + Send + Sync>;

type MarshalFn<Out> = Arc<dyn Fn(&Out) -> Result<Bytes, BoxError> + Send + Sync>;
type MarshalIntoFn<Out> = Arc<dyn Fn(&Out, &mut BytesMut) -> Result<(), BoxError> + Send + Sync>;
type UnmarshalFn<In> = Arc<dyn Fn(BytesMut) -> Result<In, BoxError> + Send + Sync>;

enum Marshal<Out> {
    Bytes(MarshalFn<Out>),
    Into(MarshalIntoFn<Out>),
}

impl<Out> Marshal<Out> {
    fn payload(&self, msg: &Out, scratch: &mut BytesMut) -> Result<Bytes, BoxError> {
        match self {
            Marshal::Bytes(f) => f(msg),
            Marshal::Into(f) => {
                scratch.clear();
                f(msg, scratch)?;
                Ok(scratch.split().freeze())
            }
        }
    }
}

#[derive(Clone)]
struct Hooks {
    set_read: Option<DeadlineHook>,
    clear_read: Option<DeadlineHook>,
    set_write: Option<DeadlineHook>,
    clear_write: Option<DeadlineHook>,
}

fn run_hook(hook: &Option<DeadlineHook>, transport: &dyn Transport) -> io::Result<()> {
    match hook {
        Some(hook) => hook(transport),
        None => Ok(()),
    }
}

/// A running session exchanging `In` and `Out` messages over a transport.
///
/// Created by [`StreamSessionBuilder::spawn`], which starts a reader task
/// decoding frames into the incoming queue and a writer task draining the
/// outgoing queue. Both tasks run in the given [`TaskGroup`], so a fatal
/// read error stops the owning client.
///
/// ```no_run
/// use redial_client::{Client, Config};
/// use redial_core::BoxError;
/// use redial_stream::StreamSession;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::builder("localhost:7000")
///     .on_session(|client: Client| async move {
///         let session = StreamSession::<String, String>::builder()
///             .transport(client.clone())
///             .marshal(|msg: &String| Ok(msg.clone().into()))
///             .unmarshal(|frame| Ok(String::from_utf8(frame.to_vec())?))
///             .spawn(client.tasks())?;
///
///         session.send("HELLO".to_string()).await?;
///         while let Some(line) = session.recv().await {
///             println!("{line}");
///         }
///         // Reader ended: hand the cause to the reconnect loop.
///         match session.err() {
///             Some(err) => Err::<(), BoxError>(err.into()),
///             None => Ok(()),
///         }
///     })
///     .build();
///
/// let client = Client::new(Arc::new(config))?;
/// client.connect()?;
/// client.wait().await?;
/// # Ok(())
/// # }
/// ```
pub struct StreamSession<In, Out> {
    name: String,
    outbound: Mutex<Option<mpsc::Sender<Out>>>,
    inbound: tokio::sync::Mutex<mpsc::Receiver<In>>,
    error: Arc<OnceLock<SharedError>>,
    stop: CancellationToken,
}

impl<In, Out> StreamSession<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    /// Creates a builder.
    pub fn builder() -> StreamSessionBuilder<In, Out> {
        StreamSessionBuilder::new()
    }

    /// Returns the session name used in logs and metrics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues `msg` for the writer.
    ///
    /// Waits while the outgoing queue is full. Fails with
    /// [`StreamError::Closed`] after [`close`](Self::close) or once the writer
    /// has stopped.
    pub async fn send(&self, msg: Out) -> Result<(), StreamError> {
        let sender = self
            .outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(StreamError::Closed)?;
        sender.send(msg).await.map_err(|_| StreamError::Closed)
    }

    /// Receives the next incoming message, or `None` once the reader has stopped.
    pub async fn recv(&self) -> Option<In> {
        self.inbound.lock().await.recv().await
    }

    /// Receives the next incoming message.
    ///
    /// Once the reader has stopped, returns the error it stopped with, or
    /// [`StreamError::Closed`] when it stopped cleanly.
    pub async fn next(&self) -> Result<In, SharedError> {
        match self.recv().await {
            Some(msg) => Ok(msg),
            None => Err(self
                .err()
                .unwrap_or_else(|| Arc::new(StreamError::Closed) as SharedError)),
        }
    }

    /// Returns the first error either task stopped with.
    pub fn err(&self) -> Option<SharedError> {
        self.error.get().cloned()
    }

    /// Returns `true` after [`close`](Self::close).
    pub fn is_closed(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Stops the session.
    ///
    /// Closes the outgoing queue (the writer still sends what was queued) and
    /// the incoming queue, and stops the reader. The transport stays open.
    pub async fn close(&self) {
        self.outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.stop.cancel();
        self.inbound.lock().await.close();
    }

    /// Returns the messages left in the incoming queue.
    ///
    /// Intended after [`close`](Self::close); on an open session it waits for
    /// the reader to stop.
    pub async fn drain(&self) -> Vec<In> {
        let mut inbound = self.inbound.lock().await;
        let mut leftovers = Vec::new();
        while let Some(msg) = inbound.recv().await {
            leftovers.push(msg);
        }
        leftovers
    }
}

impl<In, Out> fmt::Debug for StreamSession<In, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("name", &self.name)
            .field("closed", &self.stop.is_cancelled())
            .field("error", &self.error.get().map(|e| e.to_string()))
            .finish_non_exhaustive()
    }
}

/// Builder for [`StreamSession`].
///
/// Requires a transport, an unmarshal function and `marshal` or
/// `marshal_into`; everything else has defaults (line framing, a queue of
/// [`DEFAULT_QUEUE_SIZE`], no deadline hooks).
pub struct StreamSessionBuilder<In, Out> {
    name: String,
    transport: Option<Arc<dyn Transport>>,
    framing: Option<Box<dyn Framing>>,
    marshal: Option<MarshalFn<Out>>,
    marshal_into: Option<MarshalIntoFn<Out>>,
    unmarshal: Option<UnmarshalFn<In>>,
    queue_size: usize,
    hooks: Hooks,
    _messages: PhantomData<fn(Out) -> In>,
}

impl<In, Out> StreamSessionBuilder<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    /// Creates a builder with defaults.
    pub fn new() -> Self {
        Self {
            name: String::from("<unnamed>"),
            transport: None,
            framing: None,
            marshal: None,
            marshal_into: None,
            unmarshal: None,
            queue_size: DEFAULT_QUEUE_SIZE,
            hooks: Hooks {
                set_read: None,
                clear_read: None,
                set_write: None,
                clear_write: None,
            },
            _messages: PhantomData,
        }
    }

    /// Names the session for logs and metrics.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the transport, usually the [`Client`](redial_client::Client) running the session.
    pub fn transport<T: Transport>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Sets the framing. Defaults to [`LineFraming`].
    pub fn framing<F: Framing>(mut self, framing: F) -> Self {
        self.framing = Some(Box::new(framing));
        self
    }

    /// Serializes outgoing messages into a fresh buffer.
    pub fn marshal<F>(mut self, f: F) -> Self
    where
        F: Fn(&Out) -> Result<Bytes, BoxError> + Send + Sync + 'static,
    {
        self.marshal = Some(Arc::new(f));
        self
    }

    /// Serializes outgoing messages into a reused buffer. Preferred over
    /// [`marshal`](Self::marshal) when both are set.
    pub fn marshal_into<F>(mut self, f: F) -> Self
    where
        F: Fn(&Out, &mut BytesMut) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.marshal_into = Some(Arc::new(f));
        self
    }

    /// Deserializes incoming frames.
    pub fn unmarshal<F>(mut self, f: F) -> Self
    where
        F: Fn(BytesMut) -> Result<In, BoxError> + Send + Sync + 'static,
    {
        self.unmarshal = Some(Arc::new(f));
        self
    }

    /// Sets the outgoing queue capacity. Zero is treated as one.
    pub fn queue_size(mut self, size: usize) -> Self {
        self.queue_size = size.max(1);
        self
    }

    /// Runs before every read.
    pub fn on_set_read_deadline<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn Transport) -> io::Result<()> + Send + Sync + 'static,
    {
        self.hooks.set_read = Some(Arc::new(f));
        self
    }

    /// Runs after every successful read.
    pub fn on_clear_read_deadline<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn Transport) -> io::Result<()> + Send + Sync + 'static,
    {
        self.hooks.clear_read = Some(Arc::new(f));
        self
    }

    /// Runs before every message is written.
    pub fn on_set_write_deadline<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn Transport) -> io::Result<()> + Send + Sync + 'static,
    {
        self.hooks.set_write = Some(Arc::new(f));
        self
    }

    /// Runs after every message is written and flushed.
    pub fn on_clear_write_deadline<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn Transport) -> io::Result<()> + Send + Sync + 'static,
    {
        self.hooks.clear_write = Some(Arc::new(f));
        self
    }

    /// Bounds every read by `timeout`, idle periods included.
    pub fn read_timeout(self, timeout: Duration) -> Self {
        self.on_set_read_deadline(move |t| t.set_read_deadline(timeout))
            .on_clear_read_deadline(|t| t.set_read_deadline(Duration::ZERO))
    }

    /// Bounds writing and flushing each message by `timeout`.
    pub fn write_timeout(self, timeout: Duration) -> Self {
        self.on_set_write_deadline(move |t| t.set_write_deadline(timeout))
            .on_clear_write_deadline(|t| t.set_write_deadline(Duration::ZERO))
    }

    /// Validates the builder and starts the reader and writer in `group`.
    pub fn spawn(self, group: &TaskGroup) -> Result<StreamSession<In, Out>, StreamError> {
        let transport = self.transport.ok_or(StreamError::MissingTransport)?;
        let unmarshal = self.unmarshal.ok_or(StreamError::MissingUnmarshal)?;
        let marshal = match (self.marshal_into, self.marshal) {
            (Some(f), _) => Marshal::Into(f),
            (None, Some(f)) => Marshal::Bytes(f),
            (None, None) => return Err(StreamError::MissingMarshal),
        };
        let framing = self
            .framing
            .unwrap_or_else(|| Box::new(LineFraming::new()));

        #[cfg(feature = "metrics")]
        crate::describe_metrics();

        let (in_tx, in_rx) = mpsc::channel(IN_CAPACITY);
        let (out_tx, out_rx) = mpsc::channel(self.queue_size);
        let error = Arc::new(OnceLock::new());
        let stop = group.token().child_token();

        let reader = Reader {
            name: self.name.clone(),
            transport: Arc::clone(&transport),
            framing: framing.boxed_clone(),
            unmarshal,
            hooks: self.hooks.clone(),
            inbound: in_tx,
            stop: stop.clone(),
        };
        let writer = Writer {
            name: self.name.clone(),
            transport,
            framing,
            marshal,
            hooks: self.hooks,
            outbound: out_rx,
            cancel: group.token().clone(),
        };

        // Errors are recorded before the task drops its queue end, so a
        // receiver seeing the queue close can already read the cause.
        let reader_error = Arc::clone(&error);
        group.go(async move {
            let mut reader = reader;
            let result = reader.run().await.map_err(|err| record(&reader_error, err));
            if !reader.stop.is_cancelled() {
                reader.transport.close().await;
            }
            result
        });

        let writer_error = Arc::clone(&error);
        group.go(async move {
            let mut writer = writer;
            let result = writer.run().await.map_err(|err| record(&writer_error, err));
            if result.is_err() {
                writer.transport.close().await;
            }
            result
        });

        #[cfg(feature = "tracing")]
        tracing::debug!(session = %self.name, queue_size = self.queue_size, "stream session started");

        Ok(StreamSession {
            name: self.name,
            outbound: Mutex::new(Some(out_tx)),
            inbound: tokio::sync::Mutex::new(in_rx),
            error,
            stop,
        })
    }
}

impl<In, Out> Default for StreamSessionBuilder<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "json")]
impl<In, Out> StreamSessionBuilder<In, Out>
where
    In: serde::de::DeserializeOwned + Send + 'static,
    Out: serde::Serialize + Send + 'static,
{
    /// Marshals and unmarshals messages as JSON documents.
    ///
    /// With the default line framing this is newline-delimited JSON.
    pub fn json(self) -> Self {
        self.marshal(|msg: &Out| Ok(Bytes::from(serde_json::to_vec(msg)?)))
            .unmarshal(|frame: BytesMut| Ok(serde_json::from_slice(&frame)?))
    }
}

impl<In, Out> fmt::Debug for StreamSessionBuilder<In, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSessionBuilder")
            .field("name", &self.name)
            .field("transport", &self.transport.is_some())
            .field("framing", &self.framing.is_some())
            .field("marshal", &self.marshal.is_some())
            .field("marshal_into", &self.marshal_into.is_some())
            .field("unmarshal", &self.unmarshal.is_some())
            .field("queue_size", &self.queue_size)
            .finish()
    }
}

/// Keeps the first error and hands a shared copy to the task group.
fn record(slot: &OnceLock<SharedError>, err: StreamError) -> BoxError {
    let shared: SharedError = Arc::new(err);
    let _ = slot.set(Arc::clone(&shared));
    Box::new(shared)
}

struct Reader<In> {
    #[cfg_attr(not(any(feature = "tracing", feature = "metrics")), allow(dead_code))]
    name: String,
    transport: Arc<dyn Transport>,
    framing: Box<dyn Framing>,
    unmarshal: UnmarshalFn<In>,
    hooks: Hooks,
    inbound: mpsc::Sender<In>,
    stop: CancellationToken,
}

impl<In: Send + 'static> Reader<In> {
    async fn run(&mut self) -> Result<(), StreamError> {
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        let mut chunk = vec![0u8; READ_CHUNK];

        loop {
            while let Some(frame) = self.framing.decode_frame(&mut buf)? {
                if !self.deliver(frame).await? {
                    return Ok(());
                }
            }

            run_hook(&self.hooks.set_read, &*self.transport)?;
            let n = tokio::select! {
                _ = self.stop.cancelled() => return Ok(()),
                read = self.transport.read(&mut chunk) => read?,
            };
            run_hook(&self.hooks.clear_read, &*self.transport)?;

            if n == 0 {
                while let Some(frame) = self.framing.decode_last(&mut buf)? {
                    if !self.deliver(frame).await? {
                        return Ok(());
                    }
                }

                #[cfg(feature = "tracing")]
                tracing::debug!(session = %self.name, "stream reader reached end of stream");

                return Ok(());
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Returns `false` once nobody is receiving.
    async fn deliver(&mut self, frame: BytesMut) -> Result<bool, StreamError> {
        let msg = (self.unmarshal)(frame).map_err(StreamError::Unmarshal)?;

        #[cfg(feature = "metrics")]
        counter!("redial_stream_messages_total", "session" => self.name.clone(), "direction" => "in")
            .increment(1);

        tokio::select! {
            _ = self.stop.cancelled() => Ok(false),
            sent = self.inbound.send(msg) => Ok(sent.is_ok()),
        }
    }
}

struct Writer<Out> {
    #[cfg_attr(not(any(feature = "tracing", feature = "metrics")), allow(dead_code))]
    name: String,
    transport: Arc<dyn Transport>,
    framing: Box<dyn Framing>,
    marshal: Marshal<Out>,
    hooks: Hooks,
    outbound: mpsc::Receiver<Out>,
    cancel: CancellationToken,
}

impl<Out: Send + 'static> Writer<Out> {
    /// Exits once the outgoing queue is closed and empty.
    ///
    /// Cancelling the group closes the queue: messages `send` already
    /// accepted are still written, later sends fail.
    async fn run(&mut self) -> Result<(), StreamError> {
        let mut scratch = BytesMut::new();
        let mut frame = BytesMut::new();

        loop {
            let next = tokio::select! {
                biased;
                msg = self.outbound.recv() => msg,
                _ = self.cancel.cancelled() => {
                    self.outbound.close();
                    self.outbound.recv().await
                }
            };
            let Some(msg) = next else { break };
            run_hook(&self.hooks.set_write, &*self.transport)?;

            let payload = self
                .marshal
                .payload(&msg, &mut scratch)
                .map_err(StreamError::Marshal)?;
            frame.clear();
            self.framing.encode_frame(payload, &mut frame)?;
            self.transport.write(&frame).await?;
            self.transport.flush().await?;

            run_hook(&self.hooks.clear_write, &*self.transport)?;

            #[cfg(feature = "metrics")]
            counter!("redial_stream_messages_total", "session" => self.name.clone(), "direction" => "out")
                .increment(1);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(session = %self.name, "stream writer finished");

        Ok(())
    }
}
