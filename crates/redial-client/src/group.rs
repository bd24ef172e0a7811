//! Supervised task set shared by a client and its sessions.
//!
//! A [`TaskGroup`] owns a cancellation token, a first-write-wins terminal
//! cause and a [`TaskTracker`]. Tasks started with [`TaskGroup::go`] have their
//! panics converted into [`RedialError::Panicked`]; an error that the
//! classifier considers fatal terminates the whole group with that cause.
//!
//! ```
//! use redial_client::TaskGroup;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let group = TaskGroup::new();
//! let token = group.token().clone();
//! group.go(async move {
//!     token.cancelled().await;
//!     Ok::<(), redial_core::BoxError>(())
//! });
//! group.shutdown(Duration::from_secs(1)).await.unwrap();
//! assert!(group.err().is_none());
//! # }
//! ```

use futures::FutureExt;
use redial_core::classify::{is_non_error, Classifier};
use redial_core::{BoxError, RedialError, SharedError};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

struct Lifecycle {
    token: CancellationToken,
    cause: OnceLock<Option<SharedError>>,
    tracker: TaskTracker,
    classifier: Classifier,
}

/// A set of supervised tasks with coordinated shutdown.
#[derive(Clone)]
pub struct TaskGroup {
    inner: Arc<Lifecycle>,
}

impl TaskGroup {
    /// Creates a group using the default classifier.
    pub fn new() -> Self {
        Self::with_classifier(Classifier::default())
    }

    /// Creates a group deciding with `classifier` which task errors are fatal.
    pub fn with_classifier(classifier: Classifier) -> Self {
        Self {
            inner: Arc::new(Lifecycle {
                token: CancellationToken::new(),
                cause: OnceLock::new(),
                tracker: TaskTracker::new(),
                classifier,
            }),
        }
    }

    /// Returns the token cancelled when the group terminates.
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Resolves once the group has terminated.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }

    /// Returns `true` once the group has terminated.
    pub fn is_terminated(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Spawns a supervised task.
    ///
    /// A panic becomes [`RedialError::Panicked`]. A returned error that is
    /// fatal terminates the group; other errors are only logged.
    pub fn go<F>(&self, fut: F)
    where
        F: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let group = self.clone();
        self.inner.tracker.spawn(async move {
            let err = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => return,
                Ok(Err(err)) => err,
                Err(panic) => RedialError::Panicked(panic_message(panic.as_ref())).boxed(),
            };

            if group.inner.classifier.is_fatal(&*err) {
                group.terminate(Some(err));
            } else {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %err, "task exited with a retryable error");
            }
        });
    }

    /// Records `cause` if none is recorded yet, then cancels the group.
    ///
    /// Returns `true` when this call recorded the cause.
    pub fn terminate(&self, cause: Option<BoxError>) -> bool {
        let recorded = self.inner.cause.set(cause.map(SharedError::from)).is_ok();
        self.inner.token.cancel();
        self.inner.tracker.close();
        recorded
    }

    /// Returns the recorded cause, including non-errors such as cancellation.
    pub fn cause(&self) -> Option<SharedError> {
        self.inner.cause.get().cloned().flatten()
    }

    /// Returns the terminal error, or `None` when the group is still running
    /// or stopped without an error.
    pub fn err(&self) -> Option<SharedError> {
        self.cause()
            .filter(|err| !is_non_error(Some(&**err as &(dyn std::error::Error + 'static))))
    }

    /// Waits for termination and for every task to finish.
    ///
    /// The token may also be cancelled directly through [`token`](Self::token);
    /// that counts as termination with [`RedialError::Cancelled`].
    pub async fn wait(&self) -> Result<(), SharedError> {
        self.inner.token.cancelled().await;
        self.terminate(Some(RedialError::Cancelled.boxed()));
        self.inner.tracker.wait().await;
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Cancels the group and waits up to `timeout` for its tasks.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), RedialError> {
        self.terminate(Some(RedialError::Cancelled.boxed()));
        tokio::time::timeout(timeout, self.inner.tracker.wait())
            .await
            .map_err(|_| RedialError::ShutdownTimedOut)
    }

    /// Returns the number of tasks still running.
    pub fn len(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Returns `true` when no task is running.
    pub fn is_empty(&self) -> bool {
        self.inner.tracker.is_empty()
    }
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGroup")
            .field("tasks", &self.len())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("unknown panic payload")
    }
}
