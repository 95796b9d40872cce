//! Read loop and multicast subscriber registry.
//!
//! The reader owns the transport's read half. A spawned task pulls bytes,
//! decodes them, and pushes each text increment to every current
//! subscriber in arrival order.
//!
//! # Delivery
//!
//! - Broadcast, not work-queue: every subscriber sees every increment.
//! - Each subscriber has its own unbounded buffer, so a slow consumer never
//!   holds up the read loop or other consumers.
//! - The stream is finite and not restartable. Once it completes or fails,
//!   new subscriptions are refused and existing ones drain and end.
//!
//! # Termination
//!
//! | Cause | Subscribers observe |
//! |-------|---------------------|
//! | End of stream | `None` |
//! | Read error | `Some(Err(TransportDropped))`, then `None` |
//! | [`StreamReader::stop`] | `Some(Err(TransportDropped))`, then `None` |

// ============================================================================
// Imports
// ============================================================================

use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures_util::Stream;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ConnectionId, SubscriptionId};

use super::BoxedReader;
use super::decoder::Utf8Decoder;

// ============================================================================
// Constants
// ============================================================================

/// Size of a single physical read.
const READ_BUFFER_SIZE: usize = 4096;

// ============================================================================
// Types
// ============================================================================

/// One delivery to a subscriber. `Err` is terminal.
pub type StreamItem = Result<String>;

/// How the stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Finish {
    /// Transport reported end of stream.
    Completed,
    /// Transport failed or the reader was stopped.
    Failed(String),
}

/// Shared subscriber state.
#[derive(Default)]
struct Registry {
    /// Live subscribers.
    subscribers: FxHashMap<SubscriptionId, mpsc::UnboundedSender<StreamItem>>,
    /// Set once; afterwards nothing is published or subscribed.
    finished: Option<Finish>,
}

/// State shared between the read task, the reader handle and subscriptions.
struct ReaderShared {
    /// Owning connection, for logs.
    connection_id: ConnectionId,
    /// Subscriber registry.
    registry: Mutex<Registry>,
}

impl ReaderShared {
    /// Delivers one text increment to every subscriber.
    fn publish(&self, text: &str) {
        let mut registry = self.registry.lock();
        if registry.finished.is_some() {
            return;
        }
        registry
            .subscribers
            .retain(|_, tx| tx.send(Ok(text.to_string())).is_ok());
        trace!(
            connection_id = %self.connection_id,
            bytes = text.len(),
            subscribers = registry.subscribers.len(),
            "Published output"
        );
    }

    /// Ends the stream. Returns `false` if it had already ended.
    fn finish(&self, finish: Finish) -> bool {
        let subscribers: Vec<_> = {
            let mut registry = self.registry.lock();
            if registry.finished.is_some() {
                return false;
            }
            registry.finished = Some(finish.clone());
            registry.subscribers.drain().collect()
        };

        let count = subscribers.len();
        if let Finish::Failed(reason) = &finish {
            for (_, tx) in subscribers {
                let _ = tx.send(Err(Error::transport_dropped(reason.clone())));
            }
        }

        debug!(connection_id = %self.connection_id, ?finish, count, "Output stream finished");
        true
    }

    /// Registers a new subscriber.
    fn subscribe(self: &Arc<Self>) -> Result<Subscription> {
        let mut registry = self.registry.lock();
        match &registry.finished {
            Some(Finish::Completed) => {
                return Err(Error::transport_dropped("output stream ended"));
            }
            Some(Finish::Failed(reason)) => {
                return Err(Error::transport_dropped(reason.clone()));
            }
            None => {}
        }

        let id = SubscriptionId::next();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.subscribers.insert(id, tx);
        trace!(connection_id = %self.connection_id, subscription_id = %id, "Subscribed");

        Ok(Subscription {
            id,
            rx,
            shared: Arc::downgrade(self),
        })
    }

    /// Removes a subscriber.
    fn unsubscribe(&self, id: SubscriptionId) {
        if self.registry.lock().subscribers.remove(&id).is_some() {
            trace!(connection_id = %self.connection_id, subscription_id = %id, "Unsubscribed");
        }
    }

    /// Returns the number of live subscribers.
    fn subscriber_count(&self) -> usize {
        self.registry.lock().subscribers.len()
    }

    /// Returns `true` once the stream has ended.
    fn is_finished(&self) -> bool {
        self.registry.lock().finished.is_some()
    }
}

// ============================================================================
// StreamReader
// ============================================================================

/// Continuous reader over one connection's read half.
pub struct StreamReader {
    /// Shared registry.
    shared: Arc<ReaderShared>,
    /// Stop signal for the read task.
    stop_tx: watch::Sender<bool>,
    /// Read task, taken on stop.
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamReader {
    /// Starts reading. Spawns the read task internally.
    pub(crate) fn start(reader: BoxedReader, connection_id: ConnectionId) -> Self {
        let shared = Arc::new(ReaderShared {
            connection_id,
            registry: Mutex::new(Registry::default()),
        });
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(Self::run_read_loop(reader, Arc::clone(&shared), stop_rx));

        Self {
            shared,
            stop_tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Subscribes to the text stream from this point on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportDropped`] if the stream has already ended.
    pub fn subscribe(&self) -> Result<Subscription> {
        self.shared.subscribe()
    }

    /// Returns the number of live subscribers.
    #[inline]
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscriber_count()
    }

    /// Returns `true` once the stream has completed or failed.
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.shared.is_finished()
    }

    /// Stops reading and releases the read half.
    ///
    /// Current subscribers receive [`Error::TransportDropped`] before this
    /// awaits the task, so pending waits resolve immediately. Safe to call
    /// more than once and while a read is in flight.
    pub async fn stop(&self, reason: &str) {
        let _ = self.stop_tx.send(true);
        self.shared.finish(Finish::Failed(reason.to_string()));

        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(connection_id = %self.shared.connection_id, error = %e, "Read task ended abnormally");
        }
    }

    /// Read loop. The read half is dropped when this returns.
    async fn run_read_loop(
        mut reader: BoxedReader,
        shared: Arc<ReaderShared>,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        let mut decoder = Utf8Decoder::new();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        let finish = loop {
            tokio::select! {
                biased;

                _ = stop_rx.wait_for(|stop| *stop) => {
                    break Finish::Failed("connection closed".to_string());
                }

                read = reader.read(&mut buf) => {
                    match read {
                        Ok(0) => {
                            debug!(connection_id = %shared.connection_id, "Transport reached end of stream");
                            break Finish::Completed;
                        }
                        Ok(n) => {
                            let text = decoder.decode(&buf[..n]);
                            if !text.is_empty() {
                                shared.publish(&text);
                            }
                        }
                        Err(e) => {
                            warn!(connection_id = %shared.connection_id, error = %e, "Transport read failed");
                            break Finish::Failed(e.to_string());
                        }
                    }
                }
            }
        };

        shared.finish(finish);
        drop(reader);
        debug!(connection_id = %shared.connection_id, "Read loop terminated");
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// One consumer's view of the output stream.
///
/// Unregisters itself on [`Subscription::cancel`] or drop.
pub struct Subscription {
    /// Registry key.
    id: SubscriptionId,
    /// Per-consumer buffer.
    rx: mpsc::UnboundedReceiver<StreamItem>,
    /// Registry, if the reader is still alive.
    shared: Weak<ReaderShared>,
}

impl Subscription {
    /// Returns the subscription ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Receives the next text increment.
    ///
    /// Returns `None` once the stream has ended and the buffer is drained.
    pub async fn recv(&mut self) -> Option<StreamItem> {
        self.rx.recv().await
    }

    /// Unregisters now. Nothing produced after this call is delivered.
    pub fn cancel(self) {
        drop(self);
    }

    /// Converts into a [`Stream`] for passive observers.
    #[must_use]
    pub fn into_stream(self) -> OutputStream {
        OutputStream { subscription: self }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.unsubscribe(self.id);
        }
    }
}

// ============================================================================
// OutputStream
// ============================================================================

/// Output stream for passive observers such as a terminal echo view.
pub struct OutputStream {
    /// Underlying subscription.
    subscription: Subscription,
}

impl Stream for OutputStream {
    type Item = StreamItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.subscription.rx.poll_recv(cx)
    }
}

// ============================================================================
// Tests
// ============================================================================
