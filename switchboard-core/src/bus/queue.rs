//! Async message queue implementation

use super::events::{InboundMessage, OutboundMessage};
use crate::config::schema::BusConfig;
use crate::error::DeliveryError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// How long the dispatcher waits for an outbound message before it
/// re-checks whether it should keep running.
pub const DEFAULT_DISPATCH_INTERVAL: Duration = Duration::from_secs(1);

/// Delivery capability of a live channel adapter, used by `send_direct`.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Deliver `msg` to the platform, or fail. Must not drop it silently.
    async fn send(&self, msg: OutboundMessage) -> Result<(), DeliveryError>;
}

type OutboundCallback =
    Arc<dyn Fn(OutboundMessage) -> BoxFuture<'static, Result<(), DeliveryError>> + Send + Sync>;

/// Unbounded FIFO with any number of producers and competing consumers.
struct Queue<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: Mutex<mpsc::UnboundedReceiver<T>>,
    pending: AtomicUsize,
}

impl<T> Queue<T> {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            pending: AtomicUsize::new(0),
        }
    }

    fn push(&self, item: T) {
        // Count first so a consumer can never observe the item before the increment.
        self.pending.fetch_add(1, Ordering::SeqCst);
        // The receiver is owned by this queue, so the channel never closes.
        if self.tx.send(item).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }

    async fn pop(&self) -> T {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(item) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                item
            }
            None => futures::future::pending().await,
        }
    }

    fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

struct BusInner {
    inbound: Queue<InboundMessage>,
    outbound: Queue<OutboundMessage>,
    /// Outbound subscribers by channel, in registration order
    subscribers: RwLock<HashMap<String, Vec<OutboundCallback>>>,
    /// Live adapters used by `send_direct`
    channels: RwLock<HashMap<String, Arc<dyn ChannelSender>>>,
    running: AtomicBool,
    /// Cancels the wait of the dispatcher that is currently running
    shutdown: parking_lot::Mutex<CancellationToken>,
    dispatch_interval: Duration,
}

/// Async message bus that decouples chat channels from the agent core
///
/// Channels push messages to the inbound queue, and the agent processes
/// them and either pushes responses to the outbound queue or hands them to
/// the channel directly with [`MessageBus::send_direct`].
///
/// The bus is a cheap handle: clone it into every channel and the agent loop.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    /// Create a new message bus
    pub fn new() -> Self {
        Self::with_dispatch_interval(DEFAULT_DISPATCH_INTERVAL)
    }

    /// Create a message bus whose dispatcher polls at `interval`
    pub fn with_dispatch_interval(interval: Duration) -> Self {
        Self {
            inner: Arc::new(BusInner {
                inbound: Queue::new(),
                outbound: Queue::new(),
                subscribers: RwLock::new(HashMap::new()),
                channels: RwLock::new(HashMap::new()),
                running: AtomicBool::new(false),
                shutdown: parking_lot::Mutex::new(CancellationToken::new()),
                dispatch_interval: interval,
            }),
        }
    }

    /// Create a message bus from configuration
    pub fn from_config(config: &BusConfig) -> Self {
        Self::with_dispatch_interval(Duration::from_millis(config.dispatch_interval_ms))
    }

    /// Publish a message from a channel to the agent
    pub fn publish_inbound(&self, msg: InboundMessage) {
        self.inner.inbound.push(msg);
    }

    /// Wait for the next inbound message.
    ///
    /// Concurrent callers compete: every message is returned to exactly one
    /// of them. Dropping the future before it resolves consumes nothing.
    pub async fn consume_inbound(&self) -> InboundMessage {
        self.inner.inbound.pop().await
    }

    /// Publish a response from the agent to channels (fire-and-forget)
    pub fn publish_outbound(&self, msg: OutboundMessage) {
        self.inner.outbound.push(msg);
    }

    /// Wait for the next outbound message
    pub async fn consume_outbound(&self) -> OutboundMessage {
        self.inner.outbound.pop().await
    }

    /// Send a message straight through its channel adapter.
    ///
    /// Unlike [`publish_outbound`](Self::publish_outbound), this waits for the
    /// adapter and returns its error unchanged. When no adapter is registered
    /// for `msg.channel` the message goes to the outbound queue instead.
    pub async fn send_direct(&self, msg: OutboundMessage) -> Result<(), DeliveryError> {
        let channel = self.inner.channels.read().await.get(&msg.channel).cloned();
        match channel {
            Some(channel) => channel.send(msg).await,
            None => {
                debug!(
                    "No adapter registered for {}, queueing outbound message",
                    msg.channel
                );
                self.publish_outbound(msg);
                Ok(())
            }
        }
    }

    /// Subscribe to outbound messages for a specific channel with a callback
    pub async fn subscribe_outbound<F, Fut>(&self, channel: impl Into<String>, callback: F)
    where
        F: Fn(OutboundMessage) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), DeliveryError>> + Send + 'static,
    {
        let channel = channel.into();
        let wrapped: OutboundCallback = Arc::new(move |msg| Box::pin(callback(msg)));

        let mut subscribers = self.inner.subscribers.write().await;
        subscribers.entry(channel).or_default().push(wrapped);
    }

    /// Replace the adapters used by `send_direct`
    pub async fn register_channels(&self, channels: HashMap<String, Arc<dyn ChannelSender>>) {
        *self.inner.channels.write().await = channels;
    }

    /// Names of the channels currently registered for direct send
    pub async fn registered_channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.channels.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run one dispatcher iteration.
    ///
    /// Waits up to `wait` for an outbound message and fans it out to the
    /// subscribers of its channel. Returns `false` if nothing arrived.
    pub async fn dispatch_next(&self, wait: Duration) -> bool {
        match tokio::time::timeout(wait, self.consume_outbound()).await {
            Ok(msg) => {
                self.fan_out(msg).await;
                true
            }
            Err(_) => false,
        }
    }

    async fn fan_out(&self, msg: OutboundMessage) {
        // Snapshot so registration never waits on a slow subscriber.
        let callbacks = self
            .inner
            .subscribers
            .read()
            .await
            .get(&msg.channel)
            .cloned()
            .unwrap_or_default();

        if callbacks.is_empty() {
            debug!("No subscribers for channel: {}", msg.channel);
            return;
        }

        for callback in callbacks {
            let delivery = AssertUnwindSafe(async { callback(msg.clone()).await }).catch_unwind();
            match delivery.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(channel = %msg.channel, "Error dispatching to {}: {}", msg.channel, e);
                }
                Err(_) => {
                    error!(channel = %msg.channel, "Subscriber for {} panicked", msg.channel);
                }
            }
        }
    }

    /// Dispatch outbound messages to subscribed channels until [`stop`](Self::stop).
    /// Run this as a background task.
    ///
    /// Only one dispatcher runs per bus; a second concurrent call returns
    /// immediately.
    pub async fn dispatch_outbound(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!("Outbound dispatcher already running");
            return;
        }

        let token = CancellationToken::new();
        *self.inner.shutdown.lock() = token.clone();
        let _guard = DispatchGuard {
            inner: &self.inner,
            token: token.clone(),
        };
        debug!("Starting outbound dispatcher");

        while self.inner.running.load(Ordering::SeqCst) {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = tokio::time::timeout(self.inner.dispatch_interval, self.consume_outbound()) => next,
            };

            match next {
                Ok(msg) => self.fan_out(msg).await,
                // Check running state periodically
                Err(_) => continue,
            }
        }

        debug!("Outbound dispatcher stopped");
    }

    /// Stop the dispatcher loop. Queued messages stay where they are.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.shutdown.lock().cancel();
    }

    /// Check if the dispatcher is running
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Number of pending inbound messages (best-effort snapshot)
    pub fn inbound_size(&self) -> usize {
        self.inner.inbound.len()
    }

    /// Number of pending outbound messages (best-effort snapshot)
    pub fn outbound_size(&self) -> usize {
        self.inner.outbound.len()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Resets the running flag when the dispatcher future ends without `stop()`,
/// e.g. when its task is aborted.
struct DispatchGuard<'a> {
    inner: &'a BusInner,
    token: CancellationToken,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        // A cancelled token means stop() already reset the flag, possibly for a newer loop.
        if !self.token.is_cancelled() {
            self.token.cancel();
            self.inner.running.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct FailingSender;

    #[async_trait]
    impl ChannelSender for FailingSender {
        async fn send(&self, _msg: OutboundMessage) -> Result<(), DeliveryError> {
            Err(DeliveryError::Rejected("boom".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingSender {
        sent: StdMutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl ChannelSender for RecordingSender {
        async fn send(&self, msg: OutboundMessage) -> Result<(), DeliveryError> {
            self.sent.lock().unwrap().push(msg);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_message_bus_creation() {
        let bus = MessageBus::new();
        assert!(!bus.is_running());
        assert_eq!(bus.inbound_size(), 0);
        assert_eq!(bus.outbound_size(), 0);
    }

    #[tokio::test]
    async fn test_publish_and_consume_inbound() {
        let bus = MessageBus::new();
        bus.publish_inbound(InboundMessage::new("test", "user1", "chat1", "first"));
        bus.publish_inbound(InboundMessage::new("test", "user1", "chat1", "second"));
        assert_eq!(bus.inbound_size(), 2);

        assert_eq!(bus.consume_inbound().await.content, "first");
        assert_eq!(bus.consume_inbound().await.content, "second");
        assert_eq!(bus.inbound_size(), 0);
    }

    #[tokio::test]
    async fn test_consume_waits_for_publish() {
        let bus = MessageBus::new();
        let consumer = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.consume_inbound().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        bus.publish_inbound(InboundMessage::new("test", "u", "c", "late"));
        let msg = consumer.await.unwrap();
        assert_eq!(msg.content, "late");
    }

    #[tokio::test]
    async fn test_cancelled_consume_takes_nothing() {
        let bus = MessageBus::new();
        let waited =
            tokio::time::timeout(Duration::from_millis(20), bus.consume_outbound()).await;
        assert!(waited.is_err());

        bus.publish_outbound(OutboundMessage::new("x", "1", "kept"));
        assert_eq!(bus.outbound_size(), 1);
        assert_eq!(bus.consume_outbound().await.content, "kept");
    }

    #[tokio::test]
    async fn test_send_direct_propagates_adapter_error() {
        let bus = MessageBus::new();
        let mut channels: HashMap<String, Arc<dyn ChannelSender>> = HashMap::new();
        channels.insert("x".to_string(), Arc::new(FailingSender));
        bus.register_channels(channels).await;

        let err = bus
            .send_direct(OutboundMessage::new("x", "1", "hello"))
            .await
            .unwrap_err();

        assert_eq!(err, DeliveryError::Rejected("boom".to_string()));
        assert_eq!(bus.outbound_size(), 0);
    }

    #[tokio::test]
    async fn test_send_direct_falls_back_to_queue() {
        let bus = MessageBus::new();
        let msg = OutboundMessage::new("y", "7", "queued").reply_to("m1");

        bus.send_direct(msg.clone()).await.unwrap();

        assert_eq!(bus.outbound_size(), 1);
        assert_eq!(bus.consume_outbound().await, msg);
    }

    #[tokio::test]
    async fn test_register_channels_replaces_previous() {
        let bus = MessageBus::new();
        let first = Arc::new(RecordingSender::default());
        let second = Arc::new(RecordingSender::default());

        let mut channels: HashMap<String, Arc<dyn ChannelSender>> = HashMap::new();
        channels.insert("a".to_string(), first.clone());
        bus.register_channels(channels).await;

        let mut channels: HashMap<String, Arc<dyn ChannelSender>> = HashMap::new();
        channels.insert("b".to_string(), second.clone());
        bus.register_channels(channels).await;

        assert_eq!(bus.registered_channels().await, vec!["b".to_string()]);

        // "a" is no longer registered, so this one is queued
        bus.send_direct(OutboundMessage::new("a", "1", "to a"))
            .await
            .unwrap();
        bus.send_direct(OutboundMessage::new("b", "1", "to b"))
            .await
            .unwrap();

        assert!(first.sent.lock().unwrap().is_empty());
        assert_eq!(second.sent.lock().unwrap().len(), 1);
        assert_eq!(bus.outbound_size(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_next_delivers_to_subscriber() {
        let bus = MessageBus::new();
        let received = Arc::new(StdMutex::new(Vec::new()));
        let sink = received.clone();
        bus.subscribe_outbound("discord", move |msg| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(msg);
                Ok(())
            }
        })
        .await;

        let msg = OutboundMessage::new("discord", "42", "hi");
        bus.publish_outbound(msg.clone());

        assert!(bus.dispatch_next(Duration::from_millis(100)).await);
        assert_eq!(*received.lock().unwrap(), vec![msg]);
        assert_eq!(bus.outbound_size(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_without_subscribers_drops_message() {
        let bus = MessageBus::new();
        bus.publish_outbound(OutboundMessage::new("nobody", "1", "lost"));

        assert!(bus.dispatch_next(Duration::from_millis(100)).await);
        assert_eq!(bus.outbound_size(), 0);
        assert!(!bus.dispatch_next(Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_failing_subscriber_does_not_block_others() {
        let bus = MessageBus::new();
        let received = Arc::new(StdMutex::new(Vec::new()));

        bus.subscribe_outbound("a", |_msg| async {
            Err(DeliveryError::Transport("always".to_string()))
        })
        .await;
        bus.subscribe_outbound("a", |msg: OutboundMessage| async move {
            if msg.chat_id == "1" {
                panic!("subscriber bug");
            }
            Ok(())
        })
        .await;
        let sink = received.clone();
        bus.subscribe_outbound("a", move |msg| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(msg.content);
                Ok(())
            }
        })
        .await;

        bus.publish_outbound(OutboundMessage::new("a", "1", "one"));
        bus.publish_outbound(OutboundMessage::new("a", "1", "two"));
        assert!(bus.dispatch_next(Duration::from_millis(100)).await);
        assert!(bus.dispatch_next(Duration::from_millis(100)).await);

        assert_eq!(*received.lock().unwrap(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let bus = MessageBus::new();
        bus.stop();
        bus.stop();
        assert!(!bus.is_running());
    }
}
