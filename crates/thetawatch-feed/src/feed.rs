//! Feed trait and event channel.

use std::pin::Pin;
use std::sync::Arc;

use thetawatch_core::Tick;
use tokio::sync::mpsc;

use crate::error::{FeedError, FeedResult};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Event pushed from a feed to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Market update for a subscribed symbol.
    Tick(Tick),
    /// Connection (re)established. Subscriptions must be replayed.
    Connected,
    /// Connection lost.
    Disconnected,
}

/// Sending half of the feed event channel.
#[derive(Debug, Clone)]
pub struct FeedEventSender {
    tx: mpsc::Sender<FeedEvent>,
}

impl FeedEventSender {
    /// Push an event, waiting for channel capacity.
    pub async fn send(&self, event: FeedEvent) -> FeedResult<()> {
        self.tx.send(event).await.map_err(|_| FeedError::ChannelClosed)
    }

    /// Push an event without waiting. Fails if the channel is full or closed.
    pub fn try_send(&self, event: FeedEvent) -> FeedResult<()> {
        self.tx.try_send(event).map_err(|_| FeedError::ChannelClosed)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a bounded feed event channel.
#[must_use]
pub fn event_channel(capacity: usize) -> (FeedEventSender, mpsc::Receiver<FeedEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (FeedEventSender { tx }, rx)
}

/// Market-tick feed.
///
/// Events are delivered through the [`FeedEventSender`] the feed was built
/// with; this trait only carries the control surface.
pub trait MarketFeed: Send + Sync {
    /// Start receiving ticks for `symbols`.
    fn subscribe(&self, symbols: Vec<String>) -> BoxFuture<'_, FeedResult<()>>;

    /// Stop receiving ticks for `symbols`.
    fn unsubscribe(&self, symbols: Vec<String>) -> BoxFuture<'_, FeedResult<()>>;

    /// Whether the feed is currently connected.
    fn is_connected(&self) -> bool;
}

/// Arc wrapper for MarketFeed trait objects.
pub type DynMarketFeed = Arc<dyn MarketFeed>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_channel_delivers_in_order() {
        let (tx, mut rx) = event_channel(4);
        tx.send(FeedEvent::Connected).await.unwrap();
        tx.try_send(FeedEvent::Disconnected).unwrap();
        assert_eq!(rx.recv().await, Some(FeedEvent::Connected));
        assert_eq!(rx.recv().await, Some(FeedEvent::Disconnected));
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (tx, rx) = event_channel(1);
        drop(rx);
        assert!(tx.is_closed());
        assert!(matches!(
            tx.send(FeedEvent::Connected).await,
            Err(FeedError::ChannelClosed)
        ));
    }
}
