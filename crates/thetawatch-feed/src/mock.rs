//! Recording feed for tests.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use thetawatch_core::Tick;

use crate::error::{FeedError, FeedResult};
use crate::feed::{BoxFuture, FeedEvent, FeedEventSender, MarketFeed};

/// Mock feed that records subscription calls and lets tests push events.
#[derive(Debug)]
pub struct MockMarketFeed {
    events: FeedEventSender,
    subscribe_calls: Mutex<Vec<Vec<String>>>,
    unsubscribe_calls: Mutex<Vec<Vec<String>>>,
    connected: AtomicBool,
    reject_subscriptions: AtomicBool,
}

impl MockMarketFeed {
    /// Create a connected mock feed.
    pub fn new(events: FeedEventSender) -> Self {
        Self {
            events,
            subscribe_calls: Mutex::new(Vec::new()),
            unsubscribe_calls: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            reject_subscriptions: AtomicBool::new(false),
        }
    }

    /// Make subsequent subscribe calls fail.
    pub fn set_reject_subscriptions(&self, reject: bool) {
        self.reject_subscriptions.store(reject, Ordering::SeqCst);
    }

    /// Recorded subscribe calls.
    pub fn subscribe_calls(&self) -> Vec<Vec<String>> {
        self.subscribe_calls.lock().clone()
    }

    /// Recorded unsubscribe calls.
    pub fn unsubscribe_calls(&self) -> Vec<Vec<String>> {
        self.unsubscribe_calls.lock().clone()
    }

    /// Push a tick to the engine.
    pub async fn push_tick(&self, tick: Tick) -> FeedResult<()> {
        self.events.send(FeedEvent::Tick(tick)).await
    }

    /// Simulate a connection drop.
    pub async fn disconnect(&self) -> FeedResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.events.send(FeedEvent::Disconnected).await
    }

    /// Simulate a reconnect.
    pub async fn reconnect(&self) -> FeedResult<()> {
        self.connected.store(true, Ordering::SeqCst);
        self.events.send(FeedEvent::Connected).await
    }
}

impl MarketFeed for MockMarketFeed {
    fn subscribe(&self, symbols: Vec<String>) -> BoxFuture<'_, FeedResult<()>> {
        Box::pin(async move {
            if !self.connected.load(Ordering::SeqCst) {
                return Err(FeedError::Disconnected);
            }
            if self.reject_subscriptions.load(Ordering::SeqCst) {
                return Err(FeedError::SubscriptionRejected(symbols.join(",")));
            }
            self.subscribe_calls.lock().push(symbols);
            Ok(())
        })
    }

    fn unsubscribe(&self, symbols: Vec<String>) -> BoxFuture<'_, FeedResult<()>> {
        Box::pin(async move {
            self.unsubscribe_calls.lock().push(symbols);
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::event_channel;

    #[tokio::test]
    async fn test_mock_records_calls() {
        let (tx, _rx) = event_channel(8);
        let feed = MockMarketFeed::new(tx);

        tokio_test::assert_ok!(feed.subscribe(vec!["SPY".to_string()]).await);
        tokio_test::assert_ok!(feed.unsubscribe(vec!["SPY".to_string()]).await);

        assert_eq!(feed.subscribe_calls(), vec![vec!["SPY".to_string()]]);
        assert_eq!(feed.unsubscribe_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_rejects_when_configured() {
        let (tx, _rx) = event_channel(8);
        let feed = MockMarketFeed::new(tx);
        feed.set_reject_subscriptions(true);

        let result = feed.subscribe(vec!["SPY".to_string()]).await;
        let err = tokio_test::assert_err!(result);
        assert!(matches!(err, FeedError::SubscriptionRejected(_)));
        assert!(feed.subscribe_calls().is_empty());
    }

    #[tokio::test]
    async fn test_connection_transitions_are_pushed() {
        let (tx, mut rx) = event_channel(8);
        let feed = MockMarketFeed::new(tx);

        feed.disconnect().await.unwrap();
        assert!(!feed.is_connected());
        feed.reconnect().await.unwrap();
        assert!(feed.is_connected());

        assert_eq!(rx.recv().await, Some(FeedEvent::Disconnected));
        assert_eq!(rx.recv().await, Some(FeedEvent::Connected));
    }

    #[tokio::test]
    async fn test_subscribe_while_disconnected_fails() {
        let (tx, _rx) = event_channel(8);
        let feed = MockMarketFeed::new(tx);
        feed.disconnect().await.unwrap();

        let err = tokio_test::assert_err!(feed.subscribe(vec!["SPY".to_string()]).await);
        assert!(matches!(err, FeedError::Disconnected));
        assert!(feed.subscribe_calls().is_empty());
    }
}
