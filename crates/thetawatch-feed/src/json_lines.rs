//! Newline-delimited JSON tick feed.
//!
//! Each input line is one `Tick` object:
//! `{"symbol":"SPY","timestamp":"2024-03-01T14:30:00Z","mid":"512.4"}`.
//! Only ticks for subscribed symbols are forwarded. Malformed lines are
//! logged and skipped.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use thetawatch_core::Tick;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use crate::error::{FeedError, FeedResult};
use crate::feed::{BoxFuture, FeedEvent, FeedEventSender, MarketFeed};

/// Feed reading ticks from any async line source (stdin, a file, a socket).
#[derive(Debug)]
pub struct JsonLinesFeed {
    events: FeedEventSender,
    subscribed: RwLock<HashSet<String>>,
    connected: AtomicBool,
}

impl JsonLinesFeed {
    pub fn new(events: FeedEventSender) -> Self {
        Self {
            events,
            subscribed: RwLock::new(HashSet::new()),
            connected: AtomicBool::new(false),
        }
    }

    /// Parse one line into a tick.
    pub fn parse_line(line: &str) -> FeedResult<Tick> {
        let tick: Tick = serde_json::from_str(line)?;
        if tick.symbol.is_empty() {
            return Err(FeedError::Parse("empty symbol".to_string()));
        }
        Ok(tick)
    }

    /// Read until end of input. Returns the number of forwarded ticks.
    ///
    /// Emits `Connected` on start and `Disconnected` at end of input.
    pub async fn run<R>(&self, reader: R) -> FeedResult<u64>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut forwarded = 0u64;

        self.connected.store(true, Ordering::SeqCst);
        self.events.send(FeedEvent::Connected).await?;
        info!("JSON lines feed connected");

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let tick = match Self::parse_line(line) {
                Ok(tick) => tick,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed tick line");
                    continue;
                }
            };

            if !self.subscribed.read().contains(&tick.symbol) {
                debug!(symbol = %tick.symbol, "Ignoring tick for unsubscribed symbol");
                continue;
            }

            self.events.send(FeedEvent::Tick(tick)).await?;
            forwarded += 1;
        }

        self.connected.store(false, Ordering::SeqCst);
        info!(forwarded, "JSON lines feed reached end of input");
        // The receiver may already be gone during shutdown.
        let _ = self.events.send(FeedEvent::Disconnected).await;
        Ok(forwarded)
    }
}

impl MarketFeed for JsonLinesFeed {
    fn subscribe(&self, symbols: Vec<String>) -> BoxFuture<'_, FeedResult<()>> {
        Box::pin(async move {
            self.subscribed.write().extend(symbols);
            Ok(())
        })
    }

    fn unsubscribe(&self, symbols: Vec<String>) -> BoxFuture<'_, FeedResult<()>> {
        Box::pin(async move {
            let mut subscribed = self.subscribed.write();
            for symbol in &symbols {
                subscribed.remove(symbol);
            }
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
    use rust_decimal_macros::dec;

    const INPUT: &str = r#"{"symbol":"SPY","timestamp":"2024-03-01T14:30:00Z","mid":"512.4"}
not json
{"symbol":"QQQ","timestamp":"2024-03-01T14:30:01Z","last":"440.1"}

{"symbol":"SPY","timestamp":"2024-03-01T14:30:02Z","bid":"512.3","ask":"512.5"}
"#;

    #[test]
    fn test_parse_line() {
        let tick =
            JsonLinesFeed::parse_line(r#"{"symbol":"SPY","timestamp":"2024-03-01T14:30:00Z","mid":"512.4"}"#)
                .unwrap();
        assert_eq!(tick.symbol, "SPY");
        assert_eq!(tick.mid, Some(dec!(512.4)));
        assert!(tick.bid.is_none());

        assert!(JsonLinesFeed::parse_line("{}").is_err());
        assert!(JsonLinesFeed::parse_line(
            r#"{"symbol":"","timestamp":"2024-03-01T14:30:00Z"}"#
        )
        .is_err());
    }

    #[tokio::test]
    async fn test_forwards_only_subscribed_ticks() {
        let (tx, mut rx) = event_channel(16);
        let feed = JsonLinesFeed::new(tx);
        feed.subscribe(vec!["SPY".to_string()]).await.unwrap();

        let forwarded = feed.run(INPUT.as_bytes()).await.unwrap();
        assert_eq!(forwarded, 2);
        assert!(!feed.is_connected());

        assert_eq!(rx.recv().await, Some(FeedEvent::Connected));
        match rx.recv().await {
            Some(FeedEvent::Tick(tick)) => assert_eq!(tick.mid, Some(dec!(512.4))),
            other => panic!("expected tick, got {other:?}"),
        }
        match rx.recv().await {
            Some(FeedEvent::Tick(tick)) => assert_eq!(tick.bid, Some(dec!(512.3))),
            other => panic!("expected tick, got {other:?}"),
        }
        assert_eq!(rx.recv().await, Some(FeedEvent::Disconnected));
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_forwarding() {
        let (tx, _rx) = event_channel(16);
        let feed = JsonLinesFeed::new(tx);
        feed.subscribe(vec!["SPY".to_string(), "QQQ".to_string()]).await.unwrap();
        feed.unsubscribe(vec!["SPY".to_string()]).await.unwrap();

        let forwarded = feed.run(INPUT.as_bytes()).await.unwrap();
        assert_eq!(forwarded, 1);
    }
}
