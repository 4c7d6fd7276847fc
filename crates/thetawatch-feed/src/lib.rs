//! Market tick feed for thetawatch.
//!
//! - `MarketFeed`: subscribe/unsubscribe contract implemented by feeds
//! - `FeedEvent`: ticks and connection transitions pushed to the engine
//! - `JsonLinesFeed`: newline-delimited JSON tick reader
//! - `MockMarketFeed`: recording feed for tests

pub mod error;
pub mod feed;
pub mod json_lines;
pub mod mock;

pub use error::{FeedError, FeedResult};
pub use feed::{event_channel, BoxFuture, DynMarketFeed, FeedEvent, FeedEventSender, MarketFeed};
pub use json_lines::JsonLinesFeed;
pub use mock::MockMarketFeed;
