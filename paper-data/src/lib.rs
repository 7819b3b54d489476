//! Market Data Pipeline (§4.2-§4.6, §4.13): Tick Bus, Broker Adapter + Feed Supervisor, Candle
//! Engine, Price Oracle, Feed Health Monitor and the Subscription Broker's SSE fan-out. The Tick
//! Bus exclusively owns the latest quote per instrument (§3 Ownership); every other component here
//! reads through it rather than keeping its own copy of the stream.

pub mod broker;
pub mod bus;
pub mod candle;
pub mod error;
pub mod feed;
pub mod health;
pub mod oracle;
pub mod rest;
pub mod subscription;
pub mod tick;

pub use broker::{BrokerAdapter, ConnectionEvent, SubscriptionSet};
pub use bus::{SubscriptionId, TickBus, TickHandler};
pub use candle::{Candle, CandleEngine, CandleEvent, CandleEventKind};
pub use error::DataError;
pub use feed::ShutdownToken;
pub use health::{FeedHealthMonitor, SessionState};
pub use oracle::PriceOracle;
pub use rest::{BrokerRestClient, HistoricalCandle, QuoteResponse};
pub use subscription::{ClientId, SseEvent, SubscriptionBroker};
pub use tick::{BrokerRecord, NormalizedTick};
