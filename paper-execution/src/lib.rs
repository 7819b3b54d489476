//! Order Management and Execution Core (§4.10-§4.12): the Fill Engine resolves a working order
//! against the current tick, the Execution Service drives the order lifecycle and is the only
//! writer of [`paper_ledger::Ledger`] entries outside of account bootstrap, and the MTM Engine
//! revalues open positions on every tick and triggers forced liquidation.

pub mod error;
pub mod execution;
pub mod fill;
pub mod mtm;
pub mod model;

pub use error::ExecutionError;
pub use execution::ExecutionService;
pub use fill::{resolve_fill, FillOutcome};
pub use model::{FeesBreakdown, NewOrderRequest, Order, OrderId, Trade, TradeId};
pub use mtm::MtmEngine;
