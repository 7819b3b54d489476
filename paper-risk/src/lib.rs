//! Order Acceptance and Pre-Trade Risk (§4.9). [`acceptance::check_acceptance`] runs the cheap,
//! synchronous per-order checks; [`pretrade::check_pretrade`] runs the portfolio-level projections
//! against a caller-supplied post-trade snapshot. Neither module owns any state - both are pure
//! functions over inputs resolved by the caller from the Instrument Store, Price Oracle, Ledger and
//! Position Store.

pub mod acceptance;
pub mod error;
pub mod pretrade;

pub use acceptance::{check_acceptance, AcceptanceRequest};
pub use error::RiskError;
pub use pretrade::{check_pretrade, project_positions, project_quantity, PretradeRequest, ProjectedPosition};
