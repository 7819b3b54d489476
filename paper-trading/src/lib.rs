//! Composition root (§9): wires every module of the Market Data Pipeline and the Order Management
//! + Execution Core together, owns the cooperative background tasks that drive them, and exposes
//! the Order API of §6 as plain async functions a web/HTTP layer can call directly.

pub mod error;
pub mod system;

pub use error::to_core_error;
pub use system::System;
