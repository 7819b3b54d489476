//! Shared plumbing used by every paper trading core crate: channel primitives, the structured
//! error taxonomy (§7), ledger account types (§3), fixed-point money helpers (§4.7), process
//! configuration (§6) and observability counters.

/// Ledger [`accounts::AccountType`] and [`accounts::UserId`] shared across Ledger, Wallet and
/// Execution.
pub mod accounts;

/// Process-wide configuration sourced from the environment (§6).
pub mod config;

/// The structured `{code, message}` error taxonomy (§7).
pub mod error;

/// Random identifier generation shared by every `*Id` newtype in the workspace.
pub mod id;

/// Fixed-point money and tick-size rounding helpers (§4.7, §4.10).
pub mod money;

/// Monotonic counters for observability (§7).
pub mod metrics;

/// Shared order domain primitives - side, type, status and exit reason (§3 Order).
pub mod order;
