//! The Ledger exclusively owns monetary truth (§3 Ownership). This crate provides the append-only
//! double-entry journal (§4.7) plus the Wallet and Position Store projections built from it
//! (§4.8) - both rebuildable from the journal alone and never themselves a source of truth.

pub mod error;
pub mod ledger;
pub mod model;
pub mod position;
pub mod wallet;

pub use error::LedgerError;
pub use ledger::Ledger;
pub use model::{LedgerEntry, LedgerEntryId, ReferenceType};
pub use position::{Position, PositionStore};
pub use wallet::{AccountState, MarginStatus, WalletProjection, WalletService};
