use std::{
    collections::HashMap,
    sync::Arc,
};

use chrono::Utc;
use paper_integration::accounts::{AccountType, UserId};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use smol_str::SmolStr;
use tracing::debug;

use crate::{
    error::LedgerError,
    model::{LedgerEntry, LedgerEntryId, ReferenceType},
};

/// Append-only, double-entry journal across `{Cash, MarginBlocked, UnrealizedPnL, RealizedPnL,
/// Fees}` (§4.7). The Ledger is the exclusive owner of monetary truth: the Wallet and Position
/// Store are projections built from [`Ledger::entries_for_user`] and must never be treated as the
/// source of truth themselves.
///
/// Per-user writes are serialized through a per-user [`Mutex`] rather than one global lock, so
/// concurrent ledger activity for different users never contends (§5: "a per-user mutex ...
/// coordinates hot paths").
#[derive(Debug, Default)]
pub struct Ledger {
    entries: RwLock<HashMap<UserId, Vec<LedgerEntry>>>,
    idempotency: RwLock<HashMap<UserId, HashMap<SmolStr, LedgerEntryId>>>,
    user_locks: RwLock<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, user_id: &UserId) -> Arc<Mutex<()>> {
        if let Some(lock) = self.user_locks.read().get(user_id) {
            return Arc::clone(lock);
        }

        Arc::clone(
            self.user_locks
                .write()
                .entry(user_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Append a new double-entry journal row, or return the prior entry's id unchanged if
    /// `idempotency_key` has already been used (§4.7, §7 `IDEMPOTENCY_REPLAY`).
    pub fn record_entry(
        &self,
        user_id: UserId,
        debit_account: AccountType,
        credit_account: AccountType,
        amount: Decimal,
        reference_type: ReferenceType,
        reference_id: impl Into<SmolStr>,
        idempotency_key: impl Into<SmolStr>,
    ) -> Result<LedgerEntryId, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveAmount(amount.to_string()));
        }
        if debit_account == credit_account {
            return Err(LedgerError::SameAccount);
        }

        let idempotency_key = idempotency_key.into();
        let lock = self.lock_for(&user_id);
        let _guard = lock.lock();

        if let Some(existing) = self
            .idempotency
            .read()
            .get(&user_id)
            .and_then(|keys| keys.get(&idempotency_key))
        {
            debug!(%idempotency_key, "ledger entry idempotency replay");
            return Ok(existing.clone());
        }

        let entry = LedgerEntry::new(
            LedgerEntryId::random(),
            user_id.clone(),
            debit_account,
            credit_account,
            amount,
            reference_type,
            reference_id.into(),
            idempotency_key.clone(),
            Utc::now(),
        );

        let id = entry.id.clone();
        self.entries
            .write()
            .entry(user_id.clone())
            .or_default()
            .push(entry);
        self.idempotency
            .write()
            .entry(user_id)
            .or_default()
            .insert(idempotency_key, id.clone());

        Ok(id)
    }

    /// Bootstrap a new user's `Cash` account with the configured initial equity via the
    /// `ADJUSTMENT-WALLET_BOOTSTRAP_CASH-<userId>` sentinel entry (§4.7, §9 Open Question). This
    /// is the journal's unique asymmetric zero: a `RealizedPnl -> Cash` entry whose purpose is
    /// to seed capital, not to record a trade outcome. [`Self::balance`] excludes this entry's
    /// debit leg so `equity == amount` immediately after bootstrap, as if `Cash` had been funded
    /// from outside the journal entirely.
    pub fn bootstrap_cash(
        &self,
        user_id: UserId,
        amount: Decimal,
    ) -> Result<LedgerEntryId, LedgerError> {
        let idempotency_key = format!("ADJUSTMENT-WALLET_BOOTSTRAP_CASH-{user_id}");
        self.record_entry(
            user_id,
            AccountType::RealizedPnl,
            AccountType::Cash,
            amount,
            ReferenceType::Adjustment,
            "bootstrap",
            idempotency_key,
        )
    }

    /// Balance of `account` for `user_id`: `sum(credits) - sum(debits)` over every row touching
    /// that account (§3 LedgerEntry invariant).
    ///
    /// The bootstrap `ADJUSTMENT` entry (see [`Self::bootstrap_cash`]) is the journal's one
    /// deliberately asymmetric row (§9 Open Question): its credit leg funds `Cash` but its debit
    /// leg is bookkeeping filler, not a real outflow, so it is excluded here rather than drawing
    /// down whichever account it was written against. Without this, a freshly bootstrapped
    /// account's `RealizedPnl` balance would read `-initial` and cancel the `Cash` credit out of
    /// equity entirely.
    pub fn balance(&self, user_id: &UserId, account: AccountType) -> Decimal {
        self.entries
            .read()
            .get(user_id)
            .map(|entries| {
                entries.iter().fold(Decimal::ZERO, |acc, entry| {
                    if entry.credit_account == account {
                        acc + entry.amount
                    } else if entry.debit_account == account
                        && entry.reference_type != ReferenceType::Adjustment
                    {
                        acc - entry.amount
                    } else {
                        acc
                    }
                })
            })
            .unwrap_or(Decimal::ZERO)
    }

    /// Every journal row recorded for `user_id`, oldest first - the authoritative replay log used
    /// by `WalletService::recalculate_from_ledger`.
    pub fn entries_for_user(&self, user_id: &UserId) -> Vec<LedgerEntry> {
        self.entries.read().get(user_id).cloned().unwrap_or_default()
    }

    /// Delete every entry and idempotency record for `user_id`. Used by `resetAccount` (§6); the
    /// caller is responsible for re-seeding via [`Self::bootstrap_cash`] afterwards, which must
    /// be free to reuse the `ADJUSTMENT-WALLET_BOOTSTRAP_CASH-<userId>` key.
    pub fn clear_user(&self, user_id: &UserId) {
        self.entries.write().remove(user_id);
        self.idempotency.write().remove(user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn records_a_balanced_entry() {
        let ledger = Ledger::new();
        let user = UserId::new("u1");

        ledger
            .record_entry(
                user.clone(),
                AccountType::Cash,
                AccountType::MarginBlocked,
                dec!(1000.50),
                ReferenceType::Margin,
                "order-1",
                "MARGIN-order-1",
            )
            .unwrap();

        assert_eq!(ledger.balance(&user, AccountType::Cash), dec!(-1000.50));
        assert_eq!(
            ledger.balance(&user, AccountType::MarginBlocked),
            dec!(1000.50)
        );
    }

    #[test]
    fn rejects_non_positive_amount() {
        let ledger = Ledger::new();
        let result = ledger.record_entry(
            UserId::new("u1"),
            AccountType::Cash,
            AccountType::MarginBlocked,
            Decimal::ZERO,
            ReferenceType::Margin,
            "order-1",
            "MARGIN-order-1",
        );
        assert_eq!(result, Err(LedgerError::NonPositiveAmount("0".into())));
    }

    #[test]
    fn duplicate_idempotency_key_returns_prior_entry_without_a_second_write() {
        let ledger = Ledger::new();
        let user = UserId::new("u1");

        let first = ledger
            .record_entry(
                user.clone(),
                AccountType::Cash,
                AccountType::MarginBlocked,
                dec!(500),
                ReferenceType::Margin,
                "order-1",
                "MARGIN-order-1",
            )
            .unwrap();

        let second = ledger
            .record_entry(
                user.clone(),
                AccountType::Cash,
                AccountType::MarginBlocked,
                dec!(500),
                ReferenceType::Margin,
                "order-1",
                "MARGIN-order-1",
            )
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(ledger.entries_for_user(&user).len(), 1);
        assert_eq!(ledger.balance(&user, AccountType::Cash), dec!(-500));
    }

    #[test]
    fn bootstrap_cash_is_idempotent_per_user() {
        let ledger = Ledger::new();
        let user = UserId::new("u1");

        ledger.bootstrap_cash(user.clone(), dec!(1_000_000)).unwrap();
        ledger.bootstrap_cash(user.clone(), dec!(1_000_000)).unwrap();

        assert_eq!(ledger.balance(&user, AccountType::Cash), dec!(1_000_000));
        assert_eq!(ledger.entries_for_user(&user).len(), 1);
    }

    #[test]
    fn equity_formula_reconciles_from_prefix_of_journal() {
        let ledger = Ledger::new();
        let user = UserId::new("u1");

        ledger.bootstrap_cash(user.clone(), dec!(1_000_000)).unwrap();
        ledger
            .record_entry(
                user.clone(),
                AccountType::Cash,
                AccountType::MarginBlocked,
                dec!(1000.50),
                ReferenceType::Margin,
                "order-1",
                "MARGIN-order-1",
            )
            .unwrap();

        let equity = ledger.balance(&user, AccountType::Cash)
            + ledger.balance(&user, AccountType::MarginBlocked)
            + ledger.balance(&user, AccountType::UnrealizedPnl)
            + ledger.balance(&user, AccountType::RealizedPnl)
            - ledger.balance(&user, AccountType::Fees);

        assert_eq!(equity, dec!(1_000_000));
    }
}
