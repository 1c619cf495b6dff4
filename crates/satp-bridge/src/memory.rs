//! # In-Memory Ledger
//!
//! A bridge manager over a balance book. Used by tests and by local
//! simulation of two gateways in one process.
//!
//! Faults are injected per operation. `Reject` and the claim omissions
//! persist until cleared; `Unavailable` fails the next `remaining` calls
//! and then lifts itself. An omitted claim part still applies the effect,
//! which is what a misbehaving connector would do.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use satp_core::{
    AssignmentAssertionClaim, BurnAssertionClaim, ClaimFormat, ClaimResult, LedgerKind,
    LockAssertionClaim, MintAssertionClaim, PledgeClaim, Timestamp,
};
use tracing::debug;

use crate::manager::{AssetRef, BridgeError, BridgeManager, BridgeOp, EffectAck, LockParams};

/// A fault to inject into one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    Reject(String),
    Unavailable { remaining: u32 },
    OmitPayload,
    OmitFormat,
    OmitExpiration,
}

#[derive(Debug, Clone)]
struct Pledge {
    asset: AssetRef,
    claimed: bool,
}

#[derive(Debug, Default)]
struct Book {
    holdings: HashMap<(String, String), u64>,
    pledges: HashMap<String, Pledge>,
    next_ref: u64,
    attempts: HashMap<BridgeOp, u32>,
    applied: HashMap<BridgeOp, u32>,
    faults: HashMap<BridgeOp, Fault>,
    delays: HashMap<BridgeOp, Duration>,
}

impl Book {
    fn balance(&self, asset_id: &str, holder: &str) -> u64 {
        self.holdings
            .get(&(asset_id.to_string(), holder.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn debit(&mut self, asset_id: &str, holder: &str, amount: u64) -> Result<(), BridgeError> {
        let available = self.balance(asset_id, holder);
        if available < amount {
            return Err(BridgeError::InsufficientBalance {
                asset_id: asset_id.to_string(),
                holder: holder.to_string(),
                available,
                requested: amount,
            });
        }
        self.holdings
            .insert((asset_id.to_string(), holder.to_string()), available - amount);
        Ok(())
    }

    fn credit(&mut self, asset_id: &str, holder: &str, amount: u64) {
        *self
            .holdings
            .entry((asset_id.to_string(), holder.to_string()))
            .or_insert(0) += amount;
    }

    fn transfer(
        &mut self,
        asset_id: &str,
        from: &str,
        to: &str,
        amount: u64,
    ) -> Result<(), BridgeError> {
        self.debit(asset_id, from, amount)?;
        self.credit(asset_id, to, amount);
        Ok(())
    }

    fn reference(&mut self, ledger: LedgerKind, op: BridgeOp) -> String {
        self.next_ref += 1;
        format!("{}-{}-{}", ledger.as_str().to_lowercase(), op.name(), self.next_ref)
    }
}

/// Thread-safe in-memory bridge for one ledger.
#[derive(Debug)]
pub struct MemoryLedger {
    ledger: LedgerKind,
    custody: String,
    book: Mutex<Book>,
}

impl MemoryLedger {
    pub fn new(ledger: LedgerKind) -> Self {
        let custody = format!("{}-custody", ledger.as_str().to_lowercase());
        Self::with_custody(ledger, custody)
    }

    pub fn with_custody(ledger: LedgerKind, custody: impl Into<String>) -> Self {
        Self {
            ledger,
            custody: custody.into(),
            book: Mutex::new(Book::default()),
        }
    }

    /// Seed `holder` with units of `asset_id`.
    pub fn deposit(&self, asset_id: &str, holder: &str, amount: u64) {
        self.book.lock().credit(asset_id, holder, amount);
    }

    pub fn balance(&self, asset_id: &str, holder: &str) -> u64 {
        self.book.lock().balance(asset_id, holder)
    }

    pub fn custody_balance(&self, asset_id: &str) -> u64 {
        self.balance(asset_id, &self.custody)
    }

    /// Units of `asset_id` across all holders.
    pub fn supply(&self, asset_id: &str) -> u64 {
        self.book
            .lock()
            .holdings
            .iter()
            .filter(|((a, _), _)| a == asset_id)
            .map(|(_, v)| *v)
            .sum()
    }

    pub fn inject(&self, op: BridgeOp, fault: Fault) {
        self.book.lock().faults.insert(op, fault);
    }

    pub fn clear_faults(&self) {
        self.book.lock().faults.clear();
    }

    /// Delay every call to `op` before its effect is applied.
    pub fn delay(&self, op: BridgeOp, by: Duration) {
        self.book.lock().delays.insert(op, by);
    }

    /// Calls made to `op`, failed ones included.
    pub fn attempts(&self, op: BridgeOp) -> u32 {
        self.book.lock().attempts.get(&op).copied().unwrap_or(0)
    }

    /// Calls to `op` whose effect was applied.
    pub fn calls(&self, op: BridgeOp) -> u32 {
        self.book.lock().applied.get(&op).copied().unwrap_or(0)
    }

    /// Count the attempt and evaluate the injected fault. The guard is
    /// released before the caller awaits the configured delay.
    fn begin(&self, op: BridgeOp) -> Result<(Option<Fault>, Option<Duration>), BridgeError> {
        let mut book = self.book.lock();
        *book.attempts.entry(op).or_insert(0) += 1;
        let delay = book.delays.get(&op).copied();
        let fault = book.faults.get(&op).cloned();
        match fault {
            Some(Fault::Reject(reason)) => Err(BridgeError::Rejected {
                ledger: self.ledger,
                operation: op,
                reason,
            }),
            Some(Fault::Unavailable { remaining }) => {
                if remaining <= 1 {
                    book.faults.remove(&op);
                } else {
                    book.faults
                        .insert(op, Fault::Unavailable { remaining: remaining - 1 });
                }
                Err(BridgeError::Unavailable {
                    ledger: self.ledger,
                    reason: format!("{op} connector offline"),
                })
            }
            other => Ok((other, delay)),
        }
    }

    async fn enter(&self, op: BridgeOp) -> Result<Option<Fault>, BridgeError> {
        let (fault, delay) = self.begin(op)?;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(fault)
    }

    fn check_ledger(&self, asset: &AssetRef) -> Result<(), BridgeError> {
        if asset.ledger != self.ledger {
            return Err(BridgeError::UnknownAsset {
                ledger: self.ledger,
                asset_id: format!("{}:{}", asset.ledger, asset.asset_id),
            });
        }
        Ok(())
    }

    /// Apply `effect` to the book and count it. Returns a fresh reference.
    fn apply(
        &self,
        op: BridgeOp,
        effect: impl FnOnce(&mut Book) -> Result<(), BridgeError>,
    ) -> Result<String, BridgeError> {
        let mut book = self.book.lock();
        effect(&mut book)?;
        *book.applied.entry(op).or_insert(0) += 1;
        Ok(book.reference(self.ledger, op))
    }
}

fn claim_parts(fault: &Option<Fault>, payload: String) -> (Option<String>, Option<ClaimFormat>) {
    match fault {
        Some(Fault::OmitPayload) => (None, Some(ClaimFormat::Default)),
        Some(Fault::OmitFormat) => (Some(payload), None),
        _ => (Some(payload), Some(ClaimFormat::Default)),
    }
}

#[async_trait]
impl BridgeManager for MemoryLedger {
    fn ledger(&self) -> LedgerKind {
        self.ledger
    }

    fn custody_account(&self) -> &str {
        &self.custody
    }

    async fn lock(
        &self,
        asset: &AssetRef,
        params: &LockParams,
    ) -> Result<LockAssertionClaim, BridgeError> {
        self.check_ledger(asset)?;
        let fault = self.enter(BridgeOp::Lock).await?;
        let reference = self.apply(BridgeOp::Lock, |book| {
            book.transfer(&asset.asset_id, &asset.owner, &self.custody, asset.amount)
        })?;
        debug!(ledger = %self.ledger, asset = %asset.asset_id, owner = %asset.owner, amount = asset.amount, "locked");
        let (payload, format) = claim_parts(&fault, reference);
        let expiration = match fault {
            Some(Fault::OmitExpiration) => None,
            _ => Some(Timestamp::now().plus_secs(params.duration_secs)),
        };
        Ok(LockAssertionClaim {
            payload,
            format,
            expiration,
        })
    }

    async fn unlock(&self, asset: &AssetRef) -> Result<EffectAck, BridgeError> {
        self.check_ledger(asset)?;
        self.enter(BridgeOp::Unlock).await?;
        let reference = self.apply(BridgeOp::Unlock, |book| {
            book.transfer(&asset.asset_id, &self.custody, &asset.owner, asset.amount)
        })?;
        debug!(ledger = %self.ledger, asset = %asset.asset_id, owner = %asset.owner, amount = asset.amount, "unlocked");
        Ok(EffectAck {
            ledger: self.ledger,
            operation: BridgeOp::Unlock,
            reference,
        })
    }

    async fn burn(&self, asset: &AssetRef) -> Result<BurnAssertionClaim, BridgeError> {
        self.check_ledger(asset)?;
        let fault = self.enter(BridgeOp::Burn).await?;
        let reference = self.apply(BridgeOp::Burn, |book| {
            book.debit(&asset.asset_id, &self.custody, asset.amount)
        })?;
        debug!(ledger = %self.ledger, asset = %asset.asset_id, amount = asset.amount, "burned");
        let (payload, format) = claim_parts(&fault, reference);
        Ok(BurnAssertionClaim { payload, format })
    }

    async fn mint(&self, asset: &AssetRef) -> Result<MintAssertionClaim, BridgeError> {
        self.check_ledger(asset)?;
        let fault = self.enter(BridgeOp::Mint).await?;
        let reference = self.apply(BridgeOp::Mint, |book| {
            book.credit(&asset.asset_id, &self.custody, asset.amount);
            Ok(())
        })?;
        debug!(ledger = %self.ledger, asset = %asset.asset_id, amount = asset.amount, "minted");
        let (payload, format) = claim_parts(&fault, reference);
        Ok(MintAssertionClaim { payload, format })
    }

    async fn assign(
        &self,
        asset: &AssetRef,
        to: &str,
    ) -> Result<AssignmentAssertionClaim, BridgeError> {
        self.check_ledger(asset)?;
        let fault = self.enter(BridgeOp::Assign).await?;
        let reference = self.apply(BridgeOp::Assign, |book| {
            book.transfer(&asset.asset_id, &asset.owner, to, asset.amount)
        })?;
        debug!(ledger = %self.ledger, asset = %asset.asset_id, from = %asset.owner, to, amount = asset.amount, "assigned");
        let (payload, format) = claim_parts(&fault, reference);
        Ok(AssignmentAssertionClaim { payload, format })
    }

    async fn pledge(&self, asset: &AssetRef) -> Result<PledgeClaim, BridgeError> {
        self.check_ledger(asset)?;
        self.enter(BridgeOp::Pledge).await?;
        let pledge_ref = self.apply(BridgeOp::Pledge, |book| {
            book.debit(&asset.asset_id, &asset.owner, asset.amount)
        })?;
        self.book.lock().pledges.insert(
            pledge_ref.clone(),
            Pledge {
                asset: asset.clone(),
                claimed: false,
            },
        );
        Ok(PledgeClaim {
            payload: format!("{}:{}:{}", asset.asset_id, asset.owner, asset.amount),
            pledge_ref,
            format: ClaimFormat::Default,
        })
    }

    async fn claim(&self, pledge_ref: &str) -> Result<ClaimResult, BridgeError> {
        self.enter(BridgeOp::Claim).await?;
        let mut released = false;
        let receipt = self.apply(BridgeOp::Claim, |book| {
            let pledge = book
                .pledges
                .get_mut(pledge_ref)
                .ok_or_else(|| BridgeError::UnknownAsset {
                    ledger: self.ledger,
                    asset_id: pledge_ref.to_string(),
                })?;
            if pledge.claimed {
                return Ok(());
            }
            pledge.claimed = true;
            let asset = pledge.asset.clone();
            book.credit(&asset.asset_id, &self.custody, asset.amount);
            released = true;
            Ok(())
        })?;
        Ok(ClaimResult {
            pledge_ref: pledge_ref.to_string(),
            released,
            receipt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bond(owner: &str, amount: u64) -> AssetRef {
        AssetRef::new(LedgerKind::Fabric, "bond", owner, amount)
    }

    fn ledger() -> MemoryLedger {
        let l = MemoryLedger::new(LedgerKind::Fabric);
        l.deposit("bond", "alice", 100);
        l
    }

    #[tokio::test]
    async fn lock_moves_units_into_custody_with_full_claim() {
        let l = ledger();
        let claim = l.lock(&bond("alice", 40), &LockParams::default()).await.unwrap();
        assert_eq!(l.balance("bond", "alice"), 60);
        assert_eq!(l.custody_balance("bond"), 40);
        assert!(claim.payload.is_some());
        assert_eq!(claim.format, Some(ClaimFormat::Default));
        assert!(claim.expiration.is_some());
        assert_eq!(l.calls(BridgeOp::Lock), 1);
    }

    #[tokio::test]
    async fn unlock_restores_owner() {
        let l = ledger();
        l.lock(&bond("alice", 40), &LockParams::default()).await.unwrap();
        l.unlock(&bond("alice", 40)).await.unwrap();
        assert_eq!(l.balance("bond", "alice"), 100);
        assert_eq!(l.custody_balance("bond"), 0);
    }

    #[tokio::test]
    async fn burn_and_mint_change_supply() {
        let l = ledger();
        l.lock(&bond("alice", 40), &LockParams::default()).await.unwrap();
        let custody = l.custody_account().to_string();
        l.burn(&bond(&custody, 40)).await.unwrap();
        assert_eq!(l.supply("bond"), 60);
        l.mint(&bond(&custody, 15)).await.unwrap();
        assert_eq!(l.supply("bond"), 75);
    }

    #[tokio::test]
    async fn assign_moves_between_holders() {
        let l = ledger();
        l.assign(&bond("alice", 30), "bob").await.unwrap();
        assert_eq!(l.balance("bond", "bob"), 30);
        assert_eq!(l.balance("bond", "alice"), 70);
    }

    #[tokio::test]
    async fn insufficient_balance_has_no_effect() {
        let l = ledger();
        let err = l
            .lock(&bond("alice", 500), &LockParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InsufficientBalance { available: 100, .. }));
        assert_eq!(l.balance("bond", "alice"), 100);
        assert_eq!(l.attempts(BridgeOp::Lock), 1);
        assert_eq!(l.calls(BridgeOp::Lock), 0);
    }

    #[tokio::test]
    async fn wrong_ledger_is_unknown_asset() {
        let l = ledger();
        let asset = AssetRef::new(LedgerKind::Besu, "bond", "alice", 1);
        assert!(matches!(
            l.lock(&asset, &LockParams::default()).await,
            Err(BridgeError::UnknownAsset { .. })
        ));
    }

    #[tokio::test]
    async fn rejection_fault_persists() {
        let l = ledger();
        l.inject(BridgeOp::Lock, Fault::Reject("frozen".into()));
        for _ in 0..2 {
            assert!(matches!(
                l.lock(&bond("alice", 1), &LockParams::default()).await,
                Err(BridgeError::Rejected { .. })
            ));
        }
        l.clear_faults();
        assert!(l.lock(&bond("alice", 1), &LockParams::default()).await.is_ok());
    }

    #[tokio::test]
    async fn unavailable_fault_lifts_after_count() {
        let l = ledger();
        l.inject(BridgeOp::Mint, Fault::Unavailable { remaining: 2 });
        let custody = l.custody_account().to_string();
        assert!(l.mint(&bond(&custody, 1)).await.is_err());
        assert!(l.mint(&bond(&custody, 1)).await.is_err());
        assert!(l.mint(&bond(&custody, 1)).await.is_ok());
        assert_eq!(l.attempts(BridgeOp::Mint), 3);
        assert_eq!(l.calls(BridgeOp::Mint), 1);
    }

    #[tokio::test]
    async fn omitted_claim_parts_still_apply_effect() {
        let l = ledger();
        l.inject(BridgeOp::Lock, Fault::OmitPayload);
        let claim = l.lock(&bond("alice", 10), &LockParams::default()).await.unwrap();
        assert!(claim.payload.is_none());
        assert_eq!(l.custody_balance("bond"), 10);

        l.inject(BridgeOp::Lock, Fault::OmitExpiration);
        let claim = l.lock(&bond("alice", 10), &LockParams::default()).await.unwrap();
        assert!(claim.payload.is_some());
        assert!(claim.expiration.is_none());
    }

    #[tokio::test]
    async fn pledge_then_claim_once() {
        let l = ledger();
        let pledge = l.pledge(&bond("alice", 25)).await.unwrap();
        assert_eq!(l.balance("bond", "alice"), 75);
        let first = l.claim(&pledge.pledge_ref).await.unwrap();
        assert!(first.released);
        assert_eq!(l.custody_balance("bond"), 25);
        let second = l.claim(&pledge.pledge_ref).await.unwrap();
        assert!(!second.released);
        assert_eq!(l.custody_balance("bond"), 25);
        assert!(l.claim("nope").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_observed_before_effect() {
        let l = ledger();
        l.delay(BridgeOp::Lock, Duration::from_secs(5));
        let started = tokio::time::Instant::now();
        l.lock(&bond("alice", 1), &LockParams::default()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}
