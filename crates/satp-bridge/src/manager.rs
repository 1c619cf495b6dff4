//! # Bridge Manager Interface

use async_trait::async_trait;
use satp_core::{
    AssignmentAssertionClaim, BurnAssertionClaim, ClaimResult, ErrorTag, LedgerKind,
    LockAssertionClaim, MintAssertionClaim, PledgeClaim, SatpError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Failures reported by a ledger connector. A failed call has no effect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The ledger refused the operation.
    #[error("{ledger} rejected {operation}: {reason}")]
    Rejected {
        ledger: LedgerKind,
        operation: BridgeOp,
        reason: String,
    },

    /// The ledger could not be reached. Safe to retry.
    #[error("{ledger} unavailable: {reason}")]
    Unavailable { ledger: LedgerKind, reason: String },

    #[error("unknown asset {asset_id} on {ledger}")]
    UnknownAsset { ledger: LedgerKind, asset_id: String },

    #[error("{holder} holds {available} of {asset_id}, {requested} required")]
    InsufficientBalance {
        asset_id: String,
        holder: String,
        available: u64,
        requested: u64,
    },
}

impl BridgeError {
    /// Lift into the protocol taxonomy as `SatpError::Bridge`.
    pub fn into_satp(self, operation: BridgeOp, tag: &ErrorTag) -> SatpError {
        SatpError::Bridge {
            tag: tag.clone(),
            operation: operation.name().to_string(),
            reason: self.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// The capability set, as a value for counters, faults and error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeOp {
    Lock,
    Unlock,
    Burn,
    Mint,
    Assign,
    Pledge,
    Claim,
}

impl BridgeOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::Unlock => "unlock",
            Self::Burn => "burn",
            Self::Mint => "mint",
            Self::Assign => "assign",
            Self::Pledge => "pledge",
            Self::Claim => "claim",
        }
    }
}

impl std::fmt::Display for BridgeOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Units of one asset held by one account on one ledger.
///
/// For `burn` and `mint` the owner is the bridge's custody account; for
/// `lock`, `unlock`, `assign` and `pledge` it is the account the units
/// move out of (or, for `unlock`, back to).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
    pub ledger: LedgerKind,
    pub asset_id: String,
    pub owner: String,
    pub amount: u64,
}

impl AssetRef {
    pub fn new(
        ledger: LedgerKind,
        asset_id: impl Into<String>,
        owner: impl Into<String>,
        amount: u64,
    ) -> Self {
        Self {
            ledger,
            asset_id: asset_id.into(),
            owner: owner.into(),
            amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockParams {
    /// How long the lock assertion stays valid.
    pub duration_secs: i64,
}

impl Default for LockParams {
    fn default() -> Self {
        Self {
            duration_secs: 3_600,
        }
    }
}

/// Acknowledgement of an effect that produces no claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectAck {
    pub ledger: LedgerKind,
    pub operation: BridgeOp,
    pub reference: String,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A ledger connector.
///
/// Claims are returned as produced; a connector that omits a payload or a
/// format is reported by the caller with the matching `Missing*` error.
#[async_trait]
pub trait BridgeManager: Send + Sync + std::fmt::Debug {
    fn ledger(&self) -> LedgerKind;

    /// Account holding escrowed, burned-from and minted-into units.
    fn custody_account(&self) -> &str;

    /// Move `asset.amount` from `asset.owner` into custody.
    async fn lock(
        &self,
        asset: &AssetRef,
        params: &LockParams,
    ) -> Result<LockAssertionClaim, BridgeError>;

    /// Return previously locked units from custody to `asset.owner`.
    async fn unlock(&self, asset: &AssetRef) -> Result<EffectAck, BridgeError>;

    /// Destroy custodied units.
    async fn burn(&self, asset: &AssetRef) -> Result<BurnAssertionClaim, BridgeError>;

    /// Create units in custody.
    async fn mint(&self, asset: &AssetRef) -> Result<MintAssertionClaim, BridgeError>;

    /// Move units from `asset.owner` to `to`.
    async fn assign(
        &self,
        asset: &AssetRef,
        to: &str,
    ) -> Result<AssignmentAssertionClaim, BridgeError>;

    /// Place units in escrow under a new pledge reference.
    async fn pledge(&self, asset: &AssetRef) -> Result<PledgeClaim, BridgeError>;

    /// Redeem a pledge into custody.
    async fn claim(&self, pledge_ref: &str) -> Result<ClaimResult, BridgeError>;
}
