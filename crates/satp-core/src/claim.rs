//! # Claim Evidence
//!
//! Ledger effects produce claims: evidence that an asset was locked, burned,
//! minted or reassigned. A claim is a payload plus a format identifier. The
//! gateway treats the payload as opaque; it only insists that both parts
//! are present, and for locks that the expiration has not passed.
//!
//! Fields are optional because claims arrive from two untrusted places, a
//! bridge manager and a counterpart gateway, and a missing part has to be
//! reported with its own error rather than as a deserialization failure.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorTag, SatpError};
use crate::temporal::Timestamp;

/// Encoding of a claim payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimFormat {
    /// Plain ledger receipt.
    Default,
    /// Ledger view snapshot with proof of inclusion.
    Bungee,
}

fn present(payload: &Option<String>) -> bool {
    payload.as_deref().is_some_and(|p| !p.is_empty())
}

/// Evidence that the source asset is locked until `expiration`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockAssertionClaim {
    pub payload: Option<String>,
    pub format: Option<ClaimFormat>,
    pub expiration: Option<Timestamp>,
}

impl LockAssertionClaim {
    pub fn new(payload: impl Into<String>, format: ClaimFormat, expiration: Timestamp) -> Self {
        Self {
            payload: Some(payload.into()),
            format: Some(format),
            expiration: Some(expiration),
        }
    }

    /// Checks payload, then format, then expiration. An expiration at or
    /// before `now` is rejected.
    pub fn verify(&self, tag: &ErrorTag, now: &Timestamp) -> Result<(), SatpError> {
        if !present(&self.payload) {
            return Err(SatpError::MissingLockAssertionClaim { tag: tag.clone() });
        }
        if self.format.is_none() {
            return Err(SatpError::MissingLockAssertionClaimFormat { tag: tag.clone() });
        }
        let expiration = self
            .expiration
            .ok_or_else(|| SatpError::MissingLockAssertionExpiration { tag: tag.clone() })?;
        if !now.is_before(&expiration) {
            return Err(SatpError::LockAssertionExpired {
                tag: tag.clone(),
                expiration: expiration.to_iso8601(),
            });
        }
        Ok(())
    }
}

macro_rules! assertion_claim {
    ($(#[$meta:meta])* $name:ident, $missing:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            pub payload: Option<String>,
            pub format: Option<ClaimFormat>,
        }

        impl $name {
            pub fn new(payload: impl Into<String>, format: ClaimFormat) -> Self {
                Self {
                    payload: Some(payload.into()),
                    format: Some(format),
                }
            }

            /// A claim lacking either its payload or its format is missing.
            pub fn verify(&self, tag: &ErrorTag) -> Result<(), SatpError> {
                if present(&self.payload) && self.format.is_some() {
                    Ok(())
                } else {
                    Err(SatpError::$missing { tag: tag.clone() })
                }
            }
        }
    };
}

assertion_claim!(
    /// Evidence that the source asset was destroyed on the source ledger.
    BurnAssertionClaim,
    MissingBurnAssertionClaim
);

assertion_claim!(
    /// Evidence that the equivalent asset was created on the recipient ledger.
    MintAssertionClaim,
    MissingMintAssertionClaim
);

assertion_claim!(
    /// Evidence that the minted asset was assigned to the beneficiary.
    AssignmentAssertionClaim,
    MissingAssignmentAssertionClaim
);

/// Evidence that an asset was placed in escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PledgeClaim {
    pub pledge_ref: String,
    pub payload: String,
    pub format: ClaimFormat,
}

/// Outcome of redeeming a pledge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResult {
    pub pledge_ref: String,
    pub released: bool,
    pub receipt: String,
}
