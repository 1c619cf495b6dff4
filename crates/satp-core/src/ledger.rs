//! # Ledger Kinds and Protocol Stages
//!
//! `LedgerKind` is the closed set of ledger technologies a gateway can
//! front. Bridge managers are selected by matching on it; there is no
//! per-ledger gateway subtype anywhere in the stack.
//!
//! `Stage` numbers the four SATP phases. It is carried in every error tag
//! and failure record so a terminal session names the phase it died in.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Ledger technologies reachable through a bridge manager.
///
/// | Kind | Wire name |
/// |------|-----------|
/// | Fabric | `FABRIC` |
/// | Besu | `BESU` |
/// | Ethereum | `ETHEREUM` |
/// | Corda | `CORDA` |
/// | Sawtooth | `SAWTOOTH` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerKind {
    Fabric,
    Besu,
    Ethereum,
    Corda,
    Sawtooth,
}

impl LedgerKind {
    pub fn all() -> &'static [LedgerKind] {
        &[
            Self::Fabric,
            Self::Besu,
            Self::Ethereum,
            Self::Corda,
            Self::Sawtooth,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fabric => "FABRIC",
            Self::Besu => "BESU",
            Self::Ethereum => "ETHEREUM",
            Self::Corda => "CORDA",
            Self::Sawtooth => "SAWTOOTH",
        }
    }
}

impl std::fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized ledger name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown ledger kind: {0:?}")]
pub struct UnknownLedgerKind(pub String);

impl FromStr for LedgerKind {
    type Err = UnknownLedgerKind;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        Self::all()
            .iter()
            .copied()
            .find(|k| k.as_str() == upper)
            .ok_or_else(|| UnknownLedgerKind(s.to_string()))
    }
}

/// The four SATP phases, in protocol order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Initiation,
    LockAssertion,
    Commitment,
    Completion,
}

impl Stage {
    pub fn number(&self) -> u8 {
        match self {
            Self::Initiation => 0,
            Self::LockAssertion => 1,
            Self::Commitment => 2,
            Self::Completion => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Initiation => "initiation",
            Self::LockAssertion => "lock-assertion",
            Self::Commitment => "commitment",
            Self::Completion => "completion",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stage-{} ({})", self.number(), self.name())
    }
}
