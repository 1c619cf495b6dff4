//! # Ledger Effects
//!
//! Every ledger mutation a session causes is appended to its effect log
//! before the outbound envelope that reports it is sent. Rollback replays
//! the log backwards through [`LedgerEffect::inverse`].
//!
//! The bridge holds escrowed units in a custody account: `Lock` moves units
//! from the owner into custody, `Burn` destroys custodied units, `Mint`
//! creates units in custody and `Assign` moves units between holders. Under
//! that model `inverse(inverse(e)) == e` and replaying the inverses of a
//! log in reverse order restores every balance it touched.

use satp_core::LedgerKind;
use serde::{Deserialize, Serialize};

/// A ledger-side action performed through a bridge manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEffect {
    /// Owner to custody. Inverse: `Unlock`.
    Lock {
        ledger: LedgerKind,
        asset_id: String,
        owner: String,
        amount: u64,
    },
    /// Custody to owner. Inverse: `Lock`.
    Unlock {
        ledger: LedgerKind,
        asset_id: String,
        owner: String,
        amount: u64,
    },
    /// Destroy custodied units. Inverse: `Mint`.
    Burn {
        ledger: LedgerKind,
        asset_id: String,
        amount: u64,
    },
    /// Create units in custody. Inverse: `Burn`.
    Mint {
        ledger: LedgerKind,
        asset_id: String,
        amount: u64,
    },
    /// Move units between holders. Inverse: the same move reversed.
    Assign {
        ledger: LedgerKind,
        asset_id: String,
        amount: u64,
        from: String,
        to: String,
    },
}

impl LedgerEffect {
    pub fn inverse(&self) -> Self {
        match self.clone() {
            Self::Lock {
                ledger,
                asset_id,
                owner,
                amount,
            } => Self::Unlock {
                ledger,
                asset_id,
                owner,
                amount,
            },
            Self::Unlock {
                ledger,
                asset_id,
                owner,
                amount,
            } => Self::Lock {
                ledger,
                asset_id,
                owner,
                amount,
            },
            Self::Burn {
                ledger,
                asset_id,
                amount,
            } => Self::Mint {
                ledger,
                asset_id,
                amount,
            },
            Self::Mint {
                ledger,
                asset_id,
                amount,
            } => Self::Burn {
                ledger,
                asset_id,
                amount,
            },
            Self::Assign {
                ledger,
                asset_id,
                amount,
                from,
                to,
            } => Self::Assign {
                ledger,
                asset_id,
                amount,
                from: to,
                to: from,
            },
        }
    }

    pub fn ledger(&self) -> LedgerKind {
        match self {
            Self::Lock { ledger, .. }
            | Self::Unlock { ledger, .. }
            | Self::Burn { ledger, .. }
            | Self::Mint { ledger, .. }
            | Self::Assign { ledger, .. } => *ledger,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Lock { .. } => "lock",
            Self::Unlock { .. } => "unlock",
            Self::Burn { .. } => "burn",
            Self::Mint { .. } => "mint",
            Self::Assign { .. } => "assign",
        }
    }
}

impl std::fmt::Display for LedgerEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lock {
                ledger,
                asset_id,
                amount,
                ..
            }
            | Self::Unlock {
                ledger,
                asset_id,
                amount,
                ..
            }
            | Self::Burn {
                ledger,
                asset_id,
                amount,
            }
            | Self::Mint {
                ledger,
                asset_id,
                amount,
            }
            | Self::Assign {
                ledger,
                asset_id,
                amount,
                ..
            } => write!(f, "{}({ledger}:{asset_id} x{amount})", self.name()),
        }
    }
}

/// Inverse effects in the order they must be applied: last effect first.
pub fn compensation_plan(effects: &[LedgerEffect]) -> Vec<LedgerEffect> {
    effects.iter().rev().map(LedgerEffect::inverse).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock() -> LedgerEffect {
        LedgerEffect::Lock {
            ledger: LedgerKind::Fabric,
            asset_id: "bond-1".into(),
            owner: "alice".into(),
            amount: 100,
        }
    }

    fn burn() -> LedgerEffect {
        LedgerEffect::Burn {
            ledger: LedgerKind::Fabric,
            asset_id: "bond-1".into(),
            amount: 100,
        }
    }

    fn assign() -> LedgerEffect {
        LedgerEffect::Assign {
            ledger: LedgerKind::Besu,
            asset_id: "wbond-1".into(),
            amount: 100,
            from: "custody".into(),
            to: "bob".into(),
        }
    }

    #[test]
    fn inverse_is_an_involution() {
        for e in [lock(), burn(), assign(), lock().inverse(), burn().inverse()] {
            assert_eq!(e.inverse().inverse(), e);
        }
    }

    #[test]
    fn lock_compensates_with_unlock_of_same_owner() {
        match lock().inverse() {
            LedgerEffect::Unlock { owner, amount, .. } => {
                assert_eq!(owner, "alice");
                assert_eq!(amount, 100);
            }
            other => panic!("expected unlock, got {other}"),
        }
    }

    #[test]
    fn assign_compensates_by_moving_back() {
        match assign().inverse() {
            LedgerEffect::Assign { from, to, .. } => {
                assert_eq!(from, "bob");
                assert_eq!(to, "custody");
            }
            other => panic!("expected assign, got {other}"),
        }
    }

    #[test]
    fn plan_runs_backwards() {
        let plan = compensation_plan(&[lock(), burn()]);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].name(), "mint");
        assert_eq!(plan[1].name(), "unlock");
        assert!(compensation_plan(&[]).is_empty());
    }

    #[test]
    fn display_and_serde() {
        assert_eq!(lock().to_string(), "lock(FABRIC:bond-1 x100)");
        let json = serde_json::to_value(burn()).unwrap();
        assert_eq!(json["kind"], "BURN");
        assert_eq!(json["ledger"], "FABRIC");
        assert_eq!(assign().ledger(), LedgerKind::Besu);
    }
}
