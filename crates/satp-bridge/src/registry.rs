//! # Bridge Registry
//!
//! Selects the bridge manager for a ledger kind. Stage services hold a
//! registry, never a concrete connector.

use std::collections::HashMap;
use std::sync::Arc;

use satp_core::{ErrorTag, LedgerKind, SatpError};
use satp_state::LedgerEffect;
use tracing::info;

use crate::manager::{AssetRef, BridgeManager, BridgeOp, LockParams};

#[derive(Debug, Clone, Default)]
pub struct BridgeRegistry {
    bridges: HashMap<LedgerKind, Arc<dyn BridgeManager>>,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bridge` under its own ledger kind, returning any bridge it
    /// replaces.
    pub fn register(&mut self, bridge: Arc<dyn BridgeManager>) -> Option<Arc<dyn BridgeManager>> {
        self.bridges.insert(bridge.ledger(), bridge)
    }

    pub fn with(mut self, bridge: Arc<dyn BridgeManager>) -> Self {
        self.register(bridge);
        self
    }

    /// # Errors
    ///
    /// `MissingBridgeManager` when nothing is registered for `ledger`.
    pub fn get(&self, ledger: LedgerKind, tag: &ErrorTag) -> Result<Arc<dyn BridgeManager>, SatpError> {
        self.bridges
            .get(&ledger)
            .cloned()
            .ok_or_else(|| SatpError::MissingBridgeManager {
                tag: tag.clone(),
                ledger: ledger.to_string(),
            })
    }

    pub fn supports(&self, ledger: LedgerKind) -> bool {
        self.bridges.contains_key(&ledger)
    }

    /// Registered ledgers in declaration order.
    pub fn ledgers(&self) -> Vec<LedgerKind> {
        LedgerKind::all()
            .iter()
            .copied()
            .filter(|l| self.supports(*l))
            .collect()
    }

    /// Perform a recorded effect through its ledger's bridge. Used to run
    /// compensation plans; the claims produced are not needed.
    pub async fn apply(&self, effect: &LedgerEffect, tag: &ErrorTag) -> Result<(), SatpError> {
        let bridge = self.get(effect.ledger(), tag)?;
        let custody = bridge.custody_account().to_string();
        let (op, result) = match effect {
            LedgerEffect::Lock {
                ledger,
                asset_id,
                owner,
                amount,
            } => {
                let asset = AssetRef::new(*ledger, asset_id.as_str(), owner.as_str(), *amount);
                (
                    BridgeOp::Lock,
                    bridge.lock(&asset, &LockParams::default()).await.map(|_| ()),
                )
            }
            LedgerEffect::Unlock {
                ledger,
                asset_id,
                owner,
                amount,
            } => {
                let asset = AssetRef::new(*ledger, asset_id.as_str(), owner.as_str(), *amount);
                (BridgeOp::Unlock, bridge.unlock(&asset).await.map(|_| ()))
            }
            LedgerEffect::Burn {
                ledger,
                asset_id,
                amount,
            } => {
                let asset = AssetRef::new(*ledger, asset_id.as_str(), custody, *amount);
                (BridgeOp::Burn, bridge.burn(&asset).await.map(|_| ()))
            }
            LedgerEffect::Mint {
                ledger,
                asset_id,
                amount,
            } => {
                let asset = AssetRef::new(*ledger, asset_id.as_str(), custody, *amount);
                (BridgeOp::Mint, bridge.mint(&asset).await.map(|_| ()))
            }
            LedgerEffect::Assign {
                ledger,
                asset_id,
                amount,
                from,
                to,
            } => {
                let asset = AssetRef::new(*ledger, asset_id.as_str(), from.as_str(), *amount);
                (BridgeOp::Assign, bridge.assign(&asset, to).await.map(|_| ()))
            }
        };
        result.map_err(|e| e.into_satp(op, tag))?;
        info!(%effect, "ledger effect applied");
        Ok(())
    }
}
