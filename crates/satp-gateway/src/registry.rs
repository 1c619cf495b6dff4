//! # Counterparty Registry
//!
//! The gateways this one will transact with, indexed by id and by public
//! key. A proposal from a key not listed here is refused.

use std::collections::HashMap;

use satp_core::{ErrorTag, GatewayId, LedgerKind, SatpError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counterparty {
    pub id: GatewayId,
    pub name: String,
    /// Lowercase hex.
    pub pubkey: String,
    #[serde(rename = "supportedDltIDs")]
    pub supported_dlts: Vec<LedgerKind>,
}

impl Counterparty {
    pub fn supports(&self, ledger: LedgerKind) -> bool {
        self.supported_dlts.contains(&ledger)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CounterpartyRegistry {
    by_id: HashMap<GatewayId, Counterparty>,
    by_key: HashMap<String, GatewayId>,
}

impl CounterpartyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a counterparty, returning the entry it replaced.
    pub fn register(&mut self, counterparty: Counterparty) -> Option<Counterparty> {
        let previous = self.by_id.remove(&counterparty.id);
        if let Some(prev) = &previous {
            self.by_key.remove(&prev.pubkey.to_ascii_lowercase());
        }
        self.by_key
            .insert(counterparty.pubkey.to_ascii_lowercase(), counterparty.id.clone());
        self.by_id.insert(counterparty.id.clone(), counterparty);
        previous
    }

    pub fn get(&self, id: &GatewayId, tag: &ErrorTag) -> Result<&Counterparty, SatpError> {
        self.by_id
            .get(id)
            .ok_or_else(|| SatpError::UnknownCounterparty {
                tag: tag.clone(),
                gateway: id.to_string(),
            })
    }

    pub fn by_pubkey(&self, pubkey: &str) -> Option<&Counterparty> {
        self.by_key
            .get(&pubkey.to_ascii_lowercase())
            .and_then(|id| self.by_id.get(id))
    }

    pub fn contains(&self, id: &GatewayId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn list(&self) -> Vec<&Counterparty> {
        self.by_id.values().collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
