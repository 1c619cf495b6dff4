//! # Gateway Identity
//!
//! Who this gateway is: its id, its signing capability and the ledger
//! systems it fronts.

use std::sync::Arc;

use satp_core::{GatewayId, LedgerKind, SATP_VERSION};
use satp_crypto::SignatureScheme;

#[derive(Clone)]
pub struct GatewayIdentity {
    id: GatewayId,
    name: String,
    version: String,
    supported_dlts: Vec<LedgerKind>,
    signer: Arc<dyn SignatureScheme>,
}

impl GatewayIdentity {
    pub fn new(id: GatewayId, signer: Arc<dyn SignatureScheme>) -> Self {
        Self {
            name: id.to_string(),
            id,
            version: SATP_VERSION.to_string(),
            supported_dlts: Vec::new(),
            signer,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.name = name;
        }
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_supported_dlts(mut self, dlts: Vec<LedgerKind>) -> Self {
        self.supported_dlts = dlts;
        self
    }

    pub fn id(&self) -> &GatewayId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn supported_dlts(&self) -> &[LedgerKind] {
        &self.supported_dlts
    }

    pub fn supports(&self, ledger: LedgerKind) -> bool {
        self.supported_dlts.contains(&ledger)
    }

    /// Wire form of this gateway's public key.
    pub fn pubkey(&self) -> String {
        self.signer.public_key_hex()
    }

    pub fn signer(&self) -> &dyn SignatureScheme {
        self.signer.as_ref()
    }
}

impl std::fmt::Debug for GatewayIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayIdentity")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("supported_dlts", &self.supported_dlts)
            .field("algorithm", &self.signer.algorithm())
            .field("pubkey", &self.pubkey())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satp_crypto::Ed25519Scheme;

    #[test]
    fn builder_sets_fields() {
        let identity = GatewayIdentity::new(
            GatewayId::parse("gw-a").unwrap(),
            Arc::new(Ed25519Scheme::generate()),
        )
        .with_name("")
        .with_supported_dlts(vec![LedgerKind::Corda]);
        assert_eq!(identity.name(), "gw-a");
        assert_eq!(identity.version(), SATP_VERSION);
        assert!(identity.supports(LedgerKind::Corda));
        assert_eq!(identity.pubkey().len(), 64);
        assert!(format!("{identity:?}").contains("ed25519"));
    }
}
