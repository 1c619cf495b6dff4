//! # Signature Scheme Capability
//!
//! Stage services sign and verify envelopes through `SignatureScheme` and
//! never name a curve. Keys and signatures cross this boundary as hex
//! strings, which is also how they appear on the wire.

use satp_core::{CanonicalBytes, CryptoError};

use crate::ed25519::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};

/// Sign with this gateway's key; verify with any counterpart's key.
pub trait SignatureScheme: Send + Sync {
    /// Short algorithm name, for logs.
    fn algorithm(&self) -> &'static str;

    /// This gateway's public key in wire form.
    fn public_key_hex(&self) -> String;

    /// Sign canonical bytes, returning the wire-form signature.
    fn sign(&self, data: &CanonicalBytes) -> String;

    /// Verify a wire-form signature against a wire-form public key.
    fn verify(
        &self,
        data: &CanonicalBytes,
        signature_hex: &str,
        pubkey_hex: &str,
    ) -> Result<(), CryptoError>;

    /// Whether `pubkey_hex` is a well-formed key for this scheme.
    fn is_valid_public_key(&self, pubkey_hex: &str) -> bool;
}

/// Ed25519 over RFC 8785 canonical JSON.
#[derive(Debug)]
pub struct Ed25519Scheme {
    keypair: Ed25519KeyPair,
}

impl Ed25519Scheme {
    pub fn new(keypair: Ed25519KeyPair) -> Self {
        Self { keypair }
    }

    pub fn generate() -> Self {
        Self::new(Ed25519KeyPair::generate())
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }
}

impl SignatureScheme for Ed25519Scheme {
    fn algorithm(&self) -> &'static str {
        "ed25519"
    }

    fn public_key_hex(&self) -> String {
        self.keypair.public_key().to_hex()
    }

    fn sign(&self, data: &CanonicalBytes) -> String {
        self.keypair.sign(data).to_hex()
    }

    fn verify(
        &self,
        data: &CanonicalBytes,
        signature_hex: &str,
        pubkey_hex: &str,
    ) -> Result<(), CryptoError> {
        let pubkey = Ed25519PublicKey::from_hex(pubkey_hex)?;
        let signature = Ed25519Signature::from_hex(signature_hex)?;
        pubkey.verify(data, &signature)
    }

    fn is_valid_public_key(&self, pubkey_hex: &str) -> bool {
        Ed25519PublicKey::from_hex(pubkey_hex)
            .and_then(|pk| pk.to_verifying_key())
            .is_ok()
    }
}
