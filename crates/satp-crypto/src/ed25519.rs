//! # Ed25519 Gateway Keys
//!
//! Every gateway owns one Ed25519 key pair. Its public key is the identity
//! anchor a counterpart pins in its registry and in each session; the
//! private half signs every outbound envelope.
//!
//! Private keys are never serialized or printed. Public keys and signatures
//! travel as lowercase hex.

use ed25519_dalek::{Signer, Verifier};
use satp_core::{CanonicalBytes, CryptoError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A 32-byte Ed25519 verifying key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ed25519PublicKey(pub [u8; 32]);

/// A 64-byte Ed25519 signature.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Ed25519Signature(pub [u8; 64]);

/// Signing half of a gateway identity. Not `Serialize`, not `Clone`.
pub struct Ed25519KeyPair {
    signing_key: ed25519_dalek::SigningKey,
}

// ── Public keys ─────────────────────────────────────────────────────

impl Ed25519PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        encode_hex(&self.0)
    }

    /// Parse a 64-character hex key. Surrounding whitespace and upper case
    /// are tolerated.
    pub fn from_hex(hex: &str) -> Result<Self, CryptoError> {
        let bytes = decode_fixed::<32>(hex).map_err(CryptoError::KeyError)?;
        Ok(Self(bytes))
    }

    pub fn to_verifying_key(&self) -> Result<ed25519_dalek::VerifyingKey, CryptoError> {
        ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|e| CryptoError::KeyError(format!("invalid public key: {e}")))
    }

    /// Verify `signature` over `data` with this key.
    pub fn verify(
        &self,
        data: &CanonicalBytes,
        signature: &Ed25519Signature,
    ) -> Result<(), CryptoError> {
        let vk = self.to_verifying_key()?;
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        vk.verify(data.as_bytes(), &sig)
            .map_err(|e| CryptoError::VerificationFailed(format!("ed25519: {e}")))
    }
}

impl Serialize for Ed25519PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Ed25519PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519PublicKey({}...)", encode_hex(&self.0[..4]))
    }
}

impl std::fmt::Display for Ed25519PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// ── Signatures ──────────────────────────────────────────────────────

impl Ed25519Signature {
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        encode_hex(&self.0)
    }

    pub fn from_hex(hex: &str) -> Result<Self, CryptoError> {
        let bytes = decode_fixed::<64>(hex).map_err(CryptoError::VerificationFailed)?;
        Ok(Self(bytes))
    }
}

impl Serialize for Ed25519Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Ed25519Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519Signature({}...)", encode_hex(&self.0[..4]))
    }
}

// ── Key pairs ───────────────────────────────────────────────────────

impl Ed25519KeyPair {
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    /// Key pair from a 64-character hex seed, as found in gateway
    /// configuration.
    pub fn from_seed_hex(hex: &str) -> Result<Self, CryptoError> {
        let seed = decode_fixed::<32>(hex).map_err(CryptoError::KeyError)?;
        Ok(Self::from_seed(&seed))
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, data: &CanonicalBytes) -> Ed25519Signature {
        Ed25519Signature(self.signing_key.sign(data.as_bytes()).to_bytes())
    }
}

impl std::fmt::Debug for Ed25519KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519KeyPair(<private>)")
    }
}

// ── Hex ─────────────────────────────────────────────────────────────

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decode an even-length hex string.
pub fn decode_hex(hex: &str) -> Result<Vec<u8>, String> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return Err("hex string must have even length".to_string());
    }
    if !hex.is_ascii() {
        return Err("hex string must be ascii".to_string());
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|e| format!("invalid hex at position {i}: {e}"))
        })
        .collect()
}

fn decode_fixed<const N: usize>(hex: &str) -> Result<[u8; N], String> {
    let bytes = decode_hex(hex)?;
    if bytes.len() != N {
        return Err(format!(
            "expected {} hex chars, got {}",
            N * 2,
            hex.trim().len()
        ));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope_bytes(seq: u64) -> CanonicalBytes {
        CanonicalBytes::new(&serde_json::json!({
            "messageType": "INIT_PROPOSAL",
            "sequenceNumber": seq,
            "signature": ""
        }))
        .unwrap()
    }

    #[test]
    fn sign_and_verify() {
        let kp = Ed25519KeyPair::generate();
        let data = envelope_bytes(0);
        let sig = kp.sign(&data);
        kp.public_key().verify(&data, &sig).expect("valid signature");
    }

    #[test]
    fn wrong_key_rejected() {
        let signer = Ed25519KeyPair::generate();
        let other = Ed25519KeyPair::generate();
        let data = envelope_bytes(0);
        let sig = signer.sign(&data);
        assert!(matches!(
            other.public_key().verify(&data, &sig),
            Err(CryptoError::VerificationFailed(_))
        ));
    }

    #[test]
    fn tampered_message_rejected() {
        let kp = Ed25519KeyPair::generate();
        let sig = kp.sign(&envelope_bytes(1));
        assert!(kp.public_key().verify(&envelope_bytes(2), &sig).is_err());
    }

    #[test]
    fn seed_is_deterministic() {
        let a = Ed25519KeyPair::from_seed(&[7u8; 32]);
        let b = Ed25519KeyPair::from_seed_hex(&"07".repeat(32)).unwrap();
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.sign(&envelope_bytes(3)), b.sign(&envelope_bytes(3)));
    }

    #[test]
    fn seed_hex_length_enforced() {
        assert!(matches!(
            Ed25519KeyPair::from_seed_hex("abcd"),
            Err(CryptoError::KeyError(_))
        ));
    }

    #[test]
    fn public_key_hex_roundtrip() {
        let pk = Ed25519KeyPair::generate().public_key();
        let hex = pk.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(Ed25519PublicKey::from_hex(&hex).unwrap(), pk);
        assert_eq!(
            Ed25519PublicKey::from_hex(&format!("  {}  ", hex.to_uppercase())).unwrap(),
            pk
        );
    }

    #[test]
    fn signature_hex_roundtrip() {
        let sig = Ed25519KeyPair::generate().sign(&envelope_bytes(0));
        let hex = sig.to_hex();
        assert_eq!(hex.len(), 128);
        assert_eq!(Ed25519Signature::from_hex(&hex).unwrap(), sig);
    }

    #[test]
    fn malformed_hex_rejected() {
        assert!(Ed25519PublicKey::from_hex(&"zz".repeat(32)).is_err());
        assert!(Ed25519Signature::from_hex("abc").is_err());
        assert!(decode_hex("\u{00e9}\u{00e9}").is_err());
    }

    #[test]
    fn serde_uses_hex_strings() {
        let pk = Ed25519KeyPair::from_seed(&[1u8; 32]).public_key();
        let json = serde_json::to_string(&pk).unwrap();
        assert_eq!(json.len(), 66);
        let back: Ed25519PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pk);
    }

    #[test]
    fn debug_never_prints_private_key() {
        let kp = Ed25519KeyPair::from_seed(&[9u8; 32]);
        assert_eq!(format!("{kp:?}"), "Ed25519KeyPair(<private>)");
        assert!(format!("{:?}", kp.public_key()).ends_with("...)"));
    }
}
