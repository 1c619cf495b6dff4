//! # satp-crypto — Gateway Keys and Envelope Signatures
//!
//! - **Ed25519** key pairs, public keys and signatures with hex serde.
//! - **`SignatureScheme`**, the single sign/verify capability that stage
//!   services depend on. Swapping the curve suite means providing another
//!   implementation of this trait; no stage code changes.
//!
//! Signing and verification accept only `CanonicalBytes`, so an envelope
//! can never be signed over a non-canonical encoding.
//!
//! ## Crate Policy
//!
//! - Depends only on `satp-core` internally.
//! - Tests use real keys and real signatures; nothing is mocked.

pub mod ed25519;
pub mod scheme;

pub use ed25519::{decode_hex, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
pub use satp_core::{sha256_digest, sha256_hex};
pub use scheme::{Ed25519Scheme, SignatureScheme};
