//! # satp-core — Foundational Types for the SATP Gateway
//!
//! The leaf crate of the workspace. It defines the primitives every other
//! crate speaks in: the bytes that get signed and hashed, the identifiers
//! that correlate envelopes, the ledger systems a gateway can front, the
//! claim evidence produced by ledger effects, and the flat error taxonomy
//! that drives abort and retry decisions.
//!
//! ## Key Design Principles
//!
//! 1. **One serialization path for signatures and hashes.** Every envelope
//!    signature and every message hash is computed over `CanonicalBytes`
//!    (RFC 8785 JCS). Two gateways that disagree on byte order would
//!    disagree on every hash in the chain.
//!
//! 2. **Newtypes for identifiers.** `SessionId`, `TransferContextId` and
//!    `GatewayId` are distinct types. Passing a context id where a session
//!    id is expected is a compile error.
//!
//! 3. **Closed ledger set.** `LedgerKind` is a single enum; bridge lookup is
//!    an exhaustive map over it rather than a class hierarchy.
//!
//! 4. **Errors carry their origin as data.** Every `SatpError` variant holds
//!    an `ErrorTag` naming the stage and function that raised it.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `satp-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod claim;
pub mod digest;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod temporal;

pub use canonical::CanonicalBytes;
pub use claim::{
    AssignmentAssertionClaim, BurnAssertionClaim, ClaimFormat, ClaimResult, LockAssertionClaim,
    MintAssertionClaim, PledgeClaim,
};
pub use digest::{sha256_digest, sha256_hex, ContentDigest, DigestAlgorithm};
pub use error::{
    CanonicalizationError, CryptoError, ErrorCategory, ErrorTag, SatpError, SatpResult,
};
pub use identity::{GatewayId, IdentifierError, SessionId, TransferContextId};
pub use ledger::{LedgerKind, Stage, UnknownLedgerKind};
pub use temporal::{Timestamp, TimestampError};

/// Protocol version this gateway speaks. Envelopes carrying any other
/// version are rejected with `SatpError::SatpVersionUnsupported`.
pub const SATP_VERSION: &str = "v02";
