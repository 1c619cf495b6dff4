//! # Error Types
//!
//! `SatpError` is the flat protocol taxonomy. Every variant carries an
//! [`ErrorTag`] naming the stage and function that raised it, plus the
//! offending values, so a failed session can be diagnosed from its failure
//! record alone.
//!
//! ## Propagation
//!
//! - Structural, integrity and claim-evidence errors reject the envelope
//!   that caused them. They are never retried with altered data.
//! - Transport errors are retried with the identical envelope.
//! - Ledger errors after an effect trigger compensation before the session
//!   may be marked rolled back.
//!
//! [`SatpError::category`] exposes this grouping to the retry controller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::Stage;

/// Where an error was raised.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorTag {
    pub stage: Option<Stage>,
    pub origin: String,
}

impl ErrorTag {
    /// Tag for code outside any stage (store, registry, configuration).
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            stage: None,
            origin: origin.into(),
        }
    }

    pub fn at(stage: Stage, origin: impl Into<String>) -> Self {
        Self {
            stage: Some(stage),
            origin: origin.into(),
        }
    }
}

impl std::fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{}@stage-{}", self.origin, stage.number()),
            None => f.write_str(&self.origin),
        }
    }
}

/// Coarse grouping of [`SatpError`] variants used for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Structural,
    Session,
    Integrity,
    Identity,
    ClaimEvidence,
    Wiring,
    Ledger,
    Transport,
    Cancelled,
}

pub type SatpResult<T> = Result<T, SatpError>;

/// The SATP protocol error taxonomy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SatpError {
    // ── Structural ──────────────────────────────────────────────────
    #[error("[{tag}] satp common body missing or malformed: {detail}")]
    MissingSatpCommonBody { tag: ErrorTag, detail: String },

    #[error("[{tag}] message type mismatch: received {received}, expected {expected}")]
    MessageTypeMissMatch {
        tag: ErrorTag,
        received: String,
        expected: String,
    },

    #[error("[{tag}] network capabilities missing")]
    MissingNetworkCapabilities { tag: ErrorTag },

    #[error("[{tag}] envelope could not be serialized: {reason}")]
    Serialization { tag: ErrorTag, reason: String },

    // ── Session lifecycle ───────────────────────────────────────────
    #[error("[{tag}] session undefined: {session_id}")]
    SessionUndefined { tag: ErrorTag, session_id: String },

    #[error("[{tag}] session already exists: {session_id}")]
    DuplicateSession { tag: ErrorTag, session_id: String },

    #[error("[{tag}] session data not loaded correctly: {detail}")]
    SessionDataNotLoadedCorrectly { tag: ErrorTag, detail: String },

    #[error("[{tag}] session {session_id} already completed")]
    SessionCompleted { tag: ErrorTag, session_id: String },

    #[error("[{tag}] session {session_id} is still active in status {status}")]
    SessionActive {
        tag: ErrorTag,
        session_id: String,
        status: String,
    },

    #[error("[{tag}] invalid session transition from {from} to {to}")]
    InvalidTransition {
        tag: ErrorTag,
        from: String,
        to: String,
    },

    #[error("[{tag}] session {session_id} was cancelled (status {status})")]
    SessionCancelled {
        tag: ErrorTag,
        session_id: String,
        status: String,
    },

    #[error("[{tag}] session {session_id} was interrupted by a gateway restart")]
    SessionInterrupted { tag: ErrorTag, session_id: String },

    #[error("[{tag}] session {session_id} changed concurrently: expected revision {expected}, found {found}")]
    ConcurrentModification {
        tag: ErrorTag,
        session_id: String,
        expected: u64,
        found: u64,
    },

    // ── Ordering and integrity ──────────────────────────────────────
    #[error("[{tag}] satp version {unsupported} unsupported, expected {supported}")]
    SatpVersionUnsupported {
        tag: ErrorTag,
        unsupported: String,
        supported: String,
    },

    #[error("[{tag}] sequence number mismatch: received {received}, expected {expected}")]
    SequenceNumberMissMatch {
        tag: ErrorTag,
        received: u64,
        expected: u64,
    },

    #[error("[{tag}] hash mismatch: received {received}, expected {expected}")]
    HashMissMatch {
        tag: ErrorTag,
        received: String,
        expected: String,
    },

    #[error("[{tag}] transfer context id mismatch: received {received}, expected {expected}")]
    TransferContextIdMissMatch {
        tag: ErrorTag,
        received: String,
        expected: String,
    },

    #[error("[{tag}] signature verification failed: {reason}")]
    SignatureVerificationFailed { tag: ErrorTag, reason: String },

    #[error("[{tag}] cryptographic failure: {reason}")]
    Crypto { tag: ErrorTag, reason: String },

    // ── Identity ────────────────────────────────────────────────────
    #[error("[{tag}] server gateway pubkey missing or mismatched")]
    MissingServerGatewayPubkey { tag: ErrorTag },

    #[error("[{tag}] client gateway pubkey missing or mismatched")]
    MissingClientGatewayPubkey { tag: ErrorTag },

    #[error("[{tag}] ledger {dlt} not supported")]
    DltNotSupported { tag: ErrorTag, dlt: String },

    #[error("[{tag}] unknown counterparty gateway {gateway}")]
    UnknownCounterparty { tag: ErrorTag, gateway: String },

    #[error("[{tag}] transfer rejected by counterparty: {reason}")]
    TransferRejected { tag: ErrorTag, reason: String },

    // ── Claim evidence ──────────────────────────────────────────────
    #[error("[{tag}] transfer init claims missing: {detail}")]
    MissingTransferInitClaims { tag: ErrorTag, detail: String },

    #[error("[{tag}] lock assertion claim missing")]
    MissingLockAssertionClaim { tag: ErrorTag },

    #[error("[{tag}] lock assertion claim format missing")]
    MissingLockAssertionClaimFormat { tag: ErrorTag },

    #[error("[{tag}] lock assertion expiration missing")]
    MissingLockAssertionExpiration { tag: ErrorTag },

    #[error("[{tag}] lock assertion expired at {expiration}")]
    LockAssertionExpired { tag: ErrorTag, expiration: String },

    #[error("[{tag}] burn assertion claim missing")]
    MissingBurnAssertionClaim { tag: ErrorTag },

    #[error("[{tag}] mint assertion claim missing")]
    MissingMintAssertionClaim { tag: ErrorTag },

    #[error("[{tag}] assignment assertion claim missing")]
    MissingAssignmentAssertionClaim { tag: ErrorTag },

    // ── Collaborators ───────────────────────────────────────────────
    #[error("[{tag}] no bridge manager registered for ledger {ledger}")]
    MissingBridgeManager { tag: ErrorTag, ledger: String },

    #[error("[{tag}] bridge {operation} failed: {reason}")]
    Bridge {
        tag: ErrorTag,
        operation: String,
        reason: String,
    },

    #[error("[{tag}] transport failure: {reason}")]
    Transport { tag: ErrorTag, reason: String },

    #[error("[{tag}] deadline exceeded after {elapsed_ms}ms")]
    Timeout { tag: ErrorTag, elapsed_ms: u64 },
}

impl SatpError {
    /// Stable variant name, recorded in failure records and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingSatpCommonBody { .. } => "MissingSatpCommonBody",
            Self::MessageTypeMissMatch { .. } => "MessageTypeMissMatch",
            Self::MissingNetworkCapabilities { .. } => "MissingNetworkCapabilities",
            Self::Serialization { .. } => "Serialization",
            Self::SessionUndefined { .. } => "SessionUndefined",
            Self::DuplicateSession { .. } => "DuplicateSession",
            Self::SessionDataNotLoadedCorrectly { .. } => "SessionDataNotLoadedCorrectly",
            Self::SessionCompleted { .. } => "SessionCompleted",
            Self::SessionActive { .. } => "SessionActive",
            Self::InvalidTransition { .. } => "InvalidTransition",
            Self::SessionCancelled { .. } => "SessionCancelled",
            Self::SessionInterrupted { .. } => "SessionInterrupted",
            Self::ConcurrentModification { .. } => "ConcurrentModification",
            Self::SatpVersionUnsupported { .. } => "SATPVersionUnsupported",
            Self::SequenceNumberMissMatch { .. } => "SequenceNumberMissMatch",
            Self::HashMissMatch { .. } => "HashMissMatch",
            Self::TransferContextIdMissMatch { .. } => "TransferContextIdMissMatch",
            Self::SignatureVerificationFailed { .. } => "SignatureVerificationFailed",
            Self::Crypto { .. } => "Crypto",
            Self::MissingServerGatewayPubkey { .. } => "MissingServerGatewayPubkey",
            Self::MissingClientGatewayPubkey { .. } => "MissingClientGatewayPubkey",
            Self::DltNotSupported { .. } => "DLTNotSupported",
            Self::UnknownCounterparty { .. } => "UnknownCounterparty",
            Self::TransferRejected { .. } => "TransferRejected",
            Self::MissingTransferInitClaims { .. } => "MissingTransferInitClaims",
            Self::MissingLockAssertionClaim { .. } => "MissingLockAssertionClaim",
            Self::MissingLockAssertionClaimFormat { .. } => "MissingLockAssertionClaimFormat",
            Self::MissingLockAssertionExpiration { .. } => "MissingLockAssertionExpiration",
            Self::LockAssertionExpired { .. } => "LockAssertionExpired",
            Self::MissingBurnAssertionClaim { .. } => "MissingBurnAssertionClaim",
            Self::MissingMintAssertionClaim { .. } => "MissingMintAssertionClaim",
            Self::MissingAssignmentAssertionClaim { .. } => "MissingAssignmentAssertionClaim",
            Self::MissingBridgeManager { .. } => "MissingBridgeManager",
            Self::Bridge { .. } => "Bridge",
            Self::Transport { .. } => "Transport",
            Self::Timeout { .. } => "Timeout",
        }
    }

    pub fn tag(&self) -> &ErrorTag {
        match self {
            Self::MissingSatpCommonBody { tag, .. }
            | Self::MessageTypeMissMatch { tag, .. }
            | Self::MissingNetworkCapabilities { tag }
            | Self::Serialization { tag, .. }
            | Self::SessionUndefined { tag, .. }
            | Self::DuplicateSession { tag, .. }
            | Self::SessionDataNotLoadedCorrectly { tag, .. }
            | Self::SessionCompleted { tag, .. }
            | Self::SessionActive { tag, .. }
            | Self::InvalidTransition { tag, .. }
            | Self::SessionCancelled { tag, .. }
            | Self::SessionInterrupted { tag, .. }
            | Self::ConcurrentModification { tag, .. }
            | Self::SatpVersionUnsupported { tag, .. }
            | Self::SequenceNumberMissMatch { tag, .. }
            | Self::HashMissMatch { tag, .. }
            | Self::TransferContextIdMissMatch { tag, .. }
            | Self::SignatureVerificationFailed { tag, .. }
            | Self::Crypto { tag, .. }
            | Self::MissingServerGatewayPubkey { tag }
            | Self::MissingClientGatewayPubkey { tag }
            | Self::DltNotSupported { tag, .. }
            | Self::UnknownCounterparty { tag, .. }
            | Self::TransferRejected { tag, .. }
            | Self::MissingTransferInitClaims { tag, .. }
            | Self::MissingLockAssertionClaim { tag }
            | Self::MissingLockAssertionClaimFormat { tag }
            | Self::MissingLockAssertionExpiration { tag }
            | Self::LockAssertionExpired { tag, .. }
            | Self::MissingBurnAssertionClaim { tag }
            | Self::MissingMintAssertionClaim { tag }
            | Self::MissingAssignmentAssertionClaim { tag }
            | Self::MissingBridgeManager { tag, .. }
            | Self::Bridge { tag, .. }
            | Self::Transport { tag, .. }
            | Self::Timeout { tag, .. } => tag,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingSatpCommonBody { .. }
            | Self::MessageTypeMissMatch { .. }
            | Self::MissingNetworkCapabilities { .. }
            | Self::Serialization { .. } => ErrorCategory::Structural,
            Self::SessionUndefined { .. }
            | Self::DuplicateSession { .. }
            | Self::SessionDataNotLoadedCorrectly { .. }
            | Self::SessionCompleted { .. }
            | Self::SessionActive { .. }
            | Self::InvalidTransition { .. }
            | Self::SessionInterrupted { .. }
            | Self::ConcurrentModification { .. } => ErrorCategory::Session,
            Self::SessionCancelled { .. } => ErrorCategory::Cancelled,
            Self::SatpVersionUnsupported { .. }
            | Self::SequenceNumberMissMatch { .. }
            | Self::HashMissMatch { .. }
            | Self::TransferContextIdMissMatch { .. }
            | Self::SignatureVerificationFailed { .. }
            | Self::Crypto { .. } => ErrorCategory::Integrity,
            Self::MissingServerGatewayPubkey { .. }
            | Self::MissingClientGatewayPubkey { .. }
            | Self::DltNotSupported { .. }
            | Self::UnknownCounterparty { .. }
            | Self::TransferRejected { .. } => ErrorCategory::Identity,
            Self::MissingTransferInitClaims { .. }
            | Self::MissingLockAssertionClaim { .. }
            | Self::MissingLockAssertionClaimFormat { .. }
            | Self::MissingLockAssertionExpiration { .. }
            | Self::LockAssertionExpired { .. }
            | Self::MissingBurnAssertionClaim { .. }
            | Self::MissingMintAssertionClaim { .. }
            | Self::MissingAssignmentAssertionClaim { .. } => ErrorCategory::ClaimEvidence,
            Self::MissingBridgeManager { .. } => ErrorCategory::Wiring,
            Self::Bridge { .. } => ErrorCategory::Ledger,
            Self::Transport { .. } | Self::Timeout { .. } => ErrorCategory::Transport,
        }
    }

    /// Transport failures are resent with the identical envelope.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Amounts and counters must be integers or strings.
    #[error("float values are not permitted in canonical representations: {0}")]
    FloatRejected(f64),

    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Error in cryptographic operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("signature verification failed: {0}")]
    VerificationFailed(String),

    /// Key generation or parsing failed.
    #[error("key error: {0}")]
    KeyError(String),

    #[error("digest error: {0}")]
    DigestError(String),
}
