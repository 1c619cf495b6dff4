//! # satp-protocol — Envelopes and Their Validation
//!
//! An envelope is a common header, a stage-specific payload and a signature
//! over both. Each envelope names the hash of the one before it, so the
//! envelopes of a session form a chain that a tampered, replayed or
//! reordered message cannot join.
//!
//! ## Validation order
//!
//! common body → version → sequence → hash chain → transfer context →
//! signature. The first failure wins. Structural checks are cheap and run
//! first; the signature check runs last because it is the expensive one.
//!
//! ## Modules
//!
//! - `message.rs`: `MessageType`, `CommonBody`, `Envelope`, `Payload` and
//!   the stage bodies.
//! - `seal.rs`: signing and hashing over canonical bytes.
//! - `verify.rs`: the individual checks and the composed pipeline.

pub mod message;
pub mod seal;
pub mod verify;

pub use message::{
    AssertionReceipt, CommitAcknowledgement, CommitFinalization, CommitPreparation,
    CommitReadiness, CommonBody, CompletionReceipt, Envelope, LockAssertion, MessageType,
    NetworkCapabilities, Payload, ProposalReceipt, ProposalRejection, TransferCompletion,
    TransferInitClaims, TransferProposal,
};
pub use seal::{message_hash, outbound_common, seal, signing_bytes};
pub use verify::{
    check_envelope, check_genesis, verify_common_body, verify_hash_chain, verify_sequence,
    verify_signature, verify_transfer_context, verify_version, ValidatedEnvelope,
};
