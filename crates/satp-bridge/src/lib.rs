//! # satp-bridge — Ledger Effects Behind a Capability
//!
//! Stage services never name a ledger connector. They ask a
//! [`BridgeRegistry`] for the [`BridgeManager`] registered under a
//! [`LedgerKind`](satp_core::LedgerKind) and call its capability set:
//! `lock`, `unlock`, `burn`, `mint`, `assign`, `pledge`, `claim`.
//!
//! Each call either performs its effect and returns claim evidence, or
//! fails with a [`BridgeError`] and performs nothing. Bridges are external,
//! independently locked resources; callers never hold session state across
//! a bridge call.
//!
//! [`MemoryLedger`] is a complete in-process bridge with balances, a custody
//! account, call counters and fault injection.

pub mod manager;
pub mod memory;
pub mod registry;

pub use manager::{AssetRef, BridgeError, BridgeManager, BridgeOp, EffectAck, LockParams};
pub use memory::{Fault, MemoryLedger};
pub use registry::BridgeRegistry;
