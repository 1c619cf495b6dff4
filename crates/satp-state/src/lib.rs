//! # satp-state — Transfer Session State
//!
//! ## Components
//!
//! - **Status** (`status.rs`): `NEW → INITIATED → LOCKED → COMMIT_PREPARED →
//!   COMMITTED → COMPLETED`, with `ROLLED_BACK` and `FAILED` reachable from
//!   any non-terminal state. Transitions are checked at runtime and logged.
//!
//! - **Effects** (`effect.rs`): the ledger-side actions a session has caused,
//!   each with its inverse, so rollback can replay them backwards.
//!
//! - **Session** (`session.rs`): everything one gateway knows about one
//!   transfer. Identity anchors and negotiated profiles are write-once.
//!
//! - **Store** (`store.rs`): the only shared mutable state in a gateway.
//!   Every mutation is a closure applied atomically under the store lock;
//!   nothing holds the lock across an await.

pub mod effect;
pub mod session;
pub mod status;
pub mod store;

pub use effect::{compensation_plan, LedgerEffect};
pub use session::{
    AssetTransfer, ChainLink, FailureRecord, GatewayRole, RollbackState, SessionClaims,
    SessionData, TransferProfiles,
};
pub use status::{SessionStatus, TransitionRecord};
pub use store::SessionStore;
