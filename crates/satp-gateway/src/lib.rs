//! # satp-gateway — The SATP Gateway
//!
//! Ties the protocol, state and bridge crates into a gateway that can
//! originate transfers and answer them.
//!
//! ## Components
//!
//! - **Gateway** (`gateway.rs`): the facade. `transfer` for the client role,
//!   `handle` for the server role, `cancel` for operators.
//!
//! - **Stages** (`stages/`): one client half and one server half per SATP
//!   stage, plus the drivers that validate, execute and commit them.
//!
//! - **Controller** (`controller.rs`): bounded resends with backoff for
//!   client exchanges and a deadline watchdog for server sessions.
//!
//! - **Rollback** (`rollback.rs`): compensation of logged ledger effects and
//!   archival of terminal sessions.
//!
//! - **Recovery** (`recovery.rs`): rebuilds in-flight sessions from the
//!   session log after a restart.
//!
//! - **Transport** (`transport.rs`): the counterparty channel seam and an
//!   in-process implementation.
//!
//! - **Identity, Registry, Config** (`identity.rs`, `registry.rs`,
//!   `config.rs`): who this gateway is, who it trusts, and how both are
//!   loaded from YAML or JSON.
//!
//! - **Sink, Telemetry** (`sink.rs`, `telemetry.rs`): the per-session audit
//!   log, tracing setup and counters.

pub mod config;
pub mod controller;
pub mod gateway;
pub mod identity;
pub mod recovery;
pub mod registry;
mod rollback;
pub mod sink;
mod stages;
pub mod telemetry;
pub mod transport;

pub use config::{ConfigError, GatewayConfig, SessionDefaults};
pub use controller::{RetryController, RetryPolicy, SessionWatchdog};
pub use gateway::{Gateway, TransferOutcome, TransferRequest};
pub use identity::GatewayIdentity;
pub use recovery::{RecoveredSession, RecoveryAction};
pub use registry::{Counterparty, CounterpartyRegistry};
pub use sink::{LogOperation, MemorySink, SessionLogRecord, SessionLogSink, TracingSink};
pub use telemetry::{init_tracing, LogFormat};
pub use transport::{ChannelError, CounterpartyChannel, LocalChannel};
