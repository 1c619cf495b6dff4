//! # Gateway
//!
//! The facade a host process holds. One [`Gateway`] plays both roles:
//!
//! - **client**: [`Gateway::transfer`] drives a session through the four
//!   stages against a counterparty channel and rolls it back on failure.
//! - **server**: [`Gateway::handle`] answers one inbound request envelope
//!   and keeps a watchdog on the session until it reaches a terminal
//!   status.
//!
//! After a restart, [`Gateway::recover`] rebuilds the sessions the previous
//! process left in flight from its session log.
//!
//! `Gateway` is a cheap handle: clones share the same session store,
//! registries and watchdog.

use std::sync::Arc;
use std::time::Duration;

use satp_bridge::BridgeRegistry;
use satp_core::{ErrorTag, GatewayId, SatpError, SessionId, TransferContextId};
use satp_protocol::{Envelope, MessageType};
use satp_state::{
    AssetTransfer, FailureRecord, GatewayRole, SessionData, SessionStatus, SessionStore,
    TransferProfiles,
};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, GatewayConfig, SessionDefaults};
use crate::controller::SessionWatchdog;
use crate::identity::GatewayIdentity;
use crate::recovery::{self, RecoveredSession};
use crate::registry::CounterpartyRegistry;
use crate::rollback::{archive, roll_back, RollbackGuard};
use crate::sink::{SessionLogRecord, SessionLogSink, TracingSink};
use crate::stages::commitment::{ServerCommitFinal, ServerCommitPreparation};
use crate::stages::completion::ServerCompletion;
use crate::stages::initiation::{init_claims, serve_proposal};
use crate::stages::lock::ServerLockAssertion;
use crate::stages::{client_steps, run_step, serve, Served, StageContext};
use crate::telemetry::{self, Direction};
use crate::transport::CounterpartyChannel;

/// A transfer this gateway should originate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    /// Caller-chosen session id; a fresh one is generated when absent.
    #[serde(default)]
    pub session_id: Option<SessionId>,
    pub counterparty: GatewayId,
    pub asset: AssetTransfer,
    pub profiles: TransferProfiles,
    /// Override of the configured retry budget for this session.
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub max_timeout_ms: Option<u64>,
}

/// How a transfer ended, from the originating gateway's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutcome {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub failure: Option<FailureRecord>,
    pub message_hashes: Vec<String>,
}

impl TransferOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}

impl From<&SessionData> for TransferOutcome {
    fn from(session: &SessionData) -> Self {
        Self {
            session_id: session.session_id.clone(),
            status: session.status,
            failure: session.failure.clone(),
            message_hashes: session.chain_hashes(),
        }
    }
}

struct Inner {
    ctx: StageContext,
    watchdog: SessionWatchdog,
}

#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("identity", &self.inner.ctx.identity)
            .field("sessions", &self.inner.ctx.store.len())
            .field("armed", &self.inner.watchdog.armed())
            .finish()
    }
}

impl Gateway {
    pub fn new(
        identity: GatewayIdentity,
        counterparties: CounterpartyRegistry,
        bridges: BridgeRegistry,
        defaults: SessionDefaults,
    ) -> Self {
        Self::with_sink(
            identity,
            counterparties,
            bridges,
            defaults,
            Arc::new(TracingSink),
        )
    }

    pub fn with_sink(
        identity: GatewayIdentity,
        counterparties: CounterpartyRegistry,
        bridges: BridgeRegistry,
        defaults: SessionDefaults,
        sink: Arc<dyn SessionLogSink>,
    ) -> Self {
        let ctx = StageContext {
            identity: Arc::new(identity),
            counterparties: Arc::new(counterparties),
            bridges: Arc::new(bridges),
            store: SessionStore::new(),
            sink,
            defaults,
        };
        Self {
            inner: Arc::new(Inner {
                ctx,
                watchdog: SessionWatchdog::new(),
            }),
        }
    }

    /// Build a gateway from its configuration. Bridges are supplied by the
    /// host since they wrap live ledger connectors.
    pub fn from_config(config: &GatewayConfig, bridges: BridgeRegistry) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(
            config.identity()?,
            config.counterparty_registry()?,
            bridges,
            config.defaults.clone(),
        ))
    }

    pub fn identity(&self) -> &GatewayIdentity {
        &self.inner.ctx.identity
    }

    pub fn pubkey(&self) -> String {
        self.inner.ctx.identity.pubkey()
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.ctx.store
    }

    pub fn watchdog(&self) -> &SessionWatchdog {
        &self.inner.watchdog
    }

    pub fn session(&self, id: &SessionId) -> Result<SessionData, SatpError> {
        self.inner.ctx.store.get(id)
    }

    /// Remove a terminal session now instead of after the retention period.
    pub fn archive(&self, id: &SessionId) -> Result<SessionData, SatpError> {
        let session = archive(&self.inner.ctx, id)?;
        self.inner.watchdog.disarm(id);
        Ok(session)
    }

    // ── Server role ─────────────────────────────────────────────────

    /// Answer one inbound request envelope.
    ///
    /// # Errors
    ///
    /// Any validation or stage error. The session is left as it was before
    /// the envelope arrived, apart from effects the stage had already
    /// applied, which are logged on the session for rollback.
    pub async fn handle(&self, envelope: Envelope) -> Result<Envelope, SatpError> {
        let ctx = &self.inner.ctx;
        let message_type = envelope.message_type();
        let served = match message_type {
            MessageType::InitProposal => serve_proposal(ctx, envelope),
            MessageType::LockAssert => serve(ctx, &ServerLockAssertion, envelope).await,
            MessageType::CommitPrepare => serve(ctx, &ServerCommitPreparation, envelope).await,
            MessageType::CommitFinal => serve(ctx, &ServerCommitFinal, envelope).await,
            MessageType::TransferComplete => serve(ctx, &ServerCompletion, envelope).await,
            other => Err(SatpError::MessageTypeMissMatch {
                tag: ErrorTag::new("Gateway::handle"),
                received: other.name().to_string(),
                expected: "a request message type".into(),
            }),
        };
        match served {
            Ok(served) => {
                telemetry::record_envelope(
                    Direction::Inbound,
                    if served.replayed { "replayed" } else { "served" },
                );
                if !served.replayed {
                    self.watch(&served);
                }
                Ok(served.response)
            }
            Err(e) => {
                telemetry::record_envelope(Direction::Inbound, "rejected");
                tracing::warn!(
                    message_type = %message_type,
                    code = e.code(),
                    tag = %e.tag(),
                    "request rejected: {e}"
                );
                Err(e)
            }
        }
    }

    fn watch(&self, served: &Served) {
        let ctx = &self.inner.ctx;
        if served.status.is_terminal() {
            self.inner.watchdog.schedule_purge(ctx, &served.session_id);
        } else {
            self.inner.watchdog.arm(
                ctx,
                &served.session_id,
                served.sequence_number,
                Duration::from_millis(served.max_timeout_ms),
            );
        }
    }

    // ── Client role ─────────────────────────────────────────────────

    /// Originate a transfer and drive it to a terminal status.
    ///
    /// A stage failure is not an `Err`: the session is rolled back and the
    /// outcome carries the failure. `Err` means the session could not be
    /// opened at all.
    pub async fn transfer(
        &self,
        request: TransferRequest,
        channel: &dyn CounterpartyChannel,
    ) -> Result<TransferOutcome, SatpError> {
        let ctx = &self.inner.ctx;
        let tag = ErrorTag::new("Gateway::transfer");
        let counterparty = ctx.counterparties.get(&request.counterparty, &tag)?;

        let mut session = SessionData::new(
            request.session_id.unwrap_or_default(),
            TransferContextId::new(),
            GatewayRole::Client,
            ctx.identity.version(),
        );
        session.bind_gateway_pubkeys(
            &ctx.identity.pubkey(),
            &counterparty.pubkey.to_ascii_lowercase(),
            &tag,
        )?;
        session.counterparty = Some(counterparty.id.clone());
        session.asset = Some(request.asset);
        session.negotiate_profiles(request.profiles, &tag)?;
        session.max_retries = request.max_retries.unwrap_or(ctx.defaults.max_retries);
        session.max_timeout_ms = request
            .max_timeout_ms
            .unwrap_or(ctx.defaults.max_timeout_ms);
        session.init_claims_hash = Some(init_claims(ctx, &session, &tag)?.hash(&tag)?);
        let session_id = ctx.store.create(session)?.session_id;
        tracing::info!(
            session_id = %session_id,
            counterparty = %request.counterparty,
            "transfer started"
        );

        for step in client_steps() {
            if let Err(e) = run_step(ctx, step, &session_id, channel).await {
                tracing::warn!(
                    session_id = %session_id,
                    code = e.code(),
                    "transfer failed: {e}"
                );
                roll_back(ctx, &session_id, &e, e.to_string(), RollbackGuard::Any).await?;
                break;
            }
        }

        let session = ctx.store.get(&session_id)?;
        self.inner.watchdog.schedule_purge(ctx, &session_id);
        tracing::info!(session_id = %session_id, status = %session.status, "transfer finished");
        Ok(TransferOutcome::from(&session))
    }

    /// Cancel a live session and compensate what it did.
    ///
    /// Cancelling a session that already failed or rolled back is a no-op.
    pub async fn cancel(
        &self,
        id: &SessionId,
        reason: impl Into<String>,
    ) -> Result<SessionData, SatpError> {
        let ctx = &self.inner.ctx;
        let tag = ErrorTag::new("Gateway::cancel");
        let session = ctx.store.get(id)?;
        if session.status == SessionStatus::Completed {
            return Err(SatpError::SessionCompleted {
                tag,
                session_id: id.to_string(),
            });
        }
        if session.is_cancelled() {
            return Ok(session);
        }
        self.inner.watchdog.disarm(id);
        let cause = SatpError::SessionCancelled {
            tag,
            session_id: id.to_string(),
            status: session.status.name().to_string(),
        };
        let session = roll_back(ctx, id, &cause, reason.into(), RollbackGuard::Any).await?;
        if session.status.is_terminal() {
            self.inner.watchdog.schedule_purge(ctx, id);
        }
        Ok(session)
    }

    // ── Restart ─────────────────────────────────────────────────────

    /// Rebuild sessions from the log records of a previous run, oldest
    /// record first. See [`crate::recovery`] for what happens to each.
    pub async fn recover(&self, records: &[SessionLogRecord]) -> Vec<RecoveredSession> {
        recovery::recover(&self.inner.ctx, &self.inner.watchdog, records).await
    }
}
