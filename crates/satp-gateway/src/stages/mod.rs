//! # Stage Services
//!
//! Each SATP stage has a server half (answers a request envelope) and a
//! client half (performs the local ledger effect, sends the request, accepts
//! the answer). The halves are small trait implementations; the drivers in
//! this module own everything they have in common:
//!
//! 1. validate the inbound envelope against the stored session,
//! 2. run the stage's ledger work with no store lock held,
//! 3. re-read the session, re-check sequence and hash chain, and commit
//!    message, claims, effects and status in one `SessionStore::update`,
//! 4. seal and cache the outbound envelope.
//!
//! A session never advances unless both the local effect and the
//! counterpart's envelope checked out. Effects applied by a stage that then
//! fails are recorded before the error propagates, so rollback can
//! compensate them.

pub(crate) mod commitment;
pub(crate) mod completion;
pub(crate) mod initiation;
pub(crate) mod lock;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use satp_bridge::BridgeRegistry;
use satp_core::{ErrorTag, SatpError, SessionId, Stage};
use satp_crypto::SignatureScheme;
use satp_protocol::{
    check_envelope, message_hash, outbound_common, seal, verify_common_body, verify_hash_chain,
    verify_sequence, Envelope, MessageType, Payload, ValidatedEnvelope,
};
use satp_state::{compensation_plan, LedgerEffect, SessionClaims, SessionData, SessionStatus, SessionStore};

use crate::config::SessionDefaults;
use crate::controller::{RetryController, RetryPolicy};
use crate::identity::GatewayIdentity;
use crate::registry::CounterpartyRegistry;
use crate::rollback::{roll_back, RollbackGuard};
use crate::sink::{LogOperation, SessionLogRecord, SessionLogSink};
use crate::telemetry::{self, Direction};
use crate::transport::CounterpartyChannel;

// ── Shared context ──────────────────────────────────────────────────

/// Everything a stage may touch. Cheap to clone; every field is a handle.
#[derive(Clone)]
pub(crate) struct StageContext {
    pub identity: Arc<GatewayIdentity>,
    pub counterparties: Arc<CounterpartyRegistry>,
    pub bridges: Arc<BridgeRegistry>,
    pub store: SessionStore,
    pub sink: Arc<dyn SessionLogSink>,
    pub defaults: SessionDefaults,
}

impl StageContext {
    pub fn signer(&self) -> &dyn SignatureScheme {
        self.identity.signer()
    }

    /// Re-read the session and fail if it was cancelled meanwhile. Called
    /// immediately before every ledger effect.
    pub fn ensure_live(&self, id: &SessionId, tag: &ErrorTag) -> Result<(), SatpError> {
        self.store.get(id)?.ensure_live(tag)
    }

    pub fn log(
        &self,
        id: &SessionId,
        kind: impl Into<String>,
        operation: LogOperation,
        data: serde_json::Value,
    ) {
        self.sink
            .append(SessionLogRecord::new(id.clone(), kind, operation, data));
    }

    pub fn log_effects(&self, id: &SessionId, effects: &[LedgerEffect]) {
        for effect in effects {
            self.log(
                id,
                effect.name(),
                LogOperation::Exec,
                serde_json::to_value(effect).unwrap_or_default(),
            );
        }
    }

    /// Compensating effects go under the `ROLLBACK` type so a log replay can
    /// tell them apart from forward effects of the same kind.
    pub fn log_compensations(&self, id: &SessionId, compensations: &[LedgerEffect]) {
        for inverse in compensations {
            self.log(
                id,
                ROLLBACK_LOG_TYPE,
                LogOperation::Exec,
                serde_json::to_value(inverse).unwrap_or_default(),
            );
        }
    }

    /// Close a step. The record carries a snapshot of the session, which is
    /// what [`crate::recovery`] rebuilds sessions from.
    pub fn log_done(&self, kind: &str, session: &SessionData) {
        self.log(
            &session.session_id,
            kind,
            LogOperation::Done,
            serde_json::json!({
                "status": session.status.name(),
                "session": session,
            }),
        );
    }
}

/// Log type of rollback records.
pub(crate) const ROLLBACK_LOG_TYPE: &str = "ROLLBACK";

// ── Stage results ───────────────────────────────────────────────────

/// Ledger work done by a stage: the effects it applied and the claims
/// they produced.
#[derive(Debug, Clone, Default)]
pub(crate) struct Executed {
    pub effects: Vec<LedgerEffect>,
    pub claims: SessionClaims,
}

/// Outcome of a server stage: its ledger work, the status the session
/// moves to and the payload of the answer.
#[derive(Debug, Clone)]
pub(crate) struct Processed {
    pub executed: Executed,
    pub next_status: SessionStatus,
    pub payload: Payload,
}

/// What a client stage takes from an accepted response.
#[derive(Debug, Clone)]
pub(crate) struct Accepted {
    pub claims: SessionClaims,
    pub next_status: SessionStatus,
}

impl Accepted {
    pub fn advance(next_status: SessionStatus) -> Self {
        Self {
            claims: SessionClaims::default(),
            next_status,
        }
    }
}

/// A failed stage, with the effects it had already applied.
#[derive(Debug, Clone)]
pub(crate) struct StageFailure {
    pub error: SatpError,
    pub applied: Vec<LedgerEffect>,
}

impl StageFailure {
    pub fn after(error: SatpError, applied: &[LedgerEffect]) -> Self {
        Self {
            error,
            applied: applied.to_vec(),
        }
    }
}

impl From<SatpError> for StageFailure {
    fn from(error: SatpError) -> Self {
        Self {
            error,
            applied: Vec::new(),
        }
    }
}

/// A served request: the sealed answer and where the session now stands.
#[derive(Debug, Clone)]
pub(crate) struct Served {
    pub response: Envelope,
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub sequence_number: u64,
    pub max_timeout_ms: u64,
    pub replayed: bool,
}

impl Served {
    fn from_session(response: Envelope, session: &SessionData, replayed: bool) -> Self {
        Self {
            response,
            session_id: session.session_id.clone(),
            status: session.status,
            sequence_number: session.sequence_number,
            max_timeout_ms: session.max_timeout_ms,
            replayed,
        }
    }
}

// ── Stage contracts ─────────────────────────────────────────────────

#[async_trait]
pub(crate) trait ServerStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn stage(&self) -> Stage;

    fn request_type(&self) -> MessageType;

    /// Status the session must be in for the request to be served.
    fn precondition(&self) -> SessionStatus;

    async fn process(
        &self,
        ctx: &StageContext,
        session: &SessionData,
        request: &ValidatedEnvelope,
    ) -> Result<Processed, StageFailure>;
}

#[async_trait]
pub(crate) trait ClientStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn stage(&self) -> Stage;

    fn request_type(&self) -> MessageType;

    fn precondition(&self) -> SessionStatus;

    /// Local ledger effect performed before the request is sent.
    async fn execute(
        &self,
        _ctx: &StageContext,
        _session: &SessionData,
    ) -> Result<Executed, StageFailure> {
        Ok(Executed::default())
    }

    fn request(
        &self,
        ctx: &StageContext,
        session: &SessionData,
        executed: &Executed,
    ) -> Result<Payload, SatpError>;

    fn accept(
        &self,
        ctx: &StageContext,
        session: &SessionData,
        response: &ValidatedEnvelope,
    ) -> Result<Accepted, SatpError>;
}

fn tag_for(stage: Stage, name: &str, op: &str) -> ErrorTag {
    ErrorTag::at(stage, format!("{name}::{op}"))
}

pub(crate) fn parse_session_id(common_id: &str, tag: &ErrorTag) -> Result<SessionId, SatpError> {
    SessionId::parse(common_id).map_err(|e| SatpError::MissingSatpCommonBody {
        tag: tag.clone(),
        detail: e.to_string(),
    })
}

fn to_wire(envelope: &Envelope, tag: &ErrorTag) -> Result<String, SatpError> {
    envelope.to_json().map_err(|e| SatpError::Serialization {
        tag: tag.clone(),
        reason: e.to_string(),
    })
}

/// The cached answer when `envelope` is a resend of the last request this
/// session accepted.
pub(crate) fn replay(
    session: &SessionData,
    envelope: &Envelope,
    tag: &ErrorTag,
) -> Result<Option<Served>, SatpError> {
    let (Some(last_inbound), Some(last_outbound)) =
        (&session.last_inbound_hash, &session.last_outbound)
    else {
        return Ok(None);
    };
    if message_hash(envelope, tag)? != *last_inbound {
        return Ok(None);
    }
    let response = Envelope::from_json(last_outbound).map_err(|e| SatpError::Serialization {
        tag: tag.clone(),
        reason: e.to_string(),
    })?;
    tracing::debug!(session_id = %session.session_id, "replaying cached response");
    Ok(Some(Served::from_session(response, session, true)))
}

/// Record an accepted request, move the session to `next` and seal the
/// answer. Runs inside a store update.
pub(crate) fn respond(
    ctx: &StageContext,
    session: &mut SessionData,
    request: &ValidatedEnvelope,
    payload: Payload,
    next: SessionStatus,
    reason: Option<String>,
    tag: &ErrorTag,
) -> Result<Envelope, SatpError> {
    session.record_message(
        request.message_type().name(),
        request.sequence_number(),
        request.hash(),
    );
    session.try_transition(next, reason, tag)?;
    let common = outbound_common(session, payload.message_type(), tag)?;
    let sequence_number = common.sequence_number;
    let sealed = seal(Envelope::new(common, payload), ctx.signer(), tag)?;
    let hash = message_hash(&sealed, tag)?;
    session.record_message(sealed.message_type().name(), sequence_number, &hash);
    session.last_inbound_hash = Some(request.hash().to_string());
    session.last_outbound = Some(to_wire(&sealed, tag)?);
    Ok(sealed)
}

/// Persist effects that were applied but never made it into a committed
/// step, so a later rollback sees them. If a rollback already claimed the
/// session it will not look again, so the effects are undone here.
async fn record_applied(
    ctx: &StageContext,
    id: &SessionId,
    applied: &[LedgerEffect],
    tag: &ErrorTag,
) {
    if applied.is_empty() {
        return;
    }
    let recorded = ctx.store.update(id, |s| {
        if s.is_cancelled() {
            return Ok(false);
        }
        for effect in applied {
            s.record_effect(effect.clone());
        }
        Ok(true)
    });
    match recorded {
        Ok(true) => ctx.log_effects(id, applied),
        Ok(false) => compensate_unrecorded(ctx, id, applied, tag).await,
        Err(e) => {
            tracing::error!(session_id = %id, error = %e, "failed to record applied effects");
        }
    }
}

/// Undo effects applied by a step that lost a race with cancellation. The
/// rollback that cancelled the session never saw them, so they are
/// compensated here and logged on the session as already compensated.
pub(crate) async fn compensate_unrecorded(
    ctx: &StageContext,
    id: &SessionId,
    applied: &[LedgerEffect],
    tag: &ErrorTag,
) {
    if applied.is_empty() {
        return;
    }
    let mut compensated = Vec::new();
    for inverse in compensation_plan(applied) {
        match ctx.bridges.apply(&inverse, tag).await {
            Ok(()) => compensated.push(inverse),
            Err(e) => {
                tracing::error!(session_id = %id, effect = %inverse, error = %e, "late compensation failed");
                break;
            }
        }
    }
    ctx.log_effects(id, applied);
    ctx.log_compensations(id, &compensated);
    let recorded = ctx.store.update(id, |s| {
        s.effects.extend(applied.iter().cloned());
        s.compensations.extend(compensated.iter().cloned());
        Ok(())
    });
    if let Err(e) = recorded {
        tracing::error!(session_id = %id, error = %e, "failed to record late compensation");
    }
}

// ── Server driver ───────────────────────────────────────────────────

/// Serve a request for an existing session.
pub(crate) async fn serve(
    ctx: &StageContext,
    stage: &dyn ServerStage,
    envelope: Envelope,
) -> Result<Served, SatpError> {
    let tag = tag_for(stage.stage(), stage.name(), "serve");
    let request_type = stage.request_type();
    let common = verify_common_body(&envelope, &[request_type], &tag)?;
    let session_id = parse_session_id(&common.session_id, &tag)?;
    let session = ctx.store.get(&session_id)?;

    if let Some(replayed) = replay(&session, &envelope, &tag)? {
        return Ok(replayed);
    }
    if session.status == SessionStatus::Completed {
        return Err(SatpError::SessionCompleted {
            tag,
            session_id: session_id.to_string(),
        });
    }
    session.ensure_live(&tag)?;

    let request = check_envelope(&envelope, &session, &[request_type], ctx.signer(), &tag)?;
    session.ensure_status(stage.precondition(), &tag)?;
    ctx.log(
        &session_id,
        request_type.name(),
        LogOperation::Init,
        serde_json::json!({
            "sequenceNumber": request.sequence_number(),
            "hash": request.hash(),
        }),
    );

    let processed = match stage.process(ctx, &session, &request).await {
        Ok(processed) => processed,
        Err(failure) if failure.applied.is_empty() => return Err(failure.error),
        Err(failure) => {
            // The client resends on a ledger error. With part of the stage
            // already applied, a second run would apply it again, so the
            // session is unwound now and a resend finds it cancelled.
            record_applied(ctx, &session_id, &failure.applied, &tag).await;
            let guard = RollbackGuard::AtSequence(session.sequence_number);
            let reason = failure.error.to_string();
            if let Err(e) = roll_back(ctx, &session_id, &failure.error, reason, guard).await {
                tracing::error!(session_id = %session_id, error = %e, "rollback after partial stage failed");
            }
            return Err(failure.error);
        }
    };

    let expected_sequence = session.sequence_number;
    let committed = ctx.store.update(&session_id, |s| {
        if s.is_cancelled() {
            return Ok(None);
        }
        if s.sequence_number != expected_sequence {
            return Err(SatpError::ConcurrentModification {
                tag: tag.clone(),
                session_id: session_id.to_string(),
                expected: session.revision,
                found: s.revision,
            });
        }
        verify_sequence(request.common(), s.sequence_number + 1, &tag)?;
        verify_hash_chain(
            request.common(),
            s.last_message_hash.as_deref().unwrap_or_default(),
            &tag,
        )?;
        for effect in &processed.executed.effects {
            s.record_effect(effect.clone());
        }
        s.claims.merge(processed.executed.claims.clone());
        let response = respond(
            ctx,
            s,
            &request,
            processed.payload.clone(),
            processed.next_status,
            None,
            &tag,
        )?;
        Ok(Some((Served::from_session(response, s, false), s.clone())))
    });

    match committed {
        Ok(Some((served, snapshot))) => {
            ctx.log_effects(&session_id, &processed.executed.effects);
            ctx.log_done(served.response.message_type().name(), &snapshot);
            telemetry::record_transition(served.status.name());
            tracing::info!(
                session_id = %session_id,
                stage = %stage.stage(),
                status = %served.status,
                "request served"
            );
            Ok(served)
        }
        Ok(None) => {
            compensate_unrecorded(ctx, &session_id, &processed.executed.effects, &tag).await;
            let current = ctx.store.get(&session_id)?;
            Err(SatpError::SessionCancelled {
                tag,
                session_id: session_id.to_string(),
                status: current.status.name().to_string(),
            })
        }
        Err(e) => {
            compensate_unrecorded(ctx, &session_id, &processed.executed.effects, &tag).await;
            Err(e)
        }
    }
}

// ── Client driver ───────────────────────────────────────────────────

/// Run one client stage: local effect, request, validated answer, commit.
pub(crate) async fn run_step(
    ctx: &StageContext,
    stage: &dyn ClientStage,
    session_id: &SessionId,
    channel: &dyn CounterpartyChannel,
) -> Result<SessionStatus, SatpError> {
    let tag = tag_for(stage.stage(), stage.name(), "run");
    let session = ctx.store.get(session_id)?;
    session.ensure_status(stage.precondition(), &tag)?;

    let executed = match stage.execute(ctx, &session).await {
        Ok(executed) => executed,
        Err(failure) => {
            record_applied(ctx, session_id, &failure.applied, &tag).await;
            return Err(failure.error);
        }
    };
    let payload = match stage.request(ctx, &session, &executed) {
        Ok(payload) => payload,
        Err(e) => {
            record_applied(ctx, session_id, &executed.effects, &tag).await;
            return Err(e);
        }
    };

    let request_type = stage.request_type();
    let outbound = ctx.store.update_if(session_id, session.revision, |s| {
        for effect in &executed.effects {
            s.record_effect(effect.clone());
        }
        s.claims.merge(executed.claims.clone());
        let common = outbound_common(s, request_type, &tag)?;
        let sequence_number = common.sequence_number;
        let sealed = seal(Envelope::new(common, payload.clone()), ctx.signer(), &tag)?;
        let hash = message_hash(&sealed, &tag)?;
        s.record_message(request_type.name(), sequence_number, &hash);
        s.last_outbound = Some(to_wire(&sealed, &tag)?);
        Ok((sealed, s.max_retries, s.max_timeout_ms))
    });
    let (request, max_retries, max_timeout_ms) = match outbound {
        Ok(sent) => sent,
        Err(e) => {
            // Any write since the snapshot is a cancellation or a rival
            // step. Either way these effects are ours to undo.
            compensate_unrecorded(ctx, session_id, &executed.effects, &tag).await;
            let current = ctx.store.get(session_id)?;
            if current.is_cancelled() {
                return Err(SatpError::SessionCancelled {
                    tag,
                    session_id: session_id.to_string(),
                    status: current.status.name().to_string(),
                });
            }
            return Err(e);
        }
    };
    ctx.log_effects(session_id, &executed.effects);
    ctx.log(
        session_id,
        request_type.name(),
        LogOperation::Init,
        serde_json::json!({ "sequenceNumber": request.sequence_number() }),
    );
    telemetry::record_envelope(Direction::Outbound, "sent");

    let controller = RetryController::new(RetryPolicy::new(
        max_retries,
        max_timeout_ms,
        &ctx.defaults,
    ));
    let (response, accepted) = controller
        .exchange(&ctx.store, session_id, &request, channel, &tag, |response| {
            let current = ctx.store.get(session_id)?;
            let validated = check_envelope(
                response,
                &current,
                request_type.response_types(),
                ctx.signer(),
                &tag,
            )?;
            let accepted = stage.accept(ctx, &current, &validated)?;
            Ok((validated, accepted))
        })
        .await?;

    let snapshot = ctx.store.update(session_id, |s| {
        s.ensure_live(&tag)?;
        verify_sequence(response.common(), s.sequence_number + 1, &tag)?;
        verify_hash_chain(
            response.common(),
            s.last_message_hash.as_deref().unwrap_or_default(),
            &tag,
        )?;
        s.record_message(
            response.message_type().name(),
            response.sequence_number(),
            response.hash(),
        );
        s.last_inbound_hash = Some(response.hash().to_string());
        s.claims.merge(accepted.claims.clone());
        s.try_transition(accepted.next_status, None, &tag)?;
        Ok(s.clone())
    })?;
    let status = snapshot.status;

    telemetry::record_envelope(Direction::Inbound, "accepted");
    telemetry::record_transition(status.name());
    ctx.log_done(response.message_type().name(), &snapshot);
    tracing::info!(
        session_id = %session_id,
        stage = %stage.stage(),
        status = %status,
        "stage complete"
    );
    Ok(status)
}

/// Client steps in protocol order.
pub(crate) fn client_steps() -> [&'static dyn ClientStage; 5] {
    [
        &initiation::ClientInitiation,
        &lock::ClientLockAssertion,
        &commitment::ClientCommitPreparation,
        &commitment::ClientCommitFinal,
        &completion::ClientCompletion,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use satp_bridge::{BridgeManager, BridgeOp, MemoryLedger};
    use satp_core::LedgerKind;

    use super::testing::{client_session, context};

    fn lock() -> LedgerEffect {
        LedgerEffect::Lock {
            ledger: LedgerKind::Fabric,
            asset_id: "fab-bond-1".into(),
            owner: "alice".into(),
            amount: 10,
        }
    }

    fn locked_ledger() -> Arc<MemoryLedger> {
        let ledger = Arc::new(MemoryLedger::new(LedgerKind::Fabric));
        ledger.deposit("fab-bond-1", ledger.custody_account(), 10);
        ledger
    }

    #[tokio::test]
    async fn applied_effects_land_on_a_live_session() {
        let ledger = locked_ledger();
        let ctx = context(Some(ledger.clone()));
        let session = client_session(&ctx, SessionStatus::Initiated);

        record_applied(&ctx, &session.session_id, &[lock()], &ErrorTag::new("test")).await;

        let session = ctx.store.get(&session.session_id).unwrap();
        assert_eq!(session.effects, vec![lock()]);
        assert!(session.compensations.is_empty());
        assert_eq!(ledger.calls(BridgeOp::Unlock), 0);
    }

    #[tokio::test]
    async fn effects_applied_after_a_rollback_claim_are_undone() {
        let ledger = locked_ledger();
        let ctx = context(Some(ledger.clone()));
        let session = client_session(&ctx, SessionStatus::Initiated);
        let cause = SatpError::Timeout {
            tag: ErrorTag::new("test"),
            elapsed_ms: 5_000,
        };
        roll_back(&ctx, &session.session_id, &cause, "deadline".into(), RollbackGuard::Any)
            .await
            .unwrap();

        record_applied(&ctx, &session.session_id, &[lock()], &ErrorTag::new("test")).await;

        let session = ctx.store.get(&session.session_id).unwrap();
        assert_eq!(session.effects, vec![lock()]);
        assert_eq!(session.compensations, vec![lock().inverse()]);
        assert_eq!(ledger.balance("fab-bond-1", "alice"), 10);
        assert_eq!(ledger.custody_balance("fab-bond-1"), 0);
    }
}
