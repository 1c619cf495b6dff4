//! # Rollback
//!
//! Compensation for a session that cannot finish. The session's effect log
//! is replayed backwards through [`LedgerEffect::inverse`] so every balance
//! it touched returns to where it was before the transfer started.
//! Compensations already on the session (a rollback interrupted by a
//! restart) are not applied again.
//!
//! A rollback first claims the session atomically: it sets
//! [`RollbackState`] in the store, which makes every in-flight stage see the
//! session as cancelled. Only one rollback can claim a session. Effects a
//! racing stage applies after the claim are compensated by that stage.
//!
//! Terminal status after compensation:
//!
//! | Effects logged | Compensation | Status        |
//! |----------------|--------------|---------------|
//! | none           | n/a          | `FAILED`      |
//! | some           | all applied  | `ROLLED_BACK` |
//! | some           | one failed   | `FAILED`      |

use satp_core::{ErrorTag, SatpError, SessionId};
use satp_state::{compensation_plan, LedgerEffect, RollbackState, SessionData, SessionStatus};

use crate::controller::RetryPolicy;
use crate::sink::LogOperation;
use crate::stages::{StageContext, ROLLBACK_LOG_TYPE};
use crate::telemetry;

/// Condition under which a rollback may claim a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RollbackGuard {
    /// Any live session.
    Any,
    /// Only while the session has not moved past this sequence number.
    AtSequence(u64),
}

/// Roll a session back after `cause`.
///
/// Returns the session as it stands afterwards. A session that is already
/// terminal, already rolling back, or fails the guard is returned untouched.
pub(crate) async fn roll_back(
    ctx: &StageContext,
    session_id: &SessionId,
    cause: &SatpError,
    reason: String,
    guard: RollbackGuard,
) -> Result<SessionData, SatpError> {
    let tag = ErrorTag::new("roll_back");
    let claimed = ctx.store.update(session_id, |s| {
        if s.is_cancelled() {
            return Ok(None);
        }
        if let RollbackGuard::AtSequence(sequence_number) = guard {
            if s.sequence_number != sequence_number {
                return Ok(None);
            }
        }
        s.rollback = Some(RollbackState::new(reason.clone()));
        s.record_failure(cause);
        let plan: Vec<LedgerEffect> = compensation_plan(&s.effects)
            .into_iter()
            .skip(s.compensations.len())
            .collect();
        let policy = RetryPolicy::new(s.max_retries, s.max_timeout_ms, &ctx.defaults);
        Ok(Some((plan, policy, s.effects.is_empty())))
    })?;
    let Some((plan, policy, nothing_to_undo)) = claimed else {
        return ctx.store.get(session_id);
    };

    tracing::warn!(
        session_id = %session_id,
        code = cause.code(),
        effects = plan.len(),
        "rolling back session: {reason}"
    );
    ctx.log(
        session_id,
        ROLLBACK_LOG_TYPE,
        LogOperation::Init,
        serde_json::json!({ "reason": reason, "code": cause.code() }),
    );

    let mut compensated = Vec::with_capacity(plan.len());
    let mut compensation_error = None;
    for inverse in plan {
        match apply_with_retry(ctx, session_id, &inverse, &policy, &tag).await {
            Ok(()) => {
                ctx.log_compensations(session_id, std::slice::from_ref(&inverse));
                compensated.push(inverse);
            }
            Err(e) => {
                tracing::error!(
                    session_id = %session_id,
                    effect = %inverse,
                    error = %e,
                    "compensation failed"
                );
                compensation_error = Some(e);
                break;
            }
        }
    }

    let target = if nothing_to_undo || compensation_error.is_some() {
        SessionStatus::Failed
    } else {
        SessionStatus::RolledBack
    };
    let session = ctx.store.update(session_id, |s| {
        s.compensations.extend(compensated.iter().cloned());
        if let (Some(state), Some(e)) = (s.rollback.as_mut(), &compensation_error) {
            state.compensation_error = Some(e.to_string());
        }
        if !s.status.is_terminal() {
            s.try_transition(target, Some(cause.code().to_string()), &tag)?;
        }
        Ok(s.clone())
    })?;

    telemetry::record_rollback(session.status.name());
    ctx.log(
        session_id,
        ROLLBACK_LOG_TYPE,
        LogOperation::Fail,
        serde_json::json!({
            "status": session.status.name(),
            "compensated": session.compensations.len(),
            "compensationError": compensation_error.as_ref().map(ToString::to_string),
        }),
    );
    tracing::info!(session_id = %session_id, status = %session.status, "rollback finished");
    Ok(session)
}

/// Apply one compensating effect, retrying bridge failures within the
/// session's own retry budget.
async fn apply_with_retry(
    ctx: &StageContext,
    session_id: &SessionId,
    effect: &LedgerEffect,
    policy: &RetryPolicy,
    tag: &ErrorTag,
) -> Result<(), SatpError> {
    let mut attempt = 0;
    loop {
        match ctx.bridges.apply(effect, tag).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay(attempt);
                tracing::warn!(
                    session_id = %session_id,
                    effect = %effect,
                    attempt,
                    "compensation attempt failed: {e}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Remove a terminal session from the store and write it to the log sink.
pub(crate) fn archive(ctx: &StageContext, session_id: &SessionId) -> Result<SessionData, SatpError> {
    let session = ctx.store.delete(session_id)?;
    ctx.log(
        session_id,
        "SESSION",
        LogOperation::Archive,
        serde_json::to_value(&session).unwrap_or_default(),
    );
    tracing::debug!(session_id = %session_id, status = %session.status, "session archived");
    Ok(session)
}

/// [`archive`] for background tasks, where a missing session is not an
/// error.
pub(crate) fn purge(ctx: &StageContext, session_id: &SessionId) {
    if let Err(e) = archive(ctx, session_id) {
        tracing::debug!(session_id = %session_id, error = %e, "nothing to purge");
    }
}
