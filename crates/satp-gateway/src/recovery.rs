//! # Crash Recovery
//!
//! Rebuilds sessions from the session log after a restart. Every `Done`
//! record carries a snapshot of the session as the step left it; effects
//! executed after the newest snapshot are logged as `Exec` records of their
//! own. Folding those onto the snapshot gives the effect log as it stood
//! when the process stopped.
//!
//! What happens to a rebuilt session:
//!
//! | Session                                  | Action                        |
//! |------------------------------------------|-------------------------------|
//! | archived, or rollback already finished   | skipped                       |
//! | terminal                                 | restored, archived later      |
//! | client role                              | rolled back                   |
//! | server, step interrupted or deadline due | rolled back                   |
//! | server, otherwise                        | resumed, watchdog re-armed    |
//!
//! A client session is always rolled back: the task that drove it did not
//! survive the restart.

use std::collections::HashMap;
use std::time::Duration;

use satp_core::{ErrorTag, SatpError, SessionId, Timestamp};
use satp_state::{GatewayRole, LedgerEffect, SessionData, SessionStatus};
use serde::{Deserialize, Serialize};

use crate::controller::SessionWatchdog;
use crate::rollback::{roll_back, RollbackGuard};
use crate::sink::{LogOperation, SessionLogRecord};
use crate::stages::{StageContext, ROLLBACK_LOG_TYPE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryAction {
    /// Put back as it was; the watchdog runs the rest of its deadline.
    Resumed,
    /// Compensated on recovery.
    RolledBack,
    /// Already terminal; kept readable until the retention period ends.
    Restored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveredSession {
    pub session_id: SessionId,
    pub action: RecoveryAction,
    pub status: SessionStatus,
}

/// One session as its log records describe it.
#[derive(Debug, Clone)]
pub(crate) struct Replayed {
    pub session: SessionData,
    /// The newest record is not a `Done`: a step was under way.
    pub interrupted: bool,
    pub last_seen: Timestamp,
}

/// Fold one session's records, oldest first.
///
/// `None` when there is nothing to recover: the session was archived, its
/// rollback ran to the end, or no step ever completed.
pub(crate) fn replay_records(
    records: &[&SessionLogRecord],
    tag: &ErrorTag,
) -> Result<Option<Replayed>, SatpError> {
    let settled = records.iter().any(|r| {
        r.operation == LogOperation::Archive
            || (r.kind == ROLLBACK_LOG_TYPE && r.operation == LogOperation::Fail)
    });
    let Some(last) = records.last() else {
        return Ok(None);
    };
    if settled {
        return Ok(None);
    }
    let Some(snapshot_at) = records
        .iter()
        .rposition(|r| r.operation == LogOperation::Done && r.data.get("session").is_some())
    else {
        return Ok(None);
    };

    let mut session: SessionData =
        serde_json::from_value(records[snapshot_at].data["session"].clone()).map_err(|e| {
            SatpError::Serialization {
                tag: tag.clone(),
                reason: format!("session snapshot: {e}"),
            }
        })?;
    for record in &records[snapshot_at + 1..] {
        if record.operation != LogOperation::Exec {
            continue;
        }
        let effect: LedgerEffect =
            serde_json::from_value(record.data.clone()).map_err(|e| SatpError::Serialization {
                tag: tag.clone(),
                reason: format!("{} record: {e}", record.kind),
            })?;
        if record.kind == ROLLBACK_LOG_TYPE {
            session.compensations.push(effect);
        } else {
            session.effects.push(effect);
        }
    }

    Ok(Some(Replayed {
        session,
        interrupted: last.operation != LogOperation::Done,
        last_seen: last.timestamp,
    }))
}

/// Rebuild every recoverable session in `records` into `ctx.store`.
///
/// Sessions already in the store are left alone. A session whose records
/// cannot be read is logged and skipped.
pub(crate) async fn recover(
    ctx: &StageContext,
    watchdog: &SessionWatchdog,
    records: &[SessionLogRecord],
) -> Vec<RecoveredSession> {
    let tag = ErrorTag::new("recover");
    let mut order: Vec<&SessionId> = Vec::new();
    let mut by_session: HashMap<&SessionId, Vec<&SessionLogRecord>> = HashMap::new();
    for record in records {
        let entry = by_session.entry(&record.session_id).or_default();
        if entry.is_empty() {
            order.push(&record.session_id);
        }
        entry.push(record);
    }

    let mut recovered = Vec::new();
    for id in order {
        if ctx.store.contains(id) {
            continue;
        }
        let replayed = match replay_records(&by_session[id], &tag) {
            Ok(Some(replayed)) => replayed,
            Ok(None) => continue,
            Err(e) => {
                tracing::error!(session_id = %id, error = %e, "session log unreadable");
                continue;
            }
        };
        match resume(ctx, watchdog, replayed, &tag).await {
            Ok(session) => {
                tracing::info!(
                    session_id = %session.session_id,
                    action = ?session.action,
                    status = %session.status,
                    "session recovered"
                );
                recovered.push(session);
            }
            Err(e) => tracing::error!(session_id = %id, error = %e, "session recovery failed"),
        }
    }
    recovered
}

async fn resume(
    ctx: &StageContext,
    watchdog: &SessionWatchdog,
    replayed: Replayed,
    tag: &ErrorTag,
) -> Result<RecoveredSession, SatpError> {
    let Replayed {
        session,
        interrupted,
        last_seen,
    } = replayed;
    let session = ctx.store.create(session)?;
    let id = session.session_id.clone();

    if session.status.is_terminal() {
        watchdog.schedule_purge(ctx, &id);
        return Ok(RecoveredSession {
            session_id: id,
            action: RecoveryAction::Restored,
            status: session.status,
        });
    }

    let elapsed_ms = u64::try_from(Timestamp::now().epoch_secs() - last_seen.epoch_secs())
        .unwrap_or(0)
        .saturating_mul(1_000);
    let cause = if elapsed_ms >= session.max_timeout_ms {
        Some(SatpError::Timeout {
            tag: tag.clone(),
            elapsed_ms,
        })
    } else if interrupted || session.role == GatewayRole::Client {
        Some(SatpError::SessionInterrupted {
            tag: tag.clone(),
            session_id: id.to_string(),
        })
    } else {
        None
    };

    let Some(cause) = cause else {
        let remaining = Duration::from_millis(session.max_timeout_ms - elapsed_ms);
        watchdog.arm(ctx, &id, session.sequence_number, remaining);
        return Ok(RecoveredSession {
            session_id: id,
            action: RecoveryAction::Resumed,
            status: session.status,
        });
    };

    let session = roll_back(ctx, &id, &cause, cause.to_string(), RollbackGuard::Any).await?;
    if session.status.is_terminal() {
        watchdog.schedule_purge(ctx, &id);
    }
    Ok(RecoveredSession {
        session_id: id,
        action: RecoveryAction::RolledBack,
        status: session.status,
    })
}
