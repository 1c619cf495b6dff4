//! # Retry and Timeout Control
//!
//! Two mechanisms bound how long a session may sit between states.
//!
//! - [`RetryController`] drives one client exchange. The request envelope is
//!   resent unchanged (same sequence number, same signature) until a valid
//!   answer arrives, `max_retries` resends are spent, or `max_timeout`
//!   elapses. The server recognises a resend by its hash and answers from
//!   cache, so no ledger effect runs twice.
//! - [`SessionWatchdog`] guards server sessions. Every accepted envelope
//!   re-arms a `max_timeout` timer; expiry rolls the session back. Terminal
//!   sessions are archived once `terminal_retention_ms` has passed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use satp_core::{ErrorCategory, ErrorTag, SatpError, SessionId};
use satp_protocol::Envelope;
use satp_state::SessionStore;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::SessionDefaults;
use crate::rollback::{purge, roll_back, RollbackGuard};
use crate::stages::StageContext;
use crate::telemetry::{self, Direction};
use crate::transport::{ChannelError, CounterpartyChannel};

// ── Retry policy ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub max_timeout: Duration,
    pub backoff: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, max_timeout_ms: u64, defaults: &SessionDefaults) -> Self {
        Self {
            max_retries,
            max_timeout: Duration::from_millis(max_timeout_ms),
            backoff: Duration::from_millis(defaults.retry_backoff_ms),
            backoff_max: Duration::from_millis(defaults.retry_backoff_max_ms),
        }
    }

    /// Delay before resend number `attempt` (1-based): the base backoff
    /// doubled per earlier resend, capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff.saturating_mul(factor).min(self.backoff_max)
    }
}

/// Whether a failed attempt is worth resending. Cancellation and an
/// explicit refusal are final; anything else may be a lost or damaged
/// message.
fn retryable(error: &SatpError) -> bool {
    !matches!(error.category(), ErrorCategory::Cancelled)
        && !matches!(error, SatpError::TransferRejected { .. })
}

// ── Exchange ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send `request` and return the first answer `validate` accepts.
    ///
    /// # Errors
    ///
    /// `Timeout` when the deadline passes, `SessionCancelled` when the
    /// session is cancelled between attempts, a non-retryable error as soon
    /// as it occurs, and otherwise the last error once resends run out.
    pub async fn exchange<T, F>(
        &self,
        store: &SessionStore,
        session_id: &SessionId,
        request: &Envelope,
        channel: &dyn CounterpartyChannel,
        tag: &ErrorTag,
        mut validate: F,
    ) -> Result<T, SatpError>
    where
        T: Send,
        F: FnMut(&Envelope) -> Result<T, SatpError> + Send,
    {
        let started = Instant::now();
        let deadline = started + self.policy.max_timeout;
        let attempts = async {
            let mut last = None;
            for attempt in 0..=self.policy.max_retries {
                if attempt > 0 {
                    tokio::time::sleep(self.policy.delay(attempt)).await;
                }
                store.get(session_id)?.ensure_live(tag)?;
                let outcome = match channel.send(request.clone()).await {
                    Ok(response) => validate(&response),
                    Err(ChannelError::Transport(reason)) => Err(SatpError::Transport {
                        tag: tag.clone(),
                        reason,
                    }),
                    Err(ChannelError::Rejected(remote)) => Err(remote),
                };
                match outcome {
                    Ok(value) => return Ok(value),
                    Err(e) if !retryable(&e) => return Err(e),
                    Err(e) => {
                        telemetry::record_envelope(Direction::Inbound, "retry");
                        tracing::warn!(
                            session_id = %session_id,
                            attempt = attempt + 1,
                            max_retries = self.policy.max_retries,
                            code = e.code(),
                            "exchange failed: {e}"
                        );
                        last = Some(e);
                    }
                }
            }
            Err(last.unwrap_or_else(|| SatpError::Transport {
                tag: tag.clone(),
                reason: "no attempt made".into(),
            }))
        };
        match tokio::time::timeout_at(deadline, attempts).await {
            Ok(result) => result,
            Err(_) => Err(SatpError::Timeout {
                tag: tag.clone(),
                elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

// ── Watchdog ────────────────────────────────────────────────────────

/// One timer per session. Arming a session replaces its previous timer.
#[derive(Debug, Clone, Default)]
pub struct SessionWatchdog {
    timers: Arc<Mutex<HashMap<SessionId, JoinHandle<()>>>>,
}

impl SessionWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roll the session back if it is still at `sequence_number` after
    /// `timeout`.
    pub(crate) fn arm(
        &self,
        ctx: &StageContext,
        session_id: &SessionId,
        sequence_number: u64,
        timeout: Duration,
    ) {
        let ctx = ctx.clone();
        let id = session_id.clone();
        let timers = self.timers.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let cause = SatpError::Timeout {
                tag: ErrorTag::new("SessionWatchdog"),
                elapsed_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            };
            tracing::warn!(session_id = %id, "session deadline expired");
            let guard = RollbackGuard::AtSequence(sequence_number);
            match roll_back(&ctx, &id, &cause, cause.to_string(), guard).await {
                Ok(session) if session.status.is_terminal() => {
                    tokio::time::sleep(Duration::from_millis(ctx.defaults.retention_ms())).await;
                    timers.lock().remove(&id);
                    purge(&ctx, &id);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(session_id = %id, error = %e, "timeout rollback failed"),
            }
        });
        self.replace(session_id, handle);
    }

    /// Archive a terminal session after the retention period.
    pub(crate) fn schedule_purge(&self, ctx: &StageContext, session_id: &SessionId) {
        let ctx = ctx.clone();
        let id = session_id.clone();
        let timers = self.timers.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ctx.defaults.retention_ms())).await;
            timers.lock().remove(&id);
            purge(&ctx, &id);
        });
        self.replace(session_id, handle);
    }

    pub fn disarm(&self, session_id: &SessionId) {
        if let Some(handle) = self.timers.lock().remove(session_id) {
            handle.abort();
        }
    }

    pub fn is_armed(&self, session_id: &SessionId) -> bool {
        self.timers.lock().contains_key(session_id)
    }

    pub fn armed(&self) -> usize {
        self.timers.lock().len()
    }

    fn replace(&self, session_id: &SessionId, handle: JoinHandle<()>) {
        if let Some(previous) = self.timers.lock().insert(session_id.clone(), handle) {
            previous.abort();
        }
    }
}
