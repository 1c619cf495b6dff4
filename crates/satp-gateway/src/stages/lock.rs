//! # Stage 1: Lock Assertion
//!
//! The client locks the asset on the source ledger (originator into the
//! bridge's custody account) and sends the resulting claim. The server
//! checks the claim is complete and unexpired, then acknowledges.

use async_trait::async_trait;
use satp_bridge::{AssetRef, BridgeOp, LockParams};
use satp_core::{ErrorTag, SatpError, Stage, Timestamp};
use satp_protocol::{AssertionReceipt, LockAssertion, MessageType, Payload, ValidatedEnvelope};
use satp_state::{LedgerEffect, SessionClaims, SessionData, SessionStatus};

use super::{
    Accepted, ClientStage, Executed, Processed, ServerStage, StageContext, StageFailure,
};

fn unexpected(tag: ErrorTag, payload: &Payload, expected: MessageType) -> SatpError {
    SatpError::MessageTypeMissMatch {
        tag,
        received: payload.message_type().name().to_string(),
        expected: expected.name().to_string(),
    }
}

// ── Server ──────────────────────────────────────────────────────────

pub(crate) struct ServerLockAssertion;

#[async_trait]
impl ServerStage for ServerLockAssertion {
    fn name(&self) -> &'static str {
        "ServerLockAssertion"
    }

    fn stage(&self) -> Stage {
        Stage::LockAssertion
    }

    fn request_type(&self) -> MessageType {
        MessageType::LockAssert
    }

    fn precondition(&self) -> SessionStatus {
        SessionStatus::Initiated
    }

    async fn process(
        &self,
        _ctx: &StageContext,
        _session: &SessionData,
        request: &ValidatedEnvelope,
    ) -> Result<Processed, StageFailure> {
        let tag = ErrorTag::at(Stage::LockAssertion, "ServerLockAssertion::process");
        let Payload::LockAssert(assertion) = &request.envelope().payload else {
            return Err(unexpected(tag, &request.envelope().payload, MessageType::LockAssert).into());
        };
        let claim = assertion.claim();
        claim.verify(&tag, &Timestamp::now())?;
        Ok(Processed {
            executed: Executed {
                effects: Vec::new(),
                claims: SessionClaims {
                    lock: Some(claim),
                    ..SessionClaims::default()
                },
            },
            next_status: SessionStatus::Locked,
            payload: Payload::AssertionReceipt(AssertionReceipt {}),
        })
    }
}

// ── Client ──────────────────────────────────────────────────────────

pub(crate) struct ClientLockAssertion;

#[async_trait]
impl ClientStage for ClientLockAssertion {
    fn name(&self) -> &'static str {
        "ClientLockAssertion"
    }

    fn stage(&self) -> Stage {
        Stage::LockAssertion
    }

    fn request_type(&self) -> MessageType {
        MessageType::LockAssert
    }

    fn precondition(&self) -> SessionStatus {
        SessionStatus::Initiated
    }

    async fn execute(
        &self,
        ctx: &StageContext,
        session: &SessionData,
    ) -> Result<Executed, StageFailure> {
        let tag = ErrorTag::at(Stage::LockAssertion, "ClientLockAssertion::execute");
        let asset = session.asset(&tag)?;
        let bridge = ctx.bridges.get(asset.source_ledger, &tag)?;
        let target = AssetRef::new(
            asset.source_ledger,
            asset.source_ledger_asset_id.as_str(),
            asset.originator.as_str(),
            asset.amount,
        );
        let params = LockParams {
            duration_secs: ctx.defaults.lock_duration_secs,
        };

        ctx.ensure_live(&session.session_id, &tag)?;
        let claim = bridge
            .lock(&target, &params)
            .await
            .map_err(|e| e.into_satp(BridgeOp::Lock, &tag))?;
        let applied = vec![LedgerEffect::Lock {
            ledger: target.ledger,
            asset_id: target.asset_id.clone(),
            owner: target.owner.clone(),
            amount: target.amount,
        }];
        claim
            .verify(&tag, &Timestamp::now())
            .map_err(|e| StageFailure::after(e, &applied))?;

        Ok(Executed {
            effects: applied,
            claims: SessionClaims {
                lock: Some(claim),
                ..SessionClaims::default()
            },
        })
    }

    fn request(
        &self,
        _ctx: &StageContext,
        _session: &SessionData,
        executed: &Executed,
    ) -> Result<Payload, SatpError> {
        let claim = executed.claims.lock.as_ref().ok_or_else(|| {
            SatpError::MissingLockAssertionClaim {
                tag: ErrorTag::at(Stage::LockAssertion, "ClientLockAssertion::request"),
            }
        })?;
        Ok(Payload::LockAssert(LockAssertion::from_claim(claim)))
    }

    fn accept(
        &self,
        _ctx: &StageContext,
        _session: &SessionData,
        response: &ValidatedEnvelope,
    ) -> Result<Accepted, SatpError> {
        match &response.envelope().payload {
            Payload::AssertionReceipt(_) => Ok(Accepted::advance(SessionStatus::Locked)),
            other => Err(unexpected(
                ErrorTag::at(Stage::LockAssertion, "ClientLockAssertion::accept"),
                other,
                MessageType::AssertionReceipt,
            )),
        }
    }
}
