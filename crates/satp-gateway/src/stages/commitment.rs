//! # Stage 2: Commitment
//!
//! Two exchanges. In *prepare* the client burns the custodied units on the
//! source ledger and sends the burn claim; the server checks it. In
//! *commit* the server mints the units into custody on the recipient ledger
//! and assigns them to the beneficiary, returning both claims; the client
//! checks them.
//!
//! Claims are checked for presence and format only. Whether a mint matches
//! the burned amount is the bridges' concern.

use async_trait::async_trait;
use satp_bridge::{AssetRef, BridgeOp};
use satp_core::{ErrorTag, SatpError, Stage};
use satp_protocol::{
    CommitAcknowledgement, CommitFinalization, CommitPreparation, CommitReadiness, MessageType,
    Payload, ValidatedEnvelope,
};
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

// ── Prepare ─────────────────────────────────────────────────────────

pub(crate) struct ServerCommitPreparation;

#[async_trait]
impl ServerStage for ServerCommitPreparation {
    fn name(&self) -> &'static str {
        "ServerCommitPreparation"
    }

    fn stage(&self) -> Stage {
        Stage::Commitment
    }

    fn request_type(&self) -> MessageType {
        MessageType::CommitPrepare
    }

    fn precondition(&self) -> SessionStatus {
        SessionStatus::Locked
    }

    async fn process(
        &self,
        _ctx: &StageContext,
        _session: &SessionData,
        request: &ValidatedEnvelope,
    ) -> Result<Processed, StageFailure> {
        let tag = ErrorTag::at(Stage::Commitment, "ServerCommitPreparation::process");
        let Payload::CommitPrepare(preparation) = &request.envelope().payload else {
            return Err(
                unexpected(tag, &request.envelope().payload, MessageType::CommitPrepare).into(),
            );
        };
        let burn = preparation
            .burn_assertion_claim
            .clone()
            .ok_or_else(|| SatpError::MissingBurnAssertionClaim { tag: tag.clone() })?;
        burn.verify(&tag)?;
        Ok(Processed {
            executed: Executed {
                effects: Vec::new(),
                claims: SessionClaims {
                    burn: Some(burn),
                    ..SessionClaims::default()
                },
            },
            next_status: SessionStatus::CommitPrepared,
            payload: Payload::CommitReady(CommitReadiness {}),
        })
    }
}

pub(crate) struct ClientCommitPreparation;

#[async_trait]
impl ClientStage for ClientCommitPreparation {
    fn name(&self) -> &'static str {
        "ClientCommitPreparation"
    }

    fn stage(&self) -> Stage {
        Stage::Commitment
    }

    fn request_type(&self) -> MessageType {
        MessageType::CommitPrepare
    }

    fn precondition(&self) -> SessionStatus {
        SessionStatus::Locked
    }

    async fn execute(
        &self,
        ctx: &StageContext,
        session: &SessionData,
    ) -> Result<Executed, StageFailure> {
        let tag = ErrorTag::at(Stage::Commitment, "ClientCommitPreparation::execute");
        let asset = session.asset(&tag)?;
        let bridge = ctx.bridges.get(asset.source_ledger, &tag)?;
        let custodied = AssetRef::new(
            asset.source_ledger,
            asset.source_ledger_asset_id.as_str(),
            bridge.custody_account(),
            asset.amount,
        );

        ctx.ensure_live(&session.session_id, &tag)?;
        let burn = bridge
            .burn(&custodied)
            .await
            .map_err(|e| e.into_satp(BridgeOp::Burn, &tag))?;
        let applied = vec![LedgerEffect::Burn {
            ledger: custodied.ledger,
            asset_id: custodied.asset_id.clone(),
            amount: custodied.amount,
        }];
        burn.verify(&tag)
            .map_err(|e| StageFailure::after(e, &applied))?;

        Ok(Executed {
            effects: applied,
            claims: SessionClaims {
                burn: Some(burn),
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
        let burn = executed.claims.burn.clone().ok_or_else(|| {
            SatpError::MissingBurnAssertionClaim {
                tag: ErrorTag::at(Stage::Commitment, "ClientCommitPreparation::request"),
            }
        })?;
        Ok(Payload::CommitPrepare(CommitPreparation {
            burn_assertion_claim: Some(burn),
        }))
    }

    fn accept(
        &self,
        _ctx: &StageContext,
        _session: &SessionData,
        response: &ValidatedEnvelope,
    ) -> Result<Accepted, SatpError> {
        match &response.envelope().payload {
            Payload::CommitReady(_) => Ok(Accepted::advance(SessionStatus::CommitPrepared)),
            other => Err(unexpected(
                ErrorTag::at(Stage::Commitment, "ClientCommitPreparation::accept"),
                other,
                MessageType::CommitReady,
            )),
        }
    }
}

// ── Commit ──────────────────────────────────────────────────────────

pub(crate) struct ServerCommitFinal;

#[async_trait]
impl ServerStage for ServerCommitFinal {
    fn name(&self) -> &'static str {
        "ServerCommitFinal"
    }

    fn stage(&self) -> Stage {
        Stage::Commitment
    }

    fn request_type(&self) -> MessageType {
        MessageType::CommitFinal
    }

    fn precondition(&self) -> SessionStatus {
        SessionStatus::CommitPrepared
    }

    async fn process(
        &self,
        ctx: &StageContext,
        session: &SessionData,
        _request: &ValidatedEnvelope,
    ) -> Result<Processed, StageFailure> {
        let tag = ErrorTag::at(Stage::Commitment, "ServerCommitFinal::process");
        let asset = session.asset(&tag)?;
        let bridge = ctx.bridges.get(asset.recipient_ledger, &tag)?;
        let custody = bridge.custody_account().to_string();
        let custodied = AssetRef::new(
            asset.recipient_ledger,
            asset.recipient_ledger_asset_id.as_str(),
            custody.as_str(),
            asset.amount,
        );

        ctx.ensure_live(&session.session_id, &tag)?;
        let mint = bridge
            .mint(&custodied)
            .await
            .map_err(|e| e.into_satp(BridgeOp::Mint, &tag))?;
        let mut applied = vec![LedgerEffect::Mint {
            ledger: custodied.ledger,
            asset_id: custodied.asset_id.clone(),
            amount: custodied.amount,
        }];
        mint.verify(&tag)
            .map_err(|e| StageFailure::after(e, &applied))?;

        ctx.ensure_live(&session.session_id, &tag)
            .map_err(|e| StageFailure::after(e, &applied))?;
        let assignment = bridge
            .assign(&custodied, &asset.beneficiary)
            .await
            .map_err(|e| StageFailure::after(e.into_satp(BridgeOp::Assign, &tag), &applied))?;
        applied.push(LedgerEffect::Assign {
            ledger: custodied.ledger,
            asset_id: custodied.asset_id.clone(),
            amount: custodied.amount,
            from: custody,
            to: asset.beneficiary.clone(),
        });
        assignment
            .verify(&tag)
            .map_err(|e| StageFailure::after(e, &applied))?;

        Ok(Processed {
            executed: Executed {
                effects: applied,
                claims: SessionClaims {
                    mint: Some(mint.clone()),
                    assignment: Some(assignment.clone()),
                    ..SessionClaims::default()
                },
            },
            next_status: SessionStatus::Committed,
            payload: Payload::AckCommitFinal(CommitAcknowledgement {
                mint_assertion_claim: Some(mint),
                assignment_assertion_claim: Some(assignment),
            }),
        })
    }
}

pub(crate) struct ClientCommitFinal;

#[async_trait]
impl ClientStage for ClientCommitFinal {
    fn name(&self) -> &'static str {
        "ClientCommitFinal"
    }

    fn stage(&self) -> Stage {
        Stage::Commitment
    }

    fn request_type(&self) -> MessageType {
        MessageType::CommitFinal
    }

    fn precondition(&self) -> SessionStatus {
        SessionStatus::CommitPrepared
    }

    fn request(
        &self,
        _ctx: &StageContext,
        _session: &SessionData,
        _executed: &Executed,
    ) -> Result<Payload, SatpError> {
        Ok(Payload::CommitFinal(CommitFinalization {}))
    }

    fn accept(
        &self,
        _ctx: &StageContext,
        _session: &SessionData,
        response: &ValidatedEnvelope,
    ) -> Result<Accepted, SatpError> {
        let tag = ErrorTag::at(Stage::Commitment, "ClientCommitFinal::accept");
        let Payload::AckCommitFinal(ack) = &response.envelope().payload else {
            return Err(unexpected(
                tag,
                &response.envelope().payload,
                MessageType::AckCommitFinal,
            ));
        };
        let mint = ack
            .mint_assertion_claim
            .clone()
            .ok_or_else(|| SatpError::MissingMintAssertionClaim { tag: tag.clone() })?;
        mint.verify(&tag)?;
        let assignment = ack
            .assignment_assertion_claim
            .clone()
            .ok_or_else(|| SatpError::MissingAssignmentAssertionClaim { tag: tag.clone() })?;
        assignment.verify(&tag)?;
        Ok(Accepted {
            claims: SessionClaims {
                mint: Some(mint),
                assignment: Some(assignment),
                ..SessionClaims::default()
            },
            next_status: SessionStatus::Committed,
        })
    }
}
