//! # Stage 0: Transfer Initiation
//!
//! The client proposes the transfer: init claims (asset terms and the two
//! gateway ids), profiles, its network capabilities and the retry bounds.
//! The server either opens a session and answers `INIT_RECEIPT` carrying the
//! hash of the init claims, or opens it already `FAILED` and answers
//! `INIT_REJECT`.
//!
//! Anything wrong with the envelope itself (signature, unknown sender key,
//! missing claims or capabilities) is an error and opens no session. A
//! well-formed proposal this gateway will not serve is a rejection.

use async_trait::async_trait;
use satp_core::{ErrorTag, GatewayId, SatpError, Stage, TransferContextId};
use satp_protocol::{
    check_genesis, verify_common_body, Envelope, MessageType, NetworkCapabilities, Payload,
    ProposalReceipt, ProposalRejection, TransferInitClaims, TransferProposal, ValidatedEnvelope,
};
use satp_state::{GatewayRole, SessionData, SessionStatus};

use super::{parse_session_id, replay, respond, Accepted, ClientStage, Executed, Served, StageContext};
use crate::sink::LogOperation;

/// Init claims as the client states them, rebuilt from session data so
/// that the hash stored at session creation and the one sent agree.
pub(crate) fn init_claims(
    ctx: &StageContext,
    session: &SessionData,
    tag: &ErrorTag,
) -> Result<TransferInitClaims, SatpError> {
    let recipient_gateway =
        session
            .counterparty
            .clone()
            .ok_or_else(|| SatpError::SessionDataNotLoadedCorrectly {
                tag: tag.clone(),
                detail: "counterparty gateway not set".into(),
            })?;
    Ok(TransferInitClaims {
        asset: session.asset(tag)?.clone(),
        sender_gateway: ctx.identity.id().clone(),
        recipient_gateway,
    })
}

// ── Server ──────────────────────────────────────────────────────────

/// Open a session from an `INIT_PROPOSAL`.
pub(crate) fn serve_proposal(ctx: &StageContext, envelope: Envelope) -> Result<Served, SatpError> {
    let tag = ErrorTag::at(Stage::Initiation, "ServerInitiation::serve");
    let common = verify_common_body(&envelope, &[MessageType::InitProposal], &tag)?;
    let session_id = parse_session_id(&common.session_id, &tag)?;

    if let Ok(existing) = ctx.store.get(&session_id) {
        if let Some(replayed) = replay(&existing, &envelope, &tag)? {
            return Ok(replayed);
        }
        return Err(SatpError::DuplicateSession {
            tag,
            session_id: session_id.to_string(),
        });
    }

    let request = check_genesis(&envelope, ctx.identity.version(), ctx.signer(), &tag)?;
    let common = request.common();
    let counterparty = ctx
        .counterparties
        .by_pubkey(&common.sender_gateway_pubkey)
        .ok_or_else(|| SatpError::MissingClientGatewayPubkey { tag: tag.clone() })?;
    let own_pubkey = ctx.identity.pubkey();
    if !common.recipient_gateway_pubkey.eq_ignore_ascii_case(&own_pubkey) {
        return Err(SatpError::MissingServerGatewayPubkey { tag });
    }

    let Payload::InitProposal(proposal) = &request.envelope().payload else {
        return Err(SatpError::MessageTypeMissMatch {
            tag,
            received: request.envelope().payload.message_type().name().to_string(),
            expected: MessageType::InitProposal.name().to_string(),
        });
    };
    let claims = check_init_claims(ctx, proposal, &counterparty.id, &tag)?;
    let capabilities = proposal
        .network_capabilities
        .as_ref()
        .ok_or_else(|| SatpError::MissingNetworkCapabilities { tag: tag.clone() })?;
    check_capabilities(capabilities, &claims, &tag)?;

    let context_id = TransferContextId::parse(&common.transfer_context_id).map_err(|e| {
        SatpError::MissingSatpCommonBody {
            tag: tag.clone(),
            detail: e.to_string(),
        }
    })?;
    let mut session = SessionData::new(
        session_id.clone(),
        context_id,
        GatewayRole::Server,
        ctx.identity.version(),
    );
    session.counterparty = Some(counterparty.id.clone());
    session.bind_gateway_pubkeys(&common.sender_gateway_pubkey, &own_pubkey, &tag)?;
    session.asset = Some(claims.asset.clone());
    session.init_claims_hash = Some(claims.hash(&tag)?);
    session.max_retries = proposal.max_retries;
    session.max_timeout_ms = if proposal.max_timeout_ms == 0 {
        ctx.defaults.max_timeout_ms
    } else {
        proposal.max_timeout_ms
    };
    if let Some(profiles) = &proposal.profiles {
        session.negotiate_profiles(profiles.clone(), &tag)?;
    }

    ctx.log(
        &session_id,
        MessageType::InitProposal.name(),
        LogOperation::Init,
        serde_json::json!({
            "counterparty": counterparty.id,
            "hash": request.hash(),
        }),
    );

    let response = match rejection_reason(ctx, proposal, &claims) {
        None => {
            let receipt = Payload::InitReceipt(ProposalReceipt {
                hash_transfer_init_claims: session.init_claims_hash.clone().unwrap_or_default(),
            });
            respond(ctx, &mut session, &request, receipt, SessionStatus::Initiated, None, &tag)?
        }
        Some(reason) => {
            tracing::warn!(session_id = %session_id, %reason, "rejecting transfer proposal");
            session.record_failure(&SatpError::TransferRejected {
                tag: tag.clone(),
                reason: reason.clone(),
            });
            let reject = Payload::InitReject(ProposalRejection {
                reason: reason.clone(),
            });
            respond(
                ctx,
                &mut session,
                &request,
                reject,
                SessionStatus::Failed,
                Some(reason),
                &tag,
            )?
        }
    };

    let session = ctx.store.create(session)?;
    ctx.log_done(response.message_type().name(), &session);
    tracing::info!(session_id = %session_id, status = %session.status, "proposal answered");
    Ok(Served::from_session(response, &session, false))
}

fn check_init_claims(
    ctx: &StageContext,
    proposal: &TransferProposal,
    sender: &GatewayId,
    tag: &ErrorTag,
) -> Result<TransferInitClaims, SatpError> {
    let claims = proposal.transfer_init_claims.clone().ok_or_else(|| {
        SatpError::MissingTransferInitClaims {
            tag: tag.clone(),
            detail: "transferInitClaims absent".into(),
        }
    })?;
    let missing = claims.asset.missing_fields();
    if !missing.is_empty() {
        return Err(SatpError::MissingTransferInitClaims {
            tag: tag.clone(),
            detail: format!("missing {}", missing.join(", ")),
        });
    }
    if &claims.sender_gateway != sender {
        return Err(SatpError::MissingClientGatewayPubkey { tag: tag.clone() });
    }
    if &claims.recipient_gateway != ctx.identity.id() {
        return Err(SatpError::MissingServerGatewayPubkey { tag: tag.clone() });
    }
    Ok(claims)
}

/// The client must declare the source ledger as its own and list it among
/// the ledgers it supports.
fn check_capabilities(
    capabilities: &NetworkCapabilities,
    claims: &TransferInitClaims,
    tag: &ErrorTag,
) -> Result<(), SatpError> {
    let source = claims.asset.source_ledger;
    if capabilities.sender_ledger != source || !capabilities.supported_dlt_ids.contains(&source) {
        return Err(SatpError::DltNotSupported {
            tag: tag.clone(),
            dlt: source.to_string(),
        });
    }
    Ok(())
}

fn rejection_reason(
    ctx: &StageContext,
    proposal: &TransferProposal,
    claims: &TransferInitClaims,
) -> Option<String> {
    let recipient = claims.asset.recipient_ledger;
    if !ctx.identity.supports(recipient) {
        return Some(format!("recipient ledger {recipient} not supported"));
    }
    if !ctx.bridges.supports(recipient) {
        return Some(format!("no bridge for recipient ledger {recipient}"));
    }
    match &proposal.profiles {
        None => Some("transfer profiles missing".into()),
        Some(profiles) => {
            let missing = profiles.missing_fields();
            if missing.is_empty() {
                None
            } else {
                Some(format!("incomplete profiles: {}", missing.join(", ")))
            }
        }
    }
}

// ── Client ──────────────────────────────────────────────────────────

pub(crate) struct ClientInitiation;

#[async_trait]
impl ClientStage for ClientInitiation {
    fn name(&self) -> &'static str {
        "ClientInitiation"
    }

    fn stage(&self) -> Stage {
        Stage::Initiation
    }

    fn request_type(&self) -> MessageType {
        MessageType::InitProposal
    }

    fn precondition(&self) -> SessionStatus {
        SessionStatus::New
    }

    fn request(
        &self,
        ctx: &StageContext,
        session: &SessionData,
        _executed: &Executed,
    ) -> Result<Payload, SatpError> {
        let tag = ErrorTag::at(Stage::Initiation, "ClientInitiation::request");
        session.ensure_loaded(&tag)?;
        let asset = session.asset(&tag)?;
        if !ctx.identity.supports(asset.source_ledger) {
            return Err(SatpError::DltNotSupported {
                tag,
                dlt: asset.source_ledger.to_string(),
            });
        }
        let claims = init_claims(ctx, session, &tag)?;
        let counterparty = ctx.counterparties.get(&claims.recipient_gateway, &tag)?;
        if !counterparty.supports(asset.recipient_ledger) {
            return Err(SatpError::DltNotSupported {
                tag,
                dlt: asset.recipient_ledger.to_string(),
            });
        }
        Ok(Payload::InitProposal(TransferProposal {
            network_capabilities: Some(NetworkCapabilities {
                sender_ledger: asset.source_ledger,
                supported_dlt_ids: ctx.identity.supported_dlts().to_vec(),
            }),
            transfer_init_claims: Some(claims),
            profiles: session.profiles().cloned(),
            max_retries: session.max_retries,
            max_timeout_ms: session.max_timeout_ms,
        }))
    }

    fn accept(
        &self,
        _ctx: &StageContext,
        session: &SessionData,
        response: &ValidatedEnvelope,
    ) -> Result<Accepted, SatpError> {
        let tag = ErrorTag::at(Stage::Initiation, "ClientInitiation::accept");
        match &response.envelope().payload {
            Payload::InitReceipt(receipt) => {
                let expected = session.init_claims_hash.as_deref().unwrap_or_default();
                if receipt.hash_transfer_init_claims != expected {
                    return Err(SatpError::HashMissMatch {
                        tag,
                        received: receipt.hash_transfer_init_claims.clone(),
                        expected: expected.to_string(),
                    });
                }
                Ok(Accepted::advance(SessionStatus::Initiated))
            }
            Payload::InitReject(rejection) => Err(SatpError::TransferRejected {
                tag,
                reason: rejection.reason.clone(),
            }),
            other => Err(SatpError::MessageTypeMissMatch {
                tag,
                received: other.message_type().name().to_string(),
                expected: MessageType::InitReceipt.name().to_string(),
            }),
        }
    }
}
