//! # Stage 3: Transfer Completion
//!
//! The client restates the hash of the init claims and the full list of
//! message hashes exchanged so far. The server compares both against its own
//! record; agreement means both gateways saw the same conversation.

use async_trait::async_trait;
use satp_core::{ErrorTag, SatpError, Stage};
use satp_protocol::{
    CompletionReceipt, MessageType, Payload, TransferCompletion, ValidatedEnvelope,
};
use satp_state::{SessionData, SessionStatus};

use super::{Accepted, ClientStage, Executed, Processed, ServerStage, StageContext, StageFailure};

/// First position where two hash chains disagree, as a `HashMissMatch`.
pub(crate) fn compare_chains(
    received: &[String],
    expected: &[String],
    tag: &ErrorTag,
) -> Result<(), SatpError> {
    let len = received.len().max(expected.len());
    for i in 0..len {
        let got = received.get(i).map(String::as_str).unwrap_or_default();
        let want = expected.get(i).map(String::as_str).unwrap_or_default();
        if got != want {
            return Err(SatpError::HashMissMatch {
                tag: tag.clone(),
                received: format!("#{i} {got}"),
                expected: format!("#{i} {want}"),
            });
        }
    }
    Ok(())
}

// ── Server ──────────────────────────────────────────────────────────

pub(crate) struct ServerCompletion;

#[async_trait]
impl ServerStage for ServerCompletion {
    fn name(&self) -> &'static str {
        "ServerCompletion"
    }

    fn stage(&self) -> Stage {
        Stage::Completion
    }

    fn request_type(&self) -> MessageType {
        MessageType::TransferComplete
    }

    fn precondition(&self) -> SessionStatus {
        SessionStatus::Committed
    }

    async fn process(
        &self,
        _ctx: &StageContext,
        session: &SessionData,
        request: &ValidatedEnvelope,
    ) -> Result<Processed, StageFailure> {
        let tag = ErrorTag::at(Stage::Completion, "ServerCompletion::process");
        let Payload::TransferComplete(completion) = &request.envelope().payload else {
            return Err(SatpError::MessageTypeMissMatch {
                tag,
                received: request.message_type().name().to_string(),
                expected: MessageType::TransferComplete.name().to_string(),
            }
            .into());
        };
        let own = session.init_claims_hash.as_deref().unwrap_or_default();
        if completion.hash_transfer_init_claims != own {
            return Err(SatpError::HashMissMatch {
                tag,
                received: completion.hash_transfer_init_claims.clone(),
                expected: own.to_string(),
            }
            .into());
        }
        compare_chains(&completion.message_hashes, &session.chain_hashes(), &tag)?;
        Ok(Processed {
            executed: Executed::default(),
            next_status: SessionStatus::Completed,
            payload: Payload::TransferCompleteResponse(CompletionReceipt {}),
        })
    }
}

// ── Client ──────────────────────────────────────────────────────────

pub(crate) struct ClientCompletion;

#[async_trait]
impl ClientStage for ClientCompletion {
    fn name(&self) -> &'static str {
        "ClientCompletion"
    }

    fn stage(&self) -> Stage {
        Stage::Completion
    }

    fn request_type(&self) -> MessageType {
        MessageType::TransferComplete
    }

    fn precondition(&self) -> SessionStatus {
        SessionStatus::Committed
    }

    fn request(
        &self,
        _ctx: &StageContext,
        session: &SessionData,
        _executed: &Executed,
    ) -> Result<Payload, SatpError> {
        let hash_transfer_init_claims = session.init_claims_hash.clone().ok_or_else(|| {
            SatpError::SessionDataNotLoadedCorrectly {
                tag: ErrorTag::at(Stage::Completion, "ClientCompletion::request"),
                detail: "init claims hash not recorded".into(),
            }
        })?;
        Ok(Payload::TransferComplete(TransferCompletion {
            hash_transfer_init_claims,
            message_hashes: session.chain_hashes(),
        }))
    }

    fn accept(
        &self,
        _ctx: &StageContext,
        _session: &SessionData,
        response: &ValidatedEnvelope,
    ) -> Result<Accepted, SatpError> {
        match &response.envelope().payload {
            Payload::TransferCompleteResponse(_) => Ok(Accepted::advance(SessionStatus::Completed)),
            other => Err(SatpError::MessageTypeMissMatch {
                tag: ErrorTag::at(Stage::Completion, "ClientCompletion::accept"),
                received: other.message_type().name().to_string(),
                expected: MessageType::TransferCompleteResponse.name().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::{server_context, server_session, with_payload};

    fn hashes(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn identical_chains_agree() {
        let tag = ErrorTag::new("t");
        assert!(compare_chains(&hashes(&["a", "b"]), &hashes(&["a", "b"]), &tag).is_ok());
    }

    #[test]
    fn first_divergence_reported() {
        let tag = ErrorTag::new("t");
        let err = compare_chains(&hashes(&["a", "x", "y"]), &hashes(&["a", "b", "c"]), &tag)
            .unwrap_err();
        match err {
            SatpError::HashMissMatch {
                received, expected, ..
            } => {
                assert_eq!(received, "#1 x");
                assert_eq!(expected, "#1 b");
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn truncated_chain_rejected() {
        let tag = ErrorTag::new("t");
        assert!(compare_chains(&hashes(&["a"]), &hashes(&["a", "b"]), &tag).is_err());
    }

    #[tokio::test]
    async fn server_rejects_foreign_init_claims_hash() {
        let ctx = server_context(None);
        let session = server_session(&ctx, SessionStatus::Committed);
        let request = with_payload(
            &ctx,
            &session,
            Payload::TransferComplete(TransferCompletion {
                hash_transfer_init_claims: "0".repeat(64),
                message_hashes: session.chain_hashes(),
            }),
        );
        let failure = ServerCompletion
            .process(&ctx, &session, &request)
            .await
            .unwrap_err();
        assert_eq!(failure.error.code(), "HashMissMatch");
    }

    #[tokio::test]
    async fn server_completes_on_matching_record() {
        let ctx = server_context(None);
        let session = server_session(&ctx, SessionStatus::Committed);
        let request = with_payload(
            &ctx,
            &session,
            Payload::TransferComplete(TransferCompletion {
                hash_transfer_init_claims: session.init_claims_hash.clone().unwrap(),
                message_hashes: session.chain_hashes(),
            }),
        );
        let processed = ServerCompletion
            .process(&ctx, &session, &request)
            .await
            .unwrap();
        assert_eq!(processed.next_status, SessionStatus::Completed);
    }
}
