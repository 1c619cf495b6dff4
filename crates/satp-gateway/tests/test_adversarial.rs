//! # Adversarial Envelopes and Refusals
//!
//! Out-of-order, incomplete, foreign and tampered envelopes must leave the
//! receiving session where it was. Refusals and wiring gaps on the
//! originating side must end the session with nothing left locked.

mod common;

use std::time::Duration;

use async_trait::async_trait;
use common::*;
use satp_bridge::{BridgeOp, Fault};
use satp_core::{ClaimFormat, LedgerKind, SessionId, Timestamp};
use satp_crypto::{Ed25519KeyPair, Ed25519Scheme, SignatureScheme};
use satp_gateway::{ChannelError, CounterpartyChannel, LocalChannel, SessionDefaults};
use satp_protocol::{seal, Envelope, LockAssertion, MessageType, Payload};
use satp_state::SessionStatus;

/// A pair whose server holds session `id` at INITIATED: only the proposal
/// got through before the link went down.
async fn initiated_server() -> (Pair, SessionId) {
    let pair = pair();
    let channel = Cutoff {
        inner: LocalChannel::new(pair.server.clone()),
        forward: 1,
    };
    let id = SessionId::new();
    let outcome = pair.client.transfer(request(&id), &channel).await.unwrap();
    assert_eq!(outcome.status, SessionStatus::RolledBack);
    assert_eq!(
        pair.server.session(&id).unwrap().status,
        SessionStatus::Initiated
    );
    (pair, id)
}

fn lock_payload() -> Payload {
    Payload::LockAssert(LockAssertion {
        lock_assertion_claim: Some("fabric-lock-proof".into()),
        lock_assertion_claim_format: Some(ClaimFormat::Default),
        lock_assertion_expiration: Some(Timestamp::now().plus_secs(3_600)),
    })
}

#[tokio::test(start_paused = true)]
async fn out_of_sequence_lock_assert_is_refused() {
    let (pair, id) = initiated_server().await;
    let session = pair.server.session(&id).unwrap();
    assert_eq!(session.sequence_number, 1);

    let envelope = client_envelope(&session, &pair.server.pubkey(), 1, lock_payload());
    let err = pair.server.handle(envelope).await.unwrap_err();

    match err {
        satp_core::SatpError::SequenceNumberMissMatch {
            received, expected, ..
        } => {
            assert_eq!(received, 1);
            assert_eq!(expected, 2);
        }
        other => panic!("unexpected {other}"),
    }
    let after = pair.server.session(&id).unwrap();
    assert_eq!(after.status, SessionStatus::Initiated);
    assert_eq!(after.sequence_number, 1);
}

#[tokio::test(start_paused = true)]
async fn lock_assert_without_claim_is_refused() {
    let (pair, id) = initiated_server().await;
    let session = pair.server.session(&id).unwrap();

    let envelope = client_envelope(
        &session,
        &pair.server.pubkey(),
        2,
        Payload::LockAssert(LockAssertion {
            lock_assertion_claim: None,
            ..LockAssertion::default()
        }),
    );
    let err = pair.server.handle(envelope).await.unwrap_err();

    assert_eq!(err.code(), "MissingLockAssertionClaim");
    assert_eq!(
        pair.server.session(&id).unwrap().status,
        SessionStatus::Initiated
    );
}

#[tokio::test(start_paused = true)]
async fn expired_lock_assert_is_refused() {
    let (pair, id) = initiated_server().await;
    let session = pair.server.session(&id).unwrap();

    let envelope = client_envelope(
        &session,
        &pair.server.pubkey(),
        2,
        Payload::LockAssert(LockAssertion {
            lock_assertion_expiration: Some(Timestamp::now().plus_secs(-60)),
            ..match lock_payload() {
                Payload::LockAssert(lock) => lock,
                _ => unreachable!(),
            }
        }),
    );
    let err = pair.server.handle(envelope).await.unwrap_err();

    assert_eq!(err.code(), "LockAssertionExpired");
}

#[tokio::test(start_paused = true)]
async fn well_formed_lock_assert_advances_server() {
    let (pair, id) = initiated_server().await;
    let session = pair.server.session(&id).unwrap();

    let envelope = client_envelope(&session, &pair.server.pubkey(), 2, lock_payload());
    let answer = pair.server.handle(envelope).await.unwrap();

    assert_eq!(answer.message_type(), MessageType::AssertionReceipt);
    let after = pair.server.session(&id).unwrap();
    assert_eq!(after.status, SessionStatus::Locked);
    assert_eq!(after.sequence_number, 3);
}

#[tokio::test(start_paused = true)]
async fn envelope_from_a_stranger_is_refused() {
    let (pair, id) = initiated_server().await;
    let session = pair.server.session(&id).unwrap();

    let mut envelope = client_envelope(&session, &pair.server.pubkey(), 2, lock_payload());
    let stranger = Ed25519Scheme::new(Ed25519KeyPair::from_seed(&[9u8; 32]));
    if let Some(common) = envelope.common.as_mut() {
        common.sender_gateway_pubkey = stranger.public_key_hex();
        common.signature = String::new();
    }
    let envelope = seal(envelope, &stranger, &satp_core::ErrorTag::new("test")).unwrap();
    let err = pair.server.handle(envelope).await.unwrap_err();

    assert_eq!(err.code(), "SignatureVerificationFailed");
    assert_eq!(
        pair.server.session(&id).unwrap().status,
        SessionStatus::Initiated
    );
}

/// Corrupts the signature on every COMMIT_READY the server sends back.
struct ForgeCommitReady {
    inner: LocalChannel,
}

#[async_trait]
impl CounterpartyChannel for ForgeCommitReady {
    async fn send(&self, envelope: Envelope) -> Result<Envelope, ChannelError> {
        let mut answer = self.inner.send(envelope).await?;
        if answer.message_type() == MessageType::CommitReady {
            if let Some(common) = answer.common.as_mut() {
                common.signature = "00".repeat(64);
            }
        }
        Ok(answer)
    }
}

#[tokio::test(start_paused = true)]
async fn forged_answer_rolls_back_lock_and_burn() {
    let pair = pair();
    let channel = ForgeCommitReady {
        inner: LocalChannel::new(pair.server.clone()),
    };
    let id = SessionId::new();

    let outcome = pair.client.transfer(request(&id), &channel).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::RolledBack);
    assert_eq!(
        outcome.failure.as_ref().unwrap().code,
        "SignatureVerificationFailed"
    );
    assert_eq!(pair.balances(), (AMOUNT, 0));
    assert_eq!(pair.fabric_custody(), 0);
    assert_eq!(pair.fabric.calls(BridgeOp::Unlock), 1);
    assert_eq!(pair.fabric.calls(BridgeOp::Mint), 1);

    let client = pair.client.session(&id).unwrap();
    assert_eq!(client.compensations.len(), 2);
    assert!(client.rollback.unwrap().compensation_error.is_none());

    // The server never hears back and times out on its own.
    tokio::time::sleep(Duration::from_millis(defaults().max_timeout_ms + 100)).await;
    let server = pair.server.session(&id).unwrap();
    assert_eq!(server.status, SessionStatus::Failed);
    assert_eq!(server.failure.unwrap().code, "Timeout");
}

#[tokio::test(start_paused = true)]
async fn lock_claim_omitted_by_bridge_rolls_back() {
    let pair = pair();
    pair.fabric.inject(BridgeOp::Lock, Fault::OmitPayload);
    let channel = LocalChannel::new(pair.server.clone());
    let id = SessionId::new();

    let outcome = pair.client.transfer(request(&id), &channel).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::RolledBack);
    assert_eq!(
        outcome.failure.as_ref().unwrap().code,
        "MissingLockAssertionClaim"
    );
    assert_eq!(pair.balances(), (AMOUNT, 0));
    assert_eq!(pair.fabric.calls(BridgeOp::Unlock), 1);
    assert_eq!(
        pair.server.session(&id).unwrap().status,
        SessionStatus::Initiated
    );
}

#[tokio::test(start_paused = true)]
async fn expired_lock_claim_is_caught_before_sending() {
    let pair = pair_with(
        SessionDefaults {
            lock_duration_secs: -1,
            ..defaults()
        },
        true,
        true,
    );
    let channel = LocalChannel::new(pair.server.clone());
    let id = SessionId::new();

    let outcome = pair.client.transfer(request(&id), &channel).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::RolledBack);
    assert_eq!(outcome.failure.unwrap().code, "LockAssertionExpired");
    assert_eq!(channel.sent(), 1);
    assert_eq!(pair.balances(), (AMOUNT, 0));
}

#[tokio::test]
async fn recipient_without_bridge_rejects_proposal() {
    let pair = pair_with(defaults(), true, false);
    let channel = LocalChannel::new(pair.server.clone());
    let id = SessionId::new();

    let outcome = pair.client.transfer(request(&id), &channel).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Failed);
    assert_eq!(outcome.failure.unwrap().code, "TransferRejected");
    assert_eq!(channel.sent(), 1);
    assert_eq!(pair.fabric.calls(BridgeOp::Lock), 0);

    let server = pair.server.session(&id).unwrap();
    assert_eq!(server.status, SessionStatus::Failed);
    assert_eq!(server.failure.unwrap().code, "TransferRejected");
}

#[tokio::test]
async fn originator_without_bridge_fails_before_locking() {
    let pair = pair_with(defaults(), false, true);
    let channel = LocalChannel::new(pair.server.clone());
    let id = SessionId::new();

    let outcome = pair.client.transfer(request(&id), &channel).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Failed);
    assert_eq!(outcome.failure.unwrap().code, "MissingBridgeManager");
    assert_eq!(pair.balances(), (AMOUNT, 0));
}

#[tokio::test]
async fn unsupported_source_ledger_fails_at_initiation() {
    let pair = pair();
    let channel = LocalChannel::new(pair.server.clone());
    let id = SessionId::new();
    let mut req = request(&id);
    req.asset.source_ledger = LedgerKind::Corda;

    let outcome = pair.client.transfer(req, &channel).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Failed);
    assert_eq!(outcome.failure.unwrap().code, "DltNotSupported");
    assert_eq!(channel.sent(), 0);
    assert!(!pair.server.store().contains(&id));
}

#[tokio::test(start_paused = true)]
async fn rejected_assignment_is_not_minted_again_on_resend() {
    let pair = pair();
    pair.besu
        .inject(BridgeOp::Assign, Fault::Reject("beneficiary frozen".into()));
    let channel = LocalChannel::new(pair.server.clone());
    let id = SessionId::new();

    let outcome = pair.client.transfer(request(&id), &channel).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::RolledBack);
    assert_eq!(outcome.failure.unwrap().code, "SessionCancelled");
    assert_eq!(pair.besu.calls(BridgeOp::Mint), 1);
    assert_eq!(pair.besu.supply(BESU_ASSET), 0);
    assert_eq!(pair.balances(), (AMOUNT, 0));
    assert_eq!(pair.fabric.supply(FABRIC_ASSET), AMOUNT);
    // Proposal, lock, prepare, final, and the one resend that found the
    // session unwound.
    assert_eq!(channel.sent(), 5);

    let server = pair.server.session(&id).unwrap();
    assert_eq!(server.status, SessionStatus::RolledBack);
    assert_eq!(server.effects.len(), 1);
    assert_eq!(server.compensations.len(), 1);
    assert_eq!(server.failure.unwrap().code, "Bridge");
}
