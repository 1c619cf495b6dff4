//! A chain of envelopes survives JSON transport and validates hop by hop.

use satp_core::{ErrorTag, SessionId, Stage, TransferContextId, SATP_VERSION};
use satp_crypto::{Ed25519Scheme, SignatureScheme};
use satp_protocol::{
    check_envelope, check_genesis, outbound_common, seal, AssertionReceipt, Envelope,
    LockAssertion, MessageType, Payload, ProposalReceipt, TransferProposal,
};
use satp_state::{GatewayRole, SessionData};

fn tag() -> ErrorTag {
    ErrorTag::at(Stage::Initiation, "wire-chain")
}

fn over_the_wire(env: &Envelope) -> Envelope {
    Envelope::from_json(&env.to_json().unwrap()).unwrap()
}

#[test]
fn four_hop_chain_validates_after_json_round_trip() {
    let client_key = Ed25519Scheme::generate();
    let server_key = Ed25519Scheme::generate();
    let id = SessionId::new();
    let ctx = TransferContextId::new();

    let mut client = SessionData::new(id.clone(), ctx.clone(), GatewayRole::Client, SATP_VERSION);
    client
        .bind_gateway_pubkeys(
            &client_key.public_key_hex(),
            &server_key.public_key_hex(),
            &tag(),
        )
        .unwrap();

    // INIT_PROPOSAL
    let proposal = seal(
        Envelope::new(
            outbound_common(&client, MessageType::InitProposal, &tag()).unwrap(),
            Payload::InitProposal(TransferProposal {
                transfer_init_claims: None,
                profiles: None,
                network_capabilities: None,
                max_retries: 2,
                max_timeout_ms: 1_000,
            }),
        ),
        &client_key,
        &tag(),
    )
    .unwrap();
    let received = check_genesis(&over_the_wire(&proposal), SATP_VERSION, &server_key, &tag())
        .unwrap();
    client.record_message("INIT_PROPOSAL", 0, received.hash());

    let mut server = SessionData::new(id, ctx, GatewayRole::Server, SATP_VERSION);
    let common = received.common();
    server
        .bind_gateway_pubkeys(
            &common.sender_gateway_pubkey,
            &common.recipient_gateway_pubkey,
            &tag(),
        )
        .unwrap();
    server.record_message("INIT_PROPOSAL", 0, received.hash());

    // INIT_RECEIPT
    let receipt = seal(
        Envelope::new(
            outbound_common(&server, MessageType::InitReceipt, &tag()).unwrap(),
            Payload::InitReceipt(ProposalReceipt {
                hash_transfer_init_claims: "00".into(),
            }),
        ),
        &server_key,
        &tag(),
    )
    .unwrap();
    let v = check_envelope(
        &over_the_wire(&receipt),
        &client,
        MessageType::InitProposal.response_types(),
        &client_key,
        &tag(),
    )
    .unwrap();
    server.record_message("INIT_RECEIPT", 1, v.hash());
    client.record_message("INIT_RECEIPT", 1, v.hash());

    // LOCK_ASSERT
    let lock = seal(
        Envelope::new(
            outbound_common(&client, MessageType::LockAssert, &tag()).unwrap(),
            Payload::LockAssert(LockAssertion::default()),
        ),
        &client_key,
        &tag(),
    )
    .unwrap();
    let v = check_envelope(
        &over_the_wire(&lock),
        &server,
        &[MessageType::LockAssert],
        &server_key,
        &tag(),
    )
    .unwrap();
    server.record_message("LOCK_ASSERT", 2, v.hash());
    client.record_message("LOCK_ASSERT", 2, v.hash());

    // ASSERTION_RECEIPT
    let ack = seal(
        Envelope::new(
            outbound_common(&server, MessageType::AssertionReceipt, &tag()).unwrap(),
            Payload::AssertionReceipt(AssertionReceipt {}),
        ),
        &server_key,
        &tag(),
    )
    .unwrap();
    let v = check_envelope(
        &over_the_wire(&ack),
        &client,
        MessageType::LockAssert.response_types(),
        &client_key,
        &tag(),
    )
    .unwrap();
    client.record_message("ASSERTION_RECEIPT", 3, v.hash());
    server.record_message("ASSERTION_RECEIPT", 3, v.hash());

    assert_eq!(client.chain_hashes(), server.chain_hashes());
    assert_eq!(client.sequence_number, 3);

    // Replaying the lock assertion against the advanced session fails.
    let err = check_envelope(
        &lock,
        &server,
        &[MessageType::LockAssert],
        &server_key,
        &tag(),
    )
    .unwrap_err();
    assert_eq!(err.code(), "SequenceNumberMissMatch");
}
