//! Fixtures for stage unit tests: a context for each side of a Fabric to
//! Besu transfer, sessions parked at a given status, and envelopes signed by
//! the counterpart.

use std::sync::Arc;

use satp_bridge::{BridgeRegistry, MemoryLedger};
use satp_core::{ErrorTag, GatewayId, LedgerKind, SessionId, Timestamp, TransferContextId};
use satp_crypto::{Ed25519KeyPair, Ed25519Scheme, SignatureScheme};
use satp_protocol::{check_envelope, seal, CommonBody, Envelope, Payload, ValidatedEnvelope};
use satp_state::{AssetTransfer, GatewayRole, SessionData, SessionStatus, SessionStore, TransferProfiles};

use super::StageContext;
use crate::config::SessionDefaults;
use crate::identity::GatewayIdentity;
use crate::registry::{Counterparty, CounterpartyRegistry};
use crate::sink::MemorySink;

/// The gateway on the other side of every fixture session.
pub(crate) fn peer() -> Ed25519Scheme {
    Ed25519Scheme::new(Ed25519KeyPair::from_seed(&[7u8; 32]))
}

fn build(
    id: &str,
    own: LedgerKind,
    peer_id: &str,
    peer_ledger: LedgerKind,
    ledger: Option<Arc<MemoryLedger>>,
) -> StageContext {
    let identity = GatewayIdentity::new(
        GatewayId::parse(id).unwrap(),
        Arc::new(Ed25519Scheme::new(Ed25519KeyPair::from_seed(&[1u8; 32]))),
    )
    .with_supported_dlts(vec![own]);
    let mut counterparties = CounterpartyRegistry::new();
    counterparties.register(Counterparty {
        id: GatewayId::parse(peer_id).unwrap(),
        name: peer_id.to_string(),
        pubkey: peer().public_key_hex(),
        supported_dlts: vec![peer_ledger],
    });
    let mut bridges = BridgeRegistry::new();
    if let Some(ledger) = ledger {
        bridges.register(ledger);
    }
    StageContext {
        identity: Arc::new(identity),
        counterparties: Arc::new(counterparties),
        bridges: Arc::new(bridges),
        store: SessionStore::new(),
        sink: Arc::new(MemorySink::new()),
        defaults: SessionDefaults::default(),
    }
}

/// Source gateway `gw-a` on Fabric.
pub(crate) fn context(ledger: Option<Arc<MemoryLedger>>) -> StageContext {
    build("gw-a", LedgerKind::Fabric, "gw-b", LedgerKind::Besu, ledger)
}

/// Recipient gateway `gw-b` on Besu.
pub(crate) fn server_context(ledger: Option<Arc<MemoryLedger>>) -> StageContext {
    build("gw-b", LedgerKind::Besu, "gw-a", LedgerKind::Fabric, ledger)
}

pub(crate) fn asset() -> AssetTransfer {
    AssetTransfer {
        digital_asset_id: "bond-1".into(),
        source_ledger: LedgerKind::Fabric,
        recipient_ledger: LedgerKind::Besu,
        source_ledger_asset_id: "fab-bond-1".into(),
        recipient_ledger_asset_id: "besu-bond-1".into(),
        amount: 10,
        originator: "alice".into(),
        beneficiary: "bob".into(),
    }
}

pub(crate) fn profiles() -> TransferProfiles {
    TransferProfiles {
        asset_profile: "bond".into(),
        payload_profile: "default".into(),
        access_control_profile: "open".into(),
        logging_profile: "audit".into(),
    }
}

fn session(ctx: &StageContext, role: GatewayRole, status: SessionStatus) -> SessionData {
    let tag = ErrorTag::new("fixture");
    let mut session = SessionData::new(
        SessionId::new(),
        TransferContextId::new(),
        role,
        ctx.identity.version(),
    );
    let (source, recipient) = match role {
        GatewayRole::Client => (ctx.identity.pubkey(), peer().public_key_hex()),
        GatewayRole::Server => (peer().public_key_hex(), ctx.identity.pubkey()),
    };
    session.bind_gateway_pubkeys(&source, &recipient, &tag).unwrap();
    session.counterparty = Some(GatewayId::parse("peer").unwrap());
    session.asset = Some(asset());
    session.negotiate_profiles(profiles(), &tag).unwrap();
    session.init_claims_hash = Some("ab".repeat(32));
    session.max_retries = 2;
    session.max_timeout_ms = 5_000;

    let mut sequence = 0;
    while session.status != status {
        let next = session.status.successor().unwrap();
        session.try_transition(next, None, &tag).unwrap();
        for _ in 0..2 {
            session.record_message("FIXTURE", sequence, &format!("{sequence:064x}"));
            sequence += 1;
        }
    }
    ctx.store.create(session).unwrap()
}

pub(crate) fn client_session(ctx: &StageContext, status: SessionStatus) -> SessionData {
    session(ctx, GatewayRole::Client, status)
}

pub(crate) fn server_session(ctx: &StageContext, status: SessionStatus) -> SessionData {
    session(ctx, GatewayRole::Server, status)
}

/// The next envelope of `session`, sent by the peer and already validated.
pub(crate) fn with_payload(
    ctx: &StageContext,
    session: &SessionData,
    payload: Payload,
) -> ValidatedEnvelope {
    let tag = ErrorTag::new("fixture");
    let message_type = payload.message_type();
    let common = CommonBody {
        version: session.version.clone(),
        message_type: Some(message_type),
        session_id: session.session_id.to_string(),
        sequence_number: session.sequence_number + 1,
        transfer_context_id: session.transfer_context_id.to_string(),
        hash_previous_message: session.last_message_hash.clone().unwrap_or_default(),
        sender_gateway_pubkey: peer().public_key_hex(),
        recipient_gateway_pubkey: ctx.identity.pubkey(),
        timestamp: Some(Timestamp::now()),
        signature: String::new(),
    };
    let sealed = seal(Envelope::new(common, payload), &peer(), &tag).unwrap();
    check_envelope(&sealed, session, &[message_type], ctx.signer(), &tag).unwrap()
}
