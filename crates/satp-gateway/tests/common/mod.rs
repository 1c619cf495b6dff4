//! Two gateways wired back to back: `gw-fabric` originates, `gw-besu`
//! receives. Each fronts an in-memory ledger and logs to a memory sink.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use satp_bridge::{BridgeManager, BridgeRegistry, MemoryLedger};
use satp_core::{ErrorTag, GatewayId, LedgerKind, SessionId, Timestamp};
use satp_crypto::{Ed25519KeyPair, Ed25519Scheme, SignatureScheme};
use satp_gateway::{
    ChannelError, Counterparty, CounterpartyChannel, CounterpartyRegistry, Gateway,
    GatewayIdentity, MemorySink, SessionDefaults, TransferRequest,
};
use satp_protocol::{seal, CommonBody, Envelope, MessageType, Payload};
use satp_state::{AssetTransfer, SessionData, TransferProfiles};

pub const ASSET: &str = "bond-1";
pub const FABRIC_ASSET: &str = "fab-bond-1";
pub const BESU_ASSET: &str = "besu-bond-1";
pub const AMOUNT: u64 = 10;

pub struct Pair {
    pub client: Gateway,
    pub server: Gateway,
    pub fabric: Arc<MemoryLedger>,
    pub besu: Arc<MemoryLedger>,
    pub client_log: Arc<MemorySink>,
    pub server_log: Arc<MemorySink>,
}

pub fn client_scheme() -> Arc<Ed25519Scheme> {
    Arc::new(Ed25519Scheme::new(Ed25519KeyPair::from_seed(&[1u8; 32])))
}

pub fn server_scheme() -> Arc<Ed25519Scheme> {
    Arc::new(Ed25519Scheme::new(Ed25519KeyPair::from_seed(&[2u8; 32])))
}

pub fn defaults() -> SessionDefaults {
    SessionDefaults {
        max_retries: 2,
        max_timeout_ms: 5_000,
        retry_backoff_ms: 10,
        retry_backoff_max_ms: 50,
        ..SessionDefaults::default()
    }
}

fn registry(id: &str, pubkey: String, ledger: LedgerKind) -> CounterpartyRegistry {
    let mut registry = CounterpartyRegistry::new();
    registry.register(Counterparty {
        id: GatewayId::parse(id).unwrap(),
        name: id.to_string(),
        pubkey,
        supported_dlts: vec![ledger],
    });
    registry
}

fn bridges(ledger: Option<Arc<MemoryLedger>>) -> BridgeRegistry {
    let mut registry = BridgeRegistry::new();
    if let Some(ledger) = ledger {
        registry.register(ledger);
    }
    registry
}

/// `gw-fabric`, fronting `fabric` when given.
pub fn client_gateway(
    fabric: Option<Arc<MemoryLedger>>,
    defaults: SessionDefaults,
    log: Arc<MemorySink>,
) -> Gateway {
    Gateway::with_sink(
        GatewayIdentity::new(GatewayId::parse("gw-fabric").unwrap(), client_scheme())
            .with_supported_dlts(vec![LedgerKind::Fabric]),
        registry("gw-besu", server_scheme().public_key_hex(), LedgerKind::Besu),
        bridges(fabric),
        defaults,
        log,
    )
}

/// `gw-besu`, fronting `besu` when given.
pub fn server_gateway(
    besu: Option<Arc<MemoryLedger>>,
    defaults: SessionDefaults,
    log: Arc<MemorySink>,
) -> Gateway {
    Gateway::with_sink(
        GatewayIdentity::new(GatewayId::parse("gw-besu").unwrap(), server_scheme())
            .with_supported_dlts(vec![LedgerKind::Besu]),
        registry("gw-fabric", client_scheme().public_key_hex(), LedgerKind::Fabric),
        bridges(besu),
        defaults,
        log,
    )
}

/// Build the pair. `client_bridges`/`server_bridges` choose whether each
/// side gets its ledger registered.
pub fn pair_with(defaults: SessionDefaults, client_bridges: bool, server_bridges: bool) -> Pair {
    let fabric = Arc::new(MemoryLedger::new(LedgerKind::Fabric));
    fabric.deposit(FABRIC_ASSET, "alice", AMOUNT);
    let besu = Arc::new(MemoryLedger::new(LedgerKind::Besu));

    let client_log = Arc::new(MemorySink::new());
    let server_log = Arc::new(MemorySink::new());

    let client = client_gateway(
        client_bridges.then(|| fabric.clone()),
        defaults.clone(),
        client_log.clone(),
    );
    let server = server_gateway(
        server_bridges.then(|| besu.clone()),
        defaults,
        server_log.clone(),
    );
    Pair {
        client,
        server,
        fabric,
        besu,
        client_log,
        server_log,
    }
}

pub fn pair() -> Pair {
    pair_with(defaults(), true, true)
}

pub fn asset() -> AssetTransfer {
    AssetTransfer {
        digital_asset_id: ASSET.into(),
        source_ledger: LedgerKind::Fabric,
        recipient_ledger: LedgerKind::Besu,
        source_ledger_asset_id: FABRIC_ASSET.into(),
        recipient_ledger_asset_id: BESU_ASSET.into(),
        amount: AMOUNT,
        originator: "alice".into(),
        beneficiary: "bob".into(),
    }
}

pub fn request(session_id: &SessionId) -> TransferRequest {
    TransferRequest {
        session_id: Some(session_id.clone()),
        counterparty: GatewayId::parse("gw-besu").unwrap(),
        asset: asset(),
        profiles: TransferProfiles {
            asset_profile: "bond".into(),
            payload_profile: "default".into(),
            access_control_profile: "open".into(),
            logging_profile: "audit".into(),
        },
        max_retries: None,
        max_timeout_ms: None,
    }
}

impl Pair {
    /// Alice's Fabric units and Bob's Besu units.
    pub fn balances(&self) -> (u64, u64) {
        (
            self.fabric.balance(FABRIC_ASSET, "alice"),
            self.besu.balance(BESU_ASSET, "bob"),
        )
    }

    pub fn fabric_custody(&self) -> u64 {
        self.fabric.balance(FABRIC_ASSET, self.fabric.custody_account())
    }

    /// A fresh `gw-fabric` process on the same ledger, with an empty store.
    pub fn restarted_client(&self) -> (Gateway, Arc<MemorySink>) {
        let log = Arc::new(MemorySink::new());
        let gateway = client_gateway(Some(self.fabric.clone()), defaults(), log.clone());
        (gateway, log)
    }

    /// A fresh `gw-besu` process on the same ledger, with an empty store.
    pub fn restarted_server(&self) -> (Gateway, Arc<MemorySink>) {
        let log = Arc::new(MemorySink::new());
        let gateway = server_gateway(Some(self.besu.clone()), defaults(), log.clone());
        (gateway, log)
    }
}

/// The next request envelope for a server session, signed by the client,
/// with the sequence number overridable.
pub fn client_envelope(
    server_session: &SessionData,
    server_pubkey: &str,
    sequence_number: u64,
    payload: Payload,
) -> Envelope {
    let scheme = client_scheme();
    let common = CommonBody {
        version: server_session.version.clone(),
        message_type: Some(payload.message_type()),
        session_id: server_session.session_id.to_string(),
        sequence_number,
        transfer_context_id: server_session.transfer_context_id.to_string(),
        hash_previous_message: server_session.last_message_hash.clone().unwrap_or_default(),
        sender_gateway_pubkey: scheme.public_key_hex(),
        recipient_gateway_pubkey: server_pubkey.to_string(),
        timestamp: Some(Timestamp::now()),
        signature: String::new(),
    };
    seal(
        Envelope::new(common, payload),
        scheme.as_ref(),
        &ErrorTag::new("test"),
    )
    .unwrap()
}

/// Forwards the first `forward` requests and fails the rest with a
/// transport error.
pub struct Cutoff {
    pub inner: satp_gateway::LocalChannel,
    pub forward: u32,
}

#[async_trait]
impl CounterpartyChannel for Cutoff {
    async fn send(&self, envelope: Envelope) -> Result<Envelope, ChannelError> {
        if self.inner.sent() >= self.forward {
            return Err(ChannelError::Transport("link down".into()));
        }
        self.inner.send(envelope).await
    }
}

/// Forwards everything except requests of type `stall_on`, which never
/// get an answer.
pub struct Stall {
    pub inner: satp_gateway::LocalChannel,
    pub stall_on: MessageType,
}

#[async_trait]
impl CounterpartyChannel for Stall {
    async fn send(&self, envelope: Envelope) -> Result<Envelope, ChannelError> {
        if envelope.message_type() == self.stall_on {
            std::future::pending::<()>().await;
        }
        self.inner.send(envelope).await
    }
}

/// Poll until `check` holds, yielding to the runtime in between.
pub async fn wait_for(mut check: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition never held");
}
