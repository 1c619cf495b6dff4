//! # Session Data
//!
//! One `SessionData` per transfer per gateway. The client (source gateway)
//! creates it from a transfer request; the server (recipient gateway)
//! creates it from the proposal it accepts. From then on it changes only
//! through [`SessionStore::update`](crate::SessionStore::update).
//!
//! Gateway public keys are bound once. Transfer profiles are fixed once the
//! session leaves `NEW`. Both are private fields with checked setters.

use satp_core::{
    AssignmentAssertionClaim, BurnAssertionClaim, ErrorTag, GatewayId, LedgerKind,
    LockAssertionClaim, MintAssertionClaim, SatpError, SessionId, Stage, Timestamp,
    TransferContextId,
};
use serde::{Deserialize, Serialize};

use crate::effect::LedgerEffect;
use crate::status::{SessionStatus, TransitionRecord};

/// Which side of the transfer this gateway plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayRole {
    /// Source gateway. Initiates, locks and burns.
    Client,
    /// Recipient gateway. Accepts, mints and assigns.
    Server,
}

/// What is being moved, from where to where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetTransfer {
    pub digital_asset_id: String,
    pub source_ledger: LedgerKind,
    pub recipient_ledger: LedgerKind,
    pub source_ledger_asset_id: String,
    pub recipient_ledger_asset_id: String,
    pub amount: u64,
    pub originator: String,
    pub beneficiary: String,
}

impl AssetTransfer {
    /// Names of required fields that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.digital_asset_id.is_empty() {
            missing.push("digitalAssetId");
        }
        if self.source_ledger_asset_id.is_empty() {
            missing.push("sourceLedgerAssetId");
        }
        if self.recipient_ledger_asset_id.is_empty() {
            missing.push("recipientLedgerAssetId");
        }
        if self.amount == 0 {
            missing.push("amount");
        }
        if self.originator.is_empty() {
            missing.push("originator");
        }
        if self.beneficiary.is_empty() {
            missing.push("beneficiary");
        }
        missing
    }
}

/// Capability and metadata bundles negotiated at initiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProfiles {
    pub asset_profile: String,
    pub payload_profile: String,
    pub access_control_profile: String,
    pub logging_profile: String,
}

impl TransferProfiles {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("assetProfile", &self.asset_profile),
            ("payloadProfile", &self.payload_profile),
            ("accessControlProfile", &self.access_control_profile),
            ("loggingProfile", &self.logging_profile),
        ]
        .into_iter()
        .filter(|(_, v)| v.is_empty())
        .map(|(k, _)| k)
        .collect()
    }
}

/// Claims produced or received so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    pub lock: Option<LockAssertionClaim>,
    pub burn: Option<BurnAssertionClaim>,
    pub mint: Option<MintAssertionClaim>,
    pub assignment: Option<AssignmentAssertionClaim>,
}

impl SessionClaims {
    /// Take every claim `other` carries, keeping ours where it has none.
    pub fn merge(&mut self, other: SessionClaims) {
        if other.lock.is_some() {
            self.lock = other.lock;
        }
        if other.burn.is_some() {
            self.burn = other.burn;
        }
        if other.mint.is_some() {
            self.mint = other.mint;
        }
        if other.assignment.is_some() {
            self.assignment = other.assignment;
        }
    }
}

/// One envelope in the hash chain, sent or accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainLink {
    pub message_type: String,
    pub sequence_number: u64,
    pub hash: String,
}

/// Set when compensation has been claimed by a rollback. A session with
/// this set is cancelled even before it reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackState {
    pub started_at: Timestamp,
    pub reason: String,
    /// Set when a compensating effect could not be applied.
    #[serde(default)]
    pub compensation_error: Option<String>,
}

impl RollbackState {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            started_at: Timestamp::now(),
            reason: reason.into(),
            compensation_error: None,
        }
    }
}

/// Why and where a session ended badly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub stage: Option<Stage>,
    pub code: String,
    pub tag: String,
    pub message: String,
    pub at: Timestamp,
}

impl FailureRecord {
    pub fn from_error(error: &SatpError) -> Self {
        Self {
            stage: error.tag().stage,
            code: error.code().to_string(),
            tag: error.tag().to_string(),
            message: error.to_string(),
            at: Timestamp::now(),
        }
    }
}

/// Per-gateway state of one transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub session_id: SessionId,
    pub transfer_context_id: TransferContextId,
    pub role: GatewayRole,
    pub counterparty: Option<GatewayId>,
    pub status: SessionStatus,
    pub version: String,
    /// Sequence number of the last envelope sent or accepted.
    pub sequence_number: u64,
    pub last_message_hash: Option<String>,
    source_gateway_pubkey: Option<String>,
    recipient_gateway_pubkey: Option<String>,
    pub asset: Option<AssetTransfer>,
    profiles: Option<TransferProfiles>,
    /// Hash of the transfer-init claims both gateways agreed on at Stage 0.
    pub init_claims_hash: Option<String>,
    pub max_retries: u32,
    pub max_timeout_ms: u64,
    pub claims: SessionClaims,
    pub chain: Vec<ChainLink>,
    pub effects: Vec<LedgerEffect>,
    pub compensations: Vec<LedgerEffect>,
    /// Hash of the last inbound request answered, for replay detection.
    pub last_inbound_hash: Option<String>,
    /// Wire form of the last envelope sent.
    pub last_outbound: Option<String>,
    pub rollback: Option<RollbackState>,
    pub failure: Option<FailureRecord>,
    pub transitions: Vec<TransitionRecord>,
    /// Bumped by the store on every committed update.
    pub revision: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl SessionData {
    pub fn new(
        session_id: SessionId,
        transfer_context_id: TransferContextId,
        role: GatewayRole,
        version: impl Into<String>,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            session_id,
            transfer_context_id,
            role,
            counterparty: None,
            status: SessionStatus::New,
            version: version.into(),
            sequence_number: 0,
            last_message_hash: None,
            source_gateway_pubkey: None,
            recipient_gateway_pubkey: None,
            asset: None,
            profiles: None,
            init_claims_hash: None,
            max_retries: 0,
            max_timeout_ms: 0,
            claims: SessionClaims::default(),
            chain: Vec::new(),
            effects: Vec::new(),
            compensations: Vec::new(),
            last_inbound_hash: None,
            last_outbound: None,
            rollback: None,
            failure: None,
            transitions: Vec::new(),
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    // ── Identity anchors ────────────────────────────────────────────

    pub fn source_gateway_pubkey(&self) -> Option<&str> {
        self.source_gateway_pubkey.as_deref()
    }

    pub fn recipient_gateway_pubkey(&self) -> Option<&str> {
        self.recipient_gateway_pubkey.as_deref()
    }

    /// Bind both gateway keys. Rebinding the same value is a no-op; a
    /// different value is refused.
    pub fn bind_gateway_pubkeys(
        &mut self,
        source: &str,
        recipient: &str,
        tag: &ErrorTag,
    ) -> Result<(), SatpError> {
        if source.is_empty() || self.source_gateway_pubkey().is_some_and(|k| k != source) {
            return Err(SatpError::MissingClientGatewayPubkey { tag: tag.clone() });
        }
        if recipient.is_empty()
            || self
                .recipient_gateway_pubkey()
                .is_some_and(|k| k != recipient)
        {
            return Err(SatpError::MissingServerGatewayPubkey { tag: tag.clone() });
        }
        self.source_gateway_pubkey = Some(source.to_string());
        self.recipient_gateway_pubkey = Some(recipient.to_string());
        Ok(())
    }

    /// Key of the gateway on the other end of this session.
    pub fn counterpart_pubkey(&self, tag: &ErrorTag) -> Result<&str, SatpError> {
        match self.role {
            GatewayRole::Client => self
                .recipient_gateway_pubkey()
                .ok_or_else(|| SatpError::MissingServerGatewayPubkey { tag: tag.clone() }),
            GatewayRole::Server => self
                .source_gateway_pubkey()
                .ok_or_else(|| SatpError::MissingClientGatewayPubkey { tag: tag.clone() }),
        }
    }

    pub fn own_pubkey(&self, tag: &ErrorTag) -> Result<&str, SatpError> {
        match self.role {
            GatewayRole::Client => self
                .source_gateway_pubkey()
                .ok_or_else(|| SatpError::MissingClientGatewayPubkey { tag: tag.clone() }),
            GatewayRole::Server => self
                .recipient_gateway_pubkey()
                .ok_or_else(|| SatpError::MissingServerGatewayPubkey { tag: tag.clone() }),
        }
    }

    // ── Profiles ────────────────────────────────────────────────────

    pub fn profiles(&self) -> Option<&TransferProfiles> {
        self.profiles.as_ref()
    }

    /// Set the negotiated profiles. Only allowed while the session is `NEW`.
    pub fn negotiate_profiles(
        &mut self,
        profiles: TransferProfiles,
        tag: &ErrorTag,
    ) -> Result<(), SatpError> {
        if self.status != SessionStatus::New {
            return Err(SatpError::SessionDataNotLoadedCorrectly {
                tag: tag.clone(),
                detail: format!("profiles are fixed once the session is {}", self.status),
            });
        }
        self.profiles = Some(profiles);
        Ok(())
    }

    // ── Checks ──────────────────────────────────────────────────────

    /// Every field a transfer needs before Stage 0 can proceed.
    pub fn ensure_loaded(&self, tag: &ErrorTag) -> Result<(), SatpError> {
        if self.source_gateway_pubkey.is_none() {
            return Err(SatpError::MissingClientGatewayPubkey { tag: tag.clone() });
        }
        if self.recipient_gateway_pubkey.is_none() {
            return Err(SatpError::MissingServerGatewayPubkey { tag: tag.clone() });
        }
        let mut missing: Vec<&'static str> = Vec::new();
        match &self.asset {
            Some(asset) => missing.extend(asset.missing_fields()),
            None => missing.push("asset"),
        }
        match &self.profiles {
            Some(p) => missing.extend(p.missing_fields()),
            None => missing.push("profiles"),
        }
        if self.version.is_empty() {
            missing.push("version");
        }
        if self.max_timeout_ms == 0 {
            missing.push("maxTimeout");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SatpError::SessionDataNotLoadedCorrectly {
                tag: tag.clone(),
                detail: format!("missing {}", missing.join(", ")),
            })
        }
    }

    pub fn asset(&self, tag: &ErrorTag) -> Result<&AssetTransfer, SatpError> {
        self.asset
            .as_ref()
            .ok_or_else(|| SatpError::SessionDataNotLoadedCorrectly {
                tag: tag.clone(),
                detail: "asset transfer terms not set".into(),
            })
    }

    /// Cancelled sessions must not cause further ledger effects.
    pub fn is_cancelled(&self) -> bool {
        self.status.is_terminal() || self.rollback.is_some()
    }

    /// Fail with `SessionCancelled` if a rollback or terminal status has
    /// overtaken this session.
    pub fn ensure_live(&self, tag: &ErrorTag) -> Result<(), SatpError> {
        if self.is_cancelled() {
            return Err(SatpError::SessionCancelled {
                tag: tag.clone(),
                session_id: self.session_id.to_string(),
                status: self.status.name().to_string(),
            });
        }
        Ok(())
    }

    /// Fail unless the session is live and in `expected`.
    pub fn ensure_status(&self, expected: SessionStatus, tag: &ErrorTag) -> Result<(), SatpError> {
        self.ensure_live(tag)?;
        if self.status != expected {
            return Err(SatpError::InvalidTransition {
                tag: tag.clone(),
                from: self.status.name().to_string(),
                to: expected.name().to_string(),
            });
        }
        Ok(())
    }

    // ── Mutation ────────────────────────────────────────────────────

    pub fn try_transition(
        &mut self,
        to: SessionStatus,
        reason: Option<String>,
        tag: &ErrorTag,
    ) -> Result<(), SatpError> {
        let record = self.status.transition(to, reason, tag)?;
        self.transitions.push(record);
        self.status = to;
        Ok(())
    }

    /// Advance the hash chain with an envelope this gateway sent or accepted.
    pub fn record_message(&mut self, message_type: &str, sequence_number: u64, hash: &str) {
        self.sequence_number = sequence_number;
        self.last_message_hash = Some(hash.to_string());
        self.chain.push(ChainLink {
            message_type: message_type.to_string(),
            sequence_number,
            hash: hash.to_string(),
        });
    }

    pub fn chain_hashes(&self) -> Vec<String> {
        self.chain.iter().map(|l| l.hash.clone()).collect()
    }

    pub fn record_effect(&mut self, effect: LedgerEffect) {
        self.effects.push(effect);
    }

    pub fn record_failure(&mut self, error: &SatpError) {
        self.failure = Some(FailureRecord::from_error(error));
    }
}
