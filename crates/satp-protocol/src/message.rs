//! # Messages
//!
//! Wire names follow the SATP field names (`sessionID`,
//! `hashPreviousMessage`, `senderGatewayPubkey`, ...). Every header field is
//! defaultable so that an envelope missing one still deserializes and can be
//! rejected with `MissingSatpCommonBody` instead of a parse error.

use satp_core::{
    sha256_hex, AssignmentAssertionClaim, BurnAssertionClaim, CanonicalBytes, ClaimFormat,
    ErrorTag, GatewayId, LedgerKind, LockAssertionClaim, MintAssertionClaim, SatpError, Stage,
    Timestamp,
};
use satp_state::{AssetTransfer, TransferProfiles};
use serde::{Deserialize, Serialize};

/// Every envelope kind exchanged between two gateways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    InitProposal,
    InitReceipt,
    InitReject,
    LockAssert,
    AssertionReceipt,
    CommitPrepare,
    CommitReady,
    CommitFinal,
    AckCommitFinal,
    #[serde(rename = "COMMIT_TRANSFER_COMPLETE")]
    TransferComplete,
    #[serde(rename = "COMMIT_TRANSFER_COMPLETE_RESPONSE")]
    TransferCompleteResponse,
}

impl MessageType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InitProposal => "INIT_PROPOSAL",
            Self::InitReceipt => "INIT_RECEIPT",
            Self::InitReject => "INIT_REJECT",
            Self::LockAssert => "LOCK_ASSERT",
            Self::AssertionReceipt => "ASSERTION_RECEIPT",
            Self::CommitPrepare => "COMMIT_PREPARE",
            Self::CommitReady => "COMMIT_READY",
            Self::CommitFinal => "COMMIT_FINAL",
            Self::AckCommitFinal => "ACK_COMMIT_FINAL",
            Self::TransferComplete => "COMMIT_TRANSFER_COMPLETE",
            Self::TransferCompleteResponse => "COMMIT_TRANSFER_COMPLETE_RESPONSE",
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Self::InitProposal | Self::InitReceipt | Self::InitReject => Stage::Initiation,
            Self::LockAssert | Self::AssertionReceipt => Stage::LockAssertion,
            Self::CommitPrepare | Self::CommitReady | Self::CommitFinal | Self::AckCommitFinal => {
                Stage::Commitment
            }
            Self::TransferComplete | Self::TransferCompleteResponse => Stage::Completion,
        }
    }

    /// Requests flow client to server.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Self::InitProposal
                | Self::LockAssert
                | Self::CommitPrepare
                | Self::CommitFinal
                | Self::TransferComplete
        )
    }

    /// Acceptable answers to a request; empty for responses.
    pub fn response_types(&self) -> &'static [MessageType] {
        match self {
            Self::InitProposal => &[Self::InitReceipt, Self::InitReject],
            Self::LockAssert => &[Self::AssertionReceipt],
            Self::CommitPrepare => &[Self::CommitReady],
            Self::CommitFinal => &[Self::AckCommitFinal],
            Self::TransferComplete => &[Self::TransferCompleteResponse],
            _ => &[],
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Header shared by every envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommonBody {
    pub version: String,
    pub message_type: Option<MessageType>,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub sequence_number: u64,
    pub transfer_context_id: String,
    /// Empty only on `INIT_PROPOSAL`.
    pub hash_previous_message: String,
    pub sender_gateway_pubkey: String,
    pub recipient_gateway_pubkey: String,
    pub timestamp: Option<Timestamp>,
    /// Hex signature over the canonical envelope with this field empty.
    pub signature: String,
}

/// A signed protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub common: Option<CommonBody>,
    pub payload: Payload,
}

impl Envelope {
    pub fn new(common: CommonBody, payload: Payload) -> Self {
        Self {
            common: Some(common),
            payload,
        }
    }

    /// Type named in the header, falling back to the payload kind.
    pub fn message_type(&self) -> MessageType {
        self.common
            .as_ref()
            .and_then(|c| c.message_type)
            .unwrap_or_else(|| self.payload.message_type())
    }

    pub fn sequence_number(&self) -> Option<u64> {
        self.common.as_ref().map(|c| c.sequence_number)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.common.as_ref().map(|c| c.session_id.as_str())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Stage-specific body, tagged with its message type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Payload {
    InitProposal(TransferProposal),
    InitReceipt(ProposalReceipt),
    InitReject(ProposalRejection),
    LockAssert(LockAssertion),
    AssertionReceipt(AssertionReceipt),
    CommitPrepare(CommitPreparation),
    CommitReady(CommitReadiness),
    CommitFinal(CommitFinalization),
    AckCommitFinal(CommitAcknowledgement),
    #[serde(rename = "COMMIT_TRANSFER_COMPLETE")]
    TransferComplete(TransferCompletion),
    #[serde(rename = "COMMIT_TRANSFER_COMPLETE_RESPONSE")]
    TransferCompleteResponse(CompletionReceipt),
}

impl Payload {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::InitProposal(_) => MessageType::InitProposal,
            Self::InitReceipt(_) => MessageType::InitReceipt,
            Self::InitReject(_) => MessageType::InitReject,
            Self::LockAssert(_) => MessageType::LockAssert,
            Self::AssertionReceipt(_) => MessageType::AssertionReceipt,
            Self::CommitPrepare(_) => MessageType::CommitPrepare,
            Self::CommitReady(_) => MessageType::CommitReady,
            Self::CommitFinal(_) => MessageType::CommitFinal,
            Self::AckCommitFinal(_) => MessageType::AckCommitFinal,
            Self::TransferComplete(_) => MessageType::TransferComplete,
            Self::TransferCompleteResponse(_) => MessageType::TransferCompleteResponse,
        }
    }
}

// ── Stage 0 ─────────────────────────────────────────────────────────

/// What the client asserts about the transfer it proposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferInitClaims {
    pub asset: AssetTransfer,
    pub sender_gateway: GatewayId,
    pub recipient_gateway: GatewayId,
}

impl TransferInitClaims {
    /// SHA-256 hex of the canonical claims. Echoed in `INIT_RECEIPT` and
    /// again in `COMMIT_TRANSFER_COMPLETE`.
    pub fn hash(&self, tag: &ErrorTag) -> Result<String, SatpError> {
        let bytes = CanonicalBytes::new(self).map_err(|e| SatpError::Serialization {
            tag: tag.clone(),
            reason: e.to_string(),
        })?;
        Ok(sha256_hex(&bytes))
    }
}

/// Ledger systems the sending gateway can operate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkCapabilities {
    pub sender_ledger: LedgerKind,
    #[serde(rename = "supportedDltIDs")]
    pub supported_dlt_ids: Vec<LedgerKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProposal {
    pub transfer_init_claims: Option<TransferInitClaims>,
    pub profiles: Option<TransferProfiles>,
    pub network_capabilities: Option<NetworkCapabilities>,
    pub max_retries: u32,
    pub max_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalReceipt {
    pub hash_transfer_init_claims: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalRejection {
    pub reason: String,
}

// ── Stage 1 ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LockAssertion {
    pub lock_assertion_claim: Option<String>,
    pub lock_assertion_claim_format: Option<ClaimFormat>,
    pub lock_assertion_expiration: Option<Timestamp>,
}

impl LockAssertion {
    pub fn from_claim(claim: &LockAssertionClaim) -> Self {
        Self {
            lock_assertion_claim: claim.payload.clone(),
            lock_assertion_claim_format: claim.format,
            lock_assertion_expiration: claim.expiration,
        }
    }

    pub fn claim(&self) -> LockAssertionClaim {
        LockAssertionClaim {
            payload: self.lock_assertion_claim.clone(),
            format: self.lock_assertion_claim_format,
            expiration: self.lock_assertion_expiration,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionReceipt {}

// ── Stage 2 ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommitPreparation {
    pub burn_assertion_claim: Option<BurnAssertionClaim>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReadiness {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitFinalization {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommitAcknowledgement {
    pub mint_assertion_claim: Option<MintAssertionClaim>,
    pub assignment_assertion_claim: Option<AssignmentAssertionClaim>,
}

// ── Stage 3 ─────────────────────────────────────────────────────────

/// Final acknowledgement. Names every message hash of the session so far,
/// in order, so both sides can confirm they saw the same conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferCompletion {
    pub hash_transfer_init_claims: String,
    pub message_hashes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionReceipt {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_and_pairs() {
        assert_eq!(MessageType::InitReject.stage(), Stage::Initiation);
        assert_eq!(MessageType::AckCommitFinal.stage(), Stage::Commitment);
        assert_eq!(
            MessageType::InitProposal.response_types(),
            &[MessageType::InitReceipt, MessageType::InitReject]
        );
        assert!(MessageType::CommitFinal.is_request());
        assert!(!MessageType::CommitReady.is_request());
        assert!(MessageType::CommitReady.response_types().is_empty());
    }

    #[test]
    fn wire_names_match_name() {
        for mt in [
            MessageType::InitProposal,
            MessageType::LockAssert,
            MessageType::TransferComplete,
            MessageType::TransferCompleteResponse,
        ] {
            let json = serde_json::to_string(&mt).unwrap();
            assert_eq!(json, format!("\"{}\"", mt.name()));
        }
    }

    #[test]
    fn payload_kind_matches_message_type() {
        let payload = Payload::TransferCompleteResponse(CompletionReceipt {});
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "COMMIT_TRANSFER_COMPLETE_RESPONSE");
        assert_eq!(payload.message_type(), MessageType::TransferCompleteResponse);
    }

    #[test]
    fn header_uses_satp_field_names() {
        let common = CommonBody {
            session_id: "S1".into(),
            message_type: Some(MessageType::LockAssert),
            ..CommonBody::default()
        };
        let json = serde_json::to_value(&common).unwrap();
        assert_eq!(json["sessionID"], "S1");
        assert_eq!(json["messageType"], "LOCK_ASSERT");
        assert!(json.get("hashPreviousMessage").is_some());
        assert!(json.get("senderGatewayPubkey").is_some());
    }

    #[test]
    fn missing_header_fields_still_parse() {
        let json = r#"{"common":{"sessionID":"S1"},"payload":{"kind":"ASSERTION_RECEIPT","body":{}}}"#;
        let env = Envelope::from_json(json).unwrap();
        let common = env.common.as_ref().unwrap();
        assert!(common.version.is_empty());
        assert!(common.message_type.is_none());
        assert_eq!(env.message_type(), MessageType::AssertionReceipt);
    }

    #[test]
    fn lock_body_without_claim_parses_to_empty_claim() {
        let body: LockAssertion =
            serde_json::from_str(r#"{"lockAssertionClaimFormat":"DEFAULT"}"#).unwrap();
        let claim = body.claim();
        assert!(claim.payload.is_none());
        assert_eq!(claim.format, Some(ClaimFormat::Default));
    }

    #[test]
    fn init_claims_hash_tracks_content() {
        let tag = ErrorTag::new("message-test");
        let mut claims = TransferInitClaims {
            asset: AssetTransfer {
                digital_asset_id: "bond-1".into(),
                source_ledger: LedgerKind::Fabric,
                recipient_ledger: LedgerKind::Besu,
                source_ledger_asset_id: "fab-bond-1".into(),
                recipient_ledger_asset_id: "besu-bond-1".into(),
                amount: 10,
                originator: "alice".into(),
                beneficiary: "bob".into(),
            },
            sender_gateway: GatewayId::parse("gw-a").unwrap(),
            recipient_gateway: GatewayId::parse("gw-b").unwrap(),
        };
        let first = claims.hash(&tag).unwrap();
        assert_eq!(first.len(), 64);
        assert_eq!(first, claims.clone().hash(&tag).unwrap());
        claims.asset.amount = 11;
        assert_ne!(first, claims.hash(&tag).unwrap());
    }
}
