//! # Envelope Validation
//!
//! Each check is a free function so stage services can run them alone; the
//! two composed entry points run them in protocol order and stop at the
//! first failure:
//!
//! 1. common body (and the expected message types)
//! 2. version
//! 3. sequence number
//! 4. hash chain
//! 5. transfer context
//! 6. signature
//!
//! Nothing here mutates a session. A [`ValidatedEnvelope`] can only be
//! obtained from [`check_envelope`] or [`check_genesis`], so a stage that
//! holds one knows the envelope passed every gate.

use satp_core::{ErrorTag, SatpError, SessionId, TransferContextId};
use satp_crypto::SignatureScheme;
use satp_state::SessionData;

use crate::message::{CommonBody, Envelope, MessageType};
use crate::seal::{message_hash, signing_bytes};

/// An envelope that passed the full pipeline, with its message hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedEnvelope {
    envelope: Envelope,
    common: CommonBody,
    message_type: MessageType,
    sequence_number: u64,
    hash: String,
}

impl ValidatedEnvelope {
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn common(&self) -> &CommonBody {
        &self.common
    }

    pub fn into_envelope(self) -> Envelope {
        self.envelope
    }
}

/// Mandatory header fields, and agreement between the header's message type,
/// the payload kind and the types the caller is prepared to accept.
pub fn verify_common_body<'a>(
    envelope: &'a Envelope,
    expected: &[MessageType],
    tag: &ErrorTag,
) -> Result<&'a CommonBody, SatpError> {
    let common = envelope
        .common
        .as_ref()
        .ok_or_else(|| SatpError::MissingSatpCommonBody {
            tag: tag.clone(),
            detail: "common body absent".into(),
        })?;

    let mut missing: Vec<&'static str> = Vec::new();
    if common.version.is_empty() {
        missing.push("version");
    }
    if common.message_type.is_none() {
        missing.push("messageType");
    }
    if common.session_id.is_empty() {
        missing.push("sessionID");
    }
    if common.transfer_context_id.is_empty() {
        missing.push("transferContextId");
    }
    if common.sender_gateway_pubkey.is_empty() {
        missing.push("senderGatewayPubkey");
    }
    if common.recipient_gateway_pubkey.is_empty() {
        missing.push("recipientGatewayPubkey");
    }
    if common.timestamp.is_none() {
        missing.push("timestamp");
    }
    if common.hash_previous_message.is_empty()
        && common.message_type != Some(MessageType::InitProposal)
    {
        missing.push("hashPreviousMessage");
    }
    if !missing.is_empty() {
        return Err(SatpError::MissingSatpCommonBody {
            tag: tag.clone(),
            detail: format!("missing {}", missing.join(", ")),
        });
    }

    for (field, value) in [
        ("sessionID", SessionId::parse(&common.session_id).err()),
        (
            "transferContextId",
            TransferContextId::parse(&common.transfer_context_id).err(),
        ),
    ] {
        if let Some(e) = value {
            return Err(SatpError::MissingSatpCommonBody {
                tag: tag.clone(),
                detail: format!("malformed {field}: {e}"),
            });
        }
    }

    let declared = envelope.message_type();
    let carried = envelope.payload.message_type();
    if declared != carried {
        return Err(SatpError::MessageTypeMissMatch {
            tag: tag.clone(),
            received: declared.name().to_string(),
            expected: carried.name().to_string(),
        });
    }
    if !expected.is_empty() && !expected.contains(&declared) {
        let names: Vec<&str> = expected.iter().map(|t| t.name()).collect();
        return Err(SatpError::MessageTypeMissMatch {
            tag: tag.clone(),
            received: declared.name().to_string(),
            expected: names.join("|"),
        });
    }
    Ok(common)
}

pub fn verify_version(common: &CommonBody, supported: &str, tag: &ErrorTag) -> Result<(), SatpError> {
    if common.version != supported {
        return Err(SatpError::SatpVersionUnsupported {
            tag: tag.clone(),
            unsupported: common.version.clone(),
            supported: supported.to_string(),
        });
    }
    Ok(())
}

pub fn verify_sequence(common: &CommonBody, expected: u64, tag: &ErrorTag) -> Result<(), SatpError> {
    if common.sequence_number != expected {
        return Err(SatpError::SequenceNumberMissMatch {
            tag: tag.clone(),
            received: common.sequence_number,
            expected,
        });
    }
    Ok(())
}

pub fn verify_hash_chain(common: &CommonBody, expected: &str, tag: &ErrorTag) -> Result<(), SatpError> {
    if common.hash_previous_message != expected {
        return Err(SatpError::HashMissMatch {
            tag: tag.clone(),
            received: common.hash_previous_message.clone(),
            expected: expected.to_string(),
        });
    }
    Ok(())
}

/// The envelope belongs to `session`: same session id and transfer context.
pub fn verify_transfer_context(
    common: &CommonBody,
    session: &SessionData,
    tag: &ErrorTag,
) -> Result<(), SatpError> {
    if common.session_id != session.session_id.as_str() {
        return Err(SatpError::SessionUndefined {
            tag: tag.clone(),
            session_id: common.session_id.clone(),
        });
    }
    if common.transfer_context_id != session.transfer_context_id.as_str() {
        return Err(SatpError::TransferContextIdMissMatch {
            tag: tag.clone(),
            received: common.transfer_context_id.clone(),
            expected: session.transfer_context_id.to_string(),
        });
    }
    Ok(())
}

/// Verify the envelope signature against `signer_pubkey`.
pub fn verify_signature(
    envelope: &Envelope,
    signer_pubkey: &str,
    scheme: &dyn SignatureScheme,
    tag: &ErrorTag,
) -> Result<(), SatpError> {
    let signature = envelope
        .common
        .as_ref()
        .map(|c| c.signature.as_str())
        .unwrap_or_default();
    if signature.is_empty() {
        return Err(SatpError::SignatureVerificationFailed {
            tag: tag.clone(),
            reason: "signature absent".into(),
        });
    }
    if !scheme.is_valid_public_key(signer_pubkey) {
        return Err(SatpError::SignatureVerificationFailed {
            tag: tag.clone(),
            reason: format!("malformed signer key {signer_pubkey}"),
        });
    }
    let bytes = signing_bytes(envelope, tag)?;
    scheme
        .verify(&bytes, signature, signer_pubkey)
        .map_err(|e| SatpError::SignatureVerificationFailed {
            tag: tag.clone(),
            reason: e.to_string(),
        })
}

/// Full pipeline for an envelope inside an established session.
///
/// The sender must be the session's counterpart and the recipient this
/// gateway; both are checked with the signature since they decide which
/// key the signature is verified against.
pub fn check_envelope(
    envelope: &Envelope,
    session: &SessionData,
    expected: &[MessageType],
    scheme: &dyn SignatureScheme,
    tag: &ErrorTag,
) -> Result<ValidatedEnvelope, SatpError> {
    let common = verify_common_body(envelope, expected, tag)?;
    verify_version(common, &session.version, tag)?;
    verify_sequence(common, session.sequence_number + 1, tag)?;
    verify_hash_chain(
        common,
        session.last_message_hash.as_deref().unwrap_or_default(),
        tag,
    )?;
    verify_transfer_context(common, session, tag)?;

    let counterpart = session.counterpart_pubkey(tag)?;
    if common.sender_gateway_pubkey != counterpart {
        return Err(SatpError::SignatureVerificationFailed {
            tag: tag.clone(),
            reason: format!(
                "sender {} is not the session counterpart",
                common.sender_gateway_pubkey
            ),
        });
    }
    if common.recipient_gateway_pubkey != session.own_pubkey(tag)? {
        return Err(SatpError::SignatureVerificationFailed {
            tag: tag.clone(),
            reason: format!(
                "envelope addressed to {}",
                common.recipient_gateway_pubkey
            ),
        });
    }
    verify_signature(envelope, counterpart, scheme, tag)?;

    Ok(ValidatedEnvelope {
        message_type: envelope.message_type(),
        sequence_number: common.sequence_number,
        hash: message_hash(envelope, tag)?,
        common: common.clone(),
        envelope: envelope.clone(),
    })
}

/// Pipeline for an `INIT_PROPOSAL`, which opens a session rather than
/// joining one: sequence 0, empty previous hash, and a signature checked
/// against the sender key the envelope itself declares. Whether that key
/// belongs to a known counterparty is for the caller to decide.
pub fn check_genesis(
    envelope: &Envelope,
    supported_version: &str,
    scheme: &dyn SignatureScheme,
    tag: &ErrorTag,
) -> Result<ValidatedEnvelope, SatpError> {
    let common = verify_common_body(envelope, &[MessageType::InitProposal], tag)?;
    verify_version(common, supported_version, tag)?;
    verify_sequence(common, 0, tag)?;
    verify_hash_chain(common, "", tag)?;
    verify_signature(envelope, &common.sender_gateway_pubkey, scheme, tag)?;

    Ok(ValidatedEnvelope {
        message_type: MessageType::InitProposal,
        sequence_number: 0,
        hash: message_hash(envelope, tag)?,
        common: common.clone(),
        envelope: envelope.clone(),
    })
}
