//! # Sealing
//!
//! The signature covers the canonical encoding of the whole envelope with
//! `common.signature` set to the empty string. The message hash covers the
//! canonical encoding of the sealed envelope, signature included, and is
//! what the next envelope names as `hashPreviousMessage`.

use satp_core::{sha256_hex, CanonicalBytes, ErrorTag, SatpError, Timestamp};
use satp_crypto::SignatureScheme;
use satp_state::SessionData;

use crate::message::{CommonBody, Envelope, MessageType};

fn canonical(value: &Envelope, tag: &ErrorTag) -> Result<CanonicalBytes, SatpError> {
    CanonicalBytes::new(value).map_err(|e| SatpError::Serialization {
        tag: tag.clone(),
        reason: e.to_string(),
    })
}

/// Canonical bytes the signature is computed over.
pub fn signing_bytes(envelope: &Envelope, tag: &ErrorTag) -> Result<CanonicalBytes, SatpError> {
    let mut unsigned = envelope.clone();
    if let Some(common) = unsigned.common.as_mut() {
        common.signature.clear();
    }
    canonical(&unsigned, tag)
}

/// Sign `envelope` with this gateway's key.
pub fn seal(
    mut envelope: Envelope,
    scheme: &dyn SignatureScheme,
    tag: &ErrorTag,
) -> Result<Envelope, SatpError> {
    let bytes = signing_bytes(&envelope, tag)?;
    let signature = scheme.sign(&bytes);
    match envelope.common.as_mut() {
        Some(common) => common.signature = signature,
        None => {
            return Err(SatpError::MissingSatpCommonBody {
                tag: tag.clone(),
                detail: "cannot seal an envelope without a common body".into(),
            })
        }
    }
    Ok(envelope)
}

/// SHA-256 hex of the canonical sealed envelope.
pub fn message_hash(envelope: &Envelope, tag: &ErrorTag) -> Result<String, SatpError> {
    Ok(sha256_hex(&canonical(envelope, tag)?))
}

/// Header for the next envelope this gateway sends in `session`.
///
/// `INIT_PROPOSAL` opens the chain at sequence 0 with no previous hash.
/// Every later envelope takes the successor of the last sequence number
/// recorded and names the last recorded hash.
pub fn outbound_common(
    session: &SessionData,
    message_type: MessageType,
    tag: &ErrorTag,
) -> Result<CommonBody, SatpError> {
    let (sequence_number, hash_previous_message) = if message_type == MessageType::InitProposal {
        (0, String::new())
    } else {
        (
            session.sequence_number + 1,
            session.last_message_hash.clone().unwrap_or_default(),
        )
    };
    Ok(CommonBody {
        version: session.version.clone(),
        message_type: Some(message_type),
        session_id: session.session_id.to_string(),
        sequence_number,
        transfer_context_id: session.transfer_context_id.to_string(),
        hash_previous_message,
        sender_gateway_pubkey: session.own_pubkey(tag)?.to_string(),
        recipient_gateway_pubkey: session.counterpart_pubkey(tag)?.to_string(),
        timestamp: Some(Timestamp::now()),
        signature: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{AssertionReceipt, Payload};
    use satp_core::Stage;
    use satp_crypto::Ed25519Scheme;

    fn tag() -> ErrorTag {
        ErrorTag::at(Stage::LockAssertion, "seal-test")
    }

    fn envelope() -> Envelope {
        Envelope::new(
            CommonBody {
                version: "v02".into(),
                message_type: Some(MessageType::AssertionReceipt),
                session_id: "S1".into(),
                sequence_number: 2,
                transfer_context_id: "ctx".into(),
                hash_previous_message: "ab".into(),
                sender_gateway_pubkey: "11".into(),
                recipient_gateway_pubkey: "22".into(),
                timestamp: Some(Timestamp::from_epoch_secs(1_700_000_000).unwrap()),
                signature: String::new(),
            },
            Payload::AssertionReceipt(AssertionReceipt {}),
        )
    }

    #[test]
    fn signature_excludes_itself() {
        let scheme = Ed25519Scheme::generate();
        let sealed = seal(envelope(), &scheme, &tag()).unwrap();
        let sig = sealed.common.as_ref().unwrap().signature.clone();
        assert_eq!(sig.len(), 128);
        assert_eq!(
            signing_bytes(&sealed, &tag()).unwrap(),
            signing_bytes(&envelope(), &tag()).unwrap()
        );
    }

    #[test]
    fn hash_covers_signature() {
        let scheme = Ed25519Scheme::generate();
        let unsigned = envelope();
        let sealed = seal(unsigned.clone(), &scheme, &tag()).unwrap();
        assert_ne!(
            message_hash(&unsigned, &tag()).unwrap(),
            message_hash(&sealed, &tag()).unwrap()
        );
        assert_eq!(message_hash(&sealed, &tag()).unwrap().len(), 64);
    }

    #[test]
    fn sealing_headerless_envelope_fails() {
        let scheme = Ed25519Scheme::generate();
        let mut env = envelope();
        env.common = None;
        let err = seal(env, &scheme, &tag()).unwrap_err();
        assert_eq!(err.code(), "MissingSatpCommonBody");
    }
}
