//! Canonical digests must be reproducible by a counterpart that only knows
//! RFC 8785 and SHA-256. These tests hash the literal JCS text with `sha2`
//! directly and compare it to the digest produced through `CanonicalBytes`.

use satp_core::{sha256_hex, CanonicalBytes, Timestamp};
use serde::Serialize;
use sha2::{Digest, Sha256};

fn reference_hex(text: &str) -> String {
    Sha256::digest(text.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Header {
    version: &'static str,
    sequence_number: u64,
    session_id: &'static str,
    timestamp: Timestamp,
    hash_previous_message: &'static str,
}

#[test]
fn header_digest_matches_literal_jcs() {
    let header = Header {
        version: "v02",
        sequence_number: 2,
        session_id: "S1",
        timestamp: Timestamp::parse("2026-01-15T12:00:00Z").unwrap(),
        hash_previous_message: "00ff",
    };
    let literal = r#"{"hashPreviousMessage":"00ff","sequenceNumber":2,"sessionId":"S1","timestamp":"2026-01-15T12:00:00Z","version":"v02"}"#;
    let cb = CanonicalBytes::new(&header).unwrap();
    assert_eq!(std::str::from_utf8(cb.as_bytes()).unwrap(), literal);
    assert_eq!(sha256_hex(&cb), reference_hex(literal));
}

#[test]
fn empty_signature_field_is_part_of_the_digest() {
    let signed = serde_json::json!({"seq": 1, "signature": "abcd"});
    let blank = serde_json::json!({"seq": 1, "signature": ""});
    let a = sha256_hex(&CanonicalBytes::new(&signed).unwrap());
    let b = sha256_hex(&CanonicalBytes::new(&blank).unwrap());
    assert_ne!(a, b);
    assert_eq!(b, reference_hex(r#"{"seq":1,"signature":""}"#));
}
