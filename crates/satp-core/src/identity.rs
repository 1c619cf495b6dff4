//! # Identifiers
//!
//! Session and transfer-context identifiers are opaque strings on the wire.
//! Locally generated ones are UUID v4; identifiers received from a
//! counterpart are accepted as long as they are non-empty and free of
//! whitespace, since a foreign gateway may use its own scheme.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why an identifier string was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("{kind} must not be empty")]
    Empty { kind: &'static str },
    #[error("{kind} must not contain whitespace: {value:?}")]
    Whitespace { kind: &'static str, value: String },
}

fn check(kind: &'static str, value: &str) -> Result<(), IdentifierError> {
    if value.is_empty() {
        return Err(IdentifierError::Empty { kind });
    }
    if value.chars().any(char::is_whitespace) {
        return Err(IdentifierError::Whitespace {
            kind,
            value: value.to_string(),
        });
    }
    Ok(())
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Parse an identifier received from outside the process.
            pub fn parse(value: &str) -> Result<Self, IdentifierError> {
                check($kind, value)?;
                Ok(Self(value.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdentifierError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

string_id!(
    /// Identifies one transfer session. Created by the initiating gateway and
    /// immutable for the session's lifetime.
    SessionId,
    "session id"
);

string_id!(
    /// Correlates every envelope of one logical transfer. Distinct from the
    /// session id so that a transfer can be re-attempted under a new session.
    TransferContextId,
    "transfer context id"
);

string_id!(
    /// Operator-assigned name of a gateway, as listed in the counterparty
    /// registry.
    GatewayId,
    "gateway id"
);

impl SessionId {
    /// Fresh random session id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TransferContextId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
        assert_ne!(TransferContextId::new(), TransferContextId::new());
    }

    #[test]
    fn generated_session_id_is_uuid() {
        let id = SessionId::new();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn foreign_ids_accepted() {
        let id = SessionId::parse("S1").unwrap();
        assert_eq!(id.as_str(), "S1");
        assert_eq!(id.to_string(), "S1");
        let parsed: GatewayId = "gateway-a".parse().unwrap();
        assert_eq!(parsed.as_str(), "gateway-a");
    }

    #[test]
    fn empty_id_rejected() {
        assert_eq!(
            SessionId::parse("").unwrap_err(),
            IdentifierError::Empty { kind: "session id" }
        );
    }

    #[test]
    fn whitespace_rejected() {
        assert!(matches!(
            TransferContextId::parse("ctx 1"),
            Err(IdentifierError::Whitespace { .. })
        ));
    }

    #[test]
    fn serde_is_transparent() {
        let id = SessionId::parse("S1").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"S1\"");
        let back: SessionId = serde_json::from_str("\"S1\"").unwrap();
        assert_eq!(back, id);
    }
}
