//! # Gateway Configuration
//!
//! Loaded from YAML or JSON. Unknown fields are rejected so a misspelled
//! key fails loudly instead of silently taking its default.
//!
//! ```yaml
//! gateway:
//!   id: gw-fabric
//!   name: Fabric gateway
//!   supported_dlts: [FABRIC]
//!   key_seed_hex: "<64 hex chars>"
//! defaults:
//!   max_retries: 3
//!   max_timeout_ms: 30000
//! counterparties:
//!   - id: gw-besu
//!     pubkey: "<64 hex chars>"
//!     supported_dlts: [BESU]
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use satp_core::{GatewayId, LedgerKind, SATP_VERSION};
use satp_crypto::{Ed25519KeyPair, Ed25519Scheme, SignatureScheme};
use serde::{Deserialize, Serialize};

use crate::identity::GatewayIdentity;
use crate::registry::{Counterparty, CounterpartyRegistry};

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub gateway: GatewaySection,
    #[serde(default)]
    pub defaults: SessionDefaults,
    #[serde(default)]
    pub counterparties: Vec<CounterpartyConfig>,
}

/// This gateway's own identity.
///
/// Custom `Debug` redacts the key seed.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, alias = "supportedDltIDs")]
    pub supported_dlts: Vec<LedgerKind>,
    /// 32-byte Ed25519 seed. Absent means a fresh key per process.
    #[serde(default)]
    pub key_seed_hex: Option<String>,
}

impl std::fmt::Debug for GatewaySection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySection")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("supported_dlts", &self.supported_dlts)
            .field("key_seed_hex", &self.key_seed_hex.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Bounds applied to sessions this gateway takes part in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionDefaults {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,
    /// How long a terminal session stays readable before it is archived.
    /// Defaults to `max_timeout_ms`.
    #[serde(default)]
    pub terminal_retention_ms: Option<u64>,
    /// First resend delay; doubles per attempt up to `retry_backoff_max_ms`.
    #[serde(default = "default_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,
    /// Validity requested for lock assertions.
    #[serde(default = "default_lock_duration_secs")]
    pub lock_duration_secs: i64,
}

impl SessionDefaults {
    pub fn retention_ms(&self) -> u64 {
        self.terminal_retention_ms.unwrap_or(self.max_timeout_ms)
    }
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            max_timeout_ms: default_max_timeout_ms(),
            terminal_retention_ms: None,
            retry_backoff_ms: default_backoff_ms(),
            retry_backoff_max_ms: default_backoff_max_ms(),
            lock_duration_secs: default_lock_duration_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CounterpartyConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub pubkey: String,
    #[serde(default, alias = "supportedDltIDs")]
    pub supported_dlts: Vec<LedgerKind>,
}

fn default_version() -> String {
    SATP_VERSION.to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_timeout_ms() -> u64 {
    30_000
}

fn default_backoff_ms() -> u64 {
    100
}

fn default_backoff_max_ms() -> u64 {
    2_000
}

fn default_lock_duration_secs() -> i64 {
    3_600
}

impl GatewayConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; `.json` is parsed as JSON, anything else as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&raw),
            _ => Self::from_yaml_str(&raw),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if GatewayId::parse(&self.gateway.id).is_err() {
            return Err(ConfigError::Invalid(format!(
                "gateway id {:?} is empty or contains whitespace",
                self.gateway.id
            )));
        }
        if self.gateway.version.is_empty() {
            return Err(ConfigError::Invalid("gateway version is empty".into()));
        }
        if let Some(seed) = &self.gateway.key_seed_hex {
            Ed25519KeyPair::from_seed_hex(seed)
                .map_err(|e| ConfigError::Invalid(format!("key_seed_hex: {e}")))?;
        }
        if self.defaults.max_timeout_ms == 0 {
            return Err(ConfigError::Invalid("max_timeout_ms must be positive".into()));
        }
        if self.defaults.retry_backoff_ms > self.defaults.retry_backoff_max_ms {
            return Err(ConfigError::Invalid(
                "retry_backoff_ms exceeds retry_backoff_max_ms".into(),
            ));
        }
        if self.defaults.lock_duration_secs <= 0 {
            return Err(ConfigError::Invalid(
                "lock_duration_secs must be positive".into(),
            ));
        }

        let checker = Ed25519Scheme::generate();
        let mut ids = HashSet::new();
        let mut keys = HashSet::new();
        for cp in &self.counterparties {
            if GatewayId::parse(&cp.id).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "counterparty id {:?} is empty or contains whitespace",
                    cp.id
                )));
            }
            if cp.id == self.gateway.id {
                return Err(ConfigError::Invalid(format!(
                    "counterparty {} has this gateway's id",
                    cp.id
                )));
            }
            if !checker.is_valid_public_key(&cp.pubkey) {
                return Err(ConfigError::Invalid(format!(
                    "counterparty {} has a malformed pubkey",
                    cp.id
                )));
            }
            if !ids.insert(cp.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate counterparty id {}", cp.id)));
            }
            if !keys.insert(cp.pubkey.to_ascii_lowercase()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate counterparty pubkey for {}",
                    cp.id
                )));
            }
        }
        Ok(())
    }

    /// Build this gateway's identity, generating a key if none is configured.
    pub fn identity(&self) -> Result<GatewayIdentity, ConfigError> {
        let id = GatewayId::parse(&self.gateway.id)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let keypair = match &self.gateway.key_seed_hex {
            Some(seed) => Ed25519KeyPair::from_seed_hex(seed)
                .map_err(|e| ConfigError::Invalid(format!("key_seed_hex: {e}")))?,
            None => Ed25519KeyPair::generate(),
        };
        let signer: Arc<dyn SignatureScheme> = Arc::new(Ed25519Scheme::new(keypair));
        Ok(GatewayIdentity::new(id, signer)
            .with_name(self.gateway.name.clone())
            .with_version(self.gateway.version.clone())
            .with_supported_dlts(self.gateway.supported_dlts.clone()))
    }

    pub fn counterparty_registry(&self) -> Result<CounterpartyRegistry, ConfigError> {
        let mut registry = CounterpartyRegistry::new();
        for cp in &self.counterparties {
            let id = GatewayId::parse(&cp.id).map_err(|e| ConfigError::Invalid(e.to_string()))?;
            registry.register(Counterparty {
                id,
                name: cp.name.clone(),
                pubkey: cp.pubkey.to_ascii_lowercase(),
                supported_dlts: cp.supported_dlts.clone(),
            });
        }
        Ok(registry)
    }
}
