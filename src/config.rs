//! Runtime configuration.
//!
//! Everything that must agree with the external circuit or contract (hash scheme, direction
//! bit convention) is fixed here once at startup and never re-selected per call.
use std::{env, path::PathBuf, time::Duration};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::registry::{
    DirectionConvention, HashScheme, ProofCodec, PublishPolicy, ReadRetry, SledMirrorStore,
    StoreError,
};

const ENV_PREFIX: &str = "VOTER_REGISTRY_";
const DEFAULT_MIRROR_PATH: &str = "data/voter-mirror";

///
#[derive(Error, Debug)]
pub enum ConfigError {
    ///
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    ///
    #[error("invalid configuration document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Chain client settings. The timeout is applied by the contract client; attempts and
/// backoff only ever apply to reads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub request_timeout_ms: u64,
    pub read_attempts: u32,
    pub read_backoff_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            request_timeout_ms: 10_000,
            read_attempts: 3,
            read_backoff_ms: 200,
        }
    }
}

impl ChainConfig {
    ///
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    ///
    pub fn read_retry(&self) -> ReadRetry {
        ReadRetry::new(self.read_attempts, Duration::from_millis(self.read_backoff_ms))
    }
}

///
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub hash_scheme: HashScheme,
    /// Must equal the membership circuit's convention.
    pub direction_convention: DirectionConvention,
    pub root_publication: PublishPolicy,
    pub mirror_path: PathBuf,
    pub chain: ChainConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            hash_scheme: HashScheme::default(),
            direction_convention: DirectionConvention::default(),
            root_publication: PublishPolicy::default(),
            mirror_path: PathBuf::from(DEFAULT_MIRROR_PATH),
            chain: ChainConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Reads `VOTER_REGISTRY_*` variables. Absent variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`RegistryConfig::from_env`], with variables resolved by `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };

        let mut config = RegistryConfig::default();
        if let Some((key, value)) = var("HASH_SCHEME") {
            config.hash_scheme = value
                .trim()
                .parse()
                .map_err(|reason| invalid(&key, &value, reason))?;
        }
        if let Some((key, value)) = var("DIRECTION_CONVENTION") {
            config.direction_convention = parse_named(&key, &value)?;
        }
        if let Some((key, value)) = var("ROOT_PUBLICATION") {
            config.root_publication = parse_named(&key, &value)?;
        }
        if let Some((_, value)) = var("MIRROR_PATH") {
            config.mirror_path = PathBuf::from(value);
        }
        if let Some((key, value)) = var("CHAIN_TIMEOUT_MS") {
            config.chain.request_timeout_ms = parse_number(&key, &value)?;
        }
        if let Some((key, value)) = var("CHAIN_READ_ATTEMPTS") {
            config.chain.read_attempts = parse_number(&key, &value)?;
        }
        if let Some((key, value)) = var("CHAIN_READ_BACKOFF_MS") {
            config.chain.read_backoff_ms = parse_number(&key, &value)?;
        }

        config.validate()?;
        tracing::info!(
            hash_scheme = %config.hash_scheme,
            direction_convention = ?config.direction_convention,
            root_publication = ?config.root_publication,
            mirror_path = %config.mirror_path.display(),
            "loaded registry configuration"
        );
        Ok(config)
    }

    /// Parses a JSON document. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: RegistryConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    ///
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain.request_timeout_ms == 0 {
            return Err(invalid(
                "chain.request_timeout_ms",
                "0",
                "must be positive".into(),
            ));
        }
        if self.chain.read_attempts == 0 {
            return Err(invalid(
                "chain.read_attempts",
                "0",
                "at least one attempt is required".into(),
            ));
        }
        Ok(())
    }

    ///
    pub fn codec(&self) -> ProofCodec {
        ProofCodec::new(self.direction_convention)
    }

    /// Opens the persistent mirror at `mirror_path`.
    pub fn open_mirror(&self) -> Result<SledMirrorStore, StoreError> {
        SledMirrorStore::open(&self.mirror_path)
    }
}

fn invalid(key: &str, value: &str, reason: String) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason,
    }
}

// Enum values use the same kebab-case names as the JSON form.
fn parse_named<T: DeserializeOwned>(key: &str, value: &str) -> Result<T, ConfigError> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_string()))
        .map_err(|err| invalid(key, value, err.to_string()))
}

fn parse_number<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err: T::Err| invalid(key, value, err.to_string()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = RegistryConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, RegistryConfig::default());
        assert_eq!(config.direction_convention, DirectionConvention::LeftIsZero);
        assert_eq!(config.root_publication, PublishPolicy::Automatic);
        assert_eq!(config.chain.read_retry().attempts(), 3);
    }

    #[test]
    fn env_overrides() {
        let config = RegistryConfig::from_lookup(lookup(&[
            ("VOTER_REGISTRY_DIRECTION_CONVENTION", "left-is-one"),
            ("VOTER_REGISTRY_ROOT_PUBLICATION", " operator "),
            ("VOTER_REGISTRY_MIRROR_PATH", "/var/lib/registry"),
            ("VOTER_REGISTRY_CHAIN_READ_ATTEMPTS", "5"),
            ("VOTER_REGISTRY_CHAIN_TIMEOUT_MS", "2500"),
        ]))
        .unwrap();
        assert_eq!(config.direction_convention, DirectionConvention::LeftIsOne);
        assert_eq!(config.codec().convention(), DirectionConvention::LeftIsOne);
        assert_eq!(config.root_publication, PublishPolicy::Operator);
        assert_eq!(config.mirror_path, PathBuf::from("/var/lib/registry"));
        assert_eq!(config.chain.read_attempts, 5);
        assert_eq!(config.chain.request_timeout(), Duration::from_millis(2500));
    }

    #[test]
    fn unparsable_values_name_the_variable() {
        for (key, value) in [
            ("VOTER_REGISTRY_HASH_SCHEME", "sha256"),
            ("VOTER_REGISTRY_DIRECTION_CONVENTION", "sideways"),
            ("VOTER_REGISTRY_CHAIN_READ_ATTEMPTS", "many"),
            ("VOTER_REGISTRY_CHAIN_READ_ATTEMPTS", "0"),
        ] {
            let err = RegistryConfig::from_lookup(lookup(&[(key, value)])).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { .. }), "{key}={value}");
        }
    }

    #[test]
    fn json_document() {
        let config = RegistryConfig::from_json_str(
            r#"{
                "hash_scheme": "poseidon-p128pow5t3",
                "root_publication": "operator",
                "chain": { "read_backoff_ms": 50 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.root_publication, PublishPolicy::Operator);
        assert_eq!(config.chain.read_backoff_ms, 50);
        assert_eq!(config.chain.read_attempts, 3);
        assert_eq!(config.mirror_path, PathBuf::from(DEFAULT_MIRROR_PATH));

        assert!(matches!(
            RegistryConfig::from_json_str(r#"{"hash_scheme": "keccak"}"#),
            Err(ConfigError::Json(_))
        ));
    }
}
