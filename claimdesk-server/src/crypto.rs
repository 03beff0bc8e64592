//! API key generation and hashing.

use base64::{Engine as _, engine::general_purpose};
use ring::digest::{SHA256, digest};
use ring::rand::{SecureRandom, SystemRandom};

/// Environment variable holding bootstrap keys as `label:key` pairs.
pub(crate) const API_KEYS_ENV: &str = "CLAIMDESK_API_KEYS";

const KEY_BYTES: usize = 24;
const KEY_PREFIX: &str = "cdk_";

/// Hash a raw API key for storage and lookup.
pub(crate) fn hash_api_key(raw: &str) -> String {
    let hashed = digest(&SHA256, raw.trim().as_bytes());
    general_purpose::STANDARD.encode(hashed.as_ref())
}

/// Generate a fresh random API key.
pub(crate) fn generate_api_key() -> Result<String, String> {
    let mut bytes = [0u8; KEY_BYTES];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| "api key generation failed".to_string())?;
    Ok(format!(
        "{KEY_PREFIX}{}",
        general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    ))
}

/// A bootstrap key parsed from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BootstrapKey {
    /// Label stored alongside the hash.
    pub(crate) label: String,
    /// Raw key as configured.
    pub(crate) key: String,
}

/// Parse `label:key` pairs (comma-separated). A bare key gets the label `default`.
pub(crate) fn parse_bootstrap_keys(raw: &str) -> Result<Vec<BootstrapKey>, String> {
    let mut keys = Vec::new();
    for entry in raw.split(',').map(str::trim) {
        if entry.is_empty() {
            continue;
        }
        let (label, key) = match entry.split_once(':') {
            Some((label, key)) => (label.trim(), key.trim()),
            None => ("default", entry),
        };
        if key.is_empty() {
            return Err(format!("{API_KEYS_ENV} entry '{label}' has an empty key"));
        }
        keys.push(BootstrapKey {
            label: label.to_string(),
            key: key.to_string(),
        });
    }
    Ok(keys)
}

/// Read bootstrap keys from `CLAIMDESK_API_KEYS`; unset means none.
pub(crate) fn bootstrap_keys_from_env() -> Result<Vec<BootstrapKey>, String> {
    match std::env::var(API_KEYS_ENV) {
        Ok(raw) => parse_bootstrap_keys(&raw),
        Err(_) => Ok(Vec::new()),
    }
}
