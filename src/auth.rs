//! Registry credentials read from a docker `config.json` style store.
//!
//! Credential stores in the wild are not consistent about how they spell
//! a registry: `ghcr.io`, `https://ghcr.io`, `https://index.docker.io/v1/`
//! all show up.  Lookups therefore try an ordered list of candidate keys
//! instead of relying on a single normalisation.

use std::collections::HashMap;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::debug;
use serde::Deserialize;

use crate::error::ConfigError;

/// Registry host used when an image reference names none.
pub const DEFAULT_REGISTRY: &str = "index.docker.io";

/// Key Docker Hub credentials are traditionally stored under.
pub const DOCKER_HUB_LEGACY_KEY: &str = "https://index.docker.io/v1/";

#[derive(Debug, Deserialize)]
struct CredentialStore {
    #[serde(default)]
    auths: HashMap<String, StoreEntry>,
}

#[derive(Debug, Deserialize)]
struct StoreEntry {
    #[serde(default)]
    auth: Option<String>,
}

/// Credentials for one registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    /// Key exactly as written in the store.
    pub server_address: String,
}

/// Credentials keyed by normalised registry key.
#[derive(Debug, Clone, Default)]
pub struct CredentialIndex {
    entries: HashMap<String, RegistryAuth>,
}

impl CredentialIndex {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::CredentialStoreRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    /// Entries with an empty or undecodable `auth` are skipped.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let store: CredentialStore = serde_json::from_str(raw)?;
        let mut entries = HashMap::new();
        for (server, entry) in store.auths {
            let Some(encoded) = entry.auth.filter(|a| !a.trim().is_empty()) else {
                debug!("credential store: no auth for {}, skipping", server);
                continue;
            };
            let decoded = match STANDARD.decode(encoded.trim()) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    debug!("credential store: bad auth for {}: {}, skipping", server, e);
                    continue;
                }
            };
            let (username, password) = match decoded.split_once(':') {
                Some((u, p)) => (u.to_string(), p.to_string()),
                None => (decoded, String::new()),
            };
            entries.insert(
                normalize_key(&server),
                RegistryAuth {
                    username,
                    password,
                    server_address: server,
                },
            );
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry matching any candidate key for the image's registry.
    /// `None` means the pull proceeds unauthenticated.
    pub fn resolve_for(&self, image_ref: &str) -> Option<&RegistryAuth> {
        candidate_keys(registry_host(image_ref))
            .iter()
            .find_map(|key| self.entries.get(key))
    }
}

/// The first path segment names a registry iff it contains a dot or a
/// colon, or is `localhost`.  A reference without a `/` has no registry
/// segment at all.
pub fn registry_host(image_ref: &str) -> &str {
    match image_ref.split_once('/') {
        Some((first, _)) if first.contains('.') || first.contains(':') || first == "localhost" => {
            first
        }
        _ => DEFAULT_REGISTRY,
    }
}

/// Lookup keys in priority order.
pub fn candidate_keys(host: &str) -> [String; 4] {
    [
        normalize_key(host),
        normalize_key(&format!("https://{host}")),
        normalize_key(&format!("https://{host}/v1/")),
        normalize_key(DOCKER_HUB_LEGACY_KEY),
    ]
}

fn normalize_key(s: &str) -> String {
    s.trim().trim_end_matches('/').to_string()
}
