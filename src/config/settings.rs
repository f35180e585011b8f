//! Persisted transform-service settings.
//!
//! Settings live in `gtalk_config.json` beside the executable:
//!
//! ```json
//! {
//!   "apiKey": "sk-...",
//!   "baseUrl": "https://api.deepseek.com",
//!   "model": "deepseek-chat",
//!   "lanIp": "192.168.1.20"
//! }
//! ```
//!
//! Every field is optional. Empty transform fields fall back to the
//! `DEEPSEEK_*` environment variables and then to built-in defaults. The
//! file is rewritten, owner-only, whenever settings change.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::net::resolver::parse_override;

use super::files::write_owner_only;

// ============================================================================
// Constants
// ============================================================================

/// Settings file name within the data directory.
pub const SETTINGS_FILE: &str = "gtalk_config.json";

/// Base URL used when neither the file nor the environment sets one.
pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";

/// Model used when neither the file nor the environment sets one.
pub const DEFAULT_MODEL: &str = "deepseek-chat";

/// Environment variable consulted for the API key.
pub const ENV_API_KEY: &str = "DEEPSEEK_API_KEY";

/// Environment variable consulted for the base URL.
pub const ENV_BASE_URL: &str = "DEEPSEEK_BASE_URL";

/// Environment variable consulted for the model.
pub const ENV_MODEL: &str = "DEEPSEEK_MODEL";

/// Shown in place of short API keys.
const KEY_MASK: &str = "****";

/// Keys longer than this show their first and last four characters.
const MASK_REVEAL_MIN: usize = 8;

// ============================================================================
// Settings
// ============================================================================

/// Transform-service configuration plus the persisted LAN override.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Bearer key for the chat-completion API.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,

    /// API base URL without trailing slash.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base_url: String,

    /// Model identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,

    /// LAN address override, empty for auto-detection.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub lan_ip: String,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &self.masked_api_key())
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("lan_ip", &self.lan_ip)
            .finish()
    }
}

impl Settings {
    /// Returns `true` if an API key is configured.
    #[inline]
    #[must_use]
    pub fn is_transform_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// API key with all but the first and last four characters hidden.
    ///
    /// Keys of eight characters or fewer are fully masked; no key gives an
    /// empty string.
    #[must_use]
    pub fn masked_api_key(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.is_empty() {
            return String::new();
        }
        if chars.len() <= MASK_REVEAL_MIN {
            return KEY_MASK.to_string();
        }

        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}{KEY_MASK}{tail}")
    }

    /// Fills empty transform fields from `env`, then from defaults.
    #[must_use]
    fn with_fallbacks(mut self, env: impl Fn(&str) -> Option<String>) -> Self {
        let env = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if self.api_key.is_empty() {
            self.api_key = env(ENV_API_KEY).unwrap_or_default();
        }
        if self.base_url.is_empty() {
            self.base_url = env(ENV_BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        }
        if self.model.is_empty() {
            self.model = env(ENV_MODEL).unwrap_or_else(|| DEFAULT_MODEL.to_string());
        }

        self.api_key = self.api_key.trim().to_string();
        self.base_url = normalize_base_url(&self.base_url);
        self
    }
}

/// Strips trailing slashes and surrounding whitespace.
fn normalize_base_url(value: &str) -> String {
    value.trim().trim_end_matches('/').to_string()
}

// ============================================================================
// SettingsUpdate
// ============================================================================

/// Partial update as posted to the config endpoint.
///
/// Absent and empty fields leave the current value unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    /// New API key.
    #[serde(default)]
    pub api_key: String,
    /// New base URL.
    #[serde(default)]
    pub base_url: String,
    /// New model.
    #[serde(default)]
    pub model: String,
    /// New LAN override, or `"auto"` to clear it.
    #[serde(default)]
    pub lan_ip: String,
}

/// Validated form of a [`ConfigPatch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    /// Replacement API key.
    pub api_key: Option<String>,
    /// Replacement base URL.
    pub base_url: Option<String>,
    /// Replacement model.
    pub model: Option<String>,
    /// `Some(None)` clears the override, `Some(Some(ip))` sets it.
    pub lan_ip: Option<Option<Ipv4Addr>>,
}

impl TryFrom<ConfigPatch> for SettingsUpdate {
    type Error = Error;

    fn try_from(patch: ConfigPatch) -> Result<Self> {
        let non_empty = |value: String| {
            let value = value.trim().to_string();
            (!value.is_empty()).then_some(value)
        };

        let lan_ip = match non_empty(patch.lan_ip) {
            Some(value) => Some(parse_override(&value)?),
            None => None,
        };

        Ok(Self {
            api_key: non_empty(patch.api_key),
            base_url: non_empty(patch.base_url).map(|url| normalize_base_url(&url)),
            model: non_empty(patch.model),
            lan_ip,
        })
    }
}

// ============================================================================
// SettingsStore
// ============================================================================

/// In-memory settings backed by the settings file.
pub struct SettingsStore {
    /// Settings file location.
    path: PathBuf,
    /// Effective settings (fallbacks applied).
    current: RwLock<Settings>,
}

impl fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsStore")
            .field("path", &self.path)
            .field("current", &*self.current.read())
            .finish()
    }
}

impl SettingsStore {
    /// Loads settings from `dir`, with environment fallbacks.
    #[must_use]
    pub fn load(dir: &Path) -> Self {
        Self::load_with_env(dir, |key| std::env::var(key).ok())
    }

    /// Loads settings from `dir`, resolving fallbacks through `env`.
    ///
    /// A missing file yields empty settings; an unreadable or
    /// unparseable file is logged and treated the same way.
    #[must_use]
    pub fn load_with_env(dir: &Path, env: impl Fn(&str) -> Option<String>) -> Self {
        let path = dir.join(SETTINGS_FILE);
        let stored = read_settings(&path);
        Self::from_parts(path, stored.with_fallbacks(env))
    }

    /// Creates a store over the given settings without touching disk.
    #[must_use]
    pub fn from_parts(path: PathBuf, settings: Settings) -> Self {
        Self {
            path,
            current: RwLock::new(settings),
        }
    }

    /// Settings file location.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current settings.
    #[must_use]
    pub fn snapshot(&self) -> Settings {
        self.current.read().clone()
    }

    /// Returns `true` if an API key is configured.
    #[must_use]
    pub fn is_transform_available(&self) -> bool {
        self.current.read().is_transform_available()
    }

    /// Persisted LAN override, if it parses as IPv4.
    #[must_use]
    pub fn lan_override(&self) -> Option<Ipv4Addr> {
        let lan_ip = self.current.read().lan_ip.clone();
        if lan_ip.is_empty() {
            return None;
        }
        match parse_override(&lan_ip) {
            Ok(addr) => addr,
            Err(_) => {
                warn!(lan_ip = %lan_ip, "Invalid LAN override in settings, falling back to auto-detect");
                None
            }
        }
    }

    /// Applies `update` and persists the result.
    ///
    /// Persistence failure is logged; the in-memory update still stands.
    pub fn apply(&self, update: SettingsUpdate) -> Settings {
        let snapshot = {
            let mut current = self.current.write();

            if let Some(key) = update.api_key {
                current.api_key = key;
                info!("API key updated");
            }
            if let Some(base_url) = update.base_url {
                info!(base_url = %base_url, "API base URL updated");
                current.base_url = base_url;
            }
            if let Some(model) = update.model {
                info!(model = %model, "Model updated");
                current.model = model;
            }
            match update.lan_ip {
                Some(Some(addr)) => {
                    info!(%addr, "LAN override updated");
                    current.lan_ip = addr.to_string();
                }
                Some(None) => {
                    info!("LAN override cleared, back to auto-detect");
                    current.lan_ip.clear();
                }
                None => {}
            }

            current.clone()
        };

        if let Err(e) = self.persist(&snapshot) {
            warn!(error = %e, path = %self.path.display(), "Failed to save settings");
        }

        snapshot
    }

    /// Writes `settings` to the settings file, owner-only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Settings`] if the file cannot be written.
    pub fn persist(&self, settings: &Settings) -> Result<()> {
        let json = serde_json::to_vec_pretty(settings)?;
        write_owner_only(&self.path, &json)
            .map_err(|e| Error::settings(format!("{}: {e}", self.path.display())))?;
        debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }
}

/// Reads the settings file, logging and ignoring any failure.
fn read_settings(path: &Path) -> Settings {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Settings::default(),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Failed to read settings file");
            return Settings::default();
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(settings) => {
            info!(path = %path.display(), "Loaded settings");
            settings
        }
        Err(e) => {
            warn!(error = %e, path = %path.display(), "Settings file parse error");
            Settings::default()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
