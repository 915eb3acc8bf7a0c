//! Client configuration.
//!
//! A [`ClientConfig`] can be built in code or loaded from a TOML file:
//!
//! ```toml
//! address = "waypoint.example.com:9701"
//! token = "..."
//!
//! [tls]
//! ca_cert = "~/.config/waypoint-client/ca.pem"
//! ```
//!
//! Exactly one of `[tls]` or `insecure_skip_verify = true` applies. A file
//! with neither verifies the server against the native root store.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Connection settings for a Waypoint server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(from = "ConfigFile")]
pub struct ClientConfig {
    /// Address of the Waypoint server (`host:port`)
    pub address: String,
    /// Token attached to every call
    pub token: String,
    /// Accept any server certificate. Mutually exclusive with `tls`.
    pub insecure_skip_verify: bool,
    /// Upper bound on the initial connect, in seconds. `0` waits until the
    /// dial itself succeeds or fails.
    pub connect_timeout_secs: u64,
    /// Verified TLS settings. Mutually exclusive with `insecure_skip_verify`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSettings>,
}

/// On-disk shape of [`ClientConfig`], before the TLS default is applied.
#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default = "default_address")]
    address: String,
    #[serde(default)]
    token: String,
    #[serde(default)]
    insecure_skip_verify: bool,
    #[serde(default = "default_connect_timeout")]
    connect_timeout_secs: u64,
    #[serde(default)]
    tls: Option<TlsSettings>,
}

impl From<ConfigFile> for ClientConfig {
    fn from(file: ConfigFile) -> Self {
        // No [tls] and no opt-out means verify against native roots
        let tls = match (file.tls, file.insecure_skip_verify) {
            (None, false) => Some(TlsSettings::default()),
            (tls, _) => tls,
        };

        Self {
            address: file.address,
            token: file.token,
            insecure_skip_verify: file.insecure_skip_verify,
            connect_timeout_secs: file.connect_timeout_secs,
            tls,
        }
    }
}

/// Certificate validation settings for the server connection.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TlsSettings {
    /// Path to a PEM CA bundle used to verify the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,
    /// Inline PEM CA bundle (takes precedence over `ca_cert`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert_pem: Option<String>,
    /// Name to verify the server certificate against (defaults to the address host)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,
}

fn default_address() -> String {
    "localhost:9701".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            token: String::new(),
            insecure_skip_verify: false,
            connect_timeout_secs: default_connect_timeout(),
            tls: Some(TlsSettings::default()),
        }
    }
}

impl ClientConfig {
    /// Config for a server at `address` using `token` and the native root store.
    pub fn new(address: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: token.into(),
            ..Default::default()
        }
    }

    /// Switch to accepting any server certificate.
    pub fn insecure(mut self) -> Self {
        self.tls = None;
        self.insecure_skip_verify = true;
        self
    }

    /// Switch to verifying the server against the given PEM CA bundle.
    pub fn with_ca_pem(mut self, ca_pem: impl Into<String>) -> Self {
        let tls = self.tls.get_or_insert_with(TlsSettings::default);
        tls.ca_cert_pem = Some(ca_pem.into());
        self.insecure_skip_verify = false;
        self
    }

    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::IoError(format!(
                "Failed to read config file {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;

        let mut config: ClientConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("Failed to parse config: {e}")))?;

        if let Some(tls) = config.tls.as_mut() {
            tls.ca_cert = tls.ca_cert.as_deref().map(expand_tilde);
        }

        Ok(config)
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("waypoint-client")
            .join("config.toml")
    }

    /// Save configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::IoError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path.as_ref(), content).map_err(|e| {
            ConfigError::IoError(format!(
                "Failed to write config file {:?}: {e}",
                path.as_ref()
            ))
        })?;

        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.address.trim().is_empty() {
            errors.push("address: Waypoint server address (e.g., \"localhost:9701\")");
        }

        if self.token.is_empty() {
            errors.push("token: Waypoint token (e.g., from `waypoint user token`)");
        }

        match (&self.tls, self.insecure_skip_verify) {
            (Some(_), true) => {
                errors.push("tls or insecure_skip_verify: only one may be set");
            }
            (None, false) => {
                errors.push("tls or insecure_skip_verify: transport security must be configured");
            }
            _ => {}
        }

        if !errors.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "Configuration incomplete:\n  - {}",
                errors.join("\n  - ")
            )));
        }

        Ok(())
    }

    /// Connect deadline, `None` when `connect_timeout_secs` is 0.
    pub(crate) fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_secs > 0).then(|| Duration::from_secs(self.connect_timeout_secs))
    }

    /// Resolve the CA bundle to trust, if one was configured.
    pub(crate) fn ca_pem(&self) -> Result<Option<String>, ConfigError> {
        let Some(tls) = &self.tls else {
            return Ok(None);
        };

        if let Some(pem) = &tls.ca_cert_pem {
            return Ok(Some(pem.clone()));
        }

        match &tls.ca_cert {
            Some(path) => {
                let pem = std::fs::read_to_string(path).map_err(|e| {
                    ConfigError::IoError(format!("Failed to read CA cert {:?}: {e}", path))
                })?;
                let trimmed = pem.trim();
                if trimmed.is_empty() {
                    return Err(ConfigError::ValidationError(format!(
                        "Empty PEM file: {}",
                        path.display()
                    )));
                }
                Ok(Some(trimmed.to_string()))
            }
            None => Ok(None),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Expand ~ to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str()
        && path_str.starts_with("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(&path_str[2..]);
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
token = "abc"
insecure_skip_verify = true
"#;

        let config: ClientConfig = toml::from_str(toml).expect("Failed to parse config");
        assert_eq!(config.address, "localhost:9701"); // default
        assert_eq!(config.connect_timeout_secs, 10); // default
        assert!(config.tls.is_none());
        config.validate().expect("config should be valid");
    }

    #[test]
    fn test_parse_tls_config() {
        let toml = r#"
address = "waypoint.example.com:9701"
token = "abc"

[tls]
ca_cert = "/etc/waypoint/ca.pem"
domain_name = "waypoint.internal"
"#;

        let config: ClientConfig = toml::from_str(toml).expect("Failed to parse config");
        let tls = config.tls.as_ref().expect("tls section");
        assert_eq!(tls.ca_cert, Some(PathBuf::from("/etc/waypoint/ca.pem")));
        assert_eq!(tls.domain_name.as_deref(), Some("waypoint.internal"));
        assert!(!config.insecure_skip_verify);
        config.validate().expect("config should be valid");
    }

    #[test]
    fn test_default_requires_token() {
        let err = ClientConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("token"), "got: {err}");
    }

    #[test]
    fn test_tls_and_insecure_are_exclusive() {
        let mut config = ClientConfig::new("localhost:9701", "abc");
        config.insecure_skip_verify = true;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("only one may be set"), "got: {err}");

        config.insecure_skip_verify = false;
        config.tls = None;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must be configured"), "got: {err}");

        assert!(config.insecure().validate().is_ok());
    }

    #[test]
    fn test_empty_address_rejected() {
        let config = ClientConfig::new("  ", "abc");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("address"), "got: {err}");
    }

    #[test]
    fn test_inline_ca_takes_precedence() {
        let mut config = ClientConfig::new("localhost:9701", "abc").with_ca_pem("INLINE");
        if let Some(tls) = config.tls.as_mut() {
            tls.ca_cert = Some(PathBuf::from("/does/not/exist.pem"));
        }
        assert_eq!(config.ca_pem().unwrap().as_deref(), Some("INLINE"));
    }

    #[test]
    fn test_missing_ca_file_is_io_error() {
        let mut config = ClientConfig::new("localhost:9701", "abc");
        config.tls = Some(TlsSettings {
            ca_cert: Some(PathBuf::from("/does/not/exist.pem")),
            ..Default::default()
        });
        assert!(matches!(config.ca_pem(), Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = ClientConfig::new("waypoint.local:9701", "secret").insecure();
        config.save(&path).unwrap();

        let loaded = ClientConfig::load(&path).unwrap();
        assert_eq!(loaded.address, "waypoint.local:9701");
        assert_eq!(loaded.token, "secret");
        assert!(loaded.insecure_skip_verify);
        assert!(loaded.tls.is_none());
    }

    #[test]
    fn test_save_and_load_keeps_disabled_timeout() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = ClientConfig::new("h:1", "t").insecure();
        config.connect_timeout_secs = 0;
        assert_eq!(config.connect_timeout(), None);
        config.save(&path).unwrap();

        let loaded = ClientConfig::load(&path).unwrap();
        assert_eq!(loaded.connect_timeout_secs, 0);
        assert_eq!(loaded.connect_timeout(), None);
    }

    #[test]
    fn test_connect_timeout_from_secs() {
        let config = ClientConfig::new("h:1", "t");
        assert_eq!(config.connect_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_file_without_tls_uses_native_roots() {
        let config: ClientConfig = toml::from_str("token = \"abc\"").unwrap();
        let tls = config.tls.as_ref().expect("tls defaults on");
        assert!(tls.ca_cert.is_none() && tls.ca_cert_pem.is_none());
        assert!(!config.insecure_skip_verify);
        config.validate().expect("config should be valid");
        assert_eq!(config.ca_pem().unwrap(), None);
    }

    #[test]
    fn test_default_config_survives_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        ClientConfig::new("waypoint.local:9701", "secret")
            .save(&path)
            .unwrap();

        let loaded = ClientConfig::load(&path).unwrap();
        assert!(loaded.tls.is_some());
        assert!(!loaded.insecure_skip_verify);
        loaded.validate().unwrap();
    }

    #[test]
    fn test_load_missing_file() {
        let err = ClientConfig::load("/does/not/exist.toml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
