//! Configuration management
//!
//! This module provides YAML-based configuration management with support for:
//! - Environment variable overrides
//! - Multiple configuration file locations
//! - Default values for all settings
//! - Per-backend issuer settings (Vault PKI, AWS ACM Private CA)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::utils::validation::{validate_mount_path, validate_other_san, validate_role_name};

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CertifyConfig {
    /// Vault PKI secrets engine issuer
    #[serde(default)]
    pub vault: Option<VaultConfig>,
    /// AWS ACM Private CA issuer
    #[serde(default)]
    pub acm_pca: Option<AcmPcaConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Vault PKI issuer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VaultConfig {
    /// Vault address, e.g. `https://vault.example.com:8200`
    #[serde(default)]
    pub url: Option<String>,
    /// Token used for the sign request
    #[serde(default)]
    pub token: Option<String>,
    /// Mount path of the PKI secrets engine (defaults to `pki`)
    #[serde(default)]
    pub mount: Option<String>,
    /// Role used when signing
    #[serde(default)]
    pub role: String,
    /// Requested certificate lifetime in seconds; the role default applies when unset
    #[serde(default, alias = "ttl")]
    pub ttl_secs: Option<u64>,
    /// Custom OID/UTF8 SANs: `<oid>;UTF8:<value>`
    #[serde(default)]
    pub other_sans: Vec<String>,
    /// Timeout in seconds (supports both timeout_secs and timeout field names)
    #[serde(default = "default_timeout", alias = "timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_ssl_verify")]
    pub ssl_verify: bool,
    /// Client certificate for mutual TLS
    pub ssl_cert: Option<PathBuf>,
    /// Client private key for mutual TLS
    pub ssl_key: Option<PathBuf>,
    /// CA bundle used to verify the Vault server
    pub ssl_ca: Option<PathBuf>,
}

pub const DEFAULT_VAULT_MOUNT: &str = "pki";

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            mount: None,
            role: String::new(),
            ttl_secs: None,
            other_sans: Vec::new(),
            timeout_secs: default_timeout(),
            ssl_verify: default_ssl_verify(),
            ssl_cert: None,
            ssl_key: None,
            ssl_ca: None,
        }
    }
}

impl VaultConfig {
    /// Mount path with the `pki` default applied
    pub fn effective_mount(&self) -> &str {
        self.mount
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_VAULT_MOUNT)
    }

    /// Validate the settings needed for a sign call with an injected client
    pub fn validate_signing(&self) -> Result<()> {
        if self.role.is_empty() {
            anyhow::bail!("Vault role is required");
        }
        if !validate_role_name(&self.role) {
            anyhow::bail!("Invalid Vault role name: {:?}", self.role);
        }
        if !validate_mount_path(self.effective_mount()) {
            anyhow::bail!("Invalid Vault mount path: {:?}", self.effective_mount());
        }
        if let Some(bad) = self.other_sans.iter().find(|s| !validate_other_san(s)) {
            anyhow::bail!(
                "Invalid other SAN {:?}: expected <oid>;UTF8:<value>",
                bad
            );
        }
        Ok(())
    }

    /// Validate the settings needed to establish a session
    pub fn validate_connection(&self) -> Result<()> {
        let url = self
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .context("Vault URL is required")?;
        reqwest::Url::parse(url).with_context(|| format!("Invalid Vault URL: {}", url))?;

        if self.token.as_deref().map_or(true, str::is_empty) {
            anyhow::bail!("Vault token is required");
        }
        if self.ssl_cert.is_some() != self.ssl_key.is_some() {
            anyhow::bail!("Vault ssl_cert and ssl_key must be provided together");
        }
        Ok(())
    }
}

/// AWS ACM Private CA issuer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AcmPcaConfig {
    /// ARN of the issuing private CA
    #[serde(default)]
    pub ca_arn: String,
    /// AWS region; the SDK default chain applies when unset
    #[serde(default)]
    pub region: Option<String>,
    /// Named profile from the shared AWS config files
    #[serde(default)]
    pub profile: Option<String>,
    /// Certificate validity in days
    #[serde(default = "default_validity_days")]
    pub validity_days: u32,
    /// Algorithm the CA signs with
    #[serde(default)]
    pub signing_algorithm: SigningAlgorithm,
    /// Upper bound on the wait for issuance, in seconds
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

impl Default for AcmPcaConfig {
    fn default() -> Self {
        Self {
            ca_arn: String::new(),
            region: None,
            profile: None,
            validity_days: default_validity_days(),
            signing_algorithm: SigningAlgorithm::default(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

impl AcmPcaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ca_arn.trim().is_empty() {
            anyhow::bail!("ACM PCA certificate authority ARN is required");
        }
        if self.validity_days == 0 {
            anyhow::bail!("ACM PCA validity_days must be at least 1");
        }
        if self.max_wait_secs == 0 {
            anyhow::bail!("ACM PCA max_wait_secs must be at least 1");
        }
        Ok(())
    }
}

/// Signing algorithm requested from ACM PCA
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum SigningAlgorithm {
    #[default]
    #[serde(rename = "SHA256WITHRSA")]
    Sha256WithRsa,
    #[serde(rename = "SHA384WITHRSA")]
    Sha384WithRsa,
    #[serde(rename = "SHA512WITHRSA")]
    Sha512WithRsa,
    #[serde(rename = "SHA256WITHECDSA")]
    Sha256WithEcdsa,
    #[serde(rename = "SHA384WITHECDSA")]
    Sha384WithEcdsa,
    #[serde(rename = "SHA512WITHECDSA")]
    Sha512WithEcdsa,
}

impl SigningAlgorithm {
    /// Wire name used by the ACM PCA API
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningAlgorithm::Sha256WithRsa => "SHA256WITHRSA",
            SigningAlgorithm::Sha384WithRsa => "SHA384WITHRSA",
            SigningAlgorithm::Sha512WithRsa => "SHA512WITHRSA",
            SigningAlgorithm::Sha256WithEcdsa => "SHA256WITHECDSA",
            SigningAlgorithm::Sha384WithEcdsa => "SHA384WITHECDSA",
            SigningAlgorithm::Sha512WithEcdsa => "SHA512WITHECDSA",
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_ssl_verify() -> bool {
    true
}

fn default_validity_days() -> u32 {
    30
}

fn default_max_wait_secs() -> u64 {
    600
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Log output target (console, file or both)
    #[serde(default)]
    pub target: LogTarget,
    /// Directory for log files (used when target includes a file)
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Log file name prefix
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    /// Enable daily log rotation
    #[serde(default = "default_log_rotation")]
    pub daily_rotation: bool,
}

/// Log output target
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    #[default]
    Console,
    File,
    Both,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_prefix() -> String {
    "certify".to_string()
}

fn default_log_rotation() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            daily_rotation: default_log_rotation(),
        }
    }
}

impl CertifyConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values
    /// 2. Configuration file (YAML)
    /// 3. Environment variables (prefixed with CERTIFY_)
    pub fn load() -> Result<Self> {
        // Try to load .env file if it exists
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("CERTIFY_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(Self::find_config_file);

        let mut config = match config_path {
            Some(ref path) if path.exists() => Self::from_file(path)?,
            _ => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse a configuration file without environment overrides
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_norway::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Find configuration file in standard locations
    pub fn find_config_file() -> Option<PathBuf> {
        let paths = [
            PathBuf::from("certify.yaml"),
            PathBuf::from("config/certify.yaml"),
            PathBuf::from("/etc/certify/certify.yaml"),
            dirs::config_dir()
                .map(|p| p.join("certify/certify.yaml"))
                .unwrap_or_default(),
        ];

        paths.into_iter().find(|p| p.exists())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a key lookup; split out so tests need not touch
    /// the process environment.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let vault_keys = [
            "CERTIFY_VAULT_URL",
            "CERTIFY_VAULT_TOKEN",
            "CERTIFY_VAULT_ROLE",
            "CERTIFY_VAULT_MOUNT",
        ];
        if self.vault.is_none() && vault_keys.iter().any(|k| lookup(k).is_some()) {
            self.vault = Some(VaultConfig::default());
        }
        if let Some(ref mut vault) = self.vault {
            if let Some(url) = lookup("CERTIFY_VAULT_URL") {
                vault.url = Some(url);
            }
            if let Some(token) = lookup("CERTIFY_VAULT_TOKEN").or_else(|| lookup("VAULT_TOKEN")) {
                vault.token = Some(token);
            }
            if let Some(role) = lookup("CERTIFY_VAULT_ROLE") {
                vault.role = role;
            }
            if let Some(mount) = lookup("CERTIFY_VAULT_MOUNT") {
                vault.mount = Some(mount);
            }
        }

        if self.acm_pca.is_none() && lookup("CERTIFY_ACM_PCA_CA_ARN").is_some() {
            self.acm_pca = Some(AcmPcaConfig::default());
        }
        if let Some(ref mut pca) = self.acm_pca {
            if let Some(arn) = lookup("CERTIFY_ACM_PCA_CA_ARN") {
                pca.ca_arn = arn;
            }
            if let Some(region) = lookup("CERTIFY_ACM_PCA_REGION") {
                pca.region = Some(region);
            }
        }

        if let Some(level) = lookup("CERTIFY_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(ref vault) = self.vault {
            vault.validate_signing()?;
            vault.validate_connection()?;
        }
        if let Some(ref pca) = self.acm_pca {
            pca.validate()?;
        }
        Ok(())
    }
}
