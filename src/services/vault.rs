//! Vault PKI issuer
//!
//! Issues certificates through the `sign` endpoint of a HashiCorp Vault PKI
//! secrets engine. One round trip returns the finished certificate.

use async_trait::async_trait;
use reqwest::{Certificate, Client, Identity, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::config::VaultConfig;
use crate::models::{CertificateSpec, IssuedCertificate};
use crate::services::assembler::assemble;
use crate::services::context::IssueContext;
use crate::services::csr::{check_other_sans, CsrBuilder, RcgenCsrBuilder};
use crate::services::issuer::Issuer;
use crate::utils::error::IssuerError;
use crate::utils::validation::validate_mount_path;

/// Body of a `sign` request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignRequest {
    pub csr: String,
    pub common_name: String,
    /// Always true: Vault adds the common name back itself
    pub exclude_cn_from_sans: bool,
    pub format: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other_sans: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
}

/// Generic Vault response envelope
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VaultSecret {
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub lease_id: String,
    #[serde(default)]
    pub lease_duration: u64,
    #[serde(default)]
    pub renewable: bool,
    #[serde(default)]
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

impl VaultSecret {
    /// True when the secret carries warnings or data
    pub fn has_content(&self) -> bool {
        self.warnings.as_ref().is_some_and(|w| !w.is_empty())
            || self.data.as_ref().is_some_and(|d| !d.is_empty())
    }

    /// Decode the `data` block of a sign response
    pub fn signed_certificate(&self) -> Result<SignedCertificate, IssuerError> {
        let data = self
            .data
            .clone()
            .ok_or_else(|| IssuerError::CaProtocol("Vault response carries no data".to_string()))?;

        serde_json::from_value(serde_json::Value::Object(data)).map_err(|e| {
            IssuerError::CaProtocol(format!("Unexpected Vault sign response: {}", e))
        })
    }
}

/// Typed `data` block of a sign response
#[derive(Debug, Clone, Deserialize)]
pub struct SignedCertificate {
    pub certificate: String,
    #[serde(default)]
    pub issuing_ca: Option<String>,
    #[serde(default)]
    pub ca_chain: Option<Vec<String>>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub expiration: Option<i64>,
}

impl SignedCertificate {
    /// Resolve the chain, leaf first.
    ///
    /// An explicit `ca_chain` wins over `issuing_ca`; with neither, the chain
    /// is the leaf alone.
    pub fn chain(&self) -> Vec<&str> {
        let mut chain = vec![self.certificate.as_str()];
        if let Some(ref ca_chain) = self.ca_chain {
            chain.extend(ca_chain.iter().map(String::as_str));
        } else if let Some(ref issuing_ca) = self.issuing_ca {
            chain.push(issuing_ca);
        }
        chain
    }
}

#[derive(Debug, Default, Deserialize)]
struct VaultErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

/// The single Vault operation the issuer needs
#[async_trait]
pub trait VaultSigner: Send + Sync {
    /// Sign a CSR under `mount` with `role`.
    ///
    /// `Ok(None)` means Vault answered 404 with an empty body.
    async fn sign(
        &self,
        mount: &str,
        role: &str,
        request: &SignRequest,
    ) -> Result<Option<VaultSecret>, IssuerError>;
}

/// Vault HTTP client
#[derive(Clone)]
pub struct VaultClient {
    client: Client,
    base_url: String,
    token: String,
}

impl VaultClient {
    /// Create a new Vault client from configuration
    pub async fn new(config: &VaultConfig) -> Result<Self, IssuerError> {
        config
            .validate_connection()
            .map_err(|e| IssuerError::Config(e.to_string()))?;

        let base_url = config.url.as_deref().unwrap_or_default();
        info!("Initializing Vault client for {}", base_url);

        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .use_rustls_tls();

        // Add CA bundle if provided (must be done before identity for rustls)
        if let Some(ref ca_path) = config.ssl_ca {
            let ca_pem = tokio::fs::read(ca_path)
                .await
                .map_err(|e| IssuerError::Config(format!("Failed to read CA bundle {:?}: {}", ca_path, e)))?;
            let certs = Certificate::from_pem_bundle(&ca_pem).map_err(|e| {
                IssuerError::Config(format!("Failed to parse CA bundle {:?}: {}", ca_path, e))
            })?;

            debug!("Vault TLS: parsed {} certificate(s) from CA bundle", certs.len());

            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        if let (Some(cert_path), Some(key_path)) = (&config.ssl_cert, &config.ssl_key) {
            let cert_pem = tokio::fs::read(cert_path).await.map_err(|e| {
                IssuerError::Config(format!("Failed to read client certificate {:?}: {}", cert_path, e))
            })?;
            let key_pem = tokio::fs::read(key_path).await.map_err(|e| {
                IssuerError::Config(format!("Failed to read client key {:?}: {}", key_path, e))
            })?;

            // Combine cert and key into a single PEM bundle for rustls
            let mut pem_bundle = cert_pem;
            pem_bundle.push(b'\n');
            pem_bundle.extend_from_slice(&key_pem);

            let identity = Identity::from_pem(&pem_bundle)
                .map_err(|e| IssuerError::Config(format!("Failed to create identity: {}", e)))?;
            builder = builder.identity(identity);
        }

        // Configure SSL verification (must be after identity for rustls compatibility)
        if !config.ssl_verify {
            warn!("Vault TLS certificate verification is DISABLED - this is insecure!");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| IssuerError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: config.token.clone().unwrap_or_default(),
        })
    }

    fn status_error(status: StatusCode, body: &[u8]) -> IssuerError {
        let errors = serde_json::from_slice::<VaultErrorBody>(body)
            .map(|b| b.errors)
            .unwrap_or_default();

        if errors.is_empty() {
            IssuerError::CaRequest(format!("Vault returned status: {}", status))
        } else {
            IssuerError::CaRequest(format!(
                "Vault returned status {}: {}",
                status,
                errors.join("; ")
            ))
        }
    }
}

/// Parse a Vault response body; an empty body is `Ok(None)`
fn parse_secret(body: &[u8]) -> Result<Option<VaultSecret>, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body).map(Some)
}

#[async_trait]
impl VaultSigner for VaultClient {
    async fn sign(
        &self,
        mount: &str,
        role: &str,
        request: &SignRequest,
    ) -> Result<Option<VaultSecret>, IssuerError> {
        let url = format!(
            "{}/v1/{}/sign/{}",
            self.base_url,
            mount,
            urlencoding::encode(role)
        );
        debug!("Vault: Sending sign request to {}", url);

        let response = self
            .client
            .put(&url)
            .header("X-Vault-Token", &self.token)
            .header("X-Vault-Request", "true")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!(
                    "Vault ERROR: HTTP request failed to {}: {} (is_connect: {}, is_timeout: {})",
                    url,
                    e,
                    e.is_connect(),
                    e.is_timeout()
                );
                IssuerError::Transport(format!("Vault request failed: {}", e))
            })?;

        let status = response.status();
        let body = response.bytes().await?;

        match status {
            s if s.is_success() => match parse_secret(&body) {
                Ok(Some(secret)) => Ok(Some(secret)),
                Ok(None) => Err(IssuerError::CaProtocol(
                    "Vault returned an empty response".to_string(),
                )),
                Err(e) => Err(IssuerError::CaProtocol(format!(
                    "Failed to parse Vault response: {}",
                    e
                ))),
            },
            // A 404 is not necessarily fatal: Vault may still return a usable
            // secret, or nothing at all.
            StatusCode::NOT_FOUND => match parse_secret(&body) {
                Ok(None) => {
                    debug!("Vault returned 404 with an empty body");
                    Ok(None)
                }
                Ok(Some(secret)) if secret.has_content() => {
                    debug!("Vault returned 404 with a secret, using it");
                    Ok(Some(secret))
                }
                _ => Err(Self::status_error(status, &body)),
            },
            _ => Err(Self::status_error(status, &body)),
        }
    }
}

/// Issuer backed by a Vault PKI secrets engine
pub struct VaultIssuer {
    config: VaultConfig,
    session: OnceCell<Arc<dyn VaultSigner>>,
    csr_builder: Arc<dyn CsrBuilder>,
}

impl VaultIssuer {
    /// Create an issuer that connects on first use
    pub fn new(config: VaultConfig) -> Result<Self, IssuerError> {
        config
            .validate_signing()
            .map_err(|e| IssuerError::Config(e.to_string()))?;

        Ok(Self {
            config,
            session: OnceCell::new(),
            csr_builder: Arc::new(RcgenCsrBuilder),
        })
    }

    /// Create an issuer around an already authenticated signer.
    ///
    /// Adjust TTL, mount or other SANs with the `with_*` methods before use.
    pub fn from_client(signer: Arc<dyn VaultSigner>, role: impl Into<String>) -> Self {
        Self {
            config: VaultConfig {
                role: role.into(),
                ..VaultConfig::default()
            },
            session: OnceCell::new_with(Some(signer)),
            csr_builder: Arc::new(RcgenCsrBuilder),
        }
    }

    pub fn with_mount(mut self, mount: impl Into<String>) -> Self {
        self.config.mount = Some(mount.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl_secs = Some(ttl.as_secs());
        self
    }

    pub fn with_other_sans(mut self, other_sans: Vec<String>) -> Self {
        self.config.other_sans = other_sans;
        self
    }

    pub fn with_csr_builder(mut self, builder: Arc<dyn CsrBuilder>) -> Self {
        self.csr_builder = builder;
        self
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// The shared session, established at most once
    async fn session(&self) -> Result<&Arc<dyn VaultSigner>, IssuerError> {
        self.session
            .get_or_try_init(|| async {
                let client = VaultClient::new(&self.config).await?;
                Ok::<_, IssuerError>(Arc::new(client) as Arc<dyn VaultSigner>)
            })
            .await
    }

    fn sign_request(
        &self,
        common_name: &str,
        csr_pem: String,
        spec: &CertificateSpec,
    ) -> Result<SignRequest, IssuerError> {
        let other_sans: Vec<String> = self
            .config
            .other_sans
            .iter()
            .chain(spec.other_sans.iter())
            .cloned()
            .collect();
        check_other_sans(&other_sans)?;

        let ttl = spec
            .validity
            .map(|v| v.as_secs())
            .or(self.config.ttl_secs)
            .map(|secs| format!("{}s", secs));

        Ok(SignRequest {
            csr: csr_pem,
            common_name: common_name.to_string(),
            exclude_cn_from_sans: true,
            format: "pem".to_string(),
            other_sans,
            ttl,
        })
    }
}

#[async_trait]
impl Issuer for VaultIssuer {
    async fn issue(
        &self,
        ctx: &IssueContext,
        common_name: &str,
        spec: &CertificateSpec,
    ) -> Result<Option<IssuedCertificate>, IssuerError> {
        ctx.check()?;
        if self.config.role.is_empty() {
            return Err(IssuerError::Config("Vault role is required".to_string()));
        }
        let mount = self.config.effective_mount();
        if !validate_mount_path(mount) {
            return Err(IssuerError::Config(format!("Invalid Vault mount path: {:?}", mount)));
        }
        check_other_sans(&spec.other_sans)?;

        let signer = self.session().await?;

        let bundle = self.csr_builder.build(common_name, spec)?;
        let request = self.sign_request(common_name, bundle.csr_pem, spec)?;

        info!(
            common_name,
            mount,
            role = %self.config.role,
            "Requesting certificate from Vault"
        );

        let secret = ctx
            .run("Vault sign", signer.sign(mount, &self.config.role, &request))
            .await?;

        let Some(secret) = secret else {
            info!(common_name, "Vault has no certificate for this request");
            return Ok(None);
        };

        if let Some(ref warnings) = secret.warnings {
            for warning in warnings {
                warn!(common_name, "Vault warning: {}", warning);
            }
        }

        let signed = secret.signed_certificate()?;
        let chain_pem = signed.chain().join("\n");
        let issued = assemble(chain_pem.as_bytes(), bundle.private_key_pem.as_bytes())?;

        info!(
            common_name,
            serial = ?signed.serial_number,
            not_after = %issued.leaf().not_after,
            "Issued certificate from Vault"
        );

        Ok(Some(issued))
    }
}
