//! AWS ACM Private CA issuer
//!
//! Issuance is asynchronous on the AWS side: submit the CSR, wait for the
//! certificate to be issued, then fetch it with its chain.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_acmpca::config::Region;
use aws_sdk_acmpca::client::Waiters;
use aws_sdk_acmpca::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_acmpca::operation::get_certificate::GetCertificateError;
use aws_sdk_acmpca::primitives::Blob;
use aws_sdk_acmpca::types::{
    SigningAlgorithm as PcaSigningAlgorithm, Validity, ValidityPeriodType,
};
use aws_sdk_acmpca::waiters::certificate_issued::WaitUntilCertificateIssuedError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{AcmPcaConfig, SigningAlgorithm};
use crate::models::{CertificateSpec, IssuedCertificate};
use crate::services::assembler::assemble;
use crate::services::context::IssueContext;
use crate::services::csr::{check_other_sans, CsrBuilder, RcgenCsrBuilder};
use crate::services::issuer::Issuer;
use crate::utils::error::IssuerError;

const SECONDS_PER_DAY: u64 = 86_400;

/// Parameters of an IssueCertificate call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcaIssueRequest {
    pub ca_arn: String,
    pub csr_pem: String,
    pub validity_days: u32,
    pub signing_algorithm: SigningAlgorithm,
}

/// Result of a GetCertificate call
#[derive(Debug, Clone, Default)]
pub struct FetchedCertificate {
    pub certificate: String,
    /// Issuing CA chain, PEM, may hold several certificates
    pub certificate_chain: String,
}

/// The three ACM PCA operations the issuer needs
#[async_trait]
pub trait PrivateCa: Send + Sync {
    /// Submit a CSR; returns the ARN of the certificate being issued
    async fn issue_certificate(&self, request: &PcaIssueRequest) -> Result<String, IssuerError>;

    /// Resolve once the certificate has been issued.
    ///
    /// A CA-reported failure is `IssuanceDenied`; callers bound the wait with
    /// a deadline.
    async fn wait_until_issued(&self, ca_arn: &str, certificate_arn: &str)
        -> Result<(), IssuerError>;

    async fn get_certificate(
        &self,
        ca_arn: &str,
        certificate_arn: &str,
    ) -> Result<FetchedCertificate, IssuerError>;
}

/// ACM PCA client backed by the AWS SDK
#[derive(Debug, Clone)]
pub struct AcmPcaClient {
    client: aws_sdk_acmpca::Client,
    max_wait: Duration,
}

impl AcmPcaClient {
    pub fn new(client: aws_sdk_acmpca::Client, config: &AcmPcaConfig) -> Self {
        Self {
            client,
            max_wait: Duration::from_secs(config.max_wait_secs),
        }
    }

    /// Build a client from the AWS default credential chain
    pub async fn connect(config: &AcmPcaConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(ref region) = config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(ref profile) = config.profile {
            loader = loader.profile_name(profile);
        }

        let sdk_config = loader.load().await;
        info!(
            region = ?sdk_config.region().map(|r| r.as_ref().to_string()),
            "Initialized ACM PCA client"
        );

        Self::new(aws_sdk_acmpca::Client::new(&sdk_config), config)
    }
}

fn sdk_error<E, R>(operation: &str, err: &SdkError<E, R>) -> IssuerError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let message = format!("ACM PCA {} failed: {}", operation, DisplayErrorContext(err));
    match err {
        SdkError::ServiceError(_) => IssuerError::CaRequest(message),
        _ => IssuerError::Transport(message),
    }
}

/// A terminal GetCertificate error seen while waiting for issuance
fn issuance_error<R>(certificate_arn: &str, err: &SdkError<GetCertificateError, R>) -> IssuerError
where
    R: std::fmt::Debug + Send + Sync + 'static,
{
    match err.as_service_error().and_then(|e| denied_error(certificate_arn, e)) {
        Some(denied) => denied,
        None => sdk_error("GetCertificate", err),
    }
}

/// A terminal modeled GetCertificate error (e.g. from a waiter's final poll)
fn modeled_issuance_error(certificate_arn: &str, err: &GetCertificateError) -> IssuerError {
    denied_error(certificate_arn, err).unwrap_or_else(|| {
        IssuerError::CaRequest(format!(
            "ACM PCA GetCertificate failed: {}",
            DisplayErrorContext(err)
        ))
    })
}

fn denied_error(certificate_arn: &str, e: &GetCertificateError) -> Option<IssuerError> {
    if e.is_request_failed_exception() || e.code() == Some("AccessDeniedException") {
        Some(IssuerError::IssuanceDenied(format!(
            "ACM PCA refused to issue {}: {}",
            certificate_arn,
            DisplayErrorContext(e)
        )))
    } else {
        None
    }
}

#[async_trait]
impl PrivateCa for AcmPcaClient {
    async fn issue_certificate(&self, request: &PcaIssueRequest) -> Result<String, IssuerError> {
        let validity = Validity::builder()
            .value(i64::from(request.validity_days))
            .r#type(ValidityPeriodType::Days)
            .build()
            .map_err(|e| IssuerError::Config(format!("Invalid validity: {}", e)))?;

        let output = self
            .client
            .issue_certificate()
            .certificate_authority_arn(&request.ca_arn)
            .csr(Blob::new(request.csr_pem.as_bytes()))
            .signing_algorithm(PcaSigningAlgorithm::from(request.signing_algorithm.as_str()))
            .validity(validity)
            .send()
            .await
            .map_err(|e| sdk_error("IssueCertificate", &e))?;

        output
            .certificate_arn()
            .map(String::from)
            .ok_or_else(|| {
                IssuerError::CaProtocol("IssueCertificate returned no certificate ARN".to_string())
            })
    }

    async fn wait_until_issued(
        &self,
        ca_arn: &str,
        certificate_arn: &str,
    ) -> Result<(), IssuerError> {
        debug!(certificate_arn, max_wait = ?self.max_wait, "Waiting for certificate issuance");

        let err = match self
            .client
            .wait_until_certificate_issued()
            .certificate_authority_arn(ca_arn)
            .certificate_arn(certificate_arn)
            .wait(self.max_wait)
            .await
        {
            Ok(_) => return Ok(()),
            Err(err) => err,
        };

        Err(match err {
            WaitUntilCertificateIssuedError::ExceededMaxWait(_) => IssuerError::Timeout(format!(
                "ACM PCA did not issue {} within {:?}",
                certificate_arn, self.max_wait
            )),
            WaitUntilCertificateIssuedError::OperationFailed(ref failed) => {
                issuance_error(certificate_arn, failed.error())
            }
            WaitUntilCertificateIssuedError::FailureState(ref state) => {
                match state.final_poll().as_result() {
                    Err(e) => modeled_issuance_error(certificate_arn, e),
                    Ok(_) => IssuerError::IssuanceDenied(format!(
                        "ACM PCA reported a failed state for {}",
                        certificate_arn
                    )),
                }
            }
            other => IssuerError::Transport(format!(
                "ACM PCA waiter failed: {}",
                DisplayErrorContext(&other)
            )),
        })
    }

    async fn get_certificate(
        &self,
        ca_arn: &str,
        certificate_arn: &str,
    ) -> Result<FetchedCertificate, IssuerError> {
        let output = self
            .client
            .get_certificate()
            .certificate_authority_arn(ca_arn)
            .certificate_arn(certificate_arn)
            .send()
            .await
            .map_err(|e| sdk_error("GetCertificate", &e))?;

        let certificate = output.certificate().map(String::from).ok_or_else(|| {
            IssuerError::CaProtocol("GetCertificate returned no certificate".to_string())
        })?;

        Ok(FetchedCertificate {
            certificate,
            certificate_chain: output.certificate_chain().unwrap_or_default().to_string(),
        })
    }
}

/// Issuer backed by an AWS ACM Private CA
pub struct AcmPcaIssuer {
    client: Arc<dyn PrivateCa>,
    config: AcmPcaConfig,
    csr_builder: Arc<dyn CsrBuilder>,
}

impl AcmPcaIssuer {
    pub fn new(client: Arc<dyn PrivateCa>, config: AcmPcaConfig) -> Result<Self, IssuerError> {
        config
            .validate()
            .map_err(|e| IssuerError::Config(e.to_string()))?;

        Ok(Self {
            client,
            config,
            csr_builder: Arc::new(RcgenCsrBuilder),
        })
    }

    /// Create an issuer with an SDK client from the default credential chain
    pub async fn connect(config: AcmPcaConfig) -> Result<Self, IssuerError> {
        config
            .validate()
            .map_err(|e| IssuerError::Config(e.to_string()))?;

        let client = AcmPcaClient::connect(&config).await;
        Self::new(Arc::new(client), config)
    }

    pub fn with_csr_builder(mut self, builder: Arc<dyn CsrBuilder>) -> Self {
        self.csr_builder = builder;
        self
    }

    pub fn config(&self) -> &AcmPcaConfig {
        &self.config
    }

    fn validity_days(&self, spec: &CertificateSpec) -> u32 {
        match spec.validity {
            Some(validity) => {
                let days = validity.as_secs().div_ceil(SECONDS_PER_DAY).max(1);
                u32::try_from(days).unwrap_or(u32::MAX)
            }
            None => self.config.validity_days,
        }
    }
}

#[async_trait]
impl Issuer for AcmPcaIssuer {
    async fn issue(
        &self,
        ctx: &IssueContext,
        common_name: &str,
        spec: &CertificateSpec,
    ) -> Result<Option<IssuedCertificate>, IssuerError> {
        ctx.check()?;
        check_other_sans(&spec.other_sans)?;

        let bundle = self.csr_builder.build(common_name, spec)?;
        let ca_arn = self.config.ca_arn.as_str();
        let request = PcaIssueRequest {
            ca_arn: ca_arn.to_string(),
            csr_pem: bundle.csr_pem,
            validity_days: self.validity_days(spec),
            signing_algorithm: self.config.signing_algorithm,
        };

        info!(
            common_name,
            ca_arn,
            validity_days = request.validity_days,
            "Requesting certificate from ACM PCA"
        );

        let certificate_arn = ctx
            .run("ACM PCA IssueCertificate", self.client.issue_certificate(&request))
            .await?;
        debug!(common_name, %certificate_arn, "Certificate request accepted");

        ctx.bounded(Duration::from_secs(self.config.max_wait_secs))
            .run(
                "ACM PCA wait for issuance",
                self.client.wait_until_issued(ca_arn, &certificate_arn),
            )
            .await?;

        let fetched = ctx
            .run(
                "ACM PCA GetCertificate",
                self.client.get_certificate(ca_arn, &certificate_arn),
            )
            .await?;

        let chain_pem = format!("{}\n{}", fetched.certificate, fetched.certificate_chain);
        let issued = assemble(chain_pem.as_bytes(), bundle.private_key_pem.as_bytes())?;

        info!(
            common_name,
            %certificate_arn,
            not_after = %issued.leaf().not_after,
            "Issued certificate from ACM PCA"
        );

        Ok(Some(issued))
    }
}
