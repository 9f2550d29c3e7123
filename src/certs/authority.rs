// Certificate authority provider interface
// Implemented by the internal self-signing CA and the remote HTTP authorities

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::keys::SealedPrivateKey;
use crate::error::FirmaResult;
use crate::models::{CertificateAuthority, CertificateType, ProviderKind, SubjectIdentity};

/// Issuance request handed to a provider
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    pub subject: SubjectIdentity,
    pub certificate_type: CertificateType,
}

/// Certificate material produced by a synchronous issuance
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub serial_number: String,
    pub issuer_dn: String,
    pub subject_dn: String,
    pub public_key_pem: String,
    pub certificate_pem: Option<String>,
    pub sealed_private_key: SealedPrivateKey,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub external_id: Option<String>,
}

/// First phase of a two-phase issuance
#[derive(Debug, Clone)]
pub struct PendingIssuance {
    pub tracking_id: String,
    pub required_documents: Vec<String>,
    pub public_key_pem: String,
    pub sealed_private_key: SealedPrivateKey,
}

#[derive(Debug, Clone)]
pub enum ProviderResponse {
    Issued(IssuedCertificate),
    Pending(PendingIssuance),
}

/// Certificate details returned by a remote authority once validation completes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteCertificate {
    pub serial_number: String,
    pub issuer_dn: String,
    pub subject_dn: String,
    pub certificate_pem: Option<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// Status reported by a provider for an external id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    Pending,
    Active(Option<RemoteCertificate>),
    Failed { reason: String },
    Revoked,
}

/// Outcome of an identity check at a provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityValidation {
    pub verified: bool,
    pub reference: Option<String>,
    #[serde(default)]
    pub required_documents: Vec<String>,
    pub message: Option<String>,
}

/// Pluggable certificate authority
#[async_trait]
pub trait CertificateAuthorityProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn authority(&self) -> &CertificateAuthority;

    /// Start issuance; synchronous providers answer `Issued`, remote ones `Pending`
    async fn request_certificate(
        &self,
        request: &CertificateRequest,
    ) -> FirmaResult<ProviderResponse>;

    async fn validate_identity(&self, subject: &SubjectIdentity)
    -> FirmaResult<IdentityValidation>;

    async fn get_status(&self, external_id: &str) -> FirmaResult<ProviderStatus>;

    async fn revoke(&self, external_id: &str) -> FirmaResult<()>;
}
