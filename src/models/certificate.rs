use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::certs::keys::SealedPrivateKey;

/// Identifier of a registered certificate authority provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Self-signed certificates minted by this service
    Internal,
    /// Government CA reached over HTTP
    Government,
    /// Commercial CA reached over HTTP
    Commercial,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Internal => "internal",
            ProviderKind::Government => "government",
            ProviderKind::Commercial => "commercial",
        }
    }

    /// Parse a provider identifier as used by callers and configuration
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "internal" | "interno" => Some(ProviderKind::Internal),
            "government" | "gubernamental" => Some(ProviderKind::Government),
            "commercial" | "comercial" => Some(ProviderKind::Commercial),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Certificate authority identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificateAuthority {
    pub provider: ProviderKind,
    pub name: String,
    /// ISO 3166-1 alpha-2 country code
    pub country: String,
    /// Trust tier, lower is more trusted
    pub trust_tier: u8,
    /// External endpoint for remote providers
    pub endpoint: Option<String>,
}

/// Legal tier of a certificate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ValidityLevel {
    Corporate,
    Government,
}

impl fmt::Display for ValidityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidityLevel::Corporate => f.write_str("corporate"),
            ValidityLevel::Government => f.write_str("government"),
        }
    }
}

/// Expected processing time of an issuance request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingTime {
    Immediate,
    Hours,
    Days,
}

/// Catalog entry describing a kind of certificate that can be requested
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificateType {
    pub code: String,
    pub validity_level: ValidityLevel,
    pub processing_time: ProcessingTime,
    pub requires_identity_verification: bool,
}

impl CertificateType {
    pub fn internal() -> Self {
        Self {
            code: "interno".to_string(),
            validity_level: ValidityLevel::Corporate,
            processing_time: ProcessingTime::Immediate,
            requires_identity_verification: false,
        }
    }

    pub fn government() -> Self {
        Self {
            code: "gubernamental".to_string(),
            validity_level: ValidityLevel::Government,
            processing_time: ProcessingTime::Days,
            requires_identity_verification: true,
        }
    }

    pub fn commercial() -> Self {
        Self {
            code: "comercial".to_string(),
            validity_level: ValidityLevel::Corporate,
            processing_time: ProcessingTime::Hours,
            requires_identity_verification: true,
        }
    }
}

/// Lifecycle status of a certificate.
///
/// Ordered by rank: a stored status may only move to a higher rank.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Vigente,
    PorVencer,
    Vencido,
    Revocado,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Vigente => "vigente",
            CertificateStatus::PorVencer => "por_vencer",
            CertificateStatus::Vencido => "vencido",
            CertificateStatus::Revocado => "revocado",
        }
    }

    /// Whether moving from `self` to `next` respects the forward-only rule
    pub fn can_advance_to(&self, next: CertificateStatus) -> bool {
        next >= *self
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subject identity requested for a certificate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubjectIdentity {
    pub common_name: String,
    pub organization: Option<String>,
    pub country: Option<String>,
    /// National id, tax id or similar identifier used for identity checks
    pub identifier: Option<String>,
    pub email: Option<String>,
}

impl SubjectIdentity {
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            organization: None,
            country: None,
            identifier: None,
            email: None,
        }
    }

    /// RFC 4514 style distinguished name
    pub fn distinguished_name(&self) -> String {
        let mut parts = vec![format!("CN={}", self.common_name)];
        if let Some(org) = &self.organization {
            parts.push(format!("O={}", org));
        }
        if let Some(country) = &self.country {
            parts.push(format!("C={}", country));
        }
        parts.join(",")
    }
}

/// An issued certificate together with its sealed key material.
///
/// Everything except `status`, `superseded_by` and `revoked_at` is fixed at issuance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub id: Uuid,
    /// Uppercase hex serial number
    pub serial_number: String,
    pub issuer_dn: String,
    pub subject_dn: String,
    pub subject: SubjectIdentity,
    pub provider: ProviderKind,
    pub certificate_type: CertificateType,
    pub public_key_pem: String,
    pub certificate_pem: Option<String>,
    #[serde(skip)]
    pub sealed_private_key: SealedPrivateKey,
    pub status: CertificateStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub owner_id: String,
    /// Tracking id at the issuing provider for remote authorities
    pub external_id: Option<String>,
    pub renewed_from: Option<Uuid>,
    pub superseded_by: Option<Uuid>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Certificate {
    pub fn validity_level(&self) -> ValidityLevel {
        self.certificate_type.validity_level
    }

    pub fn is_revoked(&self) -> bool {
        self.status == CertificateStatus::Revocado || self.revoked_at.is_some()
    }

    /// Retired certificates remain verifiable but cannot sign anything new
    pub fn is_retired(&self) -> bool {
        self.superseded_by.is_some()
    }

    /// Status as a function of time and the explicit revocation flag
    pub fn derive_status(&self, now: DateTime<Utc>, warning_threshold: Duration) -> CertificateStatus {
        if self.is_revoked() {
            return CertificateStatus::Revocado;
        }
        if now >= self.expires_at {
            return CertificateStatus::Vencido;
        }
        if self.expires_at - now <= warning_threshold {
            return CertificateStatus::PorVencer;
        }
        CertificateStatus::Vigente
    }
}

/// State of a two-phase issuance request at a remote authority
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Active,
    Failed,
}

/// Durable record of an issuance request awaiting out-of-band validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCertificateRequest {
    pub id: Uuid,
    pub provider: ProviderKind,
    pub tracking_id: String,
    pub subject: SubjectIdentity,
    pub certificate_type: CertificateType,
    pub owner_id: String,
    pub required_documents: Vec<String>,
    pub public_key_pem: String,
    #[serde(skip)]
    pub sealed_private_key: SealedPrivateKey,
    pub status: RequestStatus,
    pub failure_reason: Option<String>,
    pub certificate_id: Option<Uuid>,
    /// Certificate this request replaces when it was opened by a renewal
    #[serde(default)]
    pub renews_certificate_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert_expiring_at(expires_at: DateTime<Utc>) -> Certificate {
        Certificate {
            id: Uuid::new_v4(),
            serial_number: "01".to_string(),
            issuer_dn: "CN=Test".to_string(),
            subject_dn: "CN=Test".to_string(),
            subject: SubjectIdentity::new("Test"),
            provider: ProviderKind::Internal,
            certificate_type: CertificateType::internal(),
            public_key_pem: String::new(),
            certificate_pem: None,
            sealed_private_key: SealedPrivateKey::empty(),
            status: CertificateStatus::Vigente,
            issued_at: expires_at - Duration::days(365),
            expires_at,
            owner_id: "owner".to_string(),
            external_id: None,
            renewed_from: None,
            superseded_by: None,
            revoked_at: None,
        }
    }

    #[test]
    fn test_derive_status_windows() {
        let now = Utc::now();
        let threshold = Duration::days(30);

        let fresh = cert_expiring_at(now + Duration::days(200));
        assert_eq!(fresh.derive_status(now, threshold), CertificateStatus::Vigente);

        let expiring = cert_expiring_at(now + Duration::days(10));
        assert_eq!(expiring.derive_status(now, threshold), CertificateStatus::PorVencer);

        let at_threshold = cert_expiring_at(now + threshold);
        assert_eq!(at_threshold.derive_status(now, threshold), CertificateStatus::PorVencer);

        let expired = cert_expiring_at(now - Duration::days(1));
        assert_eq!(expired.derive_status(now, threshold), CertificateStatus::Vencido);
    }

    #[test]
    fn test_revocation_overrides_time() {
        let now = Utc::now();
        let mut cert = cert_expiring_at(now - Duration::days(1));
        cert.revoked_at = Some(now);
        assert_eq!(
            cert.derive_status(now, Duration::days(30)),
            CertificateStatus::Revocado
        );
    }

    #[test]
    fn test_status_only_advances() {
        assert!(CertificateStatus::Vigente.can_advance_to(CertificateStatus::PorVencer));
        assert!(CertificateStatus::PorVencer.can_advance_to(CertificateStatus::Revocado));
        assert!(!CertificateStatus::Vencido.can_advance_to(CertificateStatus::Vigente));
        assert!(!CertificateStatus::Revocado.can_advance_to(CertificateStatus::Vencido));
    }

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!(ProviderKind::parse("Internal"), Some(ProviderKind::Internal));
        assert_eq!(ProviderKind::parse("gubernamental"), Some(ProviderKind::Government));
        assert_eq!(ProviderKind::parse("acme"), None);
    }

    #[test]
    fn test_distinguished_name() {
        let mut subject = SubjectIdentity::new("Ana Perez");
        subject.organization = Some("Municipalidad".to_string());
        subject.country = Some("AR".to_string());
        assert_eq!(subject.distinguished_name(), "CN=Ana Perez,O=Municipalidad,C=AR");
    }
}
