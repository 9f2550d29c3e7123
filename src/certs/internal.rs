// Internal certificate authority
// Generates RSA key pairs and mints self-signed certificates synchronously

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Utc};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, SerialNumber};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::authority::{
    CertificateAuthorityProvider, CertificateRequest, IdentityValidation, IssuedCertificate,
    ProviderResponse, ProviderStatus,
};
use super::keys::{KeyVault, generate_rsa_key};
use crate::error::{FirmaError, FirmaResult};
use crate::models::{
    CertificateAuthority, InternalCaConfig, ProviderKind, SubjectIdentity, ValidityLevel,
};

/// Self-signing authority operated by this service
pub struct InternalProvider {
    authority: CertificateAuthority,
    vault: Arc<KeyVault>,
    rsa_bits: usize,
    validity: Duration,
    /// serial -> revoked flag
    issued: RwLock<HashMap<String, bool>>,
}

impl InternalProvider {
    pub fn new(config: &InternalCaConfig, vault: Arc<KeyVault>, rsa_bits: usize) -> Self {
        Self {
            authority: CertificateAuthority {
                provider: ProviderKind::Internal,
                name: config.name.clone(),
                country: config.country.clone(),
                trust_tier: 3,
                endpoint: None,
            },
            vault,
            rsa_bits,
            validity: Duration::days(config.validity_days),
            issued: RwLock::new(HashMap::new()),
        }
    }

    fn mint(
        &self,
        subject: &SubjectIdentity,
        private_key: &rsa::RsaPrivateKey,
        serial: &[u8],
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> FirmaResult<String> {
        let pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| FirmaError::Crypto(format!("Failed to encode private key: {}", e)))?;
        let key_pair = KeyPair::from_pem_and_sign_algo(&pem, &rcgen::PKCS_RSA_SHA256)
            .map_err(|e| FirmaError::Crypto(format!("Failed to load key pair: {}", e)))?;

        let mut distinguished_name = DistinguishedName::new();
        distinguished_name.push(DnType::CommonName, subject.common_name.clone());
        if let Some(org) = &subject.organization {
            distinguished_name.push(DnType::OrganizationName, org.clone());
        }
        if let Some(country) = &subject.country {
            distinguished_name.push(DnType::CountryName, country.clone());
        }

        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name;
        params.serial_number = Some(SerialNumber::from(serial.to_vec()));
        params.not_before = rcgen::date_time_ymd(
            issued_at.year(),
            issued_at.month() as u8,
            issued_at.day() as u8,
        );
        params.not_after = rcgen::date_time_ymd(
            expires_at.year(),
            expires_at.month() as u8,
            expires_at.day() as u8,
        );

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| FirmaError::Crypto(format!("Failed to self-sign certificate: {}", e)))?;
        Ok(cert.pem())
    }
}

/// Random positive 128-bit serial number
fn random_serial() -> [u8; 16] {
    let mut serial: [u8; 16] = rand::random();
    serial[0] &= 0x7f;
    serial[0] |= 0x01;
    serial
}

#[async_trait]
impl CertificateAuthorityProvider for InternalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Internal
    }

    fn authority(&self) -> &CertificateAuthority {
        &self.authority
    }

    async fn request_certificate(
        &self,
        request: &CertificateRequest,
    ) -> FirmaResult<ProviderResponse> {
        if request.certificate_type.validity_level != ValidityLevel::Corporate {
            return Err(FirmaError::Validation(format!(
                "internal authority cannot issue '{}' certificates",
                request.certificate_type.code
            )));
        }
        if request.subject.common_name.trim().is_empty() {
            return Err(FirmaError::Validation(
                "subject common name is required".to_string(),
            ));
        }

        let bits = self.rsa_bits;
        let private_key = tokio::task::spawn_blocking(move || generate_rsa_key(bits))
            .await
            .map_err(|e| FirmaError::Crypto(format!("Key generation task failed: {}", e)))??;

        let serial = random_serial();
        let serial_hex = hex::encode_upper(serial);
        let issued_at = Utc::now();
        let expires_at = issued_at + self.validity;

        let certificate_pem =
            self.mint(&request.subject, &private_key, &serial, issued_at, expires_at)?;
        let public_key_pem = private_key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| FirmaError::Crypto(format!("Failed to encode public key: {}", e)))?;
        let sealed_private_key = self.vault.seal(&private_key)?;
        drop(private_key);

        self.issued.write().await.insert(serial_hex.clone(), false);

        let subject_dn = request.subject.distinguished_name();
        info!(
            "Internal CA issued certificate {} for '{}'",
            serial_hex, subject_dn
        );

        Ok(ProviderResponse::Issued(IssuedCertificate {
            serial_number: serial_hex,
            issuer_dn: subject_dn.clone(),
            subject_dn,
            public_key_pem,
            certificate_pem: Some(certificate_pem),
            sealed_private_key,
            issued_at,
            expires_at,
            external_id: None,
        }))
    }

    async fn validate_identity(
        &self,
        subject: &SubjectIdentity,
    ) -> FirmaResult<IdentityValidation> {
        // No out-of-band verification for internal certificates
        let verified = !subject.common_name.trim().is_empty();
        Ok(IdentityValidation {
            verified,
            reference: None,
            required_documents: Vec::new(),
            message: (!verified).then(|| "subject common name is required".to_string()),
        })
    }

    async fn get_status(&self, external_id: &str) -> FirmaResult<ProviderStatus> {
        let issued = self.issued.read().await;
        match issued.get(external_id) {
            Some(true) => Ok(ProviderStatus::Revoked),
            Some(false) => Ok(ProviderStatus::Active(None)),
            None => Err(FirmaError::NotFound(format!(
                "certificate {} was not issued by the internal authority",
                external_id
            ))),
        }
    }

    async fn revoke(&self, external_id: &str) -> FirmaResult<()> {
        let mut issued = self.issued.write().await;
        // Certificates issued before a restart are unknown here; revocation is recorded anyway
        issued.insert(external_id.to_string(), true);
        debug!("Internal CA marked {} as revoked", external_id);
        Ok(())
    }
}
