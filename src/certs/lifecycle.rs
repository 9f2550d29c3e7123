// Certificate lifecycle manager
// Issuance, status derivation, renewal, revocation and signing eligibility

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::authority::{
    IdentityValidation, IssuedCertificate, ProviderResponse, ProviderStatus, RemoteCertificate,
};
use super::import::extract_pkcs12;
use super::keys::KeyVault;
use super::registry::CertificateAuthorityRegistry;
use crate::audit::{AuditAction, AuditLogger, ResourceType};
use crate::error::{FirmaError, FirmaResult};
use crate::locks::{KeyedGuard, KeyedLocks};
use crate::models::{
    AppConfig, Certificate, CertificateStatus, CertificateType, DocumentClass,
    PendingCertificateRequest, ProviderKind, RequestStatus, SubjectIdentity, ValidityLevel,
};
use crate::storage::{CertificateLifecycleUpdate, StorageError, Store};

/// Shared guard held while a signature is produced with a certificate
pub type SigningGuard<'a> = KeyedGuard<'a, RwLock<()>, OwnedRwLockReadGuard<()>>;

type MutationGuard<'a> = KeyedGuard<'a, RwLock<()>, OwnedRwLockWriteGuard<()>>;

/// Marks a certificate as having a renewal or revocation in flight until dropped
struct InFlight<'a> {
    set: &'a Mutex<HashSet<Uuid>>,
    id: Uuid,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.id);
        }
    }
}

/// Result of an issuance or renewal request
#[derive(Debug, Clone)]
pub enum IssuanceOutcome {
    /// Certificate available immediately
    Issued(Certificate),
    /// Remote authority accepted the request; poll it with `poll_request`
    Pending(PendingCertificateRequest),
}

impl IssuanceOutcome {
    pub fn certificate(&self) -> Option<&Certificate> {
        match self {
            IssuanceOutcome::Issued(certificate) => Some(certificate),
            IssuanceOutcome::Pending(_) => None,
        }
    }
}

pub struct CertificateLifecycleManager {
    registry: CertificateAuthorityRegistry,
    store: Arc<dyn Store>,
    vault: Arc<KeyVault>,
    audit: AuditLogger,
    warning_threshold: Duration,
    certificate_types: Vec<CertificateType>,
    /// Signing takes the read side, renew/revoke the write side
    gates: KeyedLocks<RwLock<()>>,
    /// Certificates waiting on a remote renewal or revocation
    in_flight: Mutex<HashSet<Uuid>>,
}

impl CertificateLifecycleManager {
    pub fn new(
        registry: CertificateAuthorityRegistry,
        store: Arc<dyn Store>,
        vault: Arc<KeyVault>,
        audit: AuditLogger,
        config: &AppConfig,
    ) -> Self {
        Self {
            registry,
            store,
            vault,
            audit,
            warning_threshold: Duration::days(config.lifecycle.expiry_warning_days),
            certificate_types: config.certificate_types.clone(),
            gates: KeyedLocks::new(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn registry(&self) -> &CertificateAuthorityRegistry {
        &self.registry
    }

    pub fn warning_threshold(&self) -> Duration {
        self.warning_threshold
    }

    pub fn certificate_type(&self, code: &str) -> FirmaResult<CertificateType> {
        self.certificate_types
            .iter()
            .find(|t| t.code == code)
            .cloned()
            .ok_or_else(|| FirmaError::Validation(format!("unknown certificate type '{}'", code)))
    }

    /// Request a new certificate from a provider
    pub async fn request_certificate(
        &self,
        provider: &str,
        subject: SubjectIdentity,
        certificate_type: &str,
        owner_id: &str,
    ) -> FirmaResult<IssuanceOutcome> {
        if subject.common_name.trim().is_empty() {
            return Err(FirmaError::Validation(
                "subject common name is required".to_string(),
            ));
        }
        if owner_id.trim().is_empty() {
            return Err(FirmaError::Validation("owner id is required".to_string()));
        }
        let certificate_type = self.certificate_type(certificate_type)?;
        let kind = self.registry.provider(provider)?.kind();

        let response = match self
            .verify_and_request(provider, &subject, &certificate_type)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.audit
                    .log_denied(
                        AuditAction::CertificateRequestFailed,
                        ResourceType::CertificateRequest,
                        &subject.distinguished_name(),
                        Some(owner_id),
                        &e,
                    )
                    .await;
                return Err(e);
            }
        };

        self.store_response(response, kind, subject, certificate_type, owner_id, None)
            .await
    }

    /// Ask a provider whether it can vouch for a subject's identity
    pub async fn validate_identity(
        &self,
        provider: &str,
        subject: &SubjectIdentity,
    ) -> FirmaResult<IdentityValidation> {
        if subject.common_name.trim().is_empty() {
            return Err(FirmaError::Validation(
                "subject common name is required".to_string(),
            ));
        }
        let validation = self.registry.validate_identity(provider, subject).await?;
        debug!(
            "Identity of '{}' at {}: verified={}",
            subject.common_name, provider, validation.verified
        );
        Ok(validation)
    }

    /// Identity check for types that need one, then the issuance request
    async fn verify_and_request(
        &self,
        provider: &str,
        subject: &SubjectIdentity,
        certificate_type: &CertificateType,
    ) -> FirmaResult<ProviderResponse> {
        if certificate_type.requires_identity_verification {
            let validation = self.validate_identity(provider, subject).await?;
            if !validation.verified {
                return Err(FirmaError::IdentityNotVerified {
                    provider: provider.to_string(),
                    subject: subject.common_name.clone(),
                    reason: validation
                        .message
                        .unwrap_or_else(|| "identity could not be verified".to_string()),
                });
            }
        }
        self.registry
            .request_certificate(provider, subject, certificate_type)
            .await
    }

    /// Insert a new certificate; a renewal also retires its predecessor in the same write
    async fn persist_certificate(&self, certificate: &Certificate) -> FirmaResult<()> {
        if certificate.renewed_from.is_none() {
            self.store.insert_certificate(certificate.clone()).await?;
            return Ok(());
        }

        let previous = self.store.insert_successor(certificate.clone()).await?;
        self.audit
            .log_certificate_event(
                AuditAction::CertificateRenewed,
                &previous.id.to_string(),
                &previous.serial_number,
                Some(&previous.owner_id),
            )
            .await;
        info!(
            "Certificate {} renewed as {}",
            previous.serial_number, certificate.serial_number
        );
        Ok(())
    }

    async fn store_response(
        &self,
        response: ProviderResponse,
        provider: ProviderKind,
        subject: SubjectIdentity,
        certificate_type: CertificateType,
        owner_id: &str,
        renews: Option<Uuid>,
    ) -> FirmaResult<IssuanceOutcome> {
        match response {
            ProviderResponse::Issued(issued) => {
                let certificate = self.materialize(
                    issued,
                    provider,
                    subject,
                    certificate_type,
                    owner_id,
                    renews,
                );
                self.persist_certificate(&certificate).await?;
                self.audit
                    .log_certificate_event(
                        AuditAction::CertificateIssued,
                        &certificate.id.to_string(),
                        &certificate.serial_number,
                        Some(owner_id),
                    )
                    .await;
                Ok(IssuanceOutcome::Issued(certificate))
            }
            ProviderResponse::Pending(pending) => {
                let now = Utc::now();
                let request = PendingCertificateRequest {
                    id: Uuid::new_v4(),
                    provider,
                    tracking_id: pending.tracking_id,
                    subject,
                    certificate_type,
                    owner_id: owner_id.to_string(),
                    required_documents: pending.required_documents,
                    public_key_pem: pending.public_key_pem,
                    sealed_private_key: pending.sealed_private_key,
                    status: RequestStatus::Pending,
                    failure_reason: None,
                    certificate_id: None,
                    renews_certificate_id: renews,
                    created_at: now,
                    updated_at: now,
                };
                self.store.insert_pending_request(request.clone()).await?;
                self.audit
                    .log_certificate_event(
                        AuditAction::CertificateRequested,
                        &request.id.to_string(),
                        &request.tracking_id,
                        Some(owner_id),
                    )
                    .await;
                info!(
                    "Certificate request {} pending at {} (tracking id {})",
                    request.id, provider, request.tracking_id
                );
                Ok(IssuanceOutcome::Pending(request))
            }
        }
    }

    fn materialize(
        &self,
        issued: IssuedCertificate,
        provider: ProviderKind,
        subject: SubjectIdentity,
        certificate_type: CertificateType,
        owner_id: &str,
        renewed_from: Option<Uuid>,
    ) -> Certificate {
        let mut certificate = Certificate {
            id: Uuid::new_v4(),
            serial_number: issued.serial_number,
            issuer_dn: issued.issuer_dn,
            subject_dn: issued.subject_dn,
            subject,
            provider,
            certificate_type,
            public_key_pem: issued.public_key_pem,
            certificate_pem: issued.certificate_pem,
            sealed_private_key: issued.sealed_private_key,
            status: CertificateStatus::Vigente,
            issued_at: issued.issued_at,
            expires_at: issued.expires_at,
            owner_id: owner_id.to_string(),
            external_id: issued.external_id,
            renewed_from,
            superseded_by: None,
            revoked_at: None,
        };
        certificate.status = certificate.derive_status(Utc::now(), self.warning_threshold);
        certificate
    }

    /// Resolve a pending request through the provider's status endpoint
    pub async fn poll_request(&self, request_id: Uuid) -> FirmaResult<PendingCertificateRequest> {
        let mut request = self.get_request(request_id).await?;
        if request.status != RequestStatus::Pending {
            return Ok(request);
        }

        let status = self
            .registry
            .get_status(request.provider.as_str(), &request.tracking_id)
            .await?;
        debug!("Request {} polled: {:?}", request.id, status);

        match status {
            ProviderStatus::Pending => return Ok(request),
            ProviderStatus::Active(Some(remote)) => match self.activate(&request, remote).await {
                Ok(certificate) => {
                    request.status = RequestStatus::Active;
                    request.certificate_id = Some(certificate.id);
                }
                Err(FirmaError::Storage(StorageError::VersionConflict)) => {
                    request.status = RequestStatus::Failed;
                    request.failure_reason =
                        Some("certificate was already renewed by another request".to_string());
                }
                Err(e) => return Err(e),
            },
            ProviderStatus::Active(None) => {
                return Err(FirmaError::ProviderRejected {
                    provider: request.provider.to_string(),
                    reason: "active certificate reported without certificate details".to_string(),
                });
            }
            ProviderStatus::Failed { reason } => {
                request.status = RequestStatus::Failed;
                request.failure_reason = Some(reason);
            }
            ProviderStatus::Revoked => {
                request.status = RequestStatus::Failed;
                request.failure_reason = Some("revoked by provider".to_string());
            }
        }

        request.updated_at = Utc::now();
        self.store.update_pending_request(request.clone()).await?;

        if request.status == RequestStatus::Failed {
            let error = FirmaError::ProviderRejected {
                provider: request.provider.to_string(),
                reason: request.failure_reason.clone().unwrap_or_default(),
            };
            self.audit
                .log_denied(
                    AuditAction::CertificateRequestFailed,
                    ResourceType::CertificateRequest,
                    &request.id.to_string(),
                    Some(&request.owner_id),
                    &error,
                )
                .await;
        }

        Ok(request)
    }

    async fn activate(
        &self,
        request: &PendingCertificateRequest,
        remote: RemoteCertificate,
    ) -> FirmaResult<Certificate> {
        let issued = IssuedCertificate {
            serial_number: remote.serial_number,
            issuer_dn: remote.issuer_dn,
            subject_dn: remote.subject_dn,
            public_key_pem: request.public_key_pem.clone(),
            certificate_pem: remote.certificate_pem,
            sealed_private_key: request.sealed_private_key.clone(),
            issued_at: remote.not_before,
            expires_at: remote.not_after,
            external_id: Some(request.tracking_id.clone()),
        };
        let certificate = self.materialize(
            issued,
            request.provider,
            request.subject.clone(),
            request.certificate_type.clone(),
            &request.owner_id,
            request.renews_certificate_id,
        );
        // Retiring the predecessor waits for its running signatures
        let _gate = match request.renews_certificate_id {
            Some(previous) => Some(self.mutation_gate(previous).await?),
            None => None,
        };
        self.persist_certificate(&certificate).await?;

        self.audit
            .log_certificate_event(
                AuditAction::CertificateIssued,
                &certificate.id.to_string(),
                &certificate.serial_number,
                Some(&request.owner_id),
            )
            .await;
        info!(
            "Certificate {} activated from request {}",
            certificate.serial_number, request.id
        );
        Ok(certificate)
    }

    pub async fn get_request(&self, request_id: Uuid) -> FirmaResult<PendingCertificateRequest> {
        self.store
            .get_pending_request(request_id)
            .await?
            .ok_or_else(|| FirmaError::NotFound(format!("certificate request {}", request_id)))
    }

    pub async fn get_certificate(&self, id: Uuid) -> FirmaResult<Certificate> {
        self.store
            .get_certificate(id)
            .await?
            .ok_or_else(|| FirmaError::NotFound(format!("certificate {}", id)))
    }

    pub async fn list_certificates(&self, owner_id: &str) -> FirmaResult<Vec<Certificate>> {
        let mut certificates = self.store.list_certificates(owner_id).await?;
        certificates.sort_by_key(|c| c.issued_at);
        Ok(certificates)
    }

    /// Current status derived from the clock and the revocation flag
    pub fn status(&self, certificate: &Certificate) -> CertificateStatus {
        self.status_at(certificate, Utc::now())
    }

    pub fn status_at(&self, certificate: &Certificate, now: DateTime<Utc>) -> CertificateStatus {
        // A stored status never regresses even if the clock does
        certificate
            .derive_status(now, self.warning_threshold)
            .max(certificate.status)
    }

    /// Persist the derived status when it moved forward
    pub async fn refresh_status(&self, id: Uuid) -> FirmaResult<Certificate> {
        let certificate = self.get_certificate(id).await?;
        let derived = self.status(&certificate);
        if derived == certificate.status {
            return Ok(certificate);
        }

        let updated = self
            .store
            .update_certificate_lifecycle(
                id,
                CertificateLifecycleUpdate {
                    status: Some(derived),
                    ..Default::default()
                },
            )
            .await?;
        info!(
            "Certificate {} moved from {} to {}",
            updated.serial_number, certificate.status, derived
        );
        let mut entry = crate::audit::AuditEntry::builder(
            AuditAction::CertificateStatusChanged,
            ResourceType::Certificate,
        )
        .resource_id(id.to_string())
        .metadata("serial", updated.serial_number.clone())
        .metadata("from", certificate.status.as_str())
        .metadata("to", derived.as_str());
        if derived == CertificateStatus::Vencido {
            entry = entry.level(crate::audit::AuditLevel::Warning);
        }
        self.audit.log(entry.build()).await;
        Ok(updated)
    }

    /// Active certificates that expire within `within`, refreshing their stored status
    pub async fn list_expiring(&self, within: Duration) -> FirmaResult<Vec<Certificate>> {
        let now = Utc::now();
        let mut expiring = Vec::new();
        for certificate in self.store.list_all_certificates().await? {
            let status = self.status_at(&certificate, now);
            if matches!(status, CertificateStatus::Vencido | CertificateStatus::Revocado)
                || certificate.is_retired()
            {
                continue;
            }
            if certificate.expires_at - now <= within {
                let certificate = if status != certificate.status {
                    self.refresh_status(certificate.id).await?
                } else {
                    certificate
                };
                expiring.push(certificate);
            }
        }
        expiring.sort_by_key(|c| c.expires_at);
        Ok(expiring)
    }

    pub fn is_valid_for_signing(&self, certificate: &Certificate, class: DocumentClass) -> bool {
        self.check_policy(certificate, class).is_ok() && self.check_lifecycle(certificate).is_ok()
    }

    /// Validity level gate; needs no key material and no lock
    pub fn check_policy(&self, certificate: &Certificate, class: DocumentClass) -> FirmaResult<()> {
        let actual = certificate.validity_level();
        if class.accepts(actual) {
            return Ok(());
        }
        Err(FirmaError::IncompatibleCertificate {
            document_class: class,
            required: class.required_level().unwrap_or(ValidityLevel::Government),
            actual,
        })
    }

    /// Only a current, non-retired certificate may produce new signatures
    pub fn check_lifecycle(&self, certificate: &Certificate) -> FirmaResult<()> {
        let status = self.status(certificate);
        if status != CertificateStatus::Vigente {
            return Err(FirmaError::Lifecycle {
                serial: certificate.serial_number.clone(),
                status,
            });
        }
        if certificate.is_retired() {
            return Err(FirmaError::CertificateRetired {
                serial: certificate.serial_number.clone(),
            });
        }
        Ok(())
    }

    pub fn check_signing_eligibility(
        &self,
        certificate: &Certificate,
        class: DocumentClass,
    ) -> FirmaResult<()> {
        self.check_policy(certificate, class)?;
        self.check_lifecycle(certificate)
    }

    /// Shared guard held while a signature is produced with this certificate.
    /// Refused while a renewal or revocation of it is waiting on its authority.
    pub async fn signing_gate(&self, id: Uuid) -> FirmaResult<SigningGuard<'_>> {
        let lock = self.gates.handle(id)?;
        let guard = self.gates.hold(id, lock.read_owned().await);
        if self.is_in_flight(id)? {
            let certificate = self.get_certificate(id).await?;
            return Err(FirmaError::CertificateBusy {
                serial: certificate.serial_number,
            });
        }
        Ok(guard)
    }

    async fn mutation_gate(&self, id: Uuid) -> FirmaResult<MutationGuard<'_>> {
        let lock = self.gates.handle(id)?;
        Ok(self.gates.hold(id, lock.write_owned().await))
    }

    fn in_flight_set(&self) -> FirmaResult<std::sync::MutexGuard<'_, HashSet<Uuid>>> {
        Ok(self
            .in_flight
            .lock()
            .map_err(|e| StorageError::ConnectionError(format!("Lock poisoned: {}", e)))?)
    }

    fn is_in_flight(&self, id: Uuid) -> FirmaResult<bool> {
        Ok(self.in_flight_set()?.contains(&id))
    }

    /// Wait for running signatures, then mark the certificate busy.
    /// The gate is released on return; the marker keeps new signers out.
    async fn begin_mutation(&self, id: Uuid) -> FirmaResult<(InFlight<'_>, Certificate)> {
        let _gate = self.mutation_gate(id).await?;
        let certificate = self.get_certificate(id).await?;
        if !self.in_flight_set()?.insert(id) {
            return Err(FirmaError::CertificateBusy {
                serial: certificate.serial_number,
            });
        }
        Ok((
            InFlight {
                set: &self.in_flight,
                id,
            },
            certificate,
        ))
    }

    /// Issue a successor with the same subject; the old certificate is retired for signing
    pub async fn renew(&self, id: Uuid, actor: &str) -> FirmaResult<IssuanceOutcome> {
        let (_marker, certificate) = self.begin_mutation(id).await?;

        if certificate.is_retired() {
            return Err(FirmaError::CertificateRetired {
                serial: certificate.serial_number,
            });
        }
        let status = self.status(&certificate);
        if !matches!(
            status,
            CertificateStatus::Vigente | CertificateStatus::PorVencer
        ) {
            let error = FirmaError::Lifecycle {
                serial: certificate.serial_number.clone(),
                status,
            };
            self.audit
                .log_denied(
                    AuditAction::CertificateRenewed,
                    ResourceType::Certificate,
                    &id.to_string(),
                    Some(actor),
                    &error,
                )
                .await;
            return Err(error);
        }
        if let Some(pending) = self.store.find_pending_renewal(id).await? {
            return Err(FirmaError::RenewalPending {
                serial: certificate.serial_number,
                request_id: pending.id,
            });
        }

        // No gate held while the authority answers
        let response = self
            .verify_and_request(
                certificate.provider.as_str(),
                &certificate.subject,
                &certificate.certificate_type,
            )
            .await?;

        let _gate = self.mutation_gate(id).await?;
        self.store_response(
            response,
            certificate.provider,
            certificate.subject.clone(),
            certificate.certificate_type.clone(),
            &certificate.owner_id,
            Some(certificate.id),
        )
        .await
    }

    /// Revoke a certificate at its authority and locally; revoking twice is a no-op
    pub async fn revoke(&self, id: Uuid, actor: &str) -> FirmaResult<Certificate> {
        let (_marker, certificate) = self.begin_mutation(id).await?;
        if certificate.is_revoked() {
            debug!("Certificate {} already revoked", certificate.serial_number);
            return Ok(certificate);
        }

        let remote_id = match (&certificate.external_id, certificate.provider) {
            (Some(external_id), _) => Some(external_id.clone()),
            (None, ProviderKind::Internal) => Some(certificate.serial_number.clone()),
            // Imported containers have no issuing endpoint to notify
            (None, _) => None,
        };
        if let Some(remote_id) = remote_id {
            self.registry
                .revoke(certificate.provider.as_str(), &remote_id)
                .await?;
        } else {
            warn!(
                "Certificate {} has no remote authority record; revoking locally",
                certificate.serial_number
            );
        }

        let _gate = self.mutation_gate(id).await?;
        let revoked = self
            .store
            .update_certificate_lifecycle(
                id,
                CertificateLifecycleUpdate {
                    status: Some(CertificateStatus::Revocado),
                    revoked_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;
        self.audit
            .log_certificate_event(
                AuditAction::CertificateRevoked,
                &revoked.id.to_string(),
                &revoked.serial_number,
                Some(actor),
            )
            .await;
        Ok(revoked)
    }

    /// Import a government certificate from a PKCS#12 container.
    /// The passphrase is only used to open the container.
    pub async fn import_pkcs12(
        &self,
        der: &[u8],
        passphrase: &str,
        owner_id: &str,
    ) -> FirmaResult<Certificate> {
        let material = extract_pkcs12(der, passphrase, &self.vault)?;
        let certificate_type = self
            .certificate_types
            .iter()
            .find(|t| t.validity_level == ValidityLevel::Government)
            .cloned()
            .unwrap_or_else(CertificateType::government);

        let mut certificate = Certificate {
            id: Uuid::new_v4(),
            serial_number: material.serial_number,
            issuer_dn: material.issuer_dn,
            subject_dn: material.subject_dn,
            subject: material.subject,
            provider: ProviderKind::Government,
            certificate_type,
            public_key_pem: material.public_key_pem,
            certificate_pem: Some(material.certificate_pem),
            sealed_private_key: material.sealed_private_key,
            status: CertificateStatus::Vigente,
            issued_at: material.not_before,
            expires_at: material.not_after,
            owner_id: owner_id.to_string(),
            external_id: None,
            renewed_from: None,
            superseded_by: None,
            revoked_at: None,
        };
        certificate.status = certificate.derive_status(Utc::now(), self.warning_threshold);

        self.store.insert_certificate(certificate.clone()).await?;
        self.audit
            .log_certificate_event(
                AuditAction::CertificateImported,
                &certificate.id.to_string(),
                &certificate.serial_number,
                Some(owner_id),
            )
            .await;
        info!(
            "Imported certificate {} for '{}'",
            certificate.serial_number, certificate.subject_dn
        );
        Ok(certificate)
    }
}
