// Signature verification
// Integrity (hash) and authenticity (signature) are reported separately; public material only

use chrono::{DateTime, Utc};
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use serde::Serialize;
use sha2::Sha256;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::hash::{combined_hash_hex, decode_digest, sha256_hex};
use crate::audit::{AuditAction, AuditEntry, AuditLevel, AuditLogger, ResourceType};
use crate::certs::CertificateLifecycleManager;
use crate::error::{FirmaError, FirmaResult};
use crate::models::{ALGORITHM_RSA_SHA256, CertificateStatus, SignatureRecord};
use crate::storage::Store;

/// Outcome of checking a signature against supplied content
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub signature_id: Uuid,
    /// Supplied content hashes to the recorded hash
    pub integrity_valid: bool,
    /// Recorded hash carries a valid signature under the embedded public key
    pub authenticity_valid: bool,
    pub computed_hash: String,
    pub recorded_hash: String,
    pub certificate_serial: String,
    /// Current lifecycle status of the signing certificate, if it is known here
    pub certificate_status: Option<CertificateStatus>,
    pub certificate_retired: bool,
    pub verified_at: DateTime<Utc>,
}

impl VerificationReport {
    pub fn is_valid(&self) -> bool {
        self.integrity_valid && self.authenticity_valid
    }
}

pub struct SignatureVerifier {
    lifecycle: Arc<CertificateLifecycleManager>,
    store: Arc<dyn Store>,
    audit: AuditLogger,
}

impl SignatureVerifier {
    pub fn new(
        lifecycle: Arc<CertificateLifecycleManager>,
        store: Arc<dyn Store>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            lifecycle,
            store,
            audit,
        }
    }

    /// Verify a single-document signature against `bytes`
    pub async fn verify(
        &self,
        bytes: &[u8],
        record: &SignatureRecord,
    ) -> FirmaResult<VerificationReport> {
        if record.is_batch() {
            return Err(FirmaError::Validation(
                "batch signatures are verified against the ordered document list".to_string(),
            ));
        }
        let computed = sha256_hex(bytes);
        let integrity = computed == record.document_hash;
        self.report(record, computed, integrity).await
    }

    /// Verify a batch signature against the documents in signing order
    pub async fn verify_batch(
        &self,
        documents: &[&[u8]],
        record: &SignatureRecord,
    ) -> FirmaResult<VerificationReport> {
        let hashes: Vec<String> = documents.iter().map(|d| sha256_hex(d)).collect();
        self.verify_hashes(&hashes, record).await
    }

    /// Verify against already computed hashes; order matters for batch records
    pub async fn verify_hashes(
        &self,
        hashes: &[String],
        record: &SignatureRecord,
    ) -> FirmaResult<VerificationReport> {
        let (computed, integrity) = match &record.constituent_hashes {
            Some(constituents) => {
                let computed = combined_hash_hex(hashes)?;
                let integrity =
                    hashes == constituents.as_slice() && computed == record.document_hash;
                (computed, integrity)
            }
            None => match hashes {
                [single] => {
                    decode_digest(single)?;
                    (single.to_lowercase(), single.eq_ignore_ascii_case(&record.document_hash))
                }
                _ => {
                    return Err(FirmaError::Validation(
                        "a single-document signature is verified against exactly one hash"
                            .to_string(),
                    ));
                }
            },
        };
        self.report(record, computed, integrity).await
    }

    /// Like `verify`, but a hash mismatch is an `Integrity` error
    pub async fn verify_strict(
        &self,
        bytes: &[u8],
        record: &SignatureRecord,
    ) -> FirmaResult<VerificationReport> {
        let report = self.verify(bytes, record).await?;
        if !report.integrity_valid {
            return Err(FirmaError::Integrity(format!(
                "content hash {} does not match signed hash {}",
                report.computed_hash, report.recorded_hash
            )));
        }
        Ok(report)
    }

    /// Load a stored record and verify it against `bytes`
    pub async fn verify_stored(
        &self,
        signature_id: Uuid,
        bytes: &[u8],
    ) -> FirmaResult<VerificationReport> {
        let record = self
            .store
            .get_signature(signature_id)
            .await?
            .ok_or_else(|| FirmaError::NotFound(format!("signature {}", signature_id)))?;
        self.verify(bytes, &record).await
    }

    async fn report(
        &self,
        record: &SignatureRecord,
        computed_hash: String,
        integrity_valid: bool,
    ) -> FirmaResult<VerificationReport> {
        let authenticity_valid = check_authenticity(record);
        let certificate = self.store.get_certificate(record.certificate_id).await?;

        let report = VerificationReport {
            signature_id: record.id,
            integrity_valid,
            authenticity_valid,
            computed_hash,
            recorded_hash: record.document_hash.clone(),
            certificate_serial: record.certificate_serial.clone(),
            certificate_status: certificate.as_ref().map(|c| self.lifecycle.status(c)),
            certificate_retired: certificate.as_ref().is_some_and(|c| c.is_retired()),
            verified_at: Utc::now(),
        };

        let mut entry = AuditEntry::builder(AuditAction::SignatureVerified, ResourceType::Signature)
            .resource_id(record.id.to_string())
            .success(report.is_valid())
            .metadata("integrity", report.integrity_valid.to_string())
            .metadata("authenticity", report.authenticity_valid.to_string());
        if !report.is_valid() {
            entry = entry.level(AuditLevel::Warning);
        }
        self.audit.log(entry.build()).await;

        debug!(
            "Signature {} verified: integrity={} authenticity={}",
            record.id, report.integrity_valid, report.authenticity_valid
        );
        Ok(report)
    }
}

/// Check the recorded signature over the recorded hash with the embedded public key
fn check_authenticity(record: &SignatureRecord) -> bool {
    if record.algorithm != ALGORITHM_RSA_SHA256 {
        warn!("Unsupported signature algorithm '{}'", record.algorithm);
        return false;
    }
    let Ok(digest) = decode_digest(&record.document_hash) else {
        return false;
    };
    let Ok(signature) = hex::decode(&record.signature_hex) else {
        return false;
    };
    let public_key = match RsaPublicKey::from_public_key_pem(&record.public_key_pem) {
        Ok(key) => key,
        Err(e) => {
            warn!("Signature {} carries an unreadable public key: {}", record.id, e);
            return false;
        }
    };
    public_key
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature)
        .is_ok()
}
