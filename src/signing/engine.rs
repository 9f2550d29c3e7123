// Signing engine
// Policy gate, scoped key use and the pendiente -> firmado transition of documents

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use rsa::Pkcs1v15Sign;
use serde::Serialize;
use sha2::Sha256;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::hash::{DocumentDigest, combined_hash, sha256};
use crate::audit::{AuditAction, AuditLogger, ResourceType};
use crate::certs::{CertificateLifecycleManager, KeyVault};
use crate::error::{FirmaError, FirmaResult};
use crate::models::{
    ALGORITHM_RSA_SHA256, Certificate, EstadoFirma, ExpedienteDocument, SignatureExport,
    SignatureRecord,
};
use crate::storage::{BlobStore, SignatureStateUpdate, StorageError, Store};

/// Derived copy written next to the original: content plus its signature
#[derive(Debug, Serialize)]
struct SignedArtifact<'a> {
    documents: Vec<SignedContent<'a>>,
    signature: SignatureExport,
}

#[derive(Debug, Serialize)]
struct SignedContent<'a> {
    document_id: Uuid,
    nombre: &'a str,
    numero_foja: u32,
    content: String,
}

pub struct SigningEngine {
    lifecycle: Arc<CertificateLifecycleManager>,
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    vault: Arc<KeyVault>,
    audit: AuditLogger,
}

impl SigningEngine {
    pub fn new(
        lifecycle: Arc<CertificateLifecycleManager>,
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        vault: Arc<KeyVault>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            lifecycle,
            store,
            blobs,
            vault,
            audit,
        }
    }

    /// Sign raw bytes with a stored certificate; nothing is persisted
    pub async fn sign(&self, bytes: &[u8], certificate: &Certificate) -> FirmaResult<SignatureRecord> {
        let digest = sha256(bytes);
        let (signature_hex, current) = self.sign_digest(digest, certificate.id).await?;
        Ok(self.record(hex::encode(digest), signature_hex, &current, None))
    }

    /// Sign several byte strings under one combined hash, in the given order
    pub async fn sign_batch(
        &self,
        documents: &[&[u8]],
        certificate: &Certificate,
    ) -> FirmaResult<SignatureRecord> {
        if documents.is_empty() {
            return Err(FirmaError::Validation(
                "a batch signature needs at least one document".to_string(),
            ));
        }
        let digests: Vec<DocumentDigest> = documents.iter().map(|d| sha256(d)).collect();
        let combined = combined_hash(&digests);
        let (signature_hex, current) = self.sign_digest(combined, certificate.id).await?;
        Ok(self.record(
            hex::encode(combined),
            signature_hex,
            &current,
            Some(digests.iter().map(hex::encode).collect()),
        ))
    }

    fn record(
        &self,
        document_hash: String,
        signature_hex: String,
        certificate: &Certificate,
        constituent_hashes: Option<Vec<String>>,
    ) -> SignatureRecord {
        SignatureRecord {
            id: Uuid::new_v4(),
            document_hash,
            signature_hex,
            algorithm: ALGORITHM_RSA_SHA256.to_string(),
            certificate_id: certificate.id,
            certificate_serial: certificate.serial_number.clone(),
            public_key_pem: certificate.public_key_pem.clone(),
            timestamp: Utc::now(),
            constituent_hashes,
            document_ids: Vec::new(),
            signer: None,
            signed_blob_key: None,
        }
    }

    /// Produce the raw signature while holding the certificate's signing gate.
    /// The stored certificate is re-read under the gate so a finished renewal or
    /// revocation is always observed.
    async fn sign_digest(
        &self,
        digest: DocumentDigest,
        certificate_id: Uuid,
    ) -> FirmaResult<(String, Certificate)> {
        let _gate = self.lifecycle.signing_gate(certificate_id).await?;
        let certificate = self.lifecycle.get_certificate(certificate_id).await?;
        self.lifecycle.check_lifecycle(&certificate)?;

        let vault = self.vault.clone();
        let sealed = certificate.sealed_private_key.clone();
        let signature = tokio::task::spawn_blocking(move || {
            vault.with_private_key(&sealed, |key| {
                key.sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
                    .map_err(|e| FirmaError::Crypto(format!("Signing failed: {}", e)))
            })
        })
        .await
        .map_err(|e| FirmaError::Crypto(format!("Signing task failed: {}", e)))??;

        debug!(
            "Produced {} signature with certificate {}",
            ALGORITHM_RSA_SHA256, certificate.serial_number
        );
        Ok((hex::encode(signature), certificate))
    }

    async fn load_signable(&self, document_id: Uuid) -> FirmaResult<ExpedienteDocument> {
        let document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| FirmaError::NotFound(format!("document {}", document_id)))?;
        if document.estado_firma == EstadoFirma::Rechazado {
            return Err(FirmaError::DocumentNotSignable {
                document_id,
                reason: "document was rejected".to_string(),
            });
        }
        Ok(document)
    }

    /// Original bytes of a document, checked against the hash recorded at upload
    async fn load_content(&self, document: &ExpedienteDocument) -> FirmaResult<Vec<u8>> {
        let bytes = self.blobs.get(&document.blob_key).await?.ok_or_else(|| {
            FirmaError::NotFound(format!("content of document {}", document.id))
        })?;
        if hex::encode(sha256(&bytes)) != document.content_hash {
            return Err(FirmaError::Integrity(format!(
                "stored content of document {} does not match its recorded hash",
                document.id
            )));
        }
        Ok(bytes)
    }

    async fn deny(&self, document_id: Uuid, signer: &str, error: FirmaError) -> FirmaError {
        self.audit
            .log_denied(
                AuditAction::SigningDenied,
                ResourceType::Document,
                &document_id.to_string(),
                Some(signer),
                &error,
            )
            .await;
        error
    }

    /// Sign one expediente document and mark it `firmado`.
    ///
    /// Signing an already signed document adds a new record; the previous one stays.
    pub async fn sign_document(
        &self,
        document_id: Uuid,
        certificate_id: Uuid,
        signer: &str,
    ) -> FirmaResult<SignatureRecord> {
        self.sign_documents(&[document_id], certificate_id, signer)
            .await
    }

    /// Sign several documents under a single batch record, in the given order.
    /// Either every document ends up `firmado` or none changes.
    pub async fn sign_documents_batch(
        &self,
        document_ids: &[Uuid],
        certificate_id: Uuid,
        signer: &str,
    ) -> FirmaResult<SignatureRecord> {
        if document_ids.is_empty() {
            return Err(FirmaError::Validation(
                "a batch signature needs at least one document".to_string(),
            ));
        }
        self.sign_documents(document_ids, certificate_id, signer)
            .await
    }

    async fn sign_documents(
        &self,
        document_ids: &[Uuid],
        certificate_id: Uuid,
        signer: &str,
    ) -> FirmaResult<SignatureRecord> {
        if signer.trim().is_empty() {
            return Err(FirmaError::Validation("signer is required".to_string()));
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = document_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(FirmaError::Validation(format!(
                "document {} appears twice in the batch",
                duplicate
            )));
        }

        let mut documents = Vec::with_capacity(document_ids.len());
        for id in document_ids {
            documents.push(self.load_signable(*id).await?);
        }
        let certificate = self.lifecycle.get_certificate(certificate_id).await?;

        // Policy gate before any content is read or key is touched
        for document in &documents {
            if let Err(e) = self.lifecycle.check_policy(&certificate, document.clase()) {
                return Err(self.deny(document.id, signer, e).await);
            }
        }

        let mut contents = Vec::with_capacity(documents.len());
        for document in &documents {
            contents.push(self.load_content(document).await?);
        }

        let batch = documents.len() > 1;
        let digests: Vec<DocumentDigest> = contents.iter().map(|c| sha256(c)).collect();
        let signed_digest = if batch {
            combined_hash(&digests)
        } else {
            digests[0]
        };

        let (signature_hex, certificate) = match self.sign_digest(signed_digest, certificate_id).await
        {
            Ok(signed) => signed,
            Err(e) => return Err(self.deny(documents[0].id, signer, e).await),
        };

        let mut record = self.record(
            hex::encode(signed_digest),
            signature_hex,
            &certificate,
            batch.then(|| digests.iter().map(hex::encode).collect()),
        );
        record.document_ids = document_ids.to_vec();
        record.signer = Some(signer.to_string());
        let signed_key = format!("signed/{}", record.id);
        record.signed_blob_key = Some(signed_key.clone());

        let artifact = SignedArtifact {
            documents: documents
                .iter()
                .zip(&contents)
                .map(|(document, content)| SignedContent {
                    document_id: document.id,
                    nombre: &document.nombre,
                    numero_foja: document.numero_foja,
                    content: STANDARD.encode(content),
                })
                .collect(),
            signature: record.export(),
        };
        let artifact = serde_json::to_vec(&artifact)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        let updates = documents
            .iter()
            .map(|document| SignatureStateUpdate {
                document_id: document.id,
                expected: vec![EstadoFirma::Pendiente, EstadoFirma::Firmado],
                new_state: EstadoFirma::Firmado,
                signature_id: Some(record.id),
                certificate_id: Some(certificate.id),
                firmado_por: Some(signer.to_string()),
                motivo_rechazo: None,
            })
            .collect();

        self.blobs.put(&signed_key, artifact).await?;
        self.store
            .record_signature(record.clone(), updates)
            .await
            .map_err(|e| match e {
                StorageError::VersionConflict => FirmaError::DocumentNotSignable {
                    document_id: documents[0].id,
                    reason: "document was rejected while it was being signed".to_string(),
                },
                other => other.into(),
            })?;

        let ids: Vec<String> = document_ids.iter().map(Uuid::to_string).collect();
        self.audit
            .log_signature_event(
                if batch {
                    AuditAction::DocumentsBatchSigned
                } else {
                    AuditAction::DocumentSigned
                },
                &record.id.to_string(),
                &ids,
                &record.certificate_serial,
                Some(signer),
            )
            .await;
        info!(
            "{} document(s) signed by '{}' with certificate {} (signature {})",
            documents.len(),
            signer,
            record.certificate_serial,
            record.id
        );
        Ok(record)
    }

    /// Explicit rejection of a pending document
    pub async fn reject_document(
        &self,
        document_id: Uuid,
        actor: &str,
        reason: &str,
    ) -> FirmaResult<ExpedienteDocument> {
        if reason.trim().is_empty() {
            return Err(FirmaError::Validation(
                "a rejection reason is required".to_string(),
            ));
        }
        let document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| FirmaError::NotFound(format!("document {}", document_id)))?;

        let update = SignatureStateUpdate {
            document_id,
            expected: vec![EstadoFirma::Pendiente],
            new_state: EstadoFirma::Rechazado,
            signature_id: None,
            certificate_id: None,
            firmado_por: None,
            motivo_rechazo: Some(reason.to_string()),
        };
        let mut updated = match self.store.update_signature_state(vec![update]).await {
            Ok(updated) => updated,
            Err(StorageError::VersionConflict) => {
                return Err(FirmaError::DocumentNotSignable {
                    document_id,
                    reason: format!(
                        "only pendiente documents can be rejected, document is {}",
                        document.estado_firma
                    ),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let document = updated
            .pop()
            .ok_or_else(|| FirmaError::NotFound(format!("document {}", document_id)))?;

        let entry = crate::audit::AuditEntry::builder(
            AuditAction::DocumentSignatureRejected,
            ResourceType::Document,
        )
        .actor(actor)
        .resource_id(document_id.to_string())
        .metadata("reason", reason)
        .build();
        self.audit.log(entry).await;
        Ok(document)
    }

    pub async fn list_signatures(&self, document_id: Uuid) -> FirmaResult<Vec<SignatureRecord>> {
        Ok(self.store.list_signatures_for_document(document_id).await?)
    }

    pub async fn get_signature(&self, id: Uuid) -> FirmaResult<SignatureRecord> {
        self.store
            .get_signature(id)
            .await?
            .ok_or_else(|| FirmaError::NotFound(format!("signature {}", id)))
    }
}
