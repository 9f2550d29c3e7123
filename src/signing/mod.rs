// Document signing and signature verification

pub mod engine;
pub mod hash;
pub mod verifier;

pub use engine::SigningEngine;
pub use hash::{combined_hash, combined_hash_hex, sha256, sha256_hex};
pub use verifier::{SignatureVerifier, VerificationReport};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::audit::AuditLogger;
    use crate::certs::{CertificateAuthorityRegistry, CertificateLifecycleManager, KeyVault};
    use crate::error::FirmaError;
    use crate::models::{
        AppConfig, Certificate, CertificateStatus, EstadoExpediente, EstadoFirma, Expediente,
        NewDocument, Prioridad, SubjectIdentity, TipoDocumento,
    };
    use crate::models::{
        ExpedienteDocument, Oficina, OficinaId, PendingCertificateRequest, SignatureRecord,
        WorkflowMovimiento,
    };
    use crate::storage::{
        BlobStore, CertificateLifecycleUpdate, DocumentCommit, MemoryBlobStore, MemoryStore,
        SignatureStateUpdate, StorageError, Store, TransitionCommit,
    };
    use async_trait::async_trait;
    use std::sync::Arc;
    use uuid::Uuid;

    struct Fixture {
        store: Arc<MemoryStore>,
        blobs: Arc<MemoryBlobStore>,
        lifecycle: Arc<CertificateLifecycleManager>,
        engine: SigningEngine,
        verifier: SignatureVerifier,
        expediente_id: Uuid,
    }

    async fn fixture() -> Fixture {
        fixture_over(|store| store as Arc<dyn Store>).await
    }

    /// The signing engine talks to `wrap(store)`; everything else to the plain store
    async fn fixture_over(wrap: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn Store>) -> Fixture {
        let config = AppConfig::default();
        let vault = Arc::new(KeyVault::from_secret("secret", b"salt", 1_000).unwrap());
        let registry = CertificateAuthorityRegistry::from_config(&config, vault.clone()).unwrap();
        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let audit = AuditLogger::in_memory();
        let lifecycle = Arc::new(CertificateLifecycleManager::new(
            registry,
            store.clone(),
            vault.clone(),
            audit.clone(),
            &config,
        ));
        let engine = SigningEngine::new(
            lifecycle.clone(),
            wrap(store.clone()),
            blobs.clone(),
            vault,
            audit.clone(),
        );
        let verifier = SignatureVerifier::new(lifecycle.clone(), store.clone(), audit);

        let now = Utc::now();
        let expediente = Expediente {
            id: Uuid::new_v4(),
            numero: "EXP-1".to_string(),
            titulo: "Habilitacion comercial".to_string(),
            estado: EstadoExpediente::Iniciado,
            prioridad: Prioridad::Normal,
            oficina_origen_id: 1,
            oficina_actual_id: 1,
            creado_por: "ana".to_string(),
            created_at: now,
            updated_at: now,
            version: 0,
        };
        let expediente_id = expediente.id;
        store.insert_expediente(expediente).await.unwrap();

        Fixture {
            store,
            blobs,
            lifecycle,
            engine,
            verifier,
            expediente_id,
        }
    }

    impl Fixture {
        async fn certificate(&self) -> Certificate {
            self.lifecycle
                .request_certificate("internal", SubjectIdentity::new("Ana"), "interno", "ana")
                .await
                .unwrap()
                .certificate()
                .cloned()
                .unwrap()
        }

        async fn document(&self, nombre: &str, tipo: TipoDocumento, content: &[u8]) -> Uuid {
            let id = Uuid::new_v4();
            let blob_key = format!("documents/{}", id);
            self.blobs.put(&blob_key, content.to_vec()).await.unwrap();
            self.attach(id, nombre, tipo, sha256_hex(content), blob_key)
                .await;
            id
        }

        async fn attach(
            &self,
            id: Uuid,
            nombre: &str,
            tipo: TipoDocumento,
            content_hash: String,
            blob_key: String,
        ) {
            let current = self
                .store
                .get_expediente(self.expediente_id)
                .await
                .unwrap()
                .unwrap();
            self.store
                .insert_document(DocumentCommit {
                    expediente_id: self.expediente_id,
                    expected_version: current.version,
                    expected_estado: current.estado,
                    document: NewDocument {
                        id,
                        nombre: nombre.to_string(),
                        tipo,
                        content_hash,
                        blob_key,
                        cargado_por: "ana".to_string(),
                    },
                    transition: None,
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_sign_and_verify_bytes() {
        let f = fixture().await;
        let certificate = f.certificate().await;

        let record = f.engine.sign(b"Informe final", &certificate).await.unwrap();
        assert_eq!(record.algorithm, "RSA-SHA256");
        assert_eq!(record.certificate_serial, certificate.serial_number);
        assert!(!record.signature_hex.contains("PRIVATE"));

        let report = f.verifier.verify(b"Informe final", &record).await.unwrap();
        assert!(report.is_valid());
        assert_eq!(report.certificate_status, Some(CertificateStatus::Vigente));

        let tampered = f.verifier.verify(b"Informe finaL", &record).await.unwrap();
        assert!(!tampered.integrity_valid);
        assert!(tampered.authenticity_valid);

        assert!(matches!(
            f.verifier.verify_strict(b"Informe finaL", &record).await,
            Err(FirmaError::Integrity(_))
        ));
    }

    #[tokio::test]
    async fn test_report_follows_certificate_id_not_serial() {
        let f = fixture().await;
        let certificate = f.certificate().await;
        let mut record = f.engine.sign(b"acta", &certificate).await.unwrap();
        // Serials are only unique per issuer
        record.certificate_serial = "01".to_string();

        f.lifecycle.revoke(certificate.id, "admin").await.unwrap();
        let report = f.verifier.verify(b"acta", &record).await.unwrap();
        assert_eq!(report.certificate_status, Some(CertificateStatus::Revocado));
    }

    #[tokio::test]
    async fn test_forged_signature_fails_authenticity_only() {
        let f = fixture().await;
        let certificate = f.certificate().await;
        let mut record = f.engine.sign(b"contenido", &certificate).await.unwrap();
        let mut bytes = hex::decode(&record.signature_hex).unwrap();
        bytes[0] ^= 0x01;
        record.signature_hex = hex::encode(bytes);

        let report = f.verifier.verify(b"contenido", &record).await.unwrap();
        assert!(report.integrity_valid);
        assert!(!report.authenticity_valid);
    }

    #[tokio::test]
    async fn test_batch_order_is_signed() {
        let f = fixture().await;
        let certificate = f.certificate().await;
        let record = f
            .engine
            .sign_batch(&[b"d1".as_slice(), b"d2".as_slice()], &certificate)
            .await
            .unwrap();

        let ok = f
            .verifier
            .verify_batch(&[b"d1".as_slice(), b"d2".as_slice()], &record)
            .await
            .unwrap();
        assert!(ok.is_valid());

        let reordered = vec![sha256_hex(b"d2"), sha256_hex(b"d1")];
        let report = f.verifier.verify_hashes(&reordered, &record).await.unwrap();
        assert!(!report.is_valid());
        assert!(!report.integrity_valid);
    }

    #[tokio::test]
    async fn test_sign_document_marks_firmado_and_keeps_original() {
        let f = fixture().await;
        let certificate = f.certificate().await;
        let doc = f
            .document("Informe.pdf", TipoDocumento::Informe, b"%PDF informe")
            .await;

        let record = f
            .engine
            .sign_document(doc, certificate.id, "ana")
            .await
            .unwrap();
        let stored = f.store.get_document(doc).await.unwrap().unwrap();
        assert_eq!(stored.estado_firma, EstadoFirma::Firmado);
        assert_eq!(stored.signature_id, Some(record.id));
        assert_eq!(
            f.blobs.get(&stored.blob_key).await.unwrap().unwrap(),
            b"%PDF informe".to_vec()
        );
        let signed_key = format!("signed/{}", record.id);
        assert_eq!(record.signed_blob_key.as_deref(), Some(signed_key.as_str()));
        assert!(f.blobs.get(&signed_key).await.unwrap().is_some());

        // Re-signing appends a new record
        let again = f
            .engine
            .sign_document(doc, certificate.id, "ana")
            .await
            .unwrap();
        assert_ne!(again.id, record.id);
        assert_eq!(f.engine.list_signatures(doc).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_oficial_document_needs_government_certificate() {
        let f = fixture().await;
        let certificate = f.certificate().await;
        let doc = f
            .document("Resolucion.pdf", TipoDocumento::Oficial, b"resolucion")
            .await;

        let result = f.engine.sign_document(doc, certificate.id, "ana").await;
        assert!(matches!(
            result,
            Err(FirmaError::IncompatibleCertificate { .. })
        ));
        let stored = f.store.get_document(doc).await.unwrap().unwrap();
        assert_eq!(stored.estado_firma, EstadoFirma::Pendiente);
        assert!(f.engine.list_signatures(doc).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_with_missing_blob_changes_nothing() {
        let f = fixture().await;
        let certificate = f.certificate().await;
        let first = f.document("a.pdf", TipoDocumento::Nota, b"a").await;
        let second = f.document("b.pdf", TipoDocumento::Nota, b"b").await;

        // A document whose content never reached blob storage
        let orphan = Uuid::new_v4();
        f.attach(
            orphan,
            "c.pdf",
            TipoDocumento::Nota,
            sha256_hex(b"c"),
            "documents/missing".to_string(),
        )
        .await;

        let result = f
            .engine
            .sign_documents_batch(&[first, second, orphan], certificate.id, "ana")
            .await;
        assert!(matches!(result, Err(FirmaError::NotFound(_))));
        for id in [first, second, orphan] {
            let doc = f.store.get_document(id).await.unwrap().unwrap();
            assert_eq!(doc.estado_firma, EstadoFirma::Pendiente);
        }

        let record = f
            .engine
            .sign_documents_batch(&[first, second], certificate.id, "ana")
            .await
            .unwrap();
        assert_eq!(record.constituent_hashes.as_ref().unwrap().len(), 2);
        assert_eq!(record.document_ids, vec![first, second]);
    }

    #[tokio::test]
    async fn test_rejected_document_cannot_be_signed() {
        let f = fixture().await;
        let certificate = f.certificate().await;
        let doc = f.document("memo.pdf", TipoDocumento::Memorandum, b"memo").await;

        let rejected = f
            .engine
            .reject_document(doc, "jefe", "firma ilegible")
            .await
            .unwrap();
        assert_eq!(rejected.estado_firma, EstadoFirma::Rechazado);
        assert_eq!(rejected.motivo_rechazo.as_deref(), Some("firma ilegible"));

        assert!(matches!(
            f.engine.sign_document(doc, certificate.id, "ana").await,
            Err(FirmaError::DocumentNotSignable { .. })
        ));
        assert!(matches!(
            f.engine.reject_document(doc, "jefe", "otra vez").await,
            Err(FirmaError::DocumentNotSignable { .. })
        ));
    }

    #[tokio::test]
    async fn test_revoked_certificate_still_verifies_but_cannot_sign() {
        let f = fixture().await;
        let certificate = f.certificate().await;
        let record = f.engine.sign(b"acta", &certificate).await.unwrap();

        f.lifecycle.revoke(certificate.id, "admin").await.unwrap();

        let report = f.verifier.verify(b"acta", &record).await.unwrap();
        assert!(report.is_valid());
        assert_eq!(report.certificate_status, Some(CertificateStatus::Revocado));

        assert!(matches!(
            f.engine.sign(b"acta", &certificate).await,
            Err(FirmaError::Lifecycle {
                status: CertificateStatus::Revocado,
                ..
            })
        ));
    }

    /// Rejects every covered document right before the signature is recorded
    struct RejectingStore {
        inner: Arc<MemoryStore>,
    }

    #[async_trait]
    impl Store for RejectingStore {
        async fn insert_certificate(&self, certificate: Certificate) -> Result<(), StorageError> {
            self.inner.insert_certificate(certificate).await
        }

        async fn get_certificate(&self, id: Uuid) -> Result<Option<Certificate>, StorageError> {
            self.inner.get_certificate(id).await
        }

        async fn get_certificate_by_serial(
            &self,
            serial: &str,
        ) -> Result<Option<Certificate>, StorageError> {
            self.inner.get_certificate_by_serial(serial).await
        }

        async fn list_certificates(&self, owner_id: &str) -> Result<Vec<Certificate>, StorageError> {
            self.inner.list_certificates(owner_id).await
        }

        async fn list_all_certificates(&self) -> Result<Vec<Certificate>, StorageError> {
            self.inner.list_all_certificates().await
        }

        async fn update_certificate_lifecycle(
            &self,
            id: Uuid,
            update: CertificateLifecycleUpdate,
        ) -> Result<Certificate, StorageError> {
            self.inner.update_certificate_lifecycle(id, update).await
        }

        async fn insert_pending_request(
            &self,
            request: PendingCertificateRequest,
        ) -> Result<(), StorageError> {
            self.inner.insert_pending_request(request).await
        }

        async fn get_pending_request(
            &self,
            id: Uuid,
        ) -> Result<Option<PendingCertificateRequest>, StorageError> {
            self.inner.get_pending_request(id).await
        }

        async fn update_pending_request(
            &self,
            request: PendingCertificateRequest,
        ) -> Result<(), StorageError> {
            self.inner.update_pending_request(request).await
        }

        async fn find_pending_renewal(
            &self,
            certificate_id: Uuid,
        ) -> Result<Option<PendingCertificateRequest>, StorageError> {
            self.inner.find_pending_renewal(certificate_id).await
        }

        async fn insert_successor(
            &self,
            successor: Certificate,
        ) -> Result<Certificate, StorageError> {
            self.inner.insert_successor(successor).await
        }

        async fn record_signature(
            &self,
            record: SignatureRecord,
            updates: Vec<SignatureStateUpdate>,
        ) -> Result<Vec<ExpedienteDocument>, StorageError> {
            let rejections = updates
                .iter()
                .map(|u| SignatureStateUpdate {
                    document_id: u.document_id,
                    expected: vec![EstadoFirma::Pendiente],
                    new_state: EstadoFirma::Rechazado,
                    signature_id: None,
                    certificate_id: None,
                    firmado_por: None,
                    motivo_rechazo: Some("rechazado en paralelo".to_string()),
                })
                .collect();
            self.inner.update_signature_state(rejections).await?;
            self.inner.record_signature(record, updates).await
        }

        async fn get_signature(&self, id: Uuid) -> Result<Option<SignatureRecord>, StorageError> {
            self.inner.get_signature(id).await
        }

        async fn list_signatures_for_document(
            &self,
            document_id: Uuid,
        ) -> Result<Vec<SignatureRecord>, StorageError> {
            self.inner.list_signatures_for_document(document_id).await
        }

        async fn upsert_oficina(&self, oficina: Oficina) -> Result<(), StorageError> {
            self.inner.upsert_oficina(oficina).await
        }

        async fn get_oficina(&self, id: OficinaId) -> Result<Option<Oficina>, StorageError> {
            self.inner.get_oficina(id).await
        }

        async fn list_oficinas(&self) -> Result<Vec<Oficina>, StorageError> {
            self.inner.list_oficinas().await
        }

        async fn next_expediente_numero(&self) -> Result<u64, StorageError> {
            self.inner.next_expediente_numero().await
        }

        async fn insert_expediente(&self, expediente: Expediente) -> Result<(), StorageError> {
            self.inner.insert_expediente(expediente).await
        }

        async fn get_expediente(&self, id: Uuid) -> Result<Option<Expediente>, StorageError> {
            self.inner.get_expediente(id).await
        }

        async fn commit_transition(&self, commit: TransitionCommit) -> Result<(), StorageError> {
            self.inner.commit_transition(commit).await
        }

        async fn list_movimientos(
            &self,
            expediente_id: Uuid,
        ) -> Result<Vec<WorkflowMovimiento>, StorageError> {
            self.inner.list_movimientos(expediente_id).await
        }

        async fn insert_document(
            &self,
            commit: DocumentCommit,
        ) -> Result<ExpedienteDocument, StorageError> {
            self.inner.insert_document(commit).await
        }

        async fn get_document(&self, id: Uuid) -> Result<Option<ExpedienteDocument>, StorageError> {
            self.inner.get_document(id).await
        }

        async fn list_documents(
            &self,
            expediente_id: Uuid,
        ) -> Result<Vec<ExpedienteDocument>, StorageError> {
            self.inner.list_documents(expediente_id).await
        }

        async fn update_signature_state(
            &self,
            updates: Vec<SignatureStateUpdate>,
        ) -> Result<Vec<ExpedienteDocument>, StorageError> {
            self.inner.update_signature_state(updates).await
        }
    }

    #[tokio::test]
    async fn test_rejection_during_signing_leaves_no_dangling_record() {
        let f = fixture_over(|inner| Arc::new(RejectingStore { inner }) as Arc<dyn Store>).await;
        let certificate = f.certificate().await;
        let doc = f.document("nota.pdf", TipoDocumento::Nota, b"nota").await;

        let result = f.engine.sign_document(doc, certificate.id, "ana").await;
        assert!(matches!(
            result,
            Err(FirmaError::DocumentNotSignable { document_id, .. }) if document_id == doc
        ));

        let stored = f.store.get_document(doc).await.unwrap().unwrap();
        assert_eq!(stored.estado_firma, EstadoFirma::Rechazado);
        assert!(stored.signature_id.is_none());
        assert!(f.store.list_signatures_for_document(doc).await.unwrap().is_empty());
    }
}
