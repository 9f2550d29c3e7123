// Durable store contract
// Engines only talk to these traits; the in-memory backend is used for tests and single-node runs

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Certificate, CertificateStatus, EstadoExpediente, EstadoFirma, Expediente,
    ExpedienteDocument, NewDocument, Oficina, OficinaId, PendingCertificateRequest,
    SignatureRecord, WorkflowMovimiento,
};

pub use memory::{MemoryBlobStore, MemoryStore};

/// Storage backend for the entities of the certificate and workflow engines
#[async_trait]
pub trait Store: Send + Sync {
    // Certificate operations
    async fn insert_certificate(&self, certificate: Certificate) -> Result<(), StorageError>;

    async fn get_certificate(&self, id: Uuid) -> Result<Option<Certificate>, StorageError>;

    async fn get_certificate_by_serial(
        &self,
        serial: &str,
    ) -> Result<Option<Certificate>, StorageError>;

    async fn list_certificates(&self, owner_id: &str) -> Result<Vec<Certificate>, StorageError>;

    async fn list_all_certificates(&self) -> Result<Vec<Certificate>, StorageError>;

    /// Update the mutable lifecycle fields of a certificate.
    /// Status moves backwards are refused with `InvalidData`.
    async fn update_certificate_lifecycle(
        &self,
        id: Uuid,
        update: CertificateLifecycleUpdate,
    ) -> Result<Certificate, StorageError>;

    // Pending issuance requests at remote authorities
    async fn insert_pending_request(
        &self,
        request: PendingCertificateRequest,
    ) -> Result<(), StorageError>;

    async fn get_pending_request(
        &self,
        id: Uuid,
    ) -> Result<Option<PendingCertificateRequest>, StorageError>;

    async fn update_pending_request(
        &self,
        request: PendingCertificateRequest,
    ) -> Result<(), StorageError>;

    /// Pending request that would renew the given certificate, if any
    async fn find_pending_renewal(
        &self,
        certificate_id: Uuid,
    ) -> Result<Option<PendingCertificateRequest>, StorageError>;

    /// Insert a renewed certificate and mark its predecessor (`renewed_from`) as superseded.
    ///
    /// Fails with `VersionConflict` when the predecessor already has a successor;
    /// nothing is written in that case. Returns the updated predecessor.
    async fn insert_successor(&self, successor: Certificate) -> Result<Certificate, StorageError>;

    // Signature records (append-only)
    /// Store a signature record together with the signature state of the documents it covers.
    /// Either both are written or neither.
    async fn record_signature(
        &self,
        record: SignatureRecord,
        updates: Vec<SignatureStateUpdate>,
    ) -> Result<Vec<ExpedienteDocument>, StorageError>;

    async fn get_signature(&self, id: Uuid) -> Result<Option<SignatureRecord>, StorageError>;

    async fn list_signatures_for_document(
        &self,
        document_id: Uuid,
    ) -> Result<Vec<SignatureRecord>, StorageError>;

    // Offices
    async fn upsert_oficina(&self, oficina: Oficina) -> Result<(), StorageError>;

    async fn get_oficina(&self, id: OficinaId) -> Result<Option<Oficina>, StorageError>;

    async fn list_oficinas(&self) -> Result<Vec<Oficina>, StorageError>;

    // Expedientes
    /// Allocate the next human readable expediente number
    async fn next_expediente_numero(&self) -> Result<u64, StorageError>;

    async fn insert_expediente(&self, expediente: Expediente) -> Result<(), StorageError>;

    async fn get_expediente(&self, id: Uuid) -> Result<Option<Expediente>, StorageError>;

    /// Commit a state change and its movement record in one transaction.
    ///
    /// Fails with `VersionConflict` when the stored expediente no longer has
    /// `expected_version` or `expected_estado`; nothing is written in that case.
    async fn commit_transition(&self, commit: TransitionCommit) -> Result<(), StorageError>;

    async fn list_movimientos(
        &self,
        expediente_id: Uuid,
    ) -> Result<Vec<WorkflowMovimiento>, StorageError>;

    // Documents
    /// Attach a document, assigning `numero_foja = max + 1` atomically per expediente.
    ///
    /// Fails with `VersionConflict` when the expediente moved past `expected_version`
    /// or `expected_estado`. Bumps the expediente version.
    async fn insert_document(
        &self,
        commit: DocumentCommit,
    ) -> Result<ExpedienteDocument, StorageError>;

    async fn get_document(&self, id: Uuid) -> Result<Option<ExpedienteDocument>, StorageError>;

    /// Documents of an expediente ordered by folio
    async fn list_documents(
        &self,
        expediente_id: Uuid,
    ) -> Result<Vec<ExpedienteDocument>, StorageError>;

    /// Compare-and-set of the signature state of several documents at once
    async fn update_signature_state(
        &self,
        updates: Vec<SignatureStateUpdate>,
    ) -> Result<Vec<ExpedienteDocument>, StorageError>;
}

/// Blob storage for original and signed document bytes
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write a blob; existing keys are never overwritten
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
}

/// Mutable lifecycle fields of a certificate
#[derive(Debug, Clone, Default)]
pub struct CertificateLifecycleUpdate {
    pub status: Option<CertificateStatus>,
    pub superseded_by: Option<Uuid>,
    pub revoked_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// A workflow transition ready to be committed
#[derive(Debug, Clone)]
pub struct TransitionCommit {
    pub expediente: Expediente,
    pub expected_version: u64,
    pub expected_estado: EstadoExpediente,
    pub movimiento: WorkflowMovimiento,
}

/// A document upload; `transition` is the movement it causes, committed with it
#[derive(Debug, Clone)]
pub struct DocumentCommit {
    pub expediente_id: Uuid,
    pub expected_version: u64,
    pub expected_estado: EstadoExpediente,
    pub document: NewDocument,
    pub transition: Option<WorkflowMovimiento>,
}

/// Signature state change of one document
#[derive(Debug, Clone)]
pub struct SignatureStateUpdate {
    pub document_id: Uuid,
    pub expected: Vec<EstadoFirma>,
    pub new_state: EstadoFirma,
    pub signature_id: Option<Uuid>,
    pub certificate_id: Option<Uuid>,
    pub firmado_por: Option<String>,
    pub motivo_rechazo: Option<String>,
}

/// Storage errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Item not found")]
    NotFound,
    #[error("Item already exists")]
    AlreadyExists,
    #[error("Stored version changed since it was read")]
    VersionConflict,
    #[error("Connection error: {0}")]
    ConnectionError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}
