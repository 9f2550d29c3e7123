// In-memory storage backend implementation
// Uses HashMap with Mutex for thread-safe access; each method is one critical section,
// which gives the per-expediente atomic counters and multi-row commits of a transaction

use super::*;
use async_trait::async_trait;
use chrono::Utc;
use crate::models::RequestStatus;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Workflow rows live under one lock so transitions commit atomically
#[derive(Default)]
struct WorkflowTables {
    expedientes: HashMap<Uuid, Expediente>,
    documents: HashMap<Uuid, ExpedienteDocument>,
    documents_by_expediente: HashMap<Uuid, Vec<Uuid>>,
    /// Highest folio assigned per expediente
    foja_counters: HashMap<Uuid, u32>,
    movimientos: HashMap<Uuid, Vec<WorkflowMovimiento>>,
    next_numero: u64,
}

/// In-memory storage backend
pub struct MemoryStore {
    certificates: Arc<Mutex<HashMap<Uuid, Certificate>>>,
    serial_index: Arc<Mutex<HashMap<String, Uuid>>>,
    pending_requests: Arc<Mutex<HashMap<Uuid, PendingCertificateRequest>>>,
    signatures: Arc<Mutex<HashMap<Uuid, SignatureRecord>>>,
    oficinas: Arc<Mutex<HashMap<OficinaId, Oficina>>>,
    workflow: Arc<Mutex<WorkflowTables>>,
}

impl MemoryStore {
    /// Create a new in-memory storage backend
    pub fn new() -> Self {
        Self {
            certificates: Arc::new(Mutex::new(HashMap::new())),
            serial_index: Arc::new(Mutex::new(HashMap::new())),
            pending_requests: Arc::new(Mutex::new(HashMap::new())),
            signatures: Arc::new(Mutex::new(HashMap::new())),
            oficinas: Arc::new(Mutex::new(HashMap::new())),
            workflow: Arc::new(Mutex::new(WorkflowTables::default())),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::ConnectionError(format!("Lock poisoned: {}", e)))
}

#[async_trait]
impl Store for MemoryStore {
    // Certificate operations
    async fn insert_certificate(&self, certificate: Certificate) -> Result<(), StorageError> {
        let mut certificates = lock(&self.certificates)?;
        let mut serials = lock(&self.serial_index)?;

        if certificates.contains_key(&certificate.id)
            || serials.contains_key(&certificate.serial_number)
        {
            return Err(StorageError::AlreadyExists);
        }

        serials.insert(certificate.serial_number.clone(), certificate.id);
        certificates.insert(certificate.id, certificate);
        Ok(())
    }

    async fn get_certificate(&self, id: Uuid) -> Result<Option<Certificate>, StorageError> {
        let certificates = lock(&self.certificates)?;
        Ok(certificates.get(&id).cloned())
    }

    async fn get_certificate_by_serial(
        &self,
        serial: &str,
    ) -> Result<Option<Certificate>, StorageError> {
        let certificates = lock(&self.certificates)?;
        let serials = lock(&self.serial_index)?;
        Ok(serials
            .get(serial)
            .and_then(|id| certificates.get(id))
            .cloned())
    }

    async fn list_certificates(&self, owner_id: &str) -> Result<Vec<Certificate>, StorageError> {
        let certificates = lock(&self.certificates)?;
        let mut result: Vec<Certificate> = certificates
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect();
        result.sort_by_key(|c| c.issued_at);
        Ok(result)
    }

    async fn list_all_certificates(&self) -> Result<Vec<Certificate>, StorageError> {
        let certificates = lock(&self.certificates)?;
        Ok(certificates.values().cloned().collect())
    }

    async fn update_certificate_lifecycle(
        &self,
        id: Uuid,
        update: CertificateLifecycleUpdate,
    ) -> Result<Certificate, StorageError> {
        let mut certificates = lock(&self.certificates)?;
        let certificate = certificates.get_mut(&id).ok_or(StorageError::NotFound)?;

        if let Some(status) = update.status {
            if !certificate.status.can_advance_to(status) {
                return Err(StorageError::InvalidData(format!(
                    "certificate status cannot move from {} to {}",
                    certificate.status, status
                )));
            }
            certificate.status = status;
        }
        if let Some(successor) = update.superseded_by {
            if certificate.superseded_by.is_some() {
                return Err(StorageError::InvalidData(
                    "certificate already superseded".to_string(),
                ));
            }
            certificate.superseded_by = Some(successor);
        }
        if let Some(revoked_at) = update.revoked_at {
            certificate.revoked_at.get_or_insert(revoked_at);
        }

        Ok(certificate.clone())
    }

    // Pending request operations
    async fn insert_pending_request(
        &self,
        request: PendingCertificateRequest,
    ) -> Result<(), StorageError> {
        let mut requests = lock(&self.pending_requests)?;
        if requests.contains_key(&request.id) {
            return Err(StorageError::AlreadyExists);
        }
        requests.insert(request.id, request);
        Ok(())
    }

    async fn get_pending_request(
        &self,
        id: Uuid,
    ) -> Result<Option<PendingCertificateRequest>, StorageError> {
        let requests = lock(&self.pending_requests)?;
        Ok(requests.get(&id).cloned())
    }

    async fn update_pending_request(
        &self,
        request: PendingCertificateRequest,
    ) -> Result<(), StorageError> {
        let mut requests = lock(&self.pending_requests)?;
        if !requests.contains_key(&request.id) {
            return Err(StorageError::NotFound);
        }
        requests.insert(request.id, request);
        Ok(())
    }

    async fn find_pending_renewal(
        &self,
        certificate_id: Uuid,
    ) -> Result<Option<PendingCertificateRequest>, StorageError> {
        let requests = lock(&self.pending_requests)?;
        Ok(requests
            .values()
            .find(|r| {
                r.status == RequestStatus::Pending
                    && r.renews_certificate_id == Some(certificate_id)
            })
            .cloned())
    }

    async fn insert_successor(&self, successor: Certificate) -> Result<Certificate, StorageError> {
        let previous_id = successor.renewed_from.ok_or_else(|| {
            StorageError::InvalidData("successor without renewed_from".to_string())
        })?;
        let mut certificates = lock(&self.certificates)?;
        let mut serials = lock(&self.serial_index)?;

        if certificates.contains_key(&successor.id)
            || serials.contains_key(&successor.serial_number)
        {
            return Err(StorageError::AlreadyExists);
        }
        let previous = certificates
            .get(&previous_id)
            .ok_or(StorageError::NotFound)?;
        if previous.superseded_by.is_some() {
            return Err(StorageError::VersionConflict);
        }

        let successor_id = successor.id;
        serials.insert(successor.serial_number.clone(), successor_id);
        certificates.insert(successor_id, successor);
        let previous = certificates
            .get_mut(&previous_id)
            .ok_or(StorageError::NotFound)?;
        previous.superseded_by = Some(successor_id);
        Ok(previous.clone())
    }

    // Signature operations
    async fn record_signature(
        &self,
        record: SignatureRecord,
        updates: Vec<SignatureStateUpdate>,
    ) -> Result<Vec<ExpedienteDocument>, StorageError> {
        let mut tables = lock(&self.workflow)?;
        let mut signatures = lock(&self.signatures)?;
        if signatures.contains_key(&record.id) {
            return Err(StorageError::AlreadyExists);
        }
        validate_signature_updates(&tables, &updates)?;

        signatures.insert(record.id, record);
        Ok(apply_signature_updates(&mut tables, updates))
    }

    async fn get_signature(&self, id: Uuid) -> Result<Option<SignatureRecord>, StorageError> {
        let signatures = lock(&self.signatures)?;
        Ok(signatures.get(&id).cloned())
    }

    async fn list_signatures_for_document(
        &self,
        document_id: Uuid,
    ) -> Result<Vec<SignatureRecord>, StorageError> {
        let signatures = lock(&self.signatures)?;
        let mut result: Vec<SignatureRecord> = signatures
            .values()
            .filter(|s| s.document_ids.contains(&document_id))
            .cloned()
            .collect();
        result.sort_by_key(|s| s.timestamp);
        Ok(result)
    }

    // Office operations
    async fn upsert_oficina(&self, oficina: Oficina) -> Result<(), StorageError> {
        let mut oficinas = lock(&self.oficinas)?;
        oficinas.insert(oficina.id, oficina);
        Ok(())
    }

    async fn get_oficina(&self, id: OficinaId) -> Result<Option<Oficina>, StorageError> {
        let oficinas = lock(&self.oficinas)?;
        Ok(oficinas.get(&id).cloned())
    }

    async fn list_oficinas(&self) -> Result<Vec<Oficina>, StorageError> {
        let oficinas = lock(&self.oficinas)?;
        let mut result: Vec<Oficina> = oficinas.values().cloned().collect();
        result.sort_by_key(|o| o.id);
        Ok(result)
    }

    // Expediente operations
    async fn next_expediente_numero(&self) -> Result<u64, StorageError> {
        let mut tables = lock(&self.workflow)?;
        tables.next_numero += 1;
        Ok(tables.next_numero)
    }

    async fn insert_expediente(&self, expediente: Expediente) -> Result<(), StorageError> {
        let mut tables = lock(&self.workflow)?;
        if tables.expedientes.contains_key(&expediente.id) {
            return Err(StorageError::AlreadyExists);
        }
        tables.foja_counters.insert(expediente.id, 0);
        tables.expedientes.insert(expediente.id, expediente);
        Ok(())
    }

    async fn get_expediente(&self, id: Uuid) -> Result<Option<Expediente>, StorageError> {
        let tables = lock(&self.workflow)?;
        Ok(tables.expedientes.get(&id).cloned())
    }

    async fn commit_transition(&self, commit: TransitionCommit) -> Result<(), StorageError> {
        let mut tables = lock(&self.workflow)?;
        let id = commit.expediente.id;

        let current = tables.expedientes.get(&id).ok_or(StorageError::NotFound)?;
        if current.version != commit.expected_version || current.estado != commit.expected_estado
        {
            return Err(StorageError::VersionConflict);
        }

        let mut expediente = commit.expediente;
        expediente.version = commit.expected_version + 1;
        tables.expedientes.insert(id, expediente);
        tables
            .movimientos
            .entry(id)
            .or_default()
            .push(commit.movimiento);
        Ok(())
    }

    async fn list_movimientos(
        &self,
        expediente_id: Uuid,
    ) -> Result<Vec<WorkflowMovimiento>, StorageError> {
        let tables = lock(&self.workflow)?;
        Ok(tables
            .movimientos
            .get(&expediente_id)
            .cloned()
            .unwrap_or_default())
    }

    // Document operations
    async fn insert_document(
        &self,
        commit: DocumentCommit,
    ) -> Result<ExpedienteDocument, StorageError> {
        let mut tables = lock(&self.workflow)?;
        let expediente_id = commit.expediente_id;
        let current = tables
            .expedientes
            .get(&expediente_id)
            .ok_or(StorageError::NotFound)?;
        if current.version != commit.expected_version || current.estado != commit.expected_estado
        {
            return Err(StorageError::VersionConflict);
        }
        let document = commit.document;
        if tables.documents.contains_key(&document.id) {
            return Err(StorageError::AlreadyExists);
        }

        let counter = tables.foja_counters.entry(expediente_id).or_insert(0);
        *counter += 1;
        let numero_foja = *counter;

        let now = Utc::now();
        let stored = ExpedienteDocument {
            id: document.id,
            expediente_id,
            nombre: document.nombre,
            numero_foja,
            tipo: document.tipo,
            content_hash: document.content_hash,
            blob_key: document.blob_key,
            estado_firma: EstadoFirma::Pendiente,
            firmado_por: None,
            signature_id: None,
            certificate_id: None,
            motivo_rechazo: None,
            cargado_por: document.cargado_por,
            created_at: now,
            updated_at: now,
        };

        tables
            .documents_by_expediente
            .entry(expediente_id)
            .or_default()
            .push(stored.id);
        tables.documents.insert(stored.id, stored.clone());
        if let Some(expediente) = tables.expedientes.get_mut(&expediente_id) {
            expediente.version += 1;
            expediente.updated_at = now;
            if let Some(movimiento) = &commit.transition {
                expediente.estado = movimiento.estado_nuevo;
                expediente.oficina_actual_id = movimiento.oficina_destino_id;
            }
        }
        if let Some(movimiento) = commit.transition {
            tables
                .movimientos
                .entry(expediente_id)
                .or_default()
                .push(movimiento);
        }

        Ok(stored)
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<ExpedienteDocument>, StorageError> {
        let tables = lock(&self.workflow)?;
        Ok(tables.documents.get(&id).cloned())
    }

    async fn list_documents(
        &self,
        expediente_id: Uuid,
    ) -> Result<Vec<ExpedienteDocument>, StorageError> {
        let tables = lock(&self.workflow)?;
        let mut result: Vec<ExpedienteDocument> = tables
            .documents_by_expediente
            .get(&expediente_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| tables.documents.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        result.sort_by_key(|d| d.numero_foja);
        Ok(result)
    }

    async fn update_signature_state(
        &self,
        updates: Vec<SignatureStateUpdate>,
    ) -> Result<Vec<ExpedienteDocument>, StorageError> {
        let mut tables = lock(&self.workflow)?;
        validate_signature_updates(&tables, &updates)?;
        Ok(apply_signature_updates(&mut tables, updates))
    }
}

/// Every row must be in one of its expected states before any of them changes
fn validate_signature_updates(
    tables: &WorkflowTables,
    updates: &[SignatureStateUpdate],
) -> Result<(), StorageError> {
    for update in updates {
        let document = tables
            .documents
            .get(&update.document_id)
            .ok_or(StorageError::NotFound)?;
        if !update.expected.contains(&document.estado_firma) {
            return Err(StorageError::VersionConflict);
        }
    }
    Ok(())
}

fn apply_signature_updates(
    tables: &mut WorkflowTables,
    updates: Vec<SignatureStateUpdate>,
) -> Vec<ExpedienteDocument> {
    let now = Utc::now();
    let mut result = Vec::with_capacity(updates.len());
    for update in updates {
        if let Some(document) = tables.documents.get_mut(&update.document_id) {
            document.estado_firma = update.new_state;
            if update.signature_id.is_some() {
                document.signature_id = update.signature_id;
                document.certificate_id = update.certificate_id;
                document.firmado_por = update.firmado_por;
            }
            if update.motivo_rechazo.is_some() {
                document.motivo_rechazo = update.motivo_rechazo;
            }
            document.updated_at = now;
            result.push(document.clone());
        }
    }
    result
}

/// In-memory blob storage
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let mut blobs = lock(&self.blobs)?;
        if blobs.contains_key(key) {
            return Err(StorageError::AlreadyExists);
        }
        blobs.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let blobs = lock(&self.blobs)?;
        Ok(blobs.get(key).cloned())
    }
}
