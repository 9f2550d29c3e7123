// Expediente workflow engine
// Folio assignment, routing between offices and the append-only movement log

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::state::{TransitionTable, WorkflowEvent};
use crate::audit::{AuditAction, AuditLogger, ResourceType};
use crate::error::{FirmaError, FirmaResult};
use crate::locks::KeyedLocks;
use crate::models::{
    EstadoExpediente, EstadoFirma, Expediente, ExpedienteDocument, NewDocument, Oficina,
    OficinaId, Prioridad, TipoDocumento, WorkflowConfig, WorkflowMovimiento,
};
use crate::signing::sha256_hex;
use crate::storage::{BlobStore, DocumentCommit, StorageError, Store, TransitionCommit};

/// Input for a new expediente
#[derive(Debug, Clone)]
pub struct NuevoExpediente {
    pub titulo: String,
    pub oficina_origen_id: OficinaId,
    pub prioridad: Prioridad,
    pub creado_por: String,
}

pub struct ExpedienteWorkflowEngine {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    audit: AuditLogger,
    table: TransitionTable,
    /// Serializes document uploads per expediente
    upload_locks: KeyedLocks<tokio::sync::Mutex<()>>,
}

impl ExpedienteWorkflowEngine {
    pub fn new(
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        audit: AuditLogger,
        config: &WorkflowConfig,
    ) -> Self {
        Self {
            store,
            blobs,
            audit,
            table: TransitionTable::from_config(config),
            upload_locks: KeyedLocks::new(),
        }
    }

    pub fn transitions(&self) -> &TransitionTable {
        &self.table
    }

    pub async fn register_oficina(&self, oficina: Oficina) -> FirmaResult<()> {
        if oficina.codigo.trim().is_empty() {
            return Err(FirmaError::Validation("office code is required".to_string()));
        }
        self.store.upsert_oficina(oficina).await?;
        Ok(())
    }

    pub async fn list_oficinas(&self) -> FirmaResult<Vec<Oficina>> {
        Ok(self.store.list_oficinas().await?)
    }

    async fn require_oficina(&self, id: OficinaId) -> FirmaResult<Oficina> {
        self.store
            .get_oficina(id)
            .await?
            .ok_or_else(|| FirmaError::Validation(format!("unknown office {}", id)))
    }

    pub async fn crear_expediente(&self, nuevo: NuevoExpediente) -> FirmaResult<Expediente> {
        if nuevo.titulo.trim().is_empty() {
            return Err(FirmaError::Validation("title is required".to_string()));
        }
        if nuevo.creado_por.trim().is_empty() {
            return Err(FirmaError::Validation("creator is required".to_string()));
        }
        self.require_oficina(nuevo.oficina_origen_id).await?;

        let numero = self.store.next_expediente_numero().await?;
        let now = Utc::now();
        let expediente = Expediente {
            id: Uuid::new_v4(),
            numero: format!("EXP-{}", numero),
            titulo: nuevo.titulo,
            estado: EstadoExpediente::Iniciado,
            prioridad: nuevo.prioridad,
            oficina_origen_id: nuevo.oficina_origen_id,
            oficina_actual_id: nuevo.oficina_origen_id,
            creado_por: nuevo.creado_por,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        self.store.insert_expediente(expediente.clone()).await?;

        self.audit
            .log_workflow_event(
                AuditAction::ExpedienteCreated,
                &expediente.id.to_string(),
                &expediente.creado_por,
                "",
                expediente.estado.as_str(),
            )
            .await;
        info!("Created expediente {} ({})", expediente.numero, expediente.id);
        Ok(expediente)
    }

    pub async fn get_expediente(&self, id: Uuid) -> FirmaResult<Expediente> {
        self.store
            .get_expediente(id)
            .await?
            .ok_or_else(|| FirmaError::NotFound(format!("expediente {}", id)))
    }

    /// Documents in folio order
    pub async fn list_documents(&self, expediente_id: Uuid) -> FirmaResult<Vec<ExpedienteDocument>> {
        self.get_expediente(expediente_id).await?;
        Ok(self.store.list_documents(expediente_id).await?)
    }

    /// Movements in commit order
    pub async fn historial(&self, expediente_id: Uuid) -> FirmaResult<Vec<WorkflowMovimiento>> {
        self.get_expediente(expediente_id).await?;
        Ok(self.store.list_movimientos(expediente_id).await?)
    }

    /// Attach a document at the next folio; the first document starts the tramite
    pub async fn add_document(
        &self,
        expediente_id: Uuid,
        nombre: &str,
        tipo: TipoDocumento,
        content: Vec<u8>,
        actor: &str,
    ) -> FirmaResult<ExpedienteDocument> {
        if nombre.trim().is_empty() {
            return Err(FirmaError::Validation("document name is required".to_string()));
        }
        if content.is_empty() {
            return Err(FirmaError::Validation("document content is empty".to_string()));
        }

        let lock = self.upload_locks.handle(expediente_id)?;
        let _guard = self
            .upload_locks
            .hold(expediente_id, lock.lock_owned().await);

        let expediente = self.get_expediente(expediente_id).await?;
        let next = match self
            .table
            .next_state(expediente.estado, WorkflowEvent::AgregarDocumento)
        {
            Ok(next) => next,
            Err(e) => return Err(self.deny(&expediente, actor, e).await),
        };

        let id = Uuid::new_v4();
        let blob_key = format!("documents/{}/{}", expediente_id, id);
        let content_hash = sha256_hex(&content);
        self.blobs.put(&blob_key, content).await?;

        // The first document moves the expediente out of iniciado in the same commit
        let transition = (next != expediente.estado).then(|| {
            self.movimiento(
                &expediente,
                expediente.oficina_actual_id,
                next,
                actor,
                None,
                vec![id],
            )
        });
        let document = self
            .store
            .insert_document(DocumentCommit {
                expediente_id,
                expected_version: expediente.version,
                expected_estado: expediente.estado,
                document: NewDocument {
                    id,
                    nombre: nombre.to_string(),
                    tipo,
                    content_hash,
                    blob_key,
                    cargado_por: actor.to_string(),
                },
                transition,
            })
            .await
            .map_err(|e| match e {
                StorageError::VersionConflict => FirmaError::ConcurrentModification(expediente_id),
                other => other.into(),
            })?;
        debug!(
            "Document {} attached to {} as foja {}",
            document.id, expediente.numero, document.numero_foja
        );
        if next != expediente.estado {
            self.audit
                .log_workflow_event(
                    AuditAction::ExpedienteTransitioned,
                    &expediente_id.to_string(),
                    actor,
                    expediente.estado.as_str(),
                    next.as_str(),
                )
                .await;
        }

        let entry = crate::audit::AuditEntry::builder(
            AuditAction::DocumentAdded,
            ResourceType::Document,
        )
        .actor(actor)
        .resource_id(document.id.to_string())
        .metadata("expediente", expediente_id.to_string())
        .metadata("foja", document.numero_foja.to_string())
        .build();
        self.audit.log(entry).await;
        Ok(document)
    }

    /// Route the expediente to another office.
    ///
    /// Refused with `PendingSignature` while any document is still `pendiente`.
    pub async fn enviar(
        &self,
        expediente_id: Uuid,
        destino: OficinaId,
        actor: &str,
        observacion: Option<String>,
    ) -> FirmaResult<WorkflowMovimiento> {
        let expediente = self.get_expediente(expediente_id).await?;
        self.require_oficina(destino).await?;
        if destino == expediente.oficina_actual_id {
            return Err(FirmaError::Validation(format!(
                "expediente {} is already at office {}",
                expediente.numero, destino
            )));
        }

        let next = match self
            .table
            .enviar_state(expediente.estado, destino == expediente.oficina_origen_id)
        {
            Ok(next) => next,
            Err(e) => return Err(self.deny(&expediente, actor, e).await),
        };

        let documents = self.store.list_documents(expediente_id).await?;
        let pending: Vec<Uuid> = documents
            .iter()
            .filter(|d| d.estado_firma == EstadoFirma::Pendiente)
            .map(|d| d.id)
            .collect();
        if !pending.is_empty() {
            let error = FirmaError::PendingSignature {
                document_ids: pending,
            };
            return Err(self.deny(&expediente, actor, error).await);
        }

        let movimiento = self.movimiento(
            &expediente,
            destino,
            next,
            actor,
            observacion,
            documents.iter().map(|d| d.id).collect(),
        );
        let origen = expediente.oficina_actual_id;
        let estado_anterior = expediente.estado;
        self.commit(expediente, next, destino, movimiento.clone())
            .await?;

        self.audit
            .log_workflow_event(
                AuditAction::ExpedienteSent,
                &expediente_id.to_string(),
                actor,
                estado_anterior.as_str(),
                next.as_str(),
            )
            .await;
        info!(
            "Expediente {} sent from office {} to office {} ({} -> {})",
            expediente_id, origen, destino, estado_anterior, next
        );
        Ok(movimiento)
    }

    /// Apply an event that keeps the expediente at its current office
    pub async fn apply_event(
        &self,
        expediente_id: Uuid,
        event: WorkflowEvent,
        actor: &str,
        observacion: Option<String>,
    ) -> FirmaResult<WorkflowMovimiento> {
        if matches!(event, WorkflowEvent::AgregarDocumento | WorkflowEvent::Enviar) {
            return Err(FirmaError::Validation(format!(
                "'{}' carries its own data and has a dedicated operation",
                event
            )));
        }
        let needs_text = matches!(event, WorkflowEvent::Observar | WorkflowEvent::Rechazar);
        if needs_text && observacion.as_deref().is_none_or(|t| t.trim().is_empty()) {
            return Err(FirmaError::Validation(format!(
                "'{}' requires an observation or reason",
                event
            )));
        }

        let expediente = self.get_expediente(expediente_id).await?;
        let next = match self.table.next_state(expediente.estado, event) {
            Ok(next) => next,
            Err(e) => return Err(self.deny(&expediente, actor, e).await),
        };

        let office = expediente.oficina_actual_id;
        let estado_anterior = expediente.estado;
        let movimiento =
            self.movimiento(&expediente, office, next, actor, observacion, Vec::new());
        self.commit(expediente, next, office, movimiento.clone())
            .await?;

        self.audit
            .log_workflow_event(
                AuditAction::ExpedienteTransitioned,
                &expediente_id.to_string(),
                actor,
                estado_anterior.as_str(),
                next.as_str(),
            )
            .await;
        debug!(
            "Expediente {} {} -> {} via {}",
            expediente_id, estado_anterior, next, event
        );
        Ok(movimiento)
    }

    pub async fn recibir(&self, expediente_id: Uuid, actor: &str) -> FirmaResult<WorkflowMovimiento> {
        self.apply_event(expediente_id, WorkflowEvent::Recibir, actor, None)
            .await
    }

    pub async fn solicitar_revision(
        &self,
        expediente_id: Uuid,
        actor: &str,
    ) -> FirmaResult<WorkflowMovimiento> {
        self.apply_event(expediente_id, WorkflowEvent::SolicitarRevision, actor, None)
            .await
    }

    pub async fn observar(
        &self,
        expediente_id: Uuid,
        actor: &str,
        observacion: &str,
    ) -> FirmaResult<WorkflowMovimiento> {
        self.apply_event(
            expediente_id,
            WorkflowEvent::Observar,
            actor,
            Some(observacion.to_string()),
        )
        .await
    }

    pub async fn subsanar(&self, expediente_id: Uuid, actor: &str) -> FirmaResult<WorkflowMovimiento> {
        self.apply_event(expediente_id, WorkflowEvent::Subsanar, actor, None)
            .await
    }

    pub async fn aprobar(&self, expediente_id: Uuid, actor: &str) -> FirmaResult<WorkflowMovimiento> {
        self.apply_event(expediente_id, WorkflowEvent::Aprobar, actor, None)
            .await
    }

    pub async fn rechazar(
        &self,
        expediente_id: Uuid,
        actor: &str,
        motivo: &str,
    ) -> FirmaResult<WorkflowMovimiento> {
        self.apply_event(
            expediente_id,
            WorkflowEvent::Rechazar,
            actor,
            Some(motivo.to_string()),
        )
        .await
    }

    pub async fn archivar(&self, expediente_id: Uuid, actor: &str) -> FirmaResult<WorkflowMovimiento> {
        self.apply_event(expediente_id, WorkflowEvent::Archivar, actor, None)
            .await
    }

    fn movimiento(
        &self,
        expediente: &Expediente,
        destino: OficinaId,
        estado_nuevo: EstadoExpediente,
        actor: &str,
        observacion: Option<String>,
        documento_ids: Vec<Uuid>,
    ) -> WorkflowMovimiento {
        WorkflowMovimiento {
            id: Uuid::new_v4(),
            expediente_id: expediente.id,
            oficina_origen_id: expediente.oficina_actual_id,
            oficina_destino_id: destino,
            estado_anterior: expediente.estado,
            estado_nuevo,
            actor: actor.to_string(),
            observacion,
            documento_ids,
            timestamp: Utc::now(),
        }
    }

    /// Optimistic commit of state, office and movement; losing a race is `ConcurrentModification`
    async fn commit(
        &self,
        expediente: Expediente,
        estado: EstadoExpediente,
        oficina: OficinaId,
        movimiento: WorkflowMovimiento,
    ) -> FirmaResult<()> {
        let id = expediente.id;
        let expected_version = expediente.version;
        let expected_estado = expediente.estado;

        let mut updated = expediente;
        updated.estado = estado;
        updated.oficina_actual_id = oficina;
        updated.updated_at = movimiento.timestamp;

        self.store
            .commit_transition(TransitionCommit {
                expediente: updated,
                expected_version,
                expected_estado,
                movimiento,
            })
            .await
            .map_err(|e| match e {
                StorageError::VersionConflict => FirmaError::ConcurrentModification(id),
                other => other.into(),
            })
    }

    async fn deny(&self, expediente: &Expediente, actor: &str, error: FirmaError) -> FirmaError {
        self.audit
            .log_denied(
                AuditAction::TransitionDenied,
                ResourceType::Expediente,
                &expediente.id.to_string(),
                Some(actor),
                &error,
            )
            .await;
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryBlobStore, MemoryStore, SignatureStateUpdate};

    fn oficina(id: OficinaId, codigo: &str) -> Oficina {
        Oficina {
            id,
            codigo: codigo.to_string(),
            nombre: format!("Oficina {}", codigo),
            email: None,
            telefono: None,
        }
    }

    async fn engine() -> (ExpedienteWorkflowEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let engine = ExpedienteWorkflowEngine::new(
            store.clone(),
            Arc::new(MemoryBlobStore::new()),
            AuditLogger::in_memory(),
            &WorkflowConfig::default(),
        );
        for (id, codigo) in [(1, "MESA"), (2, "LEGALES"), (3, "DESPACHO")] {
            engine.register_oficina(oficina(id, codigo)).await.unwrap();
        }
        (engine, store)
    }

    async fn expediente(engine: &ExpedienteWorkflowEngine) -> Expediente {
        engine
            .crear_expediente(NuevoExpediente {
                titulo: "Solicitud de habilitacion".to_string(),
                oficina_origen_id: 1,
                prioridad: Prioridad::Normal,
                creado_por: "mesa".to_string(),
            })
            .await
            .unwrap()
    }

    async fn mark_signed(store: &MemoryStore, document_id: Uuid) {
        store
            .update_signature_state(vec![SignatureStateUpdate {
                document_id,
                expected: vec![EstadoFirma::Pendiente],
                new_state: EstadoFirma::Firmado,
                signature_id: Some(Uuid::new_v4()),
                certificate_id: Some(Uuid::new_v4()),
                firmado_por: Some("ana".to_string()),
                motivo_rechazo: None,
            }])
            .await
            .unwrap();
    }

    /// Blob store whose writes can be held until released
    #[derive(Default)]
    struct ParkingBlobs {
        inner: MemoryBlobStore,
        park: std::sync::atomic::AtomicBool,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl BlobStore for ParkingBlobs {
        async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
            if self.park.load(std::sync::atomic::Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.put(key, bytes).await
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            self.inner.get(key).await
        }
    }

    #[tokio::test]
    async fn test_first_document_moves_to_en_tramite() {
        let (engine, _) = engine().await;
        let exp = expediente(&engine).await;
        assert_eq!(exp.numero, "EXP-1");
        assert_eq!(exp.estado, EstadoExpediente::Iniciado);

        let doc = engine
            .add_document(exp.id, "Nota.pdf", TipoDocumento::Nota, b"nota".to_vec(), "mesa")
            .await
            .unwrap();
        assert_eq!(doc.numero_foja, 1);
        assert_eq!(doc.orden_secuencial(), 1);

        let second = engine
            .add_document(exp.id, "Anexo.pdf", TipoDocumento::Anexo, b"anexo".to_vec(), "mesa")
            .await
            .unwrap();
        assert_eq!(second.numero_foja, 2);

        let current = engine.get_expediente(exp.id).await.unwrap();
        assert_eq!(current.estado, EstadoExpediente::EnTramite);

        let historial = engine.historial(exp.id).await.unwrap();
        assert_eq!(historial.len(), 1);
        assert_eq!(historial[0].estado_anterior, EstadoExpediente::Iniciado);
        assert_eq!(historial[0].estado_nuevo, EstadoExpediente::EnTramite);
        assert_eq!(historial[0].documento_ids, vec![doc.id]);
    }

    #[tokio::test]
    async fn test_enviar_with_pending_document_changes_nothing() {
        let (engine, _) = engine().await;
        let exp = expediente(&engine).await;
        let doc = engine
            .add_document(exp.id, "Informe.pdf", TipoDocumento::Informe, b"x".to_vec(), "mesa")
            .await
            .unwrap();
        let before = engine.get_expediente(exp.id).await.unwrap();

        let result = engine.enviar(exp.id, 2, "mesa", None).await;
        match result {
            Err(FirmaError::PendingSignature { document_ids }) => {
                assert_eq!(document_ids, vec![doc.id])
            }
            other => panic!("expected PendingSignature, got {:?}", other),
        }

        let after = engine.get_expediente(exp.id).await.unwrap();
        assert_eq!(after.estado, before.estado);
        assert_eq!(after.oficina_actual_id, 1);
        assert_eq!(after.version, before.version);
        assert_eq!(engine.historial(exp.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_enviar_and_return_to_origin() {
        let (engine, store) = engine().await;
        let exp = expediente(&engine).await;
        let doc = engine
            .add_document(exp.id, "Informe.pdf", TipoDocumento::Informe, b"x".to_vec(), "mesa")
            .await
            .unwrap();
        mark_signed(&store, doc.id).await;

        let movimiento = engine.enviar(exp.id, 2, "mesa", None).await.unwrap();
        assert_eq!(movimiento.oficina_origen_id, 1);
        assert_eq!(movimiento.oficina_destino_id, 2);
        assert_eq!(movimiento.estado_anterior, EstadoExpediente::EnTramite);
        assert_eq!(movimiento.estado_nuevo, EstadoExpediente::Derivado);

        // Derivado must be received before it can move again
        assert!(matches!(
            engine.enviar(exp.id, 1, "legales", None).await,
            Err(FirmaError::InvalidTransition { .. })
        ));
        engine.recibir(exp.id, "legales").await.unwrap();

        let back = engine.enviar(exp.id, 1, "legales", None).await.unwrap();
        assert_eq!(back.estado_nuevo, EstadoExpediente::EnTramite);
        let current = engine.get_expediente(exp.id).await.unwrap();
        assert_eq!(current.oficina_actual_id, 1);
        assert_eq!(engine.historial(exp.id).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_enviar_to_current_or_unknown_office() {
        let (engine, _) = engine().await;
        let exp = expediente(&engine).await;
        assert!(matches!(
            engine.enviar(exp.id, 1, "mesa", None).await,
            Err(FirmaError::Validation(_))
        ));
        assert!(matches!(
            engine.enviar(exp.id, 99, "mesa", None).await,
            Err(FirmaError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_review_cycle_and_archive() {
        let (engine, _) = engine().await;
        let exp = expediente(&engine).await;
        engine
            .add_document(exp.id, "Nota.pdf", TipoDocumento::Nota, b"n".to_vec(), "mesa")
            .await
            .unwrap();

        engine.solicitar_revision(exp.id, "mesa").await.unwrap();
        engine.observar(exp.id, "legales", "falta firma").await.unwrap();
        engine.subsanar(exp.id, "mesa").await.unwrap();
        engine.solicitar_revision(exp.id, "mesa").await.unwrap();
        engine.aprobar(exp.id, "legales").await.unwrap();
        engine.archivar(exp.id, "mesa").await.unwrap();

        let current = engine.get_expediente(exp.id).await.unwrap();
        assert_eq!(current.estado, EstadoExpediente::Archivado);
        // Every state change produced exactly one movement
        assert_eq!(engine.historial(exp.id).await.unwrap().len(), 7);

        assert!(matches!(
            engine.recibir(exp.id, "mesa").await,
            Err(FirmaError::InvalidTransition {
                from: EstadoExpediente::Archivado,
                ..
            })
        ));
        assert!(matches!(
            engine
                .add_document(exp.id, "Tarde.pdf", TipoDocumento::Nota, b"t".to_vec(), "mesa")
                .await,
            Err(FirmaError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_rechazado_is_terminal_by_default() {
        let (engine, _) = engine().await;
        let exp = expediente(&engine).await;
        engine
            .add_document(exp.id, "Nota.pdf", TipoDocumento::Nota, b"n".to_vec(), "mesa")
            .await
            .unwrap();
        engine.rechazar(exp.id, "legales", "incompleto").await.unwrap();
        assert!(matches!(
            engine.archivar(exp.id, "mesa").await,
            Err(FirmaError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_stale_commit_is_concurrent_modification() {
        let (engine, _) = engine().await;
        let exp = expediente(&engine).await;
        engine
            .add_document(exp.id, "Nota.pdf", TipoDocumento::Nota, b"n".to_vec(), "mesa")
            .await
            .unwrap();
        let stale = engine.get_expediente(exp.id).await.unwrap();
        engine.solicitar_revision(exp.id, "mesa").await.unwrap();

        let movimiento = engine.movimiento(&stale, 1, EstadoExpediente::Rechazado, "x", None, vec![]);
        let result = engine
            .commit(stale, EstadoExpediente::Rechazado, 1, movimiento)
            .await;
        assert!(matches!(result, Err(FirmaError::ConcurrentModification(id)) if id == exp.id));
        assert_eq!(engine.historial(exp.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_upload_racing_rejection_is_refused() {
        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(ParkingBlobs::default());
        let engine = Arc::new(ExpedienteWorkflowEngine::new(
            store.clone(),
            blobs.clone(),
            AuditLogger::in_memory(),
            &WorkflowConfig::default(),
        ));
        engine.register_oficina(oficina(1, "MESA")).await.unwrap();
        let exp = expediente(&engine).await;
        engine
            .add_document(exp.id, "Nota.pdf", TipoDocumento::Nota, b"nota".to_vec(), "mesa")
            .await
            .unwrap();

        blobs.park.store(true, std::sync::atomic::Ordering::SeqCst);
        let upload = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .add_document(exp.id, "Anexo.pdf", TipoDocumento::Anexo, b"anexo".to_vec(), "mesa")
                    .await
            })
        };
        blobs.entered.notified().await;

        engine.rechazar(exp.id, "mesa", "fuera de termino").await.unwrap();
        blobs.release.notify_one();

        let result = upload.await.unwrap();
        assert!(matches!(result, Err(FirmaError::ConcurrentModification(id)) if id == exp.id));

        let current = engine.get_expediente(exp.id).await.unwrap();
        assert_eq!(current.estado, EstadoExpediente::Rechazado);
        assert_eq!(engine.list_documents(exp.id).await.unwrap().len(), 1);
    }
}
