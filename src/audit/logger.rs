// Audit logger implementation

use super::storage::{AuditStorage, MemoryAuditStorage};
use super::types::{AuditAction, AuditEntry, AuditLevel, ResourceType};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::FirmaError;

/// Audit logger for recording certificate, signature and workflow events
#[derive(Clone)]
pub struct AuditLogger {
    storage: Arc<dyn AuditStorage>,
}

impl AuditLogger {
    /// Create a new audit logger with the specified storage backend
    pub fn new(storage: Arc<dyn AuditStorage>) -> Self {
        Self { storage }
    }

    /// Logger backed by a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryAuditStorage::new()))
    }

    pub fn storage(&self) -> Arc<dyn AuditStorage> {
        self.storage.clone()
    }

    /// Log an audit event
    pub async fn log(&self, entry: AuditEntry) {
        if entry.success {
            info!(
                "Audit: {} - {:?} {:?} by {:?}",
                entry.action.as_str(),
                entry.resource_type,
                entry.resource_id,
                entry.actor
            );
        } else {
            warn!(
                "Audit: {} - {:?} {:?} by {:?} failed: {:?}",
                entry.action.as_str(),
                entry.resource_type,
                entry.resource_id,
                entry.actor,
                entry.error_message
            );
        }

        if let Err(e) = self.storage.store(entry).await {
            error!("Failed to store audit entry: {}", e);
        }
    }

    /// Log a successful certificate lifecycle event
    pub async fn log_certificate_event(
        &self,
        action: AuditAction,
        certificate_id: &str,
        serial: &str,
        actor: Option<&str>,
    ) {
        let mut builder = AuditEntry::builder(action, ResourceType::Certificate)
            .resource_id(certificate_id)
            .level(match action {
                AuditAction::CertificateRevoked => AuditLevel::Security,
                _ => AuditLevel::Info,
            })
            .success(true)
            .metadata("serial", serial);

        if let Some(actor) = actor {
            builder = builder.actor(actor);
        }

        self.log(builder.build()).await;
    }

    /// Log a signature event covering one or more documents
    pub async fn log_signature_event(
        &self,
        action: AuditAction,
        signature_id: &str,
        document_ids: &[String],
        serial: &str,
        actor: Option<&str>,
    ) {
        let mut builder = AuditEntry::builder(action, ResourceType::Signature)
            .resource_id(signature_id)
            .level(AuditLevel::Info)
            .success(true)
            .metadata("certificate_serial", serial)
            .metadata("documents", document_ids.join(","));

        if let Some(actor) = actor {
            builder = builder.actor(actor);
        }

        self.log(builder.build()).await;
    }

    /// Log a workflow state change
    pub async fn log_workflow_event(
        &self,
        action: AuditAction,
        expediente_id: &str,
        actor: &str,
        from: &str,
        to: &str,
    ) {
        let entry = AuditEntry::builder(action, ResourceType::Expediente)
            .actor(actor)
            .resource_id(expediente_id)
            .level(AuditLevel::Info)
            .success(true)
            .metadata("from", from)
            .metadata("to", to)
            .build();

        self.log(entry).await;
    }

    /// Log a refused operation with the error that stopped it
    pub async fn log_denied(
        &self,
        action: AuditAction,
        resource_type: ResourceType,
        resource_id: &str,
        actor: Option<&str>,
        error: &FirmaError,
    ) {
        let mut builder = AuditEntry::builder(action, resource_type)
            .resource_id(resource_id)
            .level(AuditLevel::Security)
            .error(error.to_string())
            .metadata("category", format!("{:?}", error.category()));

        if let Some(actor) = actor {
            builder = builder.actor(actor);
        }

        self.log(builder.build()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::types::AuditQuery;

    #[tokio::test]
    async fn test_certificate_event_is_stored() {
        let storage = Arc::new(MemoryAuditStorage::new());
        let logger = AuditLogger::new(storage.clone());

        logger
            .log_certificate_event(
                AuditAction::CertificateRevoked,
                "cert-1",
                "7F00AA",
                Some("admin"),
            )
            .await;

        let results = storage
            .query(AuditQuery {
                resource_id: Some("cert-1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].action, AuditAction::CertificateRevoked);
        assert_eq!(results[0].level, AuditLevel::Security);
        assert_eq!(results[0].metadata.get("serial").unwrap(), "7F00AA");
    }

    #[tokio::test]
    async fn test_denied_event_records_error() {
        let storage = Arc::new(MemoryAuditStorage::new());
        let logger = AuditLogger::new(storage.clone());

        let error = FirmaError::Validation("bad input".to_string());
        logger
            .log_denied(
                AuditAction::TransitionDenied,
                ResourceType::Expediente,
                "exp-1",
                Some("mesa"),
                &error,
            )
            .await;

        let results = storage
            .query(AuditQuery {
                action: Some(AuditAction::TransitionDenied),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert_eq!(
            results[0].error_message,
            Some("Validation error: bad input".to_string())
        );
    }

    #[tokio::test]
    async fn test_built_entry_keeps_action_and_resource() {
        let storage = Arc::new(MemoryAuditStorage::new());
        let logger = AuditLogger::new(storage.clone());

        let entry = AuditEntry::builder(AuditAction::DocumentAdded, ResourceType::Document)
            .actor("mesa")
            .resource_id("doc-1")
            .build();
        logger.log(entry).await;

        let results = storage
            .query(AuditQuery {
                action: Some(AuditAction::TransitionDenied),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(results.is_empty());

        let results = storage
            .query(AuditQuery::for_resource(ResourceType::Document, "doc-1"))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].action, AuditAction::DocumentAdded);
        assert_eq!(results[0].level, AuditLevel::Info);
        assert!(results[0].success);
    }
}
