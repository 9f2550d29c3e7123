// Audit log types and structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Audit log entry representing a single auditable event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// User or office account that triggered the event, when known
    pub actor: Option<String>,
    pub action: AuditAction,
    pub resource_type: ResourceType,
    pub resource_id: Option<String>,
    pub level: AuditLevel,
    pub success: bool,
    pub error_message: Option<String>,
    /// Serials, state names, error categories and similar context
    pub metadata: HashMap<String, String>,
}

/// Types of auditable actions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // Certificate actions
    CertificateRequested,
    CertificateIssued,
    CertificateImported,
    CertificateRequestFailed,
    CertificateRenewed,
    CertificateRevoked,
    CertificateStatusChanged,

    // Signature actions
    DocumentSigned,
    DocumentsBatchSigned,
    DocumentSignatureRejected,
    SigningDenied,
    SignatureVerified,

    // Workflow actions
    ExpedienteCreated,
    DocumentAdded,
    ExpedienteTransitioned,
    ExpedienteSent,
    TransitionDenied,
}

impl AuditAction {
    /// Convert action to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::CertificateRequested => "certificate_requested",
            AuditAction::CertificateIssued => "certificate_issued",
            AuditAction::CertificateImported => "certificate_imported",
            AuditAction::CertificateRequestFailed => "certificate_request_failed",
            AuditAction::CertificateRenewed => "certificate_renewed",
            AuditAction::CertificateRevoked => "certificate_revoked",
            AuditAction::CertificateStatusChanged => "certificate_status_changed",
            AuditAction::DocumentSigned => "document_signed",
            AuditAction::DocumentsBatchSigned => "documents_batch_signed",
            AuditAction::DocumentSignatureRejected => "document_signature_rejected",
            AuditAction::SigningDenied => "signing_denied",
            AuditAction::SignatureVerified => "signature_verified",
            AuditAction::ExpedienteCreated => "expediente_created",
            AuditAction::DocumentAdded => "document_added",
            AuditAction::ExpedienteTransitioned => "expediente_transitioned",
            AuditAction::ExpedienteSent => "expediente_sent",
            AuditAction::TransitionDenied => "transition_denied",
        }
    }
}

/// Resource types that can be audited
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Certificate,
    CertificateRequest,
    Signature,
    Document,
    Expediente,
}

/// Severity level of audit events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    Info,
    /// Failed verifications and refused operations
    Warning,
    /// Revocations and policy denials
    Security,
}

/// Filters for reading the trail back; unset fields match everything
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    pub actor: Option<String>,
    pub action: Option<AuditAction>,
    pub resource_type: Option<ResourceType>,
    pub resource_id: Option<String>,
    pub success: Option<bool>,
    /// Entries at or above this level
    pub min_level: Option<AuditLevel>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Defaults to 100
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl AuditQuery {
    /// Everything recorded against one certificate, signature, document or expediente
    pub fn for_resource(resource_type: ResourceType, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: Some(resource_type),
            resource_id: Some(resource_id.into()),
            ..Default::default()
        }
    }
}

impl AuditEntry {
    /// Start an entry; what happened and to which kind of resource are always required
    pub fn builder(action: AuditAction, resource_type: ResourceType) -> AuditEntryBuilder {
        AuditEntryBuilder {
            action,
            resource_type,
            actor: None,
            resource_id: None,
            level: None,
            success: None,
            error_message: None,
            metadata: HashMap::new(),
        }
    }
}

/// Builder for creating audit entries
pub struct AuditEntryBuilder {
    action: AuditAction,
    resource_type: ResourceType,
    actor: Option<String>,
    resource_id: Option<String>,
    level: Option<AuditLevel>,
    success: Option<bool>,
    error_message: Option<String>,
    metadata: HashMap<String, String>,
}

impl AuditEntryBuilder {
    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn level(mut self, level: AuditLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self.success = Some(false);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> AuditEntry {
        AuditEntry {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            actor: self.actor,
            action: self.action,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            level: self.level.unwrap_or(AuditLevel::Info),
            success: self.success.unwrap_or(true),
            error_message: self.error_message,
            metadata: self.metadata,
        }
    }
}
