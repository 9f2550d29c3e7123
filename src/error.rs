//! Error types shared by the certificate, signing and workflow engines.

use thiserror::Error;
use uuid::Uuid;

use crate::models::{CertificateStatus, DocumentClass, EstadoExpediente, ValidityLevel};
use crate::storage::StorageError;

/// Result type used across the engines
pub type FirmaResult<T> = Result<T, FirmaError>;

/// Broad error families; callers decide on retries by category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Policy,
    Lifecycle,
    Provider,
    Concurrency,
    Integrity,
    NotFound,
    Internal,
}

#[derive(Error, Debug)]
pub enum FirmaError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(
        "Incompatible certificate: {document_class} documents require a {required} certificate, got {actual}"
    )]
    IncompatibleCertificate {
        document_class: DocumentClass,
        required: ValidityLevel,
        actual: ValidityLevel,
    },

    #[error("Documents pending signature: {document_ids:?}")]
    PendingSignature { document_ids: Vec<Uuid> },

    #[error("Invalid transition: cannot apply '{event}' to an expediente in state '{from}'")]
    InvalidTransition {
        from: EstadoExpediente,
        event: String,
    },

    #[error("Document {document_id} cannot be signed in its current state: {reason}")]
    DocumentNotSignable { document_id: Uuid, reason: String },

    #[error("Certificate {serial} is not usable: {status}")]
    Lifecycle {
        serial: String,
        status: CertificateStatus,
    },

    #[error("Certificate {serial} has been superseded by a renewal")]
    CertificateRetired { serial: String },

    #[error("Certificate {serial} already has renewal request {request_id} pending")]
    RenewalPending { serial: String, request_id: Uuid },

    #[error("Certificate {serial} has a renewal or revocation in progress; retry later")]
    CertificateBusy { serial: String },

    #[error("Identity of '{subject}' not verified by {provider}: {reason}")]
    IdentityNotVerified {
        provider: String,
        subject: String,
        reason: String,
    },

    #[error("Unsupported certificate provider: {0}")]
    UnsupportedProvider(String),

    #[error("Certificate provider '{provider}' unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("Certificate provider '{provider}' rejected the request: {reason}")]
    ProviderRejected { provider: String, reason: String },

    #[error("Concurrent modification of expediente {0}; refetch and retry")]
    ConcurrentModification(Uuid),

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl FirmaError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            FirmaError::Validation(_)
            | FirmaError::UnsupportedProvider(_)
            | FirmaError::IdentityNotVerified { .. } => ErrorCategory::Validation,
            FirmaError::NotFound(_) => ErrorCategory::NotFound,
            FirmaError::IncompatibleCertificate { .. }
            | FirmaError::PendingSignature { .. }
            | FirmaError::InvalidTransition { .. }
            | FirmaError::DocumentNotSignable { .. }
            | FirmaError::RenewalPending { .. }
            | FirmaError::ProviderRejected { .. } => ErrorCategory::Policy,
            FirmaError::Lifecycle { .. } | FirmaError::CertificateRetired { .. } => {
                ErrorCategory::Lifecycle
            }
            FirmaError::ProviderUnavailable { .. } => ErrorCategory::Provider,
            FirmaError::ConcurrentModification(_) | FirmaError::CertificateBusy { .. } => {
                ErrorCategory::Concurrency
            }
            FirmaError::Integrity(_) => ErrorCategory::Integrity,
            FirmaError::Crypto(_) => ErrorCategory::Internal,
            FirmaError::Storage(StorageError::NotFound) => ErrorCategory::NotFound,
            FirmaError::Storage(StorageError::VersionConflict) => ErrorCategory::Concurrency,
            FirmaError::Storage(_) => ErrorCategory::Internal,
        }
    }

    /// Only provider outages and optimistic-lock losses are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Provider | ErrorCategory::Concurrency
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            FirmaError::Validation("x".into()).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            FirmaError::PendingSignature {
                document_ids: vec![]
            }
            .category(),
            ErrorCategory::Policy
        );
        assert_eq!(
            FirmaError::Lifecycle {
                serial: "01".into(),
                status: CertificateStatus::Vencido
            }
            .category(),
            ErrorCategory::Lifecycle
        );
        assert_eq!(
            FirmaError::Integrity("hash".into()).category(),
            ErrorCategory::Integrity
        );
    }

    #[test]
    fn test_retryable() {
        assert!(
            FirmaError::ProviderUnavailable {
                provider: "government".into(),
                reason: "timeout".into()
            }
            .is_retryable()
        );
        assert!(FirmaError::ConcurrentModification(Uuid::new_v4()).is_retryable());
        assert!(
            FirmaError::CertificateBusy {
                serial: "0A".into()
            }
            .is_retryable()
        );
        assert!(
            !FirmaError::RenewalPending {
                serial: "0A".into(),
                request_id: Uuid::new_v4()
            }
            .is_retryable()
        );
        assert!(!FirmaError::UnsupportedProvider("acme".into()).is_retryable());
        assert!(
            !FirmaError::InvalidTransition {
                from: EstadoExpediente::Archivado,
                event: "enviar".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_pending_signature_message_lists_documents() {
        let id = Uuid::new_v4();
        let err = FirmaError::PendingSignature {
            document_ids: vec![id],
        };
        assert!(err.to_string().contains(&id.to_string()));
    }
}
