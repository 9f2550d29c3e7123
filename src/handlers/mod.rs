pub mod certificates;
pub mod documentos;
pub mod expedientes;
pub mod health;

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::audit::AuditLogger;
use crate::certs::{CertificateAuthorityRegistry, CertificateLifecycleManager, KeyVault};
use crate::error::{ErrorCategory, FirmaError, FirmaResult};
use crate::models::AppConfig;
use crate::storage::{BlobStore, MemoryBlobStore, MemoryStore, Store};
use crate::signing::{SignatureVerifier, SigningEngine};
use crate::workflow::ExpedienteWorkflowEngine;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<CertificateLifecycleManager>,
    pub signing: Arc<SigningEngine>,
    pub verifier: Arc<SignatureVerifier>,
    pub workflow: Arc<ExpedienteWorkflowEngine>,
    pub audit: AuditLogger,
}

impl AppState {
    /// Wire every engine over the given stores and seed the configured offices
    pub async fn build(
        config: &AppConfig,
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStore>,
        audit: AuditLogger,
    ) -> FirmaResult<Self> {
        let vault = Arc::new(KeyVault::from_secret(
            &config.keys.encryption_secret,
            config.keys.kdf_salt.as_bytes(),
            config.keys.kdf_iterations,
        )?);
        let registry = CertificateAuthorityRegistry::from_config(config, vault.clone())?;

        let lifecycle = Arc::new(CertificateLifecycleManager::new(
            registry,
            store.clone(),
            vault.clone(),
            audit.clone(),
            config,
        ));
        let signing = Arc::new(SigningEngine::new(
            lifecycle.clone(),
            store.clone(),
            blobs.clone(),
            vault,
            audit.clone(),
        ));
        let verifier = Arc::new(SignatureVerifier::new(
            lifecycle.clone(),
            store.clone(),
            audit.clone(),
        ));
        let workflow = Arc::new(ExpedienteWorkflowEngine::new(
            store,
            blobs,
            audit.clone(),
            &config.workflow,
        ));

        for oficina in &config.oficinas {
            workflow.register_oficina(oficina.clone()).await?;
        }
        info!("Seeded {} oficina(s)", config.oficinas.len());

        Ok(Self {
            lifecycle,
            signing,
            verifier,
            workflow,
            audit,
        })
    }

    /// In-memory stores, as used by the binary and the tests
    pub async fn in_memory(config: &AppConfig) -> FirmaResult<Self> {
        Self::build(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryBlobStore::new()),
            AuditLogger::in_memory(),
        )
        .await
    }
}

/// All HTTP routes over the shared state
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::health_check))
        .route("/health", get(health::health_check))
        // Certificates
        .route(
            "/api/v1/certificates",
            get(certificates::list_certificates).post(certificates::request_certificate),
        )
        .route(
            "/api/v1/certificates/import",
            post(certificates::import_certificate),
        )
        .route(
            "/api/v1/certificates/expiring",
            get(certificates::list_expiring),
        )
        .route("/api/v1/certificates/:id", get(certificates::get_certificate))
        .route(
            "/api/v1/certificates/:id/renew",
            post(certificates::renew_certificate),
        )
        .route(
            "/api/v1/certificates/:id/revoke",
            post(certificates::revoke_certificate),
        )
        .route(
            "/api/v1/certificate-requests/:id",
            get(certificates::poll_request),
        )
        .route(
            "/api/v1/identity/validate",
            post(certificates::validate_identity),
        )
        // Expedientes
        .route("/api/v1/oficinas", get(expedientes::list_oficinas))
        .route("/api/v1/expedientes", post(expedientes::crear_expediente))
        .route("/api/v1/expedientes/:id", get(expedientes::get_expediente))
        .route(
            "/api/v1/expedientes/:id/documentos",
            post(expedientes::agregar_documento),
        )
        .route("/api/v1/expedientes/:id/enviar", post(expedientes::enviar))
        .route(
            "/api/v1/expedientes/:id/eventos",
            post(expedientes::aplicar_evento),
        )
        .route(
            "/api/v1/expedientes/:id/movimientos",
            get(expedientes::movimientos),
        )
        // Signatures
        .route("/api/v1/documentos/:id/firmar", post(documentos::firmar))
        .route("/api/v1/documentos/:id/rechazar", post(documentos::rechazar))
        .route("/api/v1/documentos/:id/firmas", get(documentos::firmas_documento))
        .route("/api/v1/documentos/firmar-lote", post(documentos::firmar_lote))
        .route("/api/v1/firmas/:id", get(documentos::get_firma))
        .route("/api/v1/firmas/:id/verificar", post(documentos::verificar))
        .with_state(state)
}

pub type ApiError = (StatusCode, Json<Value>);
pub type ApiResult<T> = Result<Json<T>, ApiError>;

impl From<FirmaError> for (StatusCode, Json<Value>) {
    fn from(err: FirmaError) -> Self {
        api_error(err)
    }
}

/// Map an engine error onto an HTTP status and JSON body
pub fn api_error(err: FirmaError) -> ApiError {
    let status = match (&err, err.category()) {
        (_, ErrorCategory::Validation) => StatusCode::BAD_REQUEST,
        (_, ErrorCategory::NotFound) => StatusCode::NOT_FOUND,
        (FirmaError::IncompatibleCertificate { .. }, _) => StatusCode::UNPROCESSABLE_ENTITY,
        (FirmaError::ProviderRejected { .. }, _) => StatusCode::BAD_GATEWAY,
        (_, ErrorCategory::Policy) => StatusCode::CONFLICT,
        (_, ErrorCategory::Lifecycle) => StatusCode::UNPROCESSABLE_ENTITY,
        (_, ErrorCategory::Provider) => StatusCode::SERVICE_UNAVAILABLE,
        (_, ErrorCategory::Concurrency) => StatusCode::CONFLICT,
        (_, ErrorCategory::Integrity) => StatusCode::UNPROCESSABLE_ENTITY,
        (_, ErrorCategory::Internal) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let mut body = json!({
        "error": err.to_string(),
        "category": category_name(err.category()),
        "retryable": err.is_retryable(),
    });
    if let FirmaError::PendingSignature { document_ids } = &err {
        body["pending_documents"] = json!(document_ids);
    }

    if status.is_server_error() {
        error!("Request failed: {}", err);
    } else {
        warn!("Request rejected: {}", err);
    }
    (status, Json(body))
}

fn category_name(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::Validation => "validation",
        ErrorCategory::Policy => "policy",
        ErrorCategory::Lifecycle => "lifecycle",
        ErrorCategory::Provider => "provider",
        ErrorCategory::Concurrency => "concurrency",
        ErrorCategory::Integrity => "integrity",
        ErrorCategory::NotFound => "not_found",
        ErrorCategory::Internal => "internal",
    }
}

/// Decode a standard base64 payload field
pub(crate) fn decode_base64(field: &str, value: &str) -> Result<Vec<u8>, ApiError> {
    STANDARD
        .decode(value.trim())
        .map_err(|e| api_error(FirmaError::Validation(format!("{} is not valid base64: {}", field, e))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CertificateStatus, DocumentClass, ValidityLevel};
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            api_error(FirmaError::Validation("x".into())).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            api_error(FirmaError::NotFound("x".into())).0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            api_error(FirmaError::IncompatibleCertificate {
                document_class: DocumentClass::Oficial,
                required: ValidityLevel::Government,
                actual: ValidityLevel::Corporate,
            })
            .0,
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            api_error(FirmaError::Lifecycle {
                serial: "0A".into(),
                status: CertificateStatus::Vencido,
            })
            .0,
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            api_error(FirmaError::ProviderUnavailable {
                provider: "government".into(),
                reason: "timeout".into(),
            })
            .0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            api_error(FirmaError::ConcurrentModification(Uuid::new_v4())).0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            api_error(FirmaError::Crypto("x".into())).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_pending_signature_body_lists_documents() {
        let id = Uuid::new_v4();
        let (status, Json(body)) = api_error(FirmaError::PendingSignature {
            document_ids: vec![id],
        });
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["category"], "policy");
        assert_eq!(body["pending_documents"][0], id.to_string());
    }

    #[test]
    fn test_decode_base64() {
        assert_eq!(decode_base64("contenido", "aG9sYQ==").unwrap(), b"hola");
        let (status, _) = decode_base64("contenido", "%%%").unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
