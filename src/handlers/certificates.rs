use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use super::{ApiError, ApiResult, AppState, decode_base64};
use crate::certs::{IdentityValidation, IssuanceOutcome};
use crate::models::{Certificate, CertificateStatus, PendingCertificateRequest, SubjectIdentity};

#[derive(Debug, Deserialize)]
pub struct CertificateRequestBody {
    pub provider: String,
    pub subject: SubjectIdentity,
    pub certificate_type: String,
    pub owner_id: String,
}

#[derive(Debug, Deserialize)]
pub struct IdentityBody {
    pub provider: String,
    pub subject: SubjectIdentity,
}

#[derive(Debug, Deserialize)]
pub struct ImportBody {
    /// PKCS#12 container, standard base64
    pub pkcs12: String,
    pub passphrase: String,
    pub owner_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ActorBody {
    pub actor: String,
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    #[serde(default)]
    pub days: Option<i64>,
}

/// Certificate as exposed over HTTP, with its status derived at read time
#[derive(Debug, Serialize)]
pub struct CertificateView {
    #[serde(flatten)]
    pub certificate: Certificate,
    pub effective_status: CertificateStatus,
}

impl CertificateView {
    fn new(state: &AppState, certificate: Certificate) -> Self {
        let effective_status = state.lifecycle.status(&certificate);
        Self {
            certificate,
            effective_status,
        }
    }
}

fn outcome_response(state: &AppState, outcome: IssuanceOutcome) -> (StatusCode, Json<Value>) {
    match outcome {
        IssuanceOutcome::Issued(certificate) => (
            StatusCode::CREATED,
            Json(json!({
                "status": "issued",
                "certificate": CertificateView::new(state, certificate)
            })),
        ),
        IssuanceOutcome::Pending(request) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "status": "pending",
                "request": request
            })),
        ),
    }
}

/// Request a certificate from the named provider
pub async fn request_certificate(
    State(state): State<AppState>,
    Json(payload): Json<CertificateRequestBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    info!(
        "Certificate request from '{}' to provider '{}'",
        payload.owner_id, payload.provider
    );
    let outcome = state
        .lifecycle
        .request_certificate(
            &payload.provider,
            payload.subject,
            &payload.certificate_type,
            &payload.owner_id,
        )
        .await?;
    Ok(outcome_response(&state, outcome))
}

/// Check a subject's identity at a provider before requesting a certificate
pub async fn validate_identity(
    State(state): State<AppState>,
    Json(payload): Json<IdentityBody>,
) -> ApiResult<IdentityValidation> {
    let validation = state
        .lifecycle
        .validate_identity(&payload.provider, &payload.subject)
        .await?;
    Ok(Json(validation))
}

/// Import a government certificate from a PKCS#12 container
pub async fn import_certificate(
    State(state): State<AppState>,
    Json(payload): Json<ImportBody>,
) -> Result<(StatusCode, Json<CertificateView>), ApiError> {
    let der = decode_base64("pkcs12", &payload.pkcs12)?;
    let certificate = state
        .lifecycle
        .import_pkcs12(&der, &payload.passphrase, &payload.owner_id)
        .await?;
    Ok((StatusCode::CREATED, Json(CertificateView::new(&state, certificate))))
}

pub async fn list_certificates(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
) -> ApiResult<Vec<CertificateView>> {
    let certificates = state.lifecycle.list_certificates(&query.owner_id).await?;
    Ok(Json(
        certificates
            .into_iter()
            .map(|c| CertificateView::new(&state, c))
            .collect(),
    ))
}

/// Certificates inside the expiry warning window
pub async fn list_expiring(
    State(state): State<AppState>,
    Query(query): Query<ExpiringQuery>,
) -> ApiResult<Vec<CertificateView>> {
    let within = match query.days {
        Some(days) if days > 0 => chrono::Duration::days(days),
        _ => state.lifecycle.warning_threshold(),
    };
    let certificates = state.lifecycle.list_expiring(within).await?;
    Ok(Json(
        certificates
            .into_iter()
            .map(|c| CertificateView::new(&state, c))
            .collect(),
    ))
}

pub async fn get_certificate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<CertificateView> {
    let certificate = state.lifecycle.refresh_status(id).await?;
    Ok(Json(CertificateView::new(&state, certificate)))
}

pub async fn renew_certificate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ActorBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let outcome = state.lifecycle.renew(id, &payload.actor).await?;
    Ok(outcome_response(&state, outcome))
}

pub async fn revoke_certificate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ActorBody>,
) -> ApiResult<CertificateView> {
    let certificate = state.lifecycle.revoke(id, &payload.actor).await?;
    Ok(Json(CertificateView::new(&state, certificate)))
}

/// Poll a pending issuance request at its provider
pub async fn poll_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<PendingCertificateRequest> {
    let request = state.lifecycle.poll_request(id).await?;
    Ok(Json(request))
}
