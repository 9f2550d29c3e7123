use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::{ApiError, ApiResult, AppState, decode_base64};
use crate::error::FirmaError;
use crate::models::{ExpedienteDocument, SignatureRecord};
use crate::signing::VerificationReport;

#[derive(Debug, Deserialize)]
pub struct FirmarBody {
    pub certificate_id: Uuid,
    pub firmante: String,
}

#[derive(Debug, Deserialize)]
pub struct FirmarLoteBody {
    /// Documents in signing order
    pub document_ids: Vec<Uuid>,
    pub certificate_id: Uuid,
    pub firmante: String,
}

#[derive(Debug, Deserialize)]
pub struct RechazarBody {
    pub actor: String,
    pub motivo: String,
}

/// Content to check a signature against; exactly one field must be present
#[derive(Debug, Deserialize)]
pub struct VerificarBody {
    /// Single document, standard base64
    #[serde(default)]
    pub contenido: Option<String>,
    /// Batch members in signing order, standard base64
    #[serde(default)]
    pub contenidos: Option<Vec<String>>,
    /// Precomputed SHA-256 hex hashes in signing order
    #[serde(default)]
    pub hashes: Option<Vec<String>>,
}

pub async fn firmar(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<FirmarBody>,
) -> Result<(StatusCode, Json<SignatureRecord>), ApiError> {
    info!("Signing document {} by '{}'", id, payload.firmante);
    let record = state
        .signing
        .sign_document(id, payload.certificate_id, &payload.firmante)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn firmar_lote(
    State(state): State<AppState>,
    Json(payload): Json<FirmarLoteBody>,
) -> Result<(StatusCode, Json<SignatureRecord>), ApiError> {
    info!(
        "Batch signing {} document(s) by '{}'",
        payload.document_ids.len(),
        payload.firmante
    );
    let record = state
        .signing
        .sign_documents_batch(
            &payload.document_ids,
            payload.certificate_id,
            &payload.firmante,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn rechazar(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RechazarBody>,
) -> ApiResult<ExpedienteDocument> {
    let documento = state
        .signing
        .reject_document(id, &payload.actor, &payload.motivo)
        .await?;
    Ok(Json(documento))
}

pub async fn firmas_documento(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<SignatureRecord>> {
    Ok(Json(state.signing.list_signatures(id).await?))
}

pub async fn get_firma(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<SignatureRecord> {
    Ok(Json(state.signing.get_signature(id).await?))
}

pub async fn verificar(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VerificarBody>,
) -> ApiResult<VerificationReport> {
    let record = state.signing.get_signature(id).await?;

    let report = match (payload.contenido, payload.contenidos, payload.hashes) {
        (Some(contenido), None, None) => {
            let bytes = decode_base64("contenido", &contenido)?;
            state.verifier.verify(&bytes, &record).await?
        }
        (None, Some(contenidos), None) => {
            let documents = contenidos
                .iter()
                .map(|c| decode_base64("contenidos", c))
                .collect::<Result<Vec<_>, _>>()?;
            let slices: Vec<&[u8]> = documents.iter().map(Vec::as_slice).collect();
            state.verifier.verify_batch(&slices, &record).await?
        }
        (None, None, Some(hashes)) => state.verifier.verify_hashes(&hashes, &record).await?,
        _ => {
            return Err(FirmaError::Validation(
                "provide exactly one of contenido, contenidos or hashes".to_string(),
            )
            .into());
        }
    };
    Ok(Json(report))
}
