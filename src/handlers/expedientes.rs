use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiError, ApiResult, AppState, decode_base64};
use crate::models::{
    Expediente, ExpedienteDocument, Oficina, OficinaId, Prioridad, TipoDocumento,
    WorkflowMovimiento,
};
use crate::workflow::{NuevoExpediente, WorkflowEvent};

#[derive(Debug, Deserialize)]
pub struct CrearExpedienteBody {
    pub titulo: String,
    pub oficina_origen_id: OficinaId,
    #[serde(default)]
    pub prioridad: Option<Prioridad>,
    pub creado_por: String,
}

#[derive(Debug, Deserialize)]
pub struct DocumentoBody {
    pub nombre: String,
    pub tipo: TipoDocumento,
    /// Document bytes, standard base64
    pub contenido: String,
    pub actor: String,
}

#[derive(Debug, Deserialize)]
pub struct EnviarBody {
    pub oficina_destino_id: OficinaId,
    pub actor: String,
    #[serde(default)]
    pub observacion: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventoBody {
    pub evento: WorkflowEvent,
    pub actor: String,
    #[serde(default)]
    pub observacion: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExpedienteDetalle {
    #[serde(flatten)]
    pub expediente: Expediente,
    pub documentos: Vec<ExpedienteDocument>,
    pub eventos_permitidos: Vec<WorkflowEvent>,
}

pub async fn crear_expediente(
    State(state): State<AppState>,
    Json(payload): Json<CrearExpedienteBody>,
) -> Result<(StatusCode, Json<Expediente>), ApiError> {
    let expediente = state
        .workflow
        .crear_expediente(NuevoExpediente {
            titulo: payload.titulo,
            oficina_origen_id: payload.oficina_origen_id,
            prioridad: payload.prioridad.unwrap_or(Prioridad::Normal),
            creado_por: payload.creado_por,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(expediente)))
}

pub async fn get_expediente(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ExpedienteDetalle> {
    let expediente = state.workflow.get_expediente(id).await?;
    let documentos = state.workflow.list_documents(id).await?;
    let eventos_permitidos = state.workflow.transitions().allowed_events(expediente.estado);
    Ok(Json(ExpedienteDetalle {
        expediente,
        documentos,
        eventos_permitidos,
    }))
}

pub async fn agregar_documento(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DocumentoBody>,
) -> Result<(StatusCode, Json<ExpedienteDocument>), ApiError> {
    let contenido = decode_base64("contenido", &payload.contenido)?;
    let documento = state
        .workflow
        .add_document(id, &payload.nombre, payload.tipo, contenido, &payload.actor)
        .await?;
    Ok((StatusCode::CREATED, Json(documento)))
}

pub async fn enviar(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<EnviarBody>,
) -> ApiResult<WorkflowMovimiento> {
    let movimiento = state
        .workflow
        .enviar(
            id,
            payload.oficina_destino_id,
            &payload.actor,
            payload.observacion,
        )
        .await?;
    Ok(Json(movimiento))
}

/// Apply an in-office workflow event (recibir, aprobar, rechazar, ...)
pub async fn aplicar_evento(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<EventoBody>,
) -> ApiResult<WorkflowMovimiento> {
    let movimiento = state
        .workflow
        .apply_event(id, payload.evento, &payload.actor, payload.observacion)
        .await?;
    Ok(Json(movimiento))
}

pub async fn movimientos(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<WorkflowMovimiento>> {
    Ok(Json(state.workflow.historial(id).await?))
}

pub async fn list_oficinas(State(state): State<AppState>) -> ApiResult<Vec<Oficina>> {
    let oficinas = state.workflow.list_oficinas().await?;
    Ok(Json(oficinas))
}
