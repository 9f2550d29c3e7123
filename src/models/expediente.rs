use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::certificate::ValidityLevel;

pub type OficinaId = i64;

/// Administrative office able to hold or receive expedientes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Oficina {
    pub id: OficinaId,
    pub codigo: String,
    pub nombre: String,
    pub email: Option<String>,
    pub telefono: Option<String>,
}

/// Workflow state of an expediente
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EstadoExpediente {
    Iniciado,
    EnTramite,
    PendienteRevision,
    ConObservaciones,
    Aprobado,
    Rechazado,
    Archivado,
    Derivado,
}

impl EstadoExpediente {
    pub fn as_str(&self) -> &'static str {
        match self {
            EstadoExpediente::Iniciado => "iniciado",
            EstadoExpediente::EnTramite => "en_tramite",
            EstadoExpediente::PendienteRevision => "pendiente_revision",
            EstadoExpediente::ConObservaciones => "con_observaciones",
            EstadoExpediente::Aprobado => "aprobado",
            EstadoExpediente::Rechazado => "rechazado",
            EstadoExpediente::Archivado => "archivado",
            EstadoExpediente::Derivado => "derivado",
        }
    }

    pub const ALL: [EstadoExpediente; 8] = [
        EstadoExpediente::Iniciado,
        EstadoExpediente::EnTramite,
        EstadoExpediente::PendienteRevision,
        EstadoExpediente::ConObservaciones,
        EstadoExpediente::Aprobado,
        EstadoExpediente::Rechazado,
        EstadoExpediente::Archivado,
        EstadoExpediente::Derivado,
    ];
}

impl fmt::Display for EstadoExpediente {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Prioridad {
    Baja,
    #[default]
    Normal,
    Alta,
    Urgente,
}

/// Government case file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expediente {
    pub id: Uuid,
    /// Human readable number, e.g. `EXP-12`
    pub numero: String,
    pub titulo: String,
    pub estado: EstadoExpediente,
    pub prioridad: Prioridad,
    pub oficina_origen_id: OficinaId,
    pub oficina_actual_id: OficinaId,
    pub creado_por: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped on every committed change
    pub version: u64,
}

/// Document classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TipoDocumento {
    Oficial,
    Resolucion,
    Disposicion,
    NoOficial,
    Informe,
    Nota,
    Memorandum,
    Anexo,
}

impl TipoDocumento {
    pub fn clase(&self) -> DocumentClass {
        match self {
            TipoDocumento::Oficial | TipoDocumento::Resolucion | TipoDocumento::Disposicion => {
                DocumentClass::Oficial
            }
            TipoDocumento::NoOficial
            | TipoDocumento::Informe
            | TipoDocumento::Nota
            | TipoDocumento::Memorandum
            | TipoDocumento::Anexo => DocumentClass::NoOficial,
        }
    }
}

/// Signing tier of a document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentClass {
    Oficial,
    NoOficial,
}

impl DocumentClass {
    /// Minimum certificate level allowed to sign documents of this class
    pub fn required_level(&self) -> Option<ValidityLevel> {
        match self {
            DocumentClass::Oficial => Some(ValidityLevel::Government),
            DocumentClass::NoOficial => None,
        }
    }

    pub fn accepts(&self, level: ValidityLevel) -> bool {
        match self.required_level() {
            Some(required) => required == level,
            None => true,
        }
    }
}

impl fmt::Display for DocumentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentClass::Oficial => f.write_str("oficial"),
            DocumentClass::NoOficial => f.write_str("no_oficial"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EstadoFirma {
    Pendiente,
    Firmado,
    Rechazado,
}

impl fmt::Display for EstadoFirma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstadoFirma::Pendiente => f.write_str("pendiente"),
            EstadoFirma::Firmado => f.write_str("firmado"),
            EstadoFirma::Rechazado => f.write_str("rechazado"),
        }
    }
}

/// A document attached to an expediente
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpedienteDocument {
    pub id: Uuid,
    pub expediente_id: Uuid,
    pub nombre: String,
    /// Canonical folio number, unique and increasing within the expediente
    pub numero_foja: u32,
    pub tipo: TipoDocumento,
    /// SHA-256 of the original bytes, lowercase hex
    pub content_hash: String,
    /// Blob key of the original bytes
    pub blob_key: String,
    pub estado_firma: EstadoFirma,
    pub firmado_por: Option<String>,
    pub signature_id: Option<Uuid>,
    pub certificate_id: Option<Uuid>,
    pub motivo_rechazo: Option<String>,
    pub cargado_por: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExpedienteDocument {
    /// Display alias of the folio number
    pub fn orden_secuencial(&self) -> u32 {
        self.numero_foja
    }

    pub fn clase(&self) -> DocumentClass {
        self.tipo.clase()
    }
}

/// Data needed to attach a new document; the store assigns the folio
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: Uuid,
    pub nombre: String,
    pub tipo: TipoDocumento,
    pub content_hash: String,
    pub blob_key: String,
    pub cargado_por: String,
}

/// Append-only record of a workflow state change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowMovimiento {
    pub id: Uuid,
    pub expediente_id: Uuid,
    pub oficina_origen_id: OficinaId,
    pub oficina_destino_id: OficinaId,
    pub estado_anterior: EstadoExpediente,
    pub estado_nuevo: EstadoExpediente,
    pub actor: String,
    pub observacion: Option<String>,
    pub documento_ids: Vec<Uuid>,
    pub timestamp: DateTime<Utc>,
}
