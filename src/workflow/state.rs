// Expediente transition table
// One place decides which event is legal in which state

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FirmaError, FirmaResult};
use crate::models::{EstadoExpediente, WorkflowConfig};

/// Events that may change the state of an expediente
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEvent {
    AgregarDocumento,
    Enviar,
    Recibir,
    SolicitarRevision,
    Observar,
    Subsanar,
    Aprobar,
    Rechazar,
    Archivar,
}

impl WorkflowEvent {
    pub const ALL: [WorkflowEvent; 9] = [
        WorkflowEvent::AgregarDocumento,
        WorkflowEvent::Enviar,
        WorkflowEvent::Recibir,
        WorkflowEvent::SolicitarRevision,
        WorkflowEvent::Observar,
        WorkflowEvent::Subsanar,
        WorkflowEvent::Aprobar,
        WorkflowEvent::Rechazar,
        WorkflowEvent::Archivar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowEvent::AgregarDocumento => "agregar_documento",
            WorkflowEvent::Enviar => "enviar",
            WorkflowEvent::Recibir => "recibir",
            WorkflowEvent::SolicitarRevision => "solicitar_revision",
            WorkflowEvent::Observar => "observar",
            WorkflowEvent::Subsanar => "subsanar",
            WorkflowEvent::Aprobar => "aprobar",
            WorkflowEvent::Rechazar => "rechazar",
            WorkflowEvent::Archivar => "archivar",
        }
    }
}

impl fmt::Display for WorkflowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State x event -> state, parameterised by the workflow policy
#[derive(Debug, Clone)]
pub struct TransitionTable {
    rechazado_terminal: bool,
    return_to_origin_state: EstadoExpediente,
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::from_config(&WorkflowConfig::default())
    }
}

impl TransitionTable {
    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self {
            rechazado_terminal: config.rechazado_terminal,
            return_to_origin_state: config.return_to_origin_state,
        }
    }

    fn lookup(&self, from: EstadoExpediente, event: WorkflowEvent) -> Option<EstadoExpediente> {
        use EstadoExpediente::*;
        use WorkflowEvent::*;

        match (from, event) {
            (Iniciado, AgregarDocumento) => Some(EnTramite),
            (EnTramite | PendienteRevision | ConObservaciones, AgregarDocumento) => Some(from),

            (EnTramite | ConObservaciones | Aprobado, Enviar) => Some(Derivado),
            (Derivado, Recibir) => Some(EnTramite),

            (EnTramite, SolicitarRevision) => Some(PendienteRevision),
            (PendienteRevision, Observar) => Some(ConObservaciones),
            (ConObservaciones, Subsanar) => Some(EnTramite),
            (PendienteRevision, Aprobar) => Some(Aprobado),
            (EnTramite | PendienteRevision | ConObservaciones, Rechazar) => Some(Rechazado),

            (Aprobado, Archivar) => Some(Archivado),
            (Rechazado, Archivar) if !self.rechazado_terminal => Some(Archivado),

            _ => None,
        }
    }

    /// Next state for `event`, or `InvalidTransition`
    pub fn next_state(
        &self,
        from: EstadoExpediente,
        event: WorkflowEvent,
    ) -> FirmaResult<EstadoExpediente> {
        self.lookup(from, event)
            .ok_or_else(|| FirmaError::InvalidTransition {
                from,
                event: event.as_str().to_string(),
            })
    }

    /// State reached by `enviar`: `derivado` when leaving for another office,
    /// the configured return state when going back to the origin office
    pub fn enviar_state(
        &self,
        from: EstadoExpediente,
        returning_to_origin: bool,
    ) -> FirmaResult<EstadoExpediente> {
        let next = self.next_state(from, WorkflowEvent::Enviar)?;
        Ok(if returning_to_origin {
            self.return_to_origin_state
        } else {
            next
        })
    }

    pub fn is_terminal(&self, estado: EstadoExpediente) -> bool {
        self.allowed_events(estado).is_empty()
    }

    pub fn allowed_events(&self, from: EstadoExpediente) -> Vec<WorkflowEvent> {
        WorkflowEvent::ALL
            .into_iter()
            .filter(|event| self.lookup(from, *event).is_some())
            .collect()
    }
}
