// Expediente workflow: transition table and engine

pub mod engine;
pub mod state;

pub use engine::{ExpedienteWorkflowEngine, NuevoExpediente};
pub use state::{TransitionTable, WorkflowEvent};
