// Audit logging for certificate, signature and workflow operations
// Append-only trail kept alongside the movement log for compliance reviews

pub mod logger;
pub mod storage;
pub mod types;

pub use logger::AuditLogger;
pub use storage::{AuditStorage, MemoryAuditStorage};
pub use types::{AuditAction, AuditEntry, AuditLevel, AuditQuery, ResourceType};
