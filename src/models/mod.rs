pub mod certificate;
pub mod config;
pub mod expediente;
pub mod signature;

pub use certificate::{
    Certificate, CertificateAuthority, CertificateStatus, CertificateType,
    PendingCertificateRequest, ProcessingTime, ProviderKind, RequestStatus, SubjectIdentity,
    ValidityLevel,
};
pub use config::{
    AppConfig, ExternalProviderConfig, InternalCaConfig, KeyConfig, LifecycleConfig,
    ProvidersConfig, ServerConfig, WorkflowConfig,
};
pub use expediente::{
    DocumentClass, EstadoExpediente, EstadoFirma, Expediente, ExpedienteDocument, NewDocument,
    Oficina, OficinaId, Prioridad, TipoDocumento, WorkflowMovimiento,
};
pub use signature::{ALGORITHM_RSA_SHA256, SignatureExport, SignatureRecord};
