pub mod authority;
pub mod external;
pub mod import;
pub mod internal;
pub mod keys;
pub mod lifecycle;
pub mod registry;

pub use authority::{
    CertificateAuthorityProvider, CertificateRequest, IdentityValidation, IssuedCertificate,
    PendingIssuance, ProviderResponse, ProviderStatus, RemoteCertificate,
};
pub use external::ExternalProvider;
pub use import::{ImportedMaterial, extract_pkcs12};
pub use internal::InternalProvider;
pub use keys::{DEFAULT_KDF_ITERATIONS, KeyVault, SealedPrivateKey, generate_rsa_key};
pub use lifecycle::{CertificateLifecycleManager, IssuanceOutcome};
pub use registry::CertificateAuthorityRegistry;
