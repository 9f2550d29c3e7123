// Certificate authority registry
// Built once at start-up and passed to the engines that need it

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::authority::{
    CertificateAuthorityProvider, CertificateRequest, IdentityValidation, ProviderResponse,
    ProviderStatus,
};
use super::external::ExternalProvider;
use super::internal::InternalProvider;
use super::keys::KeyVault;
use crate::error::{FirmaError, FirmaResult};
use crate::models::{
    AppConfig, CertificateAuthority, CertificateType, ProviderKind, SubjectIdentity,
};

/// Dispatches issuance, identity checks, status polls and revocations by provider id
#[derive(Clone, Default)]
pub struct CertificateAuthorityRegistry {
    providers: HashMap<ProviderKind, Arc<dyn CertificateAuthorityProvider>>,
}

impl CertificateAuthorityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry described by the configuration
    pub fn from_config(config: &AppConfig, vault: Arc<KeyVault>) -> FirmaResult<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(InternalProvider::new(
            &config.internal_ca,
            vault.clone(),
            config.keys.rsa_bits,
        )));

        for (kind, provider_config) in config.external_providers() {
            registry.register(Arc::new(ExternalProvider::new(
                kind,
                provider_config,
                vault.clone(),
                config.keys.rsa_bits,
            )?));
        }

        info!(
            "Certificate authority registry ready with {} provider(s)",
            registry.providers.len()
        );
        Ok(registry)
    }

    /// Register a provider, replacing any previous one of the same kind
    pub fn register(&mut self, provider: Arc<dyn CertificateAuthorityProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    pub fn provider(&self, name: &str) -> FirmaResult<Arc<dyn CertificateAuthorityProvider>> {
        let kind = ProviderKind::parse(name)
            .ok_or_else(|| FirmaError::UnsupportedProvider(name.to_string()))?;
        self.get(kind)
    }

    pub fn get(&self, kind: ProviderKind) -> FirmaResult<Arc<dyn CertificateAuthorityProvider>> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| FirmaError::UnsupportedProvider(kind.to_string()))
    }

    pub fn authorities(&self) -> Vec<CertificateAuthority> {
        let mut authorities: Vec<CertificateAuthority> = self
            .providers
            .values()
            .map(|p| p.authority().clone())
            .collect();
        authorities.sort_by_key(|a| a.trust_tier);
        authorities
    }

    pub async fn request_certificate(
        &self,
        provider: &str,
        subject: &SubjectIdentity,
        certificate_type: &CertificateType,
    ) -> FirmaResult<ProviderResponse> {
        let request = CertificateRequest {
            subject: subject.clone(),
            certificate_type: certificate_type.clone(),
        };
        self.provider(provider)?.request_certificate(&request).await
    }

    pub async fn validate_identity(
        &self,
        provider: &str,
        subject: &SubjectIdentity,
    ) -> FirmaResult<IdentityValidation> {
        self.provider(provider)?.validate_identity(subject).await
    }

    pub async fn get_status(&self, provider: &str, external_id: &str) -> FirmaResult<ProviderStatus> {
        self.provider(provider)?.get_status(external_id).await
    }

    pub async fn revoke(&self, provider: &str, external_id: &str) -> FirmaResult<()> {
        self.provider(provider)?.revoke(external_id).await
    }
}
