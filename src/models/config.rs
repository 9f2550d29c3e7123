use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::certificate::{CertificateType, ProviderKind};
use super::expediente::{EstadoExpediente, Oficina};

/// Root application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub keys: KeyConfig,
    #[serde(default)]
    pub internal_ca: InternalCaConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Certificate type catalog; defaults to `interno`, `gubernamental`, `comercial`
    #[serde(default = "default_certificate_types")]
    pub certificate_types: Vec<CertificateType>,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    /// Offices seeded into the store at start-up
    #[serde(default)]
    pub oficinas: Vec<Oficina>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            keys: KeyConfig::default(),
            internal_ca: InternalCaConfig::default(),
            lifecycle: LifecycleConfig::default(),
            providers: ProvidersConfig::default(),
            certificate_types: default_certificate_types(),
            workflow: WorkflowConfig::default(),
            oficinas: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0:3000".to_string()
}

/// Key generation and sealing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    /// RSA modulus size for generated keys (default: 2048)
    #[serde(default = "default_rsa_bits")]
    pub rsa_bits: usize,
    /// Secret the key-sealing master key is derived from.
    /// Overridden by the KEY_ENCRYPTION_SECRET environment variable.
    #[serde(default)]
    pub encryption_secret: String,
    #[serde(default = "default_kdf_salt")]
    pub kdf_salt: String,
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            rsa_bits: default_rsa_bits(),
            encryption_secret: String::new(),
            kdf_salt: default_kdf_salt(),
            kdf_iterations: default_kdf_iterations(),
        }
    }
}

fn default_rsa_bits() -> usize {
    2048
}

fn default_kdf_salt() -> String {
    "expediente-firma-key-vault".to_string()
}

fn default_kdf_iterations() -> u32 {
    crate::certs::keys::DEFAULT_KDF_ITERATIONS
}

/// Identity of the internal self-signing authority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalCaConfig {
    #[serde(default = "default_internal_name")]
    pub name: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default)]
    pub organization: Option<String>,
    /// Validity window of issued certificates (default: 365 days)
    #[serde(default = "default_validity_days")]
    pub validity_days: i64,
}

impl Default for InternalCaConfig {
    fn default() -> Self {
        Self {
            name: default_internal_name(),
            country: default_country(),
            organization: None,
            validity_days: default_validity_days(),
        }
    }
}

fn default_internal_name() -> String {
    "Autoridad Certificante Interna".to_string()
}

fn default_country() -> String {
    "AR".to_string()
}

fn default_validity_days() -> i64 {
    365
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Days before expiry at which a certificate becomes `por_vencer` (default: 30)
    #[serde(default = "default_expiry_warning_days")]
    pub expiry_warning_days: i64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            expiry_warning_days: default_expiry_warning_days(),
        }
    }
}

fn default_expiry_warning_days() -> i64 {
    30
}

/// Remote certificate authorities; an absent section means the provider is not registered
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    pub government: Option<ExternalProviderConfig>,
    pub commercial: Option<ExternalProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalProviderConfig {
    pub name: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_trust_tier")]
    pub trust_tier: u8,
    pub base_url: String,
    /// Request timeout in seconds (default: 10)
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
    /// Bearer token sent to the provider, if it requires one
    #[serde(default)]
    pub api_token: Option<String>,
    /// Documents this authority always asks for, merged into every pending request
    #[serde(default)]
    pub required_documents: Vec<String>,
}

fn default_trust_tier() -> u8 {
    1
}

fn default_provider_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Whether `rechazado` is terminal (default: true)
    #[serde(default = "default_true")]
    pub rechazado_terminal: bool,
    /// State reached when an expediente is sent back to its origin office
    #[serde(default = "default_return_state")]
    pub return_to_origin_state: EstadoExpediente,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            rechazado_terminal: true,
            return_to_origin_state: default_return_state(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_return_state() -> EstadoExpediente {
    EstadoExpediente::EnTramite
}

fn default_certificate_types() -> Vec<CertificateType> {
    vec![
        CertificateType::internal(),
        CertificateType::government(),
        CertificateType::commercial(),
    ]
}

impl AppConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(2048..=4096).contains(&self.keys.rsa_bits) {
            return Err(format!(
                "keys.rsa_bits must be between 2048 and 4096, got {}",
                self.keys.rsa_bits
            ));
        }

        if self.keys.encryption_secret.is_empty() {
            return Err("keys.encryption_secret (or KEY_ENCRYPTION_SECRET) must be set".to_string());
        }

        if self.keys.kdf_iterations == 0 {
            return Err("keys.kdf_iterations must be positive".to_string());
        }

        if self.lifecycle.expiry_warning_days <= 0 {
            return Err("lifecycle.expiry_warning_days must be positive".to_string());
        }

        if self.internal_ca.validity_days <= 0 {
            return Err("internal_ca.validity_days must be positive".to_string());
        }

        for (kind, provider) in self.external_providers() {
            if provider.base_url.is_empty() {
                return Err(format!("Provider '{}' must have a base_url", kind));
            }
        }

        if self.certificate_types.is_empty() {
            return Err("At least one certificate type must be configured".to_string());
        }

        let mut seen = HashSet::new();
        for oficina in &self.oficinas {
            if !seen.insert(oficina.id) {
                return Err(format!("Duplicated oficina id {}", oficina.id));
            }
        }

        match self.workflow.return_to_origin_state {
            EstadoExpediente::EnTramite | EstadoExpediente::Derivado => {}
            other => {
                return Err(format!(
                    "workflow.return_to_origin_state must be en_tramite or derivado, got {}",
                    other
                ));
            }
        }

        Ok(())
    }

    /// Configured remote providers
    pub fn external_providers(&self) -> Vec<(ProviderKind, &ExternalProviderConfig)> {
        let mut providers = Vec::new();
        if let Some(government) = &self.providers.government {
            providers.push((ProviderKind::Government, government));
        }
        if let Some(commercial) = &self.providers.commercial {
            providers.push((ProviderKind::Commercial, commercial));
        }
        providers
    }

    /// Look up a certificate type by its catalog code
    pub fn certificate_type(&self, code: &str) -> Option<&CertificateType> {
        self.certificate_types.iter().find(|t| t.code == code)
    }
}
