use crate::models::AppConfig;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Environment variable that overrides `keys.encryption_secret`
pub const KEY_SECRET_ENV: &str = "KEY_ENCRYPTION_SECRET";

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Arc<AppConfig>, String> {
    let path = path.as_ref();
    info!("Loading configuration from: {}", path.display());

    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

    let config = parse_config(&contents)?;
    finish(config)
}

/// Parse YAML without touching the environment or validating
pub fn parse_config(contents: &str) -> Result<AppConfig, String> {
    serde_yaml::from_str(contents).map_err(|e| format!("Failed to parse YAML config: {}", e))
}

/// Load configuration with fallback options
pub fn load_config_with_fallback() -> Result<Arc<AppConfig>, String> {
    if let Ok(config_path) = std::env::var("CONFIG_PATH") {
        match load_config(&config_path) {
            Ok(config) => return Ok(config),
            Err(e) => warn!(
                "Failed to load config from CONFIG_PATH ({}): {}",
                config_path, e
            ),
        }
    }

    let paths = ["config.yaml", "config.yml"];

    for path in paths {
        if Path::new(path).exists() {
            match load_config(path) {
                Ok(config) => return Ok(config),
                Err(e) => warn!("Failed to load config from '{}': {}", path, e),
            }
        }
    }

    warn!(
        "No configuration file found, using defaults (set CONFIG_PATH or create config.yaml)"
    );
    finish(AppConfig::default())
}

/// Apply the secret override, validate and log a summary
fn finish(mut config: AppConfig) -> Result<Arc<AppConfig>, String> {
    apply_secret_override(&mut config, std::env::var(KEY_SECRET_ENV).ok());
    config.validate()?;

    info!(
        "Configuration loaded: {} oficina(s), {} certificate type(s), {} external provider(s)",
        config.oficinas.len(),
        config.certificate_types.len(),
        config.external_providers().len()
    );
    for (kind, provider) in config.external_providers() {
        info!("  Provider '{}' ({}) at {}", kind, provider.name, provider.base_url);
    }

    Ok(Arc::new(config))
}

fn apply_secret_override(config: &mut AppConfig, secret: Option<String>) {
    if let Some(secret) = secret.filter(|s| !s.is_empty()) {
        config.keys.encryption_secret = secret;
    }
}
