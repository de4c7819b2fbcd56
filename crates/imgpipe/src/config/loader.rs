use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.concurrency == 0 {
        return Err(ConfigError::Validation {
            message: "concurrency must be at least 1".to_string(),
        });
    }

    if config.ledger_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation {
            message: "ledger_path must not be empty".to_string(),
        });
    }

    if config.ledger_path.file_name().is_none() {
        return Err(ConfigError::Validation {
            message: format!(
                "ledger_path must name a file: {}",
                config.ledger_path.display()
            ),
        });
    }

    if config.storage_domains.iter().all(|d| d.trim().is_empty()) {
        return Err(ConfigError::Validation {
            message: "storage_domains must contain at least one domain".to_string(),
        });
    }

    Ok(())
}
