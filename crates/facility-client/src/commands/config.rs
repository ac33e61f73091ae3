//! Configuration commands.

use std::path::{Path, PathBuf};

use tokio::net::lookup_host;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Dump the current configuration to stdout.
pub fn dump(config: &ClientConfig, path: &Path) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", path.display());
    println!("{}", toml_str);

    Ok(())
}

/// Validate the configuration.
pub async fn validate(config: &ClientConfig) -> ClientResult<()> {
    config
        .server
        .validate()
        .map_err(|e| ClientError::Config(e.to_string()))?;

    if config.client.timeout_secs == 0 {
        return Err(ClientError::Config(
            "client timeout_secs must be positive".to_string(),
        ));
    }

    let resolved = lookup_host(config.client.server.as_str())
        .await
        .map_err(|e| {
            ClientError::Config(format!(
                "invalid server address {}: {}",
                config.client.server, e
            ))
        })?
        .count();
    if resolved == 0 {
        return Err(ClientError::Config(format!(
            "server address {} did not resolve",
            config.client.server
        )));
    }

    println!(
        "Configuration is valid ({} facilities).",
        config.server.facilities.len()
    );
    Ok(())
}

/// Show the configuration file path.
pub fn path(explicit: Option<&PathBuf>) -> ClientResult<()> {
    let config_path = explicit.cloned().unwrap_or_else(ClientConfig::default_path);
    println!("config: {}", config_path.display());
    Ok(())
}
