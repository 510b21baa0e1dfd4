use std::path::Path;

use super::AppConfig;
use crate::error::{AppError, Result};

/// Load configuration from a TOML file
///
/// A missing path yields the defaults. Sections and fields absent from the
/// file fall back to their defaults as well. The result is not validated;
/// callers apply their overrides first and then call [`validate`].
pub async fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let Some(path) = path else {
        return Ok(AppConfig::default());
    };

    let raw = tokio::fs::read_to_string(path).await?;
    let config: AppConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;

    tracing::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Reject settings the relay cannot run with
pub fn validate(config: &AppConfig) -> Result<()> {
    if config.media.url.is_empty() {
        return Err(AppError::Config("media.url must not be empty".to_string()));
    }
    if !config.media.url.starts_with("ws://") && !config.media.url.starts_with("wss://") {
        return Err(AppError::Config(format!(
            "media.url must be a ws:// or wss:// URL, got {}",
            config.media.url
        )));
    }
    if config.media.negotiation_timeout_secs == 0 {
        return Err(AppError::Config(
            "media.negotiation_timeout_secs must be positive".to_string(),
        ));
    }
    if config.signaling.outbound_queue == 0 {
        return Err(AppError::Config(
            "signaling.outbound_queue must be positive".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_defaults_without_file() {
        let config = load_config(None).await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.web.http_port, 5000);
        assert_eq!(config.media.url, "ws://localhost:8888/kurento");
    }

    #[tokio::test]
    async fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[media]\nurl = \"ws://kms.local:8888/kurento\"\nconnect_retries = 5\n\n[web]\nhttp_port = 9000"
        )
        .unwrap();

        let config = load_config(Some(file.path())).await.unwrap();
        assert_eq!(config.media.url, "ws://kms.local:8888/kurento");
        assert_eq!(config.media.connect_retries, 5);
        assert_eq!(config.media.negotiation_timeout_secs, 15);
        assert_eq!(config.web.http_port, 9000);
        assert_eq!(config.web.bind_address, "0.0.0.0");
    }

    #[tokio::test]
    async fn test_rejects_non_websocket_url() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[media]\nurl = \"http://kms.local\"").unwrap();

        let config = load_config(Some(file.path())).await.unwrap();
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[tokio::test]
    async fn test_override_replaces_invalid_file_url() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[media]\nurl = \"http://kms.local\"").unwrap();

        let mut config = load_config(Some(file.path())).await.unwrap();
        config.media.url = "ws://kms.local:8888/kurento".to_string();
        validate(&config).unwrap();
    }

    #[tokio::test]
    async fn test_rejects_malformed_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[media\nurl = ").unwrap();

        let err = load_config(Some(file.path())).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
