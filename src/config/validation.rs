use crate::config::types::{
    Config, FetcherConfig, ImageConfig, OutputConfig, ServerConfig, SiteConfig,
};
use crate::ConfigError;
use std::net::SocketAddr;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_image_config(&config.images)?;
    validate_output_config(&config.output)?;
    validate_server_config(&config.server)?;
    Ok(())
}

/// Validates the stock list location
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    config.country_code()?;

    if config.page_size < 1 || config.page_size > 500 {
        return Err(ConfigError::Validation(format!(
            "page-size must be between 1 and 500, got {}",
            config.page_size
        )));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max-pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    Ok(())
}

/// Validates retry and pacing settings
fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.max_retries < 1 || config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be between 1 and 10, got {}",
            config.max_retries
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "timeout-secs must be >= 1, got {}",
            config.timeout_secs
        )));
    }

    if config.min_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "min-delay-ms ({}) must not exceed max-delay-ms ({})",
            config.min_delay_ms, config.max_delay_ms
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates cropping settings
fn validate_image_config(config: &ImageConfig) -> Result<(), ConfigError> {
    if config.crop_percentage < 1 || config.crop_percentage > 15 {
        return Err(ConfigError::Validation(format!(
            "crop-percentage must be between 1 and 15, got {}",
            config.crop_percentage
        )));
    }

    if config.crop_quality < 1 || config.crop_quality > 100 {
        return Err(ConfigError::Validation(format!(
            "crop-quality must be between 1 and 100, got {}",
            config.crop_quality
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.vehicles_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "vehicles-dir cannot be empty".to_string(),
        ));
    }

    if config.state_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "state-path cannot be empty".to_string(),
        ));
    }

    if config.history_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "history-path cannot be empty".to_string(),
        ));
    }

    if config.posted_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "posted-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_server_config(config: &ServerConfig) -> Result<(), ConfigError> {
    config.bind.parse::<SocketAddr>().map_err(|e| {
        ConfigError::Validation(format!("Invalid server bind address '{}': {}", config.bind, e))
    })?;

    if config.run_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "run-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let mut config = Config::default();
        config.site.base_url = "ftp://example.com".to_string();
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));

        config.site.base_url = "not a url".to_string();
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_rejects_inverted_delays() {
        let mut config = Config::default();
        config.fetcher.min_delay_ms = 5000;
        config.fetcher.max_delay_ms = 1000;
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_zero_delays_are_allowed() {
        let mut config = Config::default();
        config.fetcher.min_delay_ms = 0;
        config.fetcher.max_delay_ms = 0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_rejects_crop_out_of_range() {
        let mut config = Config::default();
        config.images.crop_percentage = 40;
        assert!(validate(&config).is_err());

        config.images.crop_percentage = 7;
        config.images.crop_quality = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_bad_bind_address() {
        let mut config = Config::default();
        config.server.bind = "localhost".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_max_pages() {
        let mut config = Config::default();
        config.site.max_pages = 0;
        assert!(validate(&config).is_err());
    }
}
