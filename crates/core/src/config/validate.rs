use std::collections::HashSet;

use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Client and source names are unique
/// - At most one client is marked default
/// - Limits and intervals are positive where configured
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for client in &config.clients {
        if client.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "client name cannot be empty".to_string(),
            ));
        }
        if !names.insert(client.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate client name: {}",
                client.name
            )));
        }
        if client.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "client {} has an empty url",
                client.name
            )));
        }
    }

    let defaults = config.clients.iter().filter(|c| c.default).count();
    if defaults > 1 {
        return Err(ConfigError::ValidationError(
            "at most one client can be marked default".to_string(),
        ));
    }

    let mut source_names = HashSet::new();
    for source in &config.sources {
        if !source_names.insert(source.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate source name: {}",
                source.name
            )));
        }
    }

    if config.vpn.poll_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "vpn.poll_interval_secs cannot be 0".to_string(),
        ));
    }
    if config.vpn.enforce && config.vpn.status_url.is_none() {
        return Err(ConfigError::ValidationError(
            "vpn.status_url is required when vpn.enforce is true".to_string(),
        ));
    }

    if config.search.source_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "search.source_timeout_secs cannot be 0".to_string(),
        ));
    }
    if config.search.max_results == 0 {
        return Err(ConfigError::ValidationError(
            "search.max_results cannot be 0".to_string(),
        ));
    }

    if let Some(ratio) = config.seeding.ratio_limit {
        if ratio <= 0.0 || !ratio.is_finite() {
            return Err(ConfigError::ValidationError(
                "seeding.ratio_limit must be positive".to_string(),
            ));
        }
    }
    if config.seeding.time_limit_minutes == Some(0) {
        return Err(ConfigError::ValidationError(
            "seeding.time_limit_minutes cannot be 0".to_string(),
        ));
    }

    if config.reconcile.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "reconcile.poll_interval_ms cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config_from_str, VpnConfig};

    fn base_config() -> Config {
        Config {
            vpn: VpnConfig {
                enforce: false,
                ..VpnConfig::default()
            },
            ..Config::default()
        }
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn test_validate_duplicate_client_names() {
        let config = load_config_from_str(
            r#"
[vpn]
enforce = false

[[clients]]
name = "home"
kind = "transmission"
url = "http://localhost:9091"

[[clients]]
name = "home"
kind = "transmission"
url = "http://localhost:9092"
"#,
        )
        .unwrap();

        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_multiple_defaults() {
        let config = load_config_from_str(
            r#"
[vpn]
enforce = false

[[clients]]
name = "a"
kind = "transmission"
url = "http://localhost:9091"
default = true

[[clients]]
name = "b"
kind = "transmission"
url = "http://localhost:9092"
default = true
"#,
        )
        .unwrap();

        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_enforce_requires_status_url() {
        let mut config = Config::default();
        config.vpn.enforce = true;
        config.vpn.status_url = None;
        assert!(validate_config(&config).is_err());

        config.vpn.status_url = Some("http://localhost:8000/status".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_ratio_limit_must_be_positive() {
        let mut config = base_config();
        config.seeding.ratio_limit = Some(-1.0);
        assert!(validate_config(&config).is_err());
    }
}
