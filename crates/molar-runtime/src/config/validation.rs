//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, MolarConfig, SessionConfig};

/// Accepted QR lifetime range, in seconds.
const QR_TTL_RANGE: std::ops::RangeInclusive<u64> = 30..=300;

/// Validates the entire configuration.
pub fn validate_config(config: &MolarConfig) -> ConfigResult<()> {
    if config.server.port == 0 {
        return Err(ConfigError::InvalidPort(config.server.port));
    }
    if config.server.host.trim().is_empty() {
        return Err(ConfigError::validation("server.host must not be empty"));
    }

    validate_url(&config.backend.base_url, &["http", "https"])?;
    if config.backend.timeout_ms == 0 {
        return Err(ConfigError::validation(
            "backend.timeout_ms must be greater than 0",
        ));
    }

    validate_url(&config.gateway.url, &["ws", "wss"])?;
    if config.gateway.request_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "gateway.request_timeout_ms must be greater than 0",
        ));
    }

    validate_session(&config.session)?;

    if config.dispatch.bulk_interval_ms == 0 {
        return Err(ConfigError::validation(
            "dispatch.bulk_interval_ms must be greater than 0",
        ));
    }

    if config.relay.fallback_message.trim().is_empty() {
        return Err(ConfigError::validation(
            "relay.fallback_message must not be empty",
        ));
    }

    if config.logging.output == LogOutput::File && config.logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output = \"file\"",
        ));
    }

    Ok(())
}

fn validate_session(session: &SessionConfig) -> ConfigResult<()> {
    let intervals = [
        ("session.qr_sweep_interval_secs", session.qr_sweep_interval_secs),
        ("session.reconnect_delay_secs", session.reconnect_delay_secs),
        ("session.reinit_delay_secs", session.reinit_delay_secs),
        ("session.keepalive_interval_secs", session.keepalive_interval_secs),
    ];
    if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
        return Err(ConfigError::validation(format!(
            "{name} must be greater than 0"
        )));
    }

    if !QR_TTL_RANGE.contains(&session.qr_ttl_secs) {
        return Err(ConfigError::validation(format!(
            "session.qr_ttl_secs must be between {} and {}, got {}",
            QR_TTL_RANGE.start(),
            QR_TTL_RANGE.end(),
            session.qr_ttl_secs
        )));
    }

    Ok(())
}

/// Validates URL format against the allowed schemes.
fn validate_url(url: &str, schemes: &[&str]) -> ConfigResult<()> {
    let Some((scheme, rest)) = url.split_once("://") else {
        return Err(ConfigError::invalid_url(url, "missing scheme"));
    };

    if !schemes.contains(&scheme) {
        return Err(ConfigError::invalid_url(
            url,
            format!("scheme must be one of {schemes:?}"),
        ));
    }

    if rest.is_empty() || rest.starts_with('/') {
        return Err(ConfigError::invalid_url(url, "missing host"));
    }

    Ok(())
}
