//! Config environment variable tests
//!
//! These tests verify that Config::from_env() correctly reads and applies
//! environment variable overrides. Note that Config::from_env() also loads
//! from .env file via dotenvy, so these tests focus on override behavior.
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use insight_engine::config::{Config, LogFormat};
use serial_test::serial;
use std::env;

#[test]
#[serial]
fn test_config_defaults() {
    for key in [
        "NARRATIVE_API_KEY",
        "NARRATIVE_BASE_URL",
        "NARRATIVE_MODEL",
        "ANOMALY_THRESHOLD",
        "TOP_HIGHLIGHTS",
        "LOG_FORMAT",
    ] {
        env::remove_var(key);
    }

    let config = Config::from_env().unwrap();
    assert_eq!(config.narrative.base_url, "https://api.openai.com");
    assert_eq!(config.narrative.model, "gpt-4o");
    assert_eq!(config.analysis.anomaly_threshold, 2.0);
    assert_eq!(config.analysis.top_highlights, 5);
    assert_eq!(config.request.timeout_ms, 30000);
    assert_eq!(config.logging.format, LogFormat::Pretty);
}

#[test]
#[serial]
fn test_missing_api_key_is_tolerated() {
    env::remove_var("NARRATIVE_API_KEY");

    let config = Config::from_env().unwrap();
    assert!(config.narrative.api_key.is_none());
}

#[test]
#[serial]
fn test_empty_api_key_is_treated_as_absent() {
    env::set_var("NARRATIVE_API_KEY", "");

    let config = Config::from_env().unwrap();
    assert!(config.narrative.api_key.is_none());

    env::remove_var("NARRATIVE_API_KEY");
}

#[test]
#[serial]
fn test_custom_narrative_settings() {
    env::set_var("NARRATIVE_API_KEY", "sk-test");
    env::set_var("NARRATIVE_BASE_URL", "https://custom.api.com");
    env::set_var("NARRATIVE_MODEL", "gpt-4o-mini");

    let config = Config::from_env().unwrap();
    assert_eq!(config.narrative.api_key.as_deref(), Some("sk-test"));
    assert_eq!(config.narrative.base_url, "https://custom.api.com");
    assert_eq!(config.narrative.model, "gpt-4o-mini");

    env::remove_var("NARRATIVE_API_KEY");
    env::remove_var("NARRATIVE_BASE_URL");
    env::remove_var("NARRATIVE_MODEL");
}

#[test]
#[serial]
fn test_analysis_threshold_overrides() {
    env::set_var("ANOMALY_THRESHOLD", "2.5");
    env::set_var("TOP_HIGHLIGHTS", "3");

    let config = Config::from_env().unwrap();
    assert_eq!(config.analysis.anomaly_threshold, 2.5);
    assert_eq!(config.analysis.top_highlights, 3);

    env::remove_var("ANOMALY_THRESHOLD");
    env::remove_var("TOP_HIGHLIGHTS");
}

#[test]
#[serial]
fn test_json_log_format() {
    env::set_var("LOG_FORMAT", "json");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Json);

    env::remove_var("LOG_FORMAT");
}

#[test]
#[serial]
fn test_invalid_numeric_override_falls_back_to_default() {
    env::set_var("ANOMALY_THRESHOLD", "not-a-number");

    let config = Config::from_env().unwrap();
    assert_eq!(config.analysis.anomaly_threshold, 2.0);

    env::remove_var("ANOMALY_THRESHOLD");
}
