//! Integration tests for socportal-core infrastructure

use socportal_core::{
    credential_error, init_logging, storage_error, validation_error, ErrorContext,
    LogFormat, LoggingConfig, PortalConfig, PortalError, PortalKind, RefreshMethod,
};
use std::io::Write;

#[test]
fn test_error_handling() {
    let error = credential_error!("Incorrect username or password", "session_store");

    match &error {
        PortalError::Credential { message, context } => {
            assert_eq!(message, "Incorrect username or password");
            assert_eq!(context.component, "session_store");
            assert_eq!(context.operation.as_deref(), Some("login"));
            assert!(!context.error_id.is_empty());
        }
        _ => panic!("Expected Credential error"),
    }
    assert_eq!(error.user_message(), "Incorrect username or password");

    // Logging must not panic even without a subscriber
    error.log();

    let network_error = PortalError::Network {
        message: "Connection refused".to_string(),
        source: None,
        context: ErrorContext::new("test"),
    };
    assert!(network_error.is_recoverable());
    assert!(!network_error.requires_login());

    let expired = PortalError::SessionExpired {
        message: "Not authenticated".to_string(),
        context: ErrorContext::new("test"),
    };
    assert!(!expired.is_recoverable());
    assert!(expired.requires_login());
    assert_eq!(expired.status(), Some(401));

    let token = PortalError::Token {
        message: "Refresh response carried no access token".to_string(),
        context: ErrorContext::new("test"),
    };
    assert!(!token.is_recoverable());
    assert!(!token.requires_login());
    assert_eq!(token.status(), None);

    let storage = storage_error!("disk full", "file_store");
    assert!(matches!(storage, PortalError::Storage { .. }));

    let validation = validation_error!("must not be empty", "username", "session_store");
    match validation {
        PortalError::Validation { field, .. } => assert_eq!(field.as_deref(), Some("username")),
        _ => panic!("Expected Validation error"),
    }
}

#[test]
fn test_logging_initialization() {
    let config = LoggingConfig {
        level: "debug".to_string(),
        format: LogFormat::Compact,
        include_location: false,
        include_thread: false,
        log_file_path: None,
        log_span_timings: false,
        filter_directives: vec!["socportal_core=debug".to_string()],
    };

    // The global subscriber can only be installed once per process, so a
    // second call has to fail cleanly instead of panicking
    let _ = init_logging(&config);
    assert!(init_logging(&config).is_err());
}

#[test]
fn test_config_defaults_are_valid() {
    let config = PortalConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.portal, PortalKind::Admin);
    assert_eq!(config.session.refresh_threshold_seconds, 3600);
    assert_eq!(config.session.refresh_cooldown_seconds, 30);
    assert_eq!(config.api.token_path, "/auth/token");
    assert_eq!(config.api.refresh_method, RefreshMethod::Post);
}

#[test]
fn test_config_validation() {
    let mut config = PortalConfig::default();

    config.api.base_url = "not a url".to_string();
    match config.validate().unwrap_err() {
        PortalError::Validation { field, .. } => assert_eq!(field.as_deref(), Some("api.base_url")),
        other => panic!("Expected Validation error, got {other:?}"),
    }

    let mut config = PortalConfig::default();
    config.api.base_url = "ftp://soc.example.com".to_string();
    assert!(config.validate().is_err());

    let mut config = PortalConfig::default();
    config.session.refresh_cooldown_seconds = 0;
    assert!(config.validate().is_err());

    let mut config = PortalConfig::default();
    config.routes.logout = "logout".to_string();
    match config.validate().unwrap_err() {
        PortalError::Validation { field, .. } => {
            assert_eq!(field.as_deref(), Some("routes.logout"))
        }
        other => panic!("Expected Validation error, got {other:?}"),
    }
}

#[test]
fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = PortalConfig::for_portal(PortalKind::Customer);
    config.api.base_url = "https://soc.example.com/api".to_string();
    config.session.refresh_threshold_seconds = 900;
    config.save_to_file(&path).unwrap();

    let loaded = PortalConfig::from_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_partial_config_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "portal = \"customer\"").unwrap();
    writeln!(file, "[api]").unwrap();
    writeln!(file, "base_url = \"https://portal.example.com/api\"").unwrap();
    writeln!(file, "refresh_method = \"GET\"").unwrap();

    let loaded = PortalConfig::from_file(&path).unwrap();
    assert_eq!(loaded.portal, PortalKind::Customer);
    assert_eq!(loaded.api.base_url, "https://portal.example.com/api");
    assert_eq!(loaded.api.refresh_method, RefreshMethod::Get);
    assert_eq!(loaded.api.profile_path, "/auth/me");
    assert_eq!(loaded.session.refresh_cooldown_seconds, 30);
    assert!(!loaded.encrypt_storage());
}

#[test]
fn test_missing_config_file_is_an_error() {
    let result = PortalConfig::from_file("/definitely/not/here/config.toml");
    assert!(matches!(result, Err(PortalError::Config { .. })));
}
