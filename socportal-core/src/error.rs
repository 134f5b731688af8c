//! Unified error handling for the portal client
//!
//! Every failure the client can surface maps onto one of the variants below,
//! each carrying an [`ErrorContext`] for tracking and recovery hints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

pub type PortalResult<T> = Result<T, PortalError>;

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: std::collections::HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: std::collections::HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Main error type for the portal client
#[derive(Error, Debug)]
pub enum PortalError {
    /// Login rejected by the backend (bad username/password, locked account, ...)
    #[error("Credential error: {message}")]
    Credential {
        message: String,
        context: ErrorContext,
    },

    /// The backend answered 401 on an authenticated call
    #[error("Session expired: {message}")]
    SessionExpired {
        message: String,
        context: ErrorContext,
    },

    /// The backend answered 403; the session itself is still valid
    #[error("Access denied: {message}")]
    Forbidden {
        message: String,
        context: ErrorContext,
    },

    #[error("Not authenticated: {operation} requires an active session")]
    NotAuthenticated {
        operation: String,
        context: ErrorContext,
    },

    #[error("API error (HTTP {status}): {message}")]
    Api {
        status: u16,
        message: String,
        context: ErrorContext,
    },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    /// The backend answered 2xx without a usable access token
    #[error("Token error: {message}")]
    Token {
        message: String,
        context: ErrorContext,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PortalError {
    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            PortalError::Credential { context, .. } => Some(context),
            PortalError::SessionExpired { context, .. } => Some(context),
            PortalError::Forbidden { context, .. } => Some(context),
            PortalError::NotAuthenticated { context, .. } => Some(context),
            PortalError::Api { context, .. } => Some(context),
            PortalError::Network { context, .. } => Some(context),
            PortalError::Token { context, .. } => Some(context),
            PortalError::Storage { context, .. } => Some(context),
            PortalError::Config { context, .. } => Some(context),
            PortalError::Validation { context, .. } => Some(context),
            PortalError::Io(_) | PortalError::Serialization(_) => None,
        }
    }

    /// Only transport failures are worth retrying, and never at this layer
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PortalError::Network { .. })
    }

    /// Errors that mean the session is gone and the user has to log in again
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            PortalError::SessionExpired { .. } | PortalError::NotAuthenticated { .. }
        )
    }

    /// HTTP status associated with the error, when there is one
    pub fn status(&self) -> Option<u16> {
        match self {
            PortalError::SessionExpired { .. } => Some(401),
            PortalError::Forbidden { .. } => Some(403),
            PortalError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            PortalError::Credential { message, .. }
            | PortalError::SessionExpired { message, .. }
            | PortalError::Forbidden { message, .. }
            | PortalError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        let error_id = self.context().map(|c| c.error_id.as_str());
        match self {
            PortalError::Config { .. } => {
                error!(error_id = ?error_id, error = %self, "Configuration error");
            }
            PortalError::Credential { .. } | PortalError::Validation { .. } => {
                debug!(error_id = ?error_id, error = %self, "Request rejected");
            }
            PortalError::Network { .. } => {
                warn!(
                    error_id = ?error_id,
                    error = %self,
                    "Network error (may be recoverable)"
                );
            }
            PortalError::SessionExpired { .. }
            | PortalError::Forbidden { .. }
            | PortalError::NotAuthenticated { .. }
            | PortalError::Token { .. } => {
                warn!(error_id = ?error_id, error = %self, "Authorization failure");
            }
            _ => {
                error!(error_id = ?error_id, error = %self, "Error occurred");
            }
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! credential_error {
    ($msg:expr, $component:expr) => {
        $crate::PortalError::Credential {
            message: $msg.to_string(),
            context: $crate::ErrorContext::new($component)
                .with_operation("login")
                .with_suggestion("Check your username and password"),
        }
    };
}

#[macro_export]
macro_rules! storage_error {
    ($msg:expr, $component:expr) => {
        $crate::PortalError::Storage {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::PortalError::Storage {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component),
        }
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::PortalError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the field value and format"),
        }
    };
}
