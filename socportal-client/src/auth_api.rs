//! HTTP implementation of the authentication backend

use crate::response::read_error_message_or;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use socportal_core::{
    credential_error, ApiConfig, AuthApi, Credentials, ErrorContext, PortalError, PortalResult,
    RefreshMethod, TokenResponse, UserProfile,
};
use socportal_session::LOGIN_FAILED_MESSAGE;
use tracing::{debug, info};

/// Talks to the backend's `/auth/*` endpoints
///
/// These calls bypass the request pipeline: a rejected login or refresh is
/// reported to the session store instead of triggering redirects.
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    client: reqwest::Client,
    config: ApiConfig,
}

impl HttpAuthApi {
    pub fn new(config: ApiConfig) -> PortalResult<Self> {
        let client = create_http_client(&config)?;
        Ok(Self::with_client(client, config))
    }

    /// Share an existing connection pool
    pub fn with_client(client: reqwest::Client, config: ApiConfig) -> Self {
        info!("Created auth API client for {}", config.base_url);
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.config.base_url, path)
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn request_token(&self, credentials: &Credentials) -> PortalResult<TokenResponse> {
        let url = self.url(&self.config.token_path);
        debug!("Requesting token from {}", url);

        let response = self
            .client
            .post(&url)
            .form(&[
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| network_error(e, "request_token"))?;

        let status = response.status();
        if status.is_client_error() {
            let message = read_error_message_or(response, LOGIN_FAILED_MESSAGE).await;
            debug!(status = %status, "Token request rejected");
            return Err(credential_error!(message, "http_auth_api"));
        }
        if !status.is_success() {
            return Err(api_error(response, "request_token").await);
        }

        let body = decode_body(response, "request_token").await?;
        token_from_body(body, "request_token")
    }

    async fn fetch_profile(&self, token: &str) -> PortalResult<UserProfile> {
        let url = self.url(&self.config.profile_path);
        debug!("Fetching profile from {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| network_error(e, "fetch_profile"))?;

        let response = check_authorized(response, "fetch_profile").await?;
        decode_body(response, "fetch_profile").await
    }

    async fn refresh_token(&self, token: &str) -> PortalResult<TokenResponse> {
        let url = self.url(&self.config.refresh_path);
        debug!("Refreshing token via {:?} {}", self.config.refresh_method, url);

        let request = match self.config.refresh_method {
            RefreshMethod::Get => self.client.get(&url),
            RefreshMethod::Post => self.client.post(&url),
        };
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| network_error(e, "refresh_token"))?;

        let response = check_authorized(response, "refresh_token").await?;
        let body = decode_body(response, "refresh_token").await?;
        token_from_body(body, "refresh_token")
    }
}

/// Helper function to create HTTP client with common configuration
pub(crate) fn create_http_client(config: &ApiConfig) -> PortalResult<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();

    headers.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_str(&config.user_agent).map_err(|e| {
            PortalError::Config {
                message: format!("Invalid user agent: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("http_client").with_operation("create_client"),
            }
        })?,
    );
    headers.insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static("application/json"),
    );

    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_seconds))
        .default_headers(headers)
        .build()
        .map_err(|e| PortalError::Config {
            message: format!("Failed to create HTTP client: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("http_client").with_operation("create_client"),
        })
}

/// Join `path` onto `base` with exactly one slash between them
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

pub(crate) fn network_error(error: reqwest::Error, operation: &str) -> PortalError {
    let suggestion = if error.is_timeout() {
        "The backend did not answer in time"
    } else {
        "Check network connectivity and the API base URL"
    };
    PortalError::Network {
        message: format!("Request failed: {}", error),
        source: Some(Box::new(error)),
        context: ErrorContext::new("http_client")
            .with_operation(operation)
            .with_suggestion(suggestion),
    }
}

/// Turn a non-2xx response into `Api { status, message }`
pub(crate) async fn api_error(response: reqwest::Response, operation: &str) -> PortalError {
    let status = response.status();
    let message = read_error_message_or(response, &status_reason(status)).await;
    PortalError::Api {
        status: status.as_u16(),
        message,
        context: ErrorContext::new("http_client")
            .with_operation(operation)
            .with_suggestion(match status.as_u16() {
                404 => "The resource does not exist",
                422 => "Check the request parameters",
                500..=599 => "The backend failed; try again later",
                _ => "Check the request and API status",
            }),
    }
}

pub(crate) fn status_reason(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("Unknown error")
        .to_string()
}

async fn check_authorized(
    response: reqwest::Response,
    operation: &str,
) -> PortalResult<reqwest::Response> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        let message = read_error_message_or(response, "Session expired").await;
        return Err(PortalError::SessionExpired {
            message,
            context: ErrorContext::new("http_auth_api")
                .with_operation(operation)
                .with_suggestion("Log in again"),
        });
    }
    if !status.is_success() {
        return Err(api_error(response, operation).await);
    }
    Ok(response)
}

pub(crate) async fn decode_body<T: DeserializeOwned>(
    response: reqwest::Response,
    operation: &str,
) -> PortalResult<T> {
    let body = response
        .text()
        .await
        .map_err(|e| network_error(e, operation))?;
    Ok(serde_json::from_str(&body)?)
}

/// A 2xx token body must carry a non-empty `access_token`
fn token_from_body(body: Value, operation: &str) -> PortalResult<TokenResponse> {
    let has_token = body
        .get("access_token")
        .and_then(Value::as_str)
        .is_some_and(|token| !token.trim().is_empty());
    if !has_token {
        return Err(PortalError::Token {
            message: "Response carried no access token".to_string(),
            context: ErrorContext::new("http_auth_api")
                .with_operation(operation)
                .with_suggestion("Check the API base URL and the auth endpoint paths"),
        });
    }
    Ok(serde_json::from_value(body)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://h/api", "/auth/token"), "http://h/api/auth/token");
        assert_eq!(join_url("http://h/api/", "auth/token"), "http://h/api/auth/token");
        assert_eq!(join_url("http://h/api/", "/alerts/7"), "http://h/api/alerts/7");
    }

    #[test]
    fn test_token_body_without_access_token() {
        let token = token_from_body(json!({ "access_token": "abc" }), "refresh_token").unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.token_type, "bearer");

        for body in [json!({}), json!({ "access_token": "" }), json!({ "access_token": 7 })] {
            match token_from_body(body, "refresh_token") {
                Err(PortalError::Token { context, .. }) => {
                    assert_eq!(context.operation.as_deref(), Some("refresh_token"));
                }
                other => panic!("expected token error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_create_http_client_rejects_bad_user_agent() {
        let config = ApiConfig {
            user_agent: "bad\nagent".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            create_http_client(&config),
            Err(PortalError::Config { .. })
        ));
        assert!(create_http_client(&ApiConfig::default()).is_ok());
    }
}
