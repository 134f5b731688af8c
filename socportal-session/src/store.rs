//! Session Store - owns the authentication state of one portal
//!
//! The store drives the `Anonymous → Authenticating → Authenticated →
//! (Refreshing) → Authenticated | Anonymous` lifecycle and writes the session
//! back to storage after every mutation. The state lock is never held across a
//! backend call.

use crate::session::{AuthPhase, Session};
use crate::storage::KeyValueStore;
use socportal_core::{
    log_operation_error, log_operation_start, log_operation_success, validation_error, AuthApi,
    Credentials, ErrorContext, PortalError, PortalKind, PortalResult, UserProfile,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Shown when the backend gives no usable reason for a failed login
pub const LOGIN_FAILED_MESSAGE: &str = "Login failed. Please check your credentials.";

#[derive(Debug, Clone)]
struct StoreState {
    session: Session,
    phase: AuthPhase,
    last_error: Option<String>,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            session: Session::anonymous(),
            phase: AuthPhase::Anonymous,
            last_error: None,
        }
    }
}

impl StoreState {
    fn clear(&mut self) {
        self.session = Session::anonymous();
        self.phase = AuthPhase::Anonymous;
    }
}

/// Authentication state for one portal
pub struct SessionStore {
    api: Arc<dyn AuthApi>,
    storage: Arc<dyn KeyValueStore>,
    storage_key: String,
    portal: PortalKind,
    state: RwLock<StoreState>,
}

impl SessionStore {
    /// Create an empty (anonymous) store; call [`SessionStore::restore`] to
    /// pick up a persisted session
    pub fn new(
        api: Arc<dyn AuthApi>,
        storage: Arc<dyn KeyValueStore>,
        storage_key: impl Into<String>,
        portal: PortalKind,
    ) -> Self {
        Self {
            api,
            storage,
            storage_key: storage_key.into(),
            portal,
            state: RwLock::new(StoreState::default()),
        }
    }

    pub fn portal(&self) -> PortalKind {
        self.portal
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub async fn session(&self) -> Session {
        self.state.read().await.session.clone()
    }

    pub async fn phase(&self) -> AuthPhase {
        self.state.read().await.phase
    }

    pub async fn token(&self) -> Option<String> {
        self.state.read().await.session.token.clone()
    }

    pub async fn user(&self) -> Option<UserProfile> {
        self.state.read().await.session.user.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.session.is_authenticated
    }

    /// Message of the last failed login or refresh
    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    /// Load the persisted session
    ///
    /// Records that cannot be read, parsed or decrypted, or whose fields
    /// disagree, are discarded and the store starts anonymous.
    pub async fn restore(&self) -> Session {
        let restored = match self.storage.get(&self.storage_key) {
            Ok(Some(raw)) => match Session::from_persisted(&raw) {
                Ok(session) if session.is_consistent() => Some(session),
                Ok(_) => {
                    warn!(key = %self.storage_key, "Discarding inconsistent session record");
                    None
                }
                Err(e) => {
                    warn!(
                        key = %self.storage_key,
                        error = %e,
                        "Discarding malformed session record"
                    );
                    None
                }
            },
            Ok(None) => {
                debug!(key = %self.storage_key, "No persisted session");
                return self.session().await;
            }
            Err(e) => {
                warn!(key = %self.storage_key, error = %e, "Persisted session could not be read");
                None
            }
        };

        let mut state = self.state.write().await;
        match restored {
            Some(session) => {
                state.phase = if session.is_authenticated {
                    AuthPhase::Authenticated
                } else {
                    AuthPhase::Anonymous
                };
                state.session = session;
                info!(
                    portal = %self.portal,
                    authenticated = state.session.is_authenticated,
                    "Session restored"
                );
            }
            None => {
                state.clear();
                if let Err(e) = self.storage.remove(&self.storage_key) {
                    warn!(key = %self.storage_key, error = %e, "Failed to remove session record");
                }
            }
        }
        state.session.clone()
    }

    /// Exchange credentials for a token and load the user profile
    ///
    /// Any backend failure leaves the store anonymous with `last_error` set.
    pub async fn login(&self, username: &str, password: &str) -> PortalResult<UserProfile> {
        if username.trim().is_empty() {
            let error = validation_error!("Username is required", "username", "session_store");
            return Err(self.reject_locally(error).await);
        }
        if password.is_empty() {
            let error = validation_error!("Password is required", "password", "session_store");
            return Err(self.reject_locally(error).await);
        }

        log_operation_start!("login", username = %username);
        {
            let mut state = self.state.write().await;
            state.phase = AuthPhase::Authenticating;
            state.last_error = None;
        }

        let result = self.authenticate(&Credentials::new(username, password)).await;

        let mut state = self.state.write().await;
        match result {
            Ok((token, user)) => {
                state.session = Session::authenticated(token, user.clone());
                state.phase = AuthPhase::Authenticated;
                self.persist(&state.session);
                log_operation_success!("login", username = %user.username, role = %user.role);
                Ok(user)
            }
            Err(e) => {
                state.clear();
                state.last_error = Some(login_failure_message(&e));
                self.persist(&state.session);
                log_operation_error!("login", e, username = %username);
                Err(e)
            }
        }
    }

    async fn authenticate(&self, credentials: &Credentials) -> PortalResult<(String, UserProfile)> {
        let response = self.api.request_token(credentials).await?;
        let user = self.api.fetch_profile(&response.access_token).await?;
        Ok((response.access_token, user))
    }

    async fn reject_locally(&self, error: PortalError) -> PortalError {
        self.state.write().await.last_error = Some(error.user_message());
        debug!(error = %error, "Login rejected before contacting the backend");
        error
    }

    /// Replace the current token with a fresh one
    ///
    /// A failed refresh logs the session out and is not retried. If the
    /// session changed while the call was in flight the result is dropped.
    pub async fn refresh(&self) -> PortalResult<()> {
        let token = {
            let mut state = self.state.write().await;
            let Some(token) = state.session.token.clone() else {
                return Err(PortalError::NotAuthenticated {
                    operation: "refresh".to_string(),
                    context: ErrorContext::new("session_store")
                        .with_operation("refresh")
                        .with_suggestion("Log in first"),
                });
            };
            state.phase = AuthPhase::Refreshing;
            token
        };

        log_operation_start!("refresh", portal = %self.portal);
        let result = self.api.refresh_token(&token).await;

        let mut state = self.state.write().await;
        if state.session.token.as_deref() != Some(token.as_str()) {
            debug!("Session changed during refresh, dropping the result");
            return Ok(());
        }

        match result {
            Ok(response) => {
                state.session.token = Some(response.access_token);
                state.phase = AuthPhase::Authenticated;
                self.persist(&state.session);
                log_operation_success!("refresh", portal = %self.portal);
                Ok(())
            }
            Err(e) => {
                state.clear();
                state.last_error = Some(e.user_message());
                self.persist(&state.session);
                log_operation_error!("refresh", e, portal = %self.portal);
                Err(e)
            }
        }
    }

    /// Drop the session; safe to call any number of times
    pub async fn logout(&self) {
        let mut state = self.state.write().await;
        let was_authenticated = state.session.is_authenticated;
        state.clear();
        state.last_error = None;
        self.persist(&state.session);
        if was_authenticated {
            info!(portal = %self.portal, "Logged out");
        }
    }

    fn persist(&self, session: &Session) {
        let record = session.to_persisted(self.portal).to_string();
        match self.storage.set(&self.storage_key, &record) {
            Ok(()) => debug!(key = %self.storage_key, "Session persisted"),
            Err(e) => warn!(key = %self.storage_key, error = %e, "Failed to persist session"),
        }
    }
}

fn login_failure_message(error: &PortalError) -> String {
    match error {
        PortalError::Credential { message, .. } | PortalError::Api { message, .. }
            if !message.trim().is_empty() =>
        {
            message.clone()
        }
        _ => LOGIN_FAILED_MESSAGE.to_string(),
    }
}
