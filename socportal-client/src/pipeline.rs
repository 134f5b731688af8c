//! Request Pipeline - bearer token, proactive refresh and 401/403 handling
//!
//! Every portal request goes through one shared pipeline. Outgoing requests
//! get the bearer token attached and may kick off a background refresh when
//! the token is about to expire. Incoming responses are checked for 401 and
//! 403 before the caller sees them.

use crate::auth_api::{api_error, network_error};
use crate::navigator::Navigator;
use crate::response::read_error_message_or;
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use socportal_core::{ErrorContext, PortalError, PortalResult, RouteConfig, SessionConfig};
use socportal_session::{is_expiring, DebounceGate, SessionStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Message used for a 403 whose body carries none
pub const ACCESS_DENIED_MESSAGE: &str = "Access denied";

struct PipelineInner {
    store: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
    routes: RouteConfig,
    refresh_threshold_seconds: u64,
    gate: DebounceGate,
    /// At most one refresh in flight
    refreshing: AtomicBool,
    refresh_done: Notify,
    /// When a refresh was last started
    last_check: Mutex<Option<DateTime<Utc>>>,
}

/// Shared request/response interceptor
#[derive(Clone)]
pub struct RequestPipeline {
    inner: Arc<PipelineInner>,
}

/// Clears the in-flight flag when the refresh task ends, even by panic
struct RefreshingGuard(Arc<PipelineInner>);

impl Drop for RefreshingGuard {
    fn drop(&mut self) {
        self.0.refreshing.store(false, Ordering::Release);
        self.0.refresh_done.notify_waiters();
    }
}

impl RequestPipeline {
    pub fn new(
        store: Arc<SessionStore>,
        navigator: Arc<dyn Navigator>,
        session: &SessionConfig,
        routes: RouteConfig,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                store,
                navigator,
                routes,
                refresh_threshold_seconds: session.refresh_threshold_seconds,
                gate: DebounceGate::new(session.refresh_cooldown_seconds),
                refreshing: AtomicBool::new(false),
                refresh_done: Notify::new(),
                last_check: Mutex::new(None),
            }),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.inner.store
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.inner.navigator
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.refreshing.load(Ordering::Acquire)
    }

    /// Wait until no refresh is in flight
    ///
    /// Short-lived callers use this before dropping the runtime so a
    /// background refresh started by `send` gets to store its token.
    pub async fn wait_for_refresh(&self) {
        loop {
            let done = self.inner.refresh_done.notified();
            if !self.is_refreshing() {
                return;
            }
            done.await;
        }
    }

    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        *self
            .inner
            .last_check
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach the bearer token and start a refresh if one is due
    ///
    /// The request always goes out with the current token; the refresh runs in
    /// the background and its handle is returned for callers that want to
    /// wait for it.
    pub async fn intercept_request(
        &self,
        builder: RequestBuilder,
    ) -> (RequestBuilder, Option<JoinHandle<()>>) {
        match self.inner.store.token().await {
            Some(token) => {
                let refresh = self.refresh_if_due(&token);
                (builder.bearer_auth(token), refresh)
            }
            None => (builder, None),
        }
    }

    /// Start a refresh if the current token is due for one
    pub async fn maybe_refresh(&self) -> Option<JoinHandle<()>> {
        let token = self.inner.store.token().await?;
        self.refresh_if_due(&token)
    }

    fn refresh_if_due(&self, token: &str) -> Option<JoinHandle<()>> {
        if !is_expiring(Some(token), self.inner.refresh_threshold_seconds) {
            return None;
        }

        if self
            .inner
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Refresh already in flight");
            return None;
        }
        let guard = RefreshingGuard(Arc::clone(&self.inner));

        {
            let mut last_check = self
                .inner
                .last_check
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !self.inner.gate.is_open(*last_check) {
                debug!(last_check = ?*last_check, "Refresh skipped, still cooling down");
                return None;
            }
            *last_check = Some(Utc::now());
        }

        info!("Token expires soon, refreshing in the background");
        Some(tokio::spawn(async move {
            let store = Arc::clone(&guard.0.store);
            if let Err(e) = store.refresh().await {
                warn!(error = %e, "Background token refresh failed");
            }
            drop(guard);
        }))
    }

    /// Apply 401/403 handling to the outcome of a request
    pub async fn intercept_response(
        &self,
        result: Result<Response, reqwest::Error>,
    ) -> PortalResult<Response> {
        let response = result.map_err(|e| network_error(e, "send"))?;
        let status = response.status();

        match status {
            StatusCode::UNAUTHORIZED => {
                let message = read_error_message_or(response, "Session expired").await;
                self.handle_unauthorized().await;
                Err(PortalError::SessionExpired {
                    message,
                    context: ErrorContext::new("request_pipeline")
                        .with_operation("intercept_response")
                        .with_suggestion("Log in again"),
                })
            }
            StatusCode::FORBIDDEN => {
                let message = read_error_message_or(response, ACCESS_DENIED_MESSAGE).await;
                let target = format!(
                    "{}?message={}",
                    self.inner.routes.access_denied,
                    urlencoding::encode(&message)
                );
                warn!(%message, "Request forbidden");
                self.inner.navigator.redirect(&target);
                Err(PortalError::Forbidden {
                    message,
                    context: ErrorContext::new("request_pipeline")
                        .with_operation("intercept_response")
                        .with_suggestion("Ask an administrator for access"),
                })
            }
            status if !status.is_success() => Err(api_error(response, "intercept_response").await),
            _ => Ok(response),
        }
    }

    async fn handle_unauthorized(&self) {
        let location = self.inner.navigator.current_path();
        if self.inner.routes.is_auth_page(&location) {
            debug!(%location, "401 on an auth page, not redirecting");
            return;
        }
        warn!(%location, "Session rejected by the backend, logging out");
        self.inner.store.logout().await;
        self.inner.navigator.redirect(&self.inner.routes.logout);
    }

    /// Run `builder` through both interceptors
    pub async fn send(&self, builder: RequestBuilder) -> PortalResult<Response> {
        let (builder, _refresh) = self.intercept_request(builder).await;
        self.intercept_response(builder.send().await).await
    }
}
