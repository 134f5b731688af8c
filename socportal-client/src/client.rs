//! Portal API client

use crate::auth_api::{create_http_client, decode_body, join_url, HttpAuthApi};
use crate::navigator::Navigator;
use crate::pipeline::RequestPipeline;
use serde::de::DeserializeOwned;
use serde::Serialize;
use socportal_core::{AuthApi, PortalConfig, PortalResult, UserProfile};
use socportal_session::{KeyValueStore, Session, SessionStore};
use std::sync::Arc;
use tracing::{debug, info};

/// Authenticated client for one portal
///
/// Owns the session store and the request pipeline; every call made through
/// `get`/`post`/`put`/`delete` carries the bearer token and gets the
/// 401/403 handling.
#[derive(Clone)]
pub struct PortalClient {
    config: Arc<PortalConfig>,
    http: reqwest::Client,
    pipeline: RequestPipeline,
}

impl PortalClient {
    /// Build a client talking to the configured backend
    pub fn new(
        config: PortalConfig,
        storage: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
    ) -> PortalResult<Self> {
        let http = create_http_client(&config.api)?;
        let api = Arc::new(HttpAuthApi::with_client(http.clone(), config.api.clone()));
        Ok(Self::assemble(config, http, api, storage, navigator))
    }

    /// Build a client with a custom authentication backend
    pub fn with_auth_api(
        config: PortalConfig,
        api: Arc<dyn AuthApi>,
        storage: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
    ) -> PortalResult<Self> {
        let http = create_http_client(&config.api)?;
        Ok(Self::assemble(config, http, api, storage, navigator))
    }

    fn assemble(
        config: PortalConfig,
        http: reqwest::Client,
        api: Arc<dyn AuthApi>,
        storage: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let store = Arc::new(SessionStore::new(
            api,
            storage,
            config.storage_key(),
            config.portal,
        ));
        let pipeline = RequestPipeline::new(
            store,
            navigator,
            &config.session,
            config.routes.clone(),
        );
        info!(portal = %config.portal, base_url = %config.api.base_url, "Portal client ready");

        Self {
            config: Arc::new(config),
            http,
            pipeline,
        }
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        self.pipeline.store()
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    /// Pick up the persisted session
    pub async fn restore(&self) -> Session {
        self.session().restore().await
    }

    pub async fn login(&self, username: &str, password: &str) -> PortalResult<UserProfile> {
        self.session().login(username, password).await
    }

    pub async fn logout(&self) {
        self.session().logout().await
    }

    /// Absolute URL of an API path
    pub fn url(&self, path: &str) -> String {
        join_url(&self.config.api.base_url, path)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> PortalResult<T> {
        self.send_json(self.http.get(self.url(path))).await
    }

    pub async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> PortalResult<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.send_json(self.http.get(self.url(path)).query(query)).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> PortalResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(self.http.post(self.url(path)).json(body)).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> PortalResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(self.http.put(self.url(path)).json(body)).await
    }

    /// DELETE `path`; the response body, if any, is ignored
    pub async fn delete(&self, path: &str) -> PortalResult<()> {
        debug!("DELETE {}", path);
        self.pipeline
            .send(self.http.delete(self.url(path)))
            .await
            .map(|_| ())
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> PortalResult<T> {
        let response = self.pipeline.send(builder).await?;
        debug!(status = %response.status(), url = %response.url(), "Request completed");
        decode_body(response, "send").await
    }
}
