//! Core trait definitions

use crate::error::PortalResult;
use crate::types::{Credentials, TokenResponse, UserProfile};
use async_trait::async_trait;

/// Authentication endpoints of the portal backend
///
/// Calls made through this trait bypass the request pipeline: they carry the
/// token they are given explicitly and never trigger refreshes or redirects.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange username/password for an access token
    async fn request_token(&self, credentials: &Credentials) -> PortalResult<TokenResponse>;

    /// Fetch the profile of the user owning `token`
    async fn fetch_profile(&self, token: &str) -> PortalResult<UserProfile>;

    /// Trade a still-valid `token` for a fresh one
    async fn refresh_token(&self, token: &str) -> PortalResult<TokenResponse>;
}
