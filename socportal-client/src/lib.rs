//! socportal Client - authenticated HTTP access to the portal backend
//!
//! Wires the session store into a request pipeline that attaches bearer
//! tokens, refreshes them ahead of expiry and reacts to 401/403 responses.

pub mod auth_api;
pub mod client;
pub mod navigator;
pub mod pipeline;
pub mod resources;
pub mod response;

pub use auth_api::HttpAuthApi;
pub use client::PortalClient;
pub use navigator::{MemoryNavigator, Navigator};
pub use pipeline::{RequestPipeline, ACCESS_DENIED_MESSAGE};
pub use resources::{ResourceKind, Resources};
pub use response::extract_error_message;
