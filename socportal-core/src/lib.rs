//! socportal Core - shared building blocks for the portal session client
//!
//! Defines the error taxonomy, configuration, logging setup, wire types and the
//! backend trait that the session and client crates are built on

pub mod config;
pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use traits::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tracing;
