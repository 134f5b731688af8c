//! socportal Session - authentication state for the portal client
//!
//! Token inspection, refresh debouncing, the session store and its persisted
//! storage backends, and the route guard.

pub mod debounce;
pub mod guard;
pub mod session;
pub mod storage;
pub mod store;
pub mod token;

pub use debounce::{is_cooldown_over, is_cooldown_over_at, DebounceGate, DEFAULT_COOLDOWN_SECONDS};
pub use guard::{GuardDecision, RouteGuard, RouteRequirement};
pub use session::{AuthPhase, Session};
pub use storage::{
    open_session_storage, open_session_storage_with, EncryptedStore, FileStore, KeyValueStore,
    MemoryStore,
};
pub use store::{SessionStore, LOGIN_FAILED_MESSAGE};
pub use token::{decode_claims, expires_at, expires_in_at, is_expiring, is_expiring_at, TokenClaims};
