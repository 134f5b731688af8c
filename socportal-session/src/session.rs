//! Session data and its persisted form

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use socportal_core::{PortalKind, UserProfile};

/// Lifecycle phase of the session store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    Anonymous,
    Authenticating,
    Authenticated,
    Refreshing,
}

impl std::fmt::Display for AuthPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthPhase::Anonymous => write!(f, "anonymous"),
            AuthPhase::Authenticating => write!(f, "authenticating"),
            AuthPhase::Authenticated => write!(f, "authenticated"),
            AuthPhase::Refreshing => write!(f, "refreshing"),
        }
    }
}

/// Current authentication state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<UserProfile>,
    pub is_authenticated: bool,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(token: String, user: UserProfile) -> Self {
        Self {
            token: Some(token),
            user: Some(user),
            is_authenticated: true,
        }
    }

    /// A record is only usable when all three fields agree
    pub fn is_consistent(&self) -> bool {
        self.is_authenticated == (self.token.is_some() && self.user.is_some())
    }

    /// Serialize into the storage layout of `portal`
    pub fn to_persisted(&self, portal: PortalKind) -> Value {
        let mut record = Map::new();
        record.insert(portal.token_field().to_string(), json!(self.token));
        record.insert("user".to_string(), json!(self.user));
        record.insert("isAuthenticated".to_string(), json!(self.is_authenticated));
        Value::Object(record)
    }

    /// Parse a persisted record written in either portal layout
    pub fn from_persisted(raw: &str) -> serde_json::Result<Self> {
        let record: PersistedSession = serde_json::from_str(raw)?;
        Ok(Self {
            token: record.token,
            user: record.user,
            is_authenticated: record.is_authenticated,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedSession {
    #[serde(default, alias = "userToken")]
    token: Option<String>,
    #[serde(default)]
    user: Option<UserProfile>,
    #[serde(default)]
    is_authenticated: bool,
}
