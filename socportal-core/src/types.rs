//! Core data type definitions shared by the session store and the HTTP client

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

/// Which portal the client is acting for
///
/// The two portals share the session logic but differ in storage layout and
/// whether the persisted session is encrypted by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortalKind {
    /// Admin dashboard
    Admin,
    /// Customer-facing portal
    Customer,
}

impl PortalKind {
    /// Name of the token field in the persisted session record
    pub fn token_field(&self) -> &'static str {
        match self {
            PortalKind::Admin => "token",
            PortalKind::Customer => "userToken",
        }
    }

    /// Whether the persisted session is encrypted unless configured otherwise
    pub fn encrypts_by_default(&self) -> bool {
        matches!(self, PortalKind::Admin)
    }
}

impl std::fmt::Display for PortalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortalKind::Admin => write!(f, "admin"),
            PortalKind::Customer => write!(f, "customer"),
        }
    }
}

impl std::str::FromStr for PortalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(PortalKind::Admin),
            "customer" => Ok(PortalKind::Customer),
            _ => Err(format!("Unknown portal kind: {}", s)),
        }
    }
}

/// User role as reported by the profile endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    Analyst,
    Customer,
    /// Any role this client does not know about, kept verbatim
    Other(String),
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.to_lowercase().as_str() {
            "admin" => Role::Admin,
            "analyst" => Role::Analyst,
            "customer" => Role::Customer,
            _ => Role::Other(value),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.to_string()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Analyst => write!(f, "analyst"),
            Role::Customer => write!(f, "customer"),
            Role::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Authenticated user profile (`GET /auth/me`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User id; the backend sends either a number or a string
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub username: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub scopes: BTreeSet<String>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>, username: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            role,
            email: None,
            full_name: None,
            scopes: BTreeSet::new(),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    })
}

/// Token endpoint response (`POST /auth/token`, `/auth/refresh`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Username/password pair submitted to the token endpoint
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}
