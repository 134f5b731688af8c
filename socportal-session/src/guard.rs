//! Route guard for role and scope protected pages

use crate::session::Session;
use crate::token::decode_claims;
use socportal_core::{Role, RouteConfig};
use std::collections::BTreeSet;
use tracing::debug;

/// Access rule attached to a route
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteRequirement {
    /// Reachable without a session
    Public,
    /// Any logged in user
    Authenticated,
    /// One of these roles; admins pass any role check
    Roles(BTreeSet<Role>),
    /// All of these scopes, from the profile or the token
    Scopes(BTreeSet<String>),
}

impl RouteRequirement {
    pub fn roles<I: IntoIterator<Item = Role>>(roles: I) -> Self {
        RouteRequirement::Roles(roles.into_iter().collect())
    }

    pub fn scopes<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RouteRequirement::Scopes(scopes.into_iter().map(Into::into).collect())
    }
}

/// Outcome of a guard check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    RedirectToLogin { return_to: String },
    AccessDenied { message: String },
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Allow)
    }
}

/// Evaluates route requirements against a session
#[derive(Debug, Clone)]
pub struct RouteGuard {
    routes: RouteConfig,
}

impl RouteGuard {
    pub fn new(routes: RouteConfig) -> Self {
        Self { routes }
    }

    pub fn check(
        &self,
        requirement: &RouteRequirement,
        session: &Session,
        location: &str,
    ) -> GuardDecision {
        if matches!(requirement, RouteRequirement::Public) {
            return GuardDecision::Allow;
        }

        let Some(user) = session.user.as_ref().filter(|_| session.is_authenticated) else {
            debug!(location, "Guarded route needs a session");
            return GuardDecision::RedirectToLogin {
                return_to: location.to_string(),
            };
        };

        match requirement {
            RouteRequirement::Public | RouteRequirement::Authenticated => GuardDecision::Allow,
            RouteRequirement::Roles(roles) => {
                if user.role.is_admin() || roles.contains(&user.role) {
                    GuardDecision::Allow
                } else {
                    GuardDecision::AccessDenied {
                        message: format!("Role '{}' cannot access this page", user.role),
                    }
                }
            }
            RouteRequirement::Scopes(required) => {
                let mut granted = user.scopes.clone();
                if let Some(claims) = session.token.as_deref().and_then(decode_claims) {
                    granted.extend(claims.scope_set());
                }
                let missing: Vec<&str> = required
                    .iter()
                    .filter(|scope| !granted.contains(*scope))
                    .map(String::as_str)
                    .collect();
                if missing.is_empty() {
                    GuardDecision::Allow
                } else {
                    GuardDecision::AccessDenied {
                        message: format!("Missing scope: {}", missing.join(", ")),
                    }
                }
            }
        }
    }

    /// Location to navigate to for a non-allow decision
    pub fn redirect_target(&self, decision: &GuardDecision) -> Option<String> {
        match decision {
            GuardDecision::Allow => None,
            GuardDecision::RedirectToLogin { return_to } => Some(format!(
                "{}?returnTo={}",
                self.routes.login,
                urlencoding::encode(return_to)
            )),
            GuardDecision::AccessDenied { message } => Some(format!(
                "{}?message={}",
                self.routes.access_denied,
                urlencoding::encode(message)
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socportal_core::UserProfile;

    fn session_for(role: Role) -> Session {
        let mut user = UserProfile::new("1", "ana", role);
        user.scopes.insert("alerts:read".to_string());
        Session::authenticated("opaque-token".to_string(), user)
    }

    fn guard() -> RouteGuard {
        RouteGuard::new(RouteConfig::default())
    }

    #[test]
    fn test_public_route_always_allowed() {
        let decision = guard().check(&RouteRequirement::Public, &Session::anonymous(), "/");
        assert!(decision.is_allowed());
    }

    #[test]
    fn test_anonymous_is_sent_to_login() {
        let guard = guard();
        let decision = guard.check(
            &RouteRequirement::Authenticated,
            &Session::anonymous(),
            "/alerts?page=2",
        );
        assert_eq!(
            decision,
            GuardDecision::RedirectToLogin {
                return_to: "/alerts?page=2".to_string()
            }
        );
        assert_eq!(
            guard.redirect_target(&decision).as_deref(),
            Some("/login?returnTo=%2Falerts%3Fpage%3D2")
        );
    }

    #[test]
    fn test_roles() {
        let guard = guard();
        let analysts = RouteRequirement::roles([Role::Analyst]);

        assert!(guard.check(&analysts, &session_for(Role::Analyst), "/cases").is_allowed());
        assert!(guard.check(&analysts, &session_for(Role::Admin), "/cases").is_allowed());

        let decision = guard.check(&analysts, &session_for(Role::Customer), "/cases");
        assert!(matches!(decision, GuardDecision::AccessDenied { .. }));
        assert!(guard
            .redirect_target(&decision)
            .unwrap()
            .starts_with("/access-denied?message=Role%20%27customer%27"));
    }

    #[test]
    fn test_scopes_from_profile() {
        let guard = guard();
        let session = session_for(Role::Analyst);

        let read = RouteRequirement::scopes(["alerts:read"]);
        assert!(guard.check(&read, &session, "/alerts").is_allowed());

        let write = RouteRequirement::scopes(["alerts:read", "alerts:write"]);
        assert_eq!(
            guard.check(&write, &session, "/alerts"),
            GuardDecision::AccessDenied {
                message: "Missing scope: alerts:write".to_string()
            }
        );
    }

    #[test]
    fn test_scopes_from_token_claims() {
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &serde_json::json!({
                "sub": "ana",
                "exp": chrono::Utc::now().timestamp() + 3600,
                "scopes": ["alerts:read"],
                "scope": "cases:write agents:read"
            }),
            &jsonwebtoken::EncodingKey::from_secret(b"backend-secret"),
        )
        .unwrap();
        let session = Session::authenticated(token, UserProfile::new("1", "ana", Role::Analyst));
        assert!(session.user.as_ref().unwrap().scopes.is_empty());

        let guard = guard();
        let granted = RouteRequirement::scopes(["alerts:read", "cases:write", "agents:read"]);
        assert!(guard.check(&granted, &session, "/cases").is_allowed());

        let admin_only = RouteRequirement::scopes(["indices:admin"]);
        let decision = guard.check(&admin_only, &session, "/indices");
        assert_eq!(
            decision,
            GuardDecision::AccessDenied {
                message: "Missing scope: indices:admin".to_string()
            }
        );
    }
}
