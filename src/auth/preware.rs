//! Preware: post-authentication authorization predicates
//!
//! Each predicate is a pure function of the resolved principal returning a
//! tagged verdict. A route attaches an ordered chain of predicates; the
//! first `Forbidden` short-circuits the chain and maps to a 403 at the
//! boundary. 401 is reserved for authentication failures.

use super::roles::{slugify, RoleScope};
use super::{AuthError, AuthenticatedPrincipal, PermissionDenied};
use axum::{
    extract::Request,
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::warn;

/// Outcome of a single predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Forbidden(&'static str),
}

/// A single authorization predicate
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Principal must hold the named role scope
    Scope(RoleScope),
    /// Principal's admin groups must intersect the (pre-slugified)
    /// candidate set; an empty candidate set never matches
    AdminGroup(Vec<String>),
    /// Deny-override for the system root identity
    NotSystemRoot,
}

impl Predicate {
    /// Evaluate against a principal. Pure; no side effects.
    pub fn evaluate(&self, principal: &AuthenticatedPrincipal) -> Verdict {
        match self {
            Predicate::Scope(scope) => {
                if principal.roles.holds(*scope) {
                    Verdict::Allow
                } else {
                    Verdict::Forbidden("insufficient scope")
                }
            }
            Predicate::AdminGroup(candidates) => {
                let Some(admin) = &principal.roles.admin else {
                    return Verdict::Forbidden("admin role required");
                };
                if candidates.iter().any(|slug| admin.groups.contains_key(slug)) {
                    Verdict::Allow
                } else {
                    Verdict::Forbidden("missing group membership")
                }
            }
            Predicate::NotSystemRoot => {
                if principal.is_system_root {
                    Verdict::Forbidden("not permitted for the root user")
                } else {
                    Verdict::Allow
                }
            }
        }
    }
}

/// An ordered chain of predicates for one route
#[derive(Debug, Clone, Default)]
pub struct Preware {
    checks: Vec<Predicate>,
}

impl Preware {
    /// Empty chain; allows every authenticated principal
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a chain with a required role scope
    pub fn scope(scope: RoleScope) -> Self {
        Self {
            checks: vec![Predicate::Scope(scope)],
        }
    }

    /// Require membership in at least one of the given admin groups.
    ///
    /// Callers supply display names; normalization happens here with the
    /// same slug transform used at provisioning time.
    pub fn require_admin_group<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let candidates = groups
            .into_iter()
            .map(|group| slugify(group.as_ref()))
            .collect();
        self.checks.push(Predicate::AdminGroup(candidates));
        self
    }

    /// Deny the system root identity, whatever else it holds
    pub fn require_not_system_root(mut self) -> Self {
        self.checks.push(Predicate::NotSystemRoot);
        self
    }

    /// Evaluate the chain in declaration order; the first `Forbidden` wins
    pub fn evaluate(&self, principal: &AuthenticatedPrincipal) -> Verdict {
        for check in &self.checks {
            if let Verdict::Forbidden(reason) = check.evaluate(principal) {
                return Verdict::Forbidden(reason);
            }
        }
        Verdict::Allow
    }

    /// Turn the chain into a route layer
    pub fn into_layer(self) -> PrewareLayer {
        PrewareLayer { preware: self }
    }
}

/// Tower layer applying a preware chain to a route
#[derive(Debug, Clone)]
pub struct PrewareLayer {
    preware: Preware,
}

impl<S> Layer<S> for PrewareLayer {
    type Service = PrewareService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PrewareService {
            inner,
            preware: self.preware.clone(),
        }
    }
}

/// Service produced by `PrewareLayer`.
///
/// Reads the principal placed in request extensions by the authenticate
/// middleware. A missing principal means the route was wired without
/// authentication and is rejected with a 401, never a panic.
#[derive(Debug, Clone)]
pub struct PrewareService<S> {
    inner: S,
    preware: Preware,
}

impl<S> Service<Request> for PrewareService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let verdict = match req.extensions().get::<AuthenticatedPrincipal>() {
            Some(principal) => {
                let verdict = self.preware.evaluate(principal);
                if let Verdict::Forbidden(reason) = verdict {
                    warn!(
                        "Denied {} on {}: {}",
                        principal.username,
                        req.uri().path(),
                        reason
                    );
                }
                verdict
            }
            None => {
                warn!("Preware reached without a principal: {}", req.uri().path());
                return Box::pin(async { Ok(AuthError::Unauthenticated.into_response()) });
            }
        };

        match verdict {
            Verdict::Allow => {
                let clone = self.inner.clone();
                let mut inner = std::mem::replace(&mut self.inner, clone);
                Box::pin(async move { inner.call(req).await })
            }
            Verdict::Forbidden(reason) => {
                Box::pin(async move { Ok(PermissionDenied::new(reason).into_response()) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::roles::{group_map, AdminRole, RoleRef};
    use crate::auth::RoleSet;

    fn admin_principal(username: &str, is_system_root: bool, groups: &[&str]) -> AuthenticatedPrincipal {
        AuthenticatedPrincipal {
            user_id: "user-1".to_string(),
            username: username.to_string(),
            is_system_root,
            session_id: "session-1".to_string(),
            roles: RoleSet {
                admin: Some(AdminRole {
                    id: "admin-1".to_string(),
                    name: "Test Admin".to_string(),
                    groups: group_map(groups.iter().copied()),
                }),
                account: None,
            },
        }
    }

    fn account_principal(username: &str) -> AuthenticatedPrincipal {
        AuthenticatedPrincipal {
            user_id: "user-2".to_string(),
            username: username.to_string(),
            is_system_root: false,
            session_id: "session-2".to_string(),
            roles: RoleSet {
                admin: None,
                account: Some(RoleRef {
                    id: "account-1".to_string(),
                    name: username.to_string(),
                }),
            },
        }
    }

    #[test]
    fn test_admin_group_is_case_insensitive() {
        let principal = admin_principal("ren", false, &["Sales"]);

        for candidates in [vec!["sales"], vec!["SALES"], vec!["support", "Sales"]] {
            let preware = Preware::new().require_admin_group(candidates);
            assert_eq!(preware.evaluate(&principal), Verdict::Allow);
        }
    }

    #[test]
    fn test_admin_group_misses() {
        let principal = admin_principal("ren", false, &["Sales"]);

        let preware = Preware::new().require_admin_group(["root"]);
        assert!(matches!(preware.evaluate(&principal), Verdict::Forbidden(_)));
    }

    #[test]
    fn test_empty_candidate_list_always_forbidden() {
        let principal = admin_principal("ren", false, &["Sales"]);

        let preware = Preware::new().require_admin_group(Vec::<String>::new());
        assert!(matches!(preware.evaluate(&principal), Verdict::Forbidden(_)));
    }

    #[test]
    fn test_admin_group_requires_admin_role() {
        let principal = account_principal("stimpy");

        let preware = Preware::new().require_admin_group(["sales"]);
        assert!(matches!(preware.evaluate(&principal), Verdict::Forbidden(_)));
    }

    #[test]
    fn test_root_lockout_is_absolute() {
        // Root holds every group it could want; the deny-override still wins
        let root = admin_principal("root", true, &["Root", "Sales", "Support"]);
        let preware = Preware::new().require_not_system_root();
        assert!(matches!(preware.evaluate(&root), Verdict::Forbidden(_)));

        let other = admin_principal("ren", false, &["Sales"]);
        assert_eq!(preware.evaluate(&other), Verdict::Allow);
    }

    #[test]
    fn test_scope_gate_runs_before_group_checks() {
        let principal = account_principal("stimpy");

        let preware = Preware::scope(RoleScope::Admin).require_admin_group(["sales"]);
        assert_eq!(
            preware.evaluate(&principal),
            Verdict::Forbidden("insufficient scope")
        );
    }

    #[test]
    fn test_first_forbidden_short_circuits() {
        let principal = admin_principal("ren", false, &["Sales"]);

        let preware = Preware::new()
            .require_admin_group(["root"])
            .require_not_system_root();
        assert_eq!(
            preware.evaluate(&principal),
            Verdict::Forbidden("missing group membership")
        );
    }
}
