//! Route Guard
//!
//! Request-time gate in front of every handler: resolves an identity from
//! the access-token cookie (or a Bearer header), then applies a static,
//! declarative route table - exempt routes pass through, guest-only routes
//! bounce authenticated users, gated routes demand a role from the allow
//! list. Handlers downstream read the injected [`Identity`] and never
//! re-parse cookies.

use crate::cookies::{self, ACCESS_COOKIE};
use crate::models::{TokenClaims, UserRole};
use crate::token::TokenService;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

/// Caller identity resolved by the guard, visible to downstream handlers
/// through request extensions.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
}

impl Identity {
    pub fn from_claims(claims: &TokenClaims) -> Self {
        Self {
            user_id: claims.user_id,
            email: claims.email.clone(),
            role: claims.role,
        }
    }
}

/// One role-gated route pattern.
#[derive(Debug, Clone)]
struct RouteRule {
    pattern: String,
    roles: Vec<UserRole>,
}

/// Static route -> policy mapping.
///
/// Patterns are exact paths, or prefixes when written with a `/*` suffix
/// (`/admin/*` covers `/admin` and everything beneath it). First matching
/// rule wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    public: Vec<String>,
    guest_only: Vec<String>,
    rules: Vec<RouteRule>,
}

/// What the guard decided for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteDecision {
    /// No gate applies (or the role check passed); forward the request.
    Forward,
    /// Authenticated user on a guest-only route; send them here instead.
    RedirectAuthenticated(String),
    /// Gated route, no identity.
    Unauthenticated,
    /// Gated route, identity lacks a permitted role.
    Forbidden,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a path is exempt from authentication entirely.
    pub fn is_public(&self, path: &str) -> bool {
        self.public.iter().any(|p| pattern_matches(p, path))
    }

    /// Exempt a pattern from authentication entirely.
    pub fn public(mut self, pattern: impl Into<String>) -> Self {
        self.public.push(pattern.into());
        self
    }

    /// Redirect away from a pattern when the caller is already
    /// authenticated (login/signup pages).
    pub fn guest_only(mut self, pattern: impl Into<String>) -> Self {
        self.guest_only.push(pattern.into());
        self
    }

    /// Gate a pattern behind an allow list of roles.
    pub fn require(mut self, pattern: impl Into<String>, roles: &[UserRole]) -> Self {
        self.rules.push(RouteRule {
            pattern: pattern.into(),
            roles: roles.to_vec(),
        });
        self
    }

    /// The per-request state machine, pure and independently testable.
    /// `return_to` is the caller-supplied return URL for guest redirects.
    pub fn decide(
        &self,
        path: &str,
        identity: Option<&Identity>,
        return_to: Option<&str>,
    ) -> RouteDecision {
        if self.is_public(path) {
            return RouteDecision::Forward;
        }

        if self.guest_only.iter().any(|p| pattern_matches(p, path)) {
            if identity.is_some() {
                let target = return_to
                    .and_then(safe_return_path)
                    .unwrap_or_else(|| "/".to_string());
                return RouteDecision::RedirectAuthenticated(target);
            }
            return RouteDecision::Forward;
        }

        let rule = self
            .rules
            .iter()
            .find(|r| pattern_matches(&r.pattern, path));
        let Some(rule) = rule else {
            return RouteDecision::Forward;
        };

        match identity {
            None => RouteDecision::Unauthenticated,
            Some(identity) if rule.roles.contains(&identity.role) => RouteDecision::Forward,
            Some(_) => RouteDecision::Forbidden,
        }
    }
}

fn pattern_matches(pattern: &str, path: &str) -> bool {
    match pattern.strip_suffix("/*") {
        Some(prefix) => path == prefix || path.starts_with(&format!("{prefix}/")),
        None => path == pattern,
    }
}

/// Accept only same-origin absolute paths; anything else (full URLs,
/// scheme-relative `//host` forms) would be an open redirect.
fn safe_return_path(raw: &str) -> Option<String> {
    if raw.starts_with('/') && !raw.starts_with("//") && !raw.contains(':') {
        Some(raw.to_string())
    } else {
        None
    }
}

/// API-shaped paths get status codes; page-shaped paths get redirects.
fn is_api_path(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/")
}

/// Route guard state shared across requests.
pub struct RouteGuard {
    tokens: TokenService,
    table: RouteTable,
}

impl RouteGuard {
    pub fn new(tokens: TokenService, table: RouteTable) -> Self {
        Self { tokens, table }
    }

    /// Resolve an identity from the access cookie, falling back to an
    /// `Authorization: Bearer` header for non-browser clients.
    fn resolve_identity(&self, req: &Request) -> Option<Identity> {
        let from_cookie = cookies::read_cookie(req.headers(), ACCESS_COOKIE);
        let token = match &from_cookie {
            Some(value) => Some(value.as_str()),
            None => req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(TokenService::extract_bearer),
        };

        token
            .and_then(|t| self.tokens.verify_access(t))
            .map(|claims| Identity::from_claims(&claims))
    }
}

/// Decoded value of a `redirect` query parameter, if present.
fn return_param(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("redirect="))
        .filter(|v| !v.is_empty())
        .and_then(|v| urlencoding::decode(v).ok())
        .map(|v| v.into_owned())
}

/// Login redirect carrying the originally requested path. The path is
/// percent-encoded so its own query characters survive the round trip.
fn login_redirect_target(path: &str) -> String {
    format!("/login?redirect={}", urlencoding::encode(path))
}

fn unauthorized_json() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "unauthorized",
            "message": "Authentication required"
        })),
    )
        .into_response()
}

fn forbidden_json() -> Response {
    // Generic wording; the required role set is not revealed
    (
        StatusCode::FORBIDDEN,
        Json(serde_json::json!({
            "error": "forbidden",
            "message": "Insufficient permissions"
        })),
    )
        .into_response()
}

/// Axum middleware entry point; install with
/// `axum::middleware::from_fn_with_state(guard, route_guard)`.
pub async fn route_guard(
    State(guard): State<Arc<RouteGuard>>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();

    // Exempt routes pass through unchanged, without token work
    if guard.table.is_public(&path) {
        return next.run(req).await;
    }

    let identity = guard.resolve_identity(&req);
    let return_to = return_param(req.uri().query());

    match guard
        .table
        .decide(&path, identity.as_ref(), return_to.as_deref())
    {
        RouteDecision::Forward => {
            if let Some(identity) = identity {
                req.extensions_mut().insert(identity);
            }
            next.run(req).await
        }
        RouteDecision::RedirectAuthenticated(target) => Redirect::to(&target).into_response(),
        RouteDecision::Unauthenticated => {
            if is_api_path(&path) {
                unauthorized_json()
            } else {
                Redirect::to(&login_redirect_target(&path)).into_response()
            }
        }
        RouteDecision::Forbidden => {
            if is_api_path(&path) {
                forbidden_json()
            } else {
                Redirect::to("/unauthorized").into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(role: UserRole) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            email: "driver@example.com".to_string(),
            role,
        }
    }

    fn table() -> RouteTable {
        RouteTable::new()
            .public("/api/auth/login")
            .public("/api/health")
            .guest_only("/login")
            .guest_only("/signup")
            .require("/api/admin/*", &[UserRole::Admin])
            .require("/dashboard/*", &[UserRole::User, UserRole::Moderator, UserRole::Admin])
    }

    #[test]
    fn pattern_matching_exact_and_prefix() {
        assert!(pattern_matches("/login", "/login"));
        assert!(!pattern_matches("/login", "/login/extra"));
        assert!(pattern_matches("/admin/*", "/admin"));
        assert!(pattern_matches("/admin/*", "/admin/users"));
        assert!(!pattern_matches("/admin/*", "/administrator"));
    }

    #[test]
    fn public_routes_pass_without_identity() {
        assert_eq!(
            table().decide("/api/auth/login", None, None),
            RouteDecision::Forward
        );
    }

    #[test]
    fn ungated_routes_pass_through() {
        assert_eq!(table().decide("/about", None, None), RouteDecision::Forward);
    }

    #[test]
    fn missing_identity_is_unauthenticated_not_forbidden() {
        // No cookie at all must yield the unauthenticated outcome, never
        // the insufficient-role one
        assert_eq!(
            table().decide("/api/admin/users", None, None),
            RouteDecision::Unauthenticated
        );
        assert_eq!(
            table().decide("/dashboard/garage", None, None),
            RouteDecision::Unauthenticated
        );
    }

    #[test]
    fn wrong_role_is_forbidden() {
        let user = identity(UserRole::User);
        assert_eq!(
            table().decide("/api/admin/users", Some(&user), None),
            RouteDecision::Forbidden
        );
    }

    #[test]
    fn matching_role_forwards() {
        let admin = identity(UserRole::Admin);
        assert_eq!(
            table().decide("/api/admin/users", Some(&admin), None),
            RouteDecision::Forward
        );
        let user = identity(UserRole::User);
        assert_eq!(
            table().decide("/dashboard/garage", Some(&user), None),
            RouteDecision::Forward
        );
    }

    #[test]
    fn guest_only_redirects_authenticated_users() {
        let user = identity(UserRole::User);
        assert_eq!(
            table().decide("/login", Some(&user), None),
            RouteDecision::RedirectAuthenticated("/".to_string())
        );
        // Anonymous callers may stay
        assert_eq!(table().decide("/login", None, None), RouteDecision::Forward);
    }

    #[test]
    fn guest_redirect_honors_safe_return_paths_only() {
        let user = identity(UserRole::User);
        assert_eq!(
            table().decide("/login", Some(&user), Some("/dashboard/garage")),
            RouteDecision::RedirectAuthenticated("/dashboard/garage".to_string())
        );
        // Off-origin targets fall back to the safe default
        for evil in ["https://evil.example", "//evil.example", "javascript:alert(1)"] {
            assert_eq!(
                table().decide("/login", Some(&user), Some(evil)),
                RouteDecision::RedirectAuthenticated("/".to_string())
            );
        }
    }

    #[test]
    fn api_path_detection() {
        assert!(is_api_path("/api/admin/users"));
        assert!(is_api_path("/api"));
        assert!(!is_api_path("/apiary"));
        assert!(!is_api_path("/dashboard"));
    }

    #[test]
    fn return_param_extraction_decodes_values() {
        assert_eq!(
            return_param(Some("redirect=/garage&x=1")),
            Some("/garage".to_string())
        );
        assert_eq!(
            return_param(Some("redirect=%2Fgarage%3Ftab%3D1")),
            Some("/garage?tab=1".to_string())
        );
        assert_eq!(return_param(Some("x=1")), None);
        assert_eq!(return_param(Some("redirect=")), None);
        assert_eq!(return_param(None), None);
    }

    #[test]
    fn login_redirect_encodes_the_requested_path() {
        assert_eq!(
            login_redirect_target("/dashboard/garage"),
            "/login?redirect=%2Fdashboard%2Fgarage"
        );
        // Query-significant characters must not split the redirect value
        let target = login_redirect_target("/reports?from=1&to=2");
        assert!(!target["/login?redirect=".len()..].contains('&'));
        assert_eq!(
            return_param(target.split('?').nth(1)),
            Some("/reports?from=1&to=2".to_string())
        );
    }
}
