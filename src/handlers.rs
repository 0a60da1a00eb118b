//! Authentication HTTP Handlers
//!
//! REST endpoints for the auth flows. Token transport is cookie-first:
//! login/signup/refresh set the pair, logout always clears it.

use crate::cookies::{self, REFRESH_COOKIE};
use crate::error::AuthError;
use crate::extractors::{AuthUser, ClientInfo};
use crate::middleware::{route_guard, RouteGuard, RouteTable};
use crate::models::*;
use crate::service::{AuthService, ClientMeta};

use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    middleware as axum_middleware,
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use validator::Validate;

/// Shared auth service state
pub type AuthState = Arc<AuthService>;

// ============================================
// Route Builder
// ============================================

/// Route table covering this crate's own endpoints. Host applications
/// extend it with their own gated routes.
pub fn default_route_table() -> RouteTable {
    RouteTable::new()
        .public("/api/auth/signup")
        .public("/api/auth/login")
        .public("/api/auth/refresh")
        .public("/api/auth/logout")
        .require(
            "/api/auth/me",
            &[UserRole::User, UserRole::Moderator, UserRole::Admin],
        )
}

/// Create authentication routes behind the route guard.
pub fn create_routes(auth: AuthState) -> Router {
    create_routes_with_table(auth, default_route_table())
}

/// Create authentication routes with a caller-extended route table.
pub fn create_routes_with_table(auth: AuthState, table: RouteTable) -> Router {
    let guard = Arc::new(RouteGuard::new(auth.tokens().clone(), table));

    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .layer(axum_middleware::from_fn_with_state(guard, route_guard))
        .with_state(auth)
}

// ============================================
// Handlers
// ============================================

/// POST /api/auth/signup
///
/// Create an account, start a session, set both cookies.
pub async fn signup(
    State(auth): State<AuthState>,
    ClientInfo { ip, user_agent }: ClientInfo,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, AuthError> {
    req.validate()
        .map_err(|e| AuthError::Validation(e.to_string()))?;

    let response = auth
        .signup(
            req,
            ClientMeta {
                ip_address: ip,
                user_agent,
            },
        )
        .await?;

    let [access, refresh] = auth.issue_cookies(&response, false);
    Ok((
        StatusCode::CREATED,
        AppendHeaders([(SET_COOKIE, access), (SET_COOKIE, refresh)]),
        Json(response),
    ))
}

/// POST /api/auth/login
///
/// Authenticate and set both cookies.
pub async fn login(
    State(auth): State<AuthState>,
    ClientInfo { ip, user_agent }: ClientInfo,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    req.validate()
        .map_err(|e| AuthError::Validation(e.to_string()))?;

    let remember_me = req.remember_me;
    let response = auth
        .login(
            req,
            ClientMeta {
                ip_address: ip,
                user_agent,
            },
        )
        .await?;

    let [access, refresh] = auth.issue_cookies(&response, remember_me);
    Ok((
        AppendHeaders([(SET_COOKIE, access), (SET_COOKIE, refresh)]),
        Json(response),
    ))
}

/// POST /api/auth/refresh
///
/// Exchange the refresh cookie (body fallback for non-browser clients)
/// for a rotated pair.
pub async fn refresh(
    State(auth): State<AuthState>,
    headers: HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let token = cookies::read_cookie(&headers, REFRESH_COOKIE)
        .or_else(|| body.and_then(|Json(req)| req.refresh_token))
        .ok_or(AuthError::InvalidToken)?;

    let response = auth.refresh(&token).await?;

    let [access, refresh] = auth.issue_cookies(&response, false);
    Ok((
        AppendHeaders([(SET_COOKIE, access), (SET_COOKIE, refresh)]),
        Json(response),
    ))
}

/// POST /api/auth/logout
///
/// Always acknowledges and clears both cookies, whatever the store says.
pub async fn logout(
    State(auth): State<AuthState>,
    headers: HeaderMap,
    body: Option<Json<LogoutRequest>>,
) -> impl IntoResponse {
    let refresh_token = cookies::read_cookie(&headers, REFRESH_COOKIE);
    let access_token = cookies::read_cookie(&headers, cookies::ACCESS_COOKIE);
    let all_devices = body.map(|Json(req)| req.all_devices).unwrap_or(false);

    auth.logout(refresh_token.as_deref(), all_devices, access_token.as_deref())
        .await;

    let [access, refresh] = auth.clear_cookies();
    (
        AppendHeaders([(SET_COOKIE, access), (SET_COOKIE, refresh)]),
        Json(MessageResponse::new("Logged out")),
    )
}

/// GET /api/auth/me
///
/// Identity of the current caller, as resolved by the route guard.
pub async fn me(AuthUser(identity): AuthUser) -> impl IntoResponse {
    Json(serde_json::json!({
        "user": {
            "id": identity.user_id,
            "email": identity.email,
            "role": identity.role
        }
    }))
}
