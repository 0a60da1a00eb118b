//! Request Extractors
//!
//! Handler-side access to the identity resolved by the route guard, plus
//! client metadata (IP, user agent) for session records.

use crate::middleware::Identity;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

/// Authenticated caller, taken from the identity the route guard injected.
///
/// Handlers using this extractor must sit behind the guard; there is no
/// cookie re-parsing fallback here by design.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({
                        "error": "unauthorized",
                        "message": "Authentication required"
                    })),
                )
                    .into_response()
            })
    }
}

/// Client information (IP, user agent)
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = parts
            .headers
            .get("X-Forwarded-For")
            .and_then(|h| h.to_str().ok())
            .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
            .or_else(|| {
                parts
                    .headers
                    .get("X-Real-IP")
                    .and_then(|h| h.to_str().ok())
                    .map(String::from)
            });

        let user_agent = parts
            .headers
            .get("User-Agent")
            .and_then(|h| h.to_str().ok())
            .map(String::from);

        Ok(ClientInfo { ip, user_agent })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn parts_for(req: Request<()>) -> Parts {
        req.into_parts().0
    }

    #[tokio::test]
    async fn client_info_prefers_forwarded_for() {
        let req = Request::builder()
            .header("X-Forwarded-For", "203.0.113.7, 10.0.0.1")
            .header("X-Real-IP", "198.51.100.2")
            .header("User-Agent", "test-agent/1.0")
            .body(())
            .unwrap();
        let mut parts = parts_for(req).await;

        let info = ClientInfo::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(info.ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(info.user_agent.as_deref(), Some("test-agent/1.0"));
    }

    #[tokio::test]
    async fn client_info_tolerates_missing_headers() {
        let req = Request::builder().body(()).unwrap();
        let mut parts = parts_for(req).await;

        let info = ClientInfo::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(info.ip.is_none());
        assert!(info.user_agent.is_none());
    }

    #[tokio::test]
    async fn auth_user_requires_guard_injected_identity() {
        let req = Request::builder().body(()).unwrap();
        let mut parts = parts_for(req).await;

        assert!(AuthUser::from_request_parts(&mut parts, &()).await.is_err());
    }
}
