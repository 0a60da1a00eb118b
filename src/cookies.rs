//! Cookie-issuance policy
//!
//! Both tokens travel as http-only, same-site-strict cookies rooted at `/`.
//! The `Secure` attribute follows the deployment environment. Logout clears
//! both cookies with zero max-age; the cleared cookies are the
//! client-authoritative logout signal regardless of store outcome.

use crate::config::AuthConfig;
use crate::models::TokenPair;

use axum::http::header::HeaderMap;
use cookie::{time::Duration, Cookie, SameSite};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

fn build(config: &AuthConfig, name: &'static str, value: String, max_age: i64) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(config.environment.is_production())
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(Duration::seconds(max_age))
        .build()
}

/// Serialized Set-Cookie values for a freshly minted pair.
pub fn pair_cookies(config: &AuthConfig, pair: &TokenPair, remember_me: bool) -> [String; 2] {
    let refresh_ttl = if remember_me {
        config.remember_ttl
    } else {
        config.refresh_ttl
    };

    [
        build(
            config,
            ACCESS_COOKIE,
            pair.access_token.clone(),
            config.access_ttl,
        )
        .to_string(),
        build(
            config,
            REFRESH_COOKIE,
            pair.refresh_token.clone(),
            refresh_ttl,
        )
        .to_string(),
    ]
}

/// Set-Cookie values that clear both cookies.
pub fn clear_cookies(config: &AuthConfig) -> [String; 2] {
    [
        build(config, ACCESS_COOKIE, String::new(), 0).to_string(),
        build(config, REFRESH_COOKIE, String::new(), 0).to_string(),
    ]
}

/// Read one cookie value out of a request's `Cookie` header.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    Cookie::split_parse(header)
        .flatten()
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{test_config, Environment};
    use axum::http::HeaderValue;

    fn pair() -> TokenPair {
        TokenPair {
            access_token: "acc.token".to_string(),
            refresh_token: "ref.token".to_string(),
        }
    }

    #[test]
    fn issued_cookies_carry_policy_flags() {
        let [access, refresh] = pair_cookies(&test_config(), &pair(), false);

        assert!(access.contains("accessToken=acc.token"));
        assert!(access.contains("HttpOnly"));
        assert!(access.contains("SameSite=Strict"));
        assert!(access.contains("Path=/"));
        assert!(access.contains("Max-Age=900"));

        assert!(refresh.contains("refreshToken=ref.token"));
        assert!(refresh.contains("Max-Age=604800"));
    }

    #[test]
    fn remember_me_extends_only_the_refresh_cookie() {
        let [access, refresh] = pair_cookies(&test_config(), &pair(), true);
        assert!(access.contains("Max-Age=900"));
        assert!(refresh.contains("Max-Age=2592000"));
    }

    #[test]
    fn secure_flag_follows_environment() {
        let dev = pair_cookies(&test_config(), &pair(), false);
        assert!(!dev[0].contains("Secure"));

        let mut config = test_config();
        config.environment = Environment::Production;
        let prod = pair_cookies(&config, &pair(), false);
        assert!(prod[0].contains("Secure"));
    }

    #[test]
    fn clearing_zeroes_values_and_max_age() {
        let [access, refresh] = clear_cookies(&test_config());
        assert!(access.starts_with("accessToken=;"));
        assert!(access.contains("Max-Age=0"));
        assert!(refresh.starts_with("refreshToken=;"));
    }

    #[test]
    fn read_cookie_finds_named_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("theme=dark; accessToken=abc123; other=1"),
        );

        assert_eq!(
            read_cookie(&headers, ACCESS_COOKIE).as_deref(),
            Some("abc123")
        );
        assert!(read_cookie(&headers, REFRESH_COOKIE).is_none());
    }

    #[test]
    fn read_cookie_handles_missing_header() {
        let headers = HeaderMap::new();
        assert!(read_cookie(&headers, ACCESS_COOKIE).is_none());
    }
}
