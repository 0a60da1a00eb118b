//! Authentication Orchestrator
//!
//! Composes the password service, token service, session store, and user
//! store into the login / signup / refresh / logout flows, and owns the
//! decision of which taxonomy error each failure becomes.

use crate::config::AuthConfig;
use crate::cookies;
use crate::error::AuthError;
use crate::models::*;
use crate::password::PasswordService;
use crate::session::{NewSession, RotateOutcome, SessionStore};
use crate::token::TokenService;
use crate::users::UserStore;

use chrono::{Duration, Utc};
use std::sync::Arc;

/// Client metadata captured per request.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Authentication orchestrator
pub struct AuthService {
    config: AuthConfig,
    passwords: PasswordService,
    tokens: TokenService,
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
}

impl AuthService {
    /// Build the orchestrator, validating configuration up front. A
    /// configuration error here must abort process startup.
    pub fn new(
        config: AuthConfig,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, AuthError> {
        config.validate()?;
        Ok(Self {
            passwords: PasswordService::new(&config),
            tokens: TokenService::new(&config),
            config,
            users,
            sessions,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn passwords(&self) -> &PasswordService {
        &self.passwords
    }

    // ============================================
    // Login
    // ============================================

    /// Authenticate a user and mint a session plus token pair.
    ///
    /// Unknown email, wrong password, and an unreadable stored hash all
    /// collapse into `InvalidCredentials`.
    pub async fn login(
        &self,
        req: LoginRequest,
        client: ClientMeta,
    ) -> Result<AuthResponse, AuthError> {
        let email = req.email.trim().to_lowercase();

        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let password_ok = self
            .passwords
            .verify(&req.password, &user.password_hash)
            .unwrap_or_else(|_| {
                tracing::error!(user_id = %user.id, "Stored password hash is unreadable");
                false
            });
        if !password_ok {
            return Err(AuthError::InvalidCredentials);
        }

        if !user.can_login() {
            tracing::warn!(user_id = %user.id, "Login attempt on disabled account");
            return Err(AuthError::AccountDisabled);
        }

        // Upgrade hashes minted under weaker cost parameters.
        if self.passwords.needs_rehash(&user.password_hash).unwrap_or(false) {
            match self.passwords.hash(&req.password) {
                Ok(upgraded) => {
                    if let Err(err) = self.users.update_password_hash(user.id, &upgraded).await {
                        tracing::warn!(user_id = %user.id, "Password rehash not persisted: {err}");
                    }
                }
                Err(err) => {
                    tracing::warn!(user_id = %user.id, "Password rehash failed: {err}")
                }
            }
        }

        let pair = self.mint_session(&user, client, req.remember_me).await?;

        self.users.touch_last_login(user.id).await?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(self.auth_response(user, pair))
    }

    // ============================================
    // Signup
    // ============================================

    /// Create an account and log it straight in.
    pub async fn signup(
        &self,
        req: SignupRequest,
        client: ClientMeta,
    ) -> Result<AuthResponse, AuthError> {
        let strength = self.passwords.strength(&req.password);
        if !strength.valid {
            return Err(AuthError::Validation(strength.feedback.join("; ")));
        }

        let email = req.email.trim().to_lowercase();
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = self.passwords.hash(&req.password)?;

        let user = self
            .users
            .insert(NewUser {
                email,
                password_hash,
                name: req.name,
                role: UserRole::User,
                preferences: default_preferences(),
            })
            .await?;

        // A first signup is necessarily below the cap; the shared path
        // keeps the invariant in one place.
        let pair = self.mint_session(&user, client, false).await?;

        tracing::info!(user_id = %user.id, "User signed up");
        Ok(self.auth_response(user, pair))
    }

    // ============================================
    // Refresh
    // ============================================

    /// Exchange a refresh token for a new pair, rotating the session key.
    ///
    /// Rotation is the atomic authority on session state: its `NotFound`
    /// covers the missing-session case, and its `Replay` triggers
    /// account-wide revocation before surfacing `TokenReplay`.
    pub async fn refresh(&self, old_refresh: &str) -> Result<AuthResponse, AuthError> {
        let claims = self
            .tokens
            .verify_refresh(old_refresh)
            .ok_or(AuthError::InvalidToken)?;

        let user = self
            .users
            .find_by_id(claims.user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if !user.can_login() {
            return Err(AuthError::AccountDisabled);
        }

        let pair = self.tokens.issue_pair(&UserClaims::from(&user))?;
        let expires_at = Utc::now() + Duration::seconds(self.config.refresh_ttl);

        match self
            .sessions
            .rotate(old_refresh, &pair.refresh_token, expires_at)
            .await?
        {
            RotateOutcome::Rotated(_) => {
                tracing::debug!(user_id = %user.id, "Session rotated");
                Ok(self.auth_response(user, pair))
            }
            RotateOutcome::Replay { user_id } => {
                tracing::warn!(%user_id, "Refresh token replay detected, revoking all sessions");
                self.sessions.invalidate_all_for_user(user_id).await?;
                Err(AuthError::TokenReplay)
            }
            RotateOutcome::NotFound => Err(AuthError::SessionNotFound),
        }
    }

    // ============================================
    // Logout
    // ============================================

    /// Best-effort logout: any internal failure degrades to an
    /// acknowledged logout, since the cleared cookies are authoritative
    /// for the client.
    pub async fn logout(
        &self,
        refresh_token: Option<&str>,
        all_devices: bool,
        access_token: Option<&str>,
    ) {
        if all_devices {
            if let Some(claims) = access_token.and_then(|t| self.tokens.verify_access(t)) {
                match self.sessions.invalidate_all_for_user(claims.user_id).await {
                    Ok(revoked) => {
                        tracing::info!(user_id = %claims.user_id, revoked, "Logged out all devices");
                        return;
                    }
                    Err(err) => {
                        tracing::warn!(user_id = %claims.user_id, "Logout-all failed: {err}")
                    }
                }
            }
        }

        if let Some(token) = refresh_token {
            match self.sessions.invalidate(token).await {
                Ok(true) => tracing::info!("Session invalidated on logout"),
                Ok(false) => tracing::debug!("Logout with unknown refresh token"),
                Err(err) => tracing::warn!("Logout failed to reach session store: {err}"),
            }
        }
    }

    // ============================================
    // Helpers
    // ============================================

    /// Mint a token pair and persist one session; the store enforces the
    /// per-user cap atomically with the insert.
    async fn mint_session(
        &self,
        user: &User,
        client: ClientMeta,
        remember_me: bool,
    ) -> Result<TokenPair, AuthError> {
        let pair = self.tokens.issue_pair(&UserClaims::from(user))?;

        let lifetime = if remember_me {
            self.config.remember_ttl
        } else {
            self.config.refresh_ttl
        };

        self.sessions
            .create(
                NewSession {
                    user_id: user.id,
                    refresh_token: pair.refresh_token.clone(),
                    user_agent: client.user_agent,
                    ip_address: client.ip_address,
                    expires_at: Utc::now() + Duration::seconds(lifetime),
                },
                self.config.max_sessions_per_user,
            )
            .await?;

        Ok(pair)
    }

    fn auth_response(&self, user: User, pair: TokenPair) -> AuthResponse {
        AuthResponse {
            user: SanitizedUser::from(user),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_ttl,
        }
    }

    /// Set-Cookie values for a login/signup/refresh response.
    pub fn issue_cookies(&self, response: &AuthResponse, remember_me: bool) -> [String; 2] {
        let pair = TokenPair {
            access_token: response.access_token.clone(),
            refresh_token: response.refresh_token.clone(),
        };
        cookies::pair_cookies(&self.config, &pair, remember_me)
    }

    /// Set-Cookie values that clear both auth cookies.
    pub fn clear_cookies(&self) -> [String; 2] {
        cookies::clear_cookies(&self.config)
    }
}
