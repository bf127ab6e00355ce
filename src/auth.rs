//! Accounts, passwords and bearer tokens.
//!
//! Tokens are HS256 JWTs carrying the user id. They are read from the
//! `token` cookie first and from `Authorization: Bearer` otherwise. The
//! extractors below resolve the token to a stored [`User`] on every request,
//! so deleting a user revokes their outstanding tokens.

use std::sync::OnceLock;

use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{web, FromRequest, HttpRequest};
use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use chrono::{DateTime, Duration, Utc};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::AdminAccount;
use crate::error::ApiError;
use crate::models::{new_id, Role, User, DEFAULT_AVATAR};
use crate::state::AppState;
use crate::store::Store;

pub const TOKEN_COOKIE: &str = "token";

const LOGIN_REQUIRED: &str = "请先登录访问此功能";
const SESSION_EXPIRED: &str = "登录状态已过期，请重新登录";
const USER_GONE: &str = "用户不存在，请重新登录";
const ADMIN_REQUIRED: &str = "需要管理员权限才能执行此操作";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and checks session tokens against the service clock.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl_days: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::days(ttl_days),
        }
    }

    pub fn issue(&self, user_id: &str, now: DateTime<Utc>) -> Result<String, ApiError> {
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ApiError::Internal(format!("token signing failed: {e}")))
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, ApiError> {
        // expiry is checked against `now` so it follows the service clock
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("rejecting token: {e}");
                ApiError::Unauthorized(SESSION_EXPIRED.to_string())
            })?;

        if claims.exp <= now.timestamp() {
            debug!("rejecting expired token for user {}", claims.sub);
            return Err(ApiError::Unauthorized(SESSION_EXPIRED.to_string()));
        }
        Ok(claims)
    }

    /// Session cookie carrying `token`, living as long as the token does.
    pub fn cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build(TOKEN_COOKIE, token)
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(self.ttl.num_seconds()))
            .finish()
    }
}

/// An already-expired session cookie, clearing the browser's copy.
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build(TOKEN_COOKIE, "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::ZERO)
        .finish()
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::warn!("stored password hash is unreadable: {e}");
            false
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL
        .get_or_init(|| {
            Regex::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,3})+$")
                .unwrap_or_else(|e| panic!("email pattern does not compile: {e}"))
        })
        .is_match(email)
}

pub fn token_from_request(req: &HttpRequest) -> Option<String> {
    if let Some(cookie) = req.cookie(TOKEN_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

async fn authenticate(state: &AppState, token: Option<String>) -> Result<User, ApiError> {
    let token = token.ok_or_else(|| ApiError::Unauthorized(LOGIN_REQUIRED.to_string()))?;
    let claims = state.tokens.verify(&token, state.utc_now())?;
    let user = state
        .run(move |backend| Ok(backend.store.find_user(&claims.sub)?))
        .await?;
    user.ok_or_else(|| ApiError::Unauthorized(USER_GONE.to_string()))
}

fn app_state(req: &HttpRequest) -> Result<web::Data<AppState>, ApiError> {
    req.app_data::<web::Data<AppState>>()
        .cloned()
        .ok_or_else(|| ApiError::Internal("application state is not registered".to_string()))
}

/// A signed-in user; 401 otherwise.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let state = app_state(req);
        let token = token_from_request(req);
        Box::pin(async move {
            let state = state?;
            authenticate(&state, token).await.map(AuthUser)
        })
    }
}

/// A signed-in admin; 401 without a session, 403 for other roles.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl FromRequest for AdminUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let state = app_state(req);
        let token = token_from_request(req);
        Box::pin(async move {
            let state = state?;
            let user = authenticate(&state, token).await?;
            if !user.is_admin() {
                return Err(ApiError::forbidden(ADMIN_REQUIRED));
            }
            Ok(AdminUser(user))
        })
    }
}

/// The signed-in user when there is one. Never rejects the request.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl FromRequest for MaybeUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let state = app_state(req);
        let token = token_from_request(req);
        Box::pin(async move {
            let state = state?;
            if token.is_none() {
                return Ok(MaybeUser(None));
            }
            match authenticate(&state, token).await {
                Ok(user) => Ok(MaybeUser(Some(user))),
                Err(e) => {
                    debug!("optional authentication failed: {e}");
                    Ok(MaybeUser(None))
                }
            }
        })
    }
}

/// Creates the configured admin account unless its email is already taken.
/// Returns whether an account was created.
pub fn ensure_admin(
    store: &dyn Store,
    account: &AdminAccount,
    now: chrono::NaiveDateTime,
) -> Result<bool, ApiError> {
    let email = normalize_email(&account.email);
    if let Some(existing) = store.find_user_by_email(&email)? {
        if !existing.is_admin() {
            log::warn!("admin email {email} belongs to a non-admin account, leaving it unchanged");
        }
        return Ok(false);
    }

    let admin = User {
        id: new_id(),
        username: account.username.trim().to_string(),
        email: email.clone(),
        password_hash: hash_password(&account.password)?,
        role: Role::Admin,
        avatar: DEFAULT_AVATAR.to_string(),
        created_at: now,
    };
    store.insert_user(&admin)?;
    info!("created admin account {email}");
    Ok(true)
}
