use actix_web::{get, post, web, HttpResponse};
use log::info;
use serde::Deserialize;
use serde_json::json;

use super::non_blank;
use crate::auth::{self, hash_password, is_valid_email, normalize_email, verify_password, AuthUser};
use crate::error::ApiError;
use crate::models::{new_id, Role, User, DEFAULT_AVATAR};
use crate::state::AppState;
use crate::store::StoreError;

const MIN_PASSWORD_LEN: usize = 6;
const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=20;
const MAX_EMAIL_LEN: usize = 255;
const BAD_CREDENTIALS: &str = "邮箱或密码错误";

pub(super) fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(register)
        .service(login)
        .service(logout)
        .service(me);
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

fn conflict_message(field: &str) -> String {
    format!("{field}已被使用，请选择其他{field}")
}

#[post("/auth/register")]
async fn register(
    state: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let (Some(username), Some(email), Some(password)) = (
        non_blank(body.username),
        non_blank(body.email),
        body.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::bad_request("请填写完整的用户名、邮箱和密码"));
    };

    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request("密码至少需要6位字符"));
    }
    if !USERNAME_LEN.contains(&username.chars().count()) {
        return Err(ApiError::bad_request("用户名长度必须在3到20个字符之间"));
    }
    let email = normalize_email(&email);
    if email.chars().count() > MAX_EMAIL_LEN || !is_valid_email(&email) {
        return Err(ApiError::bad_request("请输入有效的邮箱地址"));
    }

    let now = state.now();
    let user = state
        .run(move |backend| {
            if let Some(existing) = backend
                .store
                .find_user_by_email_or_username(&email, &username)?
            {
                let field = if existing.email == email { "邮箱" } else { "用户名" };
                return Err(ApiError::bad_request(conflict_message(field)));
            }

            let user = User {
                id: new_id(),
                username,
                email,
                password_hash: hash_password(&password)?,
                role: Role::Student,
                avatar: DEFAULT_AVATAR.to_string(),
                created_at: now,
            };
            backend.store.insert_user(&user).map_err(|err| match err {
                StoreError::Conflict(field) => {
                    ApiError::bad_request(conflict_message(&field))
                }
                other => other.into(),
            })?;
            Ok(user)
        })
        .await?;

    info!("registered user {} ({})", user.username, user.id);
    let token = state.tokens.issue(&user.id, state.utc_now())?;
    Ok(HttpResponse::Created()
        .cookie(state.tokens.cookie(token.clone()))
        .json(json!({
            "success": true,
            "message": "注册成功！欢迎加入曹杨二中美食评分系统！",
            "user": user.profile(),
            "token": token,
        })))
}

#[post("/auth/login")]
async fn login(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let (Some(email), Some(password)) = (
        non_blank(body.email),
        body.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::bad_request("请输入邮箱和密码"));
    };

    let email = normalize_email(&email);
    let user = state
        .run(move |backend| {
            let user = backend.store.find_user_by_email(&email)?;
            Ok(user.filter(|user| verify_password(&password, &user.password_hash)))
        })
        .await?
        .ok_or_else(|| ApiError::Unauthorized(BAD_CREDENTIALS.to_string()))?;

    info!("user {} signed in", user.id);
    let token = state.tokens.issue(&user.id, state.utc_now())?;
    Ok(HttpResponse::Ok()
        .cookie(state.tokens.cookie(token.clone()))
        .json(json!({
            "success": true,
            "message": format!("欢迎回来，{}！", user.username),
            "user": user.profile(),
            "token": token,
        })))
}

#[post("/auth/logout")]
async fn logout() -> HttpResponse {
    HttpResponse::Ok()
        .cookie(auth::removal_cookie())
        .json(json!({"success": true, "message": "已安全退出登录"}))
}

#[get("/auth/me")]
async fn me(AuthUser(user): AuthUser) -> HttpResponse {
    HttpResponse::Ok().json(json!({"success": true, "user": user.profile()}))
}
