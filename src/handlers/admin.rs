use actix_web::{delete, get, web, HttpResponse};
use log::info;
use serde_json::json;

use crate::auth::AdminUser;
use crate::error::ApiError;
use crate::models::UserProfile;
use crate::rating;
use crate::state::AppState;

pub(super) fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(list_users).service(delete_user);
}

#[get("/admin/users")]
async fn list_users(
    state: web::Data<AppState>,
    _admin: AdminUser,
) -> Result<HttpResponse, ApiError> {
    let users: Vec<UserProfile> = state
        .run(|backend| {
            Ok(backend
                .store
                .list_users()?
                .iter()
                .map(|user| user.profile())
                .collect())
        })
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "total": users.len(),
        "users": users,
    })))
}

#[delete("/admin/users/{id}")]
async fn delete_user(
    state: web::Data<AppState>,
    AdminUser(admin): AdminUser,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    if id == admin.id {
        return Err(ApiError::bad_request("不能删除自己的账号"));
    }

    let target = id.clone();
    let touched = state
        .run(move |backend| {
            let foods = backend
                .store
                .delete_user(&target)?
                .ok_or_else(|| ApiError::not_found("用户不存在"))?;
            for food_id in &foods {
                rating::refresh(backend.store.as_ref(), food_id)?;
            }
            if !foods.is_empty() {
                backend.cache.invalidate();
            }
            Ok(foods.len())
        })
        .await?;

    info!(
        "admin {} deleted user {} ({} rated foods recomputed)",
        admin.id, id, touched
    );
    Ok(HttpResponse::Ok().json(json!({"success": true, "message": "用户已删除"})))
}
