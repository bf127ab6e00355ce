use actix_web::{delete, get, post, put, web, HttpResponse};
use log::info;
use serde::Deserialize;
use serde_json::json;

use super::{check_len, non_blank};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::{new_id, Food, FoodCategory, DEFAULT_FOOD_EMOJI};
use crate::state::AppState;

const MAX_NAME_LEN: usize = 100;
const MAX_LOCATION_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 500;
const MAX_EMOJI_LEN: usize = 16;
const FOOD_NOT_FOUND: &str = "未找到该美食";

pub(super) fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(get_all_food)
        .service(get_food)
        .service(create_food)
        .service(update_food)
        .service(delete_food);
}

#[derive(Debug, Deserialize)]
struct FoodRequest {
    name: Option<String>,
    category: Option<String>,
    location: Option<String>,
    description: Option<String>,
    emoji: Option<String>,
}

fn parse_category(category: &str) -> Result<FoodCategory, ApiError> {
    category.parse().map_err(|_| {
        let allowed: Vec<&str> = FoodCategory::ALL.iter().map(|c| c.as_str()).collect();
        ApiError::bad_request(format!("美食分类必须是以下之一：{}", allowed.join("、")))
    })
}

/// Column limits of the `foods` table; any field may be absent on update.
fn check_food_fields(
    name: Option<&str>,
    location: Option<&str>,
    description: Option<&str>,
    emoji: Option<&str>,
) -> Result<(), ApiError> {
    let limits = [
        (name, MAX_NAME_LEN, "美食名称"),
        (location, MAX_LOCATION_LEN, "位置"),
        (description, MAX_DESCRIPTION_LEN, "描述"),
        (emoji, MAX_EMOJI_LEN, "表情"),
    ];
    for (value, max, label) in limits {
        if let Some(value) = value {
            check_len(value, max, label)?;
        }
    }
    Ok(())
}

#[get("/foods")]
async fn get_all_food(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let foods = state
        .run(|backend| {
            if let Some(foods) = backend.cache.get_foods() {
                return Ok(foods);
            }
            let foods = backend.store.list_foods()?;
            backend.cache.put_foods(&foods);
            Ok(foods)
        })
        .await?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "foods": foods})))
}

#[get("/foods/{id}")]
async fn get_food(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let food = state
        .run(move |backend| Ok(backend.store.find_food(&id)?))
        .await?
        .ok_or_else(|| ApiError::not_found(FOOD_NOT_FOUND))?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "food": food})))
}

#[post("/foods")]
async fn create_food(
    state: web::Data<AppState>,
    AuthUser(user): AuthUser,
    body: web::Json<FoodRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let (Some(name), Some(category), Some(location), Some(description)) = (
        non_blank(body.name),
        non_blank(body.category),
        non_blank(body.location),
        non_blank(body.description),
    ) else {
        return Err(ApiError::bad_request("请填写美食名称、分类、位置和描述"));
    };
    let category = parse_category(&category)?;
    let emoji = non_blank(body.emoji);
    check_food_fields(
        Some(&name),
        Some(&location),
        Some(&description),
        emoji.as_deref(),
    )?;

    let food = Food {
        id: new_id(),
        name,
        category,
        location,
        description,
        emoji: emoji.unwrap_or_else(|| DEFAULT_FOOD_EMOJI.to_string()),
        average_rating: 0.0,
        reviews_count: 0,
        rating_distribution: [0; 5],
        created_by: user.id.clone(),
        created_by_name: user.username.clone(),
        created_at: state.now(),
    };

    let food = state
        .run(move |backend| {
            backend.store.insert_food(&food)?;
            backend.cache.invalidate();
            Ok(food)
        })
        .await?;

    info!("user {} added food {} ({})", user.id, food.name, food.id);
    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "创建成功",
        "food": food,
    })))
}

#[put("/foods/{id}")]
async fn update_food(
    state: web::Data<AppState>,
    AuthUser(user): AuthUser,
    id: web::Path<String>,
    body: web::Json<FoodRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let body = body.into_inner();
    let category = non_blank(body.category)
        .map(|c| parse_category(&c))
        .transpose()?;
    let name = non_blank(body.name);
    let location = non_blank(body.location);
    let description = non_blank(body.description);
    let emoji = non_blank(body.emoji);
    check_food_fields(
        name.as_deref(),
        location.as_deref(),
        description.as_deref(),
        emoji.as_deref(),
    )?;

    let editor = user.clone();
    let food = state
        .run(move |backend| {
            let mut food = backend
                .store
                .find_food(&id)?
                .ok_or_else(|| ApiError::not_found(FOOD_NOT_FOUND))?;
            if !editor.is_admin() && food.created_by != editor.id {
                return Err(ApiError::forbidden("无权限修改"));
            }

            if let Some(name) = name {
                food.name = name;
            }
            if let Some(category) = category {
                food.category = category;
            }
            if let Some(location) = location {
                food.location = location;
            }
            if let Some(description) = description {
                food.description = description;
            }
            if let Some(emoji) = emoji {
                food.emoji = emoji;
            }

            backend.store.update_food_details(&food)?;
            backend.cache.invalidate();
            // rating fields may have moved since the read above
            backend
                .store
                .find_food(&food.id)?
                .ok_or_else(|| ApiError::not_found(FOOD_NOT_FOUND))
        })
        .await?;

    info!("user {} updated food {}", user.id, food.id);
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "更新成功",
        "food": food,
    })))
}

#[delete("/foods/{id}")]
async fn delete_food(
    state: web::Data<AppState>,
    AuthUser(user): AuthUser,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let editor = user.clone();
    let food = state
        .run(move |backend| {
            let food = backend
                .store
                .find_food(&id)?
                .ok_or_else(|| ApiError::not_found(FOOD_NOT_FOUND))?;
            if !editor.is_admin() && food.created_by != editor.id {
                return Err(ApiError::forbidden("无权限删除"));
            }
            backend.store.delete_food(&food.id)?;
            backend.cache.invalidate();
            Ok(food)
        })
        .await?;

    info!("user {} deleted food {} ({})", user.id, food.name, food.id);
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": format!("美食\"{}\"已删除", food.name),
    })))
}
