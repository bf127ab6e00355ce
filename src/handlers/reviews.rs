use std::collections::HashMap;

use actix_web::{delete, get, post, put, web, HttpResponse};
use log::info;
use serde::Deserialize;
use serde_json::json;

use super::{non_blank, Paging};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::{new_id, Review, ReviewView};
use crate::rating;
use crate::state::{AppState, Backend};
use crate::store::{ReviewSort, SortOrder, StoreError};

const DEFAULT_PAGE_SIZE: u64 = 10;
const MAX_CONTENT_LEN: usize = 500;
const FOOD_NOT_FOUND: &str = "美食不存在";
const REVIEW_NOT_FOUND: &str = "评论不存在";
const ALREADY_REVIEWED: &str = "您已经评论过这个美食了，可以选择修改评论";

pub(super) fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(list_reviews)
        .service(create_review)
        .service(update_review)
        .service(delete_review)
        .service(toggle_like);
}

#[derive(Debug, Deserialize)]
struct ReviewQuery {
    page: Option<u64>,
    limit: Option<u64>,
    #[serde(default)]
    sort: ReviewSort,
    #[serde(default)]
    order: SortOrder,
}

#[derive(Debug, Deserialize)]
struct ReviewRequest {
    content: Option<String>,
    rating: Option<i64>,
}

fn check_rating(rating: i64) -> Result<u8, ApiError> {
    if !rating::is_valid_rating(rating) {
        return Err(ApiError::bad_request("评分必须在1-5星之间"));
    }
    u8::try_from(rating).map_err(|_| ApiError::bad_request("评分必须在1-5星之间"))
}

fn check_content(content: &str) -> Result<(), ApiError> {
    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(ApiError::bad_request("评论内容不能超过500个字符"));
    }
    Ok(())
}

/// Attaches each review's author card.
fn with_authors(backend: &Backend, reviews: Vec<Review>) -> Result<Vec<ReviewView>, ApiError> {
    let mut ids: Vec<String> = reviews.iter().map(|r| r.user_id.clone()).collect();
    ids.sort();
    ids.dedup();
    let authors: HashMap<String, _> = backend
        .store
        .find_users(&ids)?
        .into_iter()
        .map(|user| (user.id.clone(), user.author()))
        .collect();

    Ok(reviews
        .into_iter()
        .map(|review| {
            let user = authors.get(&review.user_id).cloned();
            ReviewView { review, user }
        })
        .collect())
}

#[get("/foods/{food_id}/reviews")]
async fn list_reviews(
    state: web::Data<AppState>,
    food_id: web::Path<String>,
    query: web::Query<ReviewQuery>,
) -> Result<HttpResponse, ApiError> {
    let food_id = food_id.into_inner();
    let query = query.into_inner();
    let paging = Paging::new(query.page, query.limit, DEFAULT_PAGE_SIZE)?;

    let (reviews, total) = state
        .run(move |backend| {
            if backend.store.find_food(&food_id)?.is_none() {
                return Err(ApiError::not_found(FOOD_NOT_FOUND));
            }
            let (reviews, total) =
                backend
                    .store
                    .list_reviews(&food_id, query.sort, query.order, paging.window())?;
            Ok((with_authors(backend, reviews)?, total))
        })
        .await?;

    let has_more = paging.window().offset + (reviews.len() as u64) < total;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "reviews": reviews,
        "pagination": {
            "currentPage": paging.number,
            "totalPages": paging.total_pages(total),
            "totalReviews": total,
            "hasMore": has_more,
        },
    })))
}

#[post("/foods/{food_id}/reviews")]
async fn create_review(
    state: web::Data<AppState>,
    AuthUser(user): AuthUser,
    food_id: web::Path<String>,
    body: web::Json<ReviewRequest>,
) -> Result<HttpResponse, ApiError> {
    let food_id = food_id.into_inner();
    let body = body.into_inner();
    let (Some(content), Some(rating)) = (non_blank(body.content), body.rating) else {
        return Err(ApiError::bad_request("评论内容和评分不能为空"));
    };
    let rating = check_rating(rating)?;
    check_content(&content)?;

    let now = state.now();
    let author = user.clone();
    let (review, food) = state
        .run(move |backend| {
            if backend.store.find_food(&food_id)?.is_none() {
                return Err(ApiError::not_found(FOOD_NOT_FOUND));
            }
            if backend
                .store
                .find_review_by_author(&food_id, &author.id)?
                .is_some()
            {
                return Err(ApiError::bad_request(ALREADY_REVIEWED));
            }

            let review = Review {
                id: new_id(),
                food_id: food_id.clone(),
                user_id: author.id.clone(),
                content,
                rating,
                likes: Vec::new(),
                likes_count: 0,
                created_at: now,
                updated_at: now,
            };
            backend.store.insert_review(&review).map_err(|err| match err {
                StoreError::Conflict(_) => ApiError::bad_request(ALREADY_REVIEWED),
                other => other.into(),
            })?;

            let food = rating::refresh(backend.store.as_ref(), &food_id)?
                .ok_or_else(|| ApiError::not_found(FOOD_NOT_FOUND))?;
            backend.cache.invalidate();
            Ok((review, food))
        })
        .await?;

    info!(
        "user {} reviewed food {} with {} stars",
        user.id, food.id, review.rating
    );
    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "评论添加成功！",
        "review": ReviewView { review, user: Some(user.author()) },
        "foodRating": {
            "averageRating": food.average_rating,
            "reviewsCount": food.reviews_count,
        },
    })))
}

#[put("/reviews/{id}")]
async fn update_review(
    state: web::Data<AppState>,
    AuthUser(user): AuthUser,
    id: web::Path<String>,
    body: web::Json<ReviewRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let body = body.into_inner();
    let rating = body.rating.map(check_rating).transpose()?;
    let content = non_blank(body.content);
    if let Some(content) = &content {
        check_content(content)?;
    }

    let now = state.now();
    let author = user.clone();
    let review = state
        .run(move |backend| {
            let mut review = backend
                .store
                .find_review(&id)?
                .ok_or_else(|| ApiError::not_found(REVIEW_NOT_FOUND))?;
            if review.user_id != author.id {
                return Err(ApiError::forbidden("只能修改自己的评论"));
            }

            if let Some(content) = content {
                review.content = content;
            }
            if let Some(rating) = rating {
                review.rating = rating;
            }
            review.updated_at = now;
            backend.store.update_review(&review)?;

            rating::refresh(backend.store.as_ref(), &review.food_id)?;
            backend.cache.invalidate();
            Ok(review)
        })
        .await?;

    info!("user {} edited review {}", user.id, review.id);
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "评论更新成功！",
        "review": ReviewView { review, user: Some(user.author()) },
    })))
}

#[delete("/reviews/{id}")]
async fn delete_review(
    state: web::Data<AppState>,
    AuthUser(user): AuthUser,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let actor = user.clone();
    let review = state
        .run(move |backend| {
            let review = backend
                .store
                .find_review(&id)?
                .ok_or_else(|| ApiError::not_found(REVIEW_NOT_FOUND))?;
            if review.user_id != actor.id && !actor.is_admin() {
                return Err(ApiError::forbidden("没有权限删除此评论"));
            }

            backend.store.delete_review(&review.id)?;
            rating::refresh(backend.store.as_ref(), &review.food_id)?;
            backend.cache.invalidate();
            Ok(review)
        })
        .await?;

    info!("user {} deleted review {}", user.id, review.id);
    Ok(HttpResponse::Ok().json(json!({"success": true, "message": "评论删除成功"})))
}

#[post("/reviews/{id}/like")]
async fn toggle_like(
    state: web::Data<AppState>,
    AuthUser(user): AuthUser,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let user_id = user.id.clone();
    let now = state.now();
    let toggle = state
        .run(move |backend| {
            backend
                .store
                .toggle_like(&id, &user_id, now)?
                .ok_or_else(|| ApiError::not_found(REVIEW_NOT_FOUND))
        })
        .await?;

    let message = if toggle.liked { "点赞成功" } else { "取消点赞成功" };
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": message,
        "isLiked": toggle.liked,
        "likesCount": toggle.likes_count,
    })))
}
