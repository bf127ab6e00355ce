use std::collections::{HashMap, HashSet};

use actix_web::{get, web, HttpResponse};
use log::{debug, info};
use serde::Deserialize;
use serde_json::json;

use super::Paging;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::{new_id, DailyRecommendation, Food};
use crate::recommend;
use crate::state::AppState;
use crate::store::StoreError;

const DEFAULT_PAGE_SIZE: u64 = 10;

pub(super) fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(today).service(history);
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    page: Option<u64>,
    limit: Option<u64>,
}

#[get("/daily-recommendation")]
async fn today(
    state: web::Data<AppState>,
    AuthUser(user): AuthUser,
) -> Result<HttpResponse, ApiError> {
    let today = state.today();
    let now = state.now();
    let user_id = user.id.clone();

    let (food, is_new) = state
        .run(move |backend| {
            let store = backend.store.as_ref();
            let date_string = recommend::date_string(today);

            if let Some(existing) = store.find_recommendation(&user_id, &date_string)? {
                if let Some(food) = store.find_food(&existing.food_id)? {
                    return Ok((food, false));
                }
                debug!("recommended food {} is gone, picking again", existing.food_id);
            }

            let foods = store.list_foods()?;
            let recent: HashSet<String> = store
                .recommended_since(&user_id, recommend::recent_window_start(today))?
                .into_iter()
                .collect();
            let food = recommend::pick(&user_id, today, &foods, &recent)
                .cloned()
                .ok_or_else(|| ApiError::not_found("暂无美食数据，请先添加一些美食！"))?;

            let record = DailyRecommendation {
                id: new_id(),
                user_id: user_id.clone(),
                food_id: food.id.clone(),
                date: today,
                date_string: date_string.clone(),
                created_at: now,
            };
            match store.insert_recommendation(&record) {
                Ok(()) => Ok((food, true)),
                Err(StoreError::Conflict(_)) => {
                    // another request stored today's pick first
                    let winner = store
                        .find_recommendation(&user_id, &date_string)?
                        .and_then(|rec| store.find_food(&rec.food_id).transpose())
                        .transpose()?;
                    Ok((winner.unwrap_or(food), false))
                }
                Err(err) => Err(err.into()),
            }
        })
        .await?;

    if is_new {
        info!("recommended food {} to user {}", food.id, user.id);
    }
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "food": food,
        "message": format!("今天推荐您尝试：{} {}", food.name, food.emoji),
        "isNewRecommendation": is_new,
    })))
}

#[get("/daily-recommendation/history")]
async fn history(
    state: web::Data<AppState>,
    AuthUser(user): AuthUser,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, ApiError> {
    let paging = Paging::new(query.page, query.limit, DEFAULT_PAGE_SIZE)?;

    let (entries, total) = state
        .run(move |backend| {
            let (records, total) = backend
                .store
                .list_recommendations(&user.id, paging.window())?;
            let ids: Vec<String> = records.iter().map(|r| r.food_id.clone()).collect();
            let foods: HashMap<String, Food> = backend
                .store
                .find_foods(&ids)?
                .into_iter()
                .map(|food| (food.id.clone(), food))
                .collect();

            let entries: Vec<_> = records
                .into_iter()
                .map(|record| {
                    json!({
                        "date": record.date_string,
                        "food": foods.get(&record.food_id),
                        "createdAt": record.created_at,
                    })
                })
                .collect();
            Ok((entries, total))
        })
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "pagination": {
            "current": paging.number,
            "total": paging.total_pages(total),
            "count": entries.len(),
            "totalRecords": total,
        },
        "recommendations": entries,
    })))
}
