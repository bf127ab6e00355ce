use std::collections::{HashMap, HashSet};

use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::{Datelike, Duration, NaiveDate};
use log::info;
use serde::Deserialize;
use serde_json::json;

use super::check_len;
use crate::auth::AdminUser;
use crate::error::ApiError;
use crate::models::{
    new_id, Dish, DishView, Food, MealType, MenuSource, MenuView, School, SchoolMenu,
};
use crate::state::{AppState, Backend};
use crate::store::StoreError;

const MENU_NOT_FOUND: &str = "菜单不存在";
const MAX_SCHOOL_FIELD_LEN: usize = 100;

pub(super) fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(today_menu)
        .service(week_menu)
        .service(day_menu)
        .service(create_menu)
        .service(update_menu)
        .service(delete_menu);
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TodayQuery {
    #[serde(default)]
    meal_type: MealType,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewMenu {
    date: Option<NaiveDate>,
    meal_type: Option<MealType>,
    dishes: Option<Vec<Dish>>,
    school: Option<School>,
}

#[derive(Debug, Deserialize)]
struct MenuUpdate {
    dishes: Option<Vec<Dish>>,
}

/// First day (Sunday) of the week containing `day`.
pub(crate) fn week_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(i64::from(day.weekday().num_days_from_sunday()))
}

fn check_prices(dishes: &[Dish]) -> Result<(), ApiError> {
    if dishes.iter().any(|d| !d.price.is_finite() || d.price < 0.0) {
        return Err(ApiError::bad_request("菜品价格不能为负数"));
    }
    Ok(())
}

/// Rejects dishes that point at foods which do not exist.
fn check_dish_foods(backend: &Backend, dishes: &[Dish]) -> Result<(), ApiError> {
    let ids: Vec<String> = dishes.iter().map(|d| d.food_id.clone()).collect();
    let known: HashSet<String> = backend
        .store
        .find_foods(&ids)?
        .into_iter()
        .map(|food| food.id)
        .collect();
    match dishes.iter().find(|d| !known.contains(&d.food_id)) {
        Some(missing) => Err(ApiError::bad_request(format!(
            "菜品 {} 不存在",
            missing.food_id
        ))),
        None => Ok(()),
    }
}

/// Populates every dish's food across `menus` with one lookup.
fn menu_views(backend: &Backend, menus: Vec<SchoolMenu>) -> Result<Vec<MenuView>, ApiError> {
    let mut ids: Vec<String> = menus
        .iter()
        .flat_map(|m| m.dishes.iter().map(|d| d.food_id.clone()))
        .collect();
    ids.sort();
    ids.dedup();
    let foods: HashMap<String, Food> = backend
        .store
        .find_foods(&ids)?
        .into_iter()
        .map(|food| (food.id.clone(), food))
        .collect();

    Ok(menus
        .into_iter()
        .map(|menu| MenuView {
            dishes: menu
                .dishes
                .into_iter()
                .map(|dish| {
                    let food = foods.get(&dish.food_id).cloned();
                    DishView { dish, food }
                })
                .collect(),
            id: menu.id,
            date: menu.date,
            meal_type: menu.meal_type,
            school: menu.school,
            source: menu.source,
            created_at: menu.created_at,
            updated_at: menu.updated_at,
        })
        .collect())
}

fn menu_view(backend: &Backend, menu: SchoolMenu) -> Result<MenuView, ApiError> {
    menu_views(backend, vec![menu])?
        .pop()
        .ok_or_else(|| ApiError::Internal("menu view lost its menu".to_string()))
}

#[get("/menu/today")]
async fn today_menu(
    state: web::Data<AppState>,
    query: web::Query<TodayQuery>,
) -> Result<HttpResponse, ApiError> {
    let meal = query.meal_type;
    let today = state.today();
    let menu = state
        .run(move |backend| {
            backend
                .store
                .find_menu_for(today, meal)?
                .map(|menu| menu_view(backend, menu))
                .transpose()
        })
        .await?;

    let message = if menu.is_some() {
        "获取今日菜单成功"
    } else {
        "今日暂无菜单"
    };
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "menu": menu,
        "message": message,
    })))
}

#[get("/menu/day/{date}")]
async fn day_menu(
    state: web::Data<AppState>,
    date: web::Path<NaiveDate>,
) -> Result<HttpResponse, ApiError> {
    let date = date.into_inner();
    let menus = state
        .run(move |backend| {
            let menus = backend
                .store
                .list_menus_between(date, date + Duration::days(1))?;
            menu_views(backend, menus)
        })
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "date": date,
        "menus": menus,
    })))
}

#[get("/menu/week")]
async fn week_menu(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let start = week_start(state.today());
    let menus = state
        .run(move |backend| {
            let menus = backend
                .store
                .list_menus_between(start, start + Duration::days(7))?;
            menu_views(backend, menus)
        })
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "menus": menus,
        "message": "获取本周菜单成功",
    })))
}

#[post("/menu")]
async fn create_menu(
    state: web::Data<AppState>,
    AdminUser(admin): AdminUser,
    body: web::Json<NewMenu>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let (Some(date), Some(meal_type), Some(dishes)) = (body.date, body.meal_type, body.dishes)
    else {
        return Err(ApiError::bad_request("请提供完整的菜单信息"));
    };
    if dishes.is_empty() {
        return Err(ApiError::bad_request("请提供完整的菜单信息"));
    }
    check_prices(&dishes)?;
    let school = body.school.unwrap_or_default();
    check_len(&school.name, MAX_SCHOOL_FIELD_LEN, "学校名称")?;
    check_len(&school.location, MAX_SCHOOL_FIELD_LEN, "学校位置")?;

    let now = state.now();
    let menu = SchoolMenu {
        id: new_id(),
        date,
        meal_type,
        dishes,
        school,
        source: MenuSource::Manual,
        created_at: now,
        updated_at: now,
    };

    let view = state
        .run(move |backend| {
            check_dish_foods(backend, &menu.dishes)?;
            backend.store.insert_menu(&menu).map_err(|err| match err {
                StoreError::Conflict(_) => ApiError::bad_request("该时间段的菜单已存在"),
                other => other.into(),
            })?;
            menu_view(backend, menu)
        })
        .await?;

    info!(
        "admin {} created {} menu for {}",
        admin.id, view.meal_type, view.date
    );
    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "menu": view,
        "message": "菜单创建成功",
    })))
}

#[put("/menu/{id}")]
async fn update_menu(
    state: web::Data<AppState>,
    AdminUser(admin): AdminUser,
    id: web::Path<String>,
    body: web::Json<MenuUpdate>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let dishes = body.into_inner().dishes;
    if let Some(dishes) = &dishes {
        check_prices(dishes)?;
    }

    let now = state.now();
    let view = state
        .run(move |backend| {
            if let Some(dishes) = &dishes {
                check_dish_foods(backend, dishes)?;
                if !backend.store.replace_dishes(&id, dishes, now)? {
                    return Err(ApiError::not_found(MENU_NOT_FOUND));
                }
            }
            let menu = backend
                .store
                .find_menu(&id)?
                .ok_or_else(|| ApiError::not_found(MENU_NOT_FOUND))?;
            menu_view(backend, menu)
        })
        .await?;

    info!("admin {} updated menu {}", admin.id, view.id);
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "menu": view,
        "message": "菜单更新成功",
    })))
}

#[delete("/menu/{id}")]
async fn delete_menu(
    state: web::Data<AppState>,
    AdminUser(admin): AdminUser,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let menu_id = id.clone();
    let deleted = state
        .run(move |backend| Ok(backend.store.delete_menu(&menu_id)?))
        .await?;
    if !deleted {
        return Err(ApiError::not_found(MENU_NOT_FOUND));
    }

    info!("admin {} deleted menu {}", admin.id, id);
    Ok(HttpResponse::Ok().json(json!({"success": true, "message": "菜单删除成功"})))
}
