//! HTTP surface under `/api`.

use actix_web::http::header;
use actix_web::middleware::DefaultHeaders;
use actix_web::{get, guard, web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde_json::json;

use crate::error::ApiError;
use crate::store::Page;

mod admin;
mod announcements;
mod auth;
mod foods;
mod menus;
mod recommendations;
mod reviews;

const MAX_PAGE_SIZE: u64 = 100;

/// Registers every route, the extractor error handlers and the JSON 404.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _| bad_input("请求数据格式错误", err).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _| bad_input("查询参数无效", err).into()),
    )
    .app_data(
        web::PathConfig::default().error_handler(|err, _| bad_input("路径参数无效", err).into()),
    )
    .service(
        web::resource("/{tail:.*}")
            .guard(guard::Options())
            .to(preflight),
    )
    .service(index)
    .service(
        web::scope("/api")
            .configure(auth::routes)
            .configure(foods::routes)
            .configure(reviews::routes)
            .configure(menus::routes)
            .configure(recommendations::routes)
            .configure(announcements::routes)
            .configure(admin::routes),
    )
    .default_service(web::route().to(not_found));
}

/// Response headers letting the configured browser origin call the API.
pub fn cors_headers(origin: &str) -> DefaultHeaders {
    DefaultHeaders::new()
        .add((header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.to_string()))
        .add((header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true"))
        .add((
            header::ACCESS_CONTROL_ALLOW_METHODS,
            "GET, POST, PUT, DELETE, OPTIONS",
        ))
        .add((
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            "Content-Type, Authorization",
        ))
        .add((header::VARY, "Origin"))
}

fn bad_input(prefix: &str, err: impl std::fmt::Display) -> ApiError {
    log::debug!("rejecting malformed request: {err}");
    ApiError::bad_request(format!("{prefix}: {err}"))
}

async fn preflight() -> HttpResponse {
    HttpResponse::Ok().finish()
}

async fn not_found(req: HttpRequest) -> HttpResponse {
    log::info!("no route for {} {}", req.method(), req.path());
    HttpResponse::NotFound().json(json!({
        "success": false,
        "message": "接口不存在",
        "path": req.path(),
        "method": req.method().as_str(),
    }))
}

#[get("/")]
async fn index() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "message": "🍔 曹杨二中美食评分系统 API",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
        "endpoints": {
            "POST /api/auth/register": "用户注册",
            "POST /api/auth/login": "用户登录",
            "POST /api/auth/logout": "用户登出",
            "GET /api/auth/me": "获取当前用户信息",
            "GET /api/foods": "获取美食列表",
            "GET /api/foods/:id": "获取美食详情",
            "POST /api/foods": "添加美食",
            "PUT /api/foods/:id": "修改美食",
            "DELETE /api/foods/:id": "删除美食",
            "GET /api/foods/:foodId/reviews": "获取美食评论",
            "POST /api/foods/:foodId/reviews": "添加评论",
            "PUT /api/reviews/:reviewId": "修改评论",
            "DELETE /api/reviews/:reviewId": "删除评论",
            "POST /api/reviews/:reviewId/like": "点赞或取消点赞",
            "GET /api/menu/today": "今日菜单",
            "GET /api/menu/day/:date": "指定日期菜单",
            "GET /api/menu/week": "本周菜单",
            "POST /api/menu": "创建菜单（管理员）",
            "PUT /api/menu/:menuId": "更新菜单（管理员）",
            "DELETE /api/menu/:menuId": "删除菜单（管理员）",
            "GET /api/daily-recommendation": "今日推荐",
            "GET /api/daily-recommendation/history": "推荐历史",
            "GET /api/announcements": "公告列表",
            "GET /api/announcements/:id": "公告详情",
            "POST /api/announcements": "发布公告（管理员）",
            "PUT /api/announcements/:id": "修改公告（管理员）",
            "DELETE /api/announcements/:id": "删除公告（管理员）",
            "GET /api/admin/users": "用户列表（管理员）",
            "DELETE /api/admin/users/:id": "删除用户（管理员）",
        },
    }))
}

/// Validated `page`/`limit` query values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Paging {
    pub number: u64,
    pub limit: u64,
}

impl Paging {
    pub fn new(page: Option<u64>, limit: Option<u64>, default_limit: u64) -> Result<Self, ApiError> {
        let number = page.unwrap_or(1);
        let limit = limit.unwrap_or(default_limit);
        if number == 0 {
            return Err(ApiError::bad_request("页码必须大于0"));
        }
        if limit == 0 || limit > MAX_PAGE_SIZE {
            return Err(ApiError::bad_request(format!(
                "每页数量必须在1到{MAX_PAGE_SIZE}之间"
            )));
        }
        // the row offset must fit a signed 64-bit OFFSET clause
        let fits = (number - 1)
            .checked_mul(limit)
            .is_some_and(|offset| i64::try_from(offset).is_ok());
        if !fits {
            return Err(ApiError::bad_request("页码超出范围"));
        }
        Ok(Self { number, limit })
    }

    pub fn window(&self) -> Page {
        Page::new(self.number, self.limit)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit)
    }
}

/// 400 when `value` is longer than `max` characters.
pub(crate) fn check_len(value: &str, max: usize, label: &str) -> Result<(), ApiError> {
    if value.chars().count() > max {
        return Err(ApiError::bad_request(format!("{label}不能超过{max}个字符")));
    }
    Ok(())
}

/// Trimmed text, or `None` when absent or blank.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
