use std::collections::HashMap;

use actix_web::{delete, get, post, put, web, HttpResponse};
use log::info;
use serde::Deserialize;
use serde_json::json;

use super::{check_len, non_blank, Paging};
use crate::auth::{AdminUser, MaybeUser};
use crate::error::ApiError;
use crate::models::{new_id, Announcement, AnnouncementView};
use crate::state::{AppState, Backend};

const DEFAULT_PAGE_SIZE: u64 = 20;
const NOT_FOUND: &str = "公告不存在";
const MAX_TITLE_LEN: usize = 255;

pub(super) fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(list_announcements)
        .service(get_announcement)
        .service(create_announcement)
        .service(update_announcement)
        .service(delete_announcement);
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    page: Option<u64>,
    limit: Option<u64>,
    #[serde(default)]
    include_unpublished: bool,
}

#[derive(Debug, Deserialize)]
struct AnnouncementRequest {
    title: Option<String>,
    content: Option<String>,
    pinned: Option<bool>,
    published: Option<bool>,
}

fn with_authors(
    backend: &Backend,
    announcements: Vec<Announcement>,
) -> Result<Vec<AnnouncementView>, ApiError> {
    let mut ids: Vec<String> = announcements
        .iter()
        .filter_map(|a| a.created_by.clone())
        .collect();
    ids.sort();
    ids.dedup();
    let authors: HashMap<String, _> = backend
        .store
        .find_users(&ids)?
        .into_iter()
        .map(|user| (user.id.clone(), user.author()))
        .collect();

    Ok(announcements
        .into_iter()
        .map(|a| {
            let author = a.created_by.as_ref().and_then(|id| authors.get(id)).cloned();
            AnnouncementView::new(a, author)
        })
        .collect())
}

fn view(backend: &Backend, announcement: Announcement) -> Result<AnnouncementView, ApiError> {
    with_authors(backend, vec![announcement])?
        .pop()
        .ok_or_else(|| ApiError::Internal("announcement view lost its row".to_string()))
}

#[get("/announcements")]
async fn list_announcements(
    state: web::Data<AppState>,
    MaybeUser(viewer): MaybeUser,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let paging = Paging::new(query.page, query.limit, DEFAULT_PAGE_SIZE)?;
    let is_admin = viewer.as_ref().is_some_and(|user| user.is_admin());
    let published_only = !(query.include_unpublished && is_admin);

    let (announcements, total) = state
        .run(move |backend| {
            let (rows, total) = backend
                .store
                .list_announcements(published_only, paging.window())?;
            Ok((with_authors(backend, rows)?, total))
        })
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "announcements": announcements,
        "pagination": {
            "currentPage": paging.number,
            "totalPages": paging.total_pages(total),
            "total": total,
        },
    })))
}

#[get("/announcements/{id}")]
async fn get_announcement(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let announcement = state
        .run(move |backend| {
            match backend.store.find_announcement(&id)? {
                Some(a) if a.published => view(backend, a),
                _ => Err(ApiError::not_found(NOT_FOUND)),
            }
        })
        .await?;
    Ok(HttpResponse::Ok().json(json!({"success": true, "announcement": announcement})))
}

#[post("/announcements")]
async fn create_announcement(
    state: web::Data<AppState>,
    AdminUser(admin): AdminUser,
    body: web::Json<AnnouncementRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let (Some(title), Some(content)) = (
        non_blank(body.title),
        body.content.filter(|c| !c.trim().is_empty()),
    ) else {
        return Err(ApiError::bad_request("标题和内容不能为空"));
    };
    check_len(&title, MAX_TITLE_LEN, "标题")?;

    let now = state.now();
    let announcement = Announcement {
        id: new_id(),
        title,
        content,
        pinned: body.pinned.unwrap_or(false),
        published: body.published.unwrap_or(true),
        created_by: Some(admin.id.clone()),
        created_at: now,
        updated_at: now,
    };

    let view = state
        .run(move |backend| {
            backend.store.insert_announcement(&announcement)?;
            view(backend, announcement)
        })
        .await?;

    info!("admin {} published announcement {}", admin.id, view.id);
    Ok(HttpResponse::Created().json(json!({"success": true, "announcement": view})))
}

#[put("/announcements/{id}")]
async fn update_announcement(
    state: web::Data<AppState>,
    AdminUser(admin): AdminUser,
    id: web::Path<String>,
    body: web::Json<AnnouncementRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let body = body.into_inner();
    if body.title.as_deref().is_some_and(|t| t.trim().is_empty())
        || body.content.as_deref().is_some_and(|c| c.trim().is_empty())
    {
        return Err(ApiError::bad_request("标题和内容不能为空"));
    }
    if let Some(title) = &body.title {
        check_len(title.trim(), MAX_TITLE_LEN, "标题")?;
    }

    let now = state.now();
    let view = state
        .run(move |backend| {
            let mut announcement = backend
                .store
                .find_announcement(&id)?
                .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

            if let Some(title) = body.title {
                announcement.title = title.trim().to_string();
            }
            if let Some(content) = body.content {
                announcement.content = content;
            }
            if let Some(pinned) = body.pinned {
                announcement.pinned = pinned;
            }
            if let Some(published) = body.published {
                announcement.published = published;
            }
            announcement.updated_at = now;

            backend.store.update_announcement(&announcement)?;
            view(backend, announcement)
        })
        .await?;

    info!("admin {} updated announcement {}", admin.id, view.id);
    Ok(HttpResponse::Ok().json(json!({"success": true, "announcement": view})))
}

#[delete("/announcements/{id}")]
async fn delete_announcement(
    state: web::Data<AppState>,
    AdminUser(admin): AdminUser,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let target = id.clone();
    let deleted = state
        .run(move |backend| Ok(backend.store.delete_announcement(&target)?))
        .await?;
    if !deleted {
        return Err(ApiError::not_found(NOT_FOUND));
    }

    info!("admin {} deleted announcement {}", admin.id, id);
    Ok(HttpResponse::Ok().json(json!({"success": true, "message": "公告已删除"})))
}
