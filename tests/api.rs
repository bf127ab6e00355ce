use std::sync::Arc;

use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use chrono::{Duration, FixedOffset, TimeZone, Utc};
use serde_json::{json, Value};

use campus_food::auth::{self, TokenService};
use campus_food::cache::FoodCache;
use campus_food::clock::ManualClock;
use campus_food::config::AdminAccount;
use campus_food::handlers;
use campus_food::state::{AppState, Backend};
use campus_food::store::MemoryStore;

const ADMIN_EMAIL: &str = "admin@example.com";
const ADMIN_PASSWORD: &str = "admin-password";

// Monday 2024-09-02 10:00 in UTC+8.
fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 9, 2, 2, 0, 0).unwrap(),
    ))
}

async fn state_with(clock: Arc<ManualClock>) -> web::Data<AppState> {
    let state = AppState::new(
        Backend {
            store: Box::new(MemoryStore::new()),
            cache: FoodCache::disabled(),
        },
        TokenService::new("test-secret", 7),
        clock,
        FixedOffset::east_opt(8 * 3600).unwrap(),
    );
    let account = AdminAccount {
        username: "admin".to_string(),
        email: ADMIN_EMAIL.to_string(),
        password: ADMIN_PASSWORD.to_string(),
    };
    let now = state.now();
    state
        .run(move |backend| auth::ensure_admin(backend.store.as_ref(), &account, now))
        .await
        .unwrap();
    web::Data::new(state)
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data($state.clone())
                .wrap(handlers::cors_headers("http://localhost:4000"))
                .configure(handlers::configure),
        )
        .await
    };
}

/// Sends a request and returns the status with the decoded JSON body.
macro_rules! call {
    ($app:expr, $req:expr) => {{
        let resp = test::call_service(&$app, $req.to_request()).await;
        let status = resp.status();
        let body = test::read_body(resp).await;
        let json: Value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }};
}

macro_rules! register {
    ($app:expr, $name:expr) => {{
        let (status, body) = call!(
            $app,
            test::TestRequest::post()
                .uri("/api/auth/register")
                .set_json(json!({
                    "username": $name,
                    "email": format!("{}@example.com", $name),
                    "password": "secret123",
                }))
        );
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["token"].as_str().unwrap().to_string()
    }};
}

macro_rules! admin_token {
    ($app:expr) => {{
        let (status, body) = call!(
            $app,
            test::TestRequest::post()
                .uri("/api/auth/login")
                .set_json(json!({"email": ADMIN_EMAIL, "password": ADMIN_PASSWORD}))
        );
        assert_eq!(status, StatusCode::OK, "{body}");
        body["token"].as_str().unwrap().to_string()
    }};
}

macro_rules! add_food {
    ($app:expr, $token:expr, $name:expr) => {{
        let (status, body) = call!(
            $app,
            test::TestRequest::post()
                .uri("/api/foods")
                .insert_header(bearer(&$token))
                .set_json(json!({
                    "name": $name,
                    "category": "面食",
                    "location": "一楼食堂",
                    "description": "汤头浓郁",
                }))
        );
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["food"]["id"].as_str().unwrap().to_string()
    }};
}

fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {token}"))
}

#[actix_web::test]
async fn test_register_login_and_me() {
    let state = state_with(clock()).await;
    let app = app!(state);

    let token = register!(app, "alice");
    let (status, body) = call!(
        app,
        test::TestRequest::get()
            .uri("/api/auth/me")
            .insert_header(bearer(&token))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["role"], "student");
    assert!(body["user"].get("passwordHash").is_none());

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({"email": "ALICE@example.com", "password": "wrong-pass"}))
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[actix_web::test]
async fn test_login_sets_session_cookie() {
    let state = state_with(clock()).await;
    let app = app!(state);
    register!(app, "alice");

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({"email": "alice@example.com", "password": "secret123"}))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = resp
        .response()
        .cookies()
        .find(|c| c.name() == auth::TOKEN_COOKIE)
        .unwrap();
    assert_eq!(cookie.http_only(), Some(true));

    let (status, body) = call!(
        app,
        test::TestRequest::get()
            .uri("/api/auth/me")
            .cookie(cookie.into_owned())
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "alice@example.com");
}

#[actix_web::test]
async fn test_duplicate_email_registration_fails() {
    let state = state_with(clock()).await;
    let app = app!(state);
    register!(app, "alice");

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({
                "username": "alice2",
                "email": "Alice@Example.com",
                "password": "secret123",
            }))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("邮箱"));
}

#[actix_web::test]
async fn test_registration_validation() {
    let state = state_with(clock()).await;
    let app = app!(state);

    for payload in [
        json!({"username": "bob", "email": "bob@example.com"}),
        json!({"username": "bob", "email": "bob@example.com", "password": "12345"}),
        json!({"username": "bo", "email": "bob@example.com", "password": "secret123"}),
        json!({"username": "bob", "email": "not-an-email", "password": "secret123"}),
    ] {
        let (status, body) = call!(
            app,
            test::TestRequest::post()
                .uri("/api/auth/register")
                .set_json(payload)
        );
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    }
}

#[actix_web::test]
async fn test_auth_and_admin_guards() {
    let state = state_with(clock()).await;
    let app = app!(state);
    let token = register!(app, "alice");

    let (status, body) = call!(app, test::TestRequest::get().uri("/api/auth/me"));
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = call!(
        app,
        test::TestRequest::get()
            .uri("/api/auth/me")
            .insert_header(bearer("garbage"))
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call!(
        app,
        test::TestRequest::get()
            .uri("/api/admin/users")
            .insert_header(bearer(&token))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = admin_token!(app);
    let (status, body) = call!(
        app,
        test::TestRequest::get()
            .uri("/api/admin/users")
            .insert_header(bearer(&admin))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
}

#[actix_web::test]
async fn test_token_expires_with_clock() {
    let clock = clock();
    let state = state_with(clock.clone()).await;
    let app = app!(state);
    let token = register!(app, "alice");

    clock.advance(Duration::days(8));
    let (status, _) = call!(
        app,
        test::TestRequest::get()
            .uri("/api/auth/me")
            .insert_header(bearer(&token))
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_food_crud_permissions() {
    let state = state_with(clock()).await;
    let app = app!(state);
    let alice = register!(app, "alice");
    let bob = register!(app, "bob");
    let food = add_food!(app, alice, "牛肉面");

    let (status, body) = call!(app, test::TestRequest::get().uri("/api/foods"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["foods"].as_array().unwrap().len(), 1);
    assert_eq!(body["foods"][0]["createdByName"], "alice");
    assert_eq!(body["foods"][0]["averageRating"], 0.0);

    let (status, _) = call!(
        app,
        test::TestRequest::put()
            .uri(&format!("/api/foods/{food}"))
            .insert_header(bearer(&bob))
            .set_json(json!({"name": "羊肉面"}))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call!(
        app,
        test::TestRequest::put()
            .uri(&format!("/api/foods/{food}"))
            .insert_header(bearer(&alice))
            .set_json(json!({"name": "羊肉面", "category": "快餐"}))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["food"]["name"], "羊肉面");
    assert_eq!(body["food"]["category"], "快餐");

    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/foods")
            .insert_header(bearer(&alice))
            .set_json(json!({
                "name": "火锅",
                "category": "火锅",
                "location": "二楼",
                "description": "辣",
            }))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let admin = admin_token!(app);
    let (status, _) = call!(
        app,
        test::TestRequest::delete()
            .uri(&format!("/api/foods/{food}"))
            .insert_header(bearer(&admin))
    );
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call!(app, test::TestRequest::get().uri(&format!("/api/foods/{food}")));
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_food_fields_over_column_limits_are_rejected() {
    let state = state_with(clock()).await;
    let app = app!(state);
    let alice = register!(app, "alice");

    let long_name = "面".repeat(101);
    let long_emoji = "🍜".repeat(17);
    for (name, emoji) in [(long_name.as_str(), "🍜"), ("牛肉面", long_emoji.as_str())] {
        let (status, body) = call!(
            app,
            test::TestRequest::post()
                .uri("/api/foods")
                .insert_header(bearer(&alice))
                .set_json(json!({
                    "name": name,
                    "category": "面食",
                    "location": "一楼食堂",
                    "description": "汤头浓郁",
                    "emoji": emoji,
                }))
        );
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(body["success"], false);
    }

    let food = add_food!(app, alice, "面".repeat(100));
    let (status, _) = call!(
        app,
        test::TestRequest::put()
            .uri(&format!("/api/foods/{food}"))
            .insert_header(bearer(&alice))
            .set_json(json!({"location": "楼".repeat(101)}))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let admin = admin_token!(app);
    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/announcements")
            .insert_header(bearer(&admin))
            .set_json(json!({"title": "公".repeat(256), "content": "内容"}))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_food_edit_keeps_review_rating() {
    let state = state_with(clock()).await;
    let app = app!(state);
    let alice = register!(app, "alice");
    let bob = register!(app, "bob");
    let food = add_food!(app, alice, "牛肉面");

    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/foods/{food}/reviews"))
            .insert_header(bearer(&bob))
            .set_json(json!({"content": "很好吃", "rating": 4}))
    );
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call!(
        app,
        test::TestRequest::put()
            .uri(&format!("/api/foods/{food}"))
            .insert_header(bearer(&alice))
            .set_json(json!({"description": "加了香菜"}))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["food"]["description"], "加了香菜");
    assert_eq!(body["food"]["averageRating"], 4.0);
    assert_eq!(body["food"]["reviewsCount"], 1);
}

#[actix_web::test]
async fn test_out_of_range_page_is_bad_request() {
    let state = state_with(clock()).await;
    let app = app!(state);

    let (status, body) = call!(
        app,
        test::TestRequest::get().uri("/api/announcements?page=18446744073709551615&limit=100")
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[actix_web::test]
async fn test_one_review_per_user_and_rating_recompute() {
    let state = state_with(clock()).await;
    let app = app!(state);
    let alice = register!(app, "alice");
    let bob = register!(app, "bob");
    let food = add_food!(app, alice, "牛肉面");
    let reviews = format!("/api/foods/{food}/reviews");

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri(&reviews)
            .insert_header(bearer(&alice))
            .set_json(json!({"content": "很好吃", "rating": 5}))
    );
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["foodRating"]["averageRating"], 5.0);
    assert_eq!(body["review"]["user"]["username"], "alice");

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri(&reviews)
            .insert_header(bearer(&bob))
            .set_json(json!({"content": "一般", "rating": 2}))
    );
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["foodRating"]["averageRating"], 3.5);
    assert_eq!(body["foodRating"]["reviewsCount"], 2);
    let bob_review = body["review"]["id"].as_str().unwrap().to_string();

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri(&reviews)
            .insert_header(bearer(&alice))
            .set_json(json!({"content": "再来一次", "rating": 4}))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri(&reviews)
            .insert_header(bearer(&alice))
            .set_json(json!({"content": "越界", "rating": 6}))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call!(
        app,
        test::TestRequest::put()
            .uri(&format!("/api/reviews/{bob_review}"))
            .insert_header(bearer(&alice))
            .set_json(json!({"rating": 1}))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call!(
        app,
        test::TestRequest::put()
            .uri(&format!("/api/reviews/{bob_review}"))
            .insert_header(bearer(&bob))
            .set_json(json!({"rating": 4}))
    );
    assert_eq!(status, StatusCode::OK);
    let (_, body) = call!(app, test::TestRequest::get().uri(&format!("/api/foods/{food}")));
    assert_eq!(body["food"]["averageRating"], 4.5);
    assert_eq!(body["food"]["ratingDistribution"], json!([0, 0, 0, 1, 1]));

    let (status, _) = call!(
        app,
        test::TestRequest::delete()
            .uri(&format!("/api/reviews/{bob_review}"))
            .insert_header(bearer(&bob))
    );
    assert_eq!(status, StatusCode::OK);
    let (_, body) = call!(app, test::TestRequest::get().uri(&format!("/api/foods/{food}")));
    assert_eq!(body["food"]["averageRating"], 5.0);
    assert_eq!(body["food"]["reviewsCount"], 1);
}

#[actix_web::test]
async fn test_review_listing_and_likes() {
    let clock = clock();
    let state = state_with(clock.clone()).await;
    let app = app!(state);
    let alice = register!(app, "alice");
    let bob = register!(app, "bob");
    let food = add_food!(app, alice, "牛肉面");
    let reviews = format!("/api/foods/{food}/reviews");

    let (_, body) = call!(
        app,
        test::TestRequest::post()
            .uri(&reviews)
            .insert_header(bearer(&alice))
            .set_json(json!({"content": "很好吃", "rating": 5}))
    );
    let alice_review = body["review"]["id"].as_str().unwrap().to_string();
    clock.advance(Duration::minutes(1));
    call!(
        app,
        test::TestRequest::post()
            .uri(&reviews)
            .insert_header(bearer(&bob))
            .set_json(json!({"content": "一般", "rating": 3}))
    );

    let like = format!("/api/reviews/{alice_review}/like");
    let (status, body) = call!(
        app,
        test::TestRequest::post().uri(&like).insert_header(bearer(&bob))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isLiked"], true);
    assert_eq!(body["likesCount"], 1);

    let (_, body) = call!(
        app,
        test::TestRequest::get().uri(&format!("{reviews}?sort=likesCount&order=desc"))
    );
    assert_eq!(body["reviews"][0]["id"], alice_review.as_str());
    assert_eq!(body["reviews"][0]["likesCount"], 1);
    assert_eq!(body["pagination"]["totalReviews"], 2);
    assert_eq!(body["pagination"]["hasMore"], false);

    let (_, body) = call!(app, test::TestRequest::get().uri(&format!("{reviews}?limit=1")));
    assert_eq!(body["reviews"][0]["content"], "一般");
    assert_eq!(body["pagination"]["totalPages"], 2);
    assert_eq!(body["pagination"]["hasMore"], true);

    let (_, body) = call!(
        app,
        test::TestRequest::post().uri(&like).insert_header(bearer(&bob))
    );
    assert_eq!(body["isLiked"], false);
    assert_eq!(body["likesCount"], 0);

    let (status, _) = call!(app, test::TestRequest::get().uri(&format!("{reviews}?limit=500")));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call!(app, test::TestRequest::get().uri("/api/foods/missing/reviews"));
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_daily_recommendation_is_stable_within_a_day() {
    let clock = clock();
    let state = state_with(clock.clone()).await;
    let app = app!(state);
    let alice = register!(app, "alice");

    let (status, _) = call!(
        app,
        test::TestRequest::get()
            .uri("/api/daily-recommendation")
            .insert_header(bearer(&alice))
    );
    assert_eq!(status, StatusCode::NOT_FOUND);

    for name in ["牛肉面", "炸鸡", "豆浆"] {
        add_food!(app, alice, name);
        clock.advance(Duration::seconds(1));
    }

    let (status, first) = call!(
        app,
        test::TestRequest::get()
            .uri("/api/daily-recommendation")
            .insert_header(bearer(&alice))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["isNewRecommendation"], true);

    clock.advance(Duration::hours(3));
    let (_, second) = call!(
        app,
        test::TestRequest::get()
            .uri("/api/daily-recommendation")
            .insert_header(bearer(&alice))
    );
    assert_eq!(second["isNewRecommendation"], false);
    assert_eq!(second["food"]["id"], first["food"]["id"]);

    // the next day avoids the previous pick
    clock.advance(Duration::days(1));
    let (_, next) = call!(
        app,
        test::TestRequest::get()
            .uri("/api/daily-recommendation")
            .insert_header(bearer(&alice))
    );
    assert_eq!(next["isNewRecommendation"], true);
    assert_ne!(next["food"]["id"], first["food"]["id"]);

    let (status, history) = call!(
        app,
        test::TestRequest::get()
            .uri("/api/daily-recommendation/history")
            .insert_header(bearer(&alice))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["pagination"]["totalRecords"], 2);
    assert_eq!(history["recommendations"][0]["date"], "2024-09-03");
    assert_eq!(history["recommendations"][1]["food"]["id"], first["food"]["id"]);
}

#[actix_web::test]
async fn test_menu_lifecycle() {
    let state = state_with(clock()).await;
    let app = app!(state);
    let alice = register!(app, "alice");
    let admin = admin_token!(app);
    let food = add_food!(app, alice, "牛肉面");

    let menu = json!({
        "date": "2024-09-02",
        "mealType": "lunch",
        "dishes": [{"foodId": food, "price": 12.5}],
    });

    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/menu")
            .insert_header(bearer(&alice))
            .set_json(menu.clone())
    );
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/menu")
            .insert_header(bearer(&admin))
            .set_json(menu.clone())
    );
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["menu"]["source"], "manual");
    assert_eq!(body["menu"]["dishes"][0]["availability"], true);
    let menu_id = body["menu"]["id"].as_str().unwrap().to_string();

    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/menu")
            .insert_header(bearer(&admin))
            .set_json(menu)
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/menu")
            .insert_header(bearer(&admin))
            .set_json(json!({
                "date": "2024-09-02",
                "mealType": "dinner",
                "dishes": [{"foodId": "no-such-food"}],
            }))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = call!(app, test::TestRequest::get().uri("/api/menu/today"));
    assert_eq!(body["menu"]["dishes"][0]["food"]["name"], "牛肉面");
    assert_eq!(body["menu"]["dishes"][0]["price"], 12.5);

    let (_, body) = call!(app, test::TestRequest::get().uri("/api/menu/today?mealType=dinner"));
    assert_eq!(body["menu"], Value::Null);

    let (status, _) = call!(app, test::TestRequest::get().uri("/api/menu/today?mealType=supper"));
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = call!(app, test::TestRequest::get().uri("/api/menu/week"));
    assert_eq!(body["menus"].as_array().unwrap().len(), 1);

    let (_, body) = call!(app, test::TestRequest::get().uri("/api/menu/day/2024-09-03"));
    assert_eq!(body["menus"].as_array().unwrap().len(), 0);

    let (status, body) = call!(
        app,
        test::TestRequest::put()
            .uri(&format!("/api/menu/{menu_id}"))
            .insert_header(bearer(&admin))
            .set_json(json!({"dishes": [{"foodId": food, "price": 10, "availability": false}]}))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["menu"]["dishes"][0]["availability"], false);

    let (status, _) = call!(
        app,
        test::TestRequest::delete()
            .uri(&format!("/api/menu/{menu_id}"))
            .insert_header(bearer(&admin))
    );
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call!(
        app,
        test::TestRequest::delete()
            .uri(&format!("/api/menu/{menu_id}"))
            .insert_header(bearer(&admin))
    );
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_announcement_visibility() {
    let clock = clock();
    let state = state_with(clock.clone()).await;
    let app = app!(state);
    let admin = admin_token!(app);
    let student = register!(app, "alice");

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/announcements")
            .insert_header(bearer(&admin))
            .set_json(json!({"title": "草稿", "content": "未发布", "published": false}))
    );
    assert_eq!(status, StatusCode::CREATED);
    let draft = body["announcement"]["id"].as_str().unwrap().to_string();
    clock.advance(Duration::minutes(1));

    call!(
        app,
        test::TestRequest::post()
            .uri("/api/announcements")
            .insert_header(bearer(&admin))
            .set_json(json!({"title": "置顶", "content": "食堂调整", "pinned": true}))
    );
    clock.advance(Duration::minutes(1));
    call!(
        app,
        test::TestRequest::post()
            .uri("/api/announcements")
            .insert_header(bearer(&admin))
            .set_json(json!({"title": "普通", "content": "新菜上线"}))
    );

    let (_, body) = call!(
        app,
        test::TestRequest::get().uri("/api/announcements?includeUnpublished=true")
    );
    assert_eq!(body["pagination"]["total"], 2);
    assert_eq!(body["announcements"][0]["title"], "置顶");
    assert_eq!(body["announcements"][0]["createdBy"]["username"], "admin");

    let (_, body) = call!(
        app,
        test::TestRequest::get()
            .uri("/api/announcements?includeUnpublished=true")
            .insert_header(bearer(&student))
    );
    assert_eq!(body["pagination"]["total"], 2);

    let (_, body) = call!(
        app,
        test::TestRequest::get()
            .uri("/api/announcements?includeUnpublished=true")
            .insert_header(bearer(&admin))
    );
    assert_eq!(body["pagination"]["total"], 3);

    let (status, _) = call!(app, test::TestRequest::get().uri(&format!("/api/announcements/{draft}")));
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call!(
        app,
        test::TestRequest::put()
            .uri(&format!("/api/announcements/{draft}"))
            .insert_header(bearer(&admin))
            .set_json(json!({"published": true}))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["announcement"]["published"], true);

    let (status, _) = call!(app, test::TestRequest::get().uri(&format!("/api/announcements/{draft}")));
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call!(
        app,
        test::TestRequest::delete()
            .uri(&format!("/api/announcements/{draft}"))
            .insert_header(bearer(&student))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn test_admin_user_delete_recomputes_ratings() {
    let state = state_with(clock()).await;
    let app = app!(state);
    let admin = admin_token!(app);
    let alice = register!(app, "alice");
    let bob = register!(app, "bob");
    let food = add_food!(app, alice, "牛肉面");
    let reviews = format!("/api/foods/{food}/reviews");

    for (token, rating) in [(&alice, 5), (&bob, 1)] {
        call!(
            app,
            test::TestRequest::post()
                .uri(&reviews)
                .insert_header(bearer(token))
                .set_json(json!({"content": "评价", "rating": rating}))
        );
    }

    let (_, body) = call!(
        app,
        test::TestRequest::get().uri("/api/auth/me").insert_header(bearer(&bob))
    );
    let bob_id = body["user"]["id"].as_str().unwrap().to_string();

    let (status, _) = call!(
        app,
        test::TestRequest::delete()
            .uri(&format!("/api/admin/users/{bob_id}"))
            .insert_header(bearer(&admin))
    );
    assert_eq!(status, StatusCode::OK);

    let (_, body) = call!(app, test::TestRequest::get().uri(&format!("/api/foods/{food}")));
    assert_eq!(body["food"]["averageRating"], 5.0);
    assert_eq!(body["food"]["reviewsCount"], 1);

    // the deleted user's token no longer authenticates
    let (status, _) = call!(
        app,
        test::TestRequest::get().uri("/api/auth/me").insert_header(bearer(&bob))
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_fallbacks_and_cors() {
    let state = state_with(clock()).await;
    let app = app!(state);

    let (status, body) = call!(app, test::TestRequest::get().uri("/api/nothing-here"));
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["path"], "/api/nothing-here");
    assert_eq!(body["method"], "GET");

    let (status, body) = call!(app, test::TestRequest::get().uri("/"));
    assert_eq!(status, StatusCode::OK);
    assert!(body["endpoints"]["GET /api/foods"].is_string());

    let resp = test::call_service(
        &app,
        test::TestRequest::default()
            .method(actix_web::http::Method::OPTIONS)
            .uri("/api/foods")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://localhost:4000"
    );

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/auth/login")
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload("{not json")
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}
