//! Persistence seam.
//!
//! Handlers talk to a [`Store`]; [`MysqlStore`] backs production and
//! [`MemoryStore`] backs tests and database-less development runs. Both
//! enforce the same uniqueness rules and cascades.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use thiserror::Error;

use crate::models::{
    Announcement, DailyRecommendation, Dish, Food, LikeToggle, MealType, Review, SchoolMenu, User,
};

mod memory;
mod mysql;

pub use memory::MemoryStore;
pub use mysql::{DbPool, MysqlStore};

#[derive(Error, Debug)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("duplicate {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether the error says the backend itself is unhealthy. Conflicts and
    /// bad rows are answered normally and must not trip the circuit breaker.
    pub fn is_outage(&self) -> bool {
        matches!(self, StoreError::Database(_) | StoreError::Pool(_))
    }
}

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match err {
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                log::debug!("unique violation: {}", info.message());
                StoreError::Conflict(conflict_label(info.message()).to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

/// Names the field behind a MySQL duplicate-entry message, e.g.
/// `Duplicate entry 'a@b.c' for key 'users.users_email'`.
fn conflict_label(message: &str) -> &'static str {
    let key = message
        .rsplit_once("for key '")
        .map(|(_, key)| key.trim_end_matches('\''))
        .map(|key| key.rsplit_once('.').map_or(key, |(_, name)| name))
        .unwrap_or_default();
    match key {
        "users_email" => "邮箱",
        "users_username" => "用户名",
        "reviews_food_user" => "评论",
        "school_menus_slot" => "菜单",
        "daily_recommendations_user_day" => "今日推荐",
        _ => "记录",
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum ReviewSort {
    #[default]
    #[serde(rename = "createdAt")]
    CreatedAt,
    #[serde(rename = "rating")]
    Rating,
    #[serde(rename = "likesCount")]
    LikesCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Zero-based window into an ordered result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

impl Page {
    pub fn new(page: u64, limit: u64) -> Self {
        Self {
            offset: page.saturating_sub(1).saturating_mul(limit),
            limit,
        }
    }
}

pub trait Store: Send + Sync {
    // users
    fn insert_user(&self, user: &User) -> StoreResult<()>;
    fn find_user(&self, id: &str) -> StoreResult<Option<User>>;
    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    fn find_user_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> StoreResult<Option<User>>;
    fn find_users(&self, ids: &[String]) -> StoreResult<Vec<User>>;
    /// Newest first.
    fn list_users(&self) -> StoreResult<Vec<User>>;
    /// Removes the user with their reviews, likes and recommendations.
    /// Returns the ids of foods whose reviews were removed, or `None` when the
    /// user did not exist.
    fn delete_user(&self, id: &str) -> StoreResult<Option<Vec<String>>>;

    // foods
    fn insert_food(&self, food: &Food) -> StoreResult<()>;
    fn find_food(&self, id: &str) -> StoreResult<Option<Food>>;
    fn find_foods(&self, ids: &[String]) -> StoreResult<Vec<Food>>;
    /// Newest first.
    fn list_foods(&self) -> StoreResult<Vec<Food>>;
    /// Persists name, category, location, description and emoji only.
    fn update_food_details(&self, food: &Food) -> StoreResult<()>;
    /// Persists the average, count and distribution only.
    fn update_food_rating(&self, food: &Food) -> StoreResult<()>;
    /// Removes the food with its reviews, likes, recommendations and dishes.
    fn delete_food(&self, id: &str) -> StoreResult<bool>;

    // reviews
    fn insert_review(&self, review: &Review) -> StoreResult<()>;
    fn find_review(&self, id: &str) -> StoreResult<Option<Review>>;
    fn find_review_by_author(&self, food_id: &str, user_id: &str) -> StoreResult<Option<Review>>;
    fn list_reviews(
        &self,
        food_id: &str,
        sort: ReviewSort,
        order: SortOrder,
        page: Page,
    ) -> StoreResult<(Vec<Review>, u64)>;
    fn food_ratings(&self, food_id: &str) -> StoreResult<Vec<u8>>;
    /// Persists content, rating and `updated_at`.
    fn update_review(&self, review: &Review) -> StoreResult<()>;
    fn delete_review(&self, id: &str) -> StoreResult<bool>;
    fn toggle_like(
        &self,
        review_id: &str,
        user_id: &str,
        liked_at: NaiveDateTime,
    ) -> StoreResult<Option<LikeToggle>>;

    // menus
    fn insert_menu(&self, menu: &SchoolMenu) -> StoreResult<()>;
    fn find_menu(&self, id: &str) -> StoreResult<Option<SchoolMenu>>;
    fn find_menu_for(&self, date: NaiveDate, meal: MealType) -> StoreResult<Option<SchoolMenu>>;
    /// Menus with `start <= date < end`, by date then meal.
    fn list_menus_between(&self, start: NaiveDate, end: NaiveDate)
        -> StoreResult<Vec<SchoolMenu>>;
    fn replace_dishes(
        &self,
        menu_id: &str,
        dishes: &[Dish],
        updated_at: NaiveDateTime,
    ) -> StoreResult<bool>;
    fn delete_menu(&self, id: &str) -> StoreResult<bool>;

    // daily recommendations
    fn find_recommendation(
        &self,
        user_id: &str,
        date_string: &str,
    ) -> StoreResult<Option<DailyRecommendation>>;
    fn insert_recommendation(&self, recommendation: &DailyRecommendation) -> StoreResult<()>;
    fn recommended_since(&self, user_id: &str, since: NaiveDate) -> StoreResult<Vec<String>>;
    /// Newest first.
    fn list_recommendations(
        &self,
        user_id: &str,
        page: Page,
    ) -> StoreResult<(Vec<DailyRecommendation>, u64)>;

    // announcements
    fn insert_announcement(&self, announcement: &Announcement) -> StoreResult<()>;
    fn find_announcement(&self, id: &str) -> StoreResult<Option<Announcement>>;
    /// Pinned first, then newest first.
    fn list_announcements(
        &self,
        published_only: bool,
        page: Page,
    ) -> StoreResult<(Vec<Announcement>, u64)>;
    fn update_announcement(&self, announcement: &Announcement) -> StoreResult<()>;
    fn delete_announcement(&self, id: &str) -> StoreResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[rstest]
    #[case("Duplicate entry 'a@example.com' for key 'users_email'", "邮箱")]
    #[case("Duplicate entry 'alice' for key 'users.users_username'", "用户名")]
    #[case("Duplicate entry '2024-09-02-lunch' for key 'school_menus.school_menus_slot'", "菜单")]
    #[case("Duplicate entry 'x' for key 'PRIMARY'", "记录")]
    #[case("something else entirely", "记录")]
    fn test_conflict_label(#[case] message: &str, #[case] label: &str) {
        assert_eq!(conflict_label(message), label);
    }

    #[test]
    fn test_page_offset_saturates() {
        assert_eq!(Page::new(1, 10), Page { offset: 0, limit: 10 });
        assert_eq!(Page::new(u64::MAX, 100).offset, u64::MAX);
    }
}
