use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};

use super::{Page, ReviewSort, SortOrder, Store, StoreResult};
use crate::models::{
    Announcement, DailyRecommendation, Dish, Food, LikeToggle, MealType, Review, SchoolMenu, User,
};
use crate::query;

pub type DbPool = r2d2::Pool<ConnectionManager<MysqlConnection>>;

const DB_POOL_MAX_OPEN: u32 = 16;
const DB_POOL_CONNECT_TIMEOUT_SECONDS: u64 = 5;

pub struct MysqlStore {
    pool: DbPool,
}

impl MysqlStore {
    pub fn connect(database_url: &str) -> Result<Self, r2d2::PoolError> {
        let manager = ConnectionManager::<MysqlConnection>::new(database_url);
        let pool = r2d2::Pool::builder()
            .max_size(DB_POOL_MAX_OPEN)
            .connection_timeout(Duration::from_secs(DB_POOL_CONNECT_TIMEOUT_SECONDS))
            .build(manager)?;
        Ok(Self { pool })
    }

    fn conn(&self) -> StoreResult<r2d2::PooledConnection<ConnectionManager<MysqlConnection>>> {
        Ok(self.pool.get()?)
    }
}

impl Store for MysqlStore {
    fn insert_user(&self, user: &User) -> StoreResult<()> {
        let conn = self.conn()?;
        query::insert_user(&conn, user)
    }

    fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        let conn = self.conn()?;
        query::find_user(&conn, id)
    }

    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let conn = self.conn()?;
        query::find_user_by_email(&conn, email)
    }

    fn find_user_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> StoreResult<Option<User>> {
        let conn = self.conn()?;
        query::find_user_by_email_or_username(&conn, email, username)
    }

    fn find_users(&self, ids: &[String]) -> StoreResult<Vec<User>> {
        let conn = self.conn()?;
        query::find_users(&conn, ids)
    }

    fn list_users(&self) -> StoreResult<Vec<User>> {
        let conn = self.conn()?;
        query::list_users(&conn)
    }

    fn delete_user(&self, id: &str) -> StoreResult<Option<Vec<String>>> {
        let conn = self.conn()?;
        query::delete_user(&conn, id)
    }

    fn insert_food(&self, food: &Food) -> StoreResult<()> {
        let conn = self.conn()?;
        query::insert_food(&conn, food)
    }

    fn find_food(&self, id: &str) -> StoreResult<Option<Food>> {
        let conn = self.conn()?;
        query::find_food(&conn, id)
    }

    fn find_foods(&self, ids: &[String]) -> StoreResult<Vec<Food>> {
        let conn = self.conn()?;
        query::find_foods(&conn, ids)
    }

    fn list_foods(&self) -> StoreResult<Vec<Food>> {
        let conn = self.conn()?;
        query::find_all_foods(&conn)
    }

    fn update_food_details(&self, food: &Food) -> StoreResult<()> {
        let conn = self.conn()?;
        query::update_food_details(&conn, food)
    }

    fn update_food_rating(&self, food: &Food) -> StoreResult<()> {
        let conn = self.conn()?;
        query::update_food_rating(&conn, food)
    }

    fn delete_food(&self, id: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        query::delete_food(&conn, id)
    }

    fn insert_review(&self, review: &Review) -> StoreResult<()> {
        let conn = self.conn()?;
        query::insert_review(&conn, review)
    }

    fn find_review(&self, id: &str) -> StoreResult<Option<Review>> {
        let conn = self.conn()?;
        query::find_review(&conn, id)
    }

    fn find_review_by_author(&self, food_id: &str, user_id: &str) -> StoreResult<Option<Review>> {
        let conn = self.conn()?;
        query::find_review_by_author(&conn, food_id, user_id)
    }

    fn list_reviews(
        &self,
        food_id: &str,
        sort: ReviewSort,
        order: SortOrder,
        page: Page,
    ) -> StoreResult<(Vec<Review>, u64)> {
        let conn = self.conn()?;
        query::list_reviews(&conn, food_id, sort, order, page)
    }

    fn food_ratings(&self, food_id: &str) -> StoreResult<Vec<u8>> {
        let conn = self.conn()?;
        query::food_ratings(&conn, food_id)
    }

    fn update_review(&self, review: &Review) -> StoreResult<()> {
        let conn = self.conn()?;
        query::update_review(&conn, review)
    }

    fn delete_review(&self, id: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        query::delete_review(&conn, id)
    }

    fn toggle_like(
        &self,
        review_id: &str,
        user_id: &str,
        liked_at: NaiveDateTime,
    ) -> StoreResult<Option<LikeToggle>> {
        let conn = self.conn()?;
        query::toggle_like(&conn, review_id, user_id, liked_at)
    }

    fn insert_menu(&self, menu: &SchoolMenu) -> StoreResult<()> {
        let conn = self.conn()?;
        query::insert_menu(&conn, menu)
    }

    fn find_menu(&self, id: &str) -> StoreResult<Option<SchoolMenu>> {
        let conn = self.conn()?;
        query::find_menu(&conn, id)
    }

    fn find_menu_for(&self, date: NaiveDate, meal: MealType) -> StoreResult<Option<SchoolMenu>> {
        let conn = self.conn()?;
        query::find_menu_for(&conn, date, meal)
    }

    fn list_menus_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<Vec<SchoolMenu>> {
        let conn = self.conn()?;
        query::list_menus_between(&conn, start, end)
    }

    fn replace_dishes(
        &self,
        menu_id: &str,
        dishes: &[Dish],
        updated_at: NaiveDateTime,
    ) -> StoreResult<bool> {
        let conn = self.conn()?;
        query::replace_dishes(&conn, menu_id, dishes, updated_at)
    }

    fn delete_menu(&self, id: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        query::delete_menu(&conn, id)
    }

    fn find_recommendation(
        &self,
        user_id: &str,
        date_string: &str,
    ) -> StoreResult<Option<DailyRecommendation>> {
        let conn = self.conn()?;
        query::find_recommendation(&conn, user_id, date_string)
    }

    fn insert_recommendation(&self, recommendation: &DailyRecommendation) -> StoreResult<()> {
        let conn = self.conn()?;
        query::insert_recommendation(&conn, recommendation)
    }

    fn recommended_since(&self, user_id: &str, since: NaiveDate) -> StoreResult<Vec<String>> {
        let conn = self.conn()?;
        query::recommended_since(&conn, user_id, since)
    }

    fn list_recommendations(
        &self,
        user_id: &str,
        page: Page,
    ) -> StoreResult<(Vec<DailyRecommendation>, u64)> {
        let conn = self.conn()?;
        query::list_recommendations(&conn, user_id, page)
    }

    fn insert_announcement(&self, announcement: &Announcement) -> StoreResult<()> {
        let conn = self.conn()?;
        query::insert_announcement(&conn, announcement)
    }

    fn find_announcement(&self, id: &str) -> StoreResult<Option<Announcement>> {
        let conn = self.conn()?;
        query::find_announcement(&conn, id)
    }

    fn list_announcements(
        &self,
        published_only: bool,
        page: Page,
    ) -> StoreResult<(Vec<Announcement>, u64)> {
        let conn = self.conn()?;
        query::list_announcements(&conn, published_only, page)
    }

    fn update_announcement(&self, announcement: &Announcement) -> StoreResult<()> {
        let conn = self.conn()?;
        query::update_announcement(&conn, announcement)
    }

    fn delete_announcement(&self, id: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        query::delete_announcement(&conn, id)
    }
}
