use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;

use crate::models::{
    Announcement, DailyRecommendation, Dish, Food, LikeToggle, MealType, ParseEnumError, Review,
    School, SchoolMenu, User,
};
use crate::schema::{
    announcements, daily_recommendations, foods, menu_dishes, review_likes, reviews,
    school_menus, users,
};
use crate::store::{Page, ReviewSort, SortOrder, StoreError, StoreResult};

fn corrupt(err: ParseEnumError) -> StoreError {
    StoreError::Corrupt(err.to_string())
}

fn count_to_u32(value: i32, column: &str) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {column}: {value}")))
}

#[derive(Queryable, Insertable)]
#[table_name = "users"]
struct UserRow {
    id: String,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    avatar: String,
    created_at: NaiveDateTime,
}

impl From<&User> for UserRow {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role.as_str().to_string(),
            avatar: user.avatar.clone(),
            created_at: user.created_at,
        }
    }
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> StoreResult<Self> {
        Ok(User {
            role: row.role.parse().map_err(corrupt)?,
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            avatar: row.avatar,
            created_at: row.created_at,
        })
    }
}

#[derive(Queryable, Insertable)]
#[table_name = "foods"]
struct FoodRow {
    id: String,
    name: String,
    category: String,
    location: String,
    description: String,
    emoji: String,
    average_rating: f64,
    reviews_count: i32,
    rating_1: i32,
    rating_2: i32,
    rating_3: i32,
    rating_4: i32,
    rating_5: i32,
    created_by: String,
    created_by_name: String,
    created_at: NaiveDateTime,
}

impl From<&Food> for FoodRow {
    fn from(food: &Food) -> Self {
        let [r1, r2, r3, r4, r5] = food.rating_distribution;
        Self {
            id: food.id.clone(),
            name: food.name.clone(),
            category: food.category.as_str().to_string(),
            location: food.location.clone(),
            description: food.description.clone(),
            emoji: food.emoji.clone(),
            average_rating: food.average_rating,
            reviews_count: food.reviews_count as i32,
            rating_1: r1 as i32,
            rating_2: r2 as i32,
            rating_3: r3 as i32,
            rating_4: r4 as i32,
            rating_5: r5 as i32,
            created_by: food.created_by.clone(),
            created_by_name: food.created_by_name.clone(),
            created_at: food.created_at,
        }
    }
}

impl TryFrom<FoodRow> for Food {
    type Error = StoreError;

    fn try_from(row: FoodRow) -> StoreResult<Self> {
        Ok(Food {
            category: row.category.parse().map_err(corrupt)?,
            reviews_count: count_to_u32(row.reviews_count, "reviews_count")?,
            rating_distribution: [
                count_to_u32(row.rating_1, "rating_1")?,
                count_to_u32(row.rating_2, "rating_2")?,
                count_to_u32(row.rating_3, "rating_3")?,
                count_to_u32(row.rating_4, "rating_4")?,
                count_to_u32(row.rating_5, "rating_5")?,
            ],
            id: row.id,
            name: row.name,
            location: row.location,
            description: row.description,
            emoji: row.emoji,
            average_rating: row.average_rating,
            created_by: row.created_by,
            created_by_name: row.created_by_name,
            created_at: row.created_at,
        })
    }
}

#[derive(Queryable, Insertable)]
#[table_name = "reviews"]
struct ReviewRow {
    id: String,
    food_id: String,
    user_id: String,
    content: String,
    rating: i32,
    likes_count: i32,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl From<&Review> for ReviewRow {
    fn from(review: &Review) -> Self {
        Self {
            id: review.id.clone(),
            food_id: review.food_id.clone(),
            user_id: review.user_id.clone(),
            content: review.content.clone(),
            rating: i32::from(review.rating),
            likes_count: review.likes.len() as i32,
            created_at: review.created_at,
            updated_at: review.updated_at,
        }
    }
}

impl ReviewRow {
    fn into_review(self, likes: Vec<String>) -> StoreResult<Review> {
        Ok(Review {
            rating: u8::try_from(self.rating)
                .map_err(|_| StoreError::Corrupt(format!("rating {}", self.rating)))?,
            likes_count: count_to_u32(self.likes_count, "likes_count")?,
            likes,
            id: self.id,
            food_id: self.food_id,
            user_id: self.user_id,
            content: self.content,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Insertable)]
#[table_name = "review_likes"]
struct LikeRow<'a> {
    review_id: &'a str,
    user_id: &'a str,
    created_at: NaiveDateTime,
}

#[derive(Queryable, Insertable)]
#[table_name = "school_menus"]
struct MenuRow {
    id: String,
    menu_date: NaiveDate,
    meal_type: String,
    school_name: String,
    school_location: String,
    source: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl From<&SchoolMenu> for MenuRow {
    fn from(menu: &SchoolMenu) -> Self {
        Self {
            id: menu.id.clone(),
            menu_date: menu.date,
            meal_type: menu.meal_type.as_str().to_string(),
            school_name: menu.school.name.clone(),
            school_location: menu.school.location.clone(),
            source: menu.source.as_str().to_string(),
            created_at: menu.created_at,
            updated_at: menu.updated_at,
        }
    }
}

impl MenuRow {
    fn into_menu(self, dishes: Vec<Dish>) -> StoreResult<SchoolMenu> {
        Ok(SchoolMenu {
            meal_type: self.meal_type.parse().map_err(corrupt)?,
            source: self.source.parse().map_err(corrupt)?,
            id: self.id,
            date: self.menu_date,
            dishes,
            school: School {
                name: self.school_name,
                location: self.school_location,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Queryable, Insertable)]
#[table_name = "menu_dishes"]
struct DishRow {
    menu_id: String,
    position: i32,
    food_id: String,
    price: f64,
    availability: bool,
}

fn dish_rows(menu_id: &str, dishes: &[Dish]) -> Vec<DishRow> {
    dishes
        .iter()
        .enumerate()
        .map(|(position, dish)| DishRow {
            menu_id: menu_id.to_string(),
            position: position as i32,
            food_id: dish.food_id.clone(),
            price: dish.price,
            availability: dish.availability,
        })
        .collect()
}

fn insert_dishes(conn: &MysqlConnection, menu_id: &str, dishes: &[Dish]) -> StoreResult<()> {
    if dishes.is_empty() {
        return Ok(());
    }
    diesel::insert_into(menu_dishes::table)
        .values(&dish_rows(menu_id, dishes))
        .execute(conn)?;
    Ok(())
}

#[derive(Queryable, Insertable)]
#[table_name = "daily_recommendations"]
struct RecommendationRow {
    id: String,
    user_id: String,
    food_id: String,
    rec_date: NaiveDate,
    date_string: String,
    created_at: NaiveDateTime,
}

impl From<&DailyRecommendation> for RecommendationRow {
    fn from(rec: &DailyRecommendation) -> Self {
        Self {
            id: rec.id.clone(),
            user_id: rec.user_id.clone(),
            food_id: rec.food_id.clone(),
            rec_date: rec.date,
            date_string: rec.date_string.clone(),
            created_at: rec.created_at,
        }
    }
}

impl From<RecommendationRow> for DailyRecommendation {
    fn from(row: RecommendationRow) -> Self {
        DailyRecommendation {
            id: row.id,
            user_id: row.user_id,
            food_id: row.food_id,
            date: row.rec_date,
            date_string: row.date_string,
            created_at: row.created_at,
        }
    }
}

#[derive(Queryable, Insertable)]
#[table_name = "announcements"]
struct AnnouncementRow {
    id: String,
    title: String,
    content: String,
    pinned: bool,
    published: bool,
    created_by: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl From<&Announcement> for AnnouncementRow {
    fn from(a: &Announcement) -> Self {
        Self {
            id: a.id.clone(),
            title: a.title.clone(),
            content: a.content.clone(),
            pinned: a.pinned,
            published: a.published,
            created_by: a.created_by.clone(),
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

impl From<AnnouncementRow> for Announcement {
    fn from(row: AnnouncementRow) -> Self {
        Announcement {
            id: row.id,
            title: row.title,
            content: row.content,
            pinned: row.pinned,
            published: row.published,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// users

pub(crate) fn insert_user(conn: &MysqlConnection, user: &User) -> StoreResult<()> {
    diesel::insert_into(users::table)
        .values(&UserRow::from(user))
        .execute(conn)?;
    Ok(())
}

pub(crate) fn find_user(conn: &MysqlConnection, user_id: &str) -> StoreResult<Option<User>> {
    users::table
        .find(user_id)
        .first::<UserRow>(conn)
        .optional()?
        .map(User::try_from)
        .transpose()
}

pub(crate) fn find_user_by_email(conn: &MysqlConnection, email: &str) -> StoreResult<Option<User>> {
    users::table
        .filter(users::email.eq(email))
        .first::<UserRow>(conn)
        .optional()?
        .map(User::try_from)
        .transpose()
}

pub(crate) fn find_user_by_email_or_username(
    conn: &MysqlConnection,
    email: &str,
    username: &str,
) -> StoreResult<Option<User>> {
    users::table
        .filter(users::email.eq(email).or(users::username.eq(username)))
        .first::<UserRow>(conn)
        .optional()?
        .map(User::try_from)
        .transpose()
}

pub(crate) fn find_users(conn: &MysqlConnection, ids: &[String]) -> StoreResult<Vec<User>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    users::table
        .filter(users::id.eq_any(ids))
        .load::<UserRow>(conn)?
        .into_iter()
        .map(User::try_from)
        .collect()
}

pub(crate) fn list_users(conn: &MysqlConnection) -> StoreResult<Vec<User>> {
    users::table
        .order(users::created_at.desc())
        .load::<UserRow>(conn)?
        .into_iter()
        .map(User::try_from)
        .collect()
}

pub(crate) fn delete_user(conn: &MysqlConnection, user_id: &str) -> StoreResult<Option<Vec<String>>> {
    conn.transaction::<_, StoreError, _>(|| {
        let deleted = diesel::delete(users::table.find(user_id)).execute(conn)?;
        if deleted == 0 {
            return Ok(None);
        }

        let food_ids = reviews::table
            .filter(reviews::user_id.eq(user_id))
            .select(reviews::food_id)
            .distinct()
            .load::<String>(conn)?;
        let own_reviews = reviews::table
            .filter(reviews::user_id.eq(user_id))
            .select(reviews::id)
            .load::<String>(conn)?;
        let liked_reviews = review_likes::table
            .filter(review_likes::user_id.eq(user_id))
            .select(review_likes::review_id)
            .load::<String>(conn)?;

        diesel::delete(review_likes::table.filter(review_likes::user_id.eq(user_id)))
            .execute(conn)?;
        if !own_reviews.is_empty() {
            diesel::delete(review_likes::table.filter(review_likes::review_id.eq_any(&own_reviews)))
                .execute(conn)?;
        }
        diesel::delete(reviews::table.filter(reviews::user_id.eq(user_id))).execute(conn)?;
        for review_id in liked_reviews.iter().filter(|id| !own_reviews.contains(id)) {
            refresh_likes_count(conn, review_id)?;
        }
        diesel::delete(
            daily_recommendations::table.filter(daily_recommendations::user_id.eq(user_id)),
        )
        .execute(conn)?;

        Ok(Some(food_ids))
    })
}

// foods

pub(crate) fn insert_food(conn: &MysqlConnection, food: &Food) -> StoreResult<()> {
    diesel::insert_into(foods::table)
        .values(&FoodRow::from(food))
        .execute(conn)?;
    Ok(())
}

pub(crate) fn find_food(conn: &MysqlConnection, food_id: &str) -> StoreResult<Option<Food>> {
    foods::table
        .find(food_id)
        .first::<FoodRow>(conn)
        .optional()?
        .map(Food::try_from)
        .transpose()
}

pub(crate) fn find_foods(conn: &MysqlConnection, ids: &[String]) -> StoreResult<Vec<Food>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    foods::table
        .filter(foods::id.eq_any(ids))
        .load::<FoodRow>(conn)?
        .into_iter()
        .map(Food::try_from)
        .collect()
}

pub(crate) fn find_all_foods(conn: &MysqlConnection) -> StoreResult<Vec<Food>> {
    foods::table
        .order(foods::created_at.desc())
        .load::<FoodRow>(conn)?
        .into_iter()
        .map(Food::try_from)
        .collect()
}

pub(crate) fn update_food_details(conn: &MysqlConnection, food: &Food) -> StoreResult<()> {
    diesel::update(foods::table.find(&food.id))
        .set((
            foods::name.eq(&food.name),
            foods::category.eq(food.category.as_str()),
            foods::location.eq(&food.location),
            foods::description.eq(&food.description),
            foods::emoji.eq(&food.emoji),
        ))
        .execute(conn)?;
    Ok(())
}

pub(crate) fn update_food_rating(conn: &MysqlConnection, food: &Food) -> StoreResult<()> {
    let [r1, r2, r3, r4, r5] = food.rating_distribution;
    diesel::update(foods::table.find(&food.id))
        .set((
            foods::average_rating.eq(food.average_rating),
            foods::reviews_count.eq(food.reviews_count as i32),
            foods::rating_1.eq(r1 as i32),
            foods::rating_2.eq(r2 as i32),
            foods::rating_3.eq(r3 as i32),
            foods::rating_4.eq(r4 as i32),
            foods::rating_5.eq(r5 as i32),
        ))
        .execute(conn)?;
    Ok(())
}

pub(crate) fn delete_food(conn: &MysqlConnection, food_id: &str) -> StoreResult<bool> {
    conn.transaction::<_, StoreError, _>(|| {
        let deleted = diesel::delete(foods::table.find(food_id)).execute(conn)?;
        if deleted == 0 {
            return Ok(false);
        }

        let review_ids = reviews::table
            .filter(reviews::food_id.eq(food_id))
            .select(reviews::id)
            .load::<String>(conn)?;
        if !review_ids.is_empty() {
            diesel::delete(review_likes::table.filter(review_likes::review_id.eq_any(&review_ids)))
                .execute(conn)?;
        }
        diesel::delete(reviews::table.filter(reviews::food_id.eq(food_id))).execute(conn)?;
        diesel::delete(
            daily_recommendations::table.filter(daily_recommendations::food_id.eq(food_id)),
        )
        .execute(conn)?;
        diesel::delete(menu_dishes::table.filter(menu_dishes::food_id.eq(food_id)))
            .execute(conn)?;
        Ok(true)
    })
}

// reviews

fn likes_for(conn: &MysqlConnection, review_ids: &[String]) -> StoreResult<HashMap<String, Vec<String>>> {
    let mut likes: HashMap<String, Vec<String>> = HashMap::new();
    if review_ids.is_empty() {
        return Ok(likes);
    }
    let pairs = review_likes::table
        .filter(review_likes::review_id.eq_any(review_ids))
        .order(review_likes::created_at.asc())
        .select((review_likes::review_id, review_likes::user_id))
        .load::<(String, String)>(conn)?;
    for (review_id, user_id) in pairs {
        likes.entry(review_id).or_default().push(user_id);
    }
    Ok(likes)
}

fn with_likes(conn: &MysqlConnection, rows: Vec<ReviewRow>) -> StoreResult<Vec<Review>> {
    let ids: Vec<String> = rows.iter().map(|row| row.id.clone()).collect();
    let mut likes = likes_for(conn, &ids)?;
    rows.into_iter()
        .map(|row| {
            let liked_by = likes.remove(&row.id).unwrap_or_default();
            row.into_review(liked_by)
        })
        .collect()
}

fn refresh_likes_count(conn: &MysqlConnection, review_id: &str) -> StoreResult<u32> {
    let count: i64 = review_likes::table
        .filter(review_likes::review_id.eq(review_id))
        .count()
        .get_result(conn)?;
    diesel::update(reviews::table.find(review_id))
        .set(reviews::likes_count.eq(count as i32))
        .execute(conn)?;
    Ok(count as u32)
}

pub(crate) fn insert_review(conn: &MysqlConnection, review: &Review) -> StoreResult<()> {
    diesel::insert_into(reviews::table)
        .values(&ReviewRow::from(review))
        .execute(conn)?;
    Ok(())
}

pub(crate) fn find_review(conn: &MysqlConnection, review_id: &str) -> StoreResult<Option<Review>> {
    let row = reviews::table
        .find(review_id)
        .first::<ReviewRow>(conn)
        .optional()?;
    Ok(with_likes(conn, row.into_iter().collect())?.pop())
}

pub(crate) fn find_review_by_author(
    conn: &MysqlConnection,
    food_id: &str,
    user_id: &str,
) -> StoreResult<Option<Review>> {
    let row = reviews::table
        .filter(reviews::food_id.eq(food_id).and(reviews::user_id.eq(user_id)))
        .first::<ReviewRow>(conn)
        .optional()?;
    Ok(with_likes(conn, row.into_iter().collect())?.pop())
}

pub(crate) fn list_reviews(
    conn: &MysqlConnection,
    food_id: &str,
    sort: ReviewSort,
    order: SortOrder,
    page: Page,
) -> StoreResult<(Vec<Review>, u64)> {
    let query = reviews::table
        .filter(reviews::food_id.eq(food_id))
        .into_boxed();
    // ties fall back to (created_at, id) in the same direction, matching MemoryStore
    let query = match (sort, order) {
        (ReviewSort::CreatedAt, SortOrder::Asc) => {
            query.order((reviews::created_at.asc(), reviews::id.asc()))
        }
        (ReviewSort::CreatedAt, SortOrder::Desc) => {
            query.order((reviews::created_at.desc(), reviews::id.desc()))
        }
        (ReviewSort::Rating, SortOrder::Asc) => query.order((
            reviews::rating.asc(),
            reviews::created_at.asc(),
            reviews::id.asc(),
        )),
        (ReviewSort::Rating, SortOrder::Desc) => query.order((
            reviews::rating.desc(),
            reviews::created_at.desc(),
            reviews::id.desc(),
        )),
        (ReviewSort::LikesCount, SortOrder::Asc) => query.order((
            reviews::likes_count.asc(),
            reviews::created_at.asc(),
            reviews::id.asc(),
        )),
        (ReviewSort::LikesCount, SortOrder::Desc) => query.order((
            reviews::likes_count.desc(),
            reviews::created_at.desc(),
            reviews::id.desc(),
        )),
    };
    let rows = query
        .offset(page.offset as i64)
        .limit(page.limit as i64)
        .load::<ReviewRow>(conn)?;
    let total: i64 = reviews::table
        .filter(reviews::food_id.eq(food_id))
        .count()
        .get_result(conn)?;

    Ok((with_likes(conn, rows)?, total as u64))
}

pub(crate) fn food_ratings(conn: &MysqlConnection, food_id: &str) -> StoreResult<Vec<u8>> {
    let ratings = reviews::table
        .filter(reviews::food_id.eq(food_id))
        .select(reviews::rating)
        .load::<i32>(conn)?;
    Ok(ratings
        .into_iter()
        .filter_map(|rating| u8::try_from(rating).ok())
        .collect())
}

pub(crate) fn update_review(conn: &MysqlConnection, review: &Review) -> StoreResult<()> {
    diesel::update(reviews::table.find(&review.id))
        .set((
            reviews::content.eq(&review.content),
            reviews::rating.eq(i32::from(review.rating)),
            reviews::updated_at.eq(review.updated_at),
        ))
        .execute(conn)?;
    Ok(())
}

pub(crate) fn delete_review(conn: &MysqlConnection, review_id: &str) -> StoreResult<bool> {
    conn.transaction::<_, StoreError, _>(|| {
        diesel::delete(review_likes::table.filter(review_likes::review_id.eq(review_id)))
            .execute(conn)?;
        let deleted = diesel::delete(reviews::table.find(review_id)).execute(conn)?;
        Ok(deleted > 0)
    })
}

pub(crate) fn toggle_like(
    conn: &MysqlConnection,
    review_id: &str,
    user_id: &str,
    liked_at: NaiveDateTime,
) -> StoreResult<Option<LikeToggle>> {
    conn.transaction::<_, StoreError, _>(|| {
        let exists: i64 = reviews::table
            .find(review_id)
            .count()
            .get_result(conn)?;
        if exists == 0 {
            return Ok(None);
        }

        let removed = diesel::delete(review_likes::table.find((review_id, user_id))).execute(conn)?;
        let liked = removed == 0;
        if liked {
            diesel::insert_into(review_likes::table)
                .values(&LikeRow {
                    review_id,
                    user_id,
                    created_at: liked_at,
                })
                .execute(conn)?;
        }

        let likes_count = refresh_likes_count(conn, review_id)?;
        Ok(Some(LikeToggle { liked, likes_count }))
    })
}

// menus

fn with_dishes(conn: &MysqlConnection, rows: Vec<MenuRow>) -> StoreResult<Vec<SchoolMenu>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<String> = rows.iter().map(|row| row.id.clone()).collect();
    let mut dishes: HashMap<String, Vec<Dish>> = HashMap::new();
    let dish_rows = menu_dishes::table
        .filter(menu_dishes::menu_id.eq_any(&ids))
        .order(menu_dishes::position.asc())
        .load::<DishRow>(conn)?;
    for row in dish_rows {
        dishes.entry(row.menu_id).or_default().push(Dish {
            food_id: row.food_id,
            price: row.price,
            availability: row.availability,
        });
    }

    rows.into_iter()
        .map(|row| {
            let items = dishes.remove(&row.id).unwrap_or_default();
            row.into_menu(items)
        })
        .collect()
}

pub(crate) fn insert_menu(conn: &MysqlConnection, menu: &SchoolMenu) -> StoreResult<()> {
    conn.transaction::<_, StoreError, _>(|| {
        diesel::insert_into(school_menus::table)
            .values(&MenuRow::from(menu))
            .execute(conn)?;
        insert_dishes(conn, &menu.id, &menu.dishes)
    })
}

pub(crate) fn find_menu(conn: &MysqlConnection, menu_id: &str) -> StoreResult<Option<SchoolMenu>> {
    let row = school_menus::table
        .find(menu_id)
        .first::<MenuRow>(conn)
        .optional()?;
    Ok(with_dishes(conn, row.into_iter().collect())?.pop())
}

pub(crate) fn find_menu_for(
    conn: &MysqlConnection,
    date: NaiveDate,
    meal: MealType,
) -> StoreResult<Option<SchoolMenu>> {
    let row = school_menus::table
        .filter(
            school_menus::menu_date
                .eq(date)
                .and(school_menus::meal_type.eq(meal.as_str())),
        )
        .first::<MenuRow>(conn)
        .optional()?;
    Ok(with_dishes(conn, row.into_iter().collect())?.pop())
}

pub(crate) fn list_menus_between(
    conn: &MysqlConnection,
    start: NaiveDate,
    end: NaiveDate,
) -> StoreResult<Vec<SchoolMenu>> {
    let rows = school_menus::table
        .filter(
            school_menus::menu_date
                .ge(start)
                .and(school_menus::menu_date.lt(end)),
        )
        .order(school_menus::menu_date.asc())
        .load::<MenuRow>(conn)?;
    let mut menus = with_dishes(conn, rows)?;
    // meal_type is stored as text, so breakfast/lunch/dinner order is applied here
    menus.sort_by(|a, b| (a.date, a.meal_type).cmp(&(b.date, b.meal_type)));
    Ok(menus)
}

pub(crate) fn replace_dishes(
    conn: &MysqlConnection,
    menu_id: &str,
    dishes: &[Dish],
    updated_at: NaiveDateTime,
) -> StoreResult<bool> {
    conn.transaction::<_, StoreError, _>(|| {
        let updated = diesel::update(school_menus::table.find(menu_id))
            .set(school_menus::updated_at.eq(updated_at))
            .execute(conn)?;
        if updated == 0 {
            return Ok(false);
        }
        diesel::delete(menu_dishes::table.filter(menu_dishes::menu_id.eq(menu_id)))
            .execute(conn)?;
        insert_dishes(conn, menu_id, dishes)?;
        Ok(true)
    })
}

pub(crate) fn delete_menu(conn: &MysqlConnection, menu_id: &str) -> StoreResult<bool> {
    conn.transaction::<_, StoreError, _>(|| {
        diesel::delete(menu_dishes::table.filter(menu_dishes::menu_id.eq(menu_id)))
            .execute(conn)?;
        let deleted = diesel::delete(school_menus::table.find(menu_id)).execute(conn)?;
        Ok(deleted > 0)
    })
}

// daily recommendations

pub(crate) fn find_recommendation(
    conn: &MysqlConnection,
    user_id: &str,
    date_string: &str,
) -> StoreResult<Option<DailyRecommendation>> {
    Ok(daily_recommendations::table
        .filter(
            daily_recommendations::user_id
                .eq(user_id)
                .and(daily_recommendations::date_string.eq(date_string)),
        )
        .first::<RecommendationRow>(conn)
        .optional()?
        .map(DailyRecommendation::from))
}

pub(crate) fn insert_recommendation(
    conn: &MysqlConnection,
    recommendation: &DailyRecommendation,
) -> StoreResult<()> {
    diesel::insert_into(daily_recommendations::table)
        .values(&RecommendationRow::from(recommendation))
        .execute(conn)?;
    Ok(())
}

pub(crate) fn recommended_since(
    conn: &MysqlConnection,
    user_id: &str,
    since: NaiveDate,
) -> StoreResult<Vec<String>> {
    Ok(daily_recommendations::table
        .filter(
            daily_recommendations::user_id
                .eq(user_id)
                .and(daily_recommendations::rec_date.ge(since)),
        )
        .select(daily_recommendations::food_id)
        .distinct()
        .load::<String>(conn)?)
}

pub(crate) fn list_recommendations(
    conn: &MysqlConnection,
    user_id: &str,
    page: Page,
) -> StoreResult<(Vec<DailyRecommendation>, u64)> {
    let rows = daily_recommendations::table
        .filter(daily_recommendations::user_id.eq(user_id))
        .order(daily_recommendations::rec_date.desc())
        .offset(page.offset as i64)
        .limit(page.limit as i64)
        .load::<RecommendationRow>(conn)?;
    let total: i64 = daily_recommendations::table
        .filter(daily_recommendations::user_id.eq(user_id))
        .count()
        .get_result(conn)?;
    Ok((
        rows.into_iter().map(DailyRecommendation::from).collect(),
        total as u64,
    ))
}

// announcements

pub(crate) fn insert_announcement(conn: &MysqlConnection, announcement: &Announcement) -> StoreResult<()> {
    diesel::insert_into(announcements::table)
        .values(&AnnouncementRow::from(announcement))
        .execute(conn)?;
    Ok(())
}

pub(crate) fn find_announcement(
    conn: &MysqlConnection,
    announcement_id: &str,
) -> StoreResult<Option<Announcement>> {
    Ok(announcements::table
        .find(announcement_id)
        .first::<AnnouncementRow>(conn)
        .optional()?
        .map(Announcement::from))
}

pub(crate) fn list_announcements(
    conn: &MysqlConnection,
    published_only: bool,
    page: Page,
) -> StoreResult<(Vec<Announcement>, u64)> {
    let mut query = announcements::table.into_boxed();
    if published_only {
        query = query.filter(announcements::published.eq(true));
    }
    let rows = query
        .order((announcements::pinned.desc(), announcements::created_at.desc()))
        .offset(page.offset as i64)
        .limit(page.limit as i64)
        .load::<AnnouncementRow>(conn)?;

    let total: i64 = if published_only {
        announcements::table
            .filter(announcements::published.eq(true))
            .count()
            .get_result(conn)?
    } else {
        announcements::table.count().get_result(conn)?
    };

    Ok((
        rows.into_iter().map(Announcement::from).collect(),
        total as u64,
    ))
}

pub(crate) fn update_announcement(conn: &MysqlConnection, announcement: &Announcement) -> StoreResult<()> {
    diesel::update(announcements::table.find(&announcement.id))
        .set((
            announcements::title.eq(&announcement.title),
            announcements::content.eq(&announcement.content),
            announcements::pinned.eq(announcement.pinned),
            announcements::published.eq(announcement.published),
            announcements::updated_at.eq(announcement.updated_at),
        ))
        .execute(conn)?;
    Ok(())
}

pub(crate) fn delete_announcement(conn: &MysqlConnection, announcement_id: &str) -> StoreResult<bool> {
    let deleted = diesel::delete(announcements::table.find(announcement_id)).execute(conn)?;
    Ok(deleted > 0)
}
