use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{NaiveDate, NaiveDateTime};

use super::{Page, ReviewSort, SortOrder, Store, StoreError, StoreResult};
use crate::models::{
    Announcement, DailyRecommendation, Dish, Food, LikeToggle, MealType, Review, SchoolMenu, User,
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    foods: Vec<Food>,
    reviews: Vec<Review>,
    menus: Vec<SchoolMenu>,
    recommendations: Vec<DailyRecommendation>,
    announcements: Vec<Announcement>,
}

/// In-process store with the same constraints as the MySQL schema.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn newest_first<T: Clone>(rows: &[T], created_at: impl Fn(&T) -> chrono::NaiveDateTime) -> Vec<T> {
    let mut out: Vec<T> = rows.iter().rev().cloned().collect();
    out.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    out
}

fn window<T>(rows: Vec<T>, page: Page) -> (Vec<T>, u64) {
    let total = rows.len() as u64;
    let rows = rows
        .into_iter()
        .skip(page.offset as usize)
        .take(page.limit as usize)
        .collect();
    (rows, total)
}

impl Store for MemoryStore {
    fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut t = self.tables();
        if t.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("邮箱".to_string()));
        }
        if t.users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict("用户名".to_string()));
        }
        t.users.push(user.clone());
        Ok(())
    }

    fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.tables().users.iter().find(|u| u.id == id).cloned())
    }

    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.tables().users.iter().find(|u| u.email == email).cloned())
    }

    fn find_user_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> StoreResult<Option<User>> {
        Ok(self
            .tables()
            .users
            .iter()
            .find(|u| u.email == email || u.username == username)
            .cloned())
    }

    fn find_users(&self, ids: &[String]) -> StoreResult<Vec<User>> {
        Ok(self
            .tables()
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }

    fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(newest_first(&self.tables().users, |u| u.created_at))
    }

    fn delete_user(&self, id: &str) -> StoreResult<Option<Vec<String>>> {
        let mut t = self.tables();
        let before = t.users.len();
        t.users.retain(|u| u.id != id);
        if t.users.len() == before {
            return Ok(None);
        }

        let mut foods: Vec<String> = Vec::new();
        for review in t.reviews.iter().filter(|r| r.user_id == id) {
            if !foods.contains(&review.food_id) {
                foods.push(review.food_id.clone());
            }
        }
        t.reviews.retain(|r| r.user_id != id);
        for review in t.reviews.iter_mut() {
            review.likes.retain(|liker| liker != id);
            review.likes_count = review.likes.len() as u32;
        }
        t.recommendations.retain(|r| r.user_id != id);
        Ok(Some(foods))
    }

    fn insert_food(&self, food: &Food) -> StoreResult<()> {
        self.tables().foods.push(food.clone());
        Ok(())
    }

    fn find_food(&self, id: &str) -> StoreResult<Option<Food>> {
        Ok(self.tables().foods.iter().find(|f| f.id == id).cloned())
    }

    fn find_foods(&self, ids: &[String]) -> StoreResult<Vec<Food>> {
        Ok(self
            .tables()
            .foods
            .iter()
            .filter(|f| ids.contains(&f.id))
            .cloned()
            .collect())
    }

    fn list_foods(&self) -> StoreResult<Vec<Food>> {
        Ok(newest_first(&self.tables().foods, |f| f.created_at))
    }

    fn update_food_details(&self, food: &Food) -> StoreResult<()> {
        let mut t = self.tables();
        if let Some(slot) = t.foods.iter_mut().find(|f| f.id == food.id) {
            slot.name = food.name.clone();
            slot.category = food.category;
            slot.location = food.location.clone();
            slot.description = food.description.clone();
            slot.emoji = food.emoji.clone();
        }
        Ok(())
    }

    fn update_food_rating(&self, food: &Food) -> StoreResult<()> {
        let mut t = self.tables();
        if let Some(slot) = t.foods.iter_mut().find(|f| f.id == food.id) {
            slot.average_rating = food.average_rating;
            slot.reviews_count = food.reviews_count;
            slot.rating_distribution = food.rating_distribution;
        }
        Ok(())
    }

    fn delete_food(&self, id: &str) -> StoreResult<bool> {
        let mut t = self.tables();
        let before = t.foods.len();
        t.foods.retain(|f| f.id != id);
        if t.foods.len() == before {
            return Ok(false);
        }
        t.reviews.retain(|r| r.food_id != id);
        t.recommendations.retain(|r| r.food_id != id);
        for menu in t.menus.iter_mut() {
            menu.dishes.retain(|d| d.food_id != id);
        }
        Ok(true)
    }

    fn insert_review(&self, review: &Review) -> StoreResult<()> {
        let mut t = self.tables();
        if t
            .reviews
            .iter()
            .any(|r| r.food_id == review.food_id && r.user_id == review.user_id)
        {
            return Err(StoreError::Conflict("评论".to_string()));
        }
        t.reviews.push(review.clone());
        Ok(())
    }

    fn find_review(&self, id: &str) -> StoreResult<Option<Review>> {
        Ok(self.tables().reviews.iter().find(|r| r.id == id).cloned())
    }

    fn find_review_by_author(&self, food_id: &str, user_id: &str) -> StoreResult<Option<Review>> {
        Ok(self
            .tables()
            .reviews
            .iter()
            .find(|r| r.food_id == food_id && r.user_id == user_id)
            .cloned())
    }

    fn list_reviews(
        &self,
        food_id: &str,
        sort: ReviewSort,
        order: SortOrder,
        page: Page,
    ) -> StoreResult<(Vec<Review>, u64)> {
        let mut rows: Vec<Review> = self
            .tables()
            .reviews
            .iter()
            .filter(|r| r.food_id == food_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            let ord: Ordering = match sort {
                ReviewSort::CreatedAt => Ordering::Equal,
                ReviewSort::Rating => a.rating.cmp(&b.rating),
                ReviewSort::LikesCount => a.likes_count.cmp(&b.likes_count),
            }
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id));
            match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
        Ok(window(rows, page))
    }

    fn food_ratings(&self, food_id: &str) -> StoreResult<Vec<u8>> {
        Ok(self
            .tables()
            .reviews
            .iter()
            .filter(|r| r.food_id == food_id)
            .map(|r| r.rating)
            .collect())
    }

    fn update_review(&self, review: &Review) -> StoreResult<()> {
        let mut t = self.tables();
        if let Some(slot) = t.reviews.iter_mut().find(|r| r.id == review.id) {
            slot.content = review.content.clone();
            slot.rating = review.rating;
            slot.updated_at = review.updated_at;
        }
        Ok(())
    }

    fn delete_review(&self, id: &str) -> StoreResult<bool> {
        let mut t = self.tables();
        let before = t.reviews.len();
        t.reviews.retain(|r| r.id != id);
        Ok(t.reviews.len() != before)
    }

    fn toggle_like(
        &self,
        review_id: &str,
        user_id: &str,
        _liked_at: NaiveDateTime,
    ) -> StoreResult<Option<LikeToggle>> {
        let mut t = self.tables();
        let Some(review) = t.reviews.iter_mut().find(|r| r.id == review_id) else {
            return Ok(None);
        };

        let liked = if review.likes.iter().any(|u| u == user_id) {
            review.likes.retain(|u| u != user_id);
            false
        } else {
            review.likes.push(user_id.to_string());
            true
        };
        review.likes_count = review.likes.len() as u32;

        Ok(Some(LikeToggle {
            liked,
            likes_count: review.likes_count,
        }))
    }

    fn insert_menu(&self, menu: &SchoolMenu) -> StoreResult<()> {
        let mut t = self.tables();
        if t
            .menus
            .iter()
            .any(|m| m.date == menu.date && m.meal_type == menu.meal_type)
        {
            return Err(StoreError::Conflict("菜单".to_string()));
        }
        t.menus.push(menu.clone());
        Ok(())
    }

    fn find_menu(&self, id: &str) -> StoreResult<Option<SchoolMenu>> {
        Ok(self.tables().menus.iter().find(|m| m.id == id).cloned())
    }

    fn find_menu_for(&self, date: NaiveDate, meal: MealType) -> StoreResult<Option<SchoolMenu>> {
        Ok(self
            .tables()
            .menus
            .iter()
            .find(|m| m.date == date && m.meal_type == meal)
            .cloned())
    }

    fn list_menus_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<Vec<SchoolMenu>> {
        let mut rows: Vec<SchoolMenu> = self
            .tables()
            .menus
            .iter()
            .filter(|m| m.date >= start && m.date < end)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.date, a.meal_type).cmp(&(b.date, b.meal_type)));
        Ok(rows)
    }

    fn replace_dishes(
        &self,
        menu_id: &str,
        dishes: &[Dish],
        updated_at: NaiveDateTime,
    ) -> StoreResult<bool> {
        let mut t = self.tables();
        match t.menus.iter_mut().find(|m| m.id == menu_id) {
            Some(menu) => {
                menu.dishes = dishes.to_vec();
                menu.updated_at = updated_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_menu(&self, id: &str) -> StoreResult<bool> {
        let mut t = self.tables();
        let before = t.menus.len();
        t.menus.retain(|m| m.id != id);
        Ok(t.menus.len() != before)
    }

    fn find_recommendation(
        &self,
        user_id: &str,
        date_string: &str,
    ) -> StoreResult<Option<DailyRecommendation>> {
        Ok(self
            .tables()
            .recommendations
            .iter()
            .find(|r| r.user_id == user_id && r.date_string == date_string)
            .cloned())
    }

    fn insert_recommendation(&self, recommendation: &DailyRecommendation) -> StoreResult<()> {
        let mut t = self.tables();
        if t.recommendations.iter().any(|r| {
            r.user_id == recommendation.user_id && r.date_string == recommendation.date_string
        }) {
            return Err(StoreError::Conflict("今日推荐".to_string()));
        }
        t.recommendations.push(recommendation.clone());
        Ok(())
    }

    fn recommended_since(&self, user_id: &str, since: NaiveDate) -> StoreResult<Vec<String>> {
        let ids: HashSet<String> = self
            .tables()
            .recommendations
            .iter()
            .filter(|r| r.user_id == user_id && r.date >= since)
            .map(|r| r.food_id.clone())
            .collect();
        Ok(ids.into_iter().collect())
    }

    fn list_recommendations(
        &self,
        user_id: &str,
        page: Page,
    ) -> StoreResult<(Vec<DailyRecommendation>, u64)> {
        let mut rows: Vec<DailyRecommendation> = self
            .tables()
            .recommendations
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(window(rows, page))
    }

    fn insert_announcement(&self, announcement: &Announcement) -> StoreResult<()> {
        self.tables().announcements.push(announcement.clone());
        Ok(())
    }

    fn find_announcement(&self, id: &str) -> StoreResult<Option<Announcement>> {
        Ok(self
            .tables()
            .announcements
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    fn list_announcements(
        &self,
        published_only: bool,
        page: Page,
    ) -> StoreResult<(Vec<Announcement>, u64)> {
        let mut rows: Vec<Announcement> =
            newest_first(&self.tables().announcements, |a| a.created_at);
        if published_only {
            rows.retain(|a| a.published);
        }
        rows.sort_by(|a, b| b.pinned.cmp(&a.pinned));
        Ok(window(rows, page))
    }

    fn update_announcement(&self, announcement: &Announcement) -> StoreResult<()> {
        let mut t = self.tables();
        if let Some(slot) = t.announcements.iter_mut().find(|a| a.id == announcement.id) {
            *slot = announcement.clone();
        }
        Ok(())
    }

    fn delete_announcement(&self, id: &str) -> StoreResult<bool> {
        let mut t = self.tables();
        let before = t.announcements.len();
        t.announcements.retain(|a| a.id != id);
        Ok(t.announcements.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{NaiveDateTime, Utc};

    use crate::models::{new_id, FoodCategory, Role};

    fn now() -> NaiveDateTime {
        Utc::now().naive_utc()
    }

    fn user(name: &str) -> User {
        User {
            id: new_id(),
            username: name.to_string(),
            email: format!("{name}@example.com"),
            password_hash: "hash".to_string(),
            role: Role::Student,
            avatar: "👤".to_string(),
            created_at: now(),
        }
    }

    fn food(creator: &User) -> Food {
        Food {
            id: new_id(),
            name: "包子".to_string(),
            category: FoodCategory::Breakfast,
            location: "西门".to_string(),
            description: "肉馅".to_string(),
            emoji: "🥟".to_string(),
            average_rating: 0.0,
            reviews_count: 0,
            rating_distribution: [0; 5],
            created_by: creator.id.clone(),
            created_by_name: creator.username.clone(),
            created_at: now(),
        }
    }

    fn review(food: &Food, author: &User, rating: u8) -> Review {
        Review {
            id: new_id(),
            food_id: food.id.clone(),
            user_id: author.id.clone(),
            content: "不错".to_string(),
            rating,
            likes: Vec::new(),
            likes_count: 0,
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn test_duplicate_email_conflicts() {
        let store = MemoryStore::new();
        let alice = user("alice");
        store.insert_user(&alice).unwrap();

        let mut twin = user("alice2");
        twin.email = alice.email.clone();
        assert!(matches!(
            store.insert_user(&twin),
            Err(StoreError::Conflict(field)) if field == "邮箱"
        ));
    }

    #[test]
    fn test_one_review_per_author_and_food() {
        let store = MemoryStore::new();
        let alice = user("alice");
        let dish = food(&alice);
        store.insert_review(&review(&dish, &alice, 4)).unwrap();

        let err = store.insert_review(&review(&dish, &alice, 5)).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(!err.is_outage());
    }

    #[test]
    fn test_toggle_like_twice_restores_count() {
        let store = MemoryStore::new();
        let alice = user("alice");
        let bob = user("bob");
        let dish = food(&alice);
        let r = review(&dish, &alice, 4);
        store.insert_review(&r).unwrap();

        let on = store.toggle_like(&r.id, &bob.id, now()).unwrap().unwrap();
        assert_eq!(on, LikeToggle { liked: true, likes_count: 1 });
        let off = store.toggle_like(&r.id, &bob.id, now()).unwrap().unwrap();
        assert_eq!(off, LikeToggle { liked: false, likes_count: 0 });
        assert!(store.toggle_like("missing", &bob.id, now()).unwrap().is_none());
    }

    #[test]
    fn test_details_edit_keeps_fresh_rating() {
        let store = MemoryStore::new();
        let alice = user("alice");
        let dish = food(&alice);
        store.insert_food(&dish).unwrap();

        // edit read before a review lands, written after its recompute
        let mut edited = store.find_food(&dish.id).unwrap().unwrap();
        store.insert_review(&review(&dish, &alice, 4)).unwrap();
        crate::rating::refresh(&store, &dish.id).unwrap();
        edited.name = "灌汤包".to_string();
        store.update_food_details(&edited).unwrap();

        let saved = store.find_food(&dish.id).unwrap().unwrap();
        assert_eq!(saved.name, "灌汤包");
        assert_eq!(saved.reviews_count, 1);
        assert_eq!(saved.average_rating, 4.0);
        assert_eq!(saved.rating_distribution, [0, 0, 0, 1, 0]);
    }

    #[test]
    fn test_review_sort_ties_break_by_time_then_id() {
        let store = MemoryStore::new();
        let dish = food(&user("alice"));
        let at = now();
        for (id, author, offset) in [("b", "bob", 0), ("a", "carol", 0), ("c", "dave", -1)] {
            let mut r = review(&dish, &user(author), 4);
            r.id = id.to_string();
            r.created_at = at + chrono::Duration::seconds(offset);
            store.insert_review(&r).unwrap();
        }

        let ids = |order| {
            let (rows, _) = store
                .list_reviews(&dish.id, ReviewSort::Rating, order, Page::new(1, 10))
                .unwrap();
            rows.into_iter().map(|r| r.id).collect::<Vec<_>>()
        };
        assert_eq!(ids(SortOrder::Asc), ["c", "a", "b"]);
        assert_eq!(ids(SortOrder::Desc), ["b", "a", "c"]);
    }

    #[test]
    fn test_delete_food_cascades() {
        let store = MemoryStore::new();
        let alice = user("alice");
        let dish = food(&alice);
        store.insert_food(&dish).unwrap();
        store.insert_review(&review(&dish, &alice, 3)).unwrap();

        assert!(store.delete_food(&dish.id).unwrap());
        assert!(store.food_ratings(&dish.id).unwrap().is_empty());
        assert!(!store.delete_food(&dish.id).unwrap());
    }

    #[test]
    fn test_delete_user_reports_reviewed_foods() {
        let store = MemoryStore::new();
        let alice = user("alice");
        let bob = user("bob");
        store.insert_user(&alice).unwrap();
        store.insert_user(&bob).unwrap();
        let dish = food(&alice);
        store.insert_food(&dish).unwrap();
        let r = review(&dish, &alice, 5);
        store.insert_review(&r).unwrap();
        store.insert_review(&review(&dish, &bob, 1)).unwrap();
        store.toggle_like(&r.id, &bob.id, now()).unwrap();

        let foods = store.delete_user(&bob.id).unwrap().unwrap();
        assert_eq!(foods, vec![dish.id.clone()]);
        assert_eq!(store.food_ratings(&dish.id).unwrap(), vec![5]);
        assert_eq!(store.find_review(&r.id).unwrap().unwrap().likes_count, 0);
        assert!(store.delete_user(&bob.id).unwrap().is_none());
    }

    #[test]
    fn test_pinned_announcements_first() {
        let store = MemoryStore::new();
        for (title, pinned, published) in [("a", false, true), ("b", true, true), ("c", false, false)] {
            store
                .insert_announcement(&Announcement {
                    id: new_id(),
                    title: title.to_string(),
                    content: "x".to_string(),
                    pinned,
                    published,
                    created_by: None,
                    created_at: now(),
                    updated_at: now(),
                })
                .unwrap();
        }

        let (rows, total) = store.list_announcements(true, Page::new(1, 10)).unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows[0].title, "b");
        assert_eq!(rows[1].title, "a");

        let (_, total) = store.list_announcements(false, Page::new(1, 10)).unwrap();
        assert_eq!(total, 3);
    }
}
