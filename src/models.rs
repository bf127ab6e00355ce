use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_AVATAR: &str = "👤";
pub const DEFAULT_FOOD_EMOJI: &str = "🍽️";
pub const DEFAULT_SCHOOL_NAME: &str = "上海市曹杨第二中学";
pub const DEFAULT_SCHOOL_LOCATION: &str = "上海市普陀区";

/// Fresh document id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug)]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

// Storage round-trips enums through their wire names.
macro_rules! wire_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
}

wire_enum!(Role, "role", { Student => "student", Admin => "admin" });

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub avatar: String,
    pub created_at: NaiveDateTime,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
            avatar: self.avatar.clone(),
            created_at: self.created_at,
        }
    }

    pub fn author(&self) -> Author {
        Author {
            id: self.id.clone(),
            username: self.username.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

/// A user as the API shows it; never carries the password hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub avatar: String,
    pub created_at: NaiveDateTime,
}

/// Public author card attached to reviews and announcements.
#[derive(Debug, Clone, Serialize)]
pub struct Author {
    pub id: String,
    pub username: String,
    pub avatar: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FoodCategory {
    #[serde(rename = "面食")]
    Noodles,
    #[serde(rename = "快餐")]
    FastFood,
    #[serde(rename = "饮品")]
    Drinks,
    #[serde(rename = "小吃")]
    Snacks,
    #[serde(rename = "早餐")]
    Breakfast,
    #[serde(rename = "其他")]
    Other,
}

wire_enum!(FoodCategory, "food category", {
    Noodles => "面食",
    FastFood => "快餐",
    Drinks => "饮品",
    Snacks => "小吃",
    Breakfast => "早餐",
    Other => "其他",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Food {
    pub id: String,
    pub name: String,
    pub category: FoodCategory,
    pub location: String,
    pub description: String,
    pub emoji: String,
    pub average_rating: f64,
    pub reviews_count: u32,
    /// Review counts for 1 through 5 stars.
    pub rating_distribution: [u32; 5],
    pub created_by: String,
    pub created_by_name: String,
    pub created_at: NaiveDateTime,
}

impl Food {
    pub(crate) fn list_from_u8(bytes: &[u8]) -> Result<Vec<Self>, bincode::Error> {
        bincode::deserialize(bytes)
    }

    pub(crate) fn list_to_u8(foods: &[Food]) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(foods)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub food_id: String,
    pub user_id: String,
    pub content: String,
    pub rating: u8,
    pub likes: Vec<String>,
    pub likes_count: u32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A review with its author populated.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewView {
    #[serde(flatten)]
    pub review: Review,
    pub user: Option<Author>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeToggle {
    pub liked: bool,
    pub likes_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    #[default]
    Lunch,
    Dinner,
}

wire_enum!(MealType, "meal type", {
    Breakfast => "breakfast",
    Lunch => "lunch",
    Dinner => "dinner",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MenuSource {
    #[default]
    Manual,
    Crawler,
    Api,
}

wire_enum!(MenuSource, "menu source", {
    Manual => "manual",
    Crawler => "crawler",
    Api => "api",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dish {
    pub food_id: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default = "available")]
    pub availability: bool,
}

fn available() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct School {
    pub name: String,
    pub location: String,
}

impl Default for School {
    fn default() -> Self {
        Self {
            name: DEFAULT_SCHOOL_NAME.to_string(),
            location: DEFAULT_SCHOOL_LOCATION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolMenu {
    pub id: String,
    pub date: NaiveDate,
    pub meal_type: MealType,
    pub dishes: Vec<Dish>,
    pub school: School,
    pub source: MenuSource,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DishView {
    #[serde(flatten)]
    pub dish: Dish,
    pub food: Option<Food>,
}

/// A menu with each dish's food populated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuView {
    pub id: String,
    pub date: NaiveDate,
    pub meal_type: MealType,
    pub dishes: Vec<DishView>,
    pub school: School,
    pub source: MenuSource,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRecommendation {
    pub id: String,
    pub user_id: String,
    pub food_id: String,
    pub date: NaiveDate,
    pub date_string: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: String,
    pub title: String,
    pub content: String,
    pub pinned: bool,
    pub published: bool,
    pub created_by: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementView {
    pub id: String,
    pub title: String,
    pub content: String,
    pub pinned: bool,
    pub published: bool,
    pub created_by: Option<Author>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl AnnouncementView {
    pub fn new(announcement: Announcement, author: Option<Author>) -> Self {
        Self {
            id: announcement.id,
            title: announcement.title,
            content: announcement.content,
            pinned: announcement.pinned,
            published: announcement.published,
            created_by: author,
            created_at: announcement.created_at,
            updated_at: announcement.updated_at,
        }
    }
}
