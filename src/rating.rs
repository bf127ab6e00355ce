//! Food rating aggregation.
//!
//! A food's rating fields are derived data: they are rebuilt from the full set
//! of its review ratings after every review write.

use crate::models::Food;
use crate::store::{Store, StoreResult};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingSummary {
    pub average: f64,
    pub count: u32,
    pub distribution: [u32; 5],
}

impl RatingSummary {
    pub fn from_ratings(ratings: &[u8]) -> Self {
        let mut distribution = [0u32; 5];
        let mut total = 0u64;
        let mut count = 0u32;

        for &rating in ratings {
            if !(MIN_RATING..=MAX_RATING).contains(&rating) {
                log::warn!("ignoring out of range rating {rating}");
                continue;
            }
            distribution[usize::from(rating - 1)] += 1;
            total += u64::from(rating);
            count += 1;
        }

        let average = if count == 0 {
            0.0
        } else {
            (total as f64 / f64::from(count) * 10.0).round() / 10.0
        };

        Self {
            average,
            count,
            distribution,
        }
    }

    pub fn apply(&self, food: &mut Food) {
        food.average_rating = self.average;
        food.reviews_count = self.count;
        food.rating_distribution = self.distribution;
    }
}

pub fn is_valid_rating(rating: i64) -> bool {
    (i64::from(MIN_RATING)..=i64::from(MAX_RATING)).contains(&rating)
}

/// Rebuilds and saves the rating fields of `food_id` from its reviews.
/// Returns the updated food, or `None` when it no longer exists.
pub fn refresh(store: &dyn Store, food_id: &str) -> StoreResult<Option<Food>> {
    let Some(mut food) = store.find_food(food_id)? else {
        return Ok(None);
    };
    let ratings = store.food_ratings(food_id)?;
    RatingSummary::from_ratings(&ratings).apply(&mut food);
    store.update_food_rating(&food)?;
    Ok(Some(food))
}
