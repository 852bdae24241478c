//! Core domain types for recipe ingestion.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

// ---------------------------------------------------------------------------
// Recipe / Ingredient
// ---------------------------------------------------------------------------

/// A normalized recipe ready for ingestion, or one read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    /// Store-assigned id. `None` until persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// URL-safe identifier, unique per source site.
    pub slug: String,
    /// Display name. Duplicate detection is keyed on this value.
    pub name: String,
    /// Hero image URL (empty when the source has none).
    pub image_url: String,
    /// Total calories, filled in by downstream estimation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories: Option<f64>,
    /// Number of ingredients in the source payload.
    pub number_of_ingredients: usize,
    /// Ingredients ordered by `position`.
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
}

/// One ingredient line of a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    /// Ingredient name (e.g. "kosher salt").
    pub name: String,
    /// Site-local identifier distinguishing the line within its page.
    pub uid: i64,
    /// Free-text amount ("1 1/2").
    pub amount: String,
    /// Unit ("tsp").
    pub unit: String,
    /// Free-text notes ("divided").
    pub notes: String,
    /// Zero-based ordinal within the recipe.
    pub position: u32,
}

/// Join row between a recipe and a persisted ingredient identity.
///
/// Carries its own quantity fields because the same ingredient name recurs
/// across recipes with different amounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeIngredient {
    pub recipe_id: i64,
    pub ingredient_id: i64,
    pub amount: String,
    pub unit: String,
    pub notes: String,
    pub position: u32,
}

impl RecipeIngredient {
    /// Build the join row for `ingredient` once both ids are known.
    pub fn new(recipe_id: i64, ingredient_id: i64, ingredient: &Ingredient) -> Self {
        Self {
            recipe_id,
            ingredient_id,
            amount: ingredient.amount.clone(),
            unit: ingredient.unit.clone(),
            notes: ingredient.notes.clone(),
            position: ingredient.position,
        }
    }
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// An article link found on a monthly archive page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Absolute article URL.
    pub url: String,
    /// Title text from the listing card.
    pub title: String,
    /// Thumbnail URL (lazy-load attribute preferred).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

// ---------------------------------------------------------------------------
// YearMonth
// ---------------------------------------------------------------------------

/// A calendar month, the unit of the archive crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Build a month, rejecting months outside `1..=12`.
    pub fn new(year: i32, month: u32) -> crate::Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(HarvestError::validation(format!(
                "month {month} out of range (1-12)"
            )));
        }
        Ok(Self { year, month })
    }

    /// The current month in UTC.
    pub fn current() -> Self {
        let today = Utc::now().date_naive();
        Self::from(today)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The following calendar month.
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl From<NaiveDate> for YearMonth {
    fn from(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .trim()
            .split_once(['-', '/'])
            .ok_or_else(|| HarvestError::validation(format!("expected YYYY-MM, got '{s}'")))?;
        let year: i32 = year
            .parse()
            .map_err(|_| HarvestError::validation(format!("invalid year in '{s}'")))?;
        let month: u32 = month
            .parse()
            .map_err(|_| HarvestError::validation(format!("invalid month in '{s}'")))?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for YearMonth {
    type Error = HarvestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}
