//! Maps the embedded recipe JSON onto the [`Recipe`] domain model.
//!
//! The payload is an object keyed by opaque recipe ids. Only the first entry
//! in document order whose value is an object is used; the other entries are
//! logged and dropped.

use harvest_shared::{HarvestError, Ingredient, Recipe, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Turns raw payload text into a [`Recipe`].
pub trait RecipeNormalizer: Send + Sync {
    fn normalize(&self, raw_json: &str) -> Result<Recipe>;
}

/// Normalizer for the WordPress Recipe Maker `wprm_recipes` payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct WprmNormalizer;

impl RecipeNormalizer for WprmNormalizer {
    fn normalize(&self, raw_json: &str) -> Result<Recipe> {
        let payload: Value = serde_json::from_str(raw_json)
            .map_err(|e| HarvestError::malformed(format!("invalid JSON: {e}")))?;
        let Value::Object(entries) = payload else {
            return Err(HarvestError::malformed("payload is not a JSON object"));
        };

        if entries.is_empty() {
            return Err(HarvestError::malformed("payload contains no recipe entries"));
        }
        let mut ignored: Vec<String> = Vec::new();
        let mut chosen = None;
        for (key, entry) in entries {
            if chosen.is_none() && entry.is_object() {
                chosen = Some((key, entry));
            } else {
                ignored.push(key);
            }
        }
        let Some((key, entry)) = chosen else {
            return Err(HarvestError::malformed("payload has no object entries"));
        };
        if !ignored.is_empty() {
            warn!(kept = %key, ?ignored, "payload has extra entries, keeping the first recipe object");
        }

        let raw: RawRecipe = serde_json::from_value(entry)
            .map_err(|e| HarvestError::malformed(format!("entry '{key}': {e}")))?;
        raw.into_recipe(&key)
    }
}

/// Slug for a display name: lowercase alphanumerics joined by hyphens.
pub fn derive_slug(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

// ---------------------------------------------------------------------------
// Payload schema
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawRecipe {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    ingredients: Option<Vec<RawIngredient>>,
}

#[derive(Debug, Deserialize)]
struct RawIngredient {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    amount: Option<Text>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    uid: Option<Value>,
    #[serde(default)]
    position: Option<Value>,
}

/// Amounts are usually strings but some sites emit bare numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Text {
    Str(String),
    Num(serde_json::Number),
}

impl From<Text> for String {
    fn from(value: Text) -> Self {
        match value {
            Text::Str(s) => s,
            Text::Num(n) => n.to_string(),
        }
    }
}

impl RawRecipe {
    fn into_recipe(self, key: &str) -> Result<Recipe> {
        let name = self.name.unwrap_or_default().trim().to_string();
        if name.is_empty() {
            return Err(HarvestError::malformed(format!("entry '{key}' has no name")));
        }

        let slug = match self.slug.map(|s| s.trim().to_string()) {
            Some(s) if !s.is_empty() => s,
            _ => {
                let derived = derive_slug(&name);
                if derived.is_empty() {
                    format!("recipe-{}", derive_slug(key))
                } else {
                    derived
                }
            }
        };

        let raw_ingredients = self.ingredients.unwrap_or_default();
        let number_of_ingredients = raw_ingredients.len();
        let ingredients = assign_positions(
            raw_ingredients
                .into_iter()
                .enumerate()
                .map(|(index, raw)| raw.into_ingredient(index))
                .collect(),
        );

        Ok(Recipe {
            id: None,
            slug,
            name,
            image_url: self.image_url.unwrap_or_default(),
            calories: None,
            number_of_ingredients,
            ingredients,
        })
    }
}

impl RawIngredient {
    fn into_ingredient(self, index: usize) -> Ingredient {
        let index = u32::try_from(index).unwrap_or(u32::MAX);
        Ingredient {
            name: self.name.unwrap_or_default(),
            uid: self
                .uid
                .as_ref()
                .and_then(as_index)
                .map_or(i64::from(index), i64::from),
            amount: self.amount.map(String::from).unwrap_or_default(),
            unit: self.unit.unwrap_or_default(),
            notes: self.notes.unwrap_or_default(),
            position: self.position.as_ref().and_then(as_index).unwrap_or(index),
        }
    }
}

/// A non-negative integer, given as a JSON number or a numeric string.
fn as_index(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Keep payload positions when they form exactly `0..n`; otherwise renumber
/// by array order. The result is sorted by position.
fn assign_positions(mut ingredients: Vec<Ingredient>) -> Vec<Ingredient> {
    let mut seen: Vec<u32> = ingredients.iter().map(|i| i.position).collect();
    seen.sort_unstable();
    let contiguous = seen.iter().enumerate().all(|(i, &p)| p as usize == i);

    if !contiguous {
        warn!(positions = ?seen, "ingredient positions are not 0..n, renumbering by array order");
        for (index, ingredient) in ingredients.iter_mut().enumerate() {
            ingredient.position = u32::try_from(index).unwrap_or(u32::MAX);
        }
    }
    ingredients.sort_by_key(|i| i.position);
    ingredients
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(json: &str) -> Result<Recipe> {
        WprmNormalizer.normalize(json)
    }

    #[test]
    fn derive_slug_examples() {
        assert_eq!(derive_slug("Chocolate Lava Cake"), "chocolate-lava-cake");
        assert_eq!(derive_slug("  Test   Soup "), "test-soup");
        assert_eq!(derive_slug("Mom's Best (Easy!) Chili"), "mom-s-best-easy-chili");
        assert_eq!(derive_slug("!!!"), "");
    }

    #[test]
    fn normalizes_minimal_payload() {
        let recipe = normalize(
            r#"{"123": {"name":"Test Soup","ingredients":[{"name":"Salt","amount":"1","unit":"tsp","position":0}]}}"#,
        )
        .unwrap();
        assert_eq!(recipe.name, "Test Soup");
        assert_eq!(recipe.slug, "test-soup");
        assert_eq!(recipe.image_url, "");
        assert_eq!(recipe.calories, None);
        assert_eq!(recipe.number_of_ingredients, 1);
        let salt = &recipe.ingredients[0];
        assert_eq!(salt.name, "Salt");
        assert_eq!(salt.amount, "1");
        assert_eq!(salt.unit, "tsp");
        assert_eq!(salt.notes, "");
        assert_eq!(salt.position, 0);
        assert_eq!(salt.uid, 0);
    }

    #[test]
    fn payload_slug_wins_when_present() {
        let recipe =
            normalize(r#"{"9":{"name":"Test Soup","slug":"soup-of-the-day","image_url":"https://x/y.jpg"}}"#)
                .unwrap();
        assert_eq!(recipe.slug, "soup-of-the-day");
        assert_eq!(recipe.image_url, "https://x/y.jpg");
        assert!(recipe.ingredients.is_empty());

        let blank = normalize(r#"{"9":{"name":"Test Soup","slug":"  "}}"#).unwrap();
        assert_eq!(blank.slug, "test-soup");
    }

    #[test]
    fn first_entry_in_document_order_is_kept() {
        let recipe = normalize(r#"{"900":{"name":"Zeta"},"100":{"name":"Alpha"}}"#).unwrap();
        assert_eq!(recipe.name, "Zeta");
    }

    #[test]
    fn non_object_entries_are_skipped() {
        let recipe = normalize(r#"{"meta": 1, "42": {"name":"Soup"}, "43": {"name":"Stew"}}"#).unwrap();
        assert_eq!(recipe.name, "Soup");
        assert_eq!(recipe.slug, "soup");
    }

    #[test]
    fn slug_keeps_non_ascii_letters() {
        assert_eq!(derive_slug("Jalapeño Crème Brûlée"), "jalapeño-crème-brûlée");
        assert_ne!(derive_slug("Crème Brûlée"), derive_slug("Creme Brulee"));
    }

    #[test]
    fn missing_positions_default_to_array_index() {
        let recipe = normalize(
            r#"{"1":{"name":"Bread","ingredients":[
                {"name":"flour","uid":7},
                {"name":"water","position":"x"},
                {"name":"yeast","position":null,"amount":2.5}
            ]}}"#,
        )
        .unwrap();
        let positions: Vec<u32> = recipe.ingredients.iter().map(|i| i.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(recipe.ingredients[0].uid, 7);
        assert_eq!(recipe.ingredients[1].uid, 1);
        assert_eq!(recipe.ingredients[2].amount, "2.5");
    }

    #[test]
    fn payload_positions_reorder_when_contiguous() {
        let recipe = normalize(
            r#"{"1":{"name":"Tea","ingredients":[
                {"name":"milk","position":2},
                {"name":"water","position":"0"},
                {"name":"tea","position":1}
            ]}}"#,
        )
        .unwrap();
        let names: Vec<&str> = recipe.ingredients.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["water", "tea", "milk"]);
    }

    #[test]
    fn gapped_positions_are_renumbered() {
        let recipe = normalize(
            r#"{"1":{"name":"Tea","ingredients":[
                {"name":"water","position":0},
                {"name":"tea","position":4},
                {"name":"milk","position":4}
            ]}}"#,
        )
        .unwrap();
        let got: Vec<(&str, u32)> = recipe
            .ingredients
            .iter()
            .map(|i| (i.name.as_str(), i.position))
            .collect();
        assert_eq!(got, vec![("water", 0), ("tea", 1), ("milk", 2)]);
    }

    #[test]
    fn invalid_json_is_malformed() {
        for bad in ["", "not json", "{\"1\":", "[1,2,3]", "{}", r#"{"1": 5}"#] {
            let err = normalize(bad).unwrap_err();
            assert!(
                matches!(err, HarvestError::MalformedPayload { .. }),
                "{bad:?} gave {err}"
            );
        }
    }

    #[test]
    fn wrong_field_types_are_malformed() {
        assert!(matches!(
            normalize(r#"{"1":{"name":42}}"#),
            Err(HarvestError::MalformedPayload { .. })
        ));
        assert!(matches!(
            normalize(r#"{"1":{"name":"A","ingredients":"salt"}}"#),
            Err(HarvestError::MalformedPayload { .. })
        ));
        assert!(matches!(
            normalize(r#"{"1":{"name":"A","ingredients":["salt"]}}"#),
            Err(HarvestError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn missing_name_is_malformed_but_unknown_fields_are_ignored() {
        assert!(matches!(
            normalize(r#"{"1":{"slug":"x"}}"#),
            Err(HarvestError::MalformedPayload { .. })
        ));
        let recipe = normalize(r#"{"1":{"name":"A","servings":4,"tags":{"course":["Dinner"]}}}"#);
        assert!(recipe.is_ok());
    }

    #[test]
    fn unsluggable_name_falls_back_to_entry_key() {
        let recipe = normalize(r#"{"4521":{"name":"???"}}"#).unwrap();
        assert_eq!(recipe.slug, "recipe-4521");
    }
}
