//! "What can I cook with what I have" search types.

use std::cmp::Ordering;

use hearth_core::{mentions, RecipeSummary};
use serde::{Deserialize, Deserializer, Serialize};

use crate::MAX_RESULTS;

const DEFAULT_RESULTS: u32 = 10;

/// Staples assumed to be on hand when `ignore_pantry` is set.
const PANTRY_STAPLES: &[&str] = &[
    "water",
    "salt",
    "pepper",
    "black pepper",
    "oil",
    "olive oil",
    "vegetable oil",
    "flour",
    "sugar",
    "butter",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngredientRanking {
    #[default]
    MaximizeUsed,
    MinimizeMissing,
}

impl IngredientRanking {
    /// Numeric form the recipe service expects.
    pub fn code(self) -> u8 {
        match self {
            Self::MaximizeUsed => 1,
            Self::MinimizeMissing => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientQuery {
    #[serde(default, deserialize_with = "ingredient_list")]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub ranking: IngredientRanking,
    #[serde(default = "default_ignore_pantry")]
    pub ignore_pantry: bool,
}

fn default_ignore_pantry() -> bool {
    true
}

/// Accepts `"chicken, rice"` as well as `["chicken", "rice"]`.
fn ingredient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Joined(String),
        Items(Vec<String>),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Joined(joined) => split_ingredients(&joined),
        Raw::Items(items) => items
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
    })
}

pub fn split_ingredients(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl Default for IngredientQuery {
    fn default() -> Self {
        Self {
            ingredients: Vec::new(),
            number: None,
            ranking: IngredientRanking::default(),
            ignore_pantry: true,
        }
    }
}

impl IngredientQuery {
    pub fn new<I, S>(ingredients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ingredients: ingredients.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_ranking(mut self, ranking: IngredientRanking) -> Self {
        self.ranking = ranking;
        self
    }

    pub fn with_number(mut self, number: u32) -> Self {
        self.number = Some(number);
        self
    }

    pub fn limit(&self) -> u32 {
        self.number.unwrap_or(DEFAULT_RESULTS).clamp(1, MAX_RESULTS)
    }
}

/// A recipe plus which of the offered ingredients it uses and what is still needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientMatch {
    #[serde(flatten)]
    pub recipe: RecipeSummary,
    pub used_ingredient_count: u32,
    pub missed_ingredient_count: u32,
    pub used_ingredients: Vec<String>,
    pub missed_ingredients: Vec<String>,
}

impl IngredientMatch {
    pub fn new(recipe: RecipeSummary, used: Vec<String>, missed: Vec<String>) -> Self {
        Self {
            recipe,
            used_ingredient_count: used.len() as u32,
            missed_ingredient_count: missed.len() as u32,
            used_ingredients: used,
            missed_ingredients: missed,
        }
    }
}

/// Splits a recipe's ingredient list against what the caller has.
/// `None` when the recipe uses none of them.
pub(crate) fn match_recipe(
    recipe: &RecipeSummary,
    recipe_ingredients: &[String],
    query: &IngredientQuery,
) -> Option<IngredientMatch> {
    let mut used = Vec::new();
    let mut missed = Vec::new();

    for ingredient in recipe_ingredients {
        if query.ingredients.iter().any(|have| mentions(ingredient, have)) {
            used.push(ingredient.clone());
        } else if !(query.ignore_pantry && is_pantry_staple(ingredient)) {
            missed.push(ingredient.clone());
        }
    }

    if used.is_empty() {
        None
    } else {
        Some(IngredientMatch::new(recipe.clone(), used, missed))
    }
}

fn is_pantry_staple(ingredient: &str) -> bool {
    let ingredient = ingredient.trim().to_lowercase();
    PANTRY_STAPLES.contains(&ingredient.as_str())
}

pub(crate) fn rank(matches: &mut [IngredientMatch], ranking: IngredientRanking) {
    matches.sort_by(|left, right| {
        let used = right.used_ingredient_count.cmp(&left.used_ingredient_count);
        let missed = left
            .missed_ingredient_count
            .cmp(&right.missed_ingredient_count);
        let primary = match ranking {
            IngredientRanking::MaximizeUsed => used.then(missed),
            IngredientRanking::MinimizeMissing => missed.then(used),
        };
        if primary == Ordering::Equal {
            left.recipe.title.cmp(&right.recipe.title)
        } else {
            primary
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(title: &str) -> RecipeSummary {
        RecipeSummary {
            id: title.to_lowercase(),
            title: title.to_string(),
            ..RecipeSummary::default()
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn decodes_comma_joined_or_listed_ingredients() {
        let joined: IngredientQuery =
            serde_json::from_str(r#"{"ingredients": "chicken, broccoli ,,rice"}"#).unwrap();
        assert_eq!(joined.ingredients, vec!["chicken", "broccoli", "rice"]);
        assert!(joined.ignore_pantry);
        assert_eq!(joined.ranking.code(), 1);

        let listed: IngredientQuery = serde_json::from_str(
            r#"{"ingredients": ["eggs"], "ranking": "minimize_missing", "ignorePantry": false}"#,
        )
        .unwrap();
        assert_eq!(listed.ingredients, vec!["eggs"]);
        assert_eq!(listed.ranking.code(), 2);
        assert!(!listed.ignore_pantry);
    }

    #[test]
    fn splits_used_and_missed_skipping_pantry() {
        let query = IngredientQuery::new(["chicken", "broccoli"]);
        let found = match_recipe(
            &summary("Chicken Stir Fry"),
            &strings(&["chicken breast", "broccoli", "soy sauce", "salt"]),
            &query,
        )
        .unwrap();

        assert_eq!(found.used_ingredients, vec!["chicken breast", "broccoli"]);
        assert_eq!(found.missed_ingredients, vec!["soy sauce"]);
        assert_eq!(found.used_ingredient_count, 2);

        assert!(match_recipe(&summary("Toast"), &strings(&["bread"]), &query).is_none());
    }

    #[test]
    fn ranking_changes_the_order() {
        let mut matches = vec![
            IngredientMatch::new(summary("A"), strings(&["x", "y"]), strings(&["p", "q"])),
            IngredientMatch::new(summary("B"), strings(&["x"]), Vec::new()),
        ];

        rank(&mut matches, IngredientRanking::MaximizeUsed);
        assert_eq!(matches[0].recipe.title, "A");

        rank(&mut matches, IngredientRanking::MinimizeMissing);
        assert_eq!(matches[0].recipe.title, "B");
    }
}
