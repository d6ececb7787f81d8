mod catalog;
mod ingredients;
mod spoonacular;
mod tokenize;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use hearth_core::{AggregatedNeeds, HouseholdPreferences, MealType, RecipeSummary};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub use catalog::LocalCatalog;
pub use ingredients::{split_ingredients, IngredientMatch, IngredientQuery, IngredientRanking};
pub use spoonacular::{SpoonacularClient, SpoonacularConfig};

pub const MAX_RESULTS: u32 = 100;
const DEFAULT_RESULTS: u32 = 10;

/// Recipe-service search parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeQuery {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub cuisine: Option<String>,
    #[serde(default)]
    pub diet: Option<String>,
    #[serde(default)]
    pub intolerances: Vec<String>,
    #[serde(default)]
    pub exclude_ingredients: Vec<String>,
    #[serde(default)]
    pub meal_type: Option<String>,
    #[serde(default)]
    pub max_ready_time: Option<u32>,
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub sort: Option<String>,
}

impl RecipeQuery {
    /// Floor constraints for one meal type: diet, allergies, dislikes and
    /// the household's cooking-time ceiling.
    pub fn for_household(
        needs: &AggregatedNeeds,
        prefs: &HouseholdPreferences,
        meal_type: MealType,
    ) -> Self {
        Self {
            query: String::new(),
            cuisine: None,
            diet: needs.diet().map(str::to_string),
            intolerances: needs.all_allergies.iter().cloned().collect(),
            exclude_ingredients: needs.all_dislikes.iter().cloned().collect(),
            meal_type: Some(dish_type_for(meal_type).to_string()),
            max_ready_time: prefs.cooking_time.max_ready_minutes(),
            number: Some(DEFAULT_RESULTS),
            offset: 0,
            sort: Some("random".to_string()),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_number(mut self, number: u32) -> Self {
        self.number = Some(number);
        self
    }

    /// Requested result count, capped at [`MAX_RESULTS`].
    pub fn limit(&self) -> u32 {
        self.number.unwrap_or(DEFAULT_RESULTS).clamp(1, MAX_RESULTS)
    }
}

/// Recipe-service dish type used when searching for a meal slot.
pub fn dish_type_for(meal_type: MealType) -> &'static str {
    match meal_type {
        MealType::Breakfast => "breakfast",
        MealType::Lunch | MealType::Dinner => "main course",
        MealType::Snacks => "snack",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipePage {
    pub total_results: u32,
    pub recipes: Vec<RecipeSummary>,
}

#[async_trait]
pub trait RecipeSearch: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn search(&self, query: &RecipeQuery) -> Result<RecipePage>;

    async fn recipe_details(&self, recipe_id: &str) -> Result<Option<RecipeSummary>>;

    /// Recipes that use the given ingredients, best matches first.
    async fn search_by_ingredients(&self, query: &IngredientQuery) -> Result<Vec<IngredientMatch>>;
}

/// Spoonacular when a credential is configured, otherwise the offline catalog.
pub fn build_recipe_search(
    spoonacular: Option<SpoonacularConfig>,
    catalog_dir: impl AsRef<Path>,
) -> Result<Arc<dyn RecipeSearch>> {
    Ok(match spoonacular {
        Some(config) => Arc::new(SpoonacularClient::new(config)?),
        None => Arc::new(LocalCatalog::from_dir(catalog_dir)?),
    })
}

/// Fixed recipe list for tests; records every query it receives.
#[derive(Debug, Default)]
pub struct StaticRecipes {
    recipes: Vec<RecipeSummary>,
    fail_with: Option<String>,
    queries: Mutex<Vec<RecipeQuery>>,
}

impl StaticRecipes {
    pub fn new(recipes: Vec<RecipeSummary>) -> Self {
        Self {
            recipes,
            ..Self::default()
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn queries(&self) -> Vec<RecipeQuery> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl RecipeSearch for StaticRecipes {
    fn backend_name(&self) -> &'static str {
        "static"
    }

    async fn search(&self, query: &RecipeQuery) -> Result<RecipePage> {
        self.queries.lock().push(query.clone());
        if let Some(message) = self.fail_with.as_ref() {
            anyhow::bail!("{message}");
        }

        let needle = query.query.trim().to_lowercase();
        let recipes = self
            .recipes
            .iter()
            .filter(|recipe| needle.is_empty() || recipe.title.to_lowercase().contains(&needle))
            .cloned()
            .collect::<Vec<_>>();

        Ok(RecipePage {
            total_results: recipes.len() as u32,
            recipes: recipes.into_iter().take(query.limit() as usize).collect(),
        })
    }

    async fn recipe_details(&self, recipe_id: &str) -> Result<Option<RecipeSummary>> {
        if let Some(message) = self.fail_with.as_ref() {
            anyhow::bail!("{message}");
        }
        Ok(self.recipes.iter().find(|recipe| recipe.id == recipe_id).cloned())
    }

    async fn search_by_ingredients(
        &self,
        query: &IngredientQuery,
    ) -> Result<Vec<IngredientMatch>> {
        if let Some(message) = self.fail_with.as_ref() {
            anyhow::bail!("{message}");
        }

        let mut matches = self
            .recipes
            .iter()
            .filter_map(|recipe| {
                let used = query
                    .ingredients
                    .iter()
                    .filter(|have| hearth_core::mentions(&recipe.title, have))
                    .cloned()
                    .collect::<Vec<_>>();
                (!used.is_empty()).then(|| IngredientMatch::new(recipe.clone(), used, Vec::new()))
            })
            .collect::<Vec<_>>();
        ingredients::rank(&mut matches, query.ranking);
        matches.truncate(query.limit() as usize);
        Ok(matches)
    }
}
