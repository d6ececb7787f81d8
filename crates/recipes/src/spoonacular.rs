use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use hearth_core::RecipeSummary;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::{IngredientMatch, IngredientQuery, RecipePage, RecipeQuery, RecipeSearch};

const DEFAULT_BASE_URL: &str = "https://api.spoonacular.com";

#[derive(Debug, Clone)]
pub struct SpoonacularConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl SpoonacularConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// `None` when `HEARTH_SPOONACULAR_API_KEY` is unset or blank.
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("HEARTH_SPOONACULAR_API_KEY")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())?;

        let mut config = Self::new(api_key);
        if let Some(base_url) = env::var("HEARTH_SPOONACULAR_BASE_URL")
            .ok()
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
        {
            config.base_url = base_url;
        }
        Some(config)
    }
}

pub struct SpoonacularClient {
    config: SpoonacularConfig,
    http: Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SpoonacularRecipe>,
    #[serde(default)]
    total_results: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpoonacularRecipe {
    id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    ready_in_minutes: Option<u32>,
    #[serde(default)]
    servings: Option<u32>,
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    diets: Vec<String>,
    #[serde(default)]
    cuisines: Vec<String>,
    #[serde(default)]
    dish_types: Vec<String>,
}

impl From<SpoonacularRecipe> for RecipeSummary {
    fn from(recipe: SpoonacularRecipe) -> Self {
        Self {
            id: recipe.id.to_string(),
            title: recipe.title,
            image: recipe.image.filter(|value| !value.is_empty()),
            ready_in_minutes: recipe.ready_in_minutes,
            servings: recipe.servings,
            source_url: recipe.source_url.filter(|value| !value.is_empty()),
            diets: recipe.diets,
            cuisines: recipe.cuisines,
            dish_types: recipe.dish_types,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngredientHit {
    id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    used_ingredients: Vec<NamedIngredient>,
    #[serde(default)]
    missed_ingredients: Vec<NamedIngredient>,
}

#[derive(Debug, Deserialize)]
struct NamedIngredient {
    #[serde(default)]
    name: String,
}

impl From<IngredientHit> for IngredientMatch {
    fn from(hit: IngredientHit) -> Self {
        let names = |items: Vec<NamedIngredient>| {
            items
                .into_iter()
                .map(|item| item.name)
                .filter(|name| !name.is_empty())
                .collect::<Vec<_>>()
        };
        IngredientMatch::new(
            RecipeSummary {
                id: hit.id.to_string(),
                title: hit.title,
                image: hit.image.filter(|value| !value.is_empty()),
                ..RecipeSummary::default()
            },
            names(hit.used_ingredients),
            names(hit.missed_ingredients),
        )
    }
}

impl SpoonacularClient {
    pub fn new(config: SpoonacularConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(6))
            .timeout(config.timeout)
            .build()
            .context("failed to build recipe service HTTP client")?;
        Ok(Self { config, http })
    }

    fn search_params(&self, query: &RecipeQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("apiKey", self.config.api_key.clone()),
            ("query", query.query.clone()),
            ("number", query.limit().to_string()),
            ("addRecipeInformation", "true".to_string()),
        ];

        if let Some(cuisine) = query.cuisine.as_ref().filter(|v| !v.is_empty()) {
            params.push(("cuisine", cuisine.clone()));
        }
        if let Some(diet) = query.diet.as_ref().filter(|v| !v.is_empty()) {
            params.push(("diet", diet.clone()));
        }
        if !query.intolerances.is_empty() {
            params.push(("intolerances", query.intolerances.join(",")));
        }
        if !query.exclude_ingredients.is_empty() {
            params.push(("excludeIngredients", query.exclude_ingredients.join(",")));
        }
        if let Some(meal_type) = query.meal_type.as_ref().filter(|v| !v.is_empty()) {
            params.push(("type", meal_type.clone()));
        }
        if let Some(max_ready_time) = query.max_ready_time {
            params.push(("maxReadyTime", max_ready_time.to_string()));
        }
        if query.offset > 0 {
            params.push(("offset", query.offset.to_string()));
        }
        if let Some(sort) = query.sort.as_ref().filter(|v| !v.is_empty()) {
            params.push(("sort", sort.clone()));
            params.push(("sortDirection", "desc".to_string()));
        }

        params
    }

    fn ingredient_params(&self, query: &IngredientQuery) -> Vec<(&'static str, String)> {
        vec![
            ("apiKey", self.config.api_key.clone()),
            ("ingredients", query.ingredients.join(",")),
            ("number", query.limit().to_string()),
            ("ranking", query.ranking.code().to_string()),
            ("ignorePantry", query.ignore_pantry.to_string()),
        ]
    }
}

#[async_trait]
impl RecipeSearch for SpoonacularClient {
    fn backend_name(&self) -> &'static str {
        "spoonacular"
    }

    async fn search(&self, query: &RecipeQuery) -> Result<RecipePage> {
        let response = self
            .http
            .get(format!("{}/recipes/complexSearch", self.config.base_url))
            .query(&self.search_params(query))
            .send()
            .await
            .context("recipe search request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("recipe service error: {}", status.as_u16());
        }

        let body: SearchResponse = response
            .json()
            .await
            .context("recipe search response parse failed")?;
        debug!(
            returned = body.results.len(),
            total = body.total_results,
            "recipe search completed"
        );

        Ok(RecipePage {
            total_results: body.total_results,
            recipes: body.results.into_iter().map(RecipeSummary::from).collect(),
        })
    }

    async fn recipe_details(&self, recipe_id: &str) -> Result<Option<RecipeSummary>> {
        if recipe_id.trim().parse::<u64>().is_err() {
            return Ok(None);
        }

        let response = self
            .http
            .get(format!(
                "{}/recipes/{}/information",
                self.config.base_url,
                recipe_id.trim()
            ))
            .query(&[("apiKey", self.config.api_key.as_str())])
            .send()
            .await
            .context("recipe details request failed")?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            anyhow::bail!("recipe service error: {}", status.as_u16());
        }

        let recipe: SpoonacularRecipe = response
            .json()
            .await
            .context("recipe details response parse failed")?;
        Ok(Some(recipe.into()))
    }

    async fn search_by_ingredients(
        &self,
        query: &IngredientQuery,
    ) -> Result<Vec<IngredientMatch>> {
        let response = self
            .http
            .get(format!("{}/recipes/findByIngredients", self.config.base_url))
            .query(&self.ingredient_params(query))
            .send()
            .await
            .context("ingredient search request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("recipe service error: {}", status.as_u16());
        }

        let hits: Vec<IngredientHit> = response
            .json()
            .await
            .context("ingredient search response parse failed")?;
        debug!(returned = hits.len(), "ingredient search completed");

        Ok(hits.into_iter().map(IngredientMatch::from).collect())
    }
}
