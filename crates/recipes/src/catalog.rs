use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use hearth_core::{mentions, RecipeSummary};
use serde::Deserialize;
use tracing::info;
use walkdir::WalkDir;

use crate::ingredients::{match_recipe, rank};
use crate::tokenize::tokenize;
use crate::{IngredientMatch, IngredientQuery, RecipePage, RecipeQuery, RecipeSearch};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogEntry {
    #[serde(flatten)]
    summary: RecipeSummary,
    #[serde(default)]
    ingredients: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    Many(Vec<CatalogEntry>),
    One(CatalogEntry),
}

#[derive(Debug, Clone)]
struct IndexedRecipe {
    summary: RecipeSummary,
    ingredients: Vec<String>,
    keywords: HashSet<String>,
}

/// Offline recipe source backed by JSON files in a directory tree.
#[derive(Debug, Clone, Default)]
pub struct LocalCatalog {
    recipes: Vec<IndexedRecipe>,
}

impl LocalCatalog {
    pub fn from_dir(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref();
        if !root.exists() {
            info!(path = %root.display(), "recipe catalog directory missing; catalog is empty");
            return Ok(Self::default());
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(root)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().and_then(|ext| ext.to_str()) == Some("json"))
        {
            let path = entry.path();
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed reading recipe file: {}", path.display()))?;
            let file: CatalogFile = serde_json::from_str(&raw)
                .with_context(|| format!("invalid recipe file: {}", path.display()))?;
            match file {
                CatalogFile::Many(many) => entries.extend(many),
                CatalogFile::One(one) => entries.push(one),
            }
        }

        let catalog = Self::from_entries(entries);
        info!(recipes = catalog.len(), path = %root.display(), "recipe catalog loaded");
        Ok(catalog)
    }

    pub fn from_recipes(recipes: Vec<(RecipeSummary, Vec<String>)>) -> Self {
        Self::from_entries(
            recipes
                .into_iter()
                .map(|(summary, ingredients)| CatalogEntry {
                    summary,
                    ingredients,
                })
                .collect(),
        )
    }

    fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        let recipes = entries
            .into_iter()
            .filter(|entry| !entry.summary.id.trim().is_empty())
            .map(|entry| {
                let searchable = format!(
                    "{} {} {} {}",
                    entry.summary.title,
                    entry.ingredients.join(" "),
                    entry.summary.dish_types.join(" "),
                    entry.summary.cuisines.join(" ")
                );
                IndexedRecipe {
                    keywords: tokenize(&searchable).into_iter().collect(),
                    summary: entry.summary,
                    ingredients: entry.ingredients,
                }
            })
            .collect();

        Self { recipes }
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    fn admits(recipe: &IndexedRecipe, query: &RecipeQuery) -> bool {
        let summary = &recipe.summary;

        if let Some(diet) = query.diet.as_deref() {
            if !summary.diets.iter().any(|tag| tag.eq_ignore_ascii_case(diet)) {
                return false;
            }
        }
        if let Some(cuisine) = query.cuisine.as_deref() {
            if !summary.cuisines.iter().any(|tag| tag.eq_ignore_ascii_case(cuisine)) {
                return false;
            }
        }
        if let Some(meal_type) = query.meal_type.as_deref() {
            if !summary.dish_types.is_empty()
                && !summary.dish_types.iter().any(|tag| tag.eq_ignore_ascii_case(meal_type))
            {
                return false;
            }
        }
        if let (Some(max), Some(ready)) = (query.max_ready_time, summary.ready_in_minutes) {
            if ready > max {
                return false;
            }
        }

        !query
            .intolerances
            .iter()
            .chain(query.exclude_ingredients.iter())
            .any(|term| {
                mentions(&summary.title, term)
                    || recipe
                        .ingredients
                        .iter()
                        .any(|ingredient| mentions(ingredient, term))
            })
    }
}

#[async_trait]
impl RecipeSearch for LocalCatalog {
    fn backend_name(&self) -> &'static str {
        "local-catalog"
    }

    async fn search(&self, query: &RecipeQuery) -> Result<RecipePage> {
        let query_tokens = tokenize(&query.query).into_iter().collect::<HashSet<_>>();

        let mut scored = self
            .recipes
            .iter()
            .filter(|recipe| Self::admits(recipe, query))
            .map(|recipe| {
                let score = if query_tokens.is_empty() {
                    1.0
                } else {
                    keyword_score(&query_tokens, &recipe.keywords)
                };
                (score, recipe)
            })
            .filter(|(score, _)| *score > 0.0)
            .collect::<Vec<_>>();

        scored.sort_by(|(a, left), (b, right)| {
            b.partial_cmp(a)
                .unwrap_or(Ordering::Equal)
                .then_with(|| left.summary.title.cmp(&right.summary.title))
        });

        Ok(RecipePage {
            total_results: scored.len() as u32,
            recipes: scored
                .into_iter()
                .skip(query.offset as usize)
                .take(query.limit() as usize)
                .map(|(_, recipe)| recipe.summary.clone())
                .collect(),
        })
    }

    async fn recipe_details(&self, recipe_id: &str) -> Result<Option<RecipeSummary>> {
        Ok(self
            .recipes
            .iter()
            .find(|recipe| recipe.summary.id == recipe_id)
            .map(|recipe| recipe.summary.clone()))
    }

    async fn search_by_ingredients(
        &self,
        query: &IngredientQuery,
    ) -> Result<Vec<IngredientMatch>> {
        let mut matches = self
            .recipes
            .iter()
            .filter_map(|recipe| match_recipe(&recipe.summary, &recipe.ingredients, query))
            .collect::<Vec<_>>();
        rank(&mut matches, query.ranking);
        matches.truncate(query.limit() as usize);
        Ok(matches)
    }
}

fn keyword_score(query_tokens: &HashSet<String>, recipe_tokens: &HashSet<String>) -> f32 {
    if query_tokens.is_empty() || recipe_tokens.is_empty() {
        return 0.0;
    }

    let overlap = query_tokens
        .iter()
        .filter(|token| recipe_tokens.contains(*token))
        .count() as f32;

    overlap / query_tokens.len() as f32
}
