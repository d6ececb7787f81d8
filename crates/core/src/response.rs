//! Tolerant decoding of reasoning-engine plan output.
//!
//! The engine is an untrusted text producer: the JSON object may be wrapped
//! in prose, fields may be missing or mistyped. Decoding fails only when no
//! object can be found or the object itself is not valid JSON; everything
//! else degrades to defaults plus a [`PlanWarning`].

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ParseError;
use crate::models::{DayOfWeek, MealSource, MealType};
use crate::text::slugify;
use crate::warnings::PlanWarning;

/// One decoded `meals` entry before it is placed into the plan week.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMeal {
    pub index: usize,
    pub date: Option<NaiveDate>,
    pub day: Option<DayOfWeek>,
    pub meal_type: MealType,
    pub recipe_id: String,
    pub recipe_name: String,
    pub recipe_image: Option<String>,
    pub ready_in_minutes: Option<u32>,
    pub servings: Option<u32>,
    pub source_url: Option<String>,
    pub source: MealSource,
    pub is_user_meal: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanResponse {
    pub meals: Vec<PlannedMeal>,
    pub explanation: String,
    pub warnings: Vec<PlanWarning>,
}

#[derive(Debug, Deserialize)]
struct RawPlanResponse {
    #[serde(default)]
    meals: Vec<Value>,
    #[serde(default)]
    explanation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMealEntry {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    day: Option<String>,
    #[serde(default)]
    meal_type: Option<String>,
    #[serde(default, alias = "id")]
    recipe_id: Option<Value>,
    #[serde(default, alias = "title")]
    recipe_name: Option<String>,
    #[serde(default, alias = "image")]
    recipe_image: Option<String>,
    #[serde(default)]
    ready_in_minutes: Option<Value>,
    #[serde(default)]
    servings: Option<Value>,
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    is_user_meal: Option<bool>,
}

/// Slice from the first `{` to the last `}` of `raw`.
pub fn extract_json_object(raw: &str) -> Result<&str, ParseError> {
    let start = raw.find('{').ok_or(ParseError::NoStructureFound)?;
    let end = raw.rfind('}').ok_or(ParseError::NoStructureFound)?;
    if end <= start {
        return Err(ParseError::NoStructureFound);
    }
    Ok(&raw[start..=end])
}

pub fn parse_plan_response(raw: &str) -> Result<PlanResponse, ParseError> {
    let object = extract_json_object(raw)?;
    let decoded: RawPlanResponse =
        serde_json::from_str(object).map_err(|error| ParseError::Malformed(error.to_string()))?;

    let mut response = PlanResponse {
        meals: Vec::with_capacity(decoded.meals.len()),
        explanation: decoded.explanation.unwrap_or_default().trim().to_string(),
        warnings: Vec::new(),
    };

    for (index, value) in decoded.meals.into_iter().enumerate() {
        let entry = match serde_json::from_value::<RawMealEntry>(value) {
            Ok(entry) => entry,
            Err(error) => {
                response.warnings.push(PlanWarning::MalformedEntry {
                    index,
                    reason: error.to_string(),
                });
                continue;
            }
        };

        if let Some(meal) = normalize_entry(index, entry, &mut response.warnings) {
            response.meals.push(meal);
        }
    }

    Ok(response)
}

fn normalize_entry(
    index: usize,
    entry: RawMealEntry,
    warnings: &mut Vec<PlanWarning>,
) -> Option<PlannedMeal> {
    let Some(meal_type) = entry.meal_type.as_deref().and_then(MealType::parse) else {
        warnings.push(PlanWarning::UnknownMealType {
            index,
            value: entry.meal_type,
        });
        return None;
    };

    let Some(recipe_name) = non_empty(entry.recipe_name) else {
        warnings.push(PlanWarning::MissingRecipeName { index });
        return None;
    };

    let recipe_id = match entry.recipe_id {
        Some(Value::String(id)) if !id.trim().is_empty() => id.trim().to_string(),
        Some(Value::Number(id)) => id.to_string(),
        _ => format!("user-{}", slugify(&recipe_name)),
    };

    let (source, is_user_meal) =
        reconcile_source(index, entry.source.as_deref(), entry.is_user_meal, warnings);

    Some(PlannedMeal {
        index,
        date: entry
            .date
            .as_deref()
            .and_then(|value| NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()),
        day: entry.day.as_deref().and_then(DayOfWeek::parse),
        meal_type,
        recipe_id,
        recipe_name,
        recipe_image: non_empty(entry.recipe_image),
        ready_in_minutes: entry.ready_in_minutes.as_ref().and_then(as_count),
        servings: entry.servings.as_ref().and_then(as_count),
        source_url: non_empty(entry.source_url),
        source,
        is_user_meal,
    })
}

/// `source` is authoritative; `isUserMeal` is rewritten to agree with it.
fn reconcile_source(
    index: usize,
    source: Option<&str>,
    is_user_meal: Option<bool>,
    warnings: &mut Vec<PlanWarning>,
) -> (MealSource, bool) {
    match (source.and_then(MealSource::parse), is_user_meal) {
        (Some(source), Some(flag)) => {
            if flag != source.is_user() {
                warnings.push(PlanWarning::SourceMismatch {
                    index,
                    source,
                    is_user_meal: flag,
                });
            }
            (source, source.is_user())
        }
        (Some(source), None) => (source, source.is_user()),
        (None, Some(true)) => (MealSource::UserPreference, true),
        (None, _) => (MealSource::AiSuggest, false),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty() && value != "null")
}

fn as_count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|v| *v >= 0.0).map(|v| v.round() as u64))
            .and_then(|v| u32::try_from(v).ok()),
        Value::String(text) => text.trim().parse::<u32>().ok(),
        _ => None,
    }
}
