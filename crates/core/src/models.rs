use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MealSuggestionMode {
    UserPreference,
    AiSuggest,
    #[default]
    AiAndUser,
}

impl MealSuggestionMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "user_preference" | "user" | "user_preferences" => Some(Self::UserPreference),
            "ai_suggest" | "ai" | "ai_suggestions" => Some(Self::AiSuggest),
            "ai_and_user" | "mixed" | "both" => Some(Self::AiAndUser),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserPreference => "user_preference",
            Self::AiSuggest => "ai_suggest",
            Self::AiAndUser => "ai_and_user",
        }
    }

    /// Whether recipe search is allowed to pick dishes in this mode.
    pub fn searches_for_dishes(self) -> bool {
        !matches!(self, Self::UserPreference)
    }
}

impl<'de> Deserialize<'de> for MealSuggestionMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(Self::parse).unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CookingTime {
    Quick,
    #[default]
    Medium,
    Elaborate,
}

impl CookingTime {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "quick" | "fast" => Some(Self::Quick),
            "medium" | "moderate" => Some(Self::Medium),
            "elaborate" | "long" => Some(Self::Elaborate),
            _ => None,
        }
    }

    pub fn time_band(self) -> &'static str {
        match self {
            Self::Quick => "under 20 minutes",
            Self::Medium => "20–45 minutes",
            Self::Elaborate => "45+ minutes",
        }
    }

    /// Upper bound handed to recipe search; elaborate cooking has none.
    pub fn max_ready_minutes(self) -> Option<u32> {
        match self {
            Self::Quick => Some(20),
            Self::Medium => Some(45),
            Self::Elaborate => None,
        }
    }
}

impl<'de> Deserialize<'de> for CookingTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(Self::parse).unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snacks,
}

impl MealType {
    pub const ALL: [MealType; 4] = [Self::Breakfast, Self::Lunch, Self::Dinner, Self::Snacks];
    pub const REQUIRED: [MealType; 3] = [Self::Breakfast, Self::Lunch, Self::Dinner];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "breakfast" => Some(Self::Breakfast),
            "lunch" => Some(Self::Lunch),
            "dinner" | "supper" => Some(Self::Dinner),
            "snacks" | "snack" => Some(Self::Snacks),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
            Self::Snacks => "snacks",
        }
    }

    pub fn is_required(self) -> bool {
        !matches!(self, Self::Snacks)
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "monday" | "mon" => Some(Self::Monday),
            "tuesday" | "tue" | "tues" => Some(Self::Tuesday),
            "wednesday" | "wed" => Some(Self::Wednesday),
            "thursday" | "thu" | "thurs" => Some(Self::Thursday),
            "friday" | "fri" => Some(Self::Friday),
            "saturday" | "sat" => Some(Self::Saturday),
            "sunday" | "sun" => Some(Self::Sunday),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monday => "monday",
            Self::Tuesday => "tuesday",
            Self::Wednesday => "wednesday",
            Self::Thursday => "thursday",
            Self::Friday => "friday",
            Self::Saturday => "saturday",
            Self::Sunday => "sunday",
        }
    }

    /// Days elapsed since monday.
    pub fn offset(self) -> i64 {
        match self {
            Self::Monday => 0,
            Self::Tuesday => 1,
            Self::Wednesday => 2,
            Self::Thursday => 3,
            Self::Friday => 4,
            Self::Saturday => 5,
            Self::Sunday => 6,
        }
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(value: Weekday) -> Self {
        match value {
            Weekday::Mon => Self::Monday,
            Weekday::Tue => Self::Tuesday,
            Weekday::Wed => Self::Wednesday,
            Weekday::Thu => Self::Thursday,
            Weekday::Fri => Self::Friday,
            Weekday::Sat => Self::Saturday,
            Weekday::Sun => Self::Sunday,
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealSource {
    UserPreference,
    AiSuggest,
}

impl MealSource {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "user_preference" | "user" | "user_meal" => Some(Self::UserPreference),
            "ai_suggest" | "ai" | "spoonacular" => Some(Self::AiSuggest),
            _ => None,
        }
    }

    pub fn is_user(self) -> bool {
        matches!(self, Self::UserPreference)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealPreferences {
    #[serde(default)]
    pub breakfast: Vec<String>,
    #[serde(default)]
    pub lunch: Vec<String>,
    #[serde(default)]
    pub dinner: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyMember {
    #[serde(default)]
    pub id: String,
    #[serde(default = "unknown_member_name")]
    pub name: String,
    #[serde(default)]
    pub age: Option<u16>,
    #[serde(default)]
    pub dietary_restrictions: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub dislikes: Vec<String>,
    #[serde(default = "default_same_as_adults")]
    pub same_as_adults: bool,
    #[serde(default)]
    pub meal_preferences: Option<MealPreferences>,
}

fn unknown_member_name() -> String {
    "Unknown".to_string()
}

fn default_same_as_adults() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseholdPreferences {
    #[serde(default)]
    pub meal_suggestion_mode: MealSuggestionMode,
    #[serde(default)]
    pub cooking_time: CookingTime,
    #[serde(default)]
    pub typical_breakfast: Vec<String>,
    #[serde(default)]
    pub typical_lunch: Vec<String>,
    #[serde(default)]
    pub typical_dinner: Vec<String>,
    #[serde(default)]
    pub typical_snacks: Vec<String>,
    #[serde(default)]
    pub additional_preferences: String,
}

impl HouseholdPreferences {
    pub fn typical_for(&self, meal_type: MealType) -> &[String] {
        match meal_type {
            MealType::Breakfast => &self.typical_breakfast,
            MealType::Lunch => &self.typical_lunch,
            MealType::Dinner => &self.typical_dinner,
            MealType::Snacks => &self.typical_snacks,
        }
    }

    pub fn has_typical_meals(&self) -> bool {
        MealType::ALL
            .iter()
            .any(|meal_type| !self.typical_for(*meal_type).is_empty())
    }
}

/// A member who eats separately from the adults.
///
/// Ordered by id, then name, age and meal preferences.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRef {
    pub id: String,
    pub name: String,
    pub age: Option<u16>,
    pub meal_preferences: Option<MealPreferences>,
}

impl From<&FamilyMember> for MemberRef {
    fn from(member: &FamilyMember) -> Self {
        Self {
            id: member.id.clone(),
            name: member.name.clone(),
            age: member.age,
            meal_preferences: member.meal_preferences.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedNeeds {
    pub all_restrictions: BTreeSet<String>,
    pub all_allergies: BTreeSet<String>,
    pub all_dislikes: BTreeSet<String>,
    pub members_with_different_meals: Vec<MemberRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealSlot {
    pub date: NaiveDate,
    pub day: DayOfWeek,
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealPlan {
    pub household_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub meals: Vec<MealSlot>,
    pub meal_suggestion_mode: MealSuggestionMode,
    pub generated_by: String,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub explanation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub ready_in_minutes: Option<u32>,
    #[serde(default)]
    pub servings: Option<u32>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub diets: Vec<String>,
    #[serde(default)]
    pub cuisines: Vec<String>,
    #[serde(default)]
    pub dish_types: Vec<String>,
}

/// A recipe offered to the reasoning engine for one meal type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeCandidate {
    pub meal_type: MealType,
    pub recipe: RecipeSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseholdContext {
    pub household_id: String,
    pub members: Vec<FamilyMember>,
    pub preferences: HouseholdPreferences,
    pub needs: AggregatedNeeds,
}

/// System and user text for one reasoning-engine call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnginePrompt {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatInput {
    pub household_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub response: String,
    pub household_id: String,
}
