//! Plan synthesis: shaping the generation request and turning the
//! reasoning engine's reply into a validated [`MealPlan`].
//!
//! No generation happens here. The request is text plus the structured
//! inputs it was rendered from; the reply is decoded, placed into the
//! week, checked for coverage and screened by the [`ConstraintGuard`].

use std::fmt::Write as _;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::ParseError;
use crate::guard::ConstraintGuard;
use crate::models::{
    AggregatedNeeds, CookingTime, EnginePrompt, FamilyMember, HouseholdContext,
    HouseholdPreferences, MealPlan, MealSuggestionMode, MealType, RecipeCandidate,
};
use crate::response::parse_plan_response;
use crate::warnings::PlanWarning;
use crate::week::PlanWeek;

pub const DEFAULT_PLAN_TTL_DAYS: i64 = 90;

const PLAN_SYSTEM_PROMPT: &str = "You are a meal planning engine for family households. \
You receive the household's constraints and preferences and answer with one JSON object \
describing a weekly meal plan. Never include an ingredient any member is allergic to. \
Respond with valid JSON only.";

const CHAT_SYSTEM_PROMPT: &str = "You are a warm, practical meal planning assistant for a \
family household. Allergies are non-negotiable; never suggest a dish containing one. \
Respect dietary restrictions, keep within the household's cooking time, and prefer \
variety. Be concise and explain your reasoning when you recommend something.";

const OUTPUT_SCHEMA: &str = r#"{
  "meals": [
    {
      "date": "YYYY-MM-DD",
      "day": "monday",
      "mealType": "breakfast|lunch|dinner|snacks",
      "recipeId": "string",
      "recipeName": "string",
      "recipeImage": "url or null",
      "readyInMinutes": "number or null",
      "servings": "number or null",
      "sourceUrl": "url or null",
      "source": "user_preference|ai_suggest",
      "isUserMeal": "true when source is user_preference, otherwise false"
    }
  ],
  "explanation": "how the household preferences shaped the plan"
}"#;

/// Everything the reasoning engine needs to produce one week of meals.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub week: PlanWeek,
    pub mode: MealSuggestionMode,
    pub cooking_time: CookingTime,
    pub diet: Option<&'static str>,
    pub member_lines: Vec<String>,
    pub restrictions: Vec<String>,
    pub allergies: Vec<String>,
    pub dislikes: Vec<String>,
    pub typical_meals: Vec<(MealType, Vec<String>)>,
    pub additional_preferences: String,
    pub candidates: Vec<RecipeCandidate>,
}

pub fn build_generation_request(
    needs: &AggregatedNeeds,
    prefs: &HouseholdPreferences,
    members: &[FamilyMember],
    week: PlanWeek,
) -> GenerationRequest {
    GenerationRequest {
        week,
        mode: prefs.meal_suggestion_mode,
        cooking_time: prefs.cooking_time,
        diet: needs.diet(),
        member_lines: members.iter().map(describe_member).collect(),
        restrictions: needs.all_restrictions.iter().cloned().collect(),
        allergies: needs.all_allergies.iter().cloned().collect(),
        dislikes: needs.all_dislikes.iter().cloned().collect(),
        typical_meals: MealType::ALL
            .iter()
            .map(|meal_type| (*meal_type, prefs.typical_for(*meal_type).to_vec()))
            .filter(|(_, meals)| !meals.is_empty())
            .collect(),
        additional_preferences: prefs.additional_preferences.clone(),
        candidates: Vec::new(),
    }
}

impl GenerationRequest {
    pub fn with_candidates(mut self, candidates: Vec<RecipeCandidate>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn time_band(&self) -> &'static str {
        self.cooking_time.time_band()
    }

    pub fn to_prompt(&self) -> EnginePrompt {
        EnginePrompt {
            system: PLAN_SYSTEM_PROMPT.to_string(),
            user: self.render(),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::with_capacity(4096);
        let start = self.week.start_date();
        let end = self.week.end_date();

        let _ = writeln!(
            out,
            "Plan every meal for this household from monday {start} through sunday {end}.\n"
        );

        out.push_str("## Household members\n");
        push_lines(&mut out, &self.member_lines, "No members on file");

        let _ = writeln!(
            out,
            "\n## Cooking time\nKeep each recipe {}.\n",
            self.time_band()
        );

        out.push_str("## Household constraints\n");
        let _ = writeln!(
            out,
            "- Dietary restrictions: {}",
            join_or_none(&self.restrictions)
        );
        let _ = writeln!(
            out,
            "- Allergies (must never appear): {}",
            join_or_none(&self.allergies)
        );
        let _ = writeln!(
            out,
            "- Dislikes (avoid where possible): {}",
            join_or_none(&self.dislikes)
        );
        if let Some(diet) = self.diet {
            let _ = writeln!(out, "- Recipe search diet filter: {diet}");
        }

        out.push_str("\n## Typical meals\n");
        let typical = self
            .typical_meals
            .iter()
            .map(|(meal_type, meals)| format!("- {}: {}", meal_type, meals.join(", ")))
            .collect::<Vec<_>>();
        push_lines(&mut out, &typical, "No typical meals on file");

        out.push_str("\n## Household notes\n");
        if self.additional_preferences.trim().is_empty() {
            out.push_str("None\n");
        } else {
            let _ = writeln!(out, "{}", self.additional_preferences);
        }

        let _ = writeln!(
            out,
            "\n## Generation mode: {}\n{}",
            self.mode.as_str(),
            mode_instruction(self.mode)
        );

        if !self.candidates.is_empty() {
            out.push_str("\n## Recipe candidates\n");
            out.push_str("Recipes from the recipe service that already satisfy the household filters:\n");
            for candidate in &self.candidates {
                let _ = writeln!(out, "- {}", describe_candidate(candidate));
            }
        }

        out.push_str("\n## Requirements\n");
        out.push_str("1. Cover all seven days in order:");
        for (date, day) in self.week.days() {
            let _ = write!(out, " {day} {date};");
        }
        out.push('\n');
        out.push_str("2. Every day needs breakfast, lunch and dinner. Snacks are optional.\n");
        out.push_str("3. Read the household notes first; where they name a day or a meal, plan exactly that.\n");
        out.push_str("4. Never plan a dish containing a listed allergy.\n");
        out.push_str("5. Typical meals without a recipe-service id use recipeId \"user-<meal-name>\".\n");
        out.push_str("6. Vary dishes across the week.\n");

        let _ = write!(
            out,
            "\nReturn the plan as a single JSON object in exactly this shape:\n{OUTPUT_SCHEMA}\n"
        );

        out
    }
}

fn mode_instruction(mode: MealSuggestionMode) -> &'static str {
    match mode {
        MealSuggestionMode::UserPreference => {
            "Every meal must be one of the household's typical meals for that meal type. \
Recipe search may only supply details such as an image or cooking time for those meals; \
it never chooses the dish. Use the household notes to decide which typical meal goes on which day. \
Mark these meals source \"user_preference\"."
        }
        MealSuggestionMode::AiSuggest => {
            "Choose most meals from recipe search results. The typical meals only show which \
flavours and styles the household enjoys. Let the household notes steer the selection. \
Mark these meals source \"ai_suggest\"."
        }
        MealSuggestionMode::AiAndUser => {
            "Blend both sources: use typical meals on some days, especially where the household \
notes ask for them, and recipe search results on the others for variety. Mark each meal's \
source accordingly."
        }
    }
}

fn describe_member(member: &FamilyMember) -> String {
    let mut line = format!("- {}", member.name);
    if let Some(age) = member.age {
        let _ = write!(line, " (age {age})");
    }
    if !member.dietary_restrictions.is_empty() {
        let _ = write!(line, ", diet: {}", member.dietary_restrictions.join(", "));
    }
    if !member.allergies.is_empty() {
        let _ = write!(line, ", allergies: {}", member.allergies.join(", "));
    }
    if !member.likes.is_empty() {
        let _ = write!(line, ", likes: {}", member.likes.join(", "));
    }
    if !member.dislikes.is_empty() {
        let _ = write!(line, ", dislikes: {}", member.dislikes.join(", "));
    }
    if !member.same_as_adults {
        line.push_str(" (eats separate meals");
        if let Some(prefs) = member.meal_preferences.as_ref() {
            for (label, meals) in [
                ("breakfast", &prefs.breakfast),
                ("lunch", &prefs.lunch),
                ("dinner", &prefs.dinner),
            ] {
                if !meals.is_empty() {
                    let _ = write!(line, "; {label}: {}", meals.join(", "));
                }
            }
        }
        line.push(')');
    }
    line
}

fn describe_candidate(candidate: &RecipeCandidate) -> String {
    let recipe = &candidate.recipe;
    let mut line = format!(
        "[{}] id {}: {}",
        candidate.meal_type, recipe.id, recipe.title
    );
    if let Some(minutes) = recipe.ready_in_minutes {
        let _ = write!(line, ", {minutes} min");
    }
    if let Some(servings) = recipe.servings {
        let _ = write!(line, ", serves {servings}");
    }
    if let Some(image) = recipe.image.as_deref() {
        let _ = write!(line, ", image {image}");
    }
    if let Some(url) = recipe.source_url.as_deref() {
        let _ = write!(line, ", source {url}");
    }
    line
}

fn push_lines(out: &mut String, lines: &[String], empty: &str) {
    if lines.is_empty() {
        out.push_str(empty);
        out.push('\n');
        return;
    }
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
}

fn join_or_none(values: &[String]) -> String {
    if values.is_empty() {
        "None".to_string()
    } else {
        values.join(", ")
    }
}

/// Provenance stamped onto a plan when it is assembled.
#[derive(Debug, Clone)]
pub struct PlanStamp {
    pub household_id: String,
    pub generated_by: String,
    pub mode: MealSuggestionMode,
    pub generated_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl PlanStamp {
    pub fn now(household_id: &str, generated_by: &str, mode: MealSuggestionMode) -> Self {
        Self {
            household_id: household_id.to_string(),
            generated_by: generated_by.to_string(),
            mode,
            generated_at: Utc::now(),
            ttl: Duration::days(DEFAULT_PLAN_TTL_DAYS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPlan {
    pub plan: MealPlan,
    pub warnings: Vec<PlanWarning>,
}

/// Decode, place, check and assemble one engine reply.
pub fn synthesize_plan(
    raw: &str,
    week: PlanWeek,
    needs: &AggregatedNeeds,
    stamp: PlanStamp,
) -> Result<GeneratedPlan, ParseError> {
    let response = parse_plan_response(raw)?;
    let placed = week.place(&response);

    let mut warnings = response.warnings;
    warnings.extend(placed.warnings);
    warnings.extend(week.coverage_warnings(&placed.meals));
    warnings.extend(ConstraintGuard::new(needs).review(&placed.meals));

    let plan = MealPlan {
        household_id: stamp.household_id,
        start_date: week.start_date(),
        end_date: week.end_date(),
        meals: placed.meals,
        meal_suggestion_mode: stamp.mode,
        generated_by: stamp.generated_by,
        generated_at: stamp.generated_at,
        expires_at: stamp.generated_at + stamp.ttl,
        explanation: response.explanation,
    };

    Ok(GeneratedPlan { plan, warnings })
}

/// Prompt for a free-form chat turn about the household's meals.
///
/// `plan` is the stored plan for the current week, when there is one.
pub fn build_chat_prompt(
    context: &HouseholdContext,
    plan: Option<&MealPlan>,
    message: &str,
) -> EnginePrompt {
    let prefs = &context.preferences;
    let mut user = String::new();

    out_section(&mut user, "Household members");
    let members = context.members.iter().map(describe_member).collect::<Vec<_>>();
    push_lines(&mut user, &members, "No members on file");

    out_section(&mut user, "Household preferences");
    let _ = writeln!(user, "- Suggestion mode: {}", prefs.meal_suggestion_mode.as_str());
    let _ = writeln!(user, "- Cooking time: {}", prefs.cooking_time.time_band());
    for meal_type in MealType::ALL {
        let typical = prefs.typical_for(meal_type);
        if !typical.is_empty() {
            let _ = writeln!(user, "- Typical {meal_type}: {}", typical.join(", "));
        }
    }
    if !prefs.additional_preferences.trim().is_empty() {
        let _ = writeln!(user, "- Notes: {}", prefs.additional_preferences.trim());
    }

    out_section(&mut user, "Household constraints");
    let needs = &context.needs;
    let _ = writeln!(
        user,
        "- Allergies (never suggest): {}",
        join_or_none(&needs.all_allergies.iter().cloned().collect::<Vec<_>>())
    );
    let _ = writeln!(
        user,
        "- Dietary restrictions: {}",
        join_or_none(&needs.all_restrictions.iter().cloned().collect::<Vec<_>>())
    );
    let _ = writeln!(
        user,
        "- Dislikes: {}",
        join_or_none(&needs.all_dislikes.iter().cloned().collect::<Vec<_>>())
    );

    out_section(&mut user, "This week's meal plan");
    match plan {
        Some(plan) => {
            let _ = writeln!(user, "Week of {} to {}:", plan.start_date, plan.end_date);
            for slot in &plan.meals {
                let _ = write!(
                    user,
                    "- {} {} {}: {}",
                    slot.day, slot.date, slot.meal_type, slot.recipe_name
                );
                if let Some(minutes) = slot.ready_in_minutes {
                    let _ = write!(user, " ({minutes} min)");
                }
                user.push('\n');
            }
        }
        None => user.push_str("No meal plan saved for this week\n"),
    }

    out_section(&mut user, "Message");
    user.push_str(message.trim());
    user.push('\n');

    EnginePrompt {
        system: format!(
            "{CHAT_SYSTEM_PROMPT}\n\nHousehold: {}",
            context.household_id
        ),
        user,
    }
}

fn out_section(out: &mut String, title: &str) {
    if !out.is_empty() {
        out.push('\n');
    }
    let _ = writeln!(out, "## {title}");
}
