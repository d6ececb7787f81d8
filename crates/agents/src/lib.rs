mod cache;
mod engine;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Datelike, Duration, Utc};
use futures::future::join_all;
use hearth_core::{
    aggregate, build_chat_prompt, build_generation_request, parse_start_date, synthesize_plan,
    AggregatedNeeds, ChatInput, ChatReply, FamilyMember, GeneratedPlan, HouseholdContext,
    HouseholdPreferences, MealPlan, MealSlot, MealType, PlanStamp, PlanWeek, PlanningError,
    RecipeCandidate, RecipeSummary, ValidationError, DEFAULT_PLAN_TTL_DAYS,
};
use hearth_observability::AppMetrics;
use hearth_recipes::{IngredientMatch, IngredientQuery, RecipePage, RecipeQuery, RecipeSearch};
use hearth_storage::{PlanRepository, ProfileRepository};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

pub use cache::HouseholdCache;
pub use engine::{
    build_engine, OpenAiConfig, OpenAiResponsesEngine, ReasoningEngine, ScriptedEngine,
    UnavailableEngine,
};

pub struct MealAgent<S>
where
    S: ProfileRepository + PlanRepository,
{
    store: Arc<S>,
    engine: Arc<dyn ReasoningEngine>,
    recipes: Arc<dyn RecipeSearch>,
    cache: HouseholdCache,
    metrics: Arc<AppMetrics>,
    plan_ttl: Duration,
}

impl<S> MealAgent<S>
where
    S: ProfileRepository + PlanRepository,
{
    pub fn new(
        store: Arc<S>,
        engine: Arc<dyn ReasoningEngine>,
        recipes: Arc<dyn RecipeSearch>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            store,
            engine,
            recipes,
            cache: HouseholdCache::new(),
            metrics,
            plan_ttl: Duration::days(DEFAULT_PLAN_TTL_DAYS),
        }
    }

    pub fn with_plan_ttl_days(mut self, days: i64) -> Self {
        self.plan_ttl = Duration::days(days.max(1));
        self
    }

    pub fn plan_ttl_days(&self) -> i64 {
        self.plan_ttl.num_days()
    }

    pub fn engine_model(&self) -> &str {
        self.engine.model_name()
    }

    pub fn recipe_backend(&self) -> &'static str {
        self.recipes.backend_name()
    }

    pub fn metrics(&self) -> &Arc<AppMetrics> {
        &self.metrics
    }

    /// Members, preferences and aggregated needs, memoized per household.
    pub async fn household_context(
        &self,
        household_id: &str,
    ) -> Result<Arc<HouseholdContext>, PlanningError> {
        let household_id = required(household_id, "householdId")?;

        if let Some(context) = self.cache.get(household_id) {
            self.metrics.inc_cache_hit();
            return Ok(context);
        }

        let generation = self.cache.generation(household_id);
        let exists = self
            .store
            .household_exists(household_id)
            .await
            .map_err(PlanningError::upstream)?;
        if !exists {
            return Err(PlanningError::HouseholdNotFound(household_id.to_string()));
        }

        let members = self
            .store
            .list_members(household_id)
            .await
            .map_err(PlanningError::upstream)?;
        let preferences = self
            .store
            .load_preferences(household_id)
            .await
            .map_err(PlanningError::upstream)?
            .unwrap_or_default();
        let needs = aggregate(&members);

        debug!(
            household_id = %household_id,
            members = members.len(),
            separate_eaters = needs.members_with_different_meals.len(),
            "household context loaded"
        );

        Ok(self.cache.insert_if_current(
            generation,
            HouseholdContext {
                household_id: household_id.to_string(),
                members,
                preferences,
                needs,
            },
        ))
    }

    pub async fn aggregated_needs(
        &self,
        household_id: &str,
    ) -> Result<AggregatedNeeds, PlanningError> {
        Ok(self.household_context(household_id).await?.needs.clone())
    }

    /// Explicit household id wins; otherwise the user's linked household.
    pub async fn resolve_household(
        &self,
        household_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<String, PlanningError> {
        if let Some(household_id) = household_id.map(str::trim).filter(|v| !v.is_empty()) {
            return Ok(household_id.to_string());
        }

        let Some(user_id) = user_id.map(str::trim).filter(|v| !v.is_empty()) else {
            return Err(ValidationError::MissingField("householdId").into());
        };

        self.household_for_user(user_id)
            .await?
            .ok_or_else(|| PlanningError::HouseholdNotFound(format!("linked to user {user_id}")))
    }

    #[instrument(skip(self), fields(mode = tracing::field::Empty))]
    pub async fn generate_plan(
        &self,
        household_id: &str,
        start_date: &str,
        user_id: &str,
    ) -> Result<GeneratedPlan, PlanningError> {
        let started = Instant::now();
        self.metrics.inc_request();

        let result = self.run_generation(household_id, start_date, user_id).await;
        self.metrics.observe_latency(started.elapsed());

        match &result {
            Ok(generated) => {
                self.metrics.inc_plan_generated(generated.warnings.len());
                info!(
                    household_id = %generated.plan.household_id,
                    start_date = %generated.plan.start_date,
                    meals = generated.plan.meals.len(),
                    warnings = generated.warnings.len(),
                    latency_ms = started.elapsed().as_millis() as u64,
                    "meal plan generated"
                );
            }
            Err(error) => {
                self.metrics.inc_plan_failure(error.kind());
                warn!(kind = error.kind(), error = %error, "meal plan generation failed");
            }
        }

        result
    }

    async fn run_generation(
        &self,
        household_id: &str,
        start_date: &str,
        user_id: &str,
    ) -> Result<GeneratedPlan, PlanningError> {
        let week = PlanWeek::starting(start_date)?;
        let context = self.household_context(household_id).await?;
        let mode = context.preferences.meal_suggestion_mode;
        tracing::Span::current().record("mode", mode.as_str());

        let mut request = build_generation_request(
            &context.needs,
            &context.preferences,
            &context.members,
            week,
        );
        if mode.searches_for_dishes() {
            request = request.with_candidates(self.fetch_candidates(&context).await);
        }

        self.metrics.inc_engine_call();
        let raw = self
            .engine
            .complete(&request.to_prompt())
            .await
            .map_err(PlanningError::upstream)?;

        let stamp = PlanStamp::now(&context.household_id, user_id, mode).with_ttl(self.plan_ttl);
        let mut generated = synthesize_plan(&raw, week, &context.needs, stamp)?;
        self.enrich_user_meals(&mut generated.plan.meals).await;

        self.store
            .save_plan(&generated.plan)
            .await
            .map_err(PlanningError::upstream)?;

        Ok(generated)
    }

    async fn fetch_candidates(&self, context: &HouseholdContext) -> Vec<RecipeCandidate> {
        let searches = MealType::ALL.iter().map(|meal_type| {
            let meal_type = *meal_type;
            let query = RecipeQuery::for_household(&context.needs, &context.preferences, meal_type);
            async move { (meal_type, self.recipes.search(&query).await) }
        });

        let mut candidates = Vec::new();
        for (meal_type, result) in join_all(searches).await {
            match result {
                Ok(page) => candidates.extend(
                    page.recipes
                        .into_iter()
                        .map(|recipe| RecipeCandidate { meal_type, recipe }),
                ),
                Err(error) => {
                    self.metrics.inc_recipe_search_degraded();
                    warn!(
                        meal_type = %meal_type,
                        error = %format!("{error:#}"),
                        "recipe search failed; planning without candidates"
                    );
                }
            }
        }

        candidates
    }

    /// Fills missing image and timing details on household meals without
    /// changing which dish was planned.
    async fn enrich_user_meals(&self, meals: &mut [MealSlot]) {
        let mut names = meals
            .iter()
            .filter(|slot| {
                slot.is_user_meal && (slot.recipe_image.is_none() || slot.ready_in_minutes.is_none())
            })
            .map(|slot| slot.recipe_name.clone())
            .collect::<Vec<_>>();
        names.sort();
        names.dedup();
        if names.is_empty() {
            return;
        }

        let lookups = names.into_iter().map(|name| async move {
            let query = RecipeQuery::default().with_query(name.clone()).with_number(1);
            (name, self.recipes.search(&query).await)
        });

        let mut found: HashMap<String, RecipeSummary> = HashMap::new();
        for (name, result) in join_all(lookups).await {
            match result {
                Ok(page) => {
                    if let Some(recipe) = page.recipes.into_iter().next() {
                        found.insert(name, recipe);
                    }
                }
                Err(error) => {
                    self.metrics.inc_recipe_search_degraded();
                    debug!(meal = %name, error = %format!("{error:#}"), "meal enrichment skipped");
                }
            }
        }

        for slot in meals.iter_mut().filter(|slot| slot.is_user_meal) {
            let Some(recipe) = found.get(&slot.recipe_name) else {
                continue;
            };
            if slot.recipe_image.is_none() {
                slot.recipe_image = recipe.image.clone();
            }
            if slot.ready_in_minutes.is_none() {
                slot.ready_in_minutes = recipe.ready_in_minutes;
            }
            if slot.servings.is_none() {
                slot.servings = recipe.servings;
            }
            if slot.source_url.is_none() {
                slot.source_url = recipe.source_url.clone();
            }
        }
    }

    /// Stored plan for the week, if present and not expired.
    pub async fn get_plan(
        &self,
        household_id: &str,
        start_date: &str,
    ) -> Result<Option<MealPlan>, PlanningError> {
        let household_id = required(household_id, "householdId")?;
        let start_date = parse_start_date(start_date)?;
        self.store
            .load_plan(household_id, start_date, Utc::now())
            .await
            .map_err(PlanningError::upstream)
    }

    #[instrument(skip(self, input), fields(household_id = %input.household_id))]
    pub async fn chat(&self, input: ChatInput) -> Result<ChatReply, PlanningError> {
        let started = Instant::now();
        self.metrics.inc_request();

        let result = self.run_chat(&input).await;
        self.metrics.observe_latency(started.elapsed());
        result
    }

    async fn run_chat(&self, input: &ChatInput) -> Result<ChatReply, PlanningError> {
        let message = required(&input.message, "message")?;
        let context = self.household_context(&input.household_id).await?;
        let plan = self.current_week_plan(&context.household_id).await;
        let prompt = build_chat_prompt(&context, plan.as_ref(), message);

        self.metrics.inc_engine_call();
        let reply = self
            .engine
            .complete(&prompt)
            .await
            .map_err(PlanningError::upstream)?;

        info!(
            message = %hearth_core::preview(message, 80),
            has_plan = plan.is_some(),
            reply_chars = reply.len(),
            "chat handled"
        );

        Ok(ChatReply {
            response: reply.trim().to_string(),
            household_id: context.household_id.clone(),
        })
    }

    /// Stored plan for the week containing today; store failures read as none.
    async fn current_week_plan(&self, household_id: &str) -> Option<MealPlan> {
        let now = Utc::now();
        let today = now.date_naive();
        let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));

        match self.store.load_plan(household_id, monday, now).await {
            Ok(plan) => plan,
            Err(error) => {
                warn!(error = %error, "current plan unavailable for chat");
                None
            }
        }
    }

    pub async fn search_recipes(&self, query: &RecipeQuery) -> Result<RecipePage, PlanningError> {
        let started = Instant::now();
        self.metrics.inc_request();

        let result = self
            .recipes
            .search(query)
            .await
            .map_err(PlanningError::upstream);
        self.metrics.observe_latency(started.elapsed());
        result
    }

    /// Recipes that use what the household already has.
    pub async fn search_by_ingredients(
        &self,
        query: &IngredientQuery,
    ) -> Result<Vec<IngredientMatch>, PlanningError> {
        if query.ingredients.iter().all(|item| item.trim().is_empty()) {
            return Err(ValidationError::MissingField("ingredients").into());
        }

        let started = Instant::now();
        self.metrics.inc_request();

        let result = self
            .recipes
            .search_by_ingredients(query)
            .await
            .map_err(PlanningError::upstream);
        self.metrics.observe_latency(started.elapsed());
        result
    }

    pub async fn recipe_details(
        &self,
        recipe_id: &str,
    ) -> Result<Option<RecipeSummary>, PlanningError> {
        let recipe_id = required(recipe_id, "recipeId")?;
        self.recipes
            .recipe_details(recipe_id)
            .await
            .map_err(PlanningError::upstream)
    }

    /// Stores a member, assigning an id when none is given.
    pub async fn upsert_member(
        &self,
        household_id: &str,
        mut member: FamilyMember,
    ) -> Result<FamilyMember, PlanningError> {
        let household_id = required(household_id, "householdId")?;
        if member.id.trim().is_empty() {
            member.id = Uuid::new_v4().to_string();
        }

        self.store
            .upsert_member(household_id, &member)
            .await
            .map_err(PlanningError::upstream)?;
        self.cache.invalidate(household_id);
        Ok(member)
    }

    pub async fn upsert_preferences(
        &self,
        household_id: &str,
        preferences: &HouseholdPreferences,
    ) -> Result<(), PlanningError> {
        let household_id = required(household_id, "householdId")?;
        self.store
            .upsert_preferences(household_id, preferences)
            .await
            .map_err(PlanningError::upstream)?;
        self.cache.invalidate(household_id);
        Ok(())
    }

    pub async fn link_user(&self, user_id: &str, household_id: &str) -> Result<(), PlanningError> {
        let user_id = required(user_id, "userId")?;
        let household_id = required(household_id, "householdId")?;
        self.store
            .link_user(user_id, household_id)
            .await
            .map_err(PlanningError::upstream)?;
        self.cache.invalidate(household_id);
        Ok(())
    }

    pub async fn household_for_user(&self, user_id: &str) -> Result<Option<String>, PlanningError> {
        let user_id = required(user_id, "userId")?;
        self.store
            .household_for_user(user_id)
            .await
            .map_err(PlanningError::upstream)
    }

    pub async fn purge_expired_plans(&self) -> Result<u64, PlanningError> {
        let removed = self
            .store
            .purge_expired(Utc::now())
            .await
            .map_err(PlanningError::upstream)?;
        info!(removed, "expired meal plans purged");
        Ok(removed)
    }
}

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::{MealSource, MealSuggestionMode, PlanWarning};
    use hearth_recipes::StaticRecipes;
    use chrono::{DateTime, NaiveDate};
    use hearth_storage::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
    use tokio::sync::Notify;

    const DAYS: [&str; 7] = [
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
        "sunday",
    ];

    fn full_week_reply() -> String {
        let mut meals = Vec::new();
        for day in DAYS {
            meals.push(json!({
                "day": day, "mealType": "breakfast", "recipeName": "Cottage Cheese",
                "source": "user_preference", "isUserMeal": true
            }));
            meals.push(json!({
                "day": day, "mealType": "lunch", "recipeId": 11, "recipeName": "Veggie Chili",
                "source": "ai_suggest", "isUserMeal": false
            }));
            meals.push(json!({
                "day": day, "mealType": "dinner", "recipeId": 12, "recipeName": "Lentil Soup",
                "source": "ai_suggest", "isUserMeal": false
            }));
        }
        json!({ "meals": meals, "explanation": "cottage cheese every morning" }).to_string()
    }

    fn catalog() -> Vec<RecipeSummary> {
        vec![
            RecipeSummary {
                id: "11".to_string(),
                title: "Veggie Chili".to_string(),
                ready_in_minutes: Some(40),
                ..RecipeSummary::default()
            },
            RecipeSummary {
                id: "21".to_string(),
                title: "Cottage Cheese Bowl".to_string(),
                image: Some("https://img.example/cottage.jpg".to_string()),
                ready_in_minutes: Some(5),
                ..RecipeSummary::default()
            },
        ]
    }

    struct Harness {
        agent: MealAgent<MemoryStore>,
        engine: Arc<ScriptedEngine>,
        recipes: Arc<StaticRecipes>,
        store: Arc<MemoryStore>,
    }

    async fn harness(recipes: StaticRecipes, mode: MealSuggestionMode) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(ScriptedEngine::default());
        let recipes = Arc::new(recipes);
        let agent = MealAgent::new(
            store.clone(),
            engine.clone(),
            recipes.clone(),
            AppMetrics::shared(),
        );

        agent
            .upsert_member(
                "hh-1",
                FamilyMember {
                    id: "m1".to_string(),
                    name: "Dana".to_string(),
                    age: Some(38),
                    dietary_restrictions: vec!["vegetarian".to_string()],
                    allergies: vec!["peanuts".to_string()],
                    likes: Vec::new(),
                    dislikes: Vec::new(),
                    same_as_adults: true,
                    meal_preferences: None,
                },
            )
            .await
            .unwrap();
        agent
            .upsert_preferences(
                "hh-1",
                &HouseholdPreferences {
                    meal_suggestion_mode: mode,
                    typical_breakfast: vec!["Cottage Cheese".to_string()],
                    ..HouseholdPreferences::default()
                },
            )
            .await
            .unwrap();

        Harness {
            agent,
            engine,
            recipes,
            store,
        }
    }

    #[tokio::test]
    async fn generates_enriches_and_saves_a_plan() {
        let h = harness(StaticRecipes::new(catalog()), MealSuggestionMode::AiAndUser).await;
        h.engine.push_reply(full_week_reply());

        let generated = h
            .agent
            .generate_plan("hh-1", "2025-06-02", "user-1")
            .await
            .unwrap();

        assert!(generated.warnings.is_empty(), "{:?}", generated.warnings);
        assert_eq!(generated.plan.meals.len(), 21);
        assert_eq!(generated.plan.generated_by, "user-1");

        let breakfast = &generated.plan.meals[0];
        assert_eq!(breakfast.source, MealSource::UserPreference);
        assert_eq!(breakfast.recipe_name, "Cottage Cheese");
        assert_eq!(breakfast.recipe_id, "user-cottage-cheese");
        assert_eq!(
            breakfast.recipe_image.as_deref(),
            Some("https://img.example/cottage.jpg")
        );

        let queries = h.recipes.queries();
        assert_eq!(queries.len(), 5);
        assert!(queries[..4]
            .iter()
            .all(|query| query.diet.as_deref() == Some("vegetarian")
                && query.intolerances == vec!["peanuts"]));

        let prompt = &h.engine.prompts()[0];
        assert!(prompt.user.contains("## Recipe candidates"));
        assert!(prompt.user.contains("Veggie Chili"));

        let stored = h
            .agent
            .get_plan("hh-1", "2025-06-02")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, generated.plan);
    }

    #[tokio::test]
    async fn user_preference_mode_skips_candidate_search() {
        let h = harness(
            StaticRecipes::new(catalog()),
            MealSuggestionMode::UserPreference,
        )
        .await;
        h.engine.push_reply(full_week_reply());

        h.agent
            .generate_plan("hh-1", "2025-06-02", "user-1")
            .await
            .unwrap();

        let queries = h.recipes.queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].query, "Cottage Cheese");
        assert!(!h.engine.prompts()[0].user.contains("## Recipe candidates"));
    }

    #[tokio::test]
    async fn recipe_outage_degrades_to_no_candidates() {
        let h = harness(
            StaticRecipes::failing("recipe service error: 402"),
            MealSuggestionMode::AiSuggest,
        )
        .await;
        h.engine.push_reply(full_week_reply());

        let generated = h
            .agent
            .generate_plan("hh-1", "2025-06-02", "user-1")
            .await
            .unwrap();

        assert_eq!(generated.plan.meals.len(), 21);
        assert_eq!(generated.plan.meals[0].recipe_image, None);
        assert_eq!(h.agent.metrics().snapshot().recipe_search_degraded_total, 5);
    }

    #[tokio::test]
    async fn invalid_start_date_fails_before_any_upstream_call() {
        let h = harness(StaticRecipes::new(catalog()), MealSuggestionMode::AiAndUser).await;

        let error = h
            .agent
            .generate_plan("hh-1", "2025-06-04", "user-1")
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            PlanningError::Validation(ValidationError::StartDateNotMonday { .. })
        ));
        assert!(h.engine.prompts().is_empty());
        assert!(h.recipes.queries().is_empty());
    }

    #[tokio::test]
    async fn unparseable_reply_saves_nothing() {
        let h = harness(StaticRecipes::new(catalog()), MealSuggestionMode::UserPreference).await;
        h.engine.push_reply("I'm sorry, I can't help with that.");

        let error = h
            .agent
            .generate_plan("hh-1", "2025-06-02", "user-1")
            .await
            .unwrap_err();

        assert_eq!(error.kind(), "parse_error");
        assert!(h.agent.get_plan("hh-1", "2025-06-02").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn engine_failure_is_passed_through_as_upstream() {
        let h = harness(StaticRecipes::new(catalog()), MealSuggestionMode::UserPreference).await;
        h.engine.push_failure("rate limited");

        let error = h
            .agent
            .generate_plan("hh-1", "2025-06-02", "user-1")
            .await
            .unwrap_err();

        assert_eq!(error.to_string(), "upstream failure: rate limited");
        assert!(h
            .store
            .load_plan(
                "hh-1",
                parse_start_date("2025-06-02").unwrap(),
                Utc::now()
            )
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn partial_week_is_saved_with_coverage_warnings() {
        let h = harness(StaticRecipes::new(catalog()), MealSuggestionMode::UserPreference).await;
        h.engine.push_reply(
            r#"{"meals": [{"day": "monday", "mealType": "dinner", "recipeName": "Peanut Stir Fry"}]}"#,
        );

        let generated = h
            .agent
            .generate_plan("hh-1", "2025-06-02", "user-1")
            .await
            .unwrap();

        let missing = generated
            .warnings
            .iter()
            .filter(|w| matches!(w, PlanWarning::MissingSlot { .. }))
            .count();
        assert_eq!(missing, 20);
        assert!(generated
            .warnings
            .iter()
            .any(|w| matches!(w, PlanWarning::AllergenMentioned { .. })));
        assert!(h.agent.get_plan("hh-1", "2025-06-02").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unknown_household_is_not_found() {
        let h = harness(StaticRecipes::new(catalog()), MealSuggestionMode::AiAndUser).await;
        let error = h.agent.aggregated_needs("hh-404").await.unwrap_err();
        assert!(matches!(error, PlanningError::HouseholdNotFound(id) if id == "hh-404"));
    }

    #[tokio::test]
    async fn profile_writes_invalidate_memoized_context() {
        let h = harness(StaticRecipes::new(catalog()), MealSuggestionMode::AiAndUser).await;

        let before = h.agent.aggregated_needs("hh-1").await.unwrap();
        assert_eq!(before.all_allergies.len(), 1);
        h.agent.aggregated_needs("hh-1").await.unwrap();
        assert_eq!(h.agent.metrics().snapshot().context_cache_hits_total, 1);

        let added = h
            .agent
            .upsert_member(
                "hh-1",
                FamilyMember {
                    id: String::new(),
                    name: "Noa".to_string(),
                    age: Some(4),
                    dietary_restrictions: Vec::new(),
                    allergies: vec!["sesame".to_string()],
                    likes: Vec::new(),
                    dislikes: Vec::new(),
                    same_as_adults: false,
                    meal_preferences: None,
                },
            )
            .await
            .unwrap();
        assert!(!added.id.is_empty());

        let after = h.agent.aggregated_needs("hh-1").await.unwrap();
        assert_eq!(after.all_allergies.len(), 2);
        assert_eq!(after.members_with_different_meals[0].id, added.id);
    }

    #[tokio::test]
    async fn resolves_household_through_linked_user() {
        let h = harness(StaticRecipes::new(catalog()), MealSuggestionMode::AiAndUser).await;
        h.agent.link_user("user-1", "hh-1").await.unwrap();

        assert_eq!(
            h.agent.resolve_household(None, Some("user-1")).await.unwrap(),
            "hh-1"
        );
        assert_eq!(
            h.agent
                .resolve_household(Some("hh-9"), Some("user-1"))
                .await
                .unwrap(),
            "hh-9"
        );
        assert!(matches!(
            h.agent.resolve_household(None, Some("user-2")).await,
            Err(PlanningError::HouseholdNotFound(_))
        ));
        assert!(matches!(
            h.agent.resolve_household(None, None).await,
            Err(PlanningError::Validation(ValidationError::MissingField("householdId")))
        ));
    }

    #[tokio::test]
    async fn chat_forwards_household_context() {
        let h = harness(StaticRecipes::new(catalog()), MealSuggestionMode::AiAndUser).await;
        h.engine.push_reply("  Try a chickpea curry tonight.  ");

        let reply = h
            .agent
            .chat(ChatInput {
                household_id: "hh-1".to_string(),
                message: "What should we eat tonight?".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(reply.response, "Try a chickpea curry tonight.");
        assert_eq!(reply.household_id, "hh-1");
        let prompt = &h.engine.prompts()[0];
        assert!(prompt.user.contains("peanuts"));
        assert!(prompt.user.contains("What should we eat tonight?"));
    }

    fn this_monday() -> String {
        let today = Utc::now().date_naive();
        (today - Duration::days(i64::from(today.weekday().num_days_from_monday()))).to_string()
    }

    #[tokio::test]
    async fn chat_sees_the_current_week_plan() {
        let h = harness(StaticRecipes::new(catalog()), MealSuggestionMode::AiAndUser).await;
        h.engine.push_reply(full_week_reply());
        h.agent
            .generate_plan("hh-1", &this_monday(), "user-1")
            .await
            .unwrap();

        h.engine.push_reply("Lentil Soup on Tuesday.");
        h.agent
            .chat(ChatInput {
                household_id: "hh-1".to_string(),
                message: "What's for dinner Tuesday?".to_string(),
            })
            .await
            .unwrap();

        let prompt = h.engine.prompts().pop().unwrap();
        assert!(prompt.user.contains("## This week's meal plan"));
        assert!(prompt.user.contains("tuesday"));
        assert!(prompt.user.contains("dinner: Lentil Soup"));
        assert!(!prompt.user.contains("No meal plan saved"));
    }

    struct SlowFailingEngine;

    #[async_trait::async_trait]
    impl ReasoningEngine for SlowFailingEngine {
        fn model_name(&self) -> &str {
            "slow-failing"
        }

        async fn complete(&self, _prompt: &hearth_core::EnginePrompt) -> anyhow::Result<String> {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            anyhow::bail!("engine timed out")
        }
    }

    #[tokio::test]
    async fn failed_chat_still_records_latency() {
        let store = Arc::new(MemoryStore::new());
        let agent = MealAgent::new(
            store,
            Arc::new(SlowFailingEngine),
            Arc::new(StaticRecipes::default()),
            AppMetrics::shared(),
        );
        agent
            .upsert_member("hh-1", allergic_member("a", "peanuts"))
            .await
            .unwrap();

        let error = agent
            .chat(ChatInput {
                household_id: "hh-1".to_string(),
                message: "anything quick?".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(error.kind(), "upstream_error");

        let snapshot = agent.metrics().snapshot();
        assert_eq!(snapshot.requests_total, 1);
        assert!(snapshot.avg_latency_millis >= 20.0);
    }

    #[tokio::test]
    async fn ingredient_search_requires_ingredients() {
        let h = harness(StaticRecipes::new(catalog()), MealSuggestionMode::AiAndUser).await;

        let error = h
            .agent
            .search_by_ingredients(&IngredientQuery::new([" "]))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), "validation_error");

        let matches = h
            .agent
            .search_by_ingredients(&IngredientQuery::new(["cottage cheese"]))
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].recipe.id, "21");
        assert_eq!(h.agent.metrics().snapshot().requests_total, 1);
    }

    #[tokio::test]
    async fn empty_chat_message_is_rejected() {
        let h = harness(StaticRecipes::new(catalog()), MealSuggestionMode::AiAndUser).await;
        let error = h
            .agent
            .chat(ChatInput {
                household_id: "hh-1".to_string(),
                message: "   ".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(error.kind(), "validation_error");
    }

    /// Memory store whose first armed `list_members` call parks after reading.
    struct GatedStore {
        inner: MemoryStore,
        armed: AtomicBool,
        read_done: Notify,
        release: Notify,
    }

    impl GatedStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                armed: AtomicBool::new(false),
                read_done: Notify::new(),
                release: Notify::new(),
            }
        }
    }

    impl ProfileRepository for GatedStore {
        async fn list_members(&self, household_id: &str) -> anyhow::Result<Vec<FamilyMember>> {
            let members = self.inner.list_members(household_id).await?;
            if self.armed.swap(false, AtomicOrdering::SeqCst) {
                self.read_done.notify_one();
                self.release.notified().await;
            }
            Ok(members)
        }

        async fn load_preferences(
            &self,
            household_id: &str,
        ) -> anyhow::Result<Option<HouseholdPreferences>> {
            self.inner.load_preferences(household_id).await
        }

        async fn upsert_member(
            &self,
            household_id: &str,
            member: &FamilyMember,
        ) -> anyhow::Result<()> {
            self.inner.upsert_member(household_id, member).await
        }

        async fn upsert_preferences(
            &self,
            household_id: &str,
            preferences: &HouseholdPreferences,
        ) -> anyhow::Result<()> {
            self.inner.upsert_preferences(household_id, preferences).await
        }

        async fn link_user(&self, user_id: &str, household_id: &str) -> anyhow::Result<()> {
            self.inner.link_user(user_id, household_id).await
        }

        async fn household_for_user(&self, user_id: &str) -> anyhow::Result<Option<String>> {
            self.inner.household_for_user(user_id).await
        }

        async fn household_exists(&self, household_id: &str) -> anyhow::Result<bool> {
            self.inner.household_exists(household_id).await
        }
    }

    impl PlanRepository for GatedStore {
        async fn load_plan(
            &self,
            household_id: &str,
            start_date: NaiveDate,
            now: DateTime<Utc>,
        ) -> anyhow::Result<Option<MealPlan>> {
            self.inner.load_plan(household_id, start_date, now).await
        }

        async fn save_plan(&self, plan: &MealPlan) -> anyhow::Result<()> {
            self.inner.save_plan(plan).await
        }

        async fn purge_expired(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
            self.inner.purge_expired(now).await
        }
    }

    fn allergic_member(id: &str, allergy: &str) -> FamilyMember {
        FamilyMember {
            id: id.to_string(),
            name: id.to_uppercase(),
            age: None,
            dietary_restrictions: Vec::new(),
            allergies: vec![allergy.to_string()],
            likes: Vec::new(),
            dislikes: Vec::new(),
            same_as_adults: true,
            meal_preferences: None,
        }
    }

    #[tokio::test]
    async fn write_during_context_load_is_not_masked_by_stale_fill() {
        let store = Arc::new(GatedStore::new());
        let agent = MealAgent::new(
            store.clone(),
            Arc::new(ScriptedEngine::default()),
            Arc::new(StaticRecipes::default()),
            AppMetrics::shared(),
        );
        agent
            .upsert_member("hh-1", allergic_member("a", "peanuts"))
            .await
            .unwrap();

        store.armed.store(true, AtomicOrdering::SeqCst);
        let (racing, ()) = tokio::join!(agent.household_context("hh-1"), async {
            store.read_done.notified().await;
            agent
                .upsert_member("hh-1", allergic_member("b", "sesame"))
                .await
                .unwrap();
            store.release.notify_one();
        });
        assert!(!racing.unwrap().needs.all_allergies.contains("sesame"));

        let needs = agent.aggregated_needs("hh-1").await.unwrap();
        assert!(needs.all_allergies.contains("sesame"));
        assert!(needs.all_allergies.contains("peanuts"));
    }
}
