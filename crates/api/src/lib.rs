mod rate_limit;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Json, Path, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{body::Body, Router};
use hearth_agents::{build_engine, MealAgent, OpenAiConfig};
use hearth_core::{
    ChatInput, FamilyMember, HouseholdPreferences, PlanningError, DEFAULT_PLAN_TTL_DAYS,
};
use hearth_observability::{AppMetrics, MetricsSnapshot};
use hearth_recipes::{
    build_recipe_search, IngredientMatch, IngredientQuery, RecipeQuery, SpoonacularConfig,
};
use hearth_storage::Store;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

pub use crate::rate_limit::IpRateLimiter;

/// Process configuration, read once from `HEARTH_*` variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub bind: String,
    pub openai: Option<OpenAiConfig>,
    pub spoonacular: Option<SpoonacularConfig>,
    pub recipe_catalog: PathBuf,
    pub rate_limit_window: Duration,
    pub rate_limit_max: usize,
    pub plan_ttl_days: i64,
    pub allowed_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env_value("HEARTH_DATABASE_URL"),
            bind: env_value("HEARTH_BIND").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            openai: OpenAiConfig::from_env(),
            spoonacular: SpoonacularConfig::from_env(),
            recipe_catalog: env_value("HEARTH_RECIPE_CATALOG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("recipes")),
            rate_limit_window: Duration::from_secs(
                env_value("HEARTH_RATE_LIMIT_WINDOW_SECONDS")
                    .and_then(|value| value.parse::<u64>().ok())
                    .unwrap_or(60),
            ),
            rate_limit_max: env_value("HEARTH_RATE_LIMIT_MAX")
                .and_then(|value| value.parse::<usize>().ok())
                .unwrap_or(60),
            plan_ttl_days: env_value("HEARTH_PLAN_TTL_DAYS")
                .and_then(|value| value.parse::<i64>().ok())
                .unwrap_or(DEFAULT_PLAN_TTL_DAYS),
            allowed_origins: parse_allowed_origins(env_value("HEARTH_ALLOWED_ORIGINS")),
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_allowed_origins(raw: Option<String>) -> Vec<String> {
    let default_origins = [
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
    ];

    raw.map(|value| {
        value
            .split(',')
            .map(|origin| origin.trim().trim_end_matches('/').to_string())
            .filter(|origin| !origin.is_empty())
            .collect::<Vec<_>>()
    })
    .unwrap_or_else(|| default_origins.iter().map(|origin| origin.to_string()).collect())
}

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<MealAgent<Store>>,
    pub metrics: Arc<AppMetrics>,
    pub limiter: IpRateLimiter,
    pub store_backend: &'static str,
    pub allowed_origins: Arc<Vec<String>>,
}

impl ApiState {
    pub fn new(agent: Arc<MealAgent<Store>>, store_backend: &'static str) -> Self {
        Self {
            metrics: agent.metrics().clone(),
            agent,
            limiter: IpRateLimiter::new(Duration::from_secs(60), 60),
            store_backend,
            allowed_origins: Arc::new(parse_allowed_origins(None)),
        }
    }

    pub fn with_limiter(mut self, limiter: IpRateLimiter) -> Self {
        self.limiter = limiter;
        self
    }
}

pub async fn build_app(config: &AppConfig) -> Result<Router> {
    let metrics = AppMetrics::shared();

    let store = match config.database_url.as_deref() {
        Some(database_url) => Store::sqlite(database_url).await?,
        None => Store::memory(),
    };
    let store_backend = store.backend_name();

    let engine = build_engine(config.openai.clone()).context("failed to initialize engine")?;
    let recipes = build_recipe_search(config.spoonacular.clone(), &config.recipe_catalog)
        .context("failed to initialize recipe search")?;

    let agent = MealAgent::new(Arc::new(store), engine, recipes, metrics.clone())
        .with_plan_ttl_days(config.plan_ttl_days);

    let state = ApiState {
        agent: Arc::new(agent),
        metrics,
        limiter: IpRateLimiter::new(config.rate_limit_window, config.rate_limit_max),
        store_backend,
        allowed_origins: Arc::new(config.allowed_origins.clone()),
    };

    Ok(build_router(state))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/households/:household_id/needs", get(household_needs))
        .route("/v1/households/:household_id/members", put(put_members))
        .route(
            "/v1/households/:household_id/preferences",
            put(put_preferences),
        )
        .route("/v1/meal-plans/generate", post(generate_plan))
        .route("/v1/meal-plans/:household_id/:start_date", get(get_plan))
        .route("/v1/chat", post(chat))
        .route("/v1/recipes/search", post(search_recipes))
        .route("/v1/recipes/by-ingredients", post(search_by_ingredients))
        .layer(build_cors_layer(&state.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(RequestBodyLimitLayer::new(64 * 1024))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

/// Error body shared by every endpoint: `{"error": kind, "message": text}`.
struct ApiError(PlanningError);

impl From<PlanningError> for ApiError {
    fn from(error: PlanningError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PlanningError::Validation(_) => StatusCode::BAD_REQUEST,
            PlanningError::HouseholdNotFound(_) => StatusCode::NOT_FOUND,
            PlanningError::Parse(_) | PlanningError::Upstream(_) => StatusCode::BAD_GATEWAY,
        };
        if status == StatusCode::BAD_GATEWAY {
            error!(kind = self.0.kind(), error = %self.0, "upstream request failed");
        }

        error_response(status, self.0.kind(), self.0.to_string())
    }
}

fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": error,
            "message": message.into()
        })),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    metrics: MetricsSnapshot,
    capabilities: HealthCapabilities,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthCapabilities {
    engine_model: String,
    recipe_backend: &'static str,
    store: &'static str,
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        metrics: state.metrics.snapshot(),
        capabilities: HealthCapabilities {
            engine_model: state.agent.engine_model().to_string(),
            recipe_backend: state.agent.recipe_backend(),
            store: state.store_backend,
        },
    };
    (StatusCode::OK, Json(payload))
}

async fn household_needs(
    State(state): State<ApiState>,
    Path(household_id): Path<String>,
) -> Result<Response, ApiError> {
    let needs = state.agent.aggregated_needs(&household_id).await?;
    Ok((StatusCode::OK, Json(needs)).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratePlanRequest {
    #[serde(default)]
    household_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    start_date: String,
}

async fn generate_plan(
    State(state): State<ApiState>,
    Json(request): Json<GeneratePlanRequest>,
) -> Result<Response, ApiError> {
    let household_id = state
        .agent
        .resolve_household(request.household_id.as_deref(), request.user_id.as_deref())
        .await?;
    let generated_by = request
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("api");

    let generated = state
        .agent
        .generate_plan(&household_id, &request.start_date, generated_by)
        .await?;
    Ok((StatusCode::OK, Json(generated)).into_response())
}

async fn get_plan(
    State(state): State<ApiState>,
    Path((household_id, start_date)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    match state.agent.get_plan(&household_id, &start_date).await? {
        Some(plan) => Ok((StatusCode::OK, Json(plan)).into_response()),
        None => Ok(error_response(
            StatusCode::NOT_FOUND,
            "plan_not_found",
            format!("no meal plan for household {household_id} starting {start_date}"),
        )),
    }
}

async fn chat(
    State(state): State<ApiState>,
    Json(input): Json<ChatInput>,
) -> Result<Response, ApiError> {
    let reply = state.agent.chat(input).await?;
    Ok((StatusCode::OK, Json(reply)).into_response())
}

async fn search_recipes(
    State(state): State<ApiState>,
    Json(query): Json<RecipeQuery>,
) -> Result<Response, ApiError> {
    let page = state.agent.search_recipes(&query).await?;
    Ok((StatusCode::OK, Json(page)).into_response())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IngredientSearchResponse {
    ingredients: Vec<String>,
    recipes_found: usize,
    recipes: Vec<IngredientMatch>,
}

async fn search_by_ingredients(
    State(state): State<ApiState>,
    Json(query): Json<IngredientQuery>,
) -> Result<Response, ApiError> {
    let recipes = state.agent.search_by_ingredients(&query).await?;
    Ok((
        StatusCode::OK,
        Json(IngredientSearchResponse {
            ingredients: query.ingredients,
            recipes_found: recipes.len(),
            recipes,
        }),
    )
        .into_response())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MembersResponse {
    household_id: String,
    members: Vec<FamilyMember>,
}

async fn put_members(
    State(state): State<ApiState>,
    Path(household_id): Path<String>,
    Json(members): Json<Vec<FamilyMember>>,
) -> Result<Response, ApiError> {
    let mut stored = Vec::with_capacity(members.len());
    for member in members {
        stored.push(state.agent.upsert_member(&household_id, member).await?);
    }

    Ok((
        StatusCode::OK,
        Json(MembersResponse {
            household_id,
            members: stored,
        }),
    )
        .into_response())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PreferencesResponse {
    household_id: String,
    preferences: HouseholdPreferences,
}

async fn put_preferences(
    State(state): State<ApiState>,
    Path(household_id): Path<String>,
    Json(preferences): Json<HouseholdPreferences>,
) -> Result<Response, ApiError> {
    state
        .agent
        .upsert_preferences(&household_id, &preferences)
        .await?;
    Ok((
        StatusCode::OK,
        Json(PreferencesResponse {
            household_id,
            preferences,
        }),
    )
        .into_response())
}

fn build_cors_layer(allowed_origins: &Arc<Vec<String>>) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let ip = request_ip(&request);
    if !state.limiter.allow(&ip) {
        return error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "rate limit exceeded for this IP",
        );
    }

    next.run(request).await
}

fn request_ip(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "local".to_string())
}
