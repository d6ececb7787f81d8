use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use hearth_agents::{MealAgent, ScriptedEngine};
use hearth_api::{build_router, ApiState, IpRateLimiter};
use hearth_core::RecipeSummary;
use hearth_observability::AppMetrics;
use hearth_recipes::StaticRecipes;
use hearth_storage::Store;
use serde_json::{json, Value};
use tower::ServiceExt;

const MONDAY: &str = "2026-10-19";
const DAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

fn app(engine: Arc<ScriptedEngine>) -> Router {
    let recipes = StaticRecipes::new(vec![RecipeSummary {
        id: "11".to_string(),
        title: "Veggie Chili".to_string(),
        ready_in_minutes: Some(40),
        ..RecipeSummary::default()
    }]);
    let agent = MealAgent::new(
        Arc::new(Store::memory()),
        engine,
        Arc::new(recipes),
        AppMetrics::shared(),
    );
    build_router(ApiState::new(Arc::new(agent), "memory"))
}

fn week_reply() -> String {
    let mut meals = Vec::new();
    for day in DAYS {
        for (meal_type, id, name) in [
            ("breakfast", 21, "Oat Porridge"),
            ("lunch", 11, "Veggie Chili"),
            ("dinner", 12, "Lentil Soup"),
        ] {
            meals.push(json!({
                "day": day, "mealType": meal_type, "recipeId": id, "recipeName": name,
                "source": "ai_suggest", "isUserMeal": false
            }));
        }
    }
    json!({ "meals": meals, "explanation": "plant based week" }).to_string()
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn seed(app: &Router) {
    let (status, body) = send(
        app,
        "PUT",
        "/v1/households/hh-1/members",
        Some(json!([
            {
                "id": "m1", "name": "Dana", "age": 38,
                "dietaryRestrictions": ["Vegan"], "allergies": ["peanuts"],
                "dislikes": ["olives"]
            },
            {
                "name": "Noa", "age": 4, "allergies": ["sesame"],
                "sameAsAdults": false
            }
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["members"].as_array().unwrap().len(), 2);
    assert!(!body["members"][1]["id"].as_str().unwrap().is_empty());

    let (status, _) = send(
        app,
        "PUT",
        "/v1/households/hh-1/preferences",
        Some(json!({ "mealSuggestionMode": "ai_suggest", "cookingTime": "quick" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn health_reports_capabilities() {
    let app = app(Arc::new(ScriptedEngine::default()));
    let (status, body) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["capabilities"]["engineModel"], "scripted");
    assert_eq!(body["capabilities"]["recipeBackend"], "static");
    assert_eq!(body["capabilities"]["store"], "memory");
}

#[tokio::test]
async fn needs_merge_every_member() {
    let app = app(Arc::new(ScriptedEngine::default()));
    seed(&app).await;

    let (status, body) = send(&app, "GET", "/v1/households/hh-1/needs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allAllergies"], json!(["peanuts", "sesame"]));
    assert_eq!(body["allRestrictions"], json!(["Vegan"]));
    assert_eq!(body["allDislikes"], json!(["olives"]));
    assert_eq!(body["membersWithDifferentMeals"][0]["name"], "Noa");
}

#[tokio::test]
async fn generated_plan_can_be_fetched_by_week() {
    let engine = Arc::new(ScriptedEngine::default());
    engine.push_reply(week_reply());
    let app = app(engine.clone());
    seed(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/v1/meal-plans/generate",
        Some(json!({ "householdId": "hh-1", "startDate": MONDAY })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plan"]["meals"].as_array().unwrap().len(), 21);
    assert_eq!(body["plan"]["endDate"], "2026-10-25");
    assert_eq!(body["plan"]["generatedBy"], "api");

    let prompt = &engine.prompts()[0].user;
    assert!(prompt.contains("peanuts"));
    assert!(prompt.contains("Veggie Chili"));

    let (status, plan) = send(&app, "GET", "/v1/meal-plans/hh-1/2026-10-19", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(plan["explanation"], "plant based week");
    assert_eq!(plan["mealSuggestionMode"], "ai_suggest");
}

#[tokio::test]
async fn missing_plan_is_not_found() {
    let app = app(Arc::new(ScriptedEngine::default()));
    let (status, body) = send(&app, "GET", "/v1/meal-plans/hh-1/2026-10-19", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "plan_not_found");
}

#[tokio::test]
async fn non_monday_start_is_rejected() {
    let engine = Arc::new(ScriptedEngine::default());
    let app = app(engine.clone());
    seed(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/v1/meal-plans/generate",
        Some(json!({ "householdId": "hh-1", "startDate": "2026-10-20" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert!(engine.prompts().is_empty());
}

#[tokio::test]
async fn unknown_household_is_not_found() {
    let app = app(Arc::new(ScriptedEngine::default()));
    let (status, body) = send(
        &app,
        "POST",
        "/v1/meal-plans/generate",
        Some(json!({ "householdId": "nobody", "startDate": MONDAY })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn unreadable_engine_reply_is_a_bad_gateway() {
    let engine = Arc::new(ScriptedEngine::new(["I would rather not plan this week."]));
    let app = app(engine);
    seed(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/v1/meal-plans/generate",
        Some(json!({ "householdId": "hh-1", "startDate": MONDAY })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "parse_error");

    let (status, _) = send(&app, "GET", "/v1/meal-plans/hh-1/2026-10-19", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chat_answers_for_the_household() {
    let engine = Arc::new(ScriptedEngine::new(["  Try a chickpea curry.  "]));
    let app = app(engine.clone());
    seed(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/v1/chat",
        Some(json!({ "householdId": "hh-1", "message": "What is quick tonight?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "Try a chickpea curry.");
    assert_eq!(body["householdId"], "hh-1");
    assert!(engine.prompts()[0].user.contains("peanuts"));
}

#[tokio::test]
async fn recipe_search_uses_configured_backend() {
    let app = app(Arc::new(ScriptedEngine::default()));
    let (status, body) = send(
        &app,
        "POST",
        "/v1/recipes/search",
        Some(json!({ "query": "chili", "number": 5 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalResults"], 1);
    assert_eq!(body["recipes"][0]["title"], "Veggie Chili");
}

#[tokio::test]
async fn ingredient_search_lists_what_can_be_cooked() {
    let app = app(Arc::new(ScriptedEngine::default()));
    let (status, body) = send(
        &app,
        "POST",
        "/v1/recipes/by-ingredients",
        Some(json!({ "ingredients": "chili, kale", "ranking": "minimize_missing" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ingredients"], json!(["chili", "kale"]));
    assert_eq!(body["recipesFound"], 1);
    assert_eq!(body["recipes"][0]["id"], "11");
    assert_eq!(body["recipes"][0]["usedIngredients"], json!(["chili"]));

    let (status, _) = send(
        &app,
        "POST",
        "/v1/recipes/by-ingredients",
        Some(json!({ "ingredients": " , " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rate_limit_applies_per_ip() {
    let agent = MealAgent::new(
        Arc::new(Store::memory()),
        Arc::new(ScriptedEngine::default()),
        Arc::new(StaticRecipes::default()),
        AppMetrics::shared(),
    );
    let state = ApiState::new(Arc::new(agent), "memory")
        .with_limiter(IpRateLimiter::new(Duration::from_secs(60), 1));
    let app = build_router(state);

    let request = || {
        Request::builder()
            .method("POST")
            .uri("/v1/recipes/search")
            .header("content-type", "application/json")
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::from("{}"))
            .unwrap()
    };

    let first = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let second = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    let (status, _) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}
