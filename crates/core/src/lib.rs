pub mod aggregate;
pub mod error;
pub mod guard;
pub mod models;
pub mod planner;
pub mod response;
pub mod text;
pub mod warnings;
pub mod week;

pub use aggregate::{aggregate, diet_token, map_diet};
pub use error::{ParseError, PlanningError, ValidationError};
pub use guard::ConstraintGuard;
pub use models::*;
pub use planner::{
    build_chat_prompt, build_generation_request, synthesize_plan, GenerationRequest, PlanStamp,
    GeneratedPlan, DEFAULT_PLAN_TTL_DAYS,
};
pub use response::{extract_json_object, parse_plan_response, PlanResponse, PlannedMeal};
pub use text::{mentions, normalize_text, preview, slugify};
pub use warnings::PlanWarning;
pub use week::{end_date_for, parse_start_date, PlacedMeals, PlanWeek};
