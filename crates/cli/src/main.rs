use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hearth_agents::{build_engine, MealAgent, OpenAiConfig};
use hearth_core::{ChatInput, FamilyMember, HouseholdPreferences, DEFAULT_PLAN_TTL_DAYS};
use hearth_observability::{init_tracing, AppMetrics};
use hearth_recipes::{
    build_recipe_search, split_ingredients, IngredientQuery, IngredientRanking, RecipeQuery,
    SpoonacularConfig,
};
use hearth_storage::Store;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "hearth")]
#[command(about = "Hearth household meal planner CLI")]
struct Cli {
    #[arg(long, env = "HEARTH_DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, env = "HEARTH_RECIPE_CATALOG", default_value = "recipes")]
    recipe_catalog: PathBuf,

    /// Days a saved plan is kept before purge removes it.
    #[arg(long, env = "HEARTH_PLAN_TTL_DAYS", default_value_t = DEFAULT_PLAN_TTL_DAYS)]
    plan_ttl_days: i64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load members, preferences and user links from a JSON file.
    Import { file: PathBuf },
    Needs {
        #[arg(long)]
        household: String,
    },
    Generate {
        #[arg(long)]
        household: Option<String>,
        #[arg(long)]
        user: Option<String>,
        /// Monday the week starts on (YYYY-MM-DD).
        #[arg(long)]
        start: String,
    },
    Plan {
        #[arg(long)]
        household: String,
        #[arg(long)]
        start: String,
    },
    Chat {
        #[arg(long)]
        household: String,
    },
    Recipes {
        query: Option<String>,
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        diet: Option<String>,
        #[arg(long)]
        meal_type: Option<String>,
        /// Comma separated ingredients on hand; lists what they can cook.
        #[arg(long, conflicts_with_all = ["query", "id"])]
        ingredients: Option<String>,
        /// Rank by fewest missing ingredients instead of most used.
        #[arg(long, requires = "ingredients")]
        minimize_missing: bool,
        #[arg(long, default_value_t = 5)]
        limit: u32,
    },
    /// Delete meal plans past their expiry.
    Purge,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HouseholdImport {
    #[serde(default)]
    household_id: Option<String>,
    #[serde(default)]
    members: Vec<FamilyMember>,
    #[serde(default)]
    preferences: Option<HouseholdPreferences>,
    #[serde(default)]
    users: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("hearth_cli");
    let cli = Cli::parse();

    let agent = build_agent(
        cli.database_url.as_deref(),
        &cli.recipe_catalog,
        cli.plan_ttl_days,
    )
    .await?;

    match cli.command {
        Command::Import { file } => {
            let household_id = import_household(&agent, &file).await?;
            println!("{household_id}");
        }
        Command::Needs { household } => {
            let needs = agent.aggregated_needs(&household).await?;
            println!("{}", serde_json::to_string_pretty(&needs)?);
        }
        Command::Generate {
            household,
            user,
            start,
        } => {
            let household_id = agent
                .resolve_household(household.as_deref(), user.as_deref())
                .await?;
            let generated = agent
                .generate_plan(&household_id, &start, user.as_deref().unwrap_or("cli"))
                .await?;
            println!("{}", serde_json::to_string_pretty(&generated)?);
        }
        Command::Plan { household, start } => match agent.get_plan(&household, &start).await? {
            Some(plan) => println!("{}", serde_json::to_string_pretty(&plan)?),
            None => anyhow::bail!("no meal plan for household {household} starting {start}"),
        },
        Command::Chat { household } => run_chat(agent, household).await?,
        Command::Recipes {
            query,
            id,
            diet,
            meal_type,
            ingredients,
            minimize_missing,
            limit,
        } => {
            if let Some(id) = id {
                let recipe = agent.recipe_details(&id).await?;
                println!("{}", serde_json::to_string_pretty(&recipe)?);
            } else if let Some(ingredients) = ingredients {
                let ranking = if minimize_missing {
                    IngredientRanking::MinimizeMissing
                } else {
                    IngredientRanking::MaximizeUsed
                };
                let query = IngredientQuery::new(split_ingredients(&ingredients))
                    .with_ranking(ranking)
                    .with_number(limit);
                let matches = agent.search_by_ingredients(&query).await?;
                println!("{}", serde_json::to_string_pretty(&matches)?);
            } else {
                let query = RecipeQuery {
                    query: query.unwrap_or_default(),
                    diet,
                    meal_type,
                    ..RecipeQuery::default()
                }
                .with_number(limit);
                let page = agent.search_recipes(&query).await?;
                println!("{}", serde_json::to_string_pretty(&page)?);
            }
        }
        Command::Purge => {
            let removed = agent.purge_expired_plans().await?;
            println!("removed {removed} expired plan(s)");
        }
    }

    Ok(())
}

async fn import_household(agent: &MealAgent<Store>, file: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed reading {}", file.display()))?;
    let import: HouseholdImport = serde_json::from_str(&raw)
        .with_context(|| format!("invalid household file {}", file.display()))?;

    let household_id = import
        .household_id
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    for member in import.members {
        agent.upsert_member(&household_id, member).await?;
    }
    if let Some(preferences) = import.preferences.as_ref() {
        agent.upsert_preferences(&household_id, preferences).await?;
    }
    for user_id in &import.users {
        agent.link_user(user_id, &household_id).await?;
    }

    info!(household_id = %household_id, "household imported");
    Ok(household_id)
}

async fn run_chat(agent: MealAgent<Store>, household_id: String) -> Result<()> {
    println!("Hearth chat for household {household_id}. type 'exit' to quit.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let message = line.trim();
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }

        if message.is_empty() {
            continue;
        }

        let reply = agent
            .chat(ChatInput {
                household_id: household_id.clone(),
                message: message.to_string(),
            })
            .await?;

        println!("\n{}\n", reply.response);
    }

    Ok(())
}

async fn build_agent(
    database_url: Option<&str>,
    catalog: &Path,
    plan_ttl_days: i64,
) -> Result<MealAgent<Store>> {
    let metrics = AppMetrics::shared();

    let store = match database_url {
        Some(database_url) => Store::sqlite(database_url).await?,
        None => Store::memory(),
    };

    let engine = build_engine(OpenAiConfig::from_env())?;
    let recipes = build_recipe_search(SpoonacularConfig::from_env(), catalog)
        .with_context(|| format!("failed loading recipe catalog from {}", catalog.display()))?;

    Ok(MealAgent::new(Arc::new(store), engine, recipes, metrics).with_plan_ttl_days(plan_ttl_days))
}
