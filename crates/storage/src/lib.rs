use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use hearth_core::{FamilyMember, HouseholdPreferences, MealPlan};
use parking_lot::RwLock;
use sqlx::{Row, SqlitePool};

/// Household profiles: members, preferences and user links.
pub trait ProfileRepository: Send + Sync {
    async fn list_members(&self, household_id: &str) -> Result<Vec<FamilyMember>>;
    async fn load_preferences(&self, household_id: &str) -> Result<Option<HouseholdPreferences>>;
    async fn upsert_member(&self, household_id: &str, member: &FamilyMember) -> Result<()>;
    async fn upsert_preferences(
        &self,
        household_id: &str,
        preferences: &HouseholdPreferences,
    ) -> Result<()>;
    async fn link_user(&self, user_id: &str, household_id: &str) -> Result<()>;
    async fn household_for_user(&self, user_id: &str) -> Result<Option<String>>;
    async fn household_exists(&self, household_id: &str) -> Result<bool>;
}

/// Weekly plans keyed by `(household_id, start_date)`.
pub trait PlanRepository: Send + Sync {
    /// Plans whose `expires_at` is not after `now` read as absent.
    async fn load_plan(
        &self,
        household_id: &str,
        start_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<MealPlan>>;
    async fn save_plan(&self, plan: &MealPlan) -> Result<()>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[derive(Default)]
struct Households {
    members: HashMap<String, Vec<FamilyMember>>,
    preferences: HashMap<String, HouseholdPreferences>,
    user_links: HashMap<String, String>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    households: Arc<RwLock<Households>>,
    plans: Arc<RwLock<HashMap<(String, NaiveDate), MealPlan>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileRepository for MemoryStore {
    async fn list_members(&self, household_id: &str) -> Result<Vec<FamilyMember>> {
        Ok(self
            .households
            .read()
            .members
            .get(household_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn load_preferences(&self, household_id: &str) -> Result<Option<HouseholdPreferences>> {
        Ok(self.households.read().preferences.get(household_id).cloned())
    }

    async fn upsert_member(&self, household_id: &str, member: &FamilyMember) -> Result<()> {
        let mut households = self.households.write();
        let members = households
            .members
            .entry(household_id.to_string())
            .or_default();
        match members.iter_mut().find(|existing| existing.id == member.id) {
            Some(existing) => *existing = member.clone(),
            None => members.push(member.clone()),
        }
        Ok(())
    }

    async fn upsert_preferences(
        &self,
        household_id: &str,
        preferences: &HouseholdPreferences,
    ) -> Result<()> {
        self.households
            .write()
            .preferences
            .insert(household_id.to_string(), preferences.clone());
        Ok(())
    }

    async fn link_user(&self, user_id: &str, household_id: &str) -> Result<()> {
        self.households
            .write()
            .user_links
            .insert(user_id.to_string(), household_id.to_string());
        Ok(())
    }

    async fn household_for_user(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.households.read().user_links.get(user_id).cloned())
    }

    async fn household_exists(&self, household_id: &str) -> Result<bool> {
        let households = self.households.read();
        Ok(households.members.contains_key(household_id)
            || households.preferences.contains_key(household_id)
            || households
                .user_links
                .values()
                .any(|linked| linked == household_id))
    }
}

impl PlanRepository for MemoryStore {
    async fn load_plan(
        &self,
        household_id: &str,
        start_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<MealPlan>> {
        Ok(self
            .plans
            .read()
            .get(&(household_id.to_string(), start_date))
            .filter(|plan| plan.expires_at > now)
            .cloned())
    }

    async fn save_plan(&self, plan: &MealPlan) -> Result<()> {
        self.plans
            .write()
            .insert((plan.household_id.clone(), plan.start_date), plan.clone());
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut removed = 0_u64;
        self.plans.write().retain(|_, plan| {
            let keep = plan.expires_at > now;
            if !keep {
                removed += 1;
            }
            keep
        });

        Ok(removed)
    }
}

/// Fixed-width UTC text so stored timestamps compare lexically.
fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .with_context(|| format!("failed connecting to sqlite at {}", database_url))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS household_members (
              household_id TEXT NOT NULL,
              member_id TEXT NOT NULL,
              member_json TEXT NOT NULL,
              updated_at TEXT NOT NULL,
              PRIMARY KEY (household_id, member_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS household_preferences (
              household_id TEXT PRIMARY KEY,
              preferences_json TEXT NOT NULL,
              updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_households (
              user_id TEXT PRIMARY KEY,
              household_id TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS meal_plans (
              household_id TEXT NOT NULL,
              start_date TEXT NOT NULL,
              expires_at TEXT NOT NULL,
              plan_json TEXT NOT NULL,
              PRIMARY KEY (household_id, start_date)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl ProfileRepository for SqliteStore {
    async fn list_members(&self, household_id: &str) -> Result<Vec<FamilyMember>> {
        let rows = sqlx::query(
            r#"
            SELECT member_json
            FROM household_members
            WHERE household_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(household_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let raw: String = row.get("member_json");
                serde_json::from_str(&raw).context("stored household member is not valid JSON")
            })
            .collect()
    }

    async fn load_preferences(&self, household_id: &str) -> Result<Option<HouseholdPreferences>> {
        let row = sqlx::query(
            r#"
            SELECT preferences_json
            FROM household_preferences
            WHERE household_id = ?1
            "#,
        )
        .bind(household_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: String = row.get("preferences_json");
        let preferences = serde_json::from_str(&raw)
            .context("stored household preferences are not valid JSON")?;
        Ok(Some(preferences))
    }

    async fn upsert_member(&self, household_id: &str, member: &FamilyMember) -> Result<()> {
        let member_json = serde_json::to_string(member)?;

        sqlx::query(
            r#"
            INSERT INTO household_members (household_id, member_id, member_json, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(household_id, member_id) DO UPDATE SET
              member_json=excluded.member_json,
              updated_at=excluded.updated_at
            "#,
        )
        .bind(household_id)
        .bind(&member.id)
        .bind(member_json)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_preferences(
        &self,
        household_id: &str,
        preferences: &HouseholdPreferences,
    ) -> Result<()> {
        let preferences_json = serde_json::to_string(preferences)?;

        sqlx::query(
            r#"
            INSERT INTO household_preferences (household_id, preferences_json, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(household_id) DO UPDATE SET
              preferences_json=excluded.preferences_json,
              updated_at=excluded.updated_at
            "#,
        )
        .bind(household_id)
        .bind(preferences_json)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn link_user(&self, user_id: &str, household_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_households (user_id, household_id)
            VALUES (?1, ?2)
            ON CONFLICT(user_id) DO UPDATE SET
              household_id=excluded.household_id
            "#,
        )
        .bind(user_id)
        .bind(household_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn household_for_user(&self, user_id: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT household_id FROM user_households WHERE user_id = ?1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get("household_id")))
    }

    async fn household_exists(&self, household_id: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT
              EXISTS(SELECT 1 FROM household_members WHERE household_id = ?1)
              OR EXISTS(SELECT 1 FROM household_preferences WHERE household_id = ?1)
              OR EXISTS(SELECT 1 FROM user_households WHERE household_id = ?1)
              AS present
            "#,
        )
        .bind(household_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("present") != 0)
    }
}

impl PlanRepository for SqliteStore {
    async fn load_plan(
        &self,
        household_id: &str,
        start_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<MealPlan>> {
        let row = sqlx::query(
            r#"
            SELECT plan_json
            FROM meal_plans
            WHERE household_id = ?1 AND start_date = ?2 AND expires_at > ?3
            "#,
        )
        .bind(household_id)
        .bind(start_date.to_string())
        .bind(timestamp(now))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: String = row.get("plan_json");
        let plan = serde_json::from_str(&raw).context("stored meal plan is not valid JSON")?;
        Ok(Some(plan))
    }

    async fn save_plan(&self, plan: &MealPlan) -> Result<()> {
        let plan_json = serde_json::to_string(plan)?;

        sqlx::query(
            r#"
            INSERT INTO meal_plans (household_id, start_date, expires_at, plan_json)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(household_id, start_date) DO UPDATE SET
              expires_at=excluded.expires_at,
              plan_json=excluded.plan_json
            "#,
        )
        .bind(&plan.household_id)
        .bind(plan.start_date.to_string())
        .bind(timestamp(plan.expires_at))
        .bind(plan_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM meal_plans WHERE expires_at <= ?1")
            .bind(timestamp(now))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub async fn sqlite(database_url: &str) -> Result<Self> {
        let sqlite = SqliteStore::connect(database_url).await?;
        Ok(Self::Sqlite(sqlite))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Store::Memory(_) => "memory",
            Store::Sqlite(_) => "sqlite",
        }
    }
}

impl ProfileRepository for Store {
    async fn list_members(&self, household_id: &str) -> Result<Vec<FamilyMember>> {
        match self {
            Store::Memory(store) => store.list_members(household_id).await,
            Store::Sqlite(store) => store.list_members(household_id).await,
        }
    }

    async fn load_preferences(&self, household_id: &str) -> Result<Option<HouseholdPreferences>> {
        match self {
            Store::Memory(store) => store.load_preferences(household_id).await,
            Store::Sqlite(store) => store.load_preferences(household_id).await,
        }
    }

    async fn upsert_member(&self, household_id: &str, member: &FamilyMember) -> Result<()> {
        match self {
            Store::Memory(store) => store.upsert_member(household_id, member).await,
            Store::Sqlite(store) => store.upsert_member(household_id, member).await,
        }
    }

    async fn upsert_preferences(
        &self,
        household_id: &str,
        preferences: &HouseholdPreferences,
    ) -> Result<()> {
        match self {
            Store::Memory(store) => store.upsert_preferences(household_id, preferences).await,
            Store::Sqlite(store) => store.upsert_preferences(household_id, preferences).await,
        }
    }

    async fn link_user(&self, user_id: &str, household_id: &str) -> Result<()> {
        match self {
            Store::Memory(store) => store.link_user(user_id, household_id).await,
            Store::Sqlite(store) => store.link_user(user_id, household_id).await,
        }
    }

    async fn household_for_user(&self, user_id: &str) -> Result<Option<String>> {
        match self {
            Store::Memory(store) => store.household_for_user(user_id).await,
            Store::Sqlite(store) => store.household_for_user(user_id).await,
        }
    }

    async fn household_exists(&self, household_id: &str) -> Result<bool> {
        match self {
            Store::Memory(store) => store.household_exists(household_id).await,
            Store::Sqlite(store) => store.household_exists(household_id).await,
        }
    }
}

impl PlanRepository for Store {
    async fn load_plan(
        &self,
        household_id: &str,
        start_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<MealPlan>> {
        match self {
            Store::Memory(store) => store.load_plan(household_id, start_date, now).await,
            Store::Sqlite(store) => store.load_plan(household_id, start_date, now).await,
        }
    }

    async fn save_plan(&self, plan: &MealPlan) -> Result<()> {
        match self {
            Store::Memory(store) => store.save_plan(plan).await,
            Store::Sqlite(store) => store.save_plan(plan).await,
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        match self {
            Store::Memory(store) => store.purge_expired(now).await,
            Store::Sqlite(store) => store.purge_expired(now).await,
        }
    }
}
