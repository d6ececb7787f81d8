use std::collections::HashMap;
use std::sync::Arc;

use hearth_core::HouseholdContext;
use parking_lot::RwLock;

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, Arc<HouseholdContext>>,
    generations: HashMap<String, u64>,
}

/// Memoized household contexts, owned by one agent.
///
/// Entries stay until a profile write invalidates them; there is no
/// time-based expiry. Every invalidation bumps the household's generation,
/// and a fill started under an older generation is discarded.
#[derive(Debug, Default)]
pub struct HouseholdCache {
    state: RwLock<CacheState>,
}

impl HouseholdCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, household_id: &str) -> Option<Arc<HouseholdContext>> {
        self.state.read().entries.get(household_id).cloned()
    }

    /// Generation to pass to [`HouseholdCache::insert_if_current`]; read it
    /// before loading from the store.
    pub fn generation(&self, household_id: &str) -> u64 {
        if let Some(generation) = self.state.read().generations.get(household_id) {
            return *generation;
        }
        *self
            .state
            .write()
            .generations
            .entry(household_id.to_string())
            .or_insert(0)
    }

    /// Stores `context` unless the household was invalidated after
    /// `generation` was read. The context is returned either way.
    pub fn insert_if_current(
        &self,
        generation: u64,
        context: HouseholdContext,
    ) -> Arc<HouseholdContext> {
        let context = Arc::new(context);
        let mut state = self.state.write();
        let current = state
            .generations
            .get(&context.household_id)
            .copied()
            .unwrap_or(0);
        if current == generation {
            state
                .entries
                .insert(context.household_id.clone(), context.clone());
        }
        context
    }

    pub fn invalidate(&self, household_id: &str) -> bool {
        let mut state = self.state.write();
        *state
            .generations
            .entry(household_id.to_string())
            .or_insert(0) += 1;
        state.entries.remove(household_id).is_some()
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        for generation in state.generations.values_mut() {
            *generation += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::{AggregatedNeeds, HouseholdPreferences};

    fn context(id: &str) -> HouseholdContext {
        HouseholdContext {
            household_id: id.to_string(),
            members: Vec::new(),
            preferences: HouseholdPreferences::default(),
            needs: AggregatedNeeds::default(),
        }
    }

    fn fill(cache: &HouseholdCache, id: &str) {
        let generation = cache.generation(id);
        cache.insert_if_current(generation, context(id));
    }

    #[test]
    fn invalidates_single_households() {
        let cache = HouseholdCache::new();
        fill(&cache, "hh-1");
        fill(&cache, "hh-2");

        assert!(cache.get("hh-1").is_some());
        assert!(cache.invalidate("hh-1"));
        assert!(!cache.invalidate("hh-1"));
        assert!(cache.get("hh-1").is_none());
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn fill_started_before_invalidation_is_dropped() {
        let cache = HouseholdCache::new();
        let generation = cache.generation("hh-1");
        cache.invalidate("hh-1");

        let returned = cache.insert_if_current(generation, context("hh-1"));
        assert_eq!(returned.household_id, "hh-1");
        assert!(cache.get("hh-1").is_none());

        fill(&cache, "hh-1");
        assert!(cache.get("hh-1").is_some());
    }

    #[test]
    fn clear_also_drops_fills_in_flight() {
        let cache = HouseholdCache::new();
        let generation = cache.generation("hh-1");
        cache.clear();

        cache.insert_if_current(generation, context("hh-1"));
        assert!(cache.is_empty());
    }
}
