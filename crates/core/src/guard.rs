use crate::models::{AggregatedNeeds, MealSlot};
use crate::text::mentions;
use crate::warnings::PlanWarning;

/// Screens planned dishes against household allergies and dislikes.
///
/// Matching is by name only, so a hit is a warning for the caller rather
/// than a rejection of the plan.
#[derive(Debug, Clone)]
pub struct ConstraintGuard {
    allergens: Vec<String>,
    dislikes: Vec<String>,
}

impl ConstraintGuard {
    pub fn new(needs: &AggregatedNeeds) -> Self {
        Self {
            allergens: needs.all_allergies.iter().cloned().collect(),
            dislikes: needs.all_dislikes.iter().cloned().collect(),
        }
    }

    pub fn review(&self, meals: &[MealSlot]) -> Vec<PlanWarning> {
        let mut warnings = Vec::new();

        for slot in meals {
            if let Some(allergen) = self
                .allergens
                .iter()
                .find(|allergen| mentions(&slot.recipe_name, allergen))
            {
                warnings.push(PlanWarning::AllergenMentioned {
                    date: slot.date,
                    meal_type: slot.meal_type,
                    recipe_name: slot.recipe_name.clone(),
                    allergen: allergen.clone(),
                });
            }

            if let Some(dislike) = self
                .dislikes
                .iter()
                .find(|dislike| mentions(&slot.recipe_name, dislike))
            {
                warnings.push(PlanWarning::DislikeMentioned {
                    date: slot.date,
                    meal_type: slot.meal_type,
                    recipe_name: slot.recipe_name.clone(),
                    dislike: dislike.clone(),
                });
            }
        }

        warnings
    }
}
