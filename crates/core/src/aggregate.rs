//! Household constraint aggregation.
//!
//! Folds every member's restrictions, allergies and dislikes into one
//! household-level constraint set and flags members who eat separately.
//! Sets are ordered, so the result is identical for any ordering of the
//! member list.

use std::collections::BTreeSet;

use crate::models::{AggregatedNeeds, FamilyMember, MemberRef};

/// Restriction vocabulary understood by the recipe-search service.
const DIET_TOKENS: &[(&str, &str)] = &[
    ("vegetarian", "vegetarian"),
    ("vegan", "vegan"),
    ("gluten-free", "gluten free"),
    ("gluten free", "gluten free"),
    ("dairy-free", "dairy free"),
    ("dairy free", "dairy free"),
    ("keto", "ketogenic"),
    ("ketogenic", "ketogenic"),
    ("paleo", "paleo"),
    ("whole30", "whole30"),
    ("pescetarian", "pescetarian"),
    ("lacto-vegetarian", "lacto-vegetarian"),
    ("ovo-vegetarian", "ovo-vegetarian"),
];

pub fn aggregate(members: &[FamilyMember]) -> AggregatedNeeds {
    let mut needs = AggregatedNeeds::default();
    let mut separate = Vec::new();

    for member in members {
        union_into(&mut needs.all_restrictions, &member.dietary_restrictions);
        union_into(&mut needs.all_allergies, &member.allergies);
        union_into(&mut needs.all_dislikes, &member.dislikes);

        if !member.same_as_adults {
            separate.push(MemberRef::from(member));
        }
    }

    // Blank ids are not identities; only a repeated real id collapses.
    separate.sort();
    separate.dedup_by(|later, earlier| !later.id.is_empty() && later.id == earlier.id);
    needs.members_with_different_meals = separate;
    needs
}

/// Canonical diet token for a single restriction, if the service knows it.
pub fn diet_token(restriction: &str) -> Option<&'static str> {
    let key = restriction.trim().to_lowercase();
    DIET_TOKENS
        .iter()
        .find(|(internal, _)| *internal == key)
        .map(|(_, token)| *token)
}

/// First restriction (in iteration order) that maps to a diet token.
///
/// Only one diet is ever sent to recipe search; combinations are not merged.
pub fn map_diet<I, S>(restrictions: I) -> Option<&'static str>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    restrictions
        .into_iter()
        .find_map(|restriction| diet_token(restriction.as_ref()))
}

impl AggregatedNeeds {
    /// Diet token for the whole household, taken over the ordered restriction set.
    pub fn diet(&self) -> Option<&'static str> {
        map_diet(&self.all_restrictions)
    }

    pub fn is_unconstrained(&self) -> bool {
        self.all_restrictions.is_empty()
            && self.all_allergies.is_empty()
            && self.all_dislikes.is_empty()
    }
}

fn union_into(target: &mut BTreeSet<String>, values: &[String]) {
    target.extend(
        values
            .iter()
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MealPreferences;

    fn member(id: &str, restrictions: &[&str], allergies: &[&str], same: bool) -> FamilyMember {
        FamilyMember {
            id: id.to_string(),
            name: format!("member {id}"),
            age: None,
            dietary_restrictions: restrictions.iter().map(|v| v.to_string()).collect(),
            allergies: allergies.iter().map(|v| v.to_string()).collect(),
            likes: Vec::new(),
            dislikes: vec!["olives".to_string()],
            same_as_adults: same,
            meal_preferences: None,
        }
    }

    fn household() -> Vec<FamilyMember> {
        let mut junior = member("c1", &["vegetarian"], &["peanuts"], false);
        junior.age = Some(5);
        junior.meal_preferences = Some(MealPreferences {
            breakfast: vec!["pancakes".to_string()],
            lunch: vec!["mac and cheese".to_string()],
            dinner: vec!["nuggets".to_string()],
        });

        vec![
            member("a1", &["gluten-free"], &["shellfish"], true),
            junior,
            member("a2", &["vegetarian", "keto"], &[], true),
            member("c2", &[], &["peanuts", " "], false),
        ]
    }

    #[test]
    fn unions_constraints_across_members() {
        let needs = aggregate(&household());

        assert_eq!(
            needs.all_restrictions.iter().collect::<Vec<_>>(),
            vec!["gluten-free", "keto", "vegetarian"]
        );
        assert_eq!(
            needs.all_allergies.iter().collect::<Vec<_>>(),
            vec!["peanuts", "shellfish"]
        );
        assert_eq!(needs.all_dislikes.len(), 1);
    }

    #[test]
    fn result_is_invariant_under_member_order() {
        let members = household();
        let expected = aggregate(&members);

        let mut reversed = members.clone();
        reversed.reverse();
        assert_eq!(aggregate(&reversed), expected);

        let mut rotated = members;
        rotated.rotate_left(1);
        assert_eq!(aggregate(&rotated), expected);
    }

    #[test]
    fn flags_each_separate_eater_exactly_once() {
        let needs = aggregate(&household());
        let ids = needs
            .members_with_different_meals
            .iter()
            .map(|m| m.id.as_str())
            .collect::<Vec<_>>();

        assert_eq!(ids, vec!["c1", "c2"]);
        assert_eq!(
            needs.members_with_different_meals[0]
                .meal_preferences
                .as_ref()
                .map(|prefs| prefs.breakfast.clone()),
            Some(vec!["pancakes".to_string()])
        );
    }

    #[test]
    fn separate_eaters_without_ids_are_all_kept() {
        let mut ava = member("", &[], &[], false);
        ava.name = "Ava".to_string();
        let mut ben = member("", &[], &[], false);
        ben.name = "Ben".to_string();

        let forward = aggregate(&[ava.clone(), ben.clone()]);
        let backward = aggregate(&[ben, ava]);
        assert_eq!(forward, backward);

        let names = forward
            .members_with_different_meals
            .iter()
            .map(|m| m.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Ava", "Ben"]);
    }

    #[test]
    fn repeated_member_id_is_flagged_once() {
        let kid = member("c1", &[], &[], false);
        let needs = aggregate(&[kid.clone(), kid]);
        assert_eq!(needs.members_with_different_meals.len(), 1);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let members = household();
        assert_eq!(aggregate(&members), aggregate(&members));
    }

    #[test]
    fn empty_household_yields_empty_needs() {
        let needs = aggregate(&[]);
        assert!(needs.is_unconstrained());
        assert!(needs.members_with_different_meals.is_empty());
        assert_eq!(needs.diet(), None);
    }

    #[test]
    fn first_mapped_restriction_wins() {
        assert_eq!(map_diet(["vegan", "gluten-free"]), Some("vegan"));
        assert_eq!(map_diet(["keto"]), Some("ketogenic"));
        assert_eq!(map_diet(["unknown-diet"]), None);
        assert_eq!(map_diet(["low-sodium", "Gluten-Free"]), Some("gluten free"));
    }

    #[test]
    fn household_diet_follows_ordered_restrictions() {
        let needs = aggregate(&household());
        assert!(needs.all_restrictions.contains("vegetarian"));
        assert_eq!(needs.diet(), Some("gluten free"));
    }
}
