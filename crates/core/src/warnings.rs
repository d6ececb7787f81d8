use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{DayOfWeek, MealSource, MealType};

/// Non-fatal finding raised while shaping a generated plan.
///
/// `index` fields refer to the zero-based position of the entry in the
/// reasoning engine's `meals` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanWarning {
    MalformedEntry {
        index: usize,
        reason: String,
    },
    UnknownMealType {
        index: usize,
        value: Option<String>,
    },
    MissingRecipeName {
        index: usize,
    },
    SourceMismatch {
        index: usize,
        source: MealSource,
        is_user_meal: bool,
    },
    Unplaceable {
        index: usize,
    },
    OutsideWeek {
        index: usize,
        date: NaiveDate,
    },
    DayMismatch {
        index: usize,
        date: NaiveDate,
        day: DayOfWeek,
    },
    DuplicateSlot {
        date: NaiveDate,
        meal_type: MealType,
    },
    MissingSlot {
        date: NaiveDate,
        meal_type: MealType,
    },
    AllergenMentioned {
        date: NaiveDate,
        meal_type: MealType,
        recipe_name: String,
        allergen: String,
    },
    DislikeMentioned {
        date: NaiveDate,
        meal_type: MealType,
        recipe_name: String,
        dislike: String,
    },
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedEntry { index, reason } => {
                write!(f, "meal #{index} could not be read: {reason}")
            }
            Self::UnknownMealType { index, value } => match value {
                Some(value) => write!(f, "meal #{index} has unknown meal type {value:?}"),
                None => write!(f, "meal #{index} has no meal type"),
            },
            Self::MissingRecipeName { index } => write!(f, "meal #{index} has no recipe name"),
            Self::SourceMismatch {
                index,
                source,
                is_user_meal,
            } => write!(
                f,
                "meal #{index} says source {source:?} but isUserMeal={is_user_meal}; source kept"
            ),
            Self::Unplaceable { index } => write!(f, "meal #{index} has neither date nor day"),
            Self::OutsideWeek { index, date } => {
                write!(f, "meal #{index} is dated {date}, outside the plan week")
            }
            Self::DayMismatch { index, date, day } => {
                write!(f, "meal #{index} is dated {date} but labelled {day}; date kept")
            }
            Self::DuplicateSlot { date, meal_type } => {
                write!(f, "{meal_type} on {date} was planned twice; first kept")
            }
            Self::MissingSlot { date, meal_type } => write!(f, "no {meal_type} planned on {date}"),
            Self::AllergenMentioned {
                date,
                meal_type,
                recipe_name,
                allergen,
            } => write!(
                f,
                "{meal_type} on {date} ({recipe_name}) mentions allergen {allergen:?}"
            ),
            Self::DislikeMentioned {
                date,
                meal_type,
                recipe_name,
                dislike,
            } => write!(
                f,
                "{meal_type} on {date} ({recipe_name}) mentions disliked {dislike:?}"
            ),
        }
    }
}
