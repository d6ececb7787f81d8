use std::collections::HashSet;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::error::ValidationError;
use crate::models::{DayOfWeek, MealSlot, MealType};
use crate::response::PlanResponse;
use crate::warnings::PlanWarning;

/// A validated Monday-to-Sunday planning window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanWeek {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

/// Meals resolved to concrete dates within a [`PlanWeek`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacedMeals {
    pub meals: Vec<MealSlot>,
    pub warnings: Vec<PlanWarning>,
}

pub fn parse_start_date(value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::BadStartDate(value.to_string()))
}

/// `start + 6 days`, for any parseable start date.
pub fn end_date_for(start_date: &str) -> Result<NaiveDate, ValidationError> {
    Ok(parse_start_date(start_date)? + Duration::days(6))
}

impl PlanWeek {
    pub fn starting(value: &str) -> Result<Self, ValidationError> {
        Self::from_monday(parse_start_date(value)?)
    }

    pub fn from_monday(start_date: NaiveDate) -> Result<Self, ValidationError> {
        let weekday = DayOfWeek::from(start_date.weekday());
        if weekday != DayOfWeek::Monday {
            return Err(ValidationError::StartDateNotMonday {
                date: start_date,
                weekday,
            });
        }

        Ok(Self {
            start_date,
            end_date: start_date + Duration::days(6),
        })
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }

    pub fn date_for(&self, day: DayOfWeek) -> NaiveDate {
        self.start_date + Duration::days(day.offset())
    }

    pub fn days(&self) -> impl Iterator<Item = (NaiveDate, DayOfWeek)> + '_ {
        (0..7).map(move |offset| {
            let date = self.start_date + Duration::days(offset);
            (date, DayOfWeek::from(date.weekday()))
        })
    }

    /// Resolves each decoded meal to a date in this week.
    ///
    /// The explicit date wins over the weekday label. Only the first
    /// breakfast, lunch or dinner per date is kept; snacks may repeat.
    pub fn place(&self, response: &PlanResponse) -> PlacedMeals {
        let mut placed = PlacedMeals::default();
        let mut taken = HashSet::new();

        for meal in &response.meals {
            let date = match (meal.date, meal.day) {
                (Some(date), day) => {
                    if !self.contains(date) {
                        placed.warnings.push(PlanWarning::OutsideWeek {
                            index: meal.index,
                            date,
                        });
                        continue;
                    }
                    if let Some(day) = day {
                        if day != DayOfWeek::from(date.weekday()) {
                            placed.warnings.push(PlanWarning::DayMismatch {
                                index: meal.index,
                                date,
                                day,
                            });
                        }
                    }
                    date
                }
                (None, Some(day)) => self.date_for(day),
                (None, None) => {
                    placed
                        .warnings
                        .push(PlanWarning::Unplaceable { index: meal.index });
                    continue;
                }
            };

            if meal.meal_type.is_required() && !taken.insert((date, meal.meal_type)) {
                placed.warnings.push(PlanWarning::DuplicateSlot {
                    date,
                    meal_type: meal.meal_type,
                });
                continue;
            }

            placed.meals.push(MealSlot {
                date,
                day: DayOfWeek::from(date.weekday()),
                meal_type: meal.meal_type,
                recipe_id: meal.recipe_id.clone(),
                recipe_name: meal.recipe_name.clone(),
                recipe_image: meal.recipe_image.clone(),
                ready_in_minutes: meal.ready_in_minutes,
                servings: meal.servings,
                source_url: meal.source_url.clone(),
                source: meal.source,
                is_user_meal: meal.is_user_meal,
            });
        }

        placed.meals.sort_by_key(|slot| (slot.date, slot.meal_type));
        placed
    }

    /// One warning per day missing breakfast, lunch or dinner.
    pub fn coverage_warnings(&self, meals: &[MealSlot]) -> Vec<PlanWarning> {
        let covered = meals
            .iter()
            .map(|slot| (slot.date, slot.meal_type))
            .collect::<HashSet<_>>();

        self.days()
            .flat_map(|(date, _)| MealType::REQUIRED.into_iter().map(move |meal_type| (date, meal_type)))
            .filter(|slot| !covered.contains(slot))
            .map(|(date, meal_type)| PlanWarning::MissingSlot { date, meal_type })
            .collect()
    }
}
