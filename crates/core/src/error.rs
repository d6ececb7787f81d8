use chrono::NaiveDate;
use thiserror::Error;

use crate::models::DayOfWeek;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("start date {0:?} is not a YYYY-MM-DD calendar date")]
    BadStartDate(String),

    #[error("start date {date} is a {weekday}; plans start on a monday")]
    StartDateNotMonday { date: NaiveDate, weekday: DayOfWeek },

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no JSON object found in reasoning engine output")]
    NoStructureFound,

    #[error("malformed plan JSON: {0}")]
    Malformed(String),
}

/// Failure of a planning request as reported to callers.
#[derive(Debug, Error)]
pub enum PlanningError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("household not found: {0}")]
    HouseholdNotFound(String),

    #[error("upstream failure: {0:#}")]
    Upstream(anyhow::Error),
}

impl PlanningError {
    pub fn upstream(error: impl Into<anyhow::Error>) -> Self {
        Self::Upstream(error.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Parse(_) => "parse_error",
            Self::HouseholdNotFound(_) => "not_found",
            Self::Upstream(_) => "upstream_error",
        }
    }
}
