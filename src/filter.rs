//! Query-string filtering for `GET /todos`.
//!
//! Parameters are validated once, up front, so a bad `completed` or `window`
//! value is reported even when the store is empty.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;

use crate::error::{ApiError, BAD_COMPLETED, BAD_WINDOW};
use crate::models::Todo;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub completed: Option<String>,
    pub window: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ListFilter {
    completed: Option<bool>,
    window: Option<TimeDelta>,
}

impl ListFilter {
    pub fn from_query(query: &ListQuery) -> Result<Self, ApiError> {
        let completed = query
            .completed
            .as_deref()
            .map(parse_completed)
            .transpose()?;
        let window = query.window.as_deref().map(parse_window).transpose()?;
        Ok(Self { completed, window })
    }

    /// Both rules must hold. A todo without a deadline never falls inside a window.
    pub fn matches(&self, todo: &Todo, now: DateTime<Utc>) -> bool {
        if let Some(completed) = self.completed {
            if todo.completed != completed {
                return false;
            }
        }
        if let Some(window) = self.window {
            match todo.deadline_at {
                Some(deadline) if deadline - now <= window => {}
                _ => return false,
            }
        }
        true
    }

    pub fn apply(&self, todos: Vec<Todo>, now: DateTime<Utc>) -> Vec<Todo> {
        todos
            .into_iter()
            .filter(|todo| self.matches(todo, now))
            .collect()
    }
}

fn parse_completed(raw: &str) -> Result<bool, ApiError> {
    if raw.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(ApiError::validation(BAD_COMPLETED))
    }
}

fn parse_window(raw: &str) -> Result<TimeDelta, ApiError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(TimeDelta::try_days)
        .ok_or_else(|| ApiError::validation(BAD_WINDOW))
}
