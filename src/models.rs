use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{
    de::{self, DeserializeOwned, IgnoredAny},
    Deserialize, Deserializer, Serialize,
};
use serde_json::{Map, Value};

use crate::error::{ApiError, EMPTY_TITLE, EXTRA_FIELDS, ID_CHANGED, MISSING_TITLE};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Todo {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub deadline_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /todos`. Server-assigned keys are tolerated and dropped.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTodo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default, deserialize_with = "optional_timestamp")]
    pub deadline_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "id")]
    _id: Option<IgnoredAny>,
    #[serde(default, rename = "created_at")]
    _created_at: Option<IgnoredAny>,
    #[serde(default, rename = "updated_at")]
    _updated_at: Option<IgnoredAny>,
}

/// Body of `PUT /todos/{id}`. The outer `Option` tells an absent key from `null`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateTodo {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "present")]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default, deserialize_with = "present_timestamp")]
    pub deadline_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, rename = "created_at")]
    _created_at: Option<IgnoredAny>,
    #[serde(default, rename = "updated_at")]
    _updated_at: Option<IgnoredAny>,
}

/// A validated todo ready to be stored.
#[derive(Debug, Clone)]
pub struct NewTodo {
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub deadline_at: Option<DateTime<Utc>>,
}

/// A validated partial update. `None` leaves the field alone.
#[derive(Debug, Clone, Default)]
pub struct TodoPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub completed: Option<bool>,
    pub deadline_at: Option<Option<DateTime<Utc>>>,
}

impl CreateTodo {
    /// A missing or null title is reported ahead of any unknown keys.
    pub fn from_body(body: &[u8]) -> Result<NewTodo, ApiError> {
        let object = decode_object(body)?;
        if object.get("title").map_or(true, Value::is_null) {
            return Err(ApiError::validation(MISSING_TITLE));
        }
        from_object::<CreateTodo>(object)?.validate()
    }

    pub fn validate(self) -> Result<NewTodo, ApiError> {
        let title = self
            .title
            .ok_or_else(|| ApiError::validation(MISSING_TITLE))?;
        check_title(&title)?;
        Ok(NewTodo {
            title,
            description: self.description,
            completed: self.completed.unwrap_or(false),
            deadline_at: self.deadline_at,
        })
    }
}

impl UpdateTodo {
    /// `path_id` is the id from the URL; a different `id` in the body is refused.
    pub fn validate(self, path_id: i64) -> Result<TodoPatch, ApiError> {
        if self.id.is_some_and(|id| id != path_id) {
            return Err(ApiError::validation(ID_CHANGED));
        }
        let title = match self.title {
            None => None,
            Some(None) => return Err(ApiError::validation(MISSING_TITLE)),
            Some(Some(title)) => {
                check_title(&title)?;
                Some(title)
            }
        };
        Ok(TodoPatch {
            title,
            description: self.description,
            completed: self.completed,
            deadline_at: self.deadline_at,
        })
    }
}

impl TodoPatch {
    pub fn apply(self, todo: &mut Todo) {
        if let Some(title) = self.title {
            todo.title = title;
        }
        if let Some(description) = self.description {
            todo.description = description;
        }
        if let Some(completed) = self.completed {
            todo.completed = completed;
        }
        if let Some(deadline_at) = self.deadline_at {
            todo.deadline_at = deadline_at;
        }
    }
}

fn check_title(title: &str) -> Result<(), ApiError> {
    if title.trim().is_empty() {
        return Err(ApiError::validation(EMPTY_TITLE));
    }
    Ok(())
}

/// Parses a request body that must be a single JSON object.
pub fn decode_object(body: &[u8]) -> Result<Map<String, Value>, ApiError> {
    match serde_json::from_slice(body) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(ApiError::validation(
            "Invalid request body: expected a JSON object",
        )),
        Err(err) => Err(ApiError::Validation(format!("Invalid request body: {err}"))),
    }
}

/// Strict decode of an already parsed object into `T`.
pub fn from_object<T: DeserializeOwned>(object: Map<String, Value>) -> Result<T, ApiError> {
    serde_json::from_value(Value::Object(object)).map_err(|err| {
        if err.is_data() && err.to_string().starts_with("unknown field") {
            ApiError::validation(EXTRA_FIELDS)
        } else {
            ApiError::Validation(format!("Invalid request body: {err}"))
        }
    })
}

/// Decodes a request body into `T`, refusing anything but a JSON object.
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    from_object(decode_object(body)?)
}

/// Accepts RFC 3339, a naive ISO-8601 datetime (taken as UTC) or a bare date.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|value| {
        parse_timestamp(&value).ok_or_else(|| {
            <D::Error as de::Error>::custom(format!(
                "deadline_at `{value}` is not an ISO-8601 timestamp"
            ))
        })
    })
    .transpose()
}

fn present_timestamp<'de, D>(deserializer: D) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
where
    D: Deserializer<'de>,
{
    optional_timestamp(deserializer).map(Some)
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}
