use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::db::TodoRepository;
use crate::error::ApiError;
use crate::filter::{ListFilter, ListQuery};
use crate::models::{decode_body, CreateTodo, Todo, UpdateTodo};

#[derive(Clone)]
pub struct AppState {
    repo: Arc<dyn TodoRepository>,
}

impl AppState {
    /// Runs a storage call on the blocking pool so SQLite never stalls a
    /// runtime worker.
    async fn with_repo<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&dyn TodoRepository) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let repo = Arc::clone(&self.repo);
        let value = tokio::task::spawn_blocking(move || f(repo.as_ref()))
            .await
            .context("storage task did not complete")??;
        Ok(value)
    }
}

/// Builds the full service, mounted under `/api/v1`.
pub fn app(repo: Arc<dyn TodoRepository>) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/todos", get(list_todos).post(create_todo))
        .route(
            "/todos/:id",
            get(get_todo).put(update_todo).delete(delete_todo),
        )
        .with_state(AppState { repo });

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
}

// A path that is not an integer can never name a stored todo.
fn todo_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    path.map(|Path(id)| id).map_err(|_| ApiError::NotFound)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_todos(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<Todo>>, ApiError> {
    let Query(query) = query.map_err(|err| ApiError::validation(err.body_text()))?;
    let filter = ListFilter::from_query(&query)?;
    let todos = state.with_repo(|repo| repo.fetch_all()).await?;
    Ok(Json(filter.apply(todos, Utc::now())))
}

async fn get_todo(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Todo>, ApiError> {
    let id = todo_id(path)?;
    state
        .with_repo(move |repo| repo.fetch(id))
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn create_todo(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Todo>), ApiError> {
    let new = CreateTodo::from_body(&body)?;
    let todo = state.with_repo(move |repo| repo.create(new)).await?;
    tracing::debug!(id = todo.id, "created todo");
    Ok((StatusCode::CREATED, Json(todo)))
}

async fn update_todo(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    body: Bytes,
) -> Result<Json<Todo>, ApiError> {
    let id = todo_id(path)?;
    // An unknown id is reported before anything about the body.
    if state.with_repo(move |repo| repo.fetch(id)).await?.is_none() {
        return Err(ApiError::NotFound);
    }
    let patch = decode_body::<UpdateTodo>(&body)?.validate(id)?;
    let todo = state
        .with_repo(move |repo| repo.update(id, patch))
        .await?
        .ok_or(ApiError::NotFound)?;
    tracing::debug!(id, "updated todo");
    Ok(Json(todo))
}

async fn delete_todo(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Response, ApiError> {
    let id = todo_id(path)?;
    match state.with_repo(move |repo| repo.delete(id)).await? {
        Some(todo) => {
            tracing::debug!(id, "deleted todo");
            Ok(Json(todo).into_response())
        }
        None => Ok(Json(json!({})).into_response()),
    }
}
