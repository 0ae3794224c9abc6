use std::sync::Arc;

use axum::{
    extract::{FromRequest, Path, Query, Request, State},
    http::header,
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskboard_core::models::{NewTodo, Todo, TodoId, TodoStats};

use super::{with_store, ApiError, AppState, PageError};
use crate::views::ErrorCode;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TodoForm {
    pub title: String,
    pub description: Option<String>,
}

impl TodoForm {
    fn validate(&self) -> Option<NewTodo> {
        NewTodo::new(&self.title, self.description.as_deref()).ok()
    }
}

/// Todo body sent either as a JSON object or as an urlencoded form,
/// chosen by `Content-Type`.
#[derive(Debug)]
pub struct TodoPayload(pub TodoForm);

impl<S> FromRequest<S> for TodoPayload
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_json(&req) {
            let Json(form) = Json::<TodoForm>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Self(form))
        } else {
            let Form(form) = Form::<TodoForm>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Self(form))
        }
    }
}

fn is_json(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
        })
        .unwrap_or(false)
}

/// `?error=<code>`; unknown codes are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct NoticeQuery {
    error: Option<String>,
}

impl NoticeQuery {
    fn code(&self) -> Option<ErrorCode> {
        self.error.as_deref().and_then(ErrorCode::from_str)
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub database: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// Non-numeric ids match nothing and take the route's not-found path.
fn parse_id(raw: &str) -> Option<TodoId> {
    raw.trim().parse().ok()
}

fn redirect_with_error(path: &str, code: ErrorCode) -> Redirect {
    Redirect::to(&format!("{path}?error={}", code.as_str()))
}

pub async fn list_page(
    State(state): State<AppState>,
    Query(notice): Query<NoticeQuery>,
) -> Result<Html<String>, PageError> {
    let todos = with_store(Arc::clone(&state.store), |s| s.list_all()).await?;
    let stats = TodoStats::from_todos(&todos);
    let html = state.views.index(&todos, &stats, notice.code())?;
    Ok(Html(html))
}

pub async fn create_todo(
    State(state): State<AppState>,
    TodoPayload(form): TodoPayload,
) -> Result<Redirect, PageError> {
    let Some(input) = form.validate() else {
        return Ok(redirect_with_error("/", ErrorCode::TitleRequired));
    };

    let todo = with_store(Arc::clone(&state.store), move |s| s.insert(input)).await?;
    tracing::info!(id = todo.id, title = %todo.title, "created todo");
    Ok(Redirect::to("/"))
}

pub async fn toggle_todo(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Redirect, ApiError> {
    let id = parse_id(&raw_id).ok_or_else(|| ApiError::not_found("Todo not found"))?;

    let todo = with_store(Arc::clone(&state.store), move |s| s.toggle_completed(id)).await?;
    tracing::info!(id, completed = todo.completed, "toggled todo");
    Ok(Redirect::to("/"))
}

pub async fn delete_todo(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Redirect, ApiError> {
    if let Some(id) = parse_id(&raw_id) {
        let deleted = with_store(Arc::clone(&state.store), move |s| s.delete_by_id(id)).await?;
        tracing::info!(id, deleted, "deleted todo");
    }
    Ok(Redirect::to("/"))
}

pub async fn edit_page(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Query(notice): Query<NoticeQuery>,
) -> Result<Response, PageError> {
    let todo = match parse_id(&raw_id) {
        Some(id) => with_store(Arc::clone(&state.store), move |s| s.get_by_id(id)).await?,
        None => None,
    };
    let Some(todo) = todo else {
        return Ok(redirect_with_error("/", ErrorCode::NotFound).into_response());
    };

    let html = state.views.edit(&todo, notice.code())?;
    Ok(Html(html).into_response())
}

pub async fn update_todo(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    TodoPayload(form): TodoPayload,
) -> Result<Redirect, PageError> {
    let Some(id) = parse_id(&raw_id) else {
        return Ok(redirect_with_error("/", ErrorCode::NotFound));
    };
    let Some(input) = form.validate() else {
        return Ok(redirect_with_error(
            &format!("/todos/{id}/edit"),
            ErrorCode::TitleRequired,
        ));
    };

    let updated = with_store(Arc::clone(&state.store), move |s| s.update(id, input)).await?;
    tracing::info!(id, updated, "updated todo");
    Ok(Redirect::to("/"))
}

pub async fn list_todos_json(State(state): State<AppState>) -> Result<Json<Vec<Todo>>, ApiError> {
    let todos = with_store(Arc::clone(&state.store), |s| s.list_all()).await?;
    Ok(Json(todos))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok",
        database: state.gate.state().as_str(),
        timestamp: Utc::now(),
    })
}
