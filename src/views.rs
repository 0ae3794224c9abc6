//! HTML pages, rendered with Tera from templates compiled into the binary.

use chrono::{DateTime, Utc};
use serde::Serialize;
use taskboard_core::models::{Todo, TodoId, TodoStats};
use tera::{Context, Tera};

const BASE_TEMPLATE: &str = include_str!("../templates/base.html");
const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");
const EDIT_TEMPLATE: &str = include_str!("../templates/edit.html");
const ERROR_TEMPLATE: &str = include_str!("../templates/error.html");

/// Error indicator carried in redirect query strings (`?error=<code>`).
///
/// Only the code travels in the URL; the text shown to the user comes from
/// [`ErrorCode::message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    TitleRequired,
    NotFound,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TitleRequired => "title_required",
            Self::NotFound => "not_found",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "title_required" => Some(Self::TitleRequired),
            "not_found" => Some(Self::NotFound),
            _ => None,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::TitleRequired => "Title is required",
            Self::NotFound => "Todo not found",
        }
    }
}

#[derive(Debug, Serialize)]
struct TodoView<'a> {
    id: TodoId,
    title: &'a str,
    description: Option<&'a str>,
    completed: bool,
    created_at: String,
    updated_at: String,
}

impl<'a> From<&'a Todo> for TodoView<'a> {
    fn from(todo: &'a Todo) -> Self {
        Self {
            id: todo.id,
            title: &todo.title,
            description: todo.description.as_deref(),
            completed: todo.completed,
            created_at: format_timestamp(todo.created_at),
            updated_at: format_timestamp(todo.updated_at),
        }
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

pub struct Views {
    tera: Tera,
}

impl Views {
    pub fn new() -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("base.html", BASE_TEMPLATE),
            ("index.html", INDEX_TEMPLATE),
            ("edit.html", EDIT_TEMPLATE),
        ])?;
        Ok(Self { tera })
    }

    pub fn index(
        &self,
        todos: &[Todo],
        stats: &TodoStats,
        error: Option<ErrorCode>,
    ) -> Result<String, tera::Error> {
        let todos: Vec<TodoView<'_>> = todos.iter().map(TodoView::from).collect();

        let mut context = Context::new();
        context.insert("todos", &todos);
        context.insert("stats", stats);
        context.insert("error", &error.map(|code| code.message()));
        self.tera.render("index.html", &context)
    }

    pub fn edit(&self, todo: &Todo, error: Option<ErrorCode>) -> Result<String, tera::Error> {
        let mut context = Context::new();
        context.insert("todo", &TodoView::from(todo));
        context.insert("error", &error.map(|code| code.message()));
        self.tera.render("edit.html", &context)
    }
}

/// Standalone error page; needs no [`Views`] so error responses can render it.
pub fn render_error_page(message: &str) -> Result<String, tera::Error> {
    let mut context = Context::new();
    context.insert("error", message);
    Tera::one_off(ERROR_TEMPLATE, &context, true)
}
