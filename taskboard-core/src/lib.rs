//! Core library for Taskboard.
//!
//! This crate provides the todo model and the SQLite-backed store,
//! independent of the HTTP layer.
//!
//! # Usage
//!
//! ```no_run
//! use taskboard_core::db::{Database, TodoStore};
//! use taskboard_core::models::NewTodo;
//!
//! let db = Database::open_default()?;
//! db.initialize()?;
//!
//! db.insert(NewTodo::new("Buy milk", None)?)?;
//! let todos = db.list_all()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod db;
pub mod models;

// Re-export commonly used types at crate root
pub use db::{Database, StoreError, TodoStore};
