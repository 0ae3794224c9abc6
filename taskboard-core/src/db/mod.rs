mod schema;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};

use chrono::{DateTime, SecondsFormat, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{NewTodo, Todo, TodoId};

pub use schema::SCHEMA;

const DEFAULT_DB_FILENAME: &str = "taskboard.db";

const TODO_COLUMNS: &str = "id, title, description, completed, created_at, updated_at";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to connect to {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("database is not initialized")]
    NotInitialized,
    #[error("todo {0} not found")]
    NotFound(TodoId),
    #[error("invalid database url {0:?}")]
    InvalidUrl(String),
    #[error("could not determine a data directory for the default database")]
    NoDataDir,
    #[error("database connection lock poisoned")]
    Poisoned,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Record-level operations over the todo table.
///
/// Every method except [`TodoStore::initialize`] and
/// [`TodoStore::is_initialized`] fails with [`StoreError::NotInitialized`]
/// until `initialize` has succeeded once.
pub trait TodoStore: Send + Sync {
    /// Establish the connection and apply the schema. Calling it again after
    /// a success is a no-op.
    fn initialize(&self) -> Result<(), StoreError>;

    fn is_initialized(&self) -> bool;

    /// All todos, newest first.
    fn list_all(&self) -> Result<Vec<Todo>, StoreError>;

    fn get_by_id(&self, id: TodoId) -> Result<Option<Todo>, StoreError>;

    fn insert(&self, input: NewTodo) -> Result<Todo, StoreError>;

    /// Overwrite title and description. Returns `false` when no todo has `id`.
    fn update(&self, id: TodoId, input: NewTodo) -> Result<bool, StoreError>;

    /// Flip `completed`, returning the updated todo.
    fn toggle_completed(&self, id: TodoId) -> Result<Todo, StoreError>;

    /// Returns `false` when no todo has `id`.
    fn delete_by_id(&self, id: TodoId) -> Result<bool, StoreError>;
}

/// Where the SQLite database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    Memory,
    File(PathBuf),
}

impl DatabaseTarget {
    /// Accepts `sqlite::memory:`, `:memory:`, `sqlite://<path>`,
    /// `sqlite:<path>` or a bare path. A blank url or a scheme without a
    /// path is rejected rather than falling back to memory.
    pub fn parse(url: &str) -> Result<Self, StoreError> {
        let trimmed = url.trim();
        let rest = trimmed
            .strip_prefix("sqlite://")
            .or_else(|| trimmed.strip_prefix("sqlite:"))
            .unwrap_or(trimmed)
            .trim();

        match rest {
            "" => Err(StoreError::InvalidUrl(url.to_owned())),
            ":memory:" => Ok(Self::Memory),
            path => Ok(Self::File(PathBuf::from(path))),
        }
    }

    fn open(&self) -> rusqlite::Result<Connection> {
        match self {
            Self::Memory => Connection::open_in_memory(),
            Self::File(path) => Connection::open(path),
        }
    }
}

impl fmt::Display for DatabaseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("sqlite::memory:"),
            Self::File(path) => write!(f, "sqlite://{}", path.display()),
        }
    }
}

/// SQLite-backed [`TodoStore`].
///
/// The connection is opened lazily by [`TodoStore::initialize`] and then
/// shared behind a mutex for the life of the process.
pub struct Database {
    target: DatabaseTarget,
    conn: OnceLock<Mutex<Connection>>,
    init_lock: Mutex<()>,
}

impl Database {
    pub fn new(target: DatabaseTarget) -> Self {
        Self {
            target,
            conn: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    pub fn from_url(url: &str) -> Result<Self, StoreError> {
        Ok(Self::new(DatabaseTarget::parse(url)?))
    }

    pub fn in_memory() -> Self {
        Self::new(DatabaseTarget::Memory)
    }

    pub fn open_path(path: impl AsRef<Path>) -> Self {
        Self::new(DatabaseTarget::File(path.as_ref().to_path_buf()))
    }

    /// Store under the platform data directory, creating the directory if needed.
    pub fn open_default() -> Result<Self, StoreError> {
        let dirs = ProjectDirs::from("", "", "taskboard").ok_or(StoreError::NoDataDir)?;
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;
        Ok(Self::open_path(data_dir.join(DEFAULT_DB_FILENAME)))
    }

    pub fn target(&self) -> &DatabaseTarget {
        &self.target
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .get()
            .ok_or(StoreError::NotInitialized)?
            .lock()
            .map_err(|_| StoreError::Poisoned)
    }

    fn connection_error(&self, source: rusqlite::Error) -> StoreError {
        StoreError::Connection {
            target: self.target.to_string(),
            source,
        }
    }
}

impl TodoStore for Database {
    fn initialize(&self) -> Result<(), StoreError> {
        let _guard = self.init_lock.lock().map_err(|_| StoreError::Poisoned)?;
        if self.conn.get().is_some() {
            return Ok(());
        }

        let conn = self.target.open().map_err(|e| self.connection_error(e))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| self.connection_error(e))?;

        // init_lock is held, nobody else can have filled the cell
        let _ = self.conn.set(Mutex::new(conn));
        tracing::info!(database = %self.target, "database initialized");
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.conn.get().is_some()
    }

    fn list_all(&self) -> Result<Vec<Todo>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TODO_COLUMNS} FROM todos ORDER BY created_at DESC, id DESC"
        ))?;
        let todos = stmt
            .query_map([], row_to_todo)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(todos)
    }

    fn get_by_id(&self, id: TodoId) -> Result<Option<Todo>, StoreError> {
        let conn = self.lock()?;
        Ok(select_todo(&conn, id)?)
    }

    fn insert(&self, input: NewTodo) -> Result<Todo, StoreError> {
        let conn = self.lock()?;
        let now = timestamp_now();

        conn.execute(
            "INSERT INTO todos (title, description, completed, created_at, updated_at) \
             VALUES (?1, ?2, 0, ?3, ?3)",
            params![input.title(), input.description(), now],
        )?;
        let id = conn.last_insert_rowid();

        select_todo(&conn, id)?.ok_or(StoreError::NotFound(id))
    }

    fn update(&self, id: TodoId, input: NewTodo) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE todos SET title = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
            params![input.title(), input.description(), timestamp_now(), id],
        )?;
        Ok(rows > 0)
    }

    fn toggle_completed(&self, id: TodoId) -> Result<Todo, StoreError> {
        // Read and write happen under one lock acquisition.
        let conn = self.lock()?;
        let completed: bool = conn
            .query_row(
                "SELECT completed FROM todos WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StoreError::NotFound(id))?;

        conn.execute(
            "UPDATE todos SET completed = ?1 WHERE id = ?2",
            params![!completed, id],
        )?;

        select_todo(&conn, id)?.ok_or(StoreError::NotFound(id))
    }

    fn delete_by_id(&self, id: TodoId) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM todos WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}

fn select_todo(conn: &Connection, id: TodoId) -> rusqlite::Result<Option<Todo>> {
    conn.query_row(
        &format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = ?1"),
        params![id],
        row_to_todo,
    )
    .optional()
}

fn row_to_todo(row: &Row<'_>) -> rusqlite::Result<Todo> {
    Ok(Todo {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        completed: row.get(3)?,
        created_at: parse_timestamp(row, 4)?,
        updated_at: parse_timestamp(row, 5)?,
    })
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn open_memory() -> Database {
        let db = Database::in_memory();
        db.initialize().unwrap();
        db
    }

    fn new_todo(title: &str, description: Option<&str>) -> NewTodo {
        NewTodo::new(title, description).unwrap()
    }

    #[test]
    fn parses_connection_strings() {
        let parse = |url: &str| DatabaseTarget::parse(url).unwrap();

        assert_eq!(parse("sqlite::memory:"), DatabaseTarget::Memory);
        assert_eq!(parse(":memory:"), DatabaseTarget::Memory);
        assert_eq!(
            parse("sqlite://data/todos.db"),
            DatabaseTarget::File(PathBuf::from("data/todos.db"))
        );
        assert_eq!(parse("sqlite:todos.db"), DatabaseTarget::File(PathBuf::from("todos.db")));
        assert_eq!(
            parse("/var/lib/taskboard.db"),
            DatabaseTarget::File(PathBuf::from("/var/lib/taskboard.db"))
        );
    }

    #[test]
    fn blank_connection_strings_are_rejected() {
        for url in ["", "   ", "sqlite://", "sqlite:", "sqlite://  "] {
            assert!(
                matches!(DatabaseTarget::parse(url), Err(StoreError::InvalidUrl(_))),
                "{url:?} should be rejected"
            );
        }
        assert!(Database::from_url("").is_err());
    }

    #[test]
    fn operations_fail_before_initialize() {
        let db = Database::in_memory();

        assert!(!db.is_initialized());
        assert!(matches!(db.list_all(), Err(StoreError::NotInitialized)));
        assert!(matches!(db.delete_by_id(1), Err(StoreError::NotInitialized)));
    }

    #[test]
    fn initialize_is_idempotent() {
        let db = open_memory();
        db.insert(new_todo("Keep me", None)).unwrap();

        db.initialize().unwrap();

        assert!(db.is_initialized());
        assert_eq!(db.list_all().unwrap().len(), 1);
    }

    #[test]
    fn initialize_fails_for_unreachable_path() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let db = Database::open_path(blocker.join("todos.db"));
        let err = db.initialize().unwrap_err();

        assert!(matches!(err, StoreError::Connection { .. }));
        assert!(!db.is_initialized());
    }

    #[test]
    fn insert_then_list_contains_new_record() {
        let db = open_memory();

        let created = db.insert(new_todo("Buy milk", Some("two litres"))).unwrap();
        let todos = db.list_all().unwrap();

        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0], created);
        assert_eq!(todos[0].title, "Buy milk");
        assert_eq!(todos[0].description.as_deref(), Some("two litres"));
        assert!(!todos[0].completed);
        assert_eq!(todos[0].created_at, todos[0].updated_at);
    }

    #[test]
    fn insert_stores_trimmed_title() {
        let db = open_memory();
        let created = db.insert(new_todo("  A  ", None)).unwrap();
        assert_eq!(created.title, "A");
    }

    #[test]
    fn list_is_newest_first() {
        let db = open_memory();
        let a = db.insert(new_todo("A", None)).unwrap();
        let b = db.insert(new_todo("B", None)).unwrap();

        let ids: Vec<_> = db.list_all().unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[test]
    fn empty_store_lists_nothing() {
        let db = open_memory();
        assert!(db.list_all().unwrap().is_empty());
    }

    #[test]
    fn get_by_id_returns_none_when_missing() {
        let db = open_memory();
        assert_eq!(db.get_by_id(42).unwrap(), None);
    }

    #[test]
    fn update_overwrites_fields_and_keeps_created_at() {
        let db = open_memory();
        let created = db.insert(new_todo("Old", Some("old desc"))).unwrap();

        let updated = db.update(created.id, new_todo(" New ", None)).unwrap();
        assert!(updated);

        let todo = db.get_by_id(created.id).unwrap().unwrap();
        assert_eq!(todo.title, "New");
        assert_eq!(todo.description, None);
        assert_eq!(todo.created_at, created.created_at);
        assert!(todo.updated_at >= created.updated_at);
    }

    #[test]
    fn update_missing_id_is_noop() {
        let db = open_memory();
        assert!(!db.update(99, new_todo("Nobody", None)).unwrap());
        assert!(db.list_all().unwrap().is_empty());
    }

    #[test]
    fn toggle_twice_restores_original() {
        let db = open_memory();
        let created = db.insert(new_todo("Flip", None)).unwrap();

        let once = db.toggle_completed(created.id).unwrap();
        assert!(once.completed);

        let twice = db.toggle_completed(created.id).unwrap();
        assert_eq!(twice.completed, created.completed);
    }

    #[test]
    fn toggle_missing_id_is_not_found() {
        let db = open_memory();
        assert!(matches!(db.toggle_completed(5), Err(StoreError::NotFound(5))));
    }

    #[test]
    fn delete_is_idempotent() {
        let db = open_memory();
        let created = db.insert(new_todo("Gone soon", None)).unwrap();

        assert!(db.delete_by_id(created.id).unwrap());
        assert!(!db.delete_by_id(created.id).unwrap());
        assert!(!db.delete_by_id(12345).unwrap());
        assert!(db.list_all().unwrap().is_empty());
    }

    #[test]
    fn writes_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("todos.db");

        let db = Database::open_path(&path);
        db.initialize().unwrap();
        let created = db.insert(new_todo("Durable", None)).unwrap();
        db.toggle_completed(created.id).unwrap();
        drop(db);

        let reopened = Database::open_path(&path);
        reopened.initialize().unwrap();
        let todo = reopened.get_by_id(created.id).unwrap().unwrap();
        assert_eq!(todo.title, "Durable");
        assert!(todo.completed);
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let db = open_memory();
        let first = db.insert(new_todo("first", None)).unwrap();
        db.delete_by_id(first.id).unwrap();

        let second = db.insert(new_todo("second", None)).unwrap();
        assert!(second.id > first.id);
    }

    #[test]
    fn concurrent_toggles_do_not_lose_updates() {
        let db = Arc::new(open_memory());
        let created = db.insert(new_todo("Contended", None)).unwrap();

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let db = Arc::clone(&db);
                std::thread::spawn(move || db.toggle_completed(created.id).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let todo = db.get_by_id(created.id).unwrap().unwrap();
        assert!(!todo.completed);
    }
}
