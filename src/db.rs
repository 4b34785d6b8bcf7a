use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row, Transaction};

use crate::models::{NewTodo, Todo, TodoPatch};

/// Persistence the HTTP layer is written against.
///
/// Each call is one all-or-nothing unit of work. `update` and `delete` return
/// `None` when no todo has the given id.
pub trait TodoRepository: Send + Sync {
    fn create(&self, todo: NewTodo) -> anyhow::Result<Todo>;
    fn fetch(&self, id: i64) -> anyhow::Result<Option<Todo>>;
    /// All todos in ascending id order.
    fn fetch_all(&self) -> anyhow::Result<Vec<Todo>>;
    fn update(&self, id: i64, patch: TodoPatch) -> anyhow::Result<Option<Todo>>;
    fn delete(&self, id: i64) -> anyhow::Result<Option<Todo>>;
}

const COLUMNS: &str = "id, title, description, completed, deadline_at, created_at, updated_at";

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens (or creates) the SQLite file at `path`. `:memory:` gives a private
    /// in-memory database.
    pub fn connect<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("opening database at {}", path.as_ref().display()))?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs `f` inside a transaction. Commits on `Ok`; the transaction is rolled
    /// back when dropped on any other path.
    fn transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))?;
        let tx = conn.transaction().context("starting transaction")?;
        let value = f(&tx)?;
        tx.commit().context("committing transaction")?;
        Ok(value)
    }
}

fn migrate(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS todos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT,
            completed INTEGER NOT NULL DEFAULT 0,
            deadline_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .context("creating todos table")?;
    Ok(())
}

impl TodoRepository for Database {
    fn create(&self, todo: NewTodo) -> anyhow::Result<Todo> {
        self.transaction(|tx| {
            let now = Utc::now();
            tx.execute(
                "INSERT INTO todos (title, description, completed, deadline_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![
                    todo.title,
                    todo.description,
                    todo.completed,
                    todo.deadline_at.map(|at| at.to_rfc3339()),
                    now.to_rfc3339(),
                ],
            )
            .context("inserting todo")?;
            Ok(Todo {
                id: tx.last_insert_rowid(),
                title: todo.title,
                description: todo.description,
                completed: todo.completed,
                deadline_at: todo.deadline_at,
                created_at: now,
                updated_at: now,
            })
        })
    }

    fn fetch(&self, id: i64) -> anyhow::Result<Option<Todo>> {
        self.transaction(|tx| select_todo(tx, id))
    }

    fn fetch_all(&self) -> anyhow::Result<Vec<Todo>> {
        self.transaction(|tx| {
            let mut stmt = tx.prepare(&format!("SELECT {COLUMNS} FROM todos ORDER BY id ASC"))?;
            let rows = stmt.query_map([], todo_from_row)?;

            let mut todos = Vec::new();
            for todo in rows {
                todos.push(todo.context("reading todo row")?);
            }
            Ok(todos)
        })
    }

    fn update(&self, id: i64, patch: TodoPatch) -> anyhow::Result<Option<Todo>> {
        self.transaction(|tx| {
            let Some(mut todo) = select_todo(tx, id)? else {
                return Ok(None);
            };
            patch.apply(&mut todo);
            todo.updated_at = Utc::now();
            tx.execute(
                "UPDATE todos
                 SET title = ?1, description = ?2, completed = ?3, deadline_at = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![
                    todo.title,
                    todo.description,
                    todo.completed,
                    todo.deadline_at.map(|at| at.to_rfc3339()),
                    todo.updated_at.to_rfc3339(),
                    id,
                ],
            )
            .with_context(|| format!("updating todo {id}"))?;
            Ok(Some(todo))
        })
    }

    fn delete(&self, id: i64) -> anyhow::Result<Option<Todo>> {
        self.transaction(|tx| {
            let Some(todo) = select_todo(tx, id)? else {
                return Ok(None);
            };
            tx.execute("DELETE FROM todos WHERE id = ?1", params![id])
                .with_context(|| format!("deleting todo {id}"))?;
            Ok(Some(todo))
        })
    }
}

fn select_todo(tx: &Transaction<'_>, id: i64) -> anyhow::Result<Option<Todo>> {
    tx.query_row(
        &format!("SELECT {COLUMNS} FROM todos WHERE id = ?1"),
        params![id],
        todo_from_row,
    )
    .optional()
    .with_context(|| format!("loading todo {id}"))
}

fn todo_from_row(row: &Row<'_>) -> rusqlite::Result<Todo> {
    let deadline_at: Option<String> = row.get(4)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;
    Ok(Todo {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        completed: row.get(3)?,
        deadline_at: deadline_at
            .map(|value| parse_datetime(4, &value))
            .transpose()?,
        created_at: parse_datetime(5, &created_at)?,
        updated_at: parse_datetime(6, &updated_at)?,
    })
}

fn parse_datetime(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err)))
}
