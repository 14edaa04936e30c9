//! Task repository for CRUD operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::DbPool;
use crate::tasks::{NewTask, Priority, Task, TaskSource, TaskStatus, TaskStore};
use crate::{Error, Result};

/// Task repository
#[derive(Clone)]
pub struct TaskRepo {
    pool: DbPool,
}

impl TaskRepo {
    /// Create a new task repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a task
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn create(&self, task: &NewTask) -> Result<Task> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        conn.execute(
            "INSERT INTO tasks (id, title, description, priority, status, project_id, user_id, source, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            rusqlite::params![
                &id,
                &task.title,
                &task.description,
                task.priority.as_str(),
                task.status.as_str(),
                &task.project_id,
                &task.user_id,
                task.source.as_str(),
                &now_str,
            ],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Task {
            id,
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority,
            status: task.status,
            project_id: task.project_id.clone(),
            user_id: task.user_id.clone(),
            source: task.source,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a task by id
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails or the task does not exist
    pub fn get(&self, id: &str) -> Result<Task> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.query_row(
            "SELECT id, title, description, priority, status, project_id, user_id, source, created_at, updated_at
             FROM tasks WHERE id = ?1",
            [id],
            row_to_task,
        )
        .map_err(|e| Error::Database(e.to_string()))
    }

    /// List tasks for a project, newest first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list_for_project(&self, project_id: &str) -> Result<Vec<Task>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT id, title, description, priority, status, project_id, user_id, source, created_at, updated_at
                 FROM tasks WHERE project_id = ?1 ORDER BY created_at DESC",
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        let tasks = stmt
            .query_map([project_id], row_to_task)
            .map_err(|e| Error::Database(e.to_string()))?
            .filter_map(std::result::Result::ok)
            .collect();

        Ok(tasks)
    }

    /// Update a task's status
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn set_status(&self, id: &str, status: TaskStatus) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
            [status.as_str(), now.as_str(), id],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl TaskStore for TaskRepo {
    async fn create_task(&self, task: NewTask) -> Result<Task> {
        self.create(&task)
    }
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        priority: Priority::parse(&row.get::<_, String>(3)?).unwrap_or_default(),
        status: TaskStatus::parse(&row.get::<_, String>(4)?).unwrap_or(TaskStatus::Todo),
        project_id: row.get(5)?,
        user_id: row.get(6)?,
        source: TaskSource::parse(&row.get::<_, String>(7)?).unwrap_or(TaskSource::Manual),
        created_at: parse_datetime(&row.get::<_, String>(8)?),
        updated_at: parse_datetime(&row.get::<_, String>(9)?),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
