//! Persistence seam for blog records.
//!
//! The crawl engine only talks to [`BlogStore`]. [`SqliteBlogStore`] keeps
//! one row per blog holding the JSON-serialized record, ledger included.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};

use super::Blog;
use crate::db::Database;

/// Failure to load, save or delete a blog record.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database failure.
    #[error("database error for blog {blog}: {source}")]
    Database {
        /// Affected blog.
        blog: String,
        #[source]
        source: sqlx::Error,
    },

    /// The record could not be (de)serialized.
    #[error("corrupt record for blog {blog}: {source}")]
    Serialization {
        /// Affected blog.
        blog: String,
        #[source]
        source: serde_json::Error,
    },

    /// No record with this name.
    #[error("blog not found: {0}")]
    NotFound(String),

    /// Deleting the blog's download directory failed.
    #[error("could not remove files of blog {blog}: {source}")]
    Files {
        /// Affected blog.
        blog: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Creates a database error for `blog`.
    pub fn database(blog: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Database {
            blog: blog.into(),
            source,
        }
    }

    /// Creates a serialization error for `blog`.
    pub fn serialization(blog: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            blog: blog.into(),
            source,
        }
    }

    /// Name of the blog the failure concerns, when known.
    #[must_use]
    pub fn blog(&self) -> Option<&str> {
        match self {
            Self::Database { blog, .. }
            | Self::Serialization { blog, .. }
            | Self::Files { blog, .. } => Some(blog),
            Self::NotFound(blog) => Some(blog),
        }
    }
}

/// Storage contract for blog records.
#[async_trait]
pub trait BlogStore: Send + Sync {
    /// Loads one blog by name.
    async fn load(&self, name: &str) -> Result<Blog, StoreError>;

    /// Inserts or replaces a blog record.
    async fn save(&self, blog: &Blog) -> Result<(), StoreError>;

    /// Deletes a blog record. Deleting a missing blog is not an error.
    async fn delete(&self, name: &str) -> Result<(), StoreError>;

    /// Loads every stored blog ordered by name.
    async fn list_all(&self) -> Result<Vec<Blog>, StoreError>;
}

/// [`BlogStore`] backed by the SQLite `blogs` table.
#[derive(Debug, Clone)]
pub struct SqliteBlogStore {
    db: Database,
}

impl SqliteBlogStore {
    /// Wraps an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn decode(name: &str, data: &str) -> Result<Blog, StoreError> {
    serde_json::from_str(data).map_err(|e| StoreError::serialization(name, e))
}

#[async_trait]
impl BlogStore for SqliteBlogStore {
    #[instrument(skip(self))]
    async fn load(&self, name: &str) -> Result<Blog, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM blogs WHERE name = ?")
            .bind(name)
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| StoreError::database(name, e))?;

        let (data,) = row.ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        decode(name, &data)
    }

    #[instrument(skip(self, blog), fields(blog = %blog.name))]
    async fn save(&self, blog: &Blog) -> Result<(), StoreError> {
        let data =
            serde_json::to_string(blog).map_err(|e| StoreError::serialization(&blog.name, e))?;

        sqlx::query(
            r"INSERT INTO blogs (name, url, data, updated_at)
              VALUES (?, ?, ?, datetime('now'))
              ON CONFLICT(name) DO UPDATE SET
                  url = excluded.url,
                  data = excluded.data,
                  updated_at = excluded.updated_at",
        )
        .bind(&blog.name)
        .bind(&blog.url)
        .bind(&data)
        .execute(self.db.pool())
        .await
        .map_err(|e| StoreError::database(&blog.name, e))?;

        debug!(links = blog.links.len(), dirty = blog.dirty, "saved blog");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM blogs WHERE name = ?")
            .bind(name)
            .execute(self.db.pool())
            .await
            .map_err(|e| StoreError::database(name, e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_all(&self) -> Result<Vec<Blog>, StoreError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT name, data FROM blogs ORDER BY name")
                .fetch_all(self.db.pool())
                .await
                .map_err(|e| StoreError::database("*", e))?;

        rows.iter().map(|(name, data)| decode(name, data)).collect()
    }
}
