//! Dual-backend data access.
//!
//! Entities are read and written through a [`Repository`], which wraps one
//! [`Backend`] implementation chosen when the repository is built: the
//! relational [`SqlStore`] or the embedded [`DocumentStore`].

pub mod document;
mod files;
pub mod filter;
pub mod models;
pub mod sql;
mod tables;
mod users;
pub mod value;

pub use document::{DocumentStore, DocumentStoreError};
pub use filter::{Condition, Filter, FilterError, Operator};
pub use sql::SqlStore;
pub use tables::*;
pub use value::{Changes, Document, FieldValue};

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use sqlx::sqlite::SqliteRow;
use thiserror::Error;

use crate::config::DatabaseConfig;
use models::{FileRecord, User};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error("Duplicate entry in {collection}: {detail}")]
    Duplicate { collection: String, detail: String },
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("Document store error: {0}")]
    Document(#[from] DocumentStoreError),
    #[error("Failed to decode {collection} record: {source}")]
    Decode {
        collection: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Which storage technology a repository talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Relational,
    Document,
}

/// A persisted record type.
pub trait Entity:
    DeserializeOwned + for<'r> sqlx::FromRow<'r, SqliteRow> + Send + Sync + Unpin + 'static
{
    /// Table or collection name
    const COLLECTION: &'static str;
    /// Every field a filter, order or change may name
    const FIELDS: &'static [&'static str];
    /// Fields holding instants; text filter operands on them are parsed as RFC 3339
    const TIMESTAMPS: &'static [&'static str];
    /// Fields the backend keeps unique
    const UNIQUE: &'static [&'static str];
    /// Relational select list; ids are cast to text so both backends agree on their type
    const SELECT: &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

impl Order {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

/// The operations every storage backend provides for an entity.
///
/// Filters arrive untranslated; each backend translates (and thereby
/// validates) them before touching storage.
#[async_trait]
pub trait Backend<E: Entity>: Send + Sync {
    /// Insert one record and return its backend-generated id.
    async fn insert(&self, record: Changes) -> Result<String, StorageError>;
    async fn find_one(&self, filter: &Filter) -> Result<Option<E>, StorageError>;
    async fn find_many(&self, filter: &Filter, order: Option<&Order>)
        -> Result<Vec<E>, StorageError>;
    /// Apply `changes` to every match and return how many matched.
    async fn update(&self, filter: &Filter, changes: Changes) -> Result<u64, StorageError>;
    /// Remove every match and return how many were removed.
    async fn delete(&self, filter: &Filter) -> Result<u64, StorageError>;
}

/// CRUD front end over a single backend, fixed for the repository's lifetime.
pub struct Repository<E: Entity> {
    backend: Arc<dyn Backend<E>>,
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(backend: Arc<dyn Backend<E>>) -> Self {
        Self { backend }
    }

    /// Insert a record. Creation and update times come from the backend clock.
    pub async fn create(&self, record: impl Into<Changes>) -> Result<String, StorageError> {
        let record = record
            .into()
            .set("created_at", FieldValue::Now)
            .set("updated_at", FieldValue::Now);
        check_changes::<E>(&record)?;
        self.backend.insert(record).await
    }

    /// Return the first match, or `None` when nothing matches.
    pub async fn find_one(&self, filter: &Filter) -> Result<Option<E>, StorageError> {
        self.backend.find_one(filter).await
    }

    pub async fn find_many(
        &self,
        filter: &Filter,
        order: Option<&Order>,
    ) -> Result<Vec<E>, StorageError> {
        if let Some(order) = order {
            filter::check_field(E::COLLECTION, E::FIELDS, &order.field)?;
        }
        self.backend.find_many(filter, order).await
    }

    /// Partially update every match, stamping `updated_at` with the backend clock.
    pub async fn update(&self, filter: &Filter, changes: Changes) -> Result<u64, StorageError> {
        let changes = changes.set("updated_at", FieldValue::Now);
        check_changes::<E>(&changes)?;
        self.backend.update(filter, changes).await
    }

    /// Remove every match. Removing nothing is not an error.
    pub async fn delete(&self, filter: &Filter) -> Result<u64, StorageError> {
        self.backend.delete(filter).await
    }
}

fn check_changes<E: Entity>(changes: &Changes) -> Result<(), FilterError> {
    for (field, _) in changes.iter() {
        if field == "id" {
            return Err(FilterError::UnknownField {
                field: field.to_string(),
                collection: E::COLLECTION.to_string(),
            });
        }
        filter::check_field(E::COLLECTION, E::FIELDS, field)?;
    }
    Ok(())
}

pub type UserRepository = Repository<User>;
pub type FileRepository = Repository<FileRecord>;

/// An open storage backend, from which repositories are built.
#[derive(Clone)]
pub enum Connection {
    Sql(SqlStore),
    Document(DocumentStore),
}

impl Connection {
    /// Open the configured backend. The relational schema is created if missing.
    pub async fn open(config: &DatabaseConfig) -> Result<Self, StorageError> {
        match config.backend {
            BackendKind::Relational => {
                let store = SqlStore::connect(&config.url).await?;
                store.apply_schema().await?;
                Ok(Connection::Sql(store))
            }
            BackendKind::Document => Ok(Connection::Document(DocumentStore::open(
                &config.data_dir,
            )?)),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Connection::Sql(_) => BackendKind::Relational,
            Connection::Document(_) => BackendKind::Document,
        }
    }

    pub fn repository<E: Entity>(&self) -> Repository<E> {
        let backend: Arc<dyn Backend<E>> = match self {
            Connection::Sql(store) => Arc::new(store.clone()),
            Connection::Document(store) => Arc::new(store.clone()),
        };
        Repository::new(backend)
    }
}
