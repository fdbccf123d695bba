use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use redb::{Database as RedbDatabase, ReadableTable};
use thiserror::Error;

use super::filter::{DocumentQuery, Filter};
use super::tables::{collection, FILES, SEQUENCES, USERS};
use super::value::{Changes, Document, FieldValue};
use super::{Backend, Direction, Entity, Order, StorageError};

#[derive(Debug, Error)]
pub enum DocumentStoreError {
    #[error("Commit error: {0}")]
    Commit(Box<redb::CommitError>),
    #[error("Database error: {0}")]
    Redb(Box<redb::Error>),
    #[error("Database error: {0}")]
    RedbDatabase(Box<redb::DatabaseError>),
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),
    #[error("Storage error: {0}")]
    Storage(Box<redb::StorageError>),
    #[error("Table error: {0}")]
    Table(Box<redb::TableError>),
    #[error("Transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
}

impl From<redb::CommitError> for DocumentStoreError {
    fn from(e: redb::CommitError) -> Self {
        DocumentStoreError::Commit(Box::new(e))
    }
}

impl From<redb::DatabaseError> for DocumentStoreError {
    fn from(e: redb::DatabaseError) -> Self {
        DocumentStoreError::RedbDatabase(Box::new(e))
    }
}

impl From<redb::Error> for DocumentStoreError {
    fn from(e: redb::Error) -> Self {
        DocumentStoreError::Redb(Box::new(e))
    }
}

impl From<redb::StorageError> for DocumentStoreError {
    fn from(e: redb::StorageError) -> Self {
        DocumentStoreError::Storage(Box::new(e))
    }
}

impl From<redb::TableError> for DocumentStoreError {
    fn from(e: redb::TableError) -> Self {
        DocumentStoreError::Table(Box::new(e))
    }
}

impl From<redb::TransactionError> for DocumentStoreError {
    fn from(e: redb::TransactionError) -> Self {
        DocumentStoreError::Transaction(Box::new(e))
    }
}

// redb errors reach StorageError through DocumentStoreError so callers only see one variant.
macro_rules! redb_into_storage {
    ($($ty:ty),*) => {
        $(impl From<$ty> for StorageError {
            fn from(e: $ty) -> Self {
                StorageError::Document(e.into())
            }
        })*
    };
}

redb_into_storage!(
    redb::CommitError,
    redb::StorageError,
    redb::TableError,
    redb::TransactionError,
    rmp_serde::decode::Error,
    rmp_serde::encode::Error
);

/// Reserved document key holding the insertion sequence number
const SEQ_FIELD: &str = "_seq";

/// Embedded document backend. Each collection is a redb table of
/// msgpack-encoded field maps keyed by a generated id.
pub struct DocumentStore {
    db: Arc<RedbDatabase>,
}

impl Clone for DocumentStore {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

impl DocumentStore {
    /// Open or create the document store under `data_dir`
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DocumentStoreError> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let db_path = data_dir.as_ref().join("file-vault.redb");
        let db = Arc::new(RedbDatabase::create(db_path)?);

        // Collections must exist before the first read transaction opens them
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(FILES)?;
            let _ = write_txn.open_table(SEQUENCES)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }
}

fn load_all<T>(table: &T) -> Result<Vec<(String, Document)>, StorageError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut docs = Vec::new();
    for entry in table.iter()? {
        let (key, value) = entry?;
        let doc: Document = rmp_serde::from_slice(value.value())?;
        docs.push((key.value().to_string(), doc));
    }
    Ok(docs)
}

fn decode<E: Entity>(doc: &Document) -> Result<E, StorageError> {
    let object: serde_json::Map<String, serde_json::Value> = doc
        .iter()
        .filter(|(field, _)| field.as_str() != SEQ_FIELD)
        .map(|(field, value)| (field.clone(), value.to_json()))
        .collect();
    serde_json::from_value(serde_json::Value::Object(object)).map_err(|source| {
        StorageError::Decode {
            collection: E::COLLECTION.to_string(),
            source,
        }
    })
}

/// Insertion order, the document counterpart of a SQL rowid
fn sequence(doc: &Document) -> i64 {
    match doc.get(SEQ_FIELD) {
        Some(FieldValue::Int(seq)) => *seq,
        _ => 0,
    }
}

fn resolve(value: &FieldValue, now: chrono::DateTime<Utc>) -> FieldValue {
    match value {
        FieldValue::Now => FieldValue::Timestamp(now),
        FieldValue::Timestamp(ts) => FieldValue::Timestamp(ts.trunc_subsecs(6)),
        other => other.clone(),
    }
}

/// Reject `doc` if another document (any id outside `skip`) already holds one of its unique values.
fn check_unique<E: Entity>(
    existing: &[(String, Document)],
    doc: &Document,
    skip: &[&str],
) -> Result<(), StorageError> {
    for field in E::UNIQUE {
        let Some(value) = doc.get(*field).filter(|v| !v.is_null()) else {
            continue;
        };
        let taken = existing.iter().any(|(id, other)| {
            !skip.contains(&id.as_str()) && other.get(*field) == Some(value)
        });
        if taken {
            return Err(StorageError::Duplicate {
                collection: E::COLLECTION.to_string(),
                detail: format!("{field} already exists"),
            });
        }
    }
    Ok(())
}

impl DocumentStore {
    fn query<E: Entity>(filter: &Filter) -> Result<DocumentQuery, StorageError> {
        Ok(filter.to_document(E::COLLECTION, E::FIELDS, E::TIMESTAMPS)?)
    }

    fn matching<E: Entity>(&self, query: &DocumentQuery) -> Result<Vec<Document>, StorageError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(collection(E::COLLECTION))?;
        let mut docs: Vec<Document> = load_all(&table)?
            .into_iter()
            .map(|(_, doc)| doc)
            .filter(|doc| query.matches(doc))
            .collect();
        docs.sort_by_key(sequence);
        Ok(docs)
    }
}

#[async_trait]
impl<E: Entity> Backend<E> for DocumentStore {
    async fn insert(&self, record: Changes) -> Result<String, StorageError> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let now = Utc::now().trunc_subsecs(6);

        let mut doc = Document::new();
        doc.insert("id".to_string(), FieldValue::Text(id.clone()));
        for (field, value) in record.iter() {
            doc.insert(field.to_string(), resolve(value, now));
        }

        let write_txn = self.db.begin_write()?;
        {
            let mut sequences = write_txn.open_table(SEQUENCES)?;
            let seq = sequences
                .get(E::COLLECTION)?
                .map(|last| last.value())
                .unwrap_or(0)
                + 1;
            sequences.insert(E::COLLECTION, seq)?;
            doc.insert(
                SEQ_FIELD.to_string(),
                FieldValue::Int(i64::try_from(seq).unwrap_or(i64::MAX)),
            );

            let mut table = write_txn.open_table(collection(E::COLLECTION))?;
            if !E::UNIQUE.is_empty() {
                let existing = load_all(&table)?;
                check_unique::<E>(&existing, &doc, &[])?;
            }
            let data = rmp_serde::to_vec_named(&doc)?;
            table.insert(id.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;

        Ok(id)
    }

    async fn find_one(&self, filter: &Filter) -> Result<Option<E>, StorageError> {
        let query = Self::query::<E>(filter)?;
        match self.matching::<E>(&query)?.first() {
            Some(doc) => Ok(Some(decode(doc)?)),
            None => Ok(None),
        }
    }

    async fn find_many(
        &self,
        filter: &Filter,
        order: Option<&Order>,
    ) -> Result<Vec<E>, StorageError> {
        let query = Self::query::<E>(filter)?;
        let mut docs = self.matching::<E>(&query)?;

        if let Some(order) = order {
            docs.sort_by(|a, b| {
                let left = a.get(&order.field).unwrap_or(&FieldValue::Null);
                let right = b.get(&order.field).unwrap_or(&FieldValue::Null);
                let ordering = left
                    .compare(right)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| sequence(a).cmp(&sequence(b)));
                match order.direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            });
        }

        docs.iter().map(decode).collect()
    }

    async fn update(&self, filter: &Filter, changes: Changes) -> Result<u64, StorageError> {
        let query = Self::query::<E>(filter)?;
        // The store's clock, read inside the write transaction
        let now = Utc::now().trunc_subsecs(6);

        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(collection(E::COLLECTION))?;
            let existing = load_all(&table)?;
            let targets: Vec<&(String, Document)> =
                existing.iter().filter(|(_, doc)| query.matches(doc)).collect();
            let target_ids: Vec<&str> = targets.iter().map(|(id, _)| id.as_str()).collect();

            let mut rewritten = Vec::with_capacity(targets.len());
            for (id, doc) in &targets {
                let mut doc = doc.clone();
                for (field, value) in changes.iter() {
                    doc.insert(field.to_string(), resolve(value, now));
                }
                rewritten.push((id.as_str(), doc));
            }

            let touches_unique = changes.iter().any(|(field, _)| E::UNIQUE.contains(&field));
            if touches_unique {
                if rewritten.len() > 1 {
                    return Err(StorageError::Duplicate {
                        collection: E::COLLECTION.to_string(),
                        detail: "update would assign one unique value to several records"
                            .to_string(),
                    });
                }
                for (_, doc) in &rewritten {
                    check_unique::<E>(&existing, doc, &target_ids)?;
                }
            }

            for (id, doc) in &rewritten {
                let data = rmp_serde::to_vec_named(doc)?;
                table.insert(*id, data.as_slice())?;
            }
            rewritten.len() as u64
        };
        write_txn.commit()?;

        Ok(updated)
    }

    async fn delete(&self, filter: &Filter) -> Result<u64, StorageError> {
        let query = Self::query::<E>(filter)?;

        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(collection(E::COLLECTION))?;
            let ids: Vec<String> = load_all(&table)?
                .into_iter()
                .filter(|(_, doc)| query.matches(doc))
                .map(|(id, _)| id)
                .collect();
            for id in &ids {
                table.remove(id.as_str())?;
            }
            ids.len() as u64
        };
        write_txn.commit()?;

        Ok(removed)
    }
}
