use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};

use super::filter::{Filter, SqlPredicate, SqlTest};
use super::value::{format_timestamp, Changes, FieldValue};
use super::{Backend, Direction, Entity, Order, StorageError};

/// Schema for the relational backend, applied once at startup.
const SCHEMA: &str = include_str!("schema.sql");

/// The database's own clock, in the same fixed-width text form as bound timestamps.
const NOW_SQL: &str = "strftime('%Y-%m-%dT%H:%M:%f000+00:00', 'now')";

/// Relational backend over a SQLite connection pool.
#[derive(Clone)]
pub struct SqlStore {
    pool: SqlitePool,
}

impl SqlStore {
    /// Connect to `url` (e.g. `sqlite://./data/file-vault.db`), creating the file if needed.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the tables if they do not exist yet.
    pub async fn apply_schema(&self) -> Result<(), StorageError> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn push_value(qb: &mut QueryBuilder<'_, Sqlite>, value: &FieldValue) {
    match value {
        FieldValue::Now => {
            qb.push(NOW_SQL);
        }
        FieldValue::Null => {
            qb.push_bind(None::<String>);
        }
        FieldValue::Bool(b) => {
            qb.push_bind(*b);
        }
        FieldValue::Int(i) => {
            qb.push_bind(*i);
        }
        FieldValue::Float(f) => {
            qb.push_bind(*f);
        }
        FieldValue::Text(s) => {
            qb.push_bind(s.clone());
        }
        FieldValue::Timestamp(ts) => {
            qb.push_bind(format_timestamp(ts));
        }
    }
}

fn push_predicate(qb: &mut QueryBuilder<'_, Sqlite>, predicate: &SqlPredicate) {
    for (i, term) in predicate.terms.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        qb.push(&term.column);
        match &term.test {
            SqlTest::IsNull => {
                qb.push(" IS NULL");
            }
            SqlTest::Compare(op, value) => {
                qb.push(format!(" {} ", op.as_sql()));
                push_value(qb, value);
            }
        }
    }
}

fn push_order(qb: &mut QueryBuilder<'_, Sqlite>, order: &Order) {
    let direction = match order.direction {
        Direction::Asc => "ASC",
        Direction::Desc => "DESC",
    };
    // rowid breaks ties between rows written within the same millisecond
    qb.push(format!(
        " ORDER BY {} {direction}, rowid {direction}",
        order.field
    ));
}

fn map_error(collection: &str, e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Duplicate {
            collection: collection.to_string(),
            detail: db.message().to_string(),
        },
        _ => StorageError::Sql(e),
    }
}

#[async_trait]
impl<E: Entity> Backend<E> for SqlStore {
    async fn insert(&self, record: Changes) -> Result<String, StorageError> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("INSERT INTO {} (", E::COLLECTION));
        for (i, (field, _)) in record.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(field);
        }
        qb.push(") VALUES (");
        for (i, (_, value)) in record.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            push_value(&mut qb, value);
        }
        qb.push(")");

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| map_error(E::COLLECTION, e))?;
        Ok(result.last_insert_rowid().to_string())
    }

    async fn find_one(&self, filter: &Filter) -> Result<Option<E>, StorageError> {
        let predicate = filter.to_sql(E::COLLECTION, E::FIELDS, E::TIMESTAMPS)?;

        let mut qb =
            QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM {}", E::SELECT, E::COLLECTION));
        push_predicate(&mut qb, &predicate);
        qb.push(" LIMIT 1");

        let row = qb.build_query_as::<E>().fetch_optional(&self.pool).await?;
        Ok(row)
    }

    async fn find_many(
        &self,
        filter: &Filter,
        order: Option<&Order>,
    ) -> Result<Vec<E>, StorageError> {
        let predicate = filter.to_sql(E::COLLECTION, E::FIELDS, E::TIMESTAMPS)?;
        tracing::trace!(
            collection = E::COLLECTION,
            clause = %predicate.clause(),
            binds = predicate.binds().len(),
            "Selecting rows"
        );

        let mut qb =
            QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM {}", E::SELECT, E::COLLECTION));
        push_predicate(&mut qb, &predicate);
        if let Some(order) = order {
            push_order(&mut qb, order);
        }

        let rows = qb.build_query_as::<E>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn update(&self, filter: &Filter, changes: Changes) -> Result<u64, StorageError> {
        let predicate = filter.to_sql(E::COLLECTION, E::FIELDS, E::TIMESTAMPS)?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!("UPDATE {} SET ", E::COLLECTION));
        for (i, (field, value)) in changes.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(format!("{field} = "));
            push_value(&mut qb, value);
        }
        push_predicate(&mut qb, &predicate);

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| map_error(E::COLLECTION, e))?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, filter: &Filter) -> Result<u64, StorageError> {
        let predicate = filter.to_sql(E::COLLECTION, E::FIELDS, E::TIMESTAMPS)?;
        tracing::trace!(
            collection = E::COLLECTION,
            clause = %predicate.clause(),
            "Deleting rows"
        );

        let mut qb = QueryBuilder::<Sqlite>::new(format!("DELETE FROM {}", E::COLLECTION));
        push_predicate(&mut qb, &predicate);

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
