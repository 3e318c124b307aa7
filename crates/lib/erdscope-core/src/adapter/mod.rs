//! Metadata adapters and the sqlx-backed implementation.
//!
//! Every store variant satisfies the same capability set: enumerate entities,
//! then list attributes, outgoing relations, and indexes per entity. The graph
//! builder only talks to [`MetadataAdapter`], so tests can substitute a
//! scripted adapter for a live connection.

pub mod mysql;
pub mod postgres;
pub mod sqlite;

use std::{error::Error, fmt, str::FromStr, time::Duration};

use erdscope_model::{Attribute, Diagnostic, IndexDescriptor, IntrospectionStage, Relation};
use futures::future::BoxFuture;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::connection::StoreKind;

pub type AdapterFuture<'a, T> = BoxFuture<'a, Result<T, AdapterError>>;

#[derive(Debug)]
pub enum AdapterError {
    Driver(Box<sqlx::Error>),
    InvalidDescriptor(String),
    Unavailable(String),
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver(err) => write!(f, "{err}"),
            Self::InvalidDescriptor(message) => write!(f, "invalid connection descriptor: {message}"),
            Self::Unavailable(message) => write!(f, "{message}"),
        }
    }
}

impl Error for AdapterError {}

impl From<sqlx::Error> for AdapterError {
    fn from(err: sqlx::Error) -> Self {
        Self::Driver(Box::new(err))
    }
}

/// A single entity's metadata fetch failed.
#[derive(Debug)]
pub struct IntrospectionError {
    pub entity: String,
    pub stage: IntrospectionStage,
    pub cause: AdapterError,
}

impl IntrospectionError {
    #[must_use]
    pub fn new(entity: impl Into<String>, stage: IntrospectionStage, cause: AdapterError) -> Self {
        Self {
            entity: entity.into(),
            stage,
            cause,
        }
    }

    #[must_use]
    pub fn into_diagnostic(self) -> Diagnostic {
        let message = self.cause.to_string();
        Diagnostic::new(self.entity, self.stage, message)
    }
}

impl fmt::Display for IntrospectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to fetch {} for {}: {}",
            self.stage, self.entity, self.cause
        )
    }
}

impl Error for IntrospectionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.cause)
    }
}

/// Uniform introspection capability over one live store connection.
pub trait MetadataAdapter: Send + Sync {
    fn store_kind(&self) -> StoreKind;

    /// Trivial round-trip used as a liveness probe.
    fn ping(&self) -> AdapterFuture<'_, ()>;

    /// Scope used when the caller does not name one.
    fn default_scope(&self) -> AdapterFuture<'_, String>;

    /// Base tables of `scope`, in a stable order.
    fn list_entities<'a>(&'a self, scope: &'a str) -> AdapterFuture<'a, Vec<String>>;

    /// Columns of `entity`, in physical column order.
    fn list_attributes<'a>(
        &'a self,
        scope: &'a str,
        entity: &'a str,
    ) -> AdapterFuture<'a, Vec<Attribute>>;

    /// Outgoing foreign keys of `entity`.
    fn list_relations_from<'a>(
        &'a self,
        scope: &'a str,
        entity: &'a str,
    ) -> AdapterFuture<'a, Vec<Relation>>;

    fn list_indexes<'a>(
        &'a self,
        scope: &'a str,
        entity: &'a str,
    ) -> AdapterFuture<'a, Vec<IndexDescriptor>>;

    fn close(&self) -> BoxFuture<'_, ()>;
}

/// Pool settings shared by every sqlx variant.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 4,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

/// sqlx-backed adapter, one variant per supported store kind.
#[derive(Debug, Clone)]
pub enum SqlxAdapter {
    Postgres(PgPool),
    MySql(MySqlPool),
    Sqlite(SqlitePool),
}

impl SqlxAdapter {
    /// Opens a pool for `descriptor`. The pool connects eagerly, so an
    /// unreachable store fails here rather than on first use.
    ///
    /// # Errors
    /// Returns `AdapterError::InvalidDescriptor` when the descriptor does not
    /// parse for `kind`, or `AdapterError::Driver` when connecting fails.
    pub async fn open(
        kind: StoreKind,
        descriptor: &str,
        settings: PoolSettings,
    ) -> Result<Self, AdapterError> {
        match kind {
            StoreKind::Postgres => {
                let options = PgConnectOptions::from_str(descriptor)
                    .map_err(|err| AdapterError::InvalidDescriptor(err.to_string()))?;
                let pool = PgPoolOptions::new()
                    .max_connections(settings.max_connections)
                    .acquire_timeout(settings.acquire_timeout)
                    .connect_with(options)
                    .await?;
                Ok(Self::Postgres(pool))
            }
            StoreKind::MySql => {
                let options = MySqlConnectOptions::from_str(descriptor)
                    .map_err(|err| AdapterError::InvalidDescriptor(err.to_string()))?;
                let pool = MySqlPoolOptions::new()
                    .max_connections(settings.max_connections)
                    .acquire_timeout(settings.acquire_timeout)
                    .connect_with(options)
                    .await?;
                Ok(Self::MySql(pool))
            }
            StoreKind::Sqlite => {
                let options = SqliteConnectOptions::from_str(descriptor)
                    .map_err(|err| AdapterError::InvalidDescriptor(err.to_string()))?;
                // Each in-memory connection is its own database; keep exactly one alive.
                let in_memory = sqlite::is_in_memory(descriptor);
                let mut pool_options = SqlitePoolOptions::new()
                    .acquire_timeout(settings.acquire_timeout)
                    .max_connections(if in_memory { 1 } else { settings.max_connections });
                if in_memory {
                    pool_options = pool_options
                        .min_connections(1)
                        .idle_timeout(None::<Duration>)
                        .max_lifetime(None::<Duration>);
                }
                let pool = pool_options.connect_with(options).await?;
                Ok(Self::Sqlite(pool))
            }
        }
    }
}

impl MetadataAdapter for SqlxAdapter {
    fn store_kind(&self) -> StoreKind {
        match self {
            Self::Postgres(_) => StoreKind::Postgres,
            Self::MySql(_) => StoreKind::MySql,
            Self::Sqlite(_) => StoreKind::Sqlite,
        }
    }

    fn ping(&self) -> AdapterFuture<'_, ()> {
        Box::pin(async move {
            match self {
                Self::Postgres(pool) => {
                    sqlx::query("SELECT 1").execute(pool).await?;
                }
                Self::MySql(pool) => {
                    sqlx::query("SELECT 1").execute(pool).await?;
                }
                Self::Sqlite(pool) => {
                    sqlx::query("SELECT 1").execute(pool).await?;
                }
            }
            Ok(())
        })
    }

    fn default_scope(&self) -> AdapterFuture<'_, String> {
        Box::pin(async move {
            match self {
                Self::Postgres(pool) => postgres::default_scope(pool).await,
                Self::MySql(pool) => mysql::default_scope(pool).await,
                Self::Sqlite(_) => Ok(sqlite::default_scope()),
            }
        })
    }

    fn list_entities<'a>(&'a self, scope: &'a str) -> AdapterFuture<'a, Vec<String>> {
        Box::pin(async move {
            match self {
                Self::Postgres(pool) => postgres::list_entities(pool, scope).await,
                Self::MySql(pool) => mysql::list_entities(pool, scope).await,
                Self::Sqlite(pool) => sqlite::list_entities(pool, scope).await,
            }
        })
    }

    fn list_attributes<'a>(
        &'a self,
        scope: &'a str,
        entity: &'a str,
    ) -> AdapterFuture<'a, Vec<Attribute>> {
        Box::pin(async move {
            match self {
                Self::Postgres(pool) => postgres::list_attributes(pool, scope, entity).await,
                Self::MySql(pool) => mysql::list_attributes(pool, scope, entity).await,
                Self::Sqlite(pool) => sqlite::list_attributes(pool, scope, entity).await,
            }
        })
    }

    fn list_relations_from<'a>(
        &'a self,
        scope: &'a str,
        entity: &'a str,
    ) -> AdapterFuture<'a, Vec<Relation>> {
        Box::pin(async move {
            match self {
                Self::Postgres(pool) => postgres::list_relations_from(pool, scope, entity).await,
                Self::MySql(pool) => mysql::list_relations_from(pool, scope, entity).await,
                Self::Sqlite(pool) => sqlite::list_relations_from(pool, scope, entity).await,
            }
        })
    }

    fn list_indexes<'a>(
        &'a self,
        scope: &'a str,
        entity: &'a str,
    ) -> AdapterFuture<'a, Vec<IndexDescriptor>> {
        Box::pin(async move {
            match self {
                Self::Postgres(pool) => postgres::list_indexes(pool, scope, entity).await,
                Self::MySql(pool) => mysql::list_indexes(pool, scope, entity).await,
                Self::Sqlite(pool) => sqlite::list_indexes(pool, scope, entity).await,
            }
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            match self {
                Self::Postgres(pool) => pool.close().await,
                Self::MySql(pool) => pool.close().await,
                Self::Sqlite(pool) => pool.close().await,
            }
        })
    }
}

/// One row of a foreign-key catalog query: a single column pair of a constraint.
#[derive(Debug, Clone)]
pub(crate) struct ForeignKeyRow {
    pub constraint: Option<String>,
    pub group: String,
    pub referred_schema: Option<String>,
    pub referred_table: String,
    pub column: String,
    pub referred_column: String,
}

/// Folds per-column rows into one relation per constraint, keeping first-seen order.
pub(crate) fn group_foreign_keys(source: &str, rows: Vec<ForeignKeyRow>) -> Vec<Relation> {
    let mut groups: Vec<(String, Relation)> = Vec::new();
    for row in rows {
        let position = groups.iter().position(|(group, _)| *group == row.group);
        let index = if let Some(index) = position {
            index
        } else {
            let mut relation = Relation::new(source, row.referred_table.clone());
            relation.name = row.constraint.clone();
            relation.target_schema = row.referred_schema.clone();
            groups.push((row.group.clone(), relation));
            groups.len() - 1
        };
        let relation = &mut groups[index].1;
        relation
            .columns
            .push(erdscope_model::ColumnPair::new(row.column, row.referred_column));
    }
    groups.into_iter().map(|(_, relation)| relation).collect()
}

/// One row of an index catalog query: a single indexed column.
#[derive(Debug, Clone)]
pub(crate) struct IndexColumnRow {
    pub index: String,
    pub column: Option<String>,
    pub unique: bool,
    pub primary: bool,
}

pub(crate) fn group_index_columns(rows: Vec<IndexColumnRow>) -> Vec<IndexDescriptor> {
    let mut indexes: Vec<IndexDescriptor> = Vec::new();
    for row in rows {
        let position = indexes.iter().position(|index| index.name == row.index);
        let index = if let Some(index) = position {
            &mut indexes[index]
        } else {
            indexes.push(IndexDescriptor {
                name: row.index,
                columns: Vec::new(),
                unique: row.unique,
                primary: row.primary,
            });
            let last = indexes.len() - 1;
            &mut indexes[last]
        };
        // Expression indexes report no column name.
        index
            .columns
            .push(row.column.unwrap_or_else(|| "<expression>".to_string()));
    }
    indexes
}
