//! MySQL / MariaDB catalog queries over `information_schema`.
//!
//! Catalog columns are cast to `CHAR`/`SIGNED` because their declared types
//! vary between server versions (some report binary strings).

use erdscope_model::{Attribute, IndexDescriptor, Relation};
use sqlx::Row;
use sqlx::mysql::MySqlPool;

use super::{AdapterError, ForeignKeyRow, IndexColumnRow, group_foreign_keys, group_index_columns};

pub(crate) async fn default_scope(pool: &MySqlPool) -> Result<String, AdapterError> {
    let scope: Option<String> = sqlx::query_scalar("SELECT CAST(DATABASE() AS CHAR)")
        .fetch_one(pool)
        .await?;
    scope.ok_or_else(|| {
        AdapterError::Unavailable(
            "no default database selected; pass schema_name explicitly".to_string(),
        )
    })
}

pub(crate) async fn list_entities(
    pool: &MySqlPool,
    scope: &str,
) -> Result<Vec<String>, AdapterError> {
    let rows = sqlx::query(
        r"
        SELECT CAST(TABLE_NAME AS CHAR) AS name
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
        ORDER BY TABLE_NAME
        ",
    )
    .bind(scope)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| row.try_get::<String, _>("name").map_err(AdapterError::from))
        .collect()
}

pub(crate) async fn list_attributes(
    pool: &MySqlPool,
    scope: &str,
    entity: &str,
) -> Result<Vec<Attribute>, AdapterError> {
    let rows = sqlx::query(
        r"
        SELECT
            CAST(COLUMN_NAME AS CHAR) AS name,
            CAST(COLUMN_TYPE AS CHAR) AS data_type,
            CAST(IS_NULLABLE = 'YES' AS SIGNED) AS nullable,
            CAST(COLUMN_KEY = 'PRI' AS SIGNED) AS primary_key,
            CAST(COLUMN_DEFAULT AS CHAR) AS default_value,
            CAST(ORDINAL_POSITION AS SIGNED) AS ordinal
        FROM information_schema.COLUMNS
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        ORDER BY ORDINAL_POSITION
        ",
    )
    .bind(scope)
    .bind(entity)
    .fetch_all(pool)
    .await?;

    let mut attributes = Vec::with_capacity(rows.len());
    for row in rows {
        let nullable: i64 = row.try_get("nullable")?;
        let primary_key: i64 = row.try_get("primary_key")?;
        attributes.push(Attribute {
            name: row.try_get("name")?,
            data_type: row.try_get("data_type")?,
            nullable: nullable != 0,
            primary_key: primary_key != 0,
            default: row.try_get("default_value")?,
            ordinal: row.try_get("ordinal")?,
        });
    }
    Ok(attributes)
}

pub(crate) async fn list_relations_from(
    pool: &MySqlPool,
    scope: &str,
    entity: &str,
) -> Result<Vec<Relation>, AdapterError> {
    let rows = sqlx::query(
        r"
        SELECT
            CAST(CONSTRAINT_NAME AS CHAR) AS constraint_name,
            CAST(REFERENCED_TABLE_SCHEMA AS CHAR) AS referred_schema,
            CAST(REFERENCED_TABLE_NAME AS CHAR) AS referred_table,
            CAST(COLUMN_NAME AS CHAR) AS column_name,
            CAST(REFERENCED_COLUMN_NAME AS CHAR) AS referred_column
        FROM information_schema.KEY_COLUMN_USAGE
        WHERE TABLE_SCHEMA = ?
          AND TABLE_NAME = ?
          AND REFERENCED_TABLE_NAME IS NOT NULL
        ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION
        ",
    )
    .bind(scope)
    .bind(entity)
    .fetch_all(pool)
    .await?;

    let mut fk_rows = Vec::with_capacity(rows.len());
    for row in rows {
        let constraint: String = row.try_get("constraint_name")?;
        fk_rows.push(ForeignKeyRow {
            group: constraint.clone(),
            constraint: Some(constraint),
            referred_schema: row.try_get("referred_schema")?,
            referred_table: row.try_get("referred_table")?,
            column: row.try_get("column_name")?,
            referred_column: row.try_get("referred_column")?,
        });
    }
    Ok(group_foreign_keys(entity, fk_rows))
}

pub(crate) async fn list_indexes(
    pool: &MySqlPool,
    scope: &str,
    entity: &str,
) -> Result<Vec<IndexDescriptor>, AdapterError> {
    let rows = sqlx::query(
        r"
        SELECT
            CAST(INDEX_NAME AS CHAR) AS index_name,
            CAST(COLUMN_NAME AS CHAR) AS column_name,
            CAST(NON_UNIQUE AS SIGNED) AS non_unique
        FROM information_schema.STATISTICS
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        ORDER BY INDEX_NAME, SEQ_IN_INDEX
        ",
    )
    .bind(scope)
    .bind(entity)
    .fetch_all(pool)
    .await?;

    let mut index_rows = Vec::with_capacity(rows.len());
    for row in rows {
        let index: String = row.try_get("index_name")?;
        let non_unique: i64 = row.try_get("non_unique")?;
        index_rows.push(IndexColumnRow {
            primary: index == "PRIMARY",
            index,
            column: row.try_get("column_name")?,
            unique: non_unique == 0,
        });
    }
    Ok(group_index_columns(index_rows))
}
