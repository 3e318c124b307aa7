//! PostgreSQL catalog queries.

use erdscope_model::{Attribute, IndexDescriptor, Relation};
use sqlx::Row;
use sqlx::postgres::PgPool;

use super::{AdapterError, ForeignKeyRow, IndexColumnRow, group_foreign_keys, group_index_columns};

pub(crate) async fn default_scope(pool: &PgPool) -> Result<String, AdapterError> {
    let scope: Option<String> = sqlx::query_scalar("SELECT current_schema()::text")
        .fetch_one(pool)
        .await?;
    Ok(scope.unwrap_or_else(|| "public".to_string()))
}

pub(crate) async fn list_entities(pool: &PgPool, scope: &str) -> Result<Vec<String>, AdapterError> {
    let rows = sqlx::query(
        r"
        SELECT c.relname::text AS name
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1
          AND c.relkind IN ('r', 'p')
          AND NOT c.relispartition
        ORDER BY c.relname
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
    pool: &PgPool,
    scope: &str,
    entity: &str,
) -> Result<Vec<Attribute>, AdapterError> {
    let rows = sqlx::query(
        r"
        SELECT
            a.attname::text AS name,
            pg_catalog.format_type(a.atttypid, a.atttypmod) AS data_type,
            NOT a.attnotnull AS nullable,
            COALESCE(pk.indisprimary, false) AS primary_key,
            pg_catalog.pg_get_expr(d.adbin, d.adrelid) AS default_value,
            a.attnum::int8 AS ordinal
        FROM pg_catalog.pg_attribute a
        JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        LEFT JOIN pg_catalog.pg_attrdef d
            ON d.adrelid = a.attrelid AND d.adnum = a.attnum
        LEFT JOIN pg_catalog.pg_index pk
            ON pk.indrelid = c.oid AND pk.indisprimary AND a.attnum = ANY(pk.indkey::int2[])
        WHERE n.nspname = $1
          AND c.relname = $2
          AND a.attnum > 0
          AND NOT a.attisdropped
        ORDER BY a.attnum
        ",
    )
    .bind(scope)
    .bind(entity)
    .fetch_all(pool)
    .await?;

    let mut attributes = Vec::with_capacity(rows.len());
    for row in rows {
        attributes.push(Attribute {
            name: row.try_get("name")?,
            data_type: row.try_get("data_type")?,
            nullable: row.try_get("nullable")?,
            primary_key: row.try_get("primary_key")?,
            default: row.try_get("default_value")?,
            ordinal: row.try_get("ordinal")?,
        });
    }
    Ok(attributes)
}

pub(crate) async fn list_relations_from(
    pool: &PgPool,
    scope: &str,
    entity: &str,
) -> Result<Vec<Relation>, AdapterError> {
    let rows = sqlx::query(
        r"
        SELECT
            con.conname::text AS constraint_name,
            tn.nspname::text AS referred_schema,
            tc.relname::text AS referred_table,
            sa.attname::text AS column_name,
            ta.attname::text AS referred_column
        FROM pg_catalog.pg_constraint con
        JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        JOIN pg_catalog.pg_class tc ON tc.oid = con.confrelid
        JOIN pg_catalog.pg_namespace tn ON tn.oid = tc.relnamespace
        CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(src, dst, ord)
        JOIN pg_catalog.pg_attribute sa ON sa.attrelid = con.conrelid AND sa.attnum = k.src
        JOIN pg_catalog.pg_attribute ta ON ta.attrelid = con.confrelid AND ta.attnum = k.dst
        WHERE con.contype = 'f'
          AND n.nspname = $1
          AND c.relname = $2
        ORDER BY con.conname, k.ord
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
    pool: &PgPool,
    scope: &str,
    entity: &str,
) -> Result<Vec<IndexDescriptor>, AdapterError> {
    let rows = sqlx::query(
        r"
        SELECT
            i.relname::text AS index_name,
            a.attname::text AS column_name,
            ix.indisunique AS is_unique,
            ix.indisprimary AS is_primary
        FROM pg_catalog.pg_index ix
        JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid
        JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
        CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
        LEFT JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
        WHERE n.nspname = $1 AND t.relname = $2
        ORDER BY i.relname, k.ord
        ",
    )
    .bind(scope)
    .bind(entity)
    .fetch_all(pool)
    .await?;

    let mut index_rows = Vec::with_capacity(rows.len());
    for row in rows {
        index_rows.push(IndexColumnRow {
            index: row.try_get("index_name")?,
            column: row.try_get("column_name")?,
            unique: row.try_get("is_unique")?,
            primary: row.try_get("is_primary")?,
        });
    }
    Ok(group_index_columns(index_rows))
}
