//! SQLite catalog queries over `sqlite_master` and the table-valued pragmas.

use erdscope_model::schema::DEFAULT_SQLITE_SCOPE;
use erdscope_model::{Attribute, IndexDescriptor, Relation};
use sqlx::Row;
use sqlx::sqlite::SqlitePool;

use super::{AdapterError, ForeignKeyRow, IndexColumnRow, group_foreign_keys, group_index_columns};

pub(crate) fn is_in_memory(descriptor: &str) -> bool {
    descriptor.contains(":memory:") || descriptor.contains("mode=memory")
}

pub(crate) fn default_scope() -> String {
    DEFAULT_SQLITE_SCOPE.to_string()
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) async fn list_entities(
    pool: &SqlitePool,
    scope: &str,
) -> Result<Vec<String>, AdapterError> {
    // The schema qualifier cannot be bound, so it is quoted instead.
    let query = format!(
        "SELECT name FROM {}.sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        quote_ident(scope)
    );
    let rows = sqlx::query(&query).fetch_all(pool).await?;

    rows.iter()
        .map(|row| row.try_get::<String, _>("name").map_err(AdapterError::from))
        .collect()
}

pub(crate) async fn list_attributes(
    pool: &SqlitePool,
    scope: &str,
    entity: &str,
) -> Result<Vec<Attribute>, AdapterError> {
    let rows = sqlx::query(
        r#"SELECT cid, name, type, "notnull" AS not_null, dflt_value, pk
           FROM pragma_table_info(?1, ?2)
           ORDER BY cid"#,
    )
    .bind(entity)
    .bind(scope)
    .fetch_all(pool)
    .await?;

    let mut attributes = Vec::with_capacity(rows.len());
    for row in rows {
        let not_null: i64 = row.try_get("not_null")?;
        let pk: i64 = row.try_get("pk")?;
        attributes.push(Attribute {
            name: row.try_get("name")?,
            data_type: row.try_get("type")?,
            // Primary key columns are reported as non-nullable.
            nullable: not_null == 0 && pk == 0,
            primary_key: pk > 0,
            default: row.try_get("dflt_value")?,
            ordinal: row.try_get("cid")?,
        });
    }
    Ok(attributes)
}

async fn primary_key_columns(
    pool: &SqlitePool,
    scope: &str,
    entity: &str,
) -> Result<Vec<String>, AdapterError> {
    let rows = sqlx::query(
        "SELECT name FROM pragma_table_info(?1, ?2) WHERE pk > 0 ORDER BY pk",
    )
    .bind(entity)
    .bind(scope)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| row.try_get::<String, _>("name").map_err(AdapterError::from))
        .collect()
}

pub(crate) async fn list_relations_from(
    pool: &SqlitePool,
    scope: &str,
    entity: &str,
) -> Result<Vec<Relation>, AdapterError> {
    let rows = sqlx::query(
        r#"SELECT id, seq, "table" AS referred_table, "from" AS column_name, "to" AS referred_column
           FROM pragma_foreign_key_list(?1, ?2)
           ORDER BY id, seq"#,
    )
    .bind(entity)
    .bind(scope)
    .fetch_all(pool)
    .await?;

    let mut fk_rows = Vec::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row.try_get("id")?;
        let seq: i64 = row.try_get("seq")?;
        let referred_table: String = row.try_get("referred_table")?;
        let referred_column: Option<String> = row.try_get("referred_column")?;

        // `REFERENCES parent` without a column list targets the parent's primary key.
        let referred_column = if let Some(column) = referred_column {
            column
        } else {
            let keys = primary_key_columns(pool, scope, &referred_table).await?;
            usize::try_from(seq)
                .ok()
                .and_then(|position| keys.get(position).cloned())
                .unwrap_or_else(|| "rowid".to_string())
        };

        fk_rows.push(ForeignKeyRow {
            constraint: None,
            group: id.to_string(),
            referred_schema: None,
            referred_table,
            column: row.try_get("column_name")?,
            referred_column,
        });
    }
    Ok(group_foreign_keys(entity, fk_rows))
}

pub(crate) async fn list_indexes(
    pool: &SqlitePool,
    scope: &str,
    entity: &str,
) -> Result<Vec<IndexDescriptor>, AdapterError> {
    let index_list = sqlx::query(
        r#"SELECT name, "unique" AS is_unique, origin
           FROM pragma_index_list(?1, ?2)
           ORDER BY name"#,
    )
    .bind(entity)
    .bind(scope)
    .fetch_all(pool)
    .await?;

    let mut index_rows = Vec::new();
    for index in index_list {
        let name: String = index.try_get("name")?;
        let unique: i64 = index.try_get("is_unique")?;
        let origin: String = index.try_get("origin")?;

        let columns = sqlx::query(
            "SELECT name FROM pragma_index_info(?1, ?2) ORDER BY seqno",
        )
        .bind(name.as_str())
        .bind(scope)
        .fetch_all(pool)
        .await?;

        for column in columns {
            index_rows.push(IndexColumnRow {
                index: name.clone(),
                column: column.try_get("name")?,
                unique: unique != 0,
                primary: origin == "pk",
            });
        }
    }
    Ok(group_index_columns(index_rows))
}
