pub const STORE_POSTGRES: &str = "postgres";
pub const STORE_MYSQL: &str = "mysql";
pub const STORE_SQLITE: &str = "sqlite";

pub const DEFAULT_SQLITE_SCOPE: &str = "main";

pub const GRAMMAR_PLANTUML: &str = "plantuml";
pub const GRAMMAR_MERMAID: &str = "mermaid";

/// Suffix appended to the display name of a relation target that lies outside
/// the introspected scope.
pub const DANGLING_SUFFIX: &str = " (out of scope)";

pub const STAGE_ENTITIES: &str = "entities";
pub const STAGE_ATTRIBUTES: &str = "attributes";
pub const STAGE_RELATIONS: &str = "relations";
pub const STAGE_INDEXES: &str = "indexes";
pub const STAGE_CANCELLED: &str = "cancelled";

#[must_use]
pub fn qualified_name(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(schema) if !schema.is_empty() => format!("{schema}.{table}"),
        _ => table.to_string(),
    }
}
