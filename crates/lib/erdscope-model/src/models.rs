use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::{
    DANGLING_SUFFIX,
    STAGE_ATTRIBUTES,
    STAGE_CANCELLED,
    STAGE_ENTITIES,
    STAGE_INDEXES,
    STAGE_RELATIONS,
    qualified_name,
};

/// A column as reported by a metadata adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    /// Store-native type expression, kept verbatim for display.
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    pub ordinal: i64,
}

/// One participating column of a foreign key and the column it refers to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnPair {
    pub column: String,
    pub referred_column: String,
}

impl ColumnPair {
    #[must_use]
    pub fn new(column: impl Into<String>, referred_column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            referred_column: referred_column.into(),
        }
    }
}

/// Directed foreign-key edge from `source` to `target`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Relation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing)]
    pub source: String,
    #[serde(rename = "referred_table")]
    pub target: String,
    #[serde(rename = "referred_schema", skip_serializing_if = "Option::is_none")]
    pub target_schema: Option<String>,
    pub columns: Vec<ColumnPair>,
    /// Set by the graph builder when the target lies outside the introspected scope.
    #[serde(default)]
    pub dangling: bool,
}

impl Relation {
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: None,
            source: source.into(),
            target: target.into(),
            target_schema: None,
            columns: Vec::new(),
            dangling: false,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_target_schema(mut self, schema: impl Into<String>) -> Self {
        self.target_schema = Some(schema.into());
        self
    }

    #[must_use]
    pub fn with_pair(mut self, column: impl Into<String>, referred_column: impl Into<String>) -> Self {
        self.columns.push(ColumnPair::new(column, referred_column));
        self
    }

    /// Label used for the target in diagrams; dangling targets carry the
    /// out-of-scope suffix and their schema qualifier.
    #[must_use]
    pub fn target_label(&self) -> String {
        if self.dangling {
            let qualified = qualified_name(self.target_schema.as_deref(), &self.target);
            format!("{qualified}{DANGLING_SUFFIX}")
        } else {
            self.target.clone()
        }
    }

    #[must_use]
    pub fn source_columns(&self) -> Vec<&str> {
        self.columns.iter().map(|pair| pair.column.as_str()).collect()
    }
}

/// Index over one or more columns of an entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    #[serde(default)]
    pub primary: bool,
}

/// A discovered table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entity {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub indexes: Vec<IndexDescriptor>,
}

impl Entity {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            indexes: Vec::new(),
        }
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attribute| attribute.name == name)
    }
}

/// Which metadata facet of an entity a diagnostic refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IntrospectionStage {
    /// Enumeration reported something unusable, such as a repeated name.
    Entities,
    Attributes,
    Relations,
    Indexes,
    Cancelled,
}

impl IntrospectionStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Entities => STAGE_ENTITIES,
            Self::Attributes => STAGE_ATTRIBUTES,
            Self::Relations => STAGE_RELATIONS,
            Self::Indexes => STAGE_INDEXES,
            Self::Cancelled => STAGE_CANCELLED,
        }
    }
}

impl fmt::Display for IntrospectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-fatal problem recorded while building a schema graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostic {
    pub entity: String,
    pub stage: IntrospectionStage,
    pub message: String,
}

impl Diagnostic {
    #[must_use]
    pub fn new(
        entity: impl Into<String>,
        stage: IntrospectionStage,
        message: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            stage,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dangling_target_label_is_qualified_and_suffixed() {
        let mut relation = Relation::new("orders", "users")
            .with_target_schema("audit")
            .with_pair("user_id", "id");
        assert_eq!(relation.target_label(), "users");

        relation.dangling = true;
        assert_eq!(relation.target_label(), "audit.users (out of scope)");
    }

    #[test]
    fn relation_serializes_with_referred_names() {
        let relation = Relation::new("orders", "users")
            .with_name("orders_user_id_fkey")
            .with_pair("user_id", "id");
        let value = serde_json::to_value(&relation).expect("relation should serialize");

        assert_eq!(value["referred_table"], "users");
        assert_eq!(value["columns"][0]["column"], "user_id");
        assert_eq!(value["columns"][0]["referred_column"], "id");
        assert_eq!(value["dangling"], false);
        assert!(value.get("source").is_none());
    }
}
