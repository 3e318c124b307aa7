//! Mermaid `erDiagram` source.
//!
//! Mermaid attribute names and types are bare tokens, so anything outside
//! `[A-Za-z0-9_-]` is replaced and the original text moves into the
//! attribute comment. Entity names that are not plain get an alias with the
//! original as a quoted label. Keywords of the grammar get a trailing
//! underscore wherever they would otherwise appear as a bare token.

use std::collections::HashMap;
use std::fmt::Write as _;

use erdscope_model::{Attribute, Entity, Relation};

use super::{AliasTable, foreign_key_columns, is_plain_identifier, single_line};
use crate::graph::SchemaGraph;

const RELATION_EDGE: &str = "}o--||";
const DANGLING_EDGE: &str = "}o..||";

/// Words the `erDiagram` lexer claims before it sees an identifier.
const RESERVED: &[&str] = &[
    "pk", "fk", "uk", "erdiagram", "direction", "style", "classdef", "class", "acctitle",
    "accdescr", "to", "optionally", "one", "only", "zero", "many", "or", "more",
];

fn is_reserved(text: &str) -> bool {
    RESERVED.iter().any(|word| word.eq_ignore_ascii_case(text))
}

fn emits_bare(name: &str) -> bool {
    is_plain_identifier(name) && !is_reserved(name)
}

/// Mermaid strings cannot contain a double quote.
pub(crate) fn label(text: &str) -> String {
    format!("\"{}\"", single_line(text).replace('"', "'"))
}

fn token(text: &str) -> String {
    let token: String = text
        .trim()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' { ch } else { '_' })
        .collect();
    if is_reserved(&token) {
        format!("{token}_")
    } else if token.starts_with(|ch: char| ch.is_ascii_alphabetic() || ch == '_') {
        token
    } else if token.is_empty() {
        "unknown".to_string()
    } else {
        format!("_{token}")
    }
}

pub(crate) fn compile(graph: &SchemaGraph) -> String {
    let mut out = String::from("erDiagram\n");

    let mut aliases = AliasTable::default();
    for entity in graph.entities() {
        if emits_bare(&entity.name) {
            aliases.reserve(&entity.name);
        }
    }
    let mut refs: HashMap<&str, String> = HashMap::new();
    for entity in graph.entities() {
        let reference = if emits_bare(&entity.name) {
            entity.name.clone()
        } else if is_reserved(&entity.name) {
            aliases.assign(&format!("{}_", entity.name))
        } else {
            aliases.assign(&entity.name)
        };
        refs.insert(entity.name.as_str(), reference);
    }

    for entity in graph.entities() {
        let reference = refs
            .get(entity.name.as_str())
            .map_or(entity.name.as_str(), String::as_str);
        write_entity(&mut out, graph, entity, reference);
    }

    let mut placeholders: HashMap<String, String> = HashMap::new();
    for relation in graph.relations() {
        let source = refs
            .get(relation.source.as_str())
            .cloned()
            .unwrap_or_else(|| token(&relation.source));
        if relation.dangling {
            let target_label = relation.target_label();
            let placeholder = if let Some(existing) = placeholders.get(&target_label) {
                existing.clone()
            } else {
                let alias = aliases.assign(&format!("{}_out_of_scope", relation.target));
                let _ = writeln!(out, "  {alias}[{}]", label(&target_label));
                placeholders.insert(target_label, alias.clone());
                alias
            };
            let _ = writeln!(
                out,
                "  {source} {DANGLING_EDGE} {placeholder} : {}",
                label(&relation_label(relation))
            );
        } else {
            let target = refs
                .get(relation.target.as_str())
                .cloned()
                .unwrap_or_else(|| token(&relation.target));
            let _ = writeln!(
                out,
                "  {source} {RELATION_EDGE} {target} : {}",
                label(&relation_label(relation))
            );
        }
    }

    out
}

fn relation_label(relation: &Relation) -> String {
    relation
        .name
        .clone()
        .unwrap_or_else(|| relation.source_columns().join(", "))
}

fn write_entity(out: &mut String, graph: &SchemaGraph, entity: &Entity, reference: &str) {
    if reference == entity.name {
        let _ = writeln!(out, "  {reference} {{");
    } else {
        let _ = writeln!(out, "  {reference}[{}] {{", label(&entity.name));
    }
    let foreign_keys = foreign_key_columns(graph, &entity.name);
    for attribute in &entity.attributes {
        let is_foreign = foreign_keys.contains(attribute.name.as_str());
        let _ = writeln!(out, "    {}", attribute_line(attribute, is_foreign));
    }
    out.push_str("  }\n");
}

fn attribute_line(attribute: &Attribute, is_foreign: bool) -> String {
    let data_type = token(&attribute.data_type);
    let name = token(&attribute.name);
    let mut line = format!("{data_type} {name}");

    let keys = match (attribute.primary_key, is_foreign) {
        (true, true) => Some("PK, FK"),
        (true, false) => Some("PK"),
        (false, true) => Some("FK"),
        (false, false) => None,
    };
    if let Some(keys) = keys {
        line.push(' ');
        line.push_str(keys);
    }

    let mut notes = Vec::new();
    if name != attribute.name {
        notes.push(format!("name: {}", attribute.name));
    }
    if data_type != attribute.data_type.trim() && !attribute.data_type.trim().is_empty() {
        notes.push(attribute.data_type.trim().to_string());
    }
    if !notes.is_empty() {
        line.push(' ');
        line.push_str(&label(&notes.join("; ")));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, data_type: &str, primary_key: bool) -> Attribute {
        Attribute {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: !primary_key,
            primary_key,
            default: None,
            ordinal: 0,
        }
    }

    #[test]
    fn empty_graph_is_a_bare_header() {
        let graph = SchemaGraph::from_parts("main", Vec::new(), Vec::new());
        assert_eq!(compile(&graph), "erDiagram\n");
    }

    #[test]
    fn sanitizes_types_and_keeps_the_original_in_the_comment() {
        assert_eq!(
            attribute_line(&column("price", "numeric(10,2)", false), false),
            "numeric_10_2_ price \"numeric(10,2)\""
        );
        assert_eq!(
            attribute_line(&column("id", "integer", true), true),
            "integer id PK, FK"
        );
        assert_eq!(
            attribute_line(&column("first name", "", false), false),
            "unknown first_name \"name: first name\""
        );
    }

    #[test]
    fn keywords_are_never_bare_tokens() {
        assert_eq!(
            attribute_line(&column("PK", "int", true), false),
            "int PK_ PK \"name: PK\""
        );
        assert_eq!(
            attribute_line(&column("style", "to", false), true),
            "to_ style_ FK \"name: style; to\""
        );

        let graph = SchemaGraph::from_parts(
            "main",
            vec![
                Entity {
                    name: "class".to_string(),
                    attributes: vec![column("id", "INTEGER", true)],
                    indexes: Vec::new(),
                },
                Entity {
                    name: "enrolments".to_string(),
                    attributes: vec![column("class_id", "INTEGER", false)],
                    indexes: Vec::new(),
                },
            ],
            vec![Relation::new("enrolments", "class").with_pair("class_id", "id")],
        );

        let source = compile(&graph);
        assert!(source.contains("  class_[\"class\"] {\n"));
        assert!(source.contains("  enrolments }o--|| class_ : \"class_id\"\n"));
        assert!(!source.contains("\n  class {"));
    }

    #[test]
    fn relations_and_dangling_placeholders() {
        let graph = SchemaGraph::from_parts(
            "main",
            vec![
                Entity {
                    name: "orders".to_string(),
                    attributes: vec![column("user_id", "INTEGER", false)],
                    indexes: Vec::new(),
                },
                Entity {
                    name: "users".to_string(),
                    attributes: vec![column("id", "INTEGER", true)],
                    indexes: Vec::new(),
                },
            ],
            vec![
                Relation::new("orders", "users").with_pair("user_id", "id"),
                Relation::new("orders", "warehouses").with_pair("warehouse_id", "id"),
            ],
        );

        let source = compile(&graph);
        assert!(source.contains("  orders }o--|| users : \"user_id\"\n"));
        assert!(source.contains("  warehouses_out_of_scope[\"warehouses (out of scope)\"]\n"));
        assert!(source.contains("  orders }o..|| warehouses_out_of_scope : \"warehouse_id\"\n"));
    }
}
