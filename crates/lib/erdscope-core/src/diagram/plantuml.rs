//! PlantUML IE-diagram source.

use std::collections::HashMap;
use std::fmt::Write as _;

use erdscope_model::{Attribute, Entity};

use super::{AliasTable, foreign_key_columns, is_plain_identifier, single_line};
use crate::graph::SchemaGraph;

/// Quoted PlantUML text. PlantUML has no backslash escape inside quotes, so
/// double quotes become the `&#34;` entity.
pub(crate) fn quote(text: &str) -> String {
    format!("\"{}\"", single_line(text).replace('"', "&#34;"))
}

pub(crate) fn compile(graph: &SchemaGraph) -> String {
    let mut out = String::from("@startuml\n");

    let mut aliases = AliasTable::default();
    for entity in graph.entities() {
        if is_plain_identifier(&entity.name) {
            aliases.reserve(&entity.name);
        }
    }
    let mut refs: HashMap<&str, String> = HashMap::new();
    for entity in graph.entities() {
        let reference = if is_plain_identifier(&entity.name) {
            entity.name.clone()
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

    for relation in graph.relations() {
        let source = refs
            .get(relation.source.as_str())
            .cloned()
            .unwrap_or_else(|| quote(&relation.source));
        if relation.dangling {
            let _ = writeln!(out, "{source} .. {}", quote(&relation.target_label()));
        } else {
            let target = refs
                .get(relation.target.as_str())
                .cloned()
                .unwrap_or_else(|| quote(&relation.target));
            let _ = writeln!(out, "{source} -- {target}");
        }
    }

    out.push_str("@enduml\n");
    out
}

fn write_entity(out: &mut String, graph: &SchemaGraph, entity: &Entity, reference: &str) {
    if reference == entity.name {
        let _ = writeln!(out, "entity {reference} {{");
    } else {
        let _ = writeln!(out, "entity {} as {reference} {{", quote(&entity.name));
    }
    let foreign_keys = foreign_key_columns(graph, &entity.name);
    for attribute in &entity.attributes {
        let is_foreign = foreign_keys.contains(attribute.name.as_str());
        let _ = writeln!(out, "  {}", attribute_line(attribute, is_foreign));
    }
    out.push_str("}\n");
}

fn attribute_line(attribute: &Attribute, is_foreign: bool) -> String {
    let mut line = if is_plain_identifier(&attribute.name) {
        attribute.name.clone()
    } else {
        quote(&attribute.name)
    };
    let data_type = single_line(attribute.data_type.trim());
    if !data_type.is_empty() {
        line.push_str(" : ");
        line.push_str(&data_type);
    }
    if attribute.primary_key {
        line.push_str(" <<PK>>");
    }
    if is_foreign {
        line.push_str(" <<FK>>");
    }
    line
}

#[cfg(test)]
mod tests {
    use erdscope_model::Relation;

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

    fn entity(name: &str, attributes: Vec<Attribute>) -> Entity {
        Entity {
            name: name.to_string(),
            attributes,
            indexes: Vec::new(),
        }
    }

    #[test]
    fn empty_graph_is_a_minimal_document() {
        let graph = SchemaGraph::from_parts("main", Vec::new(), Vec::new());
        assert_eq!(compile(&graph), "@startuml\n@enduml\n");
    }

    #[test]
    fn users_and_orders_compile_to_two_blocks_and_one_edge() {
        let graph = SchemaGraph::from_parts(
            "main",
            vec![
                entity(
                    "orders",
                    vec![column("id", "INTEGER", true), column("user_id", "INTEGER", false)],
                ),
                entity(
                    "users",
                    vec![column("id", "INTEGER", true), column("name", "TEXT", false)],
                ),
            ],
            vec![Relation::new("orders", "users").with_pair("user_id", "id")],
        );

        let source = compile(&graph);
        assert_eq!(source.matches("entity ").count(), 2);
        assert!(source.contains("  id : INTEGER <<PK>>\n"));
        assert!(source.contains("  user_id : INTEGER <<FK>>\n"));
        let edges: Vec<&str> = source.lines().filter(|line| line.contains(" -- ")).collect();
        assert_eq!(edges, vec!["orders -- users"]);
    }

    #[test]
    fn unsafe_names_are_quoted_and_aliased() {
        let graph = SchemaGraph::from_parts(
            "main",
            vec![
                entity("order items", vec![column("unit \"price\"", "numeric(10,\n2)", false)]),
                entity("order_items", vec![column("id", "", true)]),
            ],
            vec![Relation::new("order items", "order_items").with_pair("unit \"price\"", "id")],
        );

        let source = compile(&graph);
        assert!(source.contains("entity \"order items\" as order_items_2 {\n"));
        assert!(source.contains("entity order_items {\n"));
        assert!(source.contains("  \"unit &#34;price&#34;\" : numeric(10, 2) <<FK>>\n"));
        assert!(source.contains("  id <<PK>>\n"));
        assert!(source.contains("order_items_2 -- order_items\n"));
    }

    #[test]
    fn dangling_relations_use_dotted_edges_and_the_marker() {
        let graph = SchemaGraph::from_parts(
            "public",
            vec![entity("orders", vec![column("auditor_id", "bigint", false)])],
            vec![
                Relation::new("orders", "auditors")
                    .with_target_schema("audit")
                    .with_pair("auditor_id", "id"),
            ],
        );

        let source = compile(&graph);
        assert!(source.contains("orders .. \"audit.auditors (out of scope)\"\n"));
    }
}
