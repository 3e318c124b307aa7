//! Diagram grammars the schema graph compiles into.

pub mod mermaid;
pub mod plantuml;

use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::str::FromStr;

use erdscope_model::schema::{GRAMMAR_MERMAID, GRAMMAR_PLANTUML};
use serde::Serialize;

use crate::graph::SchemaGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramGrammar {
    PlantUml,
    Mermaid,
}

impl DiagramGrammar {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PlantUml => GRAMMAR_PLANTUML,
            Self::Mermaid => GRAMMAR_MERMAID,
        }
    }
}

impl fmt::Display for DiagramGrammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiagramGrammar {
    type Err = UnsupportedGrammarError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plantuml" | "puml" => Ok(Self::PlantUml),
            "mermaid" | "mmd" => Ok(Self::Mermaid),
            _ => Err(UnsupportedGrammarError::new(value.trim(), SUPPORTED_GRAMMARS)),
        }
    }
}

const SUPPORTED_GRAMMARS: &[&str] = &[GRAMMAR_PLANTUML, GRAMMAR_MERMAID];

/// A grammar or output format name that nothing can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedGrammarError {
    pub requested: String,
    pub supported: &'static [&'static str],
}

impl UnsupportedGrammarError {
    #[must_use]
    pub fn new(requested: impl Into<String>, supported: &'static [&'static str]) -> Self {
        Self {
            requested: requested.into(),
            supported,
        }
    }
}

impl fmt::Display for UnsupportedGrammarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unsupported output format '{}' (supported: {})",
            self.requested,
            self.supported.join(", ")
        )
    }
}

impl Error for UnsupportedGrammarError {}

/// Compiled diagram source in one grammar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagramDescription {
    pub grammar: DiagramGrammar,
    pub source: String,
}

/// Compiles `graph` into the grammar named `grammar`.
///
/// # Errors
/// Returns `UnsupportedGrammarError` when `grammar` names no known grammar.
/// Graph content never causes a failure.
pub fn compile(
    graph: &SchemaGraph,
    grammar: &str,
) -> Result<DiagramDescription, UnsupportedGrammarError> {
    Ok(compile_with(graph, grammar.parse()?))
}

#[must_use]
pub fn compile_with(graph: &SchemaGraph, grammar: DiagramGrammar) -> DiagramDescription {
    let source = match grammar {
        DiagramGrammar::PlantUml => plantuml::compile(graph),
        DiagramGrammar::Mermaid => mermaid::compile(graph),
    };
    DiagramDescription { grammar, source }
}

/// Replaces line breaks and tabs so emitted text stays on one line.
pub(crate) fn single_line(text: &str) -> String {
    text.chars()
        .map(|ch| if matches!(ch, '\r' | '\n' | '\t') { ' ' } else { ch })
        .collect()
}

pub(crate) fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// Hands out diagram identifiers that never collide with each other or with
/// entity names emitted verbatim.
#[derive(Debug, Default)]
pub(crate) struct AliasTable {
    used: HashSet<String>,
}

impl AliasTable {
    pub(crate) fn reserve(&mut self, name: &str) {
        self.used.insert(name.to_string());
    }

    pub(crate) fn assign(&mut self, name: &str) -> String {
        let mut base: String = name
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
            .collect();
        if !base.starts_with(|ch: char| ch.is_ascii_alphabetic()) {
            base.insert(0, 'e');
        }
        let mut alias = base.clone();
        let mut counter = 2;
        while self.used.contains(&alias) {
            alias = format!("{base}_{counter}");
            counter += 1;
        }
        self.used.insert(alias.clone());
        alias
    }
}

/// Columns of `entity` that participate in an outgoing relation.
pub(crate) fn foreign_key_columns<'a>(graph: &'a SchemaGraph, entity: &'a str) -> HashSet<&'a str> {
    graph
        .relations_from(entity)
        .flat_map(|relation| relation.columns.iter().map(|pair| pair.column.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_grammar_names_and_rejects_unknown_ones() {
        assert_eq!("PlantUML".parse::<DiagramGrammar>(), Ok(DiagramGrammar::PlantUml));
        assert_eq!("mmd".parse::<DiagramGrammar>(), Ok(DiagramGrammar::Mermaid));
        let err = "graphviz".parse::<DiagramGrammar>().expect_err("unknown grammar");
        assert_eq!(err.requested, "graphviz");
        assert_eq!(err.to_string(), "unsupported output format 'graphviz' (supported: plantuml, mermaid)");
    }

    #[test]
    fn aliases_are_unique_and_plain() {
        let mut aliases = AliasTable::default();
        aliases.reserve("order_items");
        assert_eq!(aliases.assign("order items"), "order_items_2");
        assert_eq!(aliases.assign("order-items"), "order_items_3");
        assert_eq!(aliases.assign("1st"), "e1st");
        assert!(is_plain_identifier("order_items"));
        assert!(!is_plain_identifier("order items"));
        assert!(!is_plain_identifier("9lives"));
    }

    #[test]
    fn single_line_collapses_breaks() {
        assert_eq!(single_line("a\r\nb\tc"), "a  b c");
    }
}
