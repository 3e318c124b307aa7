//! Schema graph assembly.
//!
//! [`SchemaGraphBuilder::build`] enumerates the entities of one scope, fetches
//! every entity's facets concurrently, and folds the results into an immutable
//! [`SchemaGraph`]. Per-entity failures become diagnostics; only enumeration
//! failure (or an aborting cancellation) fails the build.

use std::collections::HashSet;
use std::error::Error;
use std::fmt;

use erdscope_model::{
    Attribute,
    ColumnPair,
    Diagnostic,
    Entity,
    IndexDescriptor,
    IntrospectionStage,
    Relation,
};
use futures::{StreamExt, future, stream};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::adapter::{AdapterError, IntrospectionError, MetadataAdapter};
use crate::connection::StoreKind;

/// What a build does once its cancel signal fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CancelPolicy {
    /// Fail with [`BuildError::Cancelled`].
    #[default]
    Abort,
    /// Return the entities fetched so far with `complete = false`.
    Partial,
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    concurrency: usize,
    cancel: Option<watch::Receiver<bool>>,
    policy: CancelPolicy,
}

impl BuildOptions {
    pub const DEFAULT_CONCURRENCY: usize = 4;

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>, policy: CancelPolicy) -> Self {
        self.cancel = Some(cancel);
        self.policy = policy;
        self
    }

    #[must_use]
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    #[must_use]
    pub const fn policy(&self) -> CancelPolicy {
        self.policy
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|cancel| *cancel.borrow())
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            concurrency: Self::DEFAULT_CONCURRENCY,
            cancel: None,
            policy: CancelPolicy::Abort,
        }
    }
}

#[derive(Debug)]
pub enum BuildError {
    EnumerationFailed { scope: String, cause: AdapterError },
    Cancelled { completed: usize, total: usize },
}

impl BuildError {
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        match self {
            Self::EnumerationFailed { scope, .. } => Some(scope.as_str()),
            Self::Cancelled { .. } => None,
        }
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnumerationFailed { scope, cause } if scope.is_empty() => {
                write!(f, "failed to resolve the default schema: {cause}")
            }
            Self::EnumerationFailed { scope, cause } => {
                write!(f, "failed to enumerate entities of schema '{scope}': {cause}")
            }
            Self::Cancelled { completed, total } => write!(
                f,
                "introspection cancelled after {completed} of {total} entities"
            ),
        }
    }
}

impl Error for BuildError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::EnumerationFailed { cause, .. } => Some(cause),
            Self::Cancelled { .. } => None,
        }
    }
}

/// Entities and relations of one introspection pass. Only the builder
/// constructs it; consumers get read-only access.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaGraph {
    scope: String,
    store_kind: StoreKind,
    entities: Vec<Entity>,
    relations: Vec<Relation>,
    diagnostics: Vec<Diagnostic>,
    complete: bool,
}

impl SchemaGraph {
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    #[must_use]
    pub const fn store_kind(&self) -> StoreKind {
        self.store_kind
    }

    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// All relations ordered by source entity, then discovery order.
    #[must_use]
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// False when a cancellation cut the build short.
    #[must_use]
    pub const fn complete(&self) -> bool {
        self.complete
    }

    #[must_use]
    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.name == name)
    }

    pub fn relations_from<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Relation> + 'a {
        self.relations
            .iter()
            .filter(move |relation| relation.source == name)
    }

    /// In-scope relations whose target is `name`.
    pub fn relations_to<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Relation> + 'a {
        self.relations
            .iter()
            .filter(move |relation| !relation.dangling && relation.target == name)
    }

    #[must_use]
    pub fn dangling_count(&self) -> usize {
        self.relations.iter().filter(|relation| relation.dangling).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn from_parts(scope: &str, entities: Vec<Entity>, relations: Vec<Relation>) -> Self {
        let mut relations = collapse_relations(relations);
        let known: HashSet<&str> = entities.iter().map(|entity| entity.name.as_str()).collect();
        mark_dangling(&mut relations, scope, &known);
        Self {
            scope: scope.to_string(),
            store_kind: StoreKind::Sqlite,
            entities,
            relations,
            diagnostics: Vec::new(),
            complete: true,
        }
    }
}

pub struct SchemaGraphBuilder {
    options: BuildOptions,
}

impl SchemaGraphBuilder {
    pub const fn new(options: BuildOptions) -> Self {
        Self { options }
    }

    /// Builds a fresh graph of `scope`; an empty scope means the adapter's
    /// default.
    ///
    /// # Errors
    /// Returns `BuildError::EnumerationFailed` when the scope cannot be
    /// resolved or enumerated, and `BuildError::Cancelled` when the cancel
    /// signal fires under [`CancelPolicy::Abort`].
    pub async fn build(
        &self,
        adapter: &dyn MetadataAdapter,
        scope: &str,
    ) -> Result<SchemaGraph, BuildError> {
        let scope = match scope.trim() {
            "" => adapter
                .default_scope()
                .await
                .map_err(|cause| BuildError::EnumerationFailed {
                    scope: String::new(),
                    cause,
                })?,
            named => named.to_string(),
        };

        let names = adapter
            .list_entities(&scope)
            .await
            .map_err(|cause| BuildError::EnumerationFailed {
                scope: scope.clone(),
                cause,
            })?;
        let mut diagnostics = Vec::new();
        let names = unique_entity_names(names, &mut diagnostics);
        let total = names.len();
        debug!(scope = %scope, total, "enumerated entities");

        let scope_ref = scope.as_str();
        let fetched: Vec<EntityFetch> = stream::iter(names.iter())
            .take_while(|_| future::ready(!self.options.is_cancelled()))
            .map(|name| fetch_entity(adapter, scope_ref, name))
            .buffered(self.options.concurrency)
            .boxed()
            .collect()
            .await;

        let completed = fetched.len();
        let complete = completed == total;
        if !complete && self.options.policy == CancelPolicy::Abort {
            warn!(scope = %scope, completed, total, "introspection cancelled");
            return Err(BuildError::Cancelled { completed, total });
        }

        let mut entities = Vec::with_capacity(completed);
        let mut relations = Vec::new();
        for fetch in fetched {
            entities.push(fetch.entity);
            relations.extend(fetch.relations);
            diagnostics.extend(fetch.diagnostics);
        }
        if !complete {
            diagnostics.push(Diagnostic::new(
                String::new(),
                IntrospectionStage::Cancelled,
                format!("introspection cancelled after {completed} of {total} entities"),
            ));
        }

        let mut relations = collapse_relations(relations);
        let known: HashSet<&str> = entities.iter().map(|entity| entity.name.as_str()).collect();
        mark_dangling(&mut relations, &scope, &known);

        for diagnostic in &diagnostics {
            warn!(
                entity = %diagnostic.entity,
                stage = %diagnostic.stage,
                message = %diagnostic.message,
                "introspection diagnostic"
            );
        }
        info!(
            scope = %scope,
            entities = entities.len(),
            relations = relations.len(),
            diagnostics = diagnostics.len(),
            complete,
            "schema graph built"
        );

        Ok(SchemaGraph {
            scope,
            store_kind: adapter.store_kind(),
            entities,
            relations,
            diagnostics,
            complete,
        })
    }
}

impl Default for SchemaGraphBuilder {
    fn default() -> Self {
        Self::new(BuildOptions::default())
    }
}

struct EntityFetch {
    entity: Entity,
    relations: Vec<Relation>,
    diagnostics: Vec<Diagnostic>,
}

async fn fetch_entity(adapter: &dyn MetadataAdapter, scope: &str, name: &str) -> EntityFetch {
    let (attributes, relations, indexes) = futures::join!(
        adapter.list_attributes(scope, name),
        adapter.list_relations_from(scope, name),
        adapter.list_indexes(scope, name),
    );

    let mut diagnostics = Vec::new();
    let attributes = facet(name, IntrospectionStage::Attributes, attributes, &mut diagnostics);
    let attributes = unique_attributes(name, attributes, &mut diagnostics);
    let relations = facet(name, IntrospectionStage::Relations, relations, &mut diagnostics)
        .into_iter()
        .map(|mut relation| {
            relation.source = name.to_string();
            relation.dangling = false;
            relation
        })
        .collect();
    let indexes: Vec<IndexDescriptor> =
        facet(name, IntrospectionStage::Indexes, indexes, &mut diagnostics);

    EntityFetch {
        entity: Entity {
            name: name.to_string(),
            attributes,
            indexes,
        },
        relations,
        diagnostics,
    }
}

fn facet<T>(
    entity: &str,
    stage: IntrospectionStage,
    result: Result<Vec<T>, AdapterError>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(cause) => {
            diagnostics.push(IntrospectionError::new(entity, stage, cause).into_diagnostic());
            Vec::new()
        }
    }
}

/// Keeps the first occurrence of each entity name, in enumeration order.
fn unique_entity_names(names: Vec<String>, diagnostics: &mut Vec<Diagnostic>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(names.len());
    for name in names {
        if seen.insert(name.clone()) {
            kept.push(name);
        } else {
            diagnostics.push(Diagnostic::new(
                name.as_str(),
                IntrospectionStage::Entities,
                format!("entity '{name}' enumerated more than once; kept the first"),
            ));
        }
    }
    kept
}

/// Keeps the first attribute of each name.
fn unique_attributes(
    entity: &str,
    attributes: Vec<Attribute>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Attribute> {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(attributes.len());
    for attribute in attributes {
        if seen.insert(attribute.name.clone()) {
            kept.push(attribute);
        } else {
            diagnostics.push(Diagnostic::new(
                entity,
                IntrospectionStage::Attributes,
                format!("duplicate attribute '{}' reported; kept the first", attribute.name),
            ));
        }
    }
    kept
}

#[derive(PartialEq, Eq, Hash)]
struct RelationKey {
    source: String,
    target: String,
    target_schema: Option<String>,
    name: Option<String>,
    pairs: Vec<ColumnPair>,
}

impl RelationKey {
    fn of(relation: &Relation) -> Self {
        let mut pairs = relation.columns.clone();
        pairs.sort();
        Self {
            source: relation.source.clone(),
            target: relation.target.clone(),
            target_schema: relation.target_schema.clone(),
            name: relation.name.clone(),
            pairs,
        }
    }
}

/// Drops repeated column pairs and structurally identical relations,
/// preserving first-seen order.
fn collapse_relations(relations: Vec<Relation>) -> Vec<Relation> {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(relations.len());
    for mut relation in relations {
        let mut pairs = HashSet::new();
        relation.columns.retain(|pair| pairs.insert(pair.clone()));
        if seen.insert(RelationKey::of(&relation)) {
            kept.push(relation);
        }
    }
    kept
}

fn mark_dangling(relations: &mut [Relation], scope: &str, known: &HashSet<&str>) {
    for relation in relations {
        let foreign_schema = relation
            .target_schema
            .as_deref()
            .is_some_and(|schema| schema != scope);
        relation.dangling = foreign_schema || !known.contains(relation.target.as_str());
    }
}
