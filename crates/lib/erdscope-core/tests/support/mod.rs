#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use erdscope_core::adapter::{AdapterError, AdapterFuture, MetadataAdapter};
use erdscope_core::connection::{
    ConnectionManager,
    ConnectionManagerConfig,
    OpenAdapterFn,
    OpenAdapterFuture,
    OpenRequest,
    StoreKind,
};
use erdscope_model::{Attribute, IndexDescriptor, IntrospectionStage, Relation};
use futures::future::BoxFuture;
use tokio::sync::watch;

pub fn column(name: &str, data_type: &str, primary_key: bool, ordinal: i64) -> Attribute {
    Attribute {
        name: name.to_string(),
        data_type: data_type.to_string(),
        nullable: !primary_key,
        primary_key,
        default: None,
        ordinal,
    }
}

#[derive(Debug, Clone)]
struct ScriptedEntity {
    attributes: Vec<Attribute>,
    relations: Vec<Relation>,
    indexes: Vec<IndexDescriptor>,
    delay: Duration,
}

/// In-memory metadata source with injectable failures, delays, and a
/// cancel trigger.
pub struct ScriptedAdapter {
    scope: String,
    order: Vec<String>,
    entities: HashMap<String, ScriptedEntity>,
    failures: HashSet<(String, IntrospectionStage)>,
    fail_enumeration: bool,
    calls: AtomicUsize,
    attribute_fetches: AtomicUsize,
    cancel_after: Option<(usize, watch::Sender<bool>)>,
    closed: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(scope: &str) -> Self {
        Self {
            scope: scope.to_string(),
            order: Vec::new(),
            entities: HashMap::new(),
            failures: HashSet::new(),
            fail_enumeration: false,
            calls: AtomicUsize::new(0),
            attribute_fetches: AtomicUsize::new(0),
            cancel_after: None,
            closed: AtomicUsize::new(0),
        }
    }

    /// `users(id PK, name)` and `orders(id PK, user_id FK -> users.id)`.
    pub fn users_and_orders() -> Self {
        Self::new("main")
            .with_entity(
                "orders",
                vec![
                    column("id", "INTEGER", true, 0),
                    column("user_id", "INTEGER", false, 1),
                ],
            )
            .with_relation(Relation::new("orders", "users").with_pair("user_id", "id"))
            .with_entity(
                "users",
                vec![
                    column("id", "INTEGER", true, 0),
                    column("name", "TEXT", false, 1),
                ],
            )
            .with_index(
                "users",
                IndexDescriptor {
                    name: "users_name_idx".to_string(),
                    columns: vec!["name".to_string()],
                    unique: false,
                    primary: false,
                },
            )
    }

    #[must_use]
    pub fn with_entity(mut self, name: &str, attributes: Vec<Attribute>) -> Self {
        self.order.push(name.to_string());
        self.entities.insert(
            name.to_string(),
            ScriptedEntity {
                attributes,
                relations: Vec::new(),
                indexes: Vec::new(),
                delay: Duration::ZERO,
            },
        );
        self
    }

    #[must_use]
    pub fn with_relation(mut self, relation: Relation) -> Self {
        if let Some(entity) = self.entities.get_mut(&relation.source) {
            entity.relations.push(relation);
        }
        self
    }

    #[must_use]
    pub fn with_index(mut self, entity: &str, index: IndexDescriptor) -> Self {
        if let Some(entity) = self.entities.get_mut(entity) {
            entity.indexes.push(index);
        }
        self
    }

    #[must_use]
    pub fn with_delay(mut self, entity: &str, delay: Duration) -> Self {
        if let Some(entity) = self.entities.get_mut(entity) {
            entity.delay = delay;
        }
        self
    }

    #[must_use]
    pub fn failing(mut self, entity: &str, stage: IntrospectionStage) -> Self {
        self.failures.insert((entity.to_string(), stage));
        self
    }

    #[must_use]
    pub const fn failing_enumeration(mut self) -> Self {
        self.fail_enumeration = true;
        self
    }

    /// Fires `cancel` once `fetches` attribute fetches have started.
    #[must_use]
    pub fn cancel_after(mut self, fetches: usize, cancel: watch::Sender<bool>) -> Self {
        self.cancel_after = Some((fetches, cancel));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn lookup(
        &self,
        scope: &str,
        entity: &str,
        stage: IntrospectionStage,
    ) -> Result<ScriptedEntity, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if scope != self.scope {
            return Err(AdapterError::Unavailable(format!("unknown schema {scope}")));
        }
        if self.failures.contains(&(entity.to_string(), stage)) {
            return Err(AdapterError::Unavailable(format!(
                "permission denied for {stage} of {entity}"
            )));
        }
        self.entities
            .get(entity)
            .cloned()
            .ok_or_else(|| AdapterError::Unavailable(format!("no such table {entity}")))
    }
}

impl MetadataAdapter for ScriptedAdapter {
    fn store_kind(&self) -> StoreKind {
        StoreKind::Sqlite
    }

    fn ping(&self) -> AdapterFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn default_scope(&self) -> AdapterFuture<'_, String> {
        Box::pin(async move { Ok(self.scope.clone()) })
    }

    fn list_entities<'a>(&'a self, scope: &'a str) -> AdapterFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_enumeration {
                return Err(AdapterError::Unavailable("catalog unavailable".to_string()));
            }
            if scope != self.scope {
                return Ok(Vec::new());
            }
            Ok(self.order.clone())
        })
    }

    fn list_attributes<'a>(
        &'a self,
        scope: &'a str,
        entity: &'a str,
    ) -> AdapterFuture<'a, Vec<Attribute>> {
        Box::pin(async move {
            let started = self.attribute_fetches.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((threshold, cancel)) = &self.cancel_after
                && started >= *threshold
            {
                let _ = cancel.send(true);
            }
            let scripted = self.lookup(scope, entity, IntrospectionStage::Attributes)?;
            tokio::time::sleep(scripted.delay).await;
            Ok(scripted.attributes)
        })
    }

    fn list_relations_from<'a>(
        &'a self,
        scope: &'a str,
        entity: &'a str,
    ) -> AdapterFuture<'a, Vec<Relation>> {
        Box::pin(async move {
            let scripted = self.lookup(scope, entity, IntrospectionStage::Relations)?;
            tokio::time::sleep(scripted.delay).await;
            Ok(scripted.relations)
        })
    }

    fn list_indexes<'a>(
        &'a self,
        scope: &'a str,
        entity: &'a str,
    ) -> AdapterFuture<'a, Vec<IndexDescriptor>> {
        Box::pin(async move {
            let scripted = self.lookup(scope, entity, IntrospectionStage::Indexes)?;
            Ok(scripted.indexes)
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.closed.fetch_add(1, Ordering::SeqCst);
        })
    }
}

/// Opener that hands out `adapter` for every connect.
pub fn scripted_opener(adapter: Arc<ScriptedAdapter>) -> OpenAdapterFn {
    Arc::new(move |_request: OpenRequest| -> OpenAdapterFuture {
        let adapter = Arc::clone(&adapter);
        Box::pin(async move { Ok(adapter as Arc<dyn MetadataAdapter>) })
    })
}

/// Opener whose connect always fails like an unreachable server.
pub fn refusing_opener() -> OpenAdapterFn {
    Arc::new(|_request: OpenRequest| -> OpenAdapterFuture {
        Box::pin(async {
            Err(AdapterError::Unavailable(
                "connection refused (os error 111)".to_string(),
            ))
        })
    })
}

pub fn scripted_manager(adapter: Arc<ScriptedAdapter>) -> Arc<ConnectionManager> {
    Arc::new(ConnectionManager::new(ConnectionManagerConfig::new(
        scripted_opener(adapter),
    )))
}
