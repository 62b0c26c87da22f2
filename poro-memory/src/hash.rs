//! A context keeping objects in an in-memory hash.
//!
//! [`HashContext`] stores each saved object as-is (nested objects included),
//! keyed by primary key, and answers finds with the in-memory
//! [`QueryEngine`]. New objects get a random UUID string as their key.

use std::{any::Any, sync::Arc};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use tracing::debug;
use uuid::Uuid;

use poro_core::{
    context::{Context, identity_of},
    engine::{QueryEngine, QueryPlan},
    entity::ClassInfo,
    error::{PoroError, PoroResult},
    hooks::{Callbacks, HookEvent, HookTransform},
    query::FindOptions,
    registry::{ContextFactory, RegistryHandle},
    sort::{NullOrdering, Sorter},
    value::{Object, Value},
};
use indexmap::IndexMap;

/// An in-memory [`Context`] for one class.
///
/// Cloning shares the underlying records.
#[derive(Debug, Clone)]
pub struct HashContext {
    class: ClassInfo,
    primary_key: String,
    records: Arc<RwLock<IndexMap<String, Value>>>,
    callbacks: Arc<Callbacks>,
    engine: QueryEngine,
}

impl HashContext {
    pub fn new(class: ClassInfo) -> Self {
        Self::builder(class).build()
    }

    pub fn builder(class: ClassInfo) -> HashContextBuilder {
        HashContextBuilder::new(class)
    }

    /// The number of stored objects.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn to_object(&self, raw: Value) -> PoroResult<Object> {
        match self.callbacks.apply(HookTransform::BeforeConvertToObject, raw) {
            Value::Object(object) => {
                self.callbacks.fire(HookEvent::AfterConvertToObject, &object);
                self.callbacks.fire(HookEvent::AfterFetch, &object);
                Ok(object)
            }
            other => Err(PoroError::Serialization(format!(
                "stored {} record is a {}",
                self.class.name,
                other.kind()
            ))),
        }
    }

    async fn stored(&self, id: &Value) -> Option<Value> {
        self.records.read().await.get(&id.identity_key()).cloned()
    }
}

#[async_trait]
impl Context for HashContext {
    fn class_name(&self) -> &str {
        &self.class.name
    }

    fn primary_key(&self) -> &str {
        &self.primary_key
    }

    fn callbacks(&self) -> &Callbacks {
        &self.callbacks
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn fetch(&self, id: &Value) -> PoroResult<Option<Object>> {
        self.stored(id)
            .await
            .map(|raw| self.to_object(raw))
            .transpose()
    }

    async fn save(&self, object: &mut Object) -> PoroResult<()> {
        if object.class() != self.class.name {
            return Err(PoroError::SaveFailure(
                self.class.name.clone(),
                format!("cannot save an object of class {}", object.class()),
            ));
        }

        if !self.class.has_field(&self.primary_key) {
            return Err(PoroError::SaveFailure(
                self.class.name.clone(),
                format!("class declares no {} field", self.primary_key),
            ));
        }

        self.callbacks.fire(HookEvent::BeforeSave, object);

        let id = identity_of(object, &self.primary_key)
            .cloned()
            .unwrap_or_else(|| Value::String(Uuid::new_v4().to_string()));

        let mut stored = object.clone();
        stored.set(self.primary_key.as_str(), id.clone());
        let stored = self
            .callbacks
            .apply(HookTransform::BeforeConvertToDocument, Value::Object(stored));

        debug!(class = %self.class.name, id = %id.identity_key(), "saving object");
        self.records
            .write()
            .await
            .insert(id.identity_key(), stored);

        object.set(self.primary_key.as_str(), id);
        self.callbacks.fire(HookEvent::AfterSave, object);
        Ok(())
    }

    async fn remove(&self, object: &mut Object) -> PoroResult<()> {
        let id = identity_of(object, &self.primary_key)
            .cloned()
            .ok_or_else(|| PoroError::RemoveFailure(self.class.name.clone(), "object has no identity".into()))?;

        self.callbacks.fire(HookEvent::BeforeRemove, object);

        debug!(class = %self.class.name, id = %id.identity_key(), "removing object");
        self.records.write().await.shift_remove(&id.identity_key());

        object.set(self.primary_key.as_str(), Value::Null);
        self.callbacks.fire(HookEvent::AfterRemove, object);
        Ok(())
    }

    async fn find_all(&self, options: FindOptions) -> PoroResult<Vec<Object>> {
        let matches = match self.engine.plan(&self.primary_key, options) {
            QueryPlan::ById { id, rest } => {
                let found: Vec<Value> = self.stored(&id).await.into_iter().collect();
                self.engine.execute(found, &rest)
            }
            QueryPlan::Scan(options) => {
                let records: Vec<Value> = self.records.read().await.values().cloned().collect();
                self.engine.execute(records, &options)
            }
        };

        matches
            .into_iter()
            .map(|raw| self.to_object(raw))
            .collect()
    }
}

/// Builder for [`HashContext`].
#[derive(Debug)]
pub struct HashContextBuilder {
    class: ClassInfo,
    primary_key: String,
    nulls: NullOrdering,
}

impl HashContextBuilder {
    pub fn new(class: ClassInfo) -> Self {
        Self {
            class,
            primary_key: "id".to_string(),
            nulls: NullOrdering::default(),
        }
    }

    pub fn primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    pub fn nulls(mut self, nulls: NullOrdering) -> Self {
        self.nulls = nulls;
        self
    }

    pub fn build(self) -> HashContext {
        HashContext {
            class: self.class,
            primary_key: self.primary_key,
            records: Arc::new(RwLock::new(IndexMap::new())),
            callbacks: Arc::new(Callbacks::new()),
            engine: QueryEngine::new(Sorter::new(self.nulls)),
        }
    }
}

/// Builds a fresh [`HashContext`] for every managed class.
#[derive(Debug, Clone, Default)]
pub struct HashFactory {
    primary_key: Option<String>,
    nulls: NullOrdering,
}

impl HashFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = Some(primary_key.into());
        self
    }

    pub fn with_nulls(mut self, nulls: NullOrdering) -> Self {
        self.nulls = nulls;
        self
    }
}

impl ContextFactory for HashFactory {
    fn build(&self, class: &ClassInfo, _registry: &RegistryHandle) -> PoroResult<Arc<dyn Context>> {
        let mut builder = HashContext::builder(class.clone()).nulls(self.nulls);
        if let Some(primary_key) = &self.primary_key {
            builder = builder.primary_key(primary_key.as_str());
        }

        Ok(Arc::new(builder.build()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use poro_core::{
        query::{Found, Selector},
        sort::Direction,
    };

    fn context() -> HashContext {
        HashContext::new(ClassInfo::new("Person", ["id", "first_name", "last_name"]))
    }

    fn person(first: &str, last: &str) -> Object {
        Object::new("Person")
            .with("id", Value::Null)
            .with("first_name", first)
            .with("last_name", last)
    }

    #[tokio::test]
    async fn save_fetch_remove_lifecycle() {
        let context = context();
        let mut george = person("George", "Smith");

        context.save(&mut george).await.unwrap();
        let id = george.get("id").cloned().unwrap();
        assert!(matches!(id, Value::String(_)));

        assert_eq!(context.fetch(&id).await.unwrap(), Some(george.clone()));

        context.remove(&mut george).await.unwrap();
        assert_eq!(george.get("id"), Some(&Value::Null));
        assert_eq!(context.fetch(&id).await.unwrap(), None);
        assert!(context.is_empty().await);
    }

    #[tokio::test]
    async fn saving_twice_keeps_identity() {
        let context = context();
        let mut george = person("George", "Smith");

        context.save(&mut george).await.unwrap();
        let id = george.get("id").cloned();
        george.set("last_name", "Archer");
        context.save(&mut george).await.unwrap();

        assert_eq!(george.get("id").cloned(), id);
        assert_eq!(context.len().await, 1);
    }

    #[tokio::test]
    async fn existing_keys_are_kept() {
        let context = context();
        let mut george = person("George", "Smith").with("id", 42);

        context.save(&mut george).await.unwrap();
        assert_eq!(george.get("id"), Some(&Value::Int(42)));
        assert!(context.fetch(&Value::Int(42)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn removing_unsaved_objects_fails_without_side_effects() {
        let context = context();
        let mut george = person("George", "Smith");

        assert!(matches!(
            context.remove(&mut george).await,
            Err(PoroError::RemoveFailure(_, _))
        ));
        assert_eq!(george.get("id"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn foreign_classes_are_rejected() {
        let context = context();
        let mut address = Object::new("Address").with("street", "Main");

        assert!(matches!(
            context.save(&mut address).await,
            Err(PoroError::SaveFailure(_, _))
        ));
        assert!(address.get("id").is_none());
    }

    #[tokio::test]
    async fn classes_without_the_key_field_cannot_be_saved() {
        let context = HashContext::builder(ClassInfo::new("Tag", ["label"]))
            .primary_key("id")
            .build();
        let mut tag = Object::new("Tag").with("label", "urgent");

        assert!(matches!(
            context.save(&mut tag).await,
            Err(PoroError::SaveFailure(_, _))
        ));
        assert!(tag.get("id").is_none());
        assert!(context.is_empty().await);
    }

    #[tokio::test]
    async fn resaved_objects_keep_their_place_and_removed_ones_return_last() {
        let context = context();
        let mut george = person("George", "Smith").with("id", 1);
        let mut karen = person("Karen", "Zeta").with("id", 2);
        let mut ann = person("Ann", "Archer").with("id", 3);
        for object in [&mut george, &mut karen, &mut ann] {
            context.save(object).await.unwrap();
        }

        george.set("last_name", "Jones");
        context.save(&mut george).await.unwrap();
        context.remove(&mut karen).await.unwrap();
        karen.set("id", 2);
        context.save(&mut karen).await.unwrap();

        let ids: Vec<Value> = context
            .find_all(FindOptions::new())
            .await
            .unwrap()
            .into_iter()
            .filter_map(|o| o.get("id").cloned())
            .collect();
        assert_eq!(ids, vec![Value::Int(1), Value::Int(3), Value::Int(2)]);
    }

    #[tokio::test]
    async fn primary_key_conditions_fetch_directly() {
        let context = context();
        let mut george = person("George", "Smith").with("id", 1);
        let mut karen = person("Karen", "Zeta").with("id", 2);
        context.save(&mut george).await.unwrap();
        context.save(&mut karen).await.unwrap();

        let by_id = FindOptions::builder().filter("id", 2).build();
        assert_eq!(context.find_all(by_id).await.unwrap(), vec![karen]);

        let contradiction = FindOptions::builder()
            .filter("id", 2)
            .filter("last_name", "Smith")
            .build();
        assert!(context.find_all(contradiction).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn find_dispatches_on_selector() {
        let context = context();
        assert_eq!(
            context.find(Selector::First, FindOptions::new()).await.unwrap(),
            Found::One(None)
        );

        for (first, last) in [("George", "Smith"), ("Bridgette", "Smith")] {
            context.save(&mut person(first, last)).await.unwrap();
        }

        let options = FindOptions::builder()
            .filter("last_name", "Smith")
            .sort("first_name", Direction::Asc)
            .build();
        let first = context.find(Selector::parse("one"), options.clone()).await.unwrap();
        assert_eq!(
            first.into_one().and_then(|o| o.get("first_name").cloned()),
            Some(Value::from("Bridgette"))
        );

        let all = context.find(Selector::parse("many"), options).await.unwrap();
        assert_eq!(all.into_vec().len(), 2);
    }

    #[tokio::test]
    async fn hooks_fire_around_operations() {
        let context = context();
        let fired = Arc::new(AtomicUsize::new(0));

        for event in [HookEvent::BeforeSave, HookEvent::AfterSave, HookEvent::AfterFetch] {
            let fired = fired.clone();
            context.callbacks().on(event, move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }
        context
            .callbacks()
            .transform_with(HookTransform::BeforeConvertToDocument, |value| match value {
                Value::Object(object) => Value::Object(object.with("stamped", true)),
                other => other,
            });

        let mut george = person("George", "Smith");
        context.save(&mut george).await.unwrap();
        assert!(george.get("stamped").is_none());

        let fetched = context.fetch(george.get("id").unwrap()).await.unwrap().unwrap();
        assert_eq!(fetched.get("stamped"), Some(&Value::Bool(true)));
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn factory_applies_primary_key() {
        let factory = HashFactory::new().with_primary_key("key");
        let context = factory
            .build(&ClassInfo::new("Person", ["key"]), &RegistryHandle::detached())
            .unwrap();

        let mut george = Object::new("Person");
        context.save(&mut george).await.unwrap();
        assert!(george.get("key").is_some_and(|k| !k.is_null()));
    }
}
