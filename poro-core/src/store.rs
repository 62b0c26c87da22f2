//! The document database context and its factory.
//!
//! [`DocumentContext`] persists the objects of one class into one collection
//! of a [`DocumentDatabase`], converting them with a [`DocumentCodec`].
//! [`DocumentFactory`] builds one such context per managed class for a
//! [`ContextRegistry`](crate::registry::ContextRegistry).
//!
//! # Example
//!
//! ```ignore
//! use poro::{prelude::*, memory::MemoryDocumentStore};
//!
//! let factory = DocumentFactory::builder()
//!     .database(MemoryDocumentStore::new("app"))
//!     .build()?;
//! let registry = ContextRegistry::new(factory);
//! registry.manage::<Person>();
//! ```

use std::{any::Any, collections::HashMap, fmt, sync::Arc};
use async_trait::async_trait;
use tracing::debug;

use crate::{
    backend::{DocumentBackend, DocumentDatabase},
    codec::{DocumentCodec, ID_FIELD},
    context::{Context, identity_of},
    engine::{QueryEngine, QueryPlan},
    entity::ClassInfo,
    error::{PoroError, PoroResult},
    hooks::{Callbacks, HookEvent, HookTransform},
    query::FindOptions,
    registry::{ContextFactory, RegistryHandle},
    value::{Object, Value},
};

/// A [`Context`] over one collection of a document database.
pub struct DocumentContext<B> {
    codec: DocumentCodec,
    backend: B,
    callbacks: Callbacks,
    engine: QueryEngine,
}

impl<B: DocumentBackend + 'static> DocumentContext<B> {
    pub fn builder(class: ClassInfo, backend: B) -> DocumentContextBuilder<B> {
        DocumentContextBuilder::new(class, backend)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn codec(&self) -> &DocumentCodec {
        &self.codec
    }

    async fn to_object(&self, raw: Value) -> PoroResult<Object> {
        let raw = self.callbacks.apply(HookTransform::BeforeConvertToObject, raw);

        match self.codec.decode(raw, false).await? {
            Value::Object(object) => {
                self.callbacks.fire(HookEvent::AfterConvertToObject, &object);
                self.callbacks.fire(HookEvent::AfterFetch, &object);
                Ok(object)
            }
            other => Err(PoroError::Serialization(format!(
                "stored {} record decoded to a {}",
                self.codec.class_name(),
                other.kind()
            ))),
        }
    }

    /// Copies the primary keys that saving assigned to managed objects nested
    /// in `saved` onto their counterparts in `target`.
    fn adopt_keys(&self, target: &mut Value, saved: &Value) {
        match (target, saved) {
            (Value::Object(target), Value::Object(saved)) if target.class() == saved.class() => {
                let context = self
                    .codec
                    .registry()
                    .get()
                    .filter(|registry| registry.is_managed(target.class()))
                    .and_then(|registry| registry.context(target.class()).ok());

                if let Some(context) = context {
                    let key = context.primary_key();
                    if let Some(id) = identity_of(saved, key) {
                        if identity_of(target, key).is_none() {
                            target.set(key, id.clone());
                        }
                    }
                }

                for (name, field) in saved.fields() {
                    if let Some(nested) = target.get_mut(name) {
                        self.adopt_keys(nested, field);
                    }
                }
            }
            (Value::List(target), Value::List(saved)) => {
                for (nested, field) in target.iter_mut().zip(saved) {
                    self.adopt_keys(nested, field);
                }
            }
            (Value::Map(target), Value::Map(saved)) => {
                for (key, nested) in target.iter_mut() {
                    if let Some(field) = saved.get(key) {
                        self.adopt_keys(nested, field);
                    }
                }
            }
            _ => {}
        }
    }

    async fn to_objects(&self, raws: Vec<Value>) -> PoroResult<Vec<Object>> {
        let mut objects = Vec::with_capacity(raws.len());
        for raw in raws {
            objects.push(self.to_object(raw).await?);
        }
        Ok(objects)
    }
}

impl<B: DocumentBackend> fmt::Debug for DocumentContext<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentContext")
            .field("class", &self.codec.class_name())
            .field("backend", &self.backend)
            .finish()
    }
}

#[async_trait]
impl<B: DocumentBackend + 'static> Context for DocumentContext<B> {
    fn class_name(&self) -> &str {
        self.codec.class_name()
    }

    fn primary_key(&self) -> &str {
        self.codec.primary_key()
    }

    fn callbacks(&self) -> &Callbacks {
        &self.callbacks
    }

    fn collection_name(&self) -> Option<&str> {
        Some(self.backend.collection_name())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn fetch(&self, id: &Value) -> PoroResult<Option<Object>> {
        let id = self.codec.clean_id(id.clone());

        match self.backend.find_one(&id).await? {
            Some(raw) => self.to_object(raw).await.map(Some),
            None => Ok(None),
        }
    }

    /// Fetches with a single backend round trip, then restores request order.
    async fn fetch_many(&self, ids: &[Value]) -> PoroResult<Vec<Object>> {
        let ids: Vec<Value> = ids
            .iter()
            .map(|id| self.codec.clean_id(id.clone()))
            .collect();

        let mut by_id: HashMap<String, Value> = self
            .backend
            .find_many(&ids)
            .await?
            .into_iter()
            .filter_map(|raw| {
                let key = raw.as_map()?.get_str(ID_FIELD)?.identity_key();
                Some((key, raw))
            })
            .collect();

        let ordered = ids
            .iter()
            .filter_map(|id| by_id.remove(&id.identity_key()))
            .collect();

        self.to_objects(ordered).await
    }

    async fn save(&self, object: &mut Object) -> PoroResult<()> {
        let class = self.codec.class_name();
        if object.class() != class {
            return Err(PoroError::SaveFailure(
                class.to_string(),
                format!("cannot save an object of class {}", object.class()),
            ));
        }

        if !self.codec.class_info().has_field(self.codec.primary_key()) {
            return Err(PoroError::SaveFailure(
                class.to_string(),
                format!("class declares no {} field", self.codec.primary_key()),
            ));
        }

        self.callbacks.fire(HookEvent::BeforeSave, object);

        // The transform shapes the stored document only; the caller's object
        // receives nothing from it but the keys assigned along the way.
        let mut working = self
            .callbacks
            .apply(HookTransform::BeforeConvertToDocument, Value::Object(object.clone()));
        let document = self.codec.encode(&self.backend, &mut working, false).await?;

        let id = document
            .as_map()
            .and_then(|d| d.get_str(ID_FIELD))
            .cloned()
            .ok_or_else(|| PoroError::SaveFailure(class.to_string(), "encoded record carries no identity".into()))?;

        debug!(class, collection = self.backend.collection_name(), "saving document");
        self.backend
            .save(document)
            .await
            .map_err(|e| PoroError::SaveFailure(class.to_string(), e.to_string()))?;

        if let Value::Object(saved) = &working {
            if saved.class() == class {
                for (name, field) in saved.fields() {
                    if let Some(target) = object.get_mut(name) {
                        self.adopt_keys(target, field);
                    }
                }
            }
        }
        object.set(self.codec.primary_key(), id);

        self.callbacks.fire(HookEvent::AfterSave, object);
        Ok(())
    }

    async fn remove(&self, object: &mut Object) -> PoroResult<()> {
        let class = self.codec.class_name();
        let id = identity_of(object, self.codec.primary_key())
            .cloned()
            .ok_or_else(|| PoroError::RemoveFailure(class.to_string(), "object has no identity".into()))?;

        self.callbacks.fire(HookEvent::BeforeRemove, object);

        debug!(class, collection = self.backend.collection_name(), "removing document");
        self.backend
            .remove(&self.codec.clean_id(id))
            .await
            .map_err(|e| PoroError::RemoveFailure(class.to_string(), e.to_string()))?;

        object.set(self.codec.primary_key(), Value::Null);
        self.callbacks.fire(HookEvent::AfterRemove, object);
        Ok(())
    }

    async fn find_all(&self, options: FindOptions) -> PoroResult<Vec<Object>> {
        match self.engine.plan(self.codec.primary_key(), options) {
            QueryPlan::ById { id, rest } => {
                let found = self.fetch(&id).await?;
                let records: Vec<Value> = found.into_iter().map(Value::Object).collect();

                Ok(self
                    .engine
                    .execute(records, &rest)
                    .into_iter()
                    .filter_map(|record| match record {
                        Value::Object(object) => Some(object),
                        _ => None,
                    })
                    .collect())
            }
            QueryPlan::Scan(options) => {
                let options = options.rename_field(self.codec.primary_key(), ID_FIELD);
                let raws = self.backend.find(options).await?;
                self.to_objects(raws).await
            }
        }
    }
}

/// Builder for [`DocumentContext`].
pub struct DocumentContextBuilder<B> {
    class: ClassInfo,
    backend: B,
    primary_key: String,
    whitelist: Option<Vec<String>>,
    blacklist: Vec<String>,
    attempt_id_conversion: bool,
    registry: RegistryHandle,
}

impl<B: DocumentBackend + 'static> DocumentContextBuilder<B> {
    pub fn new(class: ClassInfo, backend: B) -> Self {
        Self {
            class,
            backend,
            primary_key: "id".to_string(),
            whitelist: None,
            blacklist: Vec::new(),
            attempt_id_conversion: true,
            registry: RegistryHandle::detached(),
        }
    }

    pub fn primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    /// Persists only the named fields.
    pub fn whitelist<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Never persists the named fields.
    pub fn blacklist<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blacklist = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Whether 24 hex digit string ids are turned into object ids before
    /// lookups. Enabled by default.
    pub fn attempt_id_conversion(mut self, enabled: bool) -> Self {
        self.attempt_id_conversion = enabled;
        self
    }

    pub fn registry(mut self, registry: RegistryHandle) -> Self {
        self.registry = registry;
        self
    }

    pub fn build(self) -> DocumentContext<B> {
        DocumentContext {
            codec: DocumentCodec::new(self.class, self.primary_key)
                .with_whitelist(self.whitelist)
                .with_blacklist(self.blacklist)
                .with_id_conversion(self.attempt_id_conversion)
                .with_registry(self.registry),
            backend: self.backend,
            callbacks: Callbacks::new(),
            engine: QueryEngine::default(),
        }
    }
}

type Configure<D> = Arc<
    dyn Fn(DocumentContextBuilder<<D as DocumentDatabase>::Backend>) -> DocumentContextBuilder<<D as DocumentDatabase>::Backend>
        + Send
        + Sync,
>;

/// Builds a [`DocumentContext`] per managed class over one database.
///
/// Each class is stored in the collection its [`ClassInfo`] names, or else
/// in the pluralized snake case of its class name.
pub struct DocumentFactory<D: DocumentDatabase> {
    database: D,
    configure: Option<Configure<D>>,
}

impl<D: DocumentDatabase> DocumentFactory<D> {
    pub fn builder() -> DocumentFactoryBuilder<D> {
        DocumentFactoryBuilder::default()
    }

    pub fn database(&self) -> &D {
        &self.database
    }
}

impl<D: DocumentDatabase> ContextFactory for DocumentFactory<D> {
    fn build(&self, class: &ClassInfo, registry: &RegistryHandle) -> PoroResult<Arc<dyn Context>> {
        let collection = collection_name_for(class);
        debug!(class = %class.name, database = self.database.name(), collection = %collection, "building document context");

        let builder = DocumentContext::builder(class.clone(), self.database.collection(&collection))
            .registry(registry.clone());
        let builder = match &self.configure {
            Some(configure) => configure(builder),
            None => builder,
        };

        Ok(Arc::new(builder.build()))
    }
}

/// Builder for [`DocumentFactory`]. A database is required.
pub struct DocumentFactoryBuilder<D: DocumentDatabase> {
    database: Option<D>,
    configure: Option<Configure<D>>,
}

impl<D: DocumentDatabase> Default for DocumentFactoryBuilder<D> {
    fn default() -> Self {
        Self {
            database: None,
            configure: None,
        }
    }
}

impl<D: DocumentDatabase> DocumentFactoryBuilder<D> {
    pub fn database(mut self, database: D) -> Self {
        self.database = Some(database);
        self
    }

    /// Adjusts every context the factory builds.
    pub fn configure<F>(mut self, configure: F) -> Self
    where
        F: Fn(DocumentContextBuilder<D::Backend>) -> DocumentContextBuilder<D::Backend> + Send + Sync + 'static,
    {
        self.configure = Some(Arc::new(configure));
        self
    }

    /// # Errors
    ///
    /// Returns [`PoroError::Configuration`] when no database was given.
    pub fn build(self) -> PoroResult<DocumentFactory<D>> {
        Ok(DocumentFactory {
            database: self
                .database
                .ok_or_else(|| PoroError::Configuration("a document factory needs a database".into()))?,
            configure: self.configure,
        })
    }
}

/// The collection a class is stored in.
pub fn collection_name_for(class: &ClassInfo) -> String {
    class
        .collection
        .clone()
        .unwrap_or_else(|| format!("{}s", snake_case(&class.name)))
}

fn snake_case(name: &str) -> String {
    let mut snake = String::with_capacity(name.len() + 4);

    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                snake.push('_');
            }
            snake.extend(c.to_lowercase());
        } else {
            snake.push(c);
        }
    }

    snake
}
