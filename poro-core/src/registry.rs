//! The class catalog and the per-class context cache.
//!
//! A [`ContextRegistry`] knows which classes exist, which of them are
//! managed (persisted through a context of their own), and builds each
//! managed class's context once, on first use, through a
//! [`ContextFactory`].
//!
//! # Example
//!
//! ```ignore
//! use poro::{prelude::*, memory::HashFactory};
//!
//! let registry = ContextRegistry::new(HashFactory::new());
//! registry.manage::<Person>();
//!
//! let people = registry.typed::<Person>()?;
//! people.save(&mut person).await?;
//! ```

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Weak},
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::{
    context::{Context, TypedContext},
    entity::{ClassInfo, Entity},
    error::{PoroError, PoroResult},
};

/// Builds the context of one managed class.
///
/// Closures of the right shape are factories too.
pub trait ContextFactory: Send + Sync {
    fn build(&self, class: &ClassInfo, registry: &RegistryHandle) -> PoroResult<Arc<dyn Context>>;
}

impl<F> ContextFactory for F
where
    F: Fn(&ClassInfo, &RegistryHandle) -> PoroResult<Arc<dyn Context>> + Send + Sync,
{
    fn build(&self, class: &ClassInfo, registry: &RegistryHandle) -> PoroResult<Arc<dyn Context>> {
        self(class, registry)
    }
}

/// A non-owning reference from a context back to its registry.
#[derive(Clone, Default)]
pub struct RegistryHandle(Weak<ContextRegistry>);

impl RegistryHandle {
    /// A handle attached to no registry.
    pub fn detached() -> Self {
        Self(Weak::new())
    }

    pub fn is_attached(&self) -> bool {
        self.0.strong_count() > 0
    }

    pub fn upgrade(&self) -> PoroResult<Arc<ContextRegistry>> {
        self.0
            .upgrade()
            .ok_or_else(|| PoroError::Configuration("context registry is no longer available".into()))
    }

    /// The registry, if still alive.
    pub fn get(&self) -> Option<Arc<ContextRegistry>> {
        self.0.upgrade()
    }
}

impl fmt::Debug for RegistryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryHandle")
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    info: ClassInfo,
    managed: bool,
}

enum Slot {
    Building,
    Ready(Arc<dyn Context>),
}

pub struct ContextRegistry {
    this: Weak<ContextRegistry>,
    factory: Box<dyn ContextFactory>,
    classes: RwLock<HashMap<String, CatalogEntry>>,
    contexts: Mutex<HashMap<String, Slot>>,
    collections: RwLock<HashMap<String, String>>,
}

impl ContextRegistry {
    pub fn new(factory: impl ContextFactory + 'static) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            factory: Box::new(factory),
            classes: RwLock::new(HashMap::new()),
            contexts: Mutex::new(HashMap::new()),
            collections: RwLock::new(HashMap::new()),
        })
    }

    pub fn handle(&self) -> RegistryHandle {
        RegistryHandle(self.this.clone())
    }

    /// Flags `E` for persistence.
    pub fn manage<E: Entity>(&self) -> &Self {
        self.register(E::class_info(), true)
    }

    /// Makes `E` known, so embedded instances can be decoded, without
    /// giving it a context.
    pub fn declare<E: Entity>(&self) -> &Self {
        self.register(E::class_info(), false)
    }

    /// Adds a class to the catalog. Re-registering a class replaces its
    /// entry; a managed class stays managed.
    pub fn register(&self, info: ClassInfo, managed: bool) -> &Self {
        let mut classes = self.classes.write();
        let managed = managed || classes.get(&info.name).is_some_and(|e| e.managed);

        debug!(class = %info.name, managed, "registering class");
        classes.insert(info.name.clone(), CatalogEntry { info, managed });
        self
    }

    pub fn class_info(&self, class: &str) -> Option<ClassInfo> {
        self.classes.read().get(class).map(|e| e.info.clone())
    }

    pub fn is_known(&self, class: &str) -> bool {
        self.classes.read().contains_key(class)
    }

    pub fn is_managed(&self, class: &str) -> bool {
        self.classes.read().get(class).is_some_and(|e| e.managed)
    }

    /// The context of a managed class, built on first use.
    ///
    /// # Errors
    ///
    /// Returns [`PoroError::Configuration`] when the class is not managed,
    /// when its context is requested again while it is still being built, or
    /// when the factory fails.
    pub fn context(&self, class: &str) -> PoroResult<Arc<dyn Context>> {
        let info = {
            let mut slots = self.contexts.lock();

            match slots.get(class) {
                Some(Slot::Ready(context)) => return Ok(context.clone()),
                Some(Slot::Building) => {
                    return Err(PoroError::Configuration(format!(
                        "context for {class} requested while it is being built"
                    )));
                }
                None => {}
            }

            let info = match self.classes.read().get(class) {
                Some(entry) if entry.managed => entry.info.clone(),
                _ => {
                    return Err(PoroError::Configuration(format!(
                        "class {class} is not flagged for persistence"
                    )));
                }
            };

            slots.insert(class.to_string(), Slot::Building);
            info
        };

        debug!(class, "building context");
        let built = self.factory.build(&info, &self.handle());
        let mut slots = self.contexts.lock();

        match built {
            Ok(context) => {
                if let Some(collection) = context.collection_name() {
                    self.collections
                        .write()
                        .insert(collection.to_string(), class.to_string());
                }
                slots.insert(class.to_string(), Slot::Ready(context.clone()));
                Ok(context)
            }
            Err(err) => {
                warn!(class, error = %err, "failed to build context");
                slots.remove(class);
                Err(err)
            }
        }
    }

    pub fn typed<E: Entity>(&self) -> PoroResult<TypedContext<E>> {
        self.context(&E::class_name()).map(TypedContext::new)
    }

    /// The context storing into `collection`, if any.
    ///
    /// Contexts already built are found by the collection they report.
    /// Otherwise a managed class declaring that collection gets its context
    /// built.
    pub fn context_for_collection(&self, collection: &str) -> PoroResult<Option<Arc<dyn Context>>> {
        let indexed = self.collections.read().get(collection).cloned();
        if let Some(class) = indexed {
            return self.context(&class).map(Some);
        }

        let declared = self
            .classes
            .read()
            .values()
            .find(|e| e.managed && e.info.collection.as_deref() == Some(collection))
            .map(|e| e.info.name.clone());

        match declared {
            Some(class) => self.context(&class).map(Some),
            None => Ok(None),
        }
    }

    /// Drops every cached context. The class catalog is kept.
    pub fn reset(&self) {
        debug!("resetting context cache");
        self.contexts.lock().clear();
        self.collections.write().clear();
    }
}

impl fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut classes: Vec<String> = self.classes.read().keys().cloned().collect();
        classes.sort();

        f.debug_struct("ContextRegistry")
            .field("classes", &classes)
            .field("contexts", &self.contexts.lock().len())
            .finish()
    }
}
