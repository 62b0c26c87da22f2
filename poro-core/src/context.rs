//! Contexts: the per-class persistence interface.
//!
//! A [`Context`] owns the store handle and primary key configuration for one
//! class and speaks in [`Object`]s. [`TypedContext`] wraps a context to speak
//! in concrete [`Entity`] types instead.

use std::{any::Any, fmt, marker::PhantomData, sync::Arc};
use async_trait::async_trait;

use crate::{
    entity::Entity,
    error::PoroResult,
    hooks::Callbacks,
    query::{FindOptions, Found, Selector},
    value::{Object, Value},
};

/// Persistence operations for the objects of one class.
///
/// Implementations must keep an object's primary key untouched when a save
/// or removal fails.
#[async_trait]
pub trait Context: Send + Sync + fmt::Debug {
    fn class_name(&self) -> &str;

    /// The name of the field holding the primary key.
    fn primary_key(&self) -> &str;

    fn callbacks(&self) -> &Callbacks;

    /// The collection the context stores into, when it has one.
    fn collection_name(&self) -> Option<&str> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    /// Loads the object with primary key `id`.
    async fn fetch(&self, id: &Value) -> PoroResult<Option<Object>>;

    /// Loads the objects with the given ids, in request order. Ids with no
    /// stored object are skipped.
    async fn fetch_many(&self, ids: &[Value]) -> PoroResult<Vec<Object>> {
        let mut objects = Vec::with_capacity(ids.len());

        for id in ids {
            if let Some(object) = self.fetch(id).await? {
                objects.push(object);
            }
        }

        Ok(objects)
    }

    /// Persists `object`, assigning a primary key when it has none.
    ///
    /// # Errors
    ///
    /// Returns [`PoroError::SaveFailure`](crate::error::PoroError::SaveFailure)
    /// when the object cannot be identified or the store rejects the write.
    async fn save(&self, object: &mut Object) -> PoroResult<()>;

    /// Deletes `object` from the store and clears its primary key.
    async fn remove(&self, object: &mut Object) -> PoroResult<()>;

    async fn find_all(&self, options: FindOptions) -> PoroResult<Vec<Object>>;

    async fn find_first(&self, options: FindOptions) -> PoroResult<Option<Object>> {
        Ok(self.find_all(options.first()).await?.into_iter().next())
    }

    async fn find(&self, selector: Selector, options: FindOptions) -> PoroResult<Found<Object>> {
        Ok(match selector {
            Selector::All => Found::Many(self.find_all(options).await?),
            Selector::First => Found::One(self.find_first(options).await?),
            Selector::Id(id) => Found::One(self.fetch(&id).await?),
            Selector::Ids(ids) => Found::Many(self.fetch_many(&ids).await?),
        })
    }
}

/// The primary key of `object` under `primary_key`, unless unset or null.
pub fn identity_of<'a>(object: &'a Object, primary_key: &str) -> Option<&'a Value> {
    object.get(primary_key).filter(|id| !id.is_null())
}

/// A [`Context`] viewed through a concrete entity type.
pub struct TypedContext<E> {
    inner: Arc<dyn Context>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for TypedContext<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E> fmt::Debug for TypedContext<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypedContext").field(&self.inner).finish()
    }
}

impl<E: Entity> TypedContext<E> {
    pub fn new(inner: Arc<dyn Context>) -> Self {
        Self {
            inner,
            _entity: PhantomData,
        }
    }

    pub fn inner(&self) -> &Arc<dyn Context> {
        &self.inner
    }

    pub fn callbacks(&self) -> &Callbacks {
        self.inner.callbacks()
    }

    /// Saves the entity and writes back everything the store assigned,
    /// including primary keys of nested managed entities.
    pub async fn save(&self, entity: &mut E) -> PoroResult<()> {
        let mut object = entity.extract();
        self.inner.save(&mut object).await?;
        entity.restore(object)
    }

    pub async fn remove(&self, entity: &mut E) -> PoroResult<()> {
        let mut object = entity.extract();
        self.inner.remove(&mut object).await?;
        entity.restore(object)
    }

    pub async fn fetch(&self, id: impl Into<Value>) -> PoroResult<Option<E>> {
        self.inner
            .fetch(&id.into())
            .await?
            .map(E::from_object)
            .transpose()
    }

    pub async fn fetch_many(&self, ids: &[Value]) -> PoroResult<Vec<E>> {
        self.inner
            .fetch_many(ids)
            .await?
            .into_iter()
            .map(E::from_object)
            .collect()
    }

    pub async fn find_all(&self, options: FindOptions) -> PoroResult<Vec<E>> {
        self.inner
            .find_all(options)
            .await?
            .into_iter()
            .map(E::from_object)
            .collect()
    }

    pub async fn find_first(&self, options: FindOptions) -> PoroResult<Option<E>> {
        self.inner
            .find_first(options)
            .await?
            .map(E::from_object)
            .transpose()
    }

    pub async fn find(&self, selector: impl Into<Selector>, options: FindOptions) -> PoroResult<Found<E>> {
        self.inner
            .find(selector.into(), options)
            .await?
            .try_map(E::from_object)
    }
}
