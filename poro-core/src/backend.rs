//! Document store backend abstraction.
//!
//! This module defines the traits that abstract over document databases, so
//! that [`DocumentContext`](crate::store::DocumentContext) can persist
//! encoded objects into any of them (in-memory, MongoDB, ...).
//!
//! # Traits
//!
//! - [`DocumentBackend`]: one collection of a document database
//! - [`DocumentDatabase`]: hands out a backend per collection name
//!
//! Documents cross this boundary as [`Value::Map`]s carrying their primary
//! key under `_id`. Backends convert them to their native format.

use async_trait::async_trait;
use bson::oid::ObjectId;
use std::fmt::Debug;

use crate::{error::PoroResult, query::FindOptions, value::Value};

/// One collection of a document database.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and support concurrent access from
/// multiple async tasks.
#[async_trait]
pub trait DocumentBackend: Send + Sync + Debug {
    /// The name of the database the collection belongs to. Two backends with
    /// the same database name can reference each other's documents.
    fn database_name(&self) -> &str;

    fn collection_name(&self) -> &str;

    /// Generates a fresh primary key.
    fn create_pk(&self) -> Value {
        Value::ObjectId(ObjectId::new())
    }

    /// Retrieves the document whose `_id` equals `id`.
    async fn find_one(&self, id: &Value) -> PoroResult<Option<Value>>;

    /// Retrieves the documents with the given ids.
    ///
    /// Missing ids are omitted. The order of the returned documents is not
    /// guaranteed to match the request order.
    async fn find_many(&self, ids: &[Value]) -> PoroResult<Vec<Value>>;

    /// Inserts the document, replacing any existing document with the same `_id`.
    ///
    /// # Arguments
    ///
    /// * `document` - A [`Value::Map`] carrying `_id`
    async fn save(&self, document: Value) -> PoroResult<()>;

    /// Deletes the document with `_id` equal to `id`. Deleting a missing
    /// document is not an error.
    async fn remove(&self, id: &Value) -> PoroResult<()>;

    /// Queries documents, applying conditions, order, limit and offset.
    ///
    /// Keypaths in `options` address document fields, so the primary key is
    /// `_id`.
    async fn find(&self, options: FindOptions) -> PoroResult<Vec<Value>>;
}

/// A document database handing out one backend per collection.
pub trait DocumentDatabase: Send + Sync + Debug + 'static {
    type Backend: DocumentBackend + 'static;

    fn name(&self) -> &str;

    fn collection(&self, name: &str) -> Self::Backend;
}
