//! In-memory document database.
//!
//! [`MemoryDocumentStore`] keeps BSON documents per collection behind an
//! async-aware read-write lock and hands out [`MemoryCollection`] backends
//! for [`DocumentContext`](poro_core::store::DocumentContext). Queries scan
//! the whole collection (no indexing) through the shared query engine,
//! sorting nulls according to the store's [`NullOrdering`].

use std::{collections::HashMap, sync::Arc};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::Bson;
use indexmap::IndexMap;
use tracing::debug;

use poro_core::{
    backend::{DocumentBackend, DocumentDatabase},
    codec::ID_FIELD,
    engine::QueryEngine,
    error::{PoroError, PoroResult},
    query::FindOptions,
    sort::{NullOrdering, Sorter},
    value::Value,
};

/// Collection name to documents keyed by primary key, in insertion order.
type StoreMap = HashMap<String, IndexMap<String, Bson>>;

/// Thread-safe in-memory document database.
///
/// Clones share the same underlying data, and so do all the collections
/// handed out by one store.
///
/// # Example
///
/// ```ignore
/// use poro::memory::MemoryDocumentStore;
/// use poro::store::DocumentFactory;
///
/// let factory = DocumentFactory::builder()
///     .database(MemoryDocumentStore::new("app"))
///     .build()?;
/// ```
#[derive(Clone, Debug)]
pub struct MemoryDocumentStore {
    name: String,
    nulls: NullOrdering,
    store: Arc<RwLock<StoreMap>>,
}

impl MemoryDocumentStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nulls: NullOrdering::default(),
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Where `find` sorts null and missing sort-key values.
    pub fn with_nulls(mut self, nulls: NullOrdering) -> Self {
        self.nulls = nulls;
        self
    }

    pub fn nulls(&self) -> NullOrdering {
        self.nulls
    }

    pub fn builder() -> MemoryDocumentStoreBuilder {
        MemoryDocumentStoreBuilder::default()
    }

    /// Names of the collections holding at least one document.
    pub async fn collection_names(&self) -> Vec<String> {
        let store = self.store.read().await;
        let mut names: Vec<String> = store
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Drops every document of every collection.
    pub async fn clear(&self) {
        self.store.write().await.clear();
    }
}

impl DocumentDatabase for MemoryDocumentStore {
    type Backend = MemoryCollection;

    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> MemoryCollection {
        MemoryCollection {
            database: self.name.clone(),
            collection: name.to_string(),
            store: self.store.clone(),
            engine: QueryEngine::new(Sorter::new(self.nulls)),
        }
    }
}

/// Builder for [`MemoryDocumentStore`].
#[derive(Debug)]
pub struct MemoryDocumentStoreBuilder {
    name: String,
    nulls: NullOrdering,
}

impl Default for MemoryDocumentStoreBuilder {
    fn default() -> Self {
        Self {
            name: "memory".to_string(),
            nulls: NullOrdering::default(),
        }
    }
}

impl MemoryDocumentStoreBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Where `find` sorts null and missing sort-key values.
    pub fn nulls(mut self, nulls: NullOrdering) -> Self {
        self.nulls = nulls;
        self
    }

    pub fn build(self) -> MemoryDocumentStore {
        MemoryDocumentStore::new(self.name).with_nulls(self.nulls)
    }
}

/// One collection of a [`MemoryDocumentStore`].
#[derive(Clone, Debug)]
pub struct MemoryCollection {
    database: String,
    collection: String,
    store: Arc<RwLock<StoreMap>>,
    engine: QueryEngine,
}

impl MemoryCollection {
    /// The number of documents currently stored.
    pub async fn len(&self) -> usize {
        self.store
            .read()
            .await
            .get(&self.collection)
            .map_or(0, IndexMap::len)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn snapshot(&self) -> Vec<Bson> {
        self.store
            .read()
            .await
            .get(&self.collection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentBackend for MemoryCollection {
    fn database_name(&self) -> &str {
        &self.database
    }

    fn collection_name(&self) -> &str {
        &self.collection
    }

    async fn find_one(&self, id: &Value) -> PoroResult<Option<Value>> {
        let store = self.store.read().await;

        Ok(store
            .get(&self.collection)
            .and_then(|records| records.get(&id.identity_key()))
            .cloned()
            .map(Value::from))
    }

    async fn find_many(&self, ids: &[Value]) -> PoroResult<Vec<Value>> {
        let keys: Vec<String> = ids.iter().map(Value::identity_key).collect();
        let store = self.store.read().await;

        let Some(records) = store.get(&self.collection) else {
            return Ok(Vec::new());
        };

        Ok(records
            .values()
            .filter(|doc| {
                doc.as_document()
                    .and_then(|doc| doc.get(ID_FIELD))
                    .is_some_and(|id| keys.contains(&Value::from(id.clone()).identity_key()))
            })
            .cloned()
            .map(Value::from)
            .collect())
    }

    async fn save(&self, document: Value) -> PoroResult<()> {
        let key = document
            .as_map()
            .and_then(|doc| doc.get_str(ID_FIELD))
            .map(Value::identity_key)
            .ok_or_else(|| PoroError::Backend(format!("document for {} has no {}", self.collection, ID_FIELD)))?;

        let bson = Bson::try_from(document)?;

        debug!(collection = %self.collection, key = %key, "storing document");
        self.store
            .write()
            .await
            .entry(self.collection.clone())
            .or_default()
            .insert(key, bson);

        Ok(())
    }

    async fn remove(&self, id: &Value) -> PoroResult<()> {
        let mut store = self.store.write().await;

        if let Some(records) = store.get_mut(&self.collection) {
            records.shift_remove(&id.identity_key());
        }

        Ok(())
    }

    async fn find(&self, options: FindOptions) -> PoroResult<Vec<Value>> {
        let options = options
            .try_map(Bson::try_from)
            .map_err(|e| PoroError::InvalidQuery(e.to_string()))?;

        let records = self.snapshot().await;

        Ok(self
            .engine
            .execute(records, &options)
            .into_iter()
            .map(Value::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;
    use poro_core::{sort::Direction, value::Map};

    fn document(id: impl Into<Value>, name: &str, age: i64) -> Value {
        let mut doc = Map::new();
        doc.insert(ID_FIELD, id);
        doc.insert("name", name);
        doc.insert("age", age);
        Value::Map(doc)
    }

    #[tokio::test]
    async fn collections_share_one_database() {
        let store = MemoryDocumentStore::new("app");
        let people = store.collection("people");
        let pets = store.collection("pets");

        people.save(document(1, "Alice", 30)).await.unwrap();

        assert_eq!(people.database_name(), pets.database_name());
        assert_eq!(store.collection_names().await, vec!["people".to_string()]);
        assert!(pets.find_one(&Value::Int(1)).await.unwrap().is_none());
        assert!(store.clone().collection("people").find_one(&Value::Int(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn save_upserts_by_id() {
        let people = MemoryDocumentStore::new("app").collection("people");
        let id = ObjectId::new();

        people.save(document(id, "Alice", 30)).await.unwrap();
        people.save(document(id, "Alicia", 31)).await.unwrap();

        assert_eq!(people.len().await, 1);
        let found = people.find_one(&Value::ObjectId(id)).await.unwrap().unwrap();
        assert_eq!(found.as_map().and_then(|d| d.get_str("name")), Some(&Value::from("Alicia")));
    }

    #[tokio::test]
    async fn documents_without_id_are_rejected() {
        let people = MemoryDocumentStore::new("app").collection("people");
        let mut doc = Map::new();
        doc.insert("name", "Alice");

        assert!(matches!(
            people.save(Value::Map(doc)).await,
            Err(PoroError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn find_many_skips_missing_and_remove_is_idempotent() {
        let people = MemoryDocumentStore::new("app").collection("people");
        people.save(document(1, "Alice", 30)).await.unwrap();
        people.save(document(2, "Bob", 25)).await.unwrap();

        let found = people
            .find_many(&[Value::Int(2), Value::Int(9), Value::Int(1)])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);

        people.remove(&Value::Int(1)).await.unwrap();
        people.remove(&Value::Int(1)).await.unwrap();
        assert_eq!(people.len().await, 1);
    }

    #[tokio::test]
    async fn find_filters_sorts_and_pages() {
        let people = MemoryDocumentStore::new("app").collection("people");
        people.save(document(1, "Alice", 30)).await.unwrap();
        people.save(document(2, "Bob", 25)).await.unwrap();
        people.save(document(3, "Carol", 30)).await.unwrap();

        let options = FindOptions::builder()
            .filter("age", 30)
            .sort("name", Direction::Desc)
            .build();
        let names: Vec<Value> = people
            .find(options)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|d| d.as_map().and_then(|d| d.get_str("name")).cloned())
            .collect();
        assert_eq!(names, vec![Value::from("Carol"), Value::from("Alice")]);

        let paged = FindOptions::builder()
            .sort("age", Direction::Asc)
            .limit(1)
            .offset(1)
            .build();
        let found = people.find(paged).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].as_map().and_then(|d| d.get_str(ID_FIELD)), Some(&Value::Int(1)));
    }

    #[tokio::test]
    async fn unstorable_condition_values_are_invalid_queries() {
        let people = MemoryDocumentStore::new("app").collection("people");
        let options = FindOptions::builder()
            .filter("kind", Value::Type("Person".into()))
            .build();

        assert!(matches!(
            people.find(options).await,
            Err(PoroError::InvalidQuery(_))
        ));
    }

    #[tokio::test]
    async fn resaving_keeps_position_and_removal_moves_to_end() {
        let people = MemoryDocumentStore::new("app").collection("people");
        people.save(document(1, "Alice", 30)).await.unwrap();
        people.save(document(2, "Bob", 25)).await.unwrap();
        people.save(document(3, "Carol", 35)).await.unwrap();

        people.save(document(1, "Alicia", 31)).await.unwrap();
        people.remove(&Value::Int(2)).await.unwrap();
        people.save(document(2, "Bobby", 26)).await.unwrap();

        let ids: Vec<Value> = people
            .find(FindOptions::default())
            .await
            .unwrap()
            .into_iter()
            .filter_map(|d| d.as_map().and_then(|d| d.get_str(ID_FIELD)).cloned())
            .collect();
        assert_eq!(ids, vec![Value::Int(1), Value::Int(3), Value::Int(2)]);
    }

    #[tokio::test]
    async fn null_ordering_applies_to_find() {
        let mut unnamed = Map::new();
        unnamed.insert(ID_FIELD, 9);
        unnamed.insert("name", Value::Null);

        for (nulls, expected) in [
            (NullOrdering::First, vec![Value::Int(9), Value::Int(1), Value::Int(2)]),
            (NullOrdering::Last, vec![Value::Int(1), Value::Int(2), Value::Int(9)]),
        ] {
            let store = MemoryDocumentStore::builder().nulls(nulls).build();
            let people = store.collection("people");
            people.save(Value::Map(unnamed.clone())).await.unwrap();
            people.save(document(2, "Bob", 25)).await.unwrap();
            people.save(document(1, "Alice", 30)).await.unwrap();

            let options = FindOptions::builder().sort("name", Direction::Asc).build();
            let ids: Vec<Value> = people
                .find(options)
                .await
                .unwrap()
                .into_iter()
                .filter_map(|d| d.as_map().and_then(|d| d.get_str(ID_FIELD)).cloned())
                .collect();
            assert_eq!(ids, expected, "{nulls:?}");
        }
    }
}
