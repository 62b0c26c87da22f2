//! MongoDB-backed document database.

use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Bson, Document, doc};
use mongodb::{
    Client, Collection,
    options::{ClientOptions, FindOptions as MongoFindOptions},
};
use tracing::debug;

use poro_core::{
    backend::{DocumentBackend, DocumentDatabase},
    codec::ID_FIELD,
    error::{PoroError, PoroResult},
    query::FindOptions,
    value::Value,
};

use crate::{query::MongoQueryTranslator, sanitizer::ValueSanitizer};

/// A MongoDB database handing out one [`MongoCollection`] per collection name.
#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: impl Into<String>) -> Self {
        Self {
            client,
            database: database.into(),
        }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn shutdown(self) -> PoroResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

impl DocumentDatabase for MongoDbStore {
    type Backend = MongoCollection;

    fn name(&self) -> &str {
        &self.database
    }

    fn collection(&self, name: &str) -> MongoCollection {
        MongoCollection {
            database: self.database.clone(),
            name: name.to_string(),
            inner: self
                .client
                .database(&self.database)
                .collection(&ValueSanitizer::sanitize_key(name)),
        }
    }
}

/// One MongoDB collection.
#[derive(Debug, Clone)]
pub struct MongoCollection {
    database: String,
    name: String,
    inner: Collection<Document>,
}

impl MongoCollection {
    fn prepare_document(document: Value) -> PoroResult<Document> {
        match Bson::try_from(document)? {
            Bson::Document(doc) if doc.contains_key(ID_FIELD) => Ok(ValueSanitizer::sanitize_document(&doc)),
            Bson::Document(_) => Err(PoroError::Backend(format!("document has no {ID_FIELD}"))),
            other => Err(PoroError::Serialization(format!("expected a document, found {:?}", other.element_type()))),
        }
    }

    fn restore_document(document: &Document) -> Value {
        Value::from(Bson::Document(ValueSanitizer::restore_document(document)))
    }

    fn id_of(id: &Value) -> PoroResult<Bson> {
        Bson::try_from(id.clone())
    }

    async fn query(&self, filter: Document, options: MongoFindOptions) -> PoroResult<Vec<Value>> {
        Ok(
            self.inner
                .find(filter)
                .with_options(options)
                .await
                .map_err(|e| PoroError::Backend(e.to_string()))?
                .try_collect::<Vec<Document>>()
                .await
                .map_err(|e| PoroError::Backend(e.to_string()))?
                .iter()
                .map(Self::restore_document)
                .collect()
        )
    }
}

#[async_trait]
impl DocumentBackend for MongoCollection {
    fn database_name(&self) -> &str {
        &self.database
    }

    fn collection_name(&self) -> &str {
        &self.name
    }

    async fn find_one(&self, id: &Value) -> PoroResult<Option<Value>> {
        Ok(
            self.inner
                .find_one(doc! { ID_FIELD: Self::id_of(id)? })
                .await
                .map_err(|e| PoroError::Backend(e.to_string()))?
                .as_ref()
                .map(Self::restore_document)
        )
    }

    async fn find_many(&self, ids: &[Value]) -> PoroResult<Vec<Value>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids = ids
            .iter()
            .map(Self::id_of)
            .collect::<PoroResult<Vec<Bson>>>()?;

        self.query(doc! { ID_FIELD: { "$in": ids } }, MongoFindOptions::default())
            .await
    }

    async fn save(&self, document: Value) -> PoroResult<()> {
        let document = Self::prepare_document(document)?;
        let id = document
            .get(ID_FIELD)
            .cloned()
            .unwrap_or(Bson::Null);

        debug!(collection = %self.name, id = %id, "replacing document");
        self.inner
            .replace_one(doc! { ID_FIELD: id }, document)
            .upsert(true)
            .await
            .map_err(|e| PoroError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn remove(&self, id: &Value) -> PoroResult<()> {
        self.inner
            .delete_one(doc! { ID_FIELD: Self::id_of(id)? })
            .await
            .map_err(|e| PoroError::Backend(e.to_string()))?;

        Ok(())
    }

    /// Filtering, sorting and paging run on the server, so null and missing
    /// sort values follow MongoDB's own ordering (before everything else
    /// when ascending) rather than a configurable `NullOrdering`.
    async fn find(&self, options: FindOptions) -> PoroResult<Vec<Value>> {
        let options = options
            .try_map(Bson::try_from)
            .map_err(|e| PoroError::InvalidQuery(e.to_string()))?;

        // MongoDB reads a zero limit as "no limit".
        if options.limit.limit == Some(0) {
            return Ok(Vec::new());
        }

        let mut find_options = MongoFindOptions::default();
        find_options.sort = MongoQueryTranslator::sort(&options.order);
        find_options.limit = options.limit.limit.map(|limit| limit as i64);
        if options.limit.offset > 0 {
            find_options.skip = Some(options.limit.offset as u64);
        }

        self.query(MongoQueryTranslator::filter(&options.conditions), find_options)
            .await
    }
}

/// Connects a [`MongoDbStore`] from a connection string.
#[derive(Debug)]
pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }

    pub async fn build(self) -> PoroResult<MongoDbStore> {
        Ok(MongoDbStore::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| PoroError::Configuration(e.to_string()))?,
            )
            .map_err(|e| PoroError::Configuration(e.to_string()))?,
            self.database,
        ))
    }
}
