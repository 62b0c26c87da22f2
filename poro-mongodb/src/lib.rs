//! MongoDB document database for poro.
//!
//! This crate provides a MongoDB implementation of the
//! [`DocumentDatabase`](poro_core::backend::DocumentDatabase) and
//! [`DocumentBackend`](poro_core::backend::DocumentBackend) traits, so that
//! objects persisted through a
//! [`DocumentContext`](poro_core::store::DocumentContext) land in MongoDB.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! poro = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! Conditions, sort keys, limit and offset are pushed down to the server.
//! Keys containing `.`, `$` or null bytes are escaped on the way in and
//! restored on the way out.
//!
//! # Example
//!
//! ```ignore
//! use poro::{mongodb::MongoDbStore, store::DocumentFactory, registry::ContextRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!     let registry = ContextRegistry::new(DocumentFactory::builder().database(store).build()?);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as poro_mongodb;

pub mod store;
pub(crate) mod query;
pub(crate) mod sanitizer;

pub use store::{MongoCollection, MongoDbStore, MongoDbStoreBuilder};
