//! Persistence for plain Rust objects over pluggable stores.
//!
//! This crate is the primary entry point of the poro project. It re-exports
//! the core types from the sub-crates and gives access to the available
//! stores.
//!
//! # Features
//!
//! - **Plain objects** - Derive [`Entity`] on an ordinary struct to make it persistable
//! - **Multiple stores** - An in-memory hash, an in-memory document database and MongoDB
//! - **Object graphs** - Nested objects of other managed classes are saved and
//!   resolved through their own contexts
//! - **Simple querying** - Equality conditions on dotted keypaths, multi-key
//!   ordering and limit/offset paging
//! - **Hooks** - Callbacks around saving, removing and fetching
//!
//! # Quick Start
//!
//! ```ignore
//! use poro::{prelude::*, memory::HashFactory};
//!
//! #[derive(Debug, Clone, Default, Entity)]
//! pub struct Person {
//!     pub id: Value,
//!     pub first_name: String,
//!     pub last_name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> PoroResult<()> {
//!     let registry = ContextRegistry::new(HashFactory::new());
//!     registry.manage::<Person>();
//!
//!     let people = registry.typed::<Person>()?;
//!
//!     let mut george = Person {
//!         first_name: "George".into(),
//!         last_name: "Smith".into(),
//!         ..Default::default()
//!     };
//!     people.save(&mut george).await?;
//!
//!     let smiths = people
//!         .find_all(FindOptions::builder().filter("last_name", "Smith").build())
//!         .await?;
//!     println!("Found: {:?}", smiths);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Document Stores
//!
//! A [`DocumentFactory`](store::DocumentFactory) over a document database
//! stores each managed class in its own collection:
//!
//! ```ignore
//! use poro::{prelude::*, memory::MemoryDocumentStore};
//!
//! let factory = DocumentFactory::builder()
//!     .database(MemoryDocumentStore::new("app"))
//!     .configure(|context| context.blacklist(["password"]))
//!     .build()?;
//! let registry = ContextRegistry::new(factory);
//! registry.manage::<Person>().manage::<Address>();
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory stores for development and testing
//! - `mongodb` - Persistent MongoDB backend (requires `mongodb` feature)

#[allow(unused_extern_crates)]
extern crate self as poro;

pub mod prelude;

pub use poro_core::{
    backend, codec, context, engine, entity, error, filter, hooks, keypath, page, query, registry, sort, store,
    value,
};

pub use poro_macros::Entity;

pub use async_trait::async_trait;

// Re-export BSON types for convenience
pub use bson;

/// In-memory store implementations.
pub mod memory {
    pub use poro_memory::{
        HashContext, HashContextBuilder, HashFactory, MemoryCollection, MemoryDocumentStore,
        MemoryDocumentStoreBuilder,
    };
}

/// MongoDB store implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use poro_mongodb::{MongoCollection, MongoDbStore, MongoDbStoreBuilder};
}
