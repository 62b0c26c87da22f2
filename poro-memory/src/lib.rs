//! In-memory stores for poro.
//!
//! This crate provides two in-memory ways of persisting objects:
//!
//! - [`HashContext`] - A per-class context that keeps objects (and everything
//!   nested in them) as-is, keyed by primary key
//! - [`MemoryDocumentStore`] - A document database keeping BSON documents per
//!   collection, for use with [`DocumentContext`](poro_core::store::DocumentContext)
//!
//! Both guard their data with async-aware read-write locks and answer queries
//! with the shared [`QueryEngine`](poro_core::engine::QueryEngine).
//!
//! # Quick Start
//!
//! ```ignore
//! use poro::prelude::*;
//! use poro::memory::HashFactory;
//!
//! let registry = ContextRegistry::new(HashFactory::new());
//! registry.manage::<Person>();
//!
//! let people = registry.typed::<Person>()?;
//! let mut george = Person { first_name: "George".into(), ..Default::default() };
//! people.save(&mut george).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as poro_memory;

pub mod hash;
pub mod store;

pub use hash::{HashContext, HashContextBuilder, HashFactory};
pub use store::{MemoryCollection, MemoryDocumentStore, MemoryDocumentStoreBuilder};
