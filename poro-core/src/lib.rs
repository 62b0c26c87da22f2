//! Persistence for plain Rust objects over pluggable stores.
//!
//! This crate is the core of the poro project and provides:
//!
//! - **Value model** ([`value`]) - Runtime-typed values and attribute bags ([`value::Object`])
//! - **Entities** ([`entity`]) - Typed structs convertible to and from attribute bags
//! - **Keypaths** ([`keypath`]) - Dotted path resolution over heterogeneous records
//! - **Querying** ([`filter`], [`sort`], [`page`], [`query`], [`engine`]) - Equality filters,
//!   multi-key sorting and limit/offset paging, planned around primary key lookups
//! - **Contexts** ([`context`]) - The per-class persistence interface
//! - **Registry** ([`registry`]) - The class catalog and per-class context cache
//! - **Document stores** ([`backend`], [`codec`], [`store`]) - Object graph encoding and a
//!   context over any document database
//! - **Hooks** ([`hooks`]) - Lifecycle callbacks and transforms
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use poro::prelude::*;
//!
//! #[derive(Debug, Clone, Default, Entity)]
//! pub struct Person {
//!     pub id: Value,
//!     pub first_name: String,
//!     pub last_name: String,
//! }
//!
//! let people = registry.typed::<Person>()?;
//! let smiths = people
//!     .find_all(
//!         FindOptions::builder()
//!             .filter("last_name", "Smith")
//!             .sort("first_name", Direction::Asc)
//!             .build(),
//!     )
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as poro_core;

pub mod backend;
pub mod codec;
pub mod context;
pub mod engine;
pub mod entity;
pub mod error;
pub mod filter;
pub mod hooks;
pub mod keypath;
pub mod page;
pub mod query;
pub mod registry;
pub mod sort;
pub mod store;
pub mod value;
