//! Convenient re-exports of commonly used types from poro.
//!
//! ```ignore
//! use poro::prelude::*;
//! ```
//!
//! This provides access to:
//! - The `Entity` trait and derive, and the value model
//! - Contexts, the registry and the document factory
//! - Find options, selectors and sort directions
//! - Hooks and error types

pub use poro_core::{
    backend::{DocumentBackend, DocumentDatabase},
    context::{Context, TypedContext},
    entity::{ClassInfo, Entity, FromValue, ToValue},
    error::{PoroError, PoroResult},
    hooks::{Callbacks, HookEvent, HookTransform},
    page::Limit,
    query::{FindOptions, Found, Selector},
    registry::{ContextFactory, ContextRegistry, RegistryHandle},
    sort::{Direction, NullOrdering, SortKey},
    store::{DocumentContext, DocumentFactory},
    value::{DocumentRef, Map, Object, Value},
};

pub use poro_macros::Entity;
