//! Find options, their normalization, and result selectors.
//!
//! Every find runs on a normalized [`FindOptions`]: an ordered list of
//! equality conditions, an ordered list of sort keys and a limit window.
//! Options are built either in code:
//!
//! ```ignore
//! use poro::query::FindOptions;
//! use poro::sort::Direction;
//!
//! let options = FindOptions::builder()
//!     .filter("last_name", "Smith")
//!     .sort("first_name", Direction::Asc)
//!     .limit(10)
//!     .build();
//! ```
//!
//! or deserialized from loosely shaped JSON with [`FindOptions::from_json`],
//! where `limit` may be a count, a `[limit, offset]` pair or a partial map,
//! and `order` may be a key, a list of keys or pairs, or a key to direction
//! map.

use serde::Deserialize;

use crate::{
    error::{PoroError, PoroResult},
    filter::Condition,
    keypath::Keypath,
    page::Limit,
    sort::{Direction, SortKey},
    value::Value,
};

/// Normalized find options over values of type `V`.
#[derive(Debug, Clone, PartialEq)]
pub struct FindOptions<V = Value> {
    pub conditions: Vec<Condition<V>>,
    pub order: Vec<SortKey>,
    pub limit: Limit,
}

impl<V> Default for FindOptions<V> {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            order: Vec::new(),
            limit: Limit::default(),
        }
    }
}

impl<V> FindOptions<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The expected value of the first condition on the top-level field `name`.
    pub fn condition(&self, name: &str) -> Option<&V> {
        self.conditions
            .iter()
            .find(|c| c.keypath.is_field(name))
            .map(|c| &c.value)
    }

    /// Narrows the window to a single record, keeping the offset.
    pub fn first(mut self) -> Self {
        self.limit = self.limit.single();
        self
    }

    /// Rewrites every keypath whose first segment is `from` to start with `to`.
    pub fn rename_field(mut self, from: &str, to: &str) -> Self {
        let rename = |keypath: &mut Keypath| {
            if keypath.segments().first().is_some_and(|s| s == from) {
                let mut segments = keypath.segments().to_vec();
                segments[0] = to.to_string();
                *keypath = Keypath::parse(&segments.join("."));
            }
        };

        self.conditions.iter_mut().for_each(|c| rename(&mut c.keypath));
        self.order.iter_mut().for_each(|k| rename(&mut k.keypath));
        self
    }

    /// Converts every condition value, failing on the first error.
    pub fn try_map<W, E, F>(self, mut f: F) -> Result<FindOptions<W>, E>
    where
        F: FnMut(V) -> Result<W, E>,
    {
        Ok(FindOptions {
            conditions: self
                .conditions
                .into_iter()
                .map(|c| Ok(Condition { keypath: c.keypath, value: f(c.value)? }))
                .collect::<Result<Vec<_>, E>>()?,
            order: self.order,
            limit: self.limit,
        })
    }
}

impl FindOptions<Value> {
    pub fn builder() -> FindOptionsBuilder {
        FindOptionsBuilder::new()
    }

    /// Normalizes loosely shaped JSON options.
    ///
    /// # Errors
    ///
    /// Returns [`PoroError::InvalidQuery`] when a section has an
    /// unrecognized shape.
    pub fn from_json(json: serde_json::Value) -> PoroResult<Self> {
        let raw: RawFindOptions = serde_json::from_value(json)
            .map_err(|e| PoroError::InvalidQuery(e.to_string()))?;

        Ok(raw.into())
    }

    pub fn from_json_str(json: &str) -> PoroResult<Self> {
        Self::from_json(serde_json::from_str(json)?)
    }
}

/// Fluent builder for [`FindOptions`].
#[derive(Debug, Default)]
pub struct FindOptionsBuilder {
    options: FindOptions,
}

impl FindOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality condition.
    pub fn filter(mut self, keypath: impl Into<Keypath>, value: impl Into<Value>) -> Self {
        self.options.conditions.push(Condition::new(keypath, value));
        self
    }

    /// Adds a sort key after the existing ones.
    pub fn sort(mut self, keypath: impl Into<Keypath>, direction: Direction) -> Self {
        self.options.order.push(SortKey::new(keypath, direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.options.limit.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.options.limit.offset = offset;
        self
    }

    pub fn build(self) -> FindOptions {
        self.options
    }
}

/// Find options as callers write them, before normalization.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawFindOptions {
    pub conditions: serde_json::Map<String, serde_json::Value>,
    pub order: Option<RawOrder>,
    pub limit: Option<RawLimit>,
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawOrder {
    Key(String),
    Keys(Vec<RawSortKey>),
    Map(serde_json::Map<String, serde_json::Value>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawSortKey {
    Key(String),
    Pair(String, Direction),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawLimit {
    Count(usize),
    Pair(Vec<Option<usize>>),
    Window(Limit),
}

impl From<RawLimit> for Limit {
    fn from(raw: RawLimit) -> Self {
        match raw {
            RawLimit::Count(limit) => Limit::new(Some(limit), 0),
            RawLimit::Pair(pair) => Limit::new(
                pair.first().copied().flatten(),
                pair.get(1).copied().flatten().unwrap_or(0),
            ),
            RawLimit::Window(window) => window,
        }
    }
}

impl From<RawOrder> for Vec<SortKey> {
    fn from(raw: RawOrder) -> Self {
        match raw {
            RawOrder::Key(key) => vec![SortKey::new(key, Direction::Asc)],
            RawOrder::Keys(keys) => keys
                .into_iter()
                .map(|key| match key {
                    RawSortKey::Key(key) => SortKey::new(key, Direction::Asc),
                    RawSortKey::Pair(key, direction) => SortKey::new(key, direction),
                })
                .collect(),
            RawOrder::Map(map) => map
                .into_iter()
                .map(|(key, direction)| {
                    let direction = serde_json::from_value(direction).unwrap_or_default();
                    SortKey::new(key, direction)
                })
                .collect(),
        }
    }
}

impl From<RawFindOptions> for FindOptions {
    fn from(raw: RawFindOptions) -> Self {
        let mut limit = raw.limit.map(Limit::from).unwrap_or_default();
        if let Some(offset) = raw.offset {
            limit.offset = offset;
        }

        Self {
            conditions: raw
                .conditions
                .into_iter()
                .map(|(keypath, value)| Condition::new(keypath, Value::from(value)))
                .collect(),
            order: raw.order.map(Vec::from).unwrap_or_default(),
            limit,
        }
    }
}

/// What a find should return.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// Every match.
    All,
    /// The first match.
    First,
    /// The record with this primary key.
    Id(Value),
    /// The records with these primary keys, in request order.
    Ids(Vec<Value>),
}

impl Selector {
    /// Parses `all`/`many` and `first`/`one`; any other string is taken as an id.
    pub fn parse(selector: &str) -> Self {
        match selector {
            "all" | "many" => Selector::All,
            "first" | "one" => Selector::First,
            id => Selector::Id(Value::from(id)),
        }
    }
}

impl From<&str> for Selector {
    fn from(value: &str) -> Self {
        Selector::parse(value)
    }
}

impl From<Value> for Selector {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Selector::parse(&s),
            Value::List(ids) => Selector::Ids(ids),
            id => Selector::Id(id),
        }
    }
}

/// The result of a find: many records or at most one.
#[derive(Debug, Clone, PartialEq)]
pub enum Found<T> {
    Many(Vec<T>),
    One(Option<T>),
}

impl<T> Found<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Found::Many(items) => items,
            Found::One(item) => item.into_iter().collect(),
        }
    }

    pub fn into_one(self) -> Option<T> {
        match self {
            Found::Many(items) => items.into_iter().next(),
            Found::One(item) => item,
        }
    }

    pub fn try_map<U, F>(self, f: F) -> PoroResult<Found<U>>
    where
        F: FnMut(T) -> PoroResult<U>,
    {
        Ok(match self {
            Found::Many(items) => Found::Many(items.into_iter().map(f).collect::<PoroResult<_>>()?),
            Found::One(item) => Found::One(item.map(f).transpose()?),
        })
    }
}
