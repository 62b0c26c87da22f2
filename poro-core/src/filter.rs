//! Conjunctive equality filtering.

use crate::{
    keypath::{Keypath, Lookup, Record, resolve},
    value::Value,
};

/// Keeps records whose value at `keypath` equals `value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition<V = Value> {
    pub keypath: Keypath,
    pub value: V,
}

impl<V> Condition<V> {
    pub fn new(keypath: impl Into<Keypath>, value: impl Into<V>) -> Self {
        Self {
            keypath: keypath.into(),
            value: value.into(),
        }
    }

    /// A record satisfies the condition only when the keypath is found and
    /// the found value matches. A missing keypath never matches, not even a
    /// null expectation.
    pub fn accepts(&self, record: &V) -> bool
    where
        V: Record,
    {
        match resolve(record, &self.keypath) {
            Lookup::Found(found) => found.matches(&self.value),
            Lookup::Missing => false,
        }
    }
}

/// Narrows `records` by every condition in turn, preserving order.
pub fn filter<R: Record>(mut records: Vec<R>, conditions: &[Condition<R>]) -> Vec<R> {
    for condition in conditions {
        records.retain(|record| condition.accepts(record));
    }
    records
}
