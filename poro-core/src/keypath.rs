//! Dotted keypath resolution over heterogeneous records.
//!
//! A [`Keypath`] such as `friends.0.id` is resolved segment by segment
//! against whatever shape the record has at each step: list indices, map
//! keys, or object fields. Resolution never fails; it reports
//! [`Lookup::Missing`] instead, which is distinct from finding a null.

use std::{cmp::Ordering, fmt, str::FromStr};
use bson::Bson;

use crate::value::{Key, Value};

/// An ordered list of path segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Keypath(Vec<String>);

impl Keypath {
    /// Parses a dotted path. The empty string is the empty path.
    pub fn parse(path: &str) -> Self {
        if path.is_empty() {
            return Self::default();
        }
        Self(path.split('.').map(str::to_string).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this path names exactly the top-level field `name`.
    pub fn is_field(&self, name: &str) -> bool {
        self.0.len() == 1 && self.0[0] == name
    }
}

impl FromStr for Keypath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for Keypath {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<String> for Keypath {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl fmt::Display for Keypath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// The outcome of resolving a keypath.
#[derive(Debug, PartialEq)]
pub enum Lookup<'a, R> {
    Found(&'a R),
    Missing,
}

impl<'a, R> Lookup<'a, R> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn value(&self) -> Option<&'a R> {
        match *self {
            Lookup::Found(value) => Some(value),
            Lookup::Missing => None,
        }
    }
}

// Manual impls: a derive would require `R: Clone`.
impl<R> Clone for Lookup<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for Lookup<'_, R> {}

/// A value the query subsystem can traverse, compare and match.
pub trait Record {
    /// Descends one segment.
    fn child(&self, segment: &str) -> Lookup<'_, Self>
    where
        Self: Sized;

    fn is_null(&self) -> bool;

    /// Orders two records, or `None` when they are not comparable.
    fn compare(&self, other: &Self) -> Option<Ordering>;

    /// Structural equality as used by filters.
    fn matches(&self, other: &Self) -> bool;
}

/// Resolves `keypath` against `record`.
pub fn resolve<'a, R: Record>(record: &'a R, keypath: &Keypath) -> Lookup<'a, R> {
    let mut current = record;

    for segment in keypath.segments() {
        match current.child(segment) {
            Lookup::Found(next) => current = next,
            Lookup::Missing => return Lookup::Missing,
        }
    }

    Lookup::Found(current)
}

fn list_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();

    match chars.next() {
        Some(first) if first == '_' || first.is_ascii_alphabetic() => {
            chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        }
        _ => false,
    }
}

impl Record for Value {
    fn child(&self, segment: &str) -> Lookup<'_, Self> {
        let found = match self {
            Value::List(list) => list_index(segment).and_then(|i| list.get(i)),
            Value::Map(map) => map
                .get(&Key::Str(segment.to_string()))
                .or_else(|| map.get(&Key::Sym(segment.to_string())))
                .or_else(|| {
                    segment
                        .parse::<i64>()
                        .ok()
                        .and_then(|i| map.get(&Key::Int(i)))
                }),
            Value::Object(object) if is_identifier(segment) => object.get(segment),
            _ => None,
        };

        found.map_or(Lookup::Missing, Lookup::Found)
    }

    fn is_null(&self) -> bool {
        Value::is_null(self)
    }

    fn compare(&self, other: &Self) -> Option<Ordering> {
        Value::compare(self, other)
    }

    fn matches(&self, other: &Self) -> bool {
        self == other
    }
}

fn bson_number(bson: &Bson) -> Option<f64> {
    match bson {
        Bson::Int32(i) => Some(*i as f64),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

impl Record for Bson {
    fn child(&self, segment: &str) -> Lookup<'_, Self> {
        let found = match self {
            Bson::Array(arr) => list_index(segment).and_then(|i| arr.get(i)),
            Bson::Document(doc) => doc.get(segment),
            _ => None,
        };

        found.map_or(Lookup::Missing, Lookup::Found)
    }

    fn is_null(&self) -> bool {
        matches!(self, Bson::Null | Bson::Undefined)
    }

    fn compare(&self, other: &Self) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (bson_number(self), bson_number(other)) {
            return a.partial_cmp(&b);
        }

        match (self, other) {
            (Bson::String(a), Bson::String(b)) => Some(a.cmp(b)),
            (Bson::Boolean(a), Bson::Boolean(b)) => Some(a.cmp(b)),
            (Bson::DateTime(a), Bson::DateTime(b)) => {
                Some(a.timestamp_millis().cmp(&b.timestamp_millis()))
            }
            (Bson::ObjectId(a), Bson::ObjectId(b)) => Some(a.bytes().cmp(&b.bytes())),
            (Bson::Array(a), Bson::Array(b)) => {
                for (left, right) in a.iter().zip(b.iter()) {
                    match left.compare(right)? {
                        Ordering::Equal => continue,
                        decided => return Some(decided),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    fn matches(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (bson_number(self), bson_number(other)) {
            return a == b;
        }

        match (self, other) {
            (Bson::Array(a), Bson::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(l, r)| l.matches(r))
            }
            (Bson::Document(a), Bson::Document(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|o| v.matches(o)))
            }
            _ => self == other,
        }
    }
}
