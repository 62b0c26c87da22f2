//! The runtime value model shared by every store.
//!
//! Plain objects are persisted as [`Value`]s: primitives, ordered lists,
//! ordered maps with string, symbol-like or integer keys, attribute bags
//! ([`Object`]), type references and store reference tokens. The hash store
//! keeps them as they are; document stores convert them to and from BSON.

use std::{cmp::Ordering, fmt};
use bson::{Bson, Document, oid::ObjectId};
use indexmap::IndexMap;

use crate::{
    entity::ClassInfo,
    error::{PoroError, PoroResult},
};

/// A map key. Symbol-like keys are distinct from string keys with the same
/// text, and both are distinct from integer keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Str(String),
    Sym(String),
    Int(i64),
}

impl Key {
    pub fn sym(name: impl Into<String>) -> Self {
        Key::Sym(name.into())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) | Key::Sym(s) => f.write_str(s),
            Key::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(value)
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

/// An insertion-ordered map.
///
/// Re-inserting an existing key replaces its value in place, so iteration
/// order always reflects first insertion. Removing a key shifts the entries
/// after it.
#[derive(Debug, Clone, Default)]
pub struct Map {
    entries: IndexMap<Key, Value>,
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Looks up a string key.
    pub fn get_str(&self, key: &str) -> Option<&Value> {
        self.entries.get(&Key::Str(key.to_string()))
    }

    pub fn get_mut(&mut self, key: &Key) -> Option<&mut Value> {
        self.entries.get_mut(key)
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts a value, returning the one it replaced.
    pub fn insert(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &Key) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Key, &mut Value)> {
        self.entries.iter_mut()
    }
}

impl FromIterator<(Key, Value)> for Map {
    fn from_iter<T: IntoIterator<Item = (Key, Value)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Map {
    type Item = (Key, Value);
    type IntoIter = indexmap::map::IntoIter<Key, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl PartialEq for Map {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|o| o == v))
    }
}

/// An attribute bag: a class name plus named fields.
///
/// Objects are what plain entities look like to the stores. The declared
/// field list is fixed by the class; [`Object::allocate`] produces an
/// instance with every declared field present and null, without running any
/// constructor.
#[derive(Debug, Clone)]
pub struct Object {
    class: String,
    fields: IndexMap<String, Value>,
}

impl Object {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            fields: IndexMap::new(),
        }
    }

    /// Allocates a raw instance of `info`'s class with all declared fields null.
    pub fn allocate(info: &ClassInfo) -> Self {
        Self {
            class: info.name.clone(),
            fields: info
                .fields
                .iter()
                .map(|name| (name.clone(), Value::Null))
                .collect(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields.get_mut(name)
    }

    /// Sets a field, declaring it if the object does not have it yet.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn into_fields(self) -> Vec<(String, Value)> {
        self.fields.into_iter().collect()
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class
            && self.fields.len() == other.fields.len()
            && self
                .fields()
                .all(|(n, v)| other.get(n).is_some_and(|o| o == v))
    }
}

/// A store-native reference to a document in another collection of the same
/// database.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRef {
    pub collection: String,
    pub id: Box<Value>,
}

impl DocumentRef {
    pub fn new(collection: impl Into<String>, id: impl Into<Value>) -> Self {
        Self {
            collection: collection.into(),
            id: Box::new(id.into()),
        }
    }
}

/// A dynamically typed value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(bson::DateTime),
    ObjectId(ObjectId),
    /// A reference token pointing at a document of another collection.
    Ref(DocumentRef),
    /// A reference to a class by name.
    Type(String),
    List(Vec<Value>),
    Map(Map),
    Object(Object),
    /// A store-native value the model has no dedicated variant for.
    Raw(Bson),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// A short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::ObjectId(_) => "object id",
            Value::Ref(_) => "reference",
            Value::Type(_) => "type",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
            Value::Raw(_) => "raw",
        }
    }

    /// A string identifying this value as a primary key.
    ///
    /// Integers and integral floats share an identity, mirroring numeric
    /// equality.
    pub fn identity_key(&self) -> String {
        match self {
            Value::Null => "n".to_string(),
            Value::Bool(b) => format!("b:{b}"),
            Value::Int(i) => format!("i:{i}"),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => format!("i:{}", *f as i64),
            Value::Float(f) => format!("f:{f}"),
            Value::String(s) => format!("s:{s}"),
            Value::ObjectId(oid) => format!("o:{}", oid.to_hex()),
            other => format!("x:{other:?}"),
        }
    }

    /// Orders two values of compatible kinds.
    ///
    /// Numbers compare across integer and float; strings, booleans,
    /// timestamps and object ids compare within their kind; lists compare
    /// lexicographically. Everything else is not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => {
                Some(a.timestamp_millis().cmp(&b.timestamp_millis()))
            }
            (Value::ObjectId(a), Value::ObjectId(b)) => Some(a.bytes().cmp(&b.bytes())),
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::List(a), Value::List(b)) => {
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
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::ObjectId(a), Value::ObjectId(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Raw(a), Value::Raw(b)) => a == b,
            _ => false,
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value.into())
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i32 => Int,
    i64 => Int,
    u32 => Int,
    f64 => Float,
    &str => String,
    String => String,
    bson::DateTime => DateTime,
    ObjectId => ObjectId,
    DocumentRef => Ref,
    Vec<Value> => List,
    Map => Map,
    Object => Object,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<Bson> for Value {
    fn from(bson: Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Value::Null,
            Bson::Boolean(b) => Value::Bool(b),
            Bson::Int32(i) => Value::Int(i as i64),
            Bson::Int64(i) => Value::Int(i),
            Bson::Double(f) => Value::Float(f),
            Bson::String(s) => Value::String(s),
            Bson::DateTime(dt) => Value::DateTime(dt),
            Bson::ObjectId(oid) => Value::ObjectId(oid),
            Bson::Array(arr) => Value::List(arr.into_iter().map(Value::from).collect()),
            Bson::Document(doc) => match reference_parts(&doc) {
                Some((collection, id)) => Value::Ref(DocumentRef::new(collection, Value::from(id.clone()))),
                None => Value::Map(
                    doc.into_iter()
                        .map(|(k, v)| (Key::Str(k), Value::from(v)))
                        .collect(),
                ),
            },
            other => Value::Raw(other),
        }
    }
}

/// Recognizes the `{ "$ref": collection, "$id": id }` reference shape.
fn reference_parts(doc: &Document) -> Option<(&str, &Bson)> {
    if doc.len() < 2 {
        return None;
    }

    match (doc.get("$ref"), doc.get("$id")) {
        (Some(Bson::String(collection)), Some(id)) => Some((collection.as_str(), id)),
        _ => None,
    }
}

impl TryFrom<Value> for Bson {
    type Error = PoroError;

    /// Converts a storable value to BSON.
    ///
    /// Map keys are written as strings whatever their kind. Objects and type
    /// references must have been encoded by a codec first and are rejected.
    fn try_from(value: Value) -> PoroResult<Self> {
        Ok(match value {
            Value::Null => Bson::Null,
            Value::Bool(b) => Bson::Boolean(b),
            Value::Int(i) => Bson::Int64(i),
            Value::Float(f) => Bson::Double(f),
            Value::String(s) => Bson::String(s),
            Value::DateTime(dt) => Bson::DateTime(dt),
            Value::ObjectId(oid) => Bson::ObjectId(oid),
            Value::Ref(reference) => {
                let mut doc = Document::new();
                doc.insert("$ref", reference.collection);
                doc.insert("$id", Bson::try_from(*reference.id)?);
                Bson::Document(doc)
            }
            Value::List(list) => Bson::Array(
                list.into_iter()
                    .map(Bson::try_from)
                    .collect::<PoroResult<Vec<_>>>()?,
            ),
            Value::Map(map) => {
                let mut doc = Document::new();
                for (key, value) in map {
                    doc.insert(key.to_string(), Bson::try_from(value)?);
                }
                Bson::Document(doc)
            }
            Value::Raw(bson) => bson,
            Value::Type(name) => {
                return Err(PoroError::Serialization(format!(
                    "type reference {name} must be encoded before it can be stored"
                )));
            }
            Value::Object(object) => {
                return Err(PoroError::Serialization(format!(
                    "object of class {} must be encoded before it can be stored",
                    object.class()
                )));
            }
        })
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => Value::List(arr.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(obj) => Value::Map(
                obj.into_iter()
                    .map(|(k, v)| (Key::Str(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn numbers_compare_across_int_and_float() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_eq!(Value::Int(1).compare(&Value::Float(1.5)), Some(Ordering::Less));
        assert_eq!(Value::Int(1).identity_key(), Value::Float(1.0).identity_key());
    }

    #[test]
    fn mismatched_kinds_are_not_comparable() {
        assert_eq!(Value::from("a").compare(&Value::Int(1)), None);
        assert_ne!(Value::from("1"), Value::Int(1));
    }

    #[test]
    fn map_equality_ignores_order_but_not_key_kind() {
        let mut a = Map::new();
        a.insert("x", 1);
        a.insert("y", 2);
        let mut b = Map::new();
        b.insert("y", 2);
        b.insert("x", 1);
        assert_eq!(a, b);

        let mut c = Map::new();
        c.insert(Key::sym("x"), 1);
        c.insert("y", 2);
        assert_ne!(a, c);
    }

    #[test]
    fn map_reinsert_keeps_position() {
        let mut map = Map::new();
        map.insert("a", 1);
        map.insert("b", 2);
        assert_eq!(map.insert("a", 3), Some(Value::Int(1)));

        let keys: Vec<String> = map.keys().map(ToString::to_string).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(map.get_str("a"), Some(&Value::Int(3)));

        map.insert("c", 4);
        assert_eq!(map.remove(&Key::from("a")), Some(Value::Int(3)));
        map.insert("a", 5);
        let keys: Vec<String> = map.keys().map(ToString::to_string).collect();
        assert_eq!(keys, vec!["b", "c", "a"]);
    }

    #[test]
    fn reference_documents_become_ref_tokens() {
        let oid = ObjectId::new();
        let value = Value::from(Bson::Document(doc! { "$ref": "people", "$id": oid }));
        assert_eq!(value, Value::Ref(DocumentRef::new("people", oid)));

        let back = Bson::try_from(value).unwrap();
        assert_eq!(back, Bson::Document(doc! { "$ref": "people", "$id": oid }));
    }

    #[test]
    fn objects_cannot_be_stored_unencoded() {
        let object = Object::new("Person").with("name", "George");
        assert!(matches!(
            Bson::try_from(Value::Object(object)),
            Err(PoroError::Serialization(_))
        ));
        assert!(Bson::try_from(Value::Type("Person".into())).is_err());
    }

    #[test]
    fn json_values_keep_insertion_order() {
        let json: serde_json::Value = serde_json::from_str(r#"{"b": 1, "a": [true, 2.5]}"#).unwrap();
        let Value::Map(map) = Value::from(json) else {
            panic!("expected a map");
        };
        let keys: Vec<String> = map.keys().map(ToString::to_string).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(
            map.get_str("a"),
            Some(&Value::List(vec![Value::Bool(true), Value::Float(2.5)]))
        );
    }
}
