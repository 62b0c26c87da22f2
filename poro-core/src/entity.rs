//! Typed entities and their conversion to and from [`Object`]s.
//!
//! Any plain struct can be persisted once it implements [`Entity`], usually
//! through `#[derive(Entity)]`. Entities never inherit from a base type; the
//! stores only ever see the attribute bag produced by [`Entity::extract`] and
//! hand back attribute bags that are written into a raw allocation with
//! [`Entity::inject`].
//!
//! # Example
//!
//! ```ignore
//! use poro::prelude::*;
//!
//! #[derive(Debug, Clone, Default, Entity)]
//! #[entity(collection = "people")]
//! pub struct Person {
//!     pub id: Value,
//!     pub first_name: String,
//!     pub last_name: String,
//!     pub friends: Vec<Person>,
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::{PoroError, PoroResult},
    value::{Key, Map, Object, Value},
};

/// Static description of a class: its name, declared fields, and optionally
/// the collection it persists to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: String,
    pub fields: Vec<String>,
    pub collection: Option<String>,
}

impl ClassInfo {
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            collection: None,
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }
}

/// A plain struct that can be persisted.
///
/// Implementations provide the raw allocation and set-field-by-name
/// capability the stores rely on. Derive it with `#[derive(Entity)]`.
pub trait Entity: Sized + Send + Sync + 'static {
    /// Describes the class. Field order is the persisted field order.
    fn class_info() -> ClassInfo;

    /// Allocates an instance without running any user constructor logic.
    fn allocate() -> Self;

    /// Copies the instance's fields into an attribute bag.
    fn extract(&self) -> Object;

    /// Sets a single field by name. Unknown names are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PoroError::InvalidValue`] when `value` cannot be converted
    /// to the field's type.
    fn inject(&mut self, name: &str, value: Value) -> PoroResult<()>;

    fn class_name() -> String {
        Self::class_info().name
    }

    /// Builds an instance from an attribute bag via [`Entity::allocate`] and
    /// [`Entity::inject`].
    fn from_object(object: Object) -> PoroResult<Self> {
        let mut entity = Self::allocate();
        entity.restore(object)?;
        Ok(entity)
    }

    /// Overwrites this instance's fields with those of `object`.
    fn restore(&mut self, object: Object) -> PoroResult<()> {
        for (name, value) in object.into_fields() {
            self.inject(&name, value)?;
        }
        Ok(())
    }
}

/// Conversion of a field value into the value model.
pub trait ToValue {
    fn to_value(&self) -> Value;
}

/// Conversion of a stored value back into a field value.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> PoroResult<Self>;
}

/// Converts a value for a struct field.
///
/// Null stands for a field that was never stored, so it becomes the field's
/// default when the type has no null of its own.
pub fn field_value<T: FromValue + Default>(value: Value) -> PoroResult<T> {
    match value {
        Value::Null => Ok(T::from_value(Value::Null).unwrap_or_default()),
        value => T::from_value(value),
    }
}

pub(crate) fn mismatch(expected: &str, found: &Value) -> PoroError {
    PoroError::InvalidValue(expected.to_string(), found.kind().to_string())
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> PoroResult<Self> {
        Ok(value)
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> PoroResult<Self> {
        value.as_bool().ok_or_else(|| mismatch("bool", &value))
    }
}

macro_rules! integer_value {
    ($($ty:ty),*) => {
        $(
            impl ToValue for $ty {
                fn to_value(&self) -> Value {
                    Value::Int(*self as i64)
                }
            }

            impl FromValue for $ty {
                fn from_value(value: Value) -> PoroResult<Self> {
                    let int = match &value {
                        Value::Int(i) => Some(*i),
                        Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
                        _ => None,
                    };

                    int.and_then(|i| <$ty>::try_from(i).ok())
                        .ok_or_else(|| mismatch(stringify!($ty), &value))
                }
            }
        )*
    };
}

integer_value!(i32, i64, u32);

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Float(*self)
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> PoroResult<Self> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            other => Err(mismatch("f64", &other)),
        }
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> PoroResult<Self> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl ToValue for ObjectId {
    fn to_value(&self) -> Value {
        Value::ObjectId(*self)
    }
}

impl FromValue for ObjectId {
    fn from_value(value: Value) -> PoroResult<Self> {
        match value {
            Value::ObjectId(oid) => Ok(oid),
            Value::String(s) => ObjectId::parse_str(&s).map_err(|_| mismatch("object id", &Value::String(s))),
            other => Err(mismatch("object id", &other)),
        }
    }
}

impl ToValue for bson::DateTime {
    fn to_value(&self) -> Value {
        Value::DateTime(*self)
    }
}

impl FromValue for bson::DateTime {
    fn from_value(value: Value) -> PoroResult<Self> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            other => Err(mismatch("datetime", &other)),
        }
    }
}

impl ToValue for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::DateTime(bson::DateTime::from_chrono(*self))
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> PoroResult<Self> {
        bson::DateTime::from_value(value).map(|dt| dt.to_chrono())
    }
}

impl ToValue for Uuid {
    fn to_value(&self) -> Value {
        Value::String(self.to_string())
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> PoroResult<Self> {
        match &value {
            Value::String(s) => Uuid::parse_str(s).map_err(|_| mismatch("uuid", &value)),
            _ => Err(mismatch("uuid", &value)),
        }
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, ToValue::to_value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> PoroResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: ToValue> ToValue for Box<T> {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

impl<T: FromValue> FromValue for Box<T> {
    fn from_value(value: Value) -> PoroResult<Self> {
        T::from_value(value).map(Box::new)
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    /// Null reads as an empty list.
    fn from_value(value: Value) -> PoroResult<Self> {
        match value {
            Value::List(list) => list.into_iter().map(T::from_value).collect(),
            Value::Null => Ok(Vec::new()),
            other => Err(mismatch("list", &other)),
        }
    }
}

impl ToValue for Map {
    fn to_value(&self) -> Value {
        Value::Map(self.clone())
    }
}

impl FromValue for Map {
    fn from_value(value: Value) -> PoroResult<Self> {
        match value {
            Value::Map(map) => Ok(map),
            Value::Null => Ok(Map::new()),
            other => Err(mismatch("map", &other)),
        }
    }
}

macro_rules! string_keyed_map {
    ($($map:ident),*) => {
        $(
            impl<T: ToValue> ToValue for $map<String, T> {
                fn to_value(&self) -> Value {
                    Value::Map(
                        self.iter()
                            .map(|(k, v)| (Key::Str(k.clone()), v.to_value()))
                            .collect(),
                    )
                }
            }

            impl<T: FromValue> FromValue for $map<String, T> {
                fn from_value(value: Value) -> PoroResult<Self> {
                    Map::from_value(value)?
                        .into_iter()
                        .map(|(k, v)| Ok((k.to_string(), T::from_value(v)?)))
                        .collect()
                }
            }
        )*
    };
}

string_keyed_map!(HashMap, BTreeMap);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_accept_integral_floats() {
        assert_eq!(i64::from_value(Value::Float(3.0)).unwrap(), 3);
        assert!(matches!(
            i64::from_value(Value::Float(3.5)),
            Err(PoroError::InvalidValue(_, _))
        ));
        assert!(u32::from_value(Value::Int(-1)).is_err());
    }

    #[test]
    fn null_reads_as_empty_collections_and_none() {
        assert_eq!(Vec::<String>::from_value(Value::Null).unwrap(), Vec::<String>::new());
        assert_eq!(Option::<String>::from_value(Value::Null).unwrap(), None);
        assert!(String::from_value(Value::Null).is_err());
    }

    #[test]
    fn timestamps_convert_through_bson() {
        let now = bson::DateTime::now().to_chrono();
        let back = DateTime::<Utc>::from_value(now.to_value()).unwrap();
        assert_eq!(back.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn string_keyed_maps_round_trip() {
        let mut scores = BTreeMap::new();
        scores.insert("a".to_string(), 1_i64);
        scores.insert("b".to_string(), 2_i64);
        assert_eq!(BTreeMap::<String, i64>::from_value(scores.to_value()).unwrap(), scores);
    }

    #[test]
    fn null_fields_fall_back_to_defaults() {
        assert_eq!(field_value::<String>(Value::Null).unwrap(), "");
        assert_eq!(field_value::<Option<i64>>(Value::Null).unwrap(), None);
        assert_eq!(field_value::<i64>(Value::Int(4)).unwrap(), 4);
        assert!(field_value::<bool>(Value::from("yes")).is_err());
    }
}
