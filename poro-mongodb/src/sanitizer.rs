//! Field name sanitization for MongoDB compatibility.
//!
//! MongoDB reserves dots and leading dollar signs in field names for its
//! query syntax, and field names cannot contain null bytes. Documents are
//! stored with those characters escaped in their keys; values are stored
//! untouched.

use bson::{Bson, Document};

/// Escapes and restores document keys.
///
/// The reference keys `$ref`, `$id` and `$db`, and the primary key `_id`,
/// pass through unchanged so that database references keep working.
pub(crate) struct ValueSanitizer;

impl ValueSanitizer {
    const REPLACEMENTS: [(&'static str, &'static str); 3] = [
        (".", "__dot__"),
        ("$", "__dollar__"),
        ("\0", "__null__"),
    ];

    const RESERVED: [&'static str; 4] = ["_id", "$ref", "$id", "$db"];

    /// Recursively escapes the keys of every document in `value`.
    pub(crate) fn sanitize_value(value: &Bson) -> Bson {
        match value {
            Bson::Array(arr) => Bson::Array(arr.iter().map(Self::sanitize_value).collect()),
            Bson::Document(doc) => Bson::Document(Self::sanitize_document(doc)),
            _ => value.clone(),
        }
    }

    pub(crate) fn sanitize_document(doc: &Document) -> Document {
        doc.iter()
            .map(|(k, v)| (Self::sanitize_key(k), Self::sanitize_value(v)))
            .collect()
    }

    pub(crate) fn sanitize_key(key: &str) -> String {
        if Self::RESERVED.contains(&key) {
            return key.to_string();
        }

        let mut sanitized = key.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter() {
            sanitized = sanitized.replace(*target, *replacement);
        }
        sanitized
    }

    /// Recursively restores the keys of every document in `value`.
    pub(crate) fn restore_value(value: &Bson) -> Bson {
        match value {
            Bson::Array(arr) => Bson::Array(arr.iter().map(Self::restore_value).collect()),
            Bson::Document(doc) => Bson::Document(Self::restore_document(doc)),
            _ => value.clone(),
        }
    }

    pub(crate) fn restore_document(doc: &Document) -> Document {
        doc.iter()
            .map(|(k, v)| (Self::restore_key(k), Self::restore_value(v)))
            .collect()
    }

    pub(crate) fn restore_key(key: &str) -> String {
        let mut restored = key.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter().rev() {
            restored = restored.replace(*replacement, *target);
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn keys_are_escaped_and_values_kept() {
        let original = doc! {
            "_id": 1,
            "a.b": "x.y",
            "$price": [{ "c$d": 1 }],
            "friend": { "$ref": "people", "$id": 2 },
        };

        let sanitized = ValueSanitizer::sanitize_document(&original);
        let keys: Vec<&str> = sanitized.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["_id", "a__dot__b", "__dollar__price", "friend"]);
        assert_eq!(sanitized.get_str("a__dot__b").unwrap(), "x.y");
        assert_eq!(
            sanitized.get_document("friend").unwrap(),
            &doc! { "$ref": "people", "$id": 2 }
        );

        assert_eq!(ValueSanitizer::restore_document(&sanitized), original);
    }

    #[test]
    fn null_bytes_are_escaped() {
        assert_eq!(ValueSanitizer::sanitize_key("a\0b"), "a__null__b");
        assert_eq!(ValueSanitizer::restore_key("a__null__b"), "a\0b");
    }
}
