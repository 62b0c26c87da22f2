//! Translation of find options into MongoDB query documents.

use std::collections::HashSet;
use bson::{Bson, Document, doc};

use poro_core::{
    filter::Condition,
    keypath::Keypath,
    sort::{Direction, SortKey},
};

use crate::sanitizer::ValueSanitizer;

/// Builds MongoDB filter and sort documents from conditions and sort keys.
///
/// Keypaths become dotted field paths with each segment escaped the way
/// stored keys are. A condition on null only matches an explicit null, never
/// a missing field. Conditions repeating a keypath are combined with `$and`
/// so that each of them still has to hold.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    pub(crate) fn field(keypath: &Keypath) -> String {
        keypath
            .segments()
            .iter()
            .map(|segment| ValueSanitizer::sanitize_key(segment))
            .collect::<Vec<_>>()
            .join(".")
    }

    pub(crate) fn filter(conditions: &[Condition<Bson>]) -> Document {
        let clauses: Vec<(String, Bson)> = conditions
            .iter()
            .map(|condition| {
                let value = match &condition.value {
                    Bson::Null => Bson::Document(doc! { "$type": "null" }),
                    Bson::Document(_) => {
                        Bson::Document(doc! { "$eq": ValueSanitizer::sanitize_value(&condition.value) })
                    }
                    value => ValueSanitizer::sanitize_value(value),
                };
                (Self::field(&condition.keypath), value)
            })
            .collect();

        let repeated = {
            let mut fields = HashSet::new();
            !clauses.iter().all(|(field, _)| fields.insert(field.as_str()))
        };
        if !repeated {
            return clauses.into_iter().collect();
        }

        let all: Vec<Bson> = clauses
            .into_iter()
            .map(|(field, value)| {
                let mut clause = Document::new();
                clause.insert(field, value);
                Bson::Document(clause)
            })
            .collect();
        doc! { "$and": all }
    }

    pub(crate) fn sort(order: &[SortKey]) -> Option<Document> {
        if order.is_empty() {
            return None;
        }

        Some(
            order
                .iter()
                .map(|key| {
                    let direction = match key.direction {
                        Direction::Asc => 1,
                        Direction::Desc => -1,
                    };
                    (Self::field(&key.keypath), Bson::Int32(direction))
                })
                .collect(),
        )
    }
}
