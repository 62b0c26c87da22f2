//! Recursive conversion between object graphs and storable documents.
//!
//! Every value met while encoding is classified once into a [`ValueKind`]
//! and routed accordingly:
//!
//! - the root object of the codec's own class becomes a document tagged with
//!   `_class_name` and keyed by `_id`;
//! - maps and lists are encoded element by element;
//! - objects of other managed classes are saved through their own context
//!   first and stored as a reference token (same database) or as an
//!   `{ id, _class_name, managed: true }` pointer (anything else);
//! - type references become `{ _class_name: "Class", name }`;
//! - any other object becomes a `_class_name`-tagged map of its fields;
//! - primitives pass through.
//!
//! Decoding mirrors this. Object graphs must not contain cycles that are not
//! broken by managed references: encoding such a graph does not terminate.

use bson::oid::ObjectId;
use futures::{FutureExt, future::BoxFuture};
use tracing::{trace, warn};

use crate::{
    backend::DocumentBackend,
    context::identity_of,
    entity::ClassInfo,
    error::{PoroError, PoroResult},
    registry::{ContextRegistry, RegistryHandle},
    store::DocumentContext,
    value::{DocumentRef, Key, Map, Object, Value},
};

pub const CLASS_TAG: &str = "_class_name";
pub const ID_FIELD: &str = "_id";
pub const TYPE_CLASS: &str = "Class";

const POINTER_ID: &str = "id";
const POINTER_FLAG: &str = "managed";

/// How the codec treats a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Primitive,
    SelfManaged,
    ForeignManaged,
    Collection,
    TypeRef,
    Plain,
}

/// Encoder and decoder for the documents of one class.
#[derive(Debug, Clone)]
pub struct DocumentCodec {
    class: ClassInfo,
    primary_key: String,
    whitelist: Option<Vec<String>>,
    blacklist: Vec<String>,
    attempt_id_conversion: bool,
    registry: RegistryHandle,
}

impl DocumentCodec {
    pub fn new(class: ClassInfo, primary_key: impl Into<String>) -> Self {
        Self {
            class,
            primary_key: primary_key.into(),
            whitelist: None,
            blacklist: Vec::new(),
            attempt_id_conversion: true,
            registry: RegistryHandle::detached(),
        }
    }

    /// Persists only these fields.
    pub fn with_whitelist(mut self, fields: Option<Vec<String>>) -> Self {
        self.whitelist = fields;
        self
    }

    /// Never persists these fields.
    pub fn with_blacklist(mut self, fields: Vec<String>) -> Self {
        self.blacklist = fields;
        self
    }

    pub fn with_id_conversion(mut self, enabled: bool) -> Self {
        self.attempt_id_conversion = enabled;
        self
    }

    pub fn with_registry(mut self, registry: RegistryHandle) -> Self {
        self.registry = registry;
        self
    }

    pub fn class_info(&self) -> &ClassInfo {
        &self.class
    }

    pub fn class_name(&self) -> &str {
        &self.class.name
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// The fields of `object` that are written to its document: the
    /// whitelist, or else every field, minus the blacklist and the primary
    /// key.
    pub fn persisted_fields(&self, object: &Object) -> Vec<String> {
        let candidates: Vec<String> = match &self.whitelist {
            Some(whitelist) => whitelist.clone(),
            None => object.field_names().map(str::to_string).collect(),
        };

        candidates
            .into_iter()
            .filter(|name| *name != self.primary_key && !self.blacklist.contains(name))
            .collect()
    }

    /// Turns a 24 hex digit string into an object id when conversion is enabled.
    pub fn clean_id(&self, id: Value) -> Value {
        match id {
            Value::String(s) if self.attempt_id_conversion && is_object_id(&s) => {
                ObjectId::parse_str(&s).map_or(Value::String(s), Value::ObjectId)
            }
            other => other,
        }
    }

    pub fn classify(&self, value: &Value, embedded: bool) -> ValueKind {
        match value {
            Value::Object(object) if !embedded && object.class() == self.class.name => ValueKind::SelfManaged,
            Value::Object(object) => {
                let managed = self
                    .registry
                    .get()
                    .is_some_and(|registry| registry.is_managed(object.class()));

                if managed { ValueKind::ForeignManaged } else { ValueKind::Plain }
            }
            Value::Map(_) | Value::List(_) => ValueKind::Collection,
            Value::Type(_) => ValueKind::TypeRef,
            _ => ValueKind::Primitive,
        }
    }

    /// Encodes `value` for storage.
    ///
    /// Managed objects reachable from `value` are saved along the way, and
    /// the primary keys they receive are written into `value`. The root
    /// object's own primary key is left untouched; the document carries the
    /// key it will be stored under in `_id`.
    pub fn encode<'a, B>(&'a self, backend: &'a B, value: &'a mut Value, embedded: bool) -> BoxFuture<'a, PoroResult<Value>>
    where
        B: DocumentBackend + 'static,
    {
        async move {
            let kind = self.classify(value, embedded);
            trace!(class = %self.class.name, ?kind, embedded, "encoding value");

            match (kind, value) {
                (ValueKind::SelfManaged, Value::Object(object)) => self.encode_self(backend, object).await,
                (ValueKind::ForeignManaged, Value::Object(object)) => self.encode_foreign(backend, object).await,
                (ValueKind::Plain, Value::Object(object)) => {
                    let mut document = Map::new();
                    document.insert(CLASS_TAG, object.class());
                    for name in object.field_names().map(str::to_string).collect::<Vec<_>>() {
                        if let Some(field) = object.get_mut(&name) {
                            document.insert(name, self.encode(backend, field, true).await?);
                        }
                    }
                    Ok(Value::Map(document))
                }
                (ValueKind::Collection, Value::List(list)) => {
                    let mut encoded = Vec::with_capacity(list.len());
                    for item in list.iter_mut() {
                        encoded.push(self.encode(backend, item, true).await?);
                    }
                    Ok(Value::List(encoded))
                }
                (ValueKind::Collection, Value::Map(map)) => {
                    let mut encoded = Map::new();
                    for (key, item) in map.iter_mut() {
                        encoded.insert(key.clone(), self.encode(backend, item, true).await?);
                    }
                    Ok(Value::Map(encoded))
                }
                (ValueKind::TypeRef, Value::Type(name)) => {
                    let mut document = Map::new();
                    document.insert(CLASS_TAG, TYPE_CLASS);
                    document.insert("name", name.as_str());
                    Ok(Value::Map(document))
                }
                (_, value) => Ok(value.clone()),
            }
        }
        .boxed()
    }

    async fn encode_self<B>(&self, backend: &B, object: &mut Object) -> PoroResult<Value>
    where
        B: DocumentBackend + 'static,
    {
        let mut document = Map::new();
        document.insert(CLASS_TAG, self.class.name.as_str());

        for name in self.persisted_fields(object) {
            if let Some(field) = object.get_mut(&name) {
                document.insert(name, self.encode(backend, field, true).await?);
            }
        }

        let id = match identity_of(object, &self.primary_key) {
            Some(id) => self.clean_id(id.clone()),
            None => backend.create_pk(),
        };
        document.insert(ID_FIELD, id);

        Ok(Value::Map(document))
    }

    async fn encode_foreign<B>(&self, backend: &B, object: &mut Object) -> PoroResult<Value>
    where
        B: DocumentBackend + 'static,
    {
        let registry = self.registry.upgrade()?;
        let context = registry.context(object.class())?;

        context.save(object).await?;
        let id = identity_of(object, context.primary_key())
            .cloned()
            .unwrap_or_default();

        let same_database = context
            .as_any()
            .downcast_ref::<DocumentContext<B>>()
            .is_some_and(|other| other.backend().database_name() == backend.database_name());

        match context.collection_name() {
            Some(collection) if same_database => {
                trace!(class = object.class(), collection, "storing reference token");
                Ok(Value::Ref(DocumentRef::new(collection, id)))
            }
            _ => {
                let mut pointer = Map::new();
                pointer.insert(POINTER_ID, id);
                pointer.insert(CLASS_TAG, object.class());
                pointer.insert(POINTER_FLAG, true);
                Ok(Value::Map(pointer))
            }
        }
    }

    /// Decodes a stored value.
    ///
    /// A root (non-embedded) map is always decoded as an object of the
    /// codec's own class, whatever its stored tag says.
    pub fn decode<'a>(&'a self, value: Value, embedded: bool) -> BoxFuture<'a, PoroResult<Value>> {
        async move {
            match value {
                Value::Map(mut map) => {
                    if !embedded {
                        map.insert(CLASS_TAG, self.class.name.as_str());
                    }

                    let tag = map
                        .get_str(CLASS_TAG)
                        .and_then(Value::as_str)
                        .map(str::to_string);

                    match tag {
                        None => self.decode_entries(map).await.map(Value::Map),
                        Some(tag) if tag == TYPE_CLASS => self.decode_type(&map),
                        Some(tag) if tag == self.class.name => self.decode_self(map).await,
                        Some(tag) if is_pointer(&map) => self.decode_pointer(&tag, &map).await,
                        Some(tag) => self.decode_plain(&tag, map).await,
                    }
                }
                Value::List(list) => {
                    let mut decoded = Vec::with_capacity(list.len());
                    for item in list {
                        decoded.push(self.decode(item, true).await?);
                    }
                    Ok(Value::List(decoded))
                }
                Value::Ref(reference) => self.decode_reference(reference).await,
                other => Ok(other),
            }
        }
        .boxed()
    }

    async fn decode_entries(&self, map: Map) -> PoroResult<Map> {
        let mut decoded = Map::new();
        for (key, value) in map {
            decoded.insert(key, self.decode(value, true).await?);
        }
        Ok(decoded)
    }

    fn decode_type(&self, map: &Map) -> PoroResult<Value> {
        let name = map
            .get_str("name")
            .and_then(Value::as_str)
            .ok_or_else(|| PoroError::UnresolvableClass("type reference without a name".into()))?;

        let known = name == self.class.name
            || self.registry.get().is_some_and(|registry| registry.is_known(name));

        if known {
            Ok(Value::Type(name.to_string()))
        } else {
            Err(PoroError::UnresolvableClass(name.to_string()))
        }
    }

    async fn decode_self(&self, map: Map) -> PoroResult<Value> {
        let mut object = Object::allocate(&self.class);
        let mut id = Value::Null;

        for (key, value) in map {
            match key {
                Key::Str(name) if name == CLASS_TAG => {}
                Key::Str(name) if name == ID_FIELD => id = value,
                key => object.set(key.to_string(), self.decode(value, true).await?),
            }
        }

        object.set(self.primary_key.as_str(), id);
        Ok(Value::Object(object))
    }

    async fn decode_pointer(&self, class: &str, map: &Map) -> PoroResult<Value> {
        let registry = self.attached_registry(class)?;
        if !registry.is_known(class) {
            return Err(PoroError::UnresolvableClass(class.to_string()));
        }

        let id = map.get_str(POINTER_ID).cloned().unwrap_or_default();
        let fetched = registry.context(class)?.fetch(&id).await?;

        Ok(fetched.map_or(Value::Null, Value::Object))
    }

    async fn decode_plain(&self, class: &str, map: Map) -> PoroResult<Value> {
        let info = self.registry.get().and_then(|registry| registry.class_info(class));

        let Some(info) = info else {
            warn!(class, "unknown class in stored document, keeping it as a map");
            return self.decode_entries(map).await.map(Value::Map);
        };

        let mut object = Object::allocate(&info);
        for (key, value) in map {
            if matches!(&key, Key::Str(name) if name == CLASS_TAG) {
                continue;
            }
            object.set(key.to_string(), self.decode(value, true).await?);
        }

        Ok(Value::Object(object))
    }

    async fn decode_reference(&self, reference: DocumentRef) -> PoroResult<Value> {
        let context = match self.registry.get() {
            Some(registry) => registry.context_for_collection(&reference.collection)?,
            None => None,
        };

        match context {
            Some(context) => {
                let fetched = context.fetch(&reference.id).await?;
                Ok(fetched.map_or(Value::Null, Value::Object))
            }
            None => {
                trace!(collection = %reference.collection, "leaving unresolved reference in place");
                Ok(Value::Ref(reference))
            }
        }
    }

    fn attached_registry(&self, class: &str) -> PoroResult<std::sync::Arc<ContextRegistry>> {
        self.registry
            .get()
            .ok_or_else(|| PoroError::UnresolvableClass(class.to_string()))
    }
}

fn is_pointer(map: &Map) -> bool {
    map.get_str(POINTER_FLAG).and_then(Value::as_bool) == Some(true)
}

fn is_object_id(candidate: &str) -> bool {
    candidate.len() == 24 && candidate.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> DocumentCodec {
        DocumentCodec::new(ClassInfo::new("Person", ["id", "name", "secret"]), "id")
    }

    #[test]
    fn persisted_fields_honour_lists() {
        let object = Object::new("Person")
            .with("id", 1)
            .with("name", "George")
            .with("secret", "x");

        assert_eq!(codec().persisted_fields(&object), vec!["name", "secret"]);
        assert_eq!(
            codec().with_blacklist(vec!["secret".into()]).persisted_fields(&object),
            vec!["name"]
        );
        assert_eq!(
            codec()
                .with_whitelist(Some(vec!["secret".into(), "id".into()]))
                .persisted_fields(&object),
            vec!["secret"]
        );
    }

    #[test]
    fn clean_id_converts_only_object_id_strings() {
        let hex = ObjectId::new().to_hex();
        assert!(matches!(codec().clean_id(Value::from(hex.as_str())), Value::ObjectId(_)));
        assert_eq!(codec().clean_id(Value::from("42")), Value::from("42"));
        assert_eq!(
            codec().with_id_conversion(false).clean_id(Value::from(hex.as_str())),
            Value::from(hex.as_str())
        );
    }

    #[test]
    fn classification_without_registry() {
        let codec = codec();
        let person = Value::Object(Object::new("Person"));

        assert_eq!(codec.classify(&person, false), ValueKind::SelfManaged);
        assert_eq!(codec.classify(&person, true), ValueKind::Plain);
        assert_eq!(codec.classify(&Value::Object(Object::new("Address")), true), ValueKind::Plain);
        assert_eq!(codec.classify(&Value::List(vec![]), true), ValueKind::Collection);
        assert_eq!(codec.classify(&Value::Type("Person".into()), true), ValueKind::TypeRef);
        assert_eq!(codec.classify(&Value::Int(1), true), ValueKind::Primitive);
    }

    #[tokio::test]
    async fn root_maps_decode_as_own_class() {
        let mut stored = Map::new();
        stored.insert(CLASS_TAG, "Impostor");
        stored.insert(ID_FIELD, 7);
        stored.insert("name", "George");

        let decoded = codec().decode(Value::Map(stored), false).await.unwrap();
        let object = decoded.as_object().unwrap();
        assert_eq!(object.class(), "Person");
        assert_eq!(object.get("id"), Some(&Value::Int(7)));
        assert_eq!(object.get("name"), Some(&Value::from("George")));
        assert_eq!(object.get("secret"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn unknown_embedded_classes_degrade_to_maps() {
        let mut address = Map::new();
        address.insert(CLASS_TAG, "Address");
        address.insert("street", "Main");

        let decoded = codec().decode(Value::Map(address.clone()), true).await.unwrap();
        assert_eq!(decoded, Value::Map(address));
    }

    #[tokio::test]
    async fn unknown_type_references_fail() {
        let mut reference = Map::new();
        reference.insert(CLASS_TAG, TYPE_CLASS);
        reference.insert("name", "Nowhere");

        assert!(matches!(
            codec().decode(Value::Map(reference), true).await,
            Err(PoroError::UnresolvableClass(_))
        ));
    }

    #[tokio::test]
    async fn references_without_registry_pass_through() {
        let reference = Value::Ref(DocumentRef::new("people", 3));
        assert_eq!(codec().decode(reference.clone(), true).await.unwrap(), reference);
    }
}
