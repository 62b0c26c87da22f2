use std::collections::BTreeMap;

use poro::prelude::*;

#[derive(Debug, Clone, Default, PartialEq, Entity)]
#[entity(class = "Customer", collection = "clients")]
pub struct Client {
    pub id: Option<bson::oid::ObjectId>,
    #[entity(rename = "full_name")]
    pub name: String,
    pub age: u32,
    pub tags: Vec<String>,
    pub scores: BTreeMap<String, i64>,
    #[entity(skip)]
    pub session: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Entity)]
pub struct Empty {}

#[test]
fn class_info_follows_attributes() {
    let info = Client::class_info();

    assert_eq!(info.name, "Customer");
    assert_eq!(info.collection.as_deref(), Some("clients"));
    assert_eq!(info.fields, vec!["id", "full_name", "age", "tags", "scores"]);
    assert_eq!(Client::class_name(), "Customer");

    let empty = Empty::class_info();
    assert_eq!(empty.name, "Empty");
    assert!(empty.fields.is_empty());
    assert!(empty.collection.is_none());
}

#[test]
fn extract_and_restore_round_trip() {
    let mut scores = BTreeMap::new();
    scores.insert("math".to_string(), 90);

    let client = Client {
        id: Some(bson::oid::ObjectId::new()),
        name: "Ada".into(),
        age: 36,
        tags: vec!["vip".into()],
        scores,
        session: Some("transient".into()),
    };

    let object = client.extract();
    assert_eq!(object.class(), "Customer");
    assert_eq!(object.get("full_name"), Some(&Value::from("Ada")));
    assert!(!object.has_field("session"));
    assert!(!object.has_field("name"));

    let restored = Client::from_object(object).unwrap();
    assert_eq!(restored, Client { session: None, ..client });
}

#[test]
fn allocate_uses_defaults() {
    assert_eq!(Client::allocate(), Client::default());
}

#[test]
fn missing_and_unknown_fields_are_tolerated() {
    let object = Object::new("Customer")
        .with("full_name", "Grace")
        .with("age", Value::Null)
        .with("nickname", "amazing");

    let client = Client::from_object(object).unwrap();
    assert_eq!(client.name, "Grace");
    assert_eq!(client.age, 0);
    assert!(client.id.is_none());
}

#[test]
fn mistyped_fields_are_rejected() {
    let object = Object::new("Customer").with("age", "old");

    assert!(matches!(
        Client::from_object(object),
        Err(PoroError::InvalidValue(expected, found)) if expected == "u32" && found == "string"
    ));
}

#[test]
fn entities_nest_as_values() {
    let client = Client {
        name: "Ada".into(),
        ..Default::default()
    };

    let value = client.to_value();
    assert_eq!(Client::from_value(value).unwrap(), client);

    assert!(matches!(
        Client::from_value(Value::Object(Object::new("Other"))),
        Err(PoroError::InvalidValue(expected, found)) if expected == "Customer" && found == "Other"
    ));
    assert!(Client::from_value(Value::Int(1)).is_err());
}
