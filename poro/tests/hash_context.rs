use std::sync::Arc;

use poro::{memory::HashFactory, prelude::*};
use serde_json::json;

#[derive(Debug, Clone, Default, PartialEq, Entity)]
pub struct Person {
    pub id: Value,
    pub first_name: String,
    pub last_name: String,
    pub friends: Vec<Person>,
}

impl Person {
    fn new(id: i64, first_name: &str, last_name: &str, friends: Vec<Person>) -> Self {
        Self {
            id: Value::Int(id),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            friends,
        }
    }
}

async fn people() -> TypedContext<Person> {
    let registry = ContextRegistry::new(HashFactory::new());
    registry.manage::<Person>();
    let people = registry.typed::<Person>().unwrap();

    let mut george_smith = Person::new(1, "George", "Smith", vec![]);
    people.save(&mut george_smith).await.unwrap();

    let mut george_archer = Person::new(2, "George", "Archer", vec![george_smith.clone()]);
    people.save(&mut george_archer).await.unwrap();

    let mut bridgette = Person::new(3, "Bridgette", "Smith", vec![]);
    people.save(&mut bridgette).await.unwrap();

    let mut karen = Person::new(4, "Karen", "Zeta", vec![george_archer.clone(), george_smith.clone()]);
    people.save(&mut karen).await.unwrap();

    people
}

fn ids(people: &[Person]) -> Vec<i64> {
    people.iter().filter_map(|p| p.id.as_i64()).collect()
}

async fn sorted(people: &TypedContext<Person>, order: &[(&str, Direction)]) -> Vec<i64> {
    let options = order
        .iter()
        .fold(FindOptions::builder(), |builder, (key, direction)| builder.sort(*key, *direction))
        .build();

    ids(&people.find_all(options).await.unwrap())
}

#[tokio::test]
async fn sorts_by_one_or_more_keys() {
    let people = people().await;

    assert_eq!(sorted(&people, &[("first_name", Direction::Asc)]).await, vec![3, 1, 2, 4]);
    assert_eq!(
        sorted(&people, &[("first_name", Direction::Asc), ("last_name", Direction::Asc)]).await,
        vec![3, 2, 1, 4]
    );
    assert_eq!(
        sorted(&people, &[("first_name", Direction::Asc), ("last_name", Direction::Desc)]).await,
        vec![3, 1, 2, 4]
    );
    assert_eq!(
        sorted(&people, &[("last_name", Direction::Asc), ("first_name", Direction::Asc)]).await,
        vec![2, 3, 1, 4]
    );
}

#[tokio::test]
async fn sorts_through_nested_keypaths_with_missing_values_first() {
    let people = people().await;

    assert_eq!(
        sorted(
            &people,
            &[
                ("friends.0.id", Direction::Asc),
                ("last_name", Direction::Desc),
                ("first_name", Direction::Desc),
            ]
        )
        .await,
        vec![1, 3, 2, 4]
    );
}

#[tokio::test]
async fn filters_on_equality() {
    let people = people().await;

    let filtered = |conditions: Vec<(&'static str, Value)>| {
        let people = people.clone();
        async move {
            let options = conditions
                .into_iter()
                .fold(FindOptions::builder(), |builder, (key, value)| builder.filter(key, value))
                .build();
            ids(&people.find_all(options).await.unwrap())
        }
    };

    assert_eq!(filtered(vec![("last_name", "Smith".into())]).await, vec![1, 3]);
    assert_eq!(filtered(vec![("first_name", "George".into())]).await, vec![1, 2]);
    assert_eq!(
        filtered(vec![("last_name", "Smith".into()), ("first_name", "George".into())]).await,
        vec![1]
    );
    assert_eq!(filtered(vec![("friends.0.id", Value::Null)]).await, Vec::<i64>::new());
    assert_eq!(filtered(vec![("friends.0.id", Value::Int(2))]).await, vec![4]);
}

#[tokio::test]
async fn pages_with_limit_and_offset() {
    let people = people().await;

    let paged = |limit: Option<usize>, offset: usize| {
        let people = people.clone();
        async move {
            let mut options: FindOptions = FindOptions::new();
            options.limit = Limit::new(limit, offset);
            ids(&people.find_all(options).await.unwrap())
        }
    };

    assert_eq!(paged(None, 0).await, vec![1, 2, 3, 4]);
    assert_eq!(paged(Some(2), 0).await, vec![1, 2]);
    assert_eq!(paged(Some(2), 3).await, vec![4]);
    assert_eq!(paged(Some(100), 2).await, vec![3, 4]);
    assert_eq!(paged(None, 2).await, vec![3, 4]);
    assert_eq!(paged(None, 100).await, Vec::<i64>::new());
}

#[tokio::test]
async fn finds_all_or_first_from_json_options() {
    let people = people().await;
    let options = FindOptions::from_json(json!({
        "conditions": { "last_name": "Smith" },
        "order": "first_name",
    }))
    .unwrap();

    let all = people.find("all", options.clone()).await.unwrap();
    assert_eq!(ids(&all.into_vec()), vec![3, 1]);

    let first = people.find("first", options).await.unwrap().into_one().unwrap();
    assert_eq!(first.id, Value::Int(3));
    assert_eq!(first.first_name, "Bridgette");
}

#[tokio::test]
async fn finds_by_ids() {
    let people = people().await;

    let karen = people.find(Value::Int(4), FindOptions::new()).await.unwrap();
    assert_eq!(karen.into_one().map(|p| p.last_name), Some("Zeta".to_string()));

    let several = people
        .fetch_many(&[Value::Int(3), Value::Int(9), Value::Int(1)])
        .await
        .unwrap();
    assert_eq!(ids(&several), vec![3, 1]);

    assert!(people.fetch(9).await.unwrap().is_none());
}

#[tokio::test]
async fn nested_objects_come_back_whole() {
    let people = people().await;

    let karen = people.fetch(4).await.unwrap().unwrap();
    assert_eq!(ids(&karen.friends), vec![2, 1]);
    assert_eq!(ids(&karen.friends[0].friends), vec![1]);
    assert_eq!(karen.friends[1].first_name, "George");
}

#[tokio::test]
async fn save_assigns_ids_and_remove_clears_them() {
    let registry = ContextRegistry::new(HashFactory::new());
    registry.manage::<Person>();
    let people = registry.typed::<Person>().unwrap();

    let mut anonymous = Person {
        first_name: "Ada".into(),
        ..Default::default()
    };
    people.save(&mut anonymous).await.unwrap();
    let id = anonymous.id.clone();
    assert!(id.as_str().is_some());

    assert_eq!(people.fetch(id.clone()).await.unwrap(), Some(anonymous.clone()));

    people.remove(&mut anonymous).await.unwrap();
    assert!(anonymous.id.is_null());
    assert!(people.fetch(id).await.unwrap().is_none());

    assert!(matches!(
        people.remove(&mut anonymous).await,
        Err(PoroError::RemoveFailure(_, _))
    ));
}

#[tokio::test]
async fn contexts_are_cached_until_reset() {
    let registry = ContextRegistry::new(HashFactory::new());
    registry.manage::<Person>();

    let first = registry.context("Person").unwrap();
    let second = registry.context("Person").unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    registry.reset();
    let rebuilt = registry.context("Person").unwrap();
    assert!(!Arc::ptr_eq(&first, &rebuilt));
    assert!(registry.is_managed("Person"));

    assert!(matches!(
        registry.context("Stranger"),
        Err(PoroError::Configuration(_))
    ));
}

#[tokio::test]
async fn callbacks_see_every_stage() {
    let people = people().await;
    let fetched = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    {
        let fetched = fetched.clone();
        people.callbacks().on(HookEvent::AfterFetch, move |_| {
            fetched.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
    }

    let smiths = people
        .find_all(FindOptions::builder().filter("last_name", "Smith").build())
        .await
        .unwrap();
    assert_eq!(smiths.len(), 2);
    assert_eq!(fetched.load(std::sync::atomic::Ordering::SeqCst), 2);
}
