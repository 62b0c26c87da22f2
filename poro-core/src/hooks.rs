//! Lifecycle callbacks attached to a context.
//!
//! Event hooks observe an object around saves, removals and fetches.
//! Transform hooks rewrite the value on its way into or out of a store; each
//! transform's output feeds the next one.

use std::{collections::HashMap, fmt, sync::Arc};
use parking_lot::RwLock;

use crate::value::{Object, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    BeforeSave,
    AfterSave,
    BeforeRemove,
    AfterRemove,
    AfterFetch,
    /// Fired once a stored value has been turned into an object.
    AfterConvertToObject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookTransform {
    /// Applied to the object's value before it is converted for storage.
    BeforeConvertToDocument,
    /// Applied to the raw stored value before it is converted to an object.
    BeforeConvertToObject,
}

pub type EventHook = Arc<dyn Fn(&Object) + Send + Sync>;
pub type TransformHook = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Registered hooks, in registration order.
#[derive(Default)]
pub struct Callbacks {
    events: RwLock<HashMap<HookEvent, Vec<EventHook>>>,
    transforms: RwLock<HashMap<HookTransform, Vec<TransformHook>>>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, event: HookEvent, hook: F)
    where
        F: Fn(&Object) + Send + Sync + 'static,
    {
        self.events
            .write()
            .entry(event)
            .or_default()
            .push(Arc::new(hook));
    }

    pub fn transform_with<F>(&self, transform: HookTransform, hook: F)
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.transforms
            .write()
            .entry(transform)
            .or_default()
            .push(Arc::new(hook));
    }

    pub fn count(&self, event: HookEvent) -> usize {
        self.events.read().get(&event).map_or(0, Vec::len)
    }

    pub fn transform_count(&self, transform: HookTransform) -> usize {
        self.transforms.read().get(&transform).map_or(0, Vec::len)
    }

    /// Removes every hook.
    pub fn clear(&self) {
        self.events.write().clear();
        self.transforms.write().clear();
    }

    pub fn clear_event(&self, event: HookEvent) {
        self.events.write().remove(&event);
    }

    pub fn fire(&self, event: HookEvent, object: &Object) {
        // Hooks run without the lock held so they may register further hooks.
        let hooks = self.events.read().get(&event).cloned().unwrap_or_default();

        for hook in hooks {
            hook(object);
        }
    }

    pub fn apply(&self, transform: HookTransform, value: Value) -> Value {
        let hooks = self.transforms.read().get(&transform).cloned().unwrap_or_default();

        hooks.into_iter().fold(value, |value, hook| hook(value))
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let events: usize = self.events.read().values().map(Vec::len).sum();
        let transforms: usize = self.transforms.read().values().map(Vec::len).sum();

        f.debug_struct("Callbacks")
            .field("events", &events)
            .field("transforms", &transforms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn events_fire_in_registration_order() {
        let callbacks = Callbacks::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = seen.clone();
            callbacks.on(HookEvent::AfterSave, move |_| seen.lock().push(tag));
        }

        callbacks.fire(HookEvent::AfterSave, &Object::new("Person"));
        callbacks.fire(HookEvent::BeforeSave, &Object::new("Person"));
        assert_eq!(*seen.lock(), vec!["first", "second"]);
        assert_eq!(callbacks.count(HookEvent::AfterSave), 2);
        assert_eq!(callbacks.count(HookEvent::BeforeRemove), 0);
    }

    #[test]
    fn transforms_chain() {
        let callbacks = Callbacks::new();
        callbacks.transform_with(HookTransform::BeforeConvertToDocument, |v| match v {
            Value::Int(i) => Value::Int(i + 1),
            other => other,
        });
        callbacks.transform_with(HookTransform::BeforeConvertToDocument, |v| match v {
            Value::Int(i) => Value::Int(i * 10),
            other => other,
        });

        assert_eq!(
            callbacks.apply(HookTransform::BeforeConvertToDocument, Value::Int(1)),
            Value::Int(20)
        );
        assert_eq!(
            callbacks.apply(HookTransform::BeforeConvertToObject, Value::Int(1)),
            Value::Int(1)
        );
    }

    #[test]
    fn hooks_may_register_hooks_while_firing() {
        let callbacks = Arc::new(Callbacks::new());
        let fired = Arc::new(AtomicUsize::new(0));

        let inner = callbacks.clone();
        let counter = fired.clone();
        callbacks.on(HookEvent::AfterFetch, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            inner.on(HookEvent::AfterFetch, |_| {});
        });

        callbacks.fire(HookEvent::AfterFetch, &Object::new("Person"));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(callbacks.count(HookEvent::AfterFetch), 2);

        callbacks.clear();
        assert_eq!(callbacks.count(HookEvent::AfterFetch), 0);
    }
}
