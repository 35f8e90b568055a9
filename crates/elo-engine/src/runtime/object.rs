//! Shared collection values: arrays, objects and channels.

use super::value::Value;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError, TrySendError};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// A shared, growable array.
#[derive(Clone)]
pub struct Array(Arc<RwLock<Vec<Value>>>);

impl Array {
    /// Creates an array holding `items`.
    pub fn new(items: Vec<Value>) -> Self {
        Self(Arc::new(RwLock::new(items)))
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    /// Returns true if the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Element at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.read().get(index).cloned()
    }

    /// Overwrites the element at `index`. Returns false when out of range.
    pub fn set(&self, index: usize, value: Value) -> bool {
        match self.0.write().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Appends values to the end.
    pub fn extend(&self, values: impl IntoIterator<Item = Value>) {
        self.0.write().extend(values);
    }

    /// Copies the current contents out.
    pub fn snapshot(&self) -> Vec<Value> {
        self.0.read().clone()
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the shared storage, for identity tracking.
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

#[derive(Debug, Default)]
struct ObjectData {
    fields: FxHashMap<String, Value>,
    parent: Option<Weak<RwLock<ObjectData>>>,
}

/// A shared object: a string-keyed field table plus a weak parent link.
///
/// Field lookup falls back to the parent chain. The parent is never kept
/// alive by its children.
#[derive(Clone, Default)]
pub struct Object(Arc<RwLock<ObjectData>>);

impl Object {
    /// Creates an empty object with no parent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up `key` here, then along the parent chain.
    pub fn get(&self, key: &str) -> Option<Value> {
        let data = self.0.read();
        if let Some(value) = data.fields.get(key) {
            return Some(value.clone());
        }
        let parent = data.parent.as_ref()?.upgrade()?;
        drop(data);
        Object(parent).get(key)
    }

    /// Sets an own field.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.0.write().fields.insert(key.into(), value);
    }

    /// Links `parent` for fallback lookup. Passing `None` clears it.
    ///
    /// A link that would make the chain cyclic is ignored and false is
    /// returned.
    pub fn set_parent(&self, parent: Option<&Object>) -> bool {
        if let Some(parent) = parent {
            let mut cursor = Some(parent.clone());
            while let Some(current) = cursor {
                if current.ptr_eq(self) {
                    return false;
                }
                cursor = current.parent();
            }
        }
        self.0.write().parent = parent.map(|p| Arc::downgrade(&p.0));
        true
    }

    /// The parent object, if it is still alive.
    pub fn parent(&self) -> Option<Object> {
        self.0.read().parent.as_ref()?.upgrade().map(Object)
    }

    /// Own field names, sorted so iteration order is deterministic.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.0.read().fields.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Own fields, sorted by key.
    pub fn entries(&self) -> Vec<(String, Value)> {
        let mut entries: Vec<(String, Value)> = self
            .0
            .read()
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Number of own fields.
    pub fn len(&self) -> usize {
        self.0.read().fields.len()
    }

    /// Returns true if there are no own fields.
    pub fn is_empty(&self) -> bool {
        self.0.read().fields.is_empty()
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the shared storage, for identity tracking.
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

// Debug goes through Display, which stops at cycles.
impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Array({})", Value::Array(self.clone()))
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({})", Value::Object(self.clone()))
    }
}

/// Both ends of a crossbeam channel carried as one value.
///
/// Script code only uses the non-blocking operations. Host threads can
/// clone the endpoints and block on them.
#[derive(Debug, Clone)]
pub struct Channel {
    sender: Sender<Value>,
    receiver: Receiver<Value>,
}

impl Channel {
    /// Creates a channel; `None` means unbounded.
    pub fn new(capacity: Option<usize>) -> Self {
        let (sender, receiver) = match capacity {
            Some(cap) => channel::bounded(cap),
            None => channel::unbounded(),
        };
        Self { sender, receiver }
    }

    /// Sends without blocking. Fails when the channel is full.
    pub fn try_send(&self, value: Value) -> Result<(), String> {
        self.sender.try_send(value).map_err(|err| match err {
            TrySendError::Full(_) => "channel is full".to_string(),
            TrySendError::Disconnected(_) => "channel is closed".to_string(),
        })
    }

    /// Receives without blocking. `None` when nothing is queued.
    pub fn try_recv(&self) -> Option<Value> {
        match self.receiver.try_recv() {
            Ok(value) => Some(value),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// The sending endpoint, for host threads.
    pub fn sender(&self) -> Sender<Value> {
        self.sender.clone()
    }

    /// The receiving endpoint, for host threads.
    pub fn receiver(&self) -> Receiver<Value> {
        self.receiver.clone()
    }

    /// Number of queued values.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Returns true if both values refer to the same channel.
    pub fn same_channel(&self, other: &Channel) -> bool {
        self.sender.same_channel(&other.sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_get_set() {
        let array = Array::new(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(array.get(1), Some(Value::Number(2.0)));
        assert!(array.set(0, Value::Bool(true)));
        assert!(!array.set(5, Value::Nil));
        assert_eq!(array.get(0), Some(Value::Bool(true)));
    }

    #[test]
    fn test_array_is_shared() {
        let array = Array::new(Vec::new());
        let alias = array.clone();
        alias.extend([Value::Number(7.0)]);
        assert_eq!(array.len(), 1);
    }

    #[test]
    fn test_object_parent_lookup() {
        let parent = Object::new();
        parent.set("greeting", Value::from("hi"));
        let child = Object::new();
        assert!(child.set_parent(Some(&parent)));
        assert_eq!(child.get("greeting"), Some(Value::from("hi")));
        child.set("greeting", Value::from("yo"));
        assert_eq!(child.get("greeting"), Some(Value::from("yo")));
    }

    #[test]
    fn test_object_parent_is_weak() {
        let child = Object::new();
        {
            let parent = Object::new();
            parent.set("x", Value::Number(1.0));
            child.set_parent(Some(&parent));
            assert_eq!(child.get("x"), Some(Value::Number(1.0)));
        }
        assert_eq!(child.get("x"), None);
        assert!(child.parent().is_none());
    }

    #[test]
    fn test_object_rejects_cyclic_parent() {
        let a = Object::new();
        let b = Object::new();
        assert!(b.set_parent(Some(&a)));
        assert!(!a.set_parent(Some(&b)));
        assert!(!a.set_parent(Some(&a)));
    }

    #[test]
    fn test_object_keys_sorted() {
        let object = Object::new();
        object.set("b", Value::Nil);
        object.set("a", Value::Nil);
        assert_eq!(object.keys(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_channel_roundtrip() {
        let ch = Channel::new(Some(1));
        assert!(ch.try_send(Value::Number(1.0)).is_ok());
        assert!(ch.try_send(Value::Number(2.0)).is_err());
        assert_eq!(ch.try_recv(), Some(Value::Number(1.0)));
        assert_eq!(ch.try_recv(), None);
        assert!(ch.same_channel(&ch.clone()));
        assert!(!ch.same_channel(&Channel::new(None)));
    }
}
