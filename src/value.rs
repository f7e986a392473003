//! Untyped values flowing into and out of the materializer.
//!
//! Input arrives as [`Value::Record`]s (shared, identity-carrying field maps)
//! or lists of them. Output is built from [`Value::Instance`]s produced by a
//! [`TypeDescriptor`](crate::TypeDescriptor). Scalars pass through untouched.

use indexmap::IndexMap;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::descriptor::Instance;

/// Insertion-ordered field map shared by records and instances.
pub type Fields = IndexMap<String, Value>;

/// A loosely-typed value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    /// Untyped input record, compared by identity.
    Record(Record),
    /// Materialized output object.
    Instance(Instance),
}

impl Value {
    /// Short name of the variant, used in error messages and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Record(_) => "record",
            Value::Instance(_) => "instance",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Value::Instance(instance) => Some(instance),
            _ => None,
        }
    }

    /// Convert to a `serde_json::Value`.
    ///
    /// Records and instances become JSON objects. A record graph containing a
    /// cycle cannot be represented and recurses without bound.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Stable identity of a [`Record`] for the lifetime of its allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(usize);

/// A shared, mutable input record.
///
/// Cloning a `Record` clones the handle, not the fields: both handles refer
/// to the same record and compare equal. This is what lets input graphs
/// share nodes, and contain cycles, the way parsed object graphs can.
///
/// Handles are strong references, so a record that reaches itself is never
/// freed. Callers that build cycles own breaking them, for example by
/// removing the back-reference once they are done.
#[derive(Clone, Default)]
pub struct Record(Arc<RwLock<Fields>>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: Fields) -> Self {
        Self(Arc::new(RwLock::new(fields)))
    }

    /// Builder-style insert.
    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a field, returning the previous value.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.write().insert(key.into(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.write().shift_remove(key)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Snapshot of the fields in insertion order.
    ///
    /// No lock is held once this returns, so callers may walk nested records
    /// (including this one) freely.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn id(&self) -> RecordId {
        RecordId(Arc::as_ptr(&self.0) as *const () as usize)
    }

    /// True when both handles point at the same record.
    pub fn ptr_eq(&self, other: &Record) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn read(&self) -> RwLockReadGuard<'_, Fields> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Fields> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

// Only keys are printed: a record may reach itself.
impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.id().0)
            .field("keys", &self.keys())
            .finish()
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self::from_fields(iter.into_iter().collect())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Record(record)
    }
}

impl From<Instance> for Value {
    fn from(instance: Instance) -> Self {
        Value::Instance(instance)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// JSON objects become fresh records; numbers become `Int` when they fit in
/// an `i64` and `Float` otherwise.
impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::Null
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => {
                Value::List(arr.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Record(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(value: &serde_json::Value) -> Self {
        Value::from(value.clone())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Record(record) => {
                let entries = record.entries();
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in &entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::Instance(instance) => instance.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_object_builds_record() {
        let value = Value::from(json!({
            "name": "Doodad",
            "model": 1234,
            "weight": 1.5,
            "tags": ["a", "b"],
            "missing": null
        }));

        let record = value.as_record().expect("object should become a record");
        assert_eq!(record.keys(), vec!["name", "model", "weight", "tags", "missing"]);
        assert_eq!(record.get("name"), Some(Value::String("Doodad".to_string())));
        assert_eq!(record.get("model"), Some(Value::Int(1234)));
        assert_eq!(record.get("weight"), Some(Value::Float(1.5)));
        assert_eq!(record.get("missing"), Some(Value::Null));
        assert_eq!(
            record.get("tags"),
            Some(Value::List(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn test_record_identity() {
        let a = Record::new().with("x", 1);
        let b = a.clone();
        let c = Record::new().with("x", 1);

        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());
        assert_ne!(a, c);
        assert_ne!(a.id(), c.id());

        b.insert("y", 2);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_self_referencing_record_debug_does_not_recurse() {
        let record = Record::new().with("name", "loop");
        record.insert("me", record.clone());

        let printed = format!("{:?}", record);
        assert!(printed.contains("me"));
        assert!(printed.contains("name"));
    }

    #[test]
    fn test_removing_back_reference_breaks_cycle() {
        let record = Record::new().with("name", "loop");
        record.insert("me", record.clone());
        assert_eq!(Arc::strong_count(&record.0), 2);

        record.remove("me");
        assert_eq!(Arc::strong_count(&record.0), 1);
    }

    #[test]
    fn test_serialize_record_round_trips_through_json() {
        let input = json!({"b": 1, "a": {"c": [true, null]}});
        let value = Value::from(input.clone());

        assert_eq!(value.to_json().unwrap(), input);
    }

    #[test]
    fn test_deserialize_value_from_yaml() {
        let value: Value = serde_yaml::from_str("name: Doodad\nmodel: 12\n").unwrap();
        let record = value.as_record().unwrap();

        assert_eq!(record.get("model").and_then(|v| v.as_i64()), Some(12));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(Value::Null.kind(), "null");
        assert_eq!(Value::from(vec![1, 2]).kind(), "list");
        assert_eq!(Value::from(Record::new()).kind(), "record");
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }
}
