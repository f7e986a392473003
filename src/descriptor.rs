//! Target type descriptors and the instances they produce.
//!
//! A [`TypeDescriptor`] is everything the materializer knows about a target
//! type: how to make an empty [`Instance`], the chain of type names from the
//! type up through its ancestors, and how to read and assign fields by name.

use indexmap::{IndexMap, IndexSet};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::{Deserialize, Serialize as SerializeDerive};
use std::sync::Arc;

use crate::error::{RecastError, Result};
use crate::value::{Fields, Value};

/// What happens to input fields a type does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, SerializeDerive, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtraFields {
    /// Undeclared fields are attached to the instance anyway.
    #[default]
    Attach,
    /// Undeclared fields are dropped.
    Ignore,
}

/// Description of a materialization target.
///
/// The ancestry chain is fixed when the descriptor is built with
/// [`extends`](Self::extends), so building a hierarchy means building the
/// parents first.
///
/// # Example
///
/// ```
/// use recast::TypeDescriptor;
///
/// let base = TypeDescriptor::new("BaseWidget").with_fields(["id", "created"]);
/// let widget = TypeDescriptor::new("Widget")
///     .extends(&base)
///     .with_fields(["name", "color"]);
///
/// assert_eq!(widget.type_chain(), ["Widget", "BaseWidget"]);
/// assert!(widget.declares("id"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    name: Arc<str>,
    chain: Vec<String>,
    fields: Option<IndexSet<String>>,
    extra_fields: ExtraFields,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        let name: String = name.into();
        Self {
            chain: vec![name.clone()],
            name: Arc::from(name),
            fields: None,
            extra_fields: ExtraFields::default(),
        }
    }

    /// Make this type a direct descendant of `parent`.
    ///
    /// The parent's chain is appended to this type's chain and its declared
    /// fields are inherited.
    pub fn extends(mut self, parent: &TypeDescriptor) -> Self {
        self.chain.truncate(1);
        self.chain.extend(parent.chain.iter().cloned());

        if let Some(inherited) = &parent.fields {
            let own = self.fields.take().unwrap_or_default();
            let mut merged = inherited.clone();
            merged.extend(own);
            self.fields = Some(merged);
        }
        self
    }

    /// Declare fields on this type. May be called more than once.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields
            .get_or_insert_with(IndexSet::new)
            .extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn extra_fields(mut self, policy: ExtraFields) -> Self {
        self.extra_fields = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type names from this type up to the root, most-derived first.
    pub fn type_chain(&self) -> &[String] {
        &self.chain
    }

    pub fn is_a(&self, type_name: &str) -> bool {
        self.chain.iter().any(|name| name == type_name)
    }

    /// Declared fields, including inherited ones. `None` when the type does
    /// not declare a field list at all.
    pub fn declared_fields(&self) -> Option<&IndexSet<String>> {
        self.fields.as_ref()
    }

    pub fn extra_field_policy(&self) -> ExtraFields {
        self.extra_fields
    }

    /// True when `field` is declared, or when no field list is declared.
    pub fn declares(&self, field: &str) -> bool {
        self.fields
            .as_ref()
            .map_or(true, |fields| fields.contains(field))
    }

    /// A new instance with every field unset.
    pub fn instantiate(&self) -> Instance {
        Instance {
            type_name: Arc::clone(&self.name),
            fields: IndexMap::new(),
        }
    }

    /// Assign `field` on `instance`, honoring the extra-field policy.
    ///
    /// Returns whether the value was stored.
    pub fn assign(&self, instance: &mut Instance, field: &str, value: Value) -> bool {
        if self.declares(field) || self.extra_fields == ExtraFields::Attach {
            instance.fields.insert(field.to_string(), value);
            true
        } else {
            false
        }
    }

    /// Read `field` from `instance`. `None` when unset, or when the instance
    /// was produced by a different type.
    pub fn read<'a>(&self, instance: &'a Instance, field: &str) -> Option<&'a Value> {
        if instance.type_name() == self.name() {
            instance.get(field)
        } else {
            None
        }
    }
}

/// A materialized object.
///
/// Fields that were never assigned are unset and read back as `None`. A
/// field assigned `Value::Null` reads back as `Some(&Value::Null)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    type_name: Arc<str>,
    fields: Fields,
}

impl Instance {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn is_set(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in assignment order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn to_json(&self) -> std::result::Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

impl Serialize for Instance {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Named descriptors, used to resolve type references by name.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    types: IndexMap<String, Arc<TypeDescriptor>>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor. Names are unique within a catalog.
    pub fn insert(&mut self, descriptor: Arc<TypeDescriptor>) -> Result<()> {
        let name = descriptor.name().to_string();
        if self.types.contains_key(&name) {
            return Err(RecastError::Schema(format!("type '{}' is declared more than once", name)));
        }
        self.types.insert(name, descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TypeDescriptor>> {
        self.types.get(name)
    }

    /// Like [`get`](Self::get), but an unknown name is an error.
    pub fn resolve(&self, name: &str) -> Result<Arc<TypeDescriptor>> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| RecastError::UnknownType { name: name.to_string() })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TypeDescriptor>> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
