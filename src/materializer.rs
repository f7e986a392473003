//! Materialization of untyped input into typed instances.

use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError};
use tracing::{debug, trace};

use crate::descriptor::{Instance, TypeDescriptor};
use crate::error::{RecastError, Result};
use crate::registry::{self, RuleKind, RuleRegistry};
use crate::value::{Record, RecordId, Value};

/// Applies the rules of a [`RuleRegistry`] while building instances.
///
/// A materializer borrows its registry for its whole lifetime, so the rule
/// set cannot change under a conversion. It may be reused for any number of
/// top-level calls; each call starts with an empty visited set.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use recast::{FieldRule, Materializer, RuleRegistry, TypeDescriptor};
/// use serde_json::json;
///
/// let widget = Arc::new(TypeDescriptor::new("Widget"));
/// let mut registry = RuleRegistry::new();
/// registry.register(FieldRule::exclude("Widget", "model")).unwrap();
///
/// let output = Materializer::new(&registry)
///     .convert_json(&widget, &json!({"name": "Doodad", "model": 1234}))
///     .unwrap();
///
/// let instance = output.as_instance().unwrap();
/// assert_eq!(instance.get("name").and_then(|v| v.as_str()), Some("Doodad"));
/// assert!(!instance.is_set("model"));
/// ```
pub struct Materializer<'r> {
    registry: &'r RuleRegistry,
    visited: HashSet<RecordId>,
}

impl<'r> Materializer<'r> {
    pub fn new(registry: &'r RuleRegistry) -> Self {
        Self {
            registry,
            visited: HashSet::new(),
        }
    }

    /// Materialize `input` as `target`.
    ///
    /// A record becomes a [`Value::Instance`]; a list becomes a list of
    /// instances in the same order. Any error aborts the whole call.
    pub fn convert(&mut self, target: &TypeDescriptor, input: &Value) -> Result<Value> {
        self.visited.clear();
        debug!(type_name = target.name(), input = input.kind(), "materializing");
        self.convert_value(target, input)
    }

    /// Materialize parsed JSON.
    pub fn convert_json(
        &mut self,
        target: &TypeDescriptor,
        input: &serde_json::Value,
    ) -> Result<Value> {
        self.convert(target, &Value::from(input))
    }

    /// Materialize `input`, then deserialize the result into `T`.
    ///
    /// Excluded and unset fields are simply missing from what `T` sees, so
    /// they need `#[serde(default)]` or an `Option` on the Rust side.
    pub fn convert_into<T: DeserializeOwned>(
        &mut self,
        target: &TypeDescriptor,
        input: &Value,
    ) -> Result<T> {
        let output = self.convert(target, input)?;
        let json = output.to_json().map_err(RecastError::Decode)?;
        serde_json::from_value(json).map_err(RecastError::Decode)
    }

    /// Drive the conversion with an explicit work stack.
    ///
    /// Every nested record or list pushes a [`Frame`]; a finished frame hands
    /// its value to the frame below it. Input depth is bounded by the heap,
    /// not by the thread's stack.
    fn convert_value<'a>(&mut self, target: &'a TypeDescriptor, input: &Value) -> Result<Value>
    where
        'r: 'a,
    {
        let registry: &'a RuleRegistry = self.registry;
        let mut stack: Vec<Frame<'a>> = Vec::new();
        let mut completed = self.enter(target, input.clone(), &mut stack)?;

        while let Some(frame) = stack.last_mut() {
            if let Some(value) = completed.take() {
                frame.accept(value);
            }

            match frame.advance(registry)? {
                Step::Descend { target, input } => {
                    completed = self.enter(target, input, &mut stack)?;
                }
                Step::Finished => {
                    completed = stack.pop().map(Frame::finish);
                }
            }
        }

        Ok(completed.unwrap_or_default())
    }

    /// Start converting `input` as `target`.
    ///
    /// Returns the value straight away when no descent is needed, or pushes
    /// a frame and returns `None`.
    fn enter<'a>(
        &mut self,
        target: &'a TypeDescriptor,
        input: Value,
        stack: &mut Vec<Frame<'a>>,
    ) -> Result<Option<Value>>
    where
        'r: 'a,
    {
        match input {
            Value::List(items) => {
                stack.push(Frame::List {
                    target,
                    converted: Vec::with_capacity(items.len()),
                    items: items.into_iter(),
                });
                Ok(None)
            }
            Value::Record(record) => self.enter_record(target, &record, stack),
            other => Err(RecastError::UnexpectedValue {
                type_name: target.name().to_string(),
                found: other.kind(),
            }),
        }
    }

    fn enter_record<'a>(
        &mut self,
        target: &'a TypeDescriptor,
        record: &Record,
        stack: &mut Vec<Frame<'a>>,
    ) -> Result<Option<Value>>
    where
        'r: 'a,
    {
        let mut instance = target.instantiate();
        let entries = record.entries();

        let declaring_types = self.registry.declaring_types_for(target.type_chain());
        if declaring_types.is_empty() {
            // No rules anywhere up the chain: plain copy.
            for (field, value) in entries {
                target.assign(&mut instance, &field, value);
            }
            return Ok(Some(Value::Instance(instance)));
        }

        if !self.visited.insert(record.id()) {
            return Err(RecastError::CircularReference {
                type_name: target.name().to_string(),
            });
        }

        stack.push(Frame::Record {
            target,
            instance,
            entries: entries.into_iter(),
            declaring_types,
            pending: None,
        });
        Ok(None)
    }
}

/// A record or list whose conversion is in progress.
enum Frame<'a> {
    Record {
        target: &'a TypeDescriptor,
        instance: Instance,
        entries: std::vec::IntoIter<(String, Value)>,
        declaring_types: Vec<&'a str>,
        /// Field waiting for a nested value.
        pending: Option<String>,
    },
    List {
        target: &'a TypeDescriptor,
        items: std::vec::IntoIter<Value>,
        converted: Vec<Value>,
    },
}

enum Step<'a> {
    Descend { target: &'a TypeDescriptor, input: Value },
    Finished,
}

impl<'a> Frame<'a> {
    /// Store a finished nested value.
    fn accept(&mut self, value: Value) {
        match self {
            Frame::Record {
                target,
                instance,
                pending,
                ..
            } => {
                if let Some(field) = pending.take() {
                    target.assign(instance, &field, value);
                }
            }
            Frame::List { converted, .. } => converted.push(value),
        }
    }

    /// Work through the remaining input until a nested value is needed.
    fn advance(&mut self, registry: &'a RuleRegistry) -> Result<Step<'a>> {
        match self {
            Frame::List { target, items, .. } => Ok(match items.next() {
                Some(input) => Step::Descend {
                    target: *target,
                    input,
                },
                None => Step::Finished,
            }),
            Frame::Record {
                target,
                instance,
                entries,
                declaring_types,
                pending,
            } => {
                for (field, value) in entries.by_ref() {
                    let Some(rule) = registry.lookup(declaring_types.as_slice(), &field)? else {
                        target.assign(instance, &field, value);
                        continue;
                    };

                    match rule.kind() {
                        RuleKind::Exclude => {
                            trace!(type_name = target.name(), field = %field, "excluded");
                        }
                        RuleKind::Transform => {
                            let nested = rule.target().ok_or_else(|| {
                                RecastError::MissingTargetType {
                                    type_name: rule.declaring_type().to_string(),
                                    field: field.clone(),
                                }
                            })?;

                            if rule.is_nullable() && value.is_null() {
                                target.assign(instance, &field, Value::Null);
                                continue;
                            }

                            trace!(
                                type_name = target.name(),
                                field = %field,
                                nested = nested.name(),
                                "transforming"
                            );
                            *pending = Some(field);
                            return Ok(Step::Descend {
                                target: Arc::as_ref(nested),
                                input: value,
                            });
                        }
                    }
                }
                Ok(Step::Finished)
            }
        }
    }

    fn finish(self) -> Value {
        match self {
            Frame::Record { instance, .. } => Value::Instance(instance),
            Frame::List { converted, .. } => Value::List(converted),
        }
    }
}

/// Materialize `input` as `target` using the process-wide registry.
///
/// The registry's read lock is held for the whole call.
pub fn convert(target: &TypeDescriptor, input: &Value) -> Result<Value> {
    let registry = registry::global()
        .read()
        .unwrap_or_else(PoisonError::into_inner);
    Materializer::new(&registry).convert(target, input)
}
