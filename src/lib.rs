//! # Recast: Rule-Driven Record Materialization
//!
//! Recast turns loosely-typed records (the maps you get from parsing JSON or
//! YAML) into instances of declared types, applying per-field rules on the
//! way.
//!
//! ## Features
//!
//! - **Field rules**: exclude a field, or transform it (or each element of a
//!   list) into a nested type, optionally letting `null` through
//! - **Inherited rules**: a rule declared on an ancestor applies to every
//!   descendant type
//! - **Cycle detection**: an input record reached twice in one conversion is
//!   an error, not a stack overflow
//! - **Declarative schemas**: types and rules from YAML
//! - **serde interop**: JSON in, JSON or `serde` structs out
//!
//! ## Example: Rules in Code
//!
//! ```
//! use std::sync::Arc;
//! use recast::{FieldRule, Materializer, RuleRegistry, TypeDescriptor, Value};
//! use serde_json::json;
//!
//! let detail = Arc::new(TypeDescriptor::new("WidgetDetail"));
//! let widget = Arc::new(TypeDescriptor::new("Widget"));
//!
//! let mut registry = RuleRegistry::new();
//! registry.register(FieldRule::exclude("Widget", "model")).unwrap();
//! registry.register(FieldRule::transform("Widget", "detail", &detail)).unwrap();
//!
//! let output = Materializer::new(&registry)
//!     .convert_json(&widget, &json!({
//!         "name": "Doodad",
//!         "model": 1234,
//!         "detail": {"material": "Plastic", "shape": "Square"}
//!     }))
//!     .unwrap();
//!
//! let widget = output.as_instance().unwrap();
//! assert!(!widget.is_set("model"));
//! let detail = widget.get("detail").and_then(Value::as_instance).unwrap();
//! assert_eq!(detail.type_name(), "WidgetDetail");
//! ```
//!
//! ## Example: Schema
//!
//! ```yaml
//! types:
//!   - name: PeardropDto
//!     rules:
//!       id: exclude
//!   - name: CountryDto
//!     extends: PeardropDto
//!   - name: VpnServerDto
//!     extends: PeardropDto
//!     rules:
//!       country: { transform: CountryDto }
//! ```

// Core modules
pub mod descriptor;
pub mod error;
pub mod materializer;
pub mod registry;
pub mod value;

// Declarative schemas and output
pub mod schema;
pub mod serialization;

// Re-export key types
pub use descriptor::{ExtraFields, Instance, TypeCatalog, TypeDescriptor};
pub use error::{RecastError, Result};
pub use materializer::{convert, Materializer};
pub use registry::{FieldRule, ResolutionPolicy, RuleKind, RuleRegistry};
pub use schema::SchemaConfig;
pub use serialization::{JsonArrayWriter, NdjsonWriter};
pub use value::{Fields, Record, RecordId, Value};
