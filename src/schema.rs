//! Declarative schemas: types and their field rules in YAML.
//!
//! A schema replaces per-type registration code with one document:
//!
//! ```yaml
//! policy: strict
//! types:
//!   - name: PeardropDto
//!     fields: [id, created, updated]
//!     rules:
//!       id: exclude
//!       created: exclude
//!       updated: exclude
//!   - name: CountryDto
//!     extends: PeardropDto
//!     fields: [code, name]
//!   - name: VpnServerDto
//!     extends: PeardropDto
//!     fields: [name, ipAddress, port, country]
//!     rules:
//!       country: { transform: CountryDto, nullable: true }
//! ```
//!
//! Types are built parents first (Kahn's algorithm over `extends` links),
//! then every rule is registered against the finished descriptors, so a
//! transform may target any declared type, including its own.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use crate::descriptor::{ExtraFields, TypeCatalog, TypeDescriptor};
use crate::error::{RecastError, Result};
use crate::registry::{FieldRule, ResolutionPolicy, RuleKind, RuleRegistry};

static TYPE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(::[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("valid type name pattern")
});

static FIELD_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\S(.*\S)?$").expect("valid field name pattern"));

/// A schema document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    /// Resolution policy for rules on several types of one chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<ResolutionPolicy>,

    #[serde(default)]
    pub types: Vec<TypeDef>,
}

/// One declared type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeDef {
    pub name: String,

    /// Direct parent type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,

    /// Declared fields; omitted means "accept any field".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,

    #[serde(default)]
    pub extra_fields: ExtraFields,

    /// Field rules declared on this type.
    #[serde(default)]
    pub rules: IndexMap<String, RuleDef>,
}

/// A rule as written in YAML: the bare word `exclude`, or a transform map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleDef {
    Keyword(RuleKeyword),
    Transform(TransformDef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKeyword {
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformDef {
    /// Nested target type.
    #[serde(default)]
    pub transform: Option<String>,

    #[serde(default)]
    pub nullable: bool,
}

impl SchemaConfig {
    /// Parse and validate a schema from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: SchemaConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a schema from a YAML file.
    ///
    /// # Example
    /// ```ignore
    /// use recast::SchemaConfig;
    ///
    /// let schema = SchemaConfig::load_from_file("config/schema.yaml")?;
    /// let (catalog, registry) = schema.build()?;
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::read_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Load and merge every `.yaml`/`.yml` file in a directory.
    ///
    /// Files are read in name order. Any invalid file fails the whole load.
    pub fn load_from_dir<P: AsRef<Path>>(dir_path: P) -> Result<Self> {
        let dir_path = dir_path.as_ref();

        if !dir_path.is_dir() {
            return Err(RecastError::Schema(format!(
                "schema directory does not exist: {}",
                dir_path.display()
            )));
        }

        let read_err = |source| RecastError::Read {
            path: dir_path.to_path_buf(),
            source,
        };

        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(dir_path).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            if path.extension().is_some_and(|ext| ext == "yaml" || ext == "yml") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut merged = SchemaConfig::default();
        for path in &paths {
            // Files may reference each other's types, so only the merged
            // document is validated.
            merged.merge(Self::read_file(path)?)?;
        }
        merged.validate()?;

        debug!(
            dir = %dir_path.display(),
            files = paths.len(),
            types = merged.types.len(),
            "loaded schema directory"
        );
        Ok(merged)
    }

    /// Append the types of `other`. Conflicting policies are an error.
    pub fn merge(&mut self, other: SchemaConfig) -> Result<()> {
        match (self.policy, other.policy) {
            (Some(ours), Some(theirs)) if ours != theirs => {
                return Err(RecastError::Schema(format!(
                    "conflicting resolution policies: {:?} and {:?}",
                    ours, theirs
                )));
            }
            (None, theirs) => self.policy = theirs,
            _ => {}
        }
        self.types.extend(other.types);
        Ok(())
    }

    /// Check names, references and `extends` acyclicity.
    pub fn validate(&self) -> Result<()> {
        for def in &self.types {
            if !TYPE_NAME.is_match(&def.name) {
                return Err(RecastError::Schema(format!("invalid type name '{}'", def.name)));
            }

            let fields = def.fields.iter().flatten().map(String::as_str);
            for field in fields.chain(def.rules.keys().map(String::as_str)) {
                if !FIELD_NAME.is_match(field) {
                    return Err(RecastError::Schema(format!(
                        "invalid field name '{}' on type '{}'",
                        field, def.name
                    )));
                }
            }
        }

        let by_name = self.index_types()?;

        for def in &self.types {
            if let Some(parent) = &def.extends {
                if !by_name.contains_key(parent.as_str()) {
                    return Err(RecastError::UnknownType { name: parent.clone() });
                }
            }

            for (field, rule) in &def.rules {
                match rule {
                    RuleDef::Transform(TransformDef { transform: Some(target), .. }) => {
                        if !by_name.contains_key(target.as_str()) {
                            return Err(RecastError::UnknownType { name: target.clone() });
                        }
                    }
                    RuleDef::Transform(TransformDef { transform: None, .. }) => {
                        warn!(
                            type_name = %def.name,
                            field = %field,
                            "transform rule has no target type"
                        );
                    }
                    RuleDef::Keyword(RuleKeyword::Exclude) => {}
                }
            }
        }

        self.build_order().map(|_| ())
    }

    /// Types ordered so that every parent comes before its children.
    ///
    /// # Algorithm
    /// 1. Each type has in-degree 1 if it extends another type, else 0
    /// 2. Roots are queued in declaration order
    /// 3. Popping a type releases its children
    /// 4. Any type never released sits on an `extends` cycle
    pub fn build_order(&self) -> Result<Vec<&TypeDef>> {
        let by_name = self.index_types()?;

        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();

        for def in &self.types {
            in_degree.insert(def.name.as_str(), usize::from(def.extends.is_some()));
            if let Some(parent) = &def.extends {
                children.entry(parent.as_str()).or_default().push(def.name.as_str());
            }
        }

        let mut queue: VecDeque<&str> = self
            .types
            .iter()
            .filter(|def| def.extends.is_none())
            .map(|def| def.name.as_str())
            .collect();

        let mut sorted = Vec::with_capacity(self.types.len());

        while let Some(name) = queue.pop_front() {
            sorted.push(by_name[name]);

            for child in children.get(name).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*child);
                    }
                }
            }
        }

        if sorted.len() != self.types.len() {
            let unprocessed: Vec<&str> = self
                .types
                .iter()
                .map(|def| def.name.as_str())
                .filter(|name| !sorted.iter().any(|def| def.name == *name))
                .collect();

            return Err(RecastError::Schema(format!(
                "circular 'extends' chain involving types: {}",
                unprocessed.join(", ")
            )));
        }

        Ok(sorted)
    }

    /// Build descriptors and a fresh registry.
    pub fn build(&self) -> Result<(TypeCatalog, RuleRegistry)> {
        let mut registry = RuleRegistry::new();
        let catalog = self.apply(&mut registry)?;
        Ok((catalog, registry))
    }

    /// Build descriptors and register every rule into `registry`.
    ///
    /// Registration is all-or-nothing: on a conflict with a rule already in
    /// `registry`, `registry` is left untouched.
    pub fn apply(&self, registry: &mut RuleRegistry) -> Result<TypeCatalog> {
        let catalog = self.build_catalog()?;

        let mut staged = registry.clone();
        if let Some(policy) = self.policy {
            staged.set_policy(policy);
        }

        for def in &self.types {
            for (field, rule) in &def.rules {
                let rule = match rule {
                    RuleDef::Keyword(RuleKeyword::Exclude) => FieldRule::exclude(&def.name, field),
                    RuleDef::Transform(TransformDef { transform, nullable }) => {
                        let mut rule = FieldRule::new(&def.name, field, RuleKind::Transform);
                        if let Some(target) = transform {
                            rule = rule.with_target(&catalog.resolve(target)?);
                        }
                        if *nullable {
                            rule = rule.nullable();
                        }
                        rule
                    }
                };
                staged.register(rule)?;
            }
        }

        *registry = staged;
        debug!(types = catalog.len(), rules = registry.len(), "applied schema");
        Ok(catalog)
    }

    fn read_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading schema");

        let contents = fs::read_to_string(path).map_err(|source| RecastError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = serde_yaml::from_str(&contents).inspect_err(|e| {
            warn!(path = %path.display(), error = %e, "failed to parse schema file");
        })?;
        Ok(config)
    }

    fn build_catalog(&self) -> Result<TypeCatalog> {
        let mut catalog = TypeCatalog::new();

        for def in self.build_order()? {
            let mut descriptor = TypeDescriptor::new(&def.name);
            if let Some(parent) = &def.extends {
                let parent = catalog.resolve(parent)?;
                descriptor = descriptor.extends(&parent);
            }
            if let Some(fields) = &def.fields {
                descriptor = descriptor.with_fields(fields.iter().cloned());
            }
            descriptor = descriptor.extra_fields(def.extra_fields);

            catalog.insert(Arc::new(descriptor))?;
        }

        Ok(catalog)
    }

    fn index_types(&self) -> Result<HashMap<&str, &TypeDef>> {
        let mut by_name = HashMap::with_capacity(self.types.len());
        for def in &self.types {
            if by_name.insert(def.name.as_str(), def).is_some() {
                return Err(RecastError::Schema(format!(
                    "type '{}' is declared more than once",
                    def.name
                )));
            }
        }
        Ok(by_name)
    }
}
