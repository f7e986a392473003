//! Field rule registry.
//!
//! Rules are keyed by the name of the type that declares them and the field
//! they apply to. A rule declared on an ancestor applies to every descendant,
//! because lookups search a descriptor's whole type chain.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use tracing::debug;

use crate::descriptor::TypeDescriptor;
use crate::error::{RecastError, Result};

/// What a rule does with its field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Leave the field unset on the output.
    Exclude,
    /// Materialize the field (or each element of it) as a nested type.
    Transform,
}

/// A behavior bound to one field of one declaring type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    declaring_type: String,
    field: String,
    kind: RuleKind,
    target: Option<Arc<TypeDescriptor>>,
    nullable: bool,
}

impl FieldRule {
    pub fn new(
        declaring_type: impl Into<String>,
        field: impl Into<String>,
        kind: RuleKind,
    ) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            field: field.into(),
            kind,
            target: None,
            nullable: false,
        }
    }

    pub fn exclude(declaring_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(declaring_type, field, RuleKind::Exclude)
    }

    pub fn transform(
        declaring_type: impl Into<String>,
        field: impl Into<String>,
        target: &Arc<TypeDescriptor>,
    ) -> Self {
        Self::new(declaring_type, field, RuleKind::Transform).with_target(target)
    }

    pub fn with_target(mut self, target: &Arc<TypeDescriptor>) -> Self {
        self.target = Some(Arc::clone(target));
        self
    }

    /// Let an explicit `null` through instead of materializing it.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn target(&self) -> Option<&Arc<TypeDescriptor>> {
        self.target.as_ref()
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}

/// How a lookup treats a field ruled on more than one type of a chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Fail with [`RecastError::AmbiguousRule`].
    #[default]
    Strict,
    /// Use the rule of the most-derived type.
    MostDerived,
}

/// Store of field rules: declaring type -> field -> rule.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: HashMap<String, HashMap<String, FieldRule>>,
    policy: ResolutionPolicy,
}

impl RuleRegistry {
    /// Create a new empty registry with the strict policy.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: ResolutionPolicy) -> Self {
        Self {
            rules: HashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> ResolutionPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: ResolutionPolicy) {
        self.policy = policy;
    }

    /// Register a rule.
    ///
    /// A field carries at most one rule per declaring type, whatever the
    /// kinds involved; a second registration fails with
    /// [`RecastError::Conflict`] and leaves the registry unchanged.
    pub fn register(&mut self, rule: FieldRule) -> Result<()> {
        let fields = self.rules.entry(rule.declaring_type.clone()).or_default();

        if fields.contains_key(&rule.field) {
            return Err(RecastError::Conflict {
                type_name: rule.declaring_type,
                field: rule.field,
            });
        }

        debug!(
            declaring_type = %rule.declaring_type,
            field = %rule.field,
            kind = ?rule.kind,
            nested_type = rule.target.as_ref().map(|t| t.name()),
            nullable = rule.nullable,
            "registered field rule"
        );
        fields.insert(rule.field.clone(), rule);
        Ok(())
    }

    /// Find the rule for `field` among `declaring_types` (most-derived first).
    ///
    /// # Returns
    ///
    /// * `Ok(Some(rule))` - exactly one type rules the field, or the policy
    ///   picked the most-derived one
    /// * `Ok(None)` - no type in the list rules the field
    /// * `Err(AmbiguousRule)` - several types rule it under the strict policy
    pub fn lookup<S: AsRef<str>>(
        &self,
        declaring_types: &[S],
        field: &str,
    ) -> Result<Option<&FieldRule>> {
        let mut matches = declaring_types
            .iter()
            .filter_map(|type_name| self.rules.get(type_name.as_ref())?.get(field));

        let Some(first) = matches.next() else {
            return Ok(None);
        };

        if self.policy == ResolutionPolicy::Strict {
            let rest: Vec<&FieldRule> = matches.collect();
            if !rest.is_empty() {
                let types = std::iter::once(first)
                    .chain(rest)
                    .map(|rule| rule.declaring_type.clone())
                    .collect();
                return Err(RecastError::AmbiguousRule {
                    field: field.to_string(),
                    types,
                });
            }
        }

        Ok(Some(first))
    }

    /// The names in `chain` that declare at least one rule, in chain order.
    pub fn declaring_types_for<'a>(&self, chain: &'a [String]) -> Vec<&'a str> {
        chain
            .iter()
            .filter(|name| self.rules.get(name.as_str()).is_some_and(|fields| !fields.is_empty()))
            .map(String::as_str)
            .collect()
    }

    pub fn has_rule(&self, declaring_type: &str, field: &str) -> bool {
        self.rules
            .get(declaring_type)
            .is_some_and(|fields| fields.contains_key(field))
    }

    pub fn get(&self, declaring_type: &str, field: &str) -> Option<&FieldRule> {
        self.rules.get(declaring_type)?.get(field)
    }

    /// Rules declared directly on `declaring_type`.
    pub fn rules_for(&self, declaring_type: &str) -> impl Iterator<Item = &FieldRule> {
        self.rules
            .get(declaring_type)
            .into_iter()
            .flat_map(|fields| fields.values())
    }

    /// Names of all types that declare at least one rule.
    pub fn declaring_types(&self) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|(_, fields)| !fields.is_empty())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Total number of rules.
    pub fn len(&self) -> usize {
        self.rules.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every rule. The resolution policy is kept.
    pub fn reset(&mut self) {
        debug!(rules = self.len(), "resetting rule registry");
        self.rules.clear();
    }
}

static GLOBAL: LazyLock<RwLock<RuleRegistry>> = LazyLock::new(|| RwLock::new(RuleRegistry::new()));

/// The process-wide registry.
///
/// Registration takes the write lock and conversions through
/// [`crate::convert`] hold the read lock for the whole call, so the two
/// never interleave.
pub fn global() -> &'static RwLock<RuleRegistry> {
    &GLOBAL
}

/// Register a rule on the process-wide registry.
pub fn register(rule: FieldRule) -> Result<()> {
    GLOBAL
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register(rule)
}

/// Clear the process-wide registry.
pub fn reset() {
    GLOBAL.write().unwrap_or_else(PoisonError::into_inner).reset();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail() -> Arc<TypeDescriptor> {
        Arc::new(TypeDescriptor::new("WidgetDetail").with_fields(["material", "shape"]))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = RuleRegistry::new();
        registry.register(FieldRule::exclude("Widget", "model")).unwrap();
        registry
            .register(FieldRule::transform("Widget", "detail", &detail()).nullable())
            .unwrap();

        let rule = registry.lookup(&["Widget"], "detail").unwrap().unwrap();
        assert_eq!(rule.kind(), RuleKind::Transform);
        assert_eq!(rule.target().map(|t| t.name()), Some("WidgetDetail"));
        assert!(rule.is_nullable());

        assert!(registry.lookup(&["Widget"], "name").unwrap().is_none());
        assert!(registry.lookup(&["Gadget"], "model").unwrap().is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_registration_conflicts_for_every_kind_pair() {
        let kinds = [
            (FieldRule::exclude("Widget", "detail"), FieldRule::exclude("Widget", "detail")),
            (
                FieldRule::exclude("Widget", "detail"),
                FieldRule::transform("Widget", "detail", &detail()),
            ),
            (
                FieldRule::transform("Widget", "detail", &detail()),
                FieldRule::exclude("Widget", "detail"),
            ),
            (
                FieldRule::transform("Widget", "detail", &detail()),
                FieldRule::transform("Widget", "detail", &detail()).nullable(),
            ),
        ];

        for (first, second) in kinds {
            let mut registry = RuleRegistry::new();
            registry.register(first.clone()).unwrap();

            let result = registry.register(second);
            assert!(matches!(
                result,
                Err(RecastError::Conflict { ref type_name, ref field })
                    if type_name == "Widget" && field == "detail"
            ));
            // The original rule survives.
            assert_eq!(registry.get("Widget", "detail"), Some(&first));
            assert_eq!(registry.len(), 1);
        }
    }

    #[test]
    fn test_same_field_on_different_types_is_not_a_conflict() {
        let mut registry = RuleRegistry::new();
        registry.register(FieldRule::exclude("Widget", "id")).unwrap();
        registry.register(FieldRule::exclude("Gadget", "id")).unwrap();

        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_strict_lookup_rejects_ambiguous_chain() {
        let mut registry = RuleRegistry::new();
        registry.register(FieldRule::exclude("BaseWidget", "id")).unwrap();
        registry.register(FieldRule::exclude("Widget", "id")).unwrap();

        let result = registry.lookup(&["Widget", "BaseWidget", "CoreWidget"], "id");
        match result {
            Err(RecastError::AmbiguousRule { field, types }) => {
                assert_eq!(field, "id");
                assert_eq!(types, vec!["Widget", "BaseWidget"]);
            }
            other => panic!("expected AmbiguousRule, got {:?}", other),
        }
    }

    #[test]
    fn test_most_derived_lookup_picks_first_match() {
        let mut registry = RuleRegistry::with_policy(ResolutionPolicy::MostDerived);
        registry.register(FieldRule::exclude("BaseWidget", "id")).unwrap();
        registry
            .register(FieldRule::transform("Widget", "id", &detail()))
            .unwrap();

        let rule = registry
            .lookup(&["Widget", "BaseWidget"], "id")
            .unwrap()
            .unwrap();
        assert_eq!(rule.declaring_type(), "Widget");
        assert_eq!(rule.kind(), RuleKind::Transform);
    }

    #[test]
    fn test_declaring_types_for_keeps_chain_order() {
        let mut registry = RuleRegistry::new();
        registry.register(FieldRule::exclude("CoreWidget", "test")).unwrap();
        registry.register(FieldRule::exclude("Widget", "model")).unwrap();

        let chain = vec![
            "Widget".to_string(),
            "BaseWidget".to_string(),
            "CoreWidget".to_string(),
        ];
        assert_eq!(registry.declaring_types_for(&chain), vec!["Widget", "CoreWidget"]);

        let unrelated = vec!["Gadget".to_string()];
        assert!(registry.declaring_types_for(&unrelated).is_empty());
    }

    #[test]
    fn test_reset_clears_rules_but_keeps_policy() {
        let mut registry = RuleRegistry::with_policy(ResolutionPolicy::MostDerived);
        registry.register(FieldRule::exclude("Widget", "model")).unwrap();
        registry.reset();

        assert!(registry.is_empty());
        assert!(!registry.has_rule("Widget", "model"));
        assert!(registry.declaring_types().is_empty());
        assert_eq!(registry.policy(), ResolutionPolicy::MostDerived);

        // The same pair can be registered again after a reset.
        registry.register(FieldRule::exclude("Widget", "model")).unwrap();
    }

    #[test]
    fn test_rules_for_lists_direct_rules_only() {
        let mut registry = RuleRegistry::new();
        registry.register(FieldRule::exclude("Widget", "a")).unwrap();
        registry.register(FieldRule::exclude("Widget", "b")).unwrap();
        registry.register(FieldRule::exclude("BaseWidget", "c")).unwrap();

        let mut fields: Vec<&str> = registry.rules_for("Widget").map(FieldRule::field).collect();
        fields.sort_unstable();
        assert_eq!(fields, vec!["a", "b"]);
        assert_eq!(registry.rules_for("Nothing").count(), 0);
    }
}
