//! Built-in condition evaluators.
//!
//! # Responsibility
//! - Provide the generic `Compare` evaluator every host can rely on.
//! - Define `ContextProperties`, the property bag `${key}` references read.

use crate::build::{ConditionEvaluator, EvaluatorError};
use crate::model::condition::LeafCondition;
use crate::tree::AddInTree;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registry name of [`CompareConditionEvaluator`].
pub const COMPARE_EVALUATOR_NAME: &str = "Compare";

static PROPERTY_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]*)\}").expect("valid property reference regex"));

/// Caller context carrying string properties for `${key}` expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextProperties {
    values: BTreeMap<String, String>,
}

impl ContextProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Replaces `${key}` with the caller's property; unknown keys and non-property
/// callers expand to the empty string.
pub fn expand_properties(value: &str, caller: &dyn Any) -> String {
    let properties = caller.downcast_ref::<ContextProperties>();
    PROPERTY_REF_RE
        .replace_all(value, |captures: &Captures<'_>| {
            properties
                .and_then(|properties| properties.get(captures[1].trim()))
                .unwrap_or_default()
                .to_string()
        })
        .into_owned()
}

/// `<Condition name="Compare" string=".." equals=".." comparisonType="..">`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompareConditionEvaluator;

impl ConditionEvaluator for CompareConditionEvaluator {
    fn is_valid(
        &self,
        caller: &dyn Any,
        condition: &LeafCondition,
    ) -> Result<bool, EvaluatorError> {
        let left = condition
            .get("string")
            .ok_or_else(|| EvaluatorError::new("Compare requires a `string` attribute"))?;
        let right = condition
            .get("equals")
            .ok_or_else(|| EvaluatorError::new("Compare requires an `equals` attribute"))?;

        let left = expand_properties(left, caller);
        let right = expand_properties(right, caller);
        let ignore_case = condition
            .get("comparisonType")
            .is_some_and(|kind| kind.to_ascii_lowercase().contains("ignorecase"));

        Ok(if ignore_case {
            left.to_lowercase() == right.to_lowercase()
        } else {
            left == right
        })
    }
}

impl AddInTree {
    /// Registers the built-in evaluators under their well-known names.
    pub fn register_builtins(&self) {
        self.register_condition_evaluator(
            COMPARE_EVALUATOR_NAME,
            Arc::new(CompareConditionEvaluator),
        );
    }
}
