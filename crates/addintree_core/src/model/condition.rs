//! Condition model for codon gating.
//!
//! # Responsibility
//! - Represent the boolean gate attached to one codon as a closed tree.
//! - Evaluate that tree through a caller-supplied leaf evaluator.
//!
//! # Invariants
//! - A `ComplexCondition` block is always exactly one `Condition` value.
//! - `And` stops at the first false operand, `Or` at the first true one.

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt::{Display, Formatter};

/// Named, parameterized leaf condition (`<Condition name=".." ...>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeafCondition {
    /// Evaluator name used for registry lookup.
    pub name: String,
    /// Every attribute except `name`, in source order.
    pub attributes: IndexMap<String, String>,
}

impl LeafCondition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: IndexMap::new(),
        }
    }

    /// Builder-style attribute insert, mostly for hosts and tests.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Boolean expression over leaf conditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    Leaf(LeafCondition),
    And { children: Vec<Condition> },
    Or { children: Vec<Condition> },
    Not { child: Box<Condition> },
}

impl Condition {
    /// Leaf evaluator name, `None` for combinators.
    pub fn name(&self) -> Option<&str> {
        self.as_leaf().map(|leaf| leaf.name.as_str())
    }

    pub fn as_leaf(&self) -> Option<&LeafCondition> {
        match self {
            Self::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    /// Evaluates the tree, delegating every leaf to `leaf_eval`.
    ///
    /// An empty `And` holds and an empty `Or` does not; the parser never
    /// produces either, but hosts may build conditions by hand.
    pub fn evaluate(&self, leaf_eval: &mut dyn FnMut(&LeafCondition) -> bool) -> bool {
        match self {
            Self::Leaf(leaf) => leaf_eval(leaf),
            Self::And { children } => {
                for child in children {
                    if !child.evaluate(leaf_eval) {
                        return false;
                    }
                }
                true
            }
            Self::Or { children } => {
                for child in children {
                    if child.evaluate(leaf_eval) {
                        return true;
                    }
                }
                false
            }
            Self::Not { child } => !child.evaluate(leaf_eval),
        }
    }

    /// Evaluates a codon's condition list as a logical AND.
    pub fn all_hold(
        conditions: &[Condition],
        leaf_eval: &mut dyn FnMut(&LeafCondition) -> bool,
    ) -> bool {
        conditions
            .iter()
            .all(|condition| condition.evaluate(&mut *leaf_eval))
    }
}

impl Display for Condition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Leaf(leaf) => {
                write!(f, "{}", leaf.name)?;
                if !leaf.attributes.is_empty() {
                    let params: Vec<String> = leaf
                        .attributes
                        .iter()
                        .map(|(key, value)| format!("{key}={value}"))
                        .collect();
                    write!(f, "({})", params.join(", "))?;
                }
                Ok(())
            }
            Self::And { children } => write_joined(f, children, " and "),
            Self::Or { children } => write_joined(f, children, " or "),
            Self::Not { child } => write!(f, "not {child}"),
        }
    }
}

fn write_joined(
    f: &mut Formatter<'_>,
    children: &[Condition],
    separator: &str,
) -> std::fmt::Result {
    write!(f, "(")?;
    for (index, child) in children.iter().enumerate() {
        if index > 0 {
            write!(f, "{separator}")?;
        }
        write!(f, "{child}")?;
    }
    write!(f, ")")
}
