//! Item building over merged extension paths.
//!
//! # Responsibility
//! - Define the host-facing factory (`Doozer`) and predicate
//!   (`ConditionEvaluator`) contracts.
//! - Turn the codons of one path into typed items for a caller context.
//!
//! # Invariants
//! - Every call re-evaluates conditions; built items are never cached.
//! - One failing codon never aborts the rest of the path.
//! - A path is never built again while it is being built on the same thread.

mod builder;

use crate::model::codon::{join_path, Codon};
use crate::model::condition::LeafCondition;
use crate::tree::AddInTree;
use std::any::Any;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Type-erased item produced by a doozer.
pub type BuiltItem = Box<dyn Any + Send>;

/// Named factory turning one codon into an item.
pub trait Doozer: Send + Sync {
    /// Builds the item for `args.codon()`.
    ///
    /// `Ok(None)` omits the item without reporting an error.
    fn build_item(&self, args: BuildItemArgs<'_>) -> Result<Option<BuiltItem>, DoozerError>;
}

/// Named predicate over the caller context.
pub trait ConditionEvaluator: Send + Sync {
    fn is_valid(&self, caller: &dyn Any, condition: &LeafCondition) -> Result<bool, EvaluatorError>;
}

/// Inputs for one `Doozer::build_item` call.
pub struct BuildItemArgs<'a> {
    pub(crate) tree: &'a AddInTree,
    pub(crate) path: &'a str,
    pub(crate) codon: &'a Codon,
    pub(crate) caller: &'a dyn Any,
    pub(crate) sub_items: Vec<BuiltItem>,
}

impl<'a> BuildItemArgs<'a> {
    pub fn codon(&self) -> &'a Codon {
        self.codon
    }

    pub fn caller(&self) -> &'a dyn Any {
        self.caller
    }

    /// Tree the item is being built from, for doozers that build other paths.
    pub fn tree(&self) -> &'a AddInTree {
        self.tree
    }

    /// Path the codon was read from.
    pub fn path(&self) -> &'a str {
        self.path
    }

    /// Path opened by this codon (`<path>/<id>`).
    pub fn sub_path(&self) -> String {
        join_path(self.path, &self.codon.id)
    }

    /// Items pre-built for a `Sub` codon; empty for every other codon.
    pub fn sub_items(&self) -> &[BuiltItem] {
        &self.sub_items
    }

    pub fn into_sub_items(self) -> Vec<BuiltItem> {
        self.sub_items
    }

    /// Builds the nested path of a non-`Sub` codon on demand.
    pub fn build_sub_items<T: Any>(&self) -> Vec<T> {
        self.tree.build_items(&self.sub_path(), self.caller)
    }
}

/// Failure reported by a condition evaluator; the condition counts as false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatorError {
    message: String,
}

impl EvaluatorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for EvaluatorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for EvaluatorError {}

/// Failure reported by a doozer; only the affected item is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoozerError {
    message: String,
}

impl DoozerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for DoozerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for DoozerError {}

/// Per-codon build diagnostics, logged and never propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildDiagnostic {
    /// No doozer registered under the codon name, or it failed to resolve.
    UnknownFactory { name: String, reason: String },
    /// Doozer returned an error or panicked.
    FactoryBuild { message: String },
    /// Item is not of the requested type.
    TypeMismatch { expected: &'static str },
    /// Evaluator is missing, failed, or panicked.
    Evaluator { name: String, reason: String },
}

impl Display for BuildDiagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownFactory { name, reason } => {
                write!(f, "doozer `{name}` is unavailable: {reason}")
            }
            Self::FactoryBuild { message } => write!(f, "doozer failed: {message}"),
            Self::TypeMismatch { expected } => write!(f, "built item is not a `{expected}`"),
            Self::Evaluator { name, reason } => {
                write!(f, "condition evaluator `{name}` failed: {reason}")
            }
        }
    }
}
