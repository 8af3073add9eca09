//! Parsed add-in descriptors.
//!
//! # Invariants
//! - An `AddIn` is built once by the descriptor reader and never mutated by
//!   the tree; registration clones codons out of it.
//! - `paths` keeps first-declaration order; re-declaring a path appends to
//!   the existing entry.

use crate::model::codon::ExtensionPath;
use indexmap::IndexMap;
use serde::Serialize;

/// One parsed descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddIn {
    /// Root element attributes, verbatim.
    pub properties: IndexMap<String, String>,
    pub manifest: AddInManifest,
    pub runtimes: Vec<Runtime>,
    pub paths: IndexMap<String, ExtensionPath>,
}

impl AddIn {
    /// Display name from the `name` property, empty when absent.
    pub fn name(&self) -> &str {
        self.properties.get("name").map_or("", String::as_str)
    }

    pub fn path(&self, name: &str) -> Option<&ExtensionPath> {
        self.paths.get(name)
    }
}

/// Imported module and the factory names it provides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Runtime {
    /// Opaque module reference handed to the module loader.
    pub module_ref: String,
    /// Doozer name -> class name, declaration order.
    pub defined_doozers: IndexMap<String, String>,
    /// Condition evaluator name -> class name, declaration order.
    pub defined_condition_evaluators: IndexMap<String, String>,
}

impl Runtime {
    pub fn new(module_ref: impl Into<String>) -> Self {
        Self {
            module_ref: module_ref.into(),
            ..Self::default()
        }
    }
}

/// Identity and dependency declarations of an add-in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddInManifest {
    /// Identity name -> optional version.
    pub identities: IndexMap<String, Option<String>>,
    pub dependencies: Vec<AddInReference>,
}

impl AddInManifest {
    pub fn provides(&self, identity: &str) -> bool {
        self.identities.contains_key(identity)
    }
}

/// Reference to another add-in by identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddInReference {
    pub name: String,
    pub version: Option<String>,
}
