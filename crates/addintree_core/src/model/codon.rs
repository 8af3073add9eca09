//! Codons and extension paths.

use crate::model::condition::Condition;
use indexmap::IndexMap;
use serde::Serialize;

/// Codon name that opens a nested extension path at `<parent>/<id>`.
pub const SUB_CODON_NAME: &str = "Sub";

/// One leaf entry of an extension path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Codon {
    /// Doozer key; the element tag in the descriptor.
    pub name: String,
    /// Codon id, empty when the descriptor omits it.
    pub id: String,
    /// All attributes except `id`, in source order.
    pub attributes: IndexMap<String, String>,
    /// Gate conditions, innermost declaration first.
    pub conditions: Vec<Condition>,
    /// Display name of the contributing add-in, used for diagnostics.
    pub addin_name: String,
}

impl Codon {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            attributes: IndexMap::new(),
            conditions: Vec::new(),
            addin_name: String::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn is_sub(&self) -> bool {
        self.name == SUB_CODON_NAME
    }
}

/// Named, ordered list of codons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtensionPath {
    pub path: String,
    pub codons: Vec<Codon>,
}

impl ExtensionPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            codons: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.codons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codons.is_empty()
    }

    /// First codon with the given id, in merged order.
    pub fn find(&self, id: &str) -> Option<&Codon> {
        self.codons.iter().find(|codon| codon.id == id)
    }

    /// Full path of the nested path opened by `codon`.
    pub fn child_path(&self, codon: &Codon) -> String {
        join_path(&self.path, &codon.id)
    }
}

/// Joins a parent path and a child id with `/`, without normalising either.
///
/// Ids never contain `/`, so the joined path is always longer than its parent.
pub fn join_path(parent: &str, id: &str) -> String {
    format!("{parent}/{id}")
}
