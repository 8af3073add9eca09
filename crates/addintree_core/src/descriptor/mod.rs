//! Add-in descriptor parsing.
//!
//! # Responsibility
//! - Turn one XML descriptor into an immutable `AddIn` value.
//! - Report malformed structure with source positions.
//!
//! # Invariants
//! - Parsing never mutates the extension tree.
//! - A failure affects only the descriptor being parsed.

mod reader;

use crate::model::addin::AddIn;
use crate::tree::{AddInTree, DOOZER_COLLISION_EVENT, EVALUATOR_COLLISION_EVENT};
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub type DescriptorResult<T> = Result<T, DescriptorError>;

/// 1-based line/column inside a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
}

impl Display for SourcePosition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Descriptor parse errors.
#[derive(Debug)]
pub enum DescriptorError {
    /// Descriptor file could not be read.
    Io { path: PathBuf, source: std::io::Error },
    /// Text is not well-formed XML.
    Xml(roxmltree::Error),
    /// Root element is not `<AddIn>`.
    UnexpectedRoot { found: String },
    /// Required attribute is absent or blank.
    MissingAttribute {
        element: String,
        attribute: &'static str,
        position: SourcePosition,
    },
    /// Element is not allowed under its parent.
    UnexpectedElement {
        element: String,
        parent: String,
        position: SourcePosition,
    },
    /// Boolean combinator with the wrong number of operands.
    InvalidExpression {
        element: String,
        reason: &'static str,
        position: SourcePosition,
    },
    /// Codon id is not a single path segment.
    InvalidId {
        element: String,
        id: String,
        position: SourcePosition,
    },
}

impl Display for DescriptorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read descriptor `{}`: {source}", path.display())
            }
            Self::Xml(err) => write!(f, "descriptor is not well-formed: {err}"),
            Self::UnexpectedRoot { found } => {
                write!(f, "descriptor root must be <AddIn>, found <{found}>")
            }
            Self::MissingAttribute {
                element,
                attribute,
                position,
            } => write!(
                f,
                "<{element}> at {position} is missing required attribute `{attribute}`"
            ),
            Self::UnexpectedElement {
                element,
                parent,
                position,
            } => write!(f, "<{element}> at {position} is not allowed inside <{parent}>"),
            Self::InvalidExpression {
                element,
                reason,
                position,
            } => write!(f, "<{element}> at {position}: {reason}"),
            Self::InvalidId {
                element,
                id,
                position,
            } => write!(f, "<{element}> at {position}: id `{id}` must not contain `/`"),
        }
    }
}

impl Error for DescriptorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Xml(err) => Some(err),
            _ => None,
        }
    }
}

impl From<roxmltree::Error> for DescriptorError {
    fn from(value: roxmltree::Error) -> Self {
        Self::Xml(value)
    }
}

/// Parses one descriptor without consulting any tree.
pub fn parse_addin(text: &str) -> DescriptorResult<AddIn> {
    reader::read_addin(text)
}

impl AddIn {
    /// Parses one descriptor destined for `tree`.
    ///
    /// The tree is only read: names this add-in would redefine are reported
    /// so collisions show up in the log before registration.
    pub fn load(tree: &AddInTree, text: &str) -> DescriptorResult<AddIn> {
        let addin = match parse_addin(text) {
            Ok(addin) => addin,
            Err(err) => {
                warn!(
                    "event=addin_parse module=descriptor status=error error={}",
                    err
                );
                return Err(err);
            }
        };

        for runtime in &addin.runtimes {
            for name in runtime.defined_doozers.keys() {
                if tree.has_doozer(name) {
                    debug!(
                        "event={} module=descriptor status=pending addin={} doozer={}",
                        DOOZER_COLLISION_EVENT,
                        addin.name(),
                        name
                    );
                }
            }
            for name in runtime.defined_condition_evaluators.keys() {
                if tree.has_condition_evaluator(name) {
                    debug!(
                        "event={} module=descriptor status=pending addin={} evaluator={}",
                        EVALUATOR_COLLISION_EVENT,
                        addin.name(),
                        name
                    );
                }
            }
        }

        info!(
            "event=addin_parse module=descriptor status=ok addin={} runtimes={} paths={}",
            addin.name(),
            addin.runtimes.len(),
            addin.paths.len()
        );
        Ok(addin)
    }

    /// Reads and parses one descriptor file.
    pub fn load_file(tree: &AddInTree, path: impl AsRef<Path>) -> DescriptorResult<AddIn> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DescriptorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load(tree, &text)
    }
}
