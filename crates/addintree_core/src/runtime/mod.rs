//! Deferred module resolution for doozers and condition evaluators.
//!
//! # Responsibility
//! - Keep `name -> (module, class)` bindings without loading anything.
//! - Load a module and instantiate a class the first time a name is used.
//!
//! # Invariants
//! - Each module reference is loaded at most once per tree.
//! - Each `(module, class)` target is instantiated at most once; failures
//!   are cached too and are never retried.
//! - A name resolves to the target bound in the caller's snapshot, never to
//!   an instance cached for a previous binding.

mod resolver;
mod static_loader;

pub(crate) use resolver::Resolver;
pub use static_loader::{StaticModule, StaticModuleLoader};

use crate::build::{ConditionEvaluator, Doozer};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// Loads external modules by opaque reference.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, module_ref: &str) -> Result<Arc<dyn Module>, ModuleLoadError>;
}

/// A loaded module that can instantiate named classes.
pub trait Module: Send + Sync {
    fn create_doozer(&self, class_name: &str) -> Option<Arc<dyn Doozer>>;
    fn create_condition_evaluator(&self, class_name: &str) -> Option<Arc<dyn ConditionEvaluator>>;
}

/// How the tree reaches one named factory.
pub enum FactoryRef<T: ?Sized> {
    /// Declared by an add-in runtime; resolved on first use.
    Deferred {
        module_ref: String,
        class_name: String,
    },
    /// Registered by the host as a ready instance.
    Live(Arc<T>),
}

impl<T: ?Sized> FactoryRef<T> {
    pub fn deferred(module_ref: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self::Deferred {
            module_ref: module_ref.into(),
            class_name: class_name.into(),
        }
    }

    /// Whether two references bind the same target.
    pub fn same_target(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Deferred {
                    module_ref,
                    class_name,
                },
                Self::Deferred {
                    module_ref: other_module,
                    class_name: other_class,
                },
            ) => module_ref == other_module && class_name == other_class,
            (Self::Live(left), Self::Live(right)) => Arc::ptr_eq(left, right),
            _ => false,
        }
    }
}

impl<T: ?Sized> Clone for FactoryRef<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Deferred {
                module_ref,
                class_name,
            } => Self::Deferred {
                module_ref: module_ref.clone(),
                class_name: class_name.clone(),
            },
            Self::Live(instance) => Self::Live(Arc::clone(instance)),
        }
    }
}

impl<T: ?Sized> Debug for FactoryRef<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deferred {
                module_ref,
                class_name,
            } => f
                .debug_struct("Deferred")
                .field("module_ref", module_ref)
                .field("class_name", class_name)
                .finish(),
            Self::Live(_) => f.write_str("Live"),
        }
    }
}

/// Deferred resolution failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleLoadError {
    /// The tree has no module loader configured.
    NoLoader { module_ref: String },
    ModuleNotFound { module_ref: String },
    LoadFailed { module_ref: String, message: String },
    ClassNotFound {
        module_ref: String,
        class_name: String,
    },
}

impl Display for ModuleLoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoLoader { module_ref } => {
                write!(f, "no module loader configured for module `{module_ref}`")
            }
            Self::ModuleNotFound { module_ref } => write!(f, "module not found: {module_ref}"),
            Self::LoadFailed {
                module_ref,
                message,
            } => write!(f, "failed to load module `{module_ref}`: {message}"),
            Self::ClassNotFound {
                module_ref,
                class_name,
            } => write!(f, "class `{class_name}` not found in module `{module_ref}`"),
        }
    }
}

impl Error for ModuleLoadError {}
