//! Extension-tree engine.
//! Add-in descriptors are parsed, merged into one tree of extension paths,
//! gated by conditions, and built into typed items through named doozers.

pub mod build;
pub mod builtins;
pub mod descriptor;
pub mod logging;
pub mod model;
pub mod runtime;
pub mod tree;

pub use build::{
    BuildDiagnostic, BuildItemArgs, BuiltItem, ConditionEvaluator, Doozer, DoozerError,
    EvaluatorError,
};
pub use builtins::{CompareConditionEvaluator, ContextProperties, COMPARE_EVALUATOR_NAME};
pub use descriptor::{parse_addin, DescriptorError, DescriptorResult, SourcePosition};
pub use logging::{default_log_level, init_logging, logging_status, LogSettings, LoggingError};
pub use model::addin::{AddIn, AddInManifest, AddInReference, Runtime};
pub use model::codon::{Codon, ExtensionPath, SUB_CODON_NAME};
pub use model::condition::{Condition, LeafCondition};
pub use runtime::{
    FactoryRef, Module, ModuleLoadError, ModuleLoader, StaticModule, StaticModuleLoader,
};
pub use tree::{AddInTree, LoadFailure, LoadReport};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
