//! Merged extension tree.
//!
//! # Responsibility
//! - Merge parsed add-ins into one path -> codon-list map.
//! - Keep the name -> factory bindings for doozers and condition evaluators.
//!
//! # Invariants
//! - Codon order of a merged path is registration order, then source order.
//! - Readers load a published snapshot and never take a lock; writers
//!   serialize on `write_lock` and publish a fully merged copy.
//! - A later binding of a doozer/evaluator name replaces the earlier one.

mod load;

pub use load::{LoadFailure, LoadReport};

use crate::build::{ConditionEvaluator, Doozer};
use crate::model::addin::AddIn;
use crate::model::codon::ExtensionPath;
use crate::runtime::{FactoryRef, ModuleLoader, Resolver};
use arc_swap::ArcSwap;
use log::{info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Log event for a doozer name bound twice.
pub(crate) const DOOZER_COLLISION_EVENT: &str = "doozer_collision";
/// Log event for a condition evaluator name bound twice.
pub(crate) const EVALUATOR_COLLISION_EVENT: &str = "evaluator_collision";

/// Immutable view published after each write.
#[derive(Clone, Default)]
pub(crate) struct TreeSnapshot {
    pub(crate) paths: HashMap<String, Arc<ExtensionPath>>,
    pub(crate) doozers: HashMap<String, FactoryRef<dyn Doozer>>,
    pub(crate) condition_evaluators: HashMap<String, FactoryRef<dyn ConditionEvaluator>>,
    pub(crate) addins: Vec<Arc<AddIn>>,
}

/// Registry of extension paths and named factories.
pub struct AddInTree {
    snapshot: ArcSwap<TreeSnapshot>,
    write_lock: Mutex<()>,
    pub(crate) resolver: Resolver,
}

impl Default for AddInTree {
    fn default() -> Self {
        Self::new()
    }
}

impl AddInTree {
    /// Creates an empty tree without a module loader.
    ///
    /// Deferred runtime declarations then fail to resolve; only factories
    /// registered as live instances are usable.
    pub fn new() -> Self {
        Self::with_resolver(Resolver::new(None))
    }

    /// Creates an empty tree that resolves runtime declarations through `loader`.
    pub fn with_loader(loader: Arc<dyn ModuleLoader>) -> Self {
        Self::with_resolver(Resolver::new(Some(loader)))
    }

    fn with_resolver(resolver: Resolver) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(TreeSnapshot::default()),
            write_lock: Mutex::new(()),
            resolver,
        }
    }

    pub(crate) fn load_snapshot(&self) -> Arc<TreeSnapshot> {
        self.snapshot.load_full()
    }

    /// Merges one parsed add-in into the tree.
    pub fn register(&self, addin: AddIn) {
        let addin = Arc::new(addin);
        {
            let _guard = self.write_lock.lock();
            let mut next = TreeSnapshot::clone(&self.snapshot.load());

            for (name, path) in &addin.paths {
                let merged = next
                    .paths
                    .entry(name.clone())
                    .or_insert_with(|| Arc::new(ExtensionPath::new(name.as_str())));
                Arc::make_mut(merged)
                    .codons
                    .extend(path.codons.iter().cloned());
            }

            for runtime in &addin.runtimes {
                for (name, class_name) in &runtime.defined_doozers {
                    let factory = FactoryRef::deferred(&runtime.module_ref, class_name);
                    bind(&mut next.doozers, name, factory, DOOZER_COLLISION_EVENT, addin.name());
                }
                for (name, class_name) in &runtime.defined_condition_evaluators {
                    let factory = FactoryRef::deferred(&runtime.module_ref, class_name);
                    bind(
                        &mut next.condition_evaluators,
                        name,
                        factory,
                        EVALUATOR_COLLISION_EVENT,
                        addin.name(),
                    );
                }
            }

            next.addins.push(Arc::clone(&addin));
            self.snapshot.store(Arc::new(next));
        }

        info!(
            "event=addin_register module=tree status=ok addin={} paths={} runtimes={}",
            addin.name(),
            addin.paths.len(),
            addin.runtimes.len()
        );
    }

    /// Binds a ready doozer instance under `name`.
    pub fn register_doozer(&self, name: impl Into<String>, doozer: Arc<dyn Doozer>) {
        let name = name.into();
        let _guard = self.write_lock.lock();
        let mut next = TreeSnapshot::clone(&self.snapshot.load());
        bind(
            &mut next.doozers,
            &name,
            FactoryRef::Live(doozer),
            DOOZER_COLLISION_EVENT,
            "host",
        );
        self.snapshot.store(Arc::new(next));
    }

    /// Binds a ready condition evaluator instance under `name`.
    pub fn register_condition_evaluator(
        &self,
        name: impl Into<String>,
        evaluator: Arc<dyn ConditionEvaluator>,
    ) {
        let name = name.into();
        let _guard = self.write_lock.lock();
        let mut next = TreeSnapshot::clone(&self.snapshot.load());
        bind(
            &mut next.condition_evaluators,
            &name,
            FactoryRef::Live(evaluator),
            EVALUATOR_COLLISION_EVENT,
            "host",
        );
        self.snapshot.store(Arc::new(next));
    }

    /// Merged view of one path; unknown paths are empty.
    pub fn get_path(&self, name: &str) -> Arc<ExtensionPath> {
        self.load_snapshot()
            .paths
            .get(name)
            .cloned()
            .unwrap_or_else(|| Arc::new(ExtensionPath::new(name)))
    }

    pub fn contains_path(&self, name: &str) -> bool {
        self.load_snapshot().paths.contains_key(name)
    }

    /// Sorted names of every path with at least one contributor.
    pub fn path_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.load_snapshot().paths.keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered add-ins in registration order.
    pub fn addins(&self) -> Vec<Arc<AddIn>> {
        self.load_snapshot().addins.clone()
    }

    pub fn has_doozer(&self, name: &str) -> bool {
        self.load_snapshot().doozers.contains_key(name)
    }

    pub fn has_condition_evaluator(&self, name: &str) -> bool {
        self.load_snapshot().condition_evaluators.contains_key(name)
    }
}

impl Debug for AddInTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.load_snapshot();
        f.debug_struct("AddInTree")
            .field("addins", &snapshot.addins.len())
            .field("paths", &snapshot.paths.len())
            .field("doozers", &snapshot.doozers.len())
            .field("condition_evaluators", &snapshot.condition_evaluators.len())
            .field("has_loader", &self.resolver.has_loader())
            .finish()
    }
}

/// Inserts `factory` under `name`, logging when a different binding is replaced.
fn bind<T: ?Sized>(
    bindings: &mut HashMap<String, FactoryRef<T>>,
    name: &str,
    factory: FactoryRef<T>,
    event: &'static str,
    addin: &str,
) {
    if let Some(previous) = bindings.insert(name.to_string(), factory) {
        if !previous.same_target(&bindings[name]) {
            warn!(
                "event={} module=tree status=replaced name={} addin={} previous={:?}",
                event, name, addin, previous
            );
        }
    }
}
