//! Resolve-and-cache of deferred factories.

use super::{FactoryRef, Module, ModuleLoadError, ModuleLoader};
use crate::build::{ConditionEvaluator, Doozer};
use arc_swap::ArcSwap;
use log::{error, info};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

type Resolved<T> = Result<Arc<T>, ModuleLoadError>;

/// Key -> once-initialized slot.
///
/// Lookups read a published map without locking; inserting a new key copies
/// the map under `insert_lock`. Initializing a slot blocks concurrent callers
/// of the same key only.
struct OnceMap<K, V> {
    slots: ArcSwap<HashMap<K, Arc<OnceCell<V>>>>,
    insert_lock: Mutex<()>,
}

impl<K: Eq + Hash + Clone, V> OnceMap<K, V> {
    fn new() -> Self {
        Self {
            slots: ArcSwap::from_pointee(HashMap::new()),
            insert_lock: Mutex::new(()),
        }
    }

    fn slot(&self, key: &K) -> Arc<OnceCell<V>> {
        if let Some(slot) = self.slots.load().get(key) {
            return Arc::clone(slot);
        }

        let _guard = self.insert_lock.lock();
        let current = self.slots.load_full();
        if let Some(slot) = current.get(key) {
            return Arc::clone(slot);
        }
        let slot = Arc::new(OnceCell::new());
        let mut next = HashMap::clone(&current);
        next.insert(key.clone(), Arc::clone(&slot));
        self.slots.store(Arc::new(next));
        slot
    }
}

/// Binding target of a deferred factory: `(module_ref, class_name)`.
type Target = (String, String);

/// Per-tree resolver state shared by all readers.
pub(crate) struct Resolver {
    loader: Option<Arc<dyn ModuleLoader>>,
    modules: OnceMap<String, Resolved<dyn Module>>,
    doozers: OnceMap<Target, Resolved<dyn Doozer>>,
    condition_evaluators: OnceMap<Target, Resolved<dyn ConditionEvaluator>>,
}

impl Resolver {
    pub(crate) fn new(loader: Option<Arc<dyn ModuleLoader>>) -> Self {
        Self {
            loader,
            modules: OnceMap::new(),
            doozers: OnceMap::new(),
            condition_evaluators: OnceMap::new(),
        }
    }

    pub(crate) fn has_loader(&self) -> bool {
        self.loader.is_some()
    }

    pub(crate) fn doozer(
        &self,
        name: &str,
        factory: &FactoryRef<dyn Doozer>,
    ) -> Resolved<dyn Doozer> {
        self.resolve(&self.doozers, "doozer", name, factory, |module, class| {
            module.create_doozer(class)
        })
    }

    pub(crate) fn condition_evaluator(
        &self,
        name: &str,
        factory: &FactoryRef<dyn ConditionEvaluator>,
    ) -> Resolved<dyn ConditionEvaluator> {
        self.resolve(
            &self.condition_evaluators,
            "condition_evaluator",
            name,
            factory,
            |module, class| module.create_condition_evaluator(class),
        )
    }

    fn resolve<T: ?Sized>(
        &self,
        cache: &OnceMap<Target, Resolved<T>>,
        kind: &'static str,
        name: &str,
        factory: &FactoryRef<T>,
        create: impl FnOnce(&dyn Module, &str) -> Option<Arc<T>>,
    ) -> Resolved<T> {
        let (module_ref, class_name) = match factory {
            FactoryRef::Live(instance) => return Ok(Arc::clone(instance)),
            FactoryRef::Deferred {
                module_ref,
                class_name,
            } => (module_ref.as_str(), class_name.as_str()),
        };

        // One slot per target; the name only selects which target is bound.
        cache
            .slot(&(module_ref.to_string(), class_name.to_string()))
            .get_or_init(|| {
                let resolved = self.module(module_ref).and_then(|module| {
                    let created =
                        catch_unwind(AssertUnwindSafe(|| create(module.as_ref(), class_name)))
                            .unwrap_or(None);
                    created.ok_or_else(|| ModuleLoadError::ClassNotFound {
                        module_ref: module_ref.to_string(),
                        class_name: class_name.to_string(),
                    })
                });
                match &resolved {
                    Ok(_) => info!(
                        "event=factory_resolve module=runtime status=ok kind={} name={} module_ref={} class={}",
                        kind, name, module_ref, class_name
                    ),
                    Err(err) => error!(
                        "event=factory_resolve module=runtime status=error kind={} name={} error={}",
                        kind, name, err
                    ),
                }
                resolved
            })
            .clone()
    }

    fn module(&self, module_ref: &str) -> Resolved<dyn Module> {
        self.modules
            .slot(&module_ref.to_string())
            .get_or_init(|| {
                let Some(loader) = self.loader.as_ref() else {
                    return Err(ModuleLoadError::NoLoader {
                        module_ref: module_ref.to_string(),
                    });
                };
                let loaded = catch_unwind(AssertUnwindSafe(|| loader.load(module_ref)))
                    .unwrap_or_else(|_| {
                        Err(ModuleLoadError::LoadFailed {
                            module_ref: module_ref.to_string(),
                            message: "module loader panicked".to_string(),
                        })
                    });
                match &loaded {
                    Ok(_) => info!(
                        "event=module_load module=runtime status=ok module_ref={}",
                        module_ref
                    ),
                    Err(err) => error!(
                        "event=module_load module=runtime status=error module_ref={} error={}",
                        module_ref, err
                    ),
                }
                loaded
            })
            .clone()
    }
}
