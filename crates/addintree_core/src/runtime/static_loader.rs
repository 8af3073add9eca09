//! In-process module table for statically linked add-ins.

use super::{Module, ModuleLoadError, ModuleLoader};
use crate::build::{ConditionEvaluator, Doozer};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

type DoozerConstructor = Box<dyn Fn() -> Arc<dyn Doozer> + Send + Sync>;
type EvaluatorConstructor = Box<dyn Fn() -> Arc<dyn ConditionEvaluator> + Send + Sync>;

/// Class table of one module.
#[derive(Default)]
pub struct StaticModule {
    doozers: HashMap<String, DoozerConstructor>,
    condition_evaluators: HashMap<String, EvaluatorConstructor>,
}

impl StaticModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_doozer<F, D>(mut self, class_name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> D + Send + Sync + 'static,
        D: Doozer + 'static,
    {
        self.doozers.insert(
            class_name.into(),
            Box::new(move || Arc::new(constructor()) as Arc<dyn Doozer>),
        );
        self
    }

    pub fn with_condition_evaluator<F, E>(
        mut self,
        class_name: impl Into<String>,
        constructor: F,
    ) -> Self
    where
        F: Fn() -> E + Send + Sync + 'static,
        E: ConditionEvaluator + 'static,
    {
        self.condition_evaluators.insert(
            class_name.into(),
            Box::new(move || Arc::new(constructor()) as Arc<dyn ConditionEvaluator>),
        );
        self
    }
}

impl Module for StaticModule {
    fn create_doozer(&self, class_name: &str) -> Option<Arc<dyn Doozer>> {
        self.doozers.get(class_name).map(|constructor| constructor())
    }

    fn create_condition_evaluator(&self, class_name: &str) -> Option<Arc<dyn ConditionEvaluator>> {
        self.condition_evaluators
            .get(class_name)
            .map(|constructor| constructor())
    }
}

impl Debug for StaticModule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut doozers: Vec<&String> = self.doozers.keys().collect();
        doozers.sort();
        let mut evaluators: Vec<&String> = self.condition_evaluators.keys().collect();
        evaluators.sort();
        f.debug_struct("StaticModule")
            .field("doozers", &doozers)
            .field("condition_evaluators", &evaluators)
            .finish()
    }
}

/// Module loader backed by a fixed in-process table.
#[derive(Debug, Default)]
pub struct StaticModuleLoader {
    modules: HashMap<String, Arc<StaticModule>>,
}

impl StaticModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, module_ref: impl Into<String>, module: StaticModule) -> Self {
        self.modules.insert(module_ref.into(), Arc::new(module));
        self
    }
}

impl ModuleLoader for StaticModuleLoader {
    fn load(&self, module_ref: &str) -> Result<Arc<dyn Module>, ModuleLoadError> {
        self.modules
            .get(module_ref)
            .map(|module| Arc::clone(module) as Arc<dyn Module>)
            .ok_or_else(|| ModuleLoadError::ModuleNotFound {
                module_ref: module_ref.to_string(),
            })
    }
}
