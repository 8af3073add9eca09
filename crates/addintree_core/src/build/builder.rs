//! Condition evaluation and doozer dispatch for one path.

use super::{BuildDiagnostic, BuildItemArgs, BuiltItem, ConditionEvaluator, Doozer};
use crate::model::codon::{join_path, Codon};
use crate::model::condition::{Condition, LeafCondition};
use crate::tree::{AddInTree, TreeSnapshot};
use log::{debug, warn};
use std::any::{type_name, Any};
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

const MAX_PANIC_MESSAGE_CHARS: usize = 160;

thread_local! {
    /// Paths being built on this thread, outermost first.
    static ACTIVE_PATHS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Marks `path` as being built until dropped.
struct ActivePath;

impl ActivePath {
    /// `None` when `path` is already being built further up this thread's stack.
    fn enter(path: &str) -> Option<Self> {
        ACTIVE_PATHS.with(|active| {
            let mut active = active.borrow_mut();
            if active.iter().any(|entry| entry == path) {
                warn!(
                    "event=item_build module=build status=error reason=reentrant path={} depth={}",
                    path,
                    active.len()
                );
                return None;
            }
            active.push(path.to_string());
            Some(Self)
        })
    }
}

impl Drop for ActivePath {
    fn drop(&mut self) {
        ACTIVE_PATHS.with(|active| {
            active.borrow_mut().pop();
        });
    }
}

impl AddInTree {
    /// Builds the items of `path` for `caller`, in merged codon order.
    ///
    /// Codons whose conditions fail, whose doozer is unavailable or fails,
    /// or whose item is not a `T` are left out; unknown paths build nothing.
    /// A doozer re-entering a path that is still being built gets an empty list.
    pub fn build_items<T: Any>(&self, path: &str, caller: &dyn Any) -> Vec<T> {
        let snapshot = self.load_snapshot();
        self.build_path(&snapshot, path, caller)
            .into_iter()
            .filter_map(|item| downcast_item(path, item))
            .collect()
    }

    /// Builds the first codon of `path` with the given id.
    ///
    /// Like `build_items`, nothing is built while `path` is already being built
    /// on the calling thread.
    pub fn build_item<T: Any>(&self, path: &str, id: &str, caller: &dyn Any) -> Option<T> {
        let snapshot = self.load_snapshot();
        let codon = snapshot.paths.get(path)?.find(id)?;
        let _active = ActivePath::enter(path)?;
        self.build_codon(&snapshot, path, codon, caller)
            .and_then(|item| downcast_item(path, item))
    }

    fn build_path(&self, snapshot: &TreeSnapshot, path: &str, caller: &dyn Any) -> Vec<BuiltItem> {
        let Some(extension_path) = snapshot.paths.get(path) else {
            return Vec::new();
        };
        // A doozer that builds its own path again gets nothing back.
        let Some(_active) = ActivePath::enter(path) else {
            return Vec::new();
        };
        extension_path
            .codons
            .iter()
            .filter_map(|codon| self.build_codon(snapshot, path, codon, caller))
            .collect()
    }

    fn build_codon(
        &self,
        snapshot: &TreeSnapshot,
        path: &str,
        codon: &Codon,
        caller: &dyn Any,
    ) -> Option<BuiltItem> {
        if !self.conditions_hold(snapshot, path, codon, caller) {
            debug!(
                "event=item_build module=build status=skip reason=condition codon={}",
                join_path(path, &codon.id)
            );
            return None;
        }

        let doozer = match self.resolve_doozer(snapshot, &codon.name) {
            Ok(doozer) => doozer,
            Err(diagnostic) => {
                report(path, codon, &diagnostic);
                return None;
            }
        };

        let sub_items = if codon.is_sub() {
            self.build_path(snapshot, &join_path(path, &codon.id), caller)
        } else {
            Vec::new()
        };
        let args = BuildItemArgs {
            tree: self,
            path,
            codon,
            caller,
            sub_items,
        };

        let diagnostic = match catch_unwind(AssertUnwindSafe(|| doozer.build_item(args))) {
            Ok(Ok(item)) => return item,
            Ok(Err(err)) => BuildDiagnostic::FactoryBuild {
                message: err.to_string(),
            },
            Err(payload) => BuildDiagnostic::FactoryBuild {
                message: format!("panicked: {}", panic_message(payload.as_ref())),
            },
        };
        report(path, codon, &diagnostic);
        None
    }

    fn conditions_hold(
        &self,
        snapshot: &TreeSnapshot,
        path: &str,
        codon: &Codon,
        caller: &dyn Any,
    ) -> bool {
        Condition::all_hold(&codon.conditions, &mut |leaf| {
            match self.evaluate_leaf(snapshot, leaf, caller) {
                Ok(valid) => valid,
                Err(diagnostic) => {
                    warn!(
                        "event=condition_evaluate module=build status=error codon={} addin={} error={}",
                        join_path(path, &codon.id),
                        codon.addin_name,
                        diagnostic
                    );
                    false
                }
            }
        })
    }

    fn evaluate_leaf(
        &self,
        snapshot: &TreeSnapshot,
        leaf: &LeafCondition,
        caller: &dyn Any,
    ) -> Result<bool, BuildDiagnostic> {
        let evaluator = self.resolve_condition_evaluator(snapshot, &leaf.name)?;
        match catch_unwind(AssertUnwindSafe(|| evaluator.is_valid(caller, leaf))) {
            Ok(Ok(valid)) => Ok(valid),
            Ok(Err(err)) => Err(BuildDiagnostic::Evaluator {
                name: leaf.name.clone(),
                reason: err.to_string(),
            }),
            Err(payload) => Err(BuildDiagnostic::Evaluator {
                name: leaf.name.clone(),
                reason: format!("panicked: {}", panic_message(payload.as_ref())),
            }),
        }
    }

    fn resolve_doozer(
        &self,
        snapshot: &TreeSnapshot,
        name: &str,
    ) -> Result<Arc<dyn Doozer>, BuildDiagnostic> {
        let factory = snapshot
            .doozers
            .get(name)
            .ok_or_else(|| BuildDiagnostic::UnknownFactory {
                name: name.to_string(),
                reason: "no doozer registered".to_string(),
            })?;
        self.resolver
            .doozer(name, factory)
            .map_err(|err| BuildDiagnostic::UnknownFactory {
                name: name.to_string(),
                reason: err.to_string(),
            })
    }

    fn resolve_condition_evaluator(
        &self,
        snapshot: &TreeSnapshot,
        name: &str,
    ) -> Result<Arc<dyn ConditionEvaluator>, BuildDiagnostic> {
        let factory = snapshot.condition_evaluators.get(name).ok_or_else(|| {
            BuildDiagnostic::Evaluator {
                name: name.to_string(),
                reason: "no condition evaluator registered".to_string(),
            }
        })?;
        self.resolver
            .condition_evaluator(name, factory)
            .map_err(|err| BuildDiagnostic::Evaluator {
                name: name.to_string(),
                reason: err.to_string(),
            })
    }
}

fn downcast_item<T: Any>(path: &str, item: BuiltItem) -> Option<T> {
    match item.downcast::<T>() {
        Ok(item) => Some(*item),
        Err(_) => {
            warn!(
                "event=item_build module=build status=error path={} error={}",
                path,
                BuildDiagnostic::TypeMismatch {
                    expected: type_name::<T>(),
                }
            );
            None
        }
    }
}

fn report(path: &str, codon: &Codon, diagnostic: &BuildDiagnostic) {
    warn!(
        "event=item_build module=build status=error codon={} name={} addin={} error={}",
        join_path(path, &codon.id),
        codon.name,
        codon.addin_name,
        diagnostic
    );
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let message = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    };
    message
        .replace(['\n', '\r'], " ")
        .chars()
        .take(MAX_PANIC_MESSAGE_CHARS)
        .collect()
}
