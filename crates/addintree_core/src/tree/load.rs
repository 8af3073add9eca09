//! Batch loading of descriptors with per-descriptor isolation.

use super::AddInTree;
use crate::descriptor::DescriptorError;
use crate::model::addin::AddIn;
use log::{info, warn};
use std::collections::HashSet;
use std::fmt::{Display, Formatter};

/// Why one descriptor was not registered.
#[derive(Debug)]
pub enum LoadFailure {
    Parse {
        source: String,
        error: DescriptorError,
    },
    MissingDependency {
        source: String,
        addin: String,
        dependency: String,
    },
}

impl LoadFailure {
    pub fn source_label(&self) -> &str {
        match self {
            Self::Parse { source, .. } | Self::MissingDependency { source, .. } => source,
        }
    }
}

impl Display for LoadFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse { source, error } => write!(f, "{source}: {error}"),
            Self::MissingDependency {
                source,
                addin,
                dependency,
            } => write!(
                f,
                "{source}: add-in `{addin}` depends on `{dependency}`, which is not loaded"
            ),
        }
    }
}

/// Outcome of `AddInTree::load_all`.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Source labels registered, in registration order.
    pub loaded: Vec<String>,
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl AddInTree {
    /// Parses and registers many descriptors in the given order.
    ///
    /// Malformed descriptors are skipped. Add-ins whose declared dependencies
    /// are not provided by another loadable add-in are skipped as well; this
    /// is repeated until stable so a skipped provider also drops its
    /// dependents. Everything else is registered in input order.
    pub fn load_all<I, S, T>(&self, sources: I) -> LoadReport
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: AsRef<str>,
    {
        let mut report = LoadReport::default();
        let mut parsed: Vec<(String, AddIn)> = Vec::new();

        for (source, text) in sources {
            let source = source.into();
            match AddIn::load(self, text.as_ref()) {
                Ok(addin) => parsed.push((source, addin)),
                Err(error) => {
                    warn!(
                        "event=addin_skip module=tree status=error source={} reason=parse",
                        source
                    );
                    report.failures.push(LoadFailure::Parse { source, error });
                }
            }
        }

        loop {
            let provided: HashSet<&str> = parsed
                .iter()
                .flat_map(|(_, addin)| addin.manifest.identities.keys().map(String::as_str))
                .collect();
            // The unmet name is taken from the same provider set that found it.
            let broken = parsed.iter().enumerate().find_map(|(index, (_, addin))| {
                addin
                    .manifest
                    .dependencies
                    .iter()
                    .find(|dependency| !provided.contains(dependency.name.as_str()))
                    .map(|dependency| (index, dependency.name.clone()))
            });
            let Some((index, dependency)) = broken else {
                break;
            };

            let (source, addin) = parsed.remove(index);
            warn!(
                "event=addin_skip module=tree status=error source={} reason=missing_dependency dependency={}",
                source, dependency
            );
            report.failures.push(LoadFailure::MissingDependency {
                source,
                addin: addin.name().to_string(),
                dependency,
            });
        }

        for (source, addin) in parsed {
            self.register(addin);
            report.loaded.push(source);
        }

        info!(
            "event=addin_load module=tree status=ok loaded={} failed={}",
            report.loaded.len(),
            report.failures.len()
        );
        report
    }
}
