//! Search engine e-values, per engine and per (engine, spectrum file)
//!
//! E-values are better when lower; they are stored as `-log10(e)` so that
//! every target-decoy bucket shares the "higher is better" convention.

use crate::settings::EstimatorSettings;
use crate::target_decoy::TargetDecoyMap;
use crate::waiting::WaitingHandler;
use crate::Error;
use dashmap::DashMap;
use fnv::{FnvBuildHasher, FnvHashMap};
use serde::Serialize;
use std::collections::BTreeMap;

/// Score stored for an e-value
pub fn e_value_score(e_value: f64) -> f64 {
    -e_value.max(f64::MIN_POSITIVE).log10()
}

/// Validated matches supported by an engine, and those it alone supported
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Contribution {
    pub total: usize,
    pub unique: usize,
}

impl Contribution {
    fn add(&mut self, unique: bool) {
        self.total += 1;
        if unique {
            self.unique += 1;
        }
    }
}

#[derive(Debug, Default)]
pub struct InputMap {
    engines: DashMap<usize, TargetDecoyMap, FnvBuildHasher>,
    files: DashMap<usize, FnvHashMap<String, TargetDecoyMap>, FnvBuildHasher>,
    /// (file, engine, score type) buckets for auxiliary engine scores
    intermediate: DashMap<(String, usize, usize), TargetDecoyMap, FnvBuildHasher>,
    contributions: DashMap<usize, Contribution, FnvBuildHasher>,
    file_contributions: DashMap<(usize, String), Contribution, FnvBuildHasher>,
}

impl InputMap {
    /// Record an engine e-value, in the engine bucket and in the bucket of
    /// the engine for this spectrum file. Safe to call from many threads.
    pub fn add_entry(&self, engine: usize, file_name: &str, e_value: f64, decoy: bool) {
        let score = e_value_score(e_value);
        self.engines.entry(engine).or_default().put(score, decoy);
        self.files
            .entry(engine)
            .or_default()
            .entry(file_name.to_string())
            .or_default()
            .put(score, decoy);
    }

    /// Engines observed so far, ascending
    pub fn engines(&self) -> Vec<usize> {
        let mut engines = self.engines.iter().map(|e| *e.key()).collect::<Vec<_>>();
        engines.sort_unstable();
        engines
    }

    pub fn n_engines(&self) -> usize {
        self.engines.len()
    }

    pub fn is_multiple_engines(&self) -> bool {
        self.engines.len() > 1
    }

    pub fn file_names(&self, engine: usize) -> Vec<String> {
        let mut files = self
            .files
            .get(&engine)
            .map(|files| files.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        files.sort();
        files
    }

    pub fn n_points(&self) -> usize {
        let engines = self
            .engines
            .iter()
            .map(|e| e.value().map_size())
            .sum::<usize>();
        let files = self
            .files
            .iter()
            .flat_map(|e| e.value().values().map(|map| map.map_size()).collect::<Vec<_>>())
            .sum::<usize>();
        engines + files
    }

    pub fn with_engine_map<R, F>(&self, engine: usize, f: F) -> Result<R, Error>
    where
        F: FnOnce(&TargetDecoyMap) -> R,
    {
        self.engines
            .get(&engine)
            .map(|map| f(map.value()))
            .ok_or_else(|| Error::MissingBucket(format!("engine {}", engine)))
    }

    pub fn with_file_map<R, F>(&self, engine: usize, file_name: &str, f: F) -> Result<R, Error>
    where
        F: FnOnce(&TargetDecoyMap) -> R,
    {
        let files = self
            .files
            .get(&engine)
            .ok_or_else(|| Error::MissingBucket(format!("engine {}", engine)))?;
        let result = files.get(file_name).map(f);
        result.ok_or_else(|| {
            Error::MissingBucket(format!("engine {} in file `{}`", engine, file_name))
        })
    }

    /// Estimate every engine bucket, then every per-file bucket. Progress is
    /// counted in observations; cancellation is checked between buckets.
    pub fn estimate_probabilities(
        &mut self,
        settings: &EstimatorSettings,
        waiting: &dyn WaitingHandler,
    ) {
        waiting.reset_progress();
        waiting.set_max(self.n_points());

        for engine in self.engines() {
            if waiting.is_cancelled() {
                return;
            }
            if let Some(mut map) = self.engines.get_mut(&engine) {
                map.estimate_probabilities(settings, waiting);
            }
        }

        for engine in self.engines() {
            for file_name in self.file_names(engine) {
                if waiting.is_cancelled() {
                    return;
                }
                if let Some(mut files) = self.files.get_mut(&engine) {
                    if let Some(map) = files.get_mut(&file_name) {
                        map.estimate_probabilities(settings, waiting);
                    }
                }
            }
        }
    }

    /// Posterior error probability of an e-value, across all files
    pub fn probability(&self, engine: usize, e_value: f64) -> Result<f64, Error> {
        self.with_engine_map(engine, |map| map.probability(e_value_score(e_value)))?
    }

    pub fn file_probability(
        &self,
        engine: usize,
        file_name: &str,
        e_value: f64,
    ) -> Result<f64, Error> {
        self.with_file_map(engine, file_name, |map| {
            map.probability(e_value_score(e_value))
        })?
    }

    /// Engines whose scores do not separate targets from decoys well enough
    /// to reach `minimal_fdr` (percent). A single engine is never reported,
    /// there is nothing to compare it with.
    pub fn suspicious_input(&self, minimal_fdr: f64) -> Vec<usize> {
        if !self.is_multiple_engines() {
            return Vec::new();
        }
        self.engines()
            .into_iter()
            .filter(|engine| {
                self.engines
                    .get(engine)
                    .map_or(false, |map| map.suspicious_input(minimal_fdr))
            })
            .collect()
    }

    pub fn reset_advocate_contributions(&self) {
        self.contributions.clear();
        self.file_contributions.clear();
    }

    /// Count a validated match supported by `engine`. `unique` marks matches
    /// no other engine supported.
    pub fn add_advocate_contribution(&self, engine: usize, file_name: &str, unique: bool) {
        self.contributions.entry(engine).or_default().add(unique);
        self.file_contributions
            .entry((engine, file_name.to_string()))
            .or_default()
            .add(unique);
    }

    fn contribution(&self, engine: usize, file_name: Option<&str>) -> Contribution {
        let contribution = match file_name {
            Some(file_name) => self
                .file_contributions
                .get(&(engine, file_name.to_string()))
                .map(|c| *c.value()),
            None => self.contributions.get(&engine).map(|c| *c.value()),
        };
        contribution.unwrap_or_default()
    }

    /// Validated matches supported by `engine`, in one file or overall
    pub fn advocate_contribution(&self, engine: usize, file_name: Option<&str>) -> usize {
        self.contribution(engine, file_name).total
    }

    pub fn advocate_unique_contribution(&self, engine: usize, file_name: Option<&str>) -> usize {
        self.contribution(engine, file_name).unique
    }

    pub fn contributions(&self) -> BTreeMap<usize, Contribution> {
        self.contributions
            .iter()
            .map(|e| (*e.key(), *e.value()))
            .collect()
    }

    pub fn set_intermediate_score(
        &self,
        file_name: &str,
        engine: usize,
        score_type: usize,
        score: f64,
        decoy: bool,
    ) {
        self.intermediate
            .entry((file_name.to_string(), engine, score_type))
            .or_default()
            .put(score, decoy);
    }

    pub fn with_intermediate_score_map<R, F>(
        &self,
        file_name: &str,
        engine: usize,
        score_type: usize,
        f: F,
    ) -> Result<R, Error>
    where
        F: FnOnce(&TargetDecoyMap) -> R,
    {
        self.intermediate
            .get(&(file_name.to_string(), engine, score_type))
            .map(|map| f(map.value()))
            .ok_or_else(|| {
                Error::MissingBucket(format!(
                    "score {} of engine {} in file `{}`",
                    score_type, engine, file_name
                ))
            })
    }

    /// Score types recorded for an engine in a file, ascending
    pub fn intermediate_score_types(&self, file_name: &str, engine: usize) -> Vec<usize> {
        let mut types = self
            .intermediate
            .iter()
            .filter(|e| e.key().0 == file_name && e.key().1 == engine)
            .map(|e| e.key().2)
            .collect::<Vec<_>>();
        types.sort_unstable();
        types
    }
}
