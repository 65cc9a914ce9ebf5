//! Best localization scores per candidate site set of one modification

use crate::keys::SiteSet;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Delta scores are better when higher, A-scores when lower. Every insertion
/// keeps the best value seen so far for its site set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PtmScoring {
    modification: String,
    delta_scores: BTreeMap<SiteSet, f64>,
    a_scores: BTreeMap<SiteSet, f64>,
}

impl PtmScoring {
    pub fn new<S: Into<String>>(modification: S) -> Self {
        Self {
            modification: modification.into(),
            ..Default::default()
        }
    }

    pub fn modification(&self) -> &str {
        &self.modification
    }

    /// Serialized key of a set of sites, e.g. `[5, 2]` gives `"2|5|"`
    pub fn key(sites: &[u32]) -> String {
        SiteSet::new(sites.iter().copied()).to_string()
    }

    /// Sites encoded in `key`, in ascending order
    pub fn locations(key: &str) -> Result<Vec<u32>, Error> {
        key.parse::<SiteSet>().map(SiteSet::into_sites)
    }

    pub fn add_delta_score(&mut self, sites: SiteSet, value: f64) {
        self.delta_scores
            .entry(sites)
            .and_modify(|best| *best = best.max(value))
            .or_insert(value);
    }

    pub fn add_a_score(&mut self, sites: SiteSet, value: f64) {
        self.a_scores
            .entry(sites)
            .and_modify(|best| *best = best.min(value))
            .or_insert(value);
    }

    pub fn delta_score(&self, sites: &SiteSet) -> Option<f64> {
        self.delta_scores.get(sites).copied()
    }

    pub fn a_score(&self, sites: &SiteSet) -> Option<f64> {
        self.a_scores.get(sites).copied()
    }

    pub fn delta_scored_sites(&self) -> impl Iterator<Item = &SiteSet> {
        self.delta_scores.keys()
    }

    pub fn a_scored_sites(&self) -> impl Iterator<Item = &SiteSet> {
        self.a_scores.keys()
    }

    pub fn best_delta_site_set(&self) -> Option<(&SiteSet, f64)> {
        self.delta_scores
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(sites, score)| (sites, *score))
    }

    pub fn best_a_score_site_set(&self) -> Option<(&SiteSet, f64)> {
        self.a_scores
            .iter()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(sites, score)| (sites, *score))
    }

    pub fn add_all(&mut self, other: &PtmScoring) {
        for (sites, value) in &other.delta_scores {
            self.add_delta_score(sites.clone(), *value);
        }
        for (sites, value) in &other.a_scores {
            self.add_a_score(sites.clone(), *value);
        }
    }
}
