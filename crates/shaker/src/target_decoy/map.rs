use super::{TargetDecoyResults, TargetDecoySeries, ThresholdType};
use crate::ml::kde::Estimator;
use crate::settings::EstimatorSettings;
use crate::waiting::WaitingHandler;
use crate::{Error, MIN_GROUP_SIZE};
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreObservation {
    pub score: f64,
    pub decoy: bool,
}

/// A bucket of labeled scores sharing one key, and the probability model
/// fit to them
#[derive(Clone, Debug, Default)]
pub struct TargetDecoyMap {
    hits: Vec<ScoreObservation>,
    n_targets: usize,
    estimator: Option<Estimator>,
    series: Option<TargetDecoySeries>,
    results: TargetDecoyResults,
}

impl TargetDecoyMap {
    pub fn put(&mut self, score: f64, decoy: bool) {
        self.hits.push(ScoreObservation { score, decoy });
        if !decoy {
            self.n_targets += 1;
        }
        self.invalidate();
    }

    /// Merge the observations of `other` into this bucket
    pub fn add_all(&mut self, other: &TargetDecoyMap) {
        self.hits.extend_from_slice(&other.hits);
        self.n_targets += other.n_targets;
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.estimator = None;
        self.series = None;
        self.results.limit = None;
    }

    pub fn hits(&self) -> &[ScoreObservation] {
        &self.hits
    }

    /// Number of observations, repeated scores included
    pub fn map_size(&self) -> usize {
        self.hits.len()
    }

    pub fn n_max(&self) -> usize {
        self.hits.len()
    }

    pub fn n_target_only(&self) -> usize {
        self.n_targets
    }

    pub fn n_decoys(&self) -> usize {
        self.hits.len() - self.n_targets
    }

    /// Enough observations, and enough target observations, to estimate
    /// probabilities without borrowing from another bucket
    pub fn has_statistical_power(&self) -> bool {
        self.n_max() >= MIN_GROUP_SIZE && self.n_target_only() >= MIN_GROUP_SIZE
    }

    pub fn estimate_probabilities(
        &mut self,
        settings: &EstimatorSettings,
        waiting: &dyn WaitingHandler,
    ) {
        let (scores, decoys): (Vec<f64>, Vec<bool>) =
            self.hits.iter().map(|hit| (hit.score, hit.decoy)).unzip();
        let estimator = settings.builder().build(&scores, &decoys);
        self.series = Some(TargetDecoySeries::new(&self.hits, &estimator));
        self.estimator = Some(estimator);
        waiting.increment_by(self.hits.len());
    }

    pub fn is_estimated(&self) -> bool {
        self.estimator.is_some()
    }

    /// Posterior error probability of a match scoring `score`
    pub fn probability(&self, score: f64) -> Result<f64, Error> {
        self.estimator
            .as_ref()
            .map(|estimator| estimator.posterior_error(score))
            .ok_or(Error::NotEstimated)
    }

    pub fn series(&self) -> Option<&TargetDecoySeries> {
        self.series.as_ref()
    }

    pub fn results(&self) -> &TargetDecoyResults {
        &self.results
    }

    /// Derive the score threshold matching the requested confidence, FDR or
    /// FNR (all in percent)
    pub fn apply_threshold(
        &mut self,
        threshold_type: ThresholdType,
        threshold: f64,
    ) -> Result<&TargetDecoyResults, Error> {
        let series = self.series.as_ref().ok_or(Error::NotEstimated)?;
        self.results = TargetDecoyResults::new(threshold_type, threshold);
        series.apply(&mut self.results);
        Ok(&self.results)
    }

    /// Lowest FDR, in percent, that any score threshold reaches on this bucket
    pub fn best_fdr(&self) -> f64 {
        if let Some(best) = self.series.as_ref().and_then(|s| s.best_fdr()) {
            return best;
        }
        let mut sorted = self.hits.clone();
        sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut best = 100.0f64;
        let (mut targets, mut decoys) = (0usize, 0usize);
        for group in sorted.chunk_by(|a, b| a.score == b.score) {
            for hit in group {
                match hit.decoy {
                    true => decoys += 1,
                    false => targets += 1,
                }
            }
            if targets > 0 {
                best = best.min(100.0 * decoys as f64 / targets as f64);
            }
        }
        best
    }

    /// True when this bucket cannot support validation at `minimal_fdr`
    /// (percent), either for lack of observations or because targets and
    /// decoys are not separated well enough
    pub fn suspicious_input(&self, minimal_fdr: f64) -> bool {
        !self.has_statistical_power() || self.best_fdr() > minimal_fdr
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::waiting::ProgressCounter;

    fn bucket(targets: usize, decoys: usize) -> TargetDecoyMap {
        let mut map = TargetDecoyMap::default();
        for i in 0..targets {
            map.put(50.0 + i as f64 * 0.1, false);
        }
        for i in 0..decoys {
            map.put(i as f64 * 0.1, true);
        }
        map
    }

    #[test]
    fn statistical_power_threshold() {
        assert!(bucket(100, 0).has_statistical_power());
        assert!(bucket(100, 20).has_statistical_power());
        assert!(!bucket(99, 0).has_statistical_power());
        assert!(!bucket(99, 1).has_statistical_power());
        assert!(!bucket(50, 60).has_statistical_power());
    }

    #[test]
    fn counts() {
        let map = bucket(30, 10);
        assert_eq!(map.map_size(), 40);
        assert_eq!(map.n_max(), 40);
        assert_eq!(map.n_target_only(), 30);
        assert_eq!(map.n_decoys(), 10);
    }

    #[test]
    fn add_all_merges_observations() {
        let mut map = bucket(60, 5);
        map.add_all(&bucket(50, 5));
        assert_eq!(map.map_size(), 120);
        assert_eq!(map.n_target_only(), 110);
        assert!(map.has_statistical_power());
    }

    #[test]
    fn probability_requires_estimation() {
        let mut map = bucket(120, 30);
        assert!(matches!(map.probability(60.0), Err(Error::NotEstimated)));
        assert!(matches!(
            map.apply_threshold(ThresholdType::Fdr, 1.0),
            Err(Error::NotEstimated)
        ));

        let waiting = ProgressCounter::default();
        map.estimate_probabilities(&EstimatorSettings::default(), &waiting);
        assert_eq!(waiting.progress(), 150);
        assert!(map.probability(60.0).unwrap() < 0.01);
        assert!(map.probability(1.0).unwrap() > 0.9);

        let results = map.apply_threshold(ThresholdType::Fdr, 1.0).unwrap();
        assert_eq!(results.limit.unwrap().n_validated, 120);
        assert!(results.is_validated(50.0));
        assert!(!results.is_validated(1.0));

        map.put(55.0, false);
        assert!(!map.is_estimated());
        assert!(map.results().no_valid_threshold());
    }

    #[test]
    fn suspicious_buckets() {
        assert!(!bucket(120, 30).suspicious_input(1.0));
        assert!(bucket(40, 10).suspicious_input(1.0));

        let mut mixed = TargetDecoyMap::default();
        for i in 0..300 {
            mixed.put(i as f64, i % 2 == 1);
        }
        assert!(mixed.has_statistical_power());
        assert!(mixed.suspicious_input(1.0));
    }
}
