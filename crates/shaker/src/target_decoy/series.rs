use super::{ScoreObservation, TargetDecoyResults, ThresholdLimit, ThresholdType};
use crate::ml::kde::Estimator;
use serde::Serialize;

/// Target-decoy curve over the distinct scores of a bucket, best score first.
/// Entry `i` describes the threshold "accept everything scoring >= `scores[i]`".
/// Rates are in percent.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TargetDecoySeries {
    pub scores: Vec<f64>,
    pub n_target: Vec<usize>,
    pub n_decoy: Vec<usize>,
    pub pep: Vec<f64>,
    pub fdr: Vec<f64>,
    pub fnr: Vec<f64>,
    pub q_value: Vec<f64>,
}

impl TargetDecoySeries {
    pub fn new(hits: &[ScoreObservation], estimator: &Estimator) -> Self {
        let mut sorted = hits.to_vec();
        sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

        // Expected number of correct target matches in the whole bucket
        let expected_true = sorted
            .iter()
            .filter(|hit| !hit.decoy)
            .map(|hit| 1.0 - estimator.posterior_error(hit.score))
            .sum::<f64>();

        let mut series = Self::default();
        let mut targets = 0;
        let mut decoys = 0;
        let mut accepted_true = 0.0;

        for group in sorted.chunk_by(|a, b| a.score == b.score) {
            let score = group[0].score;
            let pep = estimator.posterior_error(score);
            for hit in group {
                match hit.decoy {
                    true => decoys += 1,
                    false => {
                        targets += 1;
                        accepted_true += 1.0 - pep;
                    }
                }
            }

            let fdr = match targets {
                0 => 100.0,
                t => (100.0 * decoys as f64 / t as f64).min(100.0),
            };
            let fnr = match expected_true > 0.0 {
                true => (100.0 * (expected_true - accepted_true) / expected_true).max(0.0),
                false => 0.0,
            };

            series.scores.push(score);
            series.n_target.push(targets);
            series.n_decoy.push(decoys);
            series.pep.push(pep);
            series.fdr.push(fdr);
            series.fnr.push(fnr);
        }

        // Q-value is the minimum FDR at any more permissive threshold
        let mut q_min = 100.0f64;
        series.q_value = vec![100.0; series.fdr.len()];
        for (q, fdr) in series.q_value.iter_mut().zip(&series.fdr).rev() {
            q_min = q_min.min(*fdr);
            *q = q_min;
        }

        series
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Lowest FDR reachable by any threshold on this curve
    pub fn best_fdr(&self) -> Option<f64> {
        self.q_value.first().copied()
    }

    /// Resolve the request held by `results` into a score threshold. The most
    /// permissive threshold that satisfies the request is chosen.
    pub fn apply(&self, results: &mut TargetDecoyResults) {
        let threshold = results.threshold;
        let index = match results.threshold_type {
            ThresholdType::Fdr => self
                .q_value
                .partition_point(|q| *q <= threshold)
                .checked_sub(1),
            ThresholdType::Fnr => {
                let ix = self.fnr.partition_point(|fnr| *fnr > threshold);
                (ix < self.len()).then_some(ix)
            }
            ThresholdType::Confidence => {
                // PEP is not monotone unless the estimator enforces it
                let ix = self
                    .pep
                    .iter()
                    .position(|pep| 100.0 * (1.0 - pep) < threshold)
                    .unwrap_or(self.len());
                ix.checked_sub(1)
            }
        };

        results.limit = index.map(|ix| ThresholdLimit {
            score: self.scores[ix],
            confidence: 100.0 * (1.0 - self.pep[ix]),
            fdr: self.fdr[ix],
            fnr: self.fnr[ix],
            n_validated: self.n_target[ix],
            n_fp: self.n_target[ix] as f64 * self.fdr[ix] / 100.0,
        });
    }
}
