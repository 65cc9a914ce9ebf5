//! Posterior error probabilities from target and decoy score densities.
//!
//! Both densities are fit with a Gaussian kernel density estimate, evaluated
//! on an evenly spaced grid and linearly interpolated between grid points.
//!
//! Käll, 2008 [https://pubmed.ncbi.nlm.nih.gov/18052118/]

use super::*;
use rayon::prelude::*;
use serde::Serialize;

pub struct Kde<'a> {
    sample: &'a [f64],
    pub bandwidth: f64,
    constant: f64,
}

impl<'a> Kde<'a> {
    pub fn new(sample: &'a [f64]) -> Self {
        let factor = 4. / 3.;
        let exponent = 1. / 5.;
        // A sample of identical scores still needs a non-zero kernel width
        let sigma = match std(sample) {
            s if s > 0.0 && s.is_finite() => s,
            _ => 1.0,
        };
        let bandwidth = sigma * (factor / sample.len() as f64).powf(exponent);
        let constant = (2.0 * std::f64::consts::PI).sqrt() * bandwidth * sample.len() as f64;
        Self {
            sample,
            bandwidth,
            constant,
        }
    }

    fn kernel(&self, x: f64) -> f64 {
        (-0.5 * x.powi(2)).exp()
    }

    pub fn pdf(&self, x: f64) -> f64 {
        let h = self.bandwidth;

        let sum = self
            .sample
            .par_iter()
            .fold(|| 0.0, |acc, xi| acc + self.kernel((x - xi) / h))
            .sum::<f64>();

        sum / self.constant
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Builder {
    monotonic: bool,
    bins: usize,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            monotonic: true,
            bins: 1000,
        }
    }
}

impl Builder {
    pub fn monotonic(mut self, monotonic: bool) -> Self {
        self.monotonic = monotonic;
        self
    }

    pub fn bins(mut self, bins: usize) -> Self {
        self.bins = bins.max(2);
        self
    }

    pub fn build(self, scores: &[f64], decoys: &[bool]) -> Estimator {
        let mut decoy_scores = Vec::new();
        let mut target_scores = Vec::new();
        for (&score, &decoy) in scores.iter().zip(decoys) {
            match decoy {
                true => decoy_scores.push(score),
                false => target_scores.push(score),
            }
        }

        let (min_score, max_score) = scores
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), s| (lo.min(*s), hi.max(*s)));

        // P(decoy)
        let pi = decoy_scores.len() as f64 / scores.len().max(1) as f64;

        if decoy_scores.is_empty() || target_scores.is_empty() || max_score <= min_score {
            let pep = match (decoy_scores.is_empty(), target_scores.is_empty()) {
                (true, _) => 0.0,
                (false, true) => 1.0,
                (false, false) => pi,
            };
            return Estimator::constant(pep, min_score.min(max_score));
        }

        let decoy = Kde::new(&decoy_scores);
        let target = Kde::new(&target_scores);

        // Essentially, np.linspace(scores.min(), scores.max(), bins)
        let score_step = (max_score - min_score) / (self.bins - 1) as f64;

        let mut bins = (0..self.bins)
            .map(|bin| {
                let score = (bin as f64 * score_step) + min_score;
                let decoy = decoy.pdf(score) * pi;
                let target = target.pdf(score) * (1.0 - pi);
                match target + decoy {
                    total if total > 0.0 => decoy / total,
                    _ => pi,
                }
            })
            .collect::<Vec<_>>();

        if self.monotonic {
            // PEP may only grow as the score decreases
            let init = bins.last().copied().unwrap_or(1.0);
            bins.iter_mut().rev().fold(init, |acc, x| {
                *x = acc.max(*x);
                *x
            });
        }

        Estimator {
            bins,
            min_score,
            score_step,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Estimator {
    bins: Vec<f64>,
    min_score: f64,
    score_step: f64,
}

impl Estimator {
    fn constant(pep: f64, min_score: f64) -> Self {
        Self {
            bins: vec![pep],
            min_score,
            score_step: 0.0,
        }
    }

    /// Calculate the posterior error probability for a given score, under the
    /// pre-fit non-parametric probability model. Scores outside of the fitted
    /// range take the PEP of the closest grid point.
    pub fn posterior_error(&self, score: f64) -> f64 {
        if self.bins.len() < 2 || self.score_step <= 0.0 {
            return self.bins.first().copied().unwrap_or(1.0);
        }
        let position = ((score - self.min_score) / self.score_step).max(0.0);
        let bin_lo = self.bins.len().saturating_sub(1).min(position.floor() as usize);
        let bin_hi = self.bins.len().saturating_sub(1).min(bin_lo + 1);

        // PEP of lower & one higher bin
        let lower = self.bins[bin_lo];
        let upper = self.bins[bin_hi];

        // What percent of the way to the higher bin are we?
        let linear = (position - bin_lo as f64).clamp(0.0, 1.0);

        // Linear interpolation between lower and upper bin
        let delta = upper - lower;
        (lower + (delta * linear)).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn separated() -> (Vec<f64>, Vec<bool>) {
        let mut scores = Vec::new();
        let mut decoys = Vec::new();
        for i in 0..200 {
            scores.push(20.0 + (i % 20) as f64 * 0.5);
            decoys.push(false);
        }
        for i in 0..100 {
            scores.push((i % 20) as f64 * 0.5);
            decoys.push(true);
        }
        (scores, decoys)
    }

    #[test]
    fn pep_separates_targets_from_decoys() {
        let (scores, decoys) = separated();
        let estimator = Builder::default().build(&scores, &decoys);
        assert!(estimator.posterior_error(28.0) < 0.01);
        assert!(estimator.posterior_error(2.0) > 0.9);
    }

    #[test]
    fn pep_is_monotonic() {
        let (scores, decoys) = separated();
        let estimator = Builder::default().bins(200).build(&scores, &decoys);
        let mut last = 1.0;
        for i in 0..300 {
            let pep = estimator.posterior_error(i as f64 * 0.1);
            assert!(pep <= last + 1e-12, "{} > {} at {}", pep, last, i);
            last = pep;
        }
    }

    #[test]
    fn degenerate_inputs() {
        let targets = Builder::default().build(&[1.0, 2.0, 3.0], &[false, false, false]);
        assert_eq!(targets.posterior_error(2.0), 0.0);

        let decoys = Builder::default().build(&[1.0, 2.0], &[true, true]);
        assert_eq!(decoys.posterior_error(2.0), 1.0);

        let flat = Builder::default().build(&[1.0, 1.0], &[true, false]);
        assert_eq!(flat.posterior_error(1.0), 0.5);

        let empty = Builder::default().build(&[], &[]);
        assert_eq!(empty.posterior_error(1.0), 0.0);
    }
}
