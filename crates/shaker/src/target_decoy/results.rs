use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdType {
    /// Minimal confidence, `100 * (1 - PEP)`, in percent
    Confidence,
    /// Maximal false discovery rate, in percent
    #[default]
    Fdr,
    /// Maximal false negative rate, in percent
    Fnr,
}

/// Where the threshold landed on the curve
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdLimit {
    pub score: f64,
    pub confidence: f64,
    pub fdr: f64,
    pub fnr: f64,
    /// Target matches scoring at or above `score`
    pub n_validated: usize,
    /// Expected false positives among the validated targets
    pub n_fp: f64,
}

/// A threshold request and, once applied to a curve, its outcome
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetDecoyResults {
    pub threshold_type: ThresholdType,
    pub threshold: f64,
    /// `None` until applied, or when no score satisfies the request
    pub limit: Option<ThresholdLimit>,
}

impl Default for TargetDecoyResults {
    fn default() -> Self {
        Self::new(ThresholdType::Fdr, super::DEFAULT_MINIMAL_FDR)
    }
}

impl TargetDecoyResults {
    pub fn new(threshold_type: ThresholdType, threshold: f64) -> Self {
        Self {
            threshold_type,
            threshold,
            limit: None,
        }
    }

    pub fn no_valid_threshold(&self) -> bool {
        self.limit.is_none()
    }

    pub fn score_limit(&self) -> Option<f64> {
        self.limit.map(|limit| limit.score)
    }

    pub fn is_validated(&self, score: f64) -> bool {
        self.limit.map_or(false, |limit| score >= limit.score)
    }
}
