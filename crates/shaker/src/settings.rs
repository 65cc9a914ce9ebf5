use crate::ml::kde::Builder;
use crate::target_decoy::ThresholdType;
use crate::validation::MatchFilter;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimatorSettings {
    /// Number of evenly spaced grid points the PEP is evaluated at
    pub bins: usize,
    /// Force the PEP to never decrease as the score decreases
    pub monotonic: bool,
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self {
            bins: 1000,
            monotonic: true,
        }
    }
}

impl EstimatorSettings {
    pub fn builder(&self) -> Builder {
        Builder::default()
            .bins(self.bins)
            .monotonic(self.monotonic)
    }
}

/// Resolved validation parameters. Rates are in percent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationSettings {
    pub threshold_type: ThresholdType,
    pub psm_fdr: f64,
    pub peptide_fdr: f64,
    pub ptm_flr: f64,
    pub estimator: EstimatorSettings,
    pub doubtful_filters: Vec<MatchFilter>,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            threshold_type: ThresholdType::Fdr,
            psm_fdr: 1.0,
            peptide_fdr: 1.0,
            ptm_flr: 1.0,
            estimator: EstimatorSettings::default(),
            doubtful_filters: MatchFilter::default_psm_filters(),
        }
    }
}
