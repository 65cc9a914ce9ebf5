//! Validation levels and the rules used to downgrade confident matches

use crate::target_decoy::TargetDecoyResults;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchValidationLevel {
    #[default]
    None,
    NotValidated,
    Doubtful,
    Confident,
}

impl MatchValidationLevel {
    pub const ALL: [Self; 4] = [
        Self::None,
        Self::NotValidated,
        Self::Doubtful,
        Self::Confident,
    ];

    pub fn index(&self) -> i8 {
        match self {
            Self::None => -1,
            Self::NotValidated => 0,
            Self::Doubtful => 1,
            Self::Confident => 2,
        }
    }

    pub fn from_index(index: i8) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.index() == index)
    }

    /// Doubtful and confident matches count as identified
    pub fn is_validated(&self) -> bool {
        matches!(self, Self::Doubtful | Self::Confident)
    }
}

impl std::fmt::Display for MatchValidationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::None => "None",
            Self::NotValidated => "Not Validated",
            Self::Doubtful => "Doubtful",
            Self::Confident => "Confident",
        })
    }
}

/// Quality metrics computed for a match outside of this crate. Missing values
/// never fail a filter.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchQuality {
    /// Percentage of the peptide sequence covered by matched fragment ions
    #[serde(default)]
    pub sequence_coverage: Option<f64>,
    /// Absolute precursor mass error, in ppm
    #[serde(default)]
    pub precursor_error_ppm: Option<f64>,
}

/// A match above the score threshold that fails one of these rules is
/// reported as doubtful rather than confident
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchFilter {
    SequenceCoverage { min_percent: f64 },
    PrecursorError { max_ppm: f64 },
}

impl MatchFilter {
    pub fn default_psm_filters() -> Vec<Self> {
        vec![Self::SequenceCoverage { min_percent: 40.0 }]
    }

    pub fn passes(&self, quality: &MatchQuality) -> bool {
        match self {
            Self::SequenceCoverage { min_percent } => quality
                .sequence_coverage
                .map_or(true, |coverage| coverage > *min_percent),
            Self::PrecursorError { max_ppm } => quality
                .precursor_error_ppm
                .map_or(true, |error| error.abs() <= *max_ppm),
        }
    }
}

impl std::fmt::Display for MatchFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SequenceCoverage { min_percent } => {
                write!(f, "fragment ion sequence coverage > {}%", min_percent)
            }
            Self::PrecursorError { max_ppm } => {
                write!(f, "|precursor error| <= {} ppm", max_ppm)
            }
        }
    }
}

/// Assign a validation level to a single match, given the threshold derived
/// for the bucket the match belongs to.
///
/// Decoys are never validated. A target at or above the score limit is
/// confident when it passes every filter, doubtful otherwise.
pub fn validate_match(
    results: &TargetDecoyResults,
    score: f64,
    decoy: bool,
    quality: &MatchQuality,
    filters: &[MatchFilter],
) -> MatchValidationLevel {
    if decoy || !results.is_validated(score) {
        return MatchValidationLevel::NotValidated;
    }
    match filters.iter().all(|filter| filter.passes(quality)) {
        true => MatchValidationLevel::Confident,
        false => MatchValidationLevel::Doubtful,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::target_decoy::{ThresholdLimit, ThresholdType};

    #[test]
    fn validated_levels() {
        use MatchValidationLevel::*;
        assert!(!None.is_validated());
        assert!(!NotValidated.is_validated());
        assert!(Doubtful.is_validated());
        assert!(Confident.is_validated());

        assert!(None < NotValidated);
        assert!(NotValidated < Doubtful);
        assert!(Doubtful < Confident);
    }

    #[test]
    fn level_indices() {
        for level in MatchValidationLevel::ALL {
            assert_eq!(MatchValidationLevel::from_index(level.index()), Some(level));
        }
        assert_eq!(MatchValidationLevel::None.index(), -1);
        assert_eq!(MatchValidationLevel::Confident.index(), 2);
        assert_eq!(MatchValidationLevel::from_index(3), Option::None);
    }

    #[test]
    fn coverage_filter() {
        let filter = MatchFilter::default_psm_filters()[0];
        let covered = MatchQuality {
            sequence_coverage: Some(55.0),
            ..Default::default()
        };
        let sparse = MatchQuality {
            sequence_coverage: Some(20.0),
            ..Default::default()
        };
        assert!(filter.passes(&covered));
        assert!(!filter.passes(&sparse));
        assert!(filter.passes(&MatchQuality::default()));
    }

    #[test]
    fn doubtful_when_filter_fails() {
        let mut results = TargetDecoyResults::new(ThresholdType::Fdr, 1.0);
        results.limit = Some(ThresholdLimit {
            score: 10.0,
            confidence: 99.0,
            fdr: 1.0,
            fnr: 5.0,
            n_validated: 100,
            n_fp: 1.0,
        });
        let filters = MatchFilter::default_psm_filters();
        let sparse = MatchQuality {
            sequence_coverage: Some(10.0),
            ..Default::default()
        };

        assert_eq!(
            validate_match(&results, 12.0, false, &MatchQuality::default(), &filters),
            MatchValidationLevel::Confident
        );
        assert_eq!(
            validate_match(&results, 12.0, false, &sparse, &filters),
            MatchValidationLevel::Doubtful
        );
        assert_eq!(
            validate_match(&results, 8.0, false, &MatchQuality::default(), &filters),
            MatchValidationLevel::NotValidated
        );
        assert_eq!(
            validate_match(&results, 12.0, true, &MatchQuality::default(), &filters),
            MatchValidationLevel::NotValidated
        );
    }
}
