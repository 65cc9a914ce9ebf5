//! Target-decoy score buckets, the curves derived from them, and the score
//! thresholds read off those curves.
//!
//! Scores are always "higher is better". Inputs where lower is better (such
//! as e-values) are transformed before they are inserted.

mod map;
mod results;
mod series;

pub use map::{ScoreObservation, TargetDecoyMap};
pub use results::{TargetDecoyResults, ThresholdLimit, ThresholdType};
pub use series::TargetDecoySeries;

/// FDR, in percent, used when a caller does not ask for a specific one
pub const DEFAULT_MINIMAL_FDR: f64 = 1.0;
