pub mod identification;
pub mod input_map;
pub mod keys;
pub mod ml;
pub mod peptide_map;
pub mod psm_map;
pub mod ptm_map;
pub mod ptm_scoring;
pub mod settings;
pub mod target_decoy;
pub mod validation;
pub mod waiting;

/// A bucket must hold at least this many observations, and at least this many
/// target observations, before its target-decoy curve is trusted on its own.
/// Weaker buckets are merged into a neighbour before estimation.
pub const MIN_GROUP_SIZE: usize = 100;

#[derive(Debug)]
pub enum Error {
    /// A probability or threshold was requested for a key that never received
    /// an observation
    MissingBucket(String),
    UnknownModificationMass(f64),
    MalformedKey(String),
    /// A probability was requested before `estimate_probabilities` ran
    NotEstimated,
    /// The [`waiting::WaitingHandler`] of a long running pass was cancelled
    Cancelled,
    Json(serde_json::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingBucket(key) => write!(f, "no observations recorded for key `{}`", key),
            Self::UnknownModificationMass(mass) => {
                write!(f, "modification mass {} was never scored", mass)
            }
            Self::MalformedKey(msg) => write!(f, "malformed key: {}", msg),
            Self::NotEstimated => f.write_str("probabilities have not been estimated"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Json(e) => e.fmt(f),
            Self::Io(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

pub fn read_json<P, T>(path: P) -> Result<T, Error>
where
    P: AsRef<std::path::Path>,
    T: for<'de> serde::Deserialize<'de>,
{
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
