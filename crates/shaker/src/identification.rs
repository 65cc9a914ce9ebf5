//! The views of spectrum and peptide matches that the validation maps need,
//! and plain records implementing them

use crate::validation::MatchQuality;
use serde::{Deserialize, Serialize};

/// Key used for matches whose precursor charge could not be determined
pub const UNDETERMINED_CHARGE: u8 = 0;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModificationMatch {
    /// `None` when the modification could not be resolved to a known name
    pub name: Option<String>,
    /// Fixed (static) modifications are `false`
    #[serde(default = "variable_default")]
    pub variable: bool,
    pub site: u32,
}

fn variable_default() -> bool {
    true
}

impl ModificationMatch {
    pub fn variable<S: Into<String>>(name: S, site: u32) -> Self {
        Self {
            name: Some(name.into()),
            variable: true,
            site,
        }
    }

    pub fn fixed<S: Into<String>>(name: S, site: u32) -> Self {
        Self {
            name: Some(name.into()),
            variable: false,
            site,
        }
    }
}

pub trait SpectrumMatchLike {
    /// Charge of the best peptide assumption, if it can be determined
    fn best_charge(&self) -> Option<u8>;

    /// Whether the best peptide assumption maps to a decoy sequence
    fn is_decoy(&self) -> bool;

    fn modifications(&self) -> &[ModificationMatch];
}

pub trait PeptideMatchLike {
    fn modifications(&self) -> &[ModificationMatch];

    fn is_decoy(&self) -> bool;
}

/// Charge used to bucket a spectrum match. A charge that cannot be read is
/// not an error: such matches share the [`UNDETERMINED_CHARGE`] bucket.
pub fn charge_or_undetermined<S: SpectrumMatchLike + ?Sized>(psm: &S) -> u8 {
    psm.best_charge().unwrap_or(UNDETERMINED_CHARGE)
}

/// E-value reported by one search engine for a spectrum match
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineHit {
    pub engine: usize,
    pub e_value: f64,
}

/// Localization evidence for one modification carried by a spectrum match
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PtmObservation {
    pub modification: String,
    pub mass: f64,
    /// Score fed into the localization (FLR) model
    pub score: f64,
    /// The engines disagree on the site of this modification
    #[serde(default)]
    pub conflict: bool,
    #[serde(default)]
    pub sites: Vec<u32>,
    #[serde(default)]
    pub delta_score: Option<f64>,
    #[serde(default)]
    pub a_score: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpectrumMatch {
    pub spectrum_file: String,
    pub spectrum_title: String,
    pub peptide: String,
    #[serde(default)]
    pub charge: Option<u8>,
    #[serde(default)]
    pub decoy: bool,
    /// Match score, higher is better
    pub score: f64,
    #[serde(default)]
    pub modifications: Vec<ModificationMatch>,
    #[serde(default)]
    pub engines: Vec<EngineHit>,
    #[serde(default)]
    pub quality: MatchQuality,
    #[serde(default)]
    pub ptms: Vec<PtmObservation>,
}

impl SpectrumMatchLike for SpectrumMatch {
    fn best_charge(&self) -> Option<u8> {
        self.charge
    }

    fn is_decoy(&self) -> bool {
        self.decoy
    }

    fn modifications(&self) -> &[ModificationMatch] {
        &self.modifications
    }
}

/// Peptide inferred from one or more spectrum matches
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeptideMatch {
    pub sequence: String,
    pub modifications: Vec<ModificationMatch>,
    pub decoy: bool,
    /// Best score among the supporting spectrum matches
    pub score: f64,
    pub spectrum_count: usize,
}

impl PeptideMatchLike for PeptideMatch {
    fn modifications(&self) -> &[ModificationMatch] {
        &self.modifications
    }

    fn is_decoy(&self) -> bool {
        self.decoy
    }
}
