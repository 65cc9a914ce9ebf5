//! Bucket keys. String forms are only produced at the edges, through
//! `Display` and `FromStr`.

use crate::identification::ModificationMatch;
use crate::Error;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

pub const SIGNATURE_SEPARATOR: char = '_';
pub const SITE_SEPARATOR: char = '|';

/// Modification mass used as a bucket key
pub type PtmMass = OrderedFloat<f64>;

/// Sorted names of the variable modifications carried by a peptide.
///
/// Fixed modifications and modifications without a resolved name are left
/// out, so an unmodified peptide has an empty signature.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModificationSignature(Vec<String>);

impl ModificationSignature {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names = names.into_iter().map(Into::into).collect::<Vec<String>>();
        names.sort();
        Self(names)
    }

    pub fn from_modifications<'a, I>(modifications: I) -> Self
    where
        I: IntoIterator<Item = &'a ModificationMatch>,
    {
        Self::new(
            modifications
                .into_iter()
                .filter(|m| m.variable)
                .filter_map(|m| m.name.clone()),
        )
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn is_unmodified(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for ModificationSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for name in &self.0 {
            write!(f, "{}{}", name, SIGNATURE_SEPARATOR)?;
        }
        Ok(())
    }
}

/// Key of a peptide bucket: a modification signature, or the shared bucket
/// that statistically weak signatures are merged into
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PeptideKey {
    Signature(ModificationSignature),
    Other,
}

impl PeptideKey {
    pub const OTHER: &'static str = "OTHER";
}

impl From<ModificationSignature> for PeptideKey {
    fn from(signature: ModificationSignature) -> Self {
        Self::Signature(signature)
    }
}

impl Display for PeptideKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signature(signature) => signature.fmt(f),
            Self::Other => f.write_str(Self::OTHER),
        }
    }
}

/// Sorted, deduplicated set of candidate modification sites
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SiteSet(Vec<u32>);

impl SiteSet {
    pub fn new<I: IntoIterator<Item = u32>>(sites: I) -> Self {
        let mut sites = sites.into_iter().collect::<Vec<_>>();
        sites.sort_unstable();
        sites.dedup();
        Self(sites)
    }

    pub fn sites(&self) -> &[u32] {
        &self.0
    }

    pub fn into_sites(self) -> Vec<u32> {
        self.0
    }
}

impl Display for SiteSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for site in &self.0 {
            write!(f, "{}{}", site, SITE_SEPARATOR)?;
        }
        Ok(())
    }
}

impl FromStr for SiteSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(SITE_SEPARATOR)
            .map(str::trim)
            .filter(|site| !site.is_empty())
            .map(|site| {
                site.parse::<u32>().map_err(|_| {
                    Error::MalformedKey(format!("`{}` in site key `{}` is not a site", site, s))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(SiteSet::new)
    }
}

impl TryFrom<String> for SiteSet {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SiteSet> for String {
    fn from(value: SiteSet) -> Self {
        value.to_string()
    }
}

/// Parse a charge written as a key, e.g. `"2"` or `"+2"`
pub fn parse_charge(s: &str) -> Result<u8, Error> {
    let trimmed = s.trim();
    trimmed
        .strip_prefix('+')
        .unwrap_or(trimmed)
        .parse::<u8>()
        .map_err(|_| Error::MalformedKey(format!("`{}` is not a valid charge", s)))
}
