//! Peptide-level probabilities, bucketed by variable modification signature

use crate::identification::PeptideMatchLike;
use crate::keys::{ModificationSignature, PeptideKey};
use crate::settings::EstimatorSettings;
use crate::target_decoy::{TargetDecoyMap, ThresholdType};
use crate::validation::{validate_match, MatchQuality, MatchValidationLevel};
use crate::waiting::WaitingHandler;
use crate::Error;
use dashmap::DashMap;
use fnv::FnvBuildHasher;
use std::collections::BTreeSet;

#[derive(Debug, Default)]
pub struct PeptideSpecificMap {
    maps: DashMap<PeptideKey, TargetDecoyMap, FnvBuildHasher>,
    /// Signatures merged into [`PeptideKey::Other`]
    grouped: BTreeSet<PeptideKey>,
    cured: bool,
}

impl PeptideSpecificMap {
    pub fn key<P: PeptideMatchLike + ?Sized>(peptide: &P) -> PeptideKey {
        ModificationSignature::from_modifications(peptide.modifications()).into()
    }

    /// Record the score of a peptide in the bucket of its modification
    /// signature. Safe to call from many threads at once.
    pub fn add_point<P: PeptideMatchLike + ?Sized>(&self, score: f64, peptide: &P) {
        self.add_key_point(Self::key(peptide), score, peptide.is_decoy());
    }

    pub fn add_key_point(&self, key: PeptideKey, score: f64, decoy: bool) {
        self.maps.entry(key).or_default().put(score, decoy);
    }

    /// Create the shared `OTHER` bucket and move every statistically weak
    /// signature into it. Does nothing when a single signature was observed.
    pub fn cure(&mut self) {
        if self.cured {
            log::warn!("peptide map is already cured");
            return;
        }
        self.cured = true;

        if self.maps.len() <= 1 {
            return;
        }
        self.maps.entry(PeptideKey::Other).or_default();

        let mut weak = self
            .maps
            .iter()
            .filter(|e| *e.key() != PeptideKey::Other && !e.value().has_statistical_power())
            .map(|e| e.key().clone())
            .collect::<Vec<_>>();
        weak.sort();

        for key in weak {
            let merged = match self.maps.get(&key) {
                Some(map) => map.value().clone(),
                None => continue,
            };
            self.maps
                .entry(PeptideKey::Other)
                .or_default()
                .add_all(&merged);
            log::debug!("peptide bucket `{}` merged into {}", key, PeptideKey::Other);
            self.grouped.insert(key);
        }
    }

    /// Key of the bucket that answers for `key`
    pub fn corrected_key(&self, key: &PeptideKey) -> PeptideKey {
        match self.grouped.contains(key) {
            true => PeptideKey::Other,
            false => key.clone(),
        }
    }

    /// Canonical keys, merged-away signatures excluded
    pub fn keys(&self) -> Vec<PeptideKey> {
        let mut keys = self
            .maps
            .iter()
            .map(|e| e.key().clone())
            .filter(|key| !self.grouped.contains(key))
            .collect::<Vec<_>>();
        keys.sort();
        keys
    }

    /// Signatures merged into the `OTHER` bucket
    pub fn grouped_keys(&self) -> impl Iterator<Item = &PeptideKey> {
        self.grouped.iter()
    }

    pub fn with_bucket<R, F>(&self, key: &PeptideKey, f: F) -> Result<R, Error>
    where
        F: FnOnce(&TargetDecoyMap) -> R,
    {
        let key = self.corrected_key(key);
        self.maps
            .get(&key)
            .map(|map| f(map.value()))
            .ok_or_else(|| Error::MissingBucket(format!("peptide key `{}`", key)))
    }

    pub fn probability(&self, key: &PeptideKey, score: f64) -> Result<f64, Error> {
        self.with_bucket(key, |map| map.probability(score))?
    }

    pub fn n_points(&self) -> usize {
        self.maps
            .iter()
            .filter(|e| !self.grouped.contains(e.key()))
            .map(|e| e.value().map_size())
            .sum()
    }

    pub fn estimate_probabilities(
        &mut self,
        settings: &EstimatorSettings,
        waiting: &dyn WaitingHandler,
    ) {
        waiting.reset_progress();
        waiting.set_max(self.n_points());
        for key in self.keys() {
            if waiting.is_cancelled() {
                return;
            }
            if let Some(mut map) = self.maps.get_mut(&key) {
                map.estimate_probabilities(settings, waiting);
            }
        }
    }

    pub fn set_threshold(
        &mut self,
        threshold_type: ThresholdType,
        threshold: f64,
    ) -> Result<(), Error> {
        for key in self.keys() {
            if let Some(mut map) = self.maps.get_mut(&key) {
                map.apply_threshold(threshold_type, threshold)?;
            }
        }
        Ok(())
    }

    /// Canonical keys whose buckets cannot support validation at
    /// `minimal_fdr` (percent). An empty `OTHER` bucket is not reported.
    pub fn suspicious_input(&self, minimal_fdr: f64) -> Vec<PeptideKey> {
        self.keys()
            .into_iter()
            .filter(|key| {
                self.maps.get(key).map_or(false, |map| {
                    map.map_size() > 0 && map.suspicious_input(minimal_fdr)
                })
            })
            .collect()
    }

    /// Peptides have no doubtful-match filters: above the threshold is
    /// confident
    pub fn validate(
        &self,
        key: &PeptideKey,
        score: f64,
        decoy: bool,
    ) -> Result<MatchValidationLevel, Error> {
        self.with_bucket(key, |map| {
            validate_match(map.results(), score, decoy, &MatchQuality::default(), &[])
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::identification::{ModificationMatch, PeptideMatch};

    fn peptide(modifications: Vec<ModificationMatch>, decoy: bool) -> PeptideMatch {
        PeptideMatch {
            sequence: "PEPTIDEK".into(),
            modifications,
            decoy,
            score: 0.0,
            spectrum_count: 1,
        }
    }

    fn fill(map: &PeptideSpecificMap, modifications: Vec<ModificationMatch>, targets: usize) {
        let target = peptide(modifications.clone(), false);
        let decoy = peptide(modifications, true);
        for i in 0..targets {
            map.add_point(30.0 + (i % 40) as f64 * 0.25, &target);
        }
        for i in 0..targets / 5 {
            map.add_point((i % 40) as f64 * 0.25, &decoy);
        }
    }

    #[test]
    fn key_ignores_insertion_order_and_fixed_modifications() {
        let a = peptide(
            vec![
                ModificationMatch::variable("Phospho", 3),
                ModificationMatch::variable("Oxidation", 1),
                ModificationMatch::fixed("Carbamidomethyl", 5),
            ],
            false,
        );
        let b = peptide(
            vec![
                ModificationMatch::fixed("Carbamidomethyl", 5),
                ModificationMatch::variable("Oxidation", 1),
                ModificationMatch::variable("Phospho", 3),
            ],
            false,
        );
        assert_eq!(PeptideSpecificMap::key(&a).to_string(), "Oxidation_Phospho_");
        assert_eq!(PeptideSpecificMap::key(&a), PeptideSpecificMap::key(&b));
    }

    #[test]
    fn weak_signatures_join_other() {
        let mut map = PeptideSpecificMap::default();
        fill(&map, vec![], 200);
        fill(&map, vec![ModificationMatch::variable("Oxidation", 2)], 30);
        fill(&map, vec![ModificationMatch::variable("Phospho", 4)], 20);
        map.cure();

        let unmodified = PeptideKey::Signature(ModificationSignature::default());
        let oxidation = PeptideKey::Signature(ModificationSignature::new(["Oxidation"]));
        let phospho = PeptideKey::Signature(ModificationSignature::new(["Phospho"]));

        assert_eq!(map.keys(), vec![unmodified.clone(), PeptideKey::Other]);
        assert_eq!(map.corrected_key(&oxidation), PeptideKey::Other);
        assert_eq!(map.corrected_key(&phospho), PeptideKey::Other);
        assert_eq!(map.corrected_key(&unmodified), unmodified);
        assert_eq!(
            map.with_bucket(&phospho, |m| m.map_size()).unwrap(),
            36 + 24
        );
        assert_eq!(map.grouped_keys().count(), 2);
    }

    #[test]
    fn other_exists_once_signatures_are_cured() {
        let mut map = PeptideSpecificMap::default();
        fill(&map, vec![], 200);
        fill(&map, vec![ModificationMatch::variable("Oxidation", 2)], 150);
        map.cure();

        let unmodified = PeptideKey::Signature(ModificationSignature::default());
        let oxidation = PeptideKey::Signature(ModificationSignature::new(["Oxidation"]));
        assert_eq!(
            map.keys(),
            vec![unmodified.clone(), oxidation.clone(), PeptideKey::Other]
        );
        assert_eq!(map.corrected_key(&oxidation), oxidation);
        assert_eq!(map.grouped_keys().count(), 0);
        assert_eq!(map.with_bucket(&PeptideKey::Other, |m| m.map_size()).unwrap(), 0);
        assert_eq!(map.n_points(), 240 + 180);
        assert!(map.suspicious_input(1.0).is_empty());
    }

    #[test]
    fn single_signature_is_never_merged() {
        let mut map = PeptideSpecificMap::default();
        fill(&map, vec![ModificationMatch::variable("Oxidation", 2)], 10);
        map.cure();

        let oxidation = PeptideKey::Signature(ModificationSignature::new(["Oxidation"]));
        assert_eq!(map.keys(), vec![oxidation.clone()]);
        assert_eq!(map.corrected_key(&oxidation), oxidation);
    }

    #[test]
    fn unseen_key_is_an_error() {
        let map = PeptideSpecificMap::default();
        let key = PeptideKey::Signature(ModificationSignature::new(["Deamidated"]));
        assert!(matches!(
            map.probability(&key, 1.0),
            Err(Error::MissingBucket(_))
        ));
    }
}
