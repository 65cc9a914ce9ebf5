//! Localization-conflict probabilities, bucketed by modification mass and
//! then by charge. Each modification mass groups its charges independently,
//! the same way [`crate::psm_map::PsmSpecificMap`] does.

use crate::identification::{charge_or_undetermined, SpectrumMatchLike};
use crate::keys::PtmMass;
use crate::psm_map::{group_charges, group_labels, merge_groups};
use crate::settings::EstimatorSettings;
use crate::target_decoy::{TargetDecoyMap, ThresholdType, DEFAULT_MINIMAL_FDR};
use crate::validation::{validate_match, MatchQuality, MatchValidationLevel};
use crate::waiting::WaitingHandler;
use crate::Error;
use dashmap::DashMap;
use fnv::FnvBuildHasher;
use ordered_float::OrderedFloat;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct PsmPtmMap {
    maps: DashMap<PtmMass, BTreeMap<u8, TargetDecoyMap>, FnvBuildHasher>,
    grouping: BTreeMap<PtmMass, BTreeMap<u8, u8>>,
    cleaned: bool,
}

impl PsmPtmMap {
    /// Record a localization score. The score always enters as a non-conflict
    /// point; a conflicting localization adds a second, conflict-labeled point
    /// at the same score.
    pub fn add_point<S: SpectrumMatchLike + ?Sized>(
        &self,
        ptm_mass: f64,
        score: f64,
        psm: &S,
        conflict: bool,
    ) {
        let charge = charge_or_undetermined(psm);
        let mut charges = self.maps.entry(OrderedFloat(ptm_mass)).or_default();
        let map = charges.entry(charge).or_default();
        map.put(score, false);
        if conflict {
            map.put(score, true);
        }
    }

    /// Modification masses observed so far, ascending
    pub fn masses(&self) -> Vec<f64> {
        let mut masses = self.maps.iter().map(|e| *e.key()).collect::<Vec<_>>();
        masses.sort_unstable();
        masses.into_iter().map(|mass| mass.0).collect()
    }

    /// Group weak charge buckets, independently for every modification mass
    pub fn clean(&mut self) {
        if self.cleaned {
            log::warn!("ptm map is already cleaned");
            return;
        }
        self.cleaned = true;

        for mut entry in self.maps.iter_mut() {
            let mass = *entry.key();
            let maps = entry.value_mut();
            let grouping = group_charges(
                maps.iter()
                    .map(|(charge, map)| (*charge, map.has_statistical_power())),
            );
            merge_groups(maps, &grouping);
            for (charge, reference) in &grouping {
                log::debug!(
                    "ptm {} charge {} merged into charge {}",
                    mass,
                    charge,
                    reference
                );
            }
            self.grouping.insert(mass, grouping);
        }
    }

    /// Charge of the bucket that answers for `(ptm_mass, charge)`
    pub fn corrected_key(&self, ptm_mass: f64, charge: u8) -> Result<u8, Error> {
        let mass = OrderedFloat(ptm_mass);
        if !self.maps.contains_key(&mass) {
            return Err(Error::UnknownModificationMass(ptm_mass));
        }
        Ok(self
            .grouping
            .get(&mass)
            .and_then(|grouping| grouping.get(&charge))
            .copied()
            .unwrap_or(charge))
    }

    /// Group labels of the canonical charges of one modification mass
    pub fn keys(&self, ptm_mass: f64) -> Result<BTreeMap<u8, String>, Error> {
        let mass = OrderedFloat(ptm_mass);
        let charges = self
            .maps
            .get(&mass)
            .map(|maps| maps.keys().copied().collect::<Vec<_>>())
            .ok_or(Error::UnknownModificationMass(ptm_mass))?;
        let empty = BTreeMap::new();
        Ok(group_labels(
            charges,
            self.grouping.get(&mass).unwrap_or(&empty),
        ))
    }

    fn is_grouped(&self, mass: &PtmMass, charge: u8) -> bool {
        self.grouping
            .get(mass)
            .map_or(false, |grouping| grouping.contains_key(&charge))
    }

    pub fn with_bucket<R, F>(&self, ptm_mass: f64, charge: u8, f: F) -> Result<R, Error>
    where
        F: FnOnce(&TargetDecoyMap) -> R,
    {
        let charge = self.corrected_key(ptm_mass, charge)?;
        let maps = self
            .maps
            .get(&OrderedFloat(ptm_mass))
            .ok_or(Error::UnknownModificationMass(ptm_mass))?;
        let result = maps.get(&charge).map(f);
        result.ok_or_else(|| Error::MissingBucket(format!("ptm {} charge {}", ptm_mass, charge)))
    }

    pub fn probability(&self, ptm_mass: f64, charge: u8, score: f64) -> Result<f64, Error> {
        self.with_bucket(ptm_mass, charge, |map| map.probability(score))?
    }

    pub fn n_points(&self) -> usize {
        self.maps
            .iter()
            .map(|e| {
                e.value()
                    .iter()
                    .filter(|(charge, _)| !self.is_grouped(e.key(), **charge))
                    .map(|(_, map)| map.map_size())
                    .sum::<usize>()
            })
            .sum()
    }

    fn canonical_keys(&self) -> Vec<(PtmMass, u8)> {
        let mut keys = self
            .maps
            .iter()
            .flat_map(|e| {
                let mass = *e.key();
                e.value()
                    .keys()
                    .map(|charge| (mass, *charge))
                    .collect::<Vec<_>>()
            })
            .filter(|(mass, charge)| !self.is_grouped(mass, *charge))
            .collect::<Vec<_>>();
        keys.sort_unstable();
        keys
    }

    pub fn estimate_probabilities(
        &mut self,
        settings: &EstimatorSettings,
        waiting: &dyn WaitingHandler,
    ) {
        waiting.reset_progress();
        waiting.set_max(self.n_points());
        for (mass, charge) in self.canonical_keys() {
            if waiting.is_cancelled() {
                return;
            }
            if let Some(mut maps) = self.maps.get_mut(&mass) {
                if let Some(map) = maps.get_mut(&charge) {
                    map.estimate_probabilities(settings, waiting);
                }
            }
        }
    }

    pub fn set_threshold(
        &mut self,
        threshold_type: ThresholdType,
        threshold: f64,
    ) -> Result<(), Error> {
        for (mass, charge) in self.canonical_keys() {
            if let Some(mut maps) = self.maps.get_mut(&mass) {
                if let Some(map) = maps.get_mut(&charge) {
                    map.apply_threshold(threshold_type, threshold)?;
                }
            }
        }
        Ok(())
    }

    /// Group labels of every canonical bucket that cannot support validation
    /// at the default FDR, per modification mass
    pub fn suspicious_input(&self) -> BTreeMap<PtmMass, Vec<String>> {
        let mut suspicious: BTreeMap<PtmMass, Vec<String>> = BTreeMap::new();
        for (mass, charge) in self.canonical_keys() {
            let flagged = self
                .maps
                .get(&mass)
                .and_then(|maps| {
                    maps.get(&charge)
                        .map(|map| map.suspicious_input(DEFAULT_MINIMAL_FDR))
                })
                .unwrap_or(false);
            if !flagged {
                continue;
            }
            if let Some(label) = self
                .keys(mass.0)
                .ok()
                .and_then(|mut labels| labels.remove(&charge))
            {
                suspicious.entry(mass).or_default().push(label);
            }
        }
        suspicious
    }

    /// A localization is confident when it scores above the FLR threshold of
    /// its bucket
    pub fn validate(
        &self,
        ptm_mass: f64,
        charge: u8,
        score: f64,
    ) -> Result<MatchValidationLevel, Error> {
        self.with_bucket(ptm_mass, charge, |map| {
            validate_match(map.results(), score, false, &MatchQuality::default(), &[])
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::identification::ModificationMatch;
    use crate::waiting::ProgressCounter;

    struct Psm(Option<u8>);

    impl SpectrumMatchLike for Psm {
        fn best_charge(&self) -> Option<u8> {
            self.0
        }

        fn is_decoy(&self) -> bool {
            false
        }

        fn modifications(&self) -> &[ModificationMatch] {
            &[]
        }
    }

    const PHOSPHO: f64 = 79.966331;
    const OXIDATION: f64 = 15.994915;

    fn fill(map: &PsmPtmMap, mass: f64, charge: u8, n: usize, conflicts: usize) {
        for i in 0..n {
            map.add_point(mass, 20.0 + (i % 30) as f64 * 0.5, &Psm(Some(charge)), false);
        }
        for i in 0..conflicts {
            map.add_point(mass, (i % 30) as f64 * 0.2, &Psm(Some(charge)), true);
        }
    }

    #[test]
    fn conflict_is_counted_twice() {
        let map = PsmPtmMap::default();
        map.add_point(PHOSPHO, 5.0, &Psm(Some(2)), false);
        assert_eq!(map.with_bucket(PHOSPHO, 2, |m| m.map_size()).unwrap(), 1);

        map.add_point(PHOSPHO, 5.0, &Psm(Some(2)), true);
        map.with_bucket(PHOSPHO, 2, |m| {
            assert_eq!(m.map_size(), 3);
            assert_eq!(m.n_decoys(), 1);
        })
        .unwrap();
    }

    #[test]
    fn masses_are_grouped_independently() {
        let mut map = PsmPtmMap::default();
        fill(&map, PHOSPHO, 2, 150, 10);
        fill(&map, PHOSPHO, 3, 20, 2);
        fill(&map, OXIDATION, 2, 20, 2);
        fill(&map, OXIDATION, 3, 150, 10);
        map.clean();

        assert_eq!(map.corrected_key(PHOSPHO, 3).unwrap(), 2);
        assert_eq!(map.corrected_key(OXIDATION, 3).unwrap(), 3);
        assert_eq!(map.corrected_key(OXIDATION, 2).unwrap(), 2);
        // Never seen at this mass, but the mass itself is known
        assert_eq!(map.corrected_key(PHOSPHO, 5).unwrap(), 5);
        assert!(matches!(
            map.corrected_key(42.0, 2),
            Err(Error::UnknownModificationMass(_))
        ));

        assert_eq!(
            map.keys(PHOSPHO).unwrap(),
            BTreeMap::from([(2, "2, 3".to_string())])
        );
        assert_eq!(map.masses(), vec![OXIDATION, PHOSPHO]);
    }

    #[test]
    fn flr_estimation() {
        let mut map = PsmPtmMap::default();
        fill(&map, PHOSPHO, 2, 150, 10);
        fill(&map, PHOSPHO, 3, 20, 2);
        fill(&map, OXIDATION, 2, 30, 5);
        map.clean();

        let waiting = ProgressCounter::default();
        map.estimate_probabilities(&EstimatorSettings::default(), &waiting);
        assert_eq!(waiting.progress(), map.n_points());
        assert!(map.probability(PHOSPHO, 3, 30.0).unwrap() < 0.05);

        map.set_threshold(ThresholdType::Fdr, 1.0).unwrap();
        assert_eq!(
            map.validate(PHOSPHO, 3, 30.0).unwrap(),
            MatchValidationLevel::Confident
        );

        let suspicious = map.suspicious_input();
        assert_eq!(suspicious.len(), 1);
        assert_eq!(suspicious[&OrderedFloat(OXIDATION)], vec!["2".to_string()]);
    }
}
