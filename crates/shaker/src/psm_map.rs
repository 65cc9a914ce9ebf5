//! PSM-level probabilities, bucketed by precursor charge
//!
//! Charge states without enough observations are merged into the closest
//! lower charge that has them, before any probability is estimated.

use crate::identification::{charge_or_undetermined, SpectrumMatchLike, UNDETERMINED_CHARGE};
use crate::settings::EstimatorSettings;
use crate::target_decoy::{TargetDecoyMap, ThresholdType};
use crate::validation::{validate_match, MatchFilter, MatchQuality, MatchValidationLevel};
use crate::waiting::WaitingHandler;
use crate::Error;
use dashmap::DashMap;
use fnv::FnvBuildHasher;
use std::collections::BTreeMap;

/// Group charge states, given whether each one has statistical power on its
/// own. Returns a map from each merged charge to the charge it joins.
///
/// Charges are walked in ascending order. A strong charge becomes the new
/// reference, and a weak charge joins the current reference. While no
/// reference is set, a weak charge becomes one. The undetermined charge never
/// absorbs other charges.
pub(crate) fn group_charges<I>(charges: I) -> BTreeMap<u8, u8>
where
    I: IntoIterator<Item = (u8, bool)>,
{
    let mut charges = charges.into_iter().collect::<Vec<_>>();
    charges.sort_unstable_by_key(|(charge, _)| *charge);

    let mut grouping = BTreeMap::new();
    let mut reference: Option<u8> = None;
    for (charge, strong) in charges {
        match reference {
            Some(r) if !strong && r != UNDETERMINED_CHARGE => {
                grouping.insert(charge, r);
            }
            _ => reference = Some(charge),
        }
    }
    grouping
}

/// Labels of every canonical charge, listing the charges merged into it,
/// e.g. `{2: "2, 3, 4"}`
pub(crate) fn group_labels<I>(charges: I, grouping: &BTreeMap<u8, u8>) -> BTreeMap<u8, String>
where
    I: IntoIterator<Item = u8>,
{
    let mut groups: BTreeMap<u8, Vec<u8>> = BTreeMap::new();
    for charge in charges {
        let canonical = grouping.get(&charge).copied().unwrap_or(charge);
        groups.entry(canonical).or_default().push(charge);
    }
    groups
        .into_iter()
        .map(|(canonical, mut members)| {
            members.sort_unstable();
            members.dedup();
            let label = members
                .iter()
                .map(|charge| charge.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            (canonical, label)
        })
        .collect()
}

/// Merge every grouped bucket into the bucket it was assigned to
pub(crate) fn merge_groups(
    maps: &mut BTreeMap<u8, TargetDecoyMap>,
    grouping: &BTreeMap<u8, u8>,
) {
    for (charge, reference) in grouping {
        let weak = match maps.get(charge) {
            Some(weak) => weak.clone(),
            None => continue,
        };
        maps.entry(*reference).or_default().add_all(&weak);
    }
}

#[derive(Debug)]
pub struct PsmSpecificMap {
    maps: DashMap<u8, TargetDecoyMap, FnvBuildHasher>,
    grouping: BTreeMap<u8, u8>,
    filters: Vec<MatchFilter>,
    cured: bool,
}

impl Default for PsmSpecificMap {
    fn default() -> Self {
        Self::new(MatchFilter::default_psm_filters())
    }
}

impl PsmSpecificMap {
    pub fn new(filters: Vec<MatchFilter>) -> Self {
        Self {
            maps: DashMap::default(),
            grouping: BTreeMap::new(),
            filters,
            cured: false,
        }
    }

    /// Record the score of a spectrum match in the bucket of its charge. Safe
    /// to call from many threads at once.
    pub fn add_point<S: SpectrumMatchLike + ?Sized>(&self, score: f64, psm: &S) {
        self.add_charge_point(charge_or_undetermined(psm), score, psm.is_decoy());
    }

    pub fn add_charge_point(&self, charge: u8, score: f64, decoy: bool) {
        self.maps.entry(charge).or_default().put(score, decoy);
    }

    /// Charges observed so far, ascending
    pub fn charges(&self) -> Vec<u8> {
        let mut charges = self.maps.iter().map(|e| *e.key()).collect::<Vec<_>>();
        charges.sort_unstable();
        charges
    }

    pub fn max_charge(&self) -> Option<u8> {
        self.charges().last().copied()
    }

    /// Merge statistically weak charge buckets into their reference charge.
    /// Must run once, after every point is added and before estimation.
    pub fn cure(&mut self) {
        if self.cured {
            log::warn!("psm map is already cured");
            return;
        }
        self.cured = true;

        let strength = self
            .maps
            .iter()
            .map(|e| (*e.key(), e.value().has_statistical_power()))
            .collect::<Vec<_>>();
        self.grouping = group_charges(strength);

        let mut maps = std::mem::take(&mut self.maps)
            .into_iter()
            .collect::<BTreeMap<_, _>>();
        merge_groups(&mut maps, &self.grouping);
        self.maps = maps.into_iter().collect();

        for (charge, reference) in &self.grouping {
            log::debug!("psm charge {} merged into charge {}", charge, reference);
        }
    }

    /// Charge of the bucket that answers for `charge`
    pub fn corrected_key(&self, charge: u8) -> u8 {
        self.grouping.get(&charge).copied().unwrap_or(charge)
    }

    pub fn is_grouped(&self, charge: u8) -> bool {
        self.grouping.contains_key(&charge)
    }

    /// Group label of every canonical charge
    pub fn keys(&self) -> BTreeMap<u8, String> {
        group_labels(self.charges(), &self.grouping)
    }

    fn canonical_charges(&self) -> Vec<u8> {
        self.charges()
            .into_iter()
            .filter(|charge| !self.is_grouped(*charge))
            .collect()
    }

    /// Run `f` against the bucket answering for `charge`
    pub fn with_bucket<R, F>(&self, charge: u8, f: F) -> Result<R, Error>
    where
        F: FnOnce(&TargetDecoyMap) -> R,
    {
        let key = self.corrected_key(charge);
        self.maps
            .get(&key)
            .map(|map| f(map.value()))
            .ok_or_else(|| Error::MissingBucket(format!("charge {}", key)))
    }

    pub fn probability(&self, charge: u8, score: f64) -> Result<f64, Error> {
        self.with_bucket(charge, |map| map.probability(score))?
    }

    /// Observations across every bucket, merged-away buckets excluded
    pub fn n_points(&self) -> usize {
        self.maps
            .iter()
            .filter(|e| !self.is_grouped(*e.key()))
            .map(|e| e.value().map_size())
            .sum()
    }

    /// Estimate probabilities bucket by bucket. Cancellation is checked
    /// between buckets; remaining buckets are left unestimated.
    pub fn estimate_probabilities(
        &mut self,
        settings: &EstimatorSettings,
        waiting: &dyn WaitingHandler,
    ) {
        waiting.reset_progress();
        waiting.set_max(self.n_points());
        for charge in self.canonical_charges() {
            if waiting.is_cancelled() {
                return;
            }
            if let Some(mut map) = self.maps.get_mut(&charge) {
                map.estimate_probabilities(settings, waiting);
            }
        }
    }

    /// Derive the score threshold of every canonical bucket
    pub fn set_threshold(
        &mut self,
        threshold_type: ThresholdType,
        threshold: f64,
    ) -> Result<(), Error> {
        for charge in self.canonical_charges() {
            if let Some(mut map) = self.maps.get_mut(&charge) {
                map.apply_threshold(threshold_type, threshold)?;
            }
        }
        Ok(())
    }

    /// Canonical charges whose buckets cannot support validation at
    /// `minimal_fdr` (percent)
    pub fn suspicious_input(&self, minimal_fdr: f64) -> Vec<u8> {
        self.canonical_charges()
            .into_iter()
            .filter(|charge| {
                self.maps
                    .get(charge)
                    .map_or(false, |map| map.suspicious_input(minimal_fdr))
            })
            .collect()
    }

    pub fn filters(&self) -> &[MatchFilter] {
        &self.filters
    }

    pub fn set_filters(&mut self, filters: Vec<MatchFilter>) {
        self.filters = filters;
    }

    pub fn add_filter(&mut self, filter: MatchFilter) {
        self.filters.push(filter);
    }

    /// Validation level of a match, against the threshold of its bucket and
    /// the doubtful-match filters
    pub fn validate(
        &self,
        charge: u8,
        score: f64,
        decoy: bool,
        quality: &MatchQuality,
    ) -> Result<MatchValidationLevel, Error> {
        self.with_bucket(charge, |map| {
            validate_match(map.results(), score, decoy, quality, &self.filters)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::identification::{ModificationMatch, SpectrumMatchLike};
    use crate::waiting::ProgressCounter;

    struct Psm {
        charge: Option<u8>,
        decoy: bool,
    }

    impl SpectrumMatchLike for Psm {
        fn best_charge(&self) -> Option<u8> {
            self.charge
        }

        fn is_decoy(&self) -> bool {
            self.decoy
        }

        fn modifications(&self) -> &[ModificationMatch] {
            &[]
        }
    }

    fn fill(map: &PsmSpecificMap, charge: u8, targets: usize, decoys: usize) {
        for i in 0..targets {
            map.add_charge_point(charge, 40.0 + (i % 50) as f64 * 0.2, false);
        }
        for i in 0..decoys {
            map.add_charge_point(charge, (i % 50) as f64 * 0.2, true);
        }
    }

    #[test]
    fn grouping_walks_ascending_charges() {
        let grouping = group_charges([(4, false), (2, true), (1, false), (3, false)]);
        assert_eq!(grouping, BTreeMap::from([(3, 2), (4, 2)]));

        // The first charge is a reference even when weak
        let grouping = group_charges([(1, false), (2, false), (3, true)]);
        assert_eq!(grouping, BTreeMap::from([(2, 1)]));
    }

    #[test]
    fn undetermined_charge_absorbs_nothing() {
        let grouping = group_charges([(0, false), (1, false), (2, true), (3, false)]);
        assert_eq!(grouping, BTreeMap::from([(3, 2)]));

        let grouping = group_charges([(0, true), (1, false)]);
        assert!(grouping.is_empty());

        let grouping = group_charges([(0, false), (1, false), (2, false)]);
        assert_eq!(grouping, BTreeMap::from([(2, 1)]));
    }

    #[test]
    fn chain_merge() {
        let mut map = PsmSpecificMap::default();
        fill(&map, 1, 20, 5);
        fill(&map, 2, 150, 30);
        fill(&map, 3, 20, 5);
        fill(&map, 4, 10, 2);
        map.cure();

        assert_eq!(map.corrected_key(1), 1);
        assert_eq!(map.corrected_key(2), 2);
        assert_eq!(map.corrected_key(3), 2);
        assert_eq!(map.corrected_key(4), 2);
        assert_eq!(
            map.keys(),
            BTreeMap::from([(1, "1".to_string()), (2, "2, 3, 4".to_string())])
        );
        assert_eq!(map.with_bucket(4, |m| m.map_size()).unwrap(), 180 + 25 + 12);
        assert_eq!(map.n_points(), 25 + 217);
    }

    #[test]
    fn undetermined_charge_is_bucket_zero() {
        let map = PsmSpecificMap::default();
        map.add_point(
            12.0,
            &Psm {
                charge: None,
                decoy: false,
            },
        );
        map.add_point(
            3.0,
            &Psm {
                charge: Some(2),
                decoy: true,
            },
        );
        assert_eq!(map.charges(), vec![0, 2]);
        assert_eq!(map.max_charge(), Some(2));
    }

    #[test]
    fn missing_bucket_is_an_error() {
        let map = PsmSpecificMap::default();
        assert!(matches!(
            map.probability(3, 10.0),
            Err(Error::MissingBucket(_))
        ));
    }

    #[test]
    fn estimate_and_validate() {
        let mut map = PsmSpecificMap::default();
        fill(&map, 2, 150, 30);
        fill(&map, 3, 30, 10);
        map.cure();

        let waiting = ProgressCounter::default();
        map.estimate_probabilities(&EstimatorSettings::default(), &waiting);
        assert_eq!(waiting.progress(), 220);

        map.set_threshold(ThresholdType::Fdr, 1.0).unwrap();
        let strong = MatchQuality {
            sequence_coverage: Some(80.0),
            ..Default::default()
        };
        let weak = MatchQuality {
            sequence_coverage: Some(10.0),
            ..Default::default()
        };
        assert_eq!(
            map.validate(3, 48.0, false, &strong).unwrap(),
            MatchValidationLevel::Confident
        );
        assert_eq!(
            map.validate(3, 48.0, false, &weak).unwrap(),
            MatchValidationLevel::Doubtful
        );
        assert!(map.suspicious_input(1.0).is_empty());
    }

    #[test]
    fn cancelled_estimation_leaves_buckets_unestimated() {
        let mut map = PsmSpecificMap::default();
        fill(&map, 2, 150, 30);
        map.cure();

        let waiting = ProgressCounter::default();
        waiting.cancel();
        map.estimate_probabilities(&EstimatorSettings::default(), &waiting);
        assert!(matches!(map.probability(2, 45.0), Err(Error::NotEstimated)));
    }

    #[test]
    fn filters_are_configurable() {
        let mut map = PsmSpecificMap::default();
        assert_eq!(map.filters().len(), 1);
        map.add_filter(MatchFilter::PrecursorError { max_ppm: 10.0 });
        assert_eq!(map.filters().len(), 2);
        map.set_filters(Vec::new());
        assert!(map.filters().is_empty());
    }
}
