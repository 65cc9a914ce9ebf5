use crate::input::Parameters;
use anyhow::Context;
use fnv::FnvHashMap;
use log::info;
use rayon::prelude::*;
use serde::Serialize;
use shaker_core::identification::{
    charge_or_undetermined, ModificationMatch, PeptideMatch, SpectrumMatch,
};
use shaker_core::input_map::{Contribution, InputMap};
use shaker_core::keys::{PeptideKey, SiteSet};
use shaker_core::peptide_map::PeptideSpecificMap;
use shaker_core::psm_map::PsmSpecificMap;
use shaker_core::ptm_map::PsmPtmMap;
use shaker_core::ptm_scoring::PtmScoring;
use shaker_core::target_decoy::{TargetDecoyResults, DEFAULT_MINIMAL_FDR};
use shaker_core::validation::MatchValidationLevel;
use shaker_core::waiting::{ProgressCounter, WaitingHandler};
use shaker_core::Error;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Instant;

/// Validation outcome of a spectrum match
#[derive(Clone, Debug)]
pub struct ValidatedPsm {
    pub psm: SpectrumMatch,
    pub posterior_error: f64,
    pub level: MatchValidationLevel,
    /// Validation level of each localized modification, by modification name
    pub localizations: Vec<(String, MatchValidationLevel)>,
}

/// Validation outcome of a peptide, inferred from its spectrum matches
#[derive(Clone, Debug)]
pub struct ValidatedPeptide {
    pub peptide: PeptideMatch,
    pub key: PeptideKey,
    pub scorings: Vec<PtmScoring>,
    pub posterior_error: f64,
    pub level: MatchValidationLevel,
}

#[derive(Serialize, Default, Debug)]
pub struct Suspicious {
    pub engines: Vec<usize>,
    pub charges: Vec<u8>,
    pub peptide_keys: Vec<String>,
    pub ptms: BTreeMap<String, Vec<String>>,
}

/// Everything written to `results.json` besides the parameters
#[derive(Serialize, Default, Debug)]
pub struct Summary {
    pub psm_groups: BTreeMap<u8, String>,
    pub psm_thresholds: BTreeMap<u8, TargetDecoyResults>,
    pub peptide_groups: Vec<String>,
    pub peptide_thresholds: BTreeMap<String, TargetDecoyResults>,
    pub ptm_groups: BTreeMap<String, BTreeMap<u8, String>>,
    pub ptm_thresholds: BTreeMap<String, BTreeMap<u8, TargetDecoyResults>>,
    pub suspicious: Suspicious,
    pub contributions: BTreeMap<usize, Contribution>,
    pub validated_psms: usize,
    pub validated_peptides: usize,
    pub confident_localizations: usize,
}

#[derive(Debug, Default)]
pub struct Validation {
    pub psms: Vec<ValidatedPsm>,
    pub peptides: Vec<ValidatedPeptide>,
    pub summary: Summary,
}

/// Peptide under construction: best supporting match and merged
/// localization scores, per modification
#[derive(Clone)]
struct PeptideEntry {
    peptide: PeptideMatch,
    scorings: BTreeMap<String, PtmScoring>,
}

impl PeptideEntry {
    fn new(psm: &SpectrumMatch) -> Self {
        let mut scorings: BTreeMap<String, PtmScoring> = BTreeMap::new();
        for ptm in &psm.ptms {
            let scoring = scorings
                .entry(ptm.modification.clone())
                .or_insert_with(|| PtmScoring::new(ptm.modification.as_str()));
            let sites = SiteSet::new(ptm.sites.iter().copied());
            if let Some(delta) = ptm.delta_score {
                scoring.add_delta_score(sites.clone(), delta);
            }
            if let Some(a_score) = ptm.a_score {
                scoring.add_a_score(sites, a_score);
            }
        }
        Self {
            peptide: PeptideMatch {
                sequence: psm.peptide.clone(),
                modifications: psm.modifications.clone(),
                decoy: psm.decoy,
                score: psm.score,
                spectrum_count: 1,
            },
            scorings,
        }
    }

    fn merge(&mut self, other: PeptideEntry) {
        self.peptide.score = self.peptide.score.max(other.peptide.score);
        self.peptide.spectrum_count += other.peptide.spectrum_count;
        for (modification, scoring) in other.scorings {
            match self.scorings.get_mut(&modification) {
                Some(existing) => existing.add_all(&scoring),
                None => {
                    self.scorings.insert(modification, scoring);
                }
            }
        }
    }
}

type PeptideId = (String, Vec<ModificationMatch>, bool);

fn peptide_id(psm: &SpectrumMatch) -> PeptideId {
    let mut modifications = psm.modifications.clone();
    modifications.sort();
    (psm.peptide.clone(), modifications, psm.decoy)
}

/// Collapse spectrum matches into peptides, keeping the best score
fn infer_peptides(matches: &[SpectrumMatch]) -> Vec<PeptideEntry> {
    let peptides = matches
        .par_iter()
        .fold(FnvHashMap::default, |mut acc: FnvHashMap<PeptideId, PeptideEntry>, psm| {
            let entry = PeptideEntry::new(psm);
            match acc.get_mut(&peptide_id(psm)) {
                Some(existing) => existing.merge(entry),
                None => {
                    acc.insert(peptide_id(psm), entry);
                }
            }
            acc
        })
        .reduce(FnvHashMap::default, |mut acc, other| {
            for (id, entry) in other {
                match acc.get_mut(&id) {
                    Some(existing) => existing.merge(entry),
                    None => {
                        acc.insert(id, entry);
                    }
                }
            }
            acc
        });

    let mut peptides = peptides.into_iter().collect::<Vec<_>>();
    peptides.sort_by(|a, b| a.0.cmp(&b.0));
    peptides.into_iter().map(|(_, entry)| entry).collect()
}

fn mass_label(mass: f64) -> String {
    format!("{:.6}", mass)
}

pub struct Runner {
    pub parameters: Parameters,
    waiting: ProgressCounter,
    start: Instant,
}

impl Runner {
    pub fn new(parameters: Parameters) -> Self {
        Self {
            parameters,
            waiting: ProgressCounter::new("validation"),
            start: Instant::now(),
        }
    }

    /// Progress and cancellation of the running validation
    pub fn waiting(&self) -> &ProgressCounter {
        &self.waiting
    }

    fn check_cancelled(&self) -> Result<(), Error> {
        match self.waiting.is_cancelled() {
            true => Err(Error::Cancelled),
            false => Ok(()),
        }
    }

    /// Add every observation of `matches` to the maps. Cancellation is
    /// polled before each match.
    fn fill(
        &self,
        matches: &[SpectrumMatch],
        inputs: &InputMap,
        psms: &PsmSpecificMap,
        ptms: &PsmPtmMap,
    ) -> Result<(), Error> {
        let waiting = &self.waiting;
        waiting.reset_progress();
        waiting.set_max(matches.len());
        matches.par_iter().try_for_each(|psm| {
            self.check_cancelled()?;
            for hit in &psm.engines {
                inputs.add_entry(hit.engine, &psm.spectrum_file, hit.e_value, psm.decoy);
            }
            psms.add_point(psm.score, psm);
            for ptm in &psm.ptms {
                ptms.add_point(ptm.mass, ptm.score, psm, ptm.conflict);
            }
            waiting.increment();
            Ok(())
        })
    }

    pub fn make_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        self.parameters.output_directory.join(file_name.as_ref())
    }

    pub fn load_matches(&self) -> anyhow::Result<Vec<SpectrumMatch>> {
        let start = Instant::now();
        let matches = self
            .parameters
            .match_paths
            .par_iter()
            .map(|path| -> anyhow::Result<Vec<SpectrumMatch>> {
                let matches = shaker_core::read_json::<_, Vec<SpectrumMatch>>(path)
                    .with_context(|| format!("Failed to read spectrum matches from `{path}`"))?;
                log::trace!("- {}: read {} spectrum matches", path, matches.len());
                Ok(matches)
            })
            .collect::<anyhow::Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        info!(
            "- loaded {} spectrum matches in {} ms",
            matches.len(),
            start.elapsed().as_millis()
        );
        Ok(matches)
    }

    /// Fill every map, estimate probabilities, derive thresholds and
    /// validate each match
    pub fn validate(&self, matches: Vec<SpectrumMatch>) -> anyhow::Result<Validation> {
        let settings = &self.parameters.validation;

        let mut inputs = InputMap::default();
        let mut psms = PsmSpecificMap::new(settings.doubtful_filters.clone());
        let mut ptms = PsmPtmMap::default();
        self.fill(&matches, &inputs, &psms, &ptms)?;

        let entries = infer_peptides(&matches);
        let mut peptides = PeptideSpecificMap::default();
        entries.par_iter().try_for_each(|entry| {
            self.check_cancelled()?;
            peptides.add_point(entry.peptide.score, &entry.peptide);
            Ok::<_, Error>(())
        })?;

        psms.cure();
        peptides.cure();
        ptms.clean();

        let start = Instant::now();
        let estimator = &settings.estimator;
        log::debug!("estimating engine probabilities");
        inputs.estimate_probabilities(estimator, &self.waiting);
        log::debug!("estimating psm probabilities");
        psms.estimate_probabilities(estimator, &self.waiting);
        log::debug!("estimating peptide probabilities");
        peptides.estimate_probabilities(estimator, &self.waiting);
        log::debug!("estimating ptm probabilities");
        ptms.estimate_probabilities(estimator, &self.waiting);
        self.check_cancelled()?;
        info!("- estimate: {:8} ms", start.elapsed().as_millis());

        psms.set_threshold(settings.threshold_type, settings.psm_fdr)?;
        peptides.set_threshold(settings.threshold_type, settings.peptide_fdr)?;
        ptms.set_threshold(settings.threshold_type, settings.ptm_flr)?;

        let mut summary = Summary {
            suspicious: Suspicious {
                engines: inputs.suspicious_input(DEFAULT_MINIMAL_FDR),
                charges: psms.suspicious_input(settings.psm_fdr),
                peptide_keys: peptides
                    .suspicious_input(settings.peptide_fdr)
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                ptms: ptms
                    .suspicious_input()
                    .into_iter()
                    .map(|(mass, labels)| (mass_label(mass.0), labels))
                    .collect(),
            },
            ..Default::default()
        };
        for engine in &summary.suspicious.engines {
            log::warn!("search engine {} does not separate targets from decoys", engine);
        }
        for charge in &summary.suspicious.charges {
            log::warn!("psm charge group {} cannot be validated reliably", charge);
        }
        for key in &summary.suspicious.peptide_keys {
            log::warn!("peptide group `{}` cannot be validated reliably", key);
        }
        for (mass, labels) in &summary.suspicious.ptms {
            log::warn!(
                "modification {} charge groups [{}] cannot be localized reliably",
                mass,
                labels.join("; ")
            );
        }

        inputs.reset_advocate_contributions();
        let validated = matches
            .into_par_iter()
            .map(|psm| -> anyhow::Result<ValidatedPsm> {
                let charge = charge_or_undetermined(&psm);
                let posterior_error = psms.probability(charge, psm.score)?;
                let level = psms.validate(charge, psm.score, psm.decoy, &psm.quality)?;

                if level.is_validated() {
                    let engines = psm
                        .engines
                        .iter()
                        .map(|hit| hit.engine)
                        .collect::<BTreeSet<_>>();
                    for engine in &engines {
                        inputs.add_advocate_contribution(
                            *engine,
                            &psm.spectrum_file,
                            engines.len() == 1,
                        );
                    }
                }

                let localizations = psm
                    .ptms
                    .iter()
                    .map(|ptm| {
                        ptms.validate(ptm.mass, charge, ptm.score)
                            .map(|level| (ptm.modification.clone(), level))
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(ValidatedPsm {
                    psm,
                    posterior_error,
                    level,
                    localizations,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let validated_peptides = entries
            .into_par_iter()
            .map(|entry| -> anyhow::Result<ValidatedPeptide> {
                let key = PeptideSpecificMap::key(&entry.peptide);
                let posterior_error = peptides.probability(&key, entry.peptide.score)?;
                let level = peptides.validate(&key, entry.peptide.score, entry.peptide.decoy)?;
                Ok(ValidatedPeptide {
                    peptide: entry.peptide,
                    key,
                    scorings: entry.scorings.into_values().collect(),
                    posterior_error,
                    level,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        summary.psm_groups = psms.keys();
        for charge in summary.psm_groups.keys() {
            let results = psms.with_bucket(*charge, |map| map.results().clone())?;
            if results.no_valid_threshold() {
                log::warn!("no valid threshold for psm charge group {}", charge);
            }
            summary.psm_thresholds.insert(*charge, results);
        }
        for key in peptides.keys() {
            let results = peptides.with_bucket(&key, |map| map.results().clone())?;
            summary.peptide_thresholds.insert(key.to_string(), results);
            summary.peptide_groups.push(key.to_string());
        }
        for mass in ptms.masses() {
            let groups = ptms.keys(mass)?;
            let mut thresholds = BTreeMap::new();
            for charge in groups.keys() {
                let results = ptms.with_bucket(mass, *charge, |map| map.results().clone())?;
                thresholds.insert(*charge, results);
            }
            summary.ptm_groups.insert(mass_label(mass), groups);
            summary.ptm_thresholds.insert(mass_label(mass), thresholds);
        }

        summary.contributions = inputs.contributions();
        summary.validated_psms = validated
            .iter()
            .filter(|psm| !psm.psm.decoy && psm.level.is_validated())
            .count();
        summary.validated_peptides = validated_peptides
            .iter()
            .filter(|peptide| !peptide.peptide.decoy && peptide.level.is_validated())
            .count();
        summary.confident_localizations = validated
            .iter()
            .flat_map(|psm| psm.localizations.iter())
            .filter(|(_, level)| *level == MatchValidationLevel::Confident)
            .count();

        info!(
            "discovered {} target peptide-spectrum matches at {}% FDR",
            summary.validated_psms, settings.psm_fdr
        );
        info!(
            "discovered {} target peptides at {}% FDR",
            summary.validated_peptides, settings.peptide_fdr
        );
        info!(
            "confidently localized {} modifications at {}% FLR",
            summary.confident_localizations, settings.ptm_flr
        );

        Ok(Validation {
            psms: validated,
            peptides: validated_peptides,
            summary,
        })
    }

    pub fn run(mut self) -> anyhow::Result<Validation> {
        let matches = self.load_matches()?;
        let validation = self.validate(matches)?;

        log::trace!("writing outputs");
        let path = self.write_psms(&validation.psms)?;
        self.parameters.output_paths.push(path);
        let path = self.write_peptides(&validation.peptides)?;
        self.parameters.output_paths.push(path);

        let path = self.make_path("results.json");
        self.parameters
            .output_paths
            .push(path.to_string_lossy().into_owned());
        let results = serde_json::json!({
            "parameters": &self.parameters,
            "summary": &validation.summary,
        });
        println!("{}", serde_json::to_string_pretty(&self.parameters)?);
        std::fs::write(&path, serde_json::to_vec_pretty(&results)?)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;

        info!("finished in {}s", self.start.elapsed().as_secs());
        Ok(validation)
    }
}
