use shaker_core::identification::{ModificationMatch, SpectrumMatch};
use shaker_core::input_map::InputMap;
use shaker_core::peptide_map::PeptideSpecificMap;
use shaker_core::psm_map::PsmSpecificMap;
use shaker_core::settings::EstimatorSettings;
use shaker_core::target_decoy::ThresholdType;
use shaker_core::validation::{MatchQuality, MatchValidationLevel};
use shaker_core::waiting::ProgressCounter;
use std::collections::BTreeMap;

fn psm(charge: u8, score: f64, decoy: bool) -> SpectrumMatch {
    SpectrumMatch {
        spectrum_file: "run.mgf".into(),
        spectrum_title: format!("scan={}", score),
        peptide: "LQSRPAAPPAPGPGQLTLR".into(),
        charge: Some(charge),
        decoy,
        score,
        modifications: Vec::new(),
        engines: Vec::new(),
        quality: MatchQuality::default(),
        ptms: Vec::new(),
    }
}

fn matches() -> Vec<SpectrumMatch> {
    let mut matches = Vec::new();
    for i in 0..120 {
        matches.push(psm(2, 30.0 + (i % 60) as f64 * 0.25, false));
    }
    for i in 0..30 {
        matches.push(psm(2, (i % 60) as f64 * 0.25, true));
    }
    for i in 0..30 {
        matches.push(psm(3, 28.0 + (i % 60) as f64 * 0.25, false));
    }
    for i in 0..10 {
        matches.push(psm(3, 1.0 + (i % 60) as f64 * 0.25, true));
    }
    matches
}

#[test]
fn weak_charge_borrows_its_neighbour() -> anyhow::Result<()> {
    let mut map = PsmSpecificMap::default();
    for m in matches() {
        map.add_point(m.score, &m);
    }
    map.cure();

    assert_eq!(map.keys(), BTreeMap::from([(2, "2, 3".to_string())]));
    assert_eq!(map.corrected_key(3), 2);

    let waiting = ProgressCounter::new("psm probabilities");
    map.estimate_probabilities(&EstimatorSettings::default(), &waiting);
    assert_eq!(waiting.progress(), 190);

    for score in [0.5, 12.0, 29.0, 40.0] {
        assert_eq!(map.probability(3, score)?, map.probability(2, score)?);
    }

    map.set_threshold(ThresholdType::Fdr, 1.0)?;
    assert_eq!(
        map.validate(3, 40.0, false, &MatchQuality::default())?,
        MatchValidationLevel::Confident
    );
    assert_eq!(
        map.validate(3, 40.0, true, &MatchQuality::default())?,
        MatchValidationLevel::NotValidated
    );
    Ok(())
}

#[test]
fn concurrent_filling_matches_sequential() {
    use rayon::prelude::*;

    let matches = matches();
    let sequential = PsmSpecificMap::default();
    for m in &matches {
        sequential.add_point(m.score, m);
    }
    let parallel = PsmSpecificMap::default();
    matches.par_iter().for_each(|m| parallel.add_point(m.score, m));

    assert_eq!(sequential.charges(), parallel.charges());
    for charge in sequential.charges() {
        let a = sequential.with_bucket(charge, |m| m.map_size()).unwrap();
        let b = parallel.with_bucket(charge, |m| m.map_size()).unwrap();
        assert_eq!(a, b);
    }
}

#[test]
fn engines_and_peptides() -> anyhow::Result<()> {
    let mut inputs = InputMap::default();
    let peptides = PeptideSpecificMap::default();
    for (i, m) in matches().into_iter().enumerate() {
        let e_value = 10f64.powf(-m.score / 5.0);
        inputs.add_entry(1, &m.spectrum_file, e_value, m.decoy);

        let modifications = match i % 3 {
            0 => vec![ModificationMatch::variable("Oxidation", 4)],
            _ => Vec::new(),
        };
        let key = PeptideSpecificMap::key(&shaker_core::identification::PeptideMatch {
            sequence: m.peptide.clone(),
            modifications,
            decoy: m.decoy,
            score: m.score,
            spectrum_count: 1,
        });
        peptides.add_key_point(key, m.score, m.decoy);
    }

    inputs.estimate_probabilities(&EstimatorSettings::default(), &ProgressCounter::default());
    assert!(inputs.probability(1, 1e-8)? < 0.05);
    assert!(inputs.suspicious_input(1.0).is_empty());

    let mut peptides = peptides;
    peptides.cure();
    // 126 unmodified observations, 100 of them targets; 64 oxidized
    assert_eq!(peptides.keys().len(), 2);
    assert_eq!(peptides.grouped_keys().count(), 1);
    Ok(())
}
