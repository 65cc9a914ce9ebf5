use anyhow::{ensure, Context};
use clap::ArgMatches;
use serde::{Deserialize, Serialize};
use shaker_core::settings::{EstimatorSettings, ValidationSettings};
use shaker_core::target_decoy::ThresholdType;
use shaker_core::validation::MatchFilter;
use std::path::PathBuf;

#[derive(Serialize)]
/// Actual validation parameters - may include overrides or default values not set by user
pub struct Parameters {
    pub version: String,
    pub validation: ValidationSettings,
    pub match_paths: Vec<String>,
    pub output_paths: Vec<String>,

    #[serde(skip_serializing)]
    pub output_directory: PathBuf,
}

#[derive(Deserialize, Default)]
/// Input validation parameters deserialized from JSON file
pub struct Input {
    threshold_type: Option<ThresholdType>,
    psm_fdr: Option<f64>,
    peptide_fdr: Option<f64>,
    ptm_flr: Option<f64>,
    estimator: Option<EstimatorOptions>,
    doubtful_filters: Option<Vec<MatchFilter>>,
    output_directory: Option<String>,
    match_paths: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct EstimatorOptions {
    bins: Option<usize>,
    monotonic: Option<bool>,
}

impl From<EstimatorOptions> for EstimatorSettings {
    fn from(value: EstimatorOptions) -> Self {
        let default = EstimatorSettings::default();
        let settings = EstimatorSettings {
            bins: value.bins.unwrap_or(default.bins),
            monotonic: value.monotonic.unwrap_or(default.monotonic),
        };
        if settings.bins < 100 {
            log::warn!("estimator.bins is lower than expected");
        }
        settings
    }
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let path = matches
            .get_one::<String>("parameters")
            .context("`parameters` must be set. For more information try '--help'")?;
        let mut input = Input::load(path)
            .with_context(|| format!("Failed to read parameters from `{path}`"))?;

        // Handle JSON configuration overrides
        if let Some(output_directory) = matches.get_one::<String>("output_directory") {
            log::trace!("overriding `output_directory` parameter.");
            input.output_directory = Some(output_directory.into());
        }
        if let Some(match_paths) = matches.get_many::<String>("match_paths") {
            log::trace!("overriding `match_paths` parameter.");
            input.match_paths = Some(match_paths.into_iter().map(|p| p.into()).collect());
        }

        ensure!(
            input.match_paths.as_ref().map_or(false, |p| !p.is_empty()),
            "`match_paths` must be set. For more information try '--help'"
        );

        Ok(input)
    }

    pub fn load<S: AsRef<str>>(path: S) -> anyhow::Result<Self> {
        shaker_core::read_json(path.as_ref()).map_err(anyhow::Error::from)
    }

    fn check_rate(name: &str, rate: f64) -> anyhow::Result<f64> {
        ensure!(
            rate > 0.0 && rate <= 100.0,
            "`{name}` is a percentage and must lie in (0, 100], got {rate}"
        );
        if rate > 10.0 {
            log::warn!("`{}` is set to {}%, rates are given in percent", name, rate);
        }
        Ok(rate)
    }

    pub fn build(self) -> anyhow::Result<Parameters> {
        let default = ValidationSettings::default();

        let validation = ValidationSettings {
            threshold_type: self.threshold_type.unwrap_or(default.threshold_type),
            psm_fdr: Self::check_rate("psm_fdr", self.psm_fdr.unwrap_or(default.psm_fdr))?,
            peptide_fdr: Self::check_rate(
                "peptide_fdr",
                self.peptide_fdr.unwrap_or(default.peptide_fdr),
            )?,
            ptm_flr: Self::check_rate("ptm_flr", self.ptm_flr.unwrap_or(default.ptm_flr))?,
            estimator: self.estimator.map(Into::into).unwrap_or_default(),
            doubtful_filters: self.doubtful_filters.unwrap_or(default.doubtful_filters),
        };

        let match_paths = self
            .match_paths
            .context("`match_paths` must be provided")?;

        let output_directory = match self.output_directory {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::create_dir_all(&path).with_context(|| {
                    format!("Failed to create output directory `{}`", path.display())
                })?;
                path
            }
            None => std::env::current_dir()?,
        };

        Ok(Parameters {
            version: clap::crate_version!().into(),
            validation,
            match_paths,
            output_paths: Vec::new(),
            output_directory,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn input(json: &str) -> Input {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let mut input = input(r#"{ "psm_fdr": 5.0, "estimator": { "bins": 500 } }"#);
        input.match_paths = Some(vec!["matches.json".into()]);
        input.output_directory = Some(std::env::temp_dir().to_string_lossy().into_owned());

        let parameters = input.build().unwrap();
        assert_eq!(parameters.validation.psm_fdr, 5.0);
        assert_eq!(parameters.validation.peptide_fdr, 1.0);
        assert_eq!(parameters.validation.estimator.bins, 500);
        assert!(parameters.validation.estimator.monotonic);
        assert_eq!(parameters.validation.threshold_type, ThresholdType::Fdr);
        assert_eq!(
            parameters.validation.doubtful_filters,
            MatchFilter::default_psm_filters()
        );
    }

    #[test]
    fn filters_and_threshold_type_deserialize() {
        let mut input = input(
            r#"{
                "threshold_type": "fnr",
                "doubtful_filters": [{ "precursor_error": { "max_ppm": 10.0 } }]
            }"#,
        );
        input.match_paths = Some(vec!["matches.json".into()]);
        input.output_directory = Some(std::env::temp_dir().to_string_lossy().into_owned());

        let parameters = input.build().unwrap();
        assert_eq!(parameters.validation.threshold_type, ThresholdType::Fnr);
        assert_eq!(
            parameters.validation.doubtful_filters,
            vec![MatchFilter::PrecursorError { max_ppm: 10.0 }]
        );
    }

    #[test]
    fn rates_must_be_percentages() {
        let mut input = input(r#"{ "peptide_fdr": 0.0 }"#);
        input.match_paths = Some(vec!["matches.json".into()]);
        assert!(input.build().is_err());
    }
}
