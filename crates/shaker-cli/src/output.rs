use anyhow::Context;
use rayon::prelude::*;
use shaker_core::identification::charge_or_undetermined;
use shaker_core::keys::ModificationSignature;
use shaker_core::validation::MatchValidationLevel;

use crate::runner::{Runner, ValidatedPeptide, ValidatedPsm};

fn label(decoy: bool) -> i8 {
    match decoy {
        true => -1,
        false => 1,
    }
}

fn localizations(levels: &[(String, MatchValidationLevel)]) -> String {
    levels
        .iter()
        .map(|(modification, level)| format!("{}:{}", modification, level))
        .collect::<Vec<_>>()
        .join(";")
}

impl Runner {
    pub fn serialize_psm(&self, validated: &ValidatedPsm) -> csv::ByteRecord {
        let psm = &validated.psm;
        let mut record = csv::ByteRecord::new();
        record.push_field(psm.spectrum_file.as_bytes());
        record.push_field(psm.spectrum_title.as_bytes());
        record.push_field(psm.peptide.as_bytes());
        record.push_field(
            ModificationSignature::from_modifications(&psm.modifications)
                .to_string()
                .as_bytes(),
        );
        record.push_field(itoa::Buffer::new().format(charge_or_undetermined(psm)).as_bytes());
        record.push_field(itoa::Buffer::new().format(label(psm.decoy)).as_bytes());
        record.push_field(ryu::Buffer::new().format(psm.score).as_bytes());
        record.push_field(
            ryu::Buffer::new()
                .format(validated.posterior_error)
                .as_bytes(),
        );
        record.push_field(validated.level.to_string().as_bytes());
        record.push_field(localizations(&validated.localizations).as_bytes());
        record
    }

    pub fn write_psms(&self, psms: &[ValidatedPsm]) -> anyhow::Result<String> {
        let path = self.make_path("psms.tsv");

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(vec![]);

        let headers = csv::ByteRecord::from(vec![
            "filename",
            "spectrum_title",
            "peptide",
            "modifications",
            "charge",
            "label",
            "score",
            "posterior_error",
            "validation",
            "localization",
        ]);

        wtr.write_byte_record(&headers)?;
        for record in psms
            .into_par_iter()
            .map(|psm| self.serialize_psm(psm))
            .collect::<Vec<_>>()
        {
            wtr.write_byte_record(&record)?;
        }

        wtr.flush()?;
        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;
        Ok(path.to_string_lossy().into_owned())
    }

    pub fn serialize_peptide(&self, validated: &ValidatedPeptide) -> csv::ByteRecord {
        let peptide = &validated.peptide;
        let best_sites = validated
            .scorings
            .iter()
            .filter_map(|scoring| {
                scoring
                    .best_delta_site_set()
                    .map(|(sites, _)| format!("{}:{}", scoring.modification(), sites))
            })
            .collect::<Vec<_>>()
            .join(";");

        let mut record = csv::ByteRecord::new();
        record.push_field(peptide.sequence.as_bytes());
        record.push_field(validated.key.to_string().as_bytes());
        record.push_field(itoa::Buffer::new().format(label(peptide.decoy)).as_bytes());
        record.push_field(ryu::Buffer::new().format(peptide.score).as_bytes());
        record.push_field(itoa::Buffer::new().format(peptide.spectrum_count).as_bytes());
        record.push_field(
            ryu::Buffer::new()
                .format(validated.posterior_error)
                .as_bytes(),
        );
        record.push_field(validated.level.to_string().as_bytes());
        record.push_field(best_sites.as_bytes());
        record
    }

    pub fn write_peptides(&self, peptides: &[ValidatedPeptide]) -> anyhow::Result<String> {
        let path = self.make_path("peptides.tsv");

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(vec![]);

        let headers = csv::ByteRecord::from(vec![
            "peptide",
            "modifications",
            "label",
            "score",
            "spectrum_count",
            "posterior_error",
            "validation",
            "best_sites",
        ]);

        wtr.write_byte_record(&headers)?;
        for record in peptides
            .into_par_iter()
            .map(|peptide| self.serialize_peptide(peptide))
            .collect::<Vec<_>>()
        {
            wtr.write_byte_record(&record)?;
        }

        wtr.flush()?;
        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;
        Ok(path.to_string_lossy().into_owned())
    }
}
