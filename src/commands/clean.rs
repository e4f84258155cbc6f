use std::collections::HashSet;

use anyhow::Result;
use tracing::info;

use crate::cli::CleanArgs;
use crate::concepts;
use crate::model::{EVALUATED_FIELDS, Record};
use crate::util::{parse_flexible_date, read_records, write_records};

// Placeholder spellings the completion service emits for unknown values.
const MISSING_VALUE_TOKENS: [&str; 5] = ["n/a", "na", "nan", "null", "undetermined"];

pub fn run(args: CleanArgs) -> Result<()> {
    let records = read_records(&args.input_csv)?;
    let input_rows = records.len();

    let cleaned = clean_records(records);

    write_records(&args.output_csv, &cleaned)?;
    info!(
        input = %args.input_csv.display(),
        output = %args.output_csv.display(),
        input_rows,
        output_rows = cleaned.len(),
        duplicates_removed = input_rows - cleaned.len(),
        "cleaned dataset written"
    );

    Ok(())
}

pub(crate) fn clean_records(records: Vec<Record>) -> Vec<Record> {
    let mut seen = HashSet::new();
    let mut cleaned = Vec::with_capacity(records.len());

    for mut record in records {
        normalize_fields(&mut record);
        canonicalize_fields(&mut record);
        reformat_dates(&mut record);

        // First row wins on duplicate filenames.
        if !seen.insert(record.filename.clone()) {
            continue;
        }
        cleaned.push(record);
    }

    cleaned.sort_by(|a, b| a.filename.cmp(&b.filename));
    cleaned
}

fn normalize_fields(record: &mut Record) {
    for name in EVALUATED_FIELDS {
        let value = record.field(name).unwrap_or_default();
        let trimmed = value.trim().to_lowercase();
        let normalized = if MISSING_VALUE_TOKENS.contains(&trimmed.as_str()) {
            String::new()
        } else {
            trimmed
        };
        record.set_field(name, normalized);
    }
}

fn canonicalize_fields(record: &mut Record) {
    record.purpose = concepts::PURPOSE.canonicalize_joined(&record.purpose);
    record.agent = concepts::AGENT.canonicalize_joined(&record.agent);
    record.control_area = concepts::CONTROL_AREA.canonicalize_joined(&record.control_area);
    record.operator_affiliation = concepts::OPERATOR
        .canonicalize_joined(&record.operator_affiliation);
}

fn reformat_dates(record: &mut Record) {
    record.start_date = iso_or_blank(&record.start_date);
    record.end_date = iso_or_blank(&record.end_date);
}

fn iso_or_blank(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }

    match parse_flexible_date(value) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(filename: &str) -> Record {
        Record::empty(filename)
    }

    #[test]
    fn clean_lowercases_trims_and_blanks_placeholders() {
        let mut raw = record("b.pdf");
        raw.state = "  Utah ".to_string();
        raw.agent = "N/A".to_string();
        raw.project = "Undetermined".to_string();

        let cleaned = clean_records(vec![raw]);
        assert_eq!(cleaned[0].state, "utah");
        assert_eq!(cleaned[0].agent, "");
        assert_eq!(cleaned[0].project, "");
    }

    #[test]
    fn clean_canonicalizes_the_vocabulary_backed_fields() {
        let mut raw = record("a.pdf");
        raw.purpose = "Increase Snowpack and augment rainfall".to_string();
        raw.agent = "AgI; carbon dioxide".to_string();
        raw.control_area = "no control".to_string();
        raw.operator_affiliation = "Weather Modification LLC".to_string();

        let cleaned = clean_records(vec![raw]);
        assert_eq!(
            cleaned[0].purpose,
            "augment snowpack, increase precipitation"
        );
        assert_eq!(cleaned[0].agent, "silver iodide, carbon dioxide");
        assert_eq!(cleaned[0].control_area, "none");
        assert_eq!(cleaned[0].operator_affiliation, "weather modification inc");
    }

    #[test]
    fn clean_reformats_dates_and_blanks_unparseable_ones() {
        let mut raw = record("a.pdf");
        raw.start_date = "11/01/2007".to_string();
        raw.end_date = "ongoing through spring".to_string();

        let cleaned = clean_records(vec![raw]);
        assert_eq!(cleaned[0].start_date, "2007-11-01");
        assert_eq!(cleaned[0].end_date, "");
    }

    #[test]
    fn duplicate_filenames_keep_the_first_row_and_output_is_sorted() {
        let mut first = record("b.pdf");
        first.state = "utah".to_string();
        let mut duplicate = record("b.pdf");
        duplicate.state = "idaho".to_string();
        let other = record("a.pdf");

        let cleaned = clean_records(vec![first, duplicate, other]);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].filename, "a.pdf");
        assert_eq!(cleaned[1].filename, "b.pdf");
        assert_eq!(cleaned[1].state, "utah");
    }

    #[test]
    fn cleaning_is_idempotent() {
        let mut raw = record("a.pdf");
        raw.purpose = "snowfall enhancement and increase rain".to_string();
        raw.agent = "agi".to_string();
        raw.start_date = "01/15/2010".to_string();

        let once = clean_records(vec![raw]);
        let twice = clean_records(once.clone());
        assert_eq!(once, twice);
    }
}
