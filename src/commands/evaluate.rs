use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::EvaluateArgs;
use crate::concepts::{self, ConceptMap};
use crate::model::{EVALUATED_FIELDS, Record};
use crate::similarity::{best_close_match, is_near_match, sequence_ratio};
use crate::util::{now_utc_string, parse_flexible_date, read_records, sha256_file, write_json_pretty};

const NEAR_MATCH_RATIO: f64 = 0.75;
const TOKEN_OVERLAP_MIN: f64 = 0.5;

#[derive(Debug, Clone, Serialize)]
pub struct FieldAccuracy {
    pub compared: usize,
    pub matched: usize,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldMismatch {
    pub filename: String,
    pub field: String,
    pub candidate: String,
    pub gold: String,
}

#[derive(Debug, Serialize)]
pub struct Evaluation {
    pub compared_rows: usize,
    pub missing_filenames: Vec<String>,
    pub extra_filenames: Vec<String>,
    pub per_field: BTreeMap<String, FieldAccuracy>,
    pub overall_accuracy: f64,
    pub mismatches: Vec<FieldMismatch>,
}

#[derive(Debug, Serialize)]
struct AccuracyReport {
    manifest_version: u32,
    generated_at: String,
    candidate_path: String,
    gold_path: String,
    candidate_sha256: String,
    gold_sha256: String,
    date_tolerance_days: i64,
    #[serde(flatten)]
    evaluation: Evaluation,
}

pub fn run(args: EvaluateArgs) -> Result<()> {
    let candidates = read_records(&args.candidate_csv)?;
    let gold = read_records(&args.gold_csv)?;

    info!(
        candidate = %args.candidate_csv.display(),
        gold = %args.gold_csv.display(),
        candidate_rows = candidates.len(),
        gold_rows = gold.len(),
        date_tolerance_days = args.date_tolerance_days,
        "comparing candidate records to gold standard"
    );

    let evaluation = evaluate_records(&candidates, &gold, args.date_tolerance_days);

    if !evaluation.missing_filenames.is_empty() {
        warn!(
            count = evaluation.missing_filenames.len(),
            "gold filenames missing from candidate set"
        );
    }
    if !evaluation.extra_filenames.is_empty() {
        warn!(
            count = evaluation.extra_filenames.len(),
            "candidate filenames absent from gold set"
        );
    }

    for (field, accuracy) in &evaluation.per_field {
        info!(
            field = %field,
            matched = accuracy.matched,
            compared = accuracy.compared,
            accuracy = format!("{:.2}%", accuracy.accuracy * 100.0).as_str(),
            "field accuracy"
        );
    }
    info!(
        overall = format!("{:.2}%", evaluation.overall_accuracy * 100.0).as_str(),
        mismatches = evaluation.mismatches.len(),
        "overall accuracy"
    );

    let report_path = args.report_path.clone().unwrap_or_else(|| {
        args.candidate_csv.with_extension("accuracy.json")
    });
    let report = AccuracyReport {
        manifest_version: 1,
        generated_at: now_utc_string(),
        candidate_path: args.candidate_csv.display().to_string(),
        gold_path: args.gold_csv.display().to_string(),
        candidate_sha256: sha256_file(&args.candidate_csv)?,
        gold_sha256: sha256_file(&args.gold_csv)?,
        date_tolerance_days: args.date_tolerance_days,
        evaluation,
    };
    write_json_pretty(&report_path, &report)?;
    info!(path = %report_path.display(), "wrote accuracy report");

    Ok(())
}

pub(crate) fn evaluate_records(
    candidates: &[Record],
    gold: &[Record],
    date_tolerance_days: i64,
) -> Evaluation {
    let mut candidate_index: HashMap<&str, &Record> = HashMap::new();
    for record in candidates {
        // First row wins, matching the dedup policy of the cleaned dataset.
        candidate_index
            .entry(record.filename.as_str())
            .or_insert(record);
    }

    let gold_filenames: HashSet<&str> = gold.iter().map(|r| r.filename.as_str()).collect();
    let missing_filenames: Vec<String> = gold
        .iter()
        .filter(|r| !candidate_index.contains_key(r.filename.as_str()))
        .map(|r| r.filename.clone())
        .collect();
    let mut extra_filenames: Vec<String> = candidate_index
        .keys()
        .filter(|name| !gold_filenames.contains(*name))
        .map(|name| name.to_string())
        .collect();
    extra_filenames.sort();

    let common: Vec<(&Record, &Record)> = gold
        .iter()
        .filter_map(|gold_record| {
            candidate_index
                .get(gold_record.filename.as_str())
                .map(|candidate| (*candidate, gold_record))
        })
        .collect();

    let mut per_field = BTreeMap::new();
    let mut mismatches = Vec::new();

    for field in EVALUATED_FIELDS {
        let mut matched = 0_usize;

        for (candidate, gold_record) in &common {
            let candidate_value = normalized(candidate.field(field).unwrap_or_default());
            let gold_value = normalized(gold_record.field(field).unwrap_or_default());

            if field_matches(field, &candidate_value, &gold_value, date_tolerance_days) {
                matched += 1;
            } else {
                mismatches.push(FieldMismatch {
                    filename: gold_record.filename.clone(),
                    field: field.to_string(),
                    candidate: candidate_value,
                    gold: gold_value,
                });
            }
        }

        let compared = common.len();
        per_field.insert(
            field.to_string(),
            FieldAccuracy {
                compared,
                matched,
                accuracy: if compared == 0 {
                    0.0
                } else {
                    matched as f64 / compared as f64
                },
            },
        );
    }

    // Unweighted mean over fields, not a pooled per-cell average.
    let overall_accuracy = if per_field.is_empty() {
        0.0
    } else {
        per_field.values().map(|f| f.accuracy).sum::<f64>() / per_field.len() as f64
    };

    Evaluation {
        compared_rows: common.len(),
        missing_filenames,
        extra_filenames,
        per_field,
        overall_accuracy,
        mismatches,
    }
}

fn normalized(value: &str) -> String {
    value.trim().to_lowercase()
}

// First applicable rule wins; the empty-vs-empty rule applies to every field.
pub(crate) fn field_matches(
    field: &str,
    candidate: &str,
    gold: &str,
    date_tolerance_days: i64,
) -> bool {
    if candidate.is_empty() && gold.is_empty() {
        return true;
    }

    match field {
        "year" => year_matches(candidate, gold),
        "season" | "state" => candidate == gold || token_sets_intersect(candidate, gold),
        "start_date" | "end_date" => date_matches(candidate, gold, date_tolerance_days),
        "purpose" => concept_list_matches(candidate, gold, &concepts::PURPOSE),
        "agent" => concept_list_matches(candidate, gold, &concepts::AGENT),
        "apparatus" => apparatus_matches(candidate, gold),
        "operator_affiliation" => operator_matches(candidate, gold),
        "target_area" => area_matches(candidate, gold, None),
        "control_area" => area_matches(candidate, gold, Some(&concepts::CONTROL_AREA)),
        _ => candidate == gold,
    }
}

// The tolerance is asymmetric: a winter campaign spanning the year boundary is
// commonly reported against the later calendar year, never the earlier one.
fn year_matches(candidate: &str, gold: &str) -> bool {
    let (Ok(candidate_year), Ok(gold_year)) = (candidate.parse::<i64>(), gold.parse::<i64>())
    else {
        return false;
    };

    (0..=1).contains(&(candidate_year - gold_year))
}

fn split_tokens(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .collect()
}

fn token_sets_intersect(candidate: &str, gold: &str) -> bool {
    let candidate_set = split_tokens(candidate);
    let gold_set = split_tokens(gold);
    !candidate_set.is_disjoint(&gold_set)
}

fn date_matches(candidate: &str, gold: &str, tolerance_days: i64) -> bool {
    if candidate == gold {
        return true;
    }
    if tolerance_days <= 0 {
        return false;
    }

    let (Some(candidate_date), Some(gold_date)) =
        (parse_flexible_date(candidate), parse_flexible_date(gold))
    else {
        return false;
    };

    (candidate_date - gold_date).num_days().abs() <= tolerance_days
}

fn concept_list_matches(candidate: &str, gold: &str, vocabulary: &ConceptMap) -> bool {
    let candidate_set = split_tokens(candidate);
    let gold_set = split_tokens(gold);

    if gold_set.is_empty() {
        return false;
    }
    if candidate_set == gold_set {
        return true;
    }

    gold_set.iter().all(|gold_token| {
        candidate_set.iter().any(|candidate_token| {
            candidate_token == gold_token
                || vocabulary.share_group(candidate_token, gold_token)
                || is_near_match(candidate_token, gold_token, NEAR_MATCH_RATIO)
        })
    })
}

fn apparatus_matches(candidate: &str, gold: &str) -> bool {
    let candidate_set = split_tokens(candidate);
    let gold_set = split_tokens(gold);

    if !candidate_set.is_empty() && candidate_set == gold_set {
        return true;
    }

    candidate_set.iter().any(|candidate_token| {
        best_close_match(
            candidate_token,
            gold_set.iter().map(String::as_str),
            NEAR_MATCH_RATIO,
        )
        .is_some()
    })
}

fn operator_matches(candidate: &str, gold: &str) -> bool {
    candidate == gold
        || sequence_ratio(candidate, gold) >= NEAR_MATCH_RATIO
        || concepts::OPERATOR.share_group(candidate, gold)
}

fn area_matches(candidate: &str, gold: &str, no_control: Option<&ConceptMap>) -> bool {
    if candidate == gold {
        return true;
    }
    if token_overlap_ratio(candidate, gold) >= TOKEN_OVERLAP_MIN {
        return true;
    }

    no_control
        .map(|vocabulary| vocabulary.share_group(candidate, gold))
        .unwrap_or(false)
}

// Fraction of the gold value's alphanumeric tokens that also appear in the
// candidate value.
fn token_overlap_ratio(candidate: &str, gold: &str) -> f64 {
    let gold_tokens: HashSet<String> = alphanumeric_tokens(gold);
    if gold_tokens.is_empty() {
        return 0.0;
    }

    let candidate_tokens = alphanumeric_tokens(candidate);
    let shared = gold_tokens
        .iter()
        .filter(|token| candidate_tokens.contains(*token))
        .count();

    shared as f64 / gold_tokens.len() as f64
}

fn alphanumeric_tokens(value: &str) -> HashSet<String> {
    value
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gold_record(filename: &str) -> Record {
        let mut record = Record::empty(filename);
        record.project = "north fork seeding program".to_string();
        record.year = "2007".to_string();
        record.season = "winter, spring".to_string();
        record.state = "utah".to_string();
        record.operator_affiliation = "weather modification inc".to_string();
        record.agent = "silver iodide".to_string();
        record.apparatus = "ground".to_string();
        record.purpose = "augment snowpack".to_string();
        record.target_area = "wasatch range".to_string();
        record.control_area = "none".to_string();
        record.start_date = "2007-11-01".to_string();
        record.end_date = "2008-03-31".to_string();
        record
    }

    #[test]
    fn identical_record_sets_score_one_everywhere() {
        let gold = vec![gold_record("a.pdf"), gold_record("b.pdf")];
        let evaluation = evaluate_records(&gold, &gold, 0);

        assert_eq!(evaluation.compared_rows, 2);
        assert!(evaluation.missing_filenames.is_empty());
        assert!(evaluation.mismatches.is_empty());
        assert_eq!(evaluation.overall_accuracy, 1.0);
        for accuracy in evaluation.per_field.values() {
            assert_eq!(accuracy.accuracy, 1.0);
        }
    }

    #[test]
    fn gold_only_rows_are_reported_missing_and_excluded_from_denominators() {
        let gold = vec![gold_record("a.pdf"), gold_record("gone.pdf")];
        let candidates = vec![gold_record("a.pdf")];

        let evaluation = evaluate_records(&candidates, &gold, 0);
        assert_eq!(evaluation.missing_filenames, vec!["gone.pdf"]);
        assert_eq!(evaluation.compared_rows, 1);
        for accuracy in evaluation.per_field.values() {
            assert_eq!(accuracy.compared, 1);
        }
        assert_eq!(evaluation.overall_accuracy, 1.0);
    }

    #[test]
    fn extra_candidate_rows_are_reported_but_not_scored() {
        let gold = vec![gold_record("a.pdf")];
        let candidates = vec![gold_record("a.pdf"), gold_record("extra.pdf")];

        let evaluation = evaluate_records(&candidates, &gold, 0);
        assert_eq!(evaluation.extra_filenames, vec!["extra.pdf"]);
        assert_eq!(evaluation.compared_rows, 1);
    }

    #[test]
    fn season_matches_on_token_intersection() {
        assert!(field_matches("season", "spring", "winter, spring", 0));
        assert!(field_matches("season", "winter, spring", "winter, spring", 0));
        assert!(!field_matches("season", "summer", "winter, spring", 0));
    }

    #[test]
    fn year_tolerates_the_later_boundary_year_only() {
        assert!(field_matches("year", "2007", "2007", 0));
        assert!(field_matches("year", "2008", "2007", 0));
        assert!(!field_matches("year", "2006", "2007", 0));
        assert!(!field_matches("year", "unknown", "unknown", 0));
    }

    #[test]
    fn purpose_matches_through_shared_concept_groups() {
        assert!(field_matches(
            "purpose",
            "increase snowpack",
            "augment snowpack",
            0
        ));
        assert!(!field_matches(
            "purpose",
            "suppress hail",
            "augment snowpack",
            0
        ));
        // Every gold token needs a counterpart, not just one.
        assert!(!field_matches(
            "purpose",
            "increase snowpack",
            "augment snowpack, suppress hail",
            0
        ));
        assert!(field_matches(
            "purpose",
            "increase snowpack, hail mitigation",
            "augment snowpack, suppress hail",
            0
        ));
    }

    #[test]
    fn agent_accepts_near_string_spellings() {
        assert!(field_matches("agent", "silver iodde", "silver iodide", 0));
        assert!(field_matches("agent", "agi", "silver iodide", 0));
        assert!(!field_matches("agent", "dry ice", "silver iodide", 0));
    }

    #[test]
    fn apparatus_matches_any_overlapping_token() {
        assert!(field_matches("apparatus", "ground, airborne", "ground, airborne", 0));
        assert!(field_matches("apparatus", "ground", "ground, airborne", 0));
        assert!(field_matches("apparatus", "gruond", "ground", 0));
        assert!(!field_matches("apparatus", "balloon", "ground", 0));
    }

    #[test]
    fn operator_matches_via_alias_group_or_similarity() {
        assert!(field_matches(
            "operator_affiliation",
            "weather modification llc",
            "weather modification inc",
            0
        ));
        assert!(field_matches(
            "operator_affiliation",
            "atmospherics inc.",
            "atmospherics inc",
            0
        ));
        assert!(!field_matches(
            "operator_affiliation",
            "belding farms",
            "clark county",
            0
        ));
    }

    #[test]
    fn target_area_matches_on_token_overlap_ratio() {
        assert!(field_matches(
            "target_area",
            "upper boise river basin",
            "boise river",
            0
        ));
        assert!(!field_matches(
            "target_area",
            "san joaquin river",
            "wasatch range",
            0
        ));
    }

    #[test]
    fn control_area_equates_the_no_control_spellings() {
        assert!(field_matches("control_area", "none", "not specified", 0));
        assert!(field_matches("control_area", "", "none", 0));
        assert!(!field_matches("control_area", "adjacent areas", "none", 0));
    }

    #[test]
    fn dates_match_exactly_or_within_the_configured_window() {
        assert!(field_matches("start_date", "2007-11-01", "2007-11-01", 0));
        assert!(!field_matches("start_date", "2007-11-15", "2007-11-01", 0));
        assert!(field_matches("start_date", "2007-11-15", "2007-11-01", 30));
        assert!(!field_matches("start_date", "2008-01-15", "2007-11-01", 30));
    }

    #[test]
    fn unlisted_fields_require_exact_equality() {
        assert!(field_matches("project", "kings river program", "kings river program", 0));
        assert!(!field_matches("project", "kings river", "kings river program", 0));
    }

    #[test]
    fn overall_accuracy_averages_fields_unweighted() {
        let gold = vec![gold_record("a.pdf")];
        let mut candidate = gold_record("a.pdf");
        candidate.year = "1999".to_string();

        let evaluation = evaluate_records(&[candidate], &gold, 0);
        let expected = 11.0 / 12.0;
        assert!((evaluation.overall_accuracy - expected).abs() < 1e-9);
        assert_eq!(evaluation.mismatches.len(), 1);
        assert_eq!(evaluation.mismatches[0].field, "year");
        assert_eq!(evaluation.mismatches[0].filename, "a.pdf");
    }
}
