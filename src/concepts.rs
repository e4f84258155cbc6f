use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

static VALUE_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[;,&]|\band\b|\bplus\b").expect("separator regex is valid"));

const PURPOSE_GROUPS: &[&[&str]] = &[
    &[
        "augment snowpack",
        "increase snowpack",
        "snowpack augmentation",
        "snowpack enhancement",
        "augment snowfall",
        "increase snowfall",
        "snowfall augmentation",
        "snowfall enhancement",
        "snow augmentation",
        "winter precipitation",
        "augment snow",
    ],
    &[
        "increase precipitation",
        "augment precipitation",
        "augment winter precipitation",
        "precipitation augmentation",
        "precipitation enhancement",
        "augment rainfall",
        "increase rainfall",
        "rainfall augmentation",
        "rainfall enhancement",
        "augment rain",
        "increase rain",
        "enhance rain",
        "enhance rainfall",
        "rain augmentation",
        "rain enhancement",
        "rainfall increase",
    ],
    &[
        "increase runoff",
        "increase water supply",
        "augment runoff",
        "runoff",
        "increase inflow",
        "inflow",
    ],
    &[
        "suppress hail",
        "hail suppression",
        "hail mitigation",
        "hail damage mitigation",
    ],
    &[
        "suppress fog",
        "fog suppression",
        "fog dissipation",
        "dissipate fog",
    ],
    &["research", "reduce global temperature"],
];

const AGENT_GROUPS: &[&[&str]] = &[
    &["silver iodide", "agi", "silver iodate", "glaciogenic pyrotechnics"],
    &[
        "ionized air",
        "air",
        "ionization",
        "shock wave",
        "shock waves",
        "nan",
        "na",
    ],
    &["sodium iodide"],
    &["cesium iodide"],
    &["carbon dioxide", "co2"],
    &["calcium chloride", "caci2"],
    &["acetone", "acetone mixture"],
    &["ammonium iodide", "ammonia iodide"],
    &["water", "water droplets", "liquid water", "sea salt"],
    &["dry ice", "dry ice pellets"],
    &["hygroscopic"],
];

const CONTROL_AREA_GROUPS: &[&[&str]] = &[
    &[
        "none",
        "na",
        "nan",
        "",
        "no control",
        "n/a",
        "not specified",
        "same as target area",
        "target area",
        "not a target/control project",
    ],
    &[
        "adjacent areas",
        "various sites",
        "multiple locations",
        "regional area",
        "surrounding area",
        "whichever of the two ranges is not seeded",
    ],
];

const OPERATOR_GROUPS: &[&[&str]] = &[
    &[
        "weather modification inc",
        "weather modification llc",
        "weather modification incorporated",
    ],
    &["water enhancement authority", "water enhancement"],
    &["atmospherics inc", "atmospherics inc.", "atmospherics, inc."],
    &["western weather consultants llc", "western weather consultants"],
    &[
        "rhs consulting ltd",
        "rhs consulting",
        "rhs consulting, ltd.",
        "rhs consulting ltd.",
    ],
    &["pacific gas and electric company", "pacific gas and electric"],
    &[
        "pacific coast forecasting inc",
        "pacific coast forecasting",
        "pacific coast forecasting inc.",
    ],
    &[
        "eden valley irrigation and drainage",
        "eden valley irrigation & drainage district",
    ],
    &[
        "franklin soil and water conservation",
        "franklin soil and water conservation district",
        "franklin soil & water conservation district",
    ],
    &[
        "high plains underground water conservation",
        "high plains underground water conservation district 1",
        "high plains underground water conservation district no. 1",
        "high plains underground water conservation district #1",
    ],
    &[
        "western kansas groundwater management",
        "western kansas groundwater management district #1",
    ],
    &[
        "powell plant farms inc",
        "powell plant farms, inc.",
        "powell plant farms inc.",
    ],
    &[
        "southwest texas rain enhancement association",
        "southwest texas rain-enhancement association",
    ],
    &["belding farms", "general manager, belding farms"],
    &["clark county", "clark county, idaho"],
    &[
        "barken fog ops inc",
        "barken fog ops, inc.",
        "barken fog ops, inc",
        "barken fog ops inc.",
    ],
    &[
        "north plains groundwater district",
        "north plains groundwater district no. 2",
    ],
    &[
        "transpecos weather modification association",
        "trans-pecos weather modification association",
    ],
];

pub static PURPOSE: Lazy<ConceptMap> = Lazy::new(|| ConceptMap::from_groups(PURPOSE_GROUPS));
pub static AGENT: Lazy<ConceptMap> = Lazy::new(|| ConceptMap::from_groups(AGENT_GROUPS));
pub static CONTROL_AREA: Lazy<ConceptMap> =
    Lazy::new(|| ConceptMap::from_groups(CONTROL_AREA_GROUPS));
pub static OPERATOR: Lazy<ConceptMap> = Lazy::new(|| ConceptMap::from_groups(OPERATOR_GROUPS));

#[derive(Debug)]
pub struct ConceptMap {
    canonical_by_synonym: HashMap<String, String>,
}

impl ConceptMap {
    fn from_groups(groups: &[&[&str]]) -> Self {
        let mut canonical_by_synonym = HashMap::new();
        for group in groups {
            let canonical = normalize_token(group[0]);
            for synonym in *group {
                canonical_by_synonym.insert(normalize_token(synonym), canonical.clone());
            }
        }

        Self {
            canonical_by_synonym,
        }
    }

    pub fn canonical_label(&self, token: &str) -> String {
        let normalized = normalize_token(token);
        self.canonical_by_synonym
            .get(&normalized)
            .cloned()
            .unwrap_or(normalized)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.canonical_by_synonym
            .contains_key(&normalize_token(token))
    }

    pub fn share_group(&self, left: &str, right: &str) -> bool {
        self.contains(left)
            && self.contains(right)
            && self.canonical_label(left) == self.canonical_label(right)
    }

    pub fn canonicalize(&self, raw: &str) -> Vec<String> {
        let mut labels = Vec::new();
        for part in split_listing(raw) {
            let label = self.canonical_label(part);
            if label.is_empty() || labels.contains(&label) {
                continue;
            }
            labels.push(label);
        }
        labels
    }

    pub fn canonicalize_joined(&self, raw: &str) -> String {
        self.canonicalize(raw).join(", ")
    }
}

pub fn split_listing(raw: &str) -> Vec<&str> {
    VALUE_SEPARATORS
        .split(raw)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

// Crude plural handling mirrors the vocabulary build: only standalone "s"/"es"
// words are dropped, which keeps normalization idempotent.
pub fn normalize_token(raw: &str) -> String {
    let mut folded = String::with_capacity(raw.len());
    for ch in raw.to_lowercase().chars() {
        let ch = fold_diacritic(ch);
        if ch.is_ascii_alphanumeric() || ch == ' ' {
            folded.push(ch);
        }
    }

    folded
        .split_whitespace()
        .filter(|word| *word != "s" && *word != "es")
        .collect::<Vec<_>>()
        .join(" ")
}

fn fold_diacritic(ch: char) -> char {
    match ch {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_token_folds_case_punctuation_and_diacritics() {
        assert_eq!(normalize_token("Silver Iodide"), "silver iodide");
        assert_eq!(normalize_token("Trans-Pecos"), "transpecos");
        assert_eq!(normalize_token("  séa   salt  "), "sea salt");
        assert_eq!(normalize_token("flare s"), "flare");
    }

    #[test]
    fn split_listing_handles_every_separator_form() {
        let parts = split_listing("silver iodide and carbon dioxide; acetone & dry ice plus urea");
        assert_eq!(
            parts,
            vec!["silver iodide", "carbon dioxide", "acetone", "dry ice", "urea"]
        );
    }

    #[test]
    fn canonicalize_maps_synonyms_and_dedupes_in_order() {
        let labels = PURPOSE.canonicalize("increase snowpack, augment snowfall, increase rain");
        assert_eq!(labels, vec!["augment snowpack", "increase precipitation"]);
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let once = PURPOSE.canonicalize_joined("snowfall enhancement and hail mitigation");
        let twice = PURPOSE.canonicalize_joined(&once);
        assert_eq!(once, twice);
        assert_eq!(once, "augment snowpack, suppress hail");
    }

    #[test]
    fn unknown_tokens_pass_through_normalized() {
        let labels = AGENT.canonicalize("Powdered Zinc; silver iodide");
        assert_eq!(labels, vec!["powdered zinc", "silver iodide"]);
    }

    #[test]
    fn canonicalization_is_scoped_per_field_vocabulary() {
        assert_eq!(CONTROL_AREA.canonicalize_joined("n/a"), "none");
        assert_eq!(AGENT.canonicalize_joined("na"), "ionized air");
        // "none" is only a control-area concept, so the agent table leaves it alone.
        assert_eq!(AGENT.canonicalize_joined("none"), "none");
    }

    #[test]
    fn share_group_requires_both_tokens_in_vocabulary() {
        assert!(PURPOSE.share_group("augment snowpack", "increase snowpack"));
        assert!(!PURPOSE.share_group("augment snowpack", "suppress hail"));
        assert!(!PURPOSE.share_group("augment snowpack", "banana"));
        assert!(CONTROL_AREA.share_group("", "none"));
    }
}
