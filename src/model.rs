use serde::{Deserialize, Serialize};

pub const EVALUATED_FIELDS: [&str; 12] = [
    "project",
    "year",
    "season",
    "state",
    "operator_affiliation",
    "agent",
    "apparatus",
    "purpose",
    "target_area",
    "control_area",
    "start_date",
    "end_date",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub filename: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub season: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub operator_affiliation: String,
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub apparatus: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub target_area: String,
    #[serde(default)]
    pub control_area: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
}

impl Record {
    pub fn empty(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            ..Self::default()
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        let value = match name {
            "filename" => &self.filename,
            "project" => &self.project,
            "year" => &self.year,
            "season" => &self.season,
            "state" => &self.state,
            "operator_affiliation" => &self.operator_affiliation,
            "agent" => &self.agent,
            "apparatus" => &self.apparatus,
            "purpose" => &self.purpose,
            "target_area" => &self.target_area,
            "control_area" => &self.control_area,
            "start_date" => &self.start_date,
            "end_date" => &self.end_date,
            _ => return None,
        };
        Some(value.as_str())
    }

    pub fn set_field(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "filename" => &mut self.filename,
            "project" => &mut self.project,
            "year" => &mut self.year,
            "season" => &mut self.season,
            "state" => &mut self.state,
            "operator_affiliation" => &mut self.operator_affiliation,
            "agent" => &mut self.agent,
            "apparatus" => &mut self.apparatus,
            "purpose" => &mut self.purpose,
            "target_area" => &mut self.target_area,
            "control_area" => &mut self.control_area,
            "start_date" => &mut self.start_date,
            "end_date" => &mut self.end_date,
            _ => return false,
        };
        *slot = value;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    Primary,
    Ocr,
    RemoteOcr,
}

impl ExtractionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "text-layer",
            Self::Ocr => "ocr",
            Self::RemoteOcr => "remote-ocr",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MethodCounters {
    pub text_layer: usize,
    pub ocr: usize,
    pub remote_ocr: usize,
    pub failed: usize,
}

impl MethodCounters {
    pub fn tally(&mut self, method: ExtractionMethod) {
        match method {
            ExtractionMethod::Primary => self.text_layer += 1,
            ExtractionMethod::Ocr => self.ocr += 1,
            ExtractionMethod::RemoteOcr => self.remote_ocr += 1,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub succeeded: usize,
    pub failed: usize,
    pub method_counts: MethodCounters,
}
