use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::PipelineError;
use crate::model::Record;

// Response lines are matched by case-insensitive substring against these
// label fragments; first hit wins, everything else is ignored.
const FIELD_LABELS: [(&str, &str); 12] = [
    ("project or activity designation", "project"),
    ("year of weather modification activity", "year"),
    ("season of weather modification activity", "season"),
    ("state that weather modification activity", "state"),
    ("operator affiliation", "operator_affiliation"),
    ("type of cloud seeding agent", "agent"),
    ("type of apparatus", "apparatus"),
    ("purpose of project or activity", "purpose"),
    ("target area location", "target_area"),
    ("control area location", "control_area"),
    ("start date of weather modification activity", "start_date"),
    ("end date of weather modification activity", "end_date"),
];

const SYSTEM_PROMPT: &str = "\
You extract structured data from NOAA Form 17-4 weather modification reports.

You receive the report filename and the text of its first page. Filenames
usually encode the activity year and a two-letter state code (for example
2018UTNORT-1.pdf is a 2018 Utah report); use them as a prior when the page
text is ambiguous. Dates are written mm/dd/yyyy. Seasons follow the calendar:
winter Dec-Feb, spring Mar-May, summer Jun-Aug, fall Sep-Nov. Apparatus is
ground, airborne, or both. Report the operating organization, not NOAA.

Answer with exactly these twelve lines, lowercase values, comma-separated
when multiple apply, blank after the colon when truly unknowable:

PROJECT OR ACTIVITY DESIGNATION: [value]
YEAR OF WEATHER MODIFICATION ACTIVITY: [value]
SEASON OF WEATHER MODIFICATION ACTIVITY: [value]
U.S. STATE THAT WEATHER MODIFICATION ACTIVITY IS TAKING PLACE: [value]
OPERATOR AFFILIATION: [value]
TYPE OF CLOUD SEEDING AGENT: [value]
TYPE OF APPARATUS: [value]
PURPOSE OF PROJECT OR ACTIVITY: [value]
TARGET AREA LOCATION: [value]
CONTROL AREA LOCATION: [value]
START DATE OF WEATHER MODIFICATION ACTIVITY: [value]
END DATE OF WEATHER MODIFICATION ACTIVITY: [value]

Return only those lines, with no commentary or placeholders.";

pub trait CompletionClient {
    fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

pub struct ChatCompletionClient {
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatCompletionClient {
    pub fn from_env(model: &str) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable is not set")?;
        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        Ok(Self {
            base_url,
            api_key,
            model: model.to_string(),
        })
    }
}

impl CompletionClient for ChatCompletionClient {
    fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
        };

        let response = ureq::post(&format!("{}/chat/completions", self.base_url))
            .set("authorization", &format!("Bearer {}", self.api_key))
            .set("content-type", "application/json")
            .send_json(&request)
            .context("completion request failed")?;

        let parsed: ChatResponse = response
            .into_json()
            .context("completion response was not valid json")?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .context("completion response contained no choices")?;

        Ok(content)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            base_delay: Duration::from_secs(10),
        }
    }
}

pub struct FieldInferencer<'a> {
    client: &'a dyn CompletionClient,
    retry: RetryPolicy,
}

impl<'a> FieldInferencer<'a> {
    pub fn new(client: &'a dyn CompletionClient, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    pub fn infer(&self, filename: &str, raw_text: &str) -> Result<Record, PipelineError> {
        let user_prompt = build_user_prompt(filename, raw_text);
        let attempts = self.retry.attempts.max(1);
        let mut delay = self.retry.base_delay;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.client.complete(SYSTEM_PROMPT, &user_prompt) {
                Ok(response) => return Ok(parse_response(filename, &response)),
                Err(err) => {
                    warn!(
                        file = %filename,
                        attempt,
                        attempts,
                        error = %format!("{err:#}"),
                        "completion attempt failed"
                    );
                    last_error = format!("{err:#}");
                }
            }

            if attempt < attempts {
                thread::sleep(delay);
                delay *= 2;
            }
        }

        Err(PipelineError::InferenceFailed {
            filename: filename.to_string(),
            message: last_error,
        })
    }
}

fn build_user_prompt(filename: &str, raw_text: &str) -> String {
    format!(
        "FILENAME: {filename}\n\n\
         === NOAA FORM 17-4: INITIAL REPORT ON WEATHER MODIFICATION ACTIVITIES ===\n\n\
         {raw_text}\n"
    )
}

// Tolerant line-oriented parsing: a sparse or chatty response never fails,
// unmatched fields simply stay blank.
pub(crate) fn parse_response(filename: &str, response: &str) -> Record {
    let mut record = Record::empty(filename);

    for line in response.lines() {
        let line = line.trim().to_lowercase();
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let label = label.trim();
        let value = value.trim();

        for (needle, field) in FIELD_LABELS {
            if label.contains(needle) {
                record.set_field(field, value.to_string());
                break;
            }
        }
    }

    record
}
