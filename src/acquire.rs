use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::PipelineError;
use crate::model::ExtractionMethod;

// Every NOAA Form 17-4 first page carries these headings; a text layer that
// lacks any of them is garbled or belongs to a different form.
pub const REQUIRED_FORM_PHRASES: [&str; 6] = [
    "initial report on weather modification",
    "project or activity designation",
    "purpose of project",
    "target",
    "dates of project",
    "description of weather modification",
];

const REMOTE_WAIT_TIMEOUT_SECS: u64 = 200;

pub trait PageTextExtractor {
    fn first_page_text(&self, pdf_path: &Path) -> Result<String>;
}

pub trait OcrEngine {
    fn first_page_text(&self, pdf_path: &Path) -> Result<String>;
}

pub trait RemoteOcrClient {
    fn first_page_text(&self, pdf_path: &Path) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct AcquiredText {
    pub text: String,
    pub method: ExtractionMethod,
    pub quality_ok: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct AcquireConfig {
    pub min_primary_chars: usize,
    pub min_remote_chars: usize,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            min_primary_chars: 1000,
            min_remote_chars: 500,
        }
    }
}

enum StageVerdict {
    Accepted(AcquiredText),
    Rejected(String),
}

pub struct TextAcquirer<'a> {
    extractor: &'a dyn PageTextExtractor,
    ocr: &'a dyn OcrEngine,
    remote: &'a dyn RemoteOcrClient,
    config: AcquireConfig,
}

impl<'a> TextAcquirer<'a> {
    pub fn new(
        extractor: &'a dyn PageTextExtractor,
        ocr: &'a dyn OcrEngine,
        remote: &'a dyn RemoteOcrClient,
        config: AcquireConfig,
    ) -> Self {
        Self {
            extractor,
            ocr,
            remote,
            config,
        }
    }

    // Waterfall over the three acquisition methods, cheapest first. Each stage
    // is tried exactly once; the first accepted verdict wins.
    pub fn acquire(&self, pdf_path: &Path) -> Result<AcquiredText, PipelineError> {
        let filename = display_filename(pdf_path);

        let stages = [
            ExtractionMethod::Primary,
            ExtractionMethod::Ocr,
            ExtractionMethod::RemoteOcr,
        ];

        for method in stages {
            match self.run_stage(method, pdf_path) {
                StageVerdict::Accepted(acquired) => {
                    debug!(
                        file = %filename,
                        method = method.as_str(),
                        chars = acquired.text.len(),
                        "acquisition stage accepted"
                    );
                    return Ok(acquired);
                }
                StageVerdict::Rejected(reason) => {
                    warn!(
                        file = %filename,
                        method = method.as_str(),
                        reason = %reason,
                        "acquisition stage rejected"
                    );
                }
            }
        }

        Err(PipelineError::ExtractionFailed { filename })
    }

    fn run_stage(&self, method: ExtractionMethod, pdf_path: &Path) -> StageVerdict {
        let attempt = match method {
            ExtractionMethod::Primary => self.extractor.first_page_text(pdf_path),
            ExtractionMethod::Ocr => self.ocr.first_page_text(pdf_path),
            ExtractionMethod::RemoteOcr => self.remote.first_page_text(pdf_path),
        };

        let text = match attempt {
            Ok(text) => text.trim().to_string(),
            Err(err) => return StageVerdict::Rejected(format!("{err:#}")),
        };

        match method {
            ExtractionMethod::Primary | ExtractionMethod::Ocr => {
                self.gated_verdict(text, method, self.config.min_primary_chars)
            }
            // The remote service is trusted on length alone; the phrase
            // checklist is still recorded for the caller.
            ExtractionMethod::RemoteOcr => {
                let chars = text.chars().count();
                if chars <= self.config.min_remote_chars {
                    return StageVerdict::Rejected(format!(
                        "{} chars below remote minimum {}",
                        chars, self.config.min_remote_chars
                    ));
                }
                StageVerdict::Accepted(AcquiredText {
                    quality_ok: contains_required_phrases(&text),
                    text,
                    method,
                })
            }
        }
    }

    fn gated_verdict(
        &self,
        text: String,
        method: ExtractionMethod,
        min_chars: usize,
    ) -> StageVerdict {
        let chars = text.chars().count();
        if chars <= min_chars {
            return StageVerdict::Rejected(format!("{chars} chars below minimum {min_chars}"));
        }
        if !contains_required_phrases(&text) {
            return StageVerdict::Rejected("required form phrases missing".to_string());
        }

        StageVerdict::Accepted(AcquiredText {
            text,
            method,
            quality_ok: true,
        })
    }
}

pub fn contains_required_phrases(text: &str) -> bool {
    let text = text.to_lowercase();
    REQUIRED_FORM_PHRASES
        .iter()
        .all(|phrase| text.contains(phrase))
}

fn display_filename(pdf_path: &Path) -> String {
    pdf_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("unknown.pdf")
        .to_string()
}

pub struct PdftotextExtractor;

impl PageTextExtractor for PdftotextExtractor {
    fn first_page_text(&self, pdf_path: &Path) -> Result<String> {
        let output = Command::new("pdftotext")
            .arg("-enc")
            .arg("UTF-8")
            .arg("-f")
            .arg("1")
            .arg("-l")
            .arg("1")
            .arg(pdf_path)
            .arg("-")
            .output()
            .with_context(|| format!("failed to execute pdftotext for {}", pdf_path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "pdftotext returned non-zero exit status for {}: {}",
                pdf_path.display(),
                stderr.trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .replace('\u{0000}', "")
            .trim()
            .to_string())
    }
}

pub struct TesseractOcr {
    pub lang: String,
}

impl OcrEngine for TesseractOcr {
    fn first_page_text(&self, pdf_path: &Path) -> Result<String> {
        let pdf_stem = pdf_path
            .file_stem()
            .and_then(|value| value.to_str())
            .unwrap_or("pdf");
        let safe_stem = pdf_stem
            .chars()
            .map(|character| {
                if character.is_ascii_alphanumeric() {
                    character
                } else {
                    '_'
                }
            })
            .collect::<String>();

        let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let output_root = std::env::temp_dir().join(format!(
            "cloudseed_ocr_{}_{}_{}",
            safe_stem,
            std::process::id(),
            stamp
        ));
        let png_path = PathBuf::from(format!("{}.png", output_root.display()));

        let pdftoppm_output = Command::new("pdftoppm")
            .arg("-f")
            .arg("1")
            .arg("-l")
            .arg("1")
            .arg("-singlefile")
            .arg("-png")
            .arg(pdf_path)
            .arg(&output_root)
            .output()
            .with_context(|| format!("failed to execute pdftoppm for {}", pdf_path.display()))?;

        if !pdftoppm_output.status.success() {
            let stderr = String::from_utf8_lossy(&pdftoppm_output.stderr);
            bail!(
                "pdftoppm returned non-zero exit status for {}: {}",
                pdf_path.display(),
                stderr.trim()
            );
        }

        if !png_path.exists() {
            bail!(
                "pdftoppm did not produce expected image for {}",
                pdf_path.display()
            );
        }

        let tesseract_output = Command::new("tesseract")
            .arg(&png_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .output()
            .with_context(|| format!("failed to execute tesseract for {}", png_path.display()));

        let _ = fs::remove_file(&png_path);
        let tesseract_output = tesseract_output?;

        if !tesseract_output.status.success() {
            let stderr = String::from_utf8_lossy(&tesseract_output.stderr);
            bail!(
                "tesseract returned non-zero exit status for {}: {}",
                pdf_path.display(),
                stderr.trim()
            );
        }

        Ok(String::from_utf8_lossy(&tesseract_output.stdout)
            .replace('\u{0000}', "")
            .trim()
            .to_string())
    }
}

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    #[serde(default)]
    extraction: WhisperExtraction,
}

#[derive(Debug, Default, Deserialize)]
struct WhisperExtraction {
    #[serde(default)]
    result_text: String,
}

pub struct WhisperOcr {
    base_url: String,
    api_key: String,
    wait_timeout: Duration,
}

impl WhisperOcr {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("LLMWHISPERER_API_KEY")
            .context("LLMWHISPERER_API_KEY environment variable is not set")?;
        let base_url = std::env::var("LLMWHISPERER_BASE_URL")
            .unwrap_or_else(|_| "https://llmwhisperer-api.us-central.unstract.com/api/v2".to_string());

        Ok(Self {
            base_url,
            api_key,
            wait_timeout: Duration::from_secs(REMOTE_WAIT_TIMEOUT_SECS),
        })
    }
}

impl RemoteOcrClient for WhisperOcr {
    fn first_page_text(&self, pdf_path: &Path) -> Result<String> {
        let body = fs::read(pdf_path)
            .with_context(|| format!("failed to read {}", pdf_path.display()))?;

        let url = format!(
            "{}/whisper?pages_to_extract=1&wait_for_completion=true&wait_timeout={}",
            self.base_url,
            self.wait_timeout.as_secs()
        );

        let response = ureq::post(&url)
            .set("unstract-key", &self.api_key)
            .set("content-type", "application/octet-stream")
            .timeout(self.wait_timeout)
            .send_bytes(&body)
            .with_context(|| format!("remote ocr request failed for {}", pdf_path.display()))?;

        let parsed: WhisperResponse = response
            .into_json()
            .with_context(|| format!("remote ocr response malformed for {}", pdf_path.display()))?;

        Ok(parsed.extraction.result_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedText(Result<String, String>);

    impl FixedText {
        fn ok(text: &str) -> Self {
            Self(Ok(text.to_string()))
        }

        fn err(message: &str) -> Self {
            Self(Err(message.to_string()))
        }

        fn get(&self) -> Result<String> {
            match &self.0 {
                Ok(text) => Ok(text.clone()),
                Err(message) => Err(anyhow::anyhow!("{message}")),
            }
        }
    }

    impl PageTextExtractor for FixedText {
        fn first_page_text(&self, _pdf_path: &Path) -> Result<String> {
            self.get()
        }
    }

    impl OcrEngine for FixedText {
        fn first_page_text(&self, _pdf_path: &Path) -> Result<String> {
            self.get()
        }
    }

    impl RemoteOcrClient for FixedText {
        fn first_page_text(&self, _pdf_path: &Path) -> Result<String> {
            self.get()
        }
    }

    fn form_text(filler_chars: usize) -> String {
        let mut text = REQUIRED_FORM_PHRASES.join("\n").to_uppercase();
        text.push('\n');
        text.push_str(&"x".repeat(filler_chars));
        text
    }

    fn small_config() -> AcquireConfig {
        AcquireConfig {
            min_primary_chars: 100,
            min_remote_chars: 50,
        }
    }

    #[test]
    fn primary_text_layer_wins_when_long_and_complete() {
        let primary = FixedText::ok(&form_text(200));
        let ocr = FixedText::err("ocr must not run");
        let remote = FixedText::err("remote must not run");
        let acquirer = TextAcquirer::new(&primary, &ocr, &remote, small_config());

        let acquired = acquirer.acquire(Path::new("2018UTNORT-1.pdf")).unwrap();
        assert_eq!(acquired.method, ExtractionMethod::Primary);
        assert!(acquired.quality_ok);
    }

    #[test]
    fn short_text_layer_falls_through_to_ocr() {
        let primary = FixedText::ok("too short");
        let ocr = FixedText::ok(&form_text(200));
        let remote = FixedText::err("remote must not run");
        let acquirer = TextAcquirer::new(&primary, &ocr, &remote, small_config());

        let acquired = acquirer.acquire(Path::new("a.pdf")).unwrap();
        assert_eq!(acquired.method, ExtractionMethod::Ocr);
    }

    #[test]
    fn long_text_missing_form_phrases_is_rejected() {
        let primary = FixedText::ok(&"lorem ipsum ".repeat(50));
        let ocr = FixedText::ok(&form_text(200));
        let remote = FixedText::err("remote must not run");
        let acquirer = TextAcquirer::new(&primary, &ocr, &remote, small_config());

        let acquired = acquirer.acquire(Path::new("a.pdf")).unwrap();
        assert_eq!(acquired.method, ExtractionMethod::Ocr);
    }

    #[test]
    fn remote_stage_accepts_on_length_alone_but_records_quality() {
        let primary = FixedText::err("no text layer");
        let ocr = FixedText::err("no tesseract");
        let remote = FixedText::ok(&"scanned words ".repeat(10));
        let acquirer = TextAcquirer::new(&primary, &ocr, &remote, small_config());

        let acquired = acquirer.acquire(Path::new("a.pdf")).unwrap();
        assert_eq!(acquired.method, ExtractionMethod::RemoteOcr);
        assert!(!acquired.quality_ok);
    }

    #[test]
    fn exhausted_waterfall_is_an_extraction_failure() {
        let primary = FixedText::ok("x");
        let ocr = FixedText::err("no tesseract");
        let remote = FixedText::ok("y");
        let acquirer = TextAcquirer::new(&primary, &ocr, &remote, small_config());

        let err = acquirer.acquire(Path::new("bad.pdf")).unwrap_err();
        match err {
            PipelineError::ExtractionFailed { filename } => assert_eq!(filename, "bad.pdf"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
