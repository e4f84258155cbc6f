use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info};

use crate::acquire::{
    AcquireConfig, PdftotextExtractor, TesseractOcr, TextAcquirer, WhisperOcr,
};
use crate::cli::ExtractArgs;
use crate::errors::PipelineError;
use crate::infer::{ChatCompletionClient, FieldInferencer, RetryPolicy};
use crate::model::{MethodCounters, Record, RunReport};
use crate::util::{ensure_directory, now_utc_string, utc_compact_string};

pub fn run(args: ExtractArgs) -> Result<()> {
    let run_id = format!("run-{}", utc_compact_string(Utc::now()));

    info!(
        input_dir = %args.input_dir.display(),
        output_csv = %args.output_csv.display(),
        model = %args.model,
        run_id = %run_id,
        "starting extraction batch"
    );

    let extractor = PdftotextExtractor;
    let ocr = TesseractOcr {
        lang: args.ocr_lang.clone(),
    };
    let remote = WhisperOcr::from_env()?;
    let acquirer = TextAcquirer::new(
        &extractor,
        &ocr,
        &remote,
        AcquireConfig {
            min_primary_chars: args.min_primary_chars,
            min_remote_chars: args.min_remote_chars,
        },
    );

    let client = ChatCompletionClient::from_env(&args.model)?;
    let inferencer = FieldInferencer::new(
        &client,
        RetryPolicy {
            attempts: args.completion_attempts,
            base_delay: Duration::from_secs(args.completion_backoff_secs),
        },
    );

    let processed = load_checkpoint(&args.checkpoint_path)?;
    let documents = list_pdf_documents(&args.input_dir)?;
    let pending: Vec<String> = documents
        .iter()
        .filter(|filename| !processed.contains(*filename))
        .cloned()
        .collect();

    info!(
        total = documents.len(),
        checkpointed = documents.len() - pending.len(),
        pending = pending.len(),
        "resume state loaded"
    );

    let config = BatchConfig {
        output_csv: args.output_csv.clone(),
        checkpoint_path: args.checkpoint_path.clone(),
        method_report_path: args.method_report_path.clone(),
        flush_every: args.flush_every.max(1),
        strict: args.strict,
    };

    let report = run_batch(&acquirer, &inferencer, &args.input_dir, &pending, &config)?;

    info!(
        run_id = %run_id,
        succeeded = report.succeeded,
        failed = report.failed,
        text_layer = report.method_counts.text_layer,
        ocr = report.method_counts.ocr,
        remote_ocr = report.method_counts.remote_ocr,
        "extraction batch completed"
    );

    Ok(())
}

pub(crate) struct BatchConfig {
    pub output_csv: PathBuf,
    pub checkpoint_path: PathBuf,
    pub method_report_path: PathBuf,
    pub flush_every: usize,
    pub strict: bool,
}

pub(crate) fn run_batch(
    acquirer: &TextAcquirer,
    inferencer: &FieldInferencer,
    input_dir: &Path,
    pending: &[String],
    config: &BatchConfig,
) -> Result<RunReport> {
    let mut counters = MethodCounters::default();
    let mut buffer: Vec<Record> = Vec::new();
    let mut succeeded = 0_usize;
    let mut failed = 0_usize;

    for (index, filename) in pending.iter().enumerate() {
        let pdf_path = input_dir.join(filename);

        match process_document(acquirer, inferencer, &pdf_path, filename, &mut counters) {
            Ok(record) => {
                buffer.push(record);
                succeeded += 1;
            }
            Err(err) => {
                counters.failed += 1;
                failed += 1;
                error!(file = %filename, error = %err, "document failed");

                if config.strict {
                    flush_buffer(config, &mut buffer)?;
                    append_method_counts(&config.method_report_path, &counters)?;
                    return Err(PipelineError::BatchFatal {
                        filename: filename.clone(),
                    }
                    .into());
                }
            }
        }

        if (index + 1) % config.flush_every == 0 {
            flush_buffer(config, &mut buffer)?;
        }
    }

    flush_buffer(config, &mut buffer)?;
    append_method_counts(&config.method_report_path, &counters)?;

    Ok(RunReport {
        run_id: format!("run-{}", utc_compact_string(Utc::now())),
        succeeded,
        failed,
        method_counts: counters,
    })
}

fn process_document(
    acquirer: &TextAcquirer,
    inferencer: &FieldInferencer,
    pdf_path: &Path,
    filename: &str,
    counters: &mut MethodCounters,
) -> Result<Record, PipelineError> {
    let acquired = acquirer.acquire(pdf_path)?;
    counters.tally(acquired.method);

    if !acquired.quality_ok {
        info!(
            file = %filename,
            method = acquired.method.as_str(),
            "accepted text did not pass the form phrase checklist"
        );
    }

    inferencer.infer(filename, &acquired.text)
}

// Durability contract: records reach the output csv before their filenames
// reach the checkpoint log, so a crash can lose at most one unflushed buffer
// and never marks an unpersisted document as done.
fn flush_buffer(config: &BatchConfig, buffer: &mut Vec<Record>) -> Result<()> {
    if buffer.is_empty() {
        return Ok(());
    }

    append_records(&config.output_csv, buffer)?;

    for record in buffer.iter() {
        append_checkpoint(&config.checkpoint_path, &record.filename)?;
    }

    info!(
        rows = buffer.len(),
        output = %config.output_csv.display(),
        "flushed record buffer"
    );
    buffer.clear();

    Ok(())
}

fn append_records(path: &Path, records: &[Record]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let write_header = !path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open output csv: {}", path.display()))?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(write_header)
        .from_writer(file);

    for record in records {
        writer
            .serialize(record)
            .with_context(|| format!("failed to append record to {}", path.display()))?;
    }

    writer
        .flush()
        .with_context(|| format!("failed to flush output csv: {}", path.display()))?;

    Ok(())
}

pub(crate) fn load_checkpoint(path: &Path) -> Result<HashSet<String>> {
    if !path.exists() {
        return Ok(HashSet::new());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read checkpoint log: {}", path.display()))?;

    Ok(raw
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect())
}

fn append_checkpoint(path: &Path, filename: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open checkpoint log: {}", path.display()))?;

    writeln!(file, "{filename}")
        .with_context(|| format!("failed to append checkpoint entry: {}", path.display()))
}

fn append_method_counts(path: &Path, counters: &MethodCounters) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open method report: {}", path.display()))?;

    writeln!(file, "\n--- Method counts at {} ---", now_utc_string())
        .and_then(|_| writeln!(file, "text-layer: {}", counters.text_layer))
        .and_then(|_| writeln!(file, "ocr: {}", counters.ocr))
        .and_then(|_| writeln!(file, "remote-ocr: {}", counters.remote_ocr))
        .and_then(|_| writeln!(file, "failed: {}", counters.failed))
        .with_context(|| format!("failed to append method report: {}", path.display()))
}

pub(crate) fn list_pdf_documents(input_dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(input_dir)
        .with_context(|| format!("failed to read {}", input_dir.display()))?;

    let mut documents = Vec::new();
    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", input_dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);

        if !is_pdf {
            continue;
        }

        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToOwned::to_owned)
            .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))?;
        documents.push(filename);
    }

    documents.sort();
    Ok(documents)
}
