use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "cloudseed",
    version,
    about = "NOAA weather modification report extraction and accuracy tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Extract(ExtractArgs),
    Clean(CleanArgs),
    Evaluate(EvaluateArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[arg(long)]
    pub input_dir: PathBuf,

    #[arg(long, default_value = "dataset/records.csv")]
    pub output_csv: PathBuf,

    #[arg(long, default_value = "dataset/processed_files.txt")]
    pub checkpoint_path: PathBuf,

    #[arg(long, default_value = "dataset/pdf_method_counts.txt")]
    pub method_report_path: PathBuf,

    #[arg(long, default_value = "gpt-4.1-mini")]
    pub model: String,

    #[arg(long, default_value_t = 5)]
    pub flush_every: usize,

    #[arg(long, default_value_t = 2)]
    pub completion_attempts: usize,

    #[arg(long, default_value_t = 10)]
    pub completion_backoff_secs: u64,

    #[arg(long, default_value_t = 1000)]
    pub min_primary_chars: usize,

    #[arg(long, default_value_t = 500)]
    pub min_remote_chars: usize,

    #[arg(long, default_value = "eng")]
    pub ocr_lang: String,

    #[arg(long, default_value_t = false)]
    pub strict: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CleanArgs {
    #[arg(long)]
    pub input_csv: PathBuf,

    #[arg(long)]
    pub output_csv: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    #[arg(long)]
    pub candidate_csv: PathBuf,

    #[arg(long)]
    pub gold_csv: PathBuf,

    #[arg(long, default_value_t = 0)]
    pub date_tolerance_days: i64,

    #[arg(long)]
    pub report_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    #[arg(long, default_value = "dataset/records.csv")]
    pub output_csv: PathBuf,

    #[arg(long, default_value = "dataset/processed_files.txt")]
    pub checkpoint_path: PathBuf,

    #[arg(long, default_value = "dataset/pdf_method_counts.txt")]
    pub method_report_path: PathBuf,
}
