use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("all text acquisition methods exhausted for {filename}")]
    ExtractionFailed { filename: String },

    #[error("completion retries exhausted for {filename}: {message}")]
    InferenceFailed { filename: String, message: String },

    #[error("batch aborted in strict mode after failure on {filename}")]
    BatchFatal { filename: String },
}
