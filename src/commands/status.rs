use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::extract::{list_pdf_documents, load_checkpoint};
use crate::util::read_records;

pub fn run(args: StatusArgs) -> Result<()> {
    let checkpointed = load_checkpoint(&args.checkpoint_path)?;
    info!(
        path = %args.checkpoint_path.display(),
        processed = checkpointed.len(),
        "checkpoint log"
    );

    if let Some(input_dir) = &args.input_dir {
        if input_dir.exists() {
            let documents = list_pdf_documents(input_dir)?;
            let pending = documents
                .iter()
                .filter(|filename| !checkpointed.contains(*filename))
                .count();

            info!(
                path = %input_dir.display(),
                documents = documents.len(),
                pending,
                "corpus status"
            );
        } else {
            warn!(path = %input_dir.display(), "input directory missing");
        }
    }

    if args.output_csv.exists() {
        let records = read_records(&args.output_csv)?;
        info!(
            path = %args.output_csv.display(),
            rows = records.len(),
            "output dataset"
        );
    } else {
        warn!(path = %args.output_csv.display(), "output dataset missing");
    }

    if args.method_report_path.exists() {
        info!(path = %args.method_report_path.display(), "method-usage report present");
    } else {
        warn!(path = %args.method_report_path.display(), "method-usage report missing");
    }

    Ok(())
}
