//! Batch CSV importer: normalize rows, upsert each one, persist a run
//! summary, dedupe, all inside one per-file transaction scope.

use thiserror::Error;
use tracing::{info, warn};

use leadbase_core::{ImportSummary, LeadImport, RowOutcome, UploadRun, MAX_SAMPLE_ERRORS};
use leadbase_storage::{LeadStore, StoreError};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("reading CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Import one CSV file (first line = header, UTF-8) against the store.
///
/// Row failures are local: they bump the failed counter and continue. Fatal
/// storage errors abort the whole import; dropping the session rolls every
/// row back, so no rows land without their run record.
pub async fn import_csv(
    store: &dyn LeadStore,
    filename: &str,
    bytes: &[u8],
) -> Result<ImportSummary, ImportError> {
    let mut session = store.begin_import().await?;

    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers = reader.headers()?.clone();

    let mut inserted = 0i64;
    let mut updated = 0i64;
    let mut failed = 0i64;
    let mut sample_errors: Vec<String> = Vec::new();

    for (index, record) in reader.records().enumerate() {
        // Data rows are 1-indexed; the header row is not counted.
        let row_number = index + 1;

        let record = match record {
            Ok(record) => record,
            Err(err) => {
                failed += 1;
                push_error(&mut sample_errors, row_number, &err.to_string());
                continue;
            }
        };

        let row = LeadImport::from_raw_row(headers.iter().zip(record.iter()));
        if !row.has_profile_url() {
            failed += 1;
            push_error(&mut sample_errors, row_number, "missing profile URL");
            continue;
        }

        match session.upsert_lead(&row).await {
            Ok(RowOutcome::Inserted) => inserted += 1,
            Ok(RowOutcome::Updated) => updated += 1,
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                failed += 1;
                warn!(row = row_number, error = %err, "row rejected");
                push_error(&mut sample_errors, row_number, &err.to_string());
            }
        }
    }

    let run = UploadRun {
        filename: filename.to_string(),
        rows_inserted: inserted,
        rows_updated: updated,
        rows_failed: failed,
        status: if failed == 0 {
            leadbase_core::RunStatus::Success
        } else {
            leadbase_core::RunStatus::Partial
        },
        error_message: if sample_errors.is_empty() {
            None
        } else {
            Some(sample_errors.join("\n"))
        },
    };
    session.record_run(&run).await?;

    let dedupe = session.dedupe().await?;
    session.commit().await?;

    info!(
        filename,
        inserted,
        updated,
        failed,
        removed = dedupe.records_removed,
        "import complete"
    );

    Ok(ImportSummary {
        filename: filename.to_string(),
        inserted,
        updated,
        failed,
        sample_errors,
        dedupe,
    })
}

fn push_error(sample_errors: &mut Vec<String>, row_number: usize, message: &str) {
    if sample_errors.len() < MAX_SAMPLE_ERRORS {
        sample_errors.push(format!("Row {row_number}: {message}"));
    }
}
