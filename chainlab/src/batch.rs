// chainlab/src/batch.rs
//!
//! Batch jobs: run a chain once per row of its batch-input table
//!
//! For every row the batch-input selects that row, the chain runs through
//! the orchestrator with its own stop handle, and the app outputs are
//! collected. A failing row is counted and recorded; the job moves on.
//! Stopping the job's handle ends it after the row in flight.

use crate::backend::Backend;
use crate::chain::Chain;
use crate::orchestrator::{AppOutput, ChainRunError, Orchestrator, StopHandle};
use crate::runner::{self, RunError};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("A batch-input component is required to run a batch job.")]
    NoBatchInput,
    #[error("The selected table has no rows.")]
    EmptyTable,
    #[error(transparent)]
    Load(#[from] RunError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowResult {
    pub row: usize,
    pub outputs: Vec<AppOutput>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowFailure {
    pub row: usize,
    pub title: String,
    pub message: String,
}

/// Progress of a job, updated after every row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchProgress {
    pub total: usize,
    pub done: usize,
    pub failed: usize,
    pub results: Vec<RowResult>,
    pub failures: Vec<RowFailure>,
    pub active: bool,
}

impl BatchProgress {
    /// Rows attempted so far.
    pub fn processed(&self) -> usize {
        self.done + self.failed
    }

    pub fn is_finished(&self) -> bool {
        !self.active
    }
}

/// Runs `chain` for every table row. `on_row` sees the progress after each row;
/// stopping `job` from it ends the job before the next row starts.
pub fn run_batch(
    backend: &dyn Backend,
    chain: &mut Chain,
    job: &StopHandle,
    mut on_row: impl FnMut(&BatchProgress),
) -> Result<BatchProgress, BatchError> {
    let total = {
        let batch = chain.batch_input_mut().ok_or(BatchError::NoBatchInput)?;
        runner::ensure_table(batch, backend)?.len()
    };
    if total == 0 {
        return Err(BatchError::EmptyTable);
    }

    let mut progress = BatchProgress {
        total,
        active: true,
        ..Default::default()
    };
    job.start();
    tracing::info!(rows = total, "batch job started");

    let orchestrator = Orchestrator::new(backend);
    for row in 0..total {
        if !job.is_running() {
            tracing::info!(row, "batch job stopped");
            break;
        }

        chain.clear_outputs();
        if let Some(batch) = chain.batch_input_mut() {
            batch.select_row(row);
        }

        let row_stop = StopHandle::new();
        match orchestrator.run(chain, &row_stop) {
            Ok(report) => {
                progress.done += 1;
                progress.results.push(RowResult {
                    row,
                    outputs: report.outputs,
                });
            }
            Err(err) => {
                tracing::warn!(row, error = %err, "batch row failed");
                progress.failed += 1;
                progress.failures.push(RowFailure {
                    row,
                    title: failing_title(&err),
                    message: err.to_string(),
                });
            }
        }

        on_row(&progress);
    }

    progress.active = false;
    job.stop();
    tracing::info!(
        done = progress.done,
        failed = progress.failed,
        total = progress.total,
        "batch job finished"
    );
    Ok(progress)
}

fn failing_title(err: &ChainRunError) -> String {
    match err {
        ChainRunError::ComponentFailed { title, .. } => title.clone(),
    }
}
