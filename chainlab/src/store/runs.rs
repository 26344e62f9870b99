// chainlab/src/store/runs.rs

use crate::batch::BatchProgress;
use crate::component::{ComponentId, ComponentOutput};
use crate::orchestrator::{AppOutput, ChainRunError, RunReport};
use crate::Error;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

// === Queries for the 'runs' and 'run_outputs' tables ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Interactive,
    Batch,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Interactive => "interactive",
            RunKind::Batch => "batch",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "interactive" => Some(RunKind::Interactive),
            "batch" => Some(RunKind::Batch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Running,
    Completed,
    Failed,
    Stopped,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Running => "running",
            RunOutcome::Completed => "completed",
            RunOutcome::Failed => "failed",
            RunOutcome::Stopped => "stopped",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "running" => Some(RunOutcome::Running),
            "completed" => Some(RunOutcome::Completed),
            "failed" => Some(RunOutcome::Failed),
            "stopped" => Some(RunOutcome::Stopped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub id: String,
    pub app_id: Option<String>,
    pub app_name: String,
    pub kind: RunKind,
    pub status: RunOutcome,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total: i64,
    pub done: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredOutput {
    pub row_index: i64,
    pub component_id: ComponentId,
    pub title: String,
    pub output: Option<ComponentOutput>,
}

const RUN_COLUMNS: &str =
    "id, app_id, app_name, kind, status, error, created_at, finished_at, total, done, failed";

/// Opens a run in the `running` state.
pub fn start(
    conn: &Connection,
    app_id: Option<&str>,
    app_name: &str,
    kind: RunKind,
    total: usize,
) -> Result<RunRecord, Error> {
    let record = RunRecord {
        id: uuid::Uuid::new_v4().to_string(),
        app_id: app_id.map(str::to_string),
        app_name: app_name.to_string(),
        kind,
        status: RunOutcome::Running,
        error: None,
        created_at: Utc::now(),
        finished_at: None,
        total: total as i64,
        done: 0,
        failed: 0,
    };

    conn.execute(
        "INSERT INTO runs (id, app_id, app_name, kind, status, created_at, total)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.id,
            record.app_id,
            record.app_name,
            kind.as_str(),
            record.status.as_str(),
            &record.created_at,
            record.total
        ],
    )?;
    Ok(record)
}

pub fn record_outputs(
    conn: &Connection,
    run_id: &str,
    row_index: usize,
    outputs: &[AppOutput],
) -> Result<(), Error> {
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO run_outputs (run_id, row_index, component_id, title, output_json)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for output in outputs {
        let output_json = output
            .output
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        stmt.execute(params![
            run_id,
            row_index as i64,
            output.id.0 as i64,
            output.title,
            output_json
        ])?;
    }
    Ok(())
}

pub fn finish(
    conn: &Connection,
    run_id: &str,
    status: RunOutcome,
    error: Option<&str>,
    done: usize,
    failed: usize,
) -> Result<(), Error> {
    let updated = conn.execute(
        "UPDATE runs SET status = ?2, error = ?3, finished_at = ?4, done = ?5, failed = ?6
         WHERE id = ?1",
        params![
            run_id,
            status.as_str(),
            error,
            &Utc::now(),
            done as i64,
            failed as i64
        ],
    )?;
    if updated == 0 {
        return Err(Error::Api(format!("Run {run_id} not found")));
    }
    Ok(())
}

/// Stores the outcome of one interactive chain run.
pub fn record_interactive(
    conn: &Connection,
    app_id: Option<&str>,
    app_name: &str,
    result: &Result<RunReport, ChainRunError>,
    outputs: &[AppOutput],
) -> Result<RunRecord, Error> {
    let run = start(conn, app_id, app_name, RunKind::Interactive, 1)?;
    record_outputs(conn, &run.id, 0, outputs)?;

    match result {
        Ok(report) if report.stopped => {
            finish(conn, &run.id, RunOutcome::Stopped, None, 0, 0)?
        }
        Ok(_) => finish(conn, &run.id, RunOutcome::Completed, None, 1, 0)?,
        Err(err) => finish(
            conn,
            &run.id,
            RunOutcome::Failed,
            Some(&err.to_string()),
            0,
            1,
        )?,
    }
    load(conn, &run.id)?.ok_or_else(|| Error::Api(format!("Run {} vanished", run.id)))
}

/// Stores a finished batch job with one output set per successful row.
pub fn record_batch(
    conn: &Connection,
    app_id: Option<&str>,
    app_name: &str,
    progress: &BatchProgress,
) -> Result<RunRecord, Error> {
    let run = start(conn, app_id, app_name, RunKind::Batch, progress.total)?;
    for result in &progress.results {
        record_outputs(conn, &run.id, result.row, &result.outputs)?;
    }

    let status = if progress.processed() < progress.total {
        RunOutcome::Stopped
    } else if progress.done == 0 {
        RunOutcome::Failed
    } else {
        RunOutcome::Completed
    };
    let error = (!progress.failures.is_empty()).then(|| {
        progress
            .failures
            .iter()
            .map(|failure| format!("row {}: {}", failure.row + 1, failure.message))
            .collect::<Vec<_>>()
            .join("\n")
    });

    finish(
        conn,
        &run.id,
        status,
        error.as_deref(),
        progress.done,
        progress.failed,
    )?;
    load(conn, &run.id)?.ok_or_else(|| Error::Api(format!("Run {} vanished", run.id)))
}

pub fn load(conn: &Connection, run_id: &str) -> Result<Option<RunRecord>, Error> {
    let sql = format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1");
    Ok(conn
        .query_row(&sql, params![run_id], run_from_row)
        .optional()?)
}

/// Most recent runs first, optionally for one application.
pub fn list(conn: &Connection, app_id: Option<&str>, limit: usize) -> Result<Vec<RunRecord>, Error> {
    let sql = format!(
        "SELECT {RUN_COLUMNS} FROM runs
         WHERE (?1 IS NULL OR app_id = ?1)
         ORDER BY created_at DESC LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![app_id, limit as i64], run_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn outputs(conn: &Connection, run_id: &str) -> Result<Vec<StoredOutput>, Error> {
    let mut stmt = conn.prepare(
        "SELECT row_index, component_id, title, output_json FROM run_outputs
         WHERE run_id = ?1 ORDER BY row_index, rowid",
    )?;
    let rows = stmt.query_map(params![run_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;

    let mut stored = Vec::new();
    for row in rows {
        let (row_index, component_id, title, output_json) = row?;
        stored.push(StoredOutput {
            row_index,
            component_id: ComponentId(component_id as u64),
            title,
            output: output_json
                .map(|json| serde_json::from_str(&json))
                .transpose()?,
        });
    }
    Ok(stored)
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let kind: String = row.get(3)?;
    let status: String = row.get(4)?;
    Ok(RunRecord {
        id: row.get(0)?,
        app_id: row.get(1)?,
        app_name: row.get(2)?,
        kind: RunKind::parse(&kind).ok_or_else(|| invalid_text(3, &kind))?,
        status: RunOutcome::parse(&status).ok_or_else(|| invalid_text(4, &status))?,
        error: row.get(5)?,
        created_at: row.get(6)?,
        finished_at: row.get(7)?,
        total: row.get(8)?,
        done: row.get(9)?,
        failed: row.get(10)?,
    })
}

fn invalid_text(column: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        format!("unexpected value '{value}'").into(),
    )
}
