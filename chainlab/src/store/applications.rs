// chainlab/src/store/applications.rs

use crate::chain::{Application, Chain};
use crate::Error;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

// === Queries for the 'applications' table ===

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationSummary {
    pub id: String,
    pub name: String,
    pub tags: Vec<String>,
    pub description: String,
    pub components: usize,
    pub updated_at: DateTime<Utc>,
}

/// Inserts or replaces an application; one without an id gets a fresh one.
///
/// Only the persisted chain is stored: outputs and run state are dropped.
pub fn upsert(conn: &Connection, application: &Application) -> Result<String, Error> {
    let id = application
        .app_id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let now = Utc::now();
    let tags_json = serde_json::to_string(&application.tags)?;
    let chain_json = serde_json::to_string(&application.chain.persisted())?;

    conn.execute(
        "INSERT INTO applications (id, name, tags_json, description, chain_json, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            tags_json = excluded.tags_json,
            description = excluded.description,
            chain_json = excluded.chain_json,
            updated_at = excluded.updated_at",
        params![
            id,
            application.app_name,
            tags_json,
            application.description,
            chain_json,
            &now
        ],
    )?;

    Ok(id)
}

pub fn load(conn: &Connection, id: &str) -> Result<Option<Application>, Error> {
    let row = conn
        .query_row(
            "SELECT id, name, tags_json, description, chain_json FROM applications WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((id, name, tags_json, description, chain_json)) = row else {
        return Ok(None);
    };

    let chain: Chain = serde_json::from_str(&chain_json)?;
    Ok(Some(Application {
        app_id: Some(id),
        app_name: name,
        tags: serde_json::from_str(&tags_json)?,
        description,
        chain,
    }))
}

/// Lists applications, most recently updated first.
pub fn list(conn: &Connection) -> Result<Vec<ApplicationSummary>, Error> {
    let mut stmt = conn.prepare(
        "SELECT id, name, tags_json, description, chain_json, updated_at
         FROM applications ORDER BY updated_at DESC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, DateTime<Utc>>(5)?,
        ))
    })?;

    let mut summaries = Vec::new();
    for row in rows {
        let (id, name, tags_json, description, chain_json, updated_at) = row?;
        let chain: Chain = serde_json::from_str(&chain_json)?;
        summaries.push(ApplicationSummary {
            id,
            name,
            tags: serde_json::from_str(&tags_json)?,
            description,
            components: chain.len(),
            updated_at,
        });
    }
    Ok(summaries)
}

/// Returns whether a row was deleted. Runs keep their history with `app_id` cleared.
pub fn delete(conn: &Connection, id: &str) -> Result<bool, Error> {
    let deleted = conn.execute("DELETE FROM applications WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}
