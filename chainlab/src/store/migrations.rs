// chainlab/src/store/migrations.rs
//!
//! Schema steps for the local store. Step `n` moves SQLite's `user_version`
//! from `n - 1` to `n`; steps are append-only once released.

use crate::Error;
use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};

/// One schema change and the name it is logged under.
#[derive(Debug, Clone, Copy)]
pub struct SchemaStep {
    pub version: i64,
    pub name: &'static str,
    sql: &'static str,
}

const STEPS: &[SchemaStep] = &[SchemaStep {
    version: 1,
    name: "applications, runs and run outputs",
    sql: include_str!("migrations/V1__initial_schema.sql"),
}];

/// Schema version once every step ran.
pub fn latest_version() -> i64 {
    STEPS.last().map_or(0, |step| step.version)
}

/// Steps a database at `current` still needs, oldest first.
pub fn pending(current: i64) -> impl Iterator<Item = &'static SchemaStep> {
    STEPS.iter().filter(move |step| step.version > current)
}

/// Brings `conn` to the latest version; returns how many steps ran.
pub fn apply(conn: &mut Connection) -> Result<usize, Error> {
    let current = super::schema_version(conn)?;
    let mut applied = 0;
    for step in pending(current) {
        tracing::info!(version = step.version, name = step.name, "applying schema step");
        applied += 1;
    }
    if applied > 0 {
        Migrations::new(STEPS.iter().map(|step| M::up(step.sql)).collect()).to_latest(conn)?;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_count_up_from_one() {
        for (index, step) in STEPS.iter().enumerate() {
            assert_eq!(step.version, index as i64 + 1, "{}", step.name);
        }
        assert_eq!(latest_version(), STEPS.len() as i64);
    }

    #[test]
    fn apply_runs_pending_steps_once() -> anyhow::Result<()> {
        let mut conn = Connection::open_in_memory()?;
        assert_eq!(pending(0).count(), STEPS.len());

        assert_eq!(apply(&mut conn)?, STEPS.len());
        let version = crate::store::schema_version(&conn)?;
        assert_eq!(version, latest_version());
        assert_eq!(pending(version).count(), 0);

        assert_eq!(apply(&mut conn)?, 0);
        Ok(())
    }
}
