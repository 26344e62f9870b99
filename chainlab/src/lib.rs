// chainlab/src/lib.rs

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

// The shared database pool type
pub type DbPool = Pool<SqliteConnectionManager>;

// Crate-level error; module seams have their own enums that convert into it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
    #[error(transparent)]
    Pool(#[from] r2d2::Error),
    #[error(transparent)]
    Keyring(#[from] keyring::Error),
    #[error(transparent)]
    Migration(#[from] rusqlite_migration::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Chain(#[from] chain::ChainError),
    #[error(transparent)]
    ChainRun(#[from] orchestrator::ChainRunError),
    #[error(transparent)]
    Batch(#[from] batch::BatchError),
    #[error(transparent)]
    Backend(#[from] backend::BackendError),
    #[error(transparent)]
    Table(#[from] table::TableError),
    #[error("API Error: {0}")]
    Api(String),
}

impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}

pub mod backend;
pub mod batch;
pub mod casing;
pub mod chain;
pub mod component;
pub mod config;
pub mod credentials;
pub mod keychain;
pub mod orchestrator;
pub mod params;
pub mod runner;
pub mod store;
pub mod substitution;
pub mod table;
pub mod tag_parser;

pub use backend::{Backend, BackendError, HttpBackend};
pub use chain::{Application, ApplicationVariable, Chain, ChainError};
pub use component::{BatchField, Component, ComponentId, ComponentKind, ComponentOutput};
pub use orchestrator::{ChainRunError, Orchestrator, RunReport, StopHandle};
pub use runner::{RunError, Runner};
