// chainlab/src/runner/mod.rs
//!
//! Component runners
//!
//! Every component runs through the same three steps:
//! 1. substitute `{Name}` placeholders from the components before it,
//! 2. perform its kind-specific action,
//! 3. store the output (or the error text) on the component.
//!
//! State machine: `idle -> running -> {completed | failed}`; a new run
//! always passes through `running` again. Nothing is retried.
//!
//! The per-kind actions live in submodules:
//! - `inputs`: text-input and batch-input (no network),
//! - `model`: openai and anthropic completions,
//! - `plugins`: output, tag-parser, google-search, doc-search,
//!   youtube-transcript.

mod inputs;
mod model;
mod plugins;

pub(crate) use inputs::ensure_table;
pub use plugins::NO_OUTPUT_GENERATED;

use crate::backend::{Backend, BackendError};
use crate::component::{Component, ComponentKind, ComponentOutput};
use crate::params::ParameterError;
use crate::table::TableError;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Raised before any network call.
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Parameters(#[from] ParameterError),
}

impl RunError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        RunError::Validation(message.into())
    }
}

/// Capability set shared by every component kind.
pub trait Runner {
    fn input(&self) -> &str;

    fn set_input(&mut self, input: &str);

    /// Runs the component against the outputs of `preceding`.
    fn run(
        &mut self,
        preceding: &[Component],
        backend: &dyn Backend,
    ) -> Result<ComponentOutput, RunError>;
}

impl Runner for Component {
    fn input(&self) -> &str {
        &self.input
    }

    fn set_input(&mut self, input: &str) {
        self.input = input.to_string();
    }

    fn run(
        &mut self,
        preceding: &[Component],
        backend: &dyn Backend,
    ) -> Result<ComponentOutput, RunError> {
        self.status.begin();

        let result = match self.kind {
            ComponentKind::TextInput => inputs::run_text_input(self),
            ComponentKind::BatchInput => inputs::run_batch_input(self, backend),
            ComponentKind::OpenAi | ComponentKind::Anthropic => {
                model::run_completion(self, preceding, backend)
            }
            ComponentKind::Output => plugins::run_output(self, preceding),
            ComponentKind::TagParser => plugins::run_tag_parser(self, preceding),
            ComponentKind::GoogleSearch => plugins::run_google_search(self, preceding, backend),
            ComponentKind::DocSearch => plugins::run_doc_search(self, preceding, backend),
            ComponentKind::YoutubeTranscript => {
                plugins::run_youtube_transcript(self, preceding, backend)
            }
        };

        match result {
            Ok(output) => {
                self.output = Some(output.clone());
                self.status.complete();
                Ok(output)
            }
            Err(err) => {
                tracing::error!(
                    id = %self.id,
                    kind = %self.kind,
                    title = %self.title,
                    error = %err,
                    "component run failed"
                );
                self.status.fail(err.to_string());
                Err(err)
            }
        }
    }
}

/// Substitutes placeholders and records the result as the processed input.
pub(crate) fn prepare_input(component: &mut Component, preceding: &[Component]) -> String {
    let processed = crate::substitution::substitute(&component.input, preceding);
    component.status.processed_input = Some(processed.clone());
    processed
}

/// Network-backed kinds refuse to send an empty request.
pub(crate) fn require_input(processed: &str, kind: ComponentKind) -> Result<(), RunError> {
    if processed.trim().is_empty() {
        return Err(RunError::validation(format!(
            "Input of the {kind} component cannot be empty."
        )));
    }
    Ok(())
}
