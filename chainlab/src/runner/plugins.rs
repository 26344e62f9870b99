// chainlab/src/runner/plugins.rs
use super::{prepare_input, require_input, RunError};
use crate::backend::{Backend, BackendError, DocumentSearchRequest};
use crate::component::{Component, ComponentOutput};
use crate::params::{self, DocSearchParameters, GoogleSearchParameters, TagParserParameters};
use crate::tag_parser::{self, NO_DATA_EXTRACTED};

pub const NO_OUTPUT_GENERATED: &str = "No output generated.";

pub(super) fn run_output(
    component: &mut Component,
    preceding: &[Component],
) -> Result<ComponentOutput, RunError> {
    let processed = prepare_input(component, preceding);
    if processed.is_empty() {
        component.status.notice = Some(NO_OUTPUT_GENERATED.to_string());
    }
    Ok(ComponentOutput::Text(processed))
}

/// A miss is not an error: the output is empty and a notice is set.
pub(super) fn run_tag_parser(
    component: &mut Component,
    preceding: &[Component],
) -> Result<ComponentOutput, RunError> {
    let parameters: TagParserParameters = params::parse(component)?;
    let tag = parameters.extract_pattern.trim();
    if tag.is_empty() {
        return Err(RunError::validation("Enter a tag to extract."));
    }

    let processed = prepare_input(component, preceding);
    match tag_parser::extract_tag(&processed, tag) {
        Some(body) => Ok(ComponentOutput::Text(body)),
        None => {
            component.status.notice = Some(NO_DATA_EXTRACTED.to_string());
            Ok(ComponentOutput::Text(String::new()))
        }
    }
}

pub(super) fn run_google_search(
    component: &mut Component,
    preceding: &[Component],
    backend: &dyn Backend,
) -> Result<ComponentOutput, RunError> {
    let parameters: GoogleSearchParameters = params::parse(component)?;
    let processed = prepare_input(component, preceding);
    require_input(&processed, component.kind)?;

    let result = backend.google_search(&processed, parameters.num_results)?;
    Ok(ComponentOutput::Text(result))
}

pub(super) fn run_doc_search(
    component: &mut Component,
    preceding: &[Component],
    backend: &dyn Backend,
) -> Result<ComponentOutput, RunError> {
    let parameters: DocSearchParameters = params::parse(component)?;
    if parameters.embedding_id.trim().is_empty() {
        return Err(RunError::validation("Select a document to search."));
    }

    let processed = prepare_input(component, preceding);
    require_input(&processed, component.kind)?;

    let result = backend.search_documents(&DocumentSearchRequest {
        embedding_id: parameters.embedding_id,
        input: processed,
        top_n: parameters.top_n,
    })?;
    Ok(ComponentOutput::Text(result))
}

pub(super) fn run_youtube_transcript(
    component: &mut Component,
    preceding: &[Component],
    backend: &dyn Backend,
) -> Result<ComponentOutput, RunError> {
    let processed = prepare_input(component, preceding);
    require_input(&processed, component.kind)?;

    let transcript = backend.youtube_transcript(processed.trim())?;
    let pretty = serde_json::to_string_pretty(&transcript)
        .map_err(|e| BackendError::Decode(e.to_string()))?;
    Ok(ComponentOutput::Text(pretty))
}
