// chainlab/src/runner/model.rs
use super::{prepare_input, require_input, RunError};
use crate::backend::{Backend, CompletionRequest, ModelProvider};
use crate::component::{Component, ComponentKind, ComponentOutput};
use crate::params::{self, AnthropicParameters, OpenAiParameters};
use serde_json::{Map, Value};

/// Sends the substituted input to the model provider behind `component.kind`.
pub(super) fn run_completion(
    component: &mut Component,
    preceding: &[Component],
    backend: &dyn Backend,
) -> Result<ComponentOutput, RunError> {
    let provider = ModelProvider::for_kind(component.kind)
        .ok_or_else(|| RunError::validation(format!("{} is not a model component", component.kind)))?;

    let processed = prepare_input(component, preceding);
    require_input(&processed, component.kind)?;

    let request = CompletionRequest {
        provider,
        input: processed,
        parameters: model_parameters(component)?,
    };

    let started = std::time::Instant::now();
    let text = backend.complete(&request)?;
    tracing::debug!(
        title = %component.title,
        provider = ?provider,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "completion finished"
    );

    Ok(ComponentOutput::Text(text))
}

/// Typed parameters with defaults filled in, back in camelCase object form.
fn model_parameters(component: &Component) -> Result<Map<String, Value>, RunError> {
    let value = match component.kind {
        ComponentKind::Anthropic => {
            serde_json::to_value(params::parse::<AnthropicParameters>(component)?)
        }
        _ => serde_json::to_value(params::parse::<OpenAiParameters>(component)?),
    };

    match value {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(RunError::validation("model parameters could not be encoded")),
    }
}
