// chainlab/src/params.rs
//!
//! Typed views over a component's free-form `parameters` object.
//!
//! Keys are camelCase, missing keys fall back to the defaults the editor
//! seeds new components with.

use crate::component::{Component, ComponentKind};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenAiParameters {
    pub model_name: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

impl Default for OpenAiParameters {
    fn default() -> Self {
        Self {
            model_name: "gpt-3.5-turbo".into(),
            temperature: 0.1,
            max_tokens: 300,
            top_p: 0.8,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnthropicParameters {
    pub model_name: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
}

impl Default for AnthropicParameters {
    fn default() -> Self {
        Self {
            model_name: "claude-2".into(),
            temperature: 0.7,
            max_tokens: 1000,
            top_p: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoogleSearchParameters {
    pub num_results: u32,
}

impl Default for GoogleSearchParameters {
    fn default() -> Self {
        Self { num_results: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocSearchParameters {
    pub embedding_id: String,
    pub file_name: String,
    #[serde(alias = "top_n")]
    pub top_n: u32,
}

impl Default for DocSearchParameters {
    fn default() -> Self {
        Self {
            embedding_id: String::new(),
            file_name: String::new(),
            top_n: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TagParserParameters {
    pub extract_pattern: String,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid parameters for {kind}: {source}")]
pub struct ParameterError {
    pub kind: ComponentKind,
    #[source]
    pub source: serde_json::Error,
}

/// Reads a typed view out of `component.parameters`.
pub fn parse<T: DeserializeOwned>(component: &Component) -> Result<T, ParameterError> {
    serde_json::from_value(Value::Object(component.parameters.clone())).map_err(|source| {
        ParameterError {
            kind: component.kind,
            source,
        }
    })
}

/// Parameters a freshly added component starts with.
pub fn defaults_for(kind: ComponentKind) -> Map<String, Value> {
    let value = match kind {
        ComponentKind::OpenAi => serde_json::to_value(OpenAiParameters::default()),
        ComponentKind::Anthropic => serde_json::to_value(AnthropicParameters::default()),
        ComponentKind::GoogleSearch => serde_json::to_value(GoogleSearchParameters::default()),
        ComponentKind::DocSearch => serde_json::to_value(DocSearchParameters::default()),
        ComponentKind::TagParser => serde_json::to_value(TagParserParameters::default()),
        _ => return Map::new(),
    };

    match value {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let component = Component::new(ComponentKind::OpenAi, "Model 1")
            .with_parameter("modelName", json!("gpt-4"))
            .with_parameter("maxTokens", json!(50));

        let params: OpenAiParameters = parse(&component).unwrap();
        assert_eq!(params.model_name, "gpt-4");
        assert_eq!(params.max_tokens, 50);
        assert_eq!(params.temperature, 0.1);
        assert_eq!(params.top_p, 0.8);
    }

    #[test]
    fn defaults_are_camel_case() {
        let defaults = defaults_for(ComponentKind::Anthropic);
        assert_eq!(defaults["modelName"], "claude-2");
        assert_eq!(defaults["maxTokens"], 1000);

        assert_eq!(defaults_for(ComponentKind::DocSearch)["topN"], 3);
        assert!(defaults_for(ComponentKind::Output).is_empty());
    }

    #[test]
    fn wrong_types_are_reported() {
        let component = Component::new(ComponentKind::GoogleSearch, "Plug-in 1")
            .with_parameter("numResults", json!("three"));

        let err = parse::<GoogleSearchParameters>(&component).unwrap_err();
        assert_eq!(err.kind, ComponentKind::GoogleSearch);
    }
}
