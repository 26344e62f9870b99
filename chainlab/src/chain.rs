// chainlab/src/chain.rs
//!
//! Chain: the ordered list of components that makes up an application
//!
//! This module holds the editor operations (add, remove, reorder, rename,
//! field setters) and the `Application` record a chain is saved in.
//!
//! Invariants kept here:
//! - component ids are unique and never change after `add`,
//! - at most one batch-input component per chain,
//! - renaming a component rewrites `{old}` tokens in every input.

use crate::casing;
use crate::component::{Component, ComponentId, ComponentKind, ComponentOutput};
use crate::params;
use crate::substitution;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static TITLE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid regex"));

pub const MAX_APP_NAME_CHARS: usize = 44;

pub const DUPLICATE_BATCH_INPUT: &str =
    "Only one batch-input component is allowed for each application";

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("{DUPLICATE_BATCH_INPUT}")]
    DuplicateBatchInput,
    #[error("no component with id {0}")]
    UnknownComponent(ComponentId),
    #[error("component id {0} is used more than once")]
    DuplicateId(ComponentId),
    #[error("index {index} is out of range for a chain of {len} components")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Title cannot be empty")]
    EmptyTitle,
    #[error("Application name cannot exceed {MAX_APP_NAME_CHARS} characters.")]
    NameTooLong,
    #[error("malformed application record: {0}")]
    Record(String),
}

/// Serialized as the bare component list; deserializing re-checks the invariants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Component>", into = "Vec<Component>")]
pub struct Chain {
    components: Vec<Component>,
}

impl TryFrom<Vec<Component>> for Chain {
    type Error = ChainError;

    fn try_from(components: Vec<Component>) -> Result<Self, Self::Error> {
        Self::from_components(components)
    }
}

impl From<Chain> for Vec<Component> {
    fn from(chain: Chain) -> Self {
        chain.components
    }
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The chain a new application starts with: one text input feeding one model.
    pub fn starter() -> Self {
        let mut chain = Self::new();
        // Neither kind is a batch-input, so both adds succeed.
        let _ = chain.add(ComponentKind::TextInput);
        let _ = chain.add(ComponentKind::OpenAi);
        chain
    }

    pub fn from_components(components: Vec<Component>) -> Result<Self, ChainError> {
        let batch_inputs = components
            .iter()
            .filter(|c| c.kind == ComponentKind::BatchInput)
            .count();
        if batch_inputs > 1 {
            return Err(ChainError::DuplicateBatchInput);
        }

        let mut seen = HashSet::with_capacity(components.len());
        if let Some(repeated) = components.iter().find(|c| !seen.insert(c.id)) {
            return Err(ChainError::DuplicateId(repeated.id));
        }
        Ok(Self { components })
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut [Component] {
        &mut self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn index_of(&self, id: ComponentId) -> Option<usize> {
        self.components.iter().position(|c| c.id == id)
    }

    pub fn get(&self, id: ComponentId) -> Option<&Component> {
        self.components.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.components.iter_mut().find(|c| c.id == id)
    }

    pub fn find_by_title(&self, title: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.title == title)
    }

    fn component_mut(&mut self, id: ComponentId) -> Result<&mut Component, ChainError> {
        self.get_mut(id).ok_or(ChainError::UnknownComponent(id))
    }

    // ========================================================================
    // Editing
    // ========================================================================

    /// Appends a component of `kind` with a generated title and default parameters.
    pub fn add(&mut self, kind: ComponentKind) -> Result<ComponentId, ChainError> {
        if kind == ComponentKind::BatchInput && self.batch_input().is_some() {
            return Err(ChainError::DuplicateBatchInput);
        }

        let title = generate_title(kind, &self.components);
        let mut component = Component::new(kind, title);
        component.parameters = params::defaults_for(kind);
        let id = component.id;

        tracing::debug!(%id, kind = %kind, title = %component.title, "component added");
        self.components.push(component);
        Ok(id)
    }

    /// Appends an already built component.
    pub fn push(&mut self, component: Component) -> Result<ComponentId, ChainError> {
        if component.kind == ComponentKind::BatchInput && self.batch_input().is_some() {
            return Err(ChainError::DuplicateBatchInput);
        }
        let id = component.id;
        if self.get(id).is_some() {
            return Err(ChainError::DuplicateId(id));
        }
        self.components.push(component);
        Ok(id)
    }

    pub fn remove(&mut self, id: ComponentId) -> Result<Component, ChainError> {
        let index = self.index_of(id).ok_or(ChainError::UnknownComponent(id))?;
        Ok(self.components.remove(index))
    }

    /// Moves the component at `from` so that it ends up at `to`.
    pub fn move_component(&mut self, from: usize, to: usize) -> Result<(), ChainError> {
        let len = self.components.len();
        for index in [from, to] {
            if index >= len {
                return Err(ChainError::IndexOutOfRange { index, len });
            }
        }

        let component = self.components.remove(from);
        self.components.insert(to, component);
        Ok(())
    }

    /// Retitles a component and rewrites references to it in every input.
    /// A text input also gets its default `{<title> Content}` input back.
    pub fn rename(&mut self, id: ComponentId, new_title: &str) -> Result<(), ChainError> {
        if new_title.trim().is_empty() {
            return Err(ChainError::EmptyTitle);
        }
        let component = self.component_mut(id)?;
        let old_title = std::mem::replace(&mut component.title, new_title.to_string());
        if old_title == new_title {
            return Ok(());
        }
        if component.kind == ComponentKind::TextInput {
            component.input = format!("{{{new_title} Content}}");
        }

        for component in &mut self.components {
            component.input = substitution::rename_token(&component.input, &old_title, new_title);
        }
        Ok(())
    }

    pub fn set_input(&mut self, id: ComponentId, input: &str) -> Result<(), ChainError> {
        self.component_mut(id)?.input = input.to_string();
        Ok(())
    }

    pub fn set_user_input(&mut self, id: ComponentId, text: &str) -> Result<(), ChainError> {
        self.component_mut(id)?.user_input = Some(text.to_string());
        Ok(())
    }

    pub fn set_file_id(&mut self, id: ComponentId, file_id: &str) -> Result<(), ChainError> {
        let component = self.component_mut(id)?;
        if component.file_id.as_deref() != Some(file_id) {
            component.table = None;
            component.selected_row = 0;
        }
        component.file_id = Some(file_id.to_string());
        Ok(())
    }

    pub fn set_parameter(
        &mut self,
        id: ComponentId,
        key: &str,
        value: Value,
    ) -> Result<(), ChainError> {
        self.component_mut(id)?
            .parameters
            .insert(key.to_string(), value);
        Ok(())
    }

    pub fn set_app_input(&mut self, id: ComponentId, flag: bool) -> Result<(), ChainError> {
        self.component_mut(id)?.is_app_input = flag;
        Ok(())
    }

    pub fn set_app_output(&mut self, id: ComponentId, flag: bool) -> Result<(), ChainError> {
        self.component_mut(id)?.is_app_output = flag;
        Ok(())
    }

    pub fn set_output(
        &mut self,
        id: ComponentId,
        output: Option<ComponentOutput>,
    ) -> Result<(), ChainError> {
        self.component_mut(id)?.output = output;
        Ok(())
    }

    /// Drops every output and run state, e.g. before a fresh batch row.
    pub fn clear_outputs(&mut self) {
        for component in &mut self.components {
            component.output = None;
            component.status = Default::default();
        }
    }

    /// Applies the values a user entered for an application's inputs.
    ///
    /// Returns how many components were updated; unknown ids are skipped.
    pub fn apply_variables(&mut self, variables: &[ApplicationVariable]) -> usize {
        let mut applied = 0;
        for variable in variables {
            let Some(component) = self.get_mut(variable.id) else {
                tracing::warn!(id = %variable.id, "variable refers to an unknown component");
                continue;
            };
            match component.kind {
                ComponentKind::TextInput => {
                    if let Some(text) = &variable.user_input {
                        component.user_input = Some(text.clone());
                        applied += 1;
                    }
                }
                ComponentKind::BatchInput => {
                    if let Some(file_id) = &variable.file_id {
                        if component.file_id.as_deref() != Some(file_id.as_str()) {
                            component.table = None;
                            component.selected_row = 0;
                        }
                        component.file_id = Some(file_id.clone());
                        applied += 1;
                    }
                }
                _ => {}
            }
        }
        applied
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn placeholder_options(&self, index: usize) -> Vec<String> {
        substitution::placeholder_options(&self.components, index)
    }

    pub fn app_inputs(&self) -> Vec<&Component> {
        self.components.iter().filter(|c| c.is_app_input).collect()
    }

    pub fn app_outputs(&self) -> Vec<&Component> {
        self.components.iter().filter(|c| c.is_app_output).collect()
    }

    pub fn batch_input(&self) -> Option<&Component> {
        self.components
            .iter()
            .find(|c| c.kind == ComponentKind::BatchInput)
    }

    pub fn batch_input_mut(&mut self) -> Option<&mut Component> {
        self.components
            .iter_mut()
            .find(|c| c.kind == ComponentKind::BatchInput)
    }

    /// Copy of the components without outputs or runtime state.
    pub fn persisted(&self) -> Chain {
        Chain {
            components: self.components.iter().map(Component::persisted).collect(),
        }
    }
}

/// Next free title for `kind`, e.g. `Model 3` when `Model 2` is the highest.
pub fn generate_title(kind: ComponentKind, components: &[Component]) -> String {
    let prefix = kind.title_prefix();
    let highest = components
        .iter()
        .filter_map(|component| component.title.strip_prefix(prefix))
        .map(|rest| {
            TITLE_NUMBER
                .find(rest)
                .and_then(|m| m.as_str().parse::<u64>().ok())
                .unwrap_or(0)
        })
        .max()
        .unwrap_or(0);

    format!("{prefix}{}", highest + 1)
}

/// A value supplied for one of an application's inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationVariable {
    pub id: ComponentId,
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

/// Saved application: metadata plus its chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    pub app_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub chain: Chain,
}

impl Application {
    pub fn new(name: impl Into<String>, chain: Chain) -> Self {
        Self {
            app_id: None,
            app_name: name.into(),
            tags: Vec::new(),
            description: String::new(),
            chain,
        }
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        if self.app_name.chars().count() > MAX_APP_NAME_CHARS {
            return Err(ChainError::NameTooLong);
        }
        Ok(())
    }

    /// Backend shape: `appId` becomes `id`, every key is snake_case.
    pub fn to_wire(&self) -> Result<Value, ChainError> {
        self.validate()?;
        let record = Application {
            chain: self.chain.persisted(),
            ..self.clone()
        };
        let mut value =
            serde_json::to_value(&record).map_err(|e| ChainError::Record(e.to_string()))?;

        if let Some(object) = value.as_object_mut() {
            if let Some(app_id) = object.remove("appId") {
                object.insert("id".to_string(), app_id);
            }
        }
        Ok(casing::decamelize_keys(value))
    }

    /// Inverse of [`Application::to_wire`]; unknown keys are ignored.
    pub fn from_wire(value: Value) -> Result<Self, ChainError> {
        let mut value = casing::camelize_keys(value);
        if let Some(object) = value.as_object_mut() {
            if let Some(id) = object.remove("id") {
                object.insert("appId".to_string(), stringify_id(id));
            }
        }

        // The chain's own checks run inside deserialization.
        serde_json::from_value(value).map_err(|e| ChainError::Record(e.to_string()))
    }
}

fn stringify_id(id: Value) -> Value {
    match id {
        Value::Number(n) => Value::String(n.to_string()),
        other => other,
    }
}
