// chainlab/src/component.rs
//!
//! Component: one typed step of a chain
//!
//! A component is the unit the chain editor adds, reorders and runs. Its
//! persisted shape mirrors the application record the backend stores
//! (camelCase keys, `type` tag, `0`/`1` app flags); the run state, last
//! error and attached batch table only live in memory.

use crate::table::Table;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Closed set of component kinds a chain can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentKind {
    TextInput,
    BatchInput,
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Output,
    TagParser,
    GoogleSearch,
    DocSearch,
    YoutubeTranscript,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::TextInput => "text-input",
            ComponentKind::BatchInput => "batch-input",
            ComponentKind::OpenAi => "openai",
            ComponentKind::Anthropic => "anthropic",
            ComponentKind::Output => "output",
            ComponentKind::TagParser => "tag-parser",
            ComponentKind::GoogleSearch => "google-search",
            ComponentKind::DocSearch => "doc-search",
            ComponentKind::YoutubeTranscript => "youtube-transcript",
        }
    }

    /// Prefix used when generating a title for a freshly added component.
    pub fn title_prefix(&self) -> &'static str {
        match self {
            ComponentKind::OpenAi | ComponentKind::Anthropic => "Model ",
            ComponentKind::TextInput | ComponentKind::BatchInput => "Input ",
            ComponentKind::Output => "Output ",
            ComponentKind::TagParser
            | ComponentKind::GoogleSearch
            | ComponentKind::DocSearch
            | ComponentKind::YoutubeTranscript => "Plug-in ",
        }
    }

    /// Data sources feed the app; everything else is an app output by default.
    pub fn is_data_source(&self) -> bool {
        matches!(self, ComponentKind::TextInput | ComponentKind::BatchInput)
    }

    /// Kinds whose action goes over the network.
    pub fn calls_backend(&self) -> bool {
        matches!(
            self,
            ComponentKind::OpenAi
                | ComponentKind::Anthropic
                | ComponentKind::GoogleSearch
                | ComponentKind::DocSearch
                | ComponentKind::YoutubeTranscript
        )
    }

    pub fn all() -> Vec<Self> {
        vec![
            ComponentKind::TextInput,
            ComponentKind::BatchInput,
            ComponentKind::OpenAi,
            ComponentKind::Anthropic,
            ComponentKind::Output,
            ComponentKind::TagParser,
            ComponentKind::GoogleSearch,
            ComponentKind::DocSearch,
            ComponentKind::YoutubeTranscript,
        ]
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ComponentKind::all()
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown component type: {s}"))
    }
}

static LAST_ID: AtomicU64 = AtomicU64::new(0);

/// Millisecond timestamp id, strictly increasing within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(pub u64);

impl ComponentId {
    pub fn generate() -> Self {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let mut last = LAST_ID.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match LAST_ID.compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return ComponentId(next),
                Err(observed) => last = observed,
            }
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One column of the selected batch row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchField {
    #[serde(rename = "Field")]
    pub field: String,
    #[serde(rename = "Value")]
    pub value: String,
}

impl BatchField {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Last value a component produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComponentOutput {
    Text(String),
    Batch(Vec<BatchField>),
}

impl ComponentOutput {
    pub fn is_empty(&self) -> bool {
        match self {
            ComponentOutput::Text(text) => text.is_empty(),
            ComponentOutput::Batch(fields) => fields.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ComponentOutput::Text(text) => Some(text),
            ComponentOutput::Batch(_) => None,
        }
    }

    pub fn as_fields(&self) -> Option<&[BatchField]> {
        match self {
            ComponentOutput::Batch(fields) => Some(fields),
            ComponentOutput::Text(_) => None,
        }
    }

    /// Text suitable for printing; batch rows render as `Field: Value` lines.
    pub fn display_text(&self) -> String {
        match self {
            ComponentOutput::Text(text) => text.clone(),
            ComponentOutput::Batch(fields) => fields
                .iter()
                .map(|f| format!("{}: {}", f.field, f.value))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<String> for ComponentOutput {
    fn from(value: String) -> Self {
        ComponentOutput::Text(value)
    }
}

impl From<&str> for ComponentOutput {
    fn from(value: &str) -> Self {
        ComponentOutput::Text(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

/// In-memory run bookkeeping for a component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStatus {
    pub state: RunState,
    /// Display-only error string of the last failed run.
    pub error: Option<String>,
    /// Input after placeholder substitution, as sent to the action.
    pub processed_input: Option<String>,
    /// Soft indicator such as "No data extracted."
    pub notice: Option<String>,
}

impl RunStatus {
    pub(crate) fn begin(&mut self) {
        self.state = RunState::Running;
        self.error = None;
        self.notice = None;
        self.processed_input = None;
    }

    pub(crate) fn complete(&mut self) {
        self.state = RunState::Completed;
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.state = RunState::Failed;
        self.error = Some(message);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub id: ComponentId,
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    #[serde(default)]
    pub title: String,
    #[serde(default, with = "int_flag")]
    pub is_app_input: bool,
    #[serde(default, with = "int_flag")]
    pub is_app_output: bool,
    #[serde(default)]
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ComponentOutput>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,

    #[serde(skip)]
    pub status: RunStatus,
    #[serde(skip)]
    pub(crate) table: Option<Table>,
    #[serde(skip)]
    pub(crate) selected_row: usize,
}

impl Component {
    pub fn new(kind: ComponentKind, title: impl Into<String>) -> Self {
        let title = title.into();
        let input = if kind == ComponentKind::TextInput {
            format!("{{{title} Content}}")
        } else {
            String::new()
        };

        Self {
            id: ComponentId::generate(),
            kind,
            is_app_input: kind.is_data_source(),
            is_app_output: !kind.is_data_source(),
            title,
            input,
            output: None,
            parameters: Map::new(),
            user_input: None,
            file_id: None,
            status: RunStatus::default(),
            table: None,
            selected_row: 0,
        }
    }

    /// Builder-style helper, mostly for assembling chains in code.
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }

    pub fn with_parameter(mut self, key: &str, value: Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }

    pub fn with_output(mut self, output: impl Into<ComponentOutput>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }

    /// Attaches tabular data to a batch-input and selects its first row.
    pub fn attach_table(&mut self, table: Table) {
        self.table = Some(table);
        self.selected_row = 0;
    }

    pub fn table(&self) -> Option<&Table> {
        self.table.as_ref()
    }

    pub fn select_row(&mut self, row: usize) {
        self.selected_row = row;
    }

    pub fn selected_row(&self) -> usize {
        self.selected_row
    }

    /// Non-empty output, if any.
    pub fn current_output(&self) -> Option<&ComponentOutput> {
        self.output.as_ref().filter(|output| !output.is_empty())
    }

    /// Copy suitable for persisting: outputs and runtime state dropped.
    pub fn persisted(&self) -> Self {
        let mut copy = self.clone();
        copy.output = None;
        copy.status = RunStatus::default();
        copy.table = None;
        copy.selected_row = 0;
        copy
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.kind == other.kind
            && self.title == other.title
            && self.is_app_input == other.is_app_input
            && self.is_app_output == other.is_app_output
            && self.input == other.input
            && self.output == other.output
            && self.parameters == other.parameters
            && self.user_input == other.user_input
            && self.file_id == other.file_id
    }
}

/// App flags travel as `0`/`1` integers; booleans are accepted on read.
mod int_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &bool, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Flag {
            Bool(bool),
            Int(i64),
        }

        Ok(match Flag::deserialize(deserializer)? {
            Flag::Bool(value) => value,
            Flag::Int(value) => value != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_wire_names() {
        for kind in ComponentKind::all() {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, Value::String(kind.as_str().to_string()));
            assert_eq!(kind.as_str().parse::<ComponentKind>(), Ok(kind));
        }
        assert!("google".parse::<ComponentKind>().is_err());
    }

    #[test]
    fn ids_are_strictly_increasing() {
        let ids: Vec<_> = (0..100).map(|_| ComponentId::generate()).collect();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn text_input_defaults_to_content_placeholder() {
        let component = Component::new(ComponentKind::TextInput, "Input 1");
        assert_eq!(component.input, "{Input 1 Content}");
        assert!(component.is_app_input);
        assert!(!component.is_app_output);

        let model = Component::new(ComponentKind::OpenAi, "Model 1");
        assert_eq!(model.input, "");
        assert!(model.is_app_output);
    }

    #[test]
    fn flags_accept_integers_and_serialize_as_integers() {
        let json = serde_json::json!({
            "id": 1700000000000u64,
            "type": "tag-parser",
            "title": "Plug-in 1",
            "isAppInput": 0,
            "isAppOutput": true,
            "input": "{Model 1}",
            "parameters": { "extractPattern": "answer" }
        });

        let component: Component = serde_json::from_value(json).unwrap();
        assert_eq!(component.kind, ComponentKind::TagParser);
        assert!(!component.is_app_input);
        assert!(component.is_app_output);
        assert_eq!(component.parameter_str("extractPattern"), Some("answer"));

        let back = serde_json::to_value(&component).unwrap();
        assert_eq!(back["isAppOutput"], Value::from(1));
        assert!(back.get("output").is_none());
    }

    #[test]
    fn batch_output_uses_capitalized_keys() {
        let output = ComponentOutput::Batch(vec![BatchField::new("name", "Alice")]);
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json, serde_json::json!([{ "Field": "name", "Value": "Alice" }]));

        let parsed: ComponentOutput = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, output);
    }
}
