#![allow(dead_code)]

use chainlab::backend::{Backend, BackendError, CompletionRequest, DocumentSearchRequest};
use chainlab::table::FileRecord;
use chainlab::StopHandle;
use serde_json::{json, Value};
use std::sync::Mutex;

/// Backend double: echoes inputs, records every call, fails on demand.
#[derive(Default)]
pub struct RecordingBackend {
    pub calls: Mutex<Vec<String>>,
    /// Any request whose input contains this marker fails.
    fail_marker: Option<String>,
    /// Cleared on the first call, to simulate a user pressing stop mid-run.
    stop_on_call: Option<StopHandle>,
    file: Option<FileRecord>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            ..Self::default()
        }
    }

    pub fn stopping(handle: StopHandle) -> Self {
        Self {
            stop_on_call: Some(handle),
            ..Self::default()
        }
    }

    pub fn with_file(mut self, file: FileRecord) -> Self {
        self.file = Some(file);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, call: String, input: &str) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(call);
        if let Some(handle) = &self.stop_on_call {
            handle.stop();
        }
        match &self.fail_marker {
            Some(marker) if input.contains(marker.as_str()) => Err(BackendError::Http {
                status: 403,
                message: "Quota limit exceeded. Please provide your API key.".into(),
            }),
            _ => Ok(()),
        }
    }
}

impl Backend for RecordingBackend {
    fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        self.record(format!("complete:{}", request.input), &request.input)?;
        Ok(format!("echo: {}", request.input))
    }

    fn google_search(&self, query: &str, num_results: u32) -> Result<String, BackendError> {
        self.record(format!("google:{query}"), query)?;
        Ok(format!("{num_results} results for {query}"))
    }

    fn youtube_transcript(&self, video_url: &str) -> Result<Value, BackendError> {
        self.record(format!("youtube:{video_url}"), video_url)?;
        Ok(json!({ "video_url": video_url, "transcript": "hello" }))
    }

    fn search_documents(&self, request: &DocumentSearchRequest) -> Result<String, BackendError> {
        self.record(format!("docs:{}", request.input), &request.input)?;
        Ok(format!("top {} docs for {}", request.top_n, request.input))
    }

    fn load_file(&self, file_id: &str) -> Result<FileRecord, BackendError> {
        self.record(format!("file:{file_id}"), file_id)?;
        self.file.clone().ok_or(BackendError::Http {
            status: 404,
            message: "File not found".into(),
        })
    }
}

/// A backend file record holding a column-major table.
pub fn table_file(id: &str, content: Value) -> FileRecord {
    FileRecord {
        id: id.to_string(),
        name: format!("{id}.csv"),
        kind: "Table".to_string(),
        size: 0,
        content: Some(Value::String(content.to_string())),
    }
}
