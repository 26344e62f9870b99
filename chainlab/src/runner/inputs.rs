// chainlab/src/runner/inputs.rs
use super::RunError;
use crate::backend::Backend;
use crate::component::{Component, ComponentOutput};
use crate::table::Table;

/// The user's text, untouched by substitution.
pub(super) fn run_text_input(component: &mut Component) -> Result<ComponentOutput, RunError> {
    let text = component.user_input.clone().unwrap_or_default();
    component.status.processed_input = Some(text.clone());
    Ok(ComponentOutput::Text(text))
}

/// The selected row of the attached table as `{Field, Value}` pairs.
pub(super) fn run_batch_input(
    component: &mut Component,
    backend: &dyn Backend,
) -> Result<ComponentOutput, RunError> {
    let row = component.selected_row;
    let table = ensure_table(component, backend)?;
    if table.is_empty() {
        return Err(RunError::validation("The selected table has no rows."));
    }

    let fields = table.row_fields(row)?;
    Ok(ComponentOutput::Batch(fields))
}

/// The table behind a batch-input. A component with a `file_id` but no
/// table fetches it once and keeps it.
pub(crate) fn ensure_table<'c>(
    component: &'c mut Component,
    backend: &dyn Backend,
) -> Result<&'c Table, RunError> {
    if component.table.is_none() {
        let file_id = component
            .file_id
            .clone()
            .ok_or_else(|| RunError::validation("Select or upload a table for the batch input."))?;

        let record = backend.load_file(&file_id)?;
        let table = Table::from_file_record(&record)?;
        tracing::debug!(%file_id, rows = table.len(), "loaded batch table");
        component.table = Some(table);
    }

    component
        .table
        .as_ref()
        .ok_or_else(|| RunError::validation("No table is attached."))
}
