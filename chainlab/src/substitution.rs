// chainlab/src/substitution.rs
//!
//! Placeholder substitution
//!
//! Before a component runs, every earlier component can be referenced from
//! its input as a `{Name}` token:
//! - a batch-input contributes one token per column of its selected row,
//! - any other component contributes `{Title}` (or `{Action-N Output}` when
//!   it has no title) once it has a non-empty output.
//!
//! Replacement is literal, global and case-sensitive. Tokens without a
//! matching earlier component are left untouched.

use crate::component::{Component, ComponentOutput};

/// Token for a titled component, `Action-N Output` otherwise (N is 1-based).
pub fn placeholder_label(component: &Component, index: usize) -> String {
    if component.title.is_empty() {
        format!("Action-{} Output", index + 1)
    } else {
        component.title.clone()
    }
}

/// Replaces tokens in `raw` using the outputs of `preceding`, in chain order.
pub fn substitute(raw: &str, preceding: &[Component]) -> String {
    let mut processed = raw.to_string();

    for (index, component) in preceding.iter().enumerate() {
        match component.current_output() {
            Some(ComponentOutput::Batch(fields)) => {
                for field in fields {
                    processed = replace_token(&processed, &field.field, &field.value);
                }
            }
            Some(ComponentOutput::Text(text)) => {
                let label = placeholder_label(component, index);
                processed = replace_token(&processed, &label, text);
            }
            None => {}
        }
    }

    processed
}

/// Labels that may be inserted into the component at `index`.
pub fn placeholder_options(components: &[Component], index: usize) -> Vec<String> {
    let end = index.min(components.len());
    components[..end]
        .iter()
        .enumerate()
        .flat_map(|(i, component)| match component.output.as_ref() {
            Some(ComponentOutput::Batch(fields)) => {
                fields.iter().map(|f| f.field.clone()).collect::<Vec<_>>()
            }
            _ => vec![placeholder_label(component, i)],
        })
        .collect()
}

/// Rewrites `{old}` tokens to `{new}`; used when a component is renamed.
pub fn rename_token(text: &str, old: &str, new: &str) -> String {
    text.replace(&format!("{{{old}}}"), &format!("{{{new}}}"))
}

fn replace_token(text: &str, name: &str, value: &str) -> String {
    text.replace(&format!("{{{name}}}"), value)
}
