// chainlab/src/casing.rs
//!
//! Key casing between client records and the backend wire format
//!
//! Chain parameters and application records use camelCase keys; the backend
//! expects snake_case. Only object keys are rewritten, values never are.

use serde_json::{Map, Value};

/// `maxTokens` -> `max_tokens`
pub fn decamelize(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, ch) in key.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// `max_tokens` -> `maxTokens`
pub fn camelize(key: &str) -> String {
    if !key.is_empty() && key.parse::<f64>().is_ok() {
        return key.to_string();
    }

    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for ch in key.chars() {
        if matches!(ch, '_' | '-' | ' ') {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }

    let mut chars = out.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => out,
    }
}

pub fn decamelize_keys(value: Value) -> Value {
    transform_keys(value, &decamelize)
}

pub fn camelize_keys(value: Value) -> Value {
    transform_keys(value, &camelize)
}

fn transform_keys(value: Value, rename: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => {
            let renamed: Map<String, Value> = map
                .into_iter()
                .map(|(key, inner)| (rename(&key), transform_keys(inner, rename)))
                .collect();
            Value::Object(renamed)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| transform_keys(item, rename))
                .collect(),
        ),
        other => other,
    }
}
