//! Job domain types

use serde_json::{Map, Value};
use std::collections::HashMap;

/// One unit of grading work pulled from the queue.
///
/// Created on a successful poll, handed to the grading tool exactly once,
/// never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: i64,
    pub name: String,
    /// Opaque payload provided by the queue; augmented locally before execution.
    pub payload: Map<String, Value>,
}

/// Local grading environment merged into every job payload before execution.
#[derive(Debug, Clone, Default)]
pub struct GradingEnv {
    /// Value written into the payload's `rootPath` field.
    pub root_path: String,
    /// Named variables substituted into caller-supplied `restrictToPaths` templates.
    pub path_vars: HashMap<String, String>,
    /// Server-side restricted paths, appended after the caller's.
    pub restrict_paths: Vec<String>,
}

impl Job {
    /// Builds the payload actually sent to the grading tool.
    ///
    /// Sets `rootPath`, substitutes the configured variables into any
    /// caller-supplied `restrictToPaths` templates (order preserved), then
    /// appends the server-configured restricted paths after them. When the
    /// caller supplied no restriction but the server configures one, the
    /// server paths are used alone.
    pub fn prepare_payload(&self, env: &GradingEnv) -> Value {
        let mut payload = self.payload.clone();
        payload.insert(
            "rootPath".to_string(),
            Value::String(env.root_path.clone()),
        );

        let caller: Option<Vec<String>> = match payload.get("restrictToPaths") {
            Some(Value::Array(templates)) => Some(
                templates
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|t| substitute_vars(t, &env.path_vars))
                    .collect(),
            ),
            _ => None,
        };

        if caller.is_some() || !env.restrict_paths.is_empty() {
            let mut restrict = caller.unwrap_or_default();
            restrict.extend(env.restrict_paths.iter().cloned());
            payload.insert(
                "restrictToPaths".to_string(),
                Value::Array(restrict.into_iter().map(Value::String).collect()),
            );
        }

        Value::Object(payload)
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_ident(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

/// Substitutes `$name` and `${name}` references in a path template.
///
/// `$$` escapes to a literal `$`; references to unknown variables are left in
/// place untouched, so a template never fails to render.
pub fn substitute_vars(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + 1..];

        if let Some(after) = tail.strip_prefix('$') {
            out.push('$');
            rest = after;
        } else if let Some(inner) = tail.strip_prefix('{') {
            match inner.find('}') {
                Some(end) => {
                    match vars.get(&inner[..end]) {
                        Some(value) => out.push_str(value),
                        // keep the whole `${name}` token
                        None => out.push_str(&rest[pos..pos + end + 3]),
                    }
                    rest = &inner[end + 1..];
                }
                None => {
                    out.push('$');
                    rest = tail;
                }
            }
        } else {
            let len = tail
                .char_indices()
                .take_while(|&(i, c)| if i == 0 { is_ident_start(c) } else { is_ident(c) })
                .map(|(i, c)| i + c.len_utf8())
                .last();
            match len {
                Some(len) => {
                    let name = &tail[..len];
                    match vars.get(name) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('$');
                            out.push_str(name);
                        }
                    }
                    rest = &tail[len..];
                }
                None => {
                    out.push('$');
                    rest = tail;
                }
            }
        }
    }

    out.push_str(rest);
    out
}
