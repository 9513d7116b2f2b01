//! Rule check definitions.
//!
//! A [`CommandCheck`] is configuration only. Its output streams are resolved
//! later, at setup time, into a routed check held by the engine.

use serde::{Deserialize, Serialize};

/// A configured rule check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandCheck {
    /// Counter key; also the check's identity in reports.
    pub counter: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub header: Option<String>,
    /// Command template handed to the check runner.
    #[serde(default)]
    pub command: Option<String>,
    /// A failing raw condition counts as a pass, and vice versa.
    #[serde(default)]
    pub invert_check: bool,
    #[serde(default)]
    pub process_on_success: bool,
    #[serde(default = "default_true")]
    pub process_on_error: bool,
    /// Line written to the success sink when the check passes.
    #[serde(default)]
    pub on_success: Option<String>,
    /// Line written to the error sink when the check fails.
    #[serde(default)]
    pub on_error: Option<String>,
    #[serde(default)]
    pub success_filename: Option<String>,
    #[serde(default)]
    pub error_filename: Option<String>,
    #[serde(default)]
    pub success_description: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

fn default_true() -> bool {
    true
}

impl CommandCheck {
    pub fn new(counter: impl Into<String>) -> Self {
        Self {
            counter: counter.into(),
            title: None,
            note: None,
            header: None,
            command: None,
            invert_check: false,
            process_on_success: false,
            process_on_error: true,
            on_success: None,
            on_error: None,
            success_filename: None,
            error_filename: None,
            success_description: None,
            error_description: None,
        }
    }

    /// The title, note and header that are set, in that order.
    pub fn display_lines(&self) -> impl Iterator<Item = &str> {
        [&self.title, &self.note, &self.header]
            .into_iter()
            .filter_map(|line| line.as_deref())
    }

    /// Apply the invert flag to a raw runner result.
    pub fn effective_pass(&self, raw_passed: bool) -> bool {
        raw_passed != self.invert_check
    }
}

/// Display-only fallback used when no rule checks are configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkipCommandCheck {
    pub counter: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Result of one check against one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    Pass,
    Fail,
    Error,
    Skipped,
}

/// What a check runner reports for one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CheckReport {
    /// Raw condition, before inversion.
    pub passed: bool,
    /// Runner output, available to message templates as `{detail}`.
    pub detail: String,
}

impl CheckReport {
    pub fn passed(detail: impl Into<String>) -> Self {
        Self {
            passed: true,
            detail: detail.into(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            detail: detail.into(),
        }
    }
}

/// Expand `{entity}`, `{detail}` and positional `{0}`, `{1}`, ... in `template`.
///
/// Unknown placeholders are left as written.
pub fn expand_template(template: &str, entity: &str, fields: &[String], detail: &str) -> String {
    expand_template_with(template, entity, fields, detail, str::to_string)
}

/// [`expand_template`] with every substituted value passed through `escape`.
///
/// Substitution is a single left-to-right pass: substituted text is never
/// scanned for placeholders again.
pub fn expand_template_with<F>(
    template: &str,
    entity: &str,
    fields: &[String],
    detail: &str,
    escape: F,
) -> String
where
    F: Fn(&str) -> String,
{
    let lookup = |key: &str| match key {
        "entity" => Some(entity),
        "detail" => Some(detail),
        _ if key.bytes().all(|b| b.is_ascii_digit()) => key
            .parse::<usize>()
            .ok()
            .and_then(|i| fields.get(i))
            .map(String::as_str),
        _ => None,
    };

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let substituted = tail
            .find('}')
            .and_then(|close| lookup(&tail[1..close]).map(|value| (value, close)));
        match substituted {
            Some((value, close)) => {
                out.push_str(&escape(value));
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
