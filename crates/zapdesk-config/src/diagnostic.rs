// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns figment extraction errors into miette diagnostics.
//!
//! Unknown keys are checked against [`KNOWN_KEYS`] so the help lists what
//! the section really accepts, with a Jaro-Winkler "did you mean". When the
//! error came from a TOML file we still have, the diagnostic points at the
//! offending key or value inside its `[section]`.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use figment::error::Kind;
use miette::{Diagnostic, GraphicalReportHandler, NamedSource, SourceSpan};
use thiserror::Error;

use crate::model::{KNOWN_KEYS, section_keys};

/// Name under which an in-memory TOML document is passed as a source.
pub const INLINE_SOURCE: &str = "<inline>";

/// Below this Jaro-Winkler score a key is not offered as a correction.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// Accepted values of settings whose type alone does not say it.
const VALUE_HINTS: &[(&str, &str)] = &[
    ("queue.backoff", "`fixed` or `exponential`"),
    ("service.log_level", "one of trace, debug, info, warn, error"),
];

/// A configuration problem, rendered by miette.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown key `{key}` in {scope}")]
    #[diagnostic(code(zapdesk::config::unknown_key), help("{help}"))]
    UnknownKey {
        key: String,
        /// `[section]` or "the top level".
        scope: String,
        suggestion: Option<String>,
        /// Comma-separated keys the scope accepts.
        valid_keys: String,
        help: String,
        #[label("not a zapdesk setting")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A key is known but its value has the wrong type or is out of range.
    #[error("invalid value for `{key}`: {detail}")]
    #[diagnostic(code(zapdesk::config::invalid_value), help("{hint}"))]
    InvalidValue {
        /// Dotted path, e.g. `queue.backoff`.
        key: String,
        detail: String,
        hint: String,
        #[label("this value")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A parsed value failed a semantic check.
    #[error("validation error: {message}")]
    #[diagnostic(code(zapdesk::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(zapdesk::config::other))]
    Other(String),
}

/// Which part of a `key = value` line a span covers.
#[derive(Clone, Copy)]
enum Part {
    Key,
    Value,
}

/// Converts every error figment collected during extraction.
///
/// `sources` pairs a file path (or [`INLINE_SOURCE`]) with its content and
/// is only used to attach spans.
pub fn figment_to_config_errors(
    err: figment::Error,
    sources: &[(String, String)],
) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| convert(&error, sources))
        .collect()
}

fn convert(error: &figment::Error, sources: &[(String, String)]) -> ConfigError {
    let source = source_of(error, sources);
    match &error.kind {
        Kind::UnknownField(field, _) => {
            let section = error.path.first().map(String::as_str);
            let (scope, valid): (String, Vec<&str>) = match section {
                None => (
                    "the top level".to_string(),
                    KNOWN_KEYS.iter().map(|(name, _)| *name).collect(),
                ),
                Some(section) => (
                    format!("[{section}]"),
                    section_keys(section).map(<[_]>::to_vec).unwrap_or_default(),
                ),
            };
            let suggestion = suggest_key(field, &valid);
            let valid_keys = valid.join(", ");
            let help = match &suggestion {
                Some(s) => format!("did you mean `{s}`? {scope} accepts: {valid_keys}"),
                None => format!("{scope} accepts: {valid_keys}"),
            };
            let (span, src) = attach(source, section, field, Part::Key);
            ConfigError::UnknownKey {
                key: field.clone(),
                scope,
                suggestion,
                valid_keys,
                help,
                span,
                src,
            }
        }
        Kind::UnknownVariant(value, allowed) => {
            let key = error.path.join(".");
            let accepted = allowed
                .iter()
                .map(|v| format!("`{v}`"))
                .collect::<Vec<_>>()
                .join(" or ");
            let hint = match suggest_key(value, allowed) {
                Some(s) => format!("did you mean `{s}`? {key} accepts {accepted}"),
                None => format!("{key} accepts {accepted}"),
            };
            let (span, src) = attach_value(source, &error.path);
            ConfigError::InvalidValue {
                key,
                detail: format!("`{value}` is not a recognized value"),
                hint,
                span,
                src,
            }
        }
        Kind::InvalidType(actual, expected) | Kind::InvalidValue(actual, expected) => {
            let key = error.path.join(".");
            let hint = match value_hint(&key) {
                Some(accepted) => format!("expected {expected}: {accepted}"),
                None => format!("expected {expected}"),
            };
            let (span, src) = attach_value(source, &error.path);
            ConfigError::InvalidValue {
                key,
                detail: format!("found {actual}"),
                hint,
                span,
                src,
            }
        }
        _ => ConfigError::Other(error.to_string()),
    }
}

fn value_hint(key: &str) -> Option<&'static str> {
    VALUE_HINTS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, hint)| *hint)
}

/// The source document an error came from, if it was kept.
fn source_of<'a>(
    error: &figment::Error,
    sources: &'a [(String, String)],
) -> Option<&'a (String, String)> {
    match error.metadata.as_ref().and_then(|m| m.source.as_ref()) {
        Some(figment::Source::File(path)) => {
            let path = path.display().to_string();
            sources.iter().find(|(name, _)| *name == path)
        }
        _ => sources.iter().find(|(name, _)| name == INLINE_SOURCE),
    }
}

fn attach_value(
    source: Option<&(String, String)>,
    path: &[String],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    match path {
        [section, key] => attach(source, Some(section.as_str()), key, Part::Value),
        [key] => attach(source, None, key, Part::Value),
        _ => (None, None),
    }
}

fn attach(
    source: Option<&(String, String)>,
    section: Option<&str>,
    key: &str,
    part: Part,
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let Some((name, content)) = source else {
        return (None, None);
    };
    match locate(content, section, key, part) {
        Some(span) => (Some(span), Some(NamedSource::new(name, content.clone()))),
        None => (None, None),
    }
}

/// Span of `key` or its value on the line that sets it inside `[section]`.
///
/// `section` is `None` for keys above the first table header.
fn locate(content: &str, section: Option<&str>, key: &str, part: Part) -> Option<SourceSpan> {
    let mut current: Option<&str> = None;
    let mut line_start = 0;
    for line in content.split_inclusive('\n') {
        let start = line_start;
        line_start += line.len();

        let trimmed = line.trim();
        if let Some(header) = trimmed.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
            current = Some(header.trim());
            continue;
        }
        if current != section {
            continue;
        }
        let Some((name, rest)) = line.split_once('=') else {
            continue;
        };
        if name.trim() != key {
            continue;
        }
        return Some(match part {
            Part::Key => {
                let lead = name.len() - name.trim_start().len();
                (start + lead, key.len()).into()
            }
            Part::Value => {
                let value = rest.split('#').next().unwrap_or(rest);
                let lead = value.len() - value.trim_start().len();
                (start + name.len() + 1 + lead, value.trim().len()).into()
            }
        });
    }
    None
}

/// The closest of `candidates` to `unknown`, if any is close enough.
pub fn suggest_key(unknown: &str, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .map(|c| (strsim::jaro_winkler(unknown, c), *c))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, c)| c.to_string())
}

/// Prints each error as a miette report on stderr, then a one-line total.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut out = String::new();
        match handler.render_report(&mut out, error) {
            Ok(()) => eprint!("{out}"),
            Err(_) => eprintln!("error: {error}"),
        }
    }
    eprintln!(
        "zapdesk: {} configuration error(s), nothing started",
        errors.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_config_from_str;

    fn errors_for(toml: &str) -> Vec<ConfigError> {
        let err = load_config_from_str(toml).expect_err("config should be rejected");
        figment_to_config_errors(err, &[(INLINE_SOURCE.to_string(), toml.to_string())])
    }

    fn spanned<'a>(toml: &'a str, span: &Option<SourceSpan>) -> &'a str {
        let span = span.expect("span should be attached");
        &toml[span.offset()..span.offset() + span.len()]
    }

    #[test]
    fn unknown_queue_key_lists_queue_keys() {
        let toml = "[service]\nname = \"a\"\n\n[queue]\nwokers = 2\n";
        let errors = errors_for(toml);
        let ConfigError::UnknownKey {
            key,
            scope,
            suggestion,
            valid_keys,
            span,
            ..
        } = &errors[0]
        else {
            panic!("expected UnknownKey, got {errors:?}");
        };
        assert_eq!(key, "wokers");
        assert_eq!(scope, "[queue]");
        assert_eq!(suggestion.as_deref(), Some("workers"));
        assert!(valid_keys.contains("backoff_max_ms"));
        assert!(!valid_keys.contains("page_size"));
        assert_eq!(spanned(toml, span), "wokers");
    }

    #[test]
    fn unknown_section_lists_sections() {
        let errors = errors_for("[queu]\nworkers = 2\n");
        let ConfigError::UnknownKey {
            scope,
            suggestion,
            valid_keys,
            ..
        } = &errors[0]
        else {
            panic!("expected UnknownKey, got {errors:?}");
        };
        assert_eq!(scope, "the top level");
        assert_eq!(suggestion.as_deref(), Some("queue"));
        assert!(valid_keys.contains("history"));
    }

    #[test]
    fn unknown_backoff_names_both_kinds() {
        let toml = "[queue]\nbackoff = \"linear\" # retry growth\n";
        let errors = errors_for(toml);
        let ConfigError::InvalidValue {
            key, hint, span, ..
        } = &errors[0]
        else {
            panic!("expected InvalidValue, got {errors:?}");
        };
        assert_eq!(key, "queue.backoff");
        assert!(hint.contains("`fixed`") && hint.contains("`exponential`"), "{hint}");
        assert_eq!(spanned(toml, span), "\"linear\"");
    }

    #[test]
    fn misspelled_backoff_gets_a_suggestion() {
        let errors = errors_for("[queue]\nbackoff = \"exponental\"\n");
        let ConfigError::InvalidValue { hint, .. } = &errors[0] else {
            panic!("expected InvalidValue, got {errors:?}");
        };
        assert!(hint.starts_with("did you mean `exponential`?"), "{hint}");
    }

    #[test]
    fn wrong_type_points_at_value() {
        let toml = "[bus]\ncapacity = 1\n\n[queue]\nworkers = \"four\"\n";
        let errors = errors_for(toml);
        let ConfigError::InvalidValue {
            key, detail, span, ..
        } = &errors[0]
        else {
            panic!("expected InvalidValue, got {errors:?}");
        };
        assert_eq!(key, "queue.workers");
        assert!(detail.contains("four"), "{detail}");
        assert_eq!(spanned(toml, span), "\"four\"");
    }

    #[test]
    fn locate_stays_inside_its_section() {
        let toml = "[channels]\nsend_timeout_ms = 1\n[tickets]\nsend_timeout_ms = 2\n";
        let span = locate(toml, Some("tickets"), "send_timeout_ms", Part::Value).unwrap();
        assert_eq!(span.offset(), toml.rfind('2').unwrap());
        assert!(locate(toml, Some("queue"), "send_timeout_ms", Part::Key).is_none());
    }

    #[test]
    fn distant_key_gets_no_suggestion() {
        assert_eq!(suggest_key("zzzzzz", &["capacity"]), None);
    }

    #[test]
    fn errors_without_a_kept_source_have_no_span() {
        let err = load_config_from_str("[bus]\nbogus = 1\n").unwrap_err();
        let errors = figment_to_config_errors(err, &[]);
        assert!(matches!(
            &errors[0],
            ConfigError::UnknownKey { span: None, src: None, .. }
        ));
    }
}
