//! Edit steps: the typed operations a pipeline folds over its buffer.
//!
//! A [`Step`] is pure data. [`Step::compile`] turns it into a
//! [`CompiledStep`], surfacing malformed patterns before any file is touched.
//! Applying a compiled step locates spans in the current buffer and hands
//! them to [`apply_edits`](crate::edit::apply_edits).

use crate::edit::{apply_edits, Edit, EditError};
use regex::{Regex, RegexBuilder};
use regex_syntax::hir::{Class, Hir, HirKind, Literal};
use regex_syntax::ParserBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One ordered, independent transformation of the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub id: String,
    pub edit: EditStep,
    /// Skip the step when the buffer already contains this text.
    pub unless_present: Option<String>,
}

/// The four supported operation kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditStep {
    /// Replace the first occurrence of `find`; other occurrences are untouched.
    LiteralSwap { find: String, replace: String },
    /// Remove every match of `pattern`.
    PatternDelete { pattern: String, flags: PatternFlags },
    /// Rewrite every match of `pattern`.
    PatternSubstitute {
        pattern: String,
        replacement: Replacement,
        flags: PatternFlags,
    },
    /// Put `text` next to every occurrence of `anchor`, keeping the anchor.
    AnchoredInsert {
        anchor: String,
        text: String,
        position: InsertPosition,
        separator: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replacement {
    /// `$1`, `$name`, `${name}` expand to capture groups; `$$` is a literal `$`.
    Template(String),
    /// Inserted verbatim.
    Fixed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatternFlags {
    /// `.` also matches `\n`
    pub dot_all: bool,
    /// `^`/`$` match at line boundaries
    pub multi_line: bool,
    pub case_insensitive: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsertPosition {
    #[default]
    After,
    Before,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    LiteralSwap,
    PatternDelete,
    PatternSubstitute,
    AnchoredInsert,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepKind::LiteralSwap => "literal-swap",
            StepKind::PatternDelete => "pattern-delete",
            StepKind::PatternSubstitute => "pattern-substitute",
            StepKind::AnchoredInsert => "anchored-insert",
        };
        f.write_str(name)
    }
}

/// What a single step did to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
#[must_use = "StepOutcome reports whether the buffer changed"]
pub enum StepOutcome {
    Applied { replacements: usize },
    /// Nothing matched; buffer unchanged. Not an error.
    NoMatch,
    /// `unless_present` text already in the buffer; buffer unchanged.
    Guarded,
}

/// Malformed pattern or replacement, detected at construction.
#[derive(Error, Debug)]
pub enum PatternError {
    #[error("step '{step_id}': invalid pattern: {source}")]
    Syntax {
        step_id: String,
        #[source]
        source: regex::Error,
    },

    #[error(
        "step '{step_id}': delete pattern has a greedy unbounded repetition that can cross \
         lines; use a lazy form like '.*?' bounded by a closing anchor"
    )]
    UnboundedSpan { step_id: String },

    #[error("step '{step_id}': template references unknown capture group '{group}'")]
    UnknownGroup { step_id: String, group: String },
}

impl EditStep {
    pub fn kind(&self) -> StepKind {
        match self {
            EditStep::LiteralSwap { .. } => StepKind::LiteralSwap,
            EditStep::PatternDelete { .. } => StepKind::PatternDelete,
            EditStep::PatternSubstitute { .. } => StepKind::PatternSubstitute,
            EditStep::AnchoredInsert { .. } => StepKind::AnchoredInsert,
        }
    }
}

impl Step {
    pub fn new(id: impl Into<String>, edit: EditStep) -> Self {
        Self {
            id: id.into(),
            edit,
            unless_present: None,
        }
    }

    /// Attach an idempotence guard.
    pub fn unless_present(mut self, text: impl Into<String>) -> Self {
        self.unless_present = Some(text.into());
        self
    }

    pub fn kind(&self) -> StepKind {
        self.edit.kind()
    }

    /// Compile patterns and check the replacement against them.
    pub fn compile(&self) -> Result<CompiledStep, PatternError> {
        let matcher = match &self.edit {
            EditStep::LiteralSwap { find, replace } => Matcher::Literal {
                find: find.clone(),
                replace: replace.clone(),
            },
            EditStep::PatternDelete { pattern, flags } => {
                let regex = self.build_regex(pattern, *flags)?;
                if spans_lines_unbounded(pattern, *flags) {
                    return Err(PatternError::UnboundedSpan {
                        step_id: self.id.clone(),
                    });
                }
                Matcher::Delete { regex }
            }
            EditStep::PatternSubstitute {
                pattern,
                replacement,
                flags,
            } => {
                let regex = self.build_regex(pattern, *flags)?;
                if let Replacement::Template(template) = replacement {
                    if let Some(group) = unknown_group(&regex, template) {
                        return Err(PatternError::UnknownGroup {
                            step_id: self.id.clone(),
                            group,
                        });
                    }
                }
                Matcher::Substitute {
                    regex,
                    replacement: replacement.clone(),
                }
            }
            EditStep::AnchoredInsert {
                anchor,
                text,
                position,
                separator,
            } => {
                let replacement = match position {
                    InsertPosition::After => format!("{anchor}{separator}{text}"),
                    InsertPosition::Before => format!("{text}{separator}{anchor}"),
                };
                Matcher::Anchored {
                    anchor: anchor.clone(),
                    replacement,
                }
            }
        };

        Ok(CompiledStep {
            id: self.id.clone(),
            kind: self.kind(),
            matcher,
            unless_present: self.unless_present.clone(),
        })
    }

    fn build_regex(&self, pattern: &str, flags: PatternFlags) -> Result<Regex, PatternError> {
        RegexBuilder::new(pattern)
            .dot_matches_new_line(flags.dot_all)
            .multi_line(flags.multi_line)
            .case_insensitive(flags.case_insensitive)
            .build()
            .map_err(|source| PatternError::Syntax {
                step_id: self.id.clone(),
                source,
            })
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Literal { find: String, replace: String },
    Delete { regex: Regex },
    Substitute { regex: Regex, replacement: Replacement },
    Anchored { anchor: String, replacement: String },
}

/// A step whose patterns have been compiled and checked.
#[derive(Debug, Clone)]
pub struct CompiledStep {
    id: String,
    kind: StepKind,
    matcher: Matcher,
    unless_present: Option<String>,
}

impl CompiledStep {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    /// Compute the spans this step would rewrite in `buffer`.
    pub fn locate(&self, buffer: &str) -> Vec<Edit> {
        match &self.matcher {
            Matcher::Literal { find, replace } => first_occurrence(buffer, find, replace),
            Matcher::Anchored {
                anchor,
                replacement,
            } => every_occurrence(buffer, anchor, replacement),
            // Empty matches delete nothing
            Matcher::Delete { regex } => regex
                .find_iter(buffer)
                .filter(|m| !m.is_empty())
                .map(|m| Edit::new(m.start(), m.end(), "", m.as_str()))
                .collect(),
            Matcher::Substitute { regex, replacement } => regex
                .captures_iter(buffer)
                .filter_map(|caps| {
                    let whole = caps.get(0)?;
                    let new_text = match replacement {
                        Replacement::Template(template) => {
                            let mut dst = String::new();
                            caps.expand(template, &mut dst);
                            dst
                        }
                        Replacement::Fixed(text) => text.clone(),
                    };
                    Some(Edit::new(whole.start(), whole.end(), new_text, whole.as_str()))
                })
                .collect(),
        }
    }

    /// Apply the step, consuming the buffer and producing its successor.
    pub fn apply(&self, buffer: String) -> Result<(String, StepOutcome), EditError> {
        if let Some(guard) = &self.unless_present {
            if buffer.contains(guard.as_str()) {
                return Ok((buffer, StepOutcome::Guarded));
            }
        }

        let edits = self.locate(&buffer);
        if edits.is_empty() {
            return Ok((buffer, StepOutcome::NoMatch));
        }

        let rewritten = apply_edits(&buffer, &edits)?;
        Ok((
            rewritten,
            StepOutcome::Applied {
                replacements: edits.len(),
            },
        ))
    }
}

fn first_occurrence(buffer: &str, needle: &str, replacement: &str) -> Vec<Edit> {
    if needle.is_empty() {
        return Vec::new();
    }
    buffer
        .find(needle)
        .map(|start| vec![Edit::new(start, start + needle.len(), replacement, needle)])
        .unwrap_or_default()
}

fn every_occurrence(buffer: &str, needle: &str, replacement: &str) -> Vec<Edit> {
    if needle.is_empty() {
        return Vec::new();
    }
    buffer
        .match_indices(needle)
        .map(|(start, found)| Edit::new(start, start + found.len(), replacement, found))
        .collect()
}

/// True if `pattern` contains a greedy repetition with no upper bound over
/// something that can match `\n`, however the newline got in (`(?s)`,
/// `[\s\S]`, `\n`, the `dot_all` flag).
fn spans_lines_unbounded(pattern: &str, flags: PatternFlags) -> bool {
    let parsed = ParserBuilder::new()
        .dot_matches_new_line(flags.dot_all)
        .multi_line(flags.multi_line)
        .case_insensitive(flags.case_insensitive)
        .build()
        .parse(pattern);
    // The regex crate already accepted this syntax
    match parsed {
        Ok(hir) => has_unbounded_newline_repetition(&hir),
        Err(_) => false,
    }
}

fn has_unbounded_newline_repetition(hir: &Hir) -> bool {
    match hir.kind() {
        HirKind::Repetition(rep) => {
            (rep.greedy && rep.max.is_none() && can_match_newline(&rep.sub))
                || has_unbounded_newline_repetition(&rep.sub)
        }
        HirKind::Capture(capture) => has_unbounded_newline_repetition(&capture.sub),
        HirKind::Concat(subs) | HirKind::Alternation(subs) => {
            subs.iter().any(has_unbounded_newline_repetition)
        }
        HirKind::Empty | HirKind::Literal(_) | HirKind::Class(_) | HirKind::Look(_) => false,
    }
}

fn can_match_newline(hir: &Hir) -> bool {
    match hir.kind() {
        HirKind::Literal(Literal(bytes)) => bytes.contains(&b'\n'),
        HirKind::Class(Class::Unicode(class)) => class
            .ranges()
            .iter()
            .any(|r| r.start() <= '\n' && '\n' <= r.end()),
        HirKind::Class(Class::Bytes(class)) => class
            .ranges()
            .iter()
            .any(|r| r.start() <= b'\n' && b'\n' <= r.end()),
        HirKind::Repetition(rep) => can_match_newline(&rep.sub),
        HirKind::Capture(capture) => can_match_newline(&capture.sub),
        HirKind::Concat(subs) | HirKind::Alternation(subs) => subs.iter().any(can_match_newline),
        HirKind::Empty | HirKind::Look(_) => false,
    }
}

/// First capture group referenced by `template` that `regex` does not define.
fn unknown_group(regex: &Regex, template: &str) -> Option<String> {
    let bytes = template.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        match bytes.get(i) {
            Some(b'$') => {
                i += 1;
                continue;
            }
            Some(b'{') => {
                let Some(close) = template[i + 1..].find('}') else {
                    continue;
                };
                let name = &template[i + 1..i + 1 + close];
                i += close + 2;
                if !group_exists(regex, name) {
                    return Some(name.to_string());
                }
            }
            _ => {
                let len = template[i..]
                    .bytes()
                    .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
                    .count();
                if len == 0 {
                    continue;
                }
                let name = &template[i..i + len];
                i += len;
                if !group_exists(regex, name) {
                    return Some(name.to_string());
                }
            }
        }
    }
    None
}

fn group_exists(regex: &Regex, name: &str) -> bool {
    match name.parse::<usize>() {
        Ok(index) => index < regex.captures_len(),
        Err(_) => regex.capture_names().flatten().any(|n| n == name),
    }
}
