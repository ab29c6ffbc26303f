use crate::step::{EditStep, InsertPosition, PatternFlags, Replacement, Step};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PipelineConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.steps.is_empty() {
            issues.push(ValidationIssue::EmptyStepList);
        }

        // Position of the first definition of each id
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for (index, step) in self.steps.iter().enumerate() {
            if step.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    step_id: None,
                    field: "id",
                });
            } else if positions.insert(step.id.as_str(), index).is_some() {
                issues.push(ValidationIssue::DuplicateId {
                    step_id: step.id.clone(),
                });
            }
        }

        for (index, step) in self.steps.iter().enumerate() {
            let step_id = || Some(step.id.clone());

            for dependency in &step.depends_on {
                match positions.get(dependency.as_str()) {
                    Some(&dep_index) if dep_index < index => {}
                    Some(_) => issues.push(ValidationIssue::OrderViolation {
                        step_id: step.id.clone(),
                        depends_on: dependency.clone(),
                    }),
                    None => issues.push(ValidationIssue::UnknownDependency {
                        step_id: step.id.clone(),
                        depends_on: dependency.clone(),
                    }),
                }
            }

            if let Some(guard) = &step.unless_present {
                if guard.is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        step_id: step_id(),
                        field: "unless_present",
                    });
                }
            }

            match &step.operation {
                Operation::LiteralSwap { find, .. } => {
                    if find.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            step_id: step_id(),
                            field: "operation.find",
                        });
                    }
                }
                Operation::PatternDelete { pattern, .. } => {
                    if pattern.trim().is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            step_id: step_id(),
                            field: "operation.pattern",
                        });
                    }
                }
                Operation::PatternSubstitute {
                    pattern,
                    template,
                    text,
                    ..
                } => {
                    if pattern.trim().is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            step_id: step_id(),
                            field: "operation.pattern",
                        });
                    }
                    match (template, text) {
                        (Some(_), Some(_)) => issues.push(ValidationIssue::InvalidCombo {
                            step_id: step_id(),
                            message: "pattern-substitute takes either template or text, not both"
                                .to_string(),
                        }),
                        (None, None) => issues.push(ValidationIssue::MissingField {
                            step_id: step_id(),
                            field: "operation.template",
                        }),
                        _ => {}
                    }
                }
                Operation::AnchoredInsert { anchor, text, .. } => {
                    if anchor.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            step_id: step_id(),
                            field: "operation.anchor",
                        });
                    }
                    if text.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            step_id: step_id(),
                            field: "operation.text",
                        });
                    }
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Typed steps in declaration order.
    pub fn to_steps(&self) -> Vec<Step> {
        self.steps.iter().map(StepDefinition::to_step).collect()
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Default target file, relative to the workspace
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StepDefinition {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    pub operation: Operation,
    /// Ids of steps that must run before this one
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub unless_present: Option<String>,
}

impl StepDefinition {
    pub fn to_step(&self) -> Step {
        Step {
            id: self.id.clone(),
            edit: self.operation.to_edit(),
            unless_present: self.unless_present.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Operation {
    LiteralSwap {
        find: String,
        #[serde(default)]
        replace: String,
    },
    PatternDelete {
        pattern: String,
        #[serde(default)]
        dot_all: bool,
        #[serde(default)]
        multi_line: bool,
        #[serde(default)]
        case_insensitive: bool,
    },
    PatternSubstitute {
        pattern: String,
        /// Capture-expanding replacement
        #[serde(default)]
        template: Option<String>,
        /// Verbatim replacement block
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        dot_all: bool,
        #[serde(default)]
        multi_line: bool,
        #[serde(default)]
        case_insensitive: bool,
    },
    AnchoredInsert {
        anchor: String,
        text: String,
        #[serde(default)]
        position: InsertPosition,
        #[serde(default = "default_separator")]
        separator: String,
    },
}

fn default_separator() -> String {
    "\n".to_string()
}

impl Operation {
    pub fn to_edit(&self) -> EditStep {
        match self {
            Operation::LiteralSwap { find, replace } => EditStep::LiteralSwap {
                find: find.clone(),
                replace: replace.clone(),
            },
            Operation::PatternDelete {
                pattern,
                dot_all,
                multi_line,
                case_insensitive,
            } => EditStep::PatternDelete {
                pattern: pattern.clone(),
                flags: PatternFlags {
                    dot_all: *dot_all,
                    multi_line: *multi_line,
                    case_insensitive: *case_insensitive,
                },
            },
            Operation::PatternSubstitute {
                pattern,
                template,
                text,
                dot_all,
                multi_line,
                case_insensitive,
            } => EditStep::PatternSubstitute {
                pattern: pattern.clone(),
                // validate() guarantees exactly one is set
                replacement: match (template, text) {
                    (Some(template), _) => Replacement::Template(template.clone()),
                    (None, text) => Replacement::Fixed(text.clone().unwrap_or_default()),
                },
                flags: PatternFlags {
                    dot_all: *dot_all,
                    multi_line: *multi_line,
                    case_insensitive: *case_insensitive,
                },
            },
            Operation::AnchoredInsert {
                anchor,
                text,
                position,
                separator,
            } => EditStep::AnchoredInsert {
                anchor: anchor.clone(),
                text: text.clone(),
                position: *position,
                separator: separator.clone(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyStepList,
    MissingField {
        step_id: Option<String>,
        field: &'static str,
    },
    DuplicateId {
        step_id: String,
    },
    UnknownDependency {
        step_id: String,
        depends_on: String,
    },
    /// A dependency is declared but does not run earlier
    OrderViolation {
        step_id: String,
        depends_on: String,
    },
    InvalidCombo {
        step_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyStepList => write!(f, "step config contains no steps"),
            ValidationIssue::MissingField { step_id, field } => match step_id {
                Some(id) => write!(f, "step '{id}' missing required field '{field}'"),
                None => write!(f, "step missing required field '{field}'"),
            },
            ValidationIssue::DuplicateId { step_id } => {
                write!(f, "step id '{step_id}' is defined more than once")
            }
            ValidationIssue::UnknownDependency {
                step_id,
                depends_on,
            } => write!(f, "step '{step_id}' depends on unknown step '{depends_on}'"),
            ValidationIssue::OrderViolation {
                step_id,
                depends_on,
            } => write!(
                f,
                "step '{step_id}' depends on '{depends_on}', which must run before it"
            ),
            ValidationIssue::InvalidCombo { step_id, message } => match step_id {
                Some(id) => write!(f, "step '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid step configuration: {message}"),
            },
        }
    }
}
