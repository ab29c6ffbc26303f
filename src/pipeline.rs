//! Transform pipeline - folds ordered edit steps over one text buffer
//!
//! This module provides the run-level contract:
//! - Compiles every step before any I/O, so malformed patterns abort early
//! - Reads the target in full, applies steps in order, writes back atomically
//! - Treats steps that find nothing as no-ops, never as failures
//! - Reports what each step did

use crate::config::{ConfigError, PipelineConfig};
use crate::edit::{atomic_write, EditError};
use crate::safety::{SafetyError, WorkspaceGuard};
use crate::step::{CompiledStep, PatternError, Step, StepKind, StepOutcome};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

/// Fatal pipeline errors. Any of these means the target was not written.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("step '{step_id}' produced an invalid edit: {source}")]
    Edit {
        step_id: String,
        #[source]
        source: EditError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Safety(#[from] SafetyError),
}

/// Per-step record of a transformation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub id: String,
    pub kind: StepKind,
    pub outcome: StepOutcome,
}

/// Result of folding the pipeline over an in-memory buffer.
#[derive(Debug, Clone)]
pub struct Transformation {
    pub output: String,
    pub steps: Vec<StepReport>,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Transform and report without writing the target
    pub dry_run: bool,
    /// Restrict the target to a workspace
    pub guard: Option<WorkspaceGuard>,
}

/// Outcome of [`Pipeline::run`].
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub pipeline: String,
    pub path: PathBuf,
    pub steps: Vec<StepReport>,
    /// xxh3 of the contents as read
    pub before_hash: u64,
    /// xxh3 of the transformed contents
    pub after_hash: u64,
    pub written: bool,
    #[serde(skip)]
    pub original: String,
    #[serde(skip)]
    pub transformed: String,
}

impl RunReport {
    pub fn changed(&self) -> bool {
        self.before_hash != self.after_hash
    }

    pub fn applied_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Applied { .. }))
            .count()
    }
}

/// An ordered list of compiled edit steps.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    steps: Vec<CompiledStep>,
}

impl Pipeline {
    /// Compile `steps` in order. Fails on the first malformed pattern.
    pub fn new(name: impl Into<String>, steps: &[Step]) -> Result<Self, PatternError> {
        let steps = steps
            .iter()
            .map(Step::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: name.into(),
            steps,
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, PatternError> {
        Self::new(config.meta.name.clone(), &config.to_steps())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[CompiledStep] {
        &self.steps
    }

    /// Apply every step in order; step *i+1* only ever sees the output of step *i*.
    pub fn transform(&self, input: &str) -> Result<Transformation, PipelineError> {
        let (output, steps) = self.steps.iter().try_fold(
            (input.to_string(), Vec::with_capacity(self.steps.len())),
            |(buffer, mut reports), step| {
                let (buffer, outcome) =
                    step.apply(buffer).map_err(|source| PipelineError::Edit {
                        step_id: step.id().to_string(),
                        source,
                    })?;

                match outcome {
                    StepOutcome::Applied { replacements } => {
                        info!(step = step.id(), kind = %step.kind(), replacements, "step applied")
                    }
                    StepOutcome::NoMatch => {
                        debug!(step = step.id(), kind = %step.kind(), "no match; buffer unchanged")
                    }
                    StepOutcome::Guarded => {
                        debug!(step = step.id(), "guard text present; step skipped")
                    }
                }

                reports.push(StepReport {
                    id: step.id().to_string(),
                    kind: step.kind(),
                    outcome,
                });
                Ok::<_, PipelineError>((buffer, reports))
            },
        )?;

        Ok(Transformation { output, steps })
    }

    /// Read `path`, transform it and write the result back in full.
    ///
    /// Nothing is written unless every step succeeded. The write happens even
    /// when no step matched.
    pub fn run(
        &self,
        path: impl AsRef<Path>,
        options: &RunOptions,
    ) -> Result<RunReport, PipelineError> {
        let path = match &options.guard {
            // A target that cannot be resolved is an I/O failure, not a boundary one
            Some(guard) => guard.validate_path(path.as_ref()).map_err(|err| match err {
                SafetyError::Canonicalize { path, source } => PipelineError::Io { path, source },
                other => PipelineError::Safety(other),
            })?,
            None => path.as_ref().to_path_buf(),
        };

        info!(pipeline = %self.name, path = %path.display(), steps = self.steps.len(), "reading target");
        let original = fs::read_to_string(&path).map_err(|source| PipelineError::Io {
            path: path.clone(),
            source,
        })?;

        let Transformation { output, steps } = self.transform(&original)?;

        let written = if options.dry_run {
            debug!(path = %path.display(), "dry run; target left untouched");
            false
        } else {
            if let Some(guard) = &options.guard {
                guard.revalidate(&path)?;
            }
            atomic_write(&path, output.as_bytes()).map_err(|err| PipelineError::Io {
                path: path.clone(),
                source: match err {
                    EditError::Io(source) => source,
                    other => std::io::Error::other(other.to_string()),
                },
            })?;
            info!(path = %path.display(), bytes = output.len(), "target written");
            true
        };

        Ok(RunReport {
            pipeline: self.name.clone(),
            path,
            steps,
            before_hash: xxh3_64(original.as_bytes()),
            after_hash: xxh3_64(output.as_bytes()),
            written,
            original,
            transformed: output,
        })
    }
}
