//! Text Patcher: ordered, pattern-driven rewriting of a single text file
//!
//! A run reads one file into a buffer, folds an ordered list of edit steps
//! over it and writes the result back. Steps are data: literal swaps,
//! regex deletes, regex substitutions and anchored inserts, typically loaded
//! from a TOML step list.
//!
//! # Architecture
//!
//! Every step compiles down to a single primitive: [`Edit`], a verified
//! byte-span replacement. Intelligence lives in span acquisition (literal
//! search, regex matching), not in the application logic.
//!
//! # Guarantees
//!
//! - Patterns are compiled before the target is read; a bad one aborts the run
//! - Step *i+1* sees only the output of step *i*
//! - A step that finds nothing leaves the buffer unchanged and is not an error
//! - The target is written once, atomically, or not at all
//!
//! Runs are not idempotent: re-running a step list can duplicate anchored
//! inserts unless a step declares `unless_present`.
//!
//! # Example
//!
//! ```no_run
//! use text_patcher::{EditStep, Pipeline, RunOptions, Step};
//!
//! let steps = [Step::new(
//!     "rename",
//!     EditStep::LiteralSwap {
//!         find: "oldName".into(),
//!         replace: "newName".into(),
//!     },
//! )];
//!
//! let pipeline = Pipeline::new("example", &steps)?;
//! let report = pipeline.run("src/page.tsx", &RunOptions::default())?;
//! println!("{} step(s) applied", report.applied_count());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod edit;
pub mod pipeline;
pub mod presets;
pub mod safety;
pub mod step;

use std::path::Path;

// Re-exports
pub use config::{load_from_path, load_from_str, ConfigError, ConfigOrigin, PipelineConfig};
pub use edit::{apply_edits, Edit, EditError, EditVerification};
pub use pipeline::{
    Pipeline, PipelineError, RunOptions, RunReport, StepReport, Transformation,
};
pub use safety::{SafetyError, WorkspaceGuard};
pub use step::{
    CompiledStep, EditStep, InsertPosition, PatternError, PatternFlags, Replacement, Step,
    StepKind, StepOutcome,
};

/// Run the default built-in preset against `path`.
pub fn run(path: impl AsRef<Path>) -> Result<RunReport, PipelineError> {
    let config = presets::load_default()?;
    let pipeline = Pipeline::from_config(&config)?;
    pipeline.run(path, &RunOptions::default())
}
