pub mod loader;
pub mod schema;

pub use loader::{
    discover_step_files, load_from_dir, load_from_path, load_from_str, load_with_origin,
    ConfigError, ConfigOrigin,
};
pub use schema::{
    Metadata, Operation, PipelineConfig, StepDefinition, ValidationError, ValidationIssue,
};
