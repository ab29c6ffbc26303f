//! Step lists shipped with the crate.

use crate::config::{load_with_origin, ConfigError, ConfigOrigin, PipelineConfig};

/// Default preset used when no step source is given.
pub const DEFAULT: &str = "reviews-autosave";

const REVIEWS_AUTOSAVE: &str = include_str!("../presets/reviews-autosave.toml");

const PRESETS: &[(&str, &str)] = &[("reviews-autosave", REVIEWS_AUTOSAVE)];

/// Names of all built-in presets.
pub fn names() -> impl Iterator<Item = &'static str> {
    PRESETS.iter().map(|(name, _)| *name)
}

/// Raw TOML of a built-in preset.
pub fn source(name: &str) -> Option<&'static str> {
    PRESETS
        .iter()
        .find(|(preset, _)| *preset == name)
        .map(|(_, toml)| *toml)
}

/// Parse and validate the default preset.
pub fn load_default() -> Result<PipelineConfig, ConfigError> {
    parse(DEFAULT, REVIEWS_AUTOSAVE)
}

/// Parse and validate a built-in preset. `None` if no preset has that name.
pub fn load(name: &str) -> Option<Result<PipelineConfig, ConfigError>> {
    source(name).map(|toml| parse(name, toml))
}

fn parse(name: &str, toml: &str) -> Result<PipelineConfig, ConfigError> {
    load_with_origin(toml, ConfigOrigin::Preset(name.to_string()))
}
