use crate::config::schema::{PipelineConfig, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Where a step list was loaded from. Carried by errors so a broken list can
/// be named, and used to name lists that leave `meta.name` empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    Inline,
    File(PathBuf),
    Preset(String),
}

impl ConfigOrigin {
    fn default_name(&self) -> Option<String> {
        match self {
            ConfigOrigin::Inline => None,
            ConfigOrigin::File(path) => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned()),
            ConfigOrigin::Preset(name) => Some(name.clone()),
        }
    }
}

impl fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigOrigin::Inline => f.write_str("inline step list"),
            ConfigOrigin::File(path) => write!(f, "{}", path.display()),
            ConfigOrigin::Preset(name) => write!(f, "preset {name}"),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        origin: ConfigOrigin,
        source: toml_edit::de::Error,
    },
    Validation {
        origin: ConfigOrigin,
        source: ValidationError,
    },
    /// A step directory holds no `*.toml` files
    NoStepFiles {
        dir: PathBuf,
    },
}

impl ConfigError {
    pub fn origin(&self) -> Option<&ConfigOrigin> {
        match self {
            ConfigError::Toml { origin, .. } | ConfigError::Validation { origin, .. } => {
                Some(origin)
            }
            ConfigError::Io { .. } | ConfigError::NoStepFiles { .. } => None,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read step list {}: {}", path.display(), source)
            }
            ConfigError::Toml { origin, source } => {
                write!(f, "failed to parse step list TOML ({origin}): {source}")
            }
            ConfigError::Validation { origin, source } => {
                write!(f, "invalid step list ({origin}): {source}")
            }
            ConfigError::NoStepFiles { dir } => {
                write!(f, "no .toml step lists found in {}", dir.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
            ConfigError::NoStepFiles { .. } => None,
        }
    }
}

/// Parse and validate a step list that has no file or preset behind it.
pub fn load_from_str(input: &str) -> Result<PipelineConfig, ConfigError> {
    load_with_origin(input, ConfigOrigin::Inline)
}

/// Parse and validate a step list, labelling errors with `origin`.
///
/// An empty `meta.name` is filled from the origin (file stem or preset name).
pub fn load_with_origin(
    input: &str,
    origin: ConfigOrigin,
) -> Result<PipelineConfig, ConfigError> {
    let mut config: PipelineConfig = match toml_edit::de::from_str(input) {
        Ok(config) => config,
        Err(source) => return Err(ConfigError::Toml { origin, source }),
    };
    if let Err(source) = config.validate() {
        return Err(ConfigError::Validation { origin, source });
    }
    if config.meta.name.trim().is_empty() {
        if let Some(name) = origin.default_name() {
            config.meta.name = name;
        }
    }
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PipelineConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_with_origin(&contents, ConfigOrigin::File(path.to_path_buf()))
}

/// `*.toml` files directly inside `dir`, sorted by name so lists run in a
/// stable order.
pub fn discover_step_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, ConfigError> {
    let dir = dir.as_ref();
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).max_depth(1) {
        let entry = entry.map_err(|err| ConfigError::Io {
            path: dir.to_path_buf(),
            source: err.into(),
        })?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
        {
            files.push(entry.into_path());
        }
    }
    if files.is_empty() {
        return Err(ConfigError::NoStepFiles {
            dir: dir.to_path_buf(),
        });
    }
    files.sort();
    Ok(files)
}

/// Load every step list in `dir`. Fails on the first broken list, so nothing
/// runs from a partially valid directory.
pub fn load_from_dir(
    dir: impl AsRef<Path>,
) -> Result<Vec<(PathBuf, PipelineConfig)>, ConfigError> {
    discover_step_files(dir)?
        .into_iter()
        .map(|path| {
            let config = load_from_path(&path)?;
            Ok((path, config))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_STEP: &str = r#"
[[steps]]
id = "swap"

[steps.operation]
type = "literal-swap"
find = "a"
replace = "b"
"#;

    #[test]
    fn parse_error_names_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        fs::write(temp.path(), "[[steps]\n").unwrap();

        let err = load_from_path(temp.path()).unwrap_err();
        assert_eq!(
            err.origin(),
            Some(&ConfigOrigin::File(temp.path().to_path_buf()))
        );
        assert!(err.to_string().contains("failed to parse step list TOML"));
        assert!(err
            .to_string()
            .contains(&temp.path().display().to_string()));
    }

    #[test]
    fn validation_error_names_preset() {
        let err = load_with_origin("[meta]\nname = \"x\"\n", ConfigOrigin::Preset("broken".into()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
        assert!(err.to_string().starts_with("invalid step list (preset broken):"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_from_path("/nonexistent/steps.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert_eq!(err.origin(), None);
    }

    #[test]
    fn empty_name_falls_back_to_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rename-icons.toml");
        fs::write(&path, ONE_STEP).unwrap();

        let config = load_from_path(&path).unwrap();
        assert_eq!(config.meta.name, "rename-icons");

        let inline = load_from_str(ONE_STEP).unwrap();
        assert_eq!(inline.meta.name, "");
    }

    #[test]
    fn directory_lists_load_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.toml"), ONE_STEP).unwrap();
        fs::write(dir.path().join("a.toml"), ONE_STEP).unwrap();
        fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let lists = load_from_dir(dir.path()).unwrap();
        let names: Vec<_> = lists.iter().map(|(_, c)| c.meta.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn directory_without_lists_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::NoStepFiles { .. }));
    }
}
