use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use caption_engine::EngineSettings;
use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;

use crate::cli::{CliArgs, CliSources};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    snapshot: Option<String>,
    pretty: Option<bool>,
    engine: Option<EngineSettings>,
}

#[derive(Debug)]
pub struct EffectiveSettings {
    pub snapshot: PathBuf,
    pub output: PathBuf,
    pub write_snapshot: bool,
    pub pretty: bool,
    pub engine: EngineSettings,
    pub config_dir: Option<PathBuf>,
}

const DEFAULT_SNAPSHOT: &str = "session.json";

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    InvalidValue {
        path: Option<PathBuf>,
        field: &'static str,
        value: String,
    },
    NotFound {
        path: PathBuf,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "failed to read config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "failed to parse config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::InvalidValue { path, field, value } => {
                if let Some(path) = path {
                    write!(
                        f,
                        "invalid value '{}' for '{}' in {}",
                        value,
                        field,
                        path.display()
                    )
                } else {
                    write!(f, "invalid value '{}' for '{}'", value, field)
                }
            }
            ConfigError::NotFound { path } => {
                write!(f, "config file {} does not exist", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::InvalidValue { .. } => None,
            ConfigError::NotFound { .. } => None,
        }
    }
}

pub fn resolve_settings(
    cli: &CliArgs,
    sources: &CliSources,
) -> Result<EffectiveSettings, ConfigError> {
    let (file, config_path) = load_config(cli.config.as_deref())?;
    merge(cli, sources, file, config_path)
}

fn load_config(path_override: Option<&Path>) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    if let Some(path) = path_override {
        let path = path.to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound { path });
        }
        let config = read_config(&path)?;
        return Ok((config, Some(path)));
    }

    for candidate in [project_config_path(), default_config_path()]
        .into_iter()
        .flatten()
    {
        if candidate.exists() {
            let config = read_config(&candidate)?;
            return Ok((config, Some(candidate)));
        }
    }
    Ok((FileConfig::default(), None))
}

fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn merge(
    cli: &CliArgs,
    sources: &CliSources,
    file: FileConfig,
    config_path: Option<PathBuf>,
) -> Result<EffectiveSettings, ConfigError> {
    let config_dir = config_path
        .as_ref()
        .and_then(|path| path.parent().map(|dir| dir.to_path_buf()));

    let FileConfig {
        snapshot: file_snapshot,
        pretty: file_pretty,
        engine: file_engine,
    } = file;

    let mut engine = file_engine.unwrap_or_default();
    validate_engine(&engine, config_path.as_ref())?;

    if sources.batch_size_from_cli {
        engine.batch_size = cli.batch_size;
    }
    if sources.reversal_threshold_from_cli {
        engine.reversal_threshold = cli.reversal_threshold;
    }
    if sources.max_boxes_from_cli {
        engine.max_boxes_per_update = cli.max_boxes_per_update;
    }
    if sources.min_change_probability_from_cli {
        engine.min_change_probability = cli.min_change_probability;
    }
    if sources.outlier_k_from_cli {
        engine.outlier_k = cli.outlier_k;
    }
    validate_engine(&engine, None)?;

    let snapshot = match cli.snapshot.clone() {
        Some(path) => expand_pathbuf(path),
        None => normalize_string(file_snapshot)
            .and_then(|value| resolve_path_from_config(value, config_dir.as_deref()))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT)),
    };
    let output = cli
        .output
        .clone()
        .map(expand_pathbuf)
        .unwrap_or_else(|| snapshot.clone());

    Ok(EffectiveSettings {
        snapshot,
        output,
        write_snapshot: !cli.dry_run && cli.command.writes_snapshot(),
        pretty: file_pretty.unwrap_or(true),
        engine,
        config_dir,
    })
}

fn validate_engine(engine: &EngineSettings, path: Option<&PathBuf>) -> Result<(), ConfigError> {
    let invalid = |field: &'static str, value: String| ConfigError::InvalidValue {
        path: path.cloned(),
        field,
        value,
    };

    let counts = [
        ("batch_size", engine.batch_size),
        ("reversal_window", engine.reversal_window),
        ("max_boxes_per_update", engine.max_boxes_per_update),
        ("min_class_samples", engine.min_class_samples),
    ];
    for (field, value) in counts {
        if value == 0 {
            return Err(invalid(field, value.to_string()));
        }
    }
    if !(engine.reversal_threshold > 0.0 && engine.reversal_threshold < 1.0) {
        return Err(invalid(
            "reversal_threshold",
            engine.reversal_threshold.to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&engine.min_change_probability) {
        return Err(invalid(
            "min_change_probability",
            engine.min_change_probability.to_string(),
        ));
    }
    if !(engine.outlier_k.is_finite() && engine.outlier_k > 0.0) {
        return Err(invalid("outlier_k", engine.outlier_k.to_string()));
    }
    Ok(())
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("rs", "caption-layout", "caption-layout")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn project_config_path() -> Option<PathBuf> {
    env::current_dir().ok().map(|dir| dir.join("config.toml"))
}

fn normalize_string(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn expand_pathbuf(path: PathBuf) -> PathBuf {
    match path.to_str() {
        Some(s) => expand_home_path(s),
        None => path,
    }
}

fn resolve_path_from_config(value: String, base: Option<&Path>) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = expand_home_path(trimmed);
    match base {
        Some(base) if !expanded.is_absolute() => Some(base.join(expanded)),
        _ => Some(expanded),
    }
}

fn expand_home_path(value: &str) -> PathBuf {
    if value == "~" {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().to_path_buf();
        }
    } else if let Some(stripped) = value.strip_prefix("~/") {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().join(stripped);
        }
    }
    PathBuf::from(value)
}
