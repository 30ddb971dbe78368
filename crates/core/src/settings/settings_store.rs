use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

use crate::capture::domain::capture_settings::{Resolution, MAX_FPS, MIN_FPS};
use crate::protection::domain::protection_mode::ProtectionMode;
use crate::settings::config::Config;

const REQUIRED_IMPORT_SECTIONS: &[&str] = &["protection", "camera", "face_detection"];

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{0} is empty")]
    Empty(PathBuf),
    #[error("invalid configuration key {0:?}")]
    InvalidKey(String),
    #[error("configuration rejected: {0}")]
    Schema(serde_yaml::Error),
    #[error("imported configuration rejected: {}", .0.join("; "))]
    Import(Vec<String>),
    #[error("unsupported export format {0:?} (expected yaml or json)")]
    UnsupportedFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Yaml,
    Json,
}

impl FromStr for ExportFormat {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(ExportFormat::Yaml),
            "json" => Ok(ExportFormat::Json),
            _ => Err(SettingsError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Yaml => write!(f, "yaml"),
            ExportFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SettingsInfo {
    pub path: PathBuf,
    pub exists: bool,
    pub sections: Vec<String>,
    pub total_keys: usize,
}

/// Files searched, in order, when no path is given.
pub fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("config").join("settings.yaml")];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".privacy_screen_app").join("config.yaml"));
    }
    paths.push(PathBuf::from("/etc/privacy_screen_app/config.yaml"));
    paths
}

/// The explicit path, else the first existing candidate, else the first candidate.
pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    let candidates = candidate_paths();
    candidates
        .iter()
        .find(|p| p.exists())
        .cloned()
        .unwrap_or_else(|| candidates[0].clone())
}

/// Configuration [`SettingsStore::open`] would load, read without creating
/// or reporting anything so a binary can configure logging first. Falls back
/// to defaults on any read or schema error.
pub fn peek_config(explicit: Option<&Path>) -> Config {
    let mut document = default_document();
    let file = fs::read_to_string(resolve_path(explicit))
        .ok()
        .and_then(|text| serde_yaml::from_str::<Value>(&text).ok())
        .filter(|value| !value.is_null());
    if let Some(file) = file {
        deep_merge(&mut document, file);
    }
    serde_yaml::from_value::<Config>(document).unwrap_or_default()
}

pub fn default_document() -> Value {
    serde_yaml::to_value(Config::default()).unwrap_or(Value::Mapping(Mapping::new()))
}

/// Recursively merge `patch` into `base`: mappings merge key by key, anything
/// else replaces.
pub fn deep_merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Mapping(base_map), Value::Mapping(patch_map)) => {
            for (key, value) in patch_map {
                let recurse = value.is_mapping() && base_map.get(&key).is_some_and(Value::is_mapping);
                if recurse {
                    if let Some(existing) = base_map.get_mut(&key) {
                        deep_merge(existing, value);
                    }
                } else {
                    base_map.insert(key, value);
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

/// Interpret a command-line value as YAML, so `0.5` is a number and `true`
/// a boolean; anything unparseable stays a string.
pub fn parse_scalar(raw: &str) -> Value {
    serde_yaml::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn count_keys(value: &Value) -> usize {
    match value {
        Value::Mapping(map) => map.values().map(|v| 1 + count_keys(v)).sum(),
        _ => 0,
    }
}

/// YAML-backed configuration with dotted-path access. Every mutation is
/// written back to disk before it returns.
pub struct SettingsStore {
    path: PathBuf,
    document: Value,
}

impl SettingsStore {
    /// Resolve the file and load it; any load failure leaves the defaults in place.
    pub fn open(explicit: Option<&Path>) -> Self {
        let mut store = Self {
            path: resolve_path(explicit),
            document: default_document(),
        };
        if let Err(e) = store.load() {
            log::error!("Failed to load configuration: {e}");
            log::info!("Using default configuration");
        }
        log::info!("Configuration manager initialized with: {}", store.path.display());
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Re-read the file. A missing file is created with the defaults.
    pub fn load(&mut self) -> Result<(), SettingsError> {
        self.document = default_document();
        if !self.path.exists() {
            log::info!("Configuration file not found, creating with defaults");
            return self.save();
        }

        let text = fs::read_to_string(&self.path).map_err(|source| SettingsError::Io {
            path: self.path.clone(),
            source,
        })?;
        let file: Value = serde_yaml::from_str(&text).map_err(|source| SettingsError::Yaml {
            path: self.path.clone(),
            source,
        })?;
        if file.is_null() {
            log::warn!("Configuration file is empty, using defaults");
            return Ok(());
        }

        let mut merged = default_document();
        deep_merge(&mut merged, file);
        serde_yaml::from_value::<Config>(merged.clone()).map_err(SettingsError::Schema)?;
        self.document = merged;
        log::info!("Configuration loaded from: {}", self.path.display());
        Ok(())
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        write_document(&self.path, &self.document, ExportFormat::Yaml)?;
        log::debug!("Configuration saved to: {}", self.path.display());
        Ok(())
    }

    /// Typed view of the current document.
    pub fn config(&self) -> Config {
        serde_yaml::from_value(self.document.clone()).unwrap_or_default()
    }

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        key.split('.').try_fold(&self.document, |node, part| node.get(part))
    }

    /// Set a leaf by dotted path, creating intermediate sections as needed.
    pub fn set_value(&mut self, key: &str, value: Value) -> Result<(), SettingsError> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(SettingsError::InvalidKey(key.to_string()));
        }
        let (last, parents) = parts
            .split_last()
            .ok_or_else(|| SettingsError::InvalidKey(key.to_string()))?;

        let mut candidate = self.document.clone();
        let mut node = &mut candidate;
        for part in parents {
            if node.is_null() {
                *node = Value::Mapping(Mapping::new());
            }
            let map = node
                .as_mapping_mut()
                .ok_or_else(|| SettingsError::InvalidKey(key.to_string()))?;
            node = map
                .entry(Value::String(part.to_string()))
                .or_insert_with(|| Value::Mapping(Mapping::new()));
        }
        if node.is_null() {
            *node = Value::Mapping(Mapping::new());
        }
        node.as_mapping_mut()
            .ok_or_else(|| SettingsError::InvalidKey(key.to_string()))?
            .insert(Value::String(last.to_string()), value);

        self.commit(candidate)?;
        log::debug!("Configuration value set: {key}");
        Ok(())
    }

    /// Deep-merge `patch` into the configuration.
    pub fn update(&mut self, patch: Value) -> Result<(), SettingsError> {
        let mut candidate = self.document.clone();
        deep_merge(&mut candidate, patch);
        self.commit(candidate)?;
        log::info!("Configuration updated successfully");
        Ok(())
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), SettingsError> {
        log::info!("Resetting configuration to defaults");
        self.document = default_document();
        self.save()
    }

    pub fn validate(&self) -> ValidationReport {
        let config = self.config();
        let mut report = ValidationReport::default();

        let sensitivity = config.protection.sensitivity;
        if !(0.0..=1.0).contains(&sensitivity) {
            report.errors.push(format!(
                "Protection sensitivity must be between 0.0 and 1.0, got {sensitivity}"
            ));
        }
        let reaction_time = config.protection.reaction_time;
        if !(50..=1000).contains(&reaction_time) {
            report.warnings.push(format!(
                "Reaction time {reaction_time}ms may be too slow for real-time protection"
            ));
        }
        if ProtectionMode::from_str(&config.protection.mode).is_err() {
            report.errors.push(format!(
                "Unknown protection mode {:?}",
                config.protection.mode
            ));
        }
        let fps = config.camera.fps;
        if !(MIN_FPS..=MAX_FPS).contains(&fps) {
            report
                .errors
                .push(format!("Camera FPS must be between 1 and 60, got {fps}"));
        }
        if Resolution::from_name(&config.camera.resolution).is_none() {
            report.warnings.push(format!(
                "Unknown camera resolution {:?}, 720p will be used",
                config.camera.resolution
            ));
        }
        let cpu = config.performance.max_cpu_usage;
        if !(0.1..=1.0).contains(&cpu) {
            report
                .warnings
                .push(format!("Max CPU usage {cpu} may be too restrictive"));
        }

        log::info!("Configuration validation completed: {}", report.is_valid());
        report
    }

    pub fn export(&self, format: ExportFormat, path: &Path) -> Result<(), SettingsError> {
        write_document(path, &self.document, format)?;
        log::info!("Configuration exported to: {}", path.display());
        Ok(())
    }

    /// Merge a YAML or JSON file (by extension) over the current configuration.
    pub fn import(&mut self, path: &Path) -> Result<(), SettingsError> {
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let imported: Value = if is_json {
            serde_json::from_str(&text).map_err(|source| SettingsError::Json {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            serde_yaml::from_str(&text).map_err(|source| SettingsError::Yaml {
                path: path.to_path_buf(),
                source,
            })?
        };
        if imported.is_null() {
            return Err(SettingsError::Empty(path.to_path_buf()));
        }

        let problems = check_import(&imported);
        if !problems.is_empty() {
            return Err(SettingsError::Import(problems));
        }

        self.update(imported)?;
        log::info!("Configuration imported from: {}", path.display());
        Ok(())
    }

    pub fn info(&self) -> SettingsInfo {
        let sections = self
            .document
            .as_mapping()
            .map(|m| m.keys().filter_map(|k| k.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        SettingsInfo {
            path: self.path.clone(),
            exists: self.path.exists(),
            sections,
            total_keys: count_keys(&self.document),
        }
    }

    /// Accept `candidate` only if it still describes a valid configuration.
    fn commit(&mut self, candidate: Value) -> Result<(), SettingsError> {
        serde_yaml::from_value::<Config>(candidate.clone()).map_err(SettingsError::Schema)?;
        self.document = candidate;
        self.save()
    }
}

fn check_import(imported: &Value) -> Vec<String> {
    let mut problems: Vec<String> = REQUIRED_IMPORT_SECTIONS
        .iter()
        .filter(|section| imported.get(**section).is_none())
        .map(|section| format!("Missing required section: {section}"))
        .collect();
    if let Some(sensitivity) = imported.get("protection").and_then(|p| p.get("sensitivity")) {
        if !sensitivity.is_number() {
            problems.push("Protection sensitivity must be numeric".to_string());
        }
    }
    problems
}

fn write_document(path: &Path, document: &Value, format: ExportFormat) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let text = match format {
        ExportFormat::Yaml => serde_yaml::to_string(document).map_err(|source| SettingsError::Yaml {
            path: path.to_path_buf(),
            source,
        })?,
        ExportFormat::Json => {
            serde_json::to_string_pretty(document).map_err(|source| SettingsError::Json {
                path: path.to_path_buf(),
                source,
            })?
        }
    };
    fs::write(path, text).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })
}
