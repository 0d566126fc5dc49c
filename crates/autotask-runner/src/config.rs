/*
[INPUT]:  YAML runner file (tasks to invoke + per-task settings)
[OUTPUT]: RunnerConfig and the flat Settings map each task runs with
[POS]:    Configuration layer - settings parsing and validation
[UPDATE]: When adding universal settings keys or runner options
*/

use crate::error::SettingsError;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the task the settings belong to; always mandatory
pub const INVOKED_CLASS: &str = "invoked_class";
/// Multiplier applied to every sleep and poll interval
pub const TIME_UNIT_FACTOR: &str = "time.unit.factor";
/// `"true"` (any case) runs the browser visibly
pub const USE_GUI: &str = "use.GUI";
/// Directory downloads are written to
pub const DOWNLOAD_FOLDER: &str = "download.folder";

/// Flat string-to-string settings of one task.
///
/// Owned by the task for the duration of a run. Front-ends may edit settings between runs,
/// but must not mutate them while `perform()` is active.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Settings(BTreeMap<String, String>);

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keys that are absent or blank, in the order given.
    pub fn missing_keys<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut missing: Vec<String> = Vec::new();
        for key in keys {
            let present = self.get(key).is_some_and(|value| !value.trim().is_empty());
            if !present && !missing.iter().any(|seen| seen == key) {
                missing.push(key.to_string());
            }
        }
        missing
    }

    pub fn validate_keys<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), SettingsError> {
        let missing = self.missing_keys(keys);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SettingsError::MissingKeys(missing))
        }
    }

    pub fn invoked_class(&self) -> Option<&str> {
        self.get(INVOKED_CLASS)
    }

    /// Defaults to 1.0 when unset.
    pub fn timing_factor(&self) -> Result<f64, SettingsError> {
        let Some(raw) = self.get(TIME_UNIT_FACTOR) else {
            return Ok(1.0);
        };
        let invalid = |reason: &str| SettingsError::InvalidValue {
            key: TIME_UNIT_FACTOR.to_string(),
            value: raw.to_string(),
            reason: reason.to_string(),
        };
        let factor: f64 = raw.trim().parse().map_err(|_| invalid("not a number"))?;
        if !factor.is_finite() || factor <= 0.0 {
            return Err(invalid("must be a positive number"));
        }
        Ok(factor)
    }

    /// Visible mode only when `use.GUI` is `"true"`, case-insensitively.
    pub fn use_gui(&self) -> bool {
        self.get(USE_GUI)
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
    }

    pub fn download_folder(&self) -> Option<PathBuf> {
        self.get(DOWNLOAD_FOLDER)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    }
}

impl<K, V> FromIterator<(K, V)> for Settings
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl<'de> Deserialize<'de> for Settings {
    /// Accepts any YAML scalar as a value, so `use.GUI: true` and `time.unit.factor: 2`
    /// need no quoting.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: BTreeMap<String, serde_yaml::Value> = BTreeMap::deserialize(deserializer)?;
        let mut settings = BTreeMap::new();
        for (key, value) in raw {
            let value = match value {
                serde_yaml::Value::Null => String::new(),
                serde_yaml::Value::Bool(flag) => flag.to_string(),
                serde_yaml::Value::Number(number) => number.to_string(),
                serde_yaml::Value::String(text) => text,
                _ => {
                    return Err(de::Error::custom(format!(
                        "setting `{key}` must be a scalar value"
                    )));
                }
            };
            settings.insert(key, value);
        }
        Ok(Self(settings))
    }
}

/// One task to invoke.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskEntry {
    /// Registered task name, e.g. "ExampleTask"
    pub name: String,
    #[serde(default)]
    pub settings: Settings,
}

impl TaskEntry {
    /// Settings with `invoked_class` filled in from the task name.
    pub fn settings_for_run(&self) -> Settings {
        let mut settings = self.settings.clone();
        settings.insert(INVOKED_CLASS, self.name.clone());
        settings
    }
}

/// Top-level configuration for the runner binary
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunnerConfig {
    /// Run tasks one after another instead of all at once
    #[serde(default)]
    pub run_sequentially: bool,
    /// Tasks to invoke, in order
    pub tasks: Vec<TaskEntry>,
}

impl RunnerConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        Ok(config)
    }
}
