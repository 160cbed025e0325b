use std::{
    collections::BTreeMap,
    env,
    path::{Path, PathBuf},
};

use serde_json::{Map, Value};

use crate::SETTING_ENV_OVERRIDES;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("settings {} must contain a JSON object at its root", .path.display())]
    NotAnObject { path: PathBuf },
}

/// Flat key-value settings read once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppSettings {
    values: BTreeMap<String, String>,
}

impl AppSettings {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Returns the trimmed value, treating blank values as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Loads `path`; a missing file yields empty settings so environment
    /// overrides alone can configure the app.
    pub async fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    target: "startup",
                    path = %path.display(),
                    "settings file not found; continuing with environment overrides only"
                );
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        Self::from_json_str(&raw, path)
    }

    pub fn from_json_str(raw: &str, path: &Path) -> Result<Self, SettingsError> {
        let parsed: Value = serde_json::from_str(raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let Value::Object(object) = parsed else {
            return Err(SettingsError::NotAnObject {
                path: path.to_path_buf(),
            });
        };

        Ok(Self {
            values: flatten_setting_values(object),
        })
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|env_key| env::var(env_key).ok())
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        for (setting_key, env_key) in SETTING_ENV_OVERRIDES {
            if let Some(value) = lookup(env_key).filter(|value| !value.trim().is_empty()) {
                self.values.insert(setting_key.to_string(), value);
            }
        }
        self
    }
}

fn flatten_setting_values(object: Map<String, Value>) -> BTreeMap<String, String> {
    object
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(text) => Some((key, text)),
            Value::Bool(flag) => Some((key, flag.to_string())),
            Value::Number(number) => Some((key, number.to_string())),
            Value::Null | Value::Array(_) | Value::Object(_) => {
                tracing::warn!(
                    target: "startup",
                    setting = %key,
                    "ignoring non-scalar setting value"
                );
                None
            }
        })
        .collect()
}
