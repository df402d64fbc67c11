use std::collections::BTreeMap;
use std::fs;
use std::sync::{Mutex, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::FilesError;

/// Flat, string-keyed property map shared by every task of a migration.
///
/// Values are kept as strings; typed accessors parse them on demand and fall
/// back to the caller's default when the key is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment {
    properties: BTreeMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_properties<K, V>(properties: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            properties: properties
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parses `KEY=VALUE` style arguments. Leading `-D` or `--` is stripped,
    /// and a bare `KEY` is read as a flag set to `true`.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut environment = Self::new();

        for arg in args {
            let arg = arg.as_ref().trim();
            let arg = arg
                .strip_prefix("-D")
                .or_else(|| arg.strip_prefix("--"))
                .unwrap_or(arg);

            if arg.is_empty() {
                continue;
            }

            match arg.split_once('=') {
                Some((key, value)) => environment.set(key.trim(), value.trim()),
                None => environment.set(arg, "true"),
            }
        }

        environment
    }

    /// Reads a JSON object. Scalar values are converted to their string form.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        use serde::de::Error;
        use serde_json::Value;

        let Value::Object(map) = serde_json::from_str::<Value>(json)? else {
            return Err(serde_json::Error::custom("expected a JSON object"));
        };

        let mut environment = Self::new();
        for (key, value) in map {
            let value = match value {
                Value::String(s) => s,
                Value::Null => continue,
                other => other.to_string(),
            };
            environment.set(key, value);
        }

        Ok(environment)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn get_string_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get_string(key).unwrap_or(default)
    }

    /// Accepts `true/false`, `yes/no` and `1/0`, ignoring case. Anything else
    /// is reported and replaced by `default`.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        let Some(value) = self.get_string(key) else {
            return default;
        };

        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => true,
            "false" | "no" | "0" => false,
            _ => {
                tracing::warn!(key, value, "Ignoring non-boolean property value");
                default
            }
        }
    }

    /// Comma-separated list; entries are trimmed and empty entries dropped.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get_string(key)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Properties starting with `prefix`, with the prefix stripped.
    pub fn with_prefix(&self, prefix: &str) -> Environment {
        Self {
            properties: self
                .properties
                .iter()
                .filter_map(|(key, value)| {
                    key.strip_prefix(prefix)
                        .map(|key| (key.to_string(), value.clone()))
                })
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Append-only ledger of files copied during a migration, keyed by
/// destination path.
///
/// A destination may be claimed by one source only. Asking for the same copy
/// twice is a no-op.
#[derive(Debug, Default)]
pub struct MigrationFiles {
    copied: Mutex<BTreeMap<Utf8PathBuf, Utf8PathBuf>>,
}

impl MigrationFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `source -> target`. Returns `false` when this exact copy was
    /// already recorded.
    pub fn register(
        &self,
        source: impl AsRef<Utf8Path>,
        target: impl AsRef<Utf8Path>,
    ) -> Result<bool, FilesError> {
        let source = source.as_ref();
        let target = target.as_ref();
        let mut copied = self.copied.lock().unwrap_or_else(PoisonError::into_inner);

        match copied.get(target) {
            Some(existing) if existing == source => Ok(false),
            Some(existing) => Err(FilesError::Conflict {
                target: target.to_owned(),
                existing: existing.clone(),
                requested: source.to_owned(),
            }),
            None => {
                copied.insert(target.to_owned(), source.to_owned());
                Ok(true)
            }
        }
    }

    /// Records the copy and performs it on disk if it is new.
    pub fn copy(
        &self,
        source: impl AsRef<Utf8Path>,
        target: impl AsRef<Utf8Path>,
    ) -> Result<(), FilesError> {
        let source = source.as_ref();
        let target = target.as_ref();

        if !self.register(source, target)? {
            tracing::debug!(%source, %target, "File already copied");
            return Ok(());
        }

        let result = (|| -> std::io::Result<()> {
            if let Some(dir) = target.parent() {
                fs::create_dir_all(dir)?;
            }
            fs::copy(source, target)?;
            Ok(())
        })();

        if let Err(err) = result {
            self.copied
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(target);
            return Err(err.into());
        }

        tracing::debug!(%source, %target, "Copied file");
        Ok(())
    }

    pub fn source_of(&self, target: impl AsRef<Utf8Path>) -> Option<Utf8PathBuf> {
        self.copied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target.as_ref())
            .cloned()
    }

    /// Snapshot of the ledger as `(source, target)` pairs ordered by target.
    pub fn copied(&self) -> Vec<(Utf8PathBuf, Utf8PathBuf)> {
        self.copied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(target, source)| (source.clone(), target.clone()))
            .collect()
    }
}

/// Process-wide migration state available to all tasks.
#[derive(Debug, Default)]
pub struct Globals {
    /// Properties, including the `<task>.skip` switches.
    pub environment: Environment,
    /// Ledger of copied files.
    pub files: MigrationFiles,
}

impl Globals {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            files: MigrationFiles::new(),
        }
    }
}
