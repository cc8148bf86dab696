use anyhow::Context;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub const PREFS_FILE: &str = "preferences.json";

/// Small key/value store standing in for browser local storage. Every write
/// goes straight to disk; without a workspace it only lives in memory.
#[derive(Debug, Default)]
pub struct Preferences {
    path: Option<PathBuf>,
    values: Map<String, Value>,
}

impl Preferences {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        let path = workspace.join(PREFS_FILE);
        let values = if path.is_file() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
            match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => map,
                // A corrupt file should not lock the user out of their workspace.
                _ => {
                    tracing::warn!(path = %path.to_string_lossy(), "ignoring unreadable preferences file");
                    Map::new()
                }
            }
        } else {
            Map::new()
        };
        Ok(Self {
            path: Some(path),
            values,
        })
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_str())
    }

    pub fn set_str(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values
            .insert(key.to_string(), Value::String(value.to_string()));
        self.flush()
    }

    pub fn remove(&mut self, key: &str) -> anyhow::Result<()> {
        if self.values.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&self) -> anyhow::Result<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        let text = serde_json::to_string_pretty(&self.values)
            .context("failed to serialize preferences")?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.to_string_lossy()))
    }
}
