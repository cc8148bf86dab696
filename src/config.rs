use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use tracing::{info, warn};

pub const DEFAULT_UNDO_WINDOW_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sqlite,
    Rest,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "local" => Ok(Self::Sqlite),
            "rest" | "hosted" => Ok(Self::Rest),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub backend: BackendKind,
    pub backend_url: Option<String>,
    pub anon_key: Option<String>,
    pub undo_window: Duration,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            backend: BackendKind::Sqlite,
            backend_url: None,
            anon_key: None,
            undo_window: Duration::from_millis(DEFAULT_UNDO_WINDOW_MS),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Reads `CLASSPOINTS_*` variables. Runs before the subscriber exists, so
    /// fallbacks are reported through `report()` once logging is up.
    pub fn load() -> Self {
        let defaults = Self::default();
        Self {
            workspace: var("CLASSPOINTS_WORKSPACE").map(PathBuf::from),
            backend: try_load("CLASSPOINTS_BACKEND", defaults.backend),
            backend_url: var("CLASSPOINTS_BACKEND_URL")
                .map(|s| s.trim_end_matches('/').to_string()),
            anon_key: var("CLASSPOINTS_ANON_KEY"),
            undo_window: Duration::from_millis(try_load(
                "CLASSPOINTS_UNDO_WINDOW_MS",
                DEFAULT_UNDO_WINDOW_MS,
            )),
            log_level: var("CLASSPOINTS_LOG").unwrap_or(defaults.log_level),
            log_format: try_load("CLASSPOINTS_LOG_FORMAT", defaults.log_format),
        }
    }

    pub fn report(&self) {
        info!(
            backend = ?self.backend,
            undo_window_ms = self.undo_window.as_millis() as u64,
            workspace = ?self.workspace,
            "configuration loaded"
        );
        if self.backend == BackendKind::Rest
            && (self.backend_url.is_none() || self.anon_key.is_none())
        {
            warn!("rest backend selected but CLASSPOINTS_BACKEND_URL or CLASSPOINTS_ANON_KEY is missing");
        }
        for key in ["CLASSPOINTS_BACKEND", "CLASSPOINTS_UNDO_WINDOW_MS", "CLASSPOINTS_LOG_FORMAT"] {
            if let Some(raw) = var(key) {
                let valid = match key {
                    "CLASSPOINTS_BACKEND" => raw.parse::<BackendKind>().is_ok(),
                    "CLASSPOINTS_UNDO_WINDOW_MS" => raw.parse::<u64>().is_ok(),
                    _ => raw.parse::<LogFormat>().is_ok(),
                };
                if !valid {
                    warn!("invalid {key} value '{raw}', using default");
                }
            }
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn try_load<T: FromStr>(key: &str, default: T) -> T
where
    T::Err: Display,
{
    var(key).and_then(|raw| raw.parse().ok()).unwrap_or(default)
}
