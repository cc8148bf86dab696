use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::prefs::Preferences;

pub const THEME_KEY: &str = "classpoints-theme";
pub const CHRISTMAS_CLASS: &str = "christmas-mode";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Normal,
    Christmas,
}

impl ThemeMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" | "default" => Some(Self::Normal),
            "christmas" | "seasonal" => Some(Self::Christmas),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Christmas => "christmas",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Normal => Self::Christmas,
            Self::Christmas => Self::Normal,
        }
    }

    /// Class the shell puts on its document root.
    pub fn document_class(self) -> Option<&'static str> {
        match self {
            Self::Normal => None,
            Self::Christmas => Some(CHRISTMAS_CLASS),
        }
    }
}

/// Seasonal default: on for all of December.
pub fn seasonal_default(today: NaiveDate) -> ThemeMode {
    if today.month() == 12 {
        ThemeMode::Christmas
    } else {
        ThemeMode::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeState {
    pub mode: ThemeMode,
    pub explicit: bool,
    pub document_class: Option<&'static str>,
}

pub struct ThemeStore {
    prefs: Preferences,
}

impl ThemeStore {
    pub fn new(prefs: Preferences) -> Self {
        Self { prefs }
    }

    pub fn stored(&self) -> Option<ThemeMode> {
        self.prefs.get_str(THEME_KEY).and_then(ThemeMode::parse)
    }

    pub fn state(&self, today: NaiveDate) -> ThemeState {
        let stored = self.stored();
        let mode = stored.unwrap_or_else(|| seasonal_default(today));
        ThemeState {
            mode,
            explicit: stored.is_some(),
            document_class: mode.document_class(),
        }
    }

    pub fn mode(&self, today: NaiveDate) -> ThemeMode {
        self.state(today).mode
    }

    pub fn set(&mut self, mode: ThemeMode, today: NaiveDate) -> anyhow::Result<ThemeState> {
        self.prefs.set_str(THEME_KEY, mode.as_str())?;
        Ok(self.state(today))
    }

    pub fn toggle(&mut self, today: NaiveDate) -> anyhow::Result<ThemeState> {
        let next = self.mode(today).toggled();
        self.set(next, today)
    }

    /// Drops the explicit choice so the seasonal default applies again.
    pub fn reset(&mut self, today: NaiveDate) -> anyhow::Result<ThemeState> {
        self.prefs.remove(THEME_KEY)?;
        Ok(self.state(today))
    }
}
