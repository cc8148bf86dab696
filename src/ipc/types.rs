use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::auth::{LocalAuth, RestAuth, SessionHolder};
use crate::backend::{RestTableStore, SqliteTableStore};
use crate::config::{BackendKind, Config};
use crate::db;
use crate::prefs::Preferences;
use crate::store::AppStore;
use crate::theme::ThemeStore;
use crate::undo::SystemClock;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: Config,
    pub workspace: Option<PathBuf>,
    pub store: Option<AppStore>,
    pub session: SessionHolder,
    pub theme: ThemeStore,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            workspace: None,
            store: None,
            session: SessionHolder::default(),
            theme: ThemeStore::new(Preferences::in_memory()),
        }
    }

    /// Preferences always live in the workspace. With the sqlite backend the
    /// workspace also holds the data file and the local accounts, so the
    /// current session ends.
    pub fn open_workspace(&mut self, path: &Path) -> anyhow::Result<()> {
        let prefs = Preferences::open(path)?;
        if self.config.backend == BackendKind::Sqlite {
            let data = db::open_db(path)?;
            let accounts = db::open_db(path)?;
            self.store = Some(AppStore::new(
                Box::new(SqliteTableStore::new(data)),
                Box::new(SystemClock),
                self.config.undo_window,
            ));
            self.session.set_provider(Box::new(LocalAuth::new(accounts)));
        }
        self.theme = ThemeStore::new(prefs);
        self.workspace = Some(path.to_path_buf());
        info!(workspace = %path.to_string_lossy(), "workspace opened");
        Ok(())
    }

    /// Wires the hosted backend. Returns false when it is not configured.
    pub fn connect_rest(&mut self) -> bool {
        let (Some(url), Some(key)) = (self.config.backend_url.clone(), self.config.anon_key.clone())
        else {
            return false;
        };
        self.store = Some(AppStore::new(
            Box::new(RestTableStore::new(url.clone(), key.clone())),
            Box::new(SystemClock),
            self.config.undo_window,
        ));
        self.session.set_provider(Box::new(RestAuth::new(url, key)));
        info!("hosted backend connected");
        true
    }
}
