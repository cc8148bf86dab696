mod auth;
mod backend;
mod behaviors;
mod calc;
mod config;
mod db;
mod ipc;
mod model;
mod prefs;
mod store;
mod telemetry;
mod theme;
mod undo;

use std::io::{self, BufRead, Write};
use tracing::{debug, error, warn};

use crate::config::{BackendKind, Config};

fn main() {
    let config = Config::load();
    if let Err(e) = telemetry::init_logging(&config) {
        eprintln!("{e:?}");
    }
    config.report();

    let mut state = ipc::AppState::new(config);
    if state.config.backend == BackendKind::Rest && !state.connect_rest() {
        warn!("hosted backend not configured; data methods will answer no_workspace");
    }
    if let Some(path) = state.config.workspace.clone() {
        if let Err(e) = state.open_workspace(&path) {
            error!(workspace = %path.to_string_lossy(), error = ?e, "failed to open workspace");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() },
                });
                let _ = writeln!(stdout, "{resp}");
                let _ = stdout.flush();
                continue;
            }
        };

        debug!(id = %req.id, method = %req.method, "request");
        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
