use chrono::Local;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use crate::theme::{ThemeMode, ThemeState};
use serde_json::json;

fn reply(req: &Request, result: anyhow::Result<ThemeState>) -> serde_json::Value {
    match result {
        Ok(theme) => ok(&req.id, json!(theme)),
        Err(e) => err(&req.id, "prefs_failed", format!("{e:?}"), None),
    }
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!(state.theme.state(Local::now().date_naive())))
}

fn handle_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let raw = match required_str(req, "mode") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(mode) = ThemeMode::parse(raw) else {
        return err(
            &req.id,
            "bad_params",
            format!("unknown theme mode: {raw}"),
            Some(json!({ "allowed": ["normal", "christmas"] })),
        );
    };
    let today = Local::now().date_naive();
    reply(req, state.theme.set(mode, today))
}

fn handle_toggle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let today = Local::now().date_naive();
    reply(req, state.theme.toggle(today))
}

fn handle_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    let today = Local::now().date_naive();
    reply(req, state.theme.reset(today))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "theme.get" => Some(handle_get(state, req)),
        "theme.set" => Some(handle_set(state, req)),
        "theme.toggle" => Some(handle_toggle(state, req)),
        "theme.reset" => Some(handle_reset(state, req)),
        _ => None,
    }
}
