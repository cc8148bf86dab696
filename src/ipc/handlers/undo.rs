use crate::ipc::error::{ok, store_err};
use crate::ipc::helpers::{signed_in_store, str_param};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match signed_in_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    ok(&req.id, json!(store.undo_status()))
}

fn handle_apply(state: &mut AppState, req: &Request) -> serde_json::Value {
    let transaction_id = str_param(req, "transactionId");
    let store = match signed_in_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let outcome = match store.undo(transaction_id) {
        Ok(o) => o,
        Err(e) => return store_err(&req.id, &e),
    };
    let totals = store
        .classroom(&outcome.action.classroom_id)
        .map(|c| c.totals)
        .ok();
    ok(
        &req.id,
        json!({
            "undone": outcome.action,
            "removed": outcome.removed,
            "alreadyRemoved": outcome.already_removed,
            "classTotals": totals,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "undo.status" => Some(handle_status(state, req)),
        "undo.apply" => Some(handle_apply(state, req)),
        _ => None,
    }
}
