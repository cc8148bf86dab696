use crate::ipc::error::{ok, store_err};
use crate::ipc::helpers::signed_in_store;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let user = state.session.current_user().cloned();
    let store = match signed_in_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    ok(
        &req.id,
        json!({
            "user": user,
            "backend": store.backend_label(),
            "activeClassId": store.active_classroom_id(),
            "classCount": store.classrooms().len(),
            "error": store.last_error(),
        }),
    )
}

fn handle_retry(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match signed_in_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match store.retry() {
        Ok(()) => ok(
            &req.id,
            json!({
                "ok": true,
                "activeClassId": store.active_classroom_id(),
                "classCount": store.classrooms().len(),
            }),
        ),
        Err(e) => store_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "state.get" => Some(handle_get(state, req)),
        "state.retry" => Some(handle_retry(state, req)),
        _ => None,
    }
}
