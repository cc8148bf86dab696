use crate::ipc::error::{ok, store_err};
use crate::ipc::helpers::{classroom_json, required_str, signed_in_store};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match signed_in_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let active = store.active_classroom_id();
    let classes: Vec<serde_json::Value> = store
        .classrooms()
        .iter()
        .map(|c| classroom_json(c, active))
        .collect();
    ok(
        &req.id,
        json!({ "classes": classes, "activeClassId": active }),
    )
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let store = match signed_in_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match store.create_classroom(name) {
        Ok(c) => {
            let class = classroom_json(c, Some(c.id()));
            ok(&req.id, json!({ "class": class }))
        }
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_rename(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let store = match signed_in_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let active = store.active_classroom_id().map(str::to_string);
    match store.rename_classroom(class_id, name) {
        Ok(c) => ok(&req.id, json!({ "class": classroom_json(c, active.as_deref()) })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let store = match signed_in_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match store.delete_classroom(class_id) {
        Ok(()) => ok(
            &req.id,
            json!({ "ok": true, "activeClassId": store.active_classroom_id() }),
        ),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let store = match signed_in_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match store.select_classroom(class_id) {
        Ok(c) => ok(&req.id, json!({ "class": classroom_json(c, Some(c.id())) })),
        Err(e) => store_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_list(state, req)),
        "classes.create" => Some(handle_create(state, req)),
        "classes.rename" => Some(handle_rename(state, req)),
        "classes.delete" => Some(handle_delete(state, req)),
        "classes.select" => Some(handle_select(state, req)),
        _ => None,
    }
}
