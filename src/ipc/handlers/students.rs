use crate::ipc::error::{ok, store_err};
use crate::ipc::helpers::{required_str, signed_in_store, student_json};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let store = match signed_in_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match store.classroom(class_id) {
        Ok(c) => {
            let students: Vec<serde_json::Value> = c.students.iter().map(student_json).collect();
            ok(&req.id, json!({ "students": students }))
        }
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    match store.add_student(class_id, name) {
        Ok(s) => ok(&req.id, json!({ "student": student_json(&s) })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
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
    match store.rename_student(class_id, student_id, name) {
        Ok(s) => ok(&req.id, json!({ "student": student_json(&s) })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let store = match signed_in_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match store.remove_student(class_id, student_id) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => store_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_list(state, req)),
        "students.create" => Some(handle_create(state, req)),
        "students.update" => Some(handle_update(state, req)),
        "students.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
