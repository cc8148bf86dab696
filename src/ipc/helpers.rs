use serde_json::{json, Value};

use crate::calc;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::model::{Classroom, PointTransaction, Student};
use crate::store::AppStore;

pub fn str_param<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

/// Required string param; the error response names it.
pub fn required_str<'a>(req: &'a Request, key: &str) -> Result<&'a str, Value> {
    str_param(req, key).ok_or_else(|| err(&req.id, "bad_params", format!("missing {key}"), None))
}

/// Store of the signed-in user, or the error response to send instead.
pub fn signed_in_store<'a>(state: &'a mut AppState, req: &Request) -> Result<&'a mut AppStore, Value> {
    if state.session.current_user().is_none() {
        if state.store.is_none() {
            return Err(err(&req.id, "no_workspace", "select a workspace first", None));
        }
        return Err(err(&req.id, "not_authenticated", "sign in first", None));
    }
    state
        .store
        .as_mut()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn student_json(s: &Student) -> Value {
    json!({
        "id": s.id,
        "classId": s.classroom_id,
        "name": s.name,
        "createdAt": s.created_at,
    })
}

pub fn classroom_json(c: &Classroom, active: Option<&str>) -> Value {
    json!({
        "id": c.row.id,
        "name": c.row.name,
        "createdAt": c.row.created_at,
        "studentCount": c.students.len(),
        "totals": c.totals,
        "display": calc::format_points(c.totals.total),
        "active": active == Some(c.id()),
    })
}

pub fn transaction_json(t: &PointTransaction) -> Value {
    json!({
        "id": t.id,
        "classId": t.classroom_id,
        "studentId": t.student_id,
        "behaviorName": t.behavior_name,
        "behaviorIcon": t.behavior_icon,
        "points": t.points,
        "createdAt": t.created_at,
        "batchId": t.batch_id,
        "note": t.note,
    })
}
