use chrono::Local;
use serde_json::json;

use crate::behaviors;
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{required_str, signed_in_store, str_param, transaction_json};
use crate::ipc::types::{AppState, Request};
use crate::model::AwardBehavior;

const DEFAULT_ACTIVITY_LIMIT: usize = 20;

fn handle_behaviors_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let mode = state.theme.mode(Local::now().date_naive());
    let list: Vec<serde_json::Value> = behaviors::CATALOG
        .iter()
        .map(|b| {
            json!({
                "id": b.id,
                "name": b.name,
                "icon": b.icon_for(mode),
                "points": b.points,
                "category": b.category,
            })
        })
        .collect();
    ok(&req.id, json!({ "behaviors": list, "theme": mode }))
}

/// `behaviorId` picks from the catalog (icon follows the theme); otherwise a
/// custom behavior is spelled out in full.
fn award_behavior(state: &AppState, req: &Request) -> Result<AwardBehavior, serde_json::Value> {
    if let Some(id) = str_param(req, "behaviorId") {
        let Some(b) = behaviors::find(id) else {
            return Err(err(
                &req.id,
                "not_found",
                format!("unknown behavior: {id}"),
                Some(json!({ "entity": "behavior", "id": id })),
            ));
        };
        return Ok(b.award(state.theme.mode(Local::now().date_naive())));
    }
    let name = required_str(req, "behaviorName")?;
    if req.params.get("points").is_none() {
        if let Some(b) = behaviors::find_by_name(name) {
            return Ok(b.award(state.theme.mode(Local::now().date_naive())));
        }
    }
    let icon = required_str(req, "behaviorIcon")?;
    let Some(points) = req.params.get("points").and_then(|v| v.as_i64()) else {
        return Err(err(&req.id, "bad_params", "missing points", None));
    };
    Ok(AwardBehavior {
        name: name.to_string(),
        icon: icon.to_string(),
        points,
    })
}

fn student_ids(req: &Request) -> Result<Vec<String>, serde_json::Value> {
    if let Some(id) = str_param(req, "studentId") {
        return Ok(vec![id.to_string()]);
    }
    let Some(arr) = req.params.get("studentIds").and_then(|v| v.as_array()) else {
        return Err(err(&req.id, "bad_params", "missing studentId or studentIds", None));
    };
    let mut ids = Vec::with_capacity(arr.len());
    for v in arr {
        let Some(s) = v.as_str() else {
            return Err(err(&req.id, "bad_params", "studentIds must be strings", None));
        };
        ids.push(s.to_string());
    }
    Ok(ids)
}

fn handle_award(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let ids = match student_ids(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let behavior = match award_behavior(state, req) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let note = str_param(req, "note");

    let store = match signed_in_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let outcome = match store.record_transaction(class_id, &ids, &behavior, note) {
        Ok(o) => o,
        Err(e) => return store_err(&req.id, &e),
    };

    let summary = match store.summary(class_id) {
        Ok(s) => s,
        Err(e) => return store_err(&req.id, &e),
    };
    let students: Vec<_> = summary
        .students
        .iter()
        .filter(|s| ids.contains(&s.student_id))
        .collect();
    let transactions: Vec<serde_json::Value> =
        outcome.transactions.iter().map(transaction_json).collect();
    ok(
        &req.id,
        json!({
            "transactions": transactions,
            "batchId": outcome.batch_id,
            "students": students,
            "classTotals": summary.totals,
            "classDisplay": summary.display,
            "undo": store.undo_status(),
        }),
    )
}

fn handle_totals(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let store = match signed_in_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match store.summary(class_id) {
        Ok(summary) => ok(&req.id, json!(summary)),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_activity(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let limit = req
        .params
        .get("limit")
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT);
    let store = match signed_in_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match store.activity(class_id, limit) {
        Ok(entries) => ok(&req.id, json!({ "entries": entries })),
        Err(e) => store_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "behaviors.list" => Some(handle_behaviors_list(state, req)),
        "points.award" => Some(handle_award(state, req)),
        "points.totals" => Some(handle_totals(state, req)),
        "points.activity" => Some(handle_activity(state, req)),
        _ => None,
    }
}
