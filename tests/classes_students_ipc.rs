use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_classpointsd");
    let mut child = Command::new(exe)
        .env_remove("CLASSPOINTS_WORKSPACE")
        .env_remove("CLASSPOINTS_BACKEND")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn classpointsd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

fn signed_in_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) -> PathBuf {
    let workspace = temp_dir(prefix);
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "signup",
        "auth.signUp",
        json!({ "email": "teacher@example.com", "password": "password123" }),
    );
    workspace
}

#[test]
fn creating_a_classroom_makes_it_active() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = signed_in_workspace(&mut stdin, &mut reader, "classpoints-classes-create");

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "classes.create",
        json!({ "name": "  Test Classroom  " }),
    );
    assert_eq!(first["class"]["name"].as_str(), Some("Test Classroom"));
    assert_eq!(first["class"]["active"].as_bool(), Some(true));
    assert_eq!(first["class"]["display"].as_str(), Some("0"));
    let first_id = first["class"]["id"].as_str().expect("id").to_string();

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "name": "Room 12" }),
    );
    let second_id = second["class"]["id"].as_str().expect("id").to_string();

    let listed = request_ok(&mut stdin, &mut reader, "3", "classes.list", json!({}));
    assert_eq!(listed["activeClassId"].as_str(), Some(second_id.as_str()));
    let names: Vec<&str> = listed["classes"]
        .as_array()
        .expect("classes")
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Test Classroom", "Room 12"]);

    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "classes.select",
        json!({ "classId": first_id }),
    );
    assert_eq!(selected["class"]["active"].as_bool(), Some(true));
    let state = request_ok(&mut stdin, &mut reader, "5", "state.get", json!({}));
    assert_eq!(state["activeClassId"].as_str(), Some(first_id.as_str()));
    assert!(state["error"].is_null());
}

#[test]
fn classroom_names_are_validated() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = signed_in_workspace(&mut stdin, &mut reader, "classpoints-classes-validate");

    let blank = request(
        &mut stdin,
        &mut reader,
        "1",
        "classes.create",
        json!({ "name": "   " }),
    );
    assert_eq!(error_code(&blank), Some("bad_params"));
    let missing = request(&mut stdin, &mut reader, "2", "classes.create", json!({}));
    assert_eq!(error_code(&missing), Some("bad_params"));
    let listed = request_ok(&mut stdin, &mut reader, "3", "classes.list", json!({}));
    assert_eq!(listed["classes"].as_array().map(|a| a.len()), Some(0));

    let unknown = request(
        &mut stdin,
        &mut reader,
        "4",
        "classes.rename",
        json!({ "classId": "missing", "name": "X" }),
    );
    assert_eq!(error_code(&unknown), Some("not_found"));
}

#[test]
fn rename_and_delete_classroom_survive_reload() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = signed_in_workspace(&mut stdin, &mut reader, "classpoints-classes-rename");

    let keep = request_ok(&mut stdin, &mut reader, "1", "classes.create", json!({ "name": "Keep" }));
    let keep_id = keep["class"]["id"].as_str().expect("id").to_string();
    let drop = request_ok(&mut stdin, &mut reader, "2", "classes.create", json!({ "name": "Drop" }));
    let drop_id = drop["class"]["id"].as_str().expect("id").to_string();
    let kid = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "classId": drop_id, "name": "Kid" }),
    );
    let kid_id = kid["student"]["id"].as_str().expect("id").to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "points.award",
        json!({ "classId": drop_id, "studentId": kid_id, "behaviorId": "kindness" }),
    );

    let renamed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "classes.rename",
        json!({ "classId": keep_id, "name": " Kept " }),
    );
    assert_eq!(renamed["class"]["name"].as_str(), Some("Kept"));

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "classes.delete",
        json!({ "classId": drop_id }),
    );
    assert_eq!(deleted["activeClassId"].as_str(), Some(keep_id.as_str()));
    let undo = request_ok(&mut stdin, &mut reader, "7", "undo.status", json!({}));
    assert_eq!(undo["available"].as_bool(), Some(false));

    let _ = request_ok(&mut stdin, &mut reader, "8", "state.retry", json!({}));
    let listed = request_ok(&mut stdin, &mut reader, "9", "classes.list", json!({}));
    let classes = listed["classes"].as_array().expect("classes");
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0]["name"].as_str(), Some("Kept"));
}

#[test]
fn students_crud_keeps_insertion_order() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = signed_in_workspace(&mut stdin, &mut reader, "classpoints-students-crud");

    let class = request_ok(&mut stdin, &mut reader, "1", "classes.create", json!({ "name": "Room" }));
    let class_id = class["class"]["id"].as_str().expect("id").to_string();

    let mut ids = Vec::new();
    for (i, name) in ["Alice", "Bob", "Carmen"].iter().enumerate() {
        let created = request_ok(
            &mut stdin,
            &mut reader,
            &format!("s{i}"),
            "students.create",
            json!({ "classId": class_id, "name": name }),
        );
        assert_eq!(created["student"]["classId"].as_str(), Some(class_id.as_str()));
        ids.push(created["student"]["id"].as_str().expect("id").to_string());
        // Reload orders by created_at, which has millisecond resolution.
        std::thread::sleep(std::time::Duration::from_millis(5));
    }

    let blank = request(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({ "classId": class_id, "name": "" }),
    );
    assert_eq!(error_code(&blank), Some("bad_params"));

    let renamed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.update",
        json!({ "classId": class_id, "studentId": ids[1], "name": "Bobby" }),
    );
    assert_eq!(renamed["student"]["name"].as_str(), Some("Bobby"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.delete",
        json!({ "classId": class_id, "studentId": ids[0] }),
    );
    let gone = request(
        &mut stdin,
        &mut reader,
        "5",
        "students.delete",
        json!({ "classId": class_id, "studentId": ids[0] }),
    );
    assert_eq!(error_code(&gone), Some("not_found"));

    let _ = request_ok(&mut stdin, &mut reader, "6", "state.retry", json!({}));
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.list",
        json!({ "classId": class_id }),
    );
    let names: Vec<&str> = listed["students"]
        .as_array()
        .expect("students")
        .iter()
        .filter_map(|s| s["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Bobby", "Carmen"]);
}
