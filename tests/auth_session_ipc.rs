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

#[test]
fn sign_up_sign_out_and_sign_in_again() {
    let workspace = temp_dir("classpoints-auth-flow");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let nobody = request_ok(&mut stdin, &mut reader, "2", "auth.session", json!({}));
    assert!(nobody["user"].is_null());

    let signed_up = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "auth.signUp",
        json!({ "email": " Teacher@Example.com ", "password": "password123" }),
    );
    assert_eq!(signed_up["user"]["email"].as_str(), Some("teacher@example.com"));
    let user_id = signed_up["user"]["id"].as_str().expect("user id").to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "classes.create",
        json!({ "name": "Period 1" }),
    );
    let _ = request_ok(&mut stdin, &mut reader, "5", "auth.signOut", json!({}));
    let after = request_ok(&mut stdin, &mut reader, "6", "auth.session", json!({}));
    assert!(after["user"].is_null());
    let guarded = request(&mut stdin, &mut reader, "7", "classes.list", json!({}));
    assert_eq!(error_code(&guarded), Some("not_authenticated"));

    let wrong = request(
        &mut stdin,
        &mut reader,
        "8",
        "auth.signIn",
        json!({ "email": "teacher@example.com", "password": "wrong-password" }),
    );
    assert_eq!(error_code(&wrong), Some("invalid_credentials"));

    let signed_in = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "auth.signIn",
        json!({ "email": "teacher@example.com", "password": "password123" }),
    );
    assert_eq!(signed_in["user"]["id"].as_str(), Some(user_id.as_str()));
    let listed = request_ok(&mut stdin, &mut reader, "10", "classes.list", json!({}));
    let classes = listed["classes"].as_array().expect("classes");
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0]["name"].as_str(), Some("Period 1"));
    assert_eq!(classes[0]["active"].as_bool(), Some(true));
}

#[test]
fn rejects_bad_credentials_and_duplicate_accounts() {
    let workspace = temp_dir("classpoints-auth-errors");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let short = request(
        &mut stdin,
        &mut reader,
        "2",
        "auth.signUp",
        json!({ "email": "a@example.com", "password": "12345" }),
    );
    assert_eq!(error_code(&short), Some("bad_params"));
    let no_at = request(
        &mut stdin,
        &mut reader,
        "3",
        "auth.signUp",
        json!({ "email": "not-an-email", "password": "password123" }),
    );
    assert_eq!(error_code(&no_at), Some("bad_params"));
    let missing = request(&mut stdin, &mut reader, "4", "auth.signIn", json!({ "email": "a@example.com" }));
    assert_eq!(error_code(&missing), Some("bad_params"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "auth.signUp",
        json!({ "email": "a@example.com", "password": "password123" }),
    );
    let dup = request(
        &mut stdin,
        &mut reader,
        "6",
        "auth.signUp",
        json!({ "email": "A@example.com", "password": "password456" }),
    );
    assert_eq!(error_code(&dup), Some("email_taken"));

    let unknown = request(
        &mut stdin,
        &mut reader,
        "7",
        "auth.signIn",
        json!({ "email": "ghost@example.com", "password": "password123" }),
    );
    assert_eq!(error_code(&unknown), Some("invalid_credentials"));
}

#[test]
fn classrooms_are_scoped_to_their_owner() {
    let workspace = temp_dir("classpoints-auth-scope");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "auth.signUp",
        json!({ "email": "first@example.com", "password": "password123" }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "classes.create",
        json!({ "name": "Mine" }),
    );
    let class_id = created["class"]["id"].as_str().expect("class id").to_string();
    let _ = request_ok(&mut stdin, &mut reader, "4", "auth.signOut", json!({}));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "auth.signUp",
        json!({ "email": "second@example.com", "password": "password123" }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "6", "classes.list", json!({}));
    assert_eq!(listed["classes"].as_array().map(|a| a.len()), Some(0));
    assert!(listed["activeClassId"].is_null());

    let foreign = request(
        &mut stdin,
        &mut reader,
        "7",
        "students.list",
        json!({ "classId": class_id }),
    );
    assert_eq!(error_code(&foreign), Some("not_found"));
}
