use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_zaminyd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn zaminyd");
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

#[test]
fn health_and_unknown_methods_route() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health.get("ok").and_then(|v| v.as_bool()), Some(true));
    let result = health.get("result").expect("health result");
    assert!(result.get("version").and_then(|v| v.as_str()).is_some());
    assert!(result.get("workspacePath").expect("field").is_null());

    let unknown = request(&mut stdin, &mut reader, "2", "zaminy.fly", json!({}));
    assert_eq!(unknown.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        unknown.pointer("/error/code").and_then(|v| v.as_str()),
        Some("not_implemented")
    );

    let _ = child.kill();
}

#[test]
fn bulletin_open_without_workspace_degrades() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    // Reference lists are empty, not errors, without a workspace.
    let depts = request(&mut stdin, &mut reader, "1", "departments.list", json!({}));
    assert_eq!(depts.get("ok").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        depts
            .pointer("/result/departments")
            .and_then(|v| v.as_array())
            .map(Vec::len),
        Some(0)
    );

    let open = request(
        &mut stdin,
        &mut reader,
        "2",
        "bulletin.open",
        json!({
            "dateText": "5 вересня, п'ятниця",
            "weekday": "п'ятниця",
            "weekType": "Чисельником",
            "academicYear": "2025-2026"
        }),
    );
    assert_eq!(open.get("ok").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        open.pointer("/result/degraded").and_then(|v| v.as_bool()),
        Some(true)
    );

    // An empty snapshot is a planner-level condition, not a crash.
    let grid = request(&mut stdin, &mut reader, "3", "bulletin.gridModel", json!({}));
    assert_eq!(grid.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        grid.pointer("/error/code").and_then(|v| v.as_str()),
        Some("no_departments")
    );

    let _ = child.kill();
}
