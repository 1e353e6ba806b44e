use serde_json::json;
use std::io::{BufRead, BufReader, Read, Write};
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
    serde_json::from_str(line.trim()).expect("parse response json")
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
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn cell_text(row: &serde_json::Value, index: usize) -> &str {
    row.pointer(&format!("/cells/{}/text", index))
        .and_then(|v| v.as_str())
        .unwrap_or("<missing>")
}

#[test]
fn compose_and_generate_a_bulletin() {
    let workspace = temp_dir("zaminyd-bulletin");
    let output_root = temp_dir("zaminyd-output");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let dept = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "departments.create",
        json!({ "name": "Економічне", "sortOrder": 2 }),
    );
    let dept_id = dept
        .get("departmentId")
        .and_then(|v| v.as_i64())
        .expect("department id");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "groups.create",
        json!({ "departmentId": dept_id, "name": "11-Е" }),
    );

    let open = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "bulletin.open",
        json!({
            "dateText": "5 вересня, п'ятниця",
            "weekday": "п'ятниця",
            "weekType": "Чисельником",
            "dutyGroup": "21-П",
            "dutyTeacher": "Петренко О. І.",
            "dormTeacher": "Коваль Н. С.",
            "academicYear": "2025-2026"
        }),
    );
    assert_eq!(open.get("degraded").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        open.pointer("/saturday/applicable").and_then(|v| v.as_bool()),
        Some(false)
    );

    let added = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "bulletin.addEntry",
        json!({ "group": "11-Е", "lesson": "1", "discipline": "Алгебра", "room": "204" }),
    );
    assert_eq!(
        added.pointer("/entry/lessonLabel").and_then(|v| v.as_str()),
        Some("Пара 1")
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "bulletin.addEntry",
        json!({ "group": "11-Е", "lesson": "2", "room": "105" }),
    );

    let rejected = request(
        &mut stdin,
        &mut reader,
        "7",
        "bulletin.addEntry",
        json!({ "group": "11-Е", "lesson": "9" }),
    );
    assert_eq!(
        rejected.pointer("/error/code").and_then(|v| v.as_str()),
        Some("lesson_out_of_range")
    );

    // A group without a department mapping is accepted into the session and
    // silently dropped from the layout.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "bulletin.addEntry",
        json!({ "group": "99-X", "lesson": "3" }),
    );

    let entries = request_ok(&mut stdin, &mut reader, "9", "bulletin.entries", json!({}));
    assert_eq!(entries.get("count").and_then(|v| v.as_u64()), Some(3));

    // Mistyped entries are removed by position.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9b",
        "bulletin.addEntry",
        json!({ "group": "11-Е", "lesson": "4" }),
    );
    let removed = request_ok(
        &mut stdin,
        &mut reader,
        "9c",
        "bulletin.removeEntry",
        json!({ "index": 3 }),
    );
    assert_eq!(removed.get("count").and_then(|v| v.as_u64()), Some(3));

    // Practice fields are stored with the session; the document still ships
    // placeholder dashes below the practice headers.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9d",
        "bulletin.setPractice",
        json!({ "eduPractice": "31-Б у майстернях", "practiceType": "Переддипломна" }),
    );

    let plan = request_ok(&mut stdin, &mut reader, "10", "bulletin.gridModel", json!({}));
    let rows = plan
        .pointer("/grid/rows")
        .and_then(|v| v.as_array())
        .expect("grid rows");
    // header + 2 data rows + practice header/info + 3 duty rows
    assert_eq!(rows.len(), 8);
    assert_eq!(cell_text(&rows[0], 0), "Економічне");
    assert_eq!(cell_text(&rows[1], 0), "11-Е");
    assert_eq!(cell_text(&rows[1], 1), "1");
    assert_eq!(cell_text(&rows[1], 2), "Алгебра, ауд. 204");
    assert_eq!(cell_text(&rows[2], 0), "");
    assert_eq!(cell_text(&rows[2], 1), "2");
    assert_eq!(cell_text(&rows[2], 2), "ауд. 105");
    assert_eq!(cell_text(&rows[3], 0), "НАВЧАЛЬНА ПРАКТИКА");
    assert_eq!(cell_text(&rows[4], 0), "--------");
    assert_eq!(cell_text(&rows[7], 0), "Черговий викладач у гуртожитках: Коваль Н. С.");
    for row in rows {
        let span: u64 = row
            .get("cells")
            .and_then(|v| v.as_array())
            .expect("cells")
            .iter()
            .filter_map(|c| c.get("span").and_then(|v| v.as_u64()))
            .sum();
        assert_eq!(span, 6);
    }
    assert_eq!(
        plan.pointer("/heading/dateLines/0").and_then(|v| v.as_str()),
        Some("на 5 вересня, п'ятниця")
    );

    let generated = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "bulletin.generate",
        json!({ "rootDir": output_root.to_string_lossy() }),
    );
    let path = generated
        .get("path")
        .and_then(|v| v.as_str())
        .expect("output path")
        .to_string();
    assert!(path.ends_with("5 вересня.docx"), "unexpected path {}", path);
    let expected = output_root
        .join("2025-2026")
        .join("09-Вересень")
        .join("5 вересня.docx");
    assert_eq!(PathBuf::from(&path), expected);

    let mut signature = [0u8; 4];
    std::fs::File::open(&expected)
        .expect("open generated bulletin")
        .read_exact(&mut signature)
        .expect("read signature");
    assert_eq!(signature, [0x50, 0x4B, 0x03, 0x04]);

    // Regenerating for the same date overwrites silently.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "bulletin.generate",
        json!({ "rootDir": output_root.to_string_lossy() }),
    );
    assert_eq!(again.get("path").and_then(|v| v.as_str()), Some(path.as_str()));

    let _ = child.kill();
}

#[test]
fn saturday_session_reports_the_rotation_day() {
    let workspace = temp_dir("zaminyd-saturday");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

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
        "departments.create",
        json!({ "name": "Економічне" }),
    );

    let open = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "bulletin.open",
        json!({
            "dateText": "6 вересня, субота",
            "weekday": "субота",
            "weekType": "Чисельником",
            "academicYear": "2025-2026"
        }),
    );
    // 2025-09-01 is the default base Monday; the first Saturday follows it.
    assert_eq!(
        open.pointer("/saturday/applicable").and_then(|v| v.as_bool()),
        Some(true)
    );
    assert_eq!(
        open.pointer("/saturday/scheduleDay").and_then(|v| v.as_str()),
        Some("понеділок")
    );
    assert_eq!(
        open.pointer("/saturday/baseDate").and_then(|v| v.as_str()),
        Some("01.09.2025")
    );

    // Re-anchoring the cycle one week later puts this Saturday into the
    // previous cycle week, which maps to Friday.
    let info = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "bulletin.saturdayInfo",
        json!({ "baseDate": "08.09.2025" }),
    );
    assert_eq!(
        info.get("scheduleDay").and_then(|v| v.as_str()),
        Some("п'ятниця")
    );

    // Malformed base-date text falls back to the previous anchor.
    let fallback = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "bulletin.saturdayInfo",
        json!({ "baseDate": "понеділок колись" }),
    );
    assert_eq!(
        fallback.get("baseDate").and_then(|v| v.as_str()),
        Some("08.09.2025")
    );

    let _ = child.kill();
}
