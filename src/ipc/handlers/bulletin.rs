use crate::bulletin::{
    self, BulletinSession, DataSnapshot, LayoutError, SubstitutionEntry,
};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::paths;
use crate::render::{BulletinRenderer, DocxRenderer};
use chrono::NaiveDate;
use serde_json::json;

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn opt_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn layout_err(req: &Request, e: LayoutError) -> serde_json::Value {
    err(&req.id, &e.code, e.message, e.details)
}

fn session_mut<'a>(
    state: &'a mut AppState,
    req: &Request,
) -> Result<&'a mut BulletinSession, serde_json::Value> {
    state
        .session
        .as_mut()
        .ok_or_else(|| err(&req.id, "no_bulletin", "open a bulletin first", None))
}

fn saturday_json(session: &BulletinSession) -> serde_json::Value {
    let base = session.base_date.format("%d.%m.%Y").to_string();
    match session.saturday_schedule_day() {
        Some(day) => json!({
            "applicable": true,
            "scheduleDay": day.name_uk(),
            "baseDate": base
        }),
        None => json!({ "applicable": false, "baseDate": base }),
    }
}

/// Base-date resolution order: explicit user text, then the default for the
/// parsed target date, then September 1 of the academic-year label. User
/// text that fails to parse silently falls through to the defaults.
fn resolve_base_date(
    base_text: Option<&str>,
    target: Option<NaiveDate>,
    academic_year: &str,
) -> Option<NaiveDate> {
    base_text
        .and_then(bulletin::parse_base_date)
        .or_else(|| target.map(bulletin::default_base_date))
        .or_else(|| {
            let year = bulletin::academic_year_start(academic_year)?;
            let september_first = NaiveDate::from_ymd_opt(year, 9, 1)?;
            Some(bulletin::align_to_monday(september_first))
        })
}

fn handle_bulletin_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let date_text = match required_str(req, "dateText") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    let weekday = match required_str(req, "weekday") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    let week_type = match required_str(req, "weekType") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    let academic_year = match required_str(req, "academicYear") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    if date_text.is_empty() || weekday.is_empty() || academic_year.is_empty() {
        return err(
            &req.id,
            "bad_params",
            "dateText, weekday and academicYear must not be empty",
            None,
        );
    }

    let target = bulletin::parse_date_text(&date_text, &academic_year);
    let base_text = opt_str(req, "baseDate");
    let Some(base_date) = resolve_base_date(base_text.as_deref(), target, &academic_year) else {
        return err(
            &req.id,
            "bad_params",
            "academicYear must start with a four-digit year",
            None,
        );
    };

    let snapshot = match state.db.as_ref() {
        Some(conn) => db::load_snapshot(conn),
        None => DataSnapshot::unavailable(),
    };
    let degraded = snapshot.degraded;

    let session = BulletinSession {
        date_text,
        weekday,
        week_type,
        duty_group: opt_str(req, "dutyGroup").unwrap_or_default(),
        duty_teacher: opt_str(req, "dutyTeacher").unwrap_or_default(),
        dorm_teacher: opt_str(req, "dormTeacher").unwrap_or_default(),
        academic_year,
        approver_title: opt_str(req, "approverTitle"),
        approver_name: opt_str(req, "approverName"),
        base_date,
        edu_practice: String::new(),
        practice_type: "Виробнича".to_string(),
        practice_info: String::new(),
        entries: Vec::new(),
        snapshot,
    };
    let saturday = saturday_json(&session);
    state.session = Some(session);

    ok(&req.id, json!({ "degraded": degraded, "saturday": saturday }))
}

fn handle_bulletin_add_entry(state: &mut AppState, req: &Request) -> serde_json::Value {
    let group = match required_str(req, "group") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    let lesson = match required_str(req, "lesson") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };

    if group.is_empty() {
        return err(&req.id, "empty_group", "group must not be empty", None);
    }
    let lesson_label = match bulletin::parse_lesson_spec(&lesson) {
        Ok(label) => label,
        Err(e) => return layout_err(req, e),
    };

    let entry = SubstitutionEntry {
        group,
        lesson_spec: lesson,
        lesson_label,
        discipline: opt_str(req, "discipline").unwrap_or_default(),
        room: opt_str(req, "room").unwrap_or_default(),
    };
    session.entries.push(entry.clone());

    ok(
        &req.id,
        json!({
            "index": session.entries.len() - 1,
            "count": session.entries.len(),
            "entry": entry
        }),
    )
}

fn handle_bulletin_remove_entry(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(index) = req.params.get("index").and_then(|v| v.as_u64()) else {
        return err(&req.id, "bad_params", "missing index", None);
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };

    let index = index as usize;
    if index >= session.entries.len() {
        return err(
            &req.id,
            "bad_params",
            "index out of range",
            Some(json!({ "index": index, "count": session.entries.len() })),
        );
    }
    let removed = session.entries.remove(index);

    ok(
        &req.id,
        json!({ "removed": removed, "count": session.entries.len() }),
    )
}

fn handle_bulletin_entries(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({ "entries": session.entries, "count": session.entries.len() }),
    )
}

fn handle_bulletin_set_practice(state: &mut AppState, req: &Request) -> serde_json::Value {
    let edu_practice = opt_str(req, "eduPractice");
    let practice_type = opt_str(req, "practiceType");
    let practice_info = opt_str(req, "practiceInfo");
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };

    if let Some(v) = edu_practice {
        session.edu_practice = v;
    }
    if let Some(v) = practice_type {
        session.practice_type = v;
    }
    if let Some(v) = practice_info {
        session.practice_info = v;
    }

    ok(
        &req.id,
        json!({
            "eduPractice": session.edu_practice,
            "practiceType": session.practice_type,
            "practiceInfo": session.practice_info
        }),
    )
}

fn handle_bulletin_saturday_info(state: &mut AppState, req: &Request) -> serde_json::Value {
    let base_text = opt_str(req, "baseDate");
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };

    // Malformed base-date text keeps the current cycle anchor.
    if let Some(parsed) = base_text.as_deref().and_then(bulletin::parse_base_date) {
        session.base_date = parsed;
    }

    ok(&req.id, saturday_json(session))
}

fn handle_bulletin_refresh_data(state: &mut AppState, req: &Request) -> serde_json::Value {
    let snapshot = match state.db.as_ref() {
        Some(conn) => db::load_snapshot(conn),
        None => DataSnapshot::unavailable(),
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };

    log::info!(
        "bulletin snapshot refreshed: {} departments, {} groups{}",
        snapshot.departments.len(),
        snapshot.group_departments.len(),
        if snapshot.degraded { " (degraded)" } else { "" }
    );
    let result = json!({
        "degraded": snapshot.degraded,
        "departmentCount": snapshot.departments.len(),
        "groupCount": snapshot.group_departments.len()
    });
    session.snapshot = snapshot;

    ok(&req.id, result)
}

fn handle_bulletin_grid_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match bulletin::plan_bulletin(session) {
        Ok(plan) => ok(&req.id, json!(plan)),
        Err(e) => layout_err(req, e),
    }
}

fn handle_bulletin_generate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let root_dir = opt_str(req, "rootDir")
        .map(std::path::PathBuf::from)
        .or_else(|| state.workspace.as_ref().map(|w| w.join("Zaminy")));
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };

    if session.entries.is_empty() {
        return err(
            &req.id,
            "no_entries",
            "add at least one substitution before generating",
            None,
        );
    }
    let Some(root_dir) = root_dir else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let plan = match bulletin::plan_bulletin(session) {
        Ok(plan) => plan,
        Err(e) => return layout_err(req, e),
    };

    let path = match paths::resolve_output_path(&root_dir, &session.academic_year, &session.date_text)
    {
        Ok(p) => p,
        Err(e) => return err(&req.id, "io_failed", format!("{e:#}"), None),
    };

    if let Err(e) = DocxRenderer.render(&plan, &path) {
        return err(&req.id, "render_failed", format!("{e:#}"), None);
    }
    log::info!("bulletin written to {}", path.to_string_lossy());

    ok(
        &req.id,
        json!({
            "path": path.to_string_lossy(),
            "rowCount": plan.grid.rows.len()
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "bulletin.open" => Some(handle_bulletin_open(state, req)),
        "bulletin.addEntry" => Some(handle_bulletin_add_entry(state, req)),
        "bulletin.removeEntry" => Some(handle_bulletin_remove_entry(state, req)),
        "bulletin.entries" => Some(handle_bulletin_entries(state, req)),
        "bulletin.setPractice" => Some(handle_bulletin_set_practice(state, req)),
        "bulletin.saturdayInfo" => Some(handle_bulletin_saturday_info(state, req)),
        "bulletin.refreshData" => Some(handle_bulletin_refresh_data(state, req)),
        "bulletin.gridModel" => Some(handle_bulletin_grid_model(state, req)),
        "bulletin.generate" => Some(handle_bulletin_generate(state, req)),
        _ => None,
    }
}
