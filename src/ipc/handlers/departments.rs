use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn handle_departments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "departments": [] }));
    };

    // Group counts ride along so the UI can show which departments are live.
    let mut stmt = match conn.prepare(
        "SELECT
           d.id,
           d.name,
           d.sort_order,
           d.is_general,
           (SELECT COUNT(*) FROM groups g WHERE g.department_id = d.id) AS group_count
         FROM departments d
         ORDER BY d.sort_order, d.id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            let sort_order: i64 = row.get(2)?;
            let is_general: i64 = row.get(3)?;
            let group_count: i64 = row.get(4)?;
            Ok(json!({
                "id": id,
                "name": name,
                "sortOrder": sort_order,
                "isGeneral": is_general != 0,
                "hasGroups": group_count > 0,
                "groupCount": group_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(departments) => ok(&req.id, json!({ "departments": departments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_departments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match required_str(req, "name") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }
    let is_general = req
        .params
        .get("isGeneral")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let sort_order = match req.params.get("sortOrder").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => {
            match conn.query_row(
                "SELECT COALESCE(MAX(sort_order), 0) + 1 FROM departments",
                [],
                |r| r.get::<_, i64>(0),
            ) {
                Ok(v) => v,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            }
        }
    };

    if let Err(e) = conn.execute(
        "INSERT INTO departments(name, sort_order, is_general) VALUES(?, ?, ?)",
        (&name, sort_order, is_general as i64),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "departments" })),
        );
    }

    ok(
        &req.id,
        json!({
            "departmentId": conn.last_insert_rowid(),
            "name": name,
            "sortOrder": sort_order,
            "isGeneral": is_general
        }),
    )
}

fn handle_departments_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(department_id) = req.params.get("departmentId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing departmentId", None);
    };

    let group_count: i64 = match conn.query_row(
        "SELECT COUNT(*) FROM groups WHERE department_id = ?",
        [department_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if group_count > 0 {
        return err(
            &req.id,
            "department_has_groups",
            "delete or reassign the department's groups first",
            Some(json!({ "groupCount": group_count })),
        );
    }

    match conn.execute("DELETE FROM departments WHERE id = ?", [department_id]) {
        Ok(0) => err(&req.id, "not_found", "department not found", None),
        Ok(_) => ok(&req.id, json!({ "departmentId": department_id })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_groups_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "groups": [] }));
    };

    let department_id = req.params.get("departmentId").and_then(|v| v.as_i64());
    let result = match department_id {
        Some(dept_id) => {
            let mut stmt = match conn.prepare(
                "SELECT id, department_id, name FROM groups
                 WHERE department_id = ? ORDER BY name",
            ) {
                Ok(s) => s,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            stmt.query_map([dept_id], group_row_json)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        }
        None => {
            let mut stmt =
                match conn.prepare("SELECT id, department_id, name FROM groups ORDER BY name") {
                    Ok(s) => s,
                    Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
                };
            stmt.query_map([], group_row_json)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        }
    };

    match result {
        Ok(groups) => ok(&req.id, json!({ "groups": groups })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn group_row_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let id: String = row.get(0)?;
    let department_id: i64 = row.get(1)?;
    let name: String = row.get(2)?;
    Ok(json!({
        "id": id,
        "departmentId": department_id,
        "name": name
    }))
}

fn handle_groups_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(department_id) = req.params.get("departmentId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing departmentId", None);
    };
    let name = match required_str(req, "name") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }

    let exists: Option<i64> = match conn
        .query_row(
            "SELECT id FROM departments WHERE id = ?",
            [department_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "department not found", None);
    }

    let group_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO groups(id, department_id, name) VALUES(?, ?, ?)",
        (&group_id, department_id, &name),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "groups" })),
        );
    }

    ok(
        &req.id,
        json!({ "groupId": group_id, "departmentId": department_id, "name": name }),
    )
}

fn handle_groups_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let group_id = match required_str(req, "groupId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match conn.execute("DELETE FROM groups WHERE id = ?", [&group_id]) {
        Ok(0) => err(&req.id, "not_found", "group not found", None),
        Ok(_) => ok(&req.id, json!({ "groupId": group_id })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "departments.list" => Some(handle_departments_list(state, req)),
        "departments.create" => Some(handle_departments_create(state, req)),
        "departments.delete" => Some(handle_departments_delete(state, req)),
        "groups.list" => Some(handle_groups_list(state, req)),
        "groups.create" => Some(handle_groups_create(state, req)),
        "groups.delete" => Some(handle_groups_delete(state, req)),
        _ => None,
    }
}
