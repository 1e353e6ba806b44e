use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

// The three flat catalogs (teachers, disciplines, rooms) share one shape:
// a uuid id plus a unique display value.
struct Catalog {
    table: &'static str,
    column: &'static str,
    wire_key: &'static str,
    id_key: &'static str,
    list_key: &'static str,
}

const TEACHERS: Catalog = Catalog {
    table: "teachers",
    column: "full_name",
    wire_key: "fullName",
    id_key: "teacherId",
    list_key: "teachers",
};

const DISCIPLINES: Catalog = Catalog {
    table: "disciplines",
    column: "name",
    wire_key: "name",
    id_key: "disciplineId",
    list_key: "disciplines",
};

const ROOMS: Catalog = Catalog {
    table: "rooms",
    column: "number",
    wire_key: "number",
    id_key: "roomId",
    list_key: "rooms",
};

fn catalog_list(conn: &Connection, req: &Request, catalog: &Catalog) -> serde_json::Value {
    let sql = format!(
        "SELECT id, {} FROM {} ORDER BY {}",
        catalog.column, catalog.table, catalog.column
    );
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let value: String = row.get(1)?;
            Ok(json!({ "id": id, (catalog.wire_key): value }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(items) => ok(&req.id, json!({ (catalog.list_key): items })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn catalog_create(conn: &Connection, req: &Request, catalog: &Catalog) -> serde_json::Value {
    let value = match req.params.get(catalog.wire_key).and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => {
            return err(
                &req.id,
                "bad_params",
                format!("missing {}", catalog.wire_key),
                None,
            )
        }
    };
    if value.is_empty() {
        return err(
            &req.id,
            "bad_params",
            format!("{} must not be empty", catalog.wire_key),
            None,
        );
    }

    let id = Uuid::new_v4().to_string();
    let sql = format!(
        "INSERT INTO {}(id, {}) VALUES(?, ?)",
        catalog.table, catalog.column
    );
    if let Err(e) = conn.execute(&sql, (&id, &value)) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": catalog.table })),
        );
    }

    ok(&req.id, json!({ (catalog.id_key): id, (catalog.wire_key): value }))
}

fn catalog_delete(conn: &Connection, req: &Request, catalog: &Catalog) -> serde_json::Value {
    let id = match req.params.get(catalog.id_key).and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => {
            return err(
                &req.id,
                "bad_params",
                format!("missing {}", catalog.id_key),
                None,
            )
        }
    };

    let sql = format!("DELETE FROM {} WHERE id = ?", catalog.table);
    match conn.execute(&sql, [&id]) {
        Ok(0) => err(&req.id, "not_found", "entry not found", None),
        Ok(_) => ok(&req.id, json!({ (catalog.id_key): id })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn dispatch(
    state: &mut AppState,
    req: &Request,
    catalog: &Catalog,
    action: &str,
) -> serde_json::Value {
    if action == "list" {
        let Some(conn) = state.db.as_ref() else {
            return ok(&req.id, json!({ (catalog.list_key): [] }));
        };
        return catalog_list(conn, req, catalog);
    }

    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match action {
        "create" => catalog_create(conn, req, catalog),
        _ => catalog_delete(conn, req, catalog),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let (catalog, action) = match req.method.as_str() {
        "teachers.list" => (&TEACHERS, "list"),
        "teachers.create" => (&TEACHERS, "create"),
        "teachers.delete" => (&TEACHERS, "delete"),
        "disciplines.list" => (&DISCIPLINES, "list"),
        "disciplines.create" => (&DISCIPLINES, "create"),
        "disciplines.delete" => (&DISCIPLINES, "delete"),
        "rooms.list" => (&ROOMS, "list"),
        "rooms.create" => (&ROOMS, "create"),
        "rooms.delete" => (&ROOMS, "delete"),
        _ => return None,
    };
    Some(dispatch(state, req, catalog, action))
}
