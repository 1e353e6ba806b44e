use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;

use crate::bulletin::{DataSnapshot, DepartmentInfo};

pub const DB_FILE_NAME: &str = "zaminy.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS departments(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            sort_order INTEGER NOT NULL,
            is_general INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS groups(
            id TEXT PRIMARY KEY,
            department_id INTEGER NOT NULL,
            name TEXT NOT NULL UNIQUE,
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_groups_department ON groups(department_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS disciplines(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rooms(
            id TEXT PRIMARY KEY,
            number TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    Ok(conn)
}

/// Loads the department structure and group index the layout engine works
/// against. A query failure degrades to an empty snapshot rather than
/// failing the bulletin session; callers surface the flag to the user.
pub fn load_snapshot(conn: &Connection) -> DataSnapshot {
    match try_load_snapshot(conn) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            log::warn!("reference snapshot unavailable: {}", e);
            DataSnapshot::unavailable()
        }
    }
}

fn try_load_snapshot(conn: &Connection) -> anyhow::Result<DataSnapshot> {
    let mut dept_stmt = conn.prepare(
        "SELECT
           d.id,
           d.name,
           d.sort_order,
           d.is_general,
           EXISTS(SELECT 1 FROM groups g WHERE g.department_id = d.id) AS has_groups
         FROM departments d
         ORDER BY d.sort_order, d.id",
    )?;
    let departments = dept_stmt
        .query_map([], |row| {
            let is_general: i64 = row.get(3)?;
            let has_groups: i64 = row.get(4)?;
            Ok(DepartmentInfo {
                id: row.get(0)?,
                name: row.get(1)?,
                sort_order: row.get(2)?,
                is_general: is_general != 0,
                has_groups: has_groups != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for d in &departments {
        log::debug!(
            "department {} ({}): {}",
            d.name,
            d.id,
            if d.has_groups { "has groups" } else { "no groups" }
        );
    }

    let mut group_stmt = conn.prepare("SELECT name, department_id FROM groups")?;
    let group_departments = group_stmt
        .query_map([], |row| {
            let name: String = row.get(0)?;
            let dept_id: i64 = row.get(1)?;
            Ok((name, dept_id))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;

    Ok(DataSnapshot {
        departments,
        group_departments,
        degraded: false,
    })
}
