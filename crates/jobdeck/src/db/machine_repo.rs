//! Machine repository — row-level access to the `machines` table.
//!
//! Availability semantics (who may claim or release a machine) live in
//! [`crate::registry`]; this module only maps rows and applies the
//! holder columns.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;
use crate::registry::Machine;

fn from_row(row: &Row<'_>) -> Result<Machine, rusqlite::Error> {
    let created_at: String = row.get("created_at")?;
    Ok(Machine {
        id: row.get("id")?,
        shop_id: row.get("shop_id")?,
        name: row.get("name")?,
        category: row.get("category")?,
        is_available: row.get("is_available")?,
        held_by: row.get("held_by")?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_default(),
    })
}

/// Inserts a new machine row.
pub fn insert(conn: &Connection, machine: &Machine) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO machines (id, shop_id, name, category, is_available, held_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            machine.id,
            machine.shop_id,
            machine.name,
            machine.category,
            machine.is_available,
            machine.held_by,
            machine.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Finds a machine by its ID.
pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<Machine>, DatabaseError> {
    let machine = conn
        .query_row("SELECT * FROM machines WHERE id = ?1", params![id], from_row)
        .optional()?;
    Ok(machine)
}

/// Lists a shop's machines, available first, then by name.
pub fn list_for_shop(conn: &Connection, shop_id: &str) -> Result<Vec<Machine>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM machines WHERE shop_id = ?1 ORDER BY is_available DESC, name ASC",
    )?;
    let machines = stmt
        .query_map(params![shop_id], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(machines)
}

/// Marks a machine unavailable and held by the given job.
/// Returns whether a row was updated.
pub fn set_holder(conn: &Connection, id: &str, job_id: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE machines SET is_available = 0, held_by = ?2 WHERE id = ?1",
        params![id, job_id],
    )?;
    Ok(changed > 0)
}

/// Marks a machine available with no holder.
/// Returns whether a row was updated.
pub fn clear_holder(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE machines SET is_available = 1, held_by = NULL WHERE id = ?1",
        params![id],
    )?;
    Ok(changed > 0)
}
