//! Catalog repository — row-level access to the `templates` and
//! `machine_rates` tables consumed by [`crate::catalog::SqliteCatalog`].

use rusqlite::{params, Connection, OptionalExtension};

use super::DatabaseError;
use crate::catalog::TemplateRef;

/// Inserts (or replaces) a template definition.
pub fn upsert_template(conn: &Connection, template: &TemplateRef) -> Result<(), DatabaseError> {
    let fields = serde_json::to_string(&template.fields)?;
    conn.execute(
        "INSERT INTO templates (id, name, fields, created_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET name = ?2, fields = ?3",
        params![template.id, template.name, fields],
    )?;
    Ok(())
}

/// Resolves a template by id.
pub fn find_template(conn: &Connection, id: &str) -> Result<Option<TemplateRef>, DatabaseError> {
    let row: Option<(String, String, String)> = conn
        .query_row(
            "SELECT id, name, fields FROM templates WHERE id = ?1",
            params![id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    match row {
        Some((id, name, fields)) => Ok(Some(TemplateRef {
            id,
            name,
            fields: serde_json::from_str(&fields)?,
        })),
        None => Ok(None),
    }
}

/// Sets the hourly rate for a machine category within a shop.
pub fn upsert_rate(
    conn: &Connection,
    shop_id: &str,
    category: &str,
    hourly_rate: f64,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO machine_rates (shop_id, category, hourly_rate)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(shop_id, category) DO UPDATE SET hourly_rate = ?3",
        params![shop_id, category, hourly_rate],
    )?;
    Ok(())
}

/// Looks up the hourly rate for a machine category within a shop.
pub fn find_rate(
    conn: &Connection,
    shop_id: &str,
    category: &str,
) -> Result<Option<f64>, DatabaseError> {
    let rate = conn
        .query_row(
            "SELECT hourly_rate FROM machine_rates WHERE shop_id = ?1 AND category = ?2",
            params![shop_id, category],
            |r| r.get(0),
        )
        .optional()?;
    Ok(rate)
}
