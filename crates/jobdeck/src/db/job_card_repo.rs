//! Job card repository — persistence for the `job_cards` table.
//!
//! The card aggregate is stored as a JSON document alongside the columns
//! queries filter on. All functions take a `&Connection` so they compose
//! into the lifecycle transactions (`Database::with_tx`).

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::DatabaseError;
use crate::model::{CardStatus, JobCard};

/// Query filter parameters for job card listing.
#[derive(Debug, Default, Clone)]
pub struct CardFilter {
    pub status: Option<CardStatus>,
    pub shop_id: Option<String>,
    pub customer_id: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a new job card row.
pub fn insert(conn: &Connection, card: &JobCard) -> Result<(), DatabaseError> {
    let doc = serde_json::to_string(card)?;
    conn.execute(
        "INSERT INTO job_cards (id, card_number, template_id, shop_id, customer_id,
         status, revision, doc, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            card.id,
            card.card_number,
            card.template_id,
            card.shop_id,
            card.customer_id,
            card.status.as_str(),
            card.revision,
            doc,
            card.created_at.to_rfc3339(),
            card.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Revision-guarded update.
///
/// Returns `false` without touching the row when the stored revision no
/// longer matches `card.revision` (a concurrent writer got there first).
/// On success the card's revision is bumped to match the row.
pub fn update(conn: &Connection, card: &mut JobCard) -> Result<bool, DatabaseError> {
    let expected = card.revision;
    card.revision = expected + 1;
    let doc = serde_json::to_string(card)?;
    let changed = conn.execute(
        "UPDATE job_cards SET status=?2, revision=?3, doc=?4, updated_at=?5
         WHERE id=?1 AND revision=?6",
        params![
            card.id,
            card.status.as_str(),
            card.revision,
            doc,
            card.updated_at.to_rfc3339(),
            expected,
        ],
    )?;
    if changed == 0 {
        card.revision = expected;
        return Ok(false);
    }
    Ok(true)
}

/// Finds a job card by its ID.
pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<JobCard>, DatabaseError> {
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT doc, revision FROM job_cards WHERE id = ?1",
            params![id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;

    match row {
        Some((doc, revision)) => {
            let mut card: JobCard = serde_json::from_str(&doc)?;
            // The column is the authoritative revision.
            card.revision = revision;
            Ok(Some(card))
        }
        None => Ok(None),
    }
}

/// Deletes a job card row. Returns whether a row was removed.
pub fn delete(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute("DELETE FROM job_cards WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

/// Queries job cards with filters, returning (cards, total_count).
pub fn query(conn: &Connection, filter: &CardFilter) -> Result<(Vec<JobCard>, u64), DatabaseError> {
    let mut conditions = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(status) = filter.status {
        conditions.push(format!("status = ?{}", param_values.len() + 1));
        param_values.push(Box::new(status.as_str().to_string()));
    }
    if let Some(ref shop_id) = filter.shop_id {
        conditions.push(format!("shop_id = ?{}", param_values.len() + 1));
        param_values.push(Box::new(shop_id.clone()));
    }
    if let Some(ref customer_id) = filter.customer_id {
        conditions.push(format!("customer_id = ?{}", param_values.len() + 1));
        param_values.push(Box::new(customer_id.clone()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    // Count total matching rows.
    let count_sql = format!("SELECT COUNT(*) FROM job_cards {}", where_clause);
    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

    // Fetch paginated results.
    let limit = filter.limit.unwrap_or(100) as i64;
    let offset = filter.offset.unwrap_or(0) as i64;
    param_values.push(Box::new(limit));
    param_values.push(Box::new(offset));
    let query_sql = format!(
        "SELECT doc, revision FROM job_cards {} ORDER BY created_at DESC LIMIT ?{} OFFSET ?{}",
        where_clause,
        param_values.len() - 1,
        param_values.len()
    );

    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&query_sql)?;
    let rows: Vec<(String, i64)> = stmt
        .query_map(params_ref.as_slice(), |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut cards = Vec::with_capacity(rows.len());
    for (doc, revision) in rows {
        let mut card: JobCard = serde_json::from_str(&doc)?;
        card.revision = revision;
        cards.push(card);
    }

    Ok((cards, total))
}

/// Counts job cards with the given status.
pub fn count_by_status(conn: &Connection, status: CardStatus) -> Result<u64, DatabaseError> {
    let count: u64 = conn.query_row(
        "SELECT COUNT(*) FROM job_cards WHERE status = ?1",
        params![status.as_str()],
        |r| r.get(0),
    )?;
    Ok(count)
}

/// Allocates the next card number: `{prefix}-{YYYYMMDD}-{seq:03}`.
///
/// The per-day counter is bumped in the caller's transaction, so numbers
/// are collision-free under concurrent creation.
pub fn next_card_number(
    conn: &Connection,
    prefix: &str,
    now: DateTime<Utc>,
) -> Result<String, DatabaseError> {
    let day = now.format("%Y%m%d").to_string();
    let seq: i64 = conn.query_row(
        "INSERT INTO card_sequence (day, seq) VALUES (?1, 1)
         ON CONFLICT(day) DO UPDATE SET seq = seq + 1
         RETURNING seq",
        params![day],
        |r| r.get(0),
    )?;
    Ok(format!("{}-{}-{:03}", prefix, day, seq))
}
