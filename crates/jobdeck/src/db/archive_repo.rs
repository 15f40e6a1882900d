//! Rejection archive repository — insert and read access to the
//! `rejected_jobs` table. Archive records are immutable: there is no
//! update or delete path.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;
use crate::model::JobCard;

/// An immutable snapshot of a job card taken when it was rejected.
#[derive(Debug, Clone)]
pub struct RejectedJobArchive {
    pub id: String,
    /// Identity of the (deleted) live job card.
    pub job_id: String,
    pub card_number: String,
    pub shop_id: String,
    pub reason: String,
    pub rejected_by: String,
    pub rejected_at: DateTime<Utc>,
    /// Full copy of the card at rejection time.
    pub snapshot: JobCard,
}

/// Raw row with the snapshot still serialized.
struct ArchiveRow {
    id: String,
    job_id: String,
    card_number: String,
    shop_id: String,
    reason: String,
    rejected_by: String,
    rejected_at: String,
    snapshot: String,
}

impl ArchiveRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            card_number: row.get("card_number")?,
            shop_id: row.get("shop_id")?,
            reason: row.get("reason")?,
            rejected_by: row.get("rejected_by")?,
            rejected_at: row.get("rejected_at")?,
            snapshot: row.get("snapshot")?,
        })
    }

    fn into_record(self) -> Result<RejectedJobArchive, DatabaseError> {
        Ok(RejectedJobArchive {
            snapshot: serde_json::from_str(&self.snapshot)?,
            rejected_at: DateTime::parse_from_rfc3339(&self.rejected_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_default(),
            id: self.id,
            job_id: self.job_id,
            card_number: self.card_number,
            shop_id: self.shop_id,
            reason: self.reason,
            rejected_by: self.rejected_by,
        })
    }
}

/// Inserts an archive record.
pub fn insert(conn: &Connection, record: &RejectedJobArchive) -> Result<(), DatabaseError> {
    let snapshot = serde_json::to_string(&record.snapshot)?;
    conn.execute(
        "INSERT INTO rejected_jobs (id, job_id, card_number, shop_id, reason,
         rejected_by, rejected_at, snapshot)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.id,
            record.job_id,
            record.card_number,
            record.shop_id,
            record.reason,
            record.rejected_by,
            record.rejected_at.to_rfc3339(),
            snapshot,
        ],
    )?;
    Ok(())
}

/// Finds the archive record for an original job id.
pub fn find_by_job_id(
    conn: &Connection,
    job_id: &str,
) -> Result<Option<RejectedJobArchive>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM rejected_jobs WHERE job_id = ?1",
            params![job_id],
            ArchiveRow::from_row,
        )
        .optional()?;
    row.map(ArchiveRow::into_record).transpose()
}

/// Lists archive records, newest first, optionally for one shop.
pub fn list(
    conn: &Connection,
    shop_id: Option<&str>,
) -> Result<Vec<RejectedJobArchive>, DatabaseError> {
    let mut records = Vec::new();
    match shop_id {
        Some(shop) => {
            let mut stmt = conn.prepare(
                "SELECT * FROM rejected_jobs WHERE shop_id = ?1 ORDER BY rejected_at DESC",
            )?;
            for row in stmt.query_map(params![shop], ArchiveRow::from_row)? {
                records.push(row?.into_record()?);
            }
        }
        None => {
            let mut stmt =
                conn.prepare("SELECT * FROM rejected_jobs ORDER BY rejected_at DESC")?;
            for row in stmt.query_map([], ArchiveRow::from_row)? {
                records.push(row?.into_record()?);
            }
        }
    }
    Ok(records)
}
