//! Machine resource registry.
//!
//! Each machine carries an availability flag and the job currently holding
//! it; a machine is available iff no job holds it, and at most one job may
//! hold a machine at a time. The transactional claim/release functions here
//! are the only code paths that touch the holder columns — they run inside
//! the same transaction as the job-card update they accompany.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{machine_repo, Database, DatabaseError};
use crate::error::LifecycleError;

/// A machine owned by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub id: String,
    pub shop_id: String,
    pub name: String,
    /// Rate-catalog key, e.g. "lathe" — resolved to an hourly rate at job
    /// creation.
    pub category: String,
    pub is_available: bool,
    /// Job currently holding the machine; `None` iff `is_available`.
    pub held_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Machine {
    pub fn new(
        id: impl Into<String>,
        shop_id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            shop_id: shop_id.into(),
            name: name.into(),
            category: category.into(),
            is_available: true,
            held_by: None,
            created_at: Utc::now(),
        }
    }
}

/// Claims a machine for a job.
///
/// Fails with a resource conflict when any job (including `job_id` itself)
/// already holds the machine.
pub fn acquire(conn: &Connection, machine_id: &str, job_id: &str) -> Result<(), LifecycleError> {
    let machine = machine_repo::find_by_id(conn, machine_id)?
        .ok_or_else(|| LifecycleError::MachineNotFound(machine_id.to_string()))?;
    if !machine.is_available {
        return Err(LifecycleError::MachineHeld {
            machine: machine_id.to_string(),
            holder: machine.held_by.unwrap_or_default(),
        });
    }
    machine_repo::set_holder(conn, machine_id, job_id)?;
    Ok(())
}

/// Releases a machine if (and only if) the given job holds it.
///
/// Returns whether a release happened: `false` when the machine was
/// already free or is held by a different job — a job must never release
/// another job's claim.
pub fn release_for_job(
    conn: &Connection,
    machine_id: &str,
    job_id: &str,
) -> Result<bool, LifecycleError> {
    let machine = machine_repo::find_by_id(conn, machine_id)?
        .ok_or_else(|| LifecycleError::MachineNotFound(machine_id.to_string()))?;
    if machine.held_by.as_deref() != Some(job_id) {
        return Ok(false);
    }
    machine_repo::clear_holder(conn, machine_id)?;
    Ok(true)
}

/// Releases every listed machine held by the job. Returns how many were
/// actually released.
pub fn release_all_for_job<'a, I>(
    conn: &Connection,
    machine_ids: I,
    job_id: &str,
) -> Result<usize, LifecycleError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut released = 0;
    for machine_id in machine_ids {
        if release_for_job(conn, machine_id, job_id)? {
            released += 1;
        }
    }
    Ok(released)
}

/// Host-facing registry handle for managing the machine catalog.
#[derive(Clone)]
pub struct Registry {
    db: Database,
}

impl Registry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Registers a new machine.
    pub fn register(&self, machine: &Machine) -> Result<(), DatabaseError> {
        self.db.with_conn(|conn| machine_repo::insert(conn, machine))
    }

    /// Looks up a machine by id.
    pub fn get(&self, machine_id: &str) -> Result<Option<Machine>, DatabaseError> {
        self.db
            .with_conn(|conn| machine_repo::find_by_id(conn, machine_id))
    }

    /// Lists a shop's machines, available first.
    pub fn list_for_shop(&self, shop_id: &str) -> Result<Vec<Machine>, DatabaseError> {
        self.db
            .with_conn(|conn| machine_repo::list_for_shop(conn, shop_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        let registry = Registry::new(db.clone());
        registry
            .register(&Machine::new("m1", "shop-1", "Lathe 200", "lathe"))
            .unwrap();
        registry
            .register(&Machine::new("m2", "shop-1", "Welder", "welder"))
            .unwrap();
        db
    }

    #[test]
    fn test_acquire_marks_machine_held() {
        let db = setup();
        db.with_tx::<_, LifecycleError, _>(|tx| acquire(tx, "m1", "job-1"))
            .unwrap();

        let machine = Registry::new(db).get("m1").unwrap().unwrap();
        assert!(!machine.is_available);
        assert_eq!(machine.held_by.as_deref(), Some("job-1"));
    }

    #[test]
    fn test_acquire_held_machine_is_a_resource_conflict() {
        let db = setup();
        db.with_tx::<_, LifecycleError, _>(|tx| acquire(tx, "m1", "job-1"))
            .unwrap();

        let err = db
            .with_tx::<_, LifecycleError, _>(|tx| acquire(tx, "m1", "job-2"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceConflict);
        match err {
            LifecycleError::MachineHeld { holder, .. } => assert_eq!(holder, "job-1"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_acquire_is_not_reentrant_for_the_same_job() {
        let db = setup();
        db.with_tx::<_, LifecycleError, _>(|tx| acquire(tx, "m1", "job-1"))
            .unwrap();
        let err = db
            .with_tx::<_, LifecycleError, _>(|tx| acquire(tx, "m1", "job-1"))
            .unwrap_err();
        assert!(matches!(err, LifecycleError::MachineHeld { .. }));
    }

    #[test]
    fn test_acquire_unknown_machine() {
        let db = setup();
        let err = db
            .with_tx::<_, LifecycleError, _>(|tx| acquire(tx, "ghost", "job-1"))
            .unwrap_err();
        assert!(matches!(err, LifecycleError::MachineNotFound(_)));
    }

    #[test]
    fn test_release_only_for_the_holding_job() {
        let db = setup();
        db.with_tx::<_, LifecycleError, _>(|tx| acquire(tx, "m1", "job-1"))
            .unwrap();

        // Another job must not free the claim.
        let released = db
            .with_tx::<_, LifecycleError, _>(|tx| release_for_job(tx, "m1", "job-2"))
            .unwrap();
        assert!(!released);
        assert!(!Registry::new(db.clone()).get("m1").unwrap().unwrap().is_available);

        let released = db
            .with_tx::<_, LifecycleError, _>(|tx| release_for_job(tx, "m1", "job-1"))
            .unwrap();
        assert!(released);
        let machine = Registry::new(db).get("m1").unwrap().unwrap();
        assert!(machine.is_available);
        assert!(machine.held_by.is_none());
    }

    #[test]
    fn test_release_free_machine_is_a_noop() {
        let db = setup();
        let released = db
            .with_tx::<_, LifecycleError, _>(|tx| release_for_job(tx, "m1", "job-1"))
            .unwrap();
        assert!(!released);
    }

    #[test]
    fn test_release_all_counts_only_held_machines() {
        let db = setup();
        db.with_tx::<_, LifecycleError, _>(|tx| {
            acquire(tx, "m1", "job-1")?;
            acquire(tx, "m2", "job-2")?;
            Ok(())
        })
        .unwrap();

        let released = db
            .with_tx::<_, LifecycleError, _>(|tx| {
                release_all_for_job(tx, ["m1", "m2"], "job-1")
            })
            .unwrap();
        assert_eq!(released, 1);

        let registry = Registry::new(db);
        assert!(registry.get("m1").unwrap().unwrap().is_available);
        assert!(!registry.get("m2").unwrap().unwrap().is_available);
    }
}
