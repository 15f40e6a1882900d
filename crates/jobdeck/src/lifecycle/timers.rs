//! Timer operations and job item completion.
//!
//! Worker timers support start/pause/end; machine timers start/end and
//! mirror their state into the machine registry within the same
//! transaction — a machine is marked busy exactly while its timing
//! session is open (or until its item completes).

use chrono::Utc;
use tracing::{info, info_span};

use super::{ensure_workable, item_mut_or_err, load_card, store_card, JobCardService};
use crate::error::LifecycleError;
use crate::model::{CardStatus, ItemStatus, JobCard};
use crate::registry;

impl JobCardService {
    // ─── Worker timers ──────────────────────────────────────────────────

    /// Opens a worker's timing session.
    ///
    /// The first worker start moves the item — and a waiting/pending card —
    /// to `in_progress`. A rejected item (QA rollback) re-enters
    /// `in_progress` the same way.
    pub fn start_worker_timer(
        &self,
        job_id: &str,
        item_id: u32,
        worker_id: &str,
    ) -> Result<JobCard, LifecycleError> {
        let _span =
            info_span!("start_worker_timer", job = %job_id, item = item_id, worker = %worker_id)
                .entered();

        let now = Utc::now();
        self.db.with_tx::<_, LifecycleError, _>(|tx| {
            let mut card = load_card(tx, job_id)?;
            ensure_workable(&card)?;
            {
                let item = item_mut_or_err(&mut card, item_id)?;
                let worker = item.worker_mut(worker_id).ok_or_else(|| {
                    LifecycleError::WorkerNotAssigned {
                        worker: worker_id.to_string(),
                        item: item_id,
                    }
                })?;
                worker.timer.start(now)?;
                if matches!(
                    item.status,
                    ItemStatus::Waiting | ItemStatus::Pending | ItemStatus::Rejected
                ) {
                    item.status = ItemStatus::InProgress;
                }
            }
            if matches!(
                card.status,
                CardStatus::Waiting | CardStatus::Pending | CardStatus::Rejected
            ) {
                card.status = CardStatus::InProgress;
            }
            store_card(tx, &mut card, now)?;
            Ok(card)
        })
    }

    /// Closes a worker's open session, accruing its elapsed seconds.
    /// The assignment stays resumable.
    pub fn pause_worker_timer(
        &self,
        job_id: &str,
        item_id: u32,
        worker_id: &str,
    ) -> Result<JobCard, LifecycleError> {
        let _span =
            info_span!("pause_worker_timer", job = %job_id, item = item_id, worker = %worker_id)
                .entered();

        let now = Utc::now();
        self.db.with_tx::<_, LifecycleError, _>(|tx| {
            let mut card = load_card(tx, job_id)?;
            {
                let item = item_mut_or_err(&mut card, item_id)?;
                let worker = item.worker_mut(worker_id).ok_or_else(|| {
                    LifecycleError::WorkerNotAssigned {
                        worker: worker_id.to_string(),
                        item: item_id,
                    }
                })?;
                worker.timer.pause(now)?;
            }
            store_card(tx, &mut card, now)?;
            Ok(card)
        })
    }

    /// Ends a worker's assignment, accruing its final session.
    pub fn end_worker_timer(
        &self,
        job_id: &str,
        item_id: u32,
        worker_id: &str,
    ) -> Result<JobCard, LifecycleError> {
        let _span =
            info_span!("end_worker_timer", job = %job_id, item = item_id, worker = %worker_id)
                .entered();

        let now = Utc::now();
        self.db.with_tx::<_, LifecycleError, _>(|tx| {
            let mut card = load_card(tx, job_id)?;
            {
                let item = item_mut_or_err(&mut card, item_id)?;
                let worker = item.worker_mut(worker_id).ok_or_else(|| {
                    LifecycleError::WorkerNotAssigned {
                        worker: worker_id.to_string(),
                        item: item_id,
                    }
                })?;
                worker.timer.end(now)?;
            }
            store_card(tx, &mut card, now)?;
            Ok(card)
        })
    }

    // ─── Machine timers ─────────────────────────────────────────────────

    /// Opens a machine's timing session and claims the machine.
    ///
    /// Session and registry claim commit together: a held machine blocks
    /// the start, and a failed start leaves the machine unclaimed.
    pub fn start_machine_timer(
        &self,
        job_id: &str,
        item_id: u32,
        machine_id: &str,
    ) -> Result<JobCard, LifecycleError> {
        let _span = info_span!(
            "start_machine_timer",
            job = %job_id,
            item = item_id,
            machine = %machine_id
        )
        .entered();

        let now = Utc::now();
        self.db.with_tx::<_, LifecycleError, _>(|tx| {
            let mut card = load_card(tx, job_id)?;
            ensure_workable(&card)?;
            {
                let item = item_mut_or_err(&mut card, item_id)?;
                let assignment = item.machine_mut(machine_id).ok_or_else(|| {
                    LifecycleError::MachineNotAssigned {
                        machine: machine_id.to_string(),
                        item: item_id,
                    }
                })?;
                assignment.timer.start(now)?;
            }
            registry::acquire(tx, machine_id, &card.id)?;
            store_card(tx, &mut card, now)?;
            Ok(card)
        })
    }

    /// Ends a machine's session and releases the machine, atomically.
    pub fn end_machine_timer(
        &self,
        job_id: &str,
        item_id: u32,
        machine_id: &str,
    ) -> Result<JobCard, LifecycleError> {
        let _span = info_span!(
            "end_machine_timer",
            job = %job_id,
            item = item_id,
            machine = %machine_id
        )
        .entered();

        let now = Utc::now();
        self.db.with_tx::<_, LifecycleError, _>(|tx| {
            let mut card = load_card(tx, job_id)?;
            {
                let item = item_mut_or_err(&mut card, item_id)?;
                let assignment = item.machine_mut(machine_id).ok_or_else(|| {
                    LifecycleError::MachineNotAssigned {
                        machine: machine_id.to_string(),
                        item: item_id,
                    }
                })?;
                assignment.timer.end(now)?;
            }
            registry::release_for_job(tx, machine_id, &card.id)?;
            store_card(tx, &mut card, now)?;
            Ok(card)
        })
    }

    // ─── Item completion ────────────────────────────────────────────────

    /// Completes a job item.
    ///
    /// Fails unless every worker assignment on the item has ended. Rolls
    /// the item's worker seconds into the card's `actual_man_seconds`
    /// exactly once (re-running fails on the finished-state guard),
    /// releases the item's machines, and completes the card when it was
    /// the last open item.
    pub fn complete_job_item(&self, job_id: &str, item_id: u32) -> Result<JobCard, LifecycleError> {
        let _span = info_span!("complete_job_item", job = %job_id, item = item_id).entered();

        let now = Utc::now();
        self.db.with_tx::<_, LifecycleError, _>(|tx| {
            let mut card = load_card(tx, job_id)?;
            let (item_seconds, machine_ids) = {
                let item = item_mut_or_err(&mut card, item_id)?;
                if item.status.is_finished() {
                    return Err(LifecycleError::StateConflict(format!(
                        "job item {} is already {}",
                        item_id,
                        item.status.as_str()
                    )));
                }
                if !item.all_workers_ended() {
                    return Err(LifecycleError::StateConflict(format!(
                        "job item {} has worker assignments without an end time",
                        item_id
                    )));
                }
                item.status = ItemStatus::Completed;
                let ids: Vec<String> = item.machine_ids().map(str::to_string).collect();
                (item.worker_seconds(), ids)
            };

            card.actual_man_seconds += item_seconds;
            registry::release_all_for_job(
                tx,
                machine_ids.iter().map(String::as_str),
                &card.id,
            )?;
            if card.all_items_finished() {
                card.status = CardStatus::Completed;
                info!(job = %card.id, "All job items completed");
            }
            store_card(tx, &mut card, now)?;
            Ok(card)
        })
    }
}
