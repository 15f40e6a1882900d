//! Quality control, supervisor checkpoints, customer verification, and
//! the rejection/archival workflow.
//!
//! Archival spans three resources — the machine registry, the archive
//! table, and the live card — and runs as one transaction: if any step
//! fails, the card and its machines keep their pre-rejection state.

use chrono::Utc;
use tracing::{info, info_span};
use uuid::Uuid;

use super::{item_mut_or_err, load_card, store_card, JobCardService, RejectedJobArchive};
use crate::db::{archive_repo, job_card_repo};
use crate::error::LifecycleError;
use crate::model::{CardStatus, ItemStatus, JobCard, QualityStatus};
use crate::registry;

impl JobCardService {
    // ─── Quality control ────────────────────────────────────────────────

    /// Passes a completed item through quality control.
    ///
    /// When the last item is approved the card itself becomes `approved`.
    pub fn quality_good(
        &self,
        job_id: &str,
        item_id: u32,
        acting_user: &str,
        notes: Option<&str>,
    ) -> Result<JobCard, LifecycleError> {
        let _span = info_span!("quality_good", job = %job_id, item = item_id).entered();

        let now = Utc::now();
        self.db.with_tx::<_, LifecycleError, _>(|tx| {
            let mut card = load_card(tx, job_id)?;
            {
                let item = item_mut_or_err(&mut card, item_id)?;
                ensure_quality_gate(item_id, item.status)?;
                item.status = ItemStatus::Approved;
                item.quality_status = Some(QualityStatus::Good);
                if let Some(notes) = notes {
                    item.notes = Some(notes.to_string());
                }
            }
            card.work_verified_by = Some(acting_user.to_string());
            if card.all_items_approved() {
                card.status = CardStatus::Approved;
                card.quality_status = Some(QualityStatus::Good);
                info!(job = %card.id, "Job card approved by quality control");
            }
            store_card(tx, &mut card, now)?;
            Ok(card)
        })
    }

    /// Fails a completed item at quality control.
    ///
    /// The item's worker and machine sessions are cleared for re-execution
    /// (accrued durations are preserved), its machines are released, and
    /// the card drops to `rejected`.
    pub fn quality_bad(
        &self,
        job_id: &str,
        item_id: u32,
        acting_user: &str,
        notes: Option<&str>,
    ) -> Result<JobCard, LifecycleError> {
        let _span = info_span!("quality_bad", job = %job_id, item = item_id).entered();

        let now = Utc::now();
        self.db.with_tx::<_, LifecycleError, _>(|tx| {
            let mut card = load_card(tx, job_id)?;
            let machine_ids = {
                let item = item_mut_or_err(&mut card, item_id)?;
                ensure_quality_gate(item_id, item.status)?;
                item.status = ItemStatus::Rejected;
                item.quality_status = Some(QualityStatus::NeedsWork);
                if let Some(notes) = notes {
                    item.notes = Some(notes.to_string());
                }
                item.reset_assignments_for_rework();
                item.machine_ids().map(str::to_string).collect::<Vec<_>>()
            };
            registry::release_all_for_job(tx, machine_ids.iter().map(String::as_str), &card.id)?;
            card.status = CardStatus::Rejected;
            card.quality_status = Some(QualityStatus::NeedsWork);
            card.work_verified_by = Some(acting_user.to_string());
            info!(job = %card.id, item = item_id, "Job item failed quality control");
            store_card(tx, &mut card, now)?;
            Ok(card)
        })
    }

    // ─── Supervisor checkpoint ──────────────────────────────────────────

    /// Supervisor sign-off on a completed card.
    pub fn supervisor_approve(
        &self,
        job_id: &str,
        notes: Option<&str>,
    ) -> Result<JobCard, LifecycleError> {
        let _span = info_span!("supervisor_approve", job = %job_id).entered();

        let now = Utc::now();
        self.db.with_tx::<_, LifecycleError, _>(|tx| {
            let mut card = load_card(tx, job_id)?;
            if card.status != CardStatus::Completed {
                return Err(LifecycleError::StateConflict(format!(
                    "job card '{}' is {}, supervisor approval needs a completed card",
                    card.id,
                    card.status.as_str()
                )));
            }
            card.status = CardStatus::Supapproved;
            if let Some(notes) = notes {
                card.notes = Some(notes.to_string());
            }
            store_card(tx, &mut card, now)?;
            Ok(card)
        })
    }

    /// Supervisor rejection of a completed (or supervisor-approved) card.
    ///
    /// Status change only — archival is the explicit
    /// [`reject_and_archive`](Self::reject_and_archive) workflow.
    pub fn supervisor_reject(
        &self,
        job_id: &str,
        notes: Option<&str>,
    ) -> Result<JobCard, LifecycleError> {
        let _span = info_span!("supervisor_reject", job = %job_id).entered();

        let now = Utc::now();
        self.db.with_tx::<_, LifecycleError, _>(|tx| {
            let mut card = load_card(tx, job_id)?;
            if !matches!(card.status, CardStatus::Completed | CardStatus::Supapproved) {
                return Err(LifecycleError::StateConflict(format!(
                    "job card '{}' is {}, supervisor rejection needs a completed card",
                    card.id,
                    card.status.as_str()
                )));
            }
            card.status = CardStatus::Rejected;
            if let Some(notes) = notes {
                card.notes = Some(notes.to_string());
            }
            store_card(tx, &mut card, now)?;
            Ok(card)
        })
    }

    // ─── Customer verification ──────────────────────────────────────────

    /// Customer/requester acceptance gate, distinct from internal QA.
    ///
    /// Re-opens a card in a terminal quality state (`approved` or
    /// `rejected`) for another pass: status resets to `pending` and the
    /// card is marked verified by the user.
    pub fn customer_verify(&self, job_id: &str) -> Result<JobCard, LifecycleError> {
        let _span = info_span!("customer_verify", job = %job_id).entered();

        let now = Utc::now();
        self.db.with_tx::<_, LifecycleError, _>(|tx| {
            let mut card = load_card(tx, job_id)?;
            if !card.status.is_quality_terminal() {
                return Err(LifecycleError::StateConflict(format!(
                    "job card '{}' is {}, verification needs an approved or rejected card",
                    card.id,
                    card.status.as_str()
                )));
            }
            card.status = CardStatus::Pending;
            card.is_verified_by_user = true;
            store_card(tx, &mut card, now)?;
            Ok(card)
        })
    }

    // ─── Rejection & archival ───────────────────────────────────────────

    /// Rejects a job card and archives it.
    ///
    /// One transaction: every machine the card holds is released, an
    /// immutable snapshot is inserted into the archive, and the live card
    /// is deleted. Partial application is impossible — a failure in any
    /// step rolls the whole workflow back.
    pub fn reject_and_archive(
        &self,
        job_id: &str,
        reason: &str,
        acting_user: &str,
        shop_id: &str,
    ) -> Result<RejectedJobArchive, LifecycleError> {
        let _span = info_span!("reject_and_archive", job = %job_id, shop = %shop_id).entered();

        if reason.trim().is_empty() {
            return Err(LifecycleError::Validation(
                "a rejection reason is required".into(),
            ));
        }

        let now = Utc::now();
        let record = self.db.with_tx::<_, LifecycleError, _>(|tx| {
            let mut card = load_card(tx, job_id)?;

            let machine_ids: Vec<String> = card.machine_ids().into_iter().collect();
            let released = registry::release_all_for_job(
                tx,
                machine_ids.iter().map(String::as_str),
                &card.id,
            )?;

            card.status = CardStatus::Rejected;
            card.updated_at = now;
            let record = RejectedJobArchive {
                id: Uuid::new_v4().to_string(),
                job_id: card.id.clone(),
                card_number: card.card_number.clone(),
                shop_id: shop_id.to_string(),
                reason: reason.to_string(),
                rejected_by: acting_user.to_string(),
                rejected_at: now,
                snapshot: card,
            };
            archive_repo::insert(tx, &record)?;
            job_card_repo::delete(tx, &record.job_id)?;

            info!(
                job = %record.job_id,
                machines_released = released,
                "Job card rejected and archived"
            );
            Ok(record)
        })?;
        Ok(record)
    }

    /// Lists archived rejections, newest first, optionally for one shop.
    pub fn list_rejections(
        &self,
        shop_id: Option<&str>,
    ) -> Result<Vec<RejectedJobArchive>, LifecycleError> {
        Ok(self.db.with_conn(|conn| archive_repo::list(conn, shop_id))?)
    }

    /// Finds the archive record for an original job id.
    pub fn find_rejection(
        &self,
        job_id: &str,
    ) -> Result<Option<RejectedJobArchive>, LifecycleError> {
        Ok(self
            .db
            .with_conn(|conn| archive_repo::find_by_job_id(conn, job_id))?)
    }
}

/// Quality decisions apply to completed items only.
fn ensure_quality_gate(item_id: u32, status: ItemStatus) -> Result<(), LifecycleError> {
    if status != ItemStatus::Completed {
        return Err(LifecycleError::StateConflict(format!(
            "job item {} is {}, quality decisions need a completed item",
            item_id,
            status.as_str()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testsupport::*;
    use crate::error::{ErrorKind, LifecycleError};
    use crate::model::{CardStatus, ItemStatus, QualityStatus};

    /// Creates a card with one item per machine list entry and drives
    /// every item to `completed`.
    fn completed_card(fx: &Fixture, machines: &[&[&str]]) -> crate::model::JobCard {
        let items = machines.iter().map(|m| item_draft(m)).collect();
        let card = fx.service.create_job_card(draft(items), "clerk-1").unwrap();
        let mut latest = card.clone();
        for item in &card.items {
            latest = fx.service.complete_job_item(&card.id, item.id).unwrap();
        }
        latest
    }

    #[test]
    fn test_quality_good_approves_item_then_card() {
        let fx = fixture();
        let card = completed_card(&fx, &[&[], &[]]);
        assert_eq!(card.status, CardStatus::Completed);

        let card = fx
            .service
            .quality_good(&card.id, 1, "qa-1", Some("clean welds"))
            .unwrap();
        assert_eq!(card.items[0].status, ItemStatus::Approved);
        assert_eq!(card.items[0].quality_status, Some(QualityStatus::Good));
        assert_eq!(card.items[0].notes.as_deref(), Some("clean welds"));
        // One item still awaits QA.
        assert_eq!(card.status, CardStatus::Completed);
        assert_eq!(card.work_verified_by.as_deref(), Some("qa-1"));

        let card = fx.service.quality_good(&card.id, 2, "qa-1", None).unwrap();
        assert_eq!(card.status, CardStatus::Approved);
        assert_eq!(card.quality_status, Some(QualityStatus::Good));
    }

    #[test]
    fn test_quality_gate_needs_completed_item() {
        let fx = fixture();
        let card = fx
            .service
            .create_job_card(draft(vec![item_draft(&[])]), "clerk-1")
            .unwrap();
        let err = fx
            .service
            .quality_good(&card.id, 1, "qa-1", None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);
    }

    #[test]
    fn test_quality_bad_rolls_back_item_for_rework() {
        let fx = fixture();
        let card = fx
            .service
            .create_job_card(draft(vec![item_draft(&["m-welder"])]), "clerk-1")
            .unwrap();
        fx.service.assign_worker(&card.id, 1, "w-1").unwrap();
        fx.service.start_worker_timer(&card.id, 1, "w-1").unwrap();
        rewind_session(&fx.db, &card.id, 60);
        fx.service.end_worker_timer(&card.id, 1, "w-1").unwrap();
        fx.service.complete_job_item(&card.id, 1).unwrap();

        let card = fx
            .service
            .quality_bad(&card.id, 1, "qa-1", Some("re-weld seam"))
            .unwrap();
        assert_eq!(card.status, CardStatus::Rejected);
        assert_eq!(card.quality_status, Some(QualityStatus::NeedsWork));
        let item = &card.items[0];
        assert_eq!(item.status, ItemStatus::Rejected);
        assert_eq!(item.quality_status, Some(QualityStatus::NeedsWork));
        assert_eq!(item.notes.as_deref(), Some("re-weld seam"));

        // Sessions cleared, historical time preserved.
        let timer = &item.workers[0].timer;
        assert!(timer.start_time.is_none());
        assert!(timer.end_time.is_none());
        assert!(timer.actual_duration_secs >= 60);

        // Rework path: the worker restarts, item and card re-enter
        // in_progress, and a second pass accrues on top.
        let card = fx.service.start_worker_timer(&card.id, 1, "w-1").unwrap();
        assert_eq!(card.status, CardStatus::InProgress);
        assert_eq!(card.items[0].status, ItemStatus::InProgress);
    }

    #[test]
    fn test_quality_bad_releases_item_machines() {
        let fx = fixture();
        let card = fx
            .service
            .create_job_card(draft(vec![item_draft(&["m-lathe"])]), "clerk-1")
            .unwrap();
        fx.service.start_machine_timer(&card.id, 1, "m-lathe").unwrap();
        fx.service.complete_job_item(&card.id, 1).unwrap();
        assert!(fx.registry.get("m-lathe").unwrap().unwrap().is_available);

        fx.service.quality_bad(&card.id, 1, "qa-1", None).unwrap();
        assert!(fx.registry.get("m-lathe").unwrap().unwrap().is_available);

        // After the rollback the machine can be claimed for the re-run.
        let card = fx.service.start_machine_timer(&card.id, 1, "m-lathe").unwrap();
        assert!(card.items[0].machines[0].timer.is_running());
    }

    #[test]
    fn test_supervisor_approval_path() {
        let fx = fixture();
        let card = completed_card(&fx, &[&[]]);

        let card = fx
            .service
            .supervisor_approve(&card.id, Some("ok to deliver"))
            .unwrap();
        assert_eq!(card.status, CardStatus::Supapproved);
        assert_eq!(card.notes.as_deref(), Some("ok to deliver"));

        // QA still closes the loop.
        let card = fx.service.quality_good(&card.id, 1, "qa-1", None).unwrap();
        assert_eq!(card.status, CardStatus::Approved);
    }

    #[test]
    fn test_supervisor_approve_needs_completed_card() {
        let fx = fixture();
        let card = fx
            .service
            .create_job_card(draft(vec![item_draft(&[])]), "clerk-1")
            .unwrap();
        let err = fx.service.supervisor_approve(&card.id, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);
    }

    #[test]
    fn test_supervisor_reject_is_status_only() {
        let fx = fixture();
        let card = completed_card(&fx, &[&[]]);
        let card = fx
            .service
            .supervisor_reject(&card.id, Some("estimate exceeded"))
            .unwrap();
        assert_eq!(card.status, CardStatus::Rejected);
        // The live card still exists — no archival happened.
        assert!(fx.service.get_job_card(&card.id).is_ok());
        assert!(fx.service.find_rejection(&card.id).unwrap().is_none());
    }

    #[test]
    fn test_customer_verify_reopens_terminal_cards() {
        let fx = fixture();
        let card = completed_card(&fx, &[&[]]);
        let card = fx.service.quality_good(&card.id, 1, "qa-1", None).unwrap();
        assert_eq!(card.status, CardStatus::Approved);

        let card = fx.service.customer_verify(&card.id).unwrap();
        assert_eq!(card.status, CardStatus::Pending);
        assert!(card.is_verified_by_user);
    }

    #[test]
    fn test_customer_verify_refuses_non_terminal_states() {
        let fx = fixture();
        let card = completed_card(&fx, &[&[]]);
        // completed is not a terminal quality state.
        let err = fx.service.customer_verify(&card.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);

        let card = fx.service.supervisor_approve(&card.id, None).unwrap();
        assert_eq!(card.status, CardStatus::Supapproved);
        let err = fx.service.customer_verify(&card.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);
    }

    #[test]
    fn test_reject_and_archive_releases_machines_and_deletes_card() {
        let fx = fixture();
        let card = fx
            .service
            .create_job_card(
                draft(vec![item_draft(&["m-lathe"]), item_draft(&["m-welder"])]),
                "clerk-1",
            )
            .unwrap();
        fx.service.start_machine_timer(&card.id, 1, "m-lathe").unwrap();
        fx.service.start_machine_timer(&card.id, 2, "m-welder").unwrap();

        let record = fx
            .service
            .reject_and_archive(&card.id, "vehicle written off", "supervisor-1", "shop-1")
            .unwrap();

        // All machines available again.
        assert!(fx.registry.get("m-lathe").unwrap().unwrap().is_available);
        assert!(fx.registry.get("m-welder").unwrap().unwrap().is_available);

        // Exactly one archive record referencing the original job.
        assert_eq!(record.job_id, card.id);
        assert_eq!(record.reason, "vehicle written off");
        assert_eq!(record.snapshot.status, CardStatus::Rejected);
        let rejections = fx.service.list_rejections(Some("shop-1")).unwrap();
        assert_eq!(rejections.len(), 1);

        // The live card is gone.
        let err = fx.service.get_job_card(&card.id).unwrap_err();
        assert!(matches!(err, LifecycleError::JobNotFound(_)));
    }

    #[test]
    fn test_reject_and_archive_requires_reason() {
        let fx = fixture();
        let card = fx
            .service
            .create_job_card(draft(vec![item_draft(&[])]), "clerk-1")
            .unwrap();
        let err = fx
            .service
            .reject_and_archive(&card.id, "  ", "supervisor-1", "shop-1")
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));
    }

    #[test]
    fn test_reject_and_archive_is_atomic() {
        let fx = fixture();
        let card = fx
            .service
            .create_job_card(draft(vec![item_draft(&["m-lathe"])]), "clerk-1")
            .unwrap();
        fx.service.start_machine_timer(&card.id, 1, "m-lathe").unwrap();

        // Break the archive step: the whole workflow must roll back.
        fx.db
            .with_conn(|conn| {
                conn.execute("DROP TABLE rejected_jobs", [])?;
                Ok(())
            })
            .unwrap();
        let err = fx
            .service
            .reject_and_archive(&card.id, "test", "supervisor-1", "shop-1")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);

        // The card survives and its machine is still held.
        assert!(fx.service.get_job_card(&card.id).is_ok());
        let machine = fx.registry.get("m-lathe").unwrap().unwrap();
        assert!(!machine.is_available);
        assert_eq!(machine.held_by.as_deref(), Some(card.id.as_str()));
    }

    #[test]
    fn test_reject_and_archive_missing_job() {
        let fx = fixture();
        let err = fx
            .service
            .reject_and_archive("ghost", "reason", "supervisor-1", "shop-1")
            .unwrap_err();
        assert!(matches!(err, LifecycleError::JobNotFound(_)));
    }
}
