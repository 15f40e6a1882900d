//! Job card lifecycle service.
//!
//! Every mutating operation is a short-lived read-modify-write: it loads
//! the card inside an IMMEDIATE transaction ([`Database::with_tx`]),
//! mutates the aggregate, and persists through a revision-guarded update.
//! Machine availability changes ride in the same transaction as the card
//! they belong to, so both commit or neither does.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Transaction;
use tracing::{debug, info, info_span};
use uuid::Uuid;

use crate::catalog::{RateCatalog, TemplateDirectory};
use crate::db::{job_card_repo, machine_repo, Database};
use crate::error::LifecycleError;
use crate::model::{
    CardStatus, Consumable, ItemStatus, JobCard, JobCardDraft, JobItem, MachineAssignment,
    WorkerAssignment,
};

mod review;
mod timers;

pub use crate::db::archive_repo::RejectedJobArchive;
pub use crate::db::job_card_repo::CardFilter;

/// Default card-number prefix; override via [`JobCardService::with_card_prefix`].
pub const DEFAULT_CARD_PREFIX: &str = "JC";

/// The job card lifecycle engine.
pub struct JobCardService {
    db: Database,
    templates: Arc<dyn TemplateDirectory>,
    rates: Arc<dyn RateCatalog>,
    card_prefix: String,
}

impl JobCardService {
    pub fn new(
        db: Database,
        templates: Arc<dyn TemplateDirectory>,
        rates: Arc<dyn RateCatalog>,
    ) -> Self {
        Self {
            db,
            templates,
            rates,
            card_prefix: DEFAULT_CARD_PREFIX.to_string(),
        }
    }

    pub fn with_card_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.card_prefix = prefix.into();
        self
    }

    // ─── Creation ───────────────────────────────────────────────────────

    /// Creates a job card from a template reference and an item list.
    ///
    /// Fails when the template does not resolve, or when any referenced
    /// machine (or its category's shop rate) cannot be resolved — the
    /// hourly rate is snapshot into each machine assignment at this point.
    pub fn create_job_card(
        &self,
        draft: JobCardDraft,
        acting_user: &str,
    ) -> Result<JobCard, LifecycleError> {
        let _span = info_span!(
            "create_job_card",
            template = %draft.template_id,
            shop = %draft.shop_id
        )
        .entered();

        validate_draft(&draft)?;

        self.templates
            .resolve(&draft.template_id)?
            .ok_or_else(|| LifecycleError::TemplateNotFound(draft.template_id.clone()))?;

        let rate_by_machine = self.snapshot_machine_rates(&draft)?;

        let now = Utc::now();
        let mut items = Vec::with_capacity(draft.items.len());
        for (index, item_draft) in draft.items.into_iter().enumerate() {
            let machines = item_draft
                .machines
                .iter()
                .map(|machine_id| {
                    MachineAssignment::new(machine_id.clone(), rate_by_machine[machine_id])
                })
                .collect();
            let consumables = item_draft
                .consumables
                .into_iter()
                .zip(1u32..)
                .map(|(draft, id)| Consumable {
                    id,
                    name: draft.name,
                    price: draft.price,
                    available: false,
                    number_of_used: 0,
                })
                .collect();

            items.push(JobItem {
                id: index as u32 + 1,
                item_data: item_draft.item_data,
                estimated_price: item_draft.estimated_price,
                status: ItemStatus::Pending,
                quality_status: None,
                notes: None,
                allowed_workers: item_draft.allowed_workers,
                workers: Vec::new(),
                machines,
                consumables,
            });
        }

        let total_estimated_amount = items.iter().map(|i| i.estimated_price).sum();
        let next_item_id = items.len() as u32 + 1;

        let card = self.db.with_tx::<_, LifecycleError, _>(|tx| {
            let card_number = job_card_repo::next_card_number(tx, &self.card_prefix, now)?;
            let card = JobCard {
                id: Uuid::new_v4().to_string(),
                card_number,
                template_id: draft.template_id,
                shop_id: draft.shop_id,
                customer_id: draft.customer_id,
                status: CardStatus::Pending,
                quality_status: None,
                form_data: draft.form_data,
                items,
                total_estimated_amount,
                actual_total_amount: 0.0,
                actual_man_seconds: 0,
                is_verified_by_user: false,
                work_verified_by: None,
                notes: None,
                created_by: acting_user.to_string(),
                created_at: now,
                updated_at: now,
                next_item_id,
                revision: 0,
            };
            job_card_repo::insert(tx, &card)?;
            Ok(card)
        })?;

        info!(job = %card.id, card_number = %card.card_number, "Created job card");
        Ok(card)
    }

    /// Resolves every referenced machine and snapshots its category's
    /// hourly rate for the draft's shop.
    fn snapshot_machine_rates(
        &self,
        draft: &JobCardDraft,
    ) -> Result<BTreeMap<String, f64>, LifecycleError> {
        let machine_ids: BTreeSet<&str> = draft
            .items
            .iter()
            .flat_map(|i| i.machines.iter().map(String::as_str))
            .collect();

        let mut rates = BTreeMap::new();
        for machine_id in machine_ids {
            let machine = self
                .db
                .with_conn(|conn| machine_repo::find_by_id(conn, machine_id))?
                .ok_or_else(|| LifecycleError::MachineNotFound(machine_id.to_string()))?;
            let rate = self
                .rates
                .hourly_rate(&draft.shop_id, &machine.category)?
                .ok_or_else(|| LifecycleError::RateNotFound {
                    shop: draft.shop_id.clone(),
                    category: machine.category.clone(),
                })?;
            rates.insert(machine_id.to_string(), rate);
        }
        Ok(rates)
    }

    // ─── Queries ────────────────────────────────────────────────────────

    pub fn get_job_card(&self, job_id: &str) -> Result<JobCard, LifecycleError> {
        self.db
            .with_conn(|conn| job_card_repo::find_by_id(conn, job_id))?
            .ok_or_else(|| LifecycleError::JobNotFound(job_id.to_string()))
    }

    /// Lists job cards matching the filter, returning (cards, total).
    pub fn list_job_cards(
        &self,
        filter: &CardFilter,
    ) -> Result<(Vec<JobCard>, u64), LifecycleError> {
        Ok(self.db.with_conn(|conn| job_card_repo::query(conn, filter))?)
    }

    pub fn count_by_status(&self, status: CardStatus) -> Result<u64, LifecycleError> {
        Ok(self
            .db
            .with_conn(|conn| job_card_repo::count_by_status(conn, status))?)
    }

    // ─── Worker assignment ──────────────────────────────────────────────

    /// Assigns a worker to a job item.
    ///
    /// Set-insertion keyed by worker identity: assigning the same worker
    /// twice is a no-op, not a duplicate record.
    pub fn assign_worker(
        &self,
        job_id: &str,
        item_id: u32,
        worker_id: &str,
    ) -> Result<JobCard, LifecycleError> {
        let _span =
            info_span!("assign_worker", job = %job_id, item = item_id, worker = %worker_id)
                .entered();

        if worker_id.trim().is_empty() {
            return Err(LifecycleError::Validation(
                "worker id must not be empty".into(),
            ));
        }

        let now = Utc::now();
        self.db.with_tx::<_, LifecycleError, _>(|tx| {
            let mut card = load_card(tx, job_id)?;
            ensure_workable(&card)?;
            let item = item_mut_or_err(&mut card, item_id)?;
            if item.status.is_finished() {
                return Err(LifecycleError::StateConflict(format!(
                    "job item {} is already {}",
                    item_id,
                    item.status.as_str()
                )));
            }
            if item.worker(worker_id).is_some() {
                debug!(worker = %worker_id, "Worker already assigned, no-op");
                return Ok(card);
            }
            item.workers.push(WorkerAssignment::new(worker_id));
            store_card(tx, &mut card, now)?;
            Ok(card)
        })
    }

    // ─── Consumable usage ledger ────────────────────────────────────────

    /// Records usage of a consumable on a job item.
    ///
    /// Append-only accrual: increments `number_of_used`, marks the
    /// consumable available, and adds `price × quantity` to the card's
    /// running actual total. Nothing ever decrements usage.
    pub fn record_consumable_usage(
        &self,
        job_id: &str,
        item_id: u32,
        consumable_id: u32,
        quantity: u32,
    ) -> Result<JobCard, LifecycleError> {
        let _span = info_span!(
            "record_consumable_usage",
            job = %job_id,
            item = item_id,
            consumable = consumable_id,
            quantity
        )
        .entered();

        if quantity == 0 {
            return Err(LifecycleError::Validation(
                "usage quantity must be positive".into(),
            ));
        }

        let now = Utc::now();
        self.db.with_tx::<_, LifecycleError, _>(|tx| {
            let mut card = load_card(tx, job_id)?;
            let cost = {
                let item = item_mut_or_err(&mut card, item_id)?;
                let consumable = item.consumable_mut(consumable_id).ok_or({
                    LifecycleError::ConsumableNotFound {
                        item: item_id,
                        consumable: consumable_id,
                    }
                })?;
                consumable.number_of_used += quantity;
                consumable.available = true;
                consumable.cost_of(quantity)
            };
            card.actual_total_amount += cost;
            store_card(tx, &mut card, now)?;
            Ok(card)
        })
    }
}

// ─── Shared helpers ─────────────────────────────────────────────────────

fn validate_draft(draft: &JobCardDraft) -> Result<(), LifecycleError> {
    if draft.template_id.trim().is_empty() {
        return Err(LifecycleError::Validation("template id is required".into()));
    }
    if draft.shop_id.trim().is_empty() {
        return Err(LifecycleError::Validation("shop id is required".into()));
    }
    if draft.customer_id.trim().is_empty() {
        return Err(LifecycleError::Validation("customer id is required".into()));
    }
    if draft.items.is_empty() {
        return Err(LifecycleError::Validation(
            "a job card needs at least one job item".into(),
        ));
    }
    for (index, item) in draft.items.iter().enumerate() {
        if item.estimated_price < 0.0 {
            return Err(LifecycleError::Validation(format!(
                "item {} has a negative estimated price",
                index + 1
            )));
        }
        if item.consumables.iter().any(|c| c.price < 0.0) {
            return Err(LifecycleError::Validation(format!(
                "item {} has a consumable with a negative price",
                index + 1
            )));
        }
    }
    Ok(())
}

/// Loads a card inside the caller's transaction.
fn load_card(tx: &Transaction, job_id: &str) -> Result<JobCard, LifecycleError> {
    job_card_repo::find_by_id(tx, job_id)?
        .ok_or_else(|| LifecycleError::JobNotFound(job_id.to_string()))
}

/// Persists a mutated card through the revision guard.
fn store_card(
    tx: &Transaction,
    card: &mut JobCard,
    now: DateTime<Utc>,
) -> Result<(), LifecycleError> {
    card.updated_at = now;
    if !job_card_repo::update(tx, card)? {
        return Err(LifecycleError::RevisionConflict(card.id.clone()));
    }
    Ok(())
}

fn item_mut_or_err(card: &mut JobCard, item_id: u32) -> Result<&mut JobItem, LifecycleError> {
    let job = card.id.clone();
    card.item_mut(item_id)
        .ok_or(LifecycleError::ItemNotFound { job, item: item_id })
}

/// Cards past the quality gates are frozen for execution-side mutations.
fn ensure_workable(card: &JobCard) -> Result<(), LifecycleError> {
    match card.status {
        CardStatus::Approved | CardStatus::Supapproved => Err(LifecycleError::StateConflict(
            format!("job card '{}' is {}", card.id, card.status.as_str()),
        )),
        _ => Ok(()),
    }
}

// ─── Test support ───────────────────────────────────────────────────────
