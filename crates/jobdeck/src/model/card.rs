//! Job card aggregate: the card, its embedded items, and their worker,
//! machine, and consumable records.
//!
//! Items and consumables live in an arena owned exclusively by the card,
//! addressed by small stable ids — nothing outside the owning card holds
//! an assignment by identity.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::form::FormData;
use crate::timer::TimerState;

/// Job card status: waiting, pending, in_progress, completed,
/// supapproved, approved, rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    Waiting,
    Pending,
    InProgress,
    Completed,
    Supapproved,
    Approved,
    Rejected,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Supapproved => "supapproved",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "supapproved" => Some(Self::Supapproved),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Terminal quality states — the customer verification gate re-opens
    /// cards from exactly these.
    pub fn is_quality_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Waiting,
    Pending,
    InProgress,
    Completed,
    Approved,
    Rejected,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Work on the item is done (it may still await or have passed QA).
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Approved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityStatus {
    Good,
    NeedsWork,
}

/// Planned staffing for an item — planning data, not execution state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedWorker {
    pub category: String,
    pub hours: f64,
    pub count: u32,
    pub hourly_rate: f64,
}

/// A timed allocation of one worker to one job item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerAssignment {
    pub worker_id: String,
    #[serde(flatten)]
    pub timer: TimerState,
}

impl WorkerAssignment {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            timer: TimerState::default(),
        }
    }
}

/// A timed allocation of one machine to one job item.
///
/// `machine_rate` is an hourly-rate snapshot taken from the shop's
/// machine-category catalog at job creation, not a live reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineAssignment {
    pub machine_id: String,
    pub machine_rate: f64,
    #[serde(flatten)]
    pub timer: TimerState,
}

impl MachineAssignment {
    pub fn new(machine_id: impl Into<String>, machine_rate: f64) -> Self {
        Self {
            machine_id: machine_id.into(),
            machine_rate,
            timer: TimerState::default(),
        }
    }
}

/// A tracked part/material whose usage accrues cost. Append-only: nothing
/// decrements `number_of_used`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consumable {
    pub id: u32,
    pub name: String,
    pub price: f64,
    pub available: bool,
    pub number_of_used: u32,
}

impl Consumable {
    /// Cost of using `qty` units at the recorded price.
    pub fn cost_of(&self, qty: u32) -> f64 {
        self.price * f64::from(qty)
    }
}

/// One unit of work within a job card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobItem {
    pub id: u32,
    #[serde(default)]
    pub item_data: FormData,
    pub estimated_price: f64,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_status: Option<QualityStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub allowed_workers: Vec<PlannedWorker>,
    #[serde(default)]
    pub workers: Vec<WorkerAssignment>,
    #[serde(default)]
    pub machines: Vec<MachineAssignment>,
    #[serde(default)]
    pub consumables: Vec<Consumable>,
}

impl JobItem {
    pub fn worker(&self, worker_id: &str) -> Option<&WorkerAssignment> {
        self.workers.iter().find(|w| w.worker_id == worker_id)
    }

    pub fn worker_mut(&mut self, worker_id: &str) -> Option<&mut WorkerAssignment> {
        self.workers.iter_mut().find(|w| w.worker_id == worker_id)
    }

    pub fn machine(&self, machine_id: &str) -> Option<&MachineAssignment> {
        self.machines.iter().find(|m| m.machine_id == machine_id)
    }

    pub fn machine_mut(&mut self, machine_id: &str) -> Option<&mut MachineAssignment> {
        self.machines.iter_mut().find(|m| m.machine_id == machine_id)
    }

    pub fn consumable_mut(&mut self, consumable_id: u32) -> Option<&mut Consumable> {
        self.consumables.iter_mut().find(|c| c.id == consumable_id)
    }

    /// Completion gate: every worker assignment must carry an end time.
    /// Pause alone does not satisfy this.
    pub fn all_workers_ended(&self) -> bool {
        self.workers.iter().all(|w| w.timer.is_ended())
    }

    /// Total seconds accrued by this item's workers.
    pub fn worker_seconds(&self) -> i64 {
        self.workers.iter().map(|w| w.timer.actual_duration_secs).sum()
    }

    pub fn machine_ids(&self) -> impl Iterator<Item = &str> {
        self.machines.iter().map(|m| m.machine_id.as_str())
    }

    /// Quality-rejection rollback: re-opens every worker and machine
    /// assignment. Accrued durations are preserved.
    pub fn reset_assignments_for_rework(&mut self) {
        for worker in &mut self.workers {
            worker.timer.reset_for_rework();
        }
        for machine in &mut self.machines {
            machine.timer.reset_for_rework();
        }
    }
}

/// One customer work order — the aggregate root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCard {
    pub id: String,
    /// Human-readable number, date + storage-layer sequence.
    pub card_number: String,
    pub template_id: String,
    pub shop_id: String,
    pub customer_id: String,
    pub status: CardStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_status: Option<QualityStatus>,
    #[serde(default)]
    pub form_data: FormData,
    pub items: Vec<JobItem>,
    pub total_estimated_amount: f64,
    pub actual_total_amount: f64,
    /// Seconds accumulated across all workers, rolled up at item completion.
    pub actual_man_seconds: i64,
    #[serde(default)]
    pub is_verified_by_user: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_verified_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Arena counter for item ids.
    pub next_item_id: u32,
    /// Optimistic-concurrency token, mirrored from the storage row.
    #[serde(default)]
    pub revision: i64,
}

impl JobCard {
    pub fn item(&self, item_id: u32) -> Option<&JobItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn item_mut(&mut self, item_id: u32) -> Option<&mut JobItem> {
        self.items.iter_mut().find(|i| i.id == item_id)
    }

    /// Every item's work is done (completed or already approved).
    pub fn all_items_finished(&self) -> bool {
        self.items.iter().all(|i| i.status.is_finished())
    }

    pub fn all_items_approved(&self) -> bool {
        self.items.iter().all(|i| i.status == ItemStatus::Approved)
    }

    /// Distinct ids of every machine referenced anywhere in the card.
    pub fn machine_ids(&self) -> BTreeSet<String> {
        self.items
            .iter()
            .flat_map(|i| i.machine_ids().map(str::to_string))
            .collect()
    }
}

// ─── Creation drafts ────────────────────────────────────────────────────────

/// Input to job card creation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobCardDraft {
    pub template_id: String,
    pub shop_id: String,
    pub customer_id: String,
    #[serde(default)]
    pub form_data: FormData,
    pub items: Vec<JobItemDraft>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobItemDraft {
    #[serde(default)]
    pub item_data: FormData,
    #[serde(default)]
    pub estimated_price: f64,
    #[serde(default)]
    pub allowed_workers: Vec<PlannedWorker>,
    /// Machine ids required by this item; each is resolved against the
    /// registry and the shop rate catalog at creation time.
    #[serde(default)]
    pub machines: Vec<String>,
    #[serde(default)]
    pub consumables: Vec<ConsumableDraft>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsumableDraft {
    pub name: String,
    pub price: f64,
}
