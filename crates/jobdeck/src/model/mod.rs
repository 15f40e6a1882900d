pub mod card;
pub mod form;

pub use card::{
    CardStatus, Consumable, ConsumableDraft, ItemStatus, JobCard, JobCardDraft, JobItem,
    JobItemDraft, MachineAssignment, PlannedWorker, QualityStatus, WorkerAssignment,
};
pub use form::{FormData, FormValue};
