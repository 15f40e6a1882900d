pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod registry;
pub mod telemetry;
pub mod timer;

pub use catalog::{CatalogError, RateCatalog, SqliteCatalog, TemplateDirectory, TemplateRef};
pub use config::{default_config_path, load_config, Config};
pub use db::{Database, DatabaseError};
pub use error::{ConfigError, ErrorKind, JobdeckError, LifecycleError, Result};
pub use lifecycle::{CardFilter, JobCardService, RejectedJobArchive};
pub use model::{
    CardStatus, Consumable, ConsumableDraft, ItemStatus, JobCard, JobCardDraft, JobItem,
    JobItemDraft, MachineAssignment, PlannedWorker, QualityStatus, WorkerAssignment,
};
pub use registry::{Machine, Registry};
pub use timer::{TimerError, TimerState};
