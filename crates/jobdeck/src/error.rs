use std::path::PathBuf;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::db::DatabaseError;
use crate::timer::TimerError;

#[derive(Error, Debug)]
pub enum JobdeckError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Failures from job-card lifecycle operations.
///
/// Every variant maps onto one of the caller-facing [`ErrorKind`]s so a
/// transport layer can translate without matching each variant.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Job card '{0}' not found")]
    JobNotFound(String),

    #[error("Job item {item} not found on job card '{job}'")]
    ItemNotFound { job: String, item: u32 },

    #[error("Worker '{worker}' is not assigned to job item {item}")]
    WorkerNotAssigned { worker: String, item: u32 },

    #[error("Machine '{machine}' is not assigned to job item {item}")]
    MachineNotAssigned { machine: String, item: u32 },

    #[error("Machine '{0}' not found")]
    MachineNotFound(String),

    #[error("Template '{0}' not found")]
    TemplateNotFound(String),

    #[error("No hourly rate for machine category '{category}' in shop '{shop}'")]
    RateNotFound { shop: String, category: String },

    #[error("Consumable {consumable} not found on job item {item}")]
    ConsumableNotFound { item: u32, consumable: u32 },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),

    #[error("Invalid state: {0}")]
    StateConflict(String),

    #[error("Machine '{machine}' is already held by job '{holder}'")]
    MachineHeld { machine: String, holder: String },

    #[error("Job card '{0}' was modified concurrently, retry the operation")]
    RevisionConflict(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Caller-facing failure classification (none of these are retried
/// automatically; `ResourceConflict` is the only kind worth retrying
/// as a whole operation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    StateConflict,
    ResourceConflict,
    Storage,
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::JobNotFound(_)
            | Self::ItemNotFound { .. }
            | Self::WorkerNotAssigned { .. }
            | Self::MachineNotAssigned { .. }
            | Self::MachineNotFound(_)
            | Self::TemplateNotFound(_)
            | Self::RateNotFound { .. }
            | Self::ConsumableNotFound { .. } => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Timer(_) | Self::StateConflict(_) => ErrorKind::StateConflict,
            Self::MachineHeld { .. } | Self::RevisionConflict(_) => ErrorKind::ResourceConflict,
            Self::Database(_) | Self::Catalog(_) => ErrorKind::Storage,
        }
    }
}

pub type Result<T> = std::result::Result<T, JobdeckError>;
