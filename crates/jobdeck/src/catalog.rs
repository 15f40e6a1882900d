//! External collaborator interfaces: form templates and shop rate catalogs.
//!
//! The engine only needs a template id to resolve to *something* before job
//! creation proceeds, and a machine category to resolve to an hourly-rate
//! snapshot. Hosts may plug in their own directory; [`SqliteCatalog`] is
//! the bundled implementation backed by the engine database.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::{catalog_repo, Database, DatabaseError};

/// Errors from catalog lookups.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// A host-provided catalog failed in its own way.
    #[error("Catalog backend error: {0}")]
    Backend(String),
}

/// A resolved form template: the externally-defined field schema for
/// `form_data`/`item_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRef {
    pub id: String,
    pub name: String,
    /// Field ids the template defines. Validation of submitted values
    /// against these is a host concern.
    pub fields: Vec<String>,
}

/// Resolves template ids at job creation.
pub trait TemplateDirectory: Send + Sync {
    /// `None` when the template is unknown.
    fn resolve(&self, template_id: &str) -> Result<Option<TemplateRef>, CatalogError>;
}

/// Supplies per-shop hourly rates for machine categories.
pub trait RateCatalog: Send + Sync {
    /// `None` when the shop has no rate for the category.
    fn hourly_rate(&self, shop_id: &str, category: &str) -> Result<Option<f64>, CatalogError>;
}

/// Catalog implementation backed by the engine database.
#[derive(Clone)]
pub struct SqliteCatalog {
    db: Database,
}

impl SqliteCatalog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Adds or replaces a template definition.
    pub fn add_template(&self, template: &TemplateRef) -> Result<(), CatalogError> {
        self.db
            .with_conn(|conn| catalog_repo::upsert_template(conn, template))?;
        Ok(())
    }

    /// Sets the hourly rate for a machine category within a shop.
    pub fn set_hourly_rate(
        &self,
        shop_id: &str,
        category: &str,
        hourly_rate: f64,
    ) -> Result<(), CatalogError> {
        self.db
            .with_conn(|conn| catalog_repo::upsert_rate(conn, shop_id, category, hourly_rate))?;
        Ok(())
    }
}

impl TemplateDirectory for SqliteCatalog {
    fn resolve(&self, template_id: &str) -> Result<Option<TemplateRef>, CatalogError> {
        let template = self
            .db
            .with_conn(|conn| catalog_repo::find_template(conn, template_id))?;
        Ok(template)
    }
}

impl RateCatalog for SqliteCatalog {
    fn hourly_rate(&self, shop_id: &str, category: &str) -> Result<Option<f64>, CatalogError> {
        let rate = self
            .db
            .with_conn(|conn| catalog_repo::find_rate(conn, shop_id, category))?;
        Ok(rate)
    }
}
