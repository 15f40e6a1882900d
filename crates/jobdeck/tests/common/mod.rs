//! Test harness for isolated engine execution.
//!
//! Builds an in-memory engine with a seeded template, shop rate catalog,
//! and machine registry, plus draft builders for the scenarios.

#![allow(dead_code)]

use std::sync::Arc;

use jobdeck::db::job_card_repo;
use jobdeck::{
    ConsumableDraft, Database, JobCardDraft, JobCardService, JobItemDraft, Machine, Registry,
    SqliteCatalog, TemplateRef,
};

pub const SHOP: &str = "shop-1";
pub const TEMPLATE: &str = "tpl-overhaul";

pub struct Harness {
    pub db: Database,
    pub service: JobCardService,
    pub registry: Registry,
    pub catalog: SqliteCatalog,
}

impl Harness {
    /// Engine over in-memory SQLite with:
    /// - template `tpl-overhaul`
    /// - rates for `lathe` (45.0/h) and `welder` (30.0/h) in `shop-1`
    /// - machines `m-lathe` and `m-welder` in `shop-1`
    pub fn new() -> Self {
        let db = Database::open_in_memory().expect("open in-memory DB");

        let catalog = SqliteCatalog::new(db.clone());
        catalog
            .add_template(&TemplateRef {
                id: TEMPLATE.into(),
                name: "Engine overhaul".into(),
                fields: vec!["plate".into(), "mileage".into()],
            })
            .expect("seed template");
        catalog.set_hourly_rate(SHOP, "lathe", 45.0).expect("seed rate");
        catalog.set_hourly_rate(SHOP, "welder", 30.0).expect("seed rate");

        let registry = Registry::new(db.clone());
        registry
            .register(&Machine::new("m-lathe", SHOP, "Lathe 200", "lathe"))
            .expect("seed machine");
        registry
            .register(&Machine::new("m-welder", SHOP, "Welder X", "welder"))
            .expect("seed machine");

        let shared = Arc::new(catalog.clone());
        let service = JobCardService::new(db.clone(), shared.clone(), shared);

        Self {
            db,
            service,
            registry,
            catalog,
        }
    }

    /// Registers an extra machine with a rated category.
    pub fn add_machine(&self, id: &str, category: &str, rate: f64) {
        self.catalog
            .set_hourly_rate(SHOP, category, rate)
            .expect("seed rate");
        self.registry
            .register(&Machine::new(id, SHOP, id, category))
            .expect("seed machine");
    }

    /// Moves every open timing session on the card `secs` into the past,
    /// so a subsequent pause/end observes a deterministic duration.
    pub fn rewind_open_sessions(&self, job_id: &str, secs: i64) {
        let mut card = self.service.get_job_card(job_id).expect("load card");
        for item in &mut card.items {
            for worker in &mut item.workers {
                if let Some(start) = worker.timer.start_time {
                    worker.timer.start_time = Some(start - chrono::Duration::seconds(secs));
                }
            }
            for machine in &mut item.machines {
                if let Some(start) = machine.timer.start_time {
                    machine.timer.start_time = Some(start - chrono::Duration::seconds(secs));
                }
            }
        }
        self.db
            .with_conn(|conn| {
                assert!(job_card_repo::update(conn, &mut card)?, "revision conflict");
                Ok(())
            })
            .expect("persist rewound card");
    }
}

/// One-item draft with the given machines and a standard consumable
/// (`weld wire` at 10.0).
pub fn item(machines: &[&str]) -> JobItemDraft {
    JobItemDraft {
        estimated_price: 150.0,
        machines: machines.iter().map(|m| m.to_string()).collect(),
        consumables: vec![ConsumableDraft {
            name: "weld wire".into(),
            price: 10.0,
        }],
        ..Default::default()
    }
}

pub fn card_draft(items: Vec<JobItemDraft>) -> JobCardDraft {
    JobCardDraft {
        template_id: TEMPLATE.into(),
        shop_id: SHOP.into(),
        customer_id: "cust-1".into(),
        form_data: Default::default(),
        items,
    }
}
