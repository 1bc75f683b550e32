//! Query-schema migration engine.
//!
//! Takes a stored panel query in any historical shape and produces the
//! canonical record. The pipeline is a fixed, ordered list of named steps;
//! each step is idempotent, so migrating an already current record is a
//! no-op.

mod defaults;
mod dimension_filter;
mod lenient;
pub mod duration;
mod record;
mod rename;
mod steps;

pub use defaults::QueryDefaults;
pub use record::*;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Errors at the JSON boundary of the engine. The steps themselves never fail.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("cannot read query record: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("cannot write query record: {0}")]
    Encode(#[source] serde_json::Error),
}

/// One named step of the pipeline.
#[derive(Clone, Copy)]
pub struct MigrationStep {
    pub name: &'static str,
    pub description: &'static str,
    apply: fn(&mut StoredQueryRecord) -> bool,
}

impl std::fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationStep")
            .field("name", &self.name)
            .finish()
    }
}

/// Name reported when [`QueryDefaults`] filled anything in.
pub const DEFAULTS_STEP: &str = "defaults";

/// The pipeline, in the order it runs.
pub const MIGRATION_STEPS: [MigrationStep; 6] = [
    MigrationStep {
        name: "time-grains",
        description: "count + unit time grains to ISO-8601; legacy grain lists to allowedTimeGrainsMs",
        apply: steps::migrate_time_grains,
    },
    MigrationStep {
        name: "macro-tokens",
        description: "$__from / $__to to $__timeFrom() / $__timeTo() in logs queries",
        apply: steps::migrate_macro_tokens,
    },
    MigrationStep {
        name: "default-namespace",
        description: "metricNamespace defaults to metricDefinition",
        apply: steps::migrate_default_namespace,
    },
    MigrationStep {
        name: "app-insights-keys",
        description: "old App Insights keys renamed to the shared column names",
        apply: steps::migrate_app_insights_keys,
    },
    MigrationStep {
        name: "app-insights-dimensions",
        description: "App Insights dimension becomes a list",
        apply: steps::migrate_app_insights_dimensions,
    },
    MigrationStep {
        name: "dimension-filters",
        description: "single metrics dimension + filter to a dimensionFilters list",
        apply: steps::migrate_dimension_filters,
    },
];

/// A migrated record and the steps that changed it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Migrated {
    pub record: QueryRecord,
    pub applied: Vec<&'static str>,
}

impl Migrated {
    /// Whether the stored form differs from the canonical one.
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MigrationEngine {
    defaults: Option<QueryDefaults>,
}

impl MigrationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill missing fields from `defaults` before the steps run.
    pub fn with_defaults(mut self, defaults: QueryDefaults) -> Self {
        self.defaults = Some(defaults);
        self
    }

    pub fn steps(&self) -> &'static [MigrationStep] {
        &MIGRATION_STEPS
    }

    pub fn migrate(&self, record: StoredQueryRecord) -> QueryRecord {
        self.migrate_with_report(record).record
    }

    pub fn migrate_with_report(&self, mut record: StoredQueryRecord) -> Migrated {
        let mut applied = Vec::new();

        if let Some(defaults) = &self.defaults {
            if defaults.apply(&mut record) {
                applied.push(DEFAULTS_STEP);
            }
        }

        for step in &MIGRATION_STEPS {
            if (step.apply)(&mut record) {
                tracing::debug!("query {}: applied {}", record.ref_id, step.name);
                applied.push(step.name);
            }
        }

        Migrated {
            record: record.into(),
            applied,
        }
    }

    /// Decode a stored JSON value and migrate it.
    pub fn migrate_value(&self, value: Value) -> Result<Migrated, MigrationError> {
        let stored: StoredQueryRecord =
            serde_json::from_value(value).map_err(MigrationError::Decode)?;
        Ok(self.migrate_with_report(stored))
    }

    /// Decode a stored JSON document and migrate it.
    pub fn migrate_str(&self, body: &str) -> Result<Migrated, MigrationError> {
        let stored: StoredQueryRecord =
            serde_json::from_str(body).map_err(MigrationError::Decode)?;
        Ok(self.migrate_with_report(stored))
    }
}

/// Serialize a canonical record for storage.
pub fn encode(record: &QueryRecord) -> Result<String, MigrationError> {
    serde_json::to_string(record).map_err(MigrationError::Encode)
}
