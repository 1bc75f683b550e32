//! Loads stored queries through the migration engine.
//!
//! Rows keep whatever shape they were saved in; every load migrates them.
//! Upgrades write the canonical form back so later loads are no-ops.

use crate::db::{DbError, Store, StoredQuery};
use crate::migrate::{encode, Migrated, MigrationEngine, MigrationError};

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error("query {0} was changed while it was being upgraded")]
    Conflict(i64),
}

/// A stored row after migration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedQuery {
    pub id: i64,
    pub dashboard_uid: String,
    pub panel_id: i64,
    #[serde(flatten)]
    pub migrated: Migrated,
}

/// Outcome of upgrading every stored query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpgradeSummary {
    pub total: usize,
    pub upgraded: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub conflicted: usize,
}

enum WriteBack {
    Unchanged,
    Written,
    Conflict,
}

#[derive(Clone)]
pub struct QueryLoader {
    store: Arc<Store>,
    engine: Arc<MigrationEngine>,
}

impl QueryLoader {
    pub fn new(store: Arc<Store>, engine: MigrationEngine) -> Self {
        Self {
            store,
            engine: Arc::new(engine),
        }
    }

    pub fn engine(&self) -> &MigrationEngine {
        &self.engine
    }

    /// Load and migrate a query without touching the stored row.
    pub fn load(&self, id: i64) -> Result<LoadedQuery, LoadError> {
        let row = self.store.get_query(id)?;
        Ok(self.migrate_row(row)?.0)
    }

    /// Load a query and write the canonical form back if migration changed it.
    ///
    /// Fails with [`LoadError::Conflict`] if the row was saved again in between.
    pub fn upgrade(&self, id: i64) -> Result<LoadedQuery, LoadError> {
        let (loaded, original) = self.migrate_row(self.store.get_query(id)?)?;
        match self.write_back(&loaded, &original)? {
            WriteBack::Conflict => Err(LoadError::Conflict(id)),
            WriteBack::Unchanged | WriteBack::Written => Ok(loaded),
        }
    }

    /// Upgrade every stored query. Rows that cannot be decoded, or that are
    /// saved again mid-upgrade, are skipped and counted; storage errors abort
    /// the run.
    pub fn upgrade_all(&self) -> Result<UpgradeSummary, LoadError> {
        let rows = self.store.get_queries()?;
        let mut summary = UpgradeSummary {
            total: rows.len(),
            ..Default::default()
        };

        for row in rows {
            let id = row.id;
            let (loaded, original) = match self.migrate_row(row) {
                Ok(migrated) => migrated,
                Err(e) => {
                    tracing::warn!("Skipping query {}: {}", id, e);
                    summary.failed += 1;
                    continue;
                }
            };
            match self.write_back(&loaded, &original)? {
                WriteBack::Written => summary.upgraded += 1,
                WriteBack::Unchanged => summary.unchanged += 1,
                WriteBack::Conflict => summary.conflicted += 1,
            }
        }

        tracing::info!(
            "Upgraded {} of {} stored queries ({} failed, {} changed during upgrade)",
            summary.upgraded,
            summary.total,
            summary.failed,
            summary.conflicted
        );
        Ok(summary)
    }

    /// Migrate a row, returning the body it was read with.
    fn migrate_row(&self, row: StoredQuery) -> Result<(LoadedQuery, String), LoadError> {
        let migrated = self.engine.migrate_str(&row.body)?;
        let loaded = LoadedQuery {
            id: row.id,
            dashboard_uid: row.dashboard_uid,
            panel_id: row.panel_id,
            migrated,
        };
        Ok((loaded, row.body))
    }

    fn write_back(&self, loaded: &LoadedQuery, original: &str) -> Result<WriteBack, LoadError> {
        if !loaded.migrated.changed() {
            return Ok(WriteBack::Unchanged);
        }
        let body = encode(&loaded.migrated.record)?;
        if !self.store.update_query_body(loaded.id, original, &body)? {
            tracing::warn!(
                "Query {} changed while upgrading, leaving the newer version",
                loaded.id
            );
            return Ok(WriteBack::Conflict);
        }
        tracing::info!(
            "Query {} upgraded: {}",
            loaded.id,
            loaded.migrated.applied.join(", ")
        );
        Ok(WriteBack::Written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::QueryDefaults;
    use serde_json::json;
    use tempfile::NamedTempFile;

    fn setup() -> (NamedTempFile, Arc<Store>) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        (tmp, store)
    }

    fn save(store: &Store, body: serde_json::Value) -> i64 {
        let mut row = StoredQuery {
            body: body.to_string(),
            ..Default::default()
        };
        store.add_query(&mut row).unwrap()
    }

    #[test]
    fn test_load_does_not_write() {
        let (_tmp, store) = setup();
        let raw = json!({ "azureMonitor": { "timeGrain": "5", "timeGrainUnit": "minute" } });
        let id = save(&store, raw.clone());

        let loader = QueryLoader::new(store.clone(), MigrationEngine::new());
        let loaded = loader.load(id).unwrap();
        assert_eq!(
            loaded.migrated.record.azure_monitor.unwrap().time_grain.as_deref(),
            Some("PT5M")
        );
        assert_eq!(store.get_query(id).unwrap().body, raw.to_string());
    }

    #[test]
    fn test_upgrade_writes_back_once() {
        let (_tmp, store) = setup();
        let id = save(
            &store,
            json!({ "azureLogAnalytics": { "query": "T | where t > $__from " } }),
        );
        let loader = QueryLoader::new(store.clone(), MigrationEngine::new());

        let first = loader.upgrade(id).unwrap();
        assert_eq!(first.migrated.applied, vec!["macro-tokens"]);
        assert!(store.get_query(id).unwrap().body.contains("$__timeFrom()"));

        let second = loader.upgrade(id).unwrap();
        assert!(second.migrated.applied.is_empty());
    }

    #[test]
    fn test_upgrade_all_counts() {
        let (_tmp, store) = setup();
        save(&store, json!({ "azureMonitor": { "dimension": "Tier", "dimensionFilter": "gold" } }));
        save(&store, json!({ "refId": "B" }));
        save(&store, json!({ "azureMonitor": "broken" }));

        let loader = QueryLoader::new(store, MigrationEngine::new());
        let summary = loader.upgrade_all().unwrap();
        assert_eq!(
            summary,
            UpgradeSummary {
                total: 3,
                upgraded: 1,
                unchanged: 1,
                failed: 1,
                conflicted: 0,
            }
        );

        let again = loader.upgrade_all().unwrap();
        assert_eq!(again.upgraded, 0);
        assert_eq!(again.unchanged, 2);
    }

    #[test]
    fn test_load_applies_defaults() {
        let (_tmp, store) = setup();
        let id = save(&store, json!({ "refId": "A" }));
        let engine = MigrationEngine::new().with_defaults(QueryDefaults::default().with_workspace("ws"));
        let loader = QueryLoader::new(store, engine);

        let loaded = loader.load(id).unwrap();
        let logs = loaded.migrated.record.azure_log_analytics.unwrap();
        assert_eq!(logs.workspace.as_deref(), Some("ws"));
    }

    #[test]
    fn test_write_back_keeps_newer_save() {
        let (_tmp, store) = setup();
        let id = save(&store, json!({ "azureMonitor": { "timeGrain": "5", "timeGrainUnit": "minute" } }));
        let loader = QueryLoader::new(store.clone(), MigrationEngine::new());

        let (loaded, original) = loader.migrate_row(store.get_query(id).unwrap()).unwrap();

        // an editor saves the panel before the upgrade lands
        let mut edited = store.get_query(id).unwrap();
        edited.body = json!({ "refId": "edited" }).to_string();
        store.update_query(&edited).unwrap();

        assert!(matches!(
            loader.write_back(&loaded, &original).unwrap(),
            WriteBack::Conflict
        ));
        assert_eq!(store.get_query(id).unwrap().body, edited.body);
    }

    #[test]
    fn test_upgrade_all_after_concurrent_save() {
        let (_tmp, store) = setup();
        let id = save(&store, json!({ "azureLogAnalytics": { "query": "T | where t > $__from " } }));
        let loader = QueryLoader::new(store.clone(), MigrationEngine::new());

        let (loaded, original) = loader.migrate_row(store.get_query(id).unwrap()).unwrap();
        let mut edited = store.get_query(id).unwrap();
        edited.body = json!({ "azureLogAnalytics": { "query": "Edited | where t > $__from " } }).to_string();
        store.update_query(&edited).unwrap();
        assert!(matches!(
            loader.write_back(&loaded, &original).unwrap(),
            WriteBack::Conflict
        ));

        // the next run upgrades the newer body
        let summary = loader.upgrade_all().unwrap();
        assert_eq!(summary.upgraded, 1);
        assert!(store.get_query(id).unwrap().body.contains("Edited | where t > $__timeFrom()"));
    }

    #[test]
    fn test_missing_row() {
        let (_tmp, store) = setup();
        let loader = QueryLoader::new(store, MigrationEngine::new());
        assert!(matches!(
            loader.load(42),
            Err(LoadError::Db(DbError::NotFound))
        ));
    }
}
