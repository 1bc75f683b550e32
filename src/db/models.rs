//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A panel query as saved on disk. `body` is the query JSON in whatever
/// shape it was written; it is only migrated on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredQuery {
    pub id: i64,
    pub dashboard_uid: String,
    pub panel_id: i64,
    pub ref_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for StoredQuery {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            dashboard_uid: String::new(),
            panel_id: 0,
            ref_id: String::new(),
            body: "{}".to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}
