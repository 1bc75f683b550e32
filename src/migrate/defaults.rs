//! Editor defaults filled into a record before it is migrated.
//!
//! Only missing values are filled; nothing present is ever overwritten, and
//! legacy-only fields are never defaulted.

use super::duration::AUTO;
use super::record::{
    InsightsAnalyticsQuery, LogsQuery, QueryType, StoredAppInsightsQuery, StoredMetricsQuery,
    StoredQueryRecord, UNSET_PLACEHOLDER,
};

/// Starter query shown to users opening an empty Logs query.
pub const SAMPLE_LOGS_QUERY: &str = "//change this example to create your own time series query
<table name>                                                              //the table to query (e.g. Usage, Heartbeat, Perf)
| where $__timeFilter(TimeGenerated)                                      //this is a macro used to show the full chart's time range, choose the datetime column here
| summarize count() by <group by column>, bin(TimeGenerated, $__interval) //change \"group by column\" to a column in your table, such as \"Computer\". The $__interval macro is used to auto-select the time grain. Can also use 1h, 5m etc.
| order by TimeGenerated asc";

pub const TIME_SERIES_FORMAT: &str = "time_series";

#[derive(Debug, Clone, PartialEq)]
pub struct QueryDefaults {
    pub query_type: QueryType,
    pub metrics_time_grain: String,
    pub metrics_top: String,
    pub logs_query: String,
    pub logs_result_format: String,
    /// Empty means "leave the workspace unset".
    pub logs_workspace: String,
    pub app_insights_metric_name: String,
    pub app_insights_time_grain: String,
    pub analytics_query: String,
    pub analytics_result_format: String,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            query_type: QueryType::Metrics,
            metrics_time_grain: AUTO.to_string(),
            metrics_top: "10".to_string(),
            logs_query: SAMPLE_LOGS_QUERY.to_string(),
            logs_result_format: TIME_SERIES_FORMAT.to_string(),
            logs_workspace: String::new(),
            app_insights_metric_name: UNSET_PLACEHOLDER.to_string(),
            app_insights_time_grain: AUTO.to_string(),
            analytics_query: String::new(),
            analytics_result_format: TIME_SERIES_FORMAT.to_string(),
        }
    }
}

impl QueryDefaults {
    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.logs_workspace = workspace.into();
        self
    }

    /// Fill missing sub-records and fields. Returns `true` if anything was added.
    pub fn apply(&self, record: &mut StoredQueryRecord) -> bool {
        let mut changed = fill(&mut record.query_type, || self.query_type.clone());

        changed |= fill(&mut record.azure_monitor, StoredMetricsQuery::default);
        if let Some(metrics) = record.azure_monitor.as_mut() {
            changed |= fill(&mut metrics.time_grain, || self.metrics_time_grain.clone());
            changed |= fill(&mut metrics.top, || self.metrics_top.clone());
        }

        changed |= fill(&mut record.azure_log_analytics, LogsQuery::default);
        if let Some(logs) = record.azure_log_analytics.as_mut() {
            changed |= fill(&mut logs.query, || self.logs_query.clone());
            changed |= fill(&mut logs.result_format, || self.logs_result_format.clone());
            if !self.logs_workspace.is_empty() {
                changed |= fill(&mut logs.workspace, || self.logs_workspace.clone());
            }
        }

        changed |= fill(&mut record.app_insights, StoredAppInsightsQuery::default);
        if let Some(app) = record.app_insights.as_mut() {
            changed |= fill(&mut app.metric_name, || self.app_insights_metric_name.clone());
            changed |= fill(&mut app.time_grain, || self.app_insights_time_grain.clone());
        }

        changed |= fill(&mut record.insights_analytics, InsightsAnalyticsQuery::default);
        if let Some(analytics) = record.insights_analytics.as_mut() {
            changed |= fill(&mut analytics.query, || self.analytics_query.clone());
            changed |= fill(&mut analytics.result_format, || {
                self.analytics_result_format.clone()
            });
        }

        changed
    }
}

fn fill<T>(slot: &mut Option<T>, value: impl FnOnce() -> T) -> bool {
    if slot.is_some() {
        return false;
    }
    *slot = Some(value());
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fills_empty_record() {
        let mut record = StoredQueryRecord::default();
        let defaults = QueryDefaults::default().with_workspace("ws-1");
        assert!(defaults.apply(&mut record));

        assert_eq!(record.query_type, Some(QueryType::Metrics));
        let metrics = record.azure_monitor.as_ref().unwrap();
        assert_eq!(metrics.time_grain.as_deref(), Some("auto"));
        assert_eq!(metrics.top.as_deref(), Some("10"));
        assert!(metrics.dimension_filter.is_none());
        assert!(metrics.time_grains.is_none());

        let logs = record.azure_log_analytics.as_ref().unwrap();
        assert!(logs.query.as_deref().unwrap().contains("$__timeFilter(TimeGenerated)"));
        assert_eq!(logs.workspace.as_deref(), Some("ws-1"));

        let app = record.app_insights.as_ref().unwrap();
        assert_eq!(app.metric_name.as_deref(), Some("select"));

        let analytics = record.insights_analytics.as_ref().unwrap();
        assert_eq!(analytics.query.as_deref(), Some(""));
        assert_eq!(analytics.result_format.as_deref(), Some("time_series"));
    }

    #[test]
    fn test_never_overwrites() {
        let mut record = StoredQueryRecord {
            query_type: Some(QueryType::Logs),
            azure_monitor: Some(StoredMetricsQuery {
                time_grain: Some("5".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        QueryDefaults::default().apply(&mut record);

        assert_eq!(record.query_type, Some(QueryType::Logs));
        assert_eq!(
            record.azure_monitor.unwrap().time_grain.as_deref(),
            Some("5")
        );
    }

    #[test]
    fn test_empty_workspace_stays_unset() {
        let mut record = StoredQueryRecord::default();
        QueryDefaults::default().apply(&mut record);
        assert!(record.azure_log_analytics.unwrap().workspace.is_none());
    }

    #[test]
    fn test_second_apply_is_noop() {
        let mut record = StoredQueryRecord::default();
        let defaults = QueryDefaults::default();
        defaults.apply(&mut record);
        assert!(!defaults.apply(&mut record));
    }
}
