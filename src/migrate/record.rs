//! Query record shapes.
//!
//! `Stored*` types accept every historical layout of a panel query, with the
//! legacy fields spelled out. The canonical types are what the rest of the
//! service works with after migration. Fields this crate does not model ride
//! along in a flattened `extra` map so nothing unknown is dropped.

use super::lenient;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Placeholder the legacy editor stored for "nothing selected yet".
pub const UNSET_PLACEHOLDER: &str = "select";

/// Which datasource sub-record is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryType {
    #[serde(rename = "Azure Monitor")]
    Metrics,
    #[serde(rename = "Azure Log Analytics")]
    Logs,
    #[serde(rename = "Application Insights")]
    AppInsights,
    #[serde(rename = "Insights Analytics")]
    InsightsAnalytics,
    /// Any query type this build does not know; kept verbatim.
    #[serde(untagged)]
    Other(String),
}

/// Query types stored as numbers or unknown names are kept as [`QueryType::Other`].
fn query_type_or_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<QueryType>, D::Error> {
    let name = match lenient::opt_text(d)? {
        Some(name) if !name.is_empty() => name,
        _ => return Ok(None),
    };
    Ok(Some(
        serde_json::from_value(Value::String(name.clone())).unwrap_or(QueryType::Other(name)),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Ne,
}

/// One dimension predicate on a metrics query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionFilter {
    #[serde(default, deserialize_with = "lenient::text_or_default")]
    pub dimension: String,
    pub operator: FilterOperator,
    #[serde(default, deserialize_with = "lenient::text_or_default")]
    pub filter: String,
}

/// Legacy grain descriptor: `{text, value}` or, in some old panels, a bare string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LegacyTimeGrain {
    Descriptor {
        #[serde(default, deserialize_with = "lenient::opt_text")]
        text: Option<String>,
        #[serde(deserialize_with = "lenient::text")]
        value: String,
    },
    Bare(#[serde(deserialize_with = "lenient::text")] String),
}

impl LegacyTimeGrain {
    pub fn value(&self) -> &str {
        match self {
            LegacyTimeGrain::Descriptor { value, .. } => value,
            LegacyTimeGrain::Bare(value) => value,
        }
    }
}

// ============================================================================
// Stored (any historical shape)
// ============================================================================

/// A query record as read from a dashboard, in whatever shape it was saved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredQueryRecord {
    #[serde(default, deserialize_with = "lenient::text_or_default")]
    pub ref_id: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "query_type_or_text"
    )]
    pub query_type: Option<QueryType>,
    #[serde(default, deserialize_with = "lenient::text_or_default")]
    pub subscription: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_monitor: Option<StoredMetricsQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_log_analytics: Option<LogsQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_insights: Option<StoredAppInsightsQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insights_analytics: Option<InsightsAnalyticsQuery>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMetricsQuery {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub resource_group: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub metric_definition: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub resource_name: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub metric_namespace: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub metric_name: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub aggregation: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub top: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub alias: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub time_grain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_filters: Option<Vec<DimensionFilter>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_ms_list"
    )]
    pub allowed_time_grains_ms: Option<Vec<u64>>,

    // legacy
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub time_grain_unit: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub dimension: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub dimension_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_grains: Option<Vec<LegacyTimeGrain>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAppInsightsQuery {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub metric_name: Option<String>,
    /// Either a list of strings or, in old panels, one bare value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<Value>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text_list"
    )]
    pub dimensions: Option<Vec<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub dimension_filter: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub aggregation: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text_list"
    )]
    pub agg_options: Option<Vec<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub time_column: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub value_column: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub segment_column: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub time_grain: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub time_grain_count: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub time_grain_unit: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub time_grain_type: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_ms_list"
    )]
    pub allowed_time_grains_ms: Option<Vec<u64>>,

    // legacy; the pre-rename keys (xaxis, groupBy, ...) stay in `extra`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_grains: Option<Vec<LegacyTimeGrain>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Canonical
// ============================================================================

/// A query record in the current schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRecord {
    #[serde(default, deserialize_with = "lenient::text_or_default")]
    pub ref_id: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "query_type_or_text"
    )]
    pub query_type: Option<QueryType>,
    #[serde(default, deserialize_with = "lenient::text_or_default")]
    pub subscription: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_monitor: Option<MetricsQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_log_analytics: Option<LogsQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_insights: Option<AppInsightsQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insights_analytics: Option<InsightsAnalyticsQuery>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsQuery {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub resource_group: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub metric_definition: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub resource_name: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub metric_namespace: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub metric_name: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub aggregation: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub top: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub alias: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub time_grain: Option<String>,
    #[serde(default)]
    pub dimension_filters: Vec<DimensionFilter>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_ms_list"
    )]
    pub allowed_time_grains_ms: Option<Vec<u64>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInsightsQuery {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub metric_name: Option<String>,
    #[serde(default)]
    pub dimension: Vec<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text_list"
    )]
    pub dimensions: Option<Vec<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub dimension_filter: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub aggregation: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text_list"
    )]
    pub agg_options: Option<Vec<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub time_column: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub value_column: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub segment_column: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub time_grain: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub time_grain_count: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub time_grain_unit: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub time_grain_type: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_ms_list"
    )]
    pub allowed_time_grains_ms: Option<Vec<u64>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsQuery {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub query: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub result_format: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub workspace: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightsAnalyticsQuery {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub query: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_text"
    )]
    pub result_format: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MetricsQuery {
    /// Interval the backend should use when the grain is `auto`.
    pub fn auto_interval(&self) -> Option<String> {
        super::duration::auto_interval(
            self.time_grain.as_deref(),
            self.allowed_time_grains_ms.as_deref().unwrap_or_default(),
        )
    }
}

impl AppInsightsQuery {
    /// Interval the backend should use when the grain is `auto`.
    pub fn auto_interval(&self) -> Option<String> {
        super::duration::auto_interval(
            self.time_grain.as_deref(),
            self.allowed_time_grains_ms.as_deref().unwrap_or_default(),
        )
    }
}

// ============================================================================
// Stored -> canonical
// ============================================================================

impl From<StoredQueryRecord> for QueryRecord {
    fn from(stored: StoredQueryRecord) -> Self {
        Self {
            ref_id: stored.ref_id,
            query_type: stored.query_type,
            subscription: stored.subscription,
            azure_monitor: stored.azure_monitor.map(Into::into),
            azure_log_analytics: stored.azure_log_analytics,
            app_insights: stored.app_insights.map(Into::into),
            insights_analytics: stored.insights_analytics,
            extra: stored.extra,
        }
    }
}

/// Projects onto the canonical shape. Legacy fields a fail-soft step left in
/// place are parked in `extra` under their original keys, so the next load
/// sees them again.
impl From<StoredMetricsQuery> for MetricsQuery {
    fn from(q: StoredMetricsQuery) -> Self {
        let mut extra = q.extra;
        park(&mut extra, "timeGrainUnit", q.time_grain_unit);
        park(&mut extra, "dimension", q.dimension);
        park(&mut extra, "dimensionFilter", q.dimension_filter);
        park(&mut extra, "timeGrains", q.time_grains);

        Self {
            resource_group: q.resource_group,
            metric_definition: q.metric_definition,
            resource_name: q.resource_name,
            metric_namespace: q.metric_namespace,
            metric_name: q.metric_name,
            aggregation: q.aggregation,
            top: q.top,
            alias: q.alias,
            time_grain: q.time_grain,
            dimension_filters: q.dimension_filters.unwrap_or_default(),
            allowed_time_grains_ms: q.allowed_time_grains_ms,
            extra,
        }
    }
}

impl From<StoredAppInsightsQuery> for AppInsightsQuery {
    fn from(q: StoredAppInsightsQuery) -> Self {
        let mut extra = q.extra;
        park(&mut extra, "timeGrains", q.time_grains);

        Self {
            metric_name: q.metric_name,
            dimension: dimension_list(q.dimension),
            dimensions: q.dimensions,
            dimension_filter: q.dimension_filter,
            aggregation: q.aggregation,
            agg_options: q.agg_options,
            time_column: q.time_column,
            value_column: q.value_column,
            segment_column: q.segment_column,
            time_grain: q.time_grain,
            time_grain_count: q.time_grain_count,
            time_grain_unit: q.time_grain_unit,
            time_grain_type: q.time_grain_type,
            allowed_time_grains_ms: q.allowed_time_grains_ms,
            extra,
        }
    }
}

/// Normalize an App Insights `dimension` value to a list.
///
/// Missing, null, `false` and the empty string mean "no group-by". A bare
/// string becomes a one-element list. List members and other scalars are
/// rendered as text.
pub fn dimension_list(value: Option<Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Vec::new(),
        Some(Value::String(s)) if s.is_empty() => Vec::new(),
        Some(Value::String(s)) => vec![s],
        Some(Value::Array(items)) => items.into_iter().map(value_text).collect(),
        Some(other) => vec![value_text(other)],
    }
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn park<T: Serialize>(extra: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(value) = value {
        if let Ok(value) = serde_json::to_value(value) {
            extra.insert(key.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_type_names() {
        let t: QueryType = serde_json::from_value(json!("Azure Monitor")).unwrap();
        assert_eq!(t, QueryType::Metrics);
        let t: QueryType = serde_json::from_value(json!("Azure Resource Graph")).unwrap();
        assert_eq!(t, QueryType::Other("Azure Resource Graph".to_string()));
        assert_eq!(
            serde_json::to_value(QueryType::AppInsights).unwrap(),
            json!("Application Insights")
        );
    }

    #[test]
    fn test_unknown_fields_pass_through() {
        let raw = json!({
            "refId": "A",
            "subscription": "sub",
            "hide": true,
            "azureMonitor": { "metricName": "Percentage CPU", "customThing": [1, 2] }
        });
        let stored: StoredQueryRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(stored.extra.get("hide"), Some(&json!(true)));
        let metrics = stored.azure_monitor.as_ref().unwrap();
        assert_eq!(metrics.extra.get("customThing"), Some(&json!([1, 2])));
        assert!(metrics.extra.get("metricName").is_none());

        let back = serde_json::to_value(&stored).unwrap();
        assert_eq!(back["azureMonitor"]["customThing"], json!([1, 2]));
        assert_eq!(back["hide"], json!(true));
    }

    #[test]
    fn test_nulls_and_numbers_decode() {
        let raw = json!({
            "refId": null,
            "subscription": null,
            "queryType": 3,
            "azureMonitor": { "top": 10, "timeGrain": 5, "timeGrainUnit": "minute" },
            "appInsights": { "timeGrainCount": 5, "timeGrainUnit": "minute" }
        });
        let stored: StoredQueryRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(stored.ref_id, "");
        assert_eq!(stored.subscription, "");
        assert_eq!(stored.query_type, Some(QueryType::Other("3".to_string())));

        let metrics = stored.azure_monitor.unwrap();
        assert_eq!(metrics.top.as_deref(), Some("10"));
        assert_eq!(metrics.time_grain.as_deref(), Some("5"));
        assert_eq!(
            stored.app_insights.unwrap().time_grain_count.as_deref(),
            Some("5")
        );
    }

    #[test]
    fn test_legacy_time_grain_shapes() {
        let grains: Vec<LegacyTimeGrain> =
            serde_json::from_value(json!([{ "text": "5 minutes", "value": "PT5M" }, "PT1H"]))
                .unwrap();
        assert_eq!(grains[0].value(), "PT5M");
        assert_eq!(grains[1].value(), "PT1H");

        let grains: Vec<LegacyTimeGrain> =
            serde_json::from_value(json!([{ "text": null, "value": 300000 }])).unwrap();
        assert_eq!(grains[0].value(), "300000");
    }

    #[test]
    fn test_parked_legacy_fields_survive_a_round_trip() {
        let stored = StoredMetricsQuery {
            time_grain: Some("soon".to_string()),
            time_grain_unit: Some("minute".to_string()),
            ..Default::default()
        };

        let canonical = MetricsQuery::from(stored);
        assert_eq!(canonical.extra.get("timeGrainUnit"), Some(&json!("minute")));
        assert!(canonical.dimension_filters.is_empty());

        let record = QueryRecord {
            azure_monitor: Some(canonical),
            ..Default::default()
        };
        let json = serde_json::to_value(record).unwrap();
        let again: StoredQueryRecord = serde_json::from_value(json).unwrap();
        let metrics = again.azure_monitor.unwrap();
        assert_eq!(metrics.time_grain_unit.as_deref(), Some("minute"));
        assert!(metrics.extra.is_empty());
    }

    #[test]
    fn test_dimension_list() {
        assert!(dimension_list(None).is_empty());
        assert!(dimension_list(Some(json!(""))).is_empty());
        assert!(dimension_list(Some(Value::Null)).is_empty());
        assert_eq!(dimension_list(Some(json!("client/city"))), vec!["client/city"]);
        assert_eq!(
            dimension_list(Some(json!(["a", "b"]))),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(dimension_list(Some(json!(["a", 3]))), vec!["a", "3"]);
    }
}
