//! The individual migration steps.
//!
//! Every step checks for the legacy shape it consumes before touching
//! anything, so each one is a no-op on an already migrated record. A step
//! returns `true` when it changed the record.

use super::dimension_filter::normalize_dimension_filters;
use super::duration::{to_iso8601, to_milliseconds, DurationError, TimeGrainUnit, AUTO};
use super::record::{
    dimension_list, LegacyTimeGrain, StoredAppInsightsQuery, StoredMetricsQuery,
    StoredQueryRecord, UNSET_PLACEHOLDER,
};
use super::rename::{rename_fields, APP_INSIGHTS_RENAMES};

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

// ============================================================================
// 1. Time grains
// ============================================================================

pub fn migrate_time_grains(record: &mut StoredQueryRecord) -> bool {
    let mut changed = false;
    if let Some(metrics) = record.azure_monitor.as_mut() {
        changed |= metrics_time_grain(metrics);
        changed |= legacy_grain_list(
            "azureMonitor",
            &mut metrics.time_grains,
            &mut metrics.allowed_time_grains_ms,
        );
    }
    if let Some(app) = record.app_insights.as_mut() {
        changed |= app_insights_time_grain(app);
        changed |= legacy_grain_list(
            "appInsights",
            &mut app.time_grains,
            &mut app.allowed_time_grains_ms,
        );
    }
    changed
}

fn metrics_time_grain(query: &mut StoredMetricsQuery) -> bool {
    let unit = match query.time_grain_unit.as_deref() {
        Some(unit) => unit,
        None => return false,
    };

    match query.time_grain.as_deref() {
        None | Some("") | Some(AUTO) => {}
        Some(grain) if is_iso8601(grain) => {}
        Some(grain) => match convert(grain, unit) {
            Ok(iso) => query.time_grain = Some(iso),
            Err(e) => {
                tracing::warn!(
                    "azureMonitor: keeping time grain '{}' ({}) for a later load: {}",
                    grain,
                    unit,
                    e
                );
                return false;
            }
        },
    }

    query.time_grain_unit = None;
    true
}

/// App Insights keeps `timeGrainCount`/`timeGrainUnit` as editor state; only
/// `timeGrain` is rewritten, with the count backfilled when it was missing.
fn app_insights_time_grain(query: &mut StoredAppInsightsQuery) -> bool {
    let unit = match query.time_grain_unit.as_deref() {
        Some(unit) if !unit.trim().is_empty() => unit.to_string(),
        _ => return false,
    };
    if query.time_grain.as_deref() == Some(AUTO) {
        return false;
    }

    let count = query
        .time_grain_count
        .as_deref()
        .filter(|c| !c.trim().is_empty());
    let (count, backfill) = match (count, query.time_grain.as_deref()) {
        (Some(count), _) => (count.to_string(), false),
        (None, Some(grain)) if !grain.is_empty() && !is_iso8601(grain) => {
            (grain.to_string(), true)
        }
        _ => return false,
    };

    match convert(&count, &unit) {
        Ok(iso) => {
            let changed = backfill || query.time_grain.as_deref() != Some(iso.as_str());
            if backfill {
                query.time_grain_count = Some(count);
            }
            query.time_grain = Some(iso);
            changed
        }
        Err(e) => {
            tracing::warn!(
                "appInsights: keeping time grain '{}' ({}) for a later load: {}",
                count,
                unit,
                e
            );
            false
        }
    }
}

/// Replace a legacy `timeGrains` descriptor list with `allowedTimeGrainsMs`.
///
/// All or nothing: if any descriptor cannot be parsed the list stays put.
fn legacy_grain_list(
    scope: &str,
    grains: &mut Option<Vec<LegacyTimeGrain>>,
    allowed_ms: &mut Option<Vec<u64>>,
) -> bool {
    let list = match grains.as_ref() {
        Some(list) => list,
        None => return false,
    };

    let needs_allowed = allowed_ms.as_ref().map_or(true, |ms| ms.is_empty());
    if needs_allowed && !list.is_empty() {
        match to_milliseconds(list.iter().map(LegacyTimeGrain::value)) {
            Ok(ms) if !ms.is_empty() => *allowed_ms = Some(ms),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("{}: keeping legacy time grain list: {}", scope, e);
                return false;
            }
        }
    }

    *grains = None;
    true
}

fn convert(count: &str, unit: &str) -> Result<String, DurationError> {
    let unit: TimeGrainUnit = unit.parse()?;
    to_iso8601(count, unit)
}

fn is_iso8601(grain: &str) -> bool {
    grain.starts_with('P') && super::duration::iso8601_to_ms(grain).is_ok()
}

// ============================================================================
// 2. Macro tokens
// ============================================================================

fn from_token() -> &'static Regex {
    static FROM: OnceLock<Regex> = OnceLock::new();
    FROM.get_or_init(|| Regex::new(r"(?i)\$__from(\s)").expect("static regex"))
}

fn to_token() -> &'static Regex {
    static TO: OnceLock<Regex> = OnceLock::new();
    TO.get_or_init(|| Regex::new(r"(?i)\$__to(\s)").expect("static regex"))
}

/// Rewrite `$__from `/`$__to ` into the `$__timeFrom()`/`$__timeTo()` macros.
///
/// A token only matches when whitespace follows it; that whitespace is kept.
pub fn rewrite_time_macros(query: &str) -> String {
    let from = from_token().replace_all(query, "$$__timeFrom()${1}");
    to_token()
        .replace_all(&from, "$$__timeTo()${1}")
        .into_owned()
}

pub fn migrate_macro_tokens(record: &mut StoredQueryRecord) -> bool {
    let query = match record
        .azure_log_analytics
        .as_mut()
        .and_then(|logs| logs.query.as_mut())
    {
        Some(query) => query,
        None => return false,
    };

    let rewritten = rewrite_time_macros(query);
    if rewritten == *query {
        return false;
    }
    *query = rewritten;
    true
}

// ============================================================================
// 3. Default namespace
// ============================================================================

pub fn migrate_default_namespace(record: &mut StoredQueryRecord) -> bool {
    let metrics = match record.azure_monitor.as_mut() {
        Some(metrics) => metrics,
        None => return false,
    };

    if is_resolved(metrics.metric_namespace.as_deref()) {
        return false;
    }
    match metrics.metric_definition.as_deref() {
        Some(definition) if is_resolved(Some(definition)) => {
            metrics.metric_namespace = Some(definition.to_string());
            true
        }
        _ => false,
    }
}

fn is_resolved(value: Option<&str>) -> bool {
    matches!(value, Some(v) if !v.is_empty() && v != UNSET_PLACEHOLDER)
}

// ============================================================================
// 4. App Insights keys
// ============================================================================

/// Each legacy key is renamed on its own. A value that does not fit its new
/// field stays under the old key for a later load; the others still move.
pub fn migrate_app_insights_keys(record: &mut StoredQueryRecord) -> bool {
    let app = match record.app_insights.as_mut() {
        Some(app) => app,
        None => return false,
    };

    let mut changed = false;
    for entry in APP_INSIGHTS_RENAMES {
        let (old, new) = *entry;
        if !app.extra.contains_key(old) {
            continue;
        }
        match rename_one(app, std::slice::from_ref(entry)) {
            Ok(renamed) => {
                tracing::debug!("appInsights: renamed {} to {}", old, new);
                *app = renamed;
                changed = true;
            }
            Err(e) => {
                tracing::warn!("appInsights: keeping {} for a later load: {}", old, e);
            }
        }
    }
    changed
}

fn rename_one(
    app: &StoredAppInsightsQuery,
    entry: &[(&'static str, &'static str)],
) -> Result<StoredAppInsightsQuery, serde_json::Error> {
    let mut object = match serde_json::to_value(app)? {
        Value::Object(object) => object,
        _ => {
            return Err(<serde_json::Error as serde::de::Error>::custom(
                "appInsights is not an object",
            ))
        }
    };
    rename_fields(&mut object, entry);
    serde_json::from_value(Value::Object(object))
}

// ============================================================================
// 5. App Insights dimensions
// ============================================================================

pub fn migrate_app_insights_dimensions(record: &mut StoredQueryRecord) -> bool {
    let app = match record.app_insights.as_mut() {
        Some(app) => app,
        None => return false,
    };

    let normalized = Value::from(dimension_list(app.dimension.clone()));
    if app.dimension.as_ref() == Some(&normalized) {
        return false;
    }
    app.dimension = Some(normalized);
    true
}

// ============================================================================
// 6. Metrics dimension filters
// ============================================================================

pub fn migrate_dimension_filters(record: &mut StoredQueryRecord) -> bool {
    match record.azure_monitor.as_mut() {
        Some(metrics) => normalize_dimension_filters(metrics),
        None => false,
    }
}
