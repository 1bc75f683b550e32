//! Legacy single-dimension filter to filter list.

use super::record::{DimensionFilter, FilterOperator, StoredMetricsQuery};

/// Dimension value the old editor used for "no dimension selected".
pub const NO_DIMENSION: &str = "None";

/// Filter value the old editor defaulted to: every value of the dimension.
pub const MATCH_ALL: &str = "*";

/// Fold a legacy `dimension`/`dimensionFilter` pair into `dimensionFilters`.
///
/// Returns `true` when the query changed.
pub fn normalize_dimension_filters(query: &mut StoredMetricsQuery) -> bool {
    let mut changed = false;

    let filters = query.dimension_filters.get_or_insert_with(|| {
        changed = true;
        Vec::new()
    });

    let dimension = query.dimension.take();
    let filter = query.dimension_filter.take();
    changed |= dimension.is_some() || filter.is_some();

    if let Some(dimension) = dimension {
        if !dimension.is_empty() && dimension != NO_DIMENSION {
            filters.push(DimensionFilter {
                dimension,
                operator: FilterOperator::Eq,
                filter: filter.unwrap_or_else(|| MATCH_ALL.to_string()),
            });
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy(dimension: Option<&str>, filter: Option<&str>) -> StoredMetricsQuery {
        StoredMetricsQuery {
            dimension: dimension.map(str::to_string),
            dimension_filter: filter.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_legacy_dimension_becomes_filter() {
        let mut q = legacy(Some("Location"), Some("eastus"));
        assert!(normalize_dimension_filters(&mut q));

        assert_eq!(
            q.dimension_filters,
            Some(vec![DimensionFilter {
                dimension: "Location".to_string(),
                operator: FilterOperator::Eq,
                filter: "eastus".to_string(),
            }])
        );
        assert!(q.dimension.is_none());
        assert!(q.dimension_filter.is_none());
    }

    #[test]
    fn test_none_sentinel_is_dropped() {
        let mut q = legacy(Some("None"), Some(""));
        assert!(normalize_dimension_filters(&mut q));
        assert_eq!(q.dimension_filters, Some(vec![]));
        assert!(q.dimension.is_none());
        assert!(q.dimension_filter.is_none());
    }

    #[test]
    fn test_missing_filter_matches_all() {
        let mut q = legacy(Some("Tier"), None);
        normalize_dimension_filters(&mut q);
        assert_eq!(q.dimension_filters.unwrap()[0].filter, "*");
    }

    #[test]
    fn test_appends_after_existing_filters() {
        let existing = DimensionFilter {
            dimension: "Tier".to_string(),
            operator: FilterOperator::Ne,
            filter: "free".to_string(),
        };
        let mut q = legacy(Some("Location"), Some("westus"));
        q.dimension_filters = Some(vec![existing.clone()]);

        normalize_dimension_filters(&mut q);
        let filters = q.dimension_filters.unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0], existing);
        assert_eq!(filters[1].dimension, "Location");
    }

    #[test]
    fn test_stray_filter_without_dimension_is_removed() {
        let mut q = legacy(None, Some("*"));
        assert!(normalize_dimension_filters(&mut q));
        assert_eq!(q.dimension_filters, Some(vec![]));
        assert!(q.dimension_filter.is_none());
    }

    #[test]
    fn test_second_pass_is_noop() {
        let mut q = legacy(Some("Location"), Some("eastus"));
        normalize_dimension_filters(&mut q);
        let once = q.clone();

        assert!(!normalize_dimension_filters(&mut q));
        assert_eq!(q, once);
    }
}
