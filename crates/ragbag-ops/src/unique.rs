//! Per-group deduplication over the last dimension.

use crate::config::OpsConfig;
use crate::group_by::{check_sortable, sort_order};
use ahash::AHashMap;
use ragbag_core::{DataItem, DataSlice, DataSliceImpl, Edge, Result};

/// Distinct present values of every group of the last dimension.
///
/// Values keep their first-occurrence order, or ascend when `sort` is set.
/// The rank is unchanged; only the last edge shrinks. A scalar is returned
/// as-is.
pub fn unique(x: &DataSlice, sort: bool, config: &OpsConfig) -> Result<DataSlice> {
    let shape = x.shape();
    let Some(edge) = shape.last_edge() else {
        return Ok(x.clone());
    };
    let values = x.values();
    if sort {
        check_sortable(&values, config)?;
    }
    tracing::debug!(size = values.len(), groups = edge.parent_size(), sort, "unique");

    let (unique_values, split_points) = if values.is_empty_and_unknown() {
        (Vec::new(), vec![0; edge.split_points().len()])
    } else {
        dedup_groups(&values, edge, sort)
    };

    let new_shape = shape
        .remove_dims(shape.rank() - 1)
        .add_dims([Edge::from_split_points(split_points)?])?;
    DataSlice::from_impl(
        DataSliceImpl::from_values(unique_values),
        new_shape,
        x.schema().clone(),
        x.bag().cloned(),
    )
}

fn dedup_groups(values: &DataSliceImpl, edge: &Edge, sort: bool) -> (Vec<DataItem>, Vec<i64>) {
    let mut unique_values: Vec<DataItem> = Vec::with_capacity(values.len());
    let mut split_points = Vec::with_capacity(edge.split_points().len());
    split_points.push(0i64);
    // Value -> last group it was emitted for; kept across groups so that a
    // value recurring in later groups only updates its entry.
    let mut last_group: AHashMap<&DataItem, usize> = AHashMap::with_capacity(values.len());

    for (group, range) in edge.groups().enumerate() {
        let group_begin = unique_values.len();
        for value in &values.values()[range] {
            if value.is_missing() {
                continue;
            }
            match last_group.insert(value, group) {
                Some(previous) if previous == group => {}
                _ => unique_values.push(value.clone()),
            }
        }
        if sort {
            unique_values[group_begin..].sort_by(sort_order);
        }
        split_points.push(unique_values.len() as i64);
    }
    (unique_values, split_points)
}
