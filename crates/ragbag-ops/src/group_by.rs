//! Grouping indices over the last dimension of jagged slices.
//!
//! ```text
//!   keys:    [[a, b, a, -], [c, c]]
//!   indices: [[[0, 2], [1]], [[0, 1]]]
//!             ^ positions within the original group, one list per sub-group
//! ```
//!
//! Each key slice refines the current grouping: a position's new group is
//! looked up by `(current group, value)` in a map that is cleared between
//! original groups. Missing keys drop the position into `UNDEFINED_GROUP`,
//! which is excluded from the output.

use crate::config::OpsConfig;
use ahash::AHashMap;
use ragbag_core::{
    DType, DataItem, DataSlice, DataSliceImpl, Edge, RagbagError, Result, SliceDType,
};
use std::cmp::Ordering;

const UNDEFINED_GROUP: usize = usize::MAX;

/// Rejects a sort over mixed or non-sortable values.
pub(crate) fn check_sortable(values: &DataSliceImpl, config: &OpsConfig) -> Result<()> {
    match values.slice_dtype() {
        SliceDType::Mixed => Err(RagbagError::failed_precondition(
            "sort is not supported for mixed dtype",
        )),
        SliceDType::Single(dtype) if !config.is_sortable(dtype) => Err(
            RagbagError::failed_precondition(format!("sort is not supported for {dtype}")),
        ),
        _ => Ok(()),
    }
}

/// Total order used once sortability has been checked.
pub(crate) fn sort_order(a: &DataItem, b: &DataItem) -> Ordering {
    a.cmp_same_dtype(b).unwrap_or(Ordering::Equal)
}

struct GroupByIndicesProcessor<'a> {
    split_points: &'a [i64],
    group_id: Vec<usize>,
    sort: bool,
}

impl<'a> GroupByIndicesProcessor<'a> {
    fn new(edge: &'a Edge, sort: bool) -> Self {
        Self {
            split_points: edge.split_points(),
            group_id: vec![0; edge.child_size()],
            sort,
        }
    }

    fn group_ranges(&self) -> impl Iterator<Item = std::ops::Range<usize>> + 'a {
        let split_points: &'a [i64] = self.split_points;
        split_points
            .windows(2)
            .map(|w| w[0] as usize..w[1] as usize)
    }

    /// Refines the current groups by one key slice of the same shape.
    fn process_group_key(&mut self, values: &DataSliceImpl) {
        if values.is_empty_and_unknown() {
            self.group_id.fill(UNDEFINED_GROUP);
            return;
        }

        let mut key_to_group_id: AHashMap<(usize, DataItem), usize> = AHashMap::new();
        let mut keys_to_sort: Vec<(usize, DataItem)> = Vec::new();
        let mut new_group_id = 0;
        for range in self.group_ranges() {
            key_to_group_id.clear();
            keys_to_sort.clear();
            let start_group_id = new_group_id;
            for i in range.clone() {
                let value = values.get(i);
                let group = self.group_id[i];
                if value.is_missing() || group == UNDEFINED_GROUP {
                    self.group_id[i] = UNDEFINED_GROUP;
                    continue;
                }
                let key = (group, value.clone());
                self.group_id[i] = match key_to_group_id.get(&key) {
                    Some(&id) => id,
                    None => {
                        if self.sort {
                            keys_to_sort.push(key.clone());
                        }
                        key_to_group_id.insert(key, new_group_id);
                        new_group_id += 1;
                        new_group_id - 1
                    }
                };
            }
            if self.sort {
                self.sort_groups(start_group_id, &keys_to_sort, range);
            }
        }
    }

    /// Renumbers the groups discovered in `range` by ascending key.
    fn sort_groups(
        &mut self,
        start_group_id: usize,
        keys: &[(usize, DataItem)],
        range: std::ops::Range<usize>,
    ) {
        let mut order: Vec<usize> = (0..keys.len()).collect();
        order.sort_by(|&a, &b| {
            keys[a]
                .0
                .cmp(&keys[b].0)
                .then_with(|| sort_order(&keys[a].1, &keys[b].1))
        });
        let mut sorted_rank = vec![0; keys.len()];
        for (rank, &slot) in order.iter().enumerate() {
            sorted_rank[slot] = rank;
        }
        for group in &mut self.group_id[range] {
            if *group != UNDEFINED_GROUP {
                *group = sorted_rank[*group - start_group_id] + start_group_id;
            }
        }
    }

    /// Indices, split points of sub-groups per original group, and split
    /// points of items per sub-group.
    fn finish(self) -> Result<(Vec<i64>, Edge, Edge)> {
        let total = self
            .group_id
            .iter()
            .filter(|&&g| g != UNDEFINED_GROUP)
            .count();
        let mut indices = vec![0i64; total];
        let mut group_split_points = Vec::with_capacity(self.split_points.len());
        group_split_points.push(0i64);
        let mut item_split_points = Vec::with_capacity(self.split_points.len());
        item_split_points.push(0i64);

        let mut group_id_count = vec![0usize; self.group_id.len()];
        let mut output_index = 0usize;
        let mut group_prefix_sum = 0usize;
        for range in self.group_ranges() {
            // Groups are numbered consecutively within a range and never
            // shared between ranges.
            let mut local_group_count = 0;
            let mut start_group = usize::MAX;
            let mut end_group = 0;
            for &group in &self.group_id[range.clone()] {
                if group == UNDEFINED_GROUP {
                    continue;
                }
                if group_id_count[group] == 0 {
                    local_group_count += 1;
                }
                group_id_count[group] += 1;
                start_group = start_group.min(group);
                end_group = end_group.max(group + 1);
            }
            group_prefix_sum += local_group_count;
            group_split_points.push(group_prefix_sum as i64);
            if local_group_count == 0 {
                continue;
            }

            // Counts become the first output position of each group.
            let mut prefix_sum = output_index;
            for count in &mut group_id_count[start_group..end_group] {
                if *count != 0 {
                    prefix_sum += *count;
                    item_split_points.push(prefix_sum as i64);
                }
                *count = prefix_sum - *count;
            }

            for i in range.clone() {
                let group = self.group_id[i];
                if group == UNDEFINED_GROUP {
                    continue;
                }
                let position = &mut group_id_count[group];
                indices[*position] = (i - range.start) as i64;
                *position += 1;
                output_index += 1;
            }
        }

        Ok((
            indices,
            Edge::from_split_points(group_split_points)?,
            Edge::from_split_points(item_split_points)?,
        ))
    }
}

/// Positions of each distinct key tuple within every group of the last
/// dimension.
///
/// The result has one more dimension than the inputs: each original group
/// holds a list of sub-groups, each sub-group the in-group positions sharing
/// one key tuple. Sub-groups appear in first-occurrence order, or by
/// ascending key when `sort` is set. Positions where any key is missing are
/// dropped.
pub fn group_by_indices(args: &[&DataSlice], sort: bool, config: &OpsConfig) -> Result<DataSlice> {
    let Some(first) = args.first() else {
        return Err(RagbagError::invalid_argument("requires at least 1 argument"));
    };
    let shape = first.shape();
    let Some(edge) = shape.last_edge() else {
        return Err(RagbagError::failed_precondition(
            "group_by is not supported for scalar data",
        ));
    };
    tracing::debug!(keys = args.len(), size = shape.size(), sort, "group_by_indices");

    let mut processor = GroupByIndicesProcessor::new(edge, sort);
    for ds in args {
        if !ds.shape().is_equivalent_to(shape) {
            return Err(RagbagError::failed_precondition(
                "all arguments must have the same shape",
            ));
        }
        let values = ds.values();
        if sort {
            check_sortable(&values, config)?;
        }
        processor.process_group_key(&values);
    }

    let (indices, group_edge, item_edge) = processor.finish()?;
    let new_shape = shape
        .remove_dims(shape.rank() - 1)
        .add_dims([group_edge, item_edge])?;
    DataSlice::from_impl(
        indices.into_iter().map(DataItem::Int64).collect(),
        new_shape,
        DType::Int64.into(),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragbag_core::{ErrorCode, JaggedShape};

    fn slice(values: Vec<DataItem>, split_points: Vec<i64>) -> DataSlice {
        let groups = split_points.len() - 1;
        let shape = JaggedShape::from_edges(vec![
            Edge::uniform(1, groups),
            Edge::from_split_points(split_points).unwrap(),
        ])
        .unwrap();
        DataSlice::from_impl(DataSliceImpl::from_values(values), shape, DType::Object.into(), None)
            .unwrap()
    }

    fn ints(values: &[i64]) -> Vec<DataItem> {
        values.iter().copied().map(DataItem::from).collect()
    }

    fn indices(ds: &DataSlice) -> Vec<i64> {
        ds.values()
            .iter()
            .map(|v| match v {
                DataItem::Int64(i) => *i,
                other => panic!("unexpected index {other}"),
            })
            .collect()
    }

    #[test]
    fn test_group_by_first_occurrence_order() {
        let x = slice(ints(&[3, 1, 3, 2, 1, 5, 5]), vec![0, 5, 7]);
        let result = group_by_indices(&[&x], false, &OpsConfig::default()).unwrap();

        assert_eq!(indices(&result), vec![0, 2, 1, 4, 3, 0, 1]);
        assert_eq!(result.rank(), 3);
        assert_eq!(result.shape().edges()[1].split_points(), &[0, 3, 4]);
        assert_eq!(result.shape().edges()[2].split_points(), &[0, 2, 4, 5, 7]);
        assert_eq!(result.schema(), &DataItem::from(DType::Int64));
    }

    #[test]
    fn test_group_by_sorted() {
        let x = slice(ints(&[3, 1, 3, 2, 1]), vec![0, 5]);
        let result = group_by_indices(&[&x], true, &OpsConfig::default()).unwrap();
        assert_eq!(indices(&result), vec![1, 4, 3, 0, 2]);
        assert_eq!(result.shape().edges()[2].split_points(), &[0, 2, 3, 5]);
    }

    #[test]
    fn test_group_by_multiple_keys_and_missing() {
        let a = slice(ints(&[1, 1, 1, 2]), vec![0, 4]);
        let b = slice(
            vec!["x".into(), "y".into(), "x".into(), DataItem::Missing],
            vec![0, 4],
        );
        let result = group_by_indices(&[&a, &b], false, &OpsConfig::default()).unwrap();
        assert_eq!(indices(&result), vec![0, 2, 1]);
        assert_eq!(result.shape().edges()[1].split_points(), &[0, 2]);
    }

    #[test]
    fn test_group_by_all_missing_gives_empty_groups() {
        let x = slice(vec![DataItem::Missing; 3], vec![0, 1, 3]);
        let result = group_by_indices(&[&x], true, &OpsConfig::default()).unwrap();
        assert!(indices(&result).is_empty());
        assert_eq!(result.shape().edges()[1].split_points(), &[0, 0, 0]);
    }

    #[test]
    fn test_group_by_errors() {
        let config = OpsConfig::default();
        let err = group_by_indices(&[], false, &config).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);

        let scalar = DataSlice::from_item(1.into(), DType::Int32.into(), None).unwrap();
        let err = group_by_indices(&[&scalar], false, &config).unwrap_err();
        assert!(err.message().contains("scalar"));

        let a = slice(ints(&[1, 2]), vec![0, 2]);
        let b = slice(ints(&[1, 2]), vec![0, 1, 2]);
        let err = group_by_indices(&[&a, &b], false, &config).unwrap_err();
        assert_eq!(err.code(), ErrorCode::FailedPrecondition);
        assert!(err.message().contains("same shape"));

        let mixed = slice(vec![1.into(), "a".into()], vec![0, 2]);
        assert!(group_by_indices(&[&mixed], false, &config).is_ok());
        let err = group_by_indices(&[&mixed], true, &config).unwrap_err();
        assert!(err.message().contains("mixed dtype"));

        let exprs = slice(
            vec![
                ragbag_core::ExprQuote::new("x + 1").into(),
                ragbag_core::ExprQuote::new("x").into(),
            ],
            vec![0, 2],
        );
        let err = group_by_indices(&[&exprs], true, &config).unwrap_err();
        assert_eq!(err.message(), "sort is not supported for EXPR");
    }
}
