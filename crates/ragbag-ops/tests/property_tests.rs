use proptest::prelude::*;
use ragbag_core::{
    allocate_explicit_schema, AllocationId, DType, DataBagImpl, DataItem, DataSlice,
    DataSliceImpl, Edge, JaggedShape, ObjectId, ObjectKind,
};
use ragbag_ops::{group_by_indices, unique, ExtractConfig, ExtractOp, OpsConfig, StoreView};
use std::collections::BTreeSet;

const MAX_ENTITIES: usize = 12;
const MAX_GROUPS: usize = 5;
const MAX_GROUP_LEN: usize = 8;

// ============================================================================
// Extraction
// ============================================================================

#[derive(Debug, Clone)]
struct GraphCase {
    entity_count: usize,
    /// Per entity: optional `v`, optional `next` target, optional noise.
    nodes: Vec<(Option<i32>, Option<usize>, Option<i32>)>,
    roots: Vec<usize>,
}

fn graph_case_strategy() -> impl Strategy<Value = GraphCase> {
    (1usize..=MAX_ENTITIES)
        .prop_flat_map(|entity_count| {
            (
                Just(entity_count),
                prop::collection::vec(
                    (
                        prop::option::of(-50i32..50),
                        prop::option::of(0usize..entity_count),
                        prop::option::of(0i32..10),
                    ),
                    entity_count,
                ),
                prop::collection::vec(0usize..entity_count, 0..=4),
            )
        })
        .prop_map(|(entity_count, nodes, roots)| GraphCase {
            entity_count,
            nodes,
            roots,
        })
}

struct BuiltGraph {
    bag: DataBagImpl,
    schema: ObjectId,
    ids: Vec<ObjectId>,
}

/// Schema `S{v: INT32, next: S}`; noise goes to an undeclared attribute and
/// an unrelated schema.
fn build_graph(case: &GraphCase) -> BuiltGraph {
    let schema = allocate_explicit_schema();
    let noise_schema = allocate_explicit_schema();
    let alloc = AllocationId::new(ObjectKind::Entity, case.entity_count);
    let ids: Vec<ObjectId> = (0..case.entity_count).map(|i| alloc.object_at(i)).collect();

    let mut bag = DataBagImpl::new();
    bag.set_schema_attr(schema, "v", DType::Int32.into()).unwrap();
    bag.set_schema_attr(schema, "next", schema.into()).unwrap();
    bag.set_schema_attr(noise_schema, "v", DType::Text.into()).unwrap();
    for (i, (v, next, noise)) in case.nodes.iter().enumerate() {
        if let Some(v) = v {
            bag.set_attr(ids[i], "v", (*v).into());
        }
        if let Some(next) = next {
            bag.set_attr(ids[i], "next", ids[*next].into());
        }
        if let Some(noise) = noise {
            bag.set_attr(ids[i], "noise", (*noise).into());
        }
    }
    BuiltGraph { bag, schema, ids }
}

/// Store holding exactly what is reachable from the roots.
fn reachable_store(case: &GraphCase, graph: &BuiltGraph) -> DataBagImpl {
    let mut expected = DataBagImpl::new();
    expected
        .set_schema_attr(graph.schema, "v", DType::Int32.into())
        .unwrap();
    expected
        .set_schema_attr(graph.schema, "next", graph.schema.into())
        .unwrap();

    let mut seen = BTreeSet::new();
    let mut pending: Vec<usize> = case.roots.clone();
    while let Some(i) = pending.pop() {
        if !seen.insert(i) {
            continue;
        }
        let (v, next, _) = case.nodes[i];
        if let Some(v) = v {
            expected.set_attr(graph.ids[i], "v", v.into());
        }
        if let Some(next) = next {
            expected.set_attr(graph.ids[i], "next", graph.ids[next].into());
            pending.push(next);
        }
    }
    expected
}

fn run_extract(bag: &DataBagImpl, roots: &DataSliceImpl, schema: ObjectId) -> DataBagImpl {
    let config = ExtractConfig::default();
    ExtractOp::new(StoreView::new(bag, &[]), &config)
        .extract_slice(roots, &schema.into())
        .unwrap()
}

// ============================================================================
// Group-by / unique
// ============================================================================

type Groups = Vec<Vec<Option<i32>>>;

fn groups_strategy() -> impl Strategy<Value = Groups> {
    prop::collection::vec(
        prop::collection::vec(prop::option::of(0i32..5), 0..=MAX_GROUP_LEN),
        1..=MAX_GROUPS,
    )
}

fn to_item(value: Option<i32>) -> DataItem {
    value.into()
}

fn grouped_slice(groups: &Groups) -> DataSlice {
    let mut split_points = vec![0i64];
    let mut values = Vec::new();
    for group in groups {
        values.extend(group.iter().copied().map(to_item));
        split_points.push(values.len() as i64);
    }
    let shape = JaggedShape::from_edges(vec![
        Edge::uniform(1, groups.len()),
        Edge::from_split_points(split_points).unwrap(),
    ])
    .unwrap();
    DataSlice::from_impl(
        DataSliceImpl::from_values(values),
        shape,
        DType::Int32.into(),
        None,
    )
    .unwrap()
}

/// Sub-groups (as in-group positions) of each original group.
fn decode_group_by(result: &DataSlice) -> Vec<Vec<Vec<usize>>> {
    let edges = result.shape().edges();
    let (group_edge, item_edge) = (&edges[1], &edges[2]);
    let indices: Vec<usize> = result
        .values()
        .iter()
        .map(|v| match v {
            DataItem::Int64(i) => *i as usize,
            other => panic!("unexpected index {other}"),
        })
        .collect();
    group_edge
        .groups()
        .map(|subgroups| {
            subgroups
                .map(|s| indices[item_edge.group(s)].to_vec())
                .collect()
        })
        .collect()
}

fn first_occurrence_unique(group: &[Option<i32>]) -> Vec<i32> {
    let mut out: Vec<i32> = Vec::new();
    for v in group.iter().flatten() {
        if !out.contains(v) {
            out.push(*v);
        }
    }
    out
}

fn decode_unique(result: &DataSlice) -> Vec<Vec<i32>> {
    let values = result.values();
    result.shape().edges()[1]
        .groups()
        .map(|range| {
            values.values()[range]
                .iter()
                .map(|v| match v {
                    DataItem::Int32(i) => *i,
                    other => panic!("unexpected value {other}"),
                })
                .collect()
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn extract_equals_reachable_subset(case in graph_case_strategy()) {
        let graph = build_graph(&case);
        let roots: DataSliceImpl = case.roots.iter().map(|&i| DataItem::from(graph.ids[i])).collect();

        let actual = run_extract(&graph.bag, &roots, graph.schema);
        let expected = reachable_store(&case, &graph);
        prop_assert_eq!(actual.content(), expected.content());
    }

    #[test]
    fn extract_is_idempotent(case in graph_case_strategy()) {
        let graph = build_graph(&case);
        let roots: DataSliceImpl = case.roots.iter().map(|&i| DataItem::from(graph.ids[i])).collect();

        let once = run_extract(&graph.bag, &roots, graph.schema);
        let twice = run_extract(&once, &roots, graph.schema);
        prop_assert_eq!(once.content(), twice.content());
    }

    #[test]
    fn group_by_partitions_present_positions(groups in groups_strategy(), sort in any::<bool>()) {
        let x = grouped_slice(&groups);
        let result = group_by_indices(&[&x], sort, &OpsConfig::default()).unwrap();
        let decoded = decode_group_by(&result);
        prop_assert_eq!(decoded.len(), groups.len());

        for (group, subgroups) in groups.iter().zip(&decoded) {
            let mut positions: Vec<usize> = subgroups.iter().flatten().copied().collect();
            positions.sort_unstable();
            let present: Vec<usize> = (0..group.len()).filter(|&i| group[i].is_some()).collect();
            prop_assert_eq!(positions, present);

            let keys: Vec<i32> = subgroups
                .iter()
                .map(|s| group[s[0]].unwrap())
                .collect();
            for (s, key) in subgroups.iter().zip(&keys) {
                prop_assert!(s.iter().all(|&i| group[i] == Some(*key)));
                prop_assert!(s.windows(2).all(|w| w[0] < w[1]));
            }
            let expected_keys = if sort {
                let mut sorted = first_occurrence_unique(group);
                sorted.sort_unstable();
                sorted
            } else {
                first_occurrence_unique(group)
            };
            prop_assert_eq!(keys, expected_keys);
        }
    }

    #[test]
    fn unique_orders_and_dedups(groups in groups_strategy(), sort in any::<bool>()) {
        let x = grouped_slice(&groups);
        let result = unique(&x, sort, &OpsConfig::default()).unwrap();
        prop_assert_eq!(result.rank(), x.rank());

        let expected: Vec<Vec<i32>> = groups
            .iter()
            .map(|group| {
                let mut values = first_occurrence_unique(group);
                if sort {
                    values.sort_unstable();
                }
                values
            })
            .collect();
        prop_assert_eq!(decode_unique(&result), expected);
    }
}
