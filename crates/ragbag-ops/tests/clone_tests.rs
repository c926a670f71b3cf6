//! `DataSlice`-level extract, clone and no-follow.

use ragbag_core::{
    allocate_explicit_schema, AllocationId, DType, DataBag, DataBagImpl, DataBagPtr, DataItem,
    DataSlice, DataSliceImpl, ErrorCode, JaggedShape, ObjectId, ObjectKind,
};
use ragbag_ops::{
    clone, clone_with_schema, extract, extract_with_schema, follow, nofollow, shallow_clone,
    OpsConfig,
};

/// `Parent{x: INT32, child: Child}`, `Child{y: TEXT}` over two parents and
/// their children, plus one unrelated object.
struct Tree {
    parent_schema: ObjectId,
    child_schema: ObjectId,
    parents: Vec<ObjectId>,
    children: Vec<ObjectId>,
    stray: ObjectId,
}

impl Tree {
    fn new() -> Self {
        let parents = AllocationId::new(ObjectKind::Entity, 2);
        let children = AllocationId::new(ObjectKind::Entity, 2);
        Self {
            parent_schema: allocate_explicit_schema(),
            child_schema: allocate_explicit_schema(),
            parents: (0..2).map(|i| parents.object_at(i)).collect(),
            children: (0..2).map(|i| children.object_at(i)).collect(),
            stray: AllocationId::new(ObjectKind::Entity, 1).object_at(0),
        }
    }

    fn write_schemas(&self, bag: &mut DataBagImpl) {
        bag.set_schema_attr(self.parent_schema, "x", DType::Int32.into())
            .unwrap();
        bag.set_schema_attr(self.parent_schema, "child", self.child_schema.into())
            .unwrap();
        bag.set_schema_attr(self.child_schema, "y", DType::Text.into())
            .unwrap();
    }

    fn write_data(&self, bag: &mut DataBagImpl) {
        for i in 0..2 {
            bag.set_attr(self.parents[i], "x", (i as i32).into());
            bag.set_attr(self.parents[i], "child", self.children[i].into());
            bag.set_attr(self.children[i], "y", format!("c{i}").into());
        }
        bag.set_attr(self.stray, "x", 99.into());
    }

    fn bag(&self) -> DataBagPtr {
        let mut bag = DataBagImpl::new();
        self.write_schemas(&mut bag);
        self.write_data(&mut bag);
        DataBag::from_impl(bag)
    }

    fn slice(&self, ids: &[ObjectId], bag: Option<DataBagPtr>) -> DataSlice {
        let values: DataSliceImpl = ids.iter().copied().map(DataItem::from).collect();
        DataSlice::from_impl(
            values,
            JaggedShape::flat(ids.len()),
            self.parent_schema.into(),
            bag,
        )
        .unwrap()
    }
}

fn snapshot(ds: &DataSlice) -> std::sync::Arc<DataBagImpl> {
    ds.bag().unwrap().impl_snapshot()
}

fn ids(ds: &DataSlice) -> Vec<ObjectId> {
    ds.values().iter().filter_map(DataItem::as_object_id).collect()
}

// ============================================================================
// Extract
// ============================================================================

#[test]
fn test_extract_slice_keeps_data_and_drops_stray() {
    let tree = Tree::new();
    let ds = tree.slice(&tree.parents, Some(tree.bag()));
    let result = extract(&ds, &OpsConfig::default()).unwrap();

    assert_eq!(result.values(), ds.values());
    assert!(result.shape().is_equivalent_to(ds.shape()));
    let bag = snapshot(&result);
    assert_eq!(bag.get_attr(tree.children[1], "y", &[]), DataItem::from("c1"));
    assert_eq!(bag.get_attr(tree.stray, "x", &[]), DataItem::Missing);
    assert!(!std::sync::Arc::ptr_eq(result.bag().unwrap(), ds.bag().unwrap()));
}

#[test]
fn test_extract_reads_through_fallback_chain() {
    let tree = Tree::new();
    let overlay = DataBag::immutable_empty_with_fallbacks([tree.bag()]);
    let ds = tree.slice(&tree.parents[..1], Some(overlay));
    let result = extract(&ds, &OpsConfig::default()).unwrap();

    let bag = snapshot(&result);
    assert_eq!(bag.get_attr(tree.parents[0], "x", &[]), DataItem::from(0));
    assert_eq!(bag.get_attr(tree.children[0], "y", &[]), DataItem::from("c0"));
    assert!(result.bag().unwrap().fallbacks().is_empty());
}

#[test]
fn test_extract_with_separate_schema_bag() {
    let tree = Tree::new();
    let mut data = DataBagImpl::new();
    tree.write_data(&mut data);
    let mut schemas = DataBagImpl::new();
    tree.write_schemas(&mut schemas);

    let ds = tree.slice(&tree.parents, Some(DataBag::from_impl(data)));
    let schema = DataSlice::schema_item(
        tree.parent_schema.into(),
        Some(DataBag::from_impl(schemas)),
    )
    .unwrap();
    let result = extract_with_schema(&ds, &schema, &OpsConfig::default()).unwrap();

    let bag = snapshot(&result);
    assert_eq!(
        bag.get_schema_attr(tree.child_schema, "y", &[]),
        DataItem::from(DType::Text)
    );
    assert_eq!(bag.get_attr(tree.children[0], "y", &[]), DataItem::from("c0"));
}

#[test]
fn test_extract_requires_bag() {
    let tree = Tree::new();
    let ds = tree.slice(&tree.parents, None);
    let err = extract(&ds, &OpsConfig::default()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
    assert!(err.message().contains("without a DataBag"));
}

// ============================================================================
// Shallow clone / clone
// ============================================================================

#[test]
fn test_shallow_clone_references_children() {
    let tree = Tree::new();
    let ds = tree.slice(&tree.parents, Some(tree.bag()));
    let result = shallow_clone(&ds, &OpsConfig::default()).unwrap();

    let new_ids = ids(&result);
    assert_eq!(new_ids.len(), 2);
    assert!(new_ids.iter().all(|id| !tree.parents.contains(id)));
    let bag = snapshot(&result);
    assert_eq!(
        bag.get_attr(new_ids[1], "child", &[]),
        DataItem::from(tree.children[1])
    );
    assert_eq!(bag.get_attr(tree.children[1], "y", &[]), DataItem::Missing);
}

#[test]
fn test_clone_copies_reachable_graph() {
    let tree = Tree::new();
    let original = tree.bag();
    let ds = tree.slice(&[tree.parents[0], tree.parents[1], tree.parents[0]], Some(original.clone()));
    let result = clone(&ds, &OpsConfig::default()).unwrap();

    let new_ids = ids(&result);
    assert_eq!(new_ids[0], new_ids[2], "aliases stay aliased");
    assert_ne!(new_ids[0], new_ids[1]);
    assert!(new_ids.iter().all(|id| !tree.parents.contains(id)));

    let bag = snapshot(&result);
    assert_eq!(bag.get_attr(new_ids[1], "x", &[]), DataItem::from(1));
    assert_eq!(
        bag.get_attr(new_ids[0], "child", &[]),
        DataItem::from(tree.children[0])
    );
    assert_eq!(bag.get_attr(tree.children[0], "y", &[]), DataItem::from("c0"));
    assert_eq!(bag.get_attr(tree.parents[0], "x", &[]), DataItem::Missing);
    assert_eq!(bag.get_attr(tree.stray, "x", &[]), DataItem::Missing);
    assert_eq!(
        bag.get_schema_attr(tree.parent_schema, "child", &[]),
        DataItem::from(tree.child_schema)
    );

    // The original is untouched.
    assert_eq!(original.impl_snapshot().content(), tree.bag().impl_snapshot().content());
}

#[test]
fn test_clone_with_separate_schema_bag() {
    let tree = Tree::new();
    let mut data = DataBagImpl::new();
    tree.write_data(&mut data);
    let mut schemas = DataBagImpl::new();
    tree.write_schemas(&mut schemas);

    let ds = tree.slice(&tree.parents, Some(DataBag::from_impl(data)));
    let schema = DataSlice::schema_item(
        tree.parent_schema.into(),
        Some(DataBag::from_impl(schemas)),
    )
    .unwrap();
    let result = clone_with_schema(&ds, &schema, &OpsConfig::default()).unwrap();

    let new_ids = ids(&result);
    let bag = snapshot(&result);
    assert_eq!(bag.get_attr(new_ids[0], "x", &[]), DataItem::from(0));
    assert_eq!(bag.get_attr(tree.children[1], "y", &[]), DataItem::from("c1"));
    assert_eq!(
        bag.get_schema_attr(tree.child_schema, "y", &[]),
        DataItem::from(DType::Text)
    );
}

#[test]
fn test_clone_of_clone_has_same_content_shape() {
    let tree = Tree::new();
    let ds = tree.slice(&tree.parents, Some(tree.bag()));
    let once = clone(&ds, &OpsConfig::default()).unwrap();
    let twice = clone(&once, &OpsConfig::default()).unwrap();

    let a = snapshot(&once).content();
    let b = snapshot(&twice).content();
    assert_eq!(a.attrs.len(), b.attrs.len());
    assert_eq!(a.schema_attrs, b.schema_attrs);
}

// ============================================================================
// No-follow
// ============================================================================

#[test]
fn test_nofollow_round_trip_and_extract() {
    let tree = Tree::new();
    let ds = tree.slice(&tree.parents, Some(tree.bag()));
    let wrapped = nofollow(&ds).unwrap();
    assert_ne!(wrapped.schema(), ds.schema());
    assert_eq!(follow(&wrapped).unwrap().schema(), ds.schema());

    let result = extract(&wrapped, &OpsConfig::default()).unwrap();
    assert!(snapshot(&result).is_empty());

    let err = nofollow(&wrapped).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
    assert!(follow(&ds).is_err());
}

#[test]
fn test_nofollow_rejects_primitive_schema() {
    let ds = DataSlice::from_item(1.into(), DType::Int32.into(), None).unwrap();
    let err = nofollow(&ds).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
    assert!(err.message().contains("INT32"));
}
