//! `DataSlice`-level extract, clone and no-follow operators.

use crate::config::OpsConfig;
use crate::extract::{ExtractOp, ShallowCloneOp, StoreView};
use ragbag_core::{
    get_nofollowed_schema_item, nofollow_schema_item, DataBag, DataBagImpl, DataBagPtr, DataSlice,
    FlattenFallbackFinder, RagbagError, Result, SliceData,
};
use std::sync::Arc;

fn require_bag<'s>(ds: &'s DataSlice, op: &str) -> Result<&'s DataBagPtr> {
    ds.bag()
        .ok_or_else(|| RagbagError::invalid_argument(format!("cannot {op} without a DataBag")))
}

/// The schema item of a schema argument.
fn schema_of(schema: &DataSlice) -> Result<&ragbag_core::DataItem> {
    match schema.as_item() {
        Some(item) if item.is_schema() => Ok(item),
        _ => Err(RagbagError::invalid_argument(format!(
            "schema must be a scalar schema item, got a slice of rank {} with schema {}",
            schema.rank(),
            schema.schema()
        ))),
    }
}

/// The schema bag, when it differs from the data bag.
fn separate_schema_bag<'s>(ds: &DataSlice, schema: &'s DataSlice) -> Option<&'s DataBagPtr> {
    match (ds.bag(), schema.bag()) {
        (Some(data_bag), Some(schema_bag)) if Arc::ptr_eq(data_bag, schema_bag) => None,
        (_, schema_bag) => schema_bag,
    }
}

// ============================================================================
// Extract
// ============================================================================

/// Copies what `ds` reaches under its own schema into a new bag.
pub fn extract(ds: &DataSlice, config: &OpsConfig) -> Result<DataSlice> {
    let bag = require_bag(ds, "extract")?;
    let result = run_extract(ds, ds.schema(), bag, None, config)?;
    Ok(ds.with_bag(Some(DataBag::from_impl(result))))
}

/// Copies what `ds` reaches under `schema`. Schema attributes are read from
/// `schema`'s bag when it has its own.
pub fn extract_with_schema(ds: &DataSlice, schema: &DataSlice, config: &OpsConfig) -> Result<DataSlice> {
    let bag = require_bag(ds, "extract")?;
    let schema_item = schema_of(schema)?;
    let result = run_extract(ds, schema_item, bag, separate_schema_bag(ds, schema), config)?;
    ds.with_bag(Some(DataBag::from_impl(result)))
        .with_schema(schema_item.clone())
}

fn run_extract(
    ds: &DataSlice,
    schema: &ragbag_core::DataItem,
    bag: &DataBag,
    schema_bag: Option<&DataBagPtr>,
    config: &OpsConfig,
) -> Result<DataBagImpl> {
    let data_impl = bag.impl_snapshot();
    let finder = FlattenFallbackFinder::new(bag);
    let fallbacks = finder.fallbacks();
    let mut op = ExtractOp::new(StoreView::new(&data_impl, &fallbacks), &config.extract);

    let schema_impl = schema_bag.map(|b| b.impl_snapshot());
    let schema_finder = schema_bag.map(|b| FlattenFallbackFinder::new(b));
    let schema_fallbacks = schema_finder
        .as_ref()
        .map(FlattenFallbackFinder::fallbacks)
        .unwrap_or_default();
    if let Some(schema_impl) = schema_impl.as_deref() {
        op = op.with_schema_source(StoreView::new(schema_impl, &schema_fallbacks));
    }

    match ds.data() {
        SliceData::Item(item) => op.extract_item(item, schema),
        SliceData::Slice(values) => op.extract_slice(values, schema),
    }
}

// ============================================================================
// Shallow clone / clone
// ============================================================================

pub fn shallow_clone(ds: &DataSlice, config: &OpsConfig) -> Result<DataSlice> {
    let bag = require_bag(ds, "clone")?;
    let (result, data) = run_shallow_clone(ds, ds.schema(), bag, None, config)?;
    DataSlice::create(
        data,
        ds.shape().clone(),
        ds.schema().clone(),
        Some(DataBag::from_impl(result)),
    )
}

pub fn shallow_clone_with_schema(
    ds: &DataSlice,
    schema: &DataSlice,
    config: &OpsConfig,
) -> Result<DataSlice> {
    let bag = require_bag(ds, "clone")?;
    let schema_item = schema_of(schema)?;
    let (result, data) = run_shallow_clone(ds, schema_item, bag, separate_schema_bag(ds, schema), config)?;
    DataSlice::create(
        data,
        ds.shape().clone(),
        schema_item.clone(),
        Some(DataBag::from_impl(result)),
    )
}

fn run_shallow_clone(
    ds: &DataSlice,
    schema: &ragbag_core::DataItem,
    bag: &DataBag,
    schema_bag: Option<&DataBagPtr>,
    config: &OpsConfig,
) -> Result<(DataBagImpl, SliceData)> {
    let data_impl = bag.impl_snapshot();
    let finder = FlattenFallbackFinder::new(bag);
    let fallbacks = finder.fallbacks();
    let mut op = ShallowCloneOp::new(StoreView::new(&data_impl, &fallbacks), &config.extract);

    let schema_impl = schema_bag.map(|b| b.impl_snapshot());
    let schema_finder = schema_bag.map(|b| FlattenFallbackFinder::new(b));
    let schema_fallbacks = schema_finder
        .as_ref()
        .map(FlattenFallbackFinder::fallbacks)
        .unwrap_or_default();
    if let Some(schema_impl) = schema_impl.as_deref() {
        op = op.with_schema_source(StoreView::new(schema_impl, &schema_fallbacks));
    }

    match ds.data() {
        SliceData::Item(item) => {
            let (result, item) = op.clone_item(item, schema)?;
            Ok((result, SliceData::Item(item)))
        }
        SliceData::Slice(values) => {
            let (result, values) = op.clone_slice(values, schema)?;
            Ok((result, SliceData::Slice(values)))
        }
    }
}

/// Deep copy: fresh top-level ids and a new bag holding everything reachable.
pub fn clone(ds: &DataSlice, config: &OpsConfig) -> Result<DataSlice> {
    let schema = DataSlice::schema_item(ds.schema().clone(), ds.bag().cloned())?;
    clone_with_schema(ds, &schema, config)
}

/// Shallow clone, then extraction through an overlay of the shallow bag over
/// the original bag.
///
/// The shallow bag already holds the closure of `schema`, so it also serves
/// as the schema source of the extraction when `schema` brings its own bag.
pub fn clone_with_schema(ds: &DataSlice, schema: &DataSlice, config: &OpsConfig) -> Result<DataSlice> {
    let original = require_bag(ds, "clone")?.clone();
    let separate = separate_schema_bag(ds, schema).is_some();
    let shallow = shallow_clone_with_schema(ds, schema, config)?;
    let Some(shallow_bag) = shallow.bag().cloned() else {
        return Err(RagbagError::internal("shallow clone produced no DataBag"));
    };
    let overlay = DataBag::immutable_empty_with_fallbacks([shallow_bag.clone(), original]);
    let schema_bag = if separate { Some(shallow_bag) } else { Some(overlay.clone()) };
    let schema = DataSlice::schema_item(shallow.schema().clone(), schema_bag)?;
    extract_with_schema(&shallow.with_bag(Some(overlay)), &schema, config)
}

// ============================================================================
// No-follow
// ============================================================================

/// Same data under the no-follow wrapper of its schema.
pub fn nofollow(ds: &DataSlice) -> Result<DataSlice> {
    ds.with_schema(nofollow_schema_item(ds.schema())?)
}

/// Inverse of [`nofollow`].
pub fn follow(ds: &DataSlice) -> Result<DataSlice> {
    ds.with_schema(get_nofollowed_schema_item(ds.schema())?)
}
