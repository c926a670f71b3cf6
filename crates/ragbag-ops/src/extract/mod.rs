//! Extraction and shallow clone over raw stores.
//!
//! These operate on `DataBagImpl`s and explicit fallback spans; the
//! `DataSlice`-level operators in [`crate::slice_ops`] flatten a bag's
//! fallbacks and call into here.

mod traversal;

pub use traversal::StoreView;

use crate::config::ExtractConfig;
use ragbag_core::{DataBagImpl, DataItem, DataSliceImpl, Result};
use traversal::Traversal;

/// Copies everything reachable from some data under a schema into a new
/// store.
#[derive(Clone, Copy)]
pub struct ExtractOp<'a> {
    data: StoreView<'a>,
    schema_source: Option<StoreView<'a>>,
    config: &'a ExtractConfig,
}

impl<'a> ExtractOp<'a> {
    pub fn new(data: StoreView<'a>, config: &'a ExtractConfig) -> Self {
        Self {
            data,
            schema_source: None,
            config,
        }
    }

    /// Resolve the given schema (and the schemas it reaches) from another
    /// store than the data.
    pub fn with_schema_source(self, schema_source: StoreView<'a>) -> Self {
        Self {
            schema_source: Some(schema_source),
            ..self
        }
    }

    pub fn extract_item(&self, item: &DataItem, schema: &DataItem) -> Result<DataBagImpl> {
        tracing::debug!(schema = %schema, separate_schema = self.schema_source.is_some(), "extract item");
        Traversal::new(self.data, self.schema_source, self.config)
            .extract(vec![item.clone()], schema.clone())
    }

    pub fn extract_slice(&self, slice: &DataSliceImpl, schema: &DataItem) -> Result<DataBagImpl> {
        tracing::debug!(
            size = slice.len(),
            schema = %schema,
            separate_schema = self.schema_source.is_some(),
            "extract slice"
        );
        Traversal::new(self.data, self.schema_source, self.config)
            .extract(slice.values().to_vec(), schema.clone())
    }
}

/// Re-identifies top-level objects one level deep.
#[derive(Clone, Copy)]
pub struct ShallowCloneOp<'a> {
    data: StoreView<'a>,
    schema_source: Option<StoreView<'a>>,
    config: &'a ExtractConfig,
}

impl<'a> ShallowCloneOp<'a> {
    pub fn new(data: StoreView<'a>, config: &'a ExtractConfig) -> Self {
        Self {
            data,
            schema_source: None,
            config,
        }
    }

    pub fn with_schema_source(self, schema_source: StoreView<'a>) -> Self {
        Self {
            schema_source: Some(schema_source),
            ..self
        }
    }

    /// Returns the new store and the re-identified item.
    pub fn clone_item(&self, item: &DataItem, schema: &DataItem) -> Result<(DataBagImpl, DataItem)> {
        tracing::debug!(schema = %schema, "shallow clone item");
        let (bag, mut items) = Traversal::new(self.data, self.schema_source, self.config)
            .shallow_clone(std::slice::from_ref(item), schema)?;
        Ok((bag, items.pop().unwrap_or_default()))
    }

    /// Returns the new store and the re-identified slice.
    pub fn clone_slice(
        &self,
        slice: &DataSliceImpl,
        schema: &DataItem,
    ) -> Result<(DataBagImpl, DataSliceImpl)> {
        tracing::debug!(size = slice.len(), schema = %schema, "shallow clone slice");
        let (bag, items) = Traversal::new(self.data, self.schema_source, self.config)
            .shallow_clone(slice.values(), schema)?;
        Ok((bag, DataSliceImpl::from_values(items)))
    }
}
