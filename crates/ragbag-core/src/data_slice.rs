//! `DataSlice`: jagged data plus its schema and (optionally) its bag.

use crate::data_bag::DataBagPtr;
use crate::data_item::DataItem;
use crate::dtype::DType;
use crate::error::{RagbagError, Result};
use crate::shape::JaggedShape;
use crate::slice::DataSliceImpl;
use std::sync::Arc;

/// Scalar or flattened payload of a [`DataSlice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SliceData {
    Item(DataItem),
    Slice(DataSliceImpl),
}

impl SliceData {
    /// Flat view; a scalar becomes a one-element slice.
    pub fn to_slice(&self) -> DataSliceImpl {
        match self {
            SliceData::Item(item) => DataSliceImpl::from_values([item.clone()]),
            SliceData::Slice(slice) => slice.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DataSlice {
    data: SliceData,
    shape: JaggedShape,
    schema: DataItem,
    bag: Option<DataBagPtr>,
}

impl DataSlice {
    pub fn from_item(item: DataItem, schema: DataItem, bag: Option<DataBagPtr>) -> Result<Self> {
        Self::create(SliceData::Item(item), JaggedShape::scalar(), schema, bag)
    }

    pub fn from_impl(
        values: DataSliceImpl,
        shape: JaggedShape,
        schema: DataItem,
        bag: Option<DataBagPtr>,
    ) -> Result<Self> {
        Self::create(SliceData::Slice(values), shape, schema, bag)
    }

    pub fn create(
        data: SliceData,
        shape: JaggedShape,
        schema: DataItem,
        bag: Option<DataBagPtr>,
    ) -> Result<Self> {
        if !schema.is_schema() {
            return Err(RagbagError::invalid_argument(format!(
                "schema must be a schema, got {schema}"
            )));
        }
        match (&data, shape.rank()) {
            (SliceData::Item(_), 0) => {}
            (SliceData::Slice(values), rank) if rank > 0 && values.len() == shape.size() => {}
            (SliceData::Item(_), rank) => {
                return Err(RagbagError::invalid_argument(format!(
                    "a single item requires a scalar shape, got rank {rank}"
                )))
            }
            (SliceData::Slice(values), _) => {
                return Err(RagbagError::invalid_argument(format!(
                    "shape of size {} and rank {} does not match {} values",
                    shape.size(),
                    shape.rank(),
                    values.len()
                )))
            }
        }
        Ok(Self {
            data,
            shape,
            schema,
            bag,
        })
    }

    /// A schema item usable as the schema argument of an operation.
    pub fn schema_item(schema: DataItem, bag: Option<DataBagPtr>) -> Result<Self> {
        crate::schema::verify_is_schema(&schema)?;
        Self::from_item(schema, DType::Schema.into(), bag)
    }

    pub fn data(&self) -> &SliceData {
        &self.data
    }

    pub fn shape(&self) -> &JaggedShape {
        &self.shape
    }

    pub fn schema(&self) -> &DataItem {
        &self.schema
    }

    pub fn bag(&self) -> Option<&DataBagPtr> {
        self.bag.as_ref()
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn size(&self) -> usize {
        self.shape.size()
    }

    pub fn is_item(&self) -> bool {
        matches!(self.data, SliceData::Item(_))
    }

    pub fn as_item(&self) -> Option<&DataItem> {
        match &self.data {
            SliceData::Item(item) => Some(item),
            SliceData::Slice(_) => None,
        }
    }

    /// Flattened values, scalars included.
    pub fn values(&self) -> DataSliceImpl {
        self.data.to_slice()
    }

    pub fn with_bag(&self, bag: Option<DataBagPtr>) -> Self {
        Self {
            bag,
            ..self.clone()
        }
    }

    pub fn with_schema(&self, schema: DataItem) -> Result<Self> {
        Self::create(self.data.clone(), self.shape.clone(), schema, self.bag.clone())
    }

    /// Same data, shape and schema; the bag is compared by identity.
    pub fn is_same_as(&self, other: &DataSlice) -> bool {
        self.data == other.data
            && self.shape.is_equivalent_to(&other.shape)
            && self.schema == other.schema
            && match (&self.bag, &other.bag) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            }
    }
}
