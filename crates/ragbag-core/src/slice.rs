//! `DataSliceImpl`: a flat column of possibly mixed `DataItem`s.

use crate::data_item::DataItem;
use crate::dtype::DType;
use crate::object_id::{AllocationId, ObjectKind};
use std::sync::Arc;

/// Dtype summary of the present values in a slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceDType {
    /// No present values.
    Unknown,
    Single(DType),
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSliceImpl {
    values: Arc<[DataItem]>,
}

impl Default for DataSliceImpl {
    fn default() -> Self {
        Self {
            values: Arc::from(Vec::new()),
        }
    }
}

impl DataSliceImpl {
    pub fn from_values(values: impl IntoIterator<Item = DataItem>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    pub fn missing(size: usize) -> Self {
        Self::from_values(std::iter::repeat(DataItem::Missing).take(size))
    }

    /// `size` fresh entity ids from one allocation.
    pub fn allocate_empty_objects(size: usize) -> Self {
        let alloc = AllocationId::new(ObjectKind::Entity, size);
        Self::from_values((0..size).map(|i| DataItem::ObjectId(alloc.object_at(i))))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, i: usize) -> &DataItem {
        &self.values[i]
    }

    pub fn values(&self) -> &[DataItem] {
        &self.values
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DataItem> {
        self.values.iter()
    }

    pub fn slice_dtype(&self) -> SliceDType {
        let mut result = SliceDType::Unknown;
        for dtype in self.values.iter().filter_map(DataItem::dtype) {
            match result {
                SliceDType::Unknown => result = SliceDType::Single(dtype),
                SliceDType::Single(d) if d != dtype => return SliceDType::Mixed,
                _ => {}
            }
        }
        result
    }

    pub fn is_mixed_dtype(&self) -> bool {
        self.slice_dtype() == SliceDType::Mixed
    }

    /// All values missing (also true for an empty slice).
    pub fn is_empty_and_unknown(&self) -> bool {
        self.slice_dtype() == SliceDType::Unknown
    }
}

impl FromIterator<DataItem> for DataSliceImpl {
    fn from_iter<I: IntoIterator<Item = DataItem>>(iter: I) -> Self {
        Self::from_values(iter)
    }
}

impl<'a> IntoIterator for &'a DataSliceImpl {
    type Item = &'a DataItem;
    type IntoIter = std::slice::Iter<'a, DataItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
