//! ragbag-core: the data model of the ragbag object store.
//!
//! Layers, leaf first:
//! 1. **`DataItem`**: tagged scalar (or missing) with stable fingerprints
//! 2. **`ObjectId`**: allocation-scoped identity of entities, lists, dicts
//!    and schemas
//! 3. **`DataSliceImpl` + `JaggedShape`**: flat columns and split-point edges
//! 4. **`DataBagImpl`**: columnar triple store read through explicit
//!    fallback spans
//! 5. **`DataBag`**: shareable copy-on-write wrapper with a fallback chain,
//!    flattened by `FlattenFallbackFinder`
//! 6. **`DataSlice`**: what operations take and return
//!
//! ```text
//!   DataSlice ──► DataBag ──► Arc<DataBagImpl>
//!                   │
//!                   └─ fallbacks: [DataBag, ...]  (read-only, first hit wins)
//! ```

pub mod data_bag;
pub mod data_bag_impl;
pub mod data_item;
pub mod data_slice;
pub mod dtype;
pub mod error;
pub mod object_id;
pub mod schema;
pub mod shape;
pub mod slice;

pub use data_bag::{DataBag, DataBagPtr, FlattenFallbackFinder};
pub use data_bag_impl::{DataBagContent, DataBagImpl, MergeOptions, MergePolicy};
pub use data_item::{DataItem, ExprQuote, Fingerprint};
pub use data_slice::{DataSlice, SliceData};
pub use dtype::{
    DType, DICT_KEYS_SCHEMA_ATTR, DICT_VALUES_SCHEMA_ATTR, LIST_ITEMS_SCHEMA_ATTR, SCHEMA_ATTR,
};
pub use error::{ErrorCode, RagbagError, Result};
pub use object_id::{
    allocate_explicit_schema, allocate_single_dict, allocate_single_list, allocate_single_object,
    AllocationId, ObjectId, ObjectKind,
};
pub use schema::{get_nofollowed_schema_item, is_nofollow_schema, nofollow_schema_item};
pub use shape::{Edge, JaggedShape};
pub use slice::{DataSliceImpl, SliceDType};
