//! ragbag-ops: operators over ragbag stores.
//!
//! - **Extraction** (`extract`): copies the sub-graph reachable from some
//!   data under a schema into a fresh store, following list, dict and
//!   entity schemas and stopping at no-follow schemas
//! - **Shallow clone / clone** (`extract`, `slice_ops`): re-identifies
//!   top-level objects; clone also extracts everything below them
//! - **Group-by / unique** (`group_by`, `unique`): grouping and
//!   deduplication over the last dimension of jagged slices
//!
//! ```text
//!   DataSlice + DataBag ──► FlattenFallbackFinder ──► StoreView
//!                                                       │
//!                         ExtractOp / ShallowCloneOp ◄──┘
//!                                   │
//!                                   ▼
//!                         new DataBagImpl ──► DataSlice
//! ```

pub mod config;
pub mod extract;
pub mod group_by;
pub mod slice_ops;
pub mod unique;

pub use config::{ConfigError, ExtractConfig, OpsConfig};
pub use extract::{ExtractOp, ShallowCloneOp, StoreView};
pub use group_by::group_by_indices;
pub use slice_ops::{
    clone, clone_with_schema, extract, extract_with_schema, follow, nofollow, shallow_clone,
    shallow_clone_with_schema,
};
pub use unique::unique;
