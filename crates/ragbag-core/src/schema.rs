//! Schema helpers: validation and the no-follow wrapper.
//!
//! A no-follow schema is a reversible wrapper around an entity schema (or
//! OBJECT). Traversals copy references typed with it but never descend.

use crate::data_item::DataItem;
use crate::dtype::DType;
use crate::error::{RagbagError, Result};

/// Wrap `schema` so traversals stop at values typed with it.
pub fn nofollow_schema_item(schema: &DataItem) -> Result<DataItem> {
    match schema {
        DataItem::Schema(DType::Object) => {
            Ok(DataItem::ObjectId(crate::ObjectId::nofollow_object_schema()))
        }
        DataItem::Schema(dtype) => Err(RagbagError::invalid_argument(format!(
            "calling nofollow on {dtype} slice is not allowed"
        ))),
        DataItem::ObjectId(id) if !id.is_schema() => Err(RagbagError::internal(
            "calling nofollow on a non-schema is not allowed",
        )),
        DataItem::ObjectId(id) if id.is_nofollow_schema() => Err(RagbagError::invalid_argument(
            "calling nofollow on a nofollow slice is not allowed",
        )),
        DataItem::ObjectId(id) => Ok(DataItem::ObjectId(id.with_nofollow(true))),
        other => Err(RagbagError::internal(format!(
            "calling nofollow on a non-schema is not allowed: {other}"
        ))),
    }
}

/// Inverse of [`nofollow_schema_item`].
pub fn get_nofollowed_schema_item(schema: &DataItem) -> Result<DataItem> {
    match schema.as_object_id() {
        Some(id) if id == crate::ObjectId::nofollow_object_schema() => {
            Ok(DataItem::Schema(DType::Object))
        }
        Some(id) if id.is_nofollow_schema() => Ok(DataItem::ObjectId(id.with_nofollow(false))),
        _ => Err(RagbagError::invalid_argument(
            "a nofollow schema is required in get_nofollowed_schema",
        )),
    }
}

pub fn is_nofollow_schema(schema: &DataItem) -> bool {
    schema.as_object_id().is_some_and(|id| id.is_nofollow_schema())
}

/// Fails unless `item` is a schema (a dtype marker or a schema object id).
pub fn verify_is_schema(item: &DataItem) -> Result<()> {
    if item.is_schema() {
        Ok(())
    } else {
        Err(RagbagError::invalid_argument(format!(
            "schema's schema must be SCHEMA, got: {item}"
        )))
    }
}
