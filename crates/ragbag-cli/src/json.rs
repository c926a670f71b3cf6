//! Nested JSON arrays <-> jagged `DataSlice`s.
//!
//! ```text
//!   [[1, 2], [], [3]]   ->  edges [0, 3], [0, 2, 2, 3]   values [1, 2, 3]
//! ```
//!
//! Leaves: `null` is missing, integers become INT64, other numbers FLOAT64,
//! strings TEXT, booleans BOOL. Every leaf must sit at the same depth.

use anyhow::{anyhow, bail, Result};
use ragbag_core::{
    DType, DataItem, DataSlice, DataSliceImpl, Edge, JaggedShape, SliceDType,
};
use serde_json::Value;

fn leaf_to_item(value: &Value) -> Result<DataItem> {
    Ok(match value {
        Value::Null => DataItem::Missing,
        Value::Bool(b) => DataItem::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => DataItem::Int64(i),
            None => DataItem::Float64(
                n.as_f64()
                    .ok_or_else(|| anyhow!("unsupported number {n}"))?,
            ),
        },
        Value::String(s) => DataItem::text(s.as_str()),
        Value::Array(_) | Value::Object(_) => bail!("expected a leaf value, got {value}"),
    })
}

fn schema_for(values: &DataSliceImpl) -> DataItem {
    match values.slice_dtype() {
        SliceDType::Single(dtype) => dtype.into(),
        SliceDType::Mixed => DType::Object.into(),
        SliceDType::Unknown => DType::None.into(),
    }
}

/// Parses a scalar or a uniformly nested array.
pub fn slice_from_json(value: &Value) -> Result<DataSlice> {
    let mut level: Vec<&Value> = vec![value];
    let mut edges = Vec::new();
    loop {
        let arrays = level.iter().filter(|v| v.is_array()).count();
        if arrays == 0 {
            break;
        }
        if arrays != level.len() {
            bail!("arrays and leaves are mixed at depth {}", edges.len());
        }
        let mut split_points = Vec::with_capacity(level.len() + 1);
        split_points.push(0i64);
        let mut next = Vec::new();
        for v in &level {
            if let Value::Array(children) = v {
                next.extend(children.iter());
            }
            split_points.push(next.len() as i64);
        }
        edges.push(Edge::from_split_points(split_points)?);
        level = next;
    }

    let values: DataSliceImpl = level
        .into_iter()
        .map(leaf_to_item)
        .collect::<Result<_>>()?;
    let schema = schema_for(&values);
    if edges.is_empty() {
        let item = values.get(0).clone();
        return Ok(DataSlice::from_item(item, schema, None)?);
    }
    let shape = JaggedShape::from_edges(edges)?;
    Ok(DataSlice::from_impl(values, shape, schema, None)?)
}

fn item_to_json(item: &DataItem) -> Value {
    match item {
        DataItem::Missing => Value::Null,
        DataItem::Int32(v) => Value::from(*v),
        DataItem::Int64(v) => Value::from(*v),
        DataItem::Float32(v) => serde_json::Number::from_f64(f64::from(*v))
            .map_or(Value::Null, Value::Number),
        DataItem::Float64(v) => serde_json::Number::from_f64(*v).map_or(Value::Null, Value::Number),
        DataItem::Bool(v) => Value::Bool(*v),
        DataItem::Unit => Value::Bool(true),
        DataItem::Text(v) => Value::String(v.to_string()),
        other => Value::String(other.to_string()),
    }
}

/// Inverse of [`slice_from_json`].
pub fn slice_to_json(ds: &DataSlice) -> Value {
    if let Some(item) = ds.as_item() {
        return item_to_json(item);
    }
    let mut level: Vec<Value> = ds.values().iter().map(item_to_json).collect();
    for edge in ds.shape().edges().iter().rev() {
        let mut children = level.into_iter();
        level = edge
            .groups()
            .map(|range| Value::Array(children.by_ref().take(range.len()).collect()))
            .collect();
    }
    level.pop().unwrap_or(Value::Array(Vec::new()))
}
