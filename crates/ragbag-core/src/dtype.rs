//! Schema markers for primitive types and the special schemas
//! (OBJECT, ANY, ITEMID, SCHEMA, NONE).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved attribute holding an object's own schema under OBJECT.
pub const SCHEMA_ATTR: &str = "__schema__";
/// List schema attribute: schema of the list items.
pub const LIST_ITEMS_SCHEMA_ATTR: &str = "__items__";
/// Dict schema attribute: schema of the keys.
pub const DICT_KEYS_SCHEMA_ATTR: &str = "__keys__";
/// Dict schema attribute: schema of the values.
pub const DICT_VALUES_SCHEMA_ATTR: &str = "__values__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DType {
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
    Mask,
    Text,
    Bytes,
    Expr,
    ItemId,
    Object,
    Any,
    Schema,
    None,
}

impl DType {
    pub const ALL: [DType; 14] = [
        DType::Int32,
        DType::Int64,
        DType::Float32,
        DType::Float64,
        DType::Bool,
        DType::Mask,
        DType::Text,
        DType::Bytes,
        DType::Expr,
        DType::ItemId,
        DType::Object,
        DType::Any,
        DType::Schema,
        DType::None,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            DType::Int32 => "INT32",
            DType::Int64 => "INT64",
            DType::Float32 => "FLOAT32",
            DType::Float64 => "FLOAT64",
            DType::Bool => "BOOL",
            DType::Mask => "MASK",
            DType::Text => "TEXT",
            DType::Bytes => "BYTES",
            DType::Expr => "EXPR",
            DType::ItemId => "ITEMID",
            DType::Object => "OBJECT",
            DType::Any => "ANY",
            DType::Schema => "SCHEMA",
            DType::None => "NONE",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.name() == name)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trip() {
        for dtype in DType::ALL {
            assert_eq!(DType::from_name(dtype.name()), Some(dtype));
        }
        assert_eq!(DType::from_name("int32"), None);
    }

    #[test]
    fn test_serde_uses_display_names() {
        let json = serde_json::to_string(&DType::ItemId).unwrap();
        assert_eq!(json, "\"ITEMID\"");
        let back: DType = serde_json::from_str("\"FLOAT64\"").unwrap();
        assert_eq!(back, DType::Float64);
    }
}
