//! `DataItem`: one scalar value (or missing).

use crate::dtype::DType;
use crate::object_id::ObjectId;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Opaque quoted expression. Compared and hashed by its source text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprQuote(Arc<str>);

impl ExprQuote {
    pub fn new(source: impl Into<Arc<str>>) -> Self {
        Self(source.into())
    }

    pub fn source(&self) -> &str {
        &self.0
    }
}

/// Stable 128-bit content fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub u128);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

#[derive(Clone, Default)]
pub enum DataItem {
    #[default]
    Missing,
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Bool(bool),
    /// Presence marker of the MASK type.
    Unit,
    Text(Arc<str>),
    Bytes(Arc<[u8]>),
    ExprQuote(ExprQuote),
    ObjectId(ObjectId),
    Schema(DType),
}

fn f32_bits(v: f32) -> u32 {
    if v.is_nan() {
        f32::NAN.to_bits()
    } else if v == 0.0 {
        0
    } else {
        v.to_bits()
    }
}

fn f64_bits(v: f64) -> u64 {
    if v.is_nan() {
        f64::NAN.to_bits()
    } else if v == 0.0 {
        0
    } else {
        v.to_bits()
    }
}

impl DataItem {
    pub fn text(s: impl Into<Arc<str>>) -> Self {
        DataItem::Text(s.into())
    }

    pub fn bytes(b: impl Into<Arc<[u8]>>) -> Self {
        DataItem::Bytes(b.into())
    }

    /// Position of the active case; part of the fingerprint.
    pub const fn case_index(&self) -> u8 {
        match self {
            DataItem::Missing => 0,
            DataItem::Int32(_) => 1,
            DataItem::Int64(_) => 2,
            DataItem::Float32(_) => 3,
            DataItem::Float64(_) => 4,
            DataItem::Bool(_) => 5,
            DataItem::Unit => 6,
            DataItem::Text(_) => 7,
            DataItem::Bytes(_) => 8,
            DataItem::ExprQuote(_) => 9,
            DataItem::ObjectId(_) => 10,
            DataItem::Schema(_) => 11,
        }
    }

    pub const fn is_missing(&self) -> bool {
        matches!(self, DataItem::Missing)
    }

    pub const fn is_present(&self) -> bool {
        !self.is_missing()
    }

    pub fn dtype(&self) -> Option<DType> {
        Some(match self {
            DataItem::Missing => return None,
            DataItem::Int32(_) => DType::Int32,
            DataItem::Int64(_) => DType::Int64,
            DataItem::Float32(_) => DType::Float32,
            DataItem::Float64(_) => DType::Float64,
            DataItem::Bool(_) => DType::Bool,
            DataItem::Unit => DType::Mask,
            DataItem::Text(_) => DType::Text,
            DataItem::Bytes(_) => DType::Bytes,
            DataItem::ExprQuote(_) => DType::Expr,
            DataItem::ObjectId(_) => DType::ItemId,
            DataItem::Schema(_) => DType::Schema,
        })
    }

    pub fn as_object_id(&self) -> Option<ObjectId> {
        match self {
            DataItem::ObjectId(id) => Some(*id),
            _ => None,
        }
    }

    /// A schema marker or a schema object id.
    pub fn is_schema(&self) -> bool {
        match self {
            DataItem::Schema(_) => true,
            DataItem::ObjectId(id) => id.is_schema(),
            _ => false,
        }
    }

    pub fn is_list(&self) -> bool {
        self.as_object_id().is_some_and(ObjectId::is_list)
    }

    pub fn is_dict(&self) -> bool {
        self.as_object_id().is_some_and(ObjectId::is_dict)
    }

    /// Ordering between two values of the same sortable case.
    ///
    /// Returns `None` when the cases differ or the case has no order.
    pub fn cmp_same_dtype(&self, other: &DataItem) -> Option<Ordering> {
        use DataItem::*;
        match (self, other) {
            (Int32(a), Int32(b)) => Some(a.cmp(b)),
            (Int64(a), Int64(b)) => Some(a.cmp(b)),
            (Float32(a), Float32(b)) => {
                Some(f32::from_bits(f32_bits(*a)).total_cmp(&f32::from_bits(f32_bits(*b))))
            }
            (Float64(a), Float64(b)) => {
                Some(f64::from_bits(f64_bits(*a)).total_cmp(&f64::from_bits(f64_bits(*b))))
            }
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (Unit, Unit) => Some(Ordering::Equal),
            (Text(a), Text(b)) => Some(a.cmp(b)),
            (Bytes(a), Bytes(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Content fingerprint, stable across processes.
    pub fn stable_fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update([self.case_index()]);
        match self {
            DataItem::Missing | DataItem::Unit => {}
            DataItem::Int32(v) => hasher.update(v.to_le_bytes()),
            DataItem::Int64(v) => hasher.update(v.to_le_bytes()),
            DataItem::Float32(v) => hasher.update(f32_bits(*v).to_le_bytes()),
            DataItem::Float64(v) => hasher.update(f64_bits(*v).to_le_bytes()),
            DataItem::Bool(v) => hasher.update([u8::from(*v)]),
            DataItem::Text(v) => hasher.update(v.as_bytes()),
            DataItem::Bytes(v) => hasher.update(v),
            DataItem::ExprQuote(v) => hasher.update(v.source().as_bytes()),
            DataItem::ObjectId(id) => {
                hasher.update(id.allocation_raw().to_le_bytes());
                hasher.update(id.offset().to_le_bytes());
                hasher.update([id.kind() as u8, u8::from(id.is_nofollow_schema())]);
            }
            DataItem::Schema(dtype) => hasher.update(dtype.name().as_bytes()),
        }
        let digest = hasher.finalize();
        let mut head = [0u8; 16];
        head.copy_from_slice(&digest[..16]);
        Fingerprint(u128::from_le_bytes(head))
    }
}

impl PartialEq for DataItem {
    fn eq(&self, other: &Self) -> bool {
        use DataItem::*;
        match (self, other) {
            (Missing, Missing) | (Unit, Unit) => true,
            (Int32(a), Int32(b)) => a == b,
            (Int64(a), Int64(b)) => a == b,
            (Float32(a), Float32(b)) => f32_bits(*a) == f32_bits(*b),
            (Float64(a), Float64(b)) => f64_bits(*a) == f64_bits(*b),
            (Bool(a), Bool(b)) => a == b,
            (Text(a), Text(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (ExprQuote(a), ExprQuote(b)) => a == b,
            (ObjectId(a), ObjectId(b)) => a == b,
            (Schema(a), Schema(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for DataItem {}

impl Hash for DataItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u8(self.case_index());
        match self {
            DataItem::Missing | DataItem::Unit => {}
            DataItem::Int32(v) => v.hash(state),
            DataItem::Int64(v) => v.hash(state),
            DataItem::Float32(v) => f32_bits(*v).hash(state),
            DataItem::Float64(v) => f64_bits(*v).hash(state),
            DataItem::Bool(v) => v.hash(state),
            DataItem::Text(v) => v.hash(state),
            DataItem::Bytes(v) => v.hash(state),
            DataItem::ExprQuote(v) => v.hash(state),
            DataItem::ObjectId(v) => v.hash(state),
            DataItem::Schema(v) => v.hash(state),
        }
    }
}

/// Total order used only to keep snapshots deterministic: by case, then by
/// value (floats by canonical bits).
impl Ord for DataItem {
    fn cmp(&self, other: &Self) -> Ordering {
        use DataItem::*;
        match (self, other) {
            (Float32(a), Float32(b)) => f32_bits(*a).cmp(&f32_bits(*b)),
            (Float64(a), Float64(b)) => f64_bits(*a).cmp(&f64_bits(*b)),
            (ExprQuote(a), ExprQuote(b)) => a.cmp(b),
            (ObjectId(a), ObjectId(b)) => a.cmp(b),
            (Schema(a), Schema(b)) => a.cmp(b),
            _ => self
                .case_index()
                .cmp(&other.case_index())
                .then_with(|| self.cmp_same_dtype(other).unwrap_or(Ordering::Equal)),
        }
    }
}

impl PartialOrd for DataItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn write_float(f: &mut fmt::Formatter<'_>, repr: String) -> fmt::Result {
    if repr.contains(['.', 'e', 'E']) || repr.contains("inf") || repr.contains("NaN") {
        f.write_str(&repr)
    } else {
        write!(f, "{repr}.0")
    }
}

impl fmt::Display for DataItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataItem::Missing => f.write_str("None"),
            DataItem::Unit => f.write_str("present"),
            DataItem::Int32(v) => write!(f, "{v}"),
            DataItem::Int64(v) => write!(f, "{v}"),
            DataItem::Float32(v) => write_float(f, v.to_string()),
            DataItem::Float64(v) => write_float(f, v.to_string()),
            DataItem::Bool(true) => f.write_str("True"),
            DataItem::Bool(false) => f.write_str("False"),
            DataItem::Text(v) => write!(f, "'{v}'"),
            DataItem::Bytes(v) => {
                f.write_str("b'")?;
                for &byte in v.iter() {
                    match byte {
                        b'\\' => f.write_str("\\\\")?,
                        b'\'' => f.write_str("\\'")?,
                        0x20..=0x7e => write!(f, "{}", byte as char)?,
                        _ => write!(f, "\\x{byte:02x}")?,
                    }
                }
                f.write_str("'")
            }
            DataItem::ExprQuote(q) => write!(f, "ExprQuote('{}')", q.source()),
            DataItem::ObjectId(id) => write!(f, "{id}"),
            DataItem::Schema(dtype) => write!(f, "{dtype}"),
        }
    }
}

impl fmt::Debug for DataItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

macro_rules! impl_from {
    ($($ty:ty => $case:ident),* $(,)?) => {
        $(impl From<$ty> for DataItem {
            fn from(v: $ty) -> Self {
                DataItem::$case(v)
            }
        })*
    };
}

impl_from!(
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    bool => Bool,
    ObjectId => ObjectId,
    DType => Schema,
    ExprQuote => ExprQuote,
);

impl From<&str> for DataItem {
    fn from(v: &str) -> Self {
        DataItem::Text(v.into())
    }
}

impl From<String> for DataItem {
    fn from(v: String) -> Self {
        DataItem::Text(v.into())
    }
}

impl<T: Into<DataItem>> From<Option<T>> for DataItem {
    fn from(v: Option<T>) -> Self {
        v.map_or(DataItem::Missing, Into::into)
    }
}
