//! Object identities.
//!
//! An [`ObjectId`] is a small `Copy` value: the allocation it was created in,
//! its offset inside that allocation and a flag byte encoding its kind.
//! Allocations are reserved from a process-wide counter, so ids never
//! collide across stores and can be created without touching any store.
//!
//! ```text
//!   AllocationId { id: 42, capacity: 3, kind: List }
//!        |
//!        +-- object_at(0) -> $2a:0  (list)
//!        +-- object_at(1) -> $2a:1  (list)
//!        +-- object_at(2) -> $2a:2  (list)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Allocation 0 is reserved for the no-follow OBJECT schema.
static NEXT_ALLOCATION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectKind {
    Entity,
    List,
    Dict,
    ExplicitSchema,
    ImplicitSchema,
}

impl ObjectKind {
    const fn bits(self) -> u8 {
        match self {
            ObjectKind::Entity => 0,
            ObjectKind::List => 1,
            ObjectKind::Dict => 2,
            ObjectKind::ExplicitSchema => 3,
            ObjectKind::ImplicitSchema => 4,
        }
    }

    const fn from_bits(bits: u8) -> Self {
        match bits & KIND_MASK {
            1 => ObjectKind::List,
            2 => ObjectKind::Dict,
            3 => ObjectKind::ExplicitSchema,
            4 => ObjectKind::ImplicitSchema,
            _ => ObjectKind::Entity,
        }
    }

    pub const fn is_schema(self) -> bool {
        matches!(self, ObjectKind::ExplicitSchema | ObjectKind::ImplicitSchema)
    }
}

const KIND_MASK: u8 = 0b0000_0111;
const NOFOLLOW_BIT: u8 = 0b1000_0000;

// ============================================================================
// Allocations
// ============================================================================

/// A batch of ids created together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllocationId {
    id: u64,
    capacity: u32,
    kind: ObjectKind,
}

impl AllocationId {
    /// Reserve a fresh allocation able to hold `capacity` ids.
    pub fn new(kind: ObjectKind, capacity: usize) -> Self {
        let id = NEXT_ALLOCATION.fetch_add(1, Ordering::Relaxed);
        Self {
            id,
            capacity: u32::try_from(capacity).unwrap_or(u32::MAX),
            kind,
        }
    }

    pub const fn raw(self) -> u64 {
        self.id
    }

    pub const fn capacity(self) -> usize {
        self.capacity as usize
    }

    pub const fn kind(self) -> ObjectKind {
        self.kind
    }

    /// The id at `offset`; `offset` must be below the capacity.
    pub fn object_at(self, offset: usize) -> ObjectId {
        debug_assert!(offset < self.capacity());
        ObjectId {
            allocation: self.id,
            offset: offset as u32,
            flags: self.kind.bits(),
        }
    }

    pub fn contains(self, id: ObjectId) -> bool {
        id.allocation == self.id && (id.offset as usize) < self.capacity()
    }
}

// ============================================================================
// ObjectId
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    allocation: u64,
    offset: u32,
    flags: u8,
}

impl ObjectId {
    pub const fn kind(self) -> ObjectKind {
        ObjectKind::from_bits(self.flags)
    }

    pub const fn allocation_raw(self) -> u64 {
        self.allocation
    }

    pub const fn offset(self) -> u32 {
        self.offset
    }

    pub const fn is_list(self) -> bool {
        matches!(self.kind(), ObjectKind::List)
    }

    pub const fn is_dict(self) -> bool {
        matches!(self.kind(), ObjectKind::Dict)
    }

    pub const fn is_entity(self) -> bool {
        matches!(self.kind(), ObjectKind::Entity)
    }

    pub const fn is_schema(self) -> bool {
        self.kind().is_schema()
    }

    pub const fn is_nofollow_schema(self) -> bool {
        self.is_schema() && self.flags & NOFOLLOW_BIT != 0
    }

    pub(crate) const fn with_nofollow(self, nofollow: bool) -> Self {
        let flags = if nofollow {
            self.flags | NOFOLLOW_BIT
        } else {
            self.flags & !NOFOLLOW_BIT
        };
        Self { flags, ..self }
    }

    /// Reserved no-follow stand-in for the OBJECT schema marker.
    pub const fn nofollow_object_schema() -> Self {
        Self {
            allocation: 0,
            offset: 0,
            flags: ObjectKind::ExplicitSchema.bits() | NOFOLLOW_BIT,
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind() {
            ObjectKind::Entity => "$",
            ObjectKind::List => "$list:",
            ObjectKind::Dict => "$dict:",
            ObjectKind::ExplicitSchema | ObjectKind::ImplicitSchema => "$schema:",
        };
        write!(f, "{prefix}{:x}:{}", self.allocation, self.offset)?;
        if self.flags & NOFOLLOW_BIT != 0 {
            f.write_str(":nofollow")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

pub fn allocate_single_object() -> ObjectId {
    AllocationId::new(ObjectKind::Entity, 1).object_at(0)
}

pub fn allocate_single_list() -> ObjectId {
    AllocationId::new(ObjectKind::List, 1).object_at(0)
}

pub fn allocate_single_dict() -> ObjectId {
    AllocationId::new(ObjectKind::Dict, 1).object_at(0)
}

pub fn allocate_explicit_schema() -> ObjectId {
    AllocationId::new(ObjectKind::ExplicitSchema, 1).object_at(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_ids_are_distinct() {
        let a = AllocationId::new(ObjectKind::Entity, 4);
        let b = AllocationId::new(ObjectKind::Entity, 4);
        assert_ne!(a.object_at(0), b.object_at(0));
        assert!(a.contains(a.object_at(3)));
        assert!(!a.contains(b.object_at(3)));
    }

    #[test]
    fn test_kind_survives_nofollow() {
        let schema = allocate_explicit_schema();
        let wrapped = schema.with_nofollow(true);
        assert!(wrapped.is_schema());
        assert!(wrapped.is_nofollow_schema());
        assert_ne!(wrapped, schema);
        assert_eq!(wrapped.with_nofollow(false), schema);
    }

    #[test]
    fn test_kinds() {
        assert!(allocate_single_list().is_list());
        assert!(allocate_single_dict().is_dict());
        assert!(allocate_single_object().is_entity());
        assert!(!allocate_single_object().is_schema());
    }
}
