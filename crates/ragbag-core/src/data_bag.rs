//! `DataBag`: a shareable store with a fallback chain.
//!
//! The store itself lives behind `RwLock<Arc<DataBagImpl>>`. Readers take an
//! `Arc` snapshot; writers clone the impl only when a snapshot (or a fork) is
//! still holding it. Mutation is rejected on immutable bags.

use crate::data_bag_impl::{DataBagImpl, MergeOptions, MergePolicy};
use crate::error::{RagbagError, Result};
use ahash::AHashSet;
use parking_lot::{MappedRwLockWriteGuard, RwLock, RwLockWriteGuard};
use std::fmt;
use std::sync::Arc;

pub type DataBagPtr = Arc<DataBag>;

pub struct DataBag {
    impl_: RwLock<Arc<DataBagImpl>>,
    fallbacks: Vec<DataBagPtr>,
    is_mutable: bool,
}

impl DataBag {
    fn build(impl_: Arc<DataBagImpl>, fallbacks: Vec<DataBagPtr>, is_mutable: bool) -> DataBagPtr {
        Arc::new(Self {
            impl_: RwLock::new(impl_),
            fallbacks,
            is_mutable,
        })
    }

    /// A new, empty, mutable bag.
    pub fn empty() -> DataBagPtr {
        Self::build(Arc::default(), Vec::new(), true)
    }

    pub fn from_impl(impl_: DataBagImpl) -> DataBagPtr {
        Self::build(Arc::new(impl_), Vec::new(), true)
    }

    pub fn immutable_from_impl(impl_: DataBagImpl) -> DataBagPtr {
        Self::build(Arc::new(impl_), Vec::new(), false)
    }

    /// An immutable overlay with no data of its own.
    pub fn immutable_empty_with_fallbacks(fallbacks: impl IntoIterator<Item = DataBagPtr>) -> DataBagPtr {
        Self::build(Arc::default(), fallbacks.into_iter().collect(), false)
    }

    /// The bag shared by all present inputs.
    ///
    /// No present bag gives `None`, one distinct bag is returned as-is, and
    /// several distinct bags are combined into an immutable overlay in input
    /// order.
    pub fn common_data_bag(bags: &[Option<DataBagPtr>]) -> Option<DataBagPtr> {
        let mut seen: AHashSet<*const DataBag> = AHashSet::new();
        let mut distinct: Vec<DataBagPtr> = Vec::new();
        for bag in bags.iter().flatten() {
            if seen.insert(Arc::as_ptr(bag)) {
                distinct.push(bag.clone());
            }
        }
        match distinct.len() {
            0 => None,
            1 => distinct.pop(),
            _ => Some(Self::immutable_empty_with_fallbacks(distinct)),
        }
    }

    pub fn is_mutable(&self) -> bool {
        self.is_mutable
    }

    pub fn fallbacks(&self) -> &[DataBagPtr] {
        &self.fallbacks
    }

    /// Read-only view of the primary store at this point in time.
    pub fn impl_snapshot(&self) -> Arc<DataBagImpl> {
        self.impl_.read().clone()
    }

    /// Write access to the primary store.
    pub fn mutable_impl(&self) -> Result<MappedRwLockWriteGuard<'_, DataBagImpl>> {
        if !self.is_mutable {
            return Err(RagbagError::invalid_argument("DataBag is immutable"));
        }
        Ok(RwLockWriteGuard::map(self.impl_.write(), |impl_| {
            Arc::make_mut(impl_)
        }))
    }

    /// Mutable fork sharing data and fallbacks with `self` until either side
    /// writes.
    pub fn fork(&self) -> DataBagPtr {
        Self::build(self.impl_snapshot(), self.fallbacks.clone(), true)
    }

    /// Immutable fork.
    pub fn freeze(&self) -> DataBagPtr {
        Self::build(self.impl_snapshot(), self.fallbacks.clone(), false)
    }

    /// Merges `other` (flattened with its fallbacks) into this bag.
    pub fn merge_inplace(
        &self,
        other: &DataBag,
        overwrite: bool,
        allow_data_conflicts: bool,
        allow_schema_conflicts: bool,
    ) -> Result<()> {
        let policy = |allow: bool| match (allow, overwrite) {
            (false, _) => MergePolicy::Raise,
            (true, true) => MergePolicy::Overwrite,
            (true, false) => MergePolicy::KeepOriginal,
        };
        let options = MergeOptions {
            data_conflict_policy: policy(allow_data_conflicts),
            schema_conflict_policy: policy(allow_schema_conflicts),
        };
        let other_flat = other.flattened()?;
        let mut target = self.mutable_impl()?;
        target.merge_inplace(&other_flat, options)
    }

    /// Primary store merged with all flattened fallbacks, higher priority
    /// winning.
    pub fn flattened(&self) -> Result<DataBagImpl> {
        let mut merged = DataBagImpl::clone(&self.impl_snapshot());
        let finder = FlattenFallbackFinder::new(self);
        for fallback in finder.fallbacks() {
            merged.merge_inplace(fallback, MergeOptions::KEEP_ORIGINAL)?;
        }
        Ok(merged)
    }
}

impl fmt::Debug for DataBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataBag")
            .field("ptr", &(self as *const DataBag))
            .field("is_mutable", &self.is_mutable)
            .field("fallbacks", &self.fallbacks.len())
            .finish()
    }
}

// ============================================================================
// Fallback flattening
// ============================================================================

/// Flat, deduplicated, priority-ordered fallback chain of a bag.
///
/// ```text
///   bag -> [fb1 -> [fb3], fb2 -> [fb3]]
///   flattened: [fb1, fb3, fb2]
/// ```
///
/// Built once per operation; the primary itself is not included.
pub struct FlattenFallbackFinder {
    snapshots: Vec<Arc<DataBagImpl>>,
}

impl FlattenFallbackFinder {
    pub fn new(bag: &DataBag) -> Self {
        let mut seen: AHashSet<*const DataBag> = AHashSet::new();
        seen.insert(bag as *const DataBag);
        let mut stack: Vec<&DataBagPtr> = bag.fallbacks.iter().rev().collect();
        let mut snapshots = Vec::new();
        while let Some(fallback) = stack.pop() {
            if !seen.insert(Arc::as_ptr(fallback)) {
                continue;
            }
            snapshots.push(fallback.impl_snapshot());
            stack.extend(fallback.fallbacks.iter().rev());
        }
        Self { snapshots }
    }

    /// The span passed to every store read.
    pub fn fallbacks(&self) -> Vec<&DataBagImpl> {
        self.snapshots.iter().map(|s| &**s).collect()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Position of `impl_` in the chain, compared by identity.
    pub fn position(&self, impl_: &Arc<DataBagImpl>) -> Option<usize> {
        self.snapshots.iter().position(|s| Arc::ptr_eq(s, impl_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_item::DataItem;
    use crate::object_id::allocate_single_object;

    fn positions(finder: &FlattenFallbackFinder, bags: &[&DataBagPtr]) -> Vec<Option<usize>> {
        bags.iter()
            .map(|b| finder.position(&b.impl_snapshot()))
            .collect()
    }

    #[test]
    fn test_flatten_empty() {
        let db = DataBag::empty();
        assert!(FlattenFallbackFinder::new(&db).is_empty());
    }

    #[test]
    fn test_flatten_chain_and_diamond() {
        let db = DataBag::empty();
        let fb2 = DataBag::empty();
        let fb = DataBag::immutable_empty_with_fallbacks([fb2.clone()]);
        let top = DataBag::immutable_empty_with_fallbacks([db.clone(), fb.clone()]);
        let finder = FlattenFallbackFinder::new(&top);
        assert_eq!(finder.len(), 3);
        assert_eq!(positions(&finder, &[&db, &fb, &fb2]), vec![Some(0), Some(1), Some(2)]);

        let fb3 = DataBag::empty();
        let left = DataBag::immutable_empty_with_fallbacks([fb3.clone()]);
        let right = DataBag::immutable_empty_with_fallbacks([fb3.clone()]);
        let top = DataBag::immutable_empty_with_fallbacks([db.clone(), left.clone(), right.clone()]);
        let finder = FlattenFallbackFinder::new(&top);
        assert_eq!(finder.len(), 4);
        assert_eq!(
            positions(&finder, &[&db, &left, &fb3, &right]),
            vec![Some(0), Some(1), Some(2), Some(3)]
        );
    }

    #[test]
    fn test_flatten_exponential_is_linear() {
        const STEPS: usize = 1024;
        let mut db = DataBag::empty();
        let mut db2 = DataBag::empty();
        for _ in 0..STEPS {
            let next = DataBag::immutable_empty_with_fallbacks([db.clone(), db2.clone()]);
            db2 = DataBag::immutable_empty_with_fallbacks([db2, db]);
            db = next;
        }
        assert_eq!(FlattenFallbackFinder::new(&db).len(), STEPS * 2);
    }

    #[test]
    fn test_immutable_rejects_writes() {
        let db = DataBag::immutable_empty_with_fallbacks(Vec::new());
        let err = db.mutable_impl().unwrap_err();
        assert_eq!(err, RagbagError::invalid_argument("DataBag is immutable"));
    }

    #[test]
    fn test_fork_is_copy_on_write() {
        let obj = allocate_single_object();
        let db = DataBag::empty();
        db.mutable_impl().unwrap().set_attr(obj, "a", 1.into());
        let forked = db.fork();
        forked.mutable_impl().unwrap().set_attr(obj, "a", 2.into());
        assert_eq!(db.impl_snapshot().get_attr(obj, "a", &[]), DataItem::from(1));
        assert_eq!(forked.impl_snapshot().get_attr(obj, "a", &[]), DataItem::from(2));
        assert!(!db.freeze().is_mutable());
    }

    #[test]
    fn test_common_data_bag() {
        let a = DataBag::empty();
        let b = DataBag::empty();
        assert!(DataBag::common_data_bag(&[]).is_none());
        assert!(DataBag::common_data_bag(&[None, None]).is_none());
        let same = DataBag::common_data_bag(&[Some(a.clone()), None, Some(a.clone())]).unwrap();
        assert!(Arc::ptr_eq(&same, &a));
        let both = DataBag::common_data_bag(&[Some(a.clone()), Some(b.clone())]).unwrap();
        assert!(!both.is_mutable());
        assert_eq!(both.fallbacks().len(), 2);
    }

    #[test]
    fn test_merge_inplace_flattens_other() {
        let obj = allocate_single_object();
        let target = DataBag::empty();
        target.mutable_impl().unwrap().set_attr(obj, "a", 1.into());

        let inner = DataBag::empty();
        inner.mutable_impl().unwrap().set_attr(obj, "b", 2.into());
        let other = DataBag::empty();
        other.mutable_impl().unwrap().set_attr(obj, "a", 3.into());
        let other = DataBag::immutable_empty_with_fallbacks([other, inner]);

        assert!(target.merge_inplace(&other, false, false, false).is_err());
        target.merge_inplace(&other, false, true, false).unwrap();
        let merged = target.impl_snapshot();
        assert_eq!(merged.get_attr(obj, "a", &[]), DataItem::from(1));
        assert_eq!(merged.get_attr(obj, "b", &[]), DataItem::from(2));

        target.merge_inplace(&other, true, true, false).unwrap();
        assert_eq!(target.impl_snapshot().get_attr(obj, "a", &[]), DataItem::from(3));
    }
}
