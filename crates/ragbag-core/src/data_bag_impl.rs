//! `DataBagImpl`: the triple store behind a `DataBag`.
//!
//! Storage is columnar, one column per attribute name:
//!
//! ```text
//!   attrs:        "x"  -> { $1:0 -> 1, $1:1 -> 2 }
//!                 "y"  -> { $1:0 -> 'a' }
//!   schema_attrs: $schema:7:0 -> { "x" -> INT32, "y" -> TEXT }
//!   lists:        $list:9:0   -> [1, 2, 3]
//!   dicts:        $dict:a:0   -> { 'k' -> 1 }
//! ```
//!
//! Every read takes an explicit fallback span: the primary store is consulted
//! first, then each fallback in order, and the first hit wins. Writes only
//! touch the local store. Setting a missing value removes the local entry so
//! that fallbacks become visible again.

use crate::data_item::DataItem;
use crate::error::{RagbagError, Result};
use crate::object_id::ObjectId;
use crate::shape::Edge;
use crate::slice::DataSliceImpl;
use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Dict storage
// ============================================================================

/// Insertion-ordered dict contents.
#[derive(Debug, Clone, Default)]
struct Dict {
    entries: AHashMap<DataItem, (u64, DataItem)>,
    next_seq: u64,
}

impl Dict {
    fn set(&mut self, key: DataItem, value: DataItem) {
        if value.is_missing() {
            self.entries.remove(&key);
            return;
        }
        if let Some(slot) = self.entries.get_mut(&key) {
            slot.1 = value;
            return;
        }
        self.entries.insert(key, (self.next_seq, value));
        self.next_seq += 1;
    }

    fn get(&self, key: &DataItem) -> Option<&DataItem> {
        self.entries.get(key).map(|(_, v)| v)
    }

    fn ordered(&self) -> Vec<(&DataItem, &DataItem)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(k, (seq, v))| (*seq, k, v))
            .collect();
        entries.sort_unstable_by_key(|(seq, _, _)| *seq);
        entries.into_iter().map(|(_, k, v)| (k, v)).collect()
    }
}

fn check_dict_key(key: &DataItem) -> Result<()> {
    match key {
        DataItem::Missing => Err(RagbagError::invalid_argument(
            "dict keys cannot be missing",
        )),
        DataItem::Float32(_) | DataItem::Float64(_) | DataItem::ExprQuote(_) => {
            Err(RagbagError::invalid_argument(format!(
                "dict keys cannot be {}, got {key}",
                key.dtype().map_or("NONE", |d| d.name())
            )))
        }
        _ => Ok(()),
    }
}

// ============================================================================
// Merge options
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MergePolicy {
    /// Conflicting values fail the merge.
    #[default]
    Raise,
    /// The incoming value wins.
    Overwrite,
    /// The existing value wins.
    KeepOriginal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MergeOptions {
    pub data_conflict_policy: MergePolicy,
    pub schema_conflict_policy: MergePolicy,
}

impl MergeOptions {
    pub const KEEP_ORIGINAL: MergeOptions = MergeOptions {
        data_conflict_policy: MergePolicy::KeepOriginal,
        schema_conflict_policy: MergePolicy::KeepOriginal,
    };
}

// ============================================================================
// DataBagImpl
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct DataBagImpl {
    /// attribute name -> object -> value
    attrs: AHashMap<Arc<str>, AHashMap<ObjectId, DataItem>>,
    /// schema -> attribute name -> attribute schema
    schema_attrs: AHashMap<ObjectId, BTreeMap<Arc<str>, DataItem>>,
    lists: AHashMap<ObjectId, Vec<DataItem>>,
    dicts: AHashMap<ObjectId, Dict>,
}

impl DataBagImpl {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the store holds no triples.
    pub fn is_empty(&self) -> bool {
        self.attrs.values().all(|column| column.is_empty())
            && self.schema_attrs.values().all(|attrs| attrs.is_empty())
            && self.lists.is_empty()
            && self.dicts.values().all(|d| d.entries.is_empty())
    }

    // ------------------------------------------------------------------------
    // Entity attributes
    // ------------------------------------------------------------------------

    fn get_attr_local(&self, obj: ObjectId, attr: &str) -> Option<&DataItem> {
        self.attrs.get(attr).and_then(|column| column.get(&obj))
    }

    pub fn get_attr(&self, obj: ObjectId, attr: &str, fallbacks: &[&DataBagImpl]) -> DataItem {
        std::iter::once(self)
            .chain(fallbacks.iter().copied())
            .find_map(|bag| bag.get_attr_local(obj, attr))
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_attr(&mut self, obj: ObjectId, attr: &str, value: DataItem) {
        if value.is_missing() {
            if let Some(column) = self.attrs.get_mut(attr) {
                column.remove(&obj);
            }
            return;
        }
        if let Some(column) = self.attrs.get_mut(attr) {
            column.insert(obj, value);
            return;
        }
        self.attrs
            .entry(Arc::from(attr))
            .or_default()
            .insert(obj, value);
    }

    /// Element-wise `get_attr`; non-object items yield missing.
    pub fn get_attrs(
        &self,
        objs: &DataSliceImpl,
        attr: &str,
        fallbacks: &[&DataBagImpl],
    ) -> DataSliceImpl {
        objs.iter()
            .map(|item| match item.as_object_id() {
                Some(obj) => self.get_attr(obj, attr, fallbacks),
                None => DataItem::Missing,
            })
            .collect()
    }

    /// Element-wise `set_attr`. Missing objects are skipped.
    pub fn set_attrs(
        &mut self,
        objs: &DataSliceImpl,
        attr: &str,
        values: &DataSliceImpl,
    ) -> Result<()> {
        if objs.len() != values.len() {
            return Err(RagbagError::invalid_argument(format!(
                "cannot set attribute '{attr}': {} objects but {} values",
                objs.len(),
                values.len()
            )));
        }
        for (item, value) in objs.iter().zip(values.iter()) {
            match item {
                DataItem::Missing => {}
                DataItem::ObjectId(obj) => self.set_attr(*obj, attr, value.clone()),
                other => {
                    return Err(RagbagError::invalid_argument(format!(
                        "setting attribute '{attr}' on a primitive is not allowed: {other}"
                    )))
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Schema attributes
    // ------------------------------------------------------------------------

    fn schema_attrs_local(&self, schema: ObjectId) -> Option<&BTreeMap<Arc<str>, DataItem>> {
        self.schema_attrs.get(&schema)
    }

    pub fn get_schema_attr(
        &self,
        schema: ObjectId,
        attr: &str,
        fallbacks: &[&DataBagImpl],
    ) -> DataItem {
        std::iter::once(self)
            .chain(fallbacks.iter().copied())
            .find_map(|bag| bag.schema_attrs_local(schema).and_then(|m| m.get(attr)))
            .cloned()
            .unwrap_or_default()
    }

    /// Union of the attribute names declared on `schema`, sorted.
    pub fn get_schema_attrs(&self, schema: ObjectId, fallbacks: &[&DataBagImpl]) -> Vec<Arc<str>> {
        let mut names: Vec<Arc<str>> = Vec::new();
        let mut seen: AHashSet<&str> = AHashSet::new();
        for bag in std::iter::once(self).chain(fallbacks.iter().copied()) {
            let Some(attrs) = bag.schema_attrs_local(schema) else {
                continue;
            };
            for name in attrs.keys() {
                if seen.insert(name.as_ref()) {
                    names.push(name.clone());
                }
            }
        }
        names.sort_unstable();
        names
    }

    pub fn set_schema_attr(&mut self, schema: ObjectId, attr: &str, value: DataItem) -> Result<()> {
        if !schema.is_schema() || schema.is_nofollow_schema() {
            return Err(RagbagError::invalid_argument(format!(
                "cannot set schema attribute '{attr}' on a non-schema {schema}"
            )));
        }
        if value.is_missing() {
            if let Some(attrs) = self.schema_attrs.get_mut(&schema) {
                attrs.remove(attr);
            }
            return Ok(());
        }
        if !value.is_schema() {
            return Err(RagbagError::invalid_argument(format!(
                "schema attribute '{attr}' must be a schema, got {value}"
            )));
        }
        self.schema_attrs
            .entry(schema)
            .or_default()
            .insert(Arc::from(attr), value);
        Ok(())
    }

    pub fn del_schema_attr(&mut self, schema: ObjectId, attr: &str) -> Result<()> {
        let removed = self
            .schema_attrs
            .get_mut(&schema)
            .and_then(|attrs| attrs.remove(attr));
        match removed {
            Some(_) => Ok(()),
            None => Err(RagbagError::invalid_argument(format!(
                "the attribute '{attr}' is missing on the schema {schema}"
            ))),
        }
    }

    // ------------------------------------------------------------------------
    // Lists
    // ------------------------------------------------------------------------

    fn require_list(list: ObjectId) -> Result<()> {
        if list.is_list() {
            Ok(())
        } else {
            Err(RagbagError::invalid_argument(format!("{list} is not a list")))
        }
    }

    /// Contents of `list` from the first store that has it.
    pub fn get_list<'a>(&'a self, list: ObjectId, fallbacks: &[&'a DataBagImpl]) -> Option<&'a [DataItem]> {
        std::iter::once(self)
            .chain(fallbacks.iter().copied())
            .find_map(|bag| bag.lists.get(&list))
            .map(Vec::as_slice)
    }

    pub fn get_list_size(&self, list: ObjectId, fallbacks: &[&DataBagImpl]) -> usize {
        self.get_list(list, fallbacks).map_or(0, <[DataItem]>::len)
    }

    /// Item at `index`; negative indices count from the end.
    pub fn get_from_list(&self, list: ObjectId, index: i64, fallbacks: &[&DataBagImpl]) -> DataItem {
        let Some(items) = self.get_list(list, fallbacks) else {
            return DataItem::Missing;
        };
        resolve_index(index, items.len())
            .map(|i| items[i].clone())
            .unwrap_or_default()
    }

    pub fn explode_list(&self, list: ObjectId, fallbacks: &[&DataBagImpl]) -> DataSliceImpl {
        self.get_list(list, fallbacks)
            .map(|items| DataSliceImpl::from_values(items.iter().cloned()))
            .unwrap_or_default()
    }

    pub fn append_to_list(&mut self, list: ObjectId, item: DataItem) -> Result<()> {
        Self::require_list(list)?;
        self.lists.entry(list).or_default().push(item);
        Ok(())
    }

    /// Appends `items`, creating the list if needed.
    pub fn extend_list(
        &mut self,
        list: ObjectId,
        items: impl IntoIterator<Item = DataItem>,
    ) -> Result<()> {
        Self::require_list(list)?;
        self.lists.entry(list).or_default().extend(items);
        Ok(())
    }

    /// Appends `values[edge.group(i)]` to `lists[i]` for every list.
    pub fn extend_lists(
        &mut self,
        lists: &DataSliceImpl,
        values: &DataSliceImpl,
        edge: &Edge,
    ) -> Result<()> {
        if edge.parent_size() != lists.len() || edge.child_size() != values.len() {
            return Err(RagbagError::invalid_argument(format!(
                "edge of shape {}->{} does not match {} lists and {} values",
                edge.parent_size(),
                edge.child_size(),
                lists.len(),
                values.len()
            )));
        }
        for (list, range) in lists.iter().zip(edge.groups()) {
            match list {
                DataItem::Missing => {}
                DataItem::ObjectId(id) => {
                    self.extend_list(*id, values.values()[range].iter().cloned())?
                }
                other => {
                    return Err(RagbagError::invalid_argument(format!(
                        "{other} is not a list"
                    )))
                }
            }
        }
        Ok(())
    }

    /// Out-of-range indices are ignored.
    pub fn set_in_list(&mut self, list: ObjectId, index: i64, value: DataItem) -> Result<()> {
        Self::require_list(list)?;
        if let Some(items) = self.lists.get_mut(&list) {
            if let Some(i) = resolve_index(index, items.len()) {
                items[i] = value;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Dicts
    // ------------------------------------------------------------------------

    fn require_dict(dict: ObjectId) -> Result<()> {
        if dict.is_dict() {
            Ok(())
        } else {
            Err(RagbagError::invalid_argument(format!("{dict} is not a dict")))
        }
    }

    pub fn set_in_dict(&mut self, dict: ObjectId, key: DataItem, value: DataItem) -> Result<()> {
        Self::require_dict(dict)?;
        check_dict_key(&key)?;
        self.dicts.entry(dict).or_default().set(key, value);
        Ok(())
    }

    /// Element-wise `set_in_dict` over parallel slices.
    pub fn set_in_dicts(
        &mut self,
        dicts: &DataSliceImpl,
        keys: &DataSliceImpl,
        values: &DataSliceImpl,
    ) -> Result<()> {
        if dicts.len() != keys.len() || keys.len() != values.len() {
            return Err(RagbagError::invalid_argument(format!(
                "dicts, keys and values must have the same size, got {}, {} and {}",
                dicts.len(),
                keys.len(),
                values.len()
            )));
        }
        for ((dict, key), value) in dicts.iter().zip(keys.iter()).zip(values.iter()) {
            match dict {
                DataItem::Missing => {}
                DataItem::ObjectId(id) => self.set_in_dict(*id, key.clone(), value.clone())?,
                other => {
                    return Err(RagbagError::invalid_argument(format!(
                        "{other} is not a dict"
                    )))
                }
            }
        }
        Ok(())
    }

    pub fn get_from_dict(&self, dict: ObjectId, key: &DataItem, fallbacks: &[&DataBagImpl]) -> DataItem {
        std::iter::once(self)
            .chain(fallbacks.iter().copied())
            .find_map(|bag| bag.dicts.get(&dict).and_then(|d| d.get(key)))
            .cloned()
            .unwrap_or_default()
    }

    /// Keys of `dict` across the fallback span: primary keys first, then the
    /// keys each fallback adds, each in insertion order.
    pub fn get_dict_keys(&self, dict: ObjectId, fallbacks: &[&DataBagImpl]) -> Vec<DataItem> {
        self.get_dict_entries(dict, fallbacks)
            .into_iter()
            .map(|(k, _)| k)
            .collect()
    }

    /// Entries of `dict`; each key takes its value from the first store that
    /// has it.
    pub fn get_dict_entries(
        &self,
        dict: ObjectId,
        fallbacks: &[&DataBagImpl],
    ) -> Vec<(DataItem, DataItem)> {
        let mut seen: AHashSet<&DataItem> = AHashSet::new();
        let mut entries = Vec::new();
        for bag in std::iter::once(self).chain(fallbacks.iter().copied()) {
            let Some(contents) = bag.dicts.get(&dict) else {
                continue;
            };
            for (key, value) in contents.ordered() {
                if seen.insert(key) {
                    entries.push((key.clone(), value.clone()));
                }
            }
        }
        entries
    }

    pub fn get_dict_size(&self, dict: ObjectId, fallbacks: &[&DataBagImpl]) -> usize {
        self.get_dict_entries(dict, fallbacks).len()
    }

    /// Removes the local entries; entries held by fallbacks stay visible.
    pub fn clear_dict(&mut self, dict: ObjectId) -> Result<()> {
        Self::require_dict(dict)?;
        if let Some(contents) = self.dicts.get_mut(&dict) {
            contents.entries.clear();
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Merge
    // ------------------------------------------------------------------------

    /// Merges every triple of `other` into `self`.
    ///
    /// Conflicts are checked before anything is written, so a failing merge
    /// leaves `self` unchanged.
    pub fn merge_inplace(&mut self, other: &DataBagImpl, options: MergeOptions) -> Result<()> {
        if options.data_conflict_policy == MergePolicy::Raise {
            self.check_data_conflicts(other)?;
        }
        if options.schema_conflict_policy == MergePolicy::Raise {
            self.check_schema_conflicts(other)?;
        }
        let overwrite_data = options.data_conflict_policy == MergePolicy::Overwrite;
        let overwrite_schema = options.schema_conflict_policy == MergePolicy::Overwrite;

        for (attr, column) in &other.attrs {
            let target = self.attrs.entry(attr.clone()).or_default();
            for (obj, value) in column {
                if overwrite_data || !target.contains_key(obj) {
                    target.insert(*obj, value.clone());
                }
            }
        }
        for (schema, attrs) in &other.schema_attrs {
            let target = self.schema_attrs.entry(*schema).or_default();
            for (name, value) in attrs {
                if overwrite_schema || !target.contains_key(name) {
                    target.insert(name.clone(), value.clone());
                }
            }
        }
        for (list, items) in &other.lists {
            if overwrite_data || !self.lists.contains_key(list) {
                self.lists.insert(*list, items.clone());
            }
        }
        for (dict, contents) in &other.dicts {
            let target = self.dicts.entry(*dict).or_default();
            for (key, value) in contents.ordered() {
                if overwrite_data || target.get(key).is_none() {
                    target.set(key.clone(), value.clone());
                }
            }
        }
        tracing::trace!(
            attrs = other.attrs.len(),
            schemas = other.schema_attrs.len(),
            lists = other.lists.len(),
            dicts = other.dicts.len(),
            "merged data bag"
        );
        Ok(())
    }

    fn check_data_conflicts(&self, other: &DataBagImpl) -> Result<()> {
        for (attr, column) in &other.attrs {
            for (obj, value) in column {
                if let Some(existing) = self.get_attr_local(*obj, attr) {
                    if existing != value {
                        return Err(RagbagError::failed_precondition(format!(
                            "conflicting values for {obj}.{attr}: {existing} != {value}"
                        )));
                    }
                }
            }
        }
        for (list, items) in &other.lists {
            if let Some(existing) = self.lists.get(list) {
                if existing != items {
                    return Err(RagbagError::failed_precondition(format!(
                        "conflicting list contents for {list}"
                    )));
                }
            }
        }
        for (dict, contents) in &other.dicts {
            let Some(target) = self.dicts.get(dict) else {
                continue;
            };
            for (key, value) in contents.ordered() {
                if let Some(existing) = target.get(key) {
                    if existing != value {
                        return Err(RagbagError::failed_precondition(format!(
                            "conflicting dict values for {dict}[{key}]: {existing} != {value}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_schema_conflicts(&self, other: &DataBagImpl) -> Result<()> {
        for (schema, attrs) in &other.schema_attrs {
            let Some(target) = self.schema_attrs.get(schema) else {
                continue;
            };
            for (name, value) in attrs {
                if let Some(existing) = target.get(name) {
                    if existing != value {
                        return Err(RagbagError::failed_precondition(format!(
                            "conflicting values for schema {schema}: {name}: {existing} != {value}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Snapshot
    // ------------------------------------------------------------------------

    /// Sorted snapshot of every local triple.
    pub fn content(&self) -> DataBagContent {
        let mut attrs: Vec<(ObjectId, String, DataItem)> = self
            .attrs
            .iter()
            .flat_map(|(name, column)| {
                column
                    .iter()
                    .map(move |(obj, value)| (*obj, name.to_string(), value.clone()))
            })
            .collect();
        attrs.sort();

        let mut schema_attrs: Vec<(ObjectId, String, DataItem)> = self
            .schema_attrs
            .iter()
            .flat_map(|(schema, names)| {
                names
                    .iter()
                    .map(move |(name, value)| (*schema, name.to_string(), value.clone()))
            })
            .collect();
        schema_attrs.sort();

        let mut lists: Vec<(ObjectId, Vec<DataItem>)> = self
            .lists
            .iter()
            .map(|(list, items)| (*list, items.clone()))
            .collect();
        lists.sort();

        let mut dicts: Vec<(ObjectId, Vec<(DataItem, DataItem)>)> = self
            .dicts
            .iter()
            .filter(|(_, d)| !d.entries.is_empty())
            .map(|(dict, contents)| {
                let mut entries: Vec<_> = contents
                    .ordered()
                    .into_iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                entries.sort();
                (*dict, entries)
            })
            .collect();
        dicts.sort();

        DataBagContent {
            attrs,
            schema_attrs,
            lists,
            dicts,
        }
    }
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let i = if index < 0 { index + len } else { index };
    (0..len).contains(&i).then_some(i as usize)
}

/// Comparable view of a store: two stores hold the same triples iff their
/// contents are equal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataBagContent {
    pub attrs: Vec<(ObjectId, String, DataItem)>,
    pub schema_attrs: Vec<(ObjectId, String, DataItem)>,
    pub lists: Vec<(ObjectId, Vec<DataItem>)>,
    pub dicts: Vec<(ObjectId, Vec<(DataItem, DataItem)>)>,
}

impl DataBagContent {
    pub fn triple_count(&self) -> usize {
        self.attrs.len()
            + self.schema_attrs.len()
            + self.lists.iter().map(|(_, items)| items.len()).sum::<usize>()
            + self.dicts.iter().map(|(_, entries)| entries.len()).sum::<usize>()
    }
}

impl fmt::Display for DataBagContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (schema, name, value) in &self.schema_attrs {
            writeln!(f, "schema {schema}.{name} => {value}")?;
        }
        for (obj, name, value) in &self.attrs {
            writeln!(f, "{obj}.{name} => {value}")?;
        }
        for (list, items) in &self.lists {
            let items: Vec<String> = items.iter().map(ToString::to_string).collect();
            writeln!(f, "{list}[:] => [{}]", items.join(", "))?;
        }
        for (dict, entries) in &self.dicts {
            for (key, value) in entries {
                writeln!(f, "{dict}[{key}] => {value}")?;
            }
        }
        Ok(())
    }
}
