//! Schema-directed traversal shared by extraction and shallow clone.
//!
//! ```text
//!   stack: [(items, schema, origin), ...]
//!
//!   pop ─► dtype?     OBJECT  -> read __schema__ per object, regroup, push
//!          │          SCHEMA  -> copy schema closure of the items
//!          │          ANY     -> error
//!          │          other   -> leaf, nothing to do
//!          └ schema id? nofollow -> stop
//!                       entity   -> copy declared attrs, push one task per attr
//!                       list     -> copy items, push items under __items__
//!                       dict     -> copy entries, push keys and values
//! ```
//!
//! Every schema reached is copied together with its whole schema closure.
//! Schemas reached from the caller's schema are read from the schema source
//! when one is given; schemas found in `__schema__` are always read from the
//! data source. Writing a different value over an already copied schema
//! attribute is a conflict.

use crate::config::ExtractConfig;
use ahash::{AHashMap, AHashSet};
use ragbag_core::{
    AllocationId, DType, DataBagImpl, DataItem, ObjectId, ObjectKind, RagbagError, Result,
    DICT_KEYS_SCHEMA_ATTR, DICT_VALUES_SCHEMA_ATTR, LIST_ITEMS_SCHEMA_ATTR, SCHEMA_ATTR,
};
use std::sync::Arc;

/// A store together with the fallback span it is read through.
#[derive(Clone, Copy)]
pub struct StoreView<'a> {
    pub bag: &'a DataBagImpl,
    pub fallbacks: &'a [&'a DataBagImpl],
}

impl<'a> StoreView<'a> {
    pub fn new(bag: &'a DataBagImpl, fallbacks: &'a [&'a DataBagImpl]) -> Self {
        Self { bag, fallbacks }
    }
}

/// Which store a schema is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Origin {
    Data,
    Schema,
}

enum SchemaLayout {
    Entity(Vec<(Arc<str>, DataItem)>),
    List(DataItem),
    Dict { keys: DataItem, values: DataItem },
}

struct Task {
    items: Vec<DataItem>,
    schema: DataItem,
    origin: Origin,
}

fn check_schema(schema: &DataItem) -> Result<()> {
    match schema {
        DataItem::Schema(DType::Any) => Err(RagbagError::internal(
            "clone/extract not supported for kAny schema",
        )),
        DataItem::Schema(_) => Ok(()),
        DataItem::ObjectId(id) if id.is_schema() => Ok(()),
        _ => Err(RagbagError::internal(format!(
            "unsupported schema type: {schema}"
        ))),
    }
}

fn format_names<'n>(names: impl IntoIterator<Item = &'n str>) -> String {
    let names: Vec<&str> = names.into_iter().collect();
    format!("[{}]", names.join(", "))
}

pub(crate) struct Traversal<'a> {
    data: StoreView<'a>,
    schema_source: Option<StoreView<'a>>,
    config: &'a ExtractConfig,
    result: DataBagImpl,
    visited_objects: AHashSet<(ObjectId, ObjectId, Origin)>,
    visited_schemas: AHashSet<(ObjectId, Origin)>,
    stack: Vec<Task>,
    tasks_run: usize,
}

impl<'a> Traversal<'a> {
    pub(crate) fn new(
        data: StoreView<'a>,
        schema_source: Option<StoreView<'a>>,
        config: &'a ExtractConfig,
    ) -> Self {
        Self {
            data,
            schema_source,
            config,
            result: DataBagImpl::new(),
            visited_objects: AHashSet::new(),
            visited_schemas: AHashSet::new(),
            stack: Vec::new(),
            tasks_run: 0,
        }
    }

    fn top_origin(&self) -> Origin {
        if self.schema_source.is_some() {
            Origin::Schema
        } else {
            Origin::Data
        }
    }

    fn schema_view(&self, origin: Origin) -> StoreView<'a> {
        match (origin, self.schema_source) {
            (Origin::Schema, Some(view)) => view,
            _ => self.data,
        }
    }

    // ------------------------------------------------------------------------
    // Extraction
    // ------------------------------------------------------------------------

    /// New store holding exactly the triples reachable from `items`.
    pub(crate) fn extract(mut self, items: Vec<DataItem>, schema: DataItem) -> Result<DataBagImpl> {
        check_schema(&schema)?;
        let origin = self.top_origin();
        self.stack.push(Task {
            items,
            schema,
            origin,
        });
        while let Some(task) = self.stack.pop() {
            self.tasks_run += 1;
            if let Some(max) = self.config.max_tasks {
                if self.tasks_run > max {
                    return Err(RagbagError::failed_precondition(format!(
                        "extraction exceeded the limit of {max} traversal tasks"
                    )));
                }
            }
            self.process(task)?;
        }
        tracing::trace!(tasks = self.tasks_run, "extraction traversal finished");
        Ok(self.result)
    }

    fn process(&mut self, task: Task) -> Result<()> {
        check_schema(&task.schema)?;
        match task.schema {
            DataItem::Schema(DType::Object) => self.process_objects(task.items),
            DataItem::Schema(DType::Schema) => self.process_schema_items(&task.items),
            DataItem::Schema(_) => Ok(()),
            DataItem::ObjectId(schema) if schema.is_nofollow_schema() => Ok(()),
            DataItem::ObjectId(schema) => self.process_entities(schema, task.items, task.origin),
            other => Err(RagbagError::internal(format!(
                "unsupported schema type: {other}"
            ))),
        }
    }

    /// OBJECT: dispatch each object on the schema stored in `__schema__`.
    fn process_objects(&mut self, items: Vec<DataItem>) -> Result<()> {
        let mut groups: Vec<(ObjectId, Vec<DataItem>)> = Vec::new();
        let mut group_index: AHashMap<ObjectId, usize> = AHashMap::new();
        for item in items {
            let Some(obj) = item.as_object_id() else {
                continue;
            };
            let schema = self.object_schema(obj)?;
            self.result.set_attr(obj, SCHEMA_ATTR, schema.into());
            let idx = *group_index.entry(schema).or_insert_with(|| {
                groups.push((schema, Vec::new()));
                groups.len() - 1
            });
            groups[idx].1.push(item);
        }
        for (schema, items) in groups.into_iter().rev() {
            self.stack.push(Task {
                items,
                schema: schema.into(),
                origin: Origin::Data,
            });
        }
        Ok(())
    }

    fn process_schema_items(&mut self, items: &[DataItem]) -> Result<()> {
        for item in items {
            match item.as_object_id() {
                Some(id) if id.is_schema() && !id.is_nofollow_schema() => {
                    self.copy_schema_closure(id, Origin::Data)?
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn process_entities(&mut self, schema: ObjectId, items: Vec<DataItem>, origin: Origin) -> Result<()> {
        let layout = self.schema_layout(schema, origin)?;
        self.copy_schema_closure(schema, origin)?;

        let mut objs = Vec::with_capacity(items.len());
        for item in &items {
            if let Some(obj) = item.as_object_id() {
                if self.visited_objects.insert((obj, schema, origin)) {
                    objs.push(obj);
                }
            }
        }
        if objs.is_empty() {
            return Ok(());
        }

        let data = self.data;
        match layout {
            SchemaLayout::Entity(attrs) => {
                for (name, attr_schema) in attrs {
                    let mut values = Vec::with_capacity(objs.len());
                    for &obj in &objs {
                        let value = data.bag.get_attr(obj, &name, data.fallbacks);
                        if value.is_present() {
                            self.result.set_attr(obj, &name, value.clone());
                            values.push(value);
                        }
                    }
                    self.push(values, attr_schema, origin);
                }
            }
            SchemaLayout::List(items_schema) => {
                let mut values = Vec::new();
                for &obj in &objs {
                    if let Some(list) = data.bag.get_list(obj, data.fallbacks) {
                        // A list reached under a second schema is already copied.
                        if self.result.get_list(obj, &[]).is_none() {
                            self.result.extend_list(obj, list.iter().cloned())?;
                        }
                        values.extend(list.iter().filter(|v| v.is_present()).cloned());
                    }
                }
                self.push(values, items_schema, origin);
            }
            SchemaLayout::Dict { keys, values } => {
                let mut key_items = Vec::new();
                let mut value_items = Vec::new();
                for &obj in &objs {
                    for (key, value) in data.bag.get_dict_entries(obj, data.fallbacks) {
                        self.result.set_in_dict(obj, key.clone(), value.clone())?;
                        key_items.push(key);
                        value_items.push(value);
                    }
                }
                self.push(key_items, keys, origin);
                self.push(value_items, values, origin);
            }
        }
        Ok(())
    }

    fn push(&mut self, items: Vec<DataItem>, schema: DataItem, origin: Origin) {
        self.stack.push(Task {
            items,
            schema,
            origin,
        });
    }

    // ------------------------------------------------------------------------
    // Schemas
    // ------------------------------------------------------------------------

    fn object_schema(&self, obj: ObjectId) -> Result<ObjectId> {
        match self.data.bag.get_attr(obj, SCHEMA_ATTR, self.data.fallbacks) {
            DataItem::ObjectId(schema) if schema.is_schema() => Ok(schema),
            _ => Err(RagbagError::invalid_argument(format!(
                "object {obj} is expected to have a schema ObjectId in {SCHEMA_ATTR} attribute"
            ))),
        }
    }

    fn schema_layout(&self, schema: ObjectId, origin: Origin) -> Result<SchemaLayout> {
        let src = self.schema_view(origin);
        let names = src.bag.get_schema_attrs(schema, src.fallbacks);
        let has = |attr: &str| names.iter().any(|n| n.as_ref() == attr);

        if has(LIST_ITEMS_SCHEMA_ATTR) {
            if names.len() != 1 {
                return Err(RagbagError::invalid_argument(format!(
                    "list schema {schema} has unexpected attributes {}",
                    format_names(
                        names
                            .iter()
                            .map(|n| n.as_ref())
                            .filter(|n| *n != LIST_ITEMS_SCHEMA_ATTR)
                    )
                )));
            }
            let items = src
                .bag
                .get_schema_attr(schema, LIST_ITEMS_SCHEMA_ATTR, src.fallbacks);
            return Ok(SchemaLayout::List(items));
        }

        if has(DICT_KEYS_SCHEMA_ATTR) || has(DICT_VALUES_SCHEMA_ATTR) {
            let missing: Vec<&str> = [DICT_KEYS_SCHEMA_ATTR, DICT_VALUES_SCHEMA_ATTR]
                .into_iter()
                .filter(|attr| !has(*attr))
                .collect();
            let unexpected: Vec<&str> = names
                .iter()
                .map(|n| n.as_ref())
                .filter(|n| *n != DICT_KEYS_SCHEMA_ATTR && *n != DICT_VALUES_SCHEMA_ATTR)
                .collect();
            if !missing.is_empty() {
                return Err(RagbagError::invalid_argument(format!(
                    "dict schema {schema} has unexpected attributes {}: {} is missing",
                    format_names(names.iter().map(|n| n.as_ref())),
                    missing.join(" and ")
                )));
            }
            if !unexpected.is_empty() {
                return Err(RagbagError::invalid_argument(format!(
                    "dict schema {schema} has unexpected attributes {}",
                    format_names(unexpected)
                )));
            }
            return Ok(SchemaLayout::Dict {
                keys: src
                    .bag
                    .get_schema_attr(schema, DICT_KEYS_SCHEMA_ATTR, src.fallbacks),
                values: src
                    .bag
                    .get_schema_attr(schema, DICT_VALUES_SCHEMA_ATTR, src.fallbacks),
            });
        }

        let attrs = names
            .into_iter()
            .map(|name| {
                let attr_schema = src.bag.get_schema_attr(schema, &name, src.fallbacks);
                (name, attr_schema)
            })
            .collect();
        Ok(SchemaLayout::Entity(attrs))
    }

    /// Copies `schema` and every schema reachable from its attributes.
    fn copy_schema_closure(&mut self, schema: ObjectId, origin: Origin) -> Result<()> {
        let src = self.schema_view(origin);
        let mut pending = vec![schema];
        while let Some(current) = pending.pop() {
            if !self.visited_schemas.insert((current, origin)) {
                continue;
            }
            for name in src.bag.get_schema_attrs(current, src.fallbacks) {
                let value = src.bag.get_schema_attr(current, &name, src.fallbacks);
                self.write_schema_attr(current, &name, &value)?;
                if let Some(id) = value.as_object_id() {
                    if id.is_schema() && !id.is_nofollow_schema() {
                        pending.push(id);
                    }
                }
            }
        }
        Ok(())
    }

    fn write_schema_attr(&mut self, schema: ObjectId, name: &str, value: &DataItem) -> Result<()> {
        let existing = self.result.get_schema_attr(schema, name, &[]);
        if existing.is_present() {
            if &existing != value {
                return Err(RagbagError::invalid_argument(format!(
                    "conflicting values for schema {schema}: {name}: {existing} != {value}"
                )));
            }
            return Ok(());
        }
        self.result.set_schema_attr(schema, name, value.clone())
    }

    // ------------------------------------------------------------------------
    // Shallow clone
    // ------------------------------------------------------------------------

    /// New store with fresh ids for the top-level objects and their direct
    /// values copied by reference. Returns the store and the new items.
    pub(crate) fn shallow_clone(
        mut self,
        items: &[DataItem],
        schema: &DataItem,
    ) -> Result<(DataBagImpl, Vec<DataItem>)> {
        check_schema(schema)?;
        let origin = self.top_origin();
        let mut remapper = IdRemapper::new(items.len());
        let mut new_items = Vec::with_capacity(items.len());

        match schema {
            DataItem::ObjectId(id) if id.is_nofollow_schema() => new_items.extend_from_slice(items),
            DataItem::ObjectId(id) => {
                let layout = self.schema_layout(*id, origin)?;
                self.copy_schema_closure(*id, origin)?;
                for (position, item) in items.iter().enumerate() {
                    let Some(old) = item.as_object_id() else {
                        new_items.push(item.clone());
                        continue;
                    };
                    let (new, fresh) = remapper.remap(old, position);
                    if fresh {
                        self.copy_direct(old, new, &layout)?;
                    }
                    new_items.push(new.into());
                }
            }
            DataItem::Schema(DType::Object) => {
                for (position, item) in items.iter().enumerate() {
                    let Some(old) = item.as_object_id() else {
                        new_items.push(item.clone());
                        continue;
                    };
                    let obj_schema = self.object_schema(old)?;
                    let (new, fresh) = remapper.remap(old, position);
                    if fresh {
                        self.result.set_attr(new, SCHEMA_ATTR, obj_schema.into());
                        if !obj_schema.is_nofollow_schema() {
                            let layout = self.schema_layout(obj_schema, Origin::Data)?;
                            self.copy_schema_closure(obj_schema, Origin::Data)?;
                            self.copy_direct(old, new, &layout)?;
                        }
                    }
                    new_items.push(new.into());
                }
            }
            DataItem::Schema(DType::ItemId) => {
                for (position, item) in items.iter().enumerate() {
                    match item.as_object_id() {
                        Some(old) => new_items.push(remapper.remap(old, position).0.into()),
                        None => new_items.push(item.clone()),
                    }
                }
            }
            DataItem::Schema(DType::Schema) => {
                self.process_schema_items(items)?;
                new_items.extend_from_slice(items);
            }
            _ => new_items.extend_from_slice(items),
        }
        Ok((self.result, new_items))
    }

    fn copy_direct(&mut self, old: ObjectId, new: ObjectId, layout: &SchemaLayout) -> Result<()> {
        let data = self.data;
        match layout {
            SchemaLayout::Entity(attrs) => {
                for (name, _) in attrs {
                    let value = data.bag.get_attr(old, name, data.fallbacks);
                    if value.is_present() {
                        self.result.set_attr(new, name, value);
                    }
                }
            }
            SchemaLayout::List(_) => {
                if let Some(list) = data.bag.get_list(old, data.fallbacks) {
                    self.result.extend_list(new, list.iter().cloned())?;
                }
            }
            SchemaLayout::Dict { .. } => {
                for (key, value) in data.bag.get_dict_entries(old, data.fallbacks) {
                    self.result.set_in_dict(new, key, value)?;
                }
            }
        }
        Ok(())
    }
}

/// Assigns one fresh id per distinct old id, from one allocation per kind.
struct IdRemapper {
    capacity: usize,
    allocations: AHashMap<ObjectKind, AllocationId>,
    mapping: AHashMap<ObjectId, ObjectId>,
}

impl IdRemapper {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            allocations: AHashMap::new(),
            mapping: AHashMap::new(),
        }
    }

    /// The new id for `old` and whether it was created by this call.
    fn remap(&mut self, old: ObjectId, position: usize) -> (ObjectId, bool) {
        if let Some(&new) = self.mapping.get(&old) {
            return (new, false);
        }
        let capacity = self.capacity;
        let alloc = *self
            .allocations
            .entry(old.kind())
            .or_insert_with(|| AllocationId::new(old.kind(), capacity));
        let new = alloc.object_at(position);
        self.mapping.insert(old, new);
        (new, true)
    }
}
