use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use crate::model::entry::read_slot;
use crate::model::{Entry, Notification, NodeDefId, PathAddress, Schema, SchemaContainer, SchemaNode, Value};
use crate::observer::tree_model::ModelShared;
use crate::observer::TreeModel;
use crate::store::NodeData;

/// Node definition bound to a backend element. Navigation resolves the
/// concrete variant of every element it reaches from its derived-id slot.
#[derive(Clone, Default)]
pub struct Instance {
    schema: Option<Arc<Schema>>,
    def: Option<NodeDefId>,
    data: NodeData,
    model: Option<Weak<ModelShared>>,
}

/// Concrete node type of `data` inside the chain below `def`
pub(crate) fn resolve_variant(schema: &Schema, def: NodeDefId, data: &NodeData) -> NodeDefId {
    let Some(slot) = schema.derived_id_value(def) else {
        return def;
    };
    let stored = read_slot(slot, data).or_else(|| slot.default_value().cloned());
    stored
        .and_then(|derived_id| schema.find_derived(def, &derived_id))
        .unwrap_or(def)
}

impl Instance {
    pub fn new(schema: Arc<Schema>, def: NodeDefId, data: NodeData) -> Self {
        Self {
            schema: Some(schema),
            def: Some(def),
            data,
            model: None,
        }
    }

    pub fn null() -> Self {
        Self::default()
    }

    pub(crate) fn with_model(mut self, model: Weak<ModelShared>) -> Self {
        self.model = Some(model);
        self
    }

    /// Handle to another element of the same schema and model
    fn bind(&self, def: NodeDefId, data: NodeData) -> Instance {
        Instance {
            schema: self.schema.clone(),
            def: Some(def),
            data,
            model: self.model.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.schema.is_none() || self.def.is_none() || self.data.is_null()
    }

    pub fn schema(&self) -> Option<&Arc<Schema>> {
        self.schema.as_ref()
    }

    pub fn def(&self) -> Option<NodeDefId> {
        self.def
    }

    pub fn node_def(&self) -> Option<&SchemaNode> {
        Some(self.schema.as_ref()?.node(self.def?))
    }

    pub fn name(&self) -> &str {
        self.node_def().map(SchemaNode::name).unwrap_or("")
    }

    pub fn data(&self) -> &NodeData {
        &self.data
    }

    pub fn tree_model(&self) -> Option<TreeModel> {
        self.model
            .as_ref()
            .and_then(Weak::upgrade)
            .map(TreeModel::from_shared)
    }

    fn parts(&self) -> Option<(&Arc<Schema>, NodeDefId)> {
        if self.is_null() {
            return None;
        }
        Some((self.schema.as_ref()?, self.def?))
    }

    /// Same element re-resolved, picking up a changed derived id
    pub fn resolved(&self) -> Instance {
        match self.parts() {
            Some((schema, def)) => {
                let root = schema.chain_root(def);
                self.bind(resolve_variant(schema, root, &self.data), self.data.clone())
            }
            None => Instance::null(),
        }
    }

    pub fn path(&self) -> Option<PathAddress> {
        PathAddress::of(self)
    }

    // ************* Values *************

    pub fn entry(&self, name: &str) -> Entry {
        let index = self
            .parts()
            .and_then(|(schema, def)| schema.value_index(def, name));
        Entry::new(self.clone(), name, index)
    }

    /// Stored value, falling back to the slot default
    pub fn value(&self, name: &str) -> Value {
        self.entry(name).value()
    }

    pub fn set_value(&self, name: &str, value: impl Into<Value>) -> bool {
        self.entry(name).set_value(value)
    }

    pub fn key_entry(&self) -> Entry {
        let name = self
            .parts()
            .and_then(|(schema, def)| schema.key_value(def))
            .map(|value| value.name().to_string())
            .unwrap_or_default();
        self.entry(&name)
    }

    pub fn derived_id_entry(&self) -> Entry {
        let name = self
            .parts()
            .and_then(|(schema, def)| schema.derived_id_value(def))
            .map(|value| value.name().to_string())
            .unwrap_or_default();
        self.entry(&name)
    }

    // ************* Navigation *************

    pub fn parent(&self) -> Instance {
        let Some((schema, def)) = self.parts() else {
            return Instance::null();
        };
        let parent_data = self.data.parent();
        if parent_data.is_null() {
            return Instance::null();
        }
        let tag = parent_data.tag_name();
        let mut fallback = None;
        for candidate in schema.parent_defs(def) {
            if schema.node(candidate).tag_name() != tag {
                continue;
            }
            let resolved = resolve_variant(schema, schema.chain_root(candidate), &parent_data);
            if schema.container_for_child(resolved, def).is_some() {
                return self.bind(resolved, parent_data);
            }
            fallback.get_or_insert(candidate);
        }
        match fallback {
            Some(candidate) => self.bind(candidate, parent_data),
            None => Instance::null(),
        }
    }

    /// Name of the parent container holding this instance
    pub fn container_name(&self) -> Option<String> {
        let parent = self.parent();
        let (schema, parent_def) = parent.parts()?;
        schema
            .container_for_tag(parent_def, &self.data.tag_name())
            .map(|container| container.name().to_string())
    }

    fn container(&self, name: &str) -> Option<&SchemaContainer> {
        let (schema, def) = self.parts()?;
        schema.container(def, name)
    }

    fn container_data(&self, name: &str) -> Vec<NodeData> {
        match (self.parts(), self.container(name)) {
            (Some((schema, _)), Some(container)) => {
                let tag = schema.node(container.child()).tag_name();
                self.data.children(Some(tag))
            }
            _ => Vec::new(),
        }
    }

    pub fn children(&self, name: &str) -> Vec<Instance> {
        let (Some((schema, _)), Some(container)) = (self.parts(), self.container(name)) else {
            return Vec::new();
        };
        let child_def = container.child();
        self.container_data(name)
            .into_iter()
            .map(|data| self.bind(resolve_variant(schema, child_def, &data), data))
            .collect()
    }

    pub fn child_count(&self, name: &str) -> usize {
        self.container_data(name).len()
    }

    pub fn child(&self, name: &str, index: usize) -> Instance {
        self.children(name).into_iter().nth(index).unwrap_or_default()
    }

    pub fn child_index(&self, name: &str, child: &Instance) -> Option<usize> {
        self.container_data(name)
            .iter()
            .position(|data| *data == child.data)
    }

    pub fn first_child(&self, name: &str) -> Instance {
        self.child(name, 0)
    }

    pub fn last_child(&self, name: &str) -> Instance {
        self.children(name).pop().unwrap_or_default()
    }

    /// Next instance in the same container of the same parent
    pub fn next_sibling(&self) -> Instance {
        self.sibling_at(1)
    }

    pub fn previous_sibling(&self) -> Instance {
        self.sibling_at(-1)
    }

    fn sibling_at(&self, offset: isize) -> Instance {
        let parent = self.parent();
        let Some(name) = self.container_name() else {
            return Instance::null();
        };
        let siblings = parent.children(&name);
        siblings
            .iter()
            .position(|sibling| sibling.data == self.data)
            .and_then(|position| position.checked_add_signed(offset))
            .and_then(|position| siblings.get(position).cloned())
            .unwrap_or_default()
    }

    /// Siblings in the same container, excluding `self`
    pub fn siblings(&self) -> Vec<Instance> {
        let parent = self.parent();
        let Some(name) = self.container_name() else {
            return Vec::new();
        };
        parent
            .children(&name)
            .into_iter()
            .filter(|sibling| sibling.data != self.data)
            .collect()
    }

    /// True if `self` lies in the subtree of `other` (or is `other`)
    pub fn is_within(&self, other: &Instance) -> bool {
        let mut current = self.data.clone();
        while !current.is_null() {
            if current == other.data {
                return true;
            }
            current = current.parent();
        }
        false
    }

    // ************* Mutation *************

    fn same_schema(&self, other: &Instance) -> bool {
        match (&self.schema, &other.schema) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Run a structural edit, wrapped in notifications when bound to a model
    fn edit<T: Default>(
        &self,
        before: impl FnOnce() -> Option<Notification>,
        op: impl FnOnce() -> T,
        after: impl FnOnce(&T) -> Option<Notification>,
    ) -> T {
        match self.tree_model() {
            Some(model) => model.structural_edit(before(), op, after).unwrap_or_default(),
            None => op(),
        }
    }

    pub fn can_insert_child(&self, name: &str, index: usize) -> bool {
        match self.container(name) {
            Some(container) => self.can_insert_child_variant(name, index, container.child()),
            None => false,
        }
    }

    /// Insert a new child of the container's node type at `index`
    pub fn insert_child(&self, name: &str, index: usize) -> Instance {
        match self.container(name) {
            Some(container) => self.insert_child_variant(name, index, container.child()),
            None => Instance::null(),
        }
    }

    pub fn can_insert_child_variant(&self, name: &str, index: usize, def: NodeDefId) -> bool {
        let (Some((schema, _)), Some(container)) = (self.parts(), self.container(name)) else {
            return false;
        };
        if !schema.contains(def) || !schema.is_same_or_derived(def, container.child()) {
            return false;
        }
        let count = self.child_count(name);
        index <= count && count < container.max_count()
    }

    /// Insert a new child of type `def`, derived from the container's node type
    pub fn insert_child_variant(&self, name: &str, index: usize, def: NodeDefId) -> Instance {
        if !self.can_insert_child_variant(name, index, def) {
            return Instance::null();
        }
        self.edit(
            || None,
            || self.insert_unchecked(name, index, def),
            |child| {
                child
                    .path()
                    .map(|path| Notification::NodeInsertAfter { path })
            },
        )
    }

    fn insert_unchecked(&self, name: &str, index: usize, def: NodeDefId) -> Instance {
        let Some((schema, _)) = self.parts() else {
            return Instance::null();
        };
        let after = self.after_position(name, index, None);
        let data = self.data.insert_child_after(schema.node(def).tag_name(), &after);
        if data.is_null() {
            return Instance::null();
        }
        let child = self.bind(def, data);
        if let Some(slot) = schema.derived_id_value(def) {
            child.entry(slot.name()).write(schema.node(def).derived_id());
        }
        log::debug!("Inserted '{}' at {}[{}]", schema.node(def).name(), name, index);
        child
    }

    /// Element to insert after so the new element ends up at `index` in the
    /// container, ignoring `skip`
    fn after_position(&self, name: &str, index: usize, skip: Option<&NodeData>) -> NodeData {
        if index == 0 {
            return NodeData::null();
        }
        self.container_data(name)
            .into_iter()
            .filter(|data| Some(data) != skip)
            .nth(index - 1)
            .unwrap_or_default()
    }

    pub fn can_clone_child(&self, name: &str, index: usize, source: &Instance) -> bool {
        let (Some((schema, _)), Some(container)) = (self.parts(), self.container(name)) else {
            return false;
        };
        let Some(source_def) = source.def else {
            return false;
        };
        if source.is_null() || !self.same_schema(source) || !self.data.same_backend(&source.data) {
            return false;
        }
        if !schema.is_same_or_derived(source_def, container.child()) {
            return false;
        }
        let count = self.child_count(name);
        index <= count && count < container.max_count()
    }

    /// Deep copy `source` into the container at `index`
    pub fn clone_child(&self, name: &str, index: usize, source: &Instance) -> Instance {
        if !self.can_clone_child(name, index, source) {
            return Instance::null();
        }
        self.edit(
            || None,
            || {
                let after = self.after_position(name, index, None);
                let data = self.data.deep_copy_after(&source.data, &after);
                match (self.parts(), self.container(name)) {
                    (Some((schema, _)), Some(container)) if !data.is_null() => {
                        self.bind(resolve_variant(schema, container.child(), &data), data)
                    }
                    _ => Instance::null(),
                }
            },
            |copy| {
                Some(Notification::NodeCloneAfter {
                    source: source.path()?,
                    target: copy.path()?,
                })
            },
        )
    }

    pub fn can_move_child(&self, name: &str, index: usize, source: &Instance) -> bool {
        let (Some((schema, _)), Some(container)) = (self.parts(), self.container(name)) else {
            return false;
        };
        let Some(source_def) = source.def else {
            return false;
        };
        if source.is_null() || !self.same_schema(source) || !self.data.same_backend(&source.data) {
            return false;
        }
        if !schema.is_same_or_derived(source_def, container.child()) || self.is_within(source) {
            return false;
        }
        let old_parent = source.parent();
        let Some(old_name) = source.container_name() else {
            return false;
        };
        let count = self.child_count(name);
        if old_parent.data == self.data && old_name == name {
            return index < count;
        }
        let old_container_ok = old_parent
            .container(&old_name)
            .map(|old| old_parent.child_count(&old_name) > old.min_count())
            .unwrap_or(false);
        old_container_ok && index <= count && count < container.max_count()
    }

    /// Move `source` so it ends up at `index` in the container
    pub fn move_child(&self, name: &str, index: usize, source: &Instance) -> Instance {
        if !self.can_move_child(name, index, source) {
            return Instance::null();
        }
        let old_path = source.path();
        self.edit(
            || {
                old_path
                    .clone()
                    .map(|source| Notification::NodeMoveBefore { source })
            },
            || {
                let after = self.after_position(name, index, Some(&source.data));
                if self.data.move_child_after(&source.data, &after) {
                    source.clone()
                } else {
                    Instance::null()
                }
            },
            |moved| {
                Some(Notification::NodeMoveAfter {
                    source: old_path.clone()?,
                    target: moved.path()?,
                })
            },
        )
    }

    pub fn can_remove_child(&self, name: &str, index: usize) -> bool {
        match self.container(name) {
            Some(container) => {
                let count = self.child_count(name);
                index < count && count > container.min_count()
            }
            None => false,
        }
    }

    pub fn remove_child(&self, name: &str, index: usize) -> bool {
        if !self.can_remove_child(name, index) {
            return false;
        }
        let child = self.child(name, index);
        let path = child.path();
        let removed = self.edit(
            || path.clone().map(|path| Notification::NodeRemoveBefore { path }),
            || self.data.remove_child(&child.data),
            |removed| {
                if *removed {
                    path.clone().map(|path| Notification::NodeRemoveAfter { path })
                } else {
                    None
                }
            },
        );
        if removed {
            if let Some(model) = self.tree_model() {
                model.repair_current(self);
            }
        }
        removed
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        match (self.is_null(), other.is_null()) {
            (true, true) => true,
            (false, false) => self.same_schema(other) && self.def == other.def && self.data == other.data,
            _ => false,
        }
    }
}

impl Eq for Instance {}

impl Hash for Instance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        if self.is_null() {
            0u8.hash(state);
        } else {
            self.def.hash(state);
            self.data.hash(state);
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("Instance(null)");
        }
        write!(f, "Instance({}, {:?})", self.name(), self.data)
    }
}
