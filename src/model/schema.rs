use serde::{Deserialize, Serialize};

use crate::model::{
    generate_id, Cardinality, Id, LeafQuery, TriState, Value, ValueKind,
};

/// Stable handle of a node definition inside its [`Schema`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeDefId(pub(crate) usize);

impl NodeDefId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Where a value slot lives on the backend node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueStorage {
    #[default]
    Attribute,
    Text,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValueSettings {
    #[serde(default)]
    pub unique: TriState,
    #[serde(default)]
    pub required: TriState,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,
    #[serde(default)]
    pub options_only: bool,
}

/// Option list of a value slot: static values and/or a query into the tree
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValueOptions {
    pub values: Vec<Value>,
    pub query: Option<LeafQuery>,
}

impl ValueOptions {
    pub fn is_used(&self) -> bool {
        !self.values.is_empty() || self.query.is_some()
    }

    pub fn has_query(&self) -> bool {
        self.query.is_some()
    }
}

/// Definition of one scalar slot on a node type
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaValue {
    pub(crate) name: String,
    pub(crate) display_name: String,
    pub(crate) kind: ValueKind,
    pub(crate) default: Option<Value>,
    pub(crate) settings: ValueSettings,
    pub(crate) options: ValueOptions,
    pub(crate) storage: ValueStorage,
    pub(crate) tooltip: String,
}

impl SchemaValue {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            kind,
            default: None,
            settings: ValueSettings::default(),
            options: ValueOptions::default(),
            storage: ValueStorage::Attribute,
            tooltip: String::new(),
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_settings(mut self, settings: ValueSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.settings.unique = TriState::from_bool(unique);
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.settings.required = TriState::from_bool(required);
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.settings.unit = unit.into();
        self
    }

    pub fn options_only(mut self, options_only: bool) -> Self {
        self.settings.options_only = options_only;
        self
    }

    pub fn with_static_options(mut self, values: Vec<Value>) -> Self {
        self.options.values = values;
        self
    }

    pub fn with_options_query(mut self, query: LeafQuery) -> Self {
        self.options.query = Some(query);
        self
    }

    pub fn with_storage(mut self, storage: ValueStorage) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = tooltip.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn settings(&self) -> &ValueSettings {
        &self.settings
    }

    pub fn options(&self) -> &ValueOptions {
        &self.options
    }

    pub fn storage(&self) -> ValueStorage {
        self.storage
    }

    pub fn tooltip(&self) -> &str {
        &self.tooltip
    }
}

/// Containment rule: which node type may appear under a host and how often
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaContainer {
    pub(crate) name: String,
    pub(crate) host: NodeDefId,
    pub(crate) child: NodeDefId,
    pub(crate) cardinality: Cardinality,
}

impl SchemaContainer {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node definition that declared this container
    pub fn host(&self) -> NodeDefId {
        self.host
    }

    pub fn child(&self) -> NodeDefId {
        self.child
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn min_count(&self) -> usize {
        self.cardinality.min
    }

    pub fn max_count(&self) -> usize {
        self.cardinality.max
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub(crate) id: NodeDefId,
    pub(crate) name: String,
    pub(crate) display_name: String,
    pub(crate) tag_name: String,
    /// Identity of this node type inside its derivation chain
    pub(crate) derived_id: Value,
    pub(crate) values: Vec<SchemaValue>,
    pub(crate) containers: Vec<SchemaContainer>,
    pub(crate) base: Option<NodeDefId>,
    pub(crate) derived: Vec<NodeDefId>,
    pub(crate) key_index: Option<usize>,
    pub(crate) derived_id_index: Option<usize>,
}

impl SchemaNode {
    pub(crate) fn new(id: NodeDefId, name: &str, derived_id: Value) -> Self {
        Self {
            id,
            name: name.to_string(),
            display_name: name.to_string(),
            tag_name: name.to_string(),
            derived_id,
            values: Vec::new(),
            containers: Vec::new(),
            base: None,
            derived: Vec::new(),
            key_index: None,
            derived_id_index: None,
        }
    }

    pub fn id(&self) -> NodeDefId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    pub fn derived_id(&self) -> &Value {
        &self.derived_id
    }

    /// Values declared on this node only (inherited ones excluded)
    pub fn own_values(&self) -> &[SchemaValue] {
        &self.values
    }

    /// Containers declared on this node only (inherited ones excluded)
    pub fn own_containers(&self) -> &[SchemaContainer] {
        &self.containers
    }

    pub fn base(&self) -> Option<NodeDefId> {
        self.base
    }

    pub fn has_base(&self) -> bool {
        self.base.is_some()
    }

    pub fn derived(&self) -> &[NodeDefId] {
        &self.derived
    }

    pub fn key_value_index(&self) -> Option<usize> {
        self.key_index
    }

    pub fn derived_id_value_index(&self) -> Option<usize> {
        self.derived_id_index
    }

    /// The slot that selects the concrete derived type. It is the derived-id
    /// slot of the chain.
    pub fn variant_value_index(&self) -> Option<usize> {
        self.derived_id_index
    }
}

/// Effective (inherited + own) slot order of one node, as (owner, local index)
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SlotLayout {
    pub(crate) values: Vec<(NodeDefId, usize)>,
    pub(crate) containers: Vec<(NodeDefId, usize)>,
}

/// Arena of node definitions addressed by [`NodeDefId`]. A derived node
/// sees the values and containers of its base chain before its own; that
/// layout is cached per node and refreshed by the builder.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub id: Id,
    pub description: Option<String>,
    pub(crate) nodes: Vec<SchemaNode>,
    pub(crate) layouts: Vec<SlotLayout>,
    pub(crate) root: Option<NodeDefId>,
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

impl Schema {
    pub fn new() -> Self {
        Self {
            id: generate_id(),
            description: None,
            nodes: Vec::new(),
            layouts: Vec::new(),
            root: None,
        }
    }

    pub fn root(&self) -> Option<NodeDefId> {
        self.root
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeDefId> + '_ {
        self.nodes.iter().map(|node| node.id)
    }

    pub fn contains(&self, id: NodeDefId) -> bool {
        id.0 < self.nodes.len()
    }

    pub fn get_node(&self, id: NodeDefId) -> Option<&SchemaNode> {
        self.nodes.get(id.0)
    }

    /// Panics on a handle from another schema
    pub fn node(&self, id: NodeDefId) -> &SchemaNode {
        assert!(self.contains(id), "node definition {:?} does not belong to this schema", id);
        &self.nodes[id.0]
    }

    /// Find a node definition by name
    pub fn find(&self, name: &str) -> Option<NodeDefId> {
        self.nodes.iter().find(|node| node.name == name).map(|node| node.id)
    }

    // ************* Derivation *************

    /// `id` followed by its bases up to the chain root
    pub fn ancestors(&self, id: NodeDefId) -> Vec<NodeDefId> {
        let mut chain = vec![id];
        let mut current = self.node(id).base;
        while let Some(base) = current {
            chain.push(base);
            current = self.node(base).base;
        }
        chain
    }

    pub fn chain_root(&self, id: NodeDefId) -> NodeDefId {
        *self.ancestors(id).last().unwrap_or(&id)
    }

    /// `id` followed by every node derived from it, depth first
    pub fn descendants(&self, id: NodeDefId) -> Vec<NodeDefId> {
        let mut result = vec![id];
        let mut index = 0;
        while index < result.len() {
            let current = result[index];
            result.extend(self.node(current).derived.iter().copied());
            index += 1;
        }
        result
    }

    /// Every node of the derivation chain `id` belongs to
    pub fn derivation_chain(&self, id: NodeDefId) -> Vec<NodeDefId> {
        self.descendants(self.chain_root(id))
    }

    /// True if `id` is `base` or derives from it
    pub fn is_same_or_derived(&self, id: NodeDefId, base: NodeDefId) -> bool {
        self.ancestors(id).contains(&base)
    }

    /// True if `name` names `id` or one of its bases
    pub fn answers_to(&self, id: NodeDefId, name: &str) -> bool {
        self.ancestors(id)
            .into_iter()
            .any(|ancestor| self.node(ancestor).name == name)
    }

    /// Derived ids of `id` and every node derived from it
    pub fn derived_id_list_all(&self, id: NodeDefId) -> Vec<Value> {
        self.descendants(id)
            .into_iter()
            .map(|node| self.node(node).derived_id.clone())
            .collect()
    }

    /// Find the node in the chain below `id` whose derived id equals `value`
    pub fn find_derived(&self, id: NodeDefId, value: &Value) -> Option<NodeDefId> {
        self.descendants(id)
            .into_iter()
            .find(|node| &self.node(*node).derived_id == value)
    }

    // ************* Values *************

    pub fn value_count(&self, id: NodeDefId) -> usize {
        self.layouts[id.0].values.len()
    }

    pub fn value_at(&self, id: NodeDefId, index: usize) -> Option<&SchemaValue> {
        let (owner, local) = *self.layouts.get(id.0)?.values.get(index)?;
        self.nodes[owner.0].values.get(local)
    }

    pub fn values(&self, id: NodeDefId) -> impl Iterator<Item = &SchemaValue> + '_ {
        self.layouts[id.0]
            .values
            .iter()
            .map(move |(owner, local)| &self.nodes[owner.0].values[*local])
    }

    pub fn value_index(&self, id: NodeDefId, name: &str) -> Option<usize> {
        self.values(id).position(|value| value.name == name)
    }

    pub fn value(&self, id: NodeDefId, name: &str) -> Option<&SchemaValue> {
        self.values(id).find(|value| value.name == name)
    }

    pub fn value_names(&self, id: NodeDefId) -> Vec<String> {
        self.values(id).map(|value| value.name.clone()).collect()
    }

    pub fn key_value(&self, id: NodeDefId) -> Option<&SchemaValue> {
        self.value_at(id, self.node(id).key_index?)
    }

    pub fn derived_id_value(&self, id: NodeDefId) -> Option<&SchemaValue> {
        self.value_at(id, self.node(id).derived_id_index?)
    }

    // ************* Containers *************

    pub fn container_count(&self, id: NodeDefId) -> usize {
        self.layouts[id.0].containers.len()
    }

    pub fn containers(&self, id: NodeDefId) -> impl Iterator<Item = &SchemaContainer> + '_ {
        self.layouts[id.0]
            .containers
            .iter()
            .map(move |(owner, local)| &self.nodes[owner.0].containers[*local])
    }

    pub fn container(&self, id: NodeDefId, name: &str) -> Option<&SchemaContainer> {
        self.containers(id).find(|container| container.name == name)
    }

    /// The container of `host` that admits nodes of type `child`
    pub fn container_for_child(&self, host: NodeDefId, child: NodeDefId) -> Option<&SchemaContainer> {
        self.containers(host)
            .find(|container| self.is_same_or_derived(child, container.child))
    }

    /// Container of `host` holding elements with backend tag `tag`
    pub fn container_for_tag(&self, host: NodeDefId, tag: &str) -> Option<&SchemaContainer> {
        self.containers(host)
            .find(|container| self.node(container.child).tag_name == tag)
    }

    /// Node definitions with a container that admits `child`
    pub fn parent_defs(&self, child: NodeDefId) -> Vec<NodeDefId> {
        self.node_ids()
            .filter(|host| self.container_for_child(*host, child).is_some())
            .collect()
    }

    pub fn child_names(&self, id: NodeDefId) -> Vec<String> {
        self.containers(id).map(|container| container.name.clone()).collect()
    }

    // ************* Layout cache *************

    /// Recompute the effective layout of `id` and everything derived from it
    pub(crate) fn refresh_layouts(&mut self, id: NodeDefId) {
        for node in self.descendants(id) {
            let mut layout = SlotLayout::default();
            let mut chain = self.ancestors(node);
            chain.reverse();
            for owner in chain {
                let owner_node = &self.nodes[owner.0];
                layout
                    .values
                    .extend((0..owner_node.values.len()).map(|local| (owner, local)));
                layout
                    .containers
                    .extend((0..owner_node.containers.len()).map(|local| (owner, local)));
            }
            self.layouts[node.0] = layout;
        }
    }

    pub(crate) fn push_node(&mut self, node: SchemaNode) -> NodeDefId {
        let id = node.id;
        self.nodes.push(node);
        self.layouts.push(SlotLayout::default());
        self.refresh_layouts(id);
        id
    }

    pub(crate) fn node_mut(&mut self, id: NodeDefId) -> &mut SchemaNode {
        &mut self.nodes[id.0]
    }

    pub(crate) fn next_id(&self) -> NodeDefId {
        NodeDefId(self.nodes.len())
    }
}
