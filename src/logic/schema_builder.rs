use std::collections::HashSet;
use std::sync::Arc;

use crate::error::SchemaError;
use crate::model::{
    Cardinality, NodeDefId, Schema, SchemaContainer, SchemaNode, SchemaValue, TriState, Value,
};

const RESERVED_NAME_CHARS: &[char] = &[';', '{', '}', '[', ']', '/'];

fn validate_name(name: &str) -> Result<(), SchemaError> {
    let invalid = |reason: &str| SchemaError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(invalid("name contains whitespace"));
    }
    if name.contains(RESERVED_NAME_CHARS) {
        return Err(invalid("name contains one of ; { } [ ] /"));
    }
    Ok(())
}

/// Element-name rules of the backend documents
pub fn is_valid_tag_name(tag: &str) -> bool {
    let mut chars = tag.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_alphabetic() || first == '_') {
        return false;
    }
    if tag.get(..3).is_some_and(|prefix| prefix.eq_ignore_ascii_case("xml")) {
        return false;
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Rejected calls leave the schema unchanged
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.schema.description = Some(description.into());
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn build(self) -> Arc<Schema> {
        Arc::new(self.schema)
    }

    fn check_node(&self, id: NodeDefId) -> Result<&SchemaNode, SchemaError> {
        self.schema
            .get_node(id)
            .ok_or_else(|| SchemaError::UnknownNode(format!("#{}", id.index())))
    }

    fn node_name(&self, id: NodeDefId) -> String {
        self.schema.node(id).name().to_string()
    }

    // ************* Nodes *************

    /// Add a node type whose derived id is its name
    pub fn add_node(&mut self, name: &str) -> Result<NodeDefId, SchemaError> {
        self.add_node_with_derived_id(name, Value::from(name))
    }

    pub fn add_node_with_derived_id(&mut self, name: &str, derived_id: Value) -> Result<NodeDefId, SchemaError> {
        validate_name(name)?;
        if self.schema.find(name).is_some() {
            return Err(SchemaError::DuplicateNode(name.to_string()));
        }
        if !is_valid_tag_name(name) {
            return Err(SchemaError::InvalidTagName(name.to_string()));
        }
        let id = self.schema.next_id();
        self.schema.push_node(SchemaNode::new(id, name, derived_id));
        if self.schema.root.is_none() {
            self.schema.root = Some(id);
        }
        log::debug!("Added node definition '{}'", name);
        Ok(id)
    }

    /// Add a node type derived from `base`, identified by its name
    pub fn add_derived_node(&mut self, base: NodeDefId, name: &str) -> Result<NodeDefId, SchemaError> {
        self.add_derived_node_with_id(base, name, Value::from(name))
    }

    pub fn add_derived_node_with_id(
        &mut self,
        base: NodeDefId,
        name: &str,
        derived_id: Value,
    ) -> Result<NodeDefId, SchemaError> {
        self.check_node(base)?;
        validate_name(name)?;
        if self.schema.find(name).is_some() {
            return Err(SchemaError::DuplicateNode(name.to_string()));
        }
        let root = self.schema.chain_root(base);
        let expected = self.schema.node(root).derived_id().kind();
        if derived_id.kind() != expected {
            return Err(SchemaError::DerivedIdKindMismatch {
                node: name.to_string(),
                expected,
                actual: derived_id.kind(),
            });
        }
        if self.schema.derived_id_list_all(root).contains(&derived_id) {
            return Err(SchemaError::DuplicateDerivedId {
                node: self.node_name(root),
                derived_id: derived_id.to_string(),
            });
        }

        let base_node = self.schema.node(base);
        let id = self.schema.next_id();
        let mut node = SchemaNode::new(id, name, derived_id.clone());
        node.tag_name = base_node.tag_name().to_string();
        node.base = Some(base);
        node.key_index = base_node.key_value_index();
        node.derived_id_index = base_node.derived_id_value_index();
        self.schema.push_node(node);
        self.schema.node_mut(base).derived.push(id);

        // The derived-id slot lists every identity of the chain
        if let Some(index) = self.schema.node(root).derived_id_value_index() {
            let (owner, local) = self.schema.layouts[root.index()].values[index];
            self.schema.node_mut(owner).values[local]
                .options
                .values
                .push(derived_id);
        }
        log::debug!("Added node definition '{}' derived from '{}'", name, self.node_name(base));
        Ok(id)
    }

    pub fn set_display_name(&mut self, node: NodeDefId, display_name: &str) -> Result<(), SchemaError> {
        self.check_node(node)?;
        self.schema.node_mut(node).display_name = display_name.to_string();
        Ok(())
    }

    /// Set the backend tag of the whole derivation chain `node` belongs to
    pub fn set_tag_name(&mut self, node: NodeDefId, tag: &str) -> Result<(), SchemaError> {
        self.check_node(node)?;
        if !is_valid_tag_name(tag) {
            return Err(SchemaError::InvalidTagName(tag.to_string()));
        }
        for member in self.schema.derivation_chain(node) {
            self.schema.node_mut(member).tag_name = tag.to_string();
        }
        Ok(())
    }

    pub fn set_root(&mut self, node: NodeDefId) -> Result<(), SchemaError> {
        self.check_node(node)?;
        self.schema.root = Some(node);
        Ok(())
    }

    // ************* Values *************

    /// Value names visible anywhere in the derivation chain through `node`
    fn chain_value_names(&self, node: NodeDefId) -> HashSet<String> {
        let mut names: HashSet<String> = self.schema.value_names(node).into_iter().collect();
        for derived in self.schema.descendants(node) {
            names.extend(
                self.schema
                    .node(derived)
                    .own_values()
                    .iter()
                    .map(|value| value.name().to_string()),
            );
        }
        names
    }

    fn validate_value(&self, node: NodeDefId, value: &SchemaValue) -> Result<(), SchemaError> {
        self.check_node(node)?;
        validate_name(value.name())?;
        if self.chain_value_names(node).contains(value.name()) {
            return Err(SchemaError::DuplicateValue {
                node: self.node_name(node),
                value: value.name().to_string(),
            });
        }
        if let Some(default) = value.default_value() {
            if !default.is_undefined() && !default.can_convert_to(value.kind(), None) {
                return Err(SchemaError::InvalidDefault {
                    value: value.name().to_string(),
                    kind: value.kind(),
                });
            }
        }
        Ok(())
    }

    fn push_value(&mut self, node: NodeDefId, value: SchemaValue) -> usize {
        log::debug!("Added value '{}' to '{}'", value.name(), self.node_name(node));
        self.schema.node_mut(node).values.push(value);
        self.schema.refresh_layouts(node);
        self.schema.value_count(node) - 1
    }

    /// Add a value slot; returns its index in the effective layout of `node`
    pub fn add_value(&mut self, node: NodeDefId, value: SchemaValue) -> Result<usize, SchemaError> {
        self.validate_value(node, &value)?;
        Ok(self.push_value(node, value))
    }

    /// Add the key slot of a chain root. Unique and required default to true.
    pub fn add_value_as_key(&mut self, node: NodeDefId, mut value: SchemaValue) -> Result<usize, SchemaError> {
        let node_def = self.check_node(node)?;
        if node_def.has_base() {
            return Err(SchemaError::KeyOnDerivedNode(self.node_name(node)));
        }
        if node_def.key_value_index().is_some() {
            return Err(SchemaError::KeyAlreadyDefined(self.node_name(node)));
        }
        self.validate_value(node, &value)?;

        if !value.settings.unique.is_set() {
            value.settings.unique = TriState::True;
        }
        if !value.settings.required.is_set() {
            value.settings.required = TriState::True;
        }
        let index = self.push_value(node, value);
        for member in self.schema.descendants(node) {
            self.schema.node_mut(member).key_index = Some(index);
        }
        Ok(index)
    }

    /// Add the derived-id slot of a chain root. Its options are every derived
    /// id of the chain and its default is the root's own derived id.
    pub fn add_value_as_derived_id(&mut self, node: NodeDefId, mut value: SchemaValue) -> Result<usize, SchemaError> {
        let node_def = self.check_node(node)?;
        if node_def.has_base() {
            return Err(SchemaError::DerivedIdOnDerivedNode(self.node_name(node)));
        }
        if node_def.derived_id_value_index().is_some() {
            return Err(SchemaError::DerivedIdAlreadyDefined(self.node_name(node)));
        }
        let expected = node_def.derived_id().kind();
        if value.kind() != expected {
            return Err(SchemaError::DerivedIdKindMismatch {
                node: self.node_name(node),
                expected,
                actual: value.kind(),
            });
        }
        self.validate_value(node, &value)?;

        value.options.values = self.schema.derived_id_list_all(node);
        value.settings.options_only = true;
        if value.default.is_none() {
            value.default = Some(self.schema.node(node).derived_id().clone());
        }
        let index = self.push_value(node, value);
        for member in self.schema.descendants(node) {
            self.schema.node_mut(member).derived_id_index = Some(index);
        }
        Ok(index)
    }

    // ************* Containers *************

    pub fn add_container(
        &mut self,
        node: NodeDefId,
        child: NodeDefId,
        cardinality: Cardinality,
    ) -> Result<(), SchemaError> {
        self.check_node(node)?;
        self.check_node(child)?;
        let name = self.node_name(child);
        if !cardinality.is_valid() {
            return Err(SchemaError::InvalidCardinality {
                node: self.node_name(node),
                container: name,
                min: cardinality.min,
                max: cardinality.max,
            });
        }

        let child_tag = self.schema.node(child).tag_name().to_string();
        let mut existing: Vec<&SchemaContainer> = self.schema.containers(node).collect();
        for derived in self.schema.descendants(node) {
            existing.extend(self.schema.node(derived).own_containers());
        }
        let clash = existing.iter().any(|container| {
            container.name() == name || self.schema.node(container.child()).tag_name() == child_tag
        });
        if clash {
            return Err(SchemaError::DuplicateContainer {
                node: self.node_name(node),
                container: name,
            });
        }

        log::debug!("Added container '{}' to '{}'", name, self.node_name(node));
        self.schema.node_mut(node).containers.push(SchemaContainer {
            name,
            host: node,
            child,
            cardinality,
        });
        self.schema.refresh_layouts(node);
        Ok(())
    }
}
