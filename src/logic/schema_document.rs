use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::logic::SchemaBuilder;
use crate::model::{
    Cardinality, LeafQuery, NodeDefId, Schema, SchemaValue, Value, ValueKind, ValueSettings, ValueStorage,
};

/// JSON description of a schema. Loading records every rejected item as a
/// diagnostic and keeps going.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Name of the root node type; the first node when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    pub nodes: Vec<NodeDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    /// Discriminator of this type within its chain; defaults to the name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_id: Option<Value>,
    #[serde(default)]
    pub values: Vec<ValueDocument>,
    #[serde(default)]
    pub containers: Vec<ContainerDocument>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueRole {
    #[default]
    Plain,
    Key,
    DerivedId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueDocument {
    pub name: String,
    pub kind: ValueKind,
    #[serde(default)]
    pub role: ValueRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub settings: ValueSettings,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<Value>,
    /// Leaf query in the textual form, e.g. `P;C{Category};name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options_query: Option<String>,
    #[serde(default)]
    pub storage: ValueStorage,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tooltip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerDocument {
    pub child: String,
    #[serde(default)]
    pub min: usize,
    /// Unbounded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<usize>,
}

/// Result of loading a document: the schema plus what was left out of it
#[derive(Debug, Clone)]
pub struct LoadedSchema {
    pub schema: Arc<Schema>,
    pub diagnostics: Vec<SchemaError>,
}

impl LoadedSchema {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

impl SchemaDocument {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("Failed to parse schema document")
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize schema document")
    }

    /// Build the schema, collecting every rejected item as a diagnostic
    pub fn load(&self) -> LoadedSchema {
        let mut builder = SchemaBuilder::new();
        if let Some(description) = &self.description {
            builder = builder.with_description(description.clone());
        }
        let mut diagnostics = Vec::new();
        let ids = Self::load_nodes(&self.nodes, &mut builder, &mut diagnostics);

        for node in &self.nodes {
            let Some(&id) = ids.get(node.name.as_str()) else {
                continue;
            };
            let mut record = |result: Result<(), SchemaError>| {
                if let Err(error) = result {
                    diagnostics.push(error);
                }
            };
            if let Some(display_name) = &node.display_name {
                record(builder.set_display_name(id, display_name));
            }
            if let Some(tag_name) = &node.tag_name {
                record(builder.set_tag_name(id, tag_name));
            }
        }

        // Values before containers: container clashes are checked by tag
        for node in &self.nodes {
            let Some(&id) = ids.get(node.name.as_str()) else {
                continue;
            };
            for value in &node.values {
                if let Err(error) = Self::load_value(&mut builder, id, value, &mut diagnostics) {
                    diagnostics.push(error);
                }
            }
        }
        for node in &self.nodes {
            let Some(&id) = ids.get(node.name.as_str()) else {
                continue;
            };
            for container in &node.containers {
                let result = match ids.get(container.child.as_str()) {
                    Some(&child) => {
                        let cardinality = Cardinality::new(container.min, container.max.unwrap_or(usize::MAX));
                        builder.add_container(id, child, cardinality)
                    }
                    None => Err(SchemaError::UnknownNode(container.child.clone())),
                };
                if let Err(error) = result {
                    diagnostics.push(error);
                }
            }
        }

        if let Some(root) = &self.root {
            let result = match ids.get(root.as_str()) {
                Some(&id) => builder.set_root(id),
                None => Err(SchemaError::UnknownNode(root.clone())),
            };
            if let Err(error) = result {
                diagnostics.push(error);
            }
        }

        for diagnostic in &diagnostics {
            log::warn!("Schema document: {}", diagnostic);
        }
        LoadedSchema {
            schema: builder.build(),
            diagnostics,
        }
    }

    /// Build the schema, failing on the first diagnostic
    pub fn load_strict(&self) -> anyhow::Result<Arc<Schema>> {
        let loaded = self.load();
        match loaded.diagnostics.into_iter().next() {
            Some(error) => Err(anyhow!(error).context("Schema document is not consistent")),
            None => Ok(loaded.schema),
        }
    }

    /// Create nodes so that every base exists before the types derived from it
    fn load_nodes<'a>(
        nodes: &'a [NodeDocument],
        builder: &mut SchemaBuilder,
        diagnostics: &mut Vec<SchemaError>,
    ) -> HashMap<&'a str, NodeDefId> {
        let mut ids: HashMap<&str, NodeDefId> = HashMap::new();
        let mut waiting: Vec<&NodeDocument> = nodes.iter().collect();
        loop {
            let before = waiting.len();
            let mut next = Vec::new();
            for node in waiting {
                let result = match &node.base {
                    None => {
                        let derived_id = node.derived_id.clone().unwrap_or_else(|| Value::from(node.name.as_str()));
                        builder.add_node_with_derived_id(&node.name, derived_id)
                    }
                    Some(base) => match ids.get(base.as_str()) {
                        Some(&base_id) => {
                            let derived_id = node.derived_id.clone().unwrap_or_else(|| Value::from(node.name.as_str()));
                            builder.add_derived_node_with_id(base_id, &node.name, derived_id)
                        }
                        None => {
                            next.push(node);
                            continue;
                        }
                    },
                };
                match result {
                    Ok(id) => {
                        ids.insert(node.name.as_str(), id);
                    }
                    Err(error) => diagnostics.push(error),
                }
            }
            waiting = next;
            if waiting.is_empty() || waiting.len() == before {
                break;
            }
        }
        for node in waiting {
            let base = node.base.clone().unwrap_or_default();
            diagnostics.push(SchemaError::UnknownNode(base));
        }
        ids
    }

    fn load_value(
        builder: &mut SchemaBuilder,
        node: NodeDefId,
        document: &ValueDocument,
        diagnostics: &mut Vec<SchemaError>,
    ) -> Result<(), SchemaError> {
        let mut value = SchemaValue::new(document.name.as_str(), document.kind)
            .with_settings(document.settings.clone())
            .with_storage(document.storage)
            .with_tooltip(document.tooltip.as_str());
        if let Some(display_name) = &document.display_name {
            value = value.with_display_name(display_name.as_str());
        }
        if let Some(default) = &document.default {
            value = value.with_default(default.clone());
        }
        if !document.options.is_empty() {
            value = value.with_static_options(document.options.clone());
        }
        if let Some(text) = &document.options_query {
            match LeafQuery::parse(text) {
                Ok(query) => value = value.with_options_query(query),
                // The slot still loads, without its option source
                Err(source) => diagnostics.push(SchemaError::InvalidOptionsQuery {
                    value: document.name.clone(),
                    source,
                }),
            }
        }
        match document.role {
            ValueRole::Plain => builder.add_value(node, value),
            ValueRole::Key => builder.add_value_as_key(node, value),
            ValueRole::DerivedId => builder.add_value_as_derived_id(node, value),
        }
        .map(|_| ())
    }

    /// Describe an existing schema
    pub fn from_schema(schema: &Schema) -> Self {
        let nodes = schema
            .node_ids()
            .map(|id| {
                let node = schema.node(id);
                let values = node
                    .own_values()
                    .iter()
                    .map(|value| {
                        let index = schema.value_index(id, value.name());
                        let role = if node.has_base() {
                            ValueRole::Plain
                        } else if index.is_some() && index == node.key_value_index() {
                            ValueRole::Key
                        } else if index.is_some() && index == node.derived_id_value_index() {
                            ValueRole::DerivedId
                        } else {
                            ValueRole::Plain
                        };
                        let options = match role {
                            // Recomputed by the builder from the chain
                            ValueRole::DerivedId => Vec::new(),
                            _ => value.options().values.clone(),
                        };
                        ValueDocument {
                            name: value.name().to_string(),
                            kind: value.kind(),
                            role,
                            display_name: (value.display_name() != value.name())
                                .then(|| value.display_name().to_string()),
                            default: value.default_value().cloned(),
                            settings: value.settings().clone(),
                            options,
                            options_query: value.options().query.as_ref().map(ToString::to_string),
                            storage: value.storage(),
                            tooltip: value.tooltip().to_string(),
                        }
                    })
                    .collect();
                let containers = node
                    .own_containers()
                    .iter()
                    .map(|container| ContainerDocument {
                        child: schema.node(container.child()).name().to_string(),
                        min: container.min_count(),
                        max: (!container.cardinality().is_unbounded()).then(|| container.max_count()),
                    })
                    .collect();
                NodeDocument {
                    name: node.name().to_string(),
                    display_name: (node.display_name() != node.name()).then(|| node.display_name().to_string()),
                    tag_name: (node.tag_name() != node.name() && !node.has_base())
                        .then(|| node.tag_name().to_string()),
                    base: node.base().map(|base| schema.node(base).name().to_string()),
                    derived_id: Some(node.derived_id().clone()),
                    values,
                    containers,
                }
            })
            .collect();
        Self {
            description: schema.description.clone(),
            root: schema.root().map(|root| schema.node(root).name().to_string()),
            nodes,
        }
    }
}
