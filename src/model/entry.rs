use crate::model::{Instance, SchemaValue, Value, ValueStorage};
use crate::store::NodeData;

/// Stored text of `slot`, before conversion
pub(crate) fn raw_slot(slot: &SchemaValue, data: &NodeData) -> Option<String> {
    match slot.storage() {
        ValueStorage::Attribute => data.attribute(slot.name()),
        ValueStorage::Text => data.text().filter(|text| !text.is_empty()),
    }
}

/// Read the stored value of `slot` from `data` as the slot kind.
/// `None` when nothing is stored or the stored text does not parse.
pub(crate) fn read_slot(slot: &SchemaValue, data: &NodeData) -> Option<Value> {
    Value::from_storage_text(slot.kind(), &raw_slot(slot, data)?)
}

fn write_slot(slot: &SchemaValue, data: &NodeData, value: &Value) -> bool {
    if value.is_undefined() {
        return match slot.storage() {
            ValueStorage::Attribute => {
                data.remove_attribute(slot.name());
                !data.is_null()
            }
            ValueStorage::Text => data.set_text(""),
        };
    }
    let Some(text) = value
        .convert_to(slot.kind(), None)
        .and_then(|converted| converted.to_storage_text())
    else {
        return false;
    };
    match slot.storage() {
        ValueStorage::Attribute => data.set_attribute(slot.name(), &text),
        ValueStorage::Text => data.set_text(&text),
    }
}

/// Handle to one value slot of one instance
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    instance: Instance,
    name: String,
    index: Option<usize>,
}

impl Entry {
    pub(crate) fn new(instance: Instance, name: &str, index: Option<usize>) -> Self {
        Self {
            instance,
            name: name.to_string(),
            index,
        }
    }

    pub fn is_null(&self) -> bool {
        self.index.is_none() || self.instance.is_null()
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn value_def(&self) -> Option<&SchemaValue> {
        let schema = self.instance.schema()?;
        schema.value_at(self.instance.def()?, self.index?)
    }

    pub fn is_key(&self) -> bool {
        self.index.is_some()
            && self.instance.node_def().and_then(|node| node.key_value_index()) == self.index
    }

    pub fn is_derived_id(&self) -> bool {
        self.index.is_some()
            && self.instance.node_def().and_then(|node| node.derived_id_value_index()) == self.index
    }

    pub fn has_value(&self) -> bool {
        self.stored_value().is_some()
    }

    /// Stored text, also when it does not convert to the slot kind
    pub fn raw_value(&self) -> Option<String> {
        raw_slot(self.value_def()?, self.instance.data())
    }

    /// Value stored on the backend, without default
    pub fn stored_value(&self) -> Option<Value> {
        let slot = self.value_def()?;
        read_slot(slot, self.instance.data())
    }

    pub fn default_value(&self) -> Value {
        self.value_def()
            .and_then(|slot| {
                slot.default_value()
                    .and_then(|default| default.convert_to(slot.kind(), None))
            })
            .unwrap_or_default()
    }

    /// Stored value, or the slot default when nothing is stored.
    ///
    /// Panics when the entry is null; check [`Entry::is_null`] first.
    pub fn value(&self) -> Value {
        assert!(!self.is_null(), "reading value '{}' through a null entry", self.name);
        self.stored_value().unwrap_or_else(|| self.default_value())
    }

    /// Static options followed by the values reached by the options query
    pub fn options(&self) -> Vec<Value> {
        let Some(slot) = self.value_def() else {
            return Vec::new();
        };
        let mut options: Vec<Value> = Vec::new();
        let queried = slot
            .options()
            .query
            .as_ref()
            .map(|query| query.values(&self.instance))
            .unwrap_or_default();
        for option in slot.options().values.iter().cloned().chain(queried) {
            if option.is_undefined() || options.contains(&option) {
                continue;
            }
            options.push(option);
        }
        options
    }

    pub fn has_options(&self) -> bool {
        self.value_def()
            .map(|slot| slot.options().is_used())
            .unwrap_or(false)
    }

    pub fn can_set_value(&self, value: &Value) -> bool {
        let Some(slot) = self.value_def() else {
            return false;
        };
        if self.instance.is_null() {
            return false;
        }
        if value.is_undefined() {
            return !slot.settings().required.is_true();
        }
        let Some(converted) = value.convert_to(slot.kind(), None) else {
            return false;
        };
        if slot.settings().options_only {
            let options = self.options();
            if !options.is_empty() && !options.contains(&converted) {
                return false;
            }
        }
        true
    }

    /// Write a value. Bound instances notify their model; while the model is
    /// dispatching, the write is queued and still reported as accepted.
    pub fn set_value(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        if !self.can_set_value(&value) {
            return false;
        }
        match self.instance.tree_model() {
            Some(model) => model.value_edit(self, value),
            None => self.write(&value),
        }
    }

    /// Raw backend write without notifications
    pub(crate) fn write(&self, value: &Value) -> bool {
        match self.value_def() {
            Some(slot) => write_slot(slot, self.instance.data(), value),
            None => false,
        }
    }

    /// True if writing `value` would leave the stored value unchanged
    pub(crate) fn holds(&self, value: &Value) -> bool {
        let Some(slot) = self.value_def() else {
            return false;
        };
        match (self.stored_value(), value.convert_to(slot.kind(), None)) {
            (Some(stored), Some(converted)) => stored == converted,
            (None, _) => value.is_undefined(),
            _ => false,
        }
    }
}
