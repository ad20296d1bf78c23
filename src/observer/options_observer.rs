use std::cmp::Ordering;
use std::sync::Arc;

use itertools::Itertools;
use parking_lot::Mutex;

use crate::logic::QueryBuilder;
use crate::model::{Instance, LeafQuery, NodeDefId, Notification, NotificationKind, PathAddress, Schema, Value};
use crate::observer::{ModelObserver, SubscriptionId, TreeModel};

const OBSERVED: &[NotificationKind] = &[
    NotificationKind::NodeInsertAfter,
    NotificationKind::NodeMoveBefore,
    NotificationKind::NodeMoveAfter,
    NotificationKind::NodeCloneAfter,
    NotificationKind::NodeRemoveBefore,
    NotificationKind::ValueChangeBefore,
    NotificationKind::ValueChangeAfter,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverState {
    Disconnected,
    Connected(SubscriptionId),
}

/// Keeps an option-bound value slot (e.g. `Item.categoryRef` with options
/// `P;C{Category};name`) in step with the source slot its options come from.
/// When a source value is renamed, dependents still holding the old value
/// are rewritten to the new one.
#[derive(Debug)]
pub struct OptionsObserver {
    dependent_def: NodeDefId,
    dependent_value: String,
    source_def: NodeDefId,
    source_value: String,
    /// From a source instance to the dependent slots, one per schema path
    inverses: Vec<LeafQuery>,
    state: Mutex<ObserverState>,
    /// Source value captured before a change
    snapshot: Mutex<Option<(PathAddress, Value)>>,
}

impl OptionsObserver {
    /// Observers for the option-bound slot `value_name` of `def`, one per
    /// source node type the options query can reach. Empty when the slot has
    /// no options query or the query does not resolve.
    pub fn for_slot(schema: &Schema, def: NodeDefId, value_name: &str) -> Vec<Self> {
        let Some(query) = schema
            .value(def, value_name)
            .and_then(|slot| slot.options().query.as_ref())
        else {
            return Vec::new();
        };
        QueryBuilder::create_inverses(&query.query, schema, def)
            .into_iter()
            .filter(|(source_def, _)| schema.value(*source_def, &query.value_name).is_some())
            .into_group_map()
            .into_iter()
            .sorted_by_key(|(source_def, _)| *source_def)
            .map(|(source_def, inverses)| {
                let inverses: Vec<LeafQuery> = inverses
                    .into_iter()
                    .unique()
                    .map(|inverse| inverse.leaf(value_name))
                    .collect();
                log::debug!(
                    "Options of {}.{} follow {}.{} through '{}'",
                    schema.node(def).name(),
                    value_name,
                    schema.node(source_def).name(),
                    query.value_name,
                    inverses.iter().join("', '")
                );
                Self {
                    dependent_def: def,
                    dependent_value: value_name.to_string(),
                    source_def,
                    source_value: query.value_name.clone(),
                    inverses,
                    state: Mutex::new(ObserverState::Disconnected),
                    snapshot: Mutex::new(None),
                }
            })
            .collect()
    }

    /// Observers for every value declaring an options query
    pub fn create_all(schema: &Schema) -> Vec<Arc<OptionsObserver>> {
        let mut observers = Vec::new();
        for def in schema.node_ids() {
            for slot in schema.node(def).own_values() {
                if !slot.options().has_query() {
                    continue;
                }
                let found = Self::for_slot(schema, def, slot.name());
                if found.is_empty() {
                    log::warn!(
                        "Options query of {}.{} does not resolve; values will not be kept in sync",
                        schema.node(def).name(),
                        slot.name()
                    );
                }
                observers.extend(found.into_iter().map(Arc::new));
            }
        }
        observers
    }

    pub fn state(&self) -> ObserverState {
        *self.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state(), ObserverState::Connected(_))
    }

    pub fn connect(self: &Arc<Self>, model: &TreeModel) {
        let mut state = self.state.lock();
        if let ObserverState::Disconnected = *state {
            let id = model.subscribe(OBSERVED, self.clone());
            *state = ObserverState::Connected(id);
        }
    }

    pub fn disconnect(&self, model: &TreeModel) {
        let mut state = self.state.lock();
        if let ObserverState::Connected(id) = *state {
            model.unsubscribe(id);
            *state = ObserverState::Disconnected;
        }
        self.snapshot.lock().take();
    }

    pub fn dependent_def(&self) -> NodeDefId {
        self.dependent_def
    }

    pub fn dependent_value(&self) -> &str {
        &self.dependent_value
    }

    pub fn source_def(&self) -> NodeDefId {
        self.source_def
    }

    pub fn source_value(&self) -> &str {
        &self.source_value
    }

    pub fn inverse_queries(&self) -> &[LeafQuery] {
        &self.inverses
    }

    /// The instance at `path` if it is a source slot this observer follows
    fn source_at(&self, model: &TreeModel, path: &PathAddress, value_name: &str) -> Option<Instance> {
        if value_name != self.source_value {
            return None;
        }
        let instance = model.instance_at(path);
        let schema = instance.schema()?;
        let def = instance.def()?;
        if instance.is_null() || !schema.is_same_or_derived(def, self.source_def) {
            return None;
        }
        Some(instance)
    }

    fn on_value_change_before(&self, model: &TreeModel, path: &PathAddress, value_name: &str) {
        let Some(source) = self.source_at(model, path, value_name) else {
            return;
        };
        let old = source.entry(value_name).value();
        *self.snapshot.lock() = Some((path.clone(), old));
    }

    fn on_value_change_after(&self, model: &TreeModel, path: &PathAddress, value_name: &str) {
        let Some(source) = self.source_at(model, path, value_name) else {
            return;
        };
        let old = match self.snapshot.lock().take() {
            Some((snapshot_path, old)) if snapshot_path == *path => old,
            _ => return,
        };
        let new = source.entry(value_name).value();
        // A source that had no value yet can not be referenced
        if new == old || old.is_undefined() {
            return;
        }

        let current = model.current();
        let dependents = self
            .inverses
            .iter()
            .flat_map(|inverse| inverse.query.evaluate(&source))
            .unique()
            .collect::<Vec<_>>();
        for dependent in dependents {
            let entry = dependent.entry(&self.dependent_value);
            if entry.is_null() {
                continue;
            }
            let matches_old = entry.value().compare(&old, true, None) == Some(Ordering::Equal);
            if matches_old {
                log::debug!("Updating {:?}.{} from '{}' to '{}'", dependent, self.dependent_value, old, new);
                entry.set_value(new.clone());
            }
            if dependent == current {
                model.set_current(&dependent, true);
            }
        }
    }
}

impl ModelObserver for OptionsObserver {
    fn notify(&self, model: &TreeModel, notification: &Notification) {
        match notification {
            Notification::ValueChangeBefore { path, value_name } => {
                self.on_value_change_before(model, path, value_name)
            }
            Notification::ValueChangeAfter { path, value_name } => {
                self.on_value_change_after(model, path, value_name)
            }
            // A structural edit between before and after would stale the snapshot
            _ if notification.is_structural() => {
                self.snapshot.lock().take();
            }
            _ => {}
        }
    }
}
