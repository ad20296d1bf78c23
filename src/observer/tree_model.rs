use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::model::instance::resolve_variant;
use crate::model::{Entry, Instance, Notification, NotificationKind, PathAddress, Schema, Value};
use crate::observer::OptionsObserver;
use crate::store::{MemoryBackend, NodeData};

pub type SubscriptionId = Uuid;

/// Receiver of model notifications
pub trait ModelObserver: Send + Sync {
    fn notify(&self, model: &TreeModel, notification: &Notification);
}

impl<F> ModelObserver for F
where
    F: Fn(&TreeModel, &Notification) + Send + Sync,
{
    fn notify(&self, model: &TreeModel, notification: &Notification) {
        self(model, notification)
    }
}

struct Subscription {
    id: SubscriptionId,
    /// Empty means every kind
    kinds: Vec<NotificationKind>,
    observer: Arc<dyn ModelObserver>,
}

#[derive(Debug)]
enum Pending {
    SetValue {
        path: PathAddress,
        value_name: String,
        value: Value,
    },
    SetCurrent {
        path: Option<PathAddress>,
        forced: bool,
    },
}

#[derive(Debug, Default)]
struct DispatchState {
    active: bool,
    queue: VecDeque<Pending>,
}

pub(crate) struct ModelShared {
    schema: RwLock<Option<Arc<Schema>>>,
    root_data: RwLock<NodeData>,
    current: RwLock<Instance>,
    subscriptions: Mutex<Vec<Subscription>>,
    options_observers: Mutex<Vec<Arc<OptionsObserver>>>,
    dispatch: Mutex<DispatchState>,
}

/// Shared handle to a tree model.
///
/// An edit marks the model as dispatching until its after-notification has
/// been delivered. Value writes and current changes requested meanwhile are
/// queued and run in order afterwards; structural edits are rejected.
#[derive(Clone)]
pub struct TreeModel(Arc<ModelShared>);

impl Default for TreeModel {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeModel {
    pub fn new() -> Self {
        Self(Arc::new(ModelShared {
            schema: RwLock::new(None),
            root_data: RwLock::new(NodeData::null()),
            current: RwLock::new(Instance::null()),
            subscriptions: Mutex::new(Vec::new()),
            options_observers: Mutex::new(Vec::new()),
            dispatch: Mutex::new(DispatchState::default()),
        }))
    }

    pub fn with_schema(schema: Arc<Schema>) -> Self {
        let model = Self::new();
        model.set_schema(Some(schema));
        model
    }

    pub(crate) fn from_shared(shared: Arc<ModelShared>) -> Self {
        Self(shared)
    }

    fn downgrade(&self) -> Weak<ModelShared> {
        Arc::downgrade(&self.0)
    }

    pub fn ptr_eq(&self, other: &TreeModel) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    // ************* Schema and root *************

    pub fn schema(&self) -> Option<Arc<Schema>> {
        self.0.schema.read().clone()
    }

    /// Replace the schema. Option observers are rebuilt for the new schema.
    pub fn set_schema(&self, schema: Option<Arc<Schema>>) {
        for observer in self.0.options_observers.lock().drain(..) {
            observer.disconnect(self);
        }
        *self.0.schema.write() = schema.clone();
        *self.0.current.write() = Instance::null();

        if let Some(schema) = &schema {
            let observers = OptionsObserver::create_all(schema);
            for observer in &observers {
                observer.connect(self);
            }
            log::info!("Schema set with {} option observer(s)", observers.len());
            *self.0.options_observers.lock() = observers;
        }
        self.deliver(&Notification::SchemaChanged);
    }

    pub fn options_observers(&self) -> Vec<Arc<OptionsObserver>> {
        self.0.options_observers.lock().clone()
    }

    pub fn root_data(&self) -> NodeData {
        self.0.root_data.read().clone()
    }

    pub fn set_root_data(&self, data: NodeData) {
        *self.0.root_data.write() = data;
        *self.0.current.write() = Instance::null();
        log::info!("Root data changed");
        self.deliver(&Notification::RootChanged);
    }

    /// Start an empty in-memory document for the schema root
    pub fn create_new_root_document(&self) -> Instance {
        let Some(schema) = self.schema() else {
            return Instance::null();
        };
        let Some(root_def) = schema.root() else {
            return Instance::null();
        };
        let data = MemoryBackend::new_document(schema.node(root_def).tag_name());
        self.set_root_data(data);
        self.root()
    }

    pub fn root(&self) -> Instance {
        let Some(schema) = self.schema() else {
            return Instance::null();
        };
        let Some(root_def) = schema.root() else {
            return Instance::null();
        };
        let data = self.root_data();
        if data.is_null() || data.tag_name() != schema.node(root_def).tag_name() {
            return Instance::null();
        }
        let def = resolve_variant(&schema, root_def, &data);
        Instance::new(schema, def, data).with_model(self.downgrade())
    }

    pub fn instance_at(&self, path: &PathAddress) -> Instance {
        path.resolve(&self.root())
    }

    // ************* Current instance *************

    pub fn current(&self) -> Instance {
        self.0.current.read().clone()
    }

    /// Make `instance` current. `forced` notifies even when it already is.
    pub fn set_current(&self, instance: &Instance, forced: bool) -> bool {
        {
            let mut dispatch = self.0.dispatch.lock();
            if dispatch.active {
                dispatch.queue.push_back(Pending::SetCurrent {
                    path: instance.path(),
                    forced,
                });
                return true;
            }
            dispatch.active = true;
        }
        let bound = if instance.is_null() {
            Instance::null()
        } else {
            instance.clone().with_model(self.downgrade())
        };
        let changed = self.apply_current(bound, forced);
        self.finish_dispatch();
        changed
    }

    fn apply_current(&self, instance: Instance, forced: bool) -> bool {
        {
            let mut current = self.0.current.write();
            if *current == instance && !forced {
                return false;
            }
            *current = instance.clone();
        }
        self.deliver(&Notification::CurrentChanged {
            path: instance.path(),
            forced,
        });
        true
    }

    /// Called after a child of `host` was removed. If the current instance
    /// went away with it, current moves to `host`.
    ///
    /// `host` is the closest surviving ancestor of every node in the removed
    /// subtree, so this holds for a current instance at any depth below the
    /// removed child. A current instance that was already null before the
    /// removal is treated the same way. Emits an unforced `CurrentChanged`.
    pub(crate) fn repair_current(&self, host: &Instance) {
        let current = self.current();
        if current.def().is_some() && current.is_null() {
            self.set_current(host, false);
        }
    }

    // ************* Subscriptions *************

    pub fn subscribe(&self, kinds: &[NotificationKind], observer: Arc<dyn ModelObserver>) -> SubscriptionId {
        let id = Uuid::new_v4();
        self.0.subscriptions.lock().push(Subscription {
            id,
            kinds: kinds.to_vec(),
            observer,
        });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.0.subscriptions.lock();
        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.id != id);
        subscriptions.len() != before
    }

    pub fn subscription_count(&self) -> usize {
        self.0.subscriptions.lock().len()
    }

    pub fn is_dispatching(&self) -> bool {
        self.0.dispatch.lock().active
    }

    fn deliver(&self, notification: &Notification) {
        let kind = notification.kind();
        // Snapshot so observers may (un)subscribe while being notified
        let observers: Vec<Arc<dyn ModelObserver>> = self
            .0
            .subscriptions
            .lock()
            .iter()
            .filter(|subscription| subscription.kinds.is_empty() || subscription.kinds.contains(&kind))
            .map(|subscription| subscription.observer.clone())
            .collect();
        log::debug!("Delivering {:?} to {} observer(s)", kind, observers.len());
        for observer in observers {
            observer.notify(self, notification);
        }
    }

    // ************* Edits *************

    fn finish_dispatch(&self) {
        loop {
            let pending = {
                let mut dispatch = self.0.dispatch.lock();
                match dispatch.queue.pop_front() {
                    Some(pending) => pending,
                    None => {
                        dispatch.active = false;
                        return;
                    }
                }
            };
            self.run_pending(pending);
        }
    }

    fn run_pending(&self, pending: Pending) {
        match pending {
            Pending::SetValue {
                path,
                value_name,
                value,
            } => {
                let entry = self.instance_at(&path).entry(&value_name);
                if entry.is_null() || !entry.can_set_value(&value) {
                    log::warn!("Dropped queued write of '{}' at '{}'", value_name, path);
                    return;
                }
                self.apply_value(&entry, &path, value);
            }
            Pending::SetCurrent { path, forced } => {
                let instance = path
                    .map(|path| self.instance_at(&path))
                    .unwrap_or_default();
                self.apply_current(instance, forced);
            }
        }
    }

    /// Run a structural edit between its notifications. `None` when the
    /// model is dispatching.
    pub(crate) fn structural_edit<T>(
        &self,
        before: Option<Notification>,
        op: impl FnOnce() -> T,
        after: impl FnOnce(&T) -> Option<Notification>,
    ) -> Option<T> {
        {
            let mut dispatch = self.0.dispatch.lock();
            if dispatch.active {
                log::warn!("Structural edit rejected while notifications are dispatched");
                return None;
            }
            dispatch.active = true;
        }
        if let Some(notification) = &before {
            self.deliver(notification);
        }
        let result = op();
        if let Some(notification) = after(&result) {
            self.deliver(&notification);
        }
        self.finish_dispatch();
        Some(result)
    }

    /// Write a value between its notifications, or queue it when the model
    /// is dispatching
    pub(crate) fn value_edit(&self, entry: &Entry, value: Value) -> bool {
        let Some(path) = entry.instance().path() else {
            return false;
        };
        {
            let mut dispatch = self.0.dispatch.lock();
            if dispatch.active {
                log::debug!("Queued write of '{}' at '{}'", entry.name(), path);
                dispatch.queue.push_back(Pending::SetValue {
                    path,
                    value_name: entry.name().to_string(),
                    value,
                });
                return true;
            }
            dispatch.active = true;
        }
        let written = self.apply_value(entry, &path, value);
        self.finish_dispatch();
        written
    }

    fn apply_value(&self, entry: &Entry, path: &PathAddress, value: Value) -> bool {
        if entry.holds(&value) {
            return true;
        }
        let value_name = entry.name().to_string();
        self.deliver(&Notification::ValueChangeBefore {
            path: path.clone(),
            value_name: value_name.clone(),
        });
        if !entry.write(&value) {
            return false;
        }
        self.deliver(&Notification::ValueChangeAfter {
            path: path.clone(),
            value_name: value_name.clone(),
        });
        if entry.is_key() {
            self.deliver(&Notification::KeyValueChangeAfter {
                path: path.clone(),
                value_name: value_name.clone(),
            });
        }
        if entry.is_derived_id() {
            self.deliver(&Notification::VariantValueChangeAfter {
                path: path.clone(),
                value_name,
            });
        }
        true
    }
}

impl Drop for TreeModel {
    fn drop(&mut self) {
        if Arc::strong_count(&self.0) == 1 {
            log::info!("Tree model destroyed");
            self.deliver(&Notification::Destroyed);
        }
    }
}

impl fmt::Debug for TreeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeModel")
            .field("root", &self.root_data())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}
