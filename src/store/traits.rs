use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Opaque key of an element inside one backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeKey(pub u64);

/// Element storage behind a tree model. Implementations use interior
/// mutability; every operation on a stale key returns `None` / `false`.
///
/// `tag` filters are optional: `None` matches every element.
pub trait TreeBackend: Send + Sync + fmt::Debug {
    fn contains(&self, node: NodeKey) -> bool;
    fn tag_name(&self, node: NodeKey) -> Option<String>;
    fn parent(&self, node: NodeKey) -> Option<NodeKey>;

    fn first_child(&self, node: NodeKey, tag: Option<&str>) -> Option<NodeKey>;
    fn last_child(&self, node: NodeKey, tag: Option<&str>) -> Option<NodeKey>;
    fn next_sibling(&self, node: NodeKey, tag: Option<&str>) -> Option<NodeKey>;
    fn previous_sibling(&self, node: NodeKey, tag: Option<&str>) -> Option<NodeKey>;

    /// Create an element under `parent` right after `after`, or first when
    /// `after` is `None`
    fn insert_child_after(&self, parent: NodeKey, tag: &str, after: Option<NodeKey>) -> Option<NodeKey>;

    /// Detach `node` from where it is and reattach it under `parent` right
    /// after `after`. Fails when `parent` lies inside the subtree of `node`.
    fn move_child_after(&self, parent: NodeKey, node: NodeKey, after: Option<NodeKey>) -> bool;

    /// Remove `node` and its subtree from `parent`
    fn remove_child(&self, parent: NodeKey, node: NodeKey) -> bool;

    fn attribute(&self, node: NodeKey, name: &str) -> Option<String>;
    fn set_attribute(&self, node: NodeKey, name: &str, value: &str) -> bool;
    fn remove_attribute(&self, node: NodeKey, name: &str) -> bool;
    fn attribute_names(&self, node: NodeKey) -> Vec<String>;

    fn text(&self, node: NodeKey) -> Option<String>;
    fn set_text(&self, node: NodeKey, text: &str) -> bool;
}

/// Cheap handle to an element of some backend. The default handle is null.
#[derive(Clone, Default)]
pub struct NodeData {
    backend: Option<Arc<dyn TreeBackend>>,
    key: NodeKey,
}

/// Detached copy of a subtree, used for cloning
#[derive(Debug, Clone, PartialEq)]
struct Snapshot {
    tag: String,
    attributes: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<Snapshot>,
}

impl NodeData {
    pub fn new(backend: Arc<dyn TreeBackend>, key: NodeKey) -> Self {
        Self {
            backend: Some(backend),
            key,
        }
    }

    pub fn null() -> Self {
        Self::default()
    }

    pub fn key(&self) -> NodeKey {
        self.key
    }

    pub fn backend(&self) -> Option<&Arc<dyn TreeBackend>> {
        self.backend.as_ref()
    }

    pub fn is_null(&self) -> bool {
        match &self.backend {
            Some(backend) => !backend.contains(self.key),
            None => true,
        }
    }

    /// Same backend instance, regardless of key
    pub fn same_backend(&self, other: &NodeData) -> bool {
        match (&self.backend, &other.backend) {
            (Some(a), Some(b)) => Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const (),
            _ => false,
        }
    }

    fn sibling(&self, key: Option<NodeKey>) -> NodeData {
        match (&self.backend, key) {
            (Some(backend), Some(key)) => NodeData::new(backend.clone(), key),
            _ => NodeData::null(),
        }
    }

    pub fn tag_name(&self) -> String {
        self.backend
            .as_ref()
            .and_then(|backend| backend.tag_name(self.key))
            .unwrap_or_default()
    }

    pub fn parent(&self) -> NodeData {
        let key = self.backend.as_ref().and_then(|backend| backend.parent(self.key));
        self.sibling(key)
    }

    pub fn first_child(&self, tag: Option<&str>) -> NodeData {
        let key = self
            .backend
            .as_ref()
            .and_then(|backend| backend.first_child(self.key, tag));
        self.sibling(key)
    }

    pub fn last_child(&self, tag: Option<&str>) -> NodeData {
        let key = self
            .backend
            .as_ref()
            .and_then(|backend| backend.last_child(self.key, tag));
        self.sibling(key)
    }

    pub fn next_sibling(&self, tag: Option<&str>) -> NodeData {
        let key = self
            .backend
            .as_ref()
            .and_then(|backend| backend.next_sibling(self.key, tag));
        self.sibling(key)
    }

    pub fn previous_sibling(&self, tag: Option<&str>) -> NodeData {
        let key = self
            .backend
            .as_ref()
            .and_then(|backend| backend.previous_sibling(self.key, tag));
        self.sibling(key)
    }

    /// Children with the given tag, in backend order
    pub fn children(&self, tag: Option<&str>) -> Vec<NodeData> {
        let mut result = Vec::new();
        let mut child = self.first_child(tag);
        while !child.is_null() {
            let next = child.next_sibling(tag);
            result.push(child);
            child = next;
        }
        result
    }

    pub fn child_count(&self, tag: Option<&str>) -> usize {
        self.children(tag).len()
    }

    /// Insert a new element right after `after`, or first when `after` is null
    pub fn insert_child_after(&self, tag: &str, after: &NodeData) -> NodeData {
        let Some(backend) = &self.backend else {
            return NodeData::null();
        };
        let after = (!after.is_null()).then_some(after.key);
        let key = backend.insert_child_after(self.key, tag, after);
        self.sibling(key)
    }

    pub fn move_child_after(&self, node: &NodeData, after: &NodeData) -> bool {
        let Some(backend) = &self.backend else {
            return false;
        };
        if !self.same_backend(node) {
            return false;
        }
        let after = (!after.is_null()).then_some(after.key);
        backend.move_child_after(self.key, node.key, after)
    }

    pub fn remove_child(&self, node: &NodeData) -> bool {
        match &self.backend {
            Some(backend) if self.same_backend(node) => backend.remove_child(self.key, node.key),
            _ => false,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.backend.as_ref()?.attribute(self.key, name)
    }

    pub fn set_attribute(&self, name: &str, value: &str) -> bool {
        self.backend
            .as_ref()
            .map(|backend| backend.set_attribute(self.key, name, value))
            .unwrap_or(false)
    }

    pub fn remove_attribute(&self, name: &str) -> bool {
        self.backend
            .as_ref()
            .map(|backend| backend.remove_attribute(self.key, name))
            .unwrap_or(false)
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.backend
            .as_ref()
            .map(|backend| backend.attribute_names(self.key))
            .unwrap_or_default()
    }

    pub fn text(&self) -> Option<String> {
        self.backend.as_ref()?.text(self.key)
    }

    pub fn set_text(&self, text: &str) -> bool {
        self.backend
            .as_ref()
            .map(|backend| backend.set_text(self.key, text))
            .unwrap_or(false)
    }

    /// Copy the subtree of `source` under `self`, right after `after`
    pub fn deep_copy_after(&self, source: &NodeData, after: &NodeData) -> NodeData {
        if self.is_null() || source.is_null() {
            return NodeData::null();
        }
        // Snapshot first so copying a node into its own subtree terminates
        let snapshot = source.snapshot();
        let copy = self.insert_child_after(&snapshot.tag, after);
        if !copy.is_null() {
            copy.write_snapshot(&snapshot);
        }
        copy
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            tag: self.tag_name(),
            attributes: self
                .attribute_names()
                .into_iter()
                .filter_map(|name| self.attribute(&name).map(|value| (name, value)))
                .collect(),
            text: self.text(),
            children: self.children(None).iter().map(NodeData::snapshot).collect(),
        }
    }

    fn write_snapshot(&self, snapshot: &Snapshot) {
        for (name, value) in &snapshot.attributes {
            self.set_attribute(name, value);
        }
        if let Some(text) = &snapshot.text {
            self.set_text(text);
        }
        let mut after = NodeData::null();
        for child in &snapshot.children {
            let copy = self.insert_child_after(&child.tag, &after);
            copy.write_snapshot(child);
            after = copy;
        }
    }
}

impl PartialEq for NodeData {
    fn eq(&self, other: &Self) -> bool {
        match (self.is_null(), other.is_null()) {
            (true, true) => true,
            (false, false) => self.same_backend(other) && self.key == other.key,
            _ => false,
        }
    }
}

impl Eq for NodeData {}

impl Hash for NodeData {
    fn hash<H: Hasher>(&self, state: &mut H) {
        if self.is_null() {
            0u8.hash(state);
        } else {
            1u8.hash(state);
            if let Some(backend) = &self.backend {
                (Arc::as_ptr(backend) as *const () as usize).hash(state);
            }
            self.key.hash(state);
        }
    }
}

impl fmt::Debug for NodeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("NodeData(null)")
        } else {
            write!(f, "NodeData({}#{})", self.tag_name(), self.key.0)
        }
    }
}
