use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::store::{NodeData, NodeKey, TreeBackend};

#[derive(Debug, Clone, Default)]
struct MemoryNode {
    tag: String,
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
    attributes: BTreeMap<String, String>,
    text: Option<String>,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<MemoryNode>,
}

/// Arena of elements. Slots of removed elements are reused; a key carries
/// the generation of its slot, so stale handles read as null.
#[derive(Debug, Default)]
struct MemoryTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

fn split_key(key: NodeKey) -> (usize, u32) {
    ((key.0 & u64::from(u32::MAX)) as usize, (key.0 >> 32) as u32)
}

fn join_key(index: u32, generation: u32) -> NodeKey {
    NodeKey((u64::from(generation) << 32) | u64::from(index))
}

impl MemoryTree {
    fn get(&self, key: NodeKey) -> Option<&MemoryNode> {
        let (index, generation) = split_key(key);
        let slot = self.slots.get(index)?;
        if slot.generation != generation {
            return None;
        }
        slot.node.as_ref()
    }

    fn get_mut(&mut self, key: NodeKey) -> Option<&mut MemoryNode> {
        let (index, generation) = split_key(key);
        let slot = self.slots.get_mut(index)?;
        if slot.generation != generation {
            return None;
        }
        slot.node.as_mut()
    }

    fn alloc(&mut self, tag: &str, parent: Option<NodeKey>) -> NodeKey {
        let node = MemoryNode {
            tag: tag.to_string(),
            parent,
            ..Default::default()
        };
        self.live += 1;
        if let Some(index) = self.free.pop() {
            if let Some(slot) = self.slots.get_mut(index as usize) {
                slot.node = Some(node);
                return join_key(index, slot.generation);
            }
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        join_key(index, 0)
    }

    /// Empty the slot of `key` and return what it held
    fn release(&mut self, key: NodeKey) -> Option<MemoryNode> {
        let (index, generation) = split_key(key);
        let slot = self.slots.get_mut(index)?;
        if slot.generation != generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index as u32);
        self.live -= 1;
        Some(node)
    }

    fn matches(&self, key: NodeKey, tag: Option<&str>) -> bool {
        match tag {
            Some(tag) => self.get(key).map(|node| node.tag == tag).unwrap_or(false),
            None => true,
        }
    }

    fn siblings(&self, key: NodeKey) -> Option<(&[NodeKey], usize)> {
        let parent = self.get(self.get(key)?.parent?)?;
        let position = parent.children.iter().position(|child| *child == key)?;
        Some((&parent.children, position))
    }

    fn is_in_subtree(&self, node: NodeKey, root: NodeKey) -> bool {
        let mut current = Some(node);
        while let Some(key) = current {
            if key == root {
                return true;
            }
            current = self.get(key).and_then(|node| node.parent);
        }
        false
    }

    fn detach(&mut self, key: NodeKey) {
        let Some(parent) = self.get(key).and_then(|node| node.parent) else {
            return;
        };
        if let Some(parent) = self.get_mut(parent) {
            parent.children.retain(|child| *child != key);
        }
        if let Some(node) = self.get_mut(key) {
            node.parent = None;
        }
    }

    fn attach(&mut self, parent: NodeKey, key: NodeKey, after: Option<NodeKey>) -> bool {
        let Some(parent_node) = self.get_mut(parent) else {
            return false;
        };
        let position = match after {
            Some(after) => match parent_node.children.iter().position(|child| *child == after) {
                Some(index) => index + 1,
                None => return false,
            },
            None => 0,
        };
        parent_node.children.insert(position, key);
        if let Some(node) = self.get_mut(key) {
            node.parent = Some(parent);
        }
        true
    }

    fn drop_subtree(&mut self, key: NodeKey) {
        let mut pending = vec![key];
        while let Some(current) = pending.pop() {
            if let Some(node) = self.release(current) {
                pending.extend(node.children);
            }
        }
    }
}

/// In-process element tree
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tree: RwLock<MemoryTree>,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a parentless element and return a handle to it
    pub fn create_root(self: &Arc<Self>, tag: &str) -> NodeData {
        let key = self.tree.write().alloc(tag, None);
        NodeData::new(self.clone(), key)
    }

    /// Fresh backend holding a single root element
    pub fn new_document(root_tag: &str) -> NodeData {
        Self::new().create_root(root_tag)
    }

    pub fn len(&self) -> usize {
        self.tree.read().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TreeBackend for MemoryBackend {
    fn contains(&self, node: NodeKey) -> bool {
        self.tree.read().get(node).is_some()
    }

    fn tag_name(&self, node: NodeKey) -> Option<String> {
        self.tree.read().get(node).map(|node| node.tag.clone())
    }

    fn parent(&self, node: NodeKey) -> Option<NodeKey> {
        self.tree.read().get(node)?.parent
    }

    fn first_child(&self, node: NodeKey, tag: Option<&str>) -> Option<NodeKey> {
        let tree = self.tree.read();
        tree.get(node)?
            .children
            .iter()
            .copied()
            .find(|child| tree.matches(*child, tag))
    }

    fn last_child(&self, node: NodeKey, tag: Option<&str>) -> Option<NodeKey> {
        let tree = self.tree.read();
        tree.get(node)?
            .children
            .iter()
            .rev()
            .copied()
            .find(|child| tree.matches(*child, tag))
    }

    fn next_sibling(&self, node: NodeKey, tag: Option<&str>) -> Option<NodeKey> {
        let tree = self.tree.read();
        let (siblings, position) = tree.siblings(node)?;
        siblings[position + 1..]
            .iter()
            .copied()
            .find(|sibling| tree.matches(*sibling, tag))
    }

    fn previous_sibling(&self, node: NodeKey, tag: Option<&str>) -> Option<NodeKey> {
        let tree = self.tree.read();
        let (siblings, position) = tree.siblings(node)?;
        siblings[..position]
            .iter()
            .rev()
            .copied()
            .find(|sibling| tree.matches(*sibling, tag))
    }

    fn insert_child_after(&self, parent: NodeKey, tag: &str, after: Option<NodeKey>) -> Option<NodeKey> {
        let mut tree = self.tree.write();
        tree.get(parent)?;
        if let Some(after) = after {
            if tree.get(after)?.parent != Some(parent) {
                return None;
            }
        }
        let key = tree.alloc(tag, None);
        tree.attach(parent, key, after);
        Some(key)
    }

    fn move_child_after(&self, parent: NodeKey, node: NodeKey, after: Option<NodeKey>) -> bool {
        let mut tree = self.tree.write();
        if tree.get(parent).is_none() || tree.get(node).is_none() {
            return false;
        }
        if tree.is_in_subtree(parent, node) || after == Some(node) {
            return false;
        }
        if let Some(after) = after {
            if tree.get(after).and_then(|after| after.parent) != Some(parent) {
                return false;
            }
        }
        tree.detach(node);
        tree.attach(parent, node, after)
    }

    fn remove_child(&self, parent: NodeKey, node: NodeKey) -> bool {
        let mut tree = self.tree.write();
        if tree.get(node).and_then(|node| node.parent) != Some(parent) {
            return false;
        }
        tree.detach(node);
        tree.drop_subtree(node);
        true
    }

    fn attribute(&self, node: NodeKey, name: &str) -> Option<String> {
        self.tree.read().get(node)?.attributes.get(name).cloned()
    }

    fn set_attribute(&self, node: NodeKey, name: &str, value: &str) -> bool {
        match self.tree.write().get_mut(node) {
            Some(node) => {
                node.attributes.insert(name.to_string(), value.to_string());
                true
            }
            None => false,
        }
    }

    fn remove_attribute(&self, node: NodeKey, name: &str) -> bool {
        self.tree
            .write()
            .get_mut(node)
            .map(|node| node.attributes.remove(name).is_some())
            .unwrap_or(false)
    }

    fn attribute_names(&self, node: NodeKey) -> Vec<String> {
        self.tree
            .read()
            .get(node)
            .map(|node| node.attributes.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn text(&self, node: NodeKey) -> Option<String> {
        self.tree.read().get(node)?.text.clone()
    }

    fn set_text(&self, node: NodeKey, text: &str) -> bool {
        match self.tree.write().get_mut(node) {
            Some(node) => {
                node.text = Some(text.to_string());
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(nodes: &[NodeData]) -> Vec<String> {
        nodes.iter().map(|node| node.attribute("id").unwrap_or_default()).collect()
    }

    #[test]
    fn test_insert_and_navigate() {
        let root = MemoryBackend::new_document("Catalog");
        let a = root.insert_child_after("Item", &NodeData::null());
        a.set_attribute("id", "a");
        let b = root.insert_child_after("Item", &a);
        b.set_attribute("id", "b");
        let c = root.insert_child_after("Category", &a);
        c.set_attribute("id", "c");

        assert_eq!(tags(&root.children(Some("Item"))), vec!["a", "b"]);
        assert_eq!(tags(&root.children(None)), vec!["a", "c", "b"]);
        assert_eq!(a.next_sibling(Some("Item")), b);
        assert_eq!(b.previous_sibling(None), c);
        assert_eq!(root.last_child(Some("Category")), c);
        assert_eq!(b.parent(), root);
        assert!(root.parent().is_null());
    }

    #[test]
    fn test_remove_makes_handles_null() {
        let root = MemoryBackend::new_document("Root");
        let child = root.insert_child_after("Node", &NodeData::null());
        let grandchild = child.insert_child_after("Node", &NodeData::null());
        assert!(root.remove_child(&child));
        assert!(child.is_null());
        assert!(grandchild.is_null());
        assert_eq!(child, NodeData::null());
        assert!(!root.remove_child(&child));
    }

    #[test]
    fn test_move_rejects_own_subtree() {
        let root = MemoryBackend::new_document("Root");
        let a = root.insert_child_after("Node", &NodeData::null());
        let b = a.insert_child_after("Node", &NodeData::null());
        assert!(!b.move_child_after(&a, &NodeData::null()));
        assert!(root.move_child_after(&b, &a));
        assert_eq!(b.parent(), root);
        assert_eq!(root.child_count(None), 2);
        assert_eq!(a.child_count(None), 0);
    }

    #[test]
    fn test_deep_copy_into_own_subtree() {
        let root = MemoryBackend::new_document("Root");
        let a = root.insert_child_after("Node", &NodeData::null());
        a.set_attribute("name", "a");
        a.set_text("body");
        let b = a.insert_child_after("Leaf", &NodeData::null());
        b.set_attribute("name", "b");

        let copy = a.deep_copy_after(&a, &b);
        assert_eq!(copy.attribute("name").as_deref(), Some("a"));
        assert_eq!(copy.text().as_deref(), Some("body"));
        assert_eq!(copy.child_count(Some("Leaf")), 1);
        assert_eq!(a.child_count(None), 2);
    }

    #[test]
    fn test_handles_of_different_backends_differ() {
        let first = MemoryBackend::new_document("Root");
        let second = MemoryBackend::new_document("Root");
        assert_eq!(first.key(), second.key());
        assert_ne!(first, second);
        assert!(!first.move_child_after(&second, &NodeData::null()));
    }

    #[test]
    fn test_removed_slots_are_reused() {
        let backend = MemoryBackend::new();
        let root = backend.create_root("Root");
        for _ in 0..100 {
            let child = root.insert_child_after("Node", &NodeData::null());
            child.insert_child_after("Leaf", &NodeData::null());
            assert!(root.remove_child(&child));
        }
        assert_eq!(backend.len(), 1);
        assert_eq!(backend.tree.read().slots.len(), 3);
    }

    #[test]
    fn test_stale_handle_stays_null_after_reuse() {
        let root = MemoryBackend::new_document("Root");
        let old = root.insert_child_after("Node", &NodeData::null());
        old.set_attribute("id", "old");
        assert!(root.remove_child(&old));

        let new = root.insert_child_after("Node", &NodeData::null());
        new.set_attribute("id", "new");
        assert_ne!(old.key(), new.key());
        assert!(old.is_null());
        assert_eq!(old.attribute("id"), None);
        assert!(!old.set_attribute("id", "stale"));
        assert_eq!(new.attribute("id").as_deref(), Some("new"));
    }
}
