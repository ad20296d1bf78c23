use crate::model::{Instance, NodeQuery, QueryStep};

impl NodeQuery {
    /// Host instance and container name the last step edits
    fn edit_target(&self, source: &Instance) -> Option<(Instance, String)> {
        let anchor = self.prefix().first(source);
        if anchor.is_null() {
            return None;
        }
        match self.last_step()? {
            QueryStep::Children(name) => Some((anchor, name.clone())),
            QueryStep::Siblings => {
                let name = anchor.container_name()?;
                Some((anchor.parent(), name))
            }
            QueryStep::Parent => None,
        }
    }

    pub fn can_insert(&self, source: &Instance, index: usize) -> bool {
        self.edit_target(source)
            .map(|(host, name)| host.can_insert_child(&name, index))
            .unwrap_or(false)
    }

    /// Insert into the container named by the last step: `Children(name)`
    /// under the first result of the preceding steps, `Siblings` beside it.
    /// Positions count every element of the container.
    pub fn insert(&self, source: &Instance, index: usize) -> Instance {
        self.edit_target(source)
            .map(|(host, name)| host.insert_child(&name, index))
            .unwrap_or_default()
    }

    pub fn can_clone(&self, source: &Instance, index: usize, item: &Instance) -> bool {
        self.edit_target(source)
            .map(|(host, name)| host.can_clone_child(&name, index, item))
            .unwrap_or(false)
    }

    pub fn clone_into(&self, source: &Instance, index: usize, item: &Instance) -> Instance {
        self.edit_target(source)
            .map(|(host, name)| host.clone_child(&name, index, item))
            .unwrap_or_default()
    }

    pub fn can_move(&self, source: &Instance, index: usize, item: &Instance) -> bool {
        self.edit_target(source)
            .map(|(host, name)| host.can_move_child(&name, index, item))
            .unwrap_or(false)
    }

    pub fn move_into(&self, source: &Instance, index: usize, item: &Instance) -> Instance {
        self.edit_target(source)
            .map(|(host, name)| host.move_child(&name, index, item))
            .unwrap_or_default()
    }

    pub fn can_remove(&self, source: &Instance, index: usize) -> bool {
        self.edit_target(source)
            .map(|(host, name)| host.can_remove_child(&name, index))
            .unwrap_or(false)
    }

    pub fn remove(&self, source: &Instance, index: usize) -> bool {
        self.edit_target(source)
            .map(|(host, name)| host.remove_child(&name, index))
            .unwrap_or(false)
    }
}
