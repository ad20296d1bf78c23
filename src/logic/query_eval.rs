use std::collections::HashSet;

use itertools::Itertools;

use crate::model::{Entry, Instance, LeafQuery, NodeQuery, QueryStep, Value};

impl QueryStep {
    pub fn evaluate(&self, source: &Instance) -> Vec<Instance> {
        match self {
            QueryStep::Children(name) => source.children(name),
            QueryStep::Parent => {
                let parent = source.parent();
                if parent.is_null() {
                    Vec::new()
                } else {
                    vec![parent]
                }
            }
            QueryStep::Siblings => source.siblings(),
        }
    }
}

impl NodeQuery {
    /// All results in order, duplicates removed (first position wins)
    pub fn evaluate(&self, source: &Instance) -> Vec<Instance> {
        if source.is_null() {
            return Vec::new();
        }
        let mut current = vec![source.clone()];
        for step in self.steps() {
            current = current
                .iter()
                .flat_map(|instance| step.evaluate(instance))
                .unique()
                .collect();
            if current.is_empty() {
                break;
            }
        }
        log::debug!("Query '{}' from {:?} gave {} result(s)", self, source, current.len());
        current
    }

    pub fn iter(&self, source: &Instance) -> QueryIter {
        QueryIter::new(self.clone(), source)
    }

    pub fn first(&self, source: &Instance) -> Instance {
        self.iter(source).next().unwrap_or_default()
    }

    pub fn count(&self, source: &Instance) -> usize {
        self.iter(source).count()
    }

    pub fn contains(&self, source: &Instance, target: &Instance) -> bool {
        self.iter(source).any(|instance| instance == *target)
    }
}

impl LeafQuery {
    pub fn entries(&self, source: &Instance) -> Vec<Entry> {
        self.query
            .evaluate(source)
            .into_iter()
            .map(|instance| instance.entry(&self.value_name))
            .filter(|entry| !entry.is_null())
            .collect()
    }

    /// Values of the reached entries, in query order, defaults included
    pub fn values(&self, source: &Instance) -> Vec<Value> {
        self.entries(source).iter().map(Entry::value).collect()
    }
}

/// Lazy, forward-only walk over the results of a query. A structural edit
/// inside the ranged subtree invalidates it; re-seed with [`QueryIter::reset`].
#[derive(Debug)]
pub struct QueryIter {
    query: NodeQuery,
    // One pending list per evaluated depth; depth 0 holds the source
    stack: Vec<std::vec::IntoIter<Instance>>,
    seen: HashSet<Instance>,
}

impl QueryIter {
    pub fn new(query: NodeQuery, source: &Instance) -> Self {
        let mut iter = Self {
            query,
            stack: Vec::new(),
            seen: HashSet::new(),
        };
        iter.reset(source);
        iter
    }

    /// Start over from a new source
    pub fn reset(&mut self, source: &Instance) {
        self.stack.clear();
        self.seen.clear();
        if !source.is_null() {
            self.stack.push(vec![source.clone()].into_iter());
        }
    }
}

impl Iterator for QueryIter {
    type Item = Instance;

    fn next(&mut self) -> Option<Instance> {
        while !self.stack.is_empty() {
            let depth = self.stack.len() - 1;
            let Some(instance) = self.stack[depth].next() else {
                self.stack.pop();
                continue;
            };
            match self.query.steps().get(depth) {
                Some(step) => {
                    let next = step.evaluate(&instance);
                    self.stack.push(next.into_iter());
                }
                None => {
                    if self.seen.insert(instance.clone()) {
                        return Some(instance);
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::logic::{QueryBuilder, SchemaBuilder};
    use crate::model::{Cardinality, Schema, SchemaValue, ValueKind};
    use crate::store::MemoryBackend;

    fn table_schema() -> Arc<Schema> {
        let mut builder = SchemaBuilder::new();
        let table = builder.add_node("Table").unwrap();
        let row = builder.add_node("Row").unwrap();
        let cell = builder.add_node("Cell").unwrap();
        builder
            .add_value(cell, SchemaValue::new("value", ValueKind::Integer).with_default(0))
            .unwrap();
        builder.add_container(table, row, Cardinality::default()).unwrap();
        builder.add_container(row, cell, Cardinality::default()).unwrap();
        builder.build()
    }

    fn table(rows: usize, cells: usize) -> Instance {
        let schema = table_schema();
        let root = Instance::new(schema.clone(), schema.root().unwrap(), MemoryBackend::new_document("Table"));
        for r in 0..rows {
            let row = root.insert_child("Row", r);
            for c in 0..cells {
                let cell = row.insert_child("Cell", c);
                assert!(cell.set_value("value", (r * 10 + c) as i64));
            }
        }
        root
    }

    #[test]
    fn test_children_chain_order() {
        let root = table(2, 3);
        let leaf = QueryBuilder::create_leaf_query("C{Row};C{Cell};value").unwrap();
        let values: Vec<i64> = leaf
            .values(&root)
            .iter()
            .filter_map(Value::as_i64)
            .collect();
        assert_eq!(values, vec![0, 1, 2, 10, 11, 12]);
    }

    #[test]
    fn test_parent_and_siblings() {
        let root = table(3, 1);
        let second_row = root.child("Row", 1);
        assert_eq!(QueryStep::Parent.evaluate(&second_row), vec![root.clone()]);
        assert!(QueryStep::Parent.evaluate(&root).is_empty());

        let siblings = QueryStep::Siblings.evaluate(&second_row);
        assert_eq!(siblings, vec![root.child("Row", 0), root.child("Row", 2)]);
    }

    #[test]
    fn test_duplicates_removed() {
        let root = table(3, 1);
        // Every row reaches the same parent
        let query = NodeQuery::parse("C{Row};P").unwrap();
        assert_eq!(query.evaluate(&root), vec![root.clone()]);
        assert_eq!(query.count(&root), 1);
    }

    #[test]
    fn test_iterator_matches_evaluate_and_resets() {
        let root = table(2, 2);
        let query = NodeQuery::parse("C{Row};C{Cell};S").unwrap();
        let eager = query.evaluate(&root);
        let mut iter = query.iter(&root);
        let lazy: Vec<Instance> = iter.by_ref().collect();
        assert_eq!(lazy, eager);
        assert_eq!(lazy.len(), 4);

        iter.reset(&root.child("Row", 0));
        assert_eq!(iter.count(), 0);

        let mut iter = NodeQuery::parse("C{Cell}").unwrap().iter(&Instance::null());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_empty_query_is_identity() {
        let root = table(1, 1);
        assert_eq!(NodeQuery::new().evaluate(&root), vec![root.clone()]);
        assert_eq!(NodeQuery::new().first(&root), root);
    }
}
