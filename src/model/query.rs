use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// One structural navigation primitive
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "step", content = "name", rename_all = "lowercase")]
pub enum QueryStep {
    /// Children in the named container
    Children(String),
    /// The parent, if any
    Parent,
    /// Other children of the parent in the same container
    Siblings,
}

/// A chain of steps evaluated head first. The empty chain maps an instance
/// to itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeQuery {
    steps: Vec<QueryStep>,
}

/// A node query terminated by a value slot name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeafQuery {
    pub query: NodeQuery,
    pub value_name: String,
}

impl NodeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_steps(steps: Vec<QueryStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[QueryStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last_step(&self) -> Option<&QueryStep> {
        self.steps.last()
    }

    /// Compose: `self` first, then `step`
    pub fn push(&mut self, step: QueryStep) {
        self.steps.push(step);
    }

    /// Compose: `step` first, then `self`
    pub fn push_front(&mut self, step: QueryStep) {
        self.steps.insert(0, step);
    }

    /// Compose two chains: `self` first, then `other`
    pub fn then(mut self, other: NodeQuery) -> Self {
        self.steps.extend(other.steps);
        self
    }

    /// The chain without its last step
    pub fn prefix(&self) -> NodeQuery {
        let end = self.steps.len().saturating_sub(1);
        NodeQuery::from_steps(self.steps[..end].to_vec())
    }

    pub fn leaf(self, value_name: impl Into<String>) -> LeafQuery {
        LeafQuery {
            query: self,
            value_name: value_name.into(),
        }
    }
}

impl LeafQuery {
    pub fn new(query: NodeQuery, value_name: impl Into<String>) -> Self {
        query.leaf(value_name)
    }

    /// Leaf query on the source instance itself
    pub fn on_self(value_name: impl Into<String>) -> Self {
        NodeQuery::new().leaf(value_name)
    }
}

impl fmt::Display for QueryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryStep::Children(name) => write!(f, "C{{{}}}", name),
            QueryStep::Parent => f.write_str("P"),
            QueryStep::Siblings => f.write_str("S"),
        }
    }
}

impl fmt::Display for NodeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.steps.iter().join(";"))
    }
}

impl fmt::Display for LeafQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.query.is_empty() {
            f.write_str(&self.value_name)
        } else {
            write!(f, "{};{}", self.query, self.value_name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_short_form() {
        let query = NodeQuery::from_steps(vec![
            QueryStep::Parent,
            QueryStep::Children("Category".to_string()),
            QueryStep::Siblings,
        ]);
        assert_eq!(query.to_string(), "P;C{Category};S");
        assert_eq!(query.clone().leaf("name").to_string(), "P;C{Category};S;name");
        assert_eq!(LeafQuery::on_self("name").to_string(), "name");
    }

    #[test]
    fn test_prefix_and_compose() {
        let mut query = NodeQuery::new();
        query.push(QueryStep::Children("Row".to_string()));
        query.push(QueryStep::Children("Cell".to_string()));
        assert_eq!(query.prefix().to_string(), "C{Row}");
        query.push_front(QueryStep::Parent);
        assert_eq!(query.to_string(), "P;C{Row};C{Cell}");
        let composed = NodeQuery::from_steps(vec![QueryStep::Siblings]).then(query);
        assert_eq!(composed.len(), 4);
        assert_eq!(NodeQuery::new().prefix(), NodeQuery::new());
    }
}
