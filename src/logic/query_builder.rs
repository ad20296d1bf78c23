use itertools::Itertools;

use crate::error::QueryParseError;
use crate::model::{LeafQuery, NodeDefId, NodeQuery, QueryStep, Schema};

/// Textual form: `;`-separated steps `C{name}` / `Children{name}`, `P` /
/// `Parent` and `S` / `Siblings`. A leaf query adds a trailing `;valueName`.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: NodeQuery,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn children(mut self, name: impl Into<String>) -> Self {
        self.query.push(QueryStep::Children(name.into()));
        self
    }

    pub fn parent(mut self) -> Self {
        self.query.push(QueryStep::Parent);
        self
    }

    pub fn siblings(mut self) -> Self {
        self.query.push(QueryStep::Siblings);
        self
    }

    pub fn build(self) -> NodeQuery {
        self.query
    }

    pub fn leaf(self, value_name: impl Into<String>) -> LeafQuery {
        self.query.leaf(value_name)
    }

    /// Parse a node query, `None` on grammar errors
    pub fn create_node_query(text: &str) -> Option<NodeQuery> {
        match parse_node_query(text) {
            Ok(query) => Some(query),
            Err(err) => {
                log::debug!("Rejected node query '{}': {}", text, err);
                None
            }
        }
    }

    /// Parse a leaf query, `None` on grammar errors
    pub fn create_leaf_query(text: &str) -> Option<LeafQuery> {
        match parse_leaf_query(text) {
            Ok(query) => Some(query),
            Err(err) => {
                log::debug!("Rejected leaf query '{}': {}", text, err);
                None
            }
        }
    }

    /// Query that leads from any result of `query` (evaluated from nodes of
    /// type `source`) back to a set containing the origin. When `query`
    /// climbs above `source` into several possible parent types, this is
    /// the first one that resolves; see [`QueryBuilder::create_inverses`].
    pub fn create_inverse(query: &NodeQuery, schema: &Schema, source: NodeDefId) -> Option<NodeQuery> {
        schema_walks(query, schema, source)
            .into_iter()
            .next()
            .map(|walk| walk.inverse)
    }

    /// Every resolving reading of `query` from `source`, as the node type it
    /// ends at and the inverse leading back
    pub fn create_inverses(query: &NodeQuery, schema: &Schema, source: NodeDefId) -> Vec<(NodeDefId, NodeQuery)> {
        schema_walks(query, schema, source)
            .into_iter()
            .filter_map(|walk| Some((*walk.trail.last()?, walk.inverse)))
            .collect()
    }

    /// Inverse of a leaf query, ending at `value_name` on the origin side
    pub fn create_inverse_leaf(
        query: &LeafQuery,
        schema: &Schema,
        source: NodeDefId,
        value_name: &str,
    ) -> Option<LeafQuery> {
        Some(Self::create_inverse(&query.query, schema, source)?.leaf(value_name))
    }
}

impl NodeQuery {
    pub fn parse(text: &str) -> Result<NodeQuery, QueryParseError> {
        parse_node_query(text)
    }

    /// Node type reached from `source`, if the schema defines the path
    pub fn result_def(&self, schema: &Schema, source: NodeDefId) -> Option<NodeDefId> {
        self.result_defs(schema, source).into_iter().next()
    }

    /// All node types reachable from `source`; more than one when the query
    /// climbs into a type with several possible parents
    pub fn result_defs(&self, schema: &Schema, source: NodeDefId) -> Vec<NodeDefId> {
        schema_walks(self, schema, source)
            .into_iter()
            .filter_map(|walk| walk.trail.last().copied())
            .unique()
            .collect()
    }
}

impl LeafQuery {
    pub fn parse(text: &str) -> Result<LeafQuery, QueryParseError> {
        parse_leaf_query(text)
    }
}

/// Partial walk of a query over the schema
struct SchemaWalk {
    // Node types visited so far; a Parent step returns to the previous one
    trail: Vec<NodeDefId>,
    inverse: NodeQuery,
}

/// Walk `query` over the schema starting at `source`. A Parent step taken
/// from the starting type (or from a type reached by climbing) forks into
/// one walk per possible parent; walks that do not resolve are dropped.
fn schema_walks(query: &NodeQuery, schema: &Schema, source: NodeDefId) -> Vec<SchemaWalk> {
    let mut walks = vec![SchemaWalk {
        trail: vec![source],
        inverse: NodeQuery::new(),
    }];
    for step in query.steps() {
        walks = walks
            .into_iter()
            .flat_map(|walk| advance(walk, step, schema))
            .collect();
    }
    walks
}

fn advance(mut walk: SchemaWalk, step: &QueryStep, schema: &Schema) -> Vec<SchemaWalk> {
    let Some(&current) = walk.trail.last() else {
        return Vec::new();
    };
    match step {
        QueryStep::Children(name) => match schema.container(current, name) {
            Some(container) => {
                walk.inverse.push_front(QueryStep::Parent);
                walk.trail.push(container.child());
                vec![walk]
            }
            None => Vec::new(),
        },
        QueryStep::Parent if walk.trail.len() > 1 => {
            walk.trail.pop();
            let Some(&parent) = walk.trail.last() else {
                return Vec::new();
            };
            match schema.container_for_child(parent, current) {
                Some(container) => {
                    walk.inverse
                        .push_front(QueryStep::Children(container.name().to_string()));
                    vec![walk]
                }
                None => Vec::new(),
            }
        }
        QueryStep::Parent => schema
            .parent_defs(current)
            .into_iter()
            .filter_map(|parent| {
                let container = schema.container_for_child(parent, current)?;
                let mut inverse = walk.inverse.clone();
                inverse.push_front(QueryStep::Children(container.name().to_string()));
                Some(SchemaWalk {
                    trail: vec![parent],
                    inverse,
                })
            })
            .collect(),
        QueryStep::Siblings => {
            walk.inverse.push_front(QueryStep::Siblings);
            vec![walk]
        }
    }
}

fn parse_step(token: &str) -> Result<QueryStep, QueryParseError> {
    let token = token.trim();
    match token {
        "P" | "Parent" => return Ok(QueryStep::Parent),
        "S" | "Siblings" => return Ok(QueryStep::Siblings),
        _ => {}
    }
    let Some(open) = token.find('{') else {
        if token.contains('}') {
            return Err(QueryParseError::UnmatchedBrace(token.to_string()));
        }
        return Err(QueryParseError::UnknownStep(token.to_string()));
    };
    let head = &token[..open];
    let Some(name) = token[open + 1..].strip_suffix('}') else {
        return Err(QueryParseError::UnmatchedBrace(token.to_string()));
    };
    if name.contains('{') || name.contains('}') {
        return Err(QueryParseError::UnmatchedBrace(token.to_string()));
    }
    if head != "C" && head != "Children" {
        return Err(QueryParseError::UnknownStep(token.to_string()));
    }
    let name = name.trim();
    if name.is_empty() {
        return Err(QueryParseError::MissingName(token.to_string()));
    }
    Ok(QueryStep::Children(name.to_string()))
}

fn parse_node_query(text: &str) -> Result<NodeQuery, QueryParseError> {
    if text.trim().is_empty() {
        return Err(QueryParseError::Empty);
    }
    let steps = text
        .split(';')
        .map(parse_step)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(NodeQuery::from_steps(steps))
}

fn parse_leaf_query(text: &str) -> Result<LeafQuery, QueryParseError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(QueryParseError::Empty);
    }
    let (query, value_name) = match text.rsplit_once(';') {
        Some((query, value_name)) => (parse_node_query(query)?, value_name.trim()),
        None => (NodeQuery::new(), text),
    };
    if value_name.is_empty() || value_name.contains(['{', '}']) {
        return Err(QueryParseError::MissingValueName(text.to_string()));
    }
    Ok(query.leaf(value_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::SchemaBuilder;
    use crate::model::{Cardinality, SchemaValue, ValueKind};

    #[test]
    fn test_parse_children_and_leaf() {
        let leaf = QueryBuilder::create_leaf_query("C{Row};C{Cell};value").unwrap();
        assert_eq!(
            leaf.query.steps(),
            &[
                QueryStep::Children("Row".to_string()),
                QueryStep::Children("Cell".to_string())
            ]
        );
        assert_eq!(leaf.value_name, "value");

        let leaf = QueryBuilder::create_leaf_query("P;value").unwrap();
        assert_eq!(leaf.query.steps(), &[QueryStep::Parent]);
        assert_eq!(leaf.value_name, "value");

        assert_eq!(QueryBuilder::create_leaf_query("name"), Some(LeafQuery::on_self("name")));
    }

    #[test]
    fn test_long_forms() {
        let query = NodeQuery::parse("Parent; Children{Item} ;Siblings").unwrap();
        assert_eq!(query.to_string(), "P;C{Item};S");
    }

    #[test]
    fn test_grammar_errors() {
        assert!(QueryBuilder::create_node_query("C{Row").is_none());
        assert_eq!(
            NodeQuery::parse("C{Row"),
            Err(QueryParseError::UnmatchedBrace("C{Row".to_string()))
        );
        assert_eq!(
            NodeQuery::parse("Row}"),
            Err(QueryParseError::UnmatchedBrace("Row}".to_string()))
        );
        assert_eq!(NodeQuery::parse("X"), Err(QueryParseError::UnknownStep("X".to_string())));
        assert_eq!(
            NodeQuery::parse("D{Row}"),
            Err(QueryParseError::UnknownStep("D{Row}".to_string()))
        );
        assert_eq!(NodeQuery::parse("C{}"), Err(QueryParseError::MissingName("C{}".to_string())));
        assert_eq!(NodeQuery::parse(""), Err(QueryParseError::Empty));
        assert!(QueryBuilder::create_leaf_query("C{Row};").is_none());
        assert!(QueryBuilder::create_leaf_query("C{Row").is_none());
    }

    #[test]
    fn test_fluent_builder() {
        let leaf = QueryBuilder::new().parent().children("Category").leaf("name");
        assert_eq!(leaf.to_string(), "P;C{Category};name");
        assert_eq!(QueryBuilder::new().siblings().build().len(), 1);
    }

    #[test]
    fn test_inverse_rules() {
        let mut builder = SchemaBuilder::new();
        let catalog = builder.add_node("Catalog").unwrap();
        let category = builder.add_node("Category").unwrap();
        let item = builder.add_node("Item").unwrap();
        builder
            .add_value(item, SchemaValue::new("name", ValueKind::String))
            .unwrap();
        builder.add_container(catalog, category, Cardinality::default()).unwrap();
        builder.add_container(catalog, item, Cardinality::default()).unwrap();
        let schema = builder.build();

        let query = NodeQuery::parse("P;C{Category}").unwrap();
        let inverse = QueryBuilder::create_inverse(&query, &schema, item).unwrap();
        assert_eq!(inverse.to_string(), "P;C{Item}");
        assert_eq!(query.result_def(&schema, item), Some(category));
        assert_eq!(inverse.result_def(&schema, category), Some(item));

        let query = NodeQuery::parse("C{Item};S").unwrap();
        let inverse = QueryBuilder::create_inverse(&query, &schema, catalog).unwrap();
        assert_eq!(inverse.to_string(), "S;P");

        let unknown = NodeQuery::parse("C{Missing}").unwrap();
        assert!(QueryBuilder::create_inverse(&unknown, &schema, catalog).is_none());
    }

    #[test]
    fn test_climbing_forks_per_parent_type() {
        let mut builder = SchemaBuilder::new();
        let archive = builder.add_node("Archive").unwrap();
        let document = builder.add_node("Document").unwrap();
        let header = builder.add_node("Header").unwrap();
        let section = builder.add_node("Section").unwrap();
        builder.add_container(archive, section, Cardinality::default()).unwrap();
        builder.add_container(document, header, Cardinality::default()).unwrap();
        builder.add_container(document, section, Cardinality::default()).unwrap();
        let schema = builder.build();

        // The first parent type has no headers, the second one does
        let query = NodeQuery::parse("P;C{Header}").unwrap();
        assert_eq!(query.result_def(&schema, section), Some(header));
        let inverse = QueryBuilder::create_inverse(&query, &schema, section).unwrap();
        assert_eq!(inverse.to_string(), "P;C{Section}");

        let up = NodeQuery::parse("P").unwrap();
        assert_eq!(up.result_defs(&schema, section), vec![archive, document]);
        let inverses = QueryBuilder::create_inverses(&up, &schema, section);
        assert_eq!(inverses.len(), 2);
        assert!(inverses.iter().all(|(_, inverse)| inverse.to_string() == "C{Section}"));

        assert!(QueryBuilder::create_inverses(&up, &schema, archive).is_empty());
    }
}
