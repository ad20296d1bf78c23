pub mod query_builder;
pub mod query_edit;
pub mod query_eval;
pub mod schema_builder;
pub mod schema_document;
pub mod validate;

pub use query_builder::QueryBuilder;
pub use query_eval::QueryIter;
pub use schema_builder::{is_valid_tag_name, SchemaBuilder};
pub use schema_document::{
    ContainerDocument, LoadedSchema, NodeDocument, SchemaDocument, ValueDocument, ValueRole,
};
pub use validate::*;
