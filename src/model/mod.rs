pub mod common;
pub mod conversion;
pub mod entry;
pub mod event;
pub mod instance;
pub mod path;
pub mod query;
pub mod schema;
pub mod value;

pub use common::*;
pub use conversion::*;
pub use entry::Entry;
pub use event::*;
pub use instance::Instance;
pub use path::*;
pub use query::*;
pub use schema::*;
pub use value::*;
