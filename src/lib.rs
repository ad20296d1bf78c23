pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod observer;
pub mod store;

pub use config::{LoggingConfig, ModelConfig};
pub use error::{PathParseError, QueryParseError, SchemaError};

// Export logic types
pub use logic::{
    is_valid_tag_name, LoadedSchema, QueryBuilder, QueryIter, SchemaBuilder, SchemaDocument,
    SchemaValidator, ValidationError, ValidationErrorType, ValidationResult, ValidationWarning,
    ValidationWarningType,
};

// Export all model types
pub use model::*;

pub use observer::{ModelObserver, ObserverState, OptionsObserver, SubscriptionId, TreeModel};

// Export store types
pub use store::{MemoryBackend, NodeData, NodeKey, TreeBackend};

/// Initialize logging with INFO level unless `RUST_LOG` says otherwise.
/// Safe to call more than once.
pub fn init_logging() {
    init_logging_with(&LoggingConfig::default());
}

pub fn init_logging_with(config: &LoggingConfig) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.filter.as_str()))
        .try_init();
}
