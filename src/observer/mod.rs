pub mod options_observer;
pub mod tree_model;

pub use options_observer::*;
pub use tree_model::{ModelObserver, SubscriptionId, TreeModel};
