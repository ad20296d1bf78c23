use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type Id = String;

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// Setting that may be left unset so the builder can pick a default later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriState {
    #[default]
    Unset,
    True,
    False,
}

impl TriState {
    pub fn is_set(&self) -> bool {
        !matches!(self, TriState::Unset)
    }

    pub fn is_true(&self) -> bool {
        matches!(self, TriState::True)
    }

    pub fn from_bool(value: bool) -> Self {
        if value {
            TriState::True
        } else {
            TriState::False
        }
    }

    /// Resolve to a bool, falling back to `default` when unset
    pub fn unwrap_or(&self, default: bool) -> bool {
        match self {
            TriState::Unset => default,
            TriState::True => true,
            TriState::False => false,
        }
    }
}

impl From<Option<bool>> for TriState {
    fn from(value: Option<bool>) -> Self {
        value.map(TriState::from_bool).unwrap_or_default()
    }
}

/// Cardinality bounds of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cardinality {
    pub min: usize,
    pub max: usize,
}

impl Cardinality {
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    pub fn unbounded() -> Self {
        Self {
            min: 0,
            max: usize::MAX,
        }
    }

    pub fn exactly(count: usize) -> Self {
        Self {
            min: count,
            max: count,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }

    pub fn is_unbounded(&self) -> bool {
        self.max == usize::MAX
    }

    pub fn contains(&self, count: usize) -> bool {
        count >= self.min && count <= self.max
    }
}

impl Default for Cardinality {
    fn default() -> Self {
        Self::unbounded()
    }
}
