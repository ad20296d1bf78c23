use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PathParseError;
use crate::model::Instance;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathStep {
    /// Container name in the parent
    pub name: String,
    /// Position inside that container
    pub index: usize,
}

/// Durable address of an instance: container/position steps from the root.
/// The empty address is the root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathAddress {
    steps: Vec<PathStep>,
}

impl PathAddress {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_steps(steps: Vec<PathStep>) -> Self {
        Self { steps }
    }

    /// Address of `instance` relative to its top-most ancestor. Null for a
    /// null instance.
    pub fn of(instance: &Instance) -> Option<Self> {
        if instance.is_null() {
            return None;
        }
        let mut steps = Vec::new();
        let mut current = instance.clone();
        loop {
            let parent = current.parent();
            if parent.is_null() {
                break;
            }
            let name = current.container_name()?;
            let index = parent.child_index(&name, &current)?;
            steps.push(PathStep { name, index });
            current = parent;
        }
        steps.reverse();
        Some(Self { steps })
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last_name(&self) -> Option<&str> {
        self.steps.last().map(|step| step.name.as_str())
    }

    pub fn parent(&self) -> Option<PathAddress> {
        let (_, head) = self.steps.split_last()?;
        Some(Self::from_steps(head.to_vec()))
    }

    pub fn child(&self, name: impl Into<String>, index: usize) -> PathAddress {
        let mut steps = self.steps.clone();
        steps.push(PathStep {
            name: name.into(),
            index,
        });
        Self { steps }
    }

    /// True if `self` equals `other` or addresses something inside it
    pub fn starts_with(&self, other: &PathAddress) -> bool {
        self.steps.starts_with(&other.steps)
    }

    /// Walk the address down from `root`; null when a step is missing
    pub fn resolve(&self, root: &Instance) -> Instance {
        let mut current = root.clone();
        for step in &self.steps {
            if current.is_null() {
                break;
            }
            current = current.child(&step.name, step.index);
        }
        current
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.index)
    }
}

impl fmt::Display for PathAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

impl FromStr for PathStep {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PathParseError::InvalidStep(s.to_string());
        let (name, rest) = s.split_once('[').ok_or_else(invalid)?;
        let index = rest.strip_suffix(']').ok_or_else(invalid)?;
        if name.is_empty() {
            return Err(invalid());
        }
        Ok(PathStep {
            name: name.to_string(),
            index: index.parse().map_err(|_| invalid())?,
        })
    }
}

impl FromStr for PathAddress {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_matches('/');
        if s.is_empty() {
            return Ok(PathAddress::root());
        }
        let steps = s.split('/').map(str::parse).collect::<Result<Vec<PathStep>, _>>()?;
        Ok(Self { steps })
    }
}
