use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::model::{Instance, Schema, Value};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub instance_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    /// Node type name or path address of the offending element
    pub location: String,
    pub error_type: ValidationErrorType,
    pub message: String,
    pub value_name: Option<String>,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub location: String,
    pub warning_type: ValidationWarningType,
    pub message: String,
    pub value_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationErrorType {
    MissingRoot,
    UnresolvedOptionsQuery,
    InvalidDefault,
    MissingRequiredValue,
    InvalidValue,
    NotInOptions,
    DuplicateKey,
    CardinalityViolation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationWarningType {
    UnreachableNode,
    UnknownElement,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            ..Default::default()
        }
    }

    fn error(
        &mut self,
        location: &str,
        error_type: ValidationErrorType,
        message: String,
        value_name: Option<&str>,
    ) -> &mut ValidationError {
        self.valid = false;
        self.errors.push(ValidationError {
            location: location.to_string(),
            error_type,
            message,
            value_name: value_name.map(str::to_string),
            expected: None,
            actual: None,
        });
        let last = self.errors.len() - 1;
        &mut self.errors[last]
    }

    fn warning(&mut self, location: &str, warning_type: ValidationWarningType, message: String) {
        self.warnings.push(ValidationWarning {
            location: location.to_string(),
            warning_type,
            message,
            value_name: None,
        });
    }

    pub fn has_error(&self, error_type: ValidationErrorType) -> bool {
        self.errors.iter().any(|error| error.error_type == error_type)
    }
}

pub struct SchemaValidator;

impl SchemaValidator {
    /// Check a built schema for problems the builder can not see locally
    pub fn validate_schema(schema: &Schema) -> ValidationResult {
        let mut result = ValidationResult::new();
        let Some(root) = schema.root() else {
            result.error(
                "schema",
                ValidationErrorType::MissingRoot,
                "Schema has no root node definition".to_string(),
                None,
            );
            return result;
        };

        for def in schema.node_ids() {
            let node = schema.node(def);
            for slot in node.own_values() {
                if let Some(query) = &slot.options().query {
                    let reachable = query
                        .query
                        .result_defs(schema, def)
                        .into_iter()
                        .any(|source| schema.value(source, &query.value_name).is_some());
                    if !reachable {
                        result
                            .error(
                                node.name(),
                                ValidationErrorType::UnresolvedOptionsQuery,
                                format!("Options query '{}' of '{}' does not resolve", query, slot.name()),
                                Some(slot.name()),
                            )
                            .actual = Some(query.to_string());
                    }
                }
                let options = &slot.options().values;
                if let Some(default) = slot.default_value() {
                    let in_options = options.is_empty()
                        || options
                            .iter()
                            .any(|option| option.compare(default, true, None).is_some_and(|o| o.is_eq()));
                    if slot.settings().options_only && !in_options {
                        let error = result.error(
                            node.name(),
                            ValidationErrorType::InvalidDefault,
                            format!("Default of '{}' is not one of its options", slot.name()),
                            Some(slot.name()),
                        );
                        error.actual = Some(default.to_string());
                    }
                }
            }

            let reachable = def == root || node.has_base() || !schema.parent_defs(def).is_empty();
            if !reachable {
                result.warning(
                    node.name(),
                    ValidationWarningType::UnreachableNode,
                    format!("'{}' is not contained anywhere and is not the root", node.name()),
                );
            }
        }
        result
    }

    /// Check a tree against its schema: cardinality, required values, value
    /// kinds, options-only values and key uniqueness
    pub fn validate_tree(root: &Instance) -> ValidationResult {
        let mut result = ValidationResult::new();
        if root.is_null() {
            result.error(
                "/",
                ValidationErrorType::MissingRoot,
                "Tree has no root instance".to_string(),
                None,
            );
            return result;
        }
        let mut pending = vec![root.clone()];
        while let Some(instance) = pending.pop() {
            result.instance_count += 1;
            Self::validate_instance(&instance, &mut result);
            let Some(schema) = instance.schema().cloned() else {
                continue;
            };
            let Some(def) = instance.def() else {
                continue;
            };
            for name in schema.child_names(def).iter().rev() {
                let mut children = instance.children(name);
                children.reverse();
                pending.extend(children);
            }
        }
        log::debug!(
            "Validated {} instance(s): {} error(s), {} warning(s)",
            result.instance_count,
            result.errors.len(),
            result.warnings.len()
        );
        result
    }

    fn validate_instance(instance: &Instance, result: &mut ValidationResult) {
        let (Some(schema), Some(def)) = (instance.schema(), instance.def()) else {
            return;
        };
        let location = instance
            .path()
            .map(|path| format!("/{}", path))
            .unwrap_or_default();

        for slot in schema.values(def) {
            let entry = instance.entry(slot.name());
            let settings = slot.settings();
            match (entry.raw_value(), entry.stored_value()) {
                (None, _) => {
                    if settings.required.is_true() && !slot.has_default() {
                        result.error(
                            &location,
                            ValidationErrorType::MissingRequiredValue,
                            format!("Required value '{}' is missing", slot.name()),
                            Some(slot.name()),
                        );
                    }
                }
                (Some(raw), None) => {
                    let error = result.error(
                        &location,
                        ValidationErrorType::InvalidValue,
                        format!("'{}' does not hold a valid {}", slot.name(), slot.kind()),
                        Some(slot.name()),
                    );
                    error.expected = Some(slot.kind().to_string());
                    error.actual = Some(raw);
                }
                (Some(_), Some(value)) => {
                    if settings.options_only {
                        let options = entry.options();
                        if !options.is_empty() && !options.contains(&value) {
                            let error = result.error(
                                &location,
                                ValidationErrorType::NotInOptions,
                                format!("'{}' is not one of the options of '{}'", value, slot.name()),
                                Some(slot.name()),
                            );
                            error.actual = Some(value.to_string());
                        }
                    }
                }
            }
        }

        let tags: HashSet<String> = schema
            .containers(def)
            .map(|container| schema.node(container.child()).tag_name().to_string())
            .collect();
        for child in instance.data().children(None) {
            let tag = child.tag_name();
            if !tags.contains(&tag) {
                result.warning(
                    &location,
                    ValidationWarningType::UnknownElement,
                    format!("Element '{}' is not described by the schema", tag),
                );
            }
        }

        for container in schema.containers(def) {
            let children = instance.children(container.name());
            if !container.cardinality().contains(children.len()) {
                let error = result.error(
                    &location,
                    ValidationErrorType::CardinalityViolation,
                    format!(
                        "Container '{}' holds {} element(s)",
                        container.name(),
                        children.len()
                    ),
                    None,
                );
                error.expected = Some(format!("[{}, {}]", container.min_count(), container.max_count()));
                error.actual = Some(children.len().to_string());
            }
            Self::validate_unique_keys(&location, container.name(), &children, result);
        }
    }

    fn validate_unique_keys(location: &str, container: &str, children: &[Instance], result: &mut ValidationResult) {
        let mut seen: Vec<Value> = Vec::new();
        for child in children {
            let entry = child.key_entry();
            let unique = entry
                .value_def()
                .map(|slot| slot.settings().unique.is_true())
                .unwrap_or(false);
            if !unique {
                continue;
            }
            let Some(key) = entry.stored_value() else {
                continue;
            };
            if seen.contains(&key) {
                let error = result.error(
                    location,
                    ValidationErrorType::DuplicateKey,
                    format!("Key '{}' is used twice in container '{}'", key, container),
                    Some(entry.name()),
                );
                error.actual = Some(key.to_string());
            } else {
                seen.push(key);
            }
        }
    }
}
