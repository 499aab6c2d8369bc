//! Attribute paths.
//!
//! An [`AttributePath`] addresses a position inside a value tree, e.g.
//! `rule[0].port` is the `port` attribute of the first element of `rule`.

use std::fmt;

use crate::generated;
use crate::value::Value;

/// One step of an [`AttributePath`].
#[derive(Debug, Clone, PartialEq)]
pub enum PathStep {
    /// Selects an object attribute (or a nested block) by name.
    AttributeName(String),
    /// Selects a map element by key.
    ElementKeyString(String),
    /// Selects a list or tuple element by index.
    ElementKeyInt(i64),
    /// Selects a set element by its value.
    ElementKeyValue(Value),
}

/// A sequence of steps from the root of a value tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttributePath {
    steps: Vec<PathStep>,
}

impl AttributePath {
    /// The empty path, addressing the root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from its steps.
    pub fn new(steps: Vec<PathStep>) -> Self {
        Self { steps }
    }

    /// Append an attribute name step.
    pub fn with_attribute_name(mut self, name: impl Into<String>) -> Self {
        self.steps.push(PathStep::AttributeName(name.into()));
        self
    }

    /// Append a map key step.
    pub fn with_element_key_string(mut self, key: impl Into<String>) -> Self {
        self.steps.push(PathStep::ElementKeyString(key.into()));
        self
    }

    /// Append a list/tuple index step.
    pub fn with_element_key_int(mut self, index: i64) -> Self {
        self.steps.push(PathStep::ElementKeyInt(index));
        self
    }

    /// Append a set element step.
    pub fn with_element_key_value(mut self, value: Value) -> Self {
        self.steps.push(PathStep::ElementKeyValue(value));
        self
    }

    /// The steps of this path.
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Returns true for the root path.
    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the path has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The last step, if any.
    pub fn last(&self) -> Option<&PathStep> {
        self.steps.last()
    }

    pub(crate) fn push(&mut self, step: PathStep) {
        self.steps.push(step);
    }

    pub(crate) fn pop(&mut self) {
        self.steps.pop();
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                PathStep::AttributeName(name) if i == 0 => write!(f, "{}", name)?,
                PathStep::AttributeName(name) => write!(f, ".{}", name)?,
                PathStep::ElementKeyString(key) => write!(f, "[{:?}]", key)?,
                PathStep::ElementKeyInt(index) => write!(f, "[{}]", index)?,
                PathStep::ElementKeyValue(value) => write!(f, "[{}]", value)?,
            }
        }
        Ok(())
    }
}

/// Set element steps cannot be expressed on the wire; the path is truncated
/// at the first one, which still points at the enclosing set.
impl From<&AttributePath> for generated::AttributePath {
    fn from(path: &AttributePath) -> Self {
        use generated::attribute_path::step::Selector;

        let steps = path
            .steps
            .iter()
            .map_while(|step| {
                let selector = match step {
                    PathStep::AttributeName(name) => Selector::AttributeName(name.clone()),
                    PathStep::ElementKeyString(key) => Selector::ElementKeyString(key.clone()),
                    PathStep::ElementKeyInt(index) => Selector::ElementKeyInt(*index),
                    PathStep::ElementKeyValue(_) => return None,
                };
                Some(generated::attribute_path::Step {
                    selector: Some(selector),
                })
            })
            .collect();

        generated::AttributePath { steps }
    }
}

impl From<generated::AttributePath> for AttributePath {
    fn from(path: generated::AttributePath) -> Self {
        use generated::attribute_path::step::Selector;

        let steps = path
            .steps
            .into_iter()
            .filter_map(|step| step.selector)
            .map(|selector| match selector {
                Selector::AttributeName(name) => PathStep::AttributeName(name),
                Selector::ElementKeyString(key) => PathStep::ElementKeyString(key),
                Selector::ElementKeyInt(index) => PathStep::ElementKeyInt(index),
            })
            .collect();

        AttributePath { steps }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let path = AttributePath::root()
            .with_attribute_name("rule")
            .with_element_key_int(0)
            .with_attribute_name("port");
        assert_eq!(path.to_string(), "rule[0].port");

        let path = AttributePath::root()
            .with_attribute_name("tags")
            .with_element_key_string("env");
        assert_eq!(path.to_string(), "tags[\"env\"]");

        assert_eq!(AttributePath::root().to_string(), "");
    }

    #[test]
    fn test_wire_round_trip() {
        let path = AttributePath::root()
            .with_attribute_name("tags")
            .with_element_key_string("env");
        let wire = generated::AttributePath::from(&path);
        assert_eq!(wire.steps.len(), 2);
        assert_eq!(AttributePath::from(wire), path);
    }

    #[test]
    fn test_wire_truncates_set_steps() {
        let path = AttributePath::root()
            .with_attribute_name("ports")
            .with_element_key_value(Value::number(80))
            .with_attribute_name("protocol");
        let wire = generated::AttributePath::from(&path);
        assert_eq!(
            AttributePath::from(wire),
            AttributePath::root().with_attribute_name("ports")
        );
    }
}
