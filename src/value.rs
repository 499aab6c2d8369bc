//! The value tree.
//!
//! A [`Value`] pairs a [`Type`] with one of three states: null, unknown
//! (resolved only after apply) or known. Known composite values own their
//! children, so [`Clone`] is always a deep copy.
//!
//! Every constructor checks that the raw data agrees with the type: object
//! children match the declared attribute set exactly and tuple children match
//! positionally. Violations are reported as [`ProviderError::TypeMismatch`].

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Number;

use crate::error::ProviderError;
use crate::path::{AttributePath, PathStep};
use crate::types::Type;

/// Raw data of a known value.
///
/// Lists, sets and tuples share [`Raw::List`]; maps and objects share
/// [`Raw::Map`]. The value's [`Type`] tells them apart.
#[derive(Debug, Clone, PartialEq)]
pub enum Raw {
    /// A string.
    String(String),
    /// A number.
    Number(Number),
    /// A boolean.
    Bool(bool),
    /// Ordered children of a list, set or tuple.
    List(Vec<Value>),
    /// Keyed children of a map or object.
    Map(BTreeMap<String, Value>),
}

#[derive(Debug, Clone, PartialEq)]
enum State {
    Null,
    Unknown,
    Known(Raw),
}

/// Where [`Value::walk_deepest`] stopped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Walk<'a> {
    /// Every step was followed; holds the addressed value.
    Reached(&'a Value),
    /// A null or unknown value was hit before the last step; holds it.
    Blocked(&'a Value),
    /// A map key, list index or set element was absent; holds the
    /// collection it was looked up in.
    Missing(&'a Value),
}

/// A typed value.
///
/// `PartialEq` is exact structural identity: an unknown equals an unknown of
/// the same type and set elements compare in order. Use [`Value::equal`] for
/// semantic comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    ty: Type,
    state: State,
}

impl Value {
    /// Create a known value, checking `raw` against `ty`.
    pub fn new(ty: Type, raw: Raw) -> Result<Self, ProviderError> {
        check_shape(&ty, &raw)?;
        Ok(Self {
            ty,
            state: State::Known(raw),
        })
    }

    /// A null value of the given type.
    pub fn null(ty: Type) -> Self {
        Self {
            ty,
            state: State::Null,
        }
    }

    /// An unknown value of the given type.
    pub fn unknown(ty: Type) -> Self {
        Self {
            ty,
            state: State::Unknown,
        }
    }

    /// A known string.
    pub fn string(s: impl Into<String>) -> Self {
        Self {
            ty: Type::String,
            state: State::Known(Raw::String(s.into())),
        }
    }

    /// A known number.
    pub fn number(n: impl Into<Number>) -> Self {
        Self {
            ty: Type::Number,
            state: State::Known(Raw::Number(n.into())),
        }
    }

    /// A known floating point number. NaN and infinities are rejected.
    pub fn float(f: f64) -> Result<Self, ProviderError> {
        let n = Number::from_f64(f)
            .ok_or_else(|| ProviderError::mismatch(format!("{} is not a finite number", f)))?;
        Ok(Self::number(n))
    }

    /// A known boolean.
    pub fn bool(b: bool) -> Self {
        Self {
            ty: Type::Bool,
            state: State::Known(Raw::Bool(b)),
        }
    }

    /// A known object whose type is derived from its attributes.
    pub fn object<K, I>(attributes: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let attrs: BTreeMap<String, Value> = attributes
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .collect();
        let ty = Type::object(attrs.iter().map(|(name, v)| (name.clone(), v.ty.clone())));
        Self {
            ty,
            state: State::Known(Raw::Map(attrs)),
        }
    }

    /// A known tuple whose type is derived from its elements.
    pub fn tuple(elements: impl IntoIterator<Item = Value>) -> Self {
        let elements: Vec<Value> = elements.into_iter().collect();
        let ty = Type::tuple(elements.iter().map(|v| v.ty.clone()));
        Self {
            ty,
            state: State::Known(Raw::List(elements)),
        }
    }

    /// A known list. Every element must have type `element_type`.
    pub fn list(
        element_type: Type,
        elements: impl IntoIterator<Item = Value>,
    ) -> Result<Self, ProviderError> {
        Self::new(
            Type::list(element_type),
            Raw::List(elements.into_iter().collect()),
        )
    }

    /// A known set. Exact duplicates are dropped.
    pub fn set(
        element_type: Type,
        elements: impl IntoIterator<Item = Value>,
    ) -> Result<Self, ProviderError> {
        let mut unique: Vec<Value> = Vec::new();
        for element in elements {
            if !unique.contains(&element) {
                unique.push(element);
            }
        }
        Self::new(Type::set(element_type), Raw::List(unique))
    }

    /// A known map. Every element must have type `element_type`.
    pub fn map<K, I>(element_type: Type, entries: I) -> Result<Self, ProviderError>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::new(
            Type::map(element_type),
            Raw::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        )
    }

    /// The type of this value.
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self.state, State::Null)
    }

    /// Returns true if this value is unknown.
    pub fn is_unknown(&self) -> bool {
        matches!(self.state, State::Unknown)
    }

    /// Returns true unless this value is unknown. Null counts as known.
    pub fn is_known(&self) -> bool {
        !self.is_unknown()
    }

    /// Returns true if neither this value nor any descendant is unknown.
    pub fn is_fully_known(&self) -> bool {
        match &self.state {
            State::Null => true,
            State::Unknown => false,
            State::Known(Raw::List(elements)) => elements.iter().all(Value::is_fully_known),
            State::Known(Raw::Map(entries)) => entries.values().all(Value::is_fully_known),
            State::Known(_) => true,
        }
    }

    /// The raw data of a known value.
    pub fn raw(&self) -> Option<&Raw> {
        match &self.state {
            State::Known(raw) => Some(raw),
            _ => None,
        }
    }

    /// The string of a known string value.
    pub fn as_str(&self) -> Option<&str> {
        match self.raw()? {
            Raw::String(s) => Some(s),
            _ => None,
        }
    }

    /// The number of a known number value.
    pub fn as_number(&self) -> Option<&Number> {
        match self.raw()? {
            Raw::Number(n) => Some(n),
            _ => None,
        }
    }

    /// The boolean of a known bool value.
    pub fn as_bool(&self) -> Option<bool> {
        match self.raw()? {
            Raw::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Elements of a known list, set or tuple.
    pub fn elements(&self) -> Option<&[Value]> {
        match self.raw()? {
            Raw::List(elements) => Some(elements),
            _ => None,
        }
    }

    /// Entries of a known map or object.
    pub fn entries(&self) -> Option<&BTreeMap<String, Value>> {
        match self.raw()? {
            Raw::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// An attribute of a known object.
    pub fn get_attribute(&self, name: &str) -> Option<&Value> {
        match self.ty {
            Type::Object(_) => self.entries()?.get(name),
            _ => None,
        }
    }

    /// Replace an attribute of a known object. The new value must have the
    /// attribute's declared type.
    pub fn set_attribute(&mut self, name: &str, value: Value) -> Result<(), ProviderError> {
        let attr_type = self
            .ty
            .attribute_types()
            .and_then(|attrs| attrs.get(name))
            .ok_or_else(|| {
                ProviderError::mismatch(format!("{} has no attribute {:?}", self.ty, name))
            })?;
        if *attr_type != value.ty {
            return Err(ProviderError::mismatch(format!(
                "attribute {:?} expects {}, got {}",
                name, attr_type, value.ty
            )));
        }
        match &mut self.state {
            State::Known(Raw::Map(entries)) => {
                entries.insert(name.to_string(), value);
                Ok(())
            }
            _ => Err(ProviderError::mismatch(format!(
                "cannot set attribute {:?} on a null or unknown object",
                name
            ))),
        }
    }

    /// Semantic equality.
    ///
    /// Sets compare regardless of element order and numbers compare by
    /// value. An unknown is never equal to anything, itself included.
    pub fn equal(&self, other: &Value) -> bool {
        if self.ty != other.ty {
            return false;
        }
        match (&self.state, &other.state) {
            (State::Unknown, _) | (_, State::Unknown) => false,
            (State::Null, State::Null) => true,
            (State::Known(a), State::Known(b)) => match (a, b) {
                (Raw::String(a), Raw::String(b)) => a == b,
                (Raw::Bool(a), Raw::Bool(b)) => a == b,
                (Raw::Number(a), Raw::Number(b)) => numbers_equal(a, b),
                (Raw::List(a), Raw::List(b)) if matches!(self.ty, Type::Set(_)) => {
                    sets_equal(a, b)
                }
                (Raw::List(a), Raw::List(b)) => {
                    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equal(y))
                }
                (Raw::Map(a), Raw::Map(b)) => {
                    a.len() == b.len()
                        && a.iter()
                            .all(|(k, x)| b.get(k).map(|y| x.equal(y)).unwrap_or(false))
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Follow `path` from this value.
    ///
    /// Returns `Ok(None)` when an intermediate value is null or unknown, or
    /// when a map key, list index or set element is absent. Returns
    /// [`ProviderError::InvalidPath`] when a step does not fit the type it is
    /// applied to.
    pub fn walk(&self, path: &AttributePath) -> Result<Option<&Value>, ProviderError> {
        match self.walk_deepest(path)? {
            Walk::Reached(value) => Ok(Some(value)),
            Walk::Blocked(_) | Walk::Missing(_) => Ok(None),
        }
    }

    /// Follow `path` as far as it goes, reporting where and why it stopped.
    pub fn walk_deepest(&self, path: &AttributePath) -> Result<Walk<'_>, ProviderError> {
        let mut current = self;
        for step in path.steps() {
            let raw = match &current.state {
                State::Known(raw) => raw,
                State::Null | State::Unknown => return Ok(Walk::Blocked(current)),
            };
            let next = match (step, &current.ty, raw) {
                (PathStep::AttributeName(name), Type::Object(attrs), Raw::Map(entries)) => {
                    if !attrs.contains_key(name) {
                        return Err(ProviderError::InvalidPath(format!(
                            "{}: {} has no attribute {:?}",
                            path, current.ty, name
                        )));
                    }
                    entries.get(name)
                }
                (PathStep::ElementKeyString(key), Type::Map(_), Raw::Map(entries)) => {
                    entries.get(key)
                }
                (PathStep::ElementKeyInt(index), Type::List(_) | Type::Tuple(_), Raw::List(elements)) => {
                    usize::try_from(*index).ok().and_then(|i| elements.get(i))
                }
                (PathStep::ElementKeyValue(key), Type::Set(_), Raw::List(elements)) => {
                    elements.iter().find(|e| e.equal(key))
                }
                _ => {
                    return Err(ProviderError::InvalidPath(format!(
                        "{}: step does not apply to a value of type {}",
                        path, current.ty
                    )))
                }
            };
            match next {
                Some(value) => current = value,
                None => return Ok(Walk::Missing(current)),
            }
        }
        Ok(Walk::Reached(current))
    }

    /// Rebuild this value bottom-up.
    ///
    /// `f` is called for every node after its children have been
    /// transformed, with the node's path from the root. The root is visited
    /// last with the empty path.
    pub fn transform<F>(self, mut f: F) -> Result<Value, ProviderError>
    where
        F: FnMut(&AttributePath, Value) -> Result<Value, ProviderError>,
    {
        let mut path = AttributePath::root();
        transform_at(&mut path, self, &mut f)
    }
}

fn transform_at<F>(
    path: &mut AttributePath,
    value: Value,
    f: &mut F,
) -> Result<Value, ProviderError>
where
    F: FnMut(&AttributePath, Value) -> Result<Value, ProviderError>,
{
    let Value { ty, state } = value;
    let rebuilt = match state {
        State::Known(Raw::List(elements)) => {
            let mut out = Vec::with_capacity(elements.len());
            for (i, element) in elements.into_iter().enumerate() {
                let step = match &ty {
                    Type::Set(_) => PathStep::ElementKeyValue(element.clone()),
                    _ => PathStep::ElementKeyInt(i as i64),
                };
                path.push(step);
                let result = transform_at(path, element, f);
                path.pop();
                out.push(result?);
            }
            Value::new(ty, Raw::List(out))?
        }
        State::Known(Raw::Map(entries)) => {
            let is_object = matches!(ty, Type::Object(_));
            let mut out = BTreeMap::new();
            for (key, element) in entries {
                let step = if is_object {
                    PathStep::AttributeName(key.clone())
                } else {
                    PathStep::ElementKeyString(key.clone())
                };
                path.push(step);
                let result = transform_at(path, element, f);
                path.pop();
                out.insert(key, result?);
            }
            Value::new(ty, Raw::Map(out))?
        }
        state => Value { ty, state },
    };
    f(path, rebuilt)
}

fn check_shape(ty: &Type, raw: &Raw) -> Result<(), ProviderError> {
    match (ty, raw) {
        (Type::String, Raw::String(_))
        | (Type::Number, Raw::Number(_))
        | (Type::Bool, Raw::Bool(_)) => Ok(()),
        (Type::List(elem) | Type::Set(elem), Raw::List(elements)) => {
            for (i, element) in elements.iter().enumerate() {
                if element.ty != **elem {
                    return Err(ProviderError::mismatch(format!(
                        "element {} of {} has type {}",
                        i, ty, element.ty
                    )));
                }
            }
            Ok(())
        }
        (Type::Tuple(types), Raw::List(elements)) => {
            if types.len() != elements.len() {
                return Err(ProviderError::mismatch(format!(
                    "{} expects {} elements, got {}",
                    ty,
                    types.len(),
                    elements.len()
                )));
            }
            for (i, (expected, element)) in types.iter().zip(elements).enumerate() {
                if element.ty != *expected {
                    return Err(ProviderError::mismatch(format!(
                        "tuple element {} expects {}, got {}",
                        i, expected, element.ty
                    )));
                }
            }
            Ok(())
        }
        (Type::Map(elem), Raw::Map(entries)) => {
            for (key, element) in entries {
                if element.ty != **elem {
                    return Err(ProviderError::mismatch(format!(
                        "map element {:?} of {} has type {}",
                        key, ty, element.ty
                    )));
                }
            }
            Ok(())
        }
        (Type::Object(attrs), Raw::Map(entries)) => {
            if let Some(extra) = entries.keys().find(|k| !attrs.contains_key(*k)) {
                return Err(ProviderError::mismatch(format!(
                    "{} has no attribute {:?}",
                    ty, extra
                )));
            }
            for (name, expected) in attrs.iter() {
                match entries.get(name) {
                    None => {
                        return Err(ProviderError::mismatch(format!(
                            "missing attribute {:?} of {}",
                            name, ty
                        )))
                    }
                    Some(element) if element.ty != *expected => {
                        return Err(ProviderError::mismatch(format!(
                            "attribute {:?} expects {}, got {}",
                            name, expected, element.ty
                        )))
                    }
                    Some(_) => {}
                }
            }
            Ok(())
        }
        _ => Err(ProviderError::mismatch(format!(
            "raw data does not match type {}",
            ty
        ))),
    }
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    a.as_f64() == b.as_f64()
}

fn sets_equal(a: &[Value], b: &[Value]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    a.iter().all(|x| {
        let found = b
            .iter()
            .enumerate()
            .find(|(i, y)| !used[*i] && x.equal(y))
            .map(|(i, _)| i);
        match found {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            State::Null => f.write_str("null"),
            State::Unknown => f.write_str("(unknown)"),
            State::Known(Raw::String(s)) => write!(f, "{:?}", s),
            State::Known(Raw::Number(n)) => write!(f, "{}", n),
            State::Known(Raw::Bool(b)) => write!(f, "{}", b),
            State::Known(Raw::List(elements)) => {
                f.write_str("[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                f.write_str("]")
            }
            State::Known(Raw::Map(entries)) => {
                f.write_str("{")?;
                for (i, (key, element)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} = {}", key, element)?;
                }
                f.write_str("}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(port: i64) -> Value {
        Value::object([("port", Value::number(port)), ("cidr", Value::null(Type::String))])
    }

    fn rule_type() -> Type {
        Type::object([("port", Type::Number), ("cidr", Type::String)])
    }

    #[test]
    fn test_new_checks_shape() {
        assert!(Value::new(Type::String, Raw::Bool(true)).is_err());

        let obj_ty = Type::object([("a", Type::String)]);
        let missing = Value::new(obj_ty.clone(), Raw::Map(BTreeMap::new()));
        assert!(matches!(missing, Err(ProviderError::TypeMismatch(_))));

        let mut extra = BTreeMap::new();
        extra.insert("a".to_string(), Value::string("x"));
        extra.insert("b".to_string(), Value::string("y"));
        assert!(Value::new(obj_ty, Raw::Map(extra)).is_err());

        let tuple_ty = Type::tuple([Type::String, Type::Number]);
        let swapped = Raw::List(vec![Value::number(1), Value::string("x")]);
        assert!(Value::new(tuple_ty, swapped).is_err());

        assert!(Value::list(Type::String, [Value::string("a"), Value::bool(true)]).is_err());
    }

    #[test]
    fn test_null_unknown_known() {
        let null = Value::null(Type::String);
        assert!(null.is_null());
        assert!(null.is_known());
        assert!(null.is_fully_known());

        let unknown = Value::unknown(Type::String);
        assert!(!unknown.is_known());
        assert!(!unknown.is_null());

        let obj = Value::object([("id", Value::unknown(Type::String))]);
        assert!(obj.is_known());
        assert!(!obj.is_fully_known());
    }

    #[test]
    fn test_equal_semantics() {
        let unknown = Value::unknown(Type::String);
        assert!(!unknown.equal(&unknown));
        assert_eq!(unknown, unknown.clone());

        let a = Value::set(Type::Number, [Value::number(1), Value::number(2)]).unwrap();
        let b = Value::set(Type::Number, [Value::number(2), Value::number(1)]).unwrap();
        assert!(a.equal(&b));
        assert_ne!(a, b);

        let l1 = Value::list(Type::Number, [Value::number(1), Value::number(2)]).unwrap();
        let l2 = Value::list(Type::Number, [Value::number(2), Value::number(1)]).unwrap();
        assert!(!l1.equal(&l2));

        assert!(Value::number(1).equal(&Value::float(1.0).unwrap()));
        assert!(!Value::null(Type::String).equal(&Value::null(Type::Number)));
    }

    #[test]
    fn test_clone_is_deep() {
        let original = Value::object([("name", Value::string("a"))]);
        let mut copy = original.clone();
        copy.set_attribute("name", Value::string("b")).unwrap();
        assert_eq!(original.get_attribute("name").unwrap().as_str(), Some("a"));
        assert_eq!(copy.get_attribute("name").unwrap().as_str(), Some("b"));
    }

    #[test]
    fn test_set_attribute_checks_type() {
        let mut obj = Value::object([("name", Value::string("a"))]);
        assert!(obj.set_attribute("name", Value::number(1)).is_err());
        assert!(obj.set_attribute("other", Value::string("x")).is_err());
    }

    #[test]
    fn test_walk() {
        let value = Value::object([
            ("rule", Value::list(rule_type(), [rule(80), rule(443)]).unwrap()),
            ("name", Value::null(Type::String)),
        ]);

        let path = AttributePath::root()
            .with_attribute_name("rule")
            .with_element_key_int(1)
            .with_attribute_name("port");
        assert_eq!(value.walk(&path).unwrap(), Some(&Value::number(443)));

        let out_of_range = AttributePath::root()
            .with_attribute_name("rule")
            .with_element_key_int(7);
        assert_eq!(value.walk(&out_of_range).unwrap(), None);

        let through_null = AttributePath::root()
            .with_attribute_name("name")
            .with_attribute_name("x");
        assert_eq!(value.walk(&through_null).unwrap(), None);

        let wrong_step = AttributePath::root()
            .with_attribute_name("rule")
            .with_element_key_string("x");
        assert!(matches!(
            value.walk(&wrong_step),
            Err(ProviderError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_walk_deepest_reports_where_it_stopped() {
        let rules = Value::list(rule_type(), [rule(80)]).unwrap();
        let value = Value::object([
            ("rule", rules.clone()),
            ("name", Value::null(Type::String)),
        ]);

        let missing = AttributePath::root()
            .with_attribute_name("rule")
            .with_element_key_int(3)
            .with_attribute_name("port");
        assert_eq!(value.walk_deepest(&missing).unwrap(), Walk::Missing(&rules));

        let blocked = AttributePath::root()
            .with_attribute_name("name")
            .with_attribute_name("x");
        assert_eq!(
            value.walk_deepest(&blocked).unwrap(),
            Walk::Blocked(&Value::null(Type::String))
        );

        let reached = AttributePath::root().with_attribute_name("name");
        assert_eq!(
            value.walk_deepest(&reached).unwrap(),
            Walk::Reached(&Value::null(Type::String))
        );
    }

    #[test]
    fn test_transform_is_post_order() {
        let value = Value::object([
            ("rule", Value::list(rule_type(), [rule(80)]).unwrap()),
            ("name", Value::string("web")),
        ]);

        let mut visited = Vec::new();
        let out = value
            .clone()
            .transform(|path, v| {
                visited.push(path.to_string());
                Ok(v)
            })
            .unwrap();

        assert_eq!(out, value);
        assert_eq!(
            visited,
            vec!["name", "rule[0].cidr", "rule[0].port", "rule[0]", "rule", ""]
        );
    }

    #[test]
    fn test_transform_rewrites_leaves() {
        let value = Value::object([("id", Value::null(Type::String)), ("n", Value::number(1))]);
        let out = value
            .transform(|path, v| {
                if path.to_string() == "id" {
                    Ok(Value::unknown(v.ty().clone()))
                } else {
                    Ok(v)
                }
            })
            .unwrap();
        assert!(out.get_attribute("id").unwrap().is_unknown());
        assert_eq!(out.get_attribute("n"), Some(&Value::number(1)));
    }

    #[test]
    fn test_transform_rejects_type_change() {
        let value = Value::object([("n", Value::number(1))]);
        let result = value.transform(|path, v| {
            if path.is_root() {
                Ok(v)
            } else {
                Ok(Value::string("x"))
            }
        });
        assert!(matches!(result, Err(ProviderError::TypeMismatch(_))));
    }

    #[test]
    fn test_display() {
        let value = Value::object([
            ("id", Value::unknown(Type::String)),
            ("tags", Value::map(Type::String, [("env", Value::string("prod"))]).unwrap()),
        ]);
        assert_eq!(value.to_string(), "{id = (unknown), tags = {env = \"prod\"}}");
    }
}
