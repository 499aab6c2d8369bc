//! Type descriptors for the value tree.
//!
//! A [`Type`] describes the shape of a [`Value`](crate::value::Value). Composite
//! types hold their children behind an [`Arc`], so cloning a type is cheap and
//! a type can be shared between a schema and every value derived from it.
//!
//! On the wire, attribute types travel as JSON:
//!
//! ```text
//! "string"                                  primitive
//! ["list", "string"]                        list / set / map
//! ["object", {"name": "string"}]            object
//! ["tuple", ["string", "number"]]           tuple
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ProviderError;

/// The type of a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// A UTF-8 string.
    String,
    /// An arbitrary-precision number.
    Number,
    /// A boolean.
    Bool,
    /// An ordered sequence of elements of one type.
    List(Arc<Type>),
    /// An unordered collection of unique elements of one type.
    Set(Arc<Type>),
    /// A string-keyed map of elements of one type.
    Map(Arc<Type>),
    /// A fixed set of named attributes, each with its own type.
    Object(Arc<BTreeMap<String, Type>>),
    /// A fixed-length sequence with a type per position.
    Tuple(Arc<Vec<Type>>),
}

impl Type {
    /// Create a list type.
    pub fn list(element_type: Type) -> Self {
        Self::List(Arc::new(element_type))
    }

    /// Create a set type.
    pub fn set(element_type: Type) -> Self {
        Self::Set(Arc::new(element_type))
    }

    /// Create a map type.
    pub fn map(element_type: Type) -> Self {
        Self::Map(Arc::new(element_type))
    }

    /// Create an object type from `(name, type)` pairs.
    pub fn object<K, I>(attributes: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Type)>,
    {
        Self::Object(Arc::new(
            attributes
                .into_iter()
                .map(|(name, ty)| (name.into(), ty))
                .collect(),
        ))
    }

    /// Create a tuple type.
    pub fn tuple(element_types: impl IntoIterator<Item = Type>) -> Self {
        Self::Tuple(Arc::new(element_types.into_iter().collect()))
    }

    /// Returns true for string, number and bool.
    pub fn is_primitive(&self) -> bool {
        matches!(self, Self::String | Self::Number | Self::Bool)
    }

    /// Element type of a list, set or map.
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Self::List(ty) | Self::Set(ty) | Self::Map(ty) => Some(ty),
            _ => None,
        }
    }

    /// Attribute types of an object.
    pub fn attribute_types(&self) -> Option<&BTreeMap<String, Type>> {
        match self {
            Self::Object(attrs) => Some(attrs),
            _ => None,
        }
    }

    /// Element types of a tuple.
    pub fn tuple_types(&self) -> Option<&[Type]> {
        match self {
            Self::Tuple(types) => Some(types),
            _ => None,
        }
    }

    /// Encode this type as its JSON descriptor.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Self::String => Json::from("string"),
            Self::Number => Json::from("number"),
            Self::Bool => Json::from("bool"),
            Self::List(ty) => Json::Array(vec![Json::from("list"), ty.to_json()]),
            Self::Set(ty) => Json::Array(vec![Json::from("set"), ty.to_json()]),
            Self::Map(ty) => Json::Array(vec![Json::from("map"), ty.to_json()]),
            Self::Object(attrs) => {
                let attrs = attrs
                    .iter()
                    .map(|(name, ty)| (name.clone(), ty.to_json()))
                    .collect();
                Json::Array(vec![Json::from("object"), Json::Object(attrs)])
            }
            Self::Tuple(types) => Json::Array(vec![
                Json::from("tuple"),
                Json::Array(types.iter().map(Type::to_json).collect()),
            ]),
        }
    }

    /// Parse a JSON type descriptor.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, ProviderError> {
        use serde_json::Value as Json;

        match json {
            Json::String(name) => match name.as_str() {
                "string" => Ok(Self::String),
                "number" => Ok(Self::Number),
                "bool" => Ok(Self::Bool),
                other => Err(ProviderError::InvalidType(format!(
                    "unknown primitive type {:?}",
                    other
                ))),
            },
            Json::Array(parts) if parts.len() == 2 => {
                let kind = parts[0].as_str().ok_or_else(|| {
                    ProviderError::InvalidType("type kind must be a string".to_string())
                })?;
                let arg = &parts[1];
                match kind {
                    "list" => Ok(Self::list(Self::from_json(arg)?)),
                    "set" => Ok(Self::set(Self::from_json(arg)?)),
                    "map" => Ok(Self::map(Self::from_json(arg)?)),
                    "object" => {
                        let attrs = arg.as_object().ok_or_else(|| {
                            ProviderError::InvalidType(
                                "object attribute types must be a JSON object".to_string(),
                            )
                        })?;
                        let attrs = attrs
                            .iter()
                            .map(|(name, ty)| Ok((name.clone(), Self::from_json(ty)?)))
                            .collect::<Result<BTreeMap<_, _>, ProviderError>>()?;
                        Ok(Self::Object(Arc::new(attrs)))
                    }
                    "tuple" => {
                        let types = arg.as_array().ok_or_else(|| {
                            ProviderError::InvalidType(
                                "tuple element types must be a JSON array".to_string(),
                            )
                        })?;
                        let types = types
                            .iter()
                            .map(Self::from_json)
                            .collect::<Result<Vec<_>, _>>()?;
                        Ok(Self::Tuple(Arc::new(types)))
                    }
                    other => Err(ProviderError::InvalidType(format!(
                        "unknown type kind {:?}",
                        other
                    ))),
                }
            }
            other => Err(ProviderError::InvalidType(format!(
                "malformed type descriptor {}",
                other
            ))),
        }
    }

    /// Encode this type as JSON bytes, the form used in wire schemas.
    pub fn to_json_bytes(&self) -> Vec<u8> {
        self.to_json().to_string().into_bytes()
    }

    /// Parse a type from JSON bytes.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, ProviderError> {
        let json: serde_json::Value = serde_json::from_slice(bytes)?;
        Self::from_json(&json)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Number => f.write_str("number"),
            Self::Bool => f.write_str("bool"),
            Self::List(ty) => write!(f, "list({})", ty),
            Self::Set(ty) => write!(f, "set({})", ty),
            Self::Map(ty) => write!(f, "map({})", ty),
            Self::Object(attrs) => {
                f.write_str("object({")?;
                for (i, (name, ty)) in attrs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}={}", name, ty)?;
                }
                f.write_str("})")
            }
            Self::Tuple(types) => {
                f.write_str("tuple([")?;
                for (i, ty) in types.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", ty)?;
                }
                f.write_str("])")
            }
        }
    }
}

impl Serialize for Type {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Type {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Type::from_json(&json).map_err(serde::de::Error::custom)
    }
}
