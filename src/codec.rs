//! Schema-typed wire codec for dynamic values.
//!
//! Values cross the wire as [`DynamicValue`](generated::DynamicValue)s whose
//! bytes only make sense against the schema of the addressed type name.
//! Encoding always produces msgpack; decoding prefers msgpack and falls back
//! to JSON when the msgpack payload is empty.
//!
//! Msgpack layout:
//!
//! - null is `nil`, unknown is the fixext1 extension of type 0
//! - numbers are integers when integral, float64 otherwise; numeric strings
//!   are accepted when decoding
//! - lists, sets and tuples are arrays; maps and objects are string-keyed maps
//! - objects must not carry undeclared attributes; missing ones decode as null

use std::collections::{BTreeMap, HashMap};

use serde_json::Number;

use crate::error::ProviderError;
use crate::generated;
use crate::path::{AttributePath, PathStep};
use crate::schema::{IdentitySchema, Schema};
use crate::types::Type;
use crate::value::{Raw, Value};

const UNKNOWN_EXT_TYPE: i8 = 0;

/// Decode a dynamic value against `schema`.
///
/// An absent payload decodes to a null value of the schema's type.
pub fn decode(
    schema: Option<&Schema>,
    encoded: Option<&generated::DynamicValue>,
) -> Result<Value, ProviderError> {
    let schema = schema.ok_or_else(|| ProviderError::decode("no schema to decode against"))?;
    decode_typed(&schema.value_type(), encoded)
}

/// Encode `value` as msgpack against `schema`.
pub fn encode(
    schema: Option<&Schema>,
    value: &Value,
) -> Result<generated::DynamicValue, ProviderError> {
    let schema = schema.ok_or_else(|| ProviderError::encode("no schema to encode against"))?;
    encode_typed(&schema.value_type(), value)
}

/// Decode identity data against an identity schema.
///
/// Absent identity data stays `None`; identity data without a schema is an
/// error.
pub fn decode_identity(
    schema: Option<&IdentitySchema>,
    data: Option<&generated::ResourceIdentityData>,
) -> Result<Option<Value>, ProviderError> {
    let Some(data) = data else {
        return Ok(None);
    };
    let schema =
        schema.ok_or_else(|| ProviderError::decode("resource type has no identity schema"))?;
    decode_typed(&schema.value_type(), data.identity_data.as_ref()).map(Some)
}

/// Encode an identity value against an identity schema.
pub fn encode_identity(
    schema: Option<&IdentitySchema>,
    value: Option<&Value>,
) -> Result<Option<generated::ResourceIdentityData>, ProviderError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let schema =
        schema.ok_or_else(|| ProviderError::encode("resource type has no identity schema"))?;
    Ok(Some(generated::ResourceIdentityData {
        identity_data: Some(encode_typed(&schema.value_type(), value)?),
    }))
}

/// Decode a dynamic value against a type.
pub fn decode_typed(
    ty: &Type,
    encoded: Option<&generated::DynamicValue>,
) -> Result<Value, ProviderError> {
    let Some(encoded) = encoded else {
        return Ok(Value::null(ty.clone()));
    };
    if !encoded.msgpack.is_empty() {
        from_msgpack(ty, &encoded.msgpack)
    } else if !encoded.json.is_empty() {
        let json: serde_json::Value = serde_json::from_slice(&encoded.json)
            .map_err(|e| ProviderError::decode(format!("invalid JSON: {}", e)))?;
        from_json(ty, &json)
    } else {
        Err(ProviderError::decode(
            "dynamic value carries neither msgpack nor JSON",
        ))
    }
}

/// Encode a value as msgpack. The value's type must equal `ty`.
pub fn encode_typed(ty: &Type, value: &Value) -> Result<generated::DynamicValue, ProviderError> {
    if value.ty() != ty {
        return Err(ProviderError::encode(format!(
            "value of type {} does not conform to {}",
            value.ty(),
            ty
        )));
    }
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &to_msgpack_value(value))
        .map_err(|e| ProviderError::encode(format!("msgpack write failed: {}", e)))?;
    Ok(generated::DynamicValue {
        msgpack: buf,
        json: Vec::new(),
    })
}

/// Decode msgpack bytes against a type. Trailing bytes are rejected.
pub fn from_msgpack(ty: &Type, bytes: &[u8]) -> Result<Value, ProviderError> {
    let mut rd = bytes;
    let raw = rmpv::decode::read_value(&mut rd)
        .map_err(|e| ProviderError::decode(format!("invalid msgpack: {}", e)))?;
    if !rd.is_empty() {
        return Err(ProviderError::decode(format!(
            "{} trailing bytes after msgpack value",
            rd.len()
        )));
    }
    let mut path = AttributePath::root();
    msgpack_to_value(ty, &raw, &mut path)
}

/// Build a value of type `ty` from JSON.
///
/// JSON has no representation for unknown, so the result is always fully
/// known.
pub fn from_json(ty: &Type, json: &serde_json::Value) -> Result<Value, ProviderError> {
    let mut path = AttributePath::root();
    json_to_value(ty, json, &mut path)
}

fn at(path: &AttributePath) -> String {
    if path.is_root() {
        "root".to_string()
    } else {
        path.to_string()
    }
}

fn mismatch(path: &AttributePath, ty: &Type, got: &str) -> ProviderError {
    ProviderError::decode(format!("at {}: expected {}, got {}", at(path), ty, got))
}

fn parse_number(s: &str) -> Option<Number> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(i.into());
    }
    if let Ok(u) = s.parse::<u64>() {
        return Some(u.into());
    }
    s.parse::<f64>().ok().and_then(Number::from_f64)
}

fn to_msgpack_value(value: &Value) -> rmpv::Value {
    if value.is_unknown() {
        return rmpv::Value::Ext(UNKNOWN_EXT_TYPE, vec![0]);
    }
    match value.raw() {
        None => rmpv::Value::Nil,
        Some(Raw::String(s)) => rmpv::Value::from(s.as_str()),
        Some(Raw::Bool(b)) => rmpv::Value::Boolean(*b),
        Some(Raw::Number(n)) => {
            if let Some(i) = n.as_i64() {
                rmpv::Value::from(i)
            } else if let Some(u) = n.as_u64() {
                rmpv::Value::from(u)
            } else {
                rmpv::Value::F64(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Some(Raw::List(elements)) => {
            rmpv::Value::Array(elements.iter().map(to_msgpack_value).collect())
        }
        Some(Raw::Map(entries)) => rmpv::Value::Map(
            entries
                .iter()
                .map(|(k, v)| (rmpv::Value::from(k.as_str()), to_msgpack_value(v)))
                .collect(),
        ),
    }
}

fn msgpack_kind(raw: &rmpv::Value) -> &'static str {
    match raw {
        rmpv::Value::Nil => "nil",
        rmpv::Value::Boolean(_) => "bool",
        rmpv::Value::Integer(_) => "integer",
        rmpv::Value::F32(_) | rmpv::Value::F64(_) => "float",
        rmpv::Value::String(_) => "string",
        rmpv::Value::Binary(_) => "binary",
        rmpv::Value::Array(_) => "array",
        rmpv::Value::Map(_) => "map",
        rmpv::Value::Ext(_, _) => "extension",
    }
}

fn msgpack_to_value(
    ty: &Type,
    raw: &rmpv::Value,
    path: &mut AttributePath,
) -> Result<Value, ProviderError> {
    match raw {
        rmpv::Value::Nil => return Ok(Value::null(ty.clone())),
        rmpv::Value::Ext(UNKNOWN_EXT_TYPE, _) => return Ok(Value::unknown(ty.clone())),
        _ => {}
    }

    let raw_value = match (ty, raw) {
        (Type::String, rmpv::Value::String(s)) => Raw::String(
            s.as_str()
                .ok_or_else(|| mismatch(path, ty, "invalid UTF-8 string"))?
                .to_string(),
        ),
        (Type::Number, rmpv::Value::Integer(i)) => match (i.as_i64(), i.as_u64()) {
            (Some(v), _) => Raw::Number(v.into()),
            (None, Some(v)) => Raw::Number(v.into()),
            (None, None) => return Err(mismatch(path, ty, "out of range integer")),
        },
        (Type::Number, rmpv::Value::F32(f)) => Raw::Number(
            Number::from_f64(f64::from(*f)).ok_or_else(|| mismatch(path, ty, "non-finite float"))?,
        ),
        (Type::Number, rmpv::Value::F64(f)) => Raw::Number(
            Number::from_f64(*f).ok_or_else(|| mismatch(path, ty, "non-finite float"))?,
        ),
        (Type::Number, rmpv::Value::String(s)) => Raw::Number(
            s.as_str()
                .and_then(parse_number)
                .ok_or_else(|| mismatch(path, ty, "non-numeric string"))?,
        ),
        (Type::Bool, rmpv::Value::Boolean(b)) => Raw::Bool(*b),
        (Type::List(elem) | Type::Set(elem), rmpv::Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                path.push(PathStep::ElementKeyInt(i as i64));
                let decoded = msgpack_to_value(elem, item, path);
                path.pop();
                out.push(decoded?);
            }
            Raw::List(out)
        }
        (Type::Tuple(types), rmpv::Value::Array(items)) => {
            if types.len() != items.len() {
                return Err(mismatch(
                    path,
                    ty,
                    &format!("array of {} elements", items.len()),
                ));
            }
            let mut out = Vec::with_capacity(items.len());
            for (i, (elem, item)) in types.iter().zip(items).enumerate() {
                path.push(PathStep::ElementKeyInt(i as i64));
                let decoded = msgpack_to_value(elem, item, path);
                path.pop();
                out.push(decoded?);
            }
            Raw::List(out)
        }
        (Type::Map(elem), rmpv::Value::Map(pairs)) => {
            let mut out = BTreeMap::new();
            for (key, item) in pairs {
                let key = msgpack_key(key, path, ty)?;
                path.push(PathStep::ElementKeyString(key.clone()));
                let decoded = msgpack_to_value(elem, item, path);
                path.pop();
                out.insert(key, decoded?);
            }
            Raw::Map(out)
        }
        (Type::Object(attrs), rmpv::Value::Map(pairs)) => {
            let mut out = BTreeMap::new();
            for (key, item) in pairs {
                let key = msgpack_key(key, path, ty)?;
                let attr_type = attrs.get(&key).ok_or_else(|| {
                    ProviderError::decode(format!(
                        "at {}: unsupported attribute {:?}",
                        at(path),
                        key
                    ))
                })?;
                path.push(PathStep::AttributeName(key.clone()));
                let decoded = msgpack_to_value(attr_type, item, path);
                path.pop();
                out.insert(key, decoded?);
            }
            for (name, attr_type) in attrs.iter() {
                out.entry(name.clone())
                    .or_insert_with(|| Value::null(attr_type.clone()));
            }
            Raw::Map(out)
        }
        (_, other) => return Err(mismatch(path, ty, msgpack_kind(other))),
    };

    Value::new(ty.clone(), raw_value)
}

fn msgpack_key(
    key: &rmpv::Value,
    path: &AttributePath,
    ty: &Type,
) -> Result<String, ProviderError> {
    match key {
        rmpv::Value::String(s) => s
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch(path, ty, "invalid UTF-8 key")),
        other => Err(mismatch(
            path,
            ty,
            &format!("{} map key", msgpack_kind(other)),
        )),
    }
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn json_to_value(
    ty: &Type,
    json: &serde_json::Value,
    path: &mut AttributePath,
) -> Result<Value, ProviderError> {
    use serde_json::Value as Json;

    let raw_value = match (ty, json) {
        (_, Json::Null) => return Ok(Value::null(ty.clone())),
        (Type::String, Json::String(s)) => Raw::String(s.clone()),
        (Type::Number, Json::Number(n)) => Raw::Number(n.clone()),
        (Type::Number, Json::String(s)) => Raw::Number(
            parse_number(s).ok_or_else(|| mismatch(path, ty, "non-numeric string"))?,
        ),
        (Type::Bool, Json::Bool(b)) => Raw::Bool(*b),
        (Type::List(elem) | Type::Set(elem), Json::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                path.push(PathStep::ElementKeyInt(i as i64));
                let decoded = json_to_value(elem, item, path);
                path.pop();
                out.push(decoded?);
            }
            Raw::List(out)
        }
        (Type::Tuple(types), Json::Array(items)) => {
            if types.len() != items.len() {
                return Err(mismatch(
                    path,
                    ty,
                    &format!("array of {} elements", items.len()),
                ));
            }
            let mut out = Vec::with_capacity(items.len());
            for (i, (elem, item)) in types.iter().zip(items).enumerate() {
                path.push(PathStep::ElementKeyInt(i as i64));
                let decoded = json_to_value(elem, item, path);
                path.pop();
                out.push(decoded?);
            }
            Raw::List(out)
        }
        (Type::Map(elem), Json::Object(entries)) => {
            let mut out = BTreeMap::new();
            for (key, item) in entries {
                path.push(PathStep::ElementKeyString(key.clone()));
                let decoded = json_to_value(elem, item, path);
                path.pop();
                out.insert(key.clone(), decoded?);
            }
            Raw::Map(out)
        }
        (Type::Object(attrs), Json::Object(entries)) => {
            let mut out = BTreeMap::new();
            for (key, item) in entries {
                let attr_type = attrs.get(key).ok_or_else(|| {
                    ProviderError::decode(format!(
                        "at {}: unsupported attribute {:?}",
                        at(path),
                        key
                    ))
                })?;
                path.push(PathStep::AttributeName(key.clone()));
                let decoded = json_to_value(attr_type, item, path);
                path.pop();
                out.insert(key.clone(), decoded?);
            }
            for (name, attr_type) in attrs.iter() {
                out.entry(name.clone())
                    .or_insert_with(|| Value::null(attr_type.clone()));
            }
            Raw::Map(out)
        }
        (_, other) => return Err(mismatch(path, ty, json_kind(other))),
    };

    Value::new(ty.clone(), raw_value)
}

/// Previously saved resource state, as stored by the client.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawState {
    /// JSON encoding of the state.
    pub json: Vec<u8>,
    /// Legacy flat key/value encoding.
    pub flatmap: HashMap<String, String>,
}

impl RawState {
    /// Raw state holding a JSON document.
    pub fn from_json(json: impl Into<Vec<u8>>) -> Self {
        Self {
            json: json.into(),
            flatmap: HashMap::new(),
        }
    }

    /// Unmarshal the JSON state against `ty`.
    ///
    /// Attributes not declared by `ty` are errors; declared attributes missing
    /// from the JSON become null. Empty state decodes to null. Flatmap state
    /// is not supported.
    pub fn unmarshal(&self, ty: &Type) -> Result<Value, ProviderError> {
        if self.json.is_empty() {
            if self.flatmap.is_empty() {
                return Ok(Value::null(ty.clone()));
            }
            return Err(ProviderError::decode("flatmap state is not supported"));
        }
        let json: serde_json::Value = serde_json::from_slice(&self.json)?;
        from_json(ty, &json)
    }
}

impl From<generated::RawState> for RawState {
    fn from(raw: generated::RawState) -> Self {
        Self {
            json: raw.json,
            flatmap: raw.flatmap,
        }
    }
}
