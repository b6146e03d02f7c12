//! Translation between attribute values and typed domain values.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AttrMap, AttrSet, AttrValue};
use crate::error::{ProviderError, Result};
use crate::schema::{AttrType, Schema};

/// A domain value that can be built from, and rendered into, an attribute value.
pub trait AttrCodec: Sized {
    fn decode(value: &AttrValue, path: &str) -> Result<Self>;

    fn encode(&self) -> AttrValue;
}

impl AttrCodec for String {
    fn decode(value: &AttrValue, path: &str) -> Result<Self> {
        match value {
            AttrValue::String(s) => Ok(s.clone()),
            AttrValue::Null => Ok(String::new()),
            other => Err(mismatch(path, "string", other)),
        }
    }

    fn encode(&self) -> AttrValue {
        AttrValue::String(self.clone())
    }
}

impl AttrCodec for bool {
    fn decode(value: &AttrValue, path: &str) -> Result<Self> {
        match value {
            AttrValue::Bool(b) => Ok(*b),
            AttrValue::Null => Ok(false),
            other => Err(mismatch(path, "bool", other)),
        }
    }

    fn encode(&self) -> AttrValue {
        AttrValue::Bool(*self)
    }
}

impl AttrCodec for i64 {
    fn decode(value: &AttrValue, path: &str) -> Result<Self> {
        match value {
            AttrValue::Int(i) => Ok(*i),
            AttrValue::Null => Ok(0),
            other => Err(mismatch(path, "int", other)),
        }
    }

    fn encode(&self) -> AttrValue {
        AttrValue::Int(*self)
    }
}

impl<T: AttrCodec> AttrCodec for Option<T> {
    fn decode(value: &AttrValue, path: &str) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::decode(value, path).map(Some)
        }
    }

    fn encode(&self) -> AttrValue {
        match self {
            Some(v) => v.encode(),
            None => AttrValue::Null,
        }
    }
}

/// Ordered list, order preserved.
impl AttrCodec for Vec<String> {
    fn decode(value: &AttrValue, path: &str) -> Result<Self> {
        value
            .elements()
            .into_iter()
            .enumerate()
            .map(|(i, v)| String::decode(v, &format!("{path}.{i}")))
            .collect()
    }

    fn encode(&self) -> AttrValue {
        AttrValue::string_list(self.iter().cloned())
    }
}

/// Unordered set of scalars.
impl AttrCodec for BTreeSet<String> {
    fn decode(value: &AttrValue, path: &str) -> Result<Self> {
        value
            .elements()
            .into_iter()
            .map(|v| String::decode(v, path))
            .collect()
    }

    fn encode(&self) -> AttrValue {
        AttrValue::string_set(self.iter().cloned())
    }
}

impl AttrCodec for BTreeMap<String, String> {
    fn decode(value: &AttrValue, path: &str) -> Result<Self> {
        match value {
            AttrValue::Map(m) => Ok(m.clone()),
            AttrValue::Null => Ok(BTreeMap::new()),
            other => Err(mismatch(path, "map", other)),
        }
    }

    fn encode(&self) -> AttrValue {
        AttrValue::Map(self.clone())
    }
}

/// A `{name, value}` pair as expected by services that take environment lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// Materialise a map as a name-sorted environment list.
pub fn env_vars(map: &BTreeMap<String, String>) -> Vec<EnvVar> {
    map.iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: value.clone(),
        })
        .collect()
}

pub fn env_map(vars: &[EnvVar]) -> BTreeMap<String, String> {
    vars.iter()
        .map(|v| (v.name.clone(), v.value.clone()))
        .collect()
}

/// The last block of a max-1 block attribute.
pub fn decode_block<T: AttrCodec>(value: &AttrValue, path: &str) -> Result<Option<T>> {
    match value.elements().last() {
        Some(last) => T::decode(last, &format!("{path}.0")).map(Some),
        None => Ok(None),
    }
}

/// Every block of a block attribute, in order.
pub fn decode_blocks<T: AttrCodec>(value: &AttrValue, path: &str) -> Result<Vec<T>> {
    value
        .elements()
        .into_iter()
        .enumerate()
        .map(|(i, v)| T::decode(v, &format!("{path}.{i}")))
        .collect()
}

/// Borrow the map behind a block element.
pub fn block_fields<'a>(value: &'a AttrValue, path: &str) -> Result<&'a AttrMap> {
    value
        .as_block()
        .ok_or_else(|| mismatch(path, "block", value))
}

/// Field of a block, Null when absent.
pub fn field<'a>(block: &'a AttrMap, name: &str) -> &'a AttrValue {
    block.get(name).unwrap_or(&super::NULL)
}

fn mismatch(path: &str, expected: &str, actual: &AttrValue) -> ProviderError {
    ProviderError::codec(path, format!("expected {expected}, got {}", actual.to_json()))
}

/// Build an attribute value from JSON using the declared type.
pub fn from_json(value: &Value, ty: &AttrType, path: &str) -> Result<AttrValue> {
    if value.is_null() {
        return Ok(AttrValue::Null);
    }
    let err = || ProviderError::codec(path, format!("expected {ty}, got {value}"));
    Ok(match ty {
        AttrType::String => match value {
            Value::String(s) => AttrValue::String(s.clone()),
            Value::Number(n) => AttrValue::String(n.to_string()),
            Value::Bool(b) => AttrValue::String(b.to_string()),
            _ => return Err(err()),
        },
        AttrType::Int => match value {
            Value::Number(n) => AttrValue::Int(n.as_i64().ok_or_else(err)?),
            Value::String(s) => AttrValue::Int(s.parse().map_err(|_| err())?),
            _ => return Err(err()),
        },
        AttrType::Float => match value {
            Value::Number(n) => AttrValue::Float(n.as_f64().ok_or_else(err)?),
            _ => return Err(err()),
        },
        AttrType::Bool => match value {
            Value::Bool(b) => AttrValue::Bool(*b),
            Value::String(s) => AttrValue::Bool(s.parse().map_err(|_| err())?),
            _ => return Err(err()),
        },
        AttrType::List(inner) => AttrValue::List(
            array(value, path)?
                .iter()
                .enumerate()
                .map(|(i, v)| from_json(v, inner, &format!("{path}.{i}")))
                .collect::<Result<_>>()?,
        ),
        AttrType::Set(inner) => AttrValue::Set(
            array(value, path)?
                .iter()
                .map(|v| from_json(v, inner, path))
                .collect::<Result<AttrSet>>()?,
        ),
        AttrType::Map => {
            let obj = value.as_object().ok_or_else(err)?;
            AttrValue::Map(
                obj.iter()
                    .map(|(k, v)| {
                        let s = match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (k.clone(), s)
                    })
                    .collect(),
            )
        }
        AttrType::Block(schema, _) => {
            // a single object is accepted as a one-element block list
            let items: Vec<&Value> = match value {
                Value::Array(items) => items.iter().collect(),
                Value::Object(_) => vec![value],
                _ => return Err(err()),
            };
            AttrValue::List(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| block_from_json(v, schema, &format!("{path}.{i}")))
                    .collect::<Result<_>>()?,
            )
        }
    })
}

fn array<'a>(value: &'a Value, path: &str) -> Result<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| ProviderError::codec(path, format!("expected a list, got {value}")))
}

fn block_from_json(value: &Value, schema: &Schema, path: &str) -> Result<AttrValue> {
    let obj = value
        .as_object()
        .ok_or_else(|| ProviderError::codec(path, format!("expected a block, got {value}")))?;
    let mut block = AttrMap::new();
    for (name, attr) in schema.attributes() {
        let v = obj.get(*name).unwrap_or(&Value::Null);
        block.insert(
            name.to_string(),
            from_json(v, &attr.ty, &format!("{path}.{name}"))?,
        );
    }
    Ok(AttrValue::Block(block))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use serde_json::json;

    #[derive(Debug, PartialEq)]
    struct Cors {
        origins: BTreeSet<String>,
        max_age: i64,
    }

    impl AttrCodec for Cors {
        fn decode(value: &AttrValue, path: &str) -> Result<Self> {
            let b = block_fields(value, path)?;
            Ok(Self {
                origins: AttrCodec::decode(field(b, "allowed_origins"), path)?,
                max_age: AttrCodec::decode(field(b, "max_age_seconds"), path)?,
            })
        }

        fn encode(&self) -> AttrValue {
            AttrValue::Block(AttrMap::from([
                ("allowed_origins".to_string(), self.origins.encode()),
                ("max_age_seconds".to_string(), self.max_age.encode()),
            ]))
        }
    }

    #[test]
    fn test_block_codec_keeps_last_element() {
        let first = Cors {
            origins: BTreeSet::from(["a".to_string()]),
            max_age: 1,
        };
        let last = Cors {
            origins: BTreeSet::from(["b".to_string(), "c".to_string()]),
            max_age: 60,
        };
        let value = AttrValue::List(vec![first.encode(), last.encode()]);
        let decoded: Option<Cors> = decode_block(&value, "cors_configuration").unwrap();
        assert_eq!(decoded, Some(last));
        assert_eq!(decode_blocks::<Cors>(&value, "cors").unwrap().len(), 2);
    }

    #[test]
    fn test_env_var_materialisation() {
        let map = BTreeMap::from([
            ("B".to_string(), "2".to_string()),
            ("A".to_string(), "1".to_string()),
        ]);
        let vars = env_vars(&map);
        assert_eq!(vars[0].name, "A");
        assert_eq!(env_map(&vars), map);
    }

    #[test]
    fn test_from_json_is_type_directed() {
        let schema = Schema::new(0)
            .attr("common_name", Attribute::string())
            .attr("ttl", Attribute::string());
        let ty = AttrType::Block(Box::new(schema), 1);
        let value = from_json(&json!([{"common_name": "x"}]), &ty, "ca").unwrap();
        let blocks = value.elements();
        let ca = blocks[0].as_block().unwrap();
        assert_eq!(ca["common_name"], AttrValue::from("x"));
        assert!(ca["ttl"].is_null());

        let set = from_json(
            &json!(["a", "b", "a"]),
            &AttrType::Set(Box::new(AttrType::String)),
            "users",
        )
        .unwrap();
        assert_eq!(set.elements().len(), 2);

        let err = from_json(&json!("x"), &AttrType::Int, "validity").unwrap_err();
        assert!(err.to_string().starts_with("validity"));
    }
}
