//! FHIR datatypes managed through resource attributes.

use serde_json::{Map, Value, json};

use crate::attr::codec::{AttrCodec, block_fields, field};
use crate::attr::{AttrMap, AttrValue};
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identifier {
    pub system: String,
    pub value: String,
    pub use_: String,
}

impl Identifier {
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        put_str(&mut obj, "system", &self.system);
        put_str(&mut obj, "value", &self.value);
        put_str(&mut obj, "use", &self.use_);
        Value::Object(obj)
    }

    pub fn from_json(value: &Value) -> Self {
        Self {
            system: str_field(value, "system"),
            value: str_field(value, "value"),
            use_: str_field(value, "use"),
        }
    }

    /// Same system and value.
    pub fn same_as(&self, other: &Identifier) -> bool {
        self.system == other.system && self.value == other.value
    }
}

impl AttrCodec for Identifier {
    fn decode(value: &AttrValue, path: &str) -> Result<Self> {
        let block = block_fields(value, path)?;
        Ok(Self {
            system: String::decode(field(block, "system"), &format!("{path}.system"))?,
            value: String::decode(field(block, "value"), &format!("{path}.value"))?,
            use_: String::decode(field(block, "use"), &format!("{path}.use"))?,
        })
    }

    fn encode(&self) -> AttrValue {
        let mut block = AttrMap::new();
        block.insert("system".to_string(), self.system.encode());
        block.insert("value".to_string(), self.value.encode());
        block.insert("use".to_string(), self.use_.encode());
        AttrValue::Block(block)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HumanName {
    pub text: String,
    pub family: String,
    pub given: Vec<String>,
    pub prefix: Vec<String>,
}

impl HumanName {
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        put_str(&mut obj, "text", &self.text);
        put_str(&mut obj, "family", &self.family);
        if !self.given.is_empty() {
            obj.insert("given".to_string(), json!(self.given));
        }
        if !self.prefix.is_empty() {
            obj.insert("prefix".to_string(), json!(self.prefix));
        }
        Value::Object(obj)
    }

    pub fn from_json(value: &Value) -> Self {
        Self {
            text: str_field(value, "text"),
            family: str_field(value, "family"),
            given: str_list(value, "given"),
            prefix: str_list(value, "prefix"),
        }
    }
}

impl AttrCodec for HumanName {
    fn decode(value: &AttrValue, path: &str) -> Result<Self> {
        let block = block_fields(value, path)?;
        Ok(Self {
            text: String::decode(field(block, "text"), &format!("{path}.text"))?,
            family: String::decode(field(block, "family"), &format!("{path}.family"))?,
            given: Vec::<String>::decode(field(block, "given"), &format!("{path}.given"))?,
            prefix: Vec::<String>::decode(field(block, "prefix"), &format!("{path}.prefix"))?,
        })
    }

    fn encode(&self) -> AttrValue {
        let mut block = AttrMap::new();
        block.insert("text".to_string(), self.text.encode());
        block.insert("family".to_string(), self.family.encode());
        block.insert("given".to_string(), self.given.encode());
        block.insert("prefix".to_string(), self.prefix.encode());
        AttrValue::Block(block)
    }
}

/// `meta.versionId` and `meta.lastUpdated` of a stored resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Meta {
    pub version_id: String,
    pub last_updated: String,
}

impl Meta {
    pub fn from_resource(resource: &Value) -> Self {
        let meta = resource.get("meta").unwrap_or(&Value::Null);
        Self {
            version_id: str_field(meta, "versionId"),
            last_updated: str_field(meta, "lastUpdated"),
        }
    }
}

pub fn identifiers(resource: &Value) -> Vec<Identifier> {
    array(resource, "identifier")
        .iter()
        .map(Identifier::from_json)
        .collect()
}

pub fn names(resource: &Value) -> Vec<HumanName> {
    array(resource, "name").iter().map(HumanName::from_json).collect()
}

/// Replace (or remove, when empty) an array element of a resource.
pub fn set_array(resource: &mut Value, key: &str, items: Vec<Value>) {
    if let Value::Object(obj) = resource {
        if items.is_empty() {
            obj.remove(key);
        } else {
            obj.insert(key.to_string(), Value::Array(items));
        }
    }
}

/// Replace (or remove, when empty) a string element of a resource.
pub fn set_string(resource: &mut Value, key: &str, value: &str) {
    if let Value::Object(obj) = resource {
        if value.is_empty() {
            obj.remove(key);
        } else {
            obj.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
}

pub fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn str_list(value: &Value, key: &str) -> Vec<String> {
    array(value, key)
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

fn array<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn put_str(obj: &mut Map<String, Value>, key: &str, value: &str) {
    if !value.is_empty() {
        obj.insert(key.to_string(), Value::String(value.to_string()));
    }
}
