//! The host's loosely-typed attribute bag.
//!
//! Everything the host hands the provider (configuration, prior state) and
//! everything the provider hands back is an [`AttrMap`]. Typed domain values
//! are built from it through [`codec::AttrCodec`] and nowhere else.

pub mod codec;
pub mod suppress;

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};

pub use codec::AttrCodec;
pub use suppress::DiffSuppress;

/// Attribute name to value.
pub type AttrMap = BTreeMap<String, AttrValue>;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AttrValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Ordered list
    List(Vec<AttrValue>),
    /// Unordered set without duplicates
    Set(AttrSet),
    /// String to string map
    Map(BTreeMap<String, String>),
    /// One nested block instance
    Block(AttrMap),
}

pub(crate) static NULL: AttrValue = AttrValue::Null;

impl AttrValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    /// Null, empty string or empty collection.
    pub fn is_empty(&self) -> bool {
        match self {
            AttrValue::Null => true,
            AttrValue::String(s) => s.is_empty(),
            AttrValue::List(l) => l.is_empty(),
            AttrValue::Set(s) => s.is_empty(),
            AttrValue::Map(m) => m.is_empty(),
            AttrValue::Block(b) => b.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttrValue::Float(f) => Some(*f),
            AttrValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            AttrValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&AttrMap> {
        match self {
            AttrValue::Block(b) => Some(b),
            _ => None,
        }
    }

    /// Elements of a list or set; a single block counts as one element.
    pub fn elements(&self) -> Vec<&AttrValue> {
        match self {
            AttrValue::List(l) => l.iter().collect(),
            AttrValue::Set(s) => s.iter().collect(),
            AttrValue::Null => Vec::new(),
            other => vec![other],
        }
    }

    /// String elements of a list or set, skipping non-strings.
    pub fn strings(&self) -> Vec<String> {
        self.elements()
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    pub fn string_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AttrValue::List(items.into_iter().map(|s| AttrValue::String(s.into())).collect())
    }

    pub fn string_set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AttrValue::Set(items.into_iter().map(|s| AttrValue::String(s.into())).collect())
    }

    /// List holding one block per map.
    pub fn blocks<I>(blocks: I) -> Self
    where
        I: IntoIterator<Item = AttrMap>,
    {
        AttrValue::List(blocks.into_iter().map(AttrValue::Block).collect())
    }

    /// Untyped JSON rendering; keys come out sorted.
    pub fn to_json(&self) -> Value {
        match self {
            AttrValue::Null => Value::Null,
            AttrValue::Bool(b) => Value::Bool(*b),
            AttrValue::Int(i) => Value::Number((*i).into()),
            AttrValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            AttrValue::String(s) => Value::String(s.clone()),
            AttrValue::List(l) => Value::Array(l.iter().map(AttrValue::to_json).collect()),
            AttrValue::Set(s) => Value::Array(s.iter().map(AttrValue::to_json).collect()),
            AttrValue::Map(m) => Value::Object(
                m.iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
            AttrValue::Block(b) => Value::Object(map_to_json(b)),
        }
    }

    /// SHA-256 of the canonical JSON form, hex encoded.
    pub fn content_hash(&self) -> String {
        let canonical = canonical_json(&self.to_json());
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }
}

pub(crate) fn map_to_json(map: &AttrMap) -> Map<String, Value> {
    map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
}

/// JSON text with object keys sorted at every level.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(obj) => {
            let sorted: BTreeMap<&String, String> =
                obj.iter().map(|(k, v)| (k, canonical_json(v))).collect();
            let fields: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}:{v}", Value::String(k.clone())))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::String(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::String(value)
    }
}

impl From<&String> for AttrValue {
    fn from(value: &String) -> Self {
        AttrValue::String(value.clone())
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Int(value.into())
    }
}

impl From<u32> for AttrValue {
    fn from(value: u32) -> Self {
        AttrValue::Int(value.into())
    }
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(AttrValue::Null)
    }
}

impl From<AttrSet> for AttrValue {
    fn from(value: AttrSet) -> Self {
        AttrValue::Set(value)
    }
}

impl From<AttrMap> for AttrValue {
    fn from(value: AttrMap) -> Self {
        AttrValue::Block(value)
    }
}

/// Unordered collection keyed by element content hash.
///
/// Inserting an element equal to an existing one is a no-op, and two sets
/// holding the same elements compare equal regardless of insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttrSet {
    items: BTreeMap<String, AttrValue>,
}

impl AttrSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when an equal element was already present.
    pub fn insert(&mut self, value: AttrValue) -> bool {
        let key = value.content_hash();
        if self.items.contains_key(&key) {
            return false;
        }
        self.items.insert(key, value);
        true
    }

    pub fn contains(&self, value: &AttrValue) -> bool {
        self.items.contains_key(&value.content_hash())
    }

    pub fn remove(&mut self, value: &AttrValue) -> bool {
        self.items.remove(&value.content_hash()).is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Elements in hash order.
    pub fn iter(&self) -> impl Iterator<Item = &AttrValue> {
        self.items.values()
    }

    /// Elements of `self` missing from `other`.
    pub fn difference<'a>(&'a self, other: &'a AttrSet) -> impl Iterator<Item = &'a AttrValue> {
        self.items
            .iter()
            .filter(|(k, _)| !other.items.contains_key(*k))
            .map(|(_, v)| v)
    }
}

impl FromIterator<AttrValue> for AttrSet {
    fn from_iter<I: IntoIterator<Item = AttrValue>>(iter: I) -> Self {
        let mut set = AttrSet::new();
        for value in iter {
            set.insert(value);
        }
        set
    }
}

impl IntoIterator for AttrSet {
    type Item = AttrValue;
    type IntoIter = std::collections::btree_map::IntoValues<String, AttrValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(pairs: &[(&str, AttrValue)]) -> AttrValue {
        AttrValue::Block(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_set_ignores_duplicates_and_order() {
        let a: AttrSet = ["x", "y", "x"].into_iter().map(AttrValue::from).collect();
        let b: AttrSet = ["y", "x"].into_iter().map(AttrValue::from).collect();
        assert_eq!(a.len(), 2);
        assert_eq!(a, b);
    }

    #[test]
    fn test_block_hash_is_key_order_independent() {
        let first = block(&[("effect", "Allow".into()), ("action", "GET".into())]);
        let second = block(&[("action", "GET".into()), ("effect", "Allow".into())]);
        assert_eq!(first.content_hash(), second.content_hash());

        let other = block(&[("effect", "Deny".into()), ("action", "GET".into())]);
        assert_ne!(first.content_hash(), other.content_hash());
    }

    #[test]
    fn test_set_difference() {
        let old: AttrSet = ["a", "d"].into_iter().map(AttrValue::from).collect();
        let new: AttrSet = ["a", "b", "c"].into_iter().map(AttrValue::from).collect();
        let removed: Vec<_> = old.difference(&new).filter_map(|v| v.as_str()).collect();
        assert_eq!(removed, vec!["d"]);
        assert_eq!(new.difference(&old).count(), 2);
    }

    #[test]
    fn test_strings_and_emptiness() {
        let list = AttrValue::string_list(["b", "a"]);
        assert_eq!(list.strings(), vec!["b", "a"]);
        assert!(AttrValue::String(String::new()).is_empty());
        assert!(!AttrValue::Bool(false).is_empty());
        assert_eq!(AttrValue::from(None::<String>), AttrValue::Null);
    }
}
