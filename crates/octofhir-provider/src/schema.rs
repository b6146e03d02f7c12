//! Declarative resource schemas: attribute types, validation, defaults and plans.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::attr::codec::from_json;
use crate::attr::{AttrMap, AttrValue, DiffSuppress};
use crate::error::{Diagnostics, ProviderError, Result};

/// Value type of an attribute.
#[derive(Debug, Clone)]
pub enum AttrType {
    String,
    Int,
    Bool,
    Float,
    List(Box<AttrType>),
    Set(Box<AttrType>),
    Map,
    /// Nested block list; the second field is the maximum count, 0 for unbounded.
    Block(Box<Schema>, usize),
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrType::String => f.write_str("string"),
            AttrType::Int => f.write_str("int"),
            AttrType::Bool => f.write_str("bool"),
            AttrType::Float => f.write_str("float"),
            AttrType::List(inner) => write!(f, "list<{inner}>"),
            AttrType::Set(inner) => write!(f, "set<{inner}>"),
            AttrType::Map => f.write_str("map<string,string>"),
            AttrType::Block(_, _) => f.write_str("block"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Required,
    Optional,
    /// Set only by the provider
    Computed,
    /// Set by the user or, when omitted, by the provider
    OptionalComputed,
}

/// Extra value check; returns the message to report.
pub type Validator = fn(&AttrValue) -> std::result::Result<(), String>;

/// One attribute of a schema.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub ty: AttrType,
    pub presence: Presence,
    pub force_new: bool,
    pub sensitive: bool,
    pub default: Option<AttrValue>,
    pub min_items: usize,
    pub validate: Option<Validator>,
    pub suppress: Option<DiffSuppress>,
}

impl Attribute {
    pub fn new(ty: AttrType) -> Self {
        Self {
            ty,
            presence: Presence::Optional,
            force_new: false,
            sensitive: false,
            default: None,
            min_items: 0,
            validate: None,
            suppress: None,
        }
    }

    pub fn string() -> Self {
        Self::new(AttrType::String)
    }

    pub fn int() -> Self {
        Self::new(AttrType::Int)
    }

    pub fn bool() -> Self {
        Self::new(AttrType::Bool)
    }

    pub fn float() -> Self {
        Self::new(AttrType::Float)
    }

    pub fn map() -> Self {
        Self::new(AttrType::Map)
    }

    pub fn string_list() -> Self {
        Self::new(AttrType::List(Box::new(AttrType::String)))
    }

    pub fn string_set() -> Self {
        Self::new(AttrType::Set(Box::new(AttrType::String)))
    }

    /// Nested block list with at most `max` entries (0 = unbounded).
    pub fn block(schema: Schema, max: usize) -> Self {
        Self::new(AttrType::Block(Box::new(schema), max))
    }

    pub fn required(mut self) -> Self {
        self.presence = Presence::Required;
        self
    }

    pub fn computed(mut self) -> Self {
        self.presence = Presence::Computed;
        self
    }

    pub fn optional_computed(mut self) -> Self {
        self.presence = Presence::OptionalComputed;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn default(mut self, value: impl Into<AttrValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn min_items(mut self, n: usize) -> Self {
        self.min_items = n;
        self
    }

    pub fn validate(mut self, f: Validator) -> Self {
        self.validate = Some(f);
        self
    }

    pub fn suppress(mut self, rule: DiffSuppress) -> Self {
        self.suppress = Some(rule);
        self
    }

    pub fn is_computed(&self) -> bool {
        matches!(self.presence, Presence::Computed | Presence::OptionalComputed)
    }

    /// True when `old` to `new` is not a real change for this attribute.
    pub fn unchanged(&self, old: &AttrValue, new: &AttrValue) -> bool {
        if old == new || (old.is_empty() && new.is_empty()) {
            return true;
        }
        if self.presence == Presence::OptionalComputed && new.is_null() {
            return true;
        }
        self.suppress.is_some_and(|rule| rule.suppress(old, new))
    }
}

/// Attribute declarations of one resource kind (or nested block).
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub version: u32,
    attributes: BTreeMap<&'static str, Attribute>,
}

/// Changes the host would apply for a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// No prior state: the resource will be created
    pub create: bool,
    /// Attributes whose value changes
    pub changed: Vec<String>,
    /// Changed attributes that force destroy-then-create
    pub replace: Vec<String>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        !self.create && self.changed.is_empty()
    }

    pub fn requires_replace(&self) -> bool {
        !self.replace.is_empty()
    }
}

impl Schema {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            attributes: BTreeMap::new(),
        }
    }

    pub fn attr(mut self, name: &'static str, attribute: Attribute) -> Self {
        self.attributes.insert(name, attribute);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&&'static str, &Attribute)> {
        self.attributes.iter()
    }

    /// Check user configuration: unknown and computed-only keys, required
    /// attributes, value types, block counts and validators.
    pub fn validate_config(&self, config: &AttrMap) -> Diagnostics {
        let mut diags = Diagnostics::new();
        self.validate_into(config, "", &mut diags);
        diags
    }

    fn validate_into(&self, config: &AttrMap, prefix: &str, diags: &mut Diagnostics) {
        for key in config.keys() {
            if !self.attributes.contains_key(key.as_str()) {
                diags.error(join(prefix, key), "unsupported attribute");
            }
        }
        for (name, attr) in &self.attributes {
            let path = join(prefix, name);
            let value = config.get(*name).unwrap_or(&AttrValue::Null);
            if attr.presence == Presence::Computed {
                if !value.is_null() {
                    diags.error(path, "attribute is computed and cannot be set");
                }
                continue;
            }
            if value.is_null() {
                if attr.presence == Presence::Required && attr.default.is_none() {
                    diags.error(path, "required attribute is missing");
                }
                continue;
            }
            if let Err(msg) = check_type(value, &attr.ty) {
                diags.error(path, msg);
                continue;
            }
            let count = value.elements().len();
            if matches!(attr.ty, AttrType::List(_) | AttrType::Set(_) | AttrType::Block(_, _))
                && count < attr.min_items
            {
                diags.error(
                    path.clone(),
                    format!("at least {} item(s) required, got {count}", attr.min_items),
                );
            }
            if let AttrType::Block(schema, max) = &attr.ty {
                if *max > 0 && count > *max {
                    diags.error(
                        path.clone(),
                        format!("at most {max} block(s) allowed, got {count}"),
                    );
                }
                for (i, element) in value.elements().into_iter().enumerate() {
                    if let Some(block) = element.as_block() {
                        schema.validate_into(block, &format!("{path}.{i}"), diags);
                    }
                }
            }
            if let Some(check) = attr.validate
                && let Err(msg) = check(value)
            {
                diags.error(path, msg);
            }
        }
    }

    /// Fill missing attributes that declare a default, recursing into blocks.
    pub fn apply_defaults(&self, config: &mut AttrMap) {
        for (name, attr) in &self.attributes {
            let entry = config.entry(name.to_string()).or_insert(AttrValue::Null);
            if entry.is_null() {
                if let Some(default) = &attr.default {
                    *entry = default.clone();
                }
            } else if let AttrType::Block(schema, _) = &attr.ty {
                apply_block_defaults(entry, schema);
            }
        }
    }

    /// Carry computed values from `prior` into `config` where the user left
    /// them unset.
    pub fn merge_computed(&self, prior: &AttrMap, config: &mut AttrMap) {
        for (name, attr) in &self.attributes {
            if !attr.is_computed() {
                continue;
            }
            let Some(old) = prior.get(*name) else {
                continue;
            };
            let slot = config.entry(name.to_string()).or_insert(AttrValue::Null);
            if slot.is_null() {
                *slot = old.clone();
            }
        }
    }

    /// Diff prior state against (defaulted) configuration.
    pub fn plan(&self, prior: Option<&AttrMap>, config: &AttrMap) -> Plan {
        let Some(prior) = prior else {
            return Plan {
                create: true,
                changed: config
                    .iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, _)| k.clone())
                    .collect(),
                replace: Vec::new(),
            };
        };
        let mut plan = Plan::default();
        for (name, attr) in &self.attributes {
            if attr.presence == Presence::Computed {
                continue;
            }
            let old = prior.get(*name).unwrap_or(&AttrValue::Null);
            let new = config.get(*name).unwrap_or(&AttrValue::Null);
            if attr.unchanged(old, new) {
                continue;
            }
            plan.changed.push(name.to_string());
            if attr.force_new {
                plan.replace.push(name.to_string());
            }
        }
        plan
    }

    /// Decode persisted JSON attributes. Keys the schema does not know are dropped.
    pub fn decode_state(&self, json: &Map<String, Value>) -> Result<AttrMap> {
        let mut attrs = AttrMap::new();
        for (name, attr) in &self.attributes {
            let raw = json.get(*name).unwrap_or(&Value::Null);
            attrs.insert(name.to_string(), from_json(raw, &attr.ty, name)?);
        }
        for key in json.keys() {
            if !self.attributes.contains_key(key.as_str()) {
                tracing::debug!(attribute = %key, "dropping unknown state attribute");
            }
        }
        Ok(attrs)
    }

    /// Decode a user configuration given as JSON.
    pub fn decode_config(&self, json: &Map<String, Value>) -> Result<AttrMap> {
        let mut attrs = AttrMap::new();
        for (key, raw) in json {
            let Some(attr) = self.attributes.get(key.as_str()) else {
                return Err(ProviderError::validation(key.clone(), "unsupported attribute"));
            };
            attrs.insert(key.clone(), from_json(raw, &attr.ty, key)?);
        }
        Ok(attrs)
    }

    /// Render attributes for persistence, every schema key present.
    pub fn encode_state(&self, attrs: &AttrMap) -> Map<String, Value> {
        self.attributes
            .keys()
            .map(|name| {
                let value = attrs.get(*name).map(AttrValue::to_json).unwrap_or(Value::Null);
                (name.to_string(), value)
            })
            .collect()
    }
}

fn apply_block_defaults(value: &mut AttrValue, schema: &Schema) {
    match value {
        AttrValue::Block(block) => schema.apply_defaults(block),
        AttrValue::List(items) => items
            .iter_mut()
            .for_each(|item| apply_block_defaults(item, schema)),
        AttrValue::Set(set) => {
            let items: Vec<AttrValue> = std::mem::take(set)
                .into_iter()
                .map(|mut item| {
                    apply_block_defaults(&mut item, schema);
                    item
                })
                .collect();
            *set = items.into_iter().collect();
        }
        _ => {}
    }
}

fn check_type(value: &AttrValue, ty: &AttrType) -> std::result::Result<(), String> {
    let ok = match (ty, value) {
        (_, AttrValue::Null) => true,
        (AttrType::String, AttrValue::String(_))
        | (AttrType::Int, AttrValue::Int(_))
        | (AttrType::Bool, AttrValue::Bool(_))
        | (AttrType::Float, AttrValue::Float(_) | AttrValue::Int(_))
        | (AttrType::Map, AttrValue::Map(_)) => true,
        (AttrType::List(inner) | AttrType::Set(inner), AttrValue::List(_) | AttrValue::Set(_)) => {
            return value
                .elements()
                .into_iter()
                .try_for_each(|v| check_type(v, inner));
        }
        (AttrType::Block(_, _), AttrValue::List(_) | AttrValue::Set(_) | AttrValue::Block(_)) => {
            value.elements().iter().all(|v| v.as_block().is_some())
        }
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(format!("expected {ty}, got {}", value.to_json()))
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Validator: value is one of `allowed`.
#[macro_export]
macro_rules! one_of {
    ($($allowed:literal),+ $(,)?) => {{
        fn check(value: &$crate::attr::AttrValue) -> ::std::result::Result<(), String> {
            let allowed: &[&str] = &[$($allowed),+];
            match value.as_str() {
                Some(v) if allowed.contains(&v) => Ok(()),
                _ => Err(format!("must be one of {allowed:?}")),
            }
        }
        check as $crate::schema::Validator
    }};
}

pub fn validate_uuid(value: &AttrValue) -> std::result::Result<(), String> {
    match value.as_str() {
        Some(s) if octofhir_core::validate_uuid(s).is_ok() => Ok(()),
        _ => Err("must be a UUID".to_string()),
    }
}

pub fn validate_rfc3339(value: &AttrValue) -> std::result::Result<(), String> {
    match value.as_str() {
        Some(s) if octofhir_core::parse_rfc3339(s).is_ok() => Ok(()),
        _ => Err("must be an RFC3339 timestamp".to_string()),
    }
}

pub fn validate_non_empty(value: &AttrValue) -> std::result::Result<(), String> {
    if value.is_empty() {
        Err("must not be empty".to_string())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_schema() -> Schema {
        Schema::new(2)
            .attr(
                "name",
                Attribute::string()
                    .required()
                    .force_new()
                    .suppress(DiffSuppress::CaseInsensitive),
            )
            .attr("description", Attribute::string())
            .attr("users", Attribute::string_set())
            .attr("drift_detection", Attribute::bool().default(false))
            .attr("guid", Attribute::string().computed())
            .attr(
                "ca",
                Attribute::block(
                    Schema::new(0)
                        .attr("common_name", Attribute::string().required())
                        .attr("ttl", Attribute::string().default("8760h")),
                    1,
                ),
            )
    }

    fn config(pairs: &[(&str, AttrValue)]) -> AttrMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_validate_config_reports_paths() {
        let schema = group_schema();
        let cfg = config(&[
            ("description", AttrValue::Int(3)),
            ("guid", "set-by-user".into()),
            ("bogus", "x".into()),
        ]);
        let diags = schema.validate_config(&cfg);
        let attrs: Vec<_> = diags.errors().filter_map(|d| d.attribute.clone()).collect();
        assert!(attrs.contains(&"name".to_string()));
        assert!(attrs.contains(&"description".to_string()));
        assert!(attrs.contains(&"guid".to_string()));
        assert!(attrs.contains(&"bogus".to_string()));
    }

    #[test]
    fn test_block_max_and_nested_required() {
        let schema = group_schema();
        let block = |cn: Option<&str>| {
            let mut b = AttrMap::new();
            if let Some(cn) = cn {
                b.insert("common_name".to_string(), cn.into());
            }
            AttrValue::Block(b)
        };
        let cfg = config(&[
            ("name", "g".into()),
            ("ca", AttrValue::List(vec![block(Some("a")), block(None)])),
        ]);
        let diags = schema.validate_config(&cfg);
        let attrs: Vec<_> = diags.errors().filter_map(|d| d.attribute.clone()).collect();
        assert!(attrs.contains(&"ca".to_string()));
        assert!(attrs.contains(&"ca.1.common_name".to_string()));
    }

    #[test]
    fn test_defaults_recurse_into_blocks() {
        let schema = group_schema();
        let mut cfg = config(&[
            ("name", "g".into()),
            (
                "ca",
                AttrValue::blocks([AttrMap::from([("common_name".to_string(), "x".into())])]),
            ),
        ]);
        schema.apply_defaults(&mut cfg);
        assert_eq!(cfg["drift_detection"], AttrValue::Bool(false));
        let ca = cfg["ca"].elements()[0].as_block().unwrap().clone();
        assert_eq!(ca["ttl"], AttrValue::from("8760h"));
    }

    #[test]
    fn test_plan_honours_suppression_and_force_new() {
        let schema = group_schema();
        let prior = config(&[
            ("name", "Admins".into()),
            ("description", "old".into()),
            ("guid", "g-1".into()),
        ]);
        let same = config(&[("name", "admins".into()), ("description", "old".into())]);
        assert!(schema.plan(Some(&prior), &same).is_empty());

        let renamed = config(&[("name", "ops".into()), ("description", "new".into())]);
        let plan = schema.plan(Some(&prior), &renamed);
        assert_eq!(plan.changed, vec!["description", "name"]);
        assert_eq!(plan.replace, vec!["name"]);
        assert!(plan.requires_replace());

        assert!(schema.plan(None, &renamed).create);
    }

    #[test]
    fn test_state_round_trip_keeps_schema_keys() {
        let schema = group_schema();
        let mut attrs = config(&[
            ("name", "g".into()),
            ("users", AttrValue::string_set(["b", "a"])),
        ]);
        schema.apply_defaults(&mut attrs);
        let json = schema.encode_state(&attrs);
        assert!(json.contains_key("guid"));
        let decoded = schema.decode_state(&json).unwrap();
        assert_eq!(decoded["users"], attrs["users"]);
        assert_eq!(decoded["name"], attrs["name"]);
    }

    #[test]
    fn test_one_of_validator() {
        let check = one_of!("Allow", "Deny");
        assert!(check(&"Allow".into()).is_ok());
        assert!(check(&"Maybe".into()).is_err());
    }
}
