//! Per-operation view of one resource's attributes.

use std::collections::BTreeSet;

use crate::attr::codec::{AttrCodec, decode_block, decode_blocks};
use crate::attr::{AttrMap, AttrValue, NULL};
use crate::error::{Diagnostics, Result};
use crate::migrate::PersistedState;
use crate::schema::Schema;

/// Attributes of the resource being operated on.
///
/// `prior` is the state before the operation (empty on create). `current`
/// starts as the planned values and is mutated by the resource through
/// [`ResourceData::set`]; it becomes the new state.
#[derive(Debug, Clone, Default)]
pub struct ResourceData {
    id: Option<String>,
    prior: AttrMap,
    current: AttrMap,
    warnings: Diagnostics,
    new_resource: bool,
    /// Values the server confirmed during a step that may still fail
    applied: AttrMap,
    /// Diff rules of the resource kind, when known
    schema: Option<Schema>,
}

impl ResourceData {
    /// Data for a Create: no prior state.
    pub fn for_create(config: AttrMap) -> Self {
        Self {
            id: None,
            prior: AttrMap::new(),
            current: config,
            warnings: Diagnostics::new(),
            new_resource: true,
            applied: AttrMap::new(),
            schema: None,
        }
    }

    /// Data for an Update: prior state plus the planned configuration.
    pub fn for_update(id: impl Into<String>, prior: AttrMap, planned: AttrMap) -> Self {
        Self {
            id: Some(id.into()),
            prior,
            current: planned,
            warnings: Diagnostics::new(),
            new_resource: false,
            applied: AttrMap::new(),
            schema: None,
        }
    }

    /// Data for Read and Delete: current equals prior.
    pub fn from_state(id: impl Into<String>, prior: AttrMap) -> Self {
        Self {
            id: Some(id.into()),
            current: prior.clone(),
            prior,
            warnings: Diagnostics::new(),
            new_resource: false,
            applied: AttrMap::new(),
            schema: None,
        }
    }

    /// Compare changes with the diff rules of `schema`.
    pub fn with_schema(mut self, schema: &Schema) -> Self {
        self.schema = Some(schema.clone());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// ID, or empty string when none has been assigned.
    pub fn id_or_empty(&self) -> &str {
        self.id().unwrap_or_default()
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// Mark the resource as gone.
    pub fn clear_id(&mut self) {
        self.id = None;
    }

    pub fn is_new_resource(&self) -> bool {
        self.new_resource
    }

    pub fn get(&self, key: &str) -> &AttrValue {
        self.current.get(key).unwrap_or(&NULL)
    }

    pub fn get_prior(&self, key: &str) -> &AttrValue {
        self.prior.get(key).unwrap_or(&NULL)
    }

    /// String value, `None` when unset or empty.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).as_str().filter(|s| !s.is_empty())
    }

    pub fn get_string(&self, key: &str) -> String {
        self.get_str(key).unwrap_or_default().to_string()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).as_bool().unwrap_or(false)
    }

    pub fn get_int(&self, key: &str) -> i64 {
        self.get(key).as_int().unwrap_or(0)
    }

    pub fn get_string_set(&self, key: &str) -> BTreeSet<String> {
        self.get(key).strings().into_iter().collect()
    }

    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key).strings()
    }

    /// Last block of a block attribute.
    pub fn get_block(&self, key: &str) -> Option<&AttrMap> {
        self.get(key)
            .elements()
            .last()
            .and_then(|v| v.as_block())
    }

    pub fn get_blocks(&self, key: &str) -> Vec<&AttrMap> {
        self.get(key)
            .elements()
            .into_iter()
            .filter_map(|v| v.as_block())
            .collect()
    }

    /// Decode an attribute into a typed domain value.
    pub fn decode<T: AttrCodec>(&self, key: &str) -> Result<T> {
        T::decode(self.get(key), key)
    }

    pub fn decode_block<T: AttrCodec>(&self, key: &str) -> Result<Option<T>> {
        decode_block(self.get(key), key)
    }

    pub fn decode_blocks<T: AttrCodec>(&self, key: &str) -> Result<Vec<T>> {
        decode_blocks(self.get(key), key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<AttrValue>) {
        self.current.insert(key.to_string(), value.into());
    }

    pub fn set_encoded<T: AttrCodec>(&mut self, key: &str, value: &T) {
        self.current.insert(key.to_string(), value.encode());
    }

    /// True when `key` differs between prior and current, after the
    /// attribute's diff suppression.
    pub fn has_change(&self, key: &str) -> bool {
        let (old, new) = self.get_change(key);
        match self.schema.as_ref().and_then(|schema| schema.get(key)) {
            Some(attr) => !attr.unchanged(old, new),
            None => old != new && !(old.is_empty() && new.is_empty()),
        }
    }

    pub fn has_changes(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| self.has_change(k))
    }

    pub fn get_change(&self, key: &str) -> (&AttrValue, &AttrValue) {
        (self.get_prior(key), self.get(key))
    }

    /// Old and new members of a string-set attribute.
    pub fn set_change(&self, key: &str) -> (BTreeSet<String>, BTreeSet<String>) {
        let old = self.get_prior(key).strings().into_iter().collect();
        let new = self.get(key).strings().into_iter().collect();
        (old, new)
    }

    pub fn warn(&mut self, summary: impl Into<String>, detail: impl Into<String>) {
        self.warnings.warning(summary, detail);
    }

    pub fn extend_warnings(&mut self, diags: Diagnostics) {
        self.warnings.extend(diags);
    }

    pub fn take_warnings(&mut self) -> Diagnostics {
        std::mem::take(&mut self.warnings)
    }

    pub fn attributes(&self) -> &AttrMap {
        &self.current
    }

    /// Record `value` as confirmed by the server for `key`.
    pub fn record_applied(&mut self, key: &str, value: impl Into<AttrValue>) {
        self.applied.insert(key.to_string(), value.into());
    }

    pub fn applied(&self) -> &AttrMap {
        &self.applied
    }

    /// State after a failed step: prior values overlaid with what was
    /// recorded as applied. `None` when nothing was applied.
    pub fn partial_state(&self, schema: &Schema) -> Option<PersistedState> {
        let id = self.id()?;
        if self.applied.is_empty() {
            return None;
        }
        let mut attributes = self.prior.clone();
        attributes.extend(self.applied.clone());
        Some(PersistedState {
            schema_version: schema.version,
            attributes: schema.encode_state(&attributes),
            id: id.to_string(),
        })
    }

    /// New persisted state, `None` when the ID was cleared.
    pub fn to_state(&self, schema: &Schema) -> Option<PersistedState> {
        let id = self.id()?;
        Some(PersistedState {
            schema_version: schema.version,
            attributes: schema.encode_state(&self.current),
            id: id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;

    fn attrs(pairs: &[(&str, AttrValue)]) -> AttrMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_set_change_and_has_change() {
        let prior = attrs(&[("users", AttrValue::string_set(["a", "d"]))]);
        let planned = attrs(&[("users", AttrValue::string_set(["a", "b", "c"]))]);
        let data = ResourceData::for_update("g1", prior, planned);
        assert!(data.has_change("users"));
        assert!(!data.has_change("description"));
        let (old, new) = data.set_change("users");
        assert_eq!(old.len(), 2);
        assert_eq!(new.len(), 3);
    }

    #[test]
    fn test_has_change_honours_suppression() {
        use crate::attr::suppress::DiffSuppress;
        let schema = Schema::new(0).attr(
            "expires_on",
            Attribute::string().suppress(DiffSuppress::SameTime),
        );
        let prior = attrs(&[("expires_on", "2027-01-01T00:00:00Z".into())]);
        let planned = attrs(&[("expires_on", "2027-01-01T01:00:00+01:00".into())]);
        let raw = ResourceData::for_update("s1", prior.clone(), planned.clone());
        assert!(raw.has_change("expires_on"));
        let data = ResourceData::for_update("s1", prior, planned).with_schema(&schema);
        assert!(!data.has_change("expires_on"));
    }

    #[test]
    fn test_partial_state_overlays_applied() {
        let schema = Schema::new(2)
            .attr("name", Attribute::string())
            .attr("users", Attribute::string_set());
        let prior = attrs(&[
            ("name", "ops".into()),
            ("users", AttrValue::string_set(["a", "d"])),
        ]);
        let planned = attrs(&[
            ("name", "ops".into()),
            ("users", AttrValue::string_set(["a", "b"])),
        ]);
        let mut data = ResourceData::for_update("g1", prior, planned);
        assert!(data.partial_state(&schema).is_none());
        data.record_applied("users", AttrValue::string_set(["a"]));
        let state = data.partial_state(&schema).unwrap();
        assert_eq!(state.schema_version, 2);
        assert_eq!(state.attributes["users"], serde_json::json!(["a"]));
        assert_eq!(state.attributes["name"], "ops");
    }

    #[test]
    fn test_get_block_returns_last() {
        let first = AttrMap::from([("name".to_string(), "a".into())]);
        let last = AttrMap::from([("name".to_string(), "b".into())]);
        let data =
            ResourceData::for_create(attrs(&[("role", AttrValue::blocks([first, last]))]));
        assert_eq!(data.get_block("role").unwrap()["name"], AttrValue::from("b"));
        assert_eq!(data.get_blocks("role").len(), 2);
        assert!(data.get_block("ca").is_none());
    }

    #[test]
    fn test_cleared_id_yields_no_state() {
        let schema = Schema::new(1).attr("name", Attribute::string());
        let mut data = ResourceData::from_state("x", attrs(&[("name", "n".into())]));
        let state = data.to_state(&schema).unwrap();
        assert_eq!(state.id, "x");
        assert_eq!(state.schema_version, 1);
        data.clear_id();
        assert!(data.to_state(&schema).is_none());
    }

    #[test]
    fn test_scalar_accessors_default() {
        let data = ResourceData::for_create(attrs(&[("name", "".into())]));
        assert_eq!(data.get_str("name"), None);
        assert!(!data.get_bool("enable_cdn"));
        assert_eq!(data.get_int("validity"), 0);
        assert!(data.id().is_none());
    }
}
