//! Persisted state format and the schema-version upgrade chain.
//!
//! Upgrade functions are pure: they see only the raw attribute map of the
//! previous version and return the map for the next one. They may add keys
//! with defaults, rename keys or coerce literal defaults. They never drop
//! user data and never touch the network.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ProviderError, Result};

/// Raw attributes as persisted by the host.
pub type RawAttributes = Map<String, Value>;

/// One resource's persisted state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub attributes: RawAttributes,
    #[serde(default)]
    pub id: String,
}

impl PersistedState {
    pub fn new(schema_version: u32, id: impl Into<String>, attributes: RawAttributes) -> Self {
        Self {
            schema_version,
            attributes,
            id: id.into(),
        }
    }
}

pub type UpgradeFn = fn(RawAttributes) -> Result<RawAttributes>;

/// Upgrades state written at `from` to `from + 1`.
#[derive(Debug, Clone, Copy)]
pub struct StateUpgrader {
    pub from: u32,
    pub upgrade: UpgradeFn,
}

impl StateUpgrader {
    pub const fn new(from: u32, upgrade: UpgradeFn) -> Self {
        Self { from, upgrade }
    }
}

/// Run the chain from `state.schema_version` up to `current`.
///
/// Every intermediate version must have an upgrader. State newer than
/// `current` is rejected.
pub fn upgrade(
    mut state: PersistedState,
    current: u32,
    upgraders: &[StateUpgrader],
) -> Result<PersistedState> {
    if state.schema_version > current {
        return Err(ProviderError::Migration {
            from: state.schema_version,
            message: format!("state is newer than this provider (schema version {current})"),
        });
    }
    while state.schema_version < current {
        let from = state.schema_version;
        let step = upgraders
            .iter()
            .find(|u| u.from == from)
            .ok_or_else(|| ProviderError::Migration {
                from,
                message: "no upgrader registered".to_string(),
            })?;
        state.attributes = (step.upgrade)(state.attributes)?;
        state.schema_version = from + 1;
        tracing::debug!(from, to = from + 1, id = %state.id, "state upgraded");
    }
    Ok(state)
}

/// Insert `key` with `value` unless already present and non-null.
pub fn add_default(attrs: &mut RawAttributes, key: &str, value: Value) {
    match attrs.get(key) {
        Some(existing) if !existing.is_null() => {}
        _ => {
            attrs.insert(key.to_string(), value);
        }
    }
}

/// Move `from` to `to` unless `to` is already populated.
pub fn rename_key(attrs: &mut RawAttributes, from: &str, to: &str) {
    if let Some(value) = attrs.remove(from) {
        add_default(attrs, to, value);
    }
}

/// Apply `f` to every block of the block attribute `key`.
pub fn for_each_block(attrs: &mut RawAttributes, key: &str, f: impl Fn(&mut RawAttributes)) {
    match attrs.get_mut(key) {
        Some(Value::Array(items)) => {
            for item in items {
                if let Value::Object(block) = item {
                    f(block);
                }
            }
        }
        Some(Value::Object(block)) => f(block),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v0_to_v1(mut attrs: RawAttributes) -> Result<RawAttributes> {
        add_default(&mut attrs, "drift_detection", json!(false));
        Ok(attrs)
    }

    fn v1_to_v2(mut attrs: RawAttributes) -> Result<RawAttributes> {
        rename_key(&mut attrs, "desc", "description");
        Ok(attrs)
    }

    const CHAIN: [StateUpgrader; 2] = [StateUpgrader::new(0, v0_to_v1), StateUpgrader::new(1, v1_to_v2)];

    fn raw(value: Value) -> RawAttributes {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_chain_runs_in_order() {
        let state = PersistedState::new(0, "g1", raw(json!({"name": "g", "desc": "d"})));
        let upgraded = upgrade(state, 2, &CHAIN).unwrap();
        assert_eq!(upgraded.schema_version, 2);
        assert_eq!(upgraded.attributes["drift_detection"], json!(false));
        assert_eq!(upgraded.attributes["description"], json!("d"));
        assert!(!upgraded.attributes.contains_key("desc"));
    }

    #[test]
    fn test_upgrade_is_repeatable() {
        let state = PersistedState::new(0, "g1", raw(json!({"name": "g"})));
        let a = upgrade(state.clone(), 2, &CHAIN).unwrap();
        let b = upgrade(state, 2, &CHAIN).unwrap();
        assert_eq!(a, b);
        // already current: nothing changes
        assert_eq!(upgrade(a.clone(), 2, &CHAIN).unwrap(), a);
    }

    #[test]
    fn test_existing_values_survive() {
        let state = PersistedState::new(0, "g1", raw(json!({"drift_detection": true})));
        let upgraded = upgrade(state, 1, &CHAIN).unwrap();
        assert_eq!(upgraded.attributes["drift_detection"], json!(true));
    }

    #[test]
    fn test_missing_step_and_future_state() {
        let state = PersistedState::new(0, "x", RawAttributes::new());
        assert!(matches!(
            upgrade(state, 3, &CHAIN),
            Err(ProviderError::Migration { from: 2, .. })
        ));
        let future = PersistedState::new(5, "x", RawAttributes::new());
        assert!(upgrade(future, 2, &CHAIN).is_err());
    }

    #[test]
    fn test_for_each_block() {
        let mut attrs = raw(json!({"ca": [{"common_name": "x"}]}));
        for_each_block(&mut attrs, "ca", |block| {
            add_default(block, "ttl", json!("8760h"));
        });
        assert_eq!(attrs["ca"], json!([{"common_name": "x", "ttl": "8760h"}]));
    }
}
