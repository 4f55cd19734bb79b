//! Attribute map handed to resources and data sources

use serde_json::{Map, Value};

/// Typed accessors over a JSON attribute map
pub trait MapExt {
    fn str_at(&self, key: &str) -> Option<&str>;
    fn bool_at(&self, key: &str) -> Option<bool>;
    fn u64_at(&self, key: &str) -> Option<u64>;
    fn strings_at(&self, key: &str) -> Option<Vec<String>>;
    fn block_at(&self, key: &str) -> Option<&Map<String, Value>>;
}

impl MapExt for Map<String, Value> {
    fn str_at(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    fn bool_at(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    fn u64_at(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    fn strings_at(&self, key: &str) -> Option<Vec<String>> {
        let items = self.get(key)?.as_array()?;
        Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        )
    }

    fn block_at(&self, key: &str) -> Option<&Map<String, Value>> {
        self.get(key).and_then(Value::as_object)
    }
}

/// Identity, declared configuration and state of one object
///
/// `config` holds what the user declared (absent or `null` means "not
/// specified"); `state` holds what gets persisted. Values the user declares
/// are carried into `state` so that declared-only attributes such as
/// `allow_disconnect` survive a refresh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceData {
    id: String,
    config: Map<String, Value>,
    state: Map<String, Value>,
}

impl ResourceData {
    /// Data for an object about to be created or looked up
    pub fn from_config(config: Map<String, Value>) -> Self {
        let state = strip_nulls(&config);
        Self {
            id: String::new(),
            config,
            state,
        }
    }

    /// Data for an object already in state
    pub fn from_state(id: impl Into<String>, state: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            config: Map::new(),
            state,
        }
    }

    /// Attach a new declared configuration to existing state
    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        for (key, value) in strip_nulls(&config) {
            self.state.insert(key, value);
        }
        self.config = config;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Mark the object as gone
    pub fn clear_id(&mut self) {
        self.id.clear();
    }

    pub fn is_gone(&self) -> bool {
        self.id.is_empty()
    }

    pub fn config(&self) -> &Map<String, Value> {
        &self.config
    }

    pub fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    pub fn into_state(self) -> Map<String, Value> {
        self.state
    }

    /// Declared value, `None` when absent or `null`
    pub fn configured(&self, key: &str) -> Option<&Value> {
        self.config.get(key).filter(|v| !v.is_null())
    }

    pub fn configured_str(&self, key: &str) -> Option<&str> {
        self.configured(key).and_then(Value::as_str)
    }

    pub fn configured_bool(&self, key: &str) -> Option<bool> {
        self.configured(key).and_then(Value::as_bool)
    }

    pub fn configured_block(&self, key: &str) -> Option<&Map<String, Value>> {
        self.configured(key).and_then(Value::as_object)
    }

    /// Current value from state, `""` when unset
    pub fn state_str(&self, key: &str) -> &str {
        self.state.str_at(key).unwrap_or_default()
    }

    pub fn state_bool(&self, key: &str) -> bool {
        self.state.bool_at(key).unwrap_or_default()
    }

    pub fn state_block(&self, key: &str) -> Option<&Map<String, Value>> {
        self.state.block_at(key)
    }

    /// Set a value in state
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.state.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.state.remove(key)
    }
}

fn strip_nulls(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_declared_values_are_seeded_into_state() {
        let data = ResourceData::from_config(map(json!({ "name": "Ethernet0", "new_name": null })));
        assert_eq!(data.state_str("name"), "Ethernet0");
        assert!(data.state().get("new_name").is_none());
        assert!(data.configured("new_name").is_none());
        assert!(data.is_gone());
    }

    #[test]
    fn test_with_config_keeps_computed_state() {
        let data = ResourceData::from_state(
            "//localhost/network_adapters/Ethernet0",
            map(json!({ "name": "Ethernet0", "guid": "A", "original": { "name": "Ethernet0" } })),
        )
        .with_config(map(json!({ "name": "Ethernet0", "new_name": "LAN" })));

        assert_eq!(data.state_str("guid"), "A");
        assert_eq!(data.state_str("new_name"), "LAN");
        assert!(data.state_block("original").is_some());
        assert_eq!(data.configured_str("new_name"), Some("LAN"));
    }

    #[test]
    fn test_map_ext() {
        let m = map(json!({ "list": ["a", "b"], "n": 4, "b": true, "block": { "x": "y" } }));
        assert_eq!(m.strings_at("list"), Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(m.u64_at("n"), Some(4));
        assert_eq!(m.bool_at("b"), Some(true));
        assert_eq!(m.block_at("block").and_then(|b| b.str_at("x")), Some("y"));
        assert_eq!(m.str_at("missing"), None);
    }
}
