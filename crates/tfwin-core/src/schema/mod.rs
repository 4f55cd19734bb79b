//! Attribute schemas
//!
//! A [`Schema`] declares the attributes of a resource or data source: their
//! type, whether they are required, optional or computed, validators,
//! conflicts and the state functions that normalize values before they are
//! compared or stored.
//!
//! Nested blocks are JSON objects; lists are JSON arrays.

mod data;
mod lifecycle;
mod state_func;
mod validate;

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

pub use data::{MapExt, ResourceData};
pub use lifecycle::{
    X_LIFECYCLE, data_source_lifecycle, ignore_error_if_not_exists, set_exists,
};
pub use state_func::{EMPTY_SENTINEL, StateFunc, from_sentinel};
pub use validate::Validator;

/// Type of an attribute
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeType {
    String,
    Bool,
    Int,
    List { elem: Box<AttributeType> },
    Block { schema: Schema },
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Declaration of one attribute
#[derive(Debug, Clone, Serialize)]
pub struct Attribute {
    #[serde(rename = "type")]
    pub ty: AttributeType,
    #[serde(skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub optional: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub computed: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub force_new: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub sensitive: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicts_with: Vec<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validators: Vec<Validator>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub state_funcs: Vec<StateFunc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Attribute {
    fn of(ty: AttributeType) -> Self {
        Self {
            ty,
            required: false,
            optional: false,
            computed: false,
            force_new: false,
            sensitive: false,
            conflicts_with: Vec::new(),
            validators: Vec::new(),
            state_funcs: Vec::new(),
            default: None,
        }
    }

    pub fn string() -> Self {
        Self::of(AttributeType::String)
    }

    pub fn bool() -> Self {
        Self::of(AttributeType::Bool)
    }

    pub fn int() -> Self {
        Self::of(AttributeType::Int)
    }

    pub fn list_of_strings() -> Self {
        Self::of(AttributeType::List {
            elem: Box::new(AttributeType::String),
        })
    }

    pub fn block(schema: Schema) -> Self {
        Self::of(AttributeType::Block { schema })
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
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

    pub fn conflicts_with(mut self, names: &[&'static str]) -> Self {
        self.conflicts_with.extend_from_slice(names);
        self
    }

    pub fn validate(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn state(mut self, func: StateFunc) -> Self {
        self.state_funcs.push(func);
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Whether the attribute can only be reported, never configured
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }
}

/// Set of attribute declarations
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Schema {
    attributes: BTreeMap<&'static str, Attribute>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute
    pub fn attr(mut self, name: &'static str, attribute: Attribute) -> Self {
        self.attributes.insert(name, attribute);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Attribute)> {
        self.attributes.iter().map(|(name, attr)| (*name, attr))
    }

    /// Check a declared configuration against the schema
    pub fn validate_config(&self, config: &Map<String, Value>) -> Result<()> {
        self.validate_at("", config)
    }

    fn validate_at(&self, prefix: &str, config: &Map<String, Value>) -> Result<()> {
        for key in config.keys() {
            if !self.attributes.contains_key(key.as_str()) {
                return Err(Error::schema(format!("unknown attribute '{}{}'", prefix, key)));
            }
        }

        for (name, attr) in &self.attributes {
            let path = format!("{}{}", prefix, name);
            let value = config.get(*name).filter(|v| !v.is_null());

            let Some(value) = value else {
                if attr.required {
                    return Err(Error::validation(format!("attribute '{}' is required", path)));
                }
                continue;
            };

            if attr.is_computed_only() {
                return Err(Error::schema(format!(
                    "attribute '{}' is computed and cannot be set",
                    path
                )));
            }

            check_type(&path, &attr.ty, value)?;
            for validator in &attr.validators {
                validator.check(&path, value)?;
            }

            for other in &attr.conflicts_with {
                if config.get(*other).is_some_and(|v| !v.is_null()) {
                    return Err(Error::validation(format!(
                        "attribute '{}' conflicts with '{}{}'",
                        path, prefix, other
                    )));
                }
            }

            if let (AttributeType::Block { schema }, Value::Object(block)) = (&attr.ty, value) {
                schema.validate_at(&format!("{}.", path), block)?;
            }
        }
        Ok(())
    }

    /// Apply state functions and defaults in place
    pub fn normalize(&self, values: &mut Map<String, Value>) {
        for (name, attr) in &self.attributes {
            match values.get_mut(*name) {
                Some(Value::String(s)) => {
                    for func in &attr.state_funcs {
                        *s = func.apply(s);
                    }
                }
                Some(Value::Object(block)) => {
                    if let AttributeType::Block { schema } = &attr.ty {
                        schema.normalize(block);
                    }
                }
                Some(Value::Null) | None => {
                    if let Some(default) = &attr.default {
                        values.insert((*name).to_string(), default.clone());
                    }
                }
                Some(_) => {}
            }
        }
    }

    /// Force-new attributes whose declared value differs from `state`
    ///
    /// An empty string in `state` is an unknown value and never forces a
    /// replacement.
    pub fn force_new_changes(
        &self,
        config: &Map<String, Value>,
        state: &Map<String, Value>,
    ) -> Vec<&'static str> {
        self.attributes
            .iter()
            .filter(|(_, attr)| attr.force_new)
            .filter_map(|(name, _)| {
                let declared = config.get(*name).filter(|v| !v.is_null())?;
                let current = state
                    .get(*name)
                    .filter(|v| !v.is_null() && v.as_str() != Some(""))?;
                (declared != current).then_some(*name)
            })
            .collect()
    }
}

fn check_type(path: &str, ty: &AttributeType, value: &Value) -> Result<()> {
    let ok = match ty {
        AttributeType::String => value.is_string(),
        AttributeType::Bool => value.is_boolean(),
        AttributeType::Int => value.is_i64() || value.is_u64(),
        AttributeType::List { elem } => match value {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    check_type(&format!("{}[{}]", path, i), elem, item)?;
                }
                true
            }
            _ => false,
        },
        AttributeType::Block { .. } => value.is_object(),
    };
    if ok {
        Ok(())
    } else {
        Err(Error::schema(format!(
            "attribute '{}' has the wrong type, expected {}",
            path,
            type_name(ty)
        )))
    }
}

fn type_name(ty: &AttributeType) -> &'static str {
    match ty {
        AttributeType::String => "string",
        AttributeType::Bool => "bool",
        AttributeType::Int => "int",
        AttributeType::List { .. } => "list",
        AttributeType::Block { .. } => "block",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new()
            .attr("name", Attribute::string().optional().computed().state(StateFunc::Upper).conflicts_with(&["ipv4_gateway_address"]))
            .attr("ipv4_gateway_address", Attribute::string().optional().force_new().validate(Validator::Ip))
            .attr("guid", Attribute::string().computed())
            .attr(
                "dns_client",
                Attribute::block(
                    Schema::new()
                        .attr("suffix_search_list", Attribute::list_of_strings().optional())
                        .attr("devolution_level", Attribute::int().optional().validate(Validator::IntBetween(0, 4294967295))),
                )
                .optional(),
            )
    }

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = map(json!({ "name": "corp", "dns_client": { "suffix_search_list": ["a"], "devolution_level": 2 } }));
        assert!(schema().validate_config(&config).is_ok());
    }

    #[test]
    fn test_rejections() {
        let s = schema();
        assert!(matches!(s.validate_config(&map(json!({ "bogus": 1 }))), Err(Error::Schema(_))));
        assert!(matches!(s.validate_config(&map(json!({ "guid": "x" }))), Err(Error::Schema(_))));
        assert!(matches!(s.validate_config(&map(json!({ "name": 3 }))), Err(Error::Schema(_))));
        assert!(matches!(
            s.validate_config(&map(json!({ "name": "corp", "ipv4_gateway_address": "10.0.0.1" }))),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            s.validate_config(&map(json!({ "ipv4_gateway_address": "10.0.0.300" }))),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            s.validate_config(&map(json!({ "dns_client": { "devolution_level": -1 } }))),
            Err(Error::Validation(_))
        ));
        let required = Schema::new().attr("name", Attribute::string().required());
        assert!(matches!(required.validate_config(&Map::new()), Err(Error::Validation(_))));
    }

    #[test]
    fn test_normalize_and_force_new() {
        let s = schema();
        let mut config = map(json!({ "name": "corp", "ipv4_gateway_address": "10.0.0.1" }));
        s.normalize(&mut config);
        assert_eq!(config["name"], "CORP");

        let state = map(json!({ "ipv4_gateway_address": "10.0.0.254", "name": "LAB" }));
        assert_eq!(s.force_new_changes(&config, &state), vec!["ipv4_gateway_address"]);
    }
}
