// `x_lifecycle` customizations of data sources

use serde_json::{Map, Value};

use super::{Attribute, MapExt, ResourceData, Schema};

pub const X_LIFECYCLE: &str = "x_lifecycle";

/// `x_lifecycle { ignore_error_if_not_exists, exists }`
pub fn data_source_lifecycle() -> Attribute {
    Attribute::block(
        Schema::new()
            .attr(
                "ignore_error_if_not_exists",
                Attribute::bool().optional().default_value(false),
            )
            .attr("exists", Attribute::bool().computed()),
    )
    .optional()
    .computed()
}

/// Whether a missing object should produce zeroed properties instead of an error
pub fn ignore_error_if_not_exists(data: &ResourceData) -> bool {
    data.configured_block(X_LIFECYCLE)
        .and_then(|b| b.bool_at("ignore_error_if_not_exists"))
        .unwrap_or(false)
}

/// Record `exists` in the state's `x_lifecycle` block
pub fn set_exists(data: &mut ResourceData, exists: bool) {
    let mut block = data
        .state_block(X_LIFECYCLE)
        .cloned()
        .unwrap_or_else(Map::new);
    block
        .entry("ignore_error_if_not_exists")
        .or_insert(Value::Bool(false));
    block.insert("exists".to_string(), Value::Bool(exists));
    data.set(X_LIFECYCLE, block);
}
