// Attribute validators

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::net::IpAddr;
use std::sync::LazyLock;

use crate::error::{Error, Result};

static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("static regex")
});

static MAC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-f]{2}(-[0-9a-f]{2}){5}$").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Validator {
    /// `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`, any case
    Uuid,
    /// `xx-xx-xx-xx-xx-xx`, any case, or `""` for the factory address
    Mac,
    /// IPv4 or IPv6 address
    Ip,
    /// Integer in an inclusive range
    IntBetween(i64, i64),
    /// One of a fixed set of strings, compared case-insensitively
    StringIn(&'static [&'static str]),
}

impl Validator {
    pub fn check(&self, key: &str, value: &Value) -> Result<()> {
        match self {
            Validator::Uuid => {
                let v = expect_str(key, value)?.to_lowercase();
                if !UUID.is_match(&v) {
                    return Err(Error::validation(format!(
                        "expected value of {} to be a valid UUID, using format \"xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx\" where \"x\" is a hex digit, got: {}",
                        key, v
                    )));
                }
            }
            Validator::Mac => {
                let v = expect_str(key, value)?.to_lowercase();
                if !v.is_empty() && !MAC.is_match(&v) {
                    return Err(Error::validation(format!(
                        "expected value of {} to be a valid MAC, using format \"xx-xx-xx-xx-xx-xx\" where \"x\" is a hex digit, got: {}",
                        key, v
                    )));
                }
            }
            Validator::Ip => {
                let v = expect_str(key, value)?;
                if v.parse::<IpAddr>().is_err() {
                    return Err(Error::validation(format!(
                        "expected {} to contain a valid IP, got: {}",
                        key, v
                    )));
                }
            }
            Validator::IntBetween(min, max) => {
                let in_range = match (value.as_i64(), value.as_u64()) {
                    (Some(n), _) => n >= *min && n <= *max,
                    (None, Some(n)) => i64::try_from(n).is_ok_and(|n| n >= *min && n <= *max),
                    _ => false,
                };
                if !in_range {
                    return Err(Error::validation(format!(
                        "expected {} to be in the range ({} - {}), got {}",
                        key, min, max, value
                    )));
                }
            }
            Validator::StringIn(allowed) => {
                let v = expect_str(key, value)?;
                if !allowed.iter().any(|a| a.eq_ignore_ascii_case(v)) {
                    return Err(Error::validation(format!(
                        "expected {} to be one of {:?}, got {}",
                        key, allowed, v
                    )));
                }
            }
        }
        Ok(())
    }
}

fn expect_str<'v>(key: &str, value: &'v Value) -> Result<&'v str> {
    value
        .as_str()
        .ok_or_else(|| Error::validation(format!("expected type of {} to be a string", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_uuid_and_mac_accept_any_case() {
        assert!(Validator::Uuid.check("guid", &json!("6D0E9A3A-3C4B-4B7A-9A1E-3F1C2B4D5E6F")).is_ok());
        assert!(Validator::Uuid.check("guid", &json!("{6D0E9A3A-3C4B-4B7A-9A1E-3F1C2B4D5E6F}")).is_err());
        assert!(Validator::Mac.check("mac_address", &json!("00-15-5D-00-01-02")).is_ok());
        assert!(Validator::Mac.check("mac_address", &json!("00:15:5d:00:01:02")).is_err());
        assert!(Validator::Mac.check("mac_address", &json!(1)).is_err());
    }

    #[test]
    fn test_empty_mac_resets_to_factory_address() {
        assert!(Validator::Mac.check("mac_address", &json!("")).is_ok());
        assert!(Validator::Mac.check("mac_address", &json!(" ")).is_err());
    }

    #[test]
    fn test_ip_and_ranges() {
        assert!(Validator::Ip.check("gw", &json!("fe80::1")).is_ok());
        assert!(Validator::Ip.check("gw", &json!("10.0.0.1")).is_ok());
        assert!(Validator::Ip.check("gw", &json!("router")).is_err());

        let range = Validator::IntBetween(0, 4294967295);
        assert!(range.check("level", &json!(4294967295u64)).is_ok());
        assert!(range.check("level", &json!(4294967296u64)).is_err());
        assert!(range.check("level", &json!(-1)).is_err());
    }

    #[test]
    fn test_string_in_ignores_case() {
        let v = Validator::StringIn(&["public", "private"]);
        assert!(v.check("connection_profile", &json!("Private")).is_ok());
        assert!(v.check("connection_profile", &json!("domain")).is_err());
    }
}
