// State functions normalize attribute values before they are stored

use serde::Serialize;

/// Stored in place of an empty string where "" is a meaningful value
pub const EMPTY_SENTINEL: &str = "<empty>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateFunc {
    Upper,
    Lower,
    /// Lower-case, first character upper-cased
    Camel,
    /// `""` becomes [`EMPTY_SENTINEL`]
    AcceptEmptyString,
}

impl StateFunc {
    pub fn apply(&self, value: &str) -> String {
        match self {
            StateFunc::Upper => value.to_uppercase(),
            StateFunc::Lower => value.to_lowercase(),
            StateFunc::Camel => {
                let lower = value.to_lowercase();
                let mut chars = lower.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
            StateFunc::AcceptEmptyString => {
                if value.is_empty() {
                    EMPTY_SENTINEL.to_string()
                } else {
                    value.to_string()
                }
            }
        }
    }
}

/// Turn a stored value back into what the host expects
pub fn from_sentinel(value: &str) -> String {
    if value == EMPTY_SENTINEL {
        String::new()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_funcs() {
        assert_eq!(StateFunc::Upper.apply("00-15-5d-00-01-02"), "00-15-5D-00-01-02");
        assert_eq!(StateFunc::Lower.apply("Corp.Local"), "corp.local");
        assert_eq!(StateFunc::Camel.apply("PRIVATE"), "Private");
        assert_eq!(StateFunc::Camel.apply(""), "");
        assert_eq!(StateFunc::AcceptEmptyString.apply(""), EMPTY_SENTINEL);
        assert_eq!(StateFunc::AcceptEmptyString.apply("corp"), "corp");
    }

    #[test]
    fn test_sentinel_round_trip() {
        assert_eq!(from_sentinel(&StateFunc::AcceptEmptyString.apply("")), "");
        assert_eq!(from_sentinel("corp.local"), "corp.local");
    }
}
