use std::fmt;

use serde::{Deserialize, Serialize};

/// An assignment value that is either a JSON number or a string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(serde_json::Number),
    String(String),
}

impl NumberOrString {
    pub fn from_i64(value: i64) -> Self {
        NumberOrString::Number(value.into())
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        NumberOrString::String(value.into())
    }

    pub fn is_string(&self) -> bool {
        matches!(self, NumberOrString::String(_))
    }

    /// The value as a wide integer; fractional numbers are truncated
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NumberOrString::Number(n) => n
                .as_i64()
                .or_else(|| n.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
                .or_else(|| n.as_f64().map(|f| f as i64)),
            NumberOrString::String(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for NumberOrString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumberOrString::Number(n) => write!(f, "{n}"),
            NumberOrString::String(s) => f.write_str(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_json() {
        let values: Vec<NumberOrString> = serde_json::from_str(r#"[1, "two", 3.5]"#).unwrap();
        assert_eq!(values[0], NumberOrString::from_i64(1));
        assert_eq!(values[1], NumberOrString::from_string("two"));
        assert_eq!(values[2].as_i64(), Some(3));
        assert_eq!(serde_json::to_string(&values[1]).unwrap(), r#""two""#);
    }

    #[test]
    fn test_as_i64_saturates_unsigned() {
        let big = NumberOrString::Number(u64::MAX.into());
        assert_eq!(big.as_i64(), Some(i64::MAX));
        assert_eq!(NumberOrString::from_string("x").as_i64(), None);
    }
}
