//! Engine keys.
//!
//! Keys follow IndexedDB ordering: every number sorts before every string,
//! strings before binary keys, binary keys before arrays. Within a type,
//! numbers compare by value, strings and binaries lexicographically, and
//! arrays element by element (a strict prefix sorts first).

use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// A primary or index key.
#[derive(Clone, Debug)]
pub enum Key {
    Number(f64),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<Key>),
}

impl Key {
    /// Build a numeric key. Returns `None` for NaN, which is not a valid key.
    pub fn number(n: f64) -> Option<Self> {
        if n.is_nan() {
            return None;
        }
        // -0.0 and 0.0 are the same key.
        Some(Self::Number(if n == 0.0 { 0.0 } else { n }))
    }

    /// Convert a JSON value into a key.
    ///
    /// Numbers, strings and arrays whose elements are all valid keys convert;
    /// booleans, null and objects are not keys.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().and_then(Self::number),
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Self::from_value)
                .collect::<Option<Vec<_>>>()
                .map(Self::Array),
            Value::Null | Value::Bool(_) | Value::Object(_) => None,
        }
    }

    /// Render the key as a JSON value. Integral numbers become JSON integers.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Number(n) => {
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    Value::from(*n as i64)
                } else {
                    Value::from(*n)
                }
            }
            Self::String(s) => Value::String(s.clone()),
            Self::Binary(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_value).collect()),
        }
    }

    /// Return the string payload, if this is a string key.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Self::Number(_) => 0,
            Self::String(_) => 1,
            Self::Binary(_) => 2,
            Self::Array(_) => 3,
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Binary(a), Self::Binary(b)) => a.cmp(b),
            (Self::Array(a), Self::Array(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                write!(f, "{}", *n as i64)
            }
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Binary(bytes) => {
                write!(f, "0x")?;
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn types_order_numbers_strings_binary_arrays() {
        let mut keys = vec![
            Key::Array(vec![Key::from(1i64)]),
            Key::from(vec![0u8]),
            Key::from("a"),
            Key::from(10i64),
        ];
        keys.sort();
        assert_eq!(keys[0], Key::from(10i64));
        assert_eq!(keys[1], Key::from("a"));
        assert_eq!(keys[2], Key::Binary(vec![0]));
        assert_eq!(keys[3], Key::Array(vec![Key::from(1i64)]));
    }

    #[test]
    fn array_prefix_sorts_first() {
        let short = Key::Array(vec![Key::from("a")]);
        let long = Key::Array(vec![Key::from("a"), Key::from("b")]);
        assert!(short < long);
    }

    #[test]
    fn nan_is_not_a_key() {
        assert!(Key::number(f64::NAN).is_none());
        assert_eq!(Key::number(-0.0), Key::number(0.0));
    }

    #[test]
    fn from_value_rejects_non_keys() {
        assert!(Key::from_value(&json!(null)).is_none());
        assert!(Key::from_value(&json!(true)).is_none());
        assert!(Key::from_value(&json!({"a": 1})).is_none());
        assert!(Key::from_value(&json!([1, null])).is_none());
        assert_eq!(
            Key::from_value(&json!(["x", 2])),
            Some(Key::Array(vec![Key::from("x"), Key::from(2i64)]))
        );
    }

    #[test]
    fn integral_numbers_render_as_integers() {
        assert_eq!(Key::from(7i64).to_value(), json!(7));
        assert_eq!(Key::number(1.5).unwrap().to_value(), json!(1.5));
        assert_eq!(Key::from(7i64).to_string(), "7");
        assert_eq!(Key::from("apple").to_string(), "\"apple\"");
        assert_eq!(Key::Binary(vec![0xab, 0x01]).to_string(), "0xab01");
    }
}
