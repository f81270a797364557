//! [`Value`] — the typed input enumeration for the builder.

/// Universal input value for the builder.
///
/// Covers every encodable VelocyPack type plus the sentinels. Composite
/// variants (`Array`, `Object`) are encoded by opening a container frame,
/// adding the children and closing it, so they nest to arbitrary depth.
///
/// `None`, `External`, `Custom` and `Bcd` exist so that conversions can
/// represent them; the builder rejects them with
/// [`VpackError::BuilderUnexpectedType`](crate::VpackError::BuilderUnexpectedType).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absence of a value; never encodable.
    None,
    /// The illegal sentinel.
    Illegal,
    /// JSON null.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// IEEE-754 double.
    Double(f64),
    /// UTC date, signed milliseconds since the epoch.
    UtcDate(i64),
    /// UTF-8 string.
    String(String),
    /// Binary blob.
    Binary(Vec<u8>),
    /// Array of values (ordered).
    Array(Vec<Value>),
    /// Object (ordered key-value pairs; insertion order).
    Object(Vec<(String, Value)>),
    /// The min-key sentinel.
    MinKey,
    /// The max-key sentinel.
    MaxKey,
    /// Raw-pointer external value; never encodable.
    External,
    /// Custom type range; never encodable with this builder.
    Custom,
    /// Binary-coded decimal; never encodable with this builder.
    Bcd,
}

impl Value {
    /// True for the variants the builder refuses to encode.
    pub fn is_illegal_input(&self) -> bool {
        matches!(
            self,
            Value::None | Value::External | Value::Custom | Value::Bcd
        )
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::UInt(v as u64)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::UInt(v as u64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(v as u64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Binary(v.to_vec())
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    Value::Double(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => {
                Value::Array(arr.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(obj) => Value::Object(
                obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}
