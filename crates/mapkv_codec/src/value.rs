//! Typed value stored under a key.

use bytes::Bytes;

/// A value stored in MapKV.
///
/// Four variants exist and each has a matching accessor. Asking a value
/// for a variant it does not hold returns `None`, the same answer as for
/// a missing key.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// UTF-8 string.
    String(String),
    /// 64-bit float.
    Number(f64),
    /// Boolean.
    Boolean(bool),
    /// Opaque byte blob.
    Blob(Bytes),
}

/// Discriminant of a [`Value`], also used as the on-disk type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueKind {
    /// [`Value::String`].
    String = 1,
    /// [`Value::Number`].
    Number = 2,
    /// [`Value::Boolean`].
    Boolean = 3,
    /// [`Value::Blob`].
    Blob = 4,
}

impl ValueKind {
    /// Converts a tag byte to a kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::String),
            2 => Some(Self::Number),
            3 => Some(Self::Boolean),
            4 => Some(Self::Blob),
            _ => None,
        }
    }

    /// Converts the kind to its tag byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Blob => "blob",
        }
    }
}

impl Value {
    /// Returns the kind of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::String(_) => ValueKind::String,
            Self::Number(_) => ValueKind::Number,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::Blob(_) => ValueKind::Blob,
        }
    }

    /// Returns the string if this is a `String`.
    #[must_use]
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number if this is a `Number`.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean if this is a `Boolean`.
    #[must_use]
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the blob if this is a `Blob`.
    #[must_use]
    pub fn as_blob(&self) -> Option<&Bytes> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Number of bytes the value occupies in an encoded record.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::String(s) => 4 + s.len(),
            Self::Number(_) => 8,
            Self::Boolean(_) => 1,
            Self::Blob(b) => 4 + b.len(),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Blob(Bytes::from(b))
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Self::Blob(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_match_only_their_variant() {
        let s = Value::from("abc");
        assert_eq!(s.as_string(), Some("abc"));
        assert_eq!(s.as_number(), None);
        assert_eq!(s.as_boolean(), None);
        assert!(s.as_blob().is_none());

        let n = Value::from(1.5);
        assert_eq!(n.as_number(), Some(1.5));
        assert_eq!(n.as_string(), None);

        let b = Value::from(true);
        assert_eq!(b.as_boolean(), Some(true));
        assert_eq!(b.as_number(), None);

        let blob = Value::from(vec![1u8, 2, 3]);
        assert_eq!(blob.as_blob().map(|b| b.as_ref()), Some(&[1u8, 2, 3][..]));
        assert_eq!(blob.as_string(), None);
    }

    #[test]
    fn kind_tags_round_trip() {
        for kind in [
            ValueKind::String,
            ValueKind::Number,
            ValueKind::Boolean,
            ValueKind::Blob,
        ] {
            assert_eq!(ValueKind::from_byte(kind.as_byte()), Some(kind));
        }
        assert_eq!(ValueKind::from_byte(0), None);
        assert_eq!(ValueKind::from_byte(5), None);
    }

    #[test]
    fn encoded_len() {
        assert_eq!(Value::from("hey").encoded_len(), 7);
        assert_eq!(Value::from(0.0).encoded_len(), 8);
        assert_eq!(Value::from(false).encoded_len(), 1);
        assert_eq!(Value::from(vec![0u8; 10]).encoded_len(), 14);
    }
}
