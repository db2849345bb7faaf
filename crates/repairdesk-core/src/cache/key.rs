use std::fmt;

use serde::{Deserialize, Serialize};

/// One component of a query key.
///
/// No floats: keys must compare and hash exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPart {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart::Str(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        KeyPart::Str(value)
    }
}

impl From<&String> for KeyPart {
    fn from(value: &String) -> Self {
        KeyPart::Str(value.clone())
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        KeyPart::Bool(value)
    }
}

macro_rules! int_key_part {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for KeyPart {
                fn from(value: $ty) -> Self {
                    KeyPart::Int(i64::from(value))
                }
            }
        )*
    };
}

int_key_part!(i8, i16, i32, i64, u8, u16, u32);

impl<T: Into<KeyPart>> From<Option<T>> for KeyPart {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(KeyPart::Null)
    }
}

/// Identity of a cached query: an ordered tuple of parts such as
/// `["repairs", 2, "en-cours", null, null]`.
///
/// Keys are equal exactly when their serialized forms are equal, and the
/// order of parts is significant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<KeyPart>);

impl QueryKey {
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a part, builder style
    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.0.push(part.into());
        self
    }

    /// Canonical JSON form, e.g. `["repair","42"]`
    pub fn serialized(&self) -> String {
        // A Vec of untagged scalars always serializes.
        serde_json::to_string(&self.0).unwrap_or_default()
    }

    /// Whether `prefix` matches the leading parts of this key
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Equal in every part except the one at `page`
    /// (e.g. two pages of the same filtered repairs listing).
    pub fn same_except_page(&self, other: &QueryKey, page: usize) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(&other.0)
                .enumerate()
                .all(|(index, (a, b))| index == page || a == b)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialized())
    }
}

impl From<&str> for QueryKey {
    fn from(value: &str) -> Self {
        QueryKey(vec![KeyPart::from(value)])
    }
}

impl From<Vec<KeyPart>> for QueryKey {
    fn from(parts: Vec<KeyPart>) -> Self {
        QueryKey(parts)
    }
}

/// Build a `QueryKey` from heterogeneous parts.
///
/// ```
/// use repairdesk_core::query_key;
///
/// let key = query_key!["repairs", 1, None::<&str>];
/// assert_eq!(key.serialized(), r#"["repairs",1,null]"#);
/// ```
#[macro_export]
macro_rules! query_key {
    ($($part:expr),* $(,)?) => {
        $crate::cache::QueryKey::new(vec![$($crate::cache::KeyPart::from($part)),*])
    };
}

/// Selects cache entries for invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyFilter {
    /// Only the entry with this exact key
    Exact(QueryKey),
    /// Every entry whose key starts with these parts
    Prefix(QueryKey),
}

impl KeyFilter {
    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            KeyFilter::Exact(exact) => key == exact,
            KeyFilter::Prefix(prefix) => key.starts_with(prefix),
        }
    }
}

/// A bare key filters by prefix, matching the common "invalidate everything
/// under `repairs`" usage.
impl From<QueryKey> for KeyFilter {
    fn from(key: QueryKey) -> Self {
        KeyFilter::Prefix(key)
    }
}

impl From<&str> for KeyFilter {
    fn from(value: &str) -> Self {
        KeyFilter::Prefix(QueryKey::from(value))
    }
}
