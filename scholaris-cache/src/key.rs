//! Hierarchical query keys.
//!
//! A [`QueryKey`] is an ordered tuple of structured segments, led by a
//! domain (`"posts"`, `"chat"`, `"scholarships"`, ...). Keys compare deeply
//! and are totally ordered, so every extension of a prefix sorts directly
//! after the prefix itself. The store relies on that to answer
//! "everything under `["posts", "list"]`" with a single range scan.

use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// One component of a [`QueryKey`].
///
/// `Params` holds pagination/filter parameters. It is compared as a whole:
/// two parameter maps match only when they are deep-equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeySegment {
    Bool(bool),
    Int(i64),
    Text(String),
    Id(Uuid),
    Params(BTreeMap<String, KeySegment>),
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySegment::Bool(b) => write!(f, "{}", b),
            KeySegment::Int(i) => write!(f, "{}", i),
            KeySegment::Text(s) => write!(f, "{:?}", s),
            KeySegment::Id(id) => write!(f, "{}", id),
            KeySegment::Params(params) => {
                f.write_str("{")?;
                for (i, (name, value)) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", name, value)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for KeySegment {
    fn from(s: &str) -> Self {
        KeySegment::Text(s.to_string())
    }
}

impl From<String> for KeySegment {
    fn from(s: String) -> Self {
        KeySegment::Text(s)
    }
}

impl From<bool> for KeySegment {
    fn from(b: bool) -> Self {
        KeySegment::Bool(b)
    }
}

impl From<i64> for KeySegment {
    fn from(i: i64) -> Self {
        KeySegment::Int(i)
    }
}

impl From<u32> for KeySegment {
    fn from(i: u32) -> Self {
        KeySegment::Int(i64::from(i))
    }
}

impl From<Uuid> for KeySegment {
    fn from(id: Uuid) -> Self {
        KeySegment::Id(id)
    }
}

impl From<BTreeMap<String, KeySegment>> for KeySegment {
    fn from(params: BTreeMap<String, KeySegment>) -> Self {
        KeySegment::Params(params)
    }
}

/// Structured, hierarchical cache key.
///
/// Two keys are equal iff all segments are deep-equal. A shorter key acts as
/// a pattern for every longer key that extends it (see [`QueryKey::matches`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    segments: Vec<KeySegment>,
}

impl QueryKey {
    /// Start a key with its domain segment.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            segments: vec![KeySegment::Text(domain.into())],
        }
    }

    /// The empty key. As a pattern it matches every key.
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Build a key from raw segments.
    pub fn from_segments(segments: Vec<KeySegment>) -> Self {
        Self { segments }
    }

    /// Append a segment.
    pub fn with(mut self, segment: impl Into<KeySegment>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// Append a parameter-map segment.
    pub fn with_params<I, K, V>(self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<KeySegment>,
    {
        let map: BTreeMap<String, KeySegment> = params
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.with(KeySegment::Params(map))
    }

    /// The leading domain segment, if it is text.
    pub fn domain(&self) -> Option<&str> {
        match self.segments.first() {
            Some(KeySegment::Text(domain)) => Some(domain),
            _ => None,
        }
    }

    pub fn segments(&self) -> &[KeySegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The key with its last segment dropped.
    pub fn parent(&self) -> Option<QueryKey> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// True iff `self` is `pattern` or a structural extension of it.
    pub fn starts_with(&self, pattern: &QueryKey) -> bool {
        self.segments.starts_with(&pattern.segments)
    }

    /// Prefix match used by invalidation: does `key` fall under `pattern`?
    pub fn matches(pattern: &QueryKey, key: &QueryKey) -> bool {
        key.starts_with(pattern)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", segment)?;
        }
        f.write_str("]")
    }
}

/// Build a [`QueryKey`] from a domain and any number of segments.
///
/// ```
/// use scholaris_cache::query_key;
///
/// let key = query_key!("posts", "detail", 42i64);
/// assert_eq!(key.domain(), Some("posts"));
/// assert_eq!(key.len(), 3);
/// ```
#[macro_export]
macro_rules! query_key {
    ($domain:expr $(, $segment:expr)* $(,)?) => {
        $crate::QueryKey::new($domain)$(.with($segment))*
    };
}
