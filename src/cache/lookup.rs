//! Lookup Result Module
//!
//! Distinguishes a cache hit from a genuine miss and from a failed retrieval.

// == Lookup ==
/// Outcome of a cache read.
///
/// A stored value that happens to look like "nothing" (an empty payload,
/// `false`, `null`) is still a `Hit`; only an absent or expired entry is a
/// `Miss`, and only a retrieval that went wrong is an `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    /// Entry found and decoded
    Hit(T),
    /// No usable entry for the key
    Miss,
    /// Retrieval failed; callers should recompute rather than trust the cache
    Error,
}

impl<T> Lookup<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, Lookup::Miss)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Lookup::Error)
    }

    /// Collapses `Miss` and `Error` into `None`.
    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Hit(value) => Some(value),
            Lookup::Miss | Lookup::Error => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Lookup<U> {
        match self {
            Lookup::Hit(value) => Lookup::Hit(f(value)),
            Lookup::Miss => Lookup::Miss,
            Lookup::Error => Lookup::Error,
        }
    }
}
