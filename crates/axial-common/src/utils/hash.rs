//! Fast hashing aliases.
//!
//! All internal maps use ahash; it is measurably faster than SipHash for
//! the short string keys (axis and property names) that dominate here.

use std::collections::{HashMap, HashSet};

/// A `HashMap` keyed with the ahash hasher.
pub type FxHashMap<K, V> = HashMap<K, V, ahash::RandomState>;

/// A `HashSet` keyed with the ahash hasher.
pub type FxHashSet<T> = HashSet<T, ahash::RandomState>;
