//! Mutable string objects.
//!
//! A string is a raw byte sequence (no Unicode awareness) with a lazily
//! computed hash. Mutation marks the cache dirty; the hash is recomputed on
//! demand. Keys in a table must not be mutated while in-table — that is
//! policy, not enforced here.

/// A mutable string object with a cached hash.
#[derive(Clone, Debug, Default)]
pub struct StrObj {
    bytes: Vec<u8>,
    cached_hash: u32,
    cache_valid: bool,
}

impl StrObj {
    pub fn new(s: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: s.into(),
            cached_hash: 0,
            cache_valid: false,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Replace the whole content. Invalidates the hash cache.
    pub fn set(&mut self, bytes: impl Into<Vec<u8>>) {
        self.cache_valid = false;
        self.bytes = bytes.into();
    }

    /// The cached hash, recomputed if a mutation invalidated it.
    pub fn hash(&mut self) -> u32 {
        if !self.cache_valid {
            self.cached_hash = hash_bytes(&self.bytes);
            self.cache_valid = true;
        }
        self.cached_hash
    }

    /// Render as text. Non-UTF-8 bytes are replaced.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// FNV-1a over a byte sequence. Used for string hashes and, with the value
/// tag folded in, for every other table key.
pub fn hash_bytes(bytes: &[u8]) -> u32 {
    let mut h: u32 = 0x811c9dc5;
    for &b in bytes {
        h ^= b as u32;
        h = h.wrapping_mul(0x01000193);
    }
    h
}
