//! Content hashing for cache keys
//!
//! FNV-1a 64-bit accumulator. Hashes are deterministic within one process run;
//! no cross-run or cross-platform stability is promised.

/// FNV-1a 64-bit offset basis
pub const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime
pub const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Order-sensitive 64-bit hash accumulator
///
/// Multi-byte integers are folded byte by byte in little-endian order.
///
/// # Example
///
/// ```
/// use pixelate_engine::pixelate::Hasher;
///
/// let mut a = Hasher::new();
/// a.hash_u32(8).hash_str("triangle");
/// let mut b = Hasher::new();
/// b.hash_u32(8).hash_str("triangle");
/// assert_eq!(a.value(), b.value());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hasher {
    value: u64,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    pub const fn new() -> Self {
        Self { value: FNV_OFFSET_BASIS }
    }

    /// Current accumulated value
    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn hash_u8(&mut self, byte: u8) -> &mut Self {
        self.value ^= byte as u64;
        self.value = self.value.wrapping_mul(FNV_PRIME);
        self
    }

    pub fn hash_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        for &byte in bytes {
            self.hash_u8(byte);
        }
        self
    }

    pub fn hash_u16(&mut self, value: u16) -> &mut Self {
        self.hash_bytes(&value.to_le_bytes())
    }

    pub fn hash_u32(&mut self, value: u32) -> &mut Self {
        self.hash_bytes(&value.to_le_bytes())
    }

    pub fn hash_u64(&mut self, value: u64) -> &mut Self {
        self.hash_bytes(&value.to_le_bytes())
    }

    pub fn hash_i32(&mut self, value: i32) -> &mut Self {
        self.hash_bytes(&value.to_le_bytes())
    }

    /// Hashes the IEEE-754 bit pattern (so `0.0` and `-0.0` differ)
    pub fn hash_f32(&mut self, value: f32) -> &mut Self {
        self.hash_u32(value.to_bits())
    }

    pub fn hash_bool(&mut self, value: bool) -> &mut Self {
        self.hash_u8(value as u8)
    }

    /// Hashes the string bytes followed by a 0xff terminator
    ///
    /// 0xff never appears in UTF-8, so `("ab", "c")` and `("a", "bc")` differ.
    pub fn hash_str(&mut self, value: &str) -> &mut Self {
        self.hash_bytes(value.as_bytes()).hash_u8(0xff)
    }

    /// Hashes a slice length followed by each element's content
    pub fn hash_slice<T: ContentHash>(&mut self, items: &[T]) -> &mut Self {
        self.hash_u64(items.len() as u64);
        for item in items {
            item.content_hash(self);
        }
        self
    }

    pub fn hash_content<T: ContentHash + ?Sized>(&mut self, item: &T) -> &mut Self {
        item.content_hash(self);
        self
    }
}

/// Explicit field-by-field hashing of a descriptor's semantic content
///
/// Implementations must feed only fields that affect the created object,
/// never padding or addresses.
pub trait ContentHash {
    fn content_hash(&self, hasher: &mut Hasher);

    /// Cache key for this value, starting from a fresh accumulator
    fn hash_key(&self) -> u64 {
        let mut hasher = Hasher::new();
        self.content_hash(&mut hasher);
        hasher.value()
    }
}

impl ContentHash for u32 {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher.hash_u32(*self);
    }
}

impl ContentHash for str {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher.hash_str(self);
    }
}

impl ContentHash for String {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher.hash_str(self);
    }
}

impl<T: ContentHash> ContentHash for Vec<T> {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher.hash_slice(self);
    }
}

impl<T: ContentHash> ContentHash for Option<T> {
    fn content_hash(&self, hasher: &mut Hasher) {
        match self {
            None => {
                hasher.hash_u8(0);
            }
            Some(value) => {
                hasher.hash_u8(1);
                value.content_hash(hasher);
            }
        }
    }
}

#[cfg(test)]
#[path = "hasher_tests.rs"]
mod tests;
