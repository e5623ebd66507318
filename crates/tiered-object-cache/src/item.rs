//! The capability contract for cacheable values

/// A value that can be stored by the cache.
///
/// The cache treats items as opaque: it serializes them for the disk tier,
/// reconstructs them on read, and charges their reported cost against the
/// tier limits. Items are never compared for equality; identity is by key.
pub trait CacheItem: Send + Sync {
    /// Serialize the item to a byte payload, or `None` if it cannot be
    /// represented (the item is then simply not persisted).
    fn to_bytes(&self) -> Option<Vec<u8>>;

    /// Reconstruct an item from a byte payload. Decode failure is `None`,
    /// surfaced to callers as a cache miss.
    fn from_bytes(bytes: &[u8]) -> Option<Self>
    where
        Self: Sized;

    /// The item's cost in caller-defined units, typically bytes.
    fn cost(&self) -> u64;
}

impl CacheItem for Vec<u8> {
    fn to_bytes(&self) -> Option<Vec<u8>> {
        Some(self.clone())
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Some(bytes.to_vec())
    }

    fn cost(&self) -> u64 {
        self.len() as u64
    }
}

impl CacheItem for String {
    fn to_bytes(&self) -> Option<Vec<u8>> {
        Some(self.as_bytes().to_vec())
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        String::from_utf8(bytes.to_vec()).ok()
    }

    fn cost(&self) -> u64 {
        self.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_round_trip() {
        let blob = vec![1u8, 2, 3, 4];
        let encoded = blob.to_bytes().unwrap();
        let decoded = Vec::<u8>::from_bytes(&encoded).unwrap();
        assert_eq!(decoded, blob);
        assert_eq!(blob.cost(), 4);
    }

    #[test]
    fn test_string_rejects_invalid_utf8() {
        assert!(String::from_bytes(&[0xff, 0xfe]).is_none());
    }
}
