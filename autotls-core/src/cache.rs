use quick_cache::sync::Cache as QuickCache;

/// Minimum effective capacity when the cache is enabled, mirroring the source's
/// "0 disables, otherwise floor to a sane minimum" cache sizing rule.
///
/// The external configuration surface (`EngineConfig::cache_capacity_entries`, built from
/// the documented `InMemoryCacheSize` byte quantity with a ~32 MiB floor) is reframed here
/// as an entry count rather than a byte budget: `quick_cache`'s weighted API would be the
/// byte-accurate route, but a record's encoded size is small and roughly uniform (one
/// leaf cert, a couple of intermediates, one key), so entry-count capacity tracks the
/// documented byte floor closely enough without the extra weigher plumbing. 64 entries is
/// this crate's stand-in floor for "the backend's effective minimum."
pub const MIN_CACHE_ENTRIES: usize = 64;

/// Bounded, best-effort in-memory cache from effective registrable domain to an encoded
/// `CertificateRecord`. Disabled entirely when constructed with capacity 0: `get` always
/// misses and `set` is a no-op, so callers never need to branch on whether caching is on.
pub enum RecordCache {
  Disabled,
  Enabled(QuickCache<String, Vec<u8>>),
}

impl RecordCache {
  pub fn new(capacity_entries: usize) -> Self {
    if capacity_entries == 0 {
      return RecordCache::Disabled;
    }
    RecordCache::Enabled(QuickCache::new(capacity_entries.max(MIN_CACHE_ENTRIES)))
  }

  pub fn get(&self, erd: &str) -> Option<Vec<u8>> {
    match self {
      RecordCache::Disabled => None,
      RecordCache::Enabled(cache) => cache.get(erd),
    }
  }

  pub fn set(&self, erd: &str, encoded: Vec<u8>) {
    if let RecordCache::Enabled(cache) = self {
      cache.insert(erd.to_string(), encoded);
    }
  }

  pub fn remove(&self, erd: &str) {
    if let RecordCache::Enabled(cache) = self {
      cache.remove(erd);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn disabled_cache_never_returns_a_hit() {
    let cache = RecordCache::new(0);
    cache.set("example.com", b"ignored".to_vec());
    assert_eq!(cache.get("example.com"), None);
  }

  #[test]
  fn enabled_cache_round_trips() {
    let cache = RecordCache::new(128);
    cache.set("example.com", b"encoded".to_vec());
    assert_eq!(cache.get("example.com"), Some(b"encoded".to_vec()));
  }

  #[test]
  fn miss_on_unknown_key() {
    let cache = RecordCache::new(128);
    assert_eq!(cache.get("missing.com"), None);
  }
}
