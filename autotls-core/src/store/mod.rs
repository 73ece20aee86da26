mod filesystem;
mod memory;

pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{EngineError, Result};

/// Persistent key/value storage with TTL and named advisory locks.
///
/// `GetKV`/`DeleteKV` return `EngineError::NotFound` (not an I/O error) when the key is
/// absent. Locks are a separate, in-process advisory primitive: they do not route through
/// `SetKV`/`GetKV` and auto-release after their TTL regardless of the backend.
#[async_trait]
pub trait Store: Send + Sync {
  async fn set_kv(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;
  async fn get_kv(&self, key: &str) -> Result<Vec<u8>>;
  async fn delete_kv(&self, key: &str) -> Result<()>;

  /// Attempts to acquire an advisory lock on `domain`. Never blocks: returns `Ok(false)`
  /// immediately if already held.
  async fn lock_cert(&self, domain: &str, ttl: Duration) -> Result<bool>;
  async fn unlock_cert(&self, domain: &str) -> Result<()>;
}

pub(crate) fn now_unix() -> u64 {
  SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Shared advisory-lock bookkeeping used by both backends. Locks are never persisted:
/// they live only for the life of the owning process, mirroring the source's
/// goroutine-based in-memory lock map.
#[derive(Default)]
pub(crate) struct LockTable {
  held_until: Mutex<HashMap<String, u64>>,
}

impl LockTable {
  pub fn try_acquire(&self, domain: &str, ttl: Duration) -> bool {
    let now = now_unix();
    let mut table = self.held_until.lock();
    if let Some(until) = table.get(domain) {
      if *until > now {
        return false;
      }
    }
    table.insert(domain.to_string(), now + ttl.as_secs().max(1));
    true
  }

  pub fn release(&self, domain: &str) {
    self.held_until.lock().remove(domain);
  }
}

/// Backs a key's expiry as an 8-byte big-endian unix timestamp prefix; 0 means no expiry.
/// Shared framing between the memory and filesystem backends so a record written by one
/// reads identically from the other.
pub(crate) fn frame_with_expiry(value: &[u8], ttl: Option<Duration>) -> Vec<u8> {
  let expiry = ttl.map(|d| now_unix() + d.as_secs()).unwrap_or(0);
  let mut framed = Vec::with_capacity(8 + value.len());
  framed.extend_from_slice(&expiry.to_be_bytes());
  framed.extend_from_slice(value);
  framed
}

pub(crate) fn unframe_with_expiry(framed: &[u8]) -> Result<Vec<u8>> {
  if framed.len() < 8 {
    return Err(EngineError::StoreError("malformed stored value".into()));
  }
  let expiry = u64::from_be_bytes(framed[0..8].try_into().unwrap());
  if expiry != 0 && now_unix() > expiry {
    return Err(EngineError::NotFound);
  }
  Ok(framed[8..].to_vec())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lock_table_rejects_concurrent_acquire() {
    let table = LockTable::default();
    assert!(table.try_acquire("example.com", Duration::from_secs(300)));
    assert!(!table.try_acquire("example.com", Duration::from_secs(300)));
    table.release("example.com");
    assert!(table.try_acquire("example.com", Duration::from_secs(300)));
  }

  #[test]
  fn frame_round_trips_without_ttl() {
    let framed = frame_with_expiry(b"hello", None);
    assert_eq!(unframe_with_expiry(&framed).unwrap(), b"hello");
  }
}
