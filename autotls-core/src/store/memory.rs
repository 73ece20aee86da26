use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{EngineError, Result};

use super::{frame_with_expiry, unframe_with_expiry, LockTable, Store};

/// In-memory `Store` backend. A first-class deployment option for ephemeral environments,
/// not only a test double — it honors the same TTL/lock contract the filesystem backend
/// does.
pub struct MemoryStore {
  data: Arc<RwLock<HashMap<String, Vec<u8>>>>,
  locks: Arc<LockTable>,
  _sweeper: tokio::task::JoinHandle<()>,
}

impl MemoryStore {
  pub fn new() -> Self {
    let data: Arc<RwLock<HashMap<String, Vec<u8>>>> = Arc::new(RwLock::new(HashMap::new()));
    let sweep_data = data.clone();
    let sweeper = tokio::spawn(async move {
      loop {
        tokio::time::sleep(Duration::from_secs(30)).await;
        let expired: Vec<String> = sweep_data
          .read()
          .iter()
          .filter(|(_, framed)| unframe_with_expiry(framed).is_err())
          .map(|(k, _)| k.clone())
          .collect();
        if !expired.is_empty() {
          let mut guard = sweep_data.write();
          for key in expired {
            guard.remove(&key);
          }
        }
      }
    });
    Self {
      data,
      locks: Arc::new(LockTable::default()),
      _sweeper: sweeper,
    }
  }
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

impl Drop for MemoryStore {
  fn drop(&mut self) {
    self._sweeper.abort();
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn set_kv(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
    self.data.write().insert(key.to_string(), frame_with_expiry(&value, ttl));
    Ok(())
  }

  async fn get_kv(&self, key: &str) -> Result<Vec<u8>> {
    let framed = self.data.read().get(key).cloned().ok_or(EngineError::NotFound)?;
    unframe_with_expiry(&framed)
  }

  async fn delete_kv(&self, key: &str) -> Result<()> {
    self.data.write().remove(key).map(|_| ()).ok_or(EngineError::NotFound)
  }

  async fn lock_cert(&self, domain: &str, ttl: Duration) -> Result<bool> {
    Ok(self.locks.try_acquire(domain, ttl))
  }

  async fn unlock_cert(&self, domain: &str) -> Result<()> {
    self.locks.release(domain);
    Ok(())
  }
}
