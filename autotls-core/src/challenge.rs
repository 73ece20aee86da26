use std::sync::Arc;
use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::store::Store;

const CHALLENGE_TTL: Duration = Duration::from_secs(30 * 60);

/// Stashes and serves HTTP-01 key authorizations. Challenge entries are written through
/// the same `Store` the HTTP side-channel reads, so there is no separate cache layer that
/// could lag behind a just-presented challenge.
pub struct ChallengeBroker {
  store: Arc<dyn Store>,
}

impl ChallengeBroker {
  pub fn new(store: Arc<dyn Store>) -> Self {
    Self { store }
  }

  fn key(domain: &str, token: &str) -> String {
    format!("challenges/{domain}_{token}")
  }

  pub async fn present(&self, domain: &str, token: &str, key_authorization: &[u8]) -> Result<()> {
    self
      .store
      .set_kv(&Self::key(domain, token), key_authorization.to_vec(), Some(CHALLENGE_TTL))
      .await
  }

  pub async fn clean_up(&self, domain: &str, token: &str) {
    // Cleanup is best-effort: the TTL is a backstop if delete races with a sweep.
    let _ = self.store.delete_kv(&Self::key(domain, token)).await;
  }

  /// Serves the `/.well-known/acme-challenge/<token>` side-channel. `host` is the
  /// stripped, lowercased request `Host` header.
  pub async fn serve(&self, host: &str, token: &str) -> Result<Vec<u8>> {
    if token.is_empty() {
      return Err(EngineError::NotFound);
    }
    self.store.get_kv(&Self::key(host, token)).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;

  #[tokio::test]
  async fn present_then_serve_round_trips() {
    let broker = ChallengeBroker::new(Arc::new(MemoryStore::new()));
    broker.present("example.com", "tok123", b"key-auth-bytes").await.unwrap();
    assert_eq!(broker.serve("example.com", "tok123").await.unwrap(), b"key-auth-bytes");
  }

  #[tokio::test]
  async fn clean_up_removes_the_entry() {
    let broker = ChallengeBroker::new(Arc::new(MemoryStore::new()));
    broker.present("example.com", "tok123", b"key-auth-bytes").await.unwrap();
    broker.clean_up("example.com", "tok123").await;
    assert!(broker.serve("example.com", "tok123").await.is_err());
  }

  #[tokio::test]
  async fn serve_rejects_empty_token() {
    let broker = ChallengeBroker::new(Arc::new(MemoryStore::new()));
    assert!(broker.serve("example.com", "").await.is_err());
  }
}
