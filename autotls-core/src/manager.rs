use std::sync::Arc;
use std::time::Duration;

use crate::cache::RecordCache;
use crate::error::{EngineError, Result};
use crate::issuer::CertificateObtainer;
use crate::logging::ErrorLogger;
use crate::record::CertificateRecord;
use crate::store::{now_unix, Store};

const RENEWAL_LOCK_SUFFIX: &str = "##@@##renewal";
const RENEWAL_PERIOD_SECS: u64 = 31 * 24 * 3600;

/// The single authority over the in-process certificate lifecycle: converts "I need a
/// cert for this effective registrable domain" into a usable certificate, deduplicating
/// concurrent issuance for the same domain and persisting every result.
pub struct CertificateManager {
  store: Arc<dyn Store>,
  cache: RecordCache,
  issuer: Arc<dyn CertificateObtainer>,
  issuance_lock_ttl: Duration,
  renewal_lock_ttl: Duration,
  hard_expiry_grace: Duration,
  logger: ErrorLogger,
}

impl CertificateManager {
  pub fn new(
    store: Arc<dyn Store>,
    cache: RecordCache,
    issuer: Arc<dyn CertificateObtainer>,
    issuance_lock_ttl: Duration,
    renewal_lock_ttl: Duration,
    hard_expiry_grace: Duration,
    logger: ErrorLogger,
  ) -> Arc<Self> {
    Arc::new(Self {
      store,
      cache,
      issuer,
      issuance_lock_ttl,
      renewal_lock_ttl,
      hard_expiry_grace,
      logger,
    })
  }

  fn record_key(erd: &str) -> String {
    format!("certificates/{erd}")
  }

  /// Reads the current certificate for `erd`. A soft-expired-but-salvageable record is
  /// still returned (a stale cert beats a stalled handshake) while a background renewal
  /// is scheduled; a hard-expired record is rejected outright.
  pub async fn retrieve(self: &Arc<Self>, erd: &str) -> Result<(Vec<u8>, Vec<u8>)> {
    if let Some(bytes) = self.cache.get(erd) {
      return self.handle_record(erd, bytes).await;
    }
    let bytes = self.store.get_kv(&Self::record_key(erd)).await?;
    self.cache.set(erd, bytes.clone());
    self.handle_record(erd, bytes).await
  }

  async fn handle_record(self: &Arc<Self>, erd: &str, bytes: Vec<u8>) -> Result<(Vec<u8>, Vec<u8>)> {
    let record = CertificateRecord::decode(&bytes)?;
    let now = now_unix();
    if record.is_soft_expired(now) {
      self.schedule_renewal(erd.to_string(), record.names.clone());
      if record.is_hard_expired(now, self.hard_expiry_grace.as_secs()) {
        return Err(EngineError::Expired);
      }
    }
    Ok((record.cert_chain_pem, record.private_key_pem))
  }

  /// Obtains a fresh certificate for `erd` covering `names` (`names[0]` must equal
  /// `erd`, invariant I2). When `serialize` is set, a per-ERD issuance lock enforces
  /// single-flight issuance and contended callers get `EngineError::Contended` rather
  /// than queuing. Background renewal calls this with `serialize = false` because it
  /// already holds the separate renewal lock.
  pub async fn issue(&self, erd: &str, names: Vec<String>, serialize: bool) -> Result<(Vec<u8>, Vec<u8>)> {
    if names.first().map(String::as_str) != Some(erd) {
      return Err(EngineError::Config(format!("names[0] must equal erd ({erd})")));
    }

    if serialize && !self.store.lock_cert(erd, self.issuance_lock_ttl).await? {
      return Err(EngineError::Contended);
    }

    let obtained = self.issuer.obtain(&names).await;

    if serialize {
      self.store.unlock_cert(erd).await.ok();
    }

    let (chain, key) = obtained?;
    let deadline = now_unix() + RENEWAL_PERIOD_SECS;
    let record = CertificateRecord::new(erd.to_string(), names, deadline, chain.clone(), key.clone());
    let encoded = record.encode();
    self.store.set_kv(&Self::record_key(erd), encoded.clone(), None).await?;
    self.cache.set(erd, encoded);
    Ok((chain, key))
  }

  /// Idempotent provisioning: no-op if a live record already exists, otherwise a
  /// single-flight `issue`.
  pub async fn ensure(self: &Arc<Self>, names: Vec<String>) -> Result<()> {
    let erd = names.first().cloned().ok_or_else(|| EngineError::BadName("no names given".into()))?;
    match self.retrieve(&erd).await {
      Ok(_) => Ok(()),
      Err(EngineError::NotFound) | Err(EngineError::Expired) => self.issue(&erd, names, true).await.map(|_| ()),
      Err(other) => Err(other),
    }
  }

  fn schedule_renewal(self: &Arc<Self>, erd: String, names: Vec<String>) {
    let manager = self.clone();
    tokio::spawn(async move {
      let renewal_key = format!("{erd}{RENEWAL_LOCK_SUFFIX}");
      match manager.store.lock_cert(&renewal_key, manager.renewal_lock_ttl).await {
        Ok(true) => {}
        _ => return,
      }
      let result = manager.issue(&erd, names, false).await;
      manager.store.unlock_cert(&renewal_key).await.ok();
      if let Err(e) = result {
        manager.logger.error(format!("background renewal for {erd} failed: {e}"));
      } else {
        manager.logger.info(format!("renewed certificate for {erd}"));
      }
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::logging::ErrorLogger;
  use crate::store::MemoryStore;
  use async_trait::async_trait;
  use std::sync::atomic::{AtomicUsize, Ordering};

  /// Stands in for a real ACME issuer so these tests can exercise the manager's
  /// lock/cache/expiry/persistence logic without any network access.
  struct CountingObtainer {
    calls: AtomicUsize,
    chain: Vec<u8>,
    key: Vec<u8>,
  }

  impl CountingObtainer {
    fn new() -> Self {
      Self {
        calls: AtomicUsize::new(0),
        chain: b"fresh-chain".to_vec(),
        key: b"fresh-key".to_vec(),
      }
    }
  }

  #[async_trait]
  impl CertificateObtainer for CountingObtainer {
    async fn obtain(&self, _names: &[String]) -> Result<(Vec<u8>, Vec<u8>)> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      Ok((self.chain.clone(), self.key.clone()))
    }
  }

  fn seed_bytes(erd: &str, deadline_unix: u64) -> Vec<u8> {
    CertificateRecord::new(erd.to_string(), vec![erd.to_string()], deadline_unix, b"chain".to_vec(), b"key".to_vec()).encode()
  }

  fn test_manager(store: Arc<MemoryStore>, obtainer: Arc<CountingObtainer>) -> Arc<CertificateManager> {
    CertificateManager::new(
      store,
      RecordCache::new(0),
      obtainer,
      Duration::from_secs(300),
      Duration::from_secs(300),
      Duration::from_secs(46 * 24 * 3600),
      ErrorLogger::disabled(),
    )
  }

  #[tokio::test]
  async fn retrieve_returns_live_record_from_store() {
    let store = Arc::new(MemoryStore::new());
    let erd = "example.com";
    let now = now_unix();
    store
      .set_kv(&CertificateManager::record_key(erd), seed_bytes(erd, now + 1000), None)
      .await
      .unwrap();
    let manager = test_manager(store, Arc::new(CountingObtainer::new()));
    let (chain, key) = manager.retrieve(erd).await.unwrap();
    assert_eq!(chain, b"chain");
    assert_eq!(key, b"key");
  }

  #[tokio::test]
  async fn retrieve_rejects_hard_expired_record() {
    let store = Arc::new(MemoryStore::new());
    let erd = "example.com";
    let now = now_unix();
    store
      .set_kv(&CertificateManager::record_key(erd), seed_bytes(erd, now - 47 * 24 * 3600), None)
      .await
      .unwrap();
    let manager = test_manager(store, Arc::new(CountingObtainer::new()));
    let result = manager.retrieve(erd).await;
    assert!(matches!(result, Err(EngineError::Expired)));
  }

  #[tokio::test]
  async fn retrieve_missing_record_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let manager = test_manager(store, Arc::new(CountingObtainer::new()));
    let result = manager.retrieve("example.com").await;
    assert!(matches!(result, Err(EngineError::NotFound)));
  }

  #[tokio::test]
  async fn issue_persists_and_caches_a_fresh_record() {
    let store = Arc::new(MemoryStore::new());
    let obtainer = Arc::new(CountingObtainer::new());
    let manager = test_manager(store.clone(), obtainer.clone());
    let (chain, key) = manager.issue("example.com", vec!["example.com".into()], true).await.unwrap();
    assert_eq!(chain, b"fresh-chain");
    assert_eq!(key, b"fresh-key");
    assert_eq!(obtainer.calls.load(Ordering::SeqCst), 1);
    let stored = store.get_kv(&CertificateManager::record_key("example.com")).await.unwrap();
    assert_eq!(CertificateRecord::decode(&stored).unwrap().cert_chain_pem, b"fresh-chain");
  }

  #[tokio::test]
  async fn issue_rejects_names_not_starting_with_erd() {
    let store = Arc::new(MemoryStore::new());
    let manager = test_manager(store, Arc::new(CountingObtainer::new()));
    let result = manager.issue("example.com", vec!["other.com".into()], true).await;
    assert!(matches!(result, Err(EngineError::Config(_))));
  }

  #[tokio::test]
  async fn concurrent_serialized_issue_is_single_flight() {
    let store = Arc::new(MemoryStore::new());
    let obtainer = Arc::new(CountingObtainer::new());
    let manager = test_manager(store, obtainer.clone());

    store.lock_cert("example.com", Duration::from_secs(300)).await.unwrap();
    let result = manager.issue("example.com", vec!["example.com".into()], true).await;
    assert!(matches!(result, Err(EngineError::Contended)));
    assert_eq!(obtainer.calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn ensure_is_a_no_op_when_a_live_record_exists() {
    let store = Arc::new(MemoryStore::new());
    let erd = "example.com";
    let now = now_unix();
    store
      .set_kv(&CertificateManager::record_key(erd), seed_bytes(erd, now + 1000), None)
      .await
      .unwrap();
    let obtainer = Arc::new(CountingObtainer::new());
    let manager = test_manager(store, obtainer.clone());
    manager.ensure(vec![erd.to_string()]).await.unwrap();
    assert_eq!(obtainer.calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn ensure_issues_when_no_record_exists() {
    let store = Arc::new(MemoryStore::new());
    let obtainer = Arc::new(CountingObtainer::new());
    let manager = test_manager(store, obtainer.clone());
    manager.ensure(vec!["example.com".to_string()]).await.unwrap();
    assert_eq!(obtainer.calls.load(Ordering::SeqCst), 1);
  }
}
