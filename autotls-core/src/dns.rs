use std::error::Error;

use async_trait::async_trait;

/// A DNS-01 capability. Concrete vendor adapters (Cloudflare, RFC2136, ...) live in
/// `autotls-dns` and implement this trait rather than the engine dispatching on a vendor
/// enum; callers register whichever adapters they need at construction time.
#[async_trait]
pub trait DnsChallengeProvider: Send + Sync {
  async fn set_acme_txt_record(&self, record_name: &str, value: &str) -> Result<(), Box<dyn Error + Send + Sync>>;

  /// Default no-op: some providers don't need explicit cleanup (e.g. TTL-bound records).
  #[allow(unused_variables)]
  async fn remove_acme_txt_record(&self, record_name: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    Ok(())
  }
}
