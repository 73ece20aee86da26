use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::MIN_CACHE_ENTRIES;
use crate::dns::DnsChallengeProvider;
use crate::error::{EngineError, Result};
use crate::logging::LogLevel;
use crate::store::Store;

pub const PRODUCTION_DIRECTORY: &str = "https://acme-v02.api.letsencrypt.org/directory";
pub const STAGING_DIRECTORY: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Subdomain patterns permitted for one effective registrable domain. A `*`-prefixed
/// pattern additionally requires a configured DNS provider, since wildcard names can only
/// be validated via DNS-01.
pub type AuthorizedSubdomains = HashSet<String>;

/// Validated engine configuration. Constructed once via `EngineConfig::build`, which
/// fails fast on anything a misconfigured deployment would otherwise only discover at the
/// first handshake.
pub struct EngineConfig {
  pub contact_email: String,
  pub directory_url: String,
  pub store: Arc<dyn Store>,
  pub dns_provider: Option<Arc<dyn DnsChallengeProvider>>,
  pub authorized_domains: HashMap<String, AuthorizedSubdomains>,
  /// Cache capacity in entries, not bytes. The documented external interface
  /// (`InMemoryCacheSize`) is a byte quantity with a ~32 MiB floor; see `cache::MIN_CACHE_ENTRIES`
  /// for why this crate tracks that floor with an entry count instead of a weighted byte budget.
  pub cache_capacity_entries: usize,
  pub log_level: LogLevel,
  pub renewal_lock_ttl: Duration,
  pub issuance_lock_ttl: Duration,
  pub hard_expiry_grace: Duration,
}

/// Builder mirroring the source's eager-validation `Init` entry point: every field is
/// required up front and checked before any handshake can reach the engine.
pub struct EngineConfigBuilder {
  contact_email: Option<String>,
  directory_url: String,
  store: Option<Arc<dyn Store>>,
  dns_provider: Option<Arc<dyn DnsChallengeProvider>>,
  authorized_domains: HashMap<String, AuthorizedSubdomains>,
  cache_capacity_entries: usize,
  log_level: LogLevel,
  renewal_lock_ttl: Duration,
  issuance_lock_ttl: Duration,
  hard_expiry_grace: Duration,
}

impl Default for EngineConfigBuilder {
  fn default() -> Self {
    Self {
      contact_email: None,
      directory_url: PRODUCTION_DIRECTORY.to_string(),
      store: None,
      dns_provider: None,
      authorized_domains: HashMap::new(),
      cache_capacity_entries: MIN_CACHE_ENTRIES,
      log_level: LogLevel::Info,
      renewal_lock_ttl: Duration::from_secs(300),
      issuance_lock_ttl: Duration::from_secs(300),
      hard_expiry_grace: Duration::from_secs(46 * 24 * 3600),
    }
  }
}

impl EngineConfigBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn contact_email(mut self, email: impl Into<String>) -> Self {
    self.contact_email = Some(email.into());
    self
  }

  pub fn directory_url(mut self, url: impl Into<String>) -> Self {
    self.directory_url = url.into();
    self
  }

  pub fn store(mut self, store: Arc<dyn Store>) -> Self {
    self.store = Some(store);
    self
  }

  pub fn dns_provider(mut self, provider: Arc<dyn DnsChallengeProvider>) -> Self {
    self.dns_provider = Some(provider);
    self
  }

  pub fn authorize_domain(mut self, root_domain: impl Into<String>, subdomains: AuthorizedSubdomains) -> Self {
    self.authorized_domains.insert(root_domain.into(), subdomains);
    self
  }

  pub fn cache_capacity_entries(mut self, capacity: usize) -> Self {
    self.cache_capacity_entries = capacity;
    self
  }

  pub fn log_level(mut self, level: LogLevel) -> Self {
    self.log_level = level;
    self
  }

  /// Renewal-lock auto-expiry. The spec default (5 minutes) may be too short for slow CAs
  /// or DNS propagation; raise it rather than patching the crate if renewals are getting
  /// starved by a still-running prior attempt.
  pub fn renewal_lock_ttl(mut self, ttl: Duration) -> Self {
    self.renewal_lock_ttl = ttl;
    self
  }

  pub fn issuance_lock_ttl(mut self, ttl: Duration) -> Self {
    self.issuance_lock_ttl = ttl;
    self
  }

  pub fn build(self) -> Result<EngineConfig> {
    let contact_email = self
      .contact_email
      .ok_or_else(|| EngineError::Config("contact_email is required".into()))?;
    if !contact_email.contains('@') || contact_email.starts_with('@') || contact_email.ends_with('@') {
      return Err(EngineError::Config(format!("contact_email is not a valid address: {contact_email}")));
    }
    let store = self.store.ok_or_else(|| EngineError::Config("store is required".into()))?;
    if self.authorized_domains.is_empty() {
      return Err(EngineError::Config("authorized_domains must not be empty".into()));
    }
    for (root, subdomains) in &self.authorized_domains {
      for pattern in subdomains {
        if pattern.starts_with('*') && self.dns_provider.is_none() {
          return Err(EngineError::Config(format!(
            "wildcard subdomain pattern {pattern} for {root} requires a configured DNS provider"
          )));
        }
      }
    }
    let cache_capacity_entries = if self.cache_capacity_entries == 0 {
      0
    } else {
      self.cache_capacity_entries.max(MIN_CACHE_ENTRIES)
    };
    Ok(EngineConfig {
      contact_email,
      directory_url: self.directory_url,
      store,
      dns_provider: self.dns_provider,
      authorized_domains: self.authorized_domains,
      cache_capacity_entries,
      log_level: self.log_level,
      renewal_lock_ttl: self.renewal_lock_ttl,
      issuance_lock_ttl: self.issuance_lock_ttl,
      hard_expiry_grace: self.hard_expiry_grace,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;

  fn base_builder() -> EngineConfigBuilder {
    let mut subdomains = HashSet::new();
    subdomains.insert("foo.example.com".to_string());
    EngineConfigBuilder::new()
      .contact_email("admin@example.com")
      .store(Arc::new(MemoryStore::new()))
      .authorize_domain("example.com", subdomains)
  }

  #[test]
  fn rejects_missing_contact_email() {
    let result = EngineConfigBuilder::new().store(Arc::new(MemoryStore::new())).build();
    assert!(result.is_err());
  }

  #[test]
  fn rejects_empty_authorized_domains() {
    let result = EngineConfigBuilder::new()
      .contact_email("admin@example.com")
      .store(Arc::new(MemoryStore::new()))
      .build();
    assert!(result.is_err());
  }

  #[test]
  fn rejects_wildcard_pattern_without_dns_provider() {
    let mut subdomains = HashSet::new();
    subdomains.insert("*.example.com".to_string());
    let result = EngineConfigBuilder::new()
      .contact_email("admin@example.com")
      .store(Arc::new(MemoryStore::new()))
      .authorize_domain("example.com", subdomains)
      .build();
    assert!(result.is_err());
  }

  #[test]
  fn accepts_valid_configuration() {
    assert!(base_builder().build().is_ok());
  }
}
