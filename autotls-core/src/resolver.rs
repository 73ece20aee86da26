use std::collections::HashMap;
use std::sync::Arc;

use rustls::crypto::aws_lc_rs::sign::any_supported_type;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

use crate::domain::{effective_registrable_domain, equal_domain, normalize_server_name};
use crate::error::{EngineError, Result};
use crate::manager::CertificateManager;

/// Parses a PEM certificate chain and PEM private key back into the runtime certificate
/// object the TLS stack wants. Kept as a single named operation so a caller targeting a
/// different TLS stack has one conversion point to replace.
pub fn build_certified_key(cert_chain_pem: &[u8], private_key_pem: &[u8]) -> Result<CertifiedKey> {
  let malformed = |what: &str| EngineError::IssuanceFailed(format!("could not parse {what} for TLS"));
  let chain: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut &cert_chain_pem[..])
    .collect::<std::result::Result<_, _>>()
    .map_err(|_| malformed("certificate chain"))?;
  if chain.is_empty() {
    return Err(malformed("certificate chain"));
  }
  let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut &private_key_pem[..])
    .map_err(|_| malformed("private key"))?
    .ok_or_else(|| malformed("private key"))?;
  let signing_key = any_supported_type(&key).map_err(|_| malformed("private key"))?;
  Ok(CertifiedKey::new(chain, signing_key))
}

/// Allow-list-driven on-demand resolver: serves an existing record for any requested
/// name, and only consults `AuthorizedDomains` before triggering fresh issuance.
pub struct SniResolver {
  manager: Arc<CertificateManager>,
  authorized_domains: HashMap<String, Vec<String>>,
}

impl SniResolver {
  pub fn new(manager: Arc<CertificateManager>, authorized_domains: HashMap<String, Vec<String>>) -> Self {
    Self {
      manager,
      authorized_domains,
    }
  }

  pub async fn resolve_certificate(&self, server_name: &str) -> Result<(Vec<u8>, Vec<u8>)> {
    let name = normalize_server_name(server_name)?;
    let erd = effective_registrable_domain(&name)?;

    match self.manager.retrieve(&erd).await {
      Ok(pair) => Ok(pair),
      Err(EngineError::NotFound) | Err(EngineError::Expired) => {
        let subdomains = self
          .authorized_domains
          .get(&erd)
          .ok_or_else(|| EngineError::NotAuthorized(erd.clone()))?;
        let mut names = vec![erd.clone()];
        let mut rest: Vec<String> = subdomains.clone();
        rest.sort();
        names.extend(rest);
        self.manager.issue(&erd, names, true).await
      }
      Err(other) => Err(other),
    }
  }
}

/// Allow-list resolver keyed on exact or wildcard hostname patterns rather than a
/// per-root subdomain map.
///
/// Note: if a record already exists for the computed ERD it is returned regardless of
/// whether the *specific requested name* matches the allow-list. This mirrors the
/// behavior of the system this was distilled from; it may be surprising (a name outside
/// the allow-list can still receive service once any name under the same ERD has been
/// provisioned) but is implemented as specified rather than silently tightened.
pub struct WhitelistResolver {
  manager: Arc<CertificateManager>,
  patterns: Vec<String>,
}

impl WhitelistResolver {
  pub fn new(manager: Arc<CertificateManager>, patterns: Vec<String>) -> Self {
    Self { manager, patterns }
  }

  pub async fn resolve_certificate(&self, server_name: &str) -> Result<(Vec<u8>, Vec<u8>)> {
    let name = normalize_server_name(server_name)?;
    let erd = effective_registrable_domain(&name)?;

    match self.manager.retrieve(&erd).await {
      Ok(pair) => Ok(pair),
      Err(EngineError::NotFound) | Err(EngineError::Expired) => {
        if !self.patterns.iter().any(|pattern| equal_domain(pattern, &name)) {
          return Err(EngineError::NotAuthorized(name));
        }
        let mut names: Vec<String> = self
          .patterns
          .iter()
          .filter(|pattern| effective_registrable_domain(pattern).map(|e| e == erd).unwrap_or(false))
          .cloned()
          .collect();
        names.sort();
        names.retain(|n| n != &erd);
        names.insert(0, erd.clone());
        self.manager.issue(&erd, names, true).await
      }
      Err(other) => Err(other),
    }
  }
}

/// What the two resolver flavors have in common from rustls's point of view.
#[async_trait::async_trait]
pub trait CertificateResolver: Send + Sync {
  async fn resolve_certificate(&self, server_name: &str) -> Result<(Vec<u8>, Vec<u8>)>;
}

#[async_trait::async_trait]
impl CertificateResolver for SniResolver {
  async fn resolve_certificate(&self, server_name: &str) -> Result<(Vec<u8>, Vec<u8>)> {
    SniResolver::resolve_certificate(self, server_name).await
  }
}

#[async_trait::async_trait]
impl CertificateResolver for WhitelistResolver {
  async fn resolve_certificate(&self, server_name: &str) -> Result<(Vec<u8>, Vec<u8>)> {
    WhitelistResolver::resolve_certificate(self, server_name).await
  }
}

/// Bridges the async `CertificateResolver` onto rustls's synchronous `resolve` hook, the
/// way the teacher's resolvers reach into locked shared state from inside a sync
/// callback: `resolve` runs on a runtime worker thread, so `block_in_place` plus
/// `Handle::block_on` is safe here and does not stall the whole runtime.
pub struct RustlsResolverBridge {
  resolver: Arc<dyn CertificateResolver>,
  runtime: tokio::runtime::Handle,
}

impl RustlsResolverBridge {
  pub fn new(resolver: Arc<dyn CertificateResolver>, runtime: tokio::runtime::Handle) -> Self {
    Self { resolver, runtime }
  }
}

impl std::fmt::Debug for RustlsResolverBridge {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RustlsResolverBridge").finish_non_exhaustive()
  }
}

impl ResolvesServerCert for RustlsResolverBridge {
  fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
    let server_name = client_hello.server_name()?.to_string();
    let resolver = self.resolver.clone();
    let result = tokio::task::block_in_place(|| self.runtime.block_on(resolver.resolve_certificate(&server_name)));
    let (chain_pem, key_pem) = result.ok()?;
    build_certified_key(&chain_pem, &key_pem).ok().map(Arc::new)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::RecordCache;
  use crate::issuer::CertificateObtainer;
  use crate::logging::ErrorLogger;
  use crate::store::MemoryStore;
  use crate::store::Store;
  use std::time::Duration;

  struct StubObtainer;

  #[async_trait::async_trait]
  impl CertificateObtainer for StubObtainer {
    async fn obtain(&self, _names: &[String]) -> Result<(Vec<u8>, Vec<u8>)> {
      Ok((b"chain".to_vec(), b"key".to_vec()))
    }
  }

  fn manager_with_store(store: Arc<MemoryStore>) -> Arc<CertificateManager> {
    CertificateManager::new(
      store,
      RecordCache::new(0),
      Arc::new(StubObtainer),
      Duration::from_secs(300),
      Duration::from_secs(300),
      Duration::from_secs(46 * 24 * 3600),
      ErrorLogger::disabled(),
    )
  }

  #[tokio::test]
  async fn sni_resolver_issues_for_authorized_subdomain() {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let manager = manager_with_store(store);
    let mut authorized = HashMap::new();
    authorized.insert("example.com".to_string(), vec!["foo.example.com".to_string()]);
    let resolver = SniResolver::new(manager, authorized);
    let result = resolver.resolve_certificate("foo.example.com").await;
    assert!(result.is_ok());
  }

  #[tokio::test]
  async fn sni_resolver_rejects_unauthorized_domain() {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let manager = manager_with_store(store);
    let resolver = SniResolver::new(manager, HashMap::new());
    let result = resolver.resolve_certificate("foo.example.com").await;
    assert!(matches!(result, Err(EngineError::NotAuthorized(_))));
  }

  #[tokio::test]
  async fn whitelist_resolver_allows_exact_pattern() {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let manager = manager_with_store(store);
    let resolver = WhitelistResolver::new(manager, vec!["api-*.example.com".to_string()]);
    assert!(resolver.resolve_certificate("api-v2.example.com").await.is_ok());
  }

  #[tokio::test]
  async fn whitelist_resolver_rejects_name_outside_allow_list() {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let manager = manager_with_store(store);
    let resolver = WhitelistResolver::new(manager, vec!["api-*.example.com".to_string()]);
    let result = resolver.resolve_certificate("www.example.com").await;
    assert!(matches!(result, Err(EngineError::NotAuthorized(_))));
  }

  #[tokio::test]
  async fn whitelist_resolver_serves_existing_record_to_any_name_under_the_erd() {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let manager = manager_with_store(store.clone());
    // Seed a record directly so "a cert already exists" is true without provisioning
    // through the allow-list.
    let now = crate::store::now_unix();
    let record = crate::record::CertificateRecord::new(
      "example.com".to_string(),
      vec!["example.com".to_string()],
      now + 1000,
      b"chain".to_vec(),
      b"key".to_vec(),
    );
    store
      .set_kv("certificates/example.com", record.encode(), None)
      .await
      .unwrap();
    let resolver = WhitelistResolver::new(manager, vec!["only-this.example.com".to_string()]);
    // "unrelated.example.com" is not in the allow-list, but an ERD record already exists.
    let result = resolver.resolve_certificate("unrelated.example.com").await;
    assert!(result.is_ok());
  }
}
