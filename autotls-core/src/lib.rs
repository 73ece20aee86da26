//! On-demand TLS certificate lifecycle engine: SNI resolution, ACME issuance and
//! renewal, and the HTTP-01 challenge side-channel.
//!
//! The generic HTTP router, the concrete ACME JWS/order plumbing (via `instant-acme`),
//! and the ~100 vendor DNS adapters are treated as external collaborators; this crate
//! owns everything between "a ClientHello arrived" and "here is a certificate".

pub mod account;
pub mod cache;
pub mod challenge;
pub mod config;
pub mod dns;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod issuer;
pub mod logging;
pub mod manager;
pub mod record;
pub mod resolver;
pub mod store;

use std::collections::HashMap;
use std::sync::Arc;

use rustls::sign::CertifiedKey;

pub use config::{AuthorizedSubdomains, EngineConfig, EngineConfigBuilder, PRODUCTION_DIRECTORY, STAGING_DIRECTORY};
pub use error::{EngineError, Result};
pub use logging::{LogLevel, LogMessage};
pub use record::CertificateRecord;

use account::load_or_create_account_shared;
use cache::RecordCache;
use challenge::ChallengeBroker;
use http_client::HttpsClient;
use issuer::Issuer;
use logging::ErrorLogger;
use manager::CertificateManager;
use resolver::{build_certified_key, CertificateResolver, RustlsResolverBridge, SniResolver};

const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// Owns every piece of in-process state the certificate lifecycle needs: the ACME
/// account, the challenge broker, the certificate manager, and the SNI resolver built
/// from `AuthorizedDomains`.
///
/// The source this was distilled from reaches for process-global mutable singletons
/// (settings, logger, ACME client, cache); this is the explicit value that replaces all
/// of them. Construct one with `Engine::build` and share it behind an `Arc` across every
/// handshake and every HTTP-80 request that needs it.
pub struct Engine {
  challenge_broker: Arc<ChallengeBroker>,
  manager: Arc<CertificateManager>,
  resolver: Arc<SniResolver>,
  logger: ErrorLogger,
}

impl Engine {
  /// Runs every suspension point init needs: loading or registering the ACME account
  /// (persisting *before* returning, per the source's "isNew" ordering, so a crash
  /// between registration and the first solved challenge still finds the account on
  /// restart instead of silently re-registering) and wiring the manager and resolver
  /// around it.
  pub async fn build(config: EngineConfig) -> Result<Self> {
    let (logger, receiver) = logging::build_logger(config.log_level);
    if let Some(receiver) = receiver {
      tokio::spawn(async move {
        while let Ok(message) = receiver.recv().await {
          eprintln!("[{}] {}", message.level, message.message);
        }
      });
    }

    let account = load_or_create_account_shared(
      config.store.as_ref(),
      Box::new(HttpsClient::new()),
      &config.directory_url,
      &config.contact_email,
      None,
      &logger,
    )
    .await?;

    let challenge_broker = Arc::new(ChallengeBroker::new(config.store.clone()));
    let issuer = Arc::new(Issuer::new(account, challenge_broker.clone(), config.dns_provider.clone(), logger.clone()));
    let cache = RecordCache::new(config.cache_capacity_entries);
    let manager = CertificateManager::new(
      config.store.clone(),
      cache,
      issuer,
      config.issuance_lock_ttl,
      config.renewal_lock_ttl,
      config.hard_expiry_grace,
      logger.clone(),
    );

    let authorized_domains: HashMap<String, Vec<String>> = config
      .authorized_domains
      .iter()
      .map(|(root, subdomains)| (root.clone(), subdomains.iter().cloned().collect()))
      .collect();
    let resolver = Arc::new(SniResolver::new(manager.clone(), authorized_domains));

    Ok(Self {
      challenge_broker,
      manager,
      resolver,
      logger,
    })
  }

  /// The HTTPS-side callback consumable by any TLS library exposing an SNI hook: resolves
  /// a server name to a PEM certificate chain and matching PEM private key.
  pub async fn get_certificate_pem(&self, server_name: &str) -> Result<(Vec<u8>, Vec<u8>)> {
    self.resolver.resolve_certificate(server_name).await
  }

  /// Resolves straight to a rustls `CertifiedKey`, for callers that don't want to parse
  /// PEM themselves.
  pub async fn get_certificate(&self, server_name: &str) -> Result<Arc<CertifiedKey>> {
    let (chain_pem, key_pem) = self.get_certificate_pem(server_name).await?;
    build_certified_key(&chain_pem, &key_pem).map(Arc::new)
  }

  /// A `rustls::server::ResolvesServerCert` bridging this engine's async resolution onto
  /// rustls's synchronous SNI hook.
  pub fn rustls_resolver(self: &Arc<Self>, runtime: tokio::runtime::Handle) -> RustlsResolverBridge {
    RustlsResolverBridge::new(self.resolver.clone() as Arc<dyn CertificateResolver>, runtime)
  }

  /// The HTTP-80 side-channel. The host router MUST forward any request whose path is
  /// prefixed with `/.well-known/acme-challenge/` here. Returns `None` when `path` isn't
  /// a challenge path at all (the router should fall through to its normal handling);
  /// `Some(Err(NotFound))` corresponds to a 404, `Some(Ok(bytes))` to a 200 with `bytes`
  /// as the body verbatim.
  pub async fn serve_http01_challenge(&self, path: &str, host: &str) -> Option<Result<Vec<u8>>> {
    let token = path.strip_prefix(ACME_CHALLENGE_PREFIX)?;
    if token.is_empty() {
      return Some(Err(EngineError::NotFound));
    }
    let host = host.trim().to_lowercase();
    Some(self.challenge_broker.serve(&host, token).await)
  }

  /// Idempotent provisioning entry point: ensures a live certificate exists for the given
  /// names (`names[0]` is treated as the effective registrable domain), issuing one if
  /// absent. Useful for pre-warming a certificate outside the handshake path.
  pub async fn ensure_certificate(&self, names: Vec<String>) -> Result<()> {
    self.manager.ensure(names).await
  }

  pub fn log_level(&self) -> LogLevel {
    self.logger.level()
  }
}
