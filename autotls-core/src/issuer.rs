use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use instant_acme::{AuthorizationStatus, ChallengeType, Identifier, NewOrder, OrderStatus, RetryPolicy};

use crate::challenge::ChallengeBroker;
use crate::dns::DnsChallengeProvider;
use crate::error::{EngineError, Result};
use crate::logging::ErrorLogger;

/// The seam `CertificateManager` issues through. `Issuer` is the only production
/// implementation (it drives a real ACME order); tests substitute a lightweight mock so
/// the manager's lock/cache/expiry logic can be exercised without ACME network access.
#[async_trait]
pub trait CertificateObtainer: Send + Sync {
  async fn obtain(&self, names: &[String]) -> Result<(Vec<u8>, Vec<u8>)>;
}

/// Drives a single ACME order end to end: creates it, solves whichever challenge type is
/// available per authorization, finalizes, and downloads the chain.
///
/// Wildcard names are only ever handed to this issuer when a DNS provider is configured;
/// the caller enforces that upstream (`CertificateManager::issue`), not this type.
pub struct Issuer {
  account: Arc<instant_acme::Account>,
  challenge_broker: Arc<ChallengeBroker>,
  dns_provider: Option<Arc<dyn DnsChallengeProvider>>,
  logger: ErrorLogger,
}

impl Issuer {
  pub fn new(
    account: Arc<instant_acme::Account>,
    challenge_broker: Arc<ChallengeBroker>,
    dns_provider: Option<Arc<dyn DnsChallengeProvider>>,
    logger: ErrorLogger,
  ) -> Self {
    Self {
      account,
      challenge_broker,
      dns_provider,
      logger,
    }
  }

  async fn obtain_inner(&self, names: &[String]) -> Result<(Vec<u8>, Vec<u8>)> {
    if names.is_empty() {
      return Err(EngineError::IssuanceFailed("no names requested".into()));
    }
    if names.iter().any(|n| n.starts_with("*.")) && self.dns_provider.is_none() {
      return Err(EngineError::IssuanceFailed(
        "wildcard name requested without a configured DNS provider".into(),
      ));
    }

    let identifiers: Vec<Identifier> = names.iter().map(|n| Identifier::Dns(n.clone())).collect();
    let mut order = self
      .account
      .new_order(&NewOrder::new(&identifiers))
      .await
      .map_err(|e| EngineError::IssuanceFailed(format!("order creation failed: {e}")))?;

    let mut dns01_domains = Vec::new();
    let mut http01_challenges = Vec::new();
    let mut authorizations = order.authorizations();
    while let Some(authz) = authorizations.next().await {
      let mut authz = authz.map_err(|e| EngineError::IssuanceFailed(format!("fetching authorization failed: {e}")))?;
      match authz.status {
        AuthorizationStatus::Valid => continue,
        AuthorizationStatus::Pending => {}
        other => return Err(EngineError::IssuanceFailed(format!("authorization in unexpected state: {other:?}"))),
      }
      let Identifier::Dns(domain) = authz.identifier.clone();
      let is_wildcard = domain.starts_with("*.");

      if is_wildcard || !authz.challenges.iter().any(|c| c.r#type == ChallengeType::Http01) {
        self.present_dns01(&mut authz, &domain).await?;
        dns01_domains.push(domain);
      } else {
        let token = self.present_http01(&mut authz, &domain).await?;
        http01_challenges.push((domain, token));
      }
    }
    drop(authorizations);

    let order_status = order
      .poll_ready(&RetryPolicy::default())
      .await
      .map_err(|e| EngineError::IssuanceFailed(format!("polling order readiness failed: {e}")))?;
    if order_status != OrderStatus::Ready {
      return Err(EngineError::IssuanceFailed(format!("order did not become ready: {order_status:?}")));
    }

    let result = self.finalize_and_download(&mut order).await;

    for (domain, token) in http01_challenges {
      self.challenge_broker.clean_up(&domain, &token).await;
    }
    if let Some(provider) = &self.dns_provider {
      for domain in dns01_domains {
        let record_name = dns01_record_name(&domain);
        if let Err(e) = provider.remove_acme_txt_record(&record_name).await {
          self.logger.warning(format!("failed cleaning up TXT record {record_name}: {e}"));
        }
      }
    }

    result
  }

  /// Presents the HTTP-01 key authorization and returns the challenge token. The caller
  /// keeps the broker entry alive until the order has finished validating: the CA fetches
  /// `/.well-known/acme-challenge/<token>` only after `poll_ready`, well after this method
  /// returns, so cleanup here would delete the entry before it is ever read.
  async fn present_http01(&self, authz: &mut instant_acme::Authorization, domain: &str) -> Result<String> {
    let mut challenge = authz
      .challenge(ChallengeType::Http01)
      .ok_or_else(|| EngineError::IssuanceFailed(format!("no HTTP-01 challenge offered for {domain}")))?;
    let key_authorization = challenge.key_authorization();
    let token = challenge.token.clone();

    self.challenge_broker.present(domain, &token, key_authorization.as_str().as_bytes()).await?;

    challenge
      .set_ready()
      .await
      .map_err(|e| EngineError::IssuanceFailed(format!("failed to mark HTTP-01 challenge ready for {domain}: {e}")))?;

    Ok(token)
  }

  async fn present_dns01(&self, authz: &mut instant_acme::Authorization, domain: &str) -> Result<()> {
    let provider = self
      .dns_provider
      .as_ref()
      .ok_or_else(|| EngineError::IssuanceFailed(format!("DNS-01 required for {domain} but no provider configured")))?;

    let mut challenge = authz
      .challenge(ChallengeType::Dns01)
      .ok_or_else(|| EngineError::IssuanceFailed(format!("no DNS-01 challenge offered for {domain}")))?;
    let key_authorization = challenge.key_authorization();
    let record_name = dns01_record_name(domain);

    provider.remove_acme_txt_record(&record_name).await.unwrap_or_default();
    provider
      .set_acme_txt_record(&record_name, &key_authorization.dns_value())
      .await
      .map_err(|e| EngineError::IssuanceFailed(format!("failed setting TXT record {record_name}: {e}")))?;

    self.logger.debug(format!("waiting for DNS propagation of {record_name}"));
    tokio::time::sleep(Duration::from_secs(60)).await;

    challenge
      .set_ready()
      .await
      .map_err(|e| EngineError::IssuanceFailed(format!("failed to mark DNS-01 challenge ready for {domain}: {e}")))?;

    Ok(())
  }

  async fn finalize_and_download(&self, order: &mut instant_acme::Order) -> Result<(Vec<u8>, Vec<u8>)> {
    let private_key_pem = order
      .finalize()
      .await
      .map_err(|e| EngineError::IssuanceFailed(format!("finalize failed: {e}")))?;
    let cert_chain_pem = order
      .poll_certificate(&RetryPolicy::default())
      .await
      .map_err(|e| EngineError::IssuanceFailed(format!("polling certificate failed: {e}")))?;
    Ok((cert_chain_pem.into_bytes(), private_key_pem.into_bytes()))
  }
}

fn dns01_record_name(domain: &str) -> String {
  format!("_acme-challenge.{}", domain.trim_start_matches("*."))
}

#[async_trait]
impl CertificateObtainer for Issuer {
  async fn obtain(&self, names: &[String]) -> Result<(Vec<u8>, Vec<u8>)> {
    self.obtain_inner(names).await
  }
}
