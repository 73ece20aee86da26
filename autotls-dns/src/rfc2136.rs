use std::error::Error;

use async_trait::async_trait;
use autotls_core::dns::DnsChallengeProvider;
use dns_update::providers::rfc2136::DnsAddress;
use dns_update::{DnsUpdater, TsigAlgorithm};

use crate::zone::split_zone;

const TXT_TTL_SECS: u32 = 300;

/// Publishes DNS-01 TXT records via RFC 2136 dynamic update, authenticated with TSIG.
pub struct Rfc2136DnsProvider {
  client: DnsUpdater,
}

impl Rfc2136DnsProvider {
  pub fn new(addr: DnsAddress, key_name: &str, key: Vec<u8>, algorithm: TsigAlgorithm) -> dns_update::Result<Self> {
    Ok(Self {
      client: DnsUpdater::new_rfc2136_tsig(addr, key_name, key, algorithm)?,
    })
  }
}

#[async_trait]
impl DnsChallengeProvider for Rfc2136DnsProvider {
  async fn set_acme_txt_record(&self, record_name: &str, value: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    let (_, zone) = split_zone(record_name).await;
    self
      .client
      .create(record_name.to_string(), dns_update::DnsRecord::TXT { content: value.to_string() }, TXT_TTL_SECS, zone)
      .await
      .map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(())
  }

  async fn remove_acme_txt_record(&self, record_name: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    let (_, zone) = split_zone(record_name).await;
    self.client.delete(record_name.to_string(), zone).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(())
  }
}
