use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;

/// Walks a fully qualified record name label by label, probing for an SOA record at each
/// suffix, to find the zone a DNS-01 provider must publish the TXT record in.
///
/// Returns `(subdomain, zone)`: `zone` is the suffix with an SOA record, `subdomain` is
/// whatever remains in front of it (empty when the whole name is itself the zone apex).
pub async fn split_zone(record_name: &str) -> (String, String) {
  let labels: Vec<&str> = record_name.strip_suffix('.').unwrap_or(record_name).split('.').collect();

  let resolver = hickory_resolver::Resolver::builder_tokio()
    .unwrap_or_else(|_| hickory_resolver::Resolver::builder_with_config(ResolverConfig::default(), TokioConnectionProvider::default()))
    .build();

  for index in 0..labels.len() {
    let candidate = format!("{}.", labels[index..].join("."));
    if resolver.soa_lookup(candidate).await.is_ok() {
      return (labels[..index].join("."), labels[index..].join("."));
    }
  }
  (String::new(), labels.join("."))
}
