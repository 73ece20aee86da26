use crate::error::{EngineError, Result};

/// Lowercases and trims leading/trailing dots from a server name, the way a ClientHello's
/// server name is normalized before any lookup keys on it.
pub fn normalize_server_name(name: &str) -> Result<String> {
  if name.is_empty() {
    return Err(EngineError::BadName("empty server name".into()));
  }
  let trimmed = name.trim_matches('.').to_lowercase();
  if trimmed.is_empty() {
    return Err(EngineError::BadName(name.to_string()));
  }
  Ok(trimmed)
}

/// Computes the effective registrable domain (the longest suffix one label beneath a
/// public suffix) for a normalized domain name.
pub fn effective_registrable_domain(name: &str) -> Result<String> {
  let domain = psl::domain(name.as_bytes()).ok_or_else(|| EngineError::BadName(name.to_string()))?;
  std::str::from_utf8(domain.as_bytes())
    .map(|s| s.to_string())
    .map_err(|_| EngineError::BadName(name.to_string()))
}

/// Bidirectional label-by-label domain comparison with wildcard support. Either side may
/// carry a `*` in a whole label or mixed in with literal characters; label counts must
/// match exactly.
pub fn equal_domain(a: &str, b: &str) -> bool {
  let a = a.to_lowercase();
  let b = b.to_lowercase();
  let a_labels: Vec<&str> = a.split('.').collect();
  let b_labels: Vec<&str> = b.split('.').collect();
  if a_labels.len() != b_labels.len() {
    return false;
  }
  for (la, lb) in a_labels.iter().zip(b_labels.iter()) {
    if la == lb || *la == "*" || *lb == "*" {
      continue;
    }
    if la.contains('*') {
      if wildcard_match(la, lb) {
        continue;
      }
      return false;
    }
    if lb.contains('*') {
      if wildcard_match(lb, la) {
        continue;
      }
      return false;
    }
    return false;
  }
  true
}

/// Matches a single label glob (`pattern`, containing one or more `*`) against a literal
/// label (`value`).
fn wildcard_match(pattern: &str, value: &str) -> bool {
  let parts: Vec<&str> = pattern.split('*').collect();
  if parts.len() == 1 {
    return pattern == value;
  }
  let mut rest = value;
  if !rest.starts_with(parts[0]) {
    return false;
  }
  rest = &rest[parts[0].len()..];
  for part in &parts[1..parts.len() - 1] {
    if part.is_empty() {
      continue;
    }
    match rest.find(part) {
      Some(idx) => rest = &rest[idx + part.len()..],
      None => return false,
    }
  }
  let last = parts[parts.len() - 1];
  rest.ends_with(last)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalizes_case_and_dots() {
    assert_eq!(normalize_server_name("Example.COM.").unwrap(), "example.com");
  }

  #[test]
  fn rejects_empty_name() {
    assert!(normalize_server_name("").is_err());
  }

  #[test]
  fn erd_groups_multi_label_suffix() {
    assert_eq!(effective_registrable_domain("a.b.co.uk").unwrap(), "b.co.uk");
  }

  #[test]
  fn erd_rejects_bare_public_suffix() {
    assert!(effective_registrable_domain("com").is_err());
  }

  #[test]
  fn wildcard_whole_label_matches_either_side() {
    assert!(equal_domain("*.example.com", "a.example.com"));
    assert!(equal_domain("a.example.com", "*.example.com"));
  }

  #[test]
  fn wildcard_requires_matching_label_count() {
    assert!(!equal_domain("*.example.com", "a.b.example.com"));
  }

  #[test]
  fn glob_label_matches_prefix_pattern() {
    assert!(equal_domain("api-*.x.y", "api-v2.x.y"));
    assert!(!equal_domain("api-*.x.y", "www.x.y"));
  }

  #[test]
  fn glob_label_with_multiple_stars() {
    assert!(wildcard_match("a*b*c", "axxbyyc"));
    assert!(!wildcard_match("a*b*c", "axxbyy"));
  }
}
