use std::sync::Arc;

use instant_acme::{Account, AccountCredentials, ExternalAccountKey, HttpClient, NewAccount};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::logging::ErrorLogger;
use crate::store::Store;

const ACCOUNT_KEY: &str = "user/account.json";

/// What is actually persisted under `user/account.json`. `credentials` bundles the
/// account's private key and directory URLs as a single opaque unit; once loaded the
/// engine only ever holds the resulting `Account` handle, not this struct, so the key
/// material does not linger in memory longer than the load/save round trip.
#[derive(Serialize, Deserialize)]
struct StoredAccount {
  contact_email: String,
  credentials: AccountCredentials,
}

/// Loads the deployment's single ACME account, creating and registering it on first run.
///
/// The creation branch persists the account *before* returning, so a crash between
/// registration and the first solved challenge still finds the account on restart rather
/// than silently re-registering.
pub async fn load_or_create_account(
  store: &dyn Store,
  http_client: Box<dyn HttpClient>,
  directory_url: &str,
  contact_email: &str,
  external_account: Option<&ExternalAccountKey>,
  logger: &ErrorLogger,
) -> Result<Account> {
  match store.get_kv(ACCOUNT_KEY).await {
    Ok(bytes) => {
      let stored: StoredAccount = serde_json::from_slice(&bytes).map_err(|e| EngineError::StoreError(e.to_string()))?;
      logger.debug(format!("loaded existing ACME account for {}", stored.contact_email));
      Account::from_credentials_and_http(stored.credentials, http_client)
        .await
        .map_err(|e| EngineError::IssuanceFailed(format!("failed to restore ACME account: {e}")))
    }
    Err(EngineError::NotFound) => {
      logger.info("no ACME account on record, registering a new one");
      let contact = format!("mailto:{contact_email}");
      let new_account = NewAccount {
        contact: &[&contact],
        terms_of_service_agreed: true,
        only_return_existing: false,
      };
      let (account, credentials) = Account::builder_with_http(http_client)
        .create(&new_account, directory_url.to_string(), external_account)
        .await
        .map_err(|e| EngineError::IssuanceFailed(format!("account registration failed: {e}")))?;
      let stored = StoredAccount {
        contact_email: contact_email.to_string(),
        credentials,
      };
      let bytes = serde_json::to_vec(&stored).map_err(|e| EngineError::StoreError(e.to_string()))?;
      store.set_kv(ACCOUNT_KEY, bytes, None).await?;
      Ok(account)
    }
    Err(other) => Err(other),
  }
}

/// Convenience wrapper so callers hold one `Arc<Account>` rather than re-deriving it.
pub async fn load_or_create_account_shared(
  store: &dyn Store,
  http_client: Box<dyn HttpClient>,
  directory_url: &str,
  contact_email: &str,
  external_account: Option<&ExternalAccountKey>,
  logger: &ErrorLogger,
) -> Result<Arc<Account>> {
  load_or_create_account(store, http_client, directory_url, contact_email, external_account, logger)
    .await
    .map(Arc::new)
}
