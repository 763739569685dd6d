//! GitHub App installation token store
//!
//! Maps caller keys to `installation:<id>` references and mints short-lived
//! installation access tokens on demand. Tokens are cached per installation
//! (not per caller key - two keys pointing at the same installation share
//! the cached token) and reused until they come within the renewal margin
//! of expiry.
//!
//! The cache is the only shared mutable state in the process. A single
//! mutex guards it; the lock is released while a mint is in flight, so two
//! racing misses for the same installation may both mint. The second write
//! wins and both tokens are valid, so no single-flight machinery is needed.
//!
//! Mints run on a detached task: a caller that disconnects mid-mint cannot
//! cancel it, so the fresh token still lands in the cache for later callers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::EncodingKey;
use secrecy::SecretString;
use serde::Deserialize;

use super::jwt::{self, JwtError};
use super::{MappedToken, MappingError, TokenStore};

/// Cached tokens within this margin of expiry count as misses.
const RENEWAL_MARGIN_SECS: i64 = 60;
/// Safety buffer subtracted from the issuer's expiry before caching, so the
/// renewal margin never races the issuer's own clock.
const EXPIRY_BUFFER_SECS: i64 = 60;
/// Fallback lifetime when the issuer's `expires_at` cannot be parsed.
const FALLBACK_TTL_SECS: i64 = 3600;
/// Bound on the outbound mint request.
const MINT_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolves caller keys to GitHub App installation tokens.
pub struct InstallationTokenStore {
    app_id: u64,
    signing_key: EncodingKey,
    mapping: HashMap<String, MappedToken>,
    api_base: String,
    client: reqwest::Client,
    cache: Arc<Mutex<HashMap<u64, CachedToken>>>,
}

impl std::fmt::Debug for InstallationTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationTokenStore")
            .field("app_id", &self.app_id)
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error("invalid mapping for caller key '{key}': {source}")]
    Mapping { key: String, source: MappingError },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[derive(Debug, thiserror::Error)]
enum MintError {
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error("access token request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {status} creating installation token: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode installation token response: {0}")]
    Decode(serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    token: String,
    #[serde(default)]
    expires_at: Option<String>,
}

impl InstallationTokenStore {
    /// Builds a store, validating the private key and every mapping value.
    ///
    /// All validation happens here, once: an unparsable key or a malformed
    /// `installation:` reference is a startup error, never a per-request
    /// surprise.
    pub fn new(
        app_id: u64,
        private_key_pem: &SecretString,
        mapping: HashMap<String, String>,
        api_base: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let signing_key = jwt::load_signing_key(private_key_pem)?;

        let mut parsed = HashMap::with_capacity(mapping.len());
        for (key, value) in mapping {
            let mapped = MappedToken::parse(&value)
                .map_err(|source| StoreError::Mapping { key: key.clone(), source })?;
            parsed.insert(key, mapped);
        }

        let client = reqwest::Client::builder().timeout(MINT_TIMEOUT).build()?;
        let api_base = api_base.into().trim_end_matches('/').to_string();

        tracing::info!(
            app_id,
            api_base = %api_base,
            mappings = parsed.len(),
            "installation token store initialized"
        );

        Ok(Self {
            app_id,
            signing_key,
            mapping: parsed,
            api_base,
            client,
            cache: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn cached(&self, installation_id: u64) -> Option<String> {
        let cache = self.cache.lock().ok()?;
        let entry = cache.get(&installation_id)?;
        let remaining = entry.expires_at - Utc::now();
        if remaining > chrono::Duration::seconds(RENEWAL_MARGIN_SECS) {
            tracing::debug!(
                installation_id,
                remaining_secs = remaining.num_seconds(),
                "installation token cache hit"
            );
            Some(entry.token.clone())
        } else {
            None
        }
    }

    async fn installation_token(&self, installation_id: u64) -> Option<String> {
        if let Some(token) = self.cached(installation_id) {
            return Some(token);
        }

        tracing::info!(installation_id, "installation token cache miss, minting");

        // Spawned rather than awaited inline: if the caller's connection
        // drops and this future is cancelled, the mint still completes and
        // populates the cache for future callers.
        let minter = Minter {
            app_id: self.app_id,
            signing_key: self.signing_key.clone(),
            api_base: self.api_base.clone(),
            client: self.client.clone(),
            cache: Arc::clone(&self.cache),
        };
        match tokio::spawn(minter.mint_and_cache(installation_id)).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(installation_id, error = %e, "mint task failed");
                None
            }
        }
    }

    #[cfg(test)]
    fn seed_cache(&self, installation_id: u64, token: &str, expires_at: DateTime<Utc>) {
        self.cache.lock().unwrap().insert(
            installation_id,
            CachedToken {
                token: token.to_string(),
                expires_at,
            },
        );
    }
}

/// Owns everything one mint needs, so the work can outlive the caller.
struct Minter {
    app_id: u64,
    signing_key: EncodingKey,
    api_base: String,
    client: reqwest::Client,
    cache: Arc<Mutex<HashMap<u64, CachedToken>>>,
}

impl Minter {
    async fn mint_and_cache(self, installation_id: u64) -> Option<String> {
        match self.mint(installation_id).await {
            Ok(minted) => {
                let token = minted.token.clone();
                tracing::info!(
                    installation_id,
                    expires_at = %minted.expires_at.to_rfc3339(),
                    "minted and cached installation token"
                );
                if let Ok(mut cache) = self.cache.lock() {
                    cache.insert(installation_id, minted);
                }
                Some(token)
            }
            Err(e) => {
                tracing::warn!(installation_id, error = %e, "failed to mint installation token");
                None
            }
        }
    }

    async fn mint(&self, installation_id: u64) -> Result<CachedToken, MintError> {
        let assertion = jwt::sign_app_jwt(&self.signing_key, self.app_id)?;
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_base, installation_id
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", assertion))
            .header("Accept", "application/vnd.github+json")
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MintError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let parsed: AccessTokenResponse =
            serde_json::from_str(&body).map_err(MintError::Decode)?;

        // A token with an unparsable expiry is still usable; a conservative
        // fallback beats failing the whole mint over a timestamp format.
        let upstream_expiry = match parsed
            .expires_at
            .as_deref()
            .map(DateTime::parse_from_rfc3339)
        {
            Some(Ok(ts)) => ts.with_timezone(&Utc),
            _ => {
                tracing::warn!(
                    installation_id,
                    "unparsable expires_at in token response, using 1 hour fallback"
                );
                Utc::now() + chrono::Duration::seconds(FALLBACK_TTL_SECS)
            }
        };

        Ok(CachedToken {
            token: parsed.token,
            expires_at: upstream_expiry - chrono::Duration::seconds(EXPIRY_BUFFER_SECS),
        })
    }
}

#[async_trait]
impl TokenStore for InstallationTokenStore {
    async fn resolve(&self, caller_key: &str) -> Option<String> {
        match self.mapping.get(caller_key)? {
            MappedToken::Direct(token) => {
                tracing::debug!("resolved caller key to direct credential");
                Some(token.clone())
            }
            MappedToken::Installation(id) => self.installation_token(*id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    const PKCS8_PEM: &str = include_str!("../../tests/fixtures/test_pkcs8.pem");

    fn store_with(
        mapping: &[(&str, &str)],
        api_base: &str,
    ) -> Result<InstallationTokenStore, StoreError> {
        let mapping = mapping
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        InstallationTokenStore::new(
            123456,
            &SecretString::from(PKCS8_PEM.to_string()),
            mapping,
            api_base,
        )
    }

    fn mint_mock<'a>(
        server: &'a MockServer,
        installation_id: u64,
        token: &str,
    ) -> httpmock::Mock<'a> {
        let expires = (Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        server.mock(|when, then| {
            when.method(POST)
                .path(format!(
                    "/app/installations/{}/access_tokens",
                    installation_id
                ))
                .header("accept", "application/vnd.github+json");
            then.status(201)
                .json_body(json!({ "token": token, "expires_at": expires }));
        })
    }

    #[test]
    fn test_construction_rejects_malformed_installation_ref() {
        let err = store_with(&[("tok", "installation:abc")], "http://localhost").unwrap_err();
        assert!(matches!(err, StoreError::Mapping { .. }));
    }

    #[test]
    fn test_construction_rejects_bad_private_key() {
        let err = InstallationTokenStore::new(
            1,
            &SecretString::from("garbage".to_string()),
            HashMap::new(),
            "http://localhost",
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Jwt(_)));
    }

    #[tokio::test]
    async fn test_mint_populates_cache_and_second_resolve_hits() {
        let server = MockServer::start_async().await;
        let mock = mint_mock(&server, 555, "ghs_minted");
        let store = store_with(&[("tok1", "installation:555")], &server.base_url()).unwrap();

        let first = store.resolve("tok1").await.unwrap();
        assert_eq!(first, "ghs_minted");
        mock.assert_hits(1);

        // Immediate second resolve: cache hit, no further mint calls.
        let second = store.resolve("tok1").await.unwrap();
        assert_eq!(second, "ghs_minted");
        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn test_unmapped_key_makes_no_network_calls() {
        let server = MockServer::start_async().await;
        let mock = mint_mock(&server, 555, "ghs_minted");
        let store = store_with(&[("tok1", "installation:555")], &server.base_url()).unwrap();

        assert_eq!(store.resolve("unknown").await, None);
        assert_eq!(store.resolve("").await, None);
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn test_direct_mapping_bypasses_minting() {
        let server = MockServer::start_async().await;
        let mock = mint_mock(&server, 555, "ghs_minted");
        let store = store_with(&[("tokA", "direct-pat-value")], &server.base_url()).unwrap();

        assert_eq!(store.resolve("tokA").await.as_deref(), Some("direct-pat-value"));
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn test_cache_hit_inside_window() {
        let server = MockServer::start_async().await;
        let mock = mint_mock(&server, 555, "ghs_fresh");
        let store = store_with(&[("tok1", "installation:555")], &server.base_url()).unwrap();

        store.seed_cache(555, "ghs_cached", Utc::now() + chrono::Duration::minutes(5));
        assert_eq!(store.resolve("tok1").await.as_deref(), Some("ghs_cached"));
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn test_renewal_margin_forces_remint() {
        let server = MockServer::start_async().await;
        let mock = mint_mock(&server, 555, "ghs_fresh");
        let store = store_with(&[("tok1", "installation:555")], &server.base_url()).unwrap();

        // Within one minute of expiry: treated as already expired.
        store.seed_cache(555, "ghs_stale", Utc::now() + chrono::Duration::seconds(30));
        assert_eq!(store.resolve("tok1").await.as_deref(), Some("ghs_fresh"));
        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn test_cancelled_caller_still_populates_cache() {
        let server = MockServer::start_async().await;
        let expires = (Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/app/installations/555/access_tokens");
            then.status(201)
                .delay(Duration::from_millis(500))
                .json_body(json!({ "token": "ghs_survivor", "expires_at": expires }));
        });
        let store =
            Arc::new(store_with(&[("tok1", "installation:555")], &server.base_url()).unwrap());

        // Caller disconnects while the mint is still in flight.
        let caller = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.resolve("tok1").await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        caller.abort();
        assert!(caller.await.is_err());

        // The detached mint finishes anyway; the next caller is a cache hit
        // and no second mint call reaches the endpoint.
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(store.resolve("tok1").await.as_deref(), Some("ghs_survivor"));
        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn test_mint_failure_resolves_to_none_and_caches_nothing() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST).path("/app/installations/555/access_tokens");
            then.status(502).body("upstream broken");
        });
        let store = store_with(&[("tok1", "installation:555")], &server.base_url()).unwrap();

        assert_eq!(store.resolve("tok1").await, None);
        assert_eq!(store.resolve("tok1").await, None);
        // A failed mint is never cached, so both resolves hit the endpoint.
        mock.assert_hits(2);
    }

    #[tokio::test]
    async fn test_malformed_body_resolves_to_none() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/app/installations/555/access_tokens");
            then.status(200).body("not json at all");
        });
        let store = store_with(&[("tok1", "installation:555")], &server.base_url()).unwrap();

        assert_eq!(store.resolve("tok1").await, None);
    }

    #[tokio::test]
    async fn test_unparsable_expiry_falls_back_to_one_hour() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST).path("/app/installations/555/access_tokens");
            then.status(201)
                .json_body(json!({ "token": "ghs_odd_expiry", "expires_at": "next tuesday" }));
        });
        let store = store_with(&[("tok1", "installation:555")], &server.base_url()).unwrap();

        // Token is still usable despite the expiry format...
        assert_eq!(store.resolve("tok1").await.as_deref(), Some("ghs_odd_expiry"));
        // ...and it was cached with the fallback lifetime.
        assert_eq!(store.resolve("tok1").await.as_deref(), Some("ghs_odd_expiry"));
        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn test_jwt_assertion_sent_as_bearer() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/app/installations/9/access_tokens")
                .header_matches("authorization", r"^Bearer [A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+$");
            then.status(201)
                .json_body(json!({ "token": "ghs_x", "expires_at": (Utc::now() + chrono::Duration::hours(1)).to_rfc3339() }));
        });
        let store = store_with(&[("tok", "installation:9")], &server.base_url()).unwrap();

        assert!(store.resolve("tok").await.is_some());
        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn test_concurrent_resolutions_stay_isolated() {
        let server = MockServer::start_async().await;
        mint_mock(&server, 1, "ghs_for_one");
        mint_mock(&server, 2, "ghs_for_two");
        let store = Arc::new(
            store_with(
                &[
                    ("tokA", "installation:1"),
                    ("tokB", "installation:2"),
                    ("tokC", "direct-credential"),
                ],
                &server.base_url(),
            )
            .unwrap(),
        );

        let mut handles = Vec::new();
        for _ in 0..8 {
            for (key, expected) in [
                ("tokA", "ghs_for_one"),
                ("tokB", "ghs_for_two"),
                ("tokC", "direct-credential"),
            ] {
                let store = store.clone();
                handles.push(tokio::spawn(async move {
                    let got = store.resolve(key).await.unwrap();
                    assert_eq!(got, expected, "caller {} got the wrong credential", key);
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
