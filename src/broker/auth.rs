/// Access token lifecycle for the KIS REST API
use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::broker::endpoints;
use crate::broker::token_store::{Credential, TokenStore};
use crate::error::{KisError, Result};
use crate::utils::token_cache_key;

/// Used when the issuance response omits `expires_in`
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 86_400;

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    appkey: &'a str,
    appsecret: &'a str,
}

#[derive(Debug, Serialize)]
struct ApprovalRequest<'a> {
    grant_type: &'a str,
    appkey: &'a str,
    secretkey: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    // Failure shapes: OAuth style and KIS style
    error_code: Option<String>,
    error_description: Option<String>,
    msg_cd: Option<String>,
    msg1: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApprovalResponse {
    approval_key: Option<String>,
}

/// Owns the bearer credential; every authenticated request goes through
/// [`AuthManager::get_headers`].
pub struct AuthManager {
    app_key: String,
    app_secret: String,
    base_url: String,
    client: Client,
    store: Arc<dyn TokenStore>,
    cache_key: String,
    safety_margin: Duration,
    credential: RwLock<Option<Credential>>,
    /// Serializes refreshes; held across the network call
    refresh_lock: Mutex<()>,
}

impl AuthManager {
    pub fn new(
        app_key: impl Into<String>,
        app_secret: impl Into<String>,
        base_url: impl Into<String>,
        store: Arc<dyn TokenStore>,
        safety_margin: Duration,
    ) -> Self {
        Self::with_client(app_key, app_secret, base_url, store, safety_margin, Client::new())
    }

    pub fn with_client(
        app_key: impl Into<String>,
        app_secret: impl Into<String>,
        base_url: impl Into<String>,
        store: Arc<dyn TokenStore>,
        safety_margin: Duration,
        client: Client,
    ) -> Self {
        let app_key = app_key.into();
        let cache_key = token_cache_key(&app_key);

        let cached = store.load(&cache_key).filter(|c| c.expires_at > Utc::now());
        if let Some(credential) = &cached {
            info!(
                "Reusing cached access token ({} minutes left)",
                credential.minutes_until_expiry()
            );
        }

        AuthManager {
            app_key,
            app_secret: app_secret.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            store,
            cache_key,
            safety_margin,
            credential: RwLock::new(cached),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn app_key(&self) -> &str {
        &self.app_key
    }

    /// Authorization header set for one request, refreshing first if needed
    pub async fn get_headers(&self) -> Result<HeaderMap> {
        let token = self.access_token().await?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", token))?);
        headers.insert("appkey", header_value(&self.app_key)?);
        headers.insert("appsecret", header_value(&self.app_secret)?);
        headers.insert("custtype", HeaderValue::from_static("P"));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        Ok(headers)
    }

    /// Valid bearer token, refreshing at most once across concurrent callers
    pub async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.usable_token().await {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while this one waited
        if let Some(token) = self.usable_token().await {
            return Ok(token);
        }

        let credential = self.refresh_locked().await?;
        Ok(credential.token)
    }

    /// True if no credential is held or it is inside the safety margin
    pub async fn is_expired(&self) -> bool {
        let credential = self.credential.read().await;
        is_expired_at(credential.as_ref(), Utc::now(), self.safety_margin)
    }

    /// Force a token issuance regardless of the held credential
    pub async fn refresh(&self) -> Result<Credential> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Drop the in-memory credential so the next call re-issues.
    ///
    /// For callers that received [`KisError::TokenExpired`] from the vendor.
    pub async fn invalidate(&self) {
        let mut credential = self.credential.write().await;
        *credential = None;
        warn!("Access token invalidated");
    }

    pub async fn current_credential(&self) -> Option<Credential> {
        self.credential.read().await.clone()
    }

    async fn usable_token(&self) -> Option<String> {
        let credential = self.credential.read().await;
        credential
            .as_ref()
            .filter(|c| c.is_usable_at(Utc::now(), self.safety_margin))
            .map(|c| c.token.clone())
    }

    async fn refresh_locked(&self) -> Result<Credential> {
        info!("Requesting new access token");

        let request = TokenRequest {
            grant_type: "client_credentials",
            appkey: &self.app_key,
            appsecret: &self.app_secret,
        };

        let response = self
            .client
            .post(format!("{}{}", self.base_url, endpoints::TOKEN))
            .json(&request)
            .send()
            .await
            .map_err(|e| KisError::auth(format!("Token request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| KisError::auth(format!("Token response unreadable: {}", e)))?;

        debug!("Token response status: {}", status);

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            KisError::auth(format!("Token response parse error (HTTP {}): {}", status, e))
        })?;

        let token = match parsed.access_token.filter(|t| !t.is_empty()) {
            Some(token) if status.is_success() => token,
            _ => {
                let message = parsed
                    .error_description
                    .or(parsed.msg1)
                    .unwrap_or_else(|| format!("Token issuance failed (HTTP {})", status));
                return Err(KisError::Authentication {
                    message,
                    code: parsed.error_code.or(parsed.msg_cd),
                });
            }
        };

        let lifetime = parsed.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let credential = Credential {
            token,
            expires_at: Utc::now() + Duration::seconds(lifetime),
        };

        {
            let mut held = self.credential.write().await;
            *held = Some(credential.clone());
        }
        self.store.save(&self.cache_key, &credential);

        info!("Access token issued, expires at {}", credential.expires_at);
        Ok(credential)
    }

    /// One-time key for the realtime socket (`/oauth2/Approval`)
    pub async fn issue_approval_key(&self) -> Result<String> {
        let request = ApprovalRequest {
            grant_type: "client_credentials",
            appkey: &self.app_key,
            secretkey: &self.app_secret,
        };

        let response = self
            .client
            .post(format!("{}{}", self.base_url, endpoints::APPROVAL))
            .json(&request)
            .send()
            .await
            .map_err(|e| KisError::auth(format!("Approval key request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KisError::auth(format!("Approval key request failed (HTTP {})", status)));
        }

        let parsed: ApprovalResponse = response
            .json()
            .await
            .map_err(|e| KisError::auth(format!("Approval key parse error: {}", e)))?;

        parsed
            .approval_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| KisError::auth("No approval_key in response"))
    }
}

/// Pure expiry predicate shared by the manager and its tests
pub fn is_expired_at(credential: Option<&Credential>, now: DateTime<Utc>, margin: Duration) -> bool {
    match credential {
        Some(c) => !c.is_usable_at(now, margin),
        None => true,
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| KisError::auth(format!("Credential is not a valid header value: {}", e)))
}
