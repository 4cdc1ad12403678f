/// Authenticated HTTP transport with vendor result-code mapping
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::broker::auth::AuthManager;
use crate::error::{KisError, Result};
use crate::utils::RateLimiter;

/// Issues `tr_id`-tagged REST calls. Never retries.
pub struct Transport {
    client: Client,
    base_url: String,
    auth: Arc<AuthManager>,
    limiter: Option<RateLimiter>,
}

impl Transport {
    pub fn new(
        base_url: impl Into<String>,
        auth: Arc<AuthManager>,
        timeout: Duration,
        limiter: Option<RateLimiter>,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Transport {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            limiter,
        })
    }

    pub fn auth(&self) -> &Arc<AuthManager> {
        &self.auth
    }

    /// GET with query parameters
    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        tr_id: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let request = self
            .client
            .get(format!("{}{}", self.base_url, endpoint))
            .query(params);
        self.send(request, endpoint, tr_id).await
    }

    /// POST with a JSON body
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        tr_id: &str,
        body: &B,
    ) -> Result<T> {
        let request = self
            .client
            .post(format!("{}{}", self.base_url, endpoint))
            .json(body);
        self.send(request, endpoint, tr_id).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        endpoint: &str,
        tr_id: &str,
    ) -> Result<T> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }

        let headers = self.auth.get_headers().await?;

        let response = request.headers(headers).header("tr_id", tr_id).send().await?;

        let status = response.status();
        let body = response.text().await?;

        debug!("{} [{}] -> HTTP {}", endpoint, tr_id, status);

        let value = handle_response(status, &body)?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Map an HTTP status + body to the JSON payload or a typed error
pub fn handle_response(status: StatusCode, body: &str) -> Result<Value> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(KisError::RateLimit(format!("HTTP 429: {}", truncate(body))));
    }

    let data: Value = match serde_json::from_str(body) {
        Ok(data) => data,
        Err(e) => {
            return Err(KisError::Api {
                code: format!("HTTP{}", status.as_u16()),
                message: format!("Response parse error: {} ({})", e, truncate(body)),
            });
        }
    };

    // rt_cd "0" is success; anything else (including missing) is a failure
    if data.get("rt_cd").and_then(Value::as_str) != Some("0") {
        let code = data
            .get("msg_cd")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let message = data
            .get("msg1")
            .and_then(Value::as_str)
            .map(|m| m.trim().to_string())
            .unwrap_or_else(|| format!("Unknown error (HTTP {})", status));

        warn!("KIS returned failure: [{}] {}", code, message);
        return Err(KisError::from_vendor_code(&code, &message));
    }

    Ok(data)
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
