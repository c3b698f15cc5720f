use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::config::SyncConfig;
use crate::error::SyncError;

const TOKEN_URL: &str = "https://identity.xero.com/connect/token";
const CONNECTIONS_URL: &str = "https://api.xero.com/connections";
const AUTHORIZE_URL: &str = "https://login.xero.com/identity/connect/authorize";
const SCOPES: &str =
    "openid profile email accounting.settings accounting.contacts accounting.transactions offline_access";

/// One OAuth token record. The service is single-tenant: at most one
/// record exists at a time and a new connect flow replaces it.
#[derive(Debug, Clone)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: String,
    pub tenant_id: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    /// Expired (with a small margin so a token never dies mid-request).
    pub fn is_expired(&self) -> bool {
        Utc::now() + ChronoDuration::seconds(30) >= self.expires_at
    }
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Option<StoredToken>;
    async fn save(&self, token: StoredToken);
}

#[derive(Default)]
pub struct InMemoryTokenStore {
    token: RwLock<Option<StoredToken>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn load(&self) -> Option<StoredToken> {
        self.token.read().await.clone()
    }

    async fn save(&self, token: StoredToken) {
        *self.token.write().await = Some(token);
    }
}

/// What collaborator calls actually need: a live access token and the
/// tenant it belongs to.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: String,
    pub tenant_id: String,
}

/// OAuth client for the ledger platform: initial code exchange and
/// refresh-on-expiry.
pub struct XeroAuthClient {
    http: reqwest::Client,
    store: std::sync::Arc<dyn TokenStore>,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl XeroAuthClient {
    pub fn new(config: &SyncConfig, store: std::sync::Arc<dyn TokenStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            store,
            client_id: config.xero_client_id.clone(),
            client_secret: config.xero_client_secret.clone(),
            redirect_uri: config.xero_redirect_uri.clone(),
        }
    }

    /// Consent-screen URL for the initial connect flow.
    pub fn authorize_url(&self, state: &str) -> String {
        let params = [
            ("response_type", "code"),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("scope", SCOPES),
            ("state", state),
        ];
        match reqwest::Url::parse_with_params(AUTHORIZE_URL, &params) {
            Ok(url) => url.into(),
            Err(_) => AUTHORIZE_URL.to_string(),
        }
    }

    /// Return a live access token and tenant id, refreshing first if the
    /// stored token has expired.
    pub async fn get_valid_credentials(&self) -> Result<Credentials, SyncError> {
        let token = self
            .store
            .load()
            .await
            .ok_or_else(|| SyncError::auth("no token stored; complete the connect flow first"))?;

        let token = if token.is_expired() {
            tracing::info!("access token expired, refreshing");
            self.refresh(token).await?
        } else {
            token
        };

        Ok(Credentials {
            access_token: token.access_token,
            tenant_id: token.tenant_id,
        })
    }

    /// Exchange an authorization code for a token record and discover
    /// the tenant id behind the new connection.
    pub async fn exchange_code(&self, code: &str) -> Result<StoredToken, SyncError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let body = self.token_request(&form).await?;

        let access_token = json_str(&body, "access_token")
            .ok_or_else(|| SyncError::auth("token response missing access_token"))?;
        let refresh_token = json_str(&body, "refresh_token")
            .ok_or_else(|| SyncError::auth("token response missing refresh_token"))?;
        let expires_in = body
            .get("expires_in")
            .and_then(Value::as_i64)
            .unwrap_or(1800);

        let tenant_id = self.first_tenant_id(&access_token).await?;

        let token = StoredToken {
            access_token,
            refresh_token,
            tenant_id,
            expires_at: Utc::now() + ChronoDuration::seconds(expires_in),
        };
        self.store.save(token.clone()).await;
        Ok(token)
    }

    async fn refresh(&self, current: StoredToken) -> Result<StoredToken, SyncError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", current.refresh_token.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let body = self.token_request(&form).await?;

        let access_token = json_str(&body, "access_token")
            .ok_or_else(|| SyncError::auth("refresh response missing access_token"))?;
        // Refresh tokens rotate on every use.
        let refresh_token =
            json_str(&body, "refresh_token").unwrap_or(current.refresh_token);
        let expires_in = body
            .get("expires_in")
            .and_then(Value::as_i64)
            .unwrap_or(1800);

        let token = StoredToken {
            access_token,
            refresh_token,
            tenant_id: current.tenant_id,
            expires_at: Utc::now() + ChronoDuration::seconds(expires_in),
        };
        self.store.save(token.clone()).await;
        Ok(token)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<Value, SyncError> {
        let response = self.http.post(TOKEN_URL).form(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::auth(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                response.text().await.unwrap_or_default()
            )));
        }
        Ok(response.json().await?)
    }

    async fn first_tenant_id(&self, access_token: &str) -> Result<String, SyncError> {
        let response = self
            .http
            .get(CONNECTIONS_URL)
            .bearer_auth(access_token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::auth(format!(
                "connections endpoint returned {}",
                status.as_u16()
            )));
        }
        let body: Value = response.json().await?;
        body.get(0)
            .and_then(|c| c.get("tenantId"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SyncError::auth("no tenant connection found"))
    }
}

fn json_str(body: &Value, key: &str) -> Option<String> {
    body.get(key).and_then(Value::as_str).map(str::to_string)
}
