//! Azure Authentication
//!
//! Acquires Resource Manager bearer tokens with the OAuth2 client-credentials
//! grant (service principal secret), or wraps a pre-acquired token. Also reads
//! defaults from the Azure CLI profile.

use super::error::{AzureError, AzureResult};
use super::http::AzureHttpClient;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Scope for Resource Manager access
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

/// Public cloud identity endpoint
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Token expiry buffer - refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if the identity endpoint omits `expires_in`
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Service principal used for the client-credentials grant
#[derive(Clone)]
pub struct ServicePrincipal {
    pub tenant_id: String,
    pub client_id: String,
    client_secret: String,
    /// Identity endpoint, e.g. `https://login.microsoftonline.com`
    pub authority: String,
}

impl ServicePrincipal {
    pub fn new(tenant_id: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            authority: DEFAULT_AUTHORITY.to_string(),
        }
    }

    /// Point the grant at another identity endpoint (sovereign clouds, tests)
    pub fn with_authority(mut self, authority: &str) -> Self {
        self.authority = authority.trim_end_matches('/').to_string();
        self
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority,
            urlencoding::encode(&self.tenant_id)
        )
    }
}

impl fmt::Debug for ServicePrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServicePrincipal")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("authority", &self.authority)
            .finish()
    }
}

#[derive(Debug, Clone)]
enum TokenSource {
    ServicePrincipal(ServicePrincipal),
    Static(String),
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Azure credentials holder with token caching
#[derive(Clone)]
pub struct AzureCredentials {
    source: Arc<TokenSource>,
    http: AzureHttpClient,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

impl AzureCredentials {
    /// Credentials backed by a service principal secret
    pub fn service_principal(principal: ServicePrincipal) -> AzureResult<Self> {
        Ok(Self {
            source: Arc::new(TokenSource::ServicePrincipal(principal)),
            http: AzureHttpClient::new()?,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Credentials wrapping an already acquired bearer token
    pub fn from_token(token: &str) -> AzureResult<Self> {
        Ok(Self {
            source: Arc::new(TokenSource::Static(token.to_string())),
            http: AzureHttpClient::new()?,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Build credentials from the environment
    ///
    /// `AZURE_ACCESS_TOKEN` wins; otherwise `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`
    /// and `AZURE_CLIENT_SECRET` must all be set. `tenant_id`/`client_id`
    /// override the environment when given.
    pub fn from_env(tenant_id: Option<&str>, client_id: Option<&str>) -> AzureResult<Self> {
        if let Ok(token) = std::env::var("AZURE_ACCESS_TOKEN") {
            if !token.trim().is_empty() {
                tracing::debug!("Using bearer token from AZURE_ACCESS_TOKEN");
                return Self::from_token(token.trim());
            }
        }

        let tenant = tenant_id
            .map(String::from)
            .or_else(|| std::env::var("AZURE_TENANT_ID").ok())
            .ok_or_else(|| AzureError::Auth("AZURE_TENANT_ID is not set".to_string()))?;
        let client = client_id
            .map(String::from)
            .or_else(|| std::env::var("AZURE_CLIENT_ID").ok())
            .ok_or_else(|| AzureError::Auth("AZURE_CLIENT_ID is not set".to_string()))?;
        let secret = std::env::var("AZURE_CLIENT_SECRET")
            .map_err(|_| AzureError::Auth("AZURE_CLIENT_SECRET is not set".to_string()))?;

        let mut principal = ServicePrincipal::new(&tenant, &client, &secret);
        if let Ok(authority) = std::env::var("AZURE_AUTHORITY_HOST") {
            principal = principal.with_authority(&authority);
        }

        Self::service_principal(principal)
    }

    /// Whether the token was handed in rather than acquired here
    pub fn is_static(&self) -> bool {
        matches!(self.source.as_ref(), TokenSource::Static(_))
    }

    /// Get an access token for API calls
    /// Security: Checks token expiry before returning cached token
    pub async fn get_token(&self) -> AzureResult<String> {
        let principal = match self.source.as_ref() {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::ServicePrincipal(principal) => principal,
        };

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let response = self
            .http
            .post_form(
                &principal.token_url(),
                &[
                    ("grant_type", "client_credentials"),
                    ("client_id", principal.client_id.as_str()),
                    ("client_secret", principal.client_secret.as_str()),
                    ("scope", MANAGEMENT_SCOPE),
                ],
            )
            .await?;

        let token = response
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or(AzureError::MissingField("access_token"))?
            .to_string();

        let ttl = token_ttl(&response);
        let expires_at = Instant::now() + ttl.saturating_sub(TOKEN_EXPIRY_BUFFER);

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token.clone(),
                expires_at,
            });
        }

        tracing::debug!(
            "New token cached, expires in ~{} minutes",
            ttl.saturating_sub(TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(token)
    }

    /// Force refresh the token
    pub async fn refresh_token(&self) -> AzureResult<String> {
        {
            let mut cache = self.token_cache.write().await;
            *cache = None;
        }

        self.get_token().await
    }
}

/// Read `expires_in`, which the identity endpoint sends as a number or a string
fn token_ttl(response: &Value) -> Duration {
    response
        .get("expires_in")
        .and_then(|v| {
            v.as_u64()
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        })
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TOKEN_TTL)
}

/// Get the Azure CLI configuration directory
pub fn get_azure_config_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("AZURE_CONFIG_DIR") {
        return Some(PathBuf::from(path));
    }

    dirs::home_dir().map(|p| p.join(".azure"))
}

/// Subscription ids are GUIDs
pub fn validate_subscription_id(subscription: &str) -> bool {
    uuid::Uuid::parse_str(subscription).is_ok()
}

/// Read the default subscription
/// Security: Validates subscription id format before returning
pub fn get_default_subscription() -> Option<String> {
    if let Ok(subscription) = std::env::var("AZURE_SUBSCRIPTION_ID") {
        if validate_subscription_id(&subscription) {
            return Some(subscription);
        }
        tracing::warn!("Invalid subscription id format in AZURE_SUBSCRIPTION_ID");
    }

    let profile_path = get_azure_config_dir()?.join("azureProfile.json");
    let content = std::fs::read_to_string(&profile_path).ok()?;
    default_subscription_from_profile(&content)
}

/// Pick the `isDefault` subscription out of an `azureProfile.json` document
fn default_subscription_from_profile(content: &str) -> Option<String> {
    // The CLI writes this file with a UTF-8 BOM
    let profile: Value = serde_json::from_str(content.trim_start_matches('\u{feff}')).ok()?;

    profile
        .get("subscriptions")?
        .as_array()?
        .iter()
        .find(|s| s.get("isDefault").and_then(|v| v.as_bool()).unwrap_or(false))
        .and_then(|s| s.get("id"))
        .and_then(|v| v.as_str())
        .filter(|id| validate_subscription_id(id))
        .map(String::from)
}
