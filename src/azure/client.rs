//! Azure Client
//!
//! Main client for Resource Manager calls, combining authentication,
//! HTTP and long-running operation tracking.

use super::auth::AzureCredentials;
use super::error::{AzureError, AzureResult};
use super::http::{ArmResponse, AzureHttpClient};
use super::models::provisioning_state;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::{Duration, Instant};

/// Public cloud Resource Manager endpoint
pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

pub const NETWORK_API_VERSION: &str = "2023-09-01";
pub const COMPUTE_API_VERSION: &str = "2023-09-01";
pub const RESOURCES_API_VERSION: &str = "2022-09-01";
pub const STORAGE_API_VERSION: &str = "2023-01-01";

/// How long-running operations are awaited
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    /// Delay between polls when the service sends no `Retry-After`
    pub interval: Duration,
    /// Give up waiting after this long
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Main Azure client
#[derive(Clone)]
pub struct AzureClient {
    pub credentials: AzureCredentials,
    pub http: AzureHttpClient,
    pub subscription_id: String,
    pub endpoint: String,
    pub poll: PollSettings,
}

impl AzureClient {
    /// Create a new client against the public cloud endpoint
    pub fn new(credentials: AzureCredentials, subscription_id: &str) -> AzureResult<Self> {
        Ok(Self {
            credentials,
            http: AzureHttpClient::new()?,
            subscription_id: subscription_id.to_string(),
            endpoint: DEFAULT_MANAGEMENT_ENDPOINT.to_string(),
            poll: PollSettings::default(),
        })
    }

    /// Use another Resource Manager endpoint
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Get the current access token
    pub async fn get_token(&self) -> AzureResult<String> {
        self.credentials.get_token().await
    }

    /// Check that the credentials are accepted
    ///
    /// Service principals prove this with a fresh grant. A static token is
    /// only known to be valid once ARM accepts it, so the subscription is
    /// read with it; 403/404 still count as authenticated.
    pub async fn verify_session(&self) -> AzureResult<()> {
        let token = self.credentials.refresh_token().await?;
        if !self.credentials.is_static() {
            return Ok(());
        }

        match self.http.get(&self.subscription_details_url(), &token).await {
            Ok(_) => Ok(()),
            Err(AzureError::Api {
                status: 401, code, ..
            }) => Err(AzureError::Auth(format!("access token rejected: {}", code))),
            Err(AzureError::Api { status, code, .. }) => {
                tracing::debug!("Subscription read returned {} {}, token accepted", status, code);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Make a GET request
    pub async fn get(&self, url: &str) -> AzureResult<Value> {
        let token = self.get_token().await?;
        self.http.get(url, &token).await
    }

    /// Create or update a resource and wait until it is provisioned
    pub async fn put(&self, url: &str, body: &Value) -> AzureResult<Value> {
        let token = self.get_token().await?;
        let response = self.http.put(url, &token, body).await?;
        self.wait_for_resource(response, url).await
    }

    /// Invoke a resource action and wait for the operation to finish
    pub async fn post_action(&self, url: &str) -> AzureResult<()> {
        let token = self.get_token().await?;
        let response = self.http.post(url, &token, None).await?;

        if let Some(operation) = response.async_operation.as_deref() {
            return self.poll_operation(operation, response.retry_after).await;
        }
        if response.status == StatusCode::ACCEPTED {
            if let Some(location) = response.location.as_deref() {
                return self.poll_location(location, response.retry_after).await;
            }
        }

        Ok(())
    }

    async fn wait_for_resource(&self, response: ArmResponse, url: &str) -> AzureResult<Value> {
        if let Some(operation) = response.async_operation.as_deref() {
            self.poll_operation(operation, response.retry_after).await?;
            return self.get(url).await;
        }
        if response.status == StatusCode::ACCEPTED {
            if let Some(location) = response.location.as_deref() {
                self.poll_location(location, response.retry_after).await?;
                return self.get(url).await;
            }
        }

        match provisioning_state(&response.body) {
            Some(state) if !is_terminal(state) => self.poll_resource(url, response.retry_after).await,
            Some(state) if state != "Succeeded" => Err(AzureError::OperationFailed {
                status: state.to_string(),
                code: None,
                message: None,
            }),
            _ => Ok(response.body),
        }
    }

    /// Poll an `Azure-AsyncOperation` status URL until it reaches a terminal status
    async fn poll_operation(&self, url: &str, retry_after: Option<Duration>) -> AzureResult<()> {
        let deadline = Instant::now() + self.poll.timeout;
        let mut delay = retry_after.unwrap_or(self.poll.interval);

        loop {
            self.sleep_until_next_poll(deadline, delay).await?;

            let token = self.get_token().await?;
            let status = self.http.get_raw(url, &token).await?;
            let state = status
                .body
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("InProgress");

            tracing::debug!("Operation status: {}", state);

            match state {
                "Succeeded" => return Ok(()),
                "Failed" | "Canceled" => {
                    let error = status.body.get("error");
                    let field = |name: &str| {
                        error
                            .and_then(|e| e.get(name))
                            .and_then(|v| v.as_str())
                            .map(String::from)
                    };
                    return Err(AzureError::OperationFailed {
                        status: state.to_string(),
                        code: field("code"),
                        message: field("message"),
                    });
                }
                _ => delay = status.retry_after.unwrap_or(self.poll.interval),
            }
        }
    }

    /// Poll a `Location` URL until it stops answering 202 Accepted
    async fn poll_location(&self, url: &str, retry_after: Option<Duration>) -> AzureResult<()> {
        let deadline = Instant::now() + self.poll.timeout;
        let mut delay = retry_after.unwrap_or(self.poll.interval);

        loop {
            self.sleep_until_next_poll(deadline, delay).await?;

            let token = self.get_token().await?;
            let response = self.http.get_raw(url, &token).await?;
            if response.status != StatusCode::ACCEPTED {
                return Ok(());
            }
            delay = response.retry_after.unwrap_or(self.poll.interval);
        }
    }

    /// Re-read a resource until its provisioning state is terminal
    async fn poll_resource(&self, url: &str, retry_after: Option<Duration>) -> AzureResult<Value> {
        let deadline = Instant::now() + self.poll.timeout;
        let mut delay = retry_after.unwrap_or(self.poll.interval);

        loop {
            self.sleep_until_next_poll(deadline, delay).await?;

            let token = self.get_token().await?;
            let response = self.http.get_raw(url, &token).await?;
            match provisioning_state(&response.body) {
                Some("Succeeded") | None => return Ok(response.body),
                Some(state) if is_terminal(state) => {
                    return Err(AzureError::OperationFailed {
                        status: state.to_string(),
                        code: None,
                        message: None,
                    })
                }
                Some(state) => {
                    tracing::debug!("Provisioning state: {}", state);
                    delay = response.retry_after.unwrap_or(self.poll.interval);
                }
            }
        }
    }

    /// Sleep before the next poll, never past the deadline
    ///
    /// A delay reaching beyond the deadline is shortened so one last poll
    /// still happens; once the deadline has passed this fails.
    async fn sleep_until_next_poll(&self, deadline: Instant, delay: Duration) -> AzureResult<()> {
        let now = Instant::now();
        if now >= deadline {
            return Err(AzureError::Timeout(self.poll.timeout));
        }
        tokio::time::sleep(delay.min(deadline - now)).await;
        Ok(())
    }

    // =========================================================================
    // Resource Manager URL helpers
    // =========================================================================

    /// Build a subscription scoped URL
    pub fn subscription_url(&self, path: &str) -> String {
        format!(
            "{}/subscriptions/{}/{}",
            self.endpoint, self.subscription_id, path
        )
    }

    /// URL of the subscription resource itself
    pub fn subscription_details_url(&self) -> String {
        format!(
            "{}/subscriptions/{}?api-version={}",
            self.endpoint, self.subscription_id, RESOURCES_API_VERSION
        )
    }

    /// Build a resource group URL
    pub fn resource_group_url(&self, resource_group: &str) -> String {
        self.subscription_url(&format!(
            "resourcegroups/{}?api-version={}",
            urlencoding::encode(resource_group),
            RESOURCES_API_VERSION
        ))
    }

    /// Build a provider URL inside a resource group, e.g. `Microsoft.Network`
    pub fn provider_url(&self, resource_group: &str, provider: &str, path: &str) -> String {
        self.subscription_url(&format!(
            "resourceGroups/{}/providers/{}/{}",
            urlencoding::encode(resource_group),
            provider,
            path
        ))
    }

    /// Build a Microsoft.Network URL
    pub fn network_url(&self, resource_group: &str, path: &str) -> String {
        format!(
            "{}?api-version={}",
            self.provider_url(resource_group, "Microsoft.Network", path),
            NETWORK_API_VERSION
        )
    }

    /// Build a Microsoft.Compute URL
    pub fn compute_url(&self, resource_group: &str, path: &str) -> String {
        format!(
            "{}?api-version={}",
            self.provider_url(resource_group, "Microsoft.Compute", path),
            COMPUTE_API_VERSION
        )
    }

    /// Build a location scoped Microsoft.Compute URL (image catalog)
    pub fn compute_location_url(&self, location: &str, path: &str) -> String {
        self.subscription_url(&format!(
            "providers/Microsoft.Compute/locations/{}/{}",
            urlencoding::encode(location),
            path
        ))
    }

    /// Build a Microsoft.Storage URL
    pub fn storage_url(&self, resource_group: &str, path: &str) -> String {
        format!(
            "{}?api-version={}",
            self.provider_url(resource_group, "Microsoft.Storage", path),
            STORAGE_API_VERSION
        )
    }
}

/// ARM provisioning states that end an operation
fn is_terminal(state: &str) -> bool {
    matches!(state, "Succeeded" | "Failed" | "Canceled")
}

/// Encode one path segment of a resource URL
pub(crate) fn segment(name: &str) -> String {
    urlencoding::encode(name).into_owned()
}

/// Format an Azure error for display
pub fn format_azure_error(error: &AzureError) -> String {
    super::http::format_azure_error(error)
}
