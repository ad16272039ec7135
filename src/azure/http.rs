//! HTTP utilities for Azure Resource Manager REST calls

use super::error::{AzureError, AzureResult};
use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Header carrying the status URL of a long-running operation
const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";

/// Correlation id sent with every request, echoed back in ARM activity logs
const CLIENT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.chars().count() > MAX_LOG_BODY_LENGTH {
        let head: String = body.chars().take(MAX_LOG_BODY_LENGTH).collect();
        format!("{}... [truncated, {} bytes total]", head, body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Response of an ARM call, with the headers that drive long-running operations
#[derive(Debug, Clone)]
pub struct ArmResponse {
    pub status: StatusCode,
    pub body: Value,
    /// `Azure-AsyncOperation` status URL
    pub async_operation: Option<String>,
    /// `Location` URL returned with 202 Accepted
    pub location: Option<String>,
    pub retry_after: Option<Duration>,
}

impl ArmResponse {
    fn from_parts(status: StatusCode, headers: &HeaderMap, body: &str) -> AzureResult<Self> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };

        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        // Handle empty response
        let body = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(body)?
        };

        Ok(Self {
            status,
            body,
            async_operation: header(ASYNC_OPERATION_HEADER),
            location: header(LOCATION.as_str()),
            retry_after,
        })
    }
}

/// HTTP client wrapper for ARM API calls
#[derive(Clone)]
pub struct AzureHttpClient {
    client: Client,
}

impl AzureHttpClient {
    /// Create a new HTTP client
    pub fn new() -> AzureResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("azprov/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// Make a GET request and return the parsed body
    pub async fn get(&self, url: &str, token: &str) -> AzureResult<Value> {
        Ok(self.get_raw(url, token).await?.body)
    }

    /// Make a GET request and keep status and headers
    pub async fn get_raw(&self, url: &str, token: &str) -> AzureResult<ArmResponse> {
        tracing::debug!("GET {}", url);
        self.send(self.client.get(url).bearer_auth(token)).await
    }

    /// Make a PUT request (create-or-update)
    pub async fn put(&self, url: &str, token: &str, body: &Value) -> AzureResult<ArmResponse> {
        tracing::debug!("PUT {}", url);
        self.send(self.client.put(url).bearer_auth(token).json(body))
            .await
    }

    /// Make a POST request (resource actions such as start/deallocate)
    pub async fn post(
        &self,
        url: &str,
        token: &str,
        body: Option<&Value>,
    ) -> AzureResult<ArmResponse> {
        tracing::debug!("POST {}", url);

        let mut request = self.client.post(url).bearer_auth(token);
        request = match body {
            Some(body) => request.json(body),
            // ARM rejects bodiless POSTs without an explicit length
            None => request.header(reqwest::header::CONTENT_LENGTH, 0),
        };

        self.send(request).await
    }

    /// POST a form to the identity endpoint
    /// Failures are reported as authentication errors
    pub async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> AzureResult<Value> {
        tracing::debug!("POST {}", url);

        let response = self.client.post(url).form(form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Security: only the error code goes into the message, never the raw body
            tracing::error!("Token request failed: {} - {}", status, sanitize_for_log(&body));
            let code = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
                .unwrap_or_else(|| status.to_string());
            return Err(AzureError::Auth(format!("token request rejected: {}", code)));
        }

        Ok(serde_json::from_str(&body)?)
    }

    async fn send(&self, request: RequestBuilder) -> AzureResult<ArmResponse> {
        let response = request
            .header(CLIENT_REQUEST_ID_HEADER, uuid::Uuid::new_v4().to_string())
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(api_error(status, &body));
        }

        ArmResponse::from_parts(status, &headers, &body)
    }
}

/// Build an API error from the ARM error envelope `{"error": {"code", "message"}}`
fn api_error(status: StatusCode, body: &str) -> AzureError {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let envelope = parsed.as_ref().and_then(|v| v.get("error"));

    let code = envelope
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .or_else(|| status.canonical_reason())
        .unwrap_or("Unknown")
        .to_string();

    let message = envelope
        .and_then(|e| e.get("message"))
        .and_then(|v| v.as_str())
        .map(sanitize_for_log)
        .unwrap_or_default();

    AzureError::Api {
        status: status.as_u16(),
        code,
        message,
    }
}

/// Format an Azure error for display
/// Security: Sanitizes error messages to avoid leaking sensitive API details
pub fn format_azure_error(error: &AzureError) -> String {
    match error {
        AzureError::Auth(_) => {
            return "Authentication failed. Check AZURE_ACCESS_TOKEN, or AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET."
                .to_string()
        }
        AzureError::OperationFailed { .. } => return sanitize_for_log(&error.to_string()),
        AzureError::Timeout(waited) => {
            return format!(
                "Operation still running after {}s. It may complete on the Azure side.",
                waited.as_secs()
            )
        }
        AzureError::Transport(_) => {
            return "Request failed. Check your network connection and try again.".to_string()
        }
        _ => {}
    }

    match error.status() {
        Some(401) => return "Authentication failed. The access token was rejected.".to_string(),
        Some(403) => {
            return "Permission denied. Check the role assignments of your principal.".to_string()
        }
        Some(404) => {
            let code = error.code().unwrap_or("NotFound");
            return format!("Resource not found ({}).", code);
        }
        Some(409) => {
            return "Resource conflict. The resource may already exist or be in use.".to_string()
        }
        Some(429) => return "Rate limit exceeded. Please try again later.".to_string(),
        Some(400) => {
            let code = error.code().unwrap_or("BadRequest");
            return format!("Invalid request ({}). Check your parameters.", code);
        }
        Some(500..=599) => {
            return "Azure service temporarily unavailable. Please try again.".to_string()
        }
        _ => {}
    }

    // Truncate long error messages and remove potential sensitive data
    let error_str = error.to_string();
    let sanitized = error_str
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(80)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.starts_with(&"x".repeat(MAX_LOG_BODY_LENGTH)));
        assert!(sanitized.contains("500 bytes total"));
    }

    #[test]
    fn test_api_error_reads_arm_envelope() {
        let body = r#"{"error":{"code":"ResourceGroupNotFound","message":"Resource group 'rg1' could not be found."}}"#;
        let err = api_error(StatusCode::NOT_FOUND, body);
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.code(), Some("ResourceGroupNotFound"));
        assert!(err.to_string().contains("could not be found"));
    }

    #[test]
    fn test_api_error_without_envelope_uses_reason() {
        let err = api_error(StatusCode::BAD_GATEWAY, "<html>oops</html>");
        assert_eq!(err.code(), Some("Bad Gateway"));
    }

    #[test]
    fn test_format_hides_raw_messages() {
        let err = AzureError::Api {
            status: 403,
            code: "AuthorizationFailed".to_string(),
            message: "client 'abc' with object id 'def' does not have authorization".to_string(),
        };
        let shown = format_azure_error(&err);
        assert!(!shown.contains("abc"));
        assert!(shown.starts_with("Permission denied"));
    }

    #[test]
    fn test_format_shows_failed_operation_detail() {
        let err = AzureError::OperationFailed {
            status: "Failed".to_string(),
            code: Some("DnsRecordInUse".to_string()),
            message: Some("DNS record vm-05 is already used".to_string()),
        };
        assert_eq!(
            format_azure_error(&err),
            "long-running operation ended with status Failed: DnsRecordInUse: DNS record vm-05 is already used"
        );
    }

    #[test]
    fn test_response_headers_are_captured() {
        let mut headers = HeaderMap::new();
        headers.insert(ASYNC_OPERATION_HEADER, "https://ops/1".parse().unwrap());
        headers.insert(RETRY_AFTER, "7".parse().unwrap());

        let response = ArmResponse::from_parts(StatusCode::CREATED, &headers, "").unwrap();
        assert_eq!(response.async_operation.as_deref(), Some("https://ops/1"));
        assert_eq!(response.retry_after, Some(Duration::from_secs(7)));
        assert!(response.body.is_null());
    }
}
