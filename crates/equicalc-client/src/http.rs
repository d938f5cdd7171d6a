//! HTTP adapter for the calculation service.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{ClientConfig, ConfigError};
use crate::error::{CodeSource, ErrorCode, ErrorContext, ServiceError};
use crate::service::{CalculationService, Endpoint};
use equicalc_types::{
    MonthlyProjection, MonthlyProjectionRequest, OpportunityCost, OpportunityCostRequest,
    StartupScenario, StartupScenarioRequest,
};

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<ApiError>,
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

// =============================================================================
// ADAPTER
// =============================================================================

/// Calculation service reached over HTTP/JSON
#[derive(Debug, Clone)]
pub struct HttpCalculationService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCalculationService {
    /// Create from configuration
    ///
    /// # Errors
    /// Returns an error for an invalid config or if the client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let agent = HeaderValue::from_str(&config.user_agent).map_err(|_| {
            ConfigError::InvalidValue {
                key: "user_agent",
                message: "not a valid header value".to_string(),
            }
        })?;
        headers.insert(USER_AGENT, agent);

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    fn extract_request_id(headers: &HeaderMap) -> Option<String> {
        headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    }

    async fn post<B, R>(&self, endpoint: Endpoint, body: &B) -> Result<R, ServiceError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        debug!(endpoint = %endpoint, "calling calculation service");

        let response = self.client.post(self.url(endpoint)).json(body).send().await?;

        let status = response.status();
        let request_id = Self::extract_request_id(response.headers());
        let bytes = response.bytes().await?;

        let mut ctx = ErrorContext::new().with_status(status.as_u16());
        if let Some(id) = request_id {
            ctx = ctx.with_request_id(id);
        }

        if !status.is_success() {
            let err = classify_failure(status.as_u16(), &bytes, ctx);
            warn!(endpoint = %endpoint, error = %err, "calculation service returned failure");
            return Err(err);
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            ServiceError::service_with_context(
                ErrorCode::Internal,
                format!("malformed {endpoint} response: {e}"),
                ctx.with_source(CodeSource::Local),
            )
        })
    }
}

/// Turn a non-success response into a classified error
///
/// Priority: structured code, then HTTP status, then message text.
pub(crate) fn classify_failure(status: u16, body: &[u8], ctx: ErrorContext) -> ServiceError {
    let envelope: ErrorEnvelope = serde_json::from_slice(body).unwrap_or_default();
    let api = envelope.error.unwrap_or_default();

    let message = api
        .message
        .filter(|m| !m.trim().is_empty())
        .or_else(|| envelope.detail.as_ref().map(detail_message))
        .unwrap_or_else(|| format!("HTTP {status}"));

    if let Some(code) = api.code.as_deref().and_then(ErrorCode::from_wire) {
        return ServiceError::service_with_context(
            code,
            message,
            ctx.with_source(CodeSource::Structured),
        );
    }

    if let Some(code) = ErrorCode::from_status(status) {
        return ServiceError::service_with_context(
            code,
            message,
            ctx.with_source(CodeSource::HttpStatus),
        );
    }

    let code = ErrorCode::infer_from_message(&message);
    ServiceError::service_with_context(code, message, ctx.with_source(CodeSource::MessageHeuristic))
}

fn detail_message(detail: &serde_json::Value) -> String {
    match detail {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl CalculationService for HttpCalculationService {
    async fn monthly_projection(
        &self,
        request: MonthlyProjectionRequest,
    ) -> Result<MonthlyProjection, ServiceError> {
        self.post(Endpoint::MonthlyProjection, &request).await
    }

    async fn opportunity_cost(
        &self,
        request: OpportunityCostRequest,
    ) -> Result<OpportunityCost, ServiceError> {
        self.post(Endpoint::OpportunityCost, &request).await
    }

    async fn startup_scenario(
        &self,
        request: StartupScenarioRequest,
    ) -> Result<StartupScenario, ServiceError> {
        self.post(Endpoint::StartupScenario, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_code_wins_over_status() {
        let body = br#"{"error":{"code":"CALCULATION_ERROR","message":"negative payout"}}"#;
        let err = classify_failure(500, body, ErrorContext::new().with_status(500));
        assert_eq!(err.code(), Some(ErrorCode::Calculation));
        assert_eq!(err.message(), "negative payout");
        assert_eq!(
            err.context().map(|c| c.code_source),
            Some(CodeSource::Structured)
        );
    }

    #[test]
    fn status_decides_without_code() {
        let body = br#"{"detail":"exit_year must be positive"}"#;
        let err = classify_failure(422, body, ErrorContext::new());
        assert_eq!(err.code(), Some(ErrorCode::Validation));
        assert_eq!(err.message(), "exit_year must be positive");
    }

    #[test]
    fn message_heuristic_for_undecided_status() {
        let body = br#"{"error":{"message":"Rate limit reached"}}"#;
        let err = classify_failure(409, body, ErrorContext::new());
        assert_eq!(err.code(), Some(ErrorCode::RateLimit));
        assert_eq!(
            err.context().map(|c| c.code_source),
            Some(CodeSource::MessageHeuristic)
        );
    }

    #[test]
    fn unparsable_body_falls_back_to_status_line() {
        let err = classify_failure(418, b"<html>teapot</html>", ErrorContext::new());
        assert_eq!(err.code(), Some(ErrorCode::Unknown));
        assert_eq!(err.message(), "HTTP 418");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let service =
            HttpCalculationService::new(&ClientConfig::new("http://localhost:9000/")).unwrap();
        assert_eq!(
            service.url(Endpoint::OpportunityCost),
            "http://localhost:9000/api/opportunity-cost"
        );
    }
}
