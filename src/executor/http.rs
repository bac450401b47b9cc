//! HTTP request assembly and execution with bounded retry.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::HttpConfiguration;
use crate::criterion::{HttpCriterion, ResultContent};
use crate::error::ProtocolError;
use crate::executor::{update_macros, ProtocolExecutor};
use crate::timeout::TimeoutGuard;
use crate::transports::{HttpRequest, HttpResponse};

/// Statuses worth retrying: the server exists but is transiently unable to
/// answer.
const RETRYABLE_STATUSES: &[u16] = &[500, 503, 504, 507];

impl ProtocolExecutor {
    /// Run the HTTP test described by `criterion`.
    ///
    /// Returns `None` when the request could not be carried out at all, and
    /// `Some("")` when the server answered with an error status (transient
    /// statuses are retried up to the configured `max_retries`). Otherwise
    /// the requested part of the response is extracted per the criterion's
    /// result content.
    pub async fn execute_http(
        &self,
        criterion: &HttpCriterion,
        config: &HttpConfiguration,
        hostname: &str,
    ) -> Option<String> {
        let request = build_request(criterion, config, hostname);
        let redacted_url = crate::executor::update_macros_redacted(
            &criterion.resolved_url(config, hostname),
            config.username.as_deref().unwrap_or(""),
            hostname,
        );

        let mut attempt = 0;
        loop {
            debug!(
                "Hostname {} - HTTP {} {} (attempt {})",
                hostname,
                request.method,
                redacted_url,
                attempt + 1
            );

            let response = match self.send_http(&request, config).await {
                Ok(response) => response,
                Err(error) => {
                    warn!("Hostname {} - HTTP request failed: {}", hostname, error);
                    return None;
                }
            };

            if RETRYABLE_STATUSES.contains(&response.status) && attempt < config.max_retries {
                debug!(
                    "Hostname {} - HTTP status {} is transient, retrying in {} ms",
                    hostname, response.status, config.retry_delay_ms
                );
                tokio::time::sleep(Duration::from_millis(config.retry_delay_ms)).await;
                attempt += 1;
                continue;
            }

            if response.status >= 400 {
                debug!("Hostname {} - HTTP status {}", hostname, response.status);
                return Some(String::new());
            }

            return Some(extract_content(&response, criterion.result_content));
        }
    }

    async fn send_http(
        &self,
        request: &HttpRequest,
        config: &HttpConfiguration,
    ) -> Result<HttpResponse, ProtocolError> {
        let transport = Arc::clone(&self.http);
        let timeout = Duration::from_secs(config.timeout);
        let request = request.clone();

        TimeoutGuard::run(async move { transport.send(&request).await }, timeout)
            .await
            .map_err(ProtocolError::from)
    }
}

impl HttpCriterion {
    /// Full request URL before macro substitution.
    fn resolved_url(&self, config: &HttpConfiguration, hostname: &str) -> String {
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return url.to_string();
        }
        let scheme = if config.https { "https" } else { "http" };
        let path = self.path.as_deref().unwrap_or("/");
        let separator = if path.starts_with('/') { "" } else { "/" };
        format!("{scheme}://{hostname}:{}{separator}{path}", config.port)
    }
}

fn build_request(criterion: &HttpCriterion, config: &HttpConfiguration, hostname: &str) -> HttpRequest {
    let substitute = |text: &str| {
        update_macros(
            text,
            config.username.as_deref().unwrap_or(""),
            config.password.as_deref().unwrap_or(""),
            criterion.authentication_token.as_deref().unwrap_or(""),
            hostname,
        )
    };

    let headers = criterion
        .header
        .as_deref()
        .unwrap_or("")
        .lines()
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name.trim().to_string(), substitute(value.trim())))
        })
        .collect();

    let method = if criterion.method.is_empty() {
        "GET".to_string()
    } else {
        criterion.method.to_uppercase()
    };

    HttpRequest {
        hostname: hostname.to_string(),
        method,
        url: substitute(&criterion.resolved_url(config, hostname)),
        headers,
        body: criterion.body.as_deref().map(substitute),
        timeout: Duration::from_secs(config.timeout),
    }
}

fn extract_content(response: &HttpResponse, content: ResultContent) -> String {
    let header_block = || {
        response
            .headers
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    match content {
        ResultContent::Body => response.body.clone(),
        ResultContent::Header => header_block(),
        ResultContent::HttpStatus => response.status.to_string(),
        ResultContent::All => format!("{}\n{}", header_block(), response.body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedHttp;
    use crate::transports::HttpTransport;

    fn criterion() -> HttpCriterion {
        HttpCriterion {
            path: Some("/redfish/v1/Systems".to_string()),
            ..Default::default()
        }
    }

    fn config() -> HttpConfiguration {
        HttpConfiguration {
            username: Some("monitor".to_string()),
            password: Some("s3cret".to_string()),
            retry_delay_ms: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn returns_the_body_on_success() {
        let http = Arc::new(ScriptedHttp::with_statuses(vec![(200, "chassis data".to_string())]));
        let executor = ProtocolExecutor::new().with_http(Arc::clone(&http) as Arc<dyn HttpTransport>);
        let result = executor.execute_http(&criterion(), &config(), "ecs1-01").await;
        assert_eq!(result.as_deref(), Some("chassis data"));
        assert_eq!(http.requests(), 1);
    }

    #[tokio::test]
    async fn retries_transient_statuses_once() {
        let http = Arc::new(ScriptedHttp::with_statuses(vec![
            (503, String::new()),
            (200, "recovered".to_string()),
        ]));
        let executor = ProtocolExecutor::new().with_http(Arc::clone(&http) as Arc<dyn HttpTransport>);
        let result = executor.execute_http(&criterion(), &config(), "ecs1-01").await;
        assert_eq!(result.as_deref(), Some("recovered"));
        assert_eq!(http.requests(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_collapse_to_an_empty_result() {
        let http = Arc::new(ScriptedHttp::with_statuses(vec![
            (503, String::new()),
            (503, String::new()),
        ]));
        let executor = ProtocolExecutor::new().with_http(Arc::clone(&http) as Arc<dyn HttpTransport>);
        let result = executor.execute_http(&criterion(), &config(), "ecs1-01").await;
        assert_eq!(result.as_deref(), Some(""));
        assert_eq!(http.requests(), 2);
    }

    #[tokio::test]
    async fn retry_budget_comes_from_the_configuration() {
        let http = Arc::new(ScriptedHttp::with_statuses(vec![
            (503, String::new()),
            (503, String::new()),
            (200, "recovered".to_string()),
        ]));
        let executor = ProtocolExecutor::new().with_http(Arc::clone(&http) as Arc<dyn HttpTransport>);
        let config = HttpConfiguration {
            max_retries: 2,
            ..config()
        };
        let result = executor.execute_http(&criterion(), &config, "ecs1-01").await;
        assert_eq!(result.as_deref(), Some("recovered"));
        assert_eq!(http.requests(), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let http = Arc::new(ScriptedHttp::with_statuses(vec![(404, "missing".to_string())]));
        let executor = ProtocolExecutor::new().with_http(Arc::clone(&http) as Arc<dyn HttpTransport>);
        let result = executor.execute_http(&criterion(), &config(), "ecs1-01").await;
        assert_eq!(result.as_deref(), Some(""));
        assert_eq!(http.requests(), 1);
    }

    #[tokio::test]
    async fn transport_failures_yield_no_result() {
        let http = Arc::new(ScriptedHttp::failing());
        let executor = ProtocolExecutor::new().with_http(Arc::clone(&http) as Arc<dyn HttpTransport>);
        let result = executor.execute_http(&criterion(), &config(), "ecs1-01").await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn substitutes_credential_macros_in_headers_and_url() {
        let http = Arc::new(ScriptedHttp::with_statuses(vec![(200, "ok".to_string())]));
        let executor = ProtocolExecutor::new().with_http(Arc::clone(&http) as Arc<dyn HttpTransport>);
        let criterion = HttpCriterion {
            url: Some("https://%{HOSTNAME}/api".to_string()),
            header: Some("Authorization: Basic %{USERNAME}:%{PASSWORD}".to_string()),
            ..Default::default()
        };
        executor.execute_http(&criterion, &config(), "ecs1-01").await;

        let request = http.last_request().unwrap();
        assert_eq!(request.url, "https://ecs1-01/api");
        assert_eq!(
            request.headers,
            vec![("Authorization".to_string(), "Basic monitor:s3cret".to_string())]
        );
        assert_eq!(request.method, "GET");
    }

    #[tokio::test]
    async fn extracts_the_requested_content() {
        let response = HttpResponse {
            status: 201,
            headers: vec![("Server".to_string(), "iLO".to_string())],
            body: "payload".to_string(),
        };
        assert_eq!(extract_content(&response, ResultContent::Body), "payload");
        assert_eq!(extract_content(&response, ResultContent::Header), "Server: iLO");
        assert_eq!(extract_content(&response, ResultContent::HttpStatus), "201");
        assert_eq!(extract_content(&response, ResultContent::All), "Server: iLO\npayload");
    }
}
