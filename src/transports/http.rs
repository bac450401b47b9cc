//! HTTP transport backed by reqwest.

use async_trait::async_trait;
use tracing::trace;

use crate::error::ProtocolError;
use crate::transports::{HttpRequest, HttpResponse, HttpTransport};

pub struct HttpClient {
    client: reqwest::Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        // Monitored devices routinely present self-signed certificates.
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for HttpClient {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ProtocolError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| ProtocolError::QuerySyntax(format!("Invalid HTTP method: {}", request.method)))?;

        trace!("Hostname {} - Sending {} request", request.hostname, request.method);

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProtocolError::Query(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).to_string(),
                )
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| ProtocolError::Query(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
