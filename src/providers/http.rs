use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{ACCEPT, AUTHORIZATION};

use super::{HttpRequest, HttpResponse, Transport};
use crate::error::JiraError;

/// Basic-auth (email + API token) transport over a shared `reqwest::Client`.
pub struct ReqwestTransport {
    auth_header: String,
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(email: &str, api_token: &str, timeout: Duration) -> Result<Self, JiraError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| JiraError::Transport {
                url: String::new(),
                message: format!("failed to build HTTP client: {err}"),
            })?;
        Ok(Self {
            auth_header: basic_auth(email, api_token),
            client,
        })
    }
}

pub fn basic_auth(email: &str, api_token: &str) -> String {
    let creds = format!("{email}:{api_token}");
    let encoded = base64::engine::general_purpose::STANDARD.encode(creds);
    format!("Basic {encoded}")
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, JiraError> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .header(AUTHORIZATION, &self.auth_header)
            .header(ACCEPT, "application/json");
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let transport_err = |err: reqwest::Error| JiraError::Transport {
            url: request.url.clone(),
            message: err.to_string(),
        };

        let resp = builder.send().await.map_err(transport_err)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(transport_err)?;
        tracing::debug!(method = %request.method, url = %request.url, status, "jira response");
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_auth_encodes_email_and_token() {
        assert_eq!(
            basic_auth("wt@example.com", "token"),
            "Basic d3RAZXhhbXBsZS5jb206dG9rZW4="
        );
    }
}
