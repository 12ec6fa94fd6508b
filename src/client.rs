use crate::config::ServiceConfig;
use crate::error::DownstreamFailure;
use http::header::AUTHORIZATION;
use http::{Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Names the downstream a client is bound to. Fixed at process start; each
/// route forwards to exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceName {
    Auth,
    Jobs,
    Applications,
}

impl ServiceName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Jobs => "jobs",
            Self::Applications => "applications",
        }
    }

    /// What clients see when the downstream supplies nothing quotable.
    pub fn fallback_message(self) -> &'static str {
        match self {
            Self::Auth => "Auth service error",
            Self::Jobs => "Jobs service error",
            Self::Applications => "Applications service error",
        }
    }
}

/// One outbound call surface to a named downstream. Holds a pooled
/// `reqwest::Client`, so concurrent in-flight calls do not queue behind each
/// other, and no per-request state.
#[derive(Clone)]
pub struct DownstreamClient {
    service: ServiceName,
    base_url: Arc<str>,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl DownstreamClient {
    pub fn from_config(service: ServiceName, config: &ServiceConfig) -> Result<Self, String> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|err| {
                format!(
                    "failed to build http client for `{}`: {err}",
                    service.as_str()
                )
            })?;

        Ok(Self {
            service,
            base_url: config.base_url.trim_end_matches('/').into(),
            http,
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        })
    }

    pub fn fallback_message(&self) -> &'static str {
        self.service.fallback_message()
    }

    /// `path` must start with `/`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// One JSON round trip. A 2xx response decodes to an opaque value (the
    /// route handler decides its shape) alongside the downstream's own
    /// status, which passes through to the caller; any other outcome is
    /// classified here, once, and never retried.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        json_body: Option<&Value>,
        credential: Option<&str>,
    ) -> Result<(StatusCode, Value), DownstreamFailure> {
        let mut request = self
            .http
            .request(method, self.url(path))
            .timeout(self.request_timeout);

        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = json_body {
            request = request.json(body);
        }
        if let Some(credential) = credential {
            request = request.header(AUTHORIZATION, credential);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownstreamFailure::Http {
                status,
                body: decode_error_body(response).await,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok((status, Value::Null));
        }
        Ok((status, serde_json::from_slice(&bytes)?))
    }

    /// Multipart POST used by the upload relay. The transport layer puts no
    /// ceiling on the body size; the origin service enforces the real limit.
    /// Exempt from the request timeout so large uploads are not cut off.
    pub async fn post_multipart(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<(StatusCode, Value), DownstreamFailure> {
        let response = self.http.post(self.url(path)).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownstreamFailure::Http {
                status,
                body: decode_error_body(response).await,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok((status, Value::Null));
        }
        Ok((status, serde_json::from_slice(&bytes)?))
    }

    /// Raw GET for the download relay: a 2xx response is handed back
    /// undecoded so its body can be piped chunk by chunk. Also exempt from
    /// the request timeout, mirroring the upload path.
    pub async fn get_stream(&self, path: &str) -> Result<reqwest::Response, DownstreamFailure> {
        let response = self.http.get(self.url(path)).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownstreamFailure::Http {
                status,
                body: decode_error_body(response).await,
            });
        }

        Ok(response)
    }
}

/// Best-effort decode of a non-2xx body: structured JSON when possible, a
/// bare string when the body is plain text, otherwise nothing. The error
/// normalizer turns `None` into the fallback message.
async fn decode_error_body(response: reqwest::Response) -> Option<Value> {
    let bytes = response.bytes().await.ok()?;
    if bytes.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
        return Some(value);
    }

    String::from_utf8(bytes.to_vec()).ok().map(Value::String)
}
