use crate::client::DownstreamClient;
use crate::error::{ProxyError, normalize};
use axum::http::StatusCode;
use http::HeaderMap;
use http::Method;
use http::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

/// The authenticated recruiter record returned by the auth service for a
/// credential. Obtained fresh per request and never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub created_at: String,
}

/// The inbound credential is the raw `Authorization` header value, taken as
/// an opaque string. The gateway never parses or decodes it; validation is
/// entirely the auth service's decision.
pub fn credential(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

/// Resolves the caller's identity by delegating the credential to the auth
/// service's identity-lookup endpoint.
///
/// An absent credential fails immediately with 401 and no downstream call.
/// Otherwise the credential is forwarded verbatim and any auth-service
/// failure passes through with its own status and body; a 401 from auth
/// stays a 401 here.
pub async fn require_identity(
    auth: &DownstreamClient,
    credential: Option<&str>,
) -> Result<Identity, ProxyError> {
    let Some(credential) = credential else {
        return Err(ProxyError::missing_authorization());
    };

    let (_, body) = auth
        .call(Method::GET, "/auth/me", &[], None, Some(credential))
        .await
        .map_err(|failure| normalize(failure, auth.fallback_message()))?;

    serde_json::from_value(body).map_err(|err| {
        tracing::warn!(error = %err, "auth service returned an unexpected identity shape");
        ProxyError::message(StatusCode::BAD_GATEWAY, auth.fallback_message())
    })
}
