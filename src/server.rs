use crate::client::{DownstreamClient, ServiceName};
use crate::config::AppConfig;
use crate::error::{ProxyError, normalize};
use crate::guard;
use crate::observability;
use crate::relay;
use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use http::HeaderMap;
use http::Method;
use http::header::CONTENT_TYPE;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::Instrument;

/// Per-downstream clients built once at startup; the only state the gateway
/// holds. Request handling shares nothing mutable.
#[derive(Clone)]
pub struct AppState {
    pub auth: DownstreamClient,
    pub jobs: DownstreamClient,
    pub applications: DownstreamClient,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Result<Self, String> {
        Ok(Self {
            auth: DownstreamClient::from_config(ServiceName::Auth, &config.services.auth)?,
            jobs: DownstreamClient::from_config(ServiceName::Jobs, &config.services.jobs)?,
            applications: DownstreamClient::from_config(
                ServiceName::Applications,
                &config.services.applications,
            )?,
        })
    }
}

pub fn build_app(config: Arc<AppConfig>) -> Result<Router, String> {
    let state = AppState::from_config(&config)?;

    Ok(Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/auth/register", post(register_handler))
        .route("/api/v1/auth/login", post(login_handler))
        .route("/api/v1/auth/me", get(me_handler))
        .route("/api/v1/jobs", get(list_jobs_handler).post(create_job_handler))
        .route("/api/v1/jobs/{id}", get(get_job_handler))
        .route(
            "/api/v1/jobs/{id}/applications",
            get(list_applications_handler),
        )
        .route("/api/v1/applications", post(create_application_handler))
        .route(
            "/api/v1/applications/status/{token}",
            get(application_status_handler),
        )
        .route(
            "/api/v1/applications/{id}/status",
            patch(update_application_status_handler),
        )
        .route(
            "/api/v1/applications/{id}/resume",
            get(download_resume_handler),
        )
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state))
}

pub async fn run_server(config: Arc<AppConfig>) -> Result<(), String> {
    let listen_addr: SocketAddr = config
        .listen
        .parse()
        .map_err(|err| format!("invalid listen address `{}`: {err}", config.listen))?;
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .map_err(|err| format!("failed to bind `{listen_addr}`: {err}"))?;

    let app = build_app(config)?;
    tracing::info!(%listen_addr, "gateway listening");

    axum::serve(listener, app)
        .await
        .map_err(|err| format!("server error: {err}"))
}

async fn request_id_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = observability::extract_or_generate_request_id(request.headers());
    let span = tracing::info_span!(
        "request",
        %request_id,
        method = %request.method(),
        path = request.uri().path(),
    );

    let mut response = next.run(request).instrument(span).await;
    observability::insert_request_id_header(response.headers_mut(), &request_id);
    response
}

async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "application/json")],
        r#"{"status":"ok"}"#,
    )
}

async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Response, ProxyError> {
    forward_json(&state.auth, Method::POST, "/auth/register", &[], Some(&body), None).await
}

async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Response, ProxyError> {
    forward_json(&state.auth, Method::POST, "/auth/login", &[], Some(&body), None).await
}

async fn me_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    let identity =
        guard::require_identity(&state.auth, guard::credential(&headers).as_deref()).await?;
    Ok(Json(identity).into_response())
}

async fn list_jobs_handler(State(state): State<AppState>) -> Result<Response, ProxyError> {
    forward_json(&state.jobs, Method::GET, "/jobs", &[], None, None).await
}

async fn get_job_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ProxyError> {
    forward_json(&state.jobs, Method::GET, &format!("/jobs/{id}"), &[], None, None).await
}

/// Guarded create: the authenticated recruiter's id is stamped onto the
/// payload as `createdByUserId`; the rest of the body is forwarded opaquely.
async fn create_job_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut body): Json<Value>,
) -> Result<Response, ProxyError> {
    let identity =
        guard::require_identity(&state.auth, guard::credential(&headers).as_deref()).await?;

    match &mut body {
        Value::Object(fields) => {
            fields.insert(
                "createdByUserId".to_string(),
                Value::String(identity.id),
            );
        }
        other => {
            *other = serde_json::json!({ "createdByUserId": identity.id });
        }
    }

    forward_json(&state.jobs, Method::POST, "/jobs", &[], Some(&body), None).await
}

/// Public apply endpoint: multipart in, multipart out. The relay rejects a
/// missing resume part locally with 400 before anything goes downstream.
async fn create_application_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ProxyError> {
    let form = relay::build_upload_form(multipart).await?;

    state
        .applications
        .post_multipart("/applications", form)
        .await
        .map(|(status, value)| (status, Json(value)).into_response())
        .map_err(|failure| normalize(failure, state.applications.fallback_message()))
}

/// Public status lookup; the token is unguessable and stands in for auth.
async fn application_status_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response, ProxyError> {
    forward_json(
        &state.applications,
        Method::GET,
        &format!("/applications/status/{token}"),
        &[],
        None,
        None,
    )
    .await
}

async fn list_applications_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ProxyError> {
    guard::require_identity(&state.auth, guard::credential(&headers).as_deref()).await?;

    forward_json(
        &state.applications,
        Method::GET,
        "/applications",
        &[("jobId", id.as_str())],
        None,
        None,
    )
    .await
}

/// The status value is forwarded untouched; whether it is one of the allowed
/// values is the applications service's decision, and its 400 passes through.
async fn update_application_status_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, ProxyError> {
    guard::require_identity(&state.auth, guard::credential(&headers).as_deref()).await?;

    forward_json(
        &state.applications,
        Method::PATCH,
        &format!("/applications/{id}/status"),
        &[],
        Some(&body),
        None,
    )
    .await
}

async fn download_resume_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ProxyError> {
    guard::require_identity(&state.auth, guard::credential(&headers).as_deref()).await?;

    let upstream = state
        .applications
        .get_stream(&format!("/applications/{id}/resume"))
        .await
        .map_err(|failure| normalize(failure, state.applications.fallback_message()))?;

    relay::stream_download(upstream).await
}

async fn forward_json(
    client: &DownstreamClient,
    method: Method,
    path: &str,
    query: &[(&str, &str)],
    body: Option<&Value>,
    credential: Option<&str>,
) -> Result<Response, ProxyError> {
    client
        .call(method, path, query, body, credential)
        .await
        .map(|(status, value)| (status, Json(value)).into_response())
        .map_err(|failure| normalize(failure, client.fallback_message()))
}

#[cfg(test)]
mod tests {
    use super::build_app;
    use crate::config::{AppConfig, ServiceConfig, ServicesConfig};
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode};
    use std::sync::Arc;
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn health_returns_ok() {
        let app = build_app(Arc::new(test_config())).expect("app should build");
        let request = Request::builder()
            .method(Method::GET)
            .uri("/api/v1/health")
            .body(Body::empty())
            .expect("request should build");

        let response = app.oneshot(request).await.expect("request should succeed");
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        assert_eq!(&body[..], br#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn protected_routes_reject_missing_credential() {
        for (method, uri, body) in [
            (Method::GET, "/api/v1/auth/me", None),
            (Method::GET, "/api/v1/jobs/j1/applications", None),
            (Method::GET, "/api/v1/applications/a1/resume", None),
            (Method::POST, "/api/v1/jobs", Some(r#"{"title":"Backend Engineer"}"#)),
            (
                Method::PATCH,
                "/api/v1/applications/a1/status",
                Some(r#"{"status":"HIRED"}"#),
            ),
        ] {
            let app = build_app(Arc::new(test_config())).expect("app should build");
            let mut builder = Request::builder().method(method).uri(uri);
            if body.is_some() {
                builder = builder.header("content-type", "application/json");
            }
            let request = builder
                .body(body.map_or_else(Body::empty, Body::from))
                .expect("request should build");

            let response = app.oneshot(request).await.expect("request should succeed");
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");

            let body = to_bytes(response.into_body(), usize::MAX)
                .await
                .expect("body should be readable");
            assert_eq!(&body[..], br#"{"message":"Missing Authorization header"}"#);
        }
    }

    #[tokio::test]
    async fn responses_carry_a_request_id() {
        let app = build_app(Arc::new(test_config())).expect("app should build");
        let request = Request::builder()
            .method(Method::GET)
            .uri("/api/v1/health")
            .header("x-request-id", "probe-1")
            .body(Body::empty())
            .expect("request should build");

        let response = app.oneshot(request).await.expect("request should succeed");
        assert_eq!(
            response
                .headers()
                .get("x-request-id")
                .and_then(|value| value.to_str().ok()),
            Some("probe-1")
        );
    }

    fn test_config() -> AppConfig {
        // Unroutable addresses: these tests must pass without the guard or
        // client ever reaching a downstream.
        let service = |port: u16| ServiceConfig {
            base_url: format!("http://192.0.2.1:{port}"),
            connect_timeout_ms: 50,
            request_timeout_ms: 50,
        };

        AppConfig {
            listen: "127.0.0.1:8080".to_string(),
            services: ServicesConfig {
                auth: service(3001),
                jobs: service(3002),
                applications: service(3003),
            },
            logging: Default::default(),
        }
    }
}
