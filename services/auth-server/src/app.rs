//! Shared state and router assembly

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use hextok_auth::{
    AccountResolver, HANDOFF_TTL, MobileBroker, OAuthClient, PROVIDER_GITHUB, STATE_TTL,
    SessionIssuer, SessionVerifier, StateCodec,
};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{IdentityRepo, SessionRepo, UserRepo};
use tracing::{Instrument, info_span};

use crate::config::Config;
use crate::{account, auth, mobile, web};

/// Shared application state accessible from all handlers.
///
/// Built once at startup from the immutable `Config`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub oauth: Arc<OAuthClient>,
    pub states: Arc<StateCodec>,
    pub issuer: Arc<SessionIssuer>,
    pub verifier: Arc<SessionVerifier>,
    pub accounts: Arc<AccountResolver>,
    pub mobile: Arc<MobileBroker>,
    pub users: Arc<dyn UserRepo>,
    pub sessions: Arc<dyn SessionRepo>,
    pub prometheus: PrometheusHandle,
    pub started_at: Instant,
}

impl AppState {
    pub fn new<S>(config: Config, store: Arc<S>, prometheus: PrometheusHandle) -> anyhow::Result<Self>
    where
        S: UserRepo + IdentityRepo + SessionRepo + 'static,
    {
        let client_secret = config
            .provider
            .client_secret
            .clone()
            .context("provider client secret is not configured")?;
        let signing_key = config
            .state
            .signing_key
            .as_ref()
            .context("state signing key is not configured")?;

        let oauth = OAuthClient::new(
            config.provider.client_id.clone(),
            client_secret,
            config.provider_endpoints(),
            config.provider_timeout(),
        )
        .context("failed to build provider client")?;
        let states = StateCodec::new(signing_key, STATE_TTL);

        let verifier = Arc::new(SessionVerifier::new(store.clone()));
        let mobile = MobileBroker::new(
            config.mobile.allowed_scheme.clone(),
            &config.mobile.redirect_uri,
            HANDOFF_TTL,
            verifier.clone(),
        )
        .context("invalid mobile redirect configuration")?;

        Ok(Self {
            oauth: Arc::new(oauth),
            states: Arc::new(states),
            issuer: Arc::new(SessionIssuer::new(store.clone())),
            verifier,
            accounts: Arc::new(AccountResolver::new(
                store.clone(),
                store.clone(),
                PROVIDER_GITHUB,
            )),
            mobile: Arc::new(mobile),
            users: store.clone(),
            sessions: store,
            config: Arc::new(config),
            prometheus,
            started_at: Instant::now(),
        })
    }
}

/// Build the axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_connections`.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    let protected = Router::new()
        .route("/oauth/me", get(account::me))
        .route("/oauth/sessions", get(account::list_sessions))
        .route("/oauth/sessions/{id}", delete(account::revoke_session))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    Router::new()
        .route("/oauth/start/github", get(web::start))
        .route("/oauth/mobile/start/github", get(mobile::start))
        .route("/oauth/callback/github", get(web::callback))
        .route("/oauth/mobile/exchange", post(mobile::exchange))
        .route("/oauth/logout", get(web::logout).post(web::logout))
        .merge(protected)
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(request_id))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// 302 Found to `location`.
pub fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(LOCATION, value)]).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// Wrap each request in a span carrying a generated id, echoed back in
/// `x-request-id`.
async fn request_id(request: Request, next: Next) -> Response {
    let id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let span = info_span!(
        "request",
        request_id = %id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    });
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.prometheus.render(),
    )
}
