//! GitHub OAuth code exchange and profile lookup
//!
//! Two provider round trips complete a login:
//! 1. POST the authorization code to the token endpoint for an access token
//! 2. GET the profile endpoint with that token for the stable user id
//!
//! Both run under a per-request timeout. Provider error bodies are kept in
//! the returned error for logs and never reach the HTTP client.

use std::time::Duration;

use common::Secret;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::constants::{
    GITHUB_AUTHORIZE_URL, GITHUB_PROFILE_URL, GITHUB_TOKEN_URL, PROVIDER_TIMEOUT, USER_AGENT,
};
use crate::error::{Error, Result};

/// Where the provider's three endpoints live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub profile_url: String,
}

impl ProviderEndpoints {
    pub fn github() -> Self {
        Self {
            authorize_url: GITHUB_AUTHORIZE_URL.to_string(),
            token_url: GITHUB_TOKEN_URL.to_string(),
            profile_url: GITHUB_PROFILE_URL.to_string(),
        }
    }
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self::github()
    }
}

/// The two profile fields the login flow needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    /// Stable provider account id, stringified.
    pub provider_user_id: String,
    pub login: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    error: Option<String>,
}

/// GitHub reports `id` as a number; other providers often use strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum ProfileId {
    Number(i64),
    Text(String),
}

#[derive(Deserialize)]
struct ProfileResponse {
    id: ProfileId,
    #[serde(default)]
    login: String,
}

pub struct OAuthClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: Secret<String>,
    authorize_url: Url,
    endpoints: ProviderEndpoints,
    timeout: Duration,
}

impl OAuthClient {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: Secret<String>,
        endpoints: ProviderEndpoints,
        timeout: Duration,
    ) -> Result<Self> {
        let authorize_url = Url::parse(&endpoints.authorize_url)
            .map_err(|e| Error::Http(format!("invalid authorize url: {e}")))?;
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            client_id: client_id.into(),
            client_secret,
            authorize_url,
            endpoints,
            timeout,
        })
    }

    /// GitHub endpoints with the default timeout.
    pub fn github(client_id: impl Into<String>, client_secret: Secret<String>) -> Result<Self> {
        Self::new(
            client_id,
            client_secret,
            ProviderEndpoints::github(),
            PROVIDER_TIMEOUT,
        )
    }

    /// Provider authorize URL carrying `client_id`, `state` and `redirect_uri`.
    pub fn authorization_url(&self, state: &str, redirect_uri: &str) -> String {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("state", state)
            .append_pair("redirect_uri", redirect_uri);
        url.into()
    }

    /// Trade an authorization code for an access token.
    pub async fn exchange_code(&self, code: &str) -> Result<Secret<String>> {
        let response = self
            .http
            .post(&self.endpoints.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.timeout)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose().as_str()),
                ("code", code),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(Error::TokenExchange(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))?;

        // GitHub answers a bad code with 200 and an `error` field.
        if let Some(error) = token.error {
            return Err(Error::TokenExchange(format!("token endpoint error: {error}")));
        }
        if token.access_token.is_empty() {
            return Err(Error::TokenExchange("no access token returned".into()));
        }
        debug!("authorization code exchanged");
        Ok(Secret::new(token.access_token))
    }

    pub async fn fetch_profile(&self, access_token: &Secret<String>) -> Result<ProviderProfile> {
        let response = self
            .http
            .get(&self.endpoints.profile_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .bearer_auth(access_token.expose())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Http(format!("profile request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(Error::Profile(format!(
                "profile endpoint returned {status}: {body}"
            )));
        }

        let profile: ProfileResponse = response
            .json()
            .await
            .map_err(|e| Error::Profile(format!("invalid profile response: {e}")))?;

        let provider_user_id = match profile.id {
            ProfileId::Number(id) => id.to_string(),
            ProfileId::Text(id) => id,
        };
        if provider_user_id.is_empty() {
            return Err(Error::Profile("profile has an empty id".into()));
        }
        Ok(ProviderProfile {
            provider_user_id,
            login: profile.login,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Form;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::collections::HashMap;

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client_for(base: &str, timeout: Duration) -> OAuthClient {
        OAuthClient::new(
            "client-123",
            Secret::new("shh".to_string()),
            ProviderEndpoints {
                authorize_url: format!("{base}/login/oauth/authorize"),
                token_url: format!("{base}/login/oauth/access_token"),
                profile_url: format!("{base}/user"),
            },
            timeout,
        )
        .unwrap()
    }

    async fn token_ok(Form(form): Form<HashMap<String, String>>) -> impl IntoResponse {
        if form.get("client_id").map(String::as_str) != Some("client-123")
            || form.get("client_secret").map(String::as_str) != Some("shh")
        {
            return (StatusCode::UNAUTHORIZED, "bad client").into_response();
        }
        match form.get("code").map(String::as_str) {
            Some("good") => Json(serde_json::json!({
                "access_token": "gho_token",
                "token_type": "bearer",
                "scope": ""
            }))
            .into_response(),
            _ => Json(serde_json::json!({ "error": "bad_verification_code" })).into_response(),
        }
    }

    async fn user_ok(headers: HeaderMap) -> impl IntoResponse {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if auth != "Bearer gho_token" {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Json(serde_json::json!({ "id": 583231, "login": "octocat" })).into_response()
    }

    fn provider() -> Router {
        Router::new()
            .route("/login/oauth/access_token", post(token_ok))
            .route("/user", get(user_ok))
    }

    #[test]
    fn authorization_url_carries_query() {
        let client = OAuthClient::github("abc", Secret::new("s".into())).unwrap();
        let url = client.authorization_url("n+1/=", "https://hextok.app/oauth/callback/github");
        let parsed = Url::parse(&url).unwrap();

        assert_eq!(parsed.host_str(), Some("github.com"));
        assert_eq!(parsed.path(), "/login/oauth/authorize");
        let pairs: HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "abc");
        assert_eq!(pairs["state"], "n+1/=");
        assert_eq!(pairs["redirect_uri"], "https://hextok.app/oauth/callback/github");
    }

    #[test]
    fn invalid_authorize_url_is_rejected() {
        let endpoints = ProviderEndpoints {
            authorize_url: "not a url".into(),
            ..ProviderEndpoints::github()
        };
        assert!(
            OAuthClient::new("id", Secret::new("s".into()), endpoints, PROVIDER_TIMEOUT).is_err()
        );
    }

    #[tokio::test]
    async fn exchange_and_profile_succeed() {
        let base = spawn(provider()).await;
        let client = client_for(&base, PROVIDER_TIMEOUT);

        let token = client.exchange_code("good").await.unwrap();
        assert_eq!(token.expose(), "gho_token");

        let profile = client.fetch_profile(&token).await.unwrap();
        assert_eq!(
            profile,
            ProviderProfile {
                provider_user_id: "583231".into(),
                login: "octocat".into()
            }
        );
    }

    #[tokio::test]
    async fn bad_code_is_token_exchange_error() {
        let base = spawn(provider()).await;
        let client = client_for(&base, PROVIDER_TIMEOUT);
        assert!(matches!(
            client.exchange_code("bad").await,
            Err(Error::TokenExchange(_))
        ));
    }

    #[tokio::test]
    async fn non_success_token_status_is_token_exchange_error() {
        let base = spawn(Router::new().route(
            "/login/oauth/access_token",
            post(|| async { (StatusCode::BAD_GATEWAY, "down") }),
        ))
        .await;
        let err = client_for(&base, PROVIDER_TIMEOUT)
            .exchange_code("good")
            .await
            .unwrap_err();
        assert!(matches!(&err, Error::TokenExchange(msg) if msg.contains("502")));
    }

    #[tokio::test]
    async fn empty_access_token_is_rejected() {
        let base = spawn(Router::new().route(
            "/login/oauth/access_token",
            post(|| async { Json(serde_json::json!({ "access_token": "" })) }),
        ))
        .await;
        assert!(matches!(
            client_for(&base, PROVIDER_TIMEOUT).exchange_code("x").await,
            Err(Error::TokenExchange(_))
        ));
    }

    #[tokio::test]
    async fn rejected_profile_is_profile_error() {
        let base = spawn(provider()).await;
        let client = client_for(&base, PROVIDER_TIMEOUT);
        let wrong = Secret::new("gho_other".to_string());
        assert!(matches!(
            client.fetch_profile(&wrong).await,
            Err(Error::Profile(_))
        ));
    }

    #[tokio::test]
    async fn string_profile_id_is_accepted() {
        let base = spawn(Router::new().route(
            "/user",
            get(|| async { Json(serde_json::json!({ "id": "u-77", "login": "x" })) }),
        ))
        .await;
        let profile = client_for(&base, PROVIDER_TIMEOUT)
            .fetch_profile(&Secret::new("t".into()))
            .await
            .unwrap();
        assert_eq!(profile.provider_user_id, "u-77");
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let base = spawn(Router::new().route(
            "/login/oauth/access_token",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(serde_json::json!({ "access_token": "late" }))
            }),
        ))
        .await;
        let client = client_for(&base, Duration::from_millis(200));
        assert!(matches!(
            client.exchange_code("good").await,
            Err(Error::Http(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_provider_is_http_error() {
        let client = client_for("http://127.0.0.1:1", Duration::from_secs(2));
        assert!(matches!(
            client.exchange_code("good").await,
            Err(Error::Http(_))
        ));
    }
}
