//! Supabase-compatible adapters: GoTrue for sessions and accounts, PostgREST
//! for the profile table.

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};
use url::Url;

use super::{
    AuthError, AuthService, BoxFuture, IssuedSession, NewAccount, ProfileStore, UserIdentity,
};

fn http_client() -> Result<Client> {
    Client::builder()
        .user_agent(crate::APP_USER_AGENT)
        .build()
        .context("Failed to build auth service HTTP client")
}

/// Joining relative paths onto a base without a trailing slash drops its last segment.
fn normalize_base(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

#[derive(Deserialize)]
struct WireUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<Value>,
}

impl From<WireUser> for UserIdentity {
    fn from(user: WireUser) -> Self {
        let name = user.user_metadata.as_ref().and_then(|meta| {
            meta.get("name")
                .or_else(|| meta.get("full_name"))
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        Self {
            id: user.id,
            email: user.email.filter(|email| !email.is_empty()),
            name,
        }
    }
}

#[derive(Deserialize)]
struct WireSession {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<WireUser>,
}

impl From<WireSession> for IssuedSession {
    fn from(session: WireSession) -> Self {
        Self {
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            user: session.user.map(UserIdentity::from),
        }
    }
}

/// Pull a human readable message out of a GoTrue / PostgREST error body.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["msg", "message", "error_description", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

async fn upstream_error(response: Response) -> AuthError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    AuthError::Upstream {
        status: status.as_u16(),
        message: error_message(&body)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
    }
}

/// GoTrue client.
#[derive(Clone)]
pub struct SupabaseAuth {
    client: Client,
    base: Url,
    anon_key: SecretString,
    service_role_key: Option<SecretString>,
}

impl SupabaseAuth {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base: Url,
        anon_key: SecretString,
        service_role_key: Option<SecretString>,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base: normalize_base(base),
            anon_key,
            service_role_key,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        self.base
            .join(path)
            .map_err(|err| AuthError::Transport(format!("invalid auth endpoint {path}: {err}")))
    }

    fn with_keys(&self, request: RequestBuilder, bearer: &str) -> RequestBuilder {
        request
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(bearer)
    }

    #[instrument(skip(self, access_token))]
    async fn fetch_user(&self, access_token: &str) -> Result<UserIdentity, AuthError> {
        let url = self.endpoint("auth/v1/user")?;
        let response = self
            .with_keys(self.client.get(url), access_token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let user: WireUser = response.json().await?;
                Ok(user.into())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AuthError::Unauthorized),
            _ => Err(upstream_error(response).await),
        }
    }

    /// POST a token grant. 400/401 mean the grant itself was rejected.
    async fn token_grant(&self, grant_type: &str, body: Value) -> Result<IssuedSession, AuthError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);

        let response = self
            .with_keys(self.client.post(url), self.anon_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let session: WireSession = response.json().await?;
                Ok(session.into())
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let error = upstream_error(response).await;
                debug!("Token grant {grant_type} rejected: {error}");
                Err(AuthError::Unauthorized)
            }
            _ => Err(upstream_error(response).await),
        }
    }

    #[instrument(skip(self, refresh_token))]
    async fn refresh(&self, refresh_token: &str) -> Result<IssuedSession, AuthError> {
        self.token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }

    #[instrument(skip(self, code, code_verifier))]
    async fn exchange(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<IssuedSession, AuthError> {
        self.token_grant(
            "pkce",
            json!({ "auth_code": code, "code_verifier": code_verifier.unwrap_or_default() }),
        )
        .await
    }

    #[instrument(skip(self, account), fields(email = %account.email))]
    async fn admin_create_user(&self, account: &NewAccount) -> Result<UserIdentity, AuthError> {
        let Some(service_key) = &self.service_role_key else {
            return Err(AuthError::NotConfigured("account creation"));
        };
        let url = self.endpoint("auth/v1/admin/users")?;

        let mut body = json!({
            "email": account.email,
            "password": account.password,
        });
        if let Some(name) = &account.name {
            body["user_metadata"] = json!({ "name": name });
        }

        let response = self
            .client
            .post(url)
            .header("apikey", service_key.expose_secret())
            .bearer_auth(service_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            let user: WireUser = response.json().await?;
            Ok(user.into())
        } else {
            Err(upstream_error(response).await)
        }
    }

    #[instrument(skip(self))]
    async fn ping(&self) -> Result<(), AuthError> {
        let url = self.endpoint("auth/v1/health")?;
        let response = self
            .client
            .get(url)
            .header("apikey", self.anon_key.expose_secret())
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(upstream_error(response).await)
        }
    }
}

impl AuthService for SupabaseAuth {
    fn get_user<'a>(
        &'a self,
        access_token: &'a str,
    ) -> BoxFuture<'a, Result<UserIdentity, AuthError>> {
        Box::pin(self.fetch_user(access_token))
    }

    fn refresh_session<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<IssuedSession, AuthError>> {
        Box::pin(self.refresh(refresh_token))
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        code_verifier: Option<&'a str>,
    ) -> BoxFuture<'a, Result<IssuedSession, AuthError>> {
        Box::pin(self.exchange(code, code_verifier))
    }

    fn create_user<'a>(
        &'a self,
        account: &'a NewAccount,
    ) -> BoxFuture<'a, Result<UserIdentity, AuthError>> {
        Box::pin(self.admin_create_user(account))
    }

    fn health(&self) -> BoxFuture<'_, Result<(), AuthError>> {
        Box::pin(self.ping())
    }
}

/// Profile roles read through PostgREST with the service-role key.
#[derive(Clone)]
pub struct RestProfileStore {
    client: Client,
    base: Url,
    key: SecretString,
}

#[derive(Deserialize)]
struct ProfileRow {
    #[serde(default)]
    role: Option<String>,
}

impl RestProfileStore {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base: Url, key: SecretString) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base: normalize_base(base),
            key,
        })
    }

    #[instrument(skip(self))]
    async fn fetch_role(&self, user_id: &str) -> Result<Option<String>> {
        let url = self.base.join("rest/v1/profiles")?;
        let id = format!("eq.{user_id}");
        let response = self
            .client
            .get(url)
            .query(&[("select", "role"), ("id", id.as_str()), ("limit", "1")])
            .header("apikey", self.key.expose_secret())
            .bearer_auth(self.key.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "profile lookup failed with {status}: {}",
                error_message(&body).unwrap_or_default()
            ));
        }

        let rows: Vec<ProfileRow> = response.json().await?;
        Ok(rows.into_iter().next().and_then(|row| row.role))
    }
}

impl ProfileStore for RestProfileStore {
    fn role_for<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(self.fetch_role(user_id))
    }
}
