use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::graph_client::REQUEST_TIMEOUT;

/// Scope requested for Microsoft Graph tokens.
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

const TOKEN_EXCHANGE_AUDIENCE: &str = "api://AzureADTokenExchange";
const JWT_BEARER_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_TIMEOUT: StdDuration = StdDuration::from_secs(2);
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// A bearer token together with its expiry.
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: OffsetDateTime,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_on: OffsetDateTime) -> Self {
        Self {
            token: token.into(),
            expires_on,
        }
    }

    /// Returns true if the token is expired or expires within `grace`.
    pub fn is_expired(&self, grace: Duration) -> bool {
        OffsetDateTime::now_utc() + grace >= self.expires_on
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    /// The source is not configured in this environment.
    #[error("{source_name} unavailable: {reason}")]
    Unavailable {
        source_name: &'static str,
        reason: String,
    },
    /// The source is configured but could not produce a token.
    #[error("{source_name} failed: {reason}")]
    Failed {
        source_name: &'static str,
        reason: String,
    },
    #[error("no credential source produced a token: {}", .0.join("; "))]
    Exhausted(Vec<String>),
}

impl CredentialError {
    fn unavailable(source_name: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            source_name,
            reason: reason.into(),
        }
    }

    fn failed(source_name: &'static str, reason: impl Into<String>) -> Self {
        Self::Failed {
            source_name,
            reason: reason.into(),
        }
    }
}

/// Anything that can hand out bearer tokens for a scope.
#[async_trait]
pub trait TokenSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError>;
}

/// Snapshot of the identity-related environment variables.
///
/// Read once so credential sources behave the same for the whole run and so
/// tests can build one without touching the process environment.
#[derive(Clone, Default)]
pub struct AzureEnvironment {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub federated_token_file: Option<String>,
    pub actions_id_token_request_url: Option<String>,
    pub actions_id_token_request_token: Option<String>,
    pub identity_endpoint: Option<String>,
    pub identity_header: Option<String>,
    pub authority_host: Option<String>,
}

impl AzureEnvironment {
    pub fn from_env() -> Self {
        fn var(name: &str) -> Option<String> {
            std::env::var(name)
                .ok()
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        }

        Self {
            tenant_id: var("AZURE_TENANT_ID"),
            client_id: var("AZURE_CLIENT_ID"),
            client_secret: var("AZURE_CLIENT_SECRET"),
            federated_token_file: var("AZURE_FEDERATED_TOKEN_FILE"),
            actions_id_token_request_url: var("ACTIONS_ID_TOKEN_REQUEST_URL"),
            actions_id_token_request_token: var("ACTIONS_ID_TOKEN_REQUEST_TOKEN"),
            identity_endpoint: var("IDENTITY_ENDPOINT"),
            identity_header: var("IDENTITY_HEADER"),
            authority_host: var("AZURE_AUTHORITY_HOST"),
        }
    }

    pub fn authority_host(&self) -> &str {
        self.authority_host
            .as_deref()
            .unwrap_or(DEFAULT_AUTHORITY_HOST)
            .trim_end_matches('/')
    }

    fn app_registration(
        &self,
        source_name: &'static str,
    ) -> Result<(String, String), CredentialError> {
        match (&self.tenant_id, &self.client_id) {
            (Some(tenant), Some(client)) => Ok((tenant.clone(), client.clone())),
            _ => Err(CredentialError::unavailable(
                source_name,
                "AZURE_TENANT_ID and AZURE_CLIENT_ID must be set",
            )),
        }
    }
}

/// `https://graph.microsoft.com/.default` -> `https://graph.microsoft.com`
fn scope_to_resource(scope: &str) -> &str {
    scope.trim_end_matches("/.default")
}

/// Parses the token payloads returned by Entra ID, IMDS and App Service.
///
/// The endpoints disagree on whether `expires_in` / `expires_on` are numbers
/// or strings, so both forms are accepted.
fn parse_token_payload(
    source_name: &'static str,
    payload: &Value,
) -> Result<AccessToken, CredentialError> {
    let token = payload["access_token"]
        .as_str()
        .ok_or_else(|| CredentialError::failed(source_name, "no access_token in response"))?;

    let as_i64 = |value: &Value| {
        value
            .as_i64()
            .or_else(|| value.as_str().and_then(|s| s.parse::<i64>().ok()))
    };

    let now = OffsetDateTime::now_utc();
    let default_expiry = now + Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS);
    let expires_on = if let Some(expires_in) = as_i64(&payload["expires_in"]) {
        now.checked_add(Duration::seconds(expires_in))
            .unwrap_or(default_expiry)
    } else if let Some(epoch) = as_i64(&payload["expires_on"]) {
        OffsetDateTime::from_unix_timestamp(epoch).unwrap_or(default_expiry)
    } else {
        default_expiry
    };

    Ok(AccessToken::new(token, expires_on))
}

/// HTTP client for token requests with a per-request timeout.
pub fn build_http_client(timeout: StdDuration) -> Result<reqwest::Client, CredentialError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| {
            CredentialError::failed("ChainedCredential", format!("failed to build HTTP client: {e}"))
        })
}

/// Posts a form to the tenant's v2.0 token endpoint.
async fn request_token(
    http: &reqwest::Client,
    source_name: &'static str,
    authority_host: &str,
    tenant_id: &str,
    params: &[(&str, &str)],
) -> Result<AccessToken, CredentialError> {
    let token_url = format!("{authority_host}/{tenant_id}/oauth2/v2.0/token");

    let response = http
        .post(&token_url)
        .form(params)
        .send()
        .await
        .map_err(|e| CredentialError::failed(source_name, format!("token request failed: {e}")))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(CredentialError::failed(
            source_name,
            format!("token request failed with status {status}: {body}"),
        ));
    }

    let payload: Value = response.json().await.map_err(|e| {
        CredentialError::failed(source_name, format!("failed to parse token response: {e}"))
    })?;

    parse_token_payload(source_name, &payload)
}

/// Exchanges a federated OIDC token for an Entra ID access token.
async fn exchange_client_assertion(
    http: &reqwest::Client,
    source_name: &'static str,
    env: &AzureEnvironment,
    assertion: &str,
    scope: &str,
) -> Result<AccessToken, CredentialError> {
    let (tenant_id, client_id) = env.app_registration(source_name)?;
    let params = [
        ("grant_type", "client_credentials"),
        ("client_id", client_id.as_str()),
        ("client_assertion_type", JWT_BEARER_ASSERTION_TYPE),
        ("client_assertion", assertion),
        ("scope", scope),
    ];

    request_token(http, source_name, env.authority_host(), &tenant_id, &params).await
}

/// Service principal with a client secret (`AZURE_CLIENT_SECRET`).
pub struct ClientSecretCredential {
    env: AzureEnvironment,
    http: reqwest::Client,
}

impl ClientSecretCredential {
    pub fn new(env: AzureEnvironment, http: reqwest::Client) -> Self {
        Self { env, http }
    }
}

#[async_trait]
impl TokenSource for ClientSecretCredential {
    fn name(&self) -> &'static str {
        "ClientSecretCredential"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let (tenant_id, client_id) = self.env.app_registration(self.name())?;
        let secret = self
            .env
            .client_secret
            .as_deref()
            .ok_or_else(|| CredentialError::unavailable(self.name(), "AZURE_CLIENT_SECRET not set"))?;

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id.as_str()),
            ("client_secret", secret),
            ("scope", scope),
        ];

        request_token(
            &self.http,
            self.name(),
            self.env.authority_host(),
            &tenant_id,
            &params,
        )
        .await
    }
}

/// Federated credential read from `AZURE_FEDERATED_TOKEN_FILE`.
pub struct WorkloadIdentityCredential {
    env: AzureEnvironment,
    http: reqwest::Client,
}

impl WorkloadIdentityCredential {
    pub fn new(env: AzureEnvironment, http: reqwest::Client) -> Self {
        Self { env, http }
    }
}

#[async_trait]
impl TokenSource for WorkloadIdentityCredential {
    fn name(&self) -> &'static str {
        "WorkloadIdentityCredential"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let path = self.env.federated_token_file.as_deref().ok_or_else(|| {
            CredentialError::unavailable(self.name(), "AZURE_FEDERATED_TOKEN_FILE not set")
        })?;
        // Fail as unavailable before touching the file when the app registration is missing.
        self.env.app_registration(self.name())?;

        let assertion = tokio::fs::read_to_string(path).await.map_err(|e| {
            CredentialError::failed(self.name(), format!("failed to read {path}: {e}"))
        })?;
        let assertion = assertion.trim();
        if assertion.is_empty() {
            return Err(CredentialError::failed(
                self.name(),
                format!("federated token file {path} is empty"),
            ));
        }

        exchange_client_assertion(&self.http, self.name(), &self.env, assertion, scope).await
    }
}

/// Federated credential minted by the GitHub Actions OIDC provider.
pub struct GitHubActionsCredential {
    env: AzureEnvironment,
    http: reqwest::Client,
}

impl GitHubActionsCredential {
    pub fn new(env: AzureEnvironment, http: reqwest::Client) -> Self {
        Self { env, http }
    }

    async fn request_id_token(&self, url: &str, bearer: &str) -> Result<String, CredentialError> {
        let response = self
            .http
            .get(url)
            .query(&[("audience", TOKEN_EXCHANGE_AUDIENCE)])
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| {
                CredentialError::failed(self.name(), format!("OIDC token request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(CredentialError::failed(
                self.name(),
                format!("OIDC token request failed with status {status}"),
            ));
        }

        let payload: Value = response.json().await.map_err(|e| {
            CredentialError::failed(self.name(), format!("failed to parse OIDC response: {e}"))
        })?;

        payload["value"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| CredentialError::failed(self.name(), "no value in OIDC response"))
    }
}

#[async_trait]
impl TokenSource for GitHubActionsCredential {
    fn name(&self) -> &'static str {
        "GitHubActionsCredential"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let (Some(url), Some(bearer)) = (
            self.env.actions_id_token_request_url.as_deref(),
            self.env.actions_id_token_request_token.as_deref(),
        ) else {
            return Err(CredentialError::unavailable(
                self.name(),
                "ACTIONS_ID_TOKEN_REQUEST_URL and ACTIONS_ID_TOKEN_REQUEST_TOKEN not set",
            ));
        };
        self.env.app_registration(self.name())?;

        let assertion = self.request_id_token(url, bearer).await?;
        exchange_client_assertion(&self.http, self.name(), &self.env, &assertion, scope).await
    }
}

/// Managed identity via App Service (`IDENTITY_ENDPOINT`) or IMDS.
pub struct ManagedIdentityCredential {
    env: AzureEnvironment,
    http: reqwest::Client,
    imds_endpoint: String,
}

impl ManagedIdentityCredential {
    pub fn new(env: AzureEnvironment, http: reqwest::Client) -> Self {
        Self {
            env,
            http,
            imds_endpoint: IMDS_ENDPOINT.to_owned(),
        }
    }

    pub fn with_imds_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.imds_endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl TokenSource for ManagedIdentityCredential {
    fn name(&self) -> &'static str {
        "ManagedIdentityCredential"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let resource = scope_to_resource(scope);

        let request = match (
            self.env.identity_endpoint.as_deref(),
            self.env.identity_header.as_deref(),
        ) {
            (Some(endpoint), Some(header)) => self
                .http
                .get(endpoint)
                .header("X-IDENTITY-HEADER", header)
                .query(&[("api-version", "2019-08-01"), ("resource", resource)]),
            _ => self
                .http
                .get(&self.imds_endpoint)
                .header("Metadata", "true")
                .timeout(IMDS_TIMEOUT)
                .query(&[("api-version", "2018-02-01"), ("resource", resource)]),
        };

        let response = request.send().await.map_err(|e| {
            CredentialError::unavailable(self.name(), format!("no managed identity endpoint: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::failed(
                self.name(),
                format!("token request failed with status {status}: {body}"),
            ));
        }

        let payload: Value = response.json().await.map_err(|e| {
            CredentialError::failed(self.name(), format!("failed to parse token response: {e}"))
        })?;

        parse_token_payload(self.name(), &payload)
    }
}

/// Token from a logged-in Azure CLI (`az account get-access-token`).
pub struct AzureCliCredential {
    tenant_id: Option<String>,
}

impl AzureCliCredential {
    pub fn new(env: &AzureEnvironment) -> Self {
        Self {
            tenant_id: env.tenant_id.clone(),
        }
    }
}

#[async_trait]
impl TokenSource for AzureCliCredential {
    fn name(&self) -> &'static str {
        "AzureCliCredential"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let mut command = tokio::process::Command::new("az");
        command.args([
            "account",
            "get-access-token",
            "--resource",
            scope_to_resource(scope),
            "--output",
            "json",
        ]);
        if let Some(tenant_id) = &self.tenant_id {
            command.args(["--tenant", tenant_id]);
        }
        command.kill_on_drop(true);

        let output = tokio::time::timeout(REQUEST_TIMEOUT, command.output())
            .await
            .map_err(|_| {
                CredentialError::failed(
                    self.name(),
                    format!(
                        "az account get-access-token timed out after {}s",
                        REQUEST_TIMEOUT.as_secs()
                    ),
                )
            })?
            .map_err(|e| {
                CredentialError::unavailable(self.name(), format!("az CLI not found: {e}"))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CredentialError::failed(
                self.name(),
                format!("az account get-access-token failed: {}", stderr.trim()),
            ));
        }

        let payload: Value = serde_json::from_slice(&output.stdout).map_err(|e| {
            CredentialError::failed(self.name(), format!("failed to parse az CLI output: {e}"))
        })?;

        // The CLI uses camelCase keys; newer versions add a numeric `expires_on`.
        let normalized = serde_json::json!({
            "access_token": payload["accessToken"],
            "expires_on": payload["expires_on"],
        });
        parse_token_payload(self.name(), &normalized)
    }
}

/// A fixed token that never expires.
pub struct StaticTokenCredential(String);

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticTokenCredential {
    fn name(&self) -> &'static str {
        "StaticTokenCredential"
    }

    async fn get_token(&self, _scope: &str) -> Result<AccessToken, CredentialError> {
        Ok(AccessToken::new(
            self.0.clone(),
            OffsetDateTime::now_utc() + Duration::days(365),
        ))
    }
}

/// Tries each source in order and uses the first one that yields a token.
///
/// The winning source is remembered for the rest of the run, and its token is
/// reused until it is within `grace` of expiry.
pub struct ChainedCredential {
    sources: Vec<Box<dyn TokenSource>>,
    selected: Mutex<Option<usize>>,
    cached: Mutex<Option<(String, AccessToken)>>,
    grace: Duration,
}

impl ChainedCredential {
    pub fn new(sources: Vec<Box<dyn TokenSource>>) -> Self {
        Self {
            sources,
            selected: Mutex::new(None),
            cached: Mutex::new(None),
            grace: Duration::minutes(5),
        }
    }

    /// Default chain: environment-supplied service and federated credentials
    /// first, managed identity next, and the Azure CLI last.
    pub fn from_environment(env: AzureEnvironment, http: reqwest::Client) -> Self {
        Self::new(vec![
            Box::new(ClientSecretCredential::new(env.clone(), http.clone())),
            Box::new(WorkloadIdentityCredential::new(env.clone(), http.clone())),
            Box::new(GitHubActionsCredential::new(env.clone(), http.clone())),
            Box::new(ManagedIdentityCredential::new(env.clone(), http)),
            Box::new(AzureCliCredential::new(&env)),
        ])
    }

    /// Default chain over the process environment. Token requests time out
    /// after 30 seconds.
    pub fn from_env() -> Result<Self, CredentialError> {
        let http = build_http_client(REQUEST_TIMEOUT)?;
        Ok(Self::from_environment(AzureEnvironment::from_env(), http))
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|source| source.name()).collect()
    }

    pub fn into_shared(self) -> Arc<dyn TokenSource> {
        Arc::new(self)
    }
}

#[async_trait]
impl TokenSource for ChainedCredential {
    fn name(&self) -> &'static str {
        "ChainedCredential"
    }

    #[instrument(skip(self))]
    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        {
            let cached = self.cached.lock().await;
            if let Some((cached_scope, token)) = cached.as_ref() {
                if cached_scope == scope && !token.is_expired(self.grace) {
                    debug!("Using cached token");
                    return Ok(token.clone());
                }
            }
        }

        let mut selected = self.selected.lock().await;
        let token = match *selected {
            Some(index) => self.sources[index].get_token(scope).await?,
            None => {
                let mut failures = Vec::with_capacity(self.sources.len());
                let mut found = None;

                for (index, source) in self.sources.iter().enumerate() {
                    match source.get_token(scope).await {
                        Ok(token) => {
                            info!(source = source.name(), "Authenticated");
                            found = Some((index, token));
                            break;
                        }
                        Err(e) => {
                            debug!(source = source.name(), error = %e, "Credential source skipped");
                            failures.push(e.to_string());
                        }
                    }
                }

                let Some((index, token)) = found else {
                    return Err(CredentialError::Exhausted(failures));
                };
                *selected = Some(index);
                token
            }
        };

        *self.cached.lock().await = Some((scope.to_owned(), token.clone()));
        Ok(token)
    }
}
