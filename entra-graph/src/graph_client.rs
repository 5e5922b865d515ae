use std::sync::Arc;
use std::time::Duration;

use reqwest::{header::CONTENT_LENGTH, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::credential::{CredentialError, TokenSource, GRAPH_SCOPE};
use crate::models::{
    AppRoleAssignment, DirectoryObject, ODataError, ODataPage, ProvisionOnDemandRequest,
    ServicePrincipal, SynchronizationJob, SynchronizationJobSubject, SynchronizationSchema,
};
use crate::retry::{parse_retry_after, RetryPolicy, Throttle};

pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Graph API returned {status}: {message}")]
    Api {
        status: StatusCode,
        code: Option<String>,
        message: String,
    },
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse Graph response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid Graph URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Refusing to follow nextLink to another origin: {0}")]
    ForeignNextLink(String),
}

impl GraphError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            GraphError::Api { status, .. } => Some(*status),
            GraphError::Http(e) => e.status(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == Some(StatusCode::CONFLICT)
    }

    async fn from_response(response: Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        match serde_json::from_str::<ODataError>(&body) {
            Ok(odata) => {
                let mut message = odata.error.message;
                for detail in &odata.error.details {
                    message.push_str(&format!(
                        " [{}: {}]",
                        detail.code.as_deref().unwrap_or("detail"),
                        detail.message.as_deref().unwrap_or_default()
                    ));
                }
                GraphError::Api {
                    status,
                    code: Some(odata.error.code),
                    message,
                }
            }
            Err(_) => GraphError::Api {
                status,
                code: None,
                message: body,
            },
        }
    }
}

/// Microsoft Graph client covering the service principal, synchronization
/// and group membership endpoints.
///
/// Every request carries a fresh bearer token from the credential, waits on
/// the shared [`Throttle`], and is retried per the [`RetryPolicy`].
#[derive(Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    credential: Arc<dyn TokenSource>,
    base_url: String,
    retry_policy: RetryPolicy,
    throttle: Arc<Throttle>,
}

impl GraphClient {
    pub fn new(credential: Arc<dyn TokenSource>) -> Result<Self, GraphError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            credential,
            base_url: GRAPH_BASE_URL.to_owned(),
            retry_policy: RetryPolicy::default(),
            throttle: Arc::new(Throttle::new()),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn throttle(&self) -> &Arc<Throttle> {
        &self.throttle
    }

    fn endpoint(&self, path: &str) -> Result<Url, GraphError> {
        Ok(Url::parse(&format!(
            "{}/{}",
            self.base_url,
            path.trim_start_matches('/')
        ))?)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &Url,
        body: Option<&B>,
    ) -> Result<Response, GraphError> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.throttle.wait().await;

            let token = self.credential.get_token(GRAPH_SCOPE).await?;
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .bearer_auth(&token.token);
            request = match body {
                Some(body) => request.json(body),
                None if method == Method::POST => request.header(CONTENT_LENGTH, 0),
                None => request,
            };

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < max_attempts => {
                    let delay = self.retry_policy.delay_for(attempt, None);
                    warn!(
                        error = %e,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Graph request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if RetryPolicy::is_retryable_status(status) && attempt < max_attempts {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|value| value.to_str().ok())
                    .and_then(parse_retry_after);
                let delay = self.retry_policy.delay_for(attempt, retry_after);
                warn!(
                    %status,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Transient Graph API error, retrying"
                );

                if status == StatusCode::TOO_MANY_REQUESTS {
                    self.throttle.back_off(delay).await;
                } else {
                    tokio::time::sleep(delay).await;
                }
                continue;
            }

            return Err(GraphError::from_response(response).await);
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, GraphError> {
        let response = self.send::<()>(Method::GET, url, None).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn post_without_response<B: Serialize + ?Sized>(
        &self,
        url: &Url,
        body: Option<&B>,
    ) -> Result<(), GraphError> {
        let response = self.send(Method::POST, url, body).await?;
        let _ = response.bytes().await;
        Ok(())
    }

    /// Follows `@odata.nextLink` until the collection is exhausted.
    async fn get_all_pages<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>, GraphError> {
        let mut items = Vec::new();
        let mut next = Some(url);

        while let Some(url) = next {
            debug!(%url, "Fetching page");
            let page: ODataPage<T> = self.get_json(&url).await?;
            items.extend(page.value);
            next = match page.next_link.as_deref() {
                Some(link) => Some(self.next_link(link)?),
                None => None,
            };
        }

        Ok(items)
    }

    /// Parses a `@odata.nextLink`, which must stay on the client's origin so
    /// the bearer token is never sent elsewhere.
    fn next_link(&self, link: &str) -> Result<Url, GraphError> {
        let next = Url::parse(link)?;
        if next.origin() != Url::parse(&self.base_url)?.origin() {
            return Err(GraphError::ForeignNextLink(link.to_owned()));
        }
        Ok(next)
    }

    /// Service principals whose `appId` equals `app_id`. Only the first page
    /// is requested; callers decide what more than one match means.
    #[instrument(skip(self))]
    pub async fn find_service_principals_by_app_id(
        &self,
        app_id: &str,
    ) -> Result<Vec<ServicePrincipal>, GraphError> {
        let mut url = self.endpoint("servicePrincipals")?;
        url.query_pairs_mut()
            .append_pair("$filter", &format!("appId eq '{}'", app_id.replace('\'', "''")))
            .append_pair("$select", "id,appId,displayName,appDisplayName");

        let page: ODataPage<ServicePrincipal> = self.get_json(&url).await?;
        Ok(page.value)
    }

    #[instrument(skip(self))]
    pub async fn list_synchronization_jobs(
        &self,
        service_principal_id: &str,
    ) -> Result<Vec<SynchronizationJob>, GraphError> {
        let url = self.endpoint(&format!(
            "servicePrincipals/{service_principal_id}/synchronization/jobs"
        ))?;
        let page: ODataPage<SynchronizationJob> = self.get_json(&url).await?;
        Ok(page.value)
    }

    /// Starts the job. Completion happens asynchronously on the Graph side.
    #[instrument(skip(self))]
    pub async fn start_synchronization_job(
        &self,
        service_principal_id: &str,
        job_id: &str,
    ) -> Result<(), GraphError> {
        let url = self.endpoint(&format!(
            "servicePrincipals/{service_principal_id}/synchronization/jobs/{job_id}/start"
        ))?;
        self.post_without_response::<()>(&url, None).await
    }

    #[instrument(skip(self))]
    pub async fn get_synchronization_schema(
        &self,
        service_principal_id: &str,
        job_id: &str,
    ) -> Result<SynchronizationSchema, GraphError> {
        let url = self.endpoint(&format!(
            "servicePrincipals/{service_principal_id}/synchronization/jobs/{job_id}/schema"
        ))?;
        self.get_json(&url).await
    }

    #[instrument(skip(self))]
    pub async fn list_app_role_assignments(
        &self,
        service_principal_id: &str,
    ) -> Result<Vec<AppRoleAssignment>, GraphError> {
        let mut url = self.endpoint(&format!(
            "servicePrincipals/{service_principal_id}/appRoleAssignedTo"
        ))?;
        url.query_pairs_mut().append_pair(
            "$select",
            "id,principalId,principalType,principalDisplayName,appRoleId",
        );
        self.get_all_pages(url).await
    }

    #[instrument(skip(self))]
    pub async fn list_group_members(
        &self,
        group_id: &str,
    ) -> Result<Vec<DirectoryObject>, GraphError> {
        let mut url = self.endpoint(&format!("groups/{group_id}/members"))?;
        url.query_pairs_mut()
            .append_pair("$select", "id,displayName,userPrincipalName,userType");
        self.get_all_pages(url).await
    }

    #[instrument(skip(self, subjects), fields(subjects = subjects.len()))]
    pub async fn provision_on_demand(
        &self,
        service_principal_id: &str,
        job_id: &str,
        rule_id: &str,
        subjects: Vec<SynchronizationJobSubject>,
    ) -> Result<(), GraphError> {
        let url = self.endpoint(&format!(
            "servicePrincipals/{service_principal_id}/synchronization/jobs/{job_id}/provisionOnDemand"
        ))?;
        let request = ProvisionOnDemandRequest::new(rule_id, subjects);
        self.post_without_response(&url, Some(&request)).await
    }
}
