use thiserror::Error;

/// Errors that can occur while triggering provisioning.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{count} service principals match app ID {app_id}")]
    AmbiguousResult { app_id: String, count: usize },
    #[error("Graph API error: {message}")]
    GraphApi { status: Option<u16>, message: String },
}

impl ProvisioningError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn graph_api(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::GraphApi {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::GraphApi { status, .. } => *status,
            _ => None,
        }
    }

    /// A 409 from the synchronization API, e.g. the job is already running.
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_)) || self.status() == Some(404)
    }
}
