use thiserror::Error;

/// Authentication and session errors surfaced at the controller boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Identity is not on the allow-list")]
    AuthorizationDenied,

    #[error("Identity provider failure: {0}")]
    Provider(String),

    #[error("No authenticated session")]
    NotAuthenticated,

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Stale login attempt ignored")]
    StaleAttempt,
}

/// Document retrieval and decode errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Document access denied")]
    Denied,

    #[error("Document not found")]
    NotFound,

    #[error("Server error: {0}")]
    Server(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode document: {0}")]
    Decode(String),
}

impl FetchError {
    /// Map an HTTP status code to the retrieval error taxonomy.
    pub fn from_status(status: u16) -> FetchError {
        match status {
            401 | 403 => FetchError::Denied,
            404 => FetchError::NotFound,
            s => FetchError::Server(format!("HTTP {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(FetchError::from_status(403), FetchError::Denied);
        assert_eq!(FetchError::from_status(401), FetchError::Denied);
        assert_eq!(FetchError::from_status(404), FetchError::NotFound);
        assert_eq!(
            FetchError::from_status(500),
            FetchError::Server("HTTP 500".to_string())
        );
    }
}
