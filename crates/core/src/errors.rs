use thiserror::Error;

/// Coarse classification shared by every error that can reach the webhook boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    Validation,
    Upstream,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::Validation => "validation",
            Self::Upstream => "upstream",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CrmError {
    #[error("missing required identifier `{0}`")]
    MissingIdentifier(&'static str),
    #[error("crm responded with status {status}: {message}")]
    UpstreamStatus { status: u16, message: String },
    #[error("crm request failed: {0}")]
    Transport(String),
    #[error("crm response could not be decoded: {0}")]
    Decode(String),
    #[error("crm pagination exceeded {max_pages} pages")]
    PageLimitExceeded { max_pages: usize },
    #[error("crm returned the same cursor `{0}` twice in a row")]
    RepeatedCursor(String),
}

impl CrmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingIdentifier(_) => ErrorKind::Validation,
            Self::UpstreamStatus { .. }
            | Self::Transport(_)
            | Self::Decode(_)
            | Self::PageLimitExceeded { .. }
            | Self::RepeatedCursor(_) => ErrorKind::Upstream,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UpstreamStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("invalid webhook request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Crm(#[from] CrmError),
}

impl WebhookError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Crm(error) => error.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{CrmError, ErrorKind, WebhookError};

    #[test]
    fn crm_errors_map_to_upstream_except_validation() {
        assert_eq!(CrmError::MissingIdentifier("deal_id").kind(), ErrorKind::Validation);
        assert_eq!(
            CrmError::UpstreamStatus { status: 404, message: "not found".to_owned() }.kind(),
            ErrorKind::Upstream
        );
        assert_eq!(CrmError::Transport("timed out".to_owned()).kind(), ErrorKind::Upstream);
        assert_eq!(CrmError::PageLimitExceeded { max_pages: 5 }.kind(), ErrorKind::Upstream);
    }

    #[test]
    fn webhook_error_preserves_crm_classification() {
        let wrapped = WebhookError::from(CrmError::MissingIdentifier("contact_id"));
        assert_eq!(wrapped.kind(), ErrorKind::Validation);
        assert_eq!(wrapped.to_string(), "missing required identifier `contact_id`");

        let invalid = WebhookError::InvalidRequest("missing sessionInfo".to_owned());
        assert_eq!(invalid.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn upstream_status_is_exposed_for_logging() {
        let error = CrmError::UpstreamStatus { status: 502, message: "bad gateway".to_owned() };
        assert_eq!(error.status(), Some(502));
        assert_eq!(error.to_string(), "crm responded with status 502: bad gateway");
        assert_eq!(CrmError::Decode("eof".to_owned()).status(), None);
    }
}
