use http::StatusCode;
use http::header::CONTENT_TYPE;
use http::header::HeaderValue;
use serde::Serialize;

use crate::context::Response;
use crate::context::response_with;

/// Failures that application code raises to the pipeline.
///
/// The fault isolation stage turns these into responses. The carried detail
/// is logged server side and never sent to the client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    /// The caller's credentials could not be verified.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The caller is known but may not access the resource.
    #[error("Access denied: {0}")]
    Authorization(String),

    /// The requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request carried invalid parameters.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Anything else that went wrong while handling the request.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The closed set of failure classes the pipeline distinguishes.
///
/// Classification is total: any error that is not a recognised
/// [`PipelineError`] variant is [`FailureKind::Unexpected`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    Authentication,
    Authorization,
    NotFound,
    InvalidArgument,
    Unexpected,
}

impl FailureKind {
    /// Classifies an error by the first [`PipelineError`] in its source chain.
    pub fn classify(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut current = Some(err);
        while let Some(e) = current {
            if let Some(pipeline_err) = e.downcast_ref::<PipelineError>() {
                return match pipeline_err {
                    PipelineError::Authentication(_) => Self::Authentication,
                    PipelineError::Authorization(_) => Self::Authorization,
                    PipelineError::NotFound(_) => Self::NotFound,
                    PipelineError::InvalidArgument(_) => Self::InvalidArgument,
                    PipelineError::Internal(_) => Self::Unexpected,
                };
            }
            current = e.source();
        }
        Self::Unexpected
    }

    pub fn status(self) -> StatusCode {
        match self {
            Self::Authentication | Self::Authorization => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InvalidArgument => StatusCode::BAD_REQUEST,
            Self::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The client facing message for this class.
    pub fn message(self) -> &'static str {
        match self {
            Self::Authentication => "Authentication failed.",
            Self::Authorization => "You are not authorized to access this resource.",
            Self::NotFound => "The requested resource was not found.",
            Self::InvalidArgument => "Invalid request parameters.",
            Self::Unexpected => "An unexpected error occurred. Please try again later.",
        }
    }

    /// Client errors are logged at `warn`, everything else at `error`.
    pub fn is_client_error(self) -> bool {
        self.status().is_client_error()
    }

    /// Builds the JSON response sent for this class.
    pub fn into_response(self) -> Response {
        let body = FailureBody {
            status_code: self.status().as_u16(),
            message: self.message(),
        };
        // Serializing a struct of a number and a static string cannot fail.
        let bytes = serde_json::to_vec(&body).unwrap_or_default();
        let mut response = response_with(self.status(), bytes.into());
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct FailureBody {
    status_code: u16,
    message: &'static str,
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
