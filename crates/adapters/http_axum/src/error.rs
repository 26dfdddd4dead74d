//! HTTP error response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use nodehook_domain::error::NodehookError;

/// JSON error body returned by API endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps [`NodehookError`] and request-level failures to an HTTP response.
#[derive(Debug)]
pub enum ApiError {
    /// The request carried no known acting user.
    Unauthenticated,
    /// A path segment could not be parsed.
    BadRequest(String),
    /// A blocking query task died before reporting back.
    Aborted(String),
    Domain(NodehookError),
}

impl From<NodehookError> for ApiError {
    fn from(err: NodehookError) -> Self {
        Self::Domain(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                format!("missing or unknown {} header", crate::actor::USER_HEADER),
            ),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Aborted(message) => {
                tracing::error!(error = %message, "query task aborted");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
            Self::Domain(err) => match &err {
                NodehookError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                NodehookError::PermissionDenied(_) => (StatusCode::FORBIDDEN, err.to_string()),
                NodehookError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
                NodehookError::Query(_) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
                NodehookError::Storage(source) => {
                    tracing::error!(error = %source, "storage error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal server error".to_string(),
                    )
                }
            },
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// Parse an identifier taken from the request path.
///
/// # Errors
///
/// Returns [`ApiError::BadRequest`] naming the offending value.
pub fn parse_id<T: std::str::FromStr>(raw: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid identifier {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodehook_domain::error::{NotFoundError, PermissionError, QueryError, ValidationError};

    fn status(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn should_map_domain_errors_to_status_codes() {
        assert_eq!(
            status(NodehookError::from(ValidationError::EmptyQuery).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(
                NodehookError::from(PermissionError {
                    user: "bob".to_string(),
                    perm: "cron.add".to_string(),
                })
                .into()
            ),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(
                NodehookError::from(NotFoundError {
                    entity: "Macro",
                    id: "enrich".to_string(),
                })
                .into()
            ),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(NodehookError::from(QueryError::Runtime("boom".to_string())).into()),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(NodehookError::storage(std::io::Error::other("disk")).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn should_reject_malformed_path_ids() {
        let result = parse_id::<nodehook_domain::id::ViewId>("not-a-uuid");
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn should_answer_unauthenticated_with_401() {
        assert_eq!(status(ApiError::Unauthenticated), StatusCode::UNAUTHORIZED);
    }
}
