use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hearth_protocol::FailureBody;

/// HTTP-surface error taxonomy. Variants map 1:1 to the status codes this
/// service's error handling design uses; nothing outside the HTTP layer
/// should construct one of these directly.
#[derive(Debug, thiserror::Error)]
pub enum HearthError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl HearthError {
    fn status(&self) -> StatusCode {
        match self {
            HearthError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HearthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            HearthError::Forbidden(_) => StatusCode::FORBIDDEN,
            HearthError::NotFound(_) => StatusCode::NOT_FOUND,
            HearthError::Conflict(_) => StatusCode::CONFLICT,
            HearthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message handed back to the client. Internal causes are never
    /// leaked -- only their logged form (see `IntoResponse` below) carries
    /// detail.
    fn client_message(&self) -> String {
        match self {
            HearthError::Internal(_) => "internal server error".to_owned(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for HearthError {
    fn into_response(self) -> Response {
        if let HearthError::Internal(cause) = &self {
            tracing::error!(error = %cause, "internal error");
        }
        let status = self.status();
        let body = FailureBody::new(self.client_message());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_message(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: FailureBody = serde_json::from_slice(&bytes).unwrap();
        parsed.message
    }

    #[tokio::test]
    async fn bad_request_maps_to_400_with_given_message() {
        let response = HearthError::BadRequest("missing field".to_owned()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_message(response).await, "missing field");
    }

    #[tokio::test]
    async fn not_found_maps_to_404() {
        let response = HearthError::NotFound("no such stream".to_owned()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn internal_error_hides_cause_from_client() {
        let response = HearthError::Internal(anyhow::anyhow!("db pool exhausted")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_message(response).await, "internal server error");
    }
}
