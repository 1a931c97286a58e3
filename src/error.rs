use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::state::AppState;

/// Every failure a handler can produce. All kinds except `Unexpected` are
/// trusted: their message is shown to the caller as-is.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// A server-side failure with a message written for the caller.
    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        AppError::Authentication(message.into())
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        AppError::Authorization(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message that is safe to show to the caller.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Unexpected(_) => "Something went wrong".to_string(),
            trusted => trusted.to_string(),
        }
    }
}

/// Full rendering of an error, attached to the response so the development
/// middleware can expose it.
#[derive(Debug, Clone)]
pub struct Diagnostics(pub String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let AppError::Unexpected(ref e) = self {
            tracing::error!(error = ?e, "unexpected error");
        }

        let body = json!({
            "status": envelope_status(status),
            "message": self.public_message(),
        });
        let mut res = (status, Json(body)).into_response();
        res.extensions_mut().insert(Diagnostics(format!("{self:?}")));
        res
    }
}

pub fn envelope_status(status: StatusCode) -> &'static str {
    if status.is_client_error() {
        "fail"
    } else if status.is_server_error() {
        "error"
    } else {
        "success"
    }
}

/// Adds the `error` diagnostics field to error envelopes in development mode.
pub async fn expose_diagnostics(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let res = next.run(req).await;
    if !state.config.environment.is_development() {
        return res;
    }
    let Some(Diagnostics(detail)) = res.extensions().get::<Diagnostics>().cloned() else {
        return res;
    };

    let (mut parts, body) = res.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(error = %e, "failed to buffer error body");
            return (parts.status, Json(json!({ "status": "error", "error": detail })))
                .into_response();
        }
    };
    let mut envelope: Value = serde_json::from_slice(&bytes).unwrap_or_else(|_| json!({}));
    envelope["error"] = Value::String(detail);

    let rendered = envelope.to_string();
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(rendered))
}

/// Fallback for paths no router matched.
pub async fn route_not_found(uri: axum::http::Uri) -> AppError {
    AppError::not_found(format!("Route {} not defined on server", uri.path()))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(res: Response) -> Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn trusted_errors_expose_their_message() {
        let res = AppError::Conflict("Email already registered".into()).into_response();
        assert_eq!(res.status(), StatusCode::CONFLICT);
        let body = body_json(res).await;
        assert_eq!(body["status"], "fail");
        assert_eq!(body["message"], "Email already registered");
    }

    #[tokio::test]
    async fn unexpected_errors_hide_internals() {
        let err = AppError::from(anyhow::anyhow!("connection refused on 10.0.0.3:5432"));
        let res = err.into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(res.extensions().get::<Diagnostics>().is_some());
        let body = body_json(res).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Something went wrong");
        assert!(!body.to_string().contains("10.0.0.3"));
    }

    #[test]
    fn maps_kinds_to_status_codes() {
        assert_eq!(AppError::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::authentication("x").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::authorization("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::not_found("x").status_code(), StatusCode::NOT_FOUND);
    }
}
