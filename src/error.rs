use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;

/// Every failure a handler can surface. Attendance precondition failures are
/// user-correctable (4xx); store failures collapse into a generic 500 and keep
/// their detail in the log only.
#[derive(Debug, Display)]
pub enum AppError {
    #[display(fmt = "Already clocked in today")]
    DuplicateClockIn,

    #[display(fmt = "No active clock-in found")]
    NoActiveSession,

    #[display(fmt = "No active break found")]
    NoActiveBreak,

    #[display(fmt = "{} not found", _0)]
    NotFound(&'static str),

    #[display(fmt = "{}", _0)]
    Validation(String),

    #[display(fmt = "{}", _0)]
    Unauthorized(String),

    #[display(fmt = "{}", _0)]
    Forbidden(String),

    #[display(fmt = "{}", _0)]
    Conflict(String),

    #[display(fmt = "Store unavailable: {}", _0)]
    StoreUnavailable(String),
    #[display(fmt = "Internal error: {}", _0)]
    Internal(String),
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    /// Message shown to the caller.
    pub fn public_message(&self) -> String {
        match self {
            AppError::StoreUnavailable(_) | AppError::Internal(_) => {
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::DuplicateClockIn
            | AppError::NoActiveSession
            | AppError::NoActiveBreak
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::StoreUnavailable(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "message": self.public_message()
        }))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!(error = %e, "Store call failed");
        AppError::StoreUnavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::MessageBody;

    #[test]
    fn test_precondition_errors_are_bad_requests() {
        for err in [
            AppError::DuplicateClockIn,
            AppError::NoActiveSession,
            AppError::NoActiveBreak,
            AppError::validation("latitude out of range"),
        ] {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_not_found_displays_subject() {
        assert_eq!(AppError::NotFound("Driver").to_string(), "Driver not found");
        assert_eq!(
            AppError::NotFound("Task").status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_store_unavailable_hides_detail() {
        let err = AppError::StoreUnavailable("connection refused".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Internal Server Error");

        let body = err.error_response().into_body().try_into_bytes().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "Internal Server Error");
    }

    #[test]
    fn test_sqlx_errors_become_store_unavailable() {
        let err: AppError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
    }
}
