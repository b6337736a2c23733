use crate::{cipher, store::StoreError};
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Every failure a clinic operation reports to its caller.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(String),
    #[error("Login required")]
    Unauthorized,
    #[error("Not permitted")]
    Forbidden,
    #[error("Proof of registration has not been approved")]
    NotEligible,
    #[error("Onboarding has not been completed")]
    OnboardingRequired,
    #[error("{0}")]
    NotFound(String),
    #[error("Onboarding has already been completed")]
    AlreadyCompleted,
    #[error("A newer proof of registration has been uploaded")]
    StaleSubmission,
    #[error("Appointment has been cancelled")]
    AppointmentCancelled,
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("No unused reference number found after {attempts} attempts")]
    ReferenceCollisionExhausted { attempts: usize },
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(serde::Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION",
            Error::Unauthorized => "UNAUTHORIZED",
            Error::Forbidden => "FORBIDDEN",
            Error::NotEligible => "NOT_ELIGIBLE",
            Error::OnboardingRequired => "ONBOARDING_REQUIRED",
            Error::NotFound(_) => "NOT_FOUND",
            Error::AlreadyCompleted => "ALREADY_COMPLETED",
            Error::StaleSubmission => "STALE_SUBMISSION",
            Error::AppointmentCancelled => "APPOINTMENT_CANCELLED",
            Error::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Error::ReferenceCollisionExhausted { .. } => "REFERENCE_COLLISION_EXHAUSTED",
            Error::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Forbidden | Error::NotEligible | Error::OnboardingRequired => {
                StatusCode::FORBIDDEN
            }
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyCompleted | Error::StaleSubmission | Error::AppointmentCancelled => {
                StatusCode::CONFLICT
            }
            Error::StoreUnavailable(_) | Error::ReferenceCollisionExhausted { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let message = match &self {
            Error::Internal(detail) => {
                tracing::error!(%detail, "internal error");
                "An internal error occurred".to_owned()
            }
            Error::StoreUnavailable(detail) => {
                tracing::error!(%detail, "store unavailable");
                "The clinic records are temporarily unavailable, please try again".to_owned()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: message,
            code: self.code(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TimedOut(after) => {
                Error::StoreUnavailable(format!("timed out after {after:?}"))
            }
            StoreError::Db(chwc_db::Error::NotFound) => Error::NotFound("Not found".into()),
            StoreError::Db(err) if err.is_unavailable() => Error::StoreUnavailable(err.to_string()),
            err => Error::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::Validation(rejection.body_text())
    }
}

impl From<cipher::Error> for Error {
    fn from(err: cipher::Error) -> Self {
        Error::Internal(err.to_string())
    }
}
