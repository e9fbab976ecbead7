use thiserror::Error;

use shared_models::error::AppError;

#[derive(Error, Debug)]
pub enum DoctorError {
    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    #[error("Invalid slot duration: {0}")]
    InvalidSlotDuration(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Doctor not found")]
    NotFound,

    #[error("{0} not found")]
    ResourceNotFound(&'static str),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream failure: {0}")]
    Upstream(#[from] anyhow::Error),
}

impl DoctorError {
    pub fn upstream(err: impl Into<anyhow::Error>) -> Self {
        DoctorError::Upstream(err.into())
    }
}

impl From<serde_json::Error> for DoctorError {
    fn from(err: serde_json::Error) -> Self {
        DoctorError::Upstream(err.into())
    }
}

impl From<DoctorError> for AppError {
    fn from(err: DoctorError) -> Self {
        let message = err.to_string();
        match err {
            DoctorError::InvalidRange(_)
            | DoctorError::InvalidSlotDuration(_)
            | DoctorError::InvalidTimezone(_) => AppError::BadRequest(message),
            DoctorError::Validation(_) => AppError::ValidationError(message),
            DoctorError::NotFound | DoctorError::ResourceNotFound(_) => AppError::NotFound(message),
            DoctorError::Conflict(_) => AppError::Conflict(message),
            DoctorError::Upstream(_) => AppError::ExternalService(message),
        }
    }
}

pub type DoctorResult<T> = Result<T, DoctorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_app_error_mapping() {
        let cases = [
            (DoctorError::InvalidRange("from after to".into()), StatusCode::BAD_REQUEST),
            (DoctorError::InvalidSlotDuration("0".into()), StatusCode::BAD_REQUEST),
            (DoctorError::InvalidTimezone("Mars/Base".into()), StatusCode::BAD_REQUEST),
            (DoctorError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (DoctorError::NotFound, StatusCode::NOT_FOUND),
            (DoctorError::ResourceNotFound("Availability"), StatusCode::NOT_FOUND),
            (DoctorError::Conflict("dup".into()), StatusCode::CONFLICT),
            (DoctorError::upstream(anyhow::anyhow!("boom")), StatusCode::BAD_GATEWAY),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }
}
