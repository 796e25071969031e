use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentServerError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
}

impl AgentServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AgentServerError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AgentServerError::NotFound(_) => StatusCode::NOT_FOUND,
            AgentServerError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AgentServerError::InvalidArgument(_) => "INVALID_ARGUMENT",
            AgentServerError::NotFound(_) => "NOT_FOUND",
            AgentServerError::Unauthenticated(_) => "UNAUTHENTICATED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_variant_is_a_client_error() {
        let errors = [
            AgentServerError::InvalidArgument("page_token".into()),
            AgentServerError::NotFound("tool nope".into()),
            AgentServerError::Unauthenticated("expired".into()),
        ];
        let codes: Vec<(u16, &str)> = errors
            .iter()
            .map(|e| (e.status_code().as_u16(), e.code()))
            .collect();

        assert_eq!(
            codes,
            vec![(400, "INVALID_ARGUMENT"), (404, "NOT_FOUND"), (401, "UNAUTHENTICATED")]
        );
        assert!(errors.iter().all(|e| e.status_code().is_client_error()));
    }
}
