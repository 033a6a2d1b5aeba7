use reqwest::StatusCode;
use serde::Deserialize;

use crate::error_chain_fmt;

/// Errors reported by the server itself. None of these mean the node is down,
/// so they are handed to the caller as-is and never trigger failover.
#[derive(thiserror::Error)]
pub enum RavenDbError {
    #[error("Invalid authorization, ensure valid certificate supplied")]
    BadAuthorization,
    #[error("Not authorized: {0}")]
    Authorization(String),
    #[error("Database `{0}` does not exist")]
    DatabaseDoesNotExist(String),
    #[error("Database is disabled: {0}")]
    DatabaseDisabled(String),
    #[error("Concurrency violation: {0}")]
    Concurrency(String),
    #[error("Document conflict: {0}")]
    DocumentConflict(String),
    #[error("Index does not exist: {0}")]
    IndexDoesNotExist(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Server responded with {status} ({type_name}): {message}")]
    Generic {
        status: u16,
        type_name: String,
        message: String,
    },
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}
impl std::fmt::Debug for RavenDbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServerErrorBody {
    r#type: String,
    #[serde(alias = "Message")]
    error: String,
}

impl RavenDbError {
    /// Decodes the server's `{Type, Error}` payload into a specific error kind.
    pub fn from_response(status: StatusCode, body: &[u8]) -> Self {
        let parsed = serde_json::from_slice::<ServerErrorBody>(body);

        let ServerErrorBody { r#type, error } = match parsed {
            Ok(b) => b,
            Err(_) => {
                if body.is_empty()
                    && (status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN)
                {
                    return RavenDbError::BadAuthorization;
                }
                return RavenDbError::Generic {
                    status: status.as_u16(),
                    type_name: String::from("Unknown"),
                    message: String::from_utf8_lossy(body).into_owned(),
                };
            }
        };

        // Server type names are fully qualified, e.g. `Raven.Client.Exceptions.ConcurrencyException`.
        let short_name = r#type.rsplit('.').next().unwrap_or(r#type.as_str());
        match short_name {
            "ConcurrencyException" => RavenDbError::Concurrency(error),
            "DocumentConflictException" => RavenDbError::DocumentConflict(error),
            "IndexDoesNotExistException" => RavenDbError::IndexDoesNotExist(error),
            "DatabaseDoesNotExistException" => RavenDbError::DatabaseDoesNotExist(error),
            "DatabaseDisabledException" => RavenDbError::DatabaseDisabled(error),
            "AuthorizationException" => RavenDbError::Authorization(error),
            "BadRequestException" => RavenDbError::BadRequest(error),
            _ => RavenDbError::Generic {
                status: status.as_u16(),
                type_name: r#type,
                message: error,
            },
        }
    }
}
