use reqwest::{StatusCode, Url};

use crate::{error_chain_fmt, ravendb_error::RavenDbError};

#[derive(thiserror::Error)]
pub enum RequestExecutorError {
    #[error(
        "Tried to send the request to all nodes in the topology, all of them seem to be down or not responding. {}",
        format_node_errors(.errors)
    )]
    AllNodesDown { errors: Vec<(Url, String)> },
    #[error("Request to `{url}` failed with status {status} and the node was already tried for this command")]
    UnsuccessfulRequest { url: Url, status: StatusCode },
    #[error(
        "Failed to retrieve the topology for `{database}` after {attempts} attempt(s). {}",
        format_node_errors(.errors)
    )]
    DatabaseLoadFailure {
        database: String,
        attempts: u32,
        errors: Vec<(Url, String)>,
    },
    #[error(transparent)]
    Server(#[from] RavenDbError),
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Topology must contain at least one node")]
    EmptyTopology,
    #[error("No node with cluster tag `{0}` in the current topology")]
    NodeNotFound(String),
    #[error("The request executor has been disposed")]
    Disposed,
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}
impl std::fmt::Debug for RequestExecutorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl From<serde_json::Error> for RequestExecutorError {
    fn from(e: serde_json::Error) -> Self {
        RequestExecutorError::MalformedResponse(e.to_string())
    }
}

fn format_node_errors(errors: &[(Url, String)]) -> String {
    errors
        .iter()
        .map(|(url, e)| format!("[{}: {}]", url, e))
        .collect::<Vec<_>>()
        .join(" ")
}
