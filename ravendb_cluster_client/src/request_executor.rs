mod cluster_request_executor;
mod request_executor_actor;
mod request_executor_error;
mod request_executor_handle;
mod request_executor_inner;

pub use cluster_request_executor::ClusterRequestExecutor;
pub use request_executor_error::RequestExecutorError;
pub use request_executor_handle::RequestExecutor;

use rand::Rng;

use crate::document_conventions::DocumentConventions;

pub const CLIENT_VERSION_HEADER: &str = "Raven-Client-Version";
pub const TOPOLOGY_ETAG_HEADER: &str = "Topology-Etag";
pub const REFRESH_TOPOLOGY_HEADER: &str = "Refresh-Topology";

/// Settings shared by every executor created from the same place.
///
/// The [`reqwest::Client`] keeps an internal connection pool, so reuse it for
/// as long as the executor lives.
#[derive(Debug, Clone, Default)]
pub struct RequestExecutorConfiguration {
    pub http_client: reqwest::Client,
    pub conventions: DocumentConventions,
}

/// Which topology an executor keeps up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TopologySource {
    Database,
    Cluster,
}

/// Identifies a session so its reads can stick to one node under
/// [`ReadBalanceBehavior::RoundRobin`](crate::document_conventions::ReadBalanceBehavior).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    session_id: i32,
}

impl SessionInfo {
    pub fn new() -> Self {
        Self {
            session_id: rand::thread_rng().gen(),
        }
    }

    pub fn with_session_id(session_id: i32) -> Self {
        Self { session_id }
    }

    pub fn session_id(&self) -> i32 {
        self.session_id
    }
}

impl Default for SessionInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// How the first node of an `execute` call is picked.
#[derive(Debug, Clone)]
pub(crate) enum NodeChoice {
    Preferred,
    Session(SessionInfo),
    Tag(String),
}
