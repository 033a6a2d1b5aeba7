//! The raven commands are the only way to directly interact with the server.
//!
//! Every operation is a type implementing [`RavenCommand`] which is handed to a
//! [`RequestExecutor`](crate::request_executor::RequestExecutor). The command
//! knows how to build its own request for a given node and how to turn the
//! response body into a typed result. The executor owns everything else: which
//! node to use, headers, failover and topology maintenance.
use reqwest::Url;

use crate::{request_executor::RequestExecutorError, server_node::ServerNode};

mod document_commands;
mod get_statistics_command;
mod topology_commands;

pub use document_commands::*;
pub use get_statistics_command::*;
pub use topology_commands::*;

pub trait RavenCommand: Send + Sync {
    type Output: Send;

    /// Returns a [`reqwest::Request`] targeting `node`.
    fn create_request(
        &self,
        client: &reqwest::Client,
        node: &ServerNode,
    ) -> anyhow::Result<reqwest::Request>;

    /// Turns a response body into the command's result. `body` is `None` when
    /// the server answered 404.
    fn parse_response(
        &self,
        body: Option<&[u8]>,
        from_cache: bool,
    ) -> Result<Self::Output, RequestExecutorError>;

    /// Read requests may be answered from the [`HttpCache`](crate::http_cache::HttpCache).
    fn is_read_request(&self) -> bool;

    fn failed_nodes(&self) -> &FailedNodes;

    fn failed_nodes_mut(&mut self) -> &mut FailedNodes;

    /// Commands that maintain the topology themselves skip the topology etag
    /// header and never trigger a refresh.
    fn bypass_topology_updates(&self) -> bool {
        false
    }

    fn add_failed_node(&mut self, node: ServerNode, error: String) {
        self.failed_nodes_mut().add(node, error);
    }

    fn was_failed_with_node(&self, node: &ServerNode) -> bool {
        self.failed_nodes().contains(node)
    }
}

/// Nodes a command already failed against during one `execute` call, in the
/// order they failed.
#[derive(Debug, Default, Clone)]
pub struct FailedNodes {
    nodes: Vec<(ServerNode, String)>,
}

impl FailedNodes {
    pub fn add(&mut self, node: ServerNode, error: String) {
        match self.nodes.iter_mut().find(|(n, _)| *n == node) {
            Some(entry) => entry.1 = error,
            None => self.nodes.push((node, error)),
        }
    }

    pub fn contains(&self, node: &ServerNode) -> bool {
        self.nodes.iter().any(|(n, _)| n == node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn errors(&self) -> Vec<(Url, String)> {
        self.nodes
            .iter()
            .map(|(node, e)| (node.url().clone(), e.clone()))
            .collect()
    }
}

/// Parses a JSON body, reporting anything unreadable as a malformed response.
pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(
    body: &[u8],
) -> Result<T, RequestExecutorError> {
    Ok(serde_json::from_slice(body)?)
}
