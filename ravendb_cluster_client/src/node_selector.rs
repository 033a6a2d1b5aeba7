use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use crate::{request_executor::RequestExecutorError, server_node::ServerNode, topology::Topology};

/// Owns the current topology and decides which node serves the next request.
///
/// The topology, the current index and the failure counters are swapped under
/// a single lock, so readers always see a matching set.
#[derive(Debug)]
pub struct NodeSelector {
    state: RwLock<NodeSelectorState>,
}

#[derive(Debug)]
struct NodeSelectorState {
    /// Holds the topology
    topology: Arc<Topology>,
    current_node_index: usize,
    /// Counts the node failures
    node_failures: HashMap<ServerNode, u32>,
}

impl NodeSelector {
    pub fn new(topology: Topology) -> Result<Self, RequestExecutorError> {
        if topology.is_empty() {
            return Err(RequestExecutorError::EmptyTopology);
        }
        Ok(Self {
            state: RwLock::new(NodeSelectorState {
                topology: Arc::new(topology),
                current_node_index: 0,
                node_failures: HashMap::new(),
            }),
        })
    }

    pub async fn topology(&self) -> Arc<Topology> {
        self.state.read().await.topology.clone()
    }

    pub async fn topology_etag(&self) -> i64 {
        self.state.read().await.topology.etag()
    }

    pub async fn current_node_index(&self) -> usize {
        self.state.read().await.current_node_index
    }

    pub async fn current_node(&self) -> Result<ServerNode, RequestExecutorError> {
        self.preferred_node().await.map(|(_, node)| node)
    }

    /// Returns the currently preferred node together with its index.
    pub async fn preferred_node(&self) -> Result<(usize, ServerNode), RequestExecutorError> {
        let state = self.state.read().await;
        state
            .topology
            .nodes()
            .get(state.current_node_index)
            .map(|node| (state.current_node_index, node.clone()))
            .ok_or(RequestExecutorError::EmptyTopology)
    }

    /// Returns the node with the given cluster tag.
    pub async fn requested_node(
        &self,
        cluster_tag: &str,
    ) -> Result<(usize, ServerNode), RequestExecutorError> {
        let state = self.state.read().await;
        state
            .topology
            .nodes()
            .iter()
            .enumerate()
            .find(|(_, node)| node.cluster_tag() == Some(cluster_tag))
            .map(|(index, node)| (index, node.clone()))
            .ok_or_else(|| RequestExecutorError::NodeNotFound(cluster_tag.to_string()))
    }

    /// Spreads sessions over the topology. A node with recorded failures is
    /// skipped in favor of the preferred node.
    pub async fn node_by_session_id(
        &self,
        session_id: i32,
    ) -> Result<(usize, ServerNode), RequestExecutorError> {
        {
            let state = self.state.read().await;
            let nodes = state.topology.nodes();
            if nodes.is_empty() {
                return Err(RequestExecutorError::EmptyTopology);
            }
            let index = session_id.rem_euclid(nodes.len() as i32) as usize;
            let node = &nodes[index];
            if state.node_failures.get(node).copied().unwrap_or_default() == 0 {
                return Ok((index, node.clone()));
            }
        }
        self.preferred_node().await
    }

    /// Swaps in `topology` when it is newer than the current one, or when
    /// `force` is set. Returns whether the swap happened.
    ///
    /// A voluntary update restarts at the first node. A forced one keeps the
    /// current index if the same node still sits at it.
    pub async fn on_topology_updated(&self, topology: Topology, force: bool) -> bool {
        if topology.is_empty() {
            tracing::warn!("Ignoring empty topology update");
            return false;
        }

        let mut state = self.state.write().await;
        let current_etag = state.topology.etag();
        if !force && topology.etag() <= current_etag {
            tracing::trace!(
                "Topology etag {} is not newer than {}, ignoring",
                topology.etag(),
                current_etag
            );
            return false;
        }

        let index = state.current_node_index;
        let index = if force && topology.nodes().get(index) == state.topology.nodes().get(index) {
            index
        } else {
            0
        };

        tracing::debug!(
            "Topology updated from etag {} to {} ({} nodes)",
            current_etag,
            topology.etag(),
            topology.len()
        );
        state.topology = Arc::new(topology);
        state.current_node_index = index;
        state.node_failures.clear();
        true
    }

    /// Rotates to the next node.
    pub async fn on_request_failed(&self, failed_node: &ServerNode) {
        let mut state = self.state.write().await;
        *state.node_failures.entry(failed_node.clone()).or_default() += 1;
        let len = state.topology.len();
        state.current_node_index = (state.current_node_index + 1) % len;
        tracing::debug!(
            "Node {} failed, preferred node index is now {}",
            failed_node,
            state.current_node_index
        );
    }

    /// Moves the preferred index back to `restored_node` if it sits earlier in
    /// the topology. Never moves the index forward.
    pub async fn on_node_restored(&self, restored_node: &ServerNode) {
        let mut state = self.state.write().await;
        state.node_failures.remove(restored_node);
        if let Some(index) = state.topology.position(restored_node) {
            if index < state.current_node_index {
                tracing::debug!(
                    "Node {} restored, preferred node index rewound to {}",
                    restored_node,
                    index
                );
                state.current_node_index = index;
            }
        }
    }

    pub async fn node_failures(&self, node: &ServerNode) -> u32 {
        self.state
            .read()
            .await
            .node_failures
            .get(node)
            .copied()
            .unwrap_or_default()
    }
}
