use crate::{
    cluster_topology::ClusterTopologyInfo, database_topology::DatabaseTopologyInfo,
    request_executor::RequestExecutorError, server_node::ServerNode,
};

/// Etag given to topologies that were synthesized locally for single node mode.
pub const SINGLE_NODE_TOPOLOGY_ETAG: i64 = -1;

/// A versioned, ordered list of nodes. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    etag: i64,
    nodes: Vec<ServerNode>,
}

impl Topology {
    pub fn new(etag: i64, nodes: Vec<ServerNode>) -> Result<Self, RequestExecutorError> {
        if nodes.is_empty() {
            return Err(RequestExecutorError::EmptyTopology);
        }
        Ok(Self { etag, nodes })
    }

    pub fn single_node(node: ServerNode) -> Self {
        Self {
            etag: SINGLE_NODE_TOPOLOGY_ETAG,
            nodes: vec![node],
        }
    }

    /// Parses either a database topology (`{Etag, Nodes: [...]}`) or a cluster
    /// topology (`{Topology: {AllNodes: {tag: url}}}`) response body.
    ///
    /// Cluster nodes carry `database` as their database name, which is empty
    /// for the cluster executor.
    pub fn from_wire(body: &[u8], database: &str) -> Result<Self, RequestExecutorError> {
        let value: serde_json::Value = serde_json::from_slice(body)?;

        if value.get("Nodes").is_some() {
            let info: DatabaseTopologyInfo = serde_json::from_value(value)?;
            let nodes = info.nodes.into_iter().map(ServerNode::from).collect();
            return Topology::new(info.etag, nodes);
        }

        if value.get("Topology").is_some() {
            let info: ClusterTopologyInfo = serde_json::from_value(value)?;
            let etag = info.effective_etag();
            let nodes = info
                .topology
                .all_nodes
                .into_iter()
                .map(|(tag, url)| ServerNode::with_cluster_tag(url, database, tag))
                .collect();
            return Topology::new(etag, nodes);
        }

        Err(RequestExecutorError::MalformedResponse(
            "topology response has neither `Nodes` nor `Topology`".to_string(),
        ))
    }

    pub fn etag(&self) -> i64 {
        self.etag
    }

    pub fn nodes(&self) -> &[ServerNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn position(&self, node: &ServerNode) -> Option<usize> {
        self.nodes.iter().position(|n| n == node)
    }
}
