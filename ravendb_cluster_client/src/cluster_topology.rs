use std::collections::{BTreeMap, HashMap};

use reqwest::Url;
use serde::Deserialize;

/// Body of `GET /cluster/topology`. Only the fields the executor needs are
/// required; everything else the server reports is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct ClusterTopologyInfo {
    pub topology: ClusterTopology,
    pub etag: Option<i64>,
    pub leader: Option<String>,
    pub node_tag: Option<String>,
    pub current_term: Option<i64>,
    pub status: Option<HashMap<String, NodeStatusReport>>,
}

impl ClusterTopologyInfo {
    /// Top level etag wins; older servers only report it inside `Topology`.
    pub fn effective_etag(&self) -> i64 {
        self.etag.or(self.topology.etag).unwrap_or_default()
    }
}

/// Node maps are keyed by cluster tag and kept sorted so the node order is
/// stable between fetches.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct ClusterTopology {
    pub topology_id: Option<String>,
    pub all_nodes: BTreeMap<String, Url>,
    pub members: BTreeMap<String, Url>,
    pub promotables: BTreeMap<String, Url>,
    pub watchers: BTreeMap<String, Url>,
    pub last_node_id: Option<String>,
    pub etag: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct NodeStatusReport {
    pub name: Option<String>,
    pub connected: bool,
    pub error_details: Option<String>,
}
