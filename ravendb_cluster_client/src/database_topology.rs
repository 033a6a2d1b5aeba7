use reqwest::Url;
use serde::Deserialize;

use crate::server_node::ServerNode;

/// Body of `GET /topology?name=<database>`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatabaseTopologyInfo {
    /// Represents the latest version of the topology
    pub etag: i64,
    pub nodes: Vec<ServerNodeInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerNodeInfo {
    pub url: Url,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub cluster_tag: Option<String>,
}

impl From<ServerNodeInfo> for ServerNode {
    fn from(info: ServerNodeInfo) -> Self {
        match info.cluster_tag {
            Some(tag) => ServerNode::with_cluster_tag(info.url, info.database, tag),
            None => ServerNode::new(info.url, info.database),
        }
    }
}
