use reqwest::Method;

use crate::{
    ravendb_error::RavenDbError, request_executor::RequestExecutorError, server_node::ServerNode,
};

use super::{parse_json, FailedNodes, RavenCommand};

/// `GET /databases/<database>/stats`, taking the database from the target node.
///
/// As a health probe it adds `failure=check`. Nodes without a database (the
/// cluster executor's) are probed with `GET /info/tcp?tag=health-check`.
#[derive(Debug, Default)]
pub struct GetStatisticsCommand {
    failure_check: bool,
    failed_nodes: FailedNodes,
}

impl GetStatisticsCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn health_check() -> Self {
        Self {
            failure_check: true,
            ..Self::default()
        }
    }
}

impl RavenCommand for GetStatisticsCommand {
    type Output = serde_json::Value;

    fn create_request(
        &self,
        client: &reqwest::Client,
        node: &ServerNode,
    ) -> anyhow::Result<reqwest::Request> {
        let url = if node.database().is_empty() {
            let mut url = node.endpoint("info/tcp")?;
            url.query_pairs_mut().append_pair("tag", "health-check");
            url
        } else {
            let mut url = node
                .endpoint("databases/")?
                .join(format!("{}/", node.database()).as_str())?
                .join("stats")?;
            if self.failure_check {
                url.query_pairs_mut().append_pair("failure", "check");
            }
            url
        };
        Ok(client.request(Method::GET, url).build()?)
    }

    fn parse_response(
        &self,
        body: Option<&[u8]>,
        _from_cache: bool,
    ) -> Result<serde_json::Value, RequestExecutorError> {
        match body {
            Some(body) if !body.is_empty() => parse_json(body),
            Some(_) => Ok(serde_json::Value::Null),
            // 404: the node answered but does not serve this endpoint.
            None => Err(RavenDbError::Generic {
                status: 404,
                type_name: "NotFound".to_string(),
                message: "statistics endpoint not found".to_string(),
            }
            .into()),
        }
    }

    fn is_read_request(&self) -> bool {
        false
    }

    fn failed_nodes(&self) -> &FailedNodes {
        &self.failed_nodes
    }

    fn failed_nodes_mut(&mut self) -> &mut FailedNodes {
        &mut self.failed_nodes
    }
}
