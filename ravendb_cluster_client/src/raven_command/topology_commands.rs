use reqwest::Method;
use uuid::Uuid;

use crate::{
    ravendb_error::RavenDbError, request_executor::RequestExecutorError,
    server_node::ServerNode, topology::Topology,
};

use super::{FailedNodes, RavenCommand};

/// `GET /topology?name=<database>`
#[derive(Debug)]
pub struct GetDatabaseTopologyCommand {
    database: String,
    application_identifier: Option<Uuid>,
    failed_nodes: FailedNodes,
}

impl GetDatabaseTopologyCommand {
    pub fn new(database: impl Into<String>, application_identifier: Option<Uuid>) -> Self {
        Self {
            database: database.into(),
            application_identifier,
            failed_nodes: FailedNodes::default(),
        }
    }
}

impl RavenCommand for GetDatabaseTopologyCommand {
    type Output = Topology;

    fn create_request(
        &self,
        client: &reqwest::Client,
        node: &ServerNode,
    ) -> anyhow::Result<reqwest::Request> {
        let mut url = node.endpoint("topology")?;
        url.query_pairs_mut().append_pair("name", &self.database);
        if let Some(id) = self.application_identifier {
            url.query_pairs_mut()
                .append_pair("applicationIdentifier", &id.to_string());
        }
        Ok(client.request(Method::GET, url).build()?)
    }

    fn parse_response(
        &self,
        body: Option<&[u8]>,
        _from_cache: bool,
    ) -> Result<Topology, RequestExecutorError> {
        match body {
            Some(body) => Topology::from_wire(body, &self.database),
            None => Err(RavenDbError::DatabaseDoesNotExist(self.database.clone()).into()),
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

    fn bypass_topology_updates(&self) -> bool {
        true
    }
}

/// `GET /cluster/topology`
#[derive(Debug, Default)]
pub struct GetClusterTopologyCommand {
    failed_nodes: FailedNodes,
}

impl GetClusterTopologyCommand {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RavenCommand for GetClusterTopologyCommand {
    type Output = Topology;

    fn create_request(
        &self,
        client: &reqwest::Client,
        node: &ServerNode,
    ) -> anyhow::Result<reqwest::Request> {
        Ok(client
            .request(Method::GET, node.endpoint("cluster/topology")?)
            .build()?)
    }

    fn parse_response(
        &self,
        body: Option<&[u8]>,
        _from_cache: bool,
    ) -> Result<Topology, RequestExecutorError> {
        let body = body.ok_or_else(|| {
            RequestExecutorError::MalformedResponse("cluster topology was not found".to_string())
        })?;
        Topology::from_wire(body, "")
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

    fn bypass_topology_updates(&self) -> bool {
        true
    }
}
