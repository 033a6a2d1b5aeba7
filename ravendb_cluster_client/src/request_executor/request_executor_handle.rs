use std::sync::Arc;

use reqwest::Url;
use tokio::sync::broadcast;
use tracing::instrument;

use crate::{
    document_conventions::DocumentConventions, events::RequestEvent, http_cache::HttpCache,
    raven_command::RavenCommand, server_node::ServerNode, topology::Topology,
};

use super::{
    request_executor_inner::RequestExecutorInner, NodeChoice, RequestExecutorConfiguration,
    RequestExecutorError, SessionInfo, TopologySource,
};

/**
Sends commands to the right node of a database's topology and survives node
outages along the way.

One executor should exist per database. Cloning this handle is very cheap and
shares the same topology, failed-node tracking and cache. The background
health checks stop once [`dispose`](RequestExecutor::dispose) is called or the
last handle is dropped.

```no_run
# tokio_test::block_on(async {
use ravendb_cluster_client::{raven_command::GetDocumentCommand, RequestExecutor};
use reqwest::Url;

let urls = [Url::parse("http://localhost:8080").unwrap()];
let executor = RequestExecutor::create(&urls, "Northwind").unwrap();

let mut command = GetDocumentCommand::new("employees/1-A");
let document = executor.execute(&mut command).await.unwrap();
println!("{:?}", document);
# })
```
*/
#[derive(Clone)]
pub struct RequestExecutor {
    inner: Arc<RequestExecutorInner>,
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("database", &self.inner.database())
            .field("single_node", &self.inner.topology_maintenance_disabled())
            .field("disposed", &self.inner.is_disposed())
            .finish()
    }
}

impl RequestExecutor {
    /// Creates an executor for a cluster and immediately starts discovering
    /// the database topology from `initial_urls`, tried in order.
    pub fn create(initial_urls: &[Url], database: &str) -> Result<Self, RequestExecutorError> {
        Self::create_with_configuration(
            initial_urls,
            database,
            RequestExecutorConfiguration::default(),
        )
    }

    pub fn create_with_configuration(
        initial_urls: &[Url],
        database: &str,
        configuration: RequestExecutorConfiguration,
    ) -> Result<Self, RequestExecutorError> {
        Self::create_for_source(
            TopologySource::Database,
            initial_urls,
            database,
            configuration,
        )
    }

    /// Creates an executor that only ever talks to `url`. The topology is
    /// frozen, so a failure of that node fails the command.
    pub fn create_for_single_node(url: Url, database: &str) -> Result<Self, RequestExecutorError> {
        Self::create_for_single_node_with_configuration(
            url,
            database,
            RequestExecutorConfiguration::default(),
        )
    }

    pub fn create_for_single_node_with_configuration(
        url: Url,
        database: &str,
        configuration: RequestExecutorConfiguration,
    ) -> Result<Self, RequestExecutorError> {
        Self::create_single_node_for_source(TopologySource::Database, url, database, configuration)
    }

    pub(crate) fn create_for_source(
        source: TopologySource,
        initial_urls: &[Url],
        database: &str,
        configuration: RequestExecutorConfiguration,
    ) -> Result<Self, RequestExecutorError> {
        if initial_urls.is_empty() {
            return Err(RequestExecutorError::UnexpectedError(anyhow::anyhow!(
                "At least one url is required to create a request executor"
            )));
        }

        let inner = RequestExecutorInner::new(
            source,
            database.to_string(),
            initial_urls.to_vec(),
            configuration,
            None,
        )?;

        // Kick off the first topology update. Callers of `execute` wait on the
        // same attempt instead of starting their own.
        let first_update = inner.clone();
        tokio::spawn(async move {
            if let Err(e) = first_update.run_first_topology_update().await {
                tracing::error!(
                    "An error occurred while running the first topology update. Caused by: {}",
                    e
                );
            }
        });

        Ok(Self { inner })
    }

    pub(crate) fn create_single_node_for_source(
        source: TopologySource,
        url: Url,
        database: &str,
        configuration: RequestExecutorConfiguration,
    ) -> Result<Self, RequestExecutorError> {
        let node = ServerNode::new(url.clone(), database);
        let inner = RequestExecutorInner::new(
            source,
            database.to_string(),
            vec![url],
            configuration,
            Some(node),
        )?;
        Ok(Self { inner })
    }

    /// Executes `command` against the preferred node, failing over to the
    /// other nodes of the topology when it is down.
    #[instrument(level = "debug", name = "Executor Handle - Execute", skip_all)]
    pub async fn execute<C: RavenCommand>(
        &self,
        command: &mut C,
    ) -> Result<C::Output, RequestExecutorError> {
        self.inner.execute(command, NodeChoice::Preferred).await
    }

    /// Like [`execute`](Self::execute), but reads of the session stick to the
    /// node picked by its session id when round robin read balancing is on.
    pub async fn execute_with_session<C: RavenCommand>(
        &self,
        command: &mut C,
        session: &SessionInfo,
    ) -> Result<C::Output, RequestExecutorError> {
        self.inner.execute(command, NodeChoice::Session(*session)).await
    }

    /// Starts at the node with the given cluster tag.
    pub async fn execute_on_node_tag<C: RavenCommand>(
        &self,
        command: &mut C,
        cluster_tag: &str,
    ) -> Result<C::Output, RequestExecutorError> {
        self.inner
            .execute(command, NodeChoice::Tag(cluster_tag.to_string()))
            .await
    }

    /// Fetches the topology from `node`. With `force` the result replaces the
    /// current topology even if its etag is not newer.
    pub async fn update_topology(
        &self,
        node: ServerNode,
        force: bool,
    ) -> Result<bool, RequestExecutorError> {
        self.inner.update_topology(node, force).await
    }

    /// Cancels all health checks and background refreshes. In-flight commands
    /// may still complete.
    pub async fn dispose(&self) {
        self.inner.dispose().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RequestEvent> {
        self.inner.subscribe()
    }

    pub fn database(&self) -> &str {
        self.inner.database()
    }

    pub fn conventions(&self) -> &DocumentConventions {
        self.inner.conventions()
    }

    pub fn cache(&self) -> &HttpCache {
        self.inner.cache()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    pub fn is_single_node(&self) -> bool {
        self.inner.topology_maintenance_disabled()
    }

    /// The current topology, or `None` while the first discovery is pending.
    pub async fn topology(&self) -> Option<Arc<Topology>> {
        match self.inner.current_selector() {
            Some(selector) => Some(selector.topology().await),
            None => None,
        }
    }

    pub async fn topology_etag(&self) -> Option<i64> {
        match self.inner.current_selector() {
            Some(selector) => Some(selector.topology_etag().await),
            None => None,
        }
    }

    /// The node the next command will start with, waiting for the first
    /// topology if needed.
    pub async fn preferred_node(&self) -> Result<(usize, ServerNode), RequestExecutorError> {
        self.inner.node_selector().await?.preferred_node().await
    }

    /// Number of nodes currently being health checked.
    pub async fn failed_node_count(&self) -> usize {
        self.inner.failed_node_count().await
    }
}
