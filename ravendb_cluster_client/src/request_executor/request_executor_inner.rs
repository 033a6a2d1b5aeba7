use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
};

use anyhow::anyhow;
use reqwest::{
    header::{HeaderMap, HeaderValue, ETAG, IF_NONE_MATCH},
    StatusCode, Url,
};
use tokio::{
    sync::{broadcast, mpsc, Mutex, OnceCell},
    task::JoinHandle,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    document_conventions::{DocumentConventions, ReadBalanceBehavior},
    events::RequestEvent,
    http_cache::HttpCache,
    node_selector::NodeSelector,
    node_status::{HealthCheckCallback, NodeStatus},
    raven_command::{
        GetClusterTopologyCommand, GetDatabaseTopologyCommand, GetStatisticsCommand, RavenCommand,
    },
    ravendb_error::RavenDbError,
    server_node::ServerNode,
    topology::Topology,
};

use super::{
    request_executor_actor::{run_request_executor_actor, RequestExecutorMessage},
    NodeChoice, RequestExecutorConfiguration, RequestExecutorError, TopologySource,
    CLIENT_VERSION_HEADER, REFRESH_TOPOLOGY_HEADER, TOPOLOGY_ETAG_HEADER,
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Why a single attempt against one node did not produce a result.
enum ExecutionFailure {
    /// The node is unreachable or overloaded. Recoverable by failover.
    NodeDown(String),
    /// Anything else. Handed to the caller unchanged.
    Terminal(RequestExecutorError),
}

#[derive(Debug, Default)]
struct FirstTopologyUpdate {
    attempts: u32,
    errors: Vec<(Url, String)>,
}

pub(crate) struct RequestExecutorInner {
    source: TopologySource,
    database: String,
    initial_urls: Vec<Url>,
    http_client: reqwest::Client,
    conventions: DocumentConventions,
    /// Allows the server to warn if executors are recreated instead of cached.
    application_id: Uuid,
    default_headers: HeaderMap,
    /// Single node mode: topology frozen, no failover, no health checks.
    topology_maintenance_disabled: bool,
    node_selector: OnceCell<NodeSelector>,
    first_topology_update: Mutex<FirstTopologyUpdate>,
    update_topology_lock: Mutex<()>,
    failed_nodes_timers: Mutex<HashMap<ServerNode, NodeStatus>>,
    cache: HttpCache,
    events: broadcast::Sender<RequestEvent>,
    actor_sender: mpsc::UnboundedSender<RequestExecutorMessage>,
    actor: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl RequestExecutorInner {
    pub(crate) fn new(
        source: TopologySource,
        database: String,
        initial_urls: Vec<Url>,
        configuration: RequestExecutorConfiguration,
        single_node: Option<ServerNode>,
    ) -> Result<Arc<Self>, RequestExecutorError> {
        let node_selector = match single_node {
            Some(node) => OnceCell::new_with(Some(NodeSelector::new(Topology::single_node(node))?)),
            None => OnceCell::new(),
        };
        let topology_maintenance_disabled = node_selector.initialized();

        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            CLIENT_VERSION_HEADER,
            HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
        );

        let refresh_interval = if topology_maintenance_disabled {
            None
        } else {
            configuration.conventions.topology_refresh_interval()
        };
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let cache =
            HttpCache::with_max_entries(configuration.conventions.max_http_cache_entries());
        let (actor_sender, receiver) = mpsc::unbounded_channel();

        Ok(Arc::new_cyclic(|self_ref: &Weak<Self>| {
            let actor = tokio::spawn(run_request_executor_actor(
                self_ref.clone(),
                receiver,
                refresh_interval,
            ));
            Self {
                source,
                database,
                initial_urls,
                http_client: configuration.http_client,
                conventions: configuration.conventions,
                application_id: Uuid::new_v4(),
                default_headers,
                topology_maintenance_disabled,
                node_selector,
                first_topology_update: Mutex::new(FirstTopologyUpdate::default()),
                update_topology_lock: Mutex::new(()),
                failed_nodes_timers: Mutex::new(HashMap::new()),
                cache,
                events,
                actor_sender,
                actor: Mutex::new(Some(actor)),
                disposed: AtomicBool::new(false),
            }
        }))
    }

    pub(crate) fn database(&self) -> &str {
        &self.database
    }

    pub(crate) fn conventions(&self) -> &DocumentConventions {
        &self.conventions
    }

    pub(crate) fn cache(&self) -> &HttpCache {
        &self.cache
    }

    pub(crate) fn topology_maintenance_disabled(&self) -> bool {
        self.topology_maintenance_disabled
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<RequestEvent> {
        self.events.subscribe()
    }

    pub(crate) fn current_selector(&self) -> Option<&NodeSelector> {
        self.node_selector.get()
    }

    pub(crate) async fn failed_node_count(&self) -> usize {
        self.failed_nodes_timers.lock().await.len()
    }

    fn display_name(&self) -> &str {
        match self.source {
            TopologySource::Database => &self.database,
            TopologySource::Cluster => "cluster",
        }
    }

    fn publish(&self, event: RequestEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    /// Waits until the first topology is known, running discovery attempts as
    /// needed until the attempt budget is spent.
    pub(crate) async fn node_selector(&self) -> Result<&NodeSelector, RequestExecutorError> {
        loop {
            if let Some(selector) = self.node_selector.get() {
                return Ok(selector);
            }
            self.run_first_topology_update().await?;
        }
    }

    /// Runs at most one discovery attempt. Callers arriving while an attempt is
    /// in flight wait for it and then see its outcome.
    #[instrument(level = "debug", skip(self), fields(database = %self.display_name()))]
    pub(crate) async fn run_first_topology_update(&self) -> Result<(), RequestExecutorError> {
        let mut state = self.first_topology_update.lock().await;
        if self.node_selector.get().is_some() {
            return Ok(());
        }
        if self.is_disposed() {
            return Err(RequestExecutorError::Disposed);
        }

        let max_attempts = self.conventions.first_topology_update_attempts();
        if state.attempts >= max_attempts {
            return Err(self.load_failure(&state));
        }

        state.attempts += 1;
        tracing::debug!(
            "First topology update attempt {} of {}",
            state.attempts,
            max_attempts
        );
        match self.first_topology_update().await {
            Ok(()) => Ok(()),
            Err(errors) => {
                state.errors = errors;
                if state.attempts >= max_attempts {
                    tracing::error!(
                        "Giving up on topology discovery for `{}` after {} attempts",
                        self.display_name(),
                        state.attempts
                    );
                    return Err(self.load_failure(&state));
                }
                Ok(())
            }
        }
    }

    fn load_failure(&self, state: &FirstTopologyUpdate) -> RequestExecutorError {
        RequestExecutorError::DatabaseLoadFailure {
            database: self.display_name().to_string(),
            attempts: state.attempts,
            errors: state.errors.clone(),
        }
    }

    /// Tries every seed url in order, stopping at the first that answers with
    /// a topology.
    async fn first_topology_update(&self) -> Result<(), Vec<(Url, String)>> {
        let mut server_errors = Vec::new();

        for url in &self.initial_urls {
            let server_node = ServerNode::new(url.clone(), self.database.clone());
            let _guard = self.update_topology_lock.lock().await;
            match self.fetch_and_apply_topology(&server_node, false).await {
                Ok(_) => {
                    tracing::info!("Initial topology update complete from {}", url);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Unable to fetch topology from {}. Caused by: {}", url, e);
                    server_errors.push((url.clone(), e.to_string()));
                }
            }
        }

        Err(server_errors)
    }

    /// Refreshes the topology from `node`. Returns `Ok(false)` without any
    /// network call when another refresh is already running.
    #[instrument(level = "debug", skip(self, node), fields(node = %node))]
    pub(crate) async fn update_topology(
        &self,
        node: ServerNode,
        force: bool,
    ) -> Result<bool, RequestExecutorError> {
        if self.is_disposed() || self.topology_maintenance_disabled {
            return Ok(false);
        }
        let _guard = match self.update_topology_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!(
                    "Topology update already running. Skipping to avoid duplication of effort."
                );
                return Ok(false);
            }
        };
        self.fetch_and_apply_topology(&node, force).await
    }

    pub(crate) async fn refresh_topology_from_preferred_node(&self) {
        let selector = match self.node_selector.get() {
            Some(selector) => selector,
            None => return,
        };
        let node = match selector.current_node().await {
            Ok(node) => node,
            Err(e) => {
                tracing::warn!("No node to refresh the topology from. Caused by: {}", e);
                return;
            }
        };
        if let Err(e) = self.update_topology(node, false).await {
            tracing::warn!("Periodic topology refresh failed. Caused by: {}", e);
        }
    }

    /// Must be called while holding `update_topology_lock`.
    async fn fetch_and_apply_topology(
        &self,
        node: &ServerNode,
        force: bool,
    ) -> Result<bool, RequestExecutorError> {
        let topology = match self.source {
            TopologySource::Database => {
                let application_id = self
                    .conventions
                    .send_application_identifier()
                    .then_some(self.application_id);
                let mut command = GetDatabaseTopologyCommand::new(&self.database, application_id);
                self.execute_on_specific_node(&mut command, node).await?
            }
            TopologySource::Cluster => {
                let mut command = GetClusterTopologyCommand::new();
                self.execute_on_specific_node(&mut command, node).await?
            }
        };

        let etag = topology.etag();
        let updated = match self.node_selector.get() {
            Some(selector) => selector.on_topology_updated(topology, force).await,
            None => {
                if self.node_selector.set(NodeSelector::new(topology)?).is_err() {
                    tracing::warn!("Node selector was initialized concurrently");
                    false
                } else {
                    true
                }
            }
        };

        if updated {
            tracing::info!(
                "Topology for `{}` updated to etag {}",
                self.display_name(),
                etag
            );
            self.clear_failed_nodes().await;
            self.publish(RequestEvent::TopologyUpdated { etag });
        }
        Ok(updated)
    }

    #[instrument(
        level = "debug",
        name = "Request Executor - Execute",
        skip(self, command),
        fields(database = %self.display_name())
    )]
    pub(crate) async fn execute<C: RavenCommand>(
        &self,
        command: &mut C,
        choice: NodeChoice,
    ) -> Result<C::Output, RequestExecutorError> {
        if self.is_disposed() {
            return Err(RequestExecutorError::Disposed);
        }

        let selector = self.node_selector().await?;
        let (index, node) = match &choice {
            NodeChoice::Tag(tag) => selector.requested_node(tag).await?,
            NodeChoice::Session(session)
                if command.is_read_request()
                    && self.conventions.read_balance_behavior()
                        == ReadBalanceBehavior::RoundRobin =>
            {
                selector.node_by_session_id(session.session_id()).await?
            }
            _ => selector.preferred_node().await?,
        };

        let result = self
            .execute_with_failover(selector, command, index, node)
            .await;
        command.failed_nodes_mut().clear();
        result
    }

    async fn execute_with_failover<C: RavenCommand>(
        &self,
        selector: &NodeSelector,
        command: &mut C,
        mut node_index: usize,
        mut node: ServerNode,
    ) -> Result<C::Output, RequestExecutorError> {
        loop {
            let error = match self.send_to_node(command, &node).await {
                Ok(output) => return Ok(output),
                Err(ExecutionFailure::Terminal(e)) => return Err(e),
                Err(ExecutionFailure::NodeDown(error)) => error,
            };

            tracing::warn!("Node {} is down: {}", node, error);
            command.add_failed_node(node.clone(), error);

            if self.topology_maintenance_disabled {
                return Err(RequestExecutorError::AllNodesDown {
                    errors: command.failed_nodes().errors(),
                });
            }

            self.register_failed_node(node_index, &node).await;
            selector.on_request_failed(&node).await;

            let (next_index, next_node) = match selector.preferred_node().await {
                Ok(next) => next,
                Err(_) => {
                    return Err(RequestExecutorError::AllNodesDown {
                        errors: command.failed_nodes().errors(),
                    })
                }
            };
            if command.was_failed_with_node(&next_node) {
                tracing::error!(
                    "All {} node(s) tried for this request are down",
                    command.failed_nodes().len()
                );
                return Err(RequestExecutorError::AllNodesDown {
                    errors: command.failed_nodes().errors(),
                });
            }

            tracing::debug!("Failing over from {} to {}", node, next_node);
            node_index = next_index;
            node = next_node;
        }
    }

    /// One attempt against `node` with no failover. Node-down becomes an error.
    pub(crate) async fn execute_on_specific_node<C: RavenCommand>(
        &self,
        command: &mut C,
        node: &ServerNode,
    ) -> Result<C::Output, RequestExecutorError> {
        let result = match self.send_to_node(command, node).await {
            Ok(output) => Ok(output),
            Err(ExecutionFailure::Terminal(e)) => Err(e),
            Err(ExecutionFailure::NodeDown(error)) => Err(RequestExecutorError::UnexpectedError(
                anyhow!("Node {} is unreachable: {}", node, error),
            )),
        };
        command.failed_nodes_mut().clear();
        result
    }

    async fn send_to_node<C: RavenCommand>(
        &self,
        command: &C,
        node: &ServerNode,
    ) -> Result<C::Output, ExecutionFailure> {
        let bypass_topology = command.bypass_topology_updates() || self.topology_maintenance_disabled;

        let mut request = command
            .create_request(&self.http_client, node)
            .map_err(|e| ExecutionFailure::Terminal(e.into()))?;
        self.apply_headers(&mut request, bypass_topology).await;
        if let Some(timeout) = self.conventions.request_timeout() {
            *request.timeout_mut() = Some(timeout);
        }

        let cache_key = request.url().to_string();
        let cached = if command.is_read_request() {
            self.cache.get(&cache_key).await
        } else {
            None
        };
        if let Some(entry) = &cached {
            if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", entry.change_vector)) {
                request.headers_mut().insert(IF_NONE_MATCH, value);
            }
        }

        let url = node.url().clone();
        self.publish(RequestEvent::BeforeRequest { url: url.clone() });
        tracing::trace!("Request Headers: {:#?}", request.headers());

        let response = match self.http_client.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                let error = e.to_string();
                self.publish(RequestEvent::FailedRequest {
                    url,
                    error: error.clone(),
                });
                return Err(ExecutionFailure::NodeDown(error));
            }
        };

        let status = response.status();
        if !bypass_topology && response.headers().contains_key(REFRESH_TOPOLOGY_HEADER) {
            self.request_topology_refresh(node.clone());
        }

        match status {
            StatusCode::NOT_MODIFIED => {
                self.publish(RequestEvent::SucceedRequest {
                    url,
                    status: status.as_u16(),
                });
                match cached {
                    Some(entry) => command
                        .parse_response(Some(entry.payload.as_slice()), true)
                        .map_err(ExecutionFailure::Terminal),
                    None => Err(ExecutionFailure::Terminal(
                        RequestExecutorError::MalformedResponse(
                            "304 Not Modified for a request that was not cached".to_string(),
                        ),
                    )),
                }
            }
            StatusCode::NOT_FOUND => {
                if command.is_read_request() {
                    self.cache.remove(&cache_key).await;
                }
                self.publish(RequestEvent::SucceedRequest {
                    url,
                    status: status.as_u16(),
                });
                command
                    .parse_response(None, false)
                    .map_err(ExecutionFailure::Terminal)
            }
            StatusCode::REQUEST_TIMEOUT
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => {
                let error = format!("{} responded with {}", node, status);
                self.publish(RequestEvent::FailedRequest {
                    url: url.clone(),
                    error: error.clone(),
                });
                if command.was_failed_with_node(node) {
                    return Err(ExecutionFailure::Terminal(
                        RequestExecutorError::UnsuccessfulRequest { url, status },
                    ));
                }
                Err(ExecutionFailure::NodeDown(error))
            }
            status if status.is_success() => {
                let change_vector = response
                    .headers()
                    .get(ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.trim_matches('"').to_string());
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| ExecutionFailure::NodeDown(e.to_string()))?;

                if command.is_read_request() {
                    if let Some(change_vector) = change_vector {
                        self.cache
                            .set(&cache_key, change_vector, body.to_vec())
                            .await;
                    }
                }
                self.publish(RequestEvent::SucceedRequest {
                    url,
                    status: status.as_u16(),
                });
                command
                    .parse_response(Some(&body[..]), false)
                    .map_err(ExecutionFailure::Terminal)
            }
            status => {
                let body = match response.bytes().await {
                    Ok(body) => body,
                    Err(e) => {
                        tracing::warn!(
                            "Failed to read the {} response body from {}: {}",
                            status,
                            node,
                            e
                        );
                        Default::default()
                    }
                };
                let error = RavenDbError::from_response(status, &body);
                self.publish(RequestEvent::FailedRequest {
                    url,
                    error: error.to_string(),
                });
                Err(ExecutionFailure::Terminal(error.into()))
            }
        }
    }

    async fn apply_headers(&self, request: &mut reqwest::Request, bypass_topology: bool) {
        for (name, value) in &self.default_headers {
            request.headers_mut().insert(name, value.clone());
        }
        if bypass_topology {
            return;
        }
        if let Some(selector) = self.node_selector.get() {
            let etag = selector.topology_etag().await;
            request
                .headers_mut()
                .insert(TOPOLOGY_ETAG_HEADER, HeaderValue::from(etag));
        }
    }

    fn request_topology_refresh(&self, node: ServerNode) {
        tracing::debug!("{} asked for a topology refresh", node);
        if self
            .actor_sender
            .send(RequestExecutorMessage::UpdateTopology { node, force: false })
            .is_err()
        {
            tracing::debug!("Request executor actor is gone, skipping topology refresh");
        }
    }

    /// Starts health checks for `node` unless it already has a schedule.
    async fn register_failed_node(&self, node_index: usize, node: &ServerNode) {
        if self.is_disposed() {
            return;
        }
        let mut timers = self.failed_nodes_timers.lock().await;
        // Checked again under the lock so nothing is scheduled once disposal cleared the registry.
        if self.is_disposed() || timers.contains_key(node) {
            return;
        }

        let mut status = NodeStatus::new(
            node_index,
            node.clone(),
            self.conventions.health_check_backoff(),
            self.health_check_callback(),
        );
        status.start_update();
        timers.insert(node.clone(), status);
    }

    fn health_check_callback(&self) -> HealthCheckCallback {
        let sender = self.actor_sender.clone();
        Arc::new(move |node_index, node| {
            let _ = sender.send(RequestExecutorMessage::CheckNodeStatus { node_index, node });
        })
    }

    /// Probes a failed node. On success the selector is told the node is back
    /// and its schedule is dropped, otherwise the schedule backs off.
    #[instrument(level = "debug", skip(self, node), fields(node = %node))]
    pub(crate) async fn check_node_status(&self, node_index: usize, node: ServerNode) {
        if self.is_disposed() {
            return;
        }
        let selector = match self.node_selector.get() {
            Some(selector) => selector,
            None => return,
        };

        if selector.topology().await.position(&node).is_none() {
            tracing::debug!("{} left the topology, dropping its health check", node);
            self.remove_failed_node(&node).await;
            return;
        }

        let mut command = GetStatisticsCommand::health_check();
        match self.execute_on_specific_node(&mut command, &node).await {
            Ok(_) => {
                tracing::info!("{} (index {}) is healthy again", node, node_index);
                selector.on_node_restored(&node).await;
                self.remove_failed_node(&node).await;
            }
            Err(e) => {
                tracing::debug!("{} is still failing: {}", node, e);
                let mut timers = self.failed_nodes_timers.lock().await;
                if let Some(status) = timers.get_mut(&node) {
                    status.retry_update();
                }
            }
        }
    }

    async fn remove_failed_node(&self, node: &ServerNode) {
        if let Some(mut status) = self.failed_nodes_timers.lock().await.remove(node) {
            status.dispose();
        }
    }

    async fn clear_failed_nodes(&self) {
        let mut timers = self.failed_nodes_timers.lock().await;
        for (_, mut status) in timers.drain() {
            status.dispose();
        }
    }

    pub(crate) async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!("Disposing request executor for `{}`", self.display_name());

        if let Some(actor) = self.actor.lock().await.take() {
            actor.abort();
        }
        self.clear_failed_nodes().await;
        self.cache.clear().await;
    }
}

impl Drop for RequestExecutorInner {
    fn drop(&mut self) {
        if let Some(actor) = self.actor.get_mut().take() {
            actor.abort();
        }
    }
}
