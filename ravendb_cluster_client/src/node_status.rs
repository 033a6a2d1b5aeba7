use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::task::JoinHandle;

use crate::server_node::ServerNode;

/// Invoked with the node index and node each time a health check is due.
pub type HealthCheckCallback = Arc<dyn Fn(usize, ServerNode) + Send + Sync>;

/// Wait periods used between health checks of one failed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheckBackoff {
    pub initial: Duration,
    pub step: Duration,
    pub max: Duration,
}

impl Default for HealthCheckBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            step: Duration::from_millis(100),
            max: Duration::from_secs(5),
        }
    }
}

/// Health check schedule for a single failed node.
///
/// Each status owns at most one pending timer. Once disposed it never invokes
/// its callback again, even if a timer that was already in flight fires.
pub struct NodeStatus {
    node_index: usize,
    node: ServerNode,
    wait_period: Duration,
    backoff: HealthCheckBackoff,
    timer: Option<JoinHandle<()>>,
    trigger: Arc<StatusTrigger>,
}

struct StatusTrigger {
    node_index: usize,
    node: ServerNode,
    disposed: AtomicBool,
    callback: HealthCheckCallback,
}

impl StatusTrigger {
    fn fire(&self) {
        if self.disposed.load(Ordering::Acquire) {
            tracing::trace!("Health check timer for {} fired after dispose", self.node);
            return;
        }
        (self.callback)(self.node_index, self.node.clone());
    }
}

impl NodeStatus {
    pub fn new(
        node_index: usize,
        node: ServerNode,
        backoff: HealthCheckBackoff,
        callback: HealthCheckCallback,
    ) -> Self {
        let trigger = Arc::new(StatusTrigger {
            node_index,
            node: node.clone(),
            disposed: AtomicBool::new(false),
            callback,
        });
        Self {
            node_index,
            node,
            wait_period: backoff.initial.min(backoff.max),
            backoff,
            timer: None,
            trigger,
        }
    }

    pub fn node_index(&self) -> usize {
        self.node_index
    }

    pub fn node(&self) -> &ServerNode {
        &self.node
    }

    pub fn wait_period(&self) -> Duration {
        self.wait_period
    }

    pub fn is_disposed(&self) -> bool {
        self.trigger.disposed.load(Ordering::Acquire)
    }

    /// Schedules the next health check after the current wait period,
    /// replacing any pending one.
    pub fn start_update(&mut self) {
        if self.is_disposed() {
            return;
        }
        if let Some(previous) = self.timer.take() {
            previous.abort();
        }

        let trigger = self.trigger.clone();
        let wait = self.wait_period;
        tracing::trace!("Next health check for {} in {:?}", self.node, wait);
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            trigger.fire();
        }));
    }

    /// Grows the wait period by one step, capped at the maximum.
    pub fn next_wait_period(&mut self) -> Duration {
        self.wait_period = (self.wait_period + self.backoff.step).min(self.backoff.max);
        self.wait_period
    }

    /// Called after a failed check: grow the period and schedule again.
    pub fn retry_update(&mut self) {
        self.next_wait_period();
        self.start_update();
    }

    /// Cancels the pending timer. Safe to call more than once.
    pub fn dispose(&mut self) {
        self.trigger.disposed.store(true, Ordering::Release);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Runs the timer body immediately, as if the wait period had elapsed.
    #[cfg(test)]
    pub(crate) fn fire_now(&self) {
        self.trigger.fire();
    }
}

impl Drop for NodeStatus {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeStatus")
            .field("node_index", &self.node_index)
            .field("node", &self.node)
            .field("wait_period", &self.wait_period)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
