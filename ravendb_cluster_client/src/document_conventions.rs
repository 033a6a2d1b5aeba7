use std::time::Duration;

use crate::{http_cache::DEFAULT_MAX_ENTRIES, node_status::HealthCheckBackoff};

/// How read requests are spread over the topology.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadBalanceBehavior {
    /// Every request goes to the preferred node.
    #[default]
    None,
    /// Reads of a session go to the node picked by its session id.
    RoundRobin,
}

#[derive(Debug, Clone)]
pub struct DocumentConventions {
    disable_topology_updates: bool,
    send_application_identifier: bool,
    first_topology_update_attempts: u32,
    health_check_backoff: HealthCheckBackoff,
    topology_refresh_interval: Option<Duration>,
    request_timeout: Option<Duration>,
    read_balance_behavior: ReadBalanceBehavior,
    max_http_cache_entries: usize,
}

impl Default for DocumentConventions {
    fn default() -> Self {
        Self {
            disable_topology_updates: false,
            send_application_identifier: true,
            first_topology_update_attempts: 5,
            health_check_backoff: HealthCheckBackoff::default(),
            topology_refresh_interval: Some(Duration::from_secs(5 * 60)),
            request_timeout: None,
            read_balance_behavior: ReadBalanceBehavior::default(),
            max_http_cache_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

// Mutators
impl DocumentConventions {
    pub fn default_for_single_server() -> Self {
        Self {
            disable_topology_updates: true,
            send_application_identifier: false,
            ..Default::default()
        }
    }

    pub fn set_disable_topology_updates(mut self, disable: bool) -> Self {
        self.disable_topology_updates = disable;
        self
    }

    pub fn set_send_application_identifier(mut self, send: bool) -> Self {
        self.send_application_identifier = send;
        self
    }

    /// Zero is treated as one; discovery always gets at least one attempt.
    pub fn set_first_topology_update_attempts(mut self, attempts: u32) -> Self {
        self.first_topology_update_attempts = attempts.max(1);
        self
    }

    pub fn set_health_check_backoff(mut self, initial: Duration, step: Duration, max: Duration) -> Self {
        self.health_check_backoff = HealthCheckBackoff {
            initial: initial.min(max),
            step,
            max,
        };
        self
    }

    pub fn set_topology_refresh_interval(mut self, interval: Option<Duration>) -> Self {
        self.topology_refresh_interval = interval;
        self
    }

    pub fn set_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn set_read_balance_behavior(mut self, behavior: ReadBalanceBehavior) -> Self {
        self.read_balance_behavior = behavior;
        self
    }

    /// Upper bound on cached read responses per executor. Zero turns the cache off.
    pub fn set_max_http_cache_entries(mut self, max_entries: usize) -> Self {
        self.max_http_cache_entries = max_entries;
        self
    }
}

// Getters
impl DocumentConventions {
    pub fn disable_topology_updates(&self) -> bool {
        self.disable_topology_updates
    }

    pub fn send_application_identifier(&self) -> bool {
        self.send_application_identifier
    }

    pub fn first_topology_update_attempts(&self) -> u32 {
        self.first_topology_update_attempts
    }

    pub fn health_check_backoff(&self) -> HealthCheckBackoff {
        self.health_check_backoff
    }

    pub fn topology_refresh_interval(&self) -> Option<Duration> {
        self.topology_refresh_interval
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    pub fn read_balance_behavior(&self) -> ReadBalanceBehavior {
        self.read_balance_behavior
    }

    pub fn max_http_cache_entries(&self) -> usize {
        self.max_http_cache_entries
    }
}
