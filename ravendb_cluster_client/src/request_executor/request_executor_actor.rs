use std::{sync::Weak, time::Duration};

use tokio::{
    sync::mpsc,
    time::{interval_at, Instant, Interval, MissedTickBehavior},
};
use tracing::instrument;

use crate::server_node::ServerNode;

use super::request_executor_inner::RequestExecutorInner;

/// Background work the executor hands to its actor instead of running it on
/// the caller's task.
#[derive(Debug)]
pub(crate) enum RequestExecutorMessage {
    UpdateTopology { node: ServerNode, force: bool },
    CheckNodeStatus { node_index: usize, node: ServerNode },
}

/// Runs until the executor is dropped or disposed. Each message is handled on
/// its own task so a slow health check never delays a topology refresh.
#[instrument(level = "debug", name = "Running Request Executor Actor", skip_all)]
pub(crate) async fn run_request_executor_actor(
    executor: Weak<RequestExecutorInner>,
    mut receiver: mpsc::UnboundedReceiver<RequestExecutorMessage>,
    topology_refresh_interval: Option<Duration>,
) {
    let mut topology_update_timer = topology_refresh_interval.map(|period| {
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    });

    loop {
        tokio::select! {
            _ = tick(&mut topology_update_timer) => {
                let Some(executor) = executor.upgrade() else { break };
                tracing::debug!("Updating topology via timer.");
                tokio::spawn(async move { executor.refresh_topology_from_preferred_node().await });
            },
            opt_msg = receiver.recv() => {
                let msg = match opt_msg {
                    Some(msg) => msg,
                    None => break,
                };
                let Some(executor) = executor.upgrade() else { break };
                handle_message(executor, msg);
            },
        }
    }
    tracing::debug!("Request executor actor stopped");
}

fn handle_message(executor: std::sync::Arc<RequestExecutorInner>, msg: RequestExecutorMessage) {
    match msg {
        RequestExecutorMessage::UpdateTopology { node, force } => {
            tokio::spawn(async move {
                if let Err(e) = executor.update_topology(node, force).await {
                    tracing::warn!("Topology refresh failed. Caused by: {}", e);
                }
            });
        }
        RequestExecutorMessage::CheckNodeStatus { node_index, node } => {
            tokio::spawn(async move { executor.check_node_status(node_index, node).await });
        }
    }
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
