use std::time::Duration;

use ravendb_cluster_client::{
    raven_command::{GetClusterTopologyCommand, GetStatisticsCommand},
    ClusterRequestExecutor, RequestExecutorError,
};
use serde_json::json;
use tokio_test::assert_ok;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use crate::helpers::{
    init_tracing, test_configuration, test_conventions, unreachable_url, url_of, wait_until,
};

async fn mount_cluster_topology(server: &MockServer, etag: i64, servers: &[&MockServer]) {
    let all_nodes = servers
        .iter()
        .enumerate()
        .map(|(i, s)| (crate::helpers::tag(i), json!(s.uri())))
        .collect::<serde_json::Map<_, _>>();
    Mock::given(method("GET"))
        .and(path("/cluster/topology"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Topology": { "AllNodes": all_nodes, "Etag": etag },
            "Leader": "A",
            "NodeTag": "A"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn cluster_executor_discovers_every_server_of_the_cluster() {
    // Arrange
    init_tracing();
    let (n0, n1) = (MockServer::start().await, MockServer::start().await);
    mount_cluster_topology(&n0, 9, &[&n0, &n1]).await;
    let executor = ClusterRequestExecutor::create_with_configuration(
        &[url_of(&n0)],
        test_configuration(test_conventions()),
    )
    .unwrap();

    // Act
    let topology = executor
        .execute(&mut GetClusterTopologyCommand::new())
        .await;

    // Assert
    let topology = assert_ok!(topology);
    assert_eq!(topology.etag(), 9);
    assert_eq!(executor.topology_etag().await, Some(9));
    let known = executor.topology().await.unwrap();
    assert_eq!(known.len(), 2);
    assert!(known.nodes().iter().all(|n| n.database().is_empty()));
    assert_eq!(known.nodes()[1].cluster_tag(), Some("B"));
}

#[tokio::test]
async fn cluster_executor_health_checks_use_the_server_level_probe() {
    // Arrange
    init_tracing();
    let (n0, n1) = (MockServer::start().await, MockServer::start().await);
    mount_cluster_topology(&n0, 1, &[&n0, &n1]).await;
    Mock::given(method("GET"))
        .and(path("/info/tcp"))
        .and(query_param("tag", "health-check"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&n1)
        .await;
    Mock::given(method("GET"))
        .and(path("/info/tcp"))
        .and(query_param("tag", "health-check"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Url": n0.uri() })))
        .mount(&n0)
        .await;
    let executor = ClusterRequestExecutor::create_with_configuration(
        &[url_of(&n0)],
        test_configuration(test_conventions()),
    )
    .unwrap();

    // Act
    let on_b = executor
        .execute_on_node_tag(&mut GetStatisticsCommand::health_check(), "B")
        .await;
    let on_a = executor
        .execute_on_node_tag(&mut GetStatisticsCommand::health_check(), "A")
        .await;

    // Assert
    match on_b {
        Err(RequestExecutorError::AllNodesDown { errors }) => assert_eq!(errors.len(), 1),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_ok!(on_a);
    // The failed server keeps being probed on its server-level endpoint.
    let probed = wait_until(Duration::from_secs(3), || async {
        n1.received_requests().await.unwrap_or_default().len() >= 2
    })
    .await;
    assert!(probed);
    assert_eq!(executor.failed_node_count().await, 1);
}

#[tokio::test]
async fn cluster_executor_fails_without_a_reachable_seed() {
    // Arrange
    init_tracing();
    let executor = ClusterRequestExecutor::create_with_configuration(
        &[unreachable_url()],
        test_configuration(test_conventions().set_first_topology_update_attempts(1)),
    )
    .unwrap();

    // Act
    let result = executor
        .execute(&mut GetClusterTopologyCommand::new())
        .await;

    // Assert
    match result {
        Err(RequestExecutorError::DatabaseLoadFailure { database, .. }) => {
            assert_eq!(database, "cluster");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}
