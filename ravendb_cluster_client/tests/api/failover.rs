use std::time::Duration;

use ravendb_cluster_client::{
    raven_command::GetDocumentCommand, RequestExecutor, RequestExecutorError,
};
use serde_json::json;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use crate::helpers::{
    executor_for, init_tracing, mount_document, mount_docs_status, mount_health_check,
    mount_topology, node_errors, preferred_index, test_configuration, test_conventions,
    unreachable_url, url_of, wait_until, DATABASE,
};

#[tokio::test]
async fn execute_fails_over_to_next_node_and_returns_once_first_node_recovers() {
    // Arrange
    let (n0, n1, n2) = (
        MockServer::start().await,
        MockServer::start().await,
        MockServer::start().await,
    );
    mount_topology(&n0, 1, &[&n0, &n1, &n2]).await;
    mount_docs_status(&n0, 503).await;
    mount_health_check(&n0, 200).await;
    mount_document(&n1, "users/1", json!({ "Name": "Oren" })).await;
    let executor = executor_for(&[&n0], test_conventions());

    // Act
    let document = executor
        .execute(&mut GetDocumentCommand::new("users/1"))
        .await
        .unwrap();

    // Assert
    assert_eq!(document, Some(json!({ "Name": "Oren" })));
    assert_eq!(preferred_index(&executor).await, 1);
    assert_eq!(executor.failed_node_count().await, 1);

    // The health check finds n0 healthy and the executor goes back to it.
    let recovered = wait_until(Duration::from_secs(3), || async {
        preferred_index(&executor).await == 0
    })
    .await;
    assert!(recovered);
    assert!(
        wait_until(Duration::from_secs(1), || async {
            executor.failed_node_count().await == 0
        })
        .await
    );
}

#[tokio::test]
async fn failed_node_answering_health_check_with_not_found_stays_failed() {
    // Arrange
    let (n0, n1) = (MockServer::start().await, MockServer::start().await);
    mount_topology(&n0, 1, &[&n0, &n1]).await;
    mount_docs_status(&n0, 503).await;
    mount_health_check(&n0, 404).await;
    mount_document(&n1, "users/1", json!({ "Name": "Oren" })).await;
    let executor = executor_for(&[&n0], test_conventions());

    // Act
    executor
        .execute(&mut GetDocumentCommand::new("users/1"))
        .await
        .unwrap();
    let probed = wait_until(Duration::from_secs(3), || async {
        health_probes(&n0).await >= 2
    })
    .await;

    // Assert
    assert!(probed);
    assert_eq!(preferred_index(&executor).await, 1);
    assert_eq!(executor.failed_node_count().await, 1);
}

#[tokio::test]
async fn timeout_statuses_fail_over_to_next_node() {
    for status in [408, 504] {
        // Arrange
        let (n0, n1) = (MockServer::start().await, MockServer::start().await);
        mount_topology(&n0, 1, &[&n0, &n1]).await;
        mount_docs_status(&n0, status).await;
        mount_health_check(&n0, status).await;
        mount_document(&n1, "users/1", json!({ "Name": "Oren" })).await;
        let executor = executor_for(&[&n0], test_conventions());

        // Act
        let document = executor
            .execute(&mut GetDocumentCommand::new("users/1"))
            .await
            .unwrap();

        // Assert
        assert_eq!(document, Some(json!({ "Name": "Oren" })), "status {}", status);
        assert_eq!(preferred_index(&executor).await, 1, "status {}", status);
        assert_eq!(executor.failed_node_count().await, 1, "status {}", status);
        executor.dispose().await;
    }
}

#[tokio::test]
async fn unreachable_node_fails_over_to_next_node() {
    // Arrange
    let n1 = MockServer::start().await;
    let down = unreachable_url();
    Mock::given(method("GET"))
        .and(path("/topology"))
        .and(query_param("name", DATABASE))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Etag": 1,
            "Nodes": [
                { "Url": down.as_str(), "Database": DATABASE, "ClusterTag": "A" },
                { "Url": n1.uri(), "Database": DATABASE, "ClusterTag": "B" }
            ]
        })))
        .mount(&n1)
        .await;
    mount_document(&n1, "users/1", json!({ "Name": "Oren" })).await;
    let executor = executor_for(&[&n1], test_conventions());

    // Act
    let document = executor
        .execute(&mut GetDocumentCommand::new("users/1"))
        .await
        .unwrap();

    // Assert
    assert_eq!(document, Some(json!({ "Name": "Oren" })));
    let (index, node) = executor.preferred_node().await.unwrap();
    assert_eq!(index, 1);
    assert_eq!(node.url(), &url_of(&n1));
    assert_eq!(executor.failed_node_count().await, 1);
}

#[tokio::test]
async fn malformed_body_is_returned_without_failover() {
    // Arrange
    let (n0, n1) = (MockServer::start().await, MockServer::start().await);
    mount_topology(&n0, 1, &[&n0, &n1]).await;
    Mock::given(method("GET"))
        .and(path(format!("/databases/{}/docs", DATABASE)))
        .respond_with(ResponseTemplate::new(200).set_body_string("{ not json"))
        .expect(1)
        .mount(&n0)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/databases/{}/docs", DATABASE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Results": [] })))
        .expect(0)
        .mount(&n1)
        .await;
    let executor = executor_for(&[&n0], test_conventions());

    // Act
    let error = executor
        .execute(&mut GetDocumentCommand::new("users/1"))
        .await
        .unwrap_err();

    // Assert
    assert!(matches!(error, RequestExecutorError::MalformedResponse(_)));
    assert_eq!(preferred_index(&executor).await, 0);
    assert_eq!(executor.failed_node_count().await, 0);
}

#[tokio::test]
async fn single_node_executor_does_not_fail_over() {
    // Arrange
    init_tracing();
    let url = unreachable_url();
    let executor = RequestExecutor::create_for_single_node_with_configuration(
        url.clone(),
        DATABASE,
        test_configuration(test_conventions()),
    )
    .unwrap();

    // Act
    let error = executor
        .execute(&mut GetDocumentCommand::new("users/1"))
        .await
        .unwrap_err();

    // Assert
    let errors = node_errors(&error).expect("expected AllNodesDown");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0.host_str(), url.host_str());
    assert_eq!(executor.failed_node_count().await, 0);
}

#[tokio::test]
async fn execute_reports_every_node_when_all_are_down() {
    // Arrange
    let (n0, n1) = (MockServer::start().await, MockServer::start().await);
    mount_topology(&n0, 1, &[&n0, &n1]).await;
    mount_docs_status(&n0, 503).await;
    mount_docs_status(&n1, 502).await;
    mount_health_check(&n0, 503).await;
    mount_health_check(&n1, 503).await;
    let executor = executor_for(&[&n0], test_conventions());

    // Act
    let error = executor
        .execute(&mut GetDocumentCommand::new("users/1"))
        .await
        .unwrap_err();

    // Assert
    let errors = node_errors(&error).expect("expected AllNodesDown");
    assert_eq!(errors.len(), 2);
    assert_eq!(executor.failed_node_count().await, 2);
}

#[tokio::test]
async fn server_errors_are_returned_without_failover() {
    // Arrange
    let (n0, n1) = (MockServer::start().await, MockServer::start().await);
    mount_topology(&n0, 1, &[&n0, &n1]).await;
    Mock::given(method("GET"))
        .and(path(format!("/databases/{}/docs", DATABASE)))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "Type": "Raven.Client.Exceptions.Database.DatabaseDisabledException",
            "Message": "Database db is disabled"
        })))
        .expect(1)
        .mount(&n0)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/databases/{}/docs", DATABASE)))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&n1)
        .await;
    let executor = executor_for(&[&n0], test_conventions());

    // Act
    let error = executor
        .execute(&mut GetDocumentCommand::new("users/1"))
        .await
        .unwrap_err();

    // Assert
    assert!(matches!(
        error,
        RequestExecutorError::Server(ravendb_cluster_client::RavenDbError::DatabaseDisabled(_))
    ));
    assert_eq!(preferred_index(&executor).await, 0);
    assert_eq!(executor.failed_node_count().await, 0);
}

#[tokio::test]
async fn dispose_stops_health_checks() {
    // Arrange
    let (n0, n1) = (MockServer::start().await, MockServer::start().await);
    mount_topology(&n0, 1, &[&n0, &n1]).await;
    mount_docs_status(&n0, 503).await;
    mount_health_check(&n0, 503).await;
    mount_document(&n1, "users/1", json!({ "Name": "Ayende" })).await;
    let executor = executor_for(&[&n0], test_conventions());
    executor
        .execute(&mut GetDocumentCommand::new("users/1"))
        .await
        .unwrap();
    assert_eq!(executor.failed_node_count().await, 1);

    // Act
    executor.dispose().await;
    let probes_at_dispose = health_probes(&n0).await;
    tokio::time::sleep(Duration::from_millis(1200)).await;

    // Assert
    assert!(executor.is_disposed());
    assert_eq!(executor.failed_node_count().await, 0);
    assert_eq!(health_probes(&n0).await, probes_at_dispose);
    assert!(matches!(
        executor
            .execute(&mut GetDocumentCommand::new("users/1"))
            .await,
        Err(RequestExecutorError::Disposed)
    ));
}

async fn health_probes(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path().ends_with("/stats"))
        .count()
}
