use std::time::Duration;

use ravendb_cluster_client::{
    raven_command::GetDocumentCommand, RequestEvent, RequestExecutor, RequestExecutorError,
};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use crate::helpers::{
    database_topology_body, executor_for, init_tracing, mount_document, mount_topology,
    test_configuration, test_conventions, unreachable_url, url_of, wait_until, DATABASE,
};

#[tokio::test]
async fn first_topology_update_falls_through_seed_urls_in_order() {
    // Arrange
    init_tracing();
    let n1 = MockServer::start().await;
    mount_topology(&n1, 4, &[&n1]).await;
    mount_document(&n1, "users/1", json!({ "Name": "Oren" })).await;
    let urls = [unreachable_url(), url_of(&n1)];
    let executor = RequestExecutor::create_with_configuration(
        &urls,
        DATABASE,
        test_configuration(test_conventions()),
    )
    .unwrap();

    // Act
    let document = executor
        .execute(&mut GetDocumentCommand::new("users/1"))
        .await;

    // Assert
    assert_ok!(document);
    assert_eq!(executor.topology_etag().await, Some(4));
    assert_eq!(executor.topology().await.unwrap().len(), 1);
}

#[tokio::test]
async fn first_topology_update_gives_up_after_the_configured_attempts() {
    // Arrange
    let n0 = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/topology"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&n0)
        .await;
    let executor = executor_for(&[&n0], test_conventions().set_first_topology_update_attempts(2));

    // Act
    let first = executor
        .execute(&mut GetDocumentCommand::new("users/1"))
        .await;
    let second = executor
        .execute(&mut GetDocumentCommand::new("users/1"))
        .await;

    // Assert
    match assert_err!(first) {
        RequestExecutorError::DatabaseLoadFailure {
            database,
            attempts,
            errors,
        } => {
            assert_eq!(database, DATABASE);
            assert_eq!(attempts, 2);
            assert_eq!(errors.len(), 1);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    // No further requests: the budget is spent.
    assert!(matches!(
        second,
        Err(RequestExecutorError::DatabaseLoadFailure { .. })
    ));
    assert!(executor.topology().await.is_none());
}

#[tokio::test]
async fn concurrent_first_callers_share_one_topology_request() {
    // Arrange
    let n0 = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/topology"))
        .and(query_param("name", DATABASE))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(database_topology_body(1, &[&n0]))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&n0)
        .await;
    mount_document(&n0, "users/1", json!({ "Name": "Oren" })).await;
    let executor = executor_for(&[&n0], test_conventions());

    // Act
    let callers = (0..10)
        .map(|_| {
            let executor = executor.clone();
            tokio::spawn(async move {
                executor
                    .execute(&mut GetDocumentCommand::new("users/1"))
                    .await
            })
        })
        .collect::<Vec<_>>();

    // Assert
    for caller in callers {
        let document = assert_ok!(caller.await.unwrap());
        assert_eq!(document, Some(json!({ "Name": "Oren" })));
    }
    assert_eq!(executor.topology_etag().await, Some(1));
}

#[tokio::test]
async fn concurrent_callers_all_fail_once_discovery_budget_is_spent() {
    // Arrange
    let n0 = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/topology"))
        .respond_with(ResponseTemplate::new(503).set_delay(Duration::from_millis(100)))
        .expect(2)
        .mount(&n0)
        .await;
    let executor = executor_for(&[&n0], test_conventions().set_first_topology_update_attempts(2));

    // Act
    let callers = (0..10)
        .map(|_| {
            let executor = executor.clone();
            tokio::spawn(async move {
                executor
                    .execute(&mut GetDocumentCommand::new("users/1"))
                    .await
            })
        })
        .collect::<Vec<_>>();

    // Assert
    for caller in callers {
        match caller.await.unwrap() {
            Err(RequestExecutorError::DatabaseLoadFailure { attempts, .. }) => {
                assert_eq!(attempts, 2)
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
    assert!(executor.topology().await.is_none());
}

#[tokio::test]
async fn missing_database_is_reported_by_topology_discovery() {
    // Arrange
    let n0 = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/topology"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&n0)
        .await;
    let executor = executor_for(&[&n0], test_conventions().set_first_topology_update_attempts(1));

    // Act
    let error = executor
        .execute(&mut GetDocumentCommand::new("users/1"))
        .await
        .unwrap_err();

    // Assert
    match error {
        RequestExecutorError::DatabaseLoadFailure { errors, .. } => {
            assert!(errors[0].1.contains("does not exist"), "{}", errors[0].1);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn refresh_topology_header_triggers_a_topology_update() {
    // Arrange
    let (n0, n1) = (MockServer::start().await, MockServer::start().await);
    Mock::given(method("GET"))
        .and(path("/topology"))
        .respond_with(ResponseTemplate::new(200).set_body_json(database_topology_body(1, &[&n0])))
        .up_to_n_times(1)
        .mount(&n0)
        .await;
    Mock::given(method("GET"))
        .and(path("/topology"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(database_topology_body(2, &[&n0, &n1])),
        )
        .mount(&n0)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/databases/{}/docs", DATABASE)))
        .and(query_param("id", "users/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Refresh-Topology", "true")
                .set_body_json(json!({ "Results": [{ "Name": "Oren" }] })),
        )
        .mount(&n0)
        .await;
    let executor = executor_for(&[&n0], test_conventions());
    assert_ok!(executor.preferred_node().await);
    let mut events = executor.subscribe();

    // Act
    assert_ok!(
        executor
            .execute(&mut GetDocumentCommand::new("users/1"))
            .await
    );

    // Assert
    let refreshed = wait_until(Duration::from_secs(3), || async {
        executor.topology_etag().await == Some(2)
    })
    .await;
    assert!(refreshed);
    assert_eq!(executor.topology().await.unwrap().len(), 2);

    let mut saw_topology_update = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, RequestEvent::TopologyUpdated { etag: 2 }) {
            saw_topology_update = true;
        }
    }
    assert!(saw_topology_update);
}

#[tokio::test]
async fn update_topology_ignores_older_etags_unless_forced() {
    // Arrange
    let n0 = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/topology"))
        .respond_with(ResponseTemplate::new(200).set_body_json(database_topology_body(5, &[&n0])))
        .up_to_n_times(1)
        .mount(&n0)
        .await;
    mount_topology(&n0, 3, &[&n0]).await;
    let executor = executor_for(&[&n0], test_conventions());
    let (_, node) = executor.preferred_node().await.unwrap();

    // Act
    let voluntary = executor.update_topology(node.clone(), false).await.unwrap();
    let forced = executor.update_topology(node, true).await.unwrap();

    // Assert
    assert!(!voluntary);
    assert!(forced);
    assert_eq!(executor.topology_etag().await, Some(3));
}
