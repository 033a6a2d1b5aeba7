use ravendb_cluster_client::{
    raven_command::{GetClusterTopologyCommand, GetDocumentCommand, GetStatisticsCommand},
    DocumentConventions, DocumentStoreBuilder, RequestEvent,
};
use tracing::subscriber::set_global_default;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

/// Talks to a running cluster.
///
/// `RAVEN_URLS` is a comma separated list of seed urls, `RAVEN_DATABASE` the database to use
/// and the first argument an optional document id to load.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing();
    let urls = std::env::var("RAVEN_URLS").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let urls = urls.split(',').map(str::trim).collect::<Vec<_>>();
    let database = std::env::var("RAVEN_DATABASE").unwrap_or_else(|_| "Northwind".to_string());

    let mut builder = DocumentStoreBuilder::new()
        .set_urls(&urls)
        .set_database_name(&database)
        .set_conventions(DocumentConventions::default());
    if let Ok(certificate) = std::env::var("RAVEN_CERTIFICATE") {
        builder = builder.set_client_certificate(&certificate);
    }
    let document_store = builder.build()?;

    let cluster_executor = document_store.cluster_request_executor().await?;
    let cluster_topology = cluster_executor
        .execute(&mut GetClusterTopologyCommand::new())
        .await?;
    println!("Cluster nodes: {:#?}", cluster_topology.nodes());

    let executor = document_store.request_executor(None).await?;
    let mut events = executor.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let RequestEvent::FailedRequest { url, error } = event {
                tracing::warn!("Request to {} failed: {}", url, error);
            }
        }
    });

    let stats = executor.execute(&mut GetStatisticsCommand::new()).await?;
    println!("Statistics of `{}`: {:#}", database, stats);

    if let Some(id) = std::env::args().nth(1) {
        match executor.execute(&mut GetDocumentCommand::new(id.as_str())).await? {
            Some(document) => println!("{:#}", document),
            None => println!("Document `{}` does not exist", id),
        }
    }

    if let Some(topology) = executor.topology().await {
        println!(
            "Database topology (etag {}): {:?}",
            topology.etag(),
            topology.nodes()
        );
    }

    document_store.close().await?;
    Ok(())
}

fn setup_tracing() {
    // Redirect all `log`'s events to the subscriber
    LogTracer::init().expect("Failed to set logger");
    // Set up tracing
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let formatting_layer = BunyanFormattingLayer::new("ravendb-cluster-demo".into(), std::io::stdout);
    let subscriber = Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer);
    set_global_default(subscriber).expect("Failed to set subscriber");
}
