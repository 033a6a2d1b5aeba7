/*!
ravendb_cluster_client is the cluster-aware transport layer of a client for the RavenDB
document database.

A [`RequestExecutor`] discovers the topology of a database from a list of seed URLs, sends
each [`RavenCommand`](raven_command::RavenCommand) to the preferred node and fails over to the
next node when one is down. Failed nodes are health checked in the background and put back in
rotation once they answer again. A [`ClusterRequestExecutor`] does the same for cluster-level
commands.

This library requires tokio and async. The [`DocumentStore`] uses the actor pattern to keep a
single executor per database, which keeps resource usage in your app to a minimum.

# Example
```no_run
# tokio_test::block_on(async {
use ravendb_cluster_client::{raven_command::GetDocumentCommand, DocumentStore};

let document_store = DocumentStore::builder()
    .set_urls(&["http://localhost:8080"])
    .set_database_name("Northwind")
    .build()
    .unwrap();

let executor = document_store.request_executor(None).await.unwrap();
let mut command = GetDocumentCommand::new("employees/1-A");
let employee = executor.execute(&mut command).await.unwrap();
println!("{:?}", employee);

document_store.close().await.unwrap();
# })
```
*/

mod document_store;

pub mod cluster_topology;
pub mod database_topology;
pub mod document_conventions;
pub mod events;
pub mod http_cache;
pub mod node_selector;
pub mod node_status;
pub mod raven_command;
pub mod ravendb_error;
pub mod request_executor;
pub mod server_node;
pub mod topology;

pub use document_conventions::{DocumentConventions, ReadBalanceBehavior};
pub use document_store::*;
pub use events::RequestEvent;
pub use ravendb_error::RavenDbError;
pub use request_executor::{
    ClusterRequestExecutor, RequestExecutor, RequestExecutorConfiguration, RequestExecutorError,
    SessionInfo,
};
pub use server_node::ServerNode;
pub use topology::Topology;

pub fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{}\n", e)?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{}", cause)?;
        current = cause.source();
    }
    Ok(())
}
