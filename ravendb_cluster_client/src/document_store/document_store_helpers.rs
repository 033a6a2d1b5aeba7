use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
};

use reqwest::{Identity, Url};
use tokio::sync::oneshot;

use crate::{
    document_conventions::DocumentConventions,
    request_executor::{ClusterRequestExecutor, RequestExecutor},
    DocumentStoreError,
};

pub type DnsOverrides = HashMap<String, IpAddr>;

#[derive(Debug)]
pub enum DocumentStoreMessage {
    /// Returns the cached executor for a database, creating it on first use.
    GetRequestExecutor {
        database_name: Option<String>,
        respond_to: oneshot::Sender<Result<RequestExecutor, DocumentStoreError>>,
    },
    GetClusterRequestExecutor {
        respond_to: oneshot::Sender<Result<ClusterRequestExecutor, DocumentStoreError>>,
    },
    GetDatabase {
        respond_to: oneshot::Sender<Option<String>>,
    },
    /// Disposes every executor. Later requests fail with [`DocumentStoreError::Closed`].
    Close { respond_to: oneshot::Sender<()> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentStoreState {
    /// [`DocumentStore`](crate::DocumentStore) was initialized but has since been closed.
    Closed,

    /// [`DocumentStore`](crate::DocumentStore) is initialized.
    Initialized,
}

/// Everything the actor needs, validated by the builder.
#[derive(Debug)]
pub struct DocumentStoreInitialConfiguration {
    pub(crate) http_client: reqwest::Client,
    pub(crate) conventions: DocumentConventions,
    pub(crate) database_name: Option<String>,
    pub(crate) initial_urls: Vec<Url>,
}

/// Builds the one [`reqwest::Client`] shared by every executor of a store.
pub(crate) fn build_http_client(
    client_identity: Option<Identity>,
    dns_overrides: Option<&DnsOverrides>,
    proxy_address: Option<&str>,
) -> anyhow::Result<reqwest::Client> {
    let mut client = reqwest::Client::builder();

    if let Some(identity) = client_identity {
        client = client.identity(identity).use_rustls_tls();
    }

    // Convert Option<HashMap<String, IpAddr>> into HashMap<String,SocketAddr>
    let overrides = dns_overrides
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, SocketAddr::new(v, 0)))
        .collect::<HashMap<String, SocketAddr>>();

    for (domain, address) in overrides {
        tracing::trace!(
            "Adding `{}->{}` to dns overrides for this client.",
            domain,
            address
        );
        client = client.resolve(domain.as_str(), address);
    }

    if let Some(proxy) = proxy_address {
        tracing::trace!("Proxy set to `{}`", &proxy);
        client = client.proxy(reqwest::Proxy::http(proxy)?);
    } else {
        tracing::trace!("No proxy defined. Using system settings.");
    }

    Ok(client.build()?)
}
