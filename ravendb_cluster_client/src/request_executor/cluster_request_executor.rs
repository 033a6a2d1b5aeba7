use std::ops::Deref;

use reqwest::Url;

use super::{RequestExecutor, RequestExecutorConfiguration, RequestExecutorError, TopologySource};

/// A [`RequestExecutor`] that keeps the cluster topology (every server) rather
/// than one database's topology. It behaves the same in every other way.
#[derive(Clone, Debug)]
pub struct ClusterRequestExecutor {
    executor: RequestExecutor,
}

impl ClusterRequestExecutor {
    pub fn create(initial_urls: &[Url]) -> Result<Self, RequestExecutorError> {
        Self::create_with_configuration(initial_urls, RequestExecutorConfiguration::default())
    }

    pub fn create_with_configuration(
        initial_urls: &[Url],
        configuration: RequestExecutorConfiguration,
    ) -> Result<Self, RequestExecutorError> {
        let executor = RequestExecutor::create_for_source(
            TopologySource::Cluster,
            initial_urls,
            "",
            configuration,
        )?;
        Ok(Self { executor })
    }

    pub fn create_for_single_node(url: Url) -> Result<Self, RequestExecutorError> {
        Self::create_for_single_node_with_configuration(url, RequestExecutorConfiguration::default())
    }

    pub fn create_for_single_node_with_configuration(
        url: Url,
        configuration: RequestExecutorConfiguration,
    ) -> Result<Self, RequestExecutorError> {
        let executor = RequestExecutor::create_single_node_for_source(
            TopologySource::Cluster,
            url,
            "",
            configuration,
        )?;
        Ok(Self { executor })
    }
}

impl Deref for ClusterRequestExecutor {
    type Target = RequestExecutor;

    fn deref(&self) -> &Self::Target {
        &self.executor
    }
}
