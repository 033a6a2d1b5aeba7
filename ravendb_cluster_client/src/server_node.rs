use reqwest::Url;

/// A single server in the cluster, bound to the database it serves.
///
/// Two nodes are the same node when url, database and cluster tag all match.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ServerNode {
    url: Url,
    database: String,
    cluster_tag: Option<String>,
}

impl ServerNode {
    pub fn new(url: Url, database: impl Into<String>) -> Self {
        Self {
            url: normalize_base_url(url),
            database: database.into(),
            cluster_tag: None,
        }
    }

    pub fn with_cluster_tag(url: Url, database: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            cluster_tag: Some(tag.into()),
            ..Self::new(url, database)
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn cluster_tag(&self) -> Option<&str> {
        self.cluster_tag.as_deref()
    }

    /// Joins `path` onto the node's base url.
    pub fn endpoint(&self, path: &str) -> anyhow::Result<Url> {
        Ok(self.url.join(path.trim_start_matches('/'))?)
    }
}

impl std::fmt::Display for ServerNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.cluster_tag {
            Some(tag) => write!(f, "{} ({})", self.url, tag),
            None => write!(f, "{}", self.url),
        }
    }
}

// Url::join replaces the last path segment unless the base ends with a slash.
fn normalize_base_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
