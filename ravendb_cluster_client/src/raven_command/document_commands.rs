use reqwest::{header::HeaderValue, Method, Url};
use serde::Deserialize;

use crate::{request_executor::RequestExecutorError, server_node::ServerNode};

use super::{parse_json, FailedNodes, RavenCommand};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DocumentsResult {
    results: Vec<serde_json::Value>,
}

fn docs_url(node: &ServerNode) -> anyhow::Result<Url> {
    Ok(node
        .endpoint("databases/")?
        .join(format!("{}/", node.database()).as_str())?
        .join("docs")?)
}

/// Loads one document by id. A missing document is `None`, not an error.
#[derive(Debug)]
pub struct GetDocumentCommand {
    id: String,
    failed_nodes: FailedNodes,
}

impl GetDocumentCommand {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            failed_nodes: FailedNodes::default(),
        }
    }
}

impl RavenCommand for GetDocumentCommand {
    type Output = Option<serde_json::Value>;

    fn create_request(
        &self,
        client: &reqwest::Client,
        node: &ServerNode,
    ) -> anyhow::Result<reqwest::Request> {
        let mut url = docs_url(node)?;
        url.query_pairs_mut().append_pair("id", &self.id);
        Ok(client.request(Method::GET, url).build()?)
    }

    fn parse_response(
        &self,
        body: Option<&[u8]>,
        _from_cache: bool,
    ) -> Result<Self::Output, RequestExecutorError> {
        let body = match body {
            Some(body) => body,
            None => return Ok(None),
        };
        let result: DocumentsResult = parse_json(body)?;
        Ok(result.results.into_iter().next())
    }

    fn is_read_request(&self) -> bool {
        true
    }

    fn failed_nodes(&self) -> &FailedNodes {
        &self.failed_nodes
    }

    fn failed_nodes_mut(&mut self) -> &mut FailedNodes {
        &mut self.failed_nodes
    }
}

/// Pages through every document in the database.
#[derive(Debug, Default)]
pub struct GetAllDocumentsCommand {
    start: Option<i64>,
    page_size: Option<i64>,
    failed_nodes: FailedNodes,
}

impl GetAllDocumentsCommand {
    pub fn new(start: Option<i64>, page_size: Option<i64>) -> Self {
        Self {
            start,
            page_size,
            failed_nodes: FailedNodes::default(),
        }
    }
}

impl RavenCommand for GetAllDocumentsCommand {
    type Output = Vec<serde_json::Value>;

    fn create_request(
        &self,
        client: &reqwest::Client,
        node: &ServerNode,
    ) -> anyhow::Result<reqwest::Request> {
        //Create a vec to hold optional parts of the query string
        let mut query_string_parts = Vec::new();

        if let Some(start) = self.start {
            query_string_parts.push(format!("start={}", start))
        }
        if let Some(page_size) = self.page_size {
            query_string_parts.push(format!("pageSize={}", page_size))
        }

        let mut url = docs_url(node)?;
        if !query_string_parts.is_empty() {
            url.set_query(Some(query_string_parts.join("&").as_str()));
        }

        Ok(client.request(Method::GET, url).build()?)
    }

    fn parse_response(
        &self,
        body: Option<&[u8]>,
        _from_cache: bool,
    ) -> Result<Self::Output, RequestExecutorError> {
        match body {
            Some(body) => Ok(parse_json::<DocumentsResult>(body)?.results),
            None => Ok(Vec::new()),
        }
    }

    fn is_read_request(&self) -> bool {
        true
    }

    fn failed_nodes(&self) -> &FailedNodes {
        &self.failed_nodes
    }

    fn failed_nodes_mut(&mut self) -> &mut FailedNodes {
        &mut self.failed_nodes
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutResult {
    pub id: String,
    pub change_vector: String,
}

/// Stores a document. With a change vector the write only succeeds if the
/// stored document still has that change vector.
#[derive(Debug)]
pub struct PutDocumentCommand {
    id: String,
    document: serde_json::Value,
    change_vector: Option<String>,
    failed_nodes: FailedNodes,
}

impl PutDocumentCommand {
    pub fn new(id: impl Into<String>, document: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            document,
            change_vector: None,
            failed_nodes: FailedNodes::default(),
        }
    }

    pub fn with_change_vector(mut self, change_vector: impl Into<String>) -> Self {
        self.change_vector = Some(change_vector.into());
        self
    }
}

impl RavenCommand for PutDocumentCommand {
    type Output = PutResult;

    fn create_request(
        &self,
        client: &reqwest::Client,
        node: &ServerNode,
    ) -> anyhow::Result<reqwest::Request> {
        let mut url = docs_url(node)?;
        url.query_pairs_mut().append_pair("id", &self.id);

        let mut request = client.request(Method::PUT, url).json(&self.document).build()?;
        if let Some(cv) = &self.change_vector {
            request.headers_mut().insert(
                reqwest::header::IF_MATCH,
                HeaderValue::from_str(&format!("\"{}\"", cv))?,
            );
        }
        Ok(request)
    }

    fn parse_response(
        &self,
        body: Option<&[u8]>,
        _from_cache: bool,
    ) -> Result<Self::Output, RequestExecutorError> {
        let body = body.ok_or_else(|| {
            RequestExecutorError::MalformedResponse(format!("no put result for `{}`", self.id))
        })?;
        parse_json(body)
    }

    fn is_read_request(&self) -> bool {
        false
    }

    fn failed_nodes(&self) -> &FailedNodes {
        &self.failed_nodes
    }

    fn failed_nodes_mut(&mut self) -> &mut FailedNodes {
        &mut self.failed_nodes
    }
}
