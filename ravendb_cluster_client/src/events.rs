use reqwest::Url;

/// Notifications published by a request executor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestEvent {
    BeforeRequest { url: Url },
    SucceedRequest { url: Url, status: u16 },
    FailedRequest { url: Url, error: String },
    TopologyUpdated { etag: i64 },
}
