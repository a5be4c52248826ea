//! HTTP binding to the recognition back end.
//!
//! Readiness rules, one per result endpoint:
//! - `.svg`: ready on HTTP 200 with a non-JSON body. A JSON body is a task
//!   status document; `FAILURE` fails the poll, anything else is pending.
//! - `.json`: ready on HTTP 200 with `{"status": "READY", "statistics": {..}}`;
//!   `NOT READY` and task status documents are pending, `FAILURE` fails.
//!
//! Any non-2xx response is an error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::config::{ClientConfig, endpoints};
use crate::error::{ClientError, Result};
use crate::poller::{PollOutcome, ResultPayload, ResultSource};
use crate::stats::{StatsReport, StatsStatus};
use crate::task::{PredictionTasks, ResultFormat, ResultLocator, TaskStatus};
use crate::upload::{AuthHeaders, UploadFile};
use crate::version::user_agent;

/// Header telling the storage bucket which upload sizes to accept.
pub const CONTENT_LENGTH_RANGE: &str = "x-goog-content-length-range";

/// Pre-signed write target returned by the back end.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadTarget {
    pub url: String,
    pub image_name: String,
}

pub struct ApiClient {
    base_url: Url,
    client: reqwest::Client,
    /// In-flight POSTs by endpoint; a newer POST aborts the older one.
    inflight_posts: DashMap<String, (u64, CancellationToken)>,
    next_post: AtomicU64,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Self::with_timeout(config.parsed_base_url()?, config.request_timeout)
    }

    pub fn with_timeout(base_url: Url, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&user_agent()) {
            headers.insert(header::USER_AGENT, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::transport(base_url.as_str(), e))?;

        Ok(Self {
            base_url,
            client,
            inflight_posts: DashMap::new(),
            next_post: AtomicU64::new(0),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|_| ClientError::InvalidUrl(format!("{}{}", self.base_url, path)))
    }

    async fn send(&self, url: &Url, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::transport(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn json<T: serde::de::DeserializeOwned>(url: &Url, response: reqwest::Response) -> Result<T> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::transport(url.as_str(), e))?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::unexpected(url.as_str(), e.to_string()))
    }

    /// Ask for a pre-signed write target for a file of `content_type`.
    pub async fn upload_target(&self, content_type: &str, auth: &AuthHeaders) -> Result<UploadTarget> {
        let url = self.url(endpoints::UPLOAD_URL)?;
        let mut request = self
            .client
            .get(url.clone())
            .query(&[("content_type", content_type)])
            .header("username", auth.username());
        if let Some(bearer) = auth.bearer() {
            request = request.header(header::AUTHORIZATION, bearer);
        }

        let response = self.send(&url, request).await?;
        Self::json(&url, response).await
    }

    /// Transfer the raw file bytes to a pre-signed target.
    pub async fn put_object(&self, target: &str, file: &UploadFile, max_bytes: u64) -> Result<()> {
        let url = Url::parse(target).map_err(|_| ClientError::InvalidUrl(target.to_string()))?;
        let request = self
            .client
            .put(url.clone())
            .header(CONTENT_LENGTH_RANGE, format!("0,{}", max_bytes))
            .header(header::CONTENT_TYPE, file.content_type())
            .body(file.bytes().to_vec());

        self.send(&url, request).await?;
        Ok(())
    }

    /// Start processing an uploaded image.
    ///
    /// A newer call aborts one still in flight; the aborted call fails with
    /// [`ClientError::Superseded`].
    pub async fn request_prediction(&self, image_name: &str) -> Result<PredictionTasks> {
        let url = self.url(endpoints::REQUEST_PREDICTION)?;
        let request = self
            .client
            .post(url.clone())
            .query(&[("image_name", image_name)])
            .json(&serde_json::json!({}));

        let id = self.next_post.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let key = endpoints::REQUEST_PREDICTION.to_string();
        if let Some((_, (_, previous))) = self.inflight_posts.remove(&key) {
            tracing::debug!(endpoint = %key, "Aborting in-flight request superseded by a newer one");
            previous.cancel();
        }
        self.inflight_posts.insert(key.clone(), (id, token.clone()));

        let call = async {
            let response = self.send(&url, request).await?;
            Self::json::<PredictionTasks>(&url, response).await
        };
        let result = tokio::select! {
            _ = token.cancelled() => Err(ClientError::Superseded),
            result = call => result,
        };

        self.inflight_posts.remove_if(&key, |_, (owner, _)| *owner == id);
        result
    }

    /// Check a task's result endpoint once.
    pub async fn retrieve(&self, locator: &ResultLocator) -> Result<PollOutcome> {
        let url = self.url(&locator.path())?;
        let request = self.client.get(url.clone());
        let response = self.send(&url, request).await?;

        let status = response.status();
        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("json"));
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::transport(url.as_str(), e))?;

        match locator.format {
            ResultFormat::Svg if status == StatusCode::OK && !is_json => {
                Ok(PollOutcome::Ready(ResultPayload::Svg(body.to_vec())))
            }
            ResultFormat::Svg if is_json => {
                let document = parse_status_document(&url, locator, &body)?;
                Ok(PollOutcome::Pending(document.status))
            }
            ResultFormat::Svg => Ok(PollOutcome::Pending(None)),
            ResultFormat::Json if status != StatusCode::OK => Ok(PollOutcome::Pending(None)),
            ResultFormat::Json => {
                let document = parse_status_document(&url, locator, &body)?;
                if document.status.is_some() {
                    return Ok(PollOutcome::Pending(document.status));
                }
                let report: StatsReport = serde_json::from_slice(&body)
                    .map_err(|e| ClientError::unexpected(url.as_str(), e.to_string()))?;
                match (report.status, report.statistics) {
                    (StatsStatus::Ready, Some(statistics)) => {
                        Ok(PollOutcome::Ready(ResultPayload::Statistics(statistics)))
                    }
                    (StatsStatus::Ready, None) => Err(ClientError::unexpected(
                        url.as_str(),
                        "READY report without statistics",
                    )),
                    (StatsStatus::NotReady, _) => Ok(PollOutcome::Pending(None)),
                }
            }
        }
    }

    /// Download an arbitrary resource, returning its content type and bytes.
    pub async fn fetch_bytes(&self, target: &str) -> Result<(Option<String>, Vec<u8>)> {
        let url = Url::parse(target).map_err(|_| ClientError::InvalidUrl(target.to_string()))?;
        let response = self.send(&url, self.client.get(url.clone())).await?;
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::transport(url.as_str(), e))?;
        Ok((content_type, bytes.to_vec()))
    }
}

/// Celery-style status document some result endpoints answer with while pending.
#[derive(Debug)]
struct StatusDocument {
    status: Option<TaskStatus>,
}

fn parse_status_document(url: &Url, locator: &ResultLocator, body: &[u8]) -> Result<StatusDocument> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| ClientError::unexpected(url.as_str(), e.to_string()))?;

    let status = value
        .get("status")
        .cloned()
        .and_then(|s| serde_json::from_value::<TaskStatus>(s).ok());
    if status == Some(TaskStatus::Failure) {
        return Err(ClientError::TaskFailed {
            task_id: locator.task_id.clone(),
        });
    }
    Ok(StatusDocument { status })
}

#[async_trait]
impl ResultSource for ApiClient {
    async fn fetch(&self, locator: &ResultLocator) -> Result<PollOutcome> {
        self.retrieve(locator).await
    }
}
