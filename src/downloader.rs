//! Fetch collaborator: the `Downloader` trait and a `reqwest`-backed implementation.
//!
//! A downloader never fails at the type level. Transport problems are stored
//! in the context with [`Context::set_error`] and the engine routes them to
//! failure bookkeeping. One downloader instance is shared by every
//! processing task (and may be shared by several engines), so
//! implementations must tolerate concurrent calls.

use crate::builder::CrawlerConfig;
use crate::context::{Context, Response};
use crate::error::FetchError;
use async_trait::async_trait;
use tracing::trace;

#[async_trait]
pub trait Downloader: Send + Sync + 'static {
    /// Fetches `ctx.request()` and stores the response or error in `ctx`.
    async fn download(&self, config: &CrawlerConfig, ctx: &mut Context);
}

/// Downloader backed by a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestDownloader {
    client: reqwest::Client,
}

impl ReqwestDownloader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl Downloader for ReqwestDownloader {
    async fn download(&self, config: &CrawlerConfig, ctx: &mut Context) {
        let method = match reqwest::Method::from_bytes(ctx.request().method.as_bytes()) {
            Ok(method) => method,
            Err(e) => {
                let message = format!("invalid method '{}': {}", ctx.request().method, e);
                ctx.set_error(FetchError::Transport(message));
                return;
            }
        };

        let request = ctx.request();
        trace!("Downloading {} {}", method, request.url);
        let mut builder = self
            .client
            .request(method, request.url.clone())
            .header(reqwest::header::USER_AGENT, config.user_agent.as_str())
            .timeout(config.request_timeout);
        if let Some(referer) = &request.referer {
            builder = builder.header(reqwest::header::REFERER, referer.as_str());
        }

        match fetch(builder).await {
            Ok(response) => ctx.set_response(response),
            Err(e) => ctx.set_error(e),
        }
    }
}

async fn fetch(builder: reqwest::RequestBuilder) -> Result<Response, FetchError> {
    let resp = builder.send().await.map_err(classify)?;
    let status = resp.status();
    if status.is_client_error() || status.is_server_error() {
        return Err(FetchError::Status(status.as_u16()));
    }

    let url = resp.url().clone();
    let headers = resp
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let body = resp.bytes().await.map_err(classify)?;

    Ok(Response {
        url,
        status: status.as_u16(),
        headers,
        body,
    })
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(err.to_string())
    }
}
