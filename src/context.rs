//! # Context Module
//!
//! The per-request working value that travels from the downloader through
//! rule parsing to the output pipeline.
//!
//! ## Overview
//!
//! A [`Context`] is filled by a [`Downloader`](crate::downloader::Downloader)
//! with either a [`Response`] or a [`FetchError`]. Parsing then runs the
//! request's rule against it, which appends [`Item`]s and [`FileRecord`]s.
//! The engine drains those outputs into the pipeline and returns the context
//! to a shared [`ContextPool`] so its buffers are reused by a later request.
//!
//! A context also carries the engine's stop signal. Rules that loop or wait
//! should call [`Context::check_running`] and propagate its error with `?`;
//! the engine treats that error as a clean cancellation rather than a fault.

use crate::error::{FetchError, ParseError};
use crate::request::Request;
use crate::spider::RuleTree;
use bytes::Bytes;
use crossbeam::queue::SegQueue;
use serde::Serialize;
use serde_json::{Map, Value};
use std::borrow::Cow;
use tokio_util::sync::CancellationToken;
use tracing::trace;
use url::Url;

/// The fetched page.
#[derive(Debug, Clone)]
pub struct Response {
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Response {
    pub fn new(url: Url, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            url,
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A record extracted by a rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub rule: String,
    pub url: Url,
    pub fields: Map<String, Value>,
}

impl Item {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// A file extracted by a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub rule: String,
    pub name: String,
    pub bytes: Bytes,
}

/// Working state for one request.
#[derive(Debug)]
pub struct Context {
    request: Request,
    response: Option<Response>,
    error: Option<FetchError>,
    items: Vec<Item>,
    files: Vec<FileRecord>,
    follow_ups: Vec<Request>,
    stop_signal: CancellationToken,
}

impl Context {
    pub fn new(request: Request, stop_signal: CancellationToken) -> Self {
        Self {
            request,
            response: None,
            error: None,
            items: Vec::new(),
            files: Vec::new(),
            follow_ups: Vec::new(),
            stop_signal,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    /// Response body as text, or an empty string when nothing was fetched.
    pub fn text(&self) -> Cow<'_, str> {
        self.response
            .as_ref()
            .map(Response::text)
            .unwrap_or(Cow::Borrowed(""))
    }

    pub fn set_response(&mut self, response: Response) {
        self.response = Some(response);
        self.error = None;
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.error.as_ref()
    }

    pub fn set_error(&mut self, error: FetchError) {
        self.error = Some(error);
    }

    /// Adds an item built from `fields`, tagged with the current rule and URL.
    pub fn add_item(&mut self, fields: Map<String, Value>) {
        self.items.push(Item {
            rule: self.request.rule.clone(),
            url: self.request.url.clone(),
            fields,
        });
    }

    pub fn add_file(&mut self, name: impl Into<String>, bytes: impl Into<Bytes>) {
        self.files.push(FileRecord {
            rule: self.request.rule.clone(),
            name: name.into(),
            bytes: bytes.into(),
        });
    }

    /// Queues a request discovered on this page; it is handed to the
    /// request source only if parsing succeeds.
    pub fn add_request(&mut self, request: Request) {
        self.follow_ups.push(request);
    }

    /// Builds and queues a child request of the current one.
    pub fn follow(&mut self, url: Url, rule: impl Into<String>) {
        let child = self.request.follow(url, rule);
        self.follow_ups.push(child);
    }

    pub fn get_temp(&self, key: &str) -> Option<&Value> {
        self.request.temp.get(key)
    }

    /// Returns `Err(ParseError::Cancelled)` once the engine has been asked to stop.
    pub fn check_running(&self) -> Result<(), ParseError> {
        if self.stop_signal.is_cancelled() {
            Err(ParseError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Runs the rule named `rule` from `rules` against this context.
    pub async fn parse(&mut self, rules: &RuleTree, rule: &str) -> Result<(), ParseError> {
        self.check_running()?;
        let handler = rules
            .get(rule)
            .ok_or_else(|| ParseError::UnknownRule(rule.to_string()))?;
        handler.parse(self).await
    }

    /// Takes the extracted items, leaving the buffer empty.
    pub fn take_items(&mut self) -> Vec<Item> {
        std::mem::take(&mut self.items)
    }

    pub fn take_files(&mut self) -> Vec<FileRecord> {
        std::mem::take(&mut self.files)
    }

    pub fn take_requests(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.follow_ups)
    }

    fn reset(&mut self, request: Request, stop_signal: CancellationToken) {
        self.request = request;
        self.response = None;
        self.error = None;
        self.items.clear();
        self.files.clear();
        self.follow_ups.clear();
        self.stop_signal = stop_signal;
    }
}

/// Lock-free pool of recycled contexts shared by all processing tasks.
#[derive(Debug)]
pub struct ContextPool {
    idle: SegQueue<Context>,
    max_idle: usize,
}

impl ContextPool {
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: SegQueue::new(),
            max_idle,
        }
    }

    /// Returns a cleared context for `request`, reusing an idle one if available.
    pub fn get(&self, request: Request, stop_signal: CancellationToken) -> Context {
        match self.idle.pop() {
            Some(mut ctx) => {
                ctx.reset(request, stop_signal);
                ctx
            }
            None => Context::new(request, stop_signal),
        }
    }

    /// Hands a context back for reuse. Dropped when the pool is full.
    pub fn release(&self, mut ctx: Context) {
        if self.idle.len() >= self.max_idle {
            trace!("Context pool full, dropping context");
            return;
        }
        ctx.response = None;
        ctx.error = None;
        ctx.items.clear();
        ctx.files.clear();
        ctx.follow_ups.clear();
        self.idle.push(ctx);
    }

    pub fn idle_len(&self) -> usize {
        self.idle.len()
    }
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new(1024)
    }
}
