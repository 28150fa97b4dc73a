//! The `Request` value object handed from a request source to the engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// One fetch target plus the rule that should parse its response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub url: Url,
    /// Name of the rule in the `RuleTree` that parses this request's response.
    pub rule: String,
    pub method: String,
    /// Number of failed attempts recorded so far.
    pub retries: u32,
    pub depth: u32,
    pub referer: Option<Url>,
    /// Free-form values carried from a parent rule to a child rule.
    #[serde(default)]
    pub temp: HashMap<String, serde_json::Value>,
}

impl Request {
    pub fn new(url: Url, rule: impl Into<String>) -> Self {
        Self {
            url,
            rule: rule.into(),
            method: "GET".to_string(),
            retries: 0,
            depth: 0,
            referer: None,
            temp: HashMap::new(),
        }
    }

    /// Parses `url` and builds a request for `rule`.
    pub fn parse(url: &str, rule: impl Into<String>) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(url)?, rule))
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into().to_ascii_uppercase();
        self
    }

    pub fn with_temp(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.temp.insert(key.into(), value);
        self
    }

    /// Builds a follow-up request discovered while parsing `self`.
    pub fn follow(&self, url: Url, rule: impl Into<String>) -> Self {
        let mut child = Request::new(url, rule);
        child.depth = self.depth + 1;
        child.referer = Some(self.url.clone());
        child
    }

    /// Identity used for deduplication: method plus URL without fragment.
    pub fn fingerprint(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        format!("{} {}", self.method, url)
    }
}
