//! # Spider Module
//!
//! Defines the `Rule` trait and the `RuleTree` that maps rule names to
//! parsing logic.
//!
//! ## Overview
//!
//! Every [`Request`](crate::request::Request) names the rule that parses its
//! response. After a successful download the engine looks that rule up in
//! the spider's [`RuleTree`] and runs it against the request's
//! [`Context`]. A rule extracts items and files into the context; it may
//! also return [`ParseError::Cancelled`] (usually via
//! [`Context::check_running`]) when the engine is stopping.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_engine::{Context, ParseError, Rule, RuleTree, async_trait};
//! use serde_json::{Map, json};
//!
//! struct TitleRule;
//!
//! #[async_trait]
//! impl Rule for TitleRule {
//!     async fn parse(&self, ctx: &mut Context) -> Result<(), ParseError> {
//!         ctx.check_running()?;
//!         let mut fields = Map::new();
//!         fields.insert("length".into(), json!(ctx.text().len()));
//!         ctx.add_item(fields);
//!         Ok(())
//!     }
//! }
//!
//! let rules = RuleTree::new("example").rule("page", TitleRule);
//! ```

use crate::context::Context;
use crate::error::ParseError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Parsing logic for one kind of page.
#[async_trait]
pub trait Rule: Send + Sync + 'static {
    async fn parse(&self, ctx: &mut Context) -> Result<(), ParseError>;
}

/// Adapter that lets a plain closure act as a [`Rule`].
pub struct FnRule<F>(F);

#[async_trait]
impl<F> Rule for FnRule<F>
where
    F: Fn(&mut Context) -> Result<(), ParseError> + Send + Sync + 'static,
{
    async fn parse(&self, ctx: &mut Context) -> Result<(), ParseError> {
        (self.0)(ctx)
    }
}

/// Named collection of rules belonging to one spider.
#[derive(Clone, Default)]
pub struct RuleTree {
    name: String,
    rules: HashMap<String, Arc<dyn Rule>>,
}

impl RuleTree {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: HashMap::new(),
        }
    }

    /// Registers `rule` under `name`, replacing any previous rule of that name.
    pub fn rule<R: Rule>(mut self, name: impl Into<String>, rule: R) -> Self {
        self.rules.insert(name.into(), Arc::new(rule));
        self
    }

    /// Registers a synchronous closure as a rule.
    pub fn rule_fn<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Context) -> Result<(), ParseError> + Send + Sync + 'static,
    {
        self.rule(name, FnRule(f))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Rule>> {
        self.rules.get(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl std::fmt::Debug for RuleTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.rule_names().collect();
        names.sort_unstable();
        f.debug_struct("RuleTree")
            .field("name", &self.name)
            .field("rules", &names)
            .finish()
    }
}
