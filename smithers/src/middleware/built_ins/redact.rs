//! Secret-redaction middleware (spec §4.4): applies regex patterns to every
//! streamed chunk and the final output so unredacted text never escapes.
//!
//! Grounded on the teacher's `store::classifier`'s `once_cell::Lazy<Regex>`
//! pattern for compiled, reusable regular expressions.

use async_trait::async_trait;
use regex::Regex;

use crate::adapter::AdapterResult;
use crate::middleware::Middleware;

const PLACEHOLDER: &str = "[redacted]";

pub struct RedactMiddleware {
    patterns: Vec<Regex>,
}

impl RedactMiddleware {
    pub fn new(patterns: Vec<Regex>) -> Self {
        Self { patterns }
    }

    /// A reasonable default set: common API-key and bearer-token shapes.
    pub fn with_default_patterns() -> Self {
        Self::new(vec![
            Regex::new(r"sk-[A-Za-z0-9]{20,}").unwrap(),
            Regex::new(r"(?i)bearer\s+[A-Za-z0-9._-]+").unwrap(),
            Regex::new(r"AKIA[0-9A-Z]{16}").unwrap(),
        ])
    }

    fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for pattern in &self.patterns {
            out = pattern.replace_all(&out, PLACEHOLDER).into_owned();
        }
        out
    }
}

#[async_trait]
impl Middleware for RedactMiddleware {
    fn name(&self) -> Option<&str> {
        Some("redact-secrets")
    }

    fn transform_chunk(&self, mut chunk: crate::adapter::Chunk) -> crate::adapter::Chunk {
        chunk.content = self.redact(&chunk.content);
        chunk
    }

    fn transform_result(&self, mut result: AdapterResult) -> AdapterResult {
        result.output = self.redact(&result.output);
        result
    }
}
