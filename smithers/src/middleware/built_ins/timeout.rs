//! Timeout-adjustment middleware (spec §4.4).
//!
//! Grounded on the teacher's model-tier pricing tables in
//! `llm::pricing` (per-model multiplier lookups) — generalized here from
//! dollar costs to a timeout multiplier.

use std::time::Duration;

use async_trait::async_trait;

use crate::adapter::AdapterOptions;
use crate::middleware::Middleware;

/// Assigns a timeout when the caller left `options.timeout` unset. Leaves an
/// explicit timeout alone, including `Some(0)` or a negative value — a
/// node-level override always wins over this middleware's computed default.
pub struct TimeoutMiddleware {
    pub base: Duration,
    pub prompt_length_factor: Duration,
    pub model_multiplier: Box<dyn Fn(Option<&str>) -> f64 + Send + Sync>,
}

impl TimeoutMiddleware {
    pub fn new(base: Duration, prompt_length_factor: Duration) -> Self {
        Self {
            base,
            prompt_length_factor,
            model_multiplier: Box::new(default_model_multiplier),
        }
    }
}

fn default_model_multiplier(model: Option<&str>) -> f64 {
    match model {
        Some(m) if m.contains("opus") => 1.5,
        Some(m) if m.contains("sonnet") => 1.0,
        Some(m) if m.contains("haiku") => 0.5,
        _ => 1.0,
    }
}

#[async_trait]
impl Middleware for TimeoutMiddleware {
    fn name(&self) -> Option<&str> {
        Some("timeout-adjustment")
    }

    fn transform_options(&self, mut options: AdapterOptions) -> AdapterOptions {
        if options.timeout.is_some() {
            return options;
        }
        let multiplier = (self.model_multiplier)(options.model.as_deref());
        let base_ms = self.base.as_millis() as f64 * multiplier;
        let length_ms = self.prompt_length_factor.as_millis() as f64 * options.prompt.len() as f64;
        options.timeout = Some((base_ms + length_ms).round() as i64);
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_timeout_when_unset() {
        let mw = TimeoutMiddleware::new(Duration::from_millis(1000), Duration::from_millis(1));
        let mut options = AdapterOptions::new("hi");
        options.model = Some("claude-3-opus".into());
        let options = mw.transform_options(options);
        assert_eq!(options.timeout, Some(1502));
    }

    #[test]
    fn preserves_existing_zero_timeout() {
        let mw = TimeoutMiddleware::new(Duration::from_millis(1000), Duration::from_millis(1));
        let mut options = AdapterOptions::new("hi");
        options.timeout = Some(0);
        let options = mw.transform_options(options);
        assert_eq!(options.timeout, Some(0));
    }

    #[test]
    fn preserves_existing_negative_timeout() {
        let mw = TimeoutMiddleware::new(Duration::from_millis(1000), Duration::from_millis(1));
        let mut options = AdapterOptions::new("hi");
        options.timeout = Some(-1);
        let options = mw.transform_options(options);
        assert_eq!(options.timeout, Some(-1));
    }

    #[test]
    fn default_multipliers_match_model_tiers() {
        assert_eq!(default_model_multiplier(Some("claude-3-opus-20240229")), 1.5);
        assert_eq!(default_model_multiplier(Some("claude-3-sonnet")), 1.0);
        assert_eq!(default_model_multiplier(Some("claude-3-haiku")), 0.5);
        assert_eq!(default_model_multiplier(None), 1.0);
    }
}
