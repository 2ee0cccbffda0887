//! Middleware config block for run config summary.
//!
//! Implements [`ConfigSection`](super::ConfigSection). Used by the CLI to build the
//! "Middleware config" line — the composed pipeline name plus any built-ins
//! with tunable knobs (spec §4.4).

use super::ConfigSection;

/// Middleware configuration summary: the composed pipeline name and whether
/// caching/rate-limiting are active (the two built-ins with externally
/// visible state).
pub struct MiddlewareConfigSummary {
    pub composed_name: Option<String>,
    pub caching_enabled: bool,
    pub rate_limit_enabled: bool,
}

impl ConfigSection for MiddlewareConfigSummary {
    fn section_name(&self) -> &str {
        "Middleware config"
    }

    fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                "pipeline",
                self.composed_name.clone().unwrap_or_else(|| "none".to_string()),
            ),
            ("caching", self.caching_enabled.to_string()),
            ("rate_limit", self.rate_limit_enabled.to_string()),
        ]
    }
}
