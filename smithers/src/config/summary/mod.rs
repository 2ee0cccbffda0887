//! Config section trait and run config summary aggregate.
//!
//! [`ConfigSection`] is implemented by [`EngineConfigSummary`], [`StoreConfigSummary`],
//! [`MiddlewareConfigSummary`], and [`AdapterConfigSummary`]. [`RunConfigSummary`] holds
//! multiple sections and prints them in order (e.g. to stderr when `--verbose`).

use std::io::Write;

mod adapter;
mod engine;
mod middleware;
mod store;

pub use adapter::AdapterConfigSummary;
pub use engine::EngineConfigSummary;
pub use middleware::MiddlewareConfigSummary;
pub use store::StoreConfigSummary;

/// One block of run config (engine, store, middleware, adapter) for display and printing.
///
/// Callers use [`section_name`](ConfigSection::section_name) and [`entries`](ConfigSection::entries)
/// to read config programmatically; [`print_to_stderr`](ConfigSection::print_to_stderr) writes
/// one line to stderr in a uniform format. Printing is best-effort (errors are ignored).
pub trait ConfigSection: Send + Sync {
    /// Section label, e.g. `"Engine config"`, `"Store config"`, `"Adapter config"`.
    fn section_name(&self) -> &str;
    /// Key-value pairs (no secrets). Keys are `&'static str` for use in display and tests.
    fn entries(&self) -> Vec<(&'static str, String)>;
    /// Print one line to stderr in the form `[section_name] k1=v1 k2=v2 ...`. Best-effort.
    fn print_to_stderr(&self) {
        let entries: Vec<String> = self
            .entries()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        let _ = writeln!(
            std::io::stderr(),
            "[{}] {}",
            self.section_name(),
            entries.join(" ")
        );
        let _ = std::io::stderr().flush();
    }
}

/// Aggregated run config summary (engine, store, middleware, adapter sections).
///
/// Built via [`RunConfigSummary::new()`](RunConfigSummary::new) and
/// [`with_section`](RunConfigSummary::with_section). Call [`print_to_stderr`](RunConfigSummary::print_to_stderr)
/// to emit all sections in order.
pub struct RunConfigSummary {
    sections: Vec<Box<dyn ConfigSection>>,
}

impl RunConfigSummary {
    /// Creates an empty summary.
    pub fn new() -> Self {
        Self { sections: vec![] }
    }

    /// Appends a section and returns `self` for chaining.
    pub fn with_section(mut self, s: Box<dyn ConfigSection>) -> Self {
        self.sections.push(s);
        self
    }

    /// Returns the list of sections in order.
    pub fn sections(&self) -> &[Box<dyn ConfigSection>] {
        self.sections.as_slice()
    }

    /// Prints each section to stderr, one line per section. Best-effort.
    pub fn print_to_stderr(&self) {
        for s in &self.sections {
            s.print_to_stderr();
        }
    }
}

impl Default for RunConfigSummary {
    fn default() -> Self {
        Self::new()
    }
}

/// Source of the four config sections used to build a [`RunConfigSummary`].
///
/// Implement this trait for your run config type so that
/// [`build_config_summary`] can produce a summary (e.g. for verbose logging).
pub trait RunConfigSummarySource: Send + Sync {
    /// Engine section (max_frames, timeout, model, parallelism, mock_mode).
    fn engine_section(&self) -> EngineConfigSummary;
    /// Store section (db_path, logs_dir).
    fn store_section(&self) -> StoreConfigSummary;
    /// Middleware section (composed pipeline name, caching, rate limiting).
    fn middleware_section(&self) -> MiddlewareConfigSummary;
    /// Adapter section (backend name, default model).
    fn adapter_section(&self) -> AdapterConfigSummary;
}

/// Builds a run config summary from any source that implements [`RunConfigSummarySource`].
///
/// Call [`RunConfigSummary::print_to_stderr`] on the result to print the summary
/// (e.g. when `--verbose` is set).
pub fn build_config_summary(source: &impl RunConfigSummarySource) -> RunConfigSummary {
    RunConfigSummary::new()
        .with_section(Box::new(source.engine_section()))
        .with_section(Box::new(source.store_section()))
        .with_section(Box::new(source.middleware_section()))
        .with_section(Box::new(source.adapter_section()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource;

    impl RunConfigSummarySource for FixedSource {
        fn engine_section(&self) -> EngineConfigSummary {
            EngineConfigSummary {
                max_frames: 100,
                timeout_ms: Some(60_000),
                model: Some("claude".into()),
                parallelism: 4,
                mock_mode: false,
            }
        }
        fn store_section(&self) -> StoreConfigSummary {
            StoreConfigSummary {
                db_path: "plan.db".into(),
                logs_dir: "logs".into(),
            }
        }
        fn middleware_section(&self) -> MiddlewareConfigSummary {
            MiddlewareConfigSummary {
                composed_name: Some("retry+timeout".into()),
                caching_enabled: true,
                rate_limit_enabled: false,
            }
        }
        fn adapter_section(&self) -> AdapterConfigSummary {
            AdapterConfigSummary {
                name: "claude-cli".into(),
                default_model: Some("sonnet".into()),
            }
        }
    }

    #[test]
    fn build_config_summary_orders_all_four_sections() {
        let summary = build_config_summary(&FixedSource);
        let names: Vec<_> = summary.sections().iter().map(|s| s.section_name()).collect();
        assert_eq!(
            names,
            vec!["Engine config", "Store config", "Middleware config", "Adapter config"]
        );
    }
}
