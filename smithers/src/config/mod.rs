//! Run configuration summary types for logging and verbose output.
//!
//! Used by the CLI to aggregate engine, store, middleware, and adapter
//! config into a single summary that can be printed (e.g. to stderr when `--verbose`).

pub mod summary;

pub use summary::{
    build_config_summary, AdapterConfigSummary, ConfigSection, EngineConfigSummary,
    MiddlewareConfigSummary, RunConfigSummary, RunConfigSummarySource, StoreConfigSummary,
};
