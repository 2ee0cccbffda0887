//! Adapter config block for run config summary.
//!
//! Implements [`ConfigSection`](super::ConfigSection). Used by the CLI to build the
//! "Adapter config" line (spec §4.5).

use super::ConfigSection;

/// Adapter configuration summary: which backend, and the default model it
/// was resolved to run against.
pub struct AdapterConfigSummary {
    pub name: String,
    pub default_model: Option<String>,
}

impl ConfigSection for AdapterConfigSummary {
    fn section_name(&self) -> &str {
        "Adapter config"
    }

    fn entries(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![("name", self.name.clone())];
        if let Some(ref model) = self.default_model {
            out.push(("default_model", model.clone()));
        }
        out
    }
}
