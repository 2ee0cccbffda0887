//! Store config block for run config summary.
//!
//! Implements [`ConfigSection`](super::ConfigSection). Used by the CLI to build the
//! "Store config" line (spec §6 "Persisted state layout").

use super::ConfigSection;

/// Store configuration summary: db path and log directory.
pub struct StoreConfigSummary {
    pub db_path: String,
    pub logs_dir: String,
}

impl ConfigSection for StoreConfigSummary {
    fn section_name(&self) -> &str {
        "Store config"
    }

    fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("db_path", self.db_path.clone()),
            ("logs_dir", self.logs_dir.clone()),
        ]
    }
}
