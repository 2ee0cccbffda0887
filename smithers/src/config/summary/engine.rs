//! Engine config block for run config summary.
//!
//! Implements [`ConfigSection`](super::ConfigSection). Used by the CLI to build the
//! "Engine config" line when `--verbose` is set (spec §4.6 option bag).

use super::ConfigSection;

/// Engine configuration summary: the per-run option bag, minus anything secret.
pub struct EngineConfigSummary {
    pub max_frames: u32,
    pub timeout_ms: Option<u64>,
    pub model: Option<String>,
    pub parallelism: usize,
    pub mock_mode: bool,
}

impl ConfigSection for EngineConfigSummary {
    fn section_name(&self) -> &str {
        "Engine config"
    }

    fn entries(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![
            ("max_frames", self.max_frames.to_string()),
            ("parallelism", self.parallelism.to_string()),
            ("mock_mode", self.mock_mode.to_string()),
        ];
        if let Some(timeout_ms) = self.timeout_ms {
            out.push(("timeout_ms", timeout_ms.to_string()));
        }
        if let Some(ref model) = self.model {
            out.push(("model", model.clone()));
        }
        out
    }
}
