//! Process-spawning adapter: launches a CLI backend as a child process,
//! streams its stdout, and enforces timeout/cancellation (spec §4.5).
//!
//! Grounded on `cli/src/backend/auto_start.rs` for the `tokio::process` +
//! `Stdio` spawn style, generalized from "spawn and poll readiness" to
//! "spawn, stream, and kill on timeout/cancel".

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{
    extract_json, Adapter, AdapterOptions, AdapterResult, Chunk, ProgressSender, StopReason,
    TokensUsed,
};

/// Adapter that shells out to a named CLI binary, feeding it the resolved
/// prompt on stdin and reading line-delimited output from stdout.
///
/// Structured-output extraction (spec §4.5): when `options.schema` is set,
/// the adapter looks for JSON in the final chunk and retries up to
/// `options.schema_retries` times with a corrective prompt appended.
pub struct ProcessAdapter {
    name: String,
    binary: String,
    extra_args: Vec<String>,
}

impl ProcessAdapter {
    pub fn new(name: impl Into<String>, binary: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binary: binary.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    async fn run_once(
        &self,
        prompt: &str,
        options: &AdapterOptions,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Result<String, AdapterResult> {
        let start = Instant::now();
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.extra_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }
        if let Some(model) = &options.model {
            cmd.arg("--model").arg(model);
        }

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                return Err(AdapterResult::error(
                    format!("failed to spawn {}: {e}", self.binary),
                    start.elapsed().as_millis() as u64,
                ))
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            use tokio::io::AsyncWriteExt;
            let _ = stdin.write_all(prompt.as_bytes()).await;
            let _ = stdin.shutdown().await;
        }

        let stdout = child.stdout.take().expect("piped stdout");
        let mut lines = BufReader::new(stdout).lines();
        let mut collected = String::new();

        let run = async {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        let _ = child.start_kill();
                        return Err(());
                    }
                    line = lines.next_line() => {
                        match line {
                            Ok(Some(l)) => {
                                if !collected.is_empty() {
                                    collected.push('\n');
                                }
                                collected.push_str(&l);
                                let _ = progress.send(Chunk { content: l, is_final: false }).await;
                            }
                            Ok(None) => break,
                            Err(_) => break,
                        }
                    }
                }
            }
            Ok(())
        };

        let timed = match options.timeout {
            Some(ms) if ms > 0 => tokio::time::timeout(Duration::from_millis(ms as u64), run).await,
            _ => Ok(run.await),
        };

        match timed {
            Err(_elapsed) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                Err(AdapterResult::error(
                    format!("{} timed out after {:?}ms", self.binary, options.timeout),
                    start.elapsed().as_millis() as u64,
                ))
            }
            Ok(Err(())) => {
                let _ = child.wait().await;
                Err(AdapterResult::cancelled(collected, start.elapsed().as_millis() as u64))
            }
            Ok(Ok(())) => {
                let _ = progress
                    .send(Chunk {
                        content: String::new(),
                        is_final: true,
                    })
                    .await;
                match child.wait().await {
                    Ok(status) if status.success() => Ok(collected),
                    Ok(status) => Err(AdapterResult::error(
                        format!("{} exited with {status}: {collected}", self.binary),
                        start.elapsed().as_millis() as u64,
                    )),
                    Err(e) => Err(AdapterResult::error(
                        format!("failed to wait on {}: {e}", self.binary),
                        start.elapsed().as_millis() as u64,
                    )),
                }
            }
        }
    }
}

#[async_trait]
impl Adapter for ProcessAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        options: AdapterOptions,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> AdapterResult {
        let start = Instant::now();
        let mut prompt = options.prompt.clone();
        let mut attempts_left = if options.schema.is_some() {
            options.schema_retries + 1
        } else {
            1
        };

        loop {
            let outcome = self.run_once(&prompt, &options, &progress, &cancel).await;
            let output = match outcome {
                Ok(output) => output,
                Err(result) => return result,
            };

            let Some(schema) = &options.schema else {
                return AdapterResult {
                    output,
                    structured: None,
                    tokens_used: TokensUsed::default(),
                    turns_used: 1,
                    duration_ms: start.elapsed().as_millis() as u64,
                    stop_reason: StopReason::Completed,
                };
            };

            match extract_json(&output).filter(|v| matches_schema_shape(v, schema)) {
                Some(structured) => {
                    return AdapterResult {
                        output,
                        structured: Some(structured),
                        tokens_used: TokensUsed::default(),
                        turns_used: 1,
                        duration_ms: start.elapsed().as_millis() as u64,
                        stop_reason: StopReason::Completed,
                    };
                }
                None => {
                    attempts_left = attempts_left.saturating_sub(1);
                    if attempts_left == 0 {
                        return AdapterResult::error(
                            format!("structured output did not match schema after retries: {output}"),
                            start.elapsed().as_millis() as u64,
                        );
                    }
                    prompt = format!(
                        "{}\n\nYour previous reply did not contain valid JSON matching the required schema. \
                         Reply again with only the JSON object.",
                        options.prompt
                    );
                }
            }
        }
    }
}

/// Shallow structural check: every key the schema's `required` array names
/// (if present) must be present in `value`. Not a full JSON-schema validator;
/// sufficient for the adapter's own retry-or-accept decision.
fn matches_schema_shape(value: &serde_json::Value, schema: &serde_json::Value) -> bool {
    let Some(required) = schema.get("required").and_then(|v| v.as_array()) else {
        return value.is_object();
    };
    let Some(obj) = value.as_object() else {
        return false;
    };
    required
        .iter()
        .filter_map(|k| k.as_str())
        .all(|k| obj.contains_key(k))
}
