//! Tap process supervision.
//!
//! Spawns the extractor binary and drains stdout and stderr concurrently
//! through one channel, so neither pipe can fill and deadlock the child.
//! Stdout lines are classified live while the process runs: checkpoint
//! capture and progress logging happen during streaming, not after exit.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::tap::protocol::TapMessage;

/// Everything a finished extraction run produced.
#[derive(Debug)]
pub struct TapOutput {
    /// Raw stdout lines, in emission order.
    pub lines: Vec<String>,
    /// Value of the last STATE message, if any was observed.
    pub last_state: Option<Value>,
}

/// Supervises one tap binary.
pub struct TapRunner {
    program: String,
    timeout: Option<Duration>,
}

enum PipeLine {
    Out(String),
    Err(String),
}

struct Drained {
    lines: Vec<String>,
    err_lines: Vec<String>,
    last_state: Option<Value>,
    records: u64,
}

impl TapRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: None,
        }
    }

    /// Bound extraction wall time; 0 disables the bound.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    /// Run discovery mode and capture the whole stdout as one document.
    ///
    /// Discovery emits a single catalog object rather than a protocol
    /// stream, so no line streaming here.
    pub async fn discover(&self, config: &Path) -> Result<String> {
        if !config.exists() {
            return Err(SyncError::ConfigNotFound(config.to_path_buf()));
        }

        info!(program = %self.program, "running tap discovery");
        let output = Command::new(&self.program)
            .arg("--config")
            .arg(config)
            .arg("--discover")
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(SyncError::Discovery {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run extraction: config is mandatory, catalog attached when given,
    /// state attached only when the file exists on disk (absence signals a
    /// full resync, not an error).
    pub async fn run(
        &self,
        config: &Path,
        catalog: Option<&Path>,
        state: Option<&Path>,
    ) -> Result<TapOutput> {
        if !config.exists() {
            return Err(SyncError::ConfigNotFound(config.to_path_buf()));
        }

        let mut cmd = Command::new(&self.program);
        cmd.arg("--config").arg(config);

        if let Some(catalog) = catalog {
            if !catalog.exists() {
                return Err(SyncError::CatalogNotFound(catalog.to_path_buf()));
            }
            cmd.arg("--catalog").arg(catalog);
        }
        match state {
            Some(s) if s.exists() => {
                info!(state = %s.display(), "resuming from checkpoint");
                cmd.arg("--state").arg(s);
            }
            Some(s) => {
                info!(state = %s.display(), "no checkpoint on disk, starting full sync");
            }
            None => {}
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(program = %self.program, "spawning tap");
        let mut child = cmd.spawn()?;

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        // Both pipes feed one channel; it closes once both readers hit EOF,
        // which also guarantees post-exit buffered output is fully drained.
        let (tx, mut rx) = mpsc::channel::<PipeLine>(256);
        let tx_err = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(PipeLine::Out(line)).await.is_err() {
                    break;
                }
            }
        });
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx_err.send(PipeLine::Err(line)).await.is_err() {
                    break;
                }
            }
        });

        let (drained, status) = if let Some(limit) = self.timeout {
            match tokio::time::timeout(limit, drain_and_wait(&mut rx, &mut child)).await {
                Ok(res) => res?,
                Err(_) => {
                    warn!(timeout_secs = limit.as_secs(), "tap exceeded timeout, killing");
                    child.start_kill().ok();
                    let _ = child.wait().await;
                    return Err(SyncError::ExtractorTimeout(limit.as_secs()));
                }
            }
        } else {
            drain_and_wait(&mut rx, &mut child).await?
        };

        if !status.success() {
            return Err(SyncError::ExtractorExecution {
                code: status.code(),
                stderr: drained.err_lines.join("\n"),
            });
        }

        info!(
            lines = drained.lines.len(),
            records = drained.records,
            checkpoint = drained.last_state.is_some(),
            "tap finished"
        );
        Ok(TapOutput {
            lines: drained.lines,
            last_state: drained.last_state,
        })
    }
}

/// Consume the merged pipe channel until both readers hit EOF, then reap
/// the child. Classifies stdout lines live for checkpoint capture and
/// progress; stderr lines are kept for error reporting only.
async fn drain_and_wait(
    rx: &mut mpsc::Receiver<PipeLine>,
    child: &mut Child,
) -> std::io::Result<(Drained, ExitStatus)> {
    let mut out = Drained {
        lines: Vec::new(),
        err_lines: Vec::new(),
        last_state: None,
        records: 0,
    };

    while let Some(item) = rx.recv().await {
        match item {
            PipeLine::Out(line) => {
                match TapMessage::classify(&line) {
                    TapMessage::Record { stream, .. } => {
                        out.records += 1;
                        if out.records % 100 == 0 {
                            info!(records = out.records, stream = %stream, "streaming records");
                        }
                    }
                    TapMessage::State { value } => {
                        debug!("checkpoint received from tap");
                        out.last_state = Some(value);
                    }
                    TapMessage::Schema { stream } => {
                        info!(stream = %stream, "schema received");
                    }
                    TapMessage::Unknown(raw) => {
                        debug!(line = %preview(&raw), "unclassified tap output");
                    }
                }
                out.lines.push(line);
            }
            PipeLine::Err(line) => {
                warn!(target: "tap", "{line}");
                out.err_lines.push(line);
            }
        }
    }

    let status = child.wait().await?;
    Ok((out, status))
}

fn preview(s: &str) -> String {
    if s.chars().count() > 200 {
        let mut p: String = s.chars().take(200).collect();
        p.push('…');
        p
    } else {
        s.to_string()
    }
}
