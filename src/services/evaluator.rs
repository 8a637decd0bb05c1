//! Code evaluation seam for php-type snippets.
//!
//! The engine never interprets snippet code itself; it hands it to an
//! `Evaluator`. `ProcessEvaluator` pipes the code into an external
//! interpreter process and captures what it prints.

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// How the evaluated text is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// Bare statements; the interpreter's open tag is prepended.
    Script,
    /// Markup with embedded code blocks, passed through unchanged.
    Template,
}

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("failed to start interpreter '{binary}': {source}")]
    Spawn {
        binary: String,
        source: std::io::Error,
    },

    #[error("interpreter exited with status {status:?}: {stderr}")]
    Failed { status: Option<i32>, stderr: String },

    #[error("evaluation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("interpreter I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait Evaluator: Send + Sync {
    /// Evaluate `code`, returning everything it printed.
    fn evaluate(
        &self,
        code: &str,
        mode: EvalMode,
    ) -> impl Future<Output = Result<String, EvalError>> + Send;
}

/// Frame code for the interpreter according to `mode`.
pub fn frame(code: &str, mode: EvalMode) -> String {
    match mode {
        EvalMode::Script => format!("<?php\n{code}\n"),
        EvalMode::Template => code.to_string(),
    }
}

/// Runs each evaluation in a fresh interpreter process.
#[derive(Debug, Clone)]
pub struct ProcessEvaluator {
    binary: String,
    timeout: Duration,
}

impl ProcessEvaluator {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

impl Evaluator for ProcessEvaluator {
    async fn evaluate(&self, code: &str, mode: EvalMode) -> Result<String, EvalError> {
        let mut child = Command::new(&self.binary)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EvalError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        // Feed stdin concurrently so a chatty child cannot block on a full stdout pipe.
        let input = frame(code, mode).into_bytes();
        let writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                let result = stdin.write_all(&input).await;
                drop(stdin);
                result
            })
        });

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| EvalError::TimedOut(self.timeout))??;

        if let Some(writer) = writer {
            if let Ok(Err(e)) = writer.await {
                // A child that exits without reading stdin closes the pipe early.
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(EvalError::Io(e));
                }
            }
        }

        if !output.status.success() {
            return Err(EvalError::Failed {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
