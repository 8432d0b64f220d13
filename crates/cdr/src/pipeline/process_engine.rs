//! [`FilterEngine`] backed by an external XSLT command such as `xsltproc`.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use super::engine::{EngineOutput, FilterEngine, FilterParams, FilterScript};
use super::error::EngineError;
use crate::config::{EngineConfig, Timeouts};

/// Argument layout used when the configuration gives none.
pub const DEFAULT_ARGS: [&str; 4] = ["--nonet", "{params}", "{filter}", "-"];

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs one process per stage.
///
/// Argument placeholders: `{filter}` is the path of the filter body,
/// `{input}` the path of the input document (when absent the input goes
/// to stdin), and `{params}` expands to `--stringparam NAME VALUE` pairs
/// (prepended when absent). Stdout is the result; stderr lines are the
/// filter's messages.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessEngine {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        let args = if args.is_empty() {
            DEFAULT_ARGS.iter().map(|a| a.to_string()).collect()
        } else {
            args
        };
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(engine: &EngineConfig, timeouts: &Timeouts) -> Self {
        Self::new(engine.command.clone(), engine.args.clone(), timeouts.filter)
    }

    fn uses_input_file(&self) -> bool {
        self.args.iter().any(|a| a.contains("{input}"))
    }

    fn build_args(&self, filter: &Path, input: &Path, params: &FilterParams) -> Vec<String> {
        let mut pairs = Vec::with_capacity(params.len() * 3);
        for (name, value) in params {
            pairs.push("--stringparam".to_string());
            pairs.push(name.clone());
            pairs.push(value.clone());
        }
        let mut out = Vec::new();
        if !self.args.iter().any(|a| a == "{params}") {
            out.extend(pairs.iter().cloned());
        }
        for arg in &self.args {
            if arg == "{params}" {
                out.extend(pairs.iter().cloned());
            } else {
                out.push(
                    arg.replace("{filter}", &filter.to_string_lossy())
                        .replace("{input}", &input.to_string_lossy()),
                );
            }
        }
        out
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

impl FilterEngine for ProcessEngine {
    fn apply(
        &self,
        filter: &FilterScript<'_>,
        input: &str,
        params: &FilterParams,
    ) -> Result<EngineOutput, EngineError> {
        let dir = tempfile::tempdir()?;
        let filter_path = dir.path().join("filter.xsl");
        let input_path = dir.path().join("input.xml");
        std::fs::write(&filter_path, filter.body)?;
        let input_file = self.uses_input_file();
        if input_file {
            std::fs::write(&input_path, input)?;
        }

        let args = self.build_args(&filter_path, &input_path, params);
        debug!(command = %self.command, filter = filter.name, "starting filter process");
        let mut child = Command::new(&self.command)
            .args(&args)
            .stdin(if input_file { Stdio::null() } else { Stdio::piped() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let writer = child.stdin.take().map(|mut stdin| {
            let data = input.as_bytes().to_vec();
            thread::spawn(move || {
                let _ = stdin.write_all(&data);
            })
        });
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineError::Timeout(self.timeout));
            }
            thread::sleep(POLL_INTERVAL);
        };

        if let Some(writer) = writer {
            let _ = writer.join();
        }
        let out = stdout.join().unwrap_or_default();
        let err = stderr.join().unwrap_or_default();
        let messages: Vec<String> = String::from_utf8_lossy(&err)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        if !status.success() {
            let message = if messages.is_empty() {
                format!("{} exited with {}", self.command, status)
            } else {
                messages.join("; ")
            };
            return Err(EngineError::Failed(message));
        }

        Ok(EngineOutput {
            body: String::from_utf8_lossy(&out).into_owned(),
            messages,
        })
    }
}
