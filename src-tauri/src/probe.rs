use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, ShellError};

pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioMetadata {
    pub bitrate: String,
    pub sample_rate: String,
    pub duration: String,
}

impl AudioMetadata {
    /// Reads the `format` section of `ffprobe -print_format json` output.
    pub fn from_probe_output(stdout: &[u8]) -> Result<Self> {
        let value: Value =
            serde_json::from_slice(stdout).map_err(|e| ShellError::ProbeParse(e.to_string()))?;
        let format = value.get("format");
        let field = |name: &str| format.and_then(|f| f.get(name)).and_then(as_number);

        Ok(Self {
            bitrate: field("bit_rate")
                .map(|bps| format!("{} kbps", (bps / 1000.0).round() as u64))
                .unwrap_or_else(unknown),
            sample_rate: field("sample_rate")
                .map(|hz| format!("{} Hz", hz.round() as u64))
                .unwrap_or_else(unknown),
            duration: field("duration")
                .map(|secs| format!("{:.2} s", secs))
                .unwrap_or_else(unknown),
        })
    }
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

// ffprobe prints numbers as strings, but accept both.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct MetadataProber {
    program: PathBuf,
}

impl MetadataProber {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub async fn probe(&self, path: &str) -> Result<AudioMetadata> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(ShellError::FileNotFound(path.to_string()));
        }

        debug!(program = %self.program.display(), path, "probing audio metadata");
        let output = Command::new(&self.program)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ShellError::ProbeSpawn(format!("{}: {}", self.program.display(), e)))?;

        if !output.status.success() {
            // No code means the probe was killed by a signal.
            let code = output.status.code().unwrap_or(-1);
            warn!(path, code, "ffprobe failed");
            return Err(ShellError::ProbeExit(code));
        }

        AudioMetadata::from_probe_output(&output.stdout)
    }
}
