use serde::{Serialize, Serializer};
use std::time::Duration;
use thiserror::Error;

/// Every failure a command can hand back to the page.
#[derive(Debug, Error)]
pub enum ShellError {
    // Separation relay
    #[error("{0}")]
    Backend(String),

    #[error("{0}")]
    Transport(String),

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("separation job {0} was cancelled")]
    Cancelled(u64),

    #[error("separation timed out after {0:?}")]
    TimedOut(Duration),

    // Metadata probe
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("failed to start ffprobe: {0}")]
    ProbeSpawn(String),

    #[error("ffprobe exited with code {0}")]
    ProbeExit(i32),

    #[error("failed to parse ffprobe output: {0}")]
    ProbeParse(String),
}

impl From<reqwest::Error> for ShellError {
    fn from(e: reqwest::Error) -> Self {
        ShellError::Transport(e.to_string())
    }
}

// The webview only ever sees the message.
impl Serialize for ShellError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ShellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_message_is_verbatim() {
        let err = ShellError::Backend("Input file not found".into());
        assert_eq!(err.to_string(), "Input file not found");
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&ShellError::ProbeExit(3)).unwrap();
        assert_eq!(json, "\"ffprobe exited with code 3\"");

        let json = serde_json::to_string(&ShellError::TimedOut(Duration::from_secs(600))).unwrap();
        assert_eq!(json, "\"separation timed out after 600s\"");
    }
}
