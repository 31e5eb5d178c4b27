use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::launcher::BackendLaunch;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const DEFAULT_SEPARATION_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_HEARTBEAT_SECS: u64 = 5;

/// How the backend is located: a Python script in development, a bundled
/// executable once packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Development,
    Production,
}

#[derive(Debug, Clone)]
pub struct ShellConfig {
    pub mode: RunMode,
    pub python: String,
    pub backend_script: PathBuf,
    pub backend_url: Url,
    /// `None` waits for the backend forever.
    pub separation_timeout: Option<Duration>,
    pub heartbeat: Duration,
    pub ffprobe: Option<PathBuf>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Development,
            python: "python".to_string(),
            backend_script: PathBuf::from("backend/app.py"),
            backend_url: Url::parse(DEFAULT_BACKEND_URL).expect("default backend url is valid"),
            separation_timeout: Some(Duration::from_secs(DEFAULT_SEPARATION_TIMEOUT_SECS)),
            heartbeat: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            ffprobe: None,
        }
    }
}

impl ShellConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, so callers other than the
    /// process environment (tests, mostly) can feed values in.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(env) = lookup("STEM_SHELL_ENV") {
            if env.eq_ignore_ascii_case("production") {
                config.mode = RunMode::Production;
            }
        }
        if let Some(python) = lookup("STEM_SHELL_PYTHON") {
            config.python = python;
        }
        if let Some(script) = lookup("STEM_SHELL_BACKEND_SCRIPT") {
            config.backend_script = PathBuf::from(script);
        }
        if let Some(url) = lookup("STEM_SHELL_BACKEND_URL") {
            config.backend_url = Url::parse(&url)
                .with_context(|| format!("STEM_SHELL_BACKEND_URL is not a valid url: {}", url))?;
        }
        if let Some(secs) = lookup("STEM_SHELL_SEPARATION_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("invalid STEM_SHELL_SEPARATION_TIMEOUT_SECS: {}", secs))?;
            config.separation_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(secs) = lookup("STEM_SHELL_HEARTBEAT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("invalid STEM_SHELL_HEARTBEAT_SECS: {}", secs))?;
            anyhow::ensure!(secs > 0, "STEM_SHELL_HEARTBEAT_SECS must be greater than zero");
            config.heartbeat = Duration::from_secs(secs);
        }
        if let Some(path) = lookup("STEM_SHELL_FFPROBE") {
            config.ffprobe = Some(PathBuf::from(path));
        }

        Ok(config)
    }

    pub fn separate_endpoint(&self) -> Result<Url> {
        self.backend_url
            .join("separate")
            .context("failed to build separation endpoint")
    }

    /// Program and arguments used to start the backend. `resource_dir` is the
    /// bundle's resource directory and only matters in production.
    pub fn backend_launch(&self, resource_dir: Option<&Path>) -> BackendLaunch {
        match self.mode {
            RunMode::Development => BackendLaunch {
                program: PathBuf::from(&self.python),
                args: vec![self.backend_script.display().to_string()],
                working_dir: None,
            },
            RunMode::Production => {
                let exe = if cfg!(windows) { "app.exe" } else { "app" };
                let base = resource_dir.map(Path::to_path_buf).unwrap_or_default();
                BackendLaunch {
                    program: base.join("backend").join("dist").join(exe),
                    args: Vec::new(),
                    working_dir: resource_dir.map(Path::to_path_buf),
                }
            }
        }
    }

    /// Configured ffprobe, else one shipped next to the executable under
    /// `bin/`, else whatever `ffprobe` is on the PATH.
    pub fn ffprobe_program(&self) -> PathBuf {
        if let Some(path) = &self.ffprobe {
            return path.clone();
        }
        let exe = if cfg!(windows) { "ffprobe.exe" } else { "ffprobe" };
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(bundled) = exe_path.parent().map(|p| p.join("bin").join(exe)) {
                if bundled.exists() {
                    return bundled;
                }
            }
        }
        PathBuf::from(exe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = ShellConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.mode, RunMode::Development);
        assert_eq!(config.python, "python");
        assert_eq!(config.separation_timeout, Some(Duration::from_secs(600)));
        assert_eq!(
            config.separate_endpoint().unwrap().as_str(),
            "http://localhost:8000/separate"
        );
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let config =
            ShellConfig::from_lookup(lookup(&[("STEM_SHELL_SEPARATION_TIMEOUT_SECS", "0")]))
                .unwrap();
        assert_eq!(config.separation_timeout, None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(ShellConfig::from_lookup(lookup(&[("STEM_SHELL_BACKEND_URL", "not a url")])).is_err());
        assert!(ShellConfig::from_lookup(lookup(&[("STEM_SHELL_HEARTBEAT_SECS", "0")])).is_err());
        assert!(
            ShellConfig::from_lookup(lookup(&[("STEM_SHELL_SEPARATION_TIMEOUT_SECS", "soon")]))
                .is_err()
        );
    }

    #[test]
    fn development_launch_runs_script_with_python() {
        let config = ShellConfig::from_lookup(lookup(&[("STEM_SHELL_PYTHON", "python3")])).unwrap();
        let launch = config.backend_launch(None);
        assert_eq!(launch.program, PathBuf::from("python3"));
        assert_eq!(launch.args, vec!["backend/app.py".to_string()]);
    }

    #[test]
    fn production_launch_uses_bundled_executable() {
        let config =
            ShellConfig::from_lookup(lookup(&[("STEM_SHELL_ENV", "production")])).unwrap();
        let launch = config.backend_launch(Some(Path::new("/opt/stem-shell/resources")));
        assert!(launch
            .program
            .starts_with("/opt/stem-shell/resources/backend/dist"));
        assert!(launch.args.is_empty());
    }

    #[test]
    fn explicit_ffprobe_wins() {
        let config =
            ShellConfig::from_lookup(lookup(&[("STEM_SHELL_FFPROBE", "/usr/local/bin/ffprobe")]))
                .unwrap();
        assert_eq!(config.ffprobe_program(), PathBuf::from("/usr/local/bin/ffprobe"));
    }
}
