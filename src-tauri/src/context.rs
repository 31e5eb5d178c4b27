use anyhow::Result;
use parking_lot::Mutex;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::ShellConfig;
use crate::launcher::BackendProcess;
use crate::probe::MetadataProber;
use crate::separation::{SeparationClient, SeparationJobs};

const BACKEND_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything the commands share for the lifetime of the app. Built once in
/// `run`, handed to Tauri as managed state.
pub struct AppContext {
    pub config: ShellConfig,
    pub separation: SeparationClient,
    pub jobs: SeparationJobs,
    pub prober: MetadataProber,
    backend: Mutex<Option<BackendProcess>>,
}

impl AppContext {
    pub fn new(config: ShellConfig) -> Result<Self> {
        let separation = SeparationClient::new(config.separate_endpoint()?)
            .with_timeout(config.separation_timeout)
            .with_heartbeat(config.heartbeat);
        let prober = MetadataProber::new(config.ffprobe_program());

        Ok(Self {
            config,
            separation,
            jobs: SeparationJobs::new(),
            prober,
            backend: Mutex::new(None),
        })
    }

    /// Starts the backend. Failure is logged and the app carries on without
    /// it; separation requests will then fail to connect.
    pub fn start_backend(&self, resource_dir: Option<&Path>) {
        let mut backend = self.backend.lock();
        if backend.is_some() {
            warn!("backend already started");
            return;
        }

        let launch = self.config.backend_launch(resource_dir);
        match BackendProcess::spawn(&launch) {
            Ok(process) => *backend = Some(process),
            Err(e) => error!(
                program = %launch.program.display(),
                "failed to start backend: {}",
                e
            ),
        }
    }

    pub fn backend_running(&self) -> bool {
        self.backend.lock().is_some()
    }

    /// Cancels in-flight separations and stops the backend.
    pub fn shutdown(&self) {
        let cancelled = self.jobs.cancel(None);
        if cancelled > 0 {
            info!(cancelled, "cancelled separations on exit");
        }

        let process = self.backend.lock().take();
        if let Some(process) = process {
            let pid = process.pid();
            match process.shutdown(BACKEND_SHUTDOWN_TIMEOUT) {
                Some(status) => info!(pid, %status, "backend stopped"),
                None => warn!(pid, "backend stop not confirmed"),
            }
        }
    }
}
