use serde_json::{Map, Value};
use tauri::{AppHandle, Emitter, Runtime, State, Window};
use tracing::warn;

use crate::context::AppContext;
use crate::dialogs::{self, DialogSelection};
use crate::error::ShellError;
use crate::probe::AudioMetadata;
use crate::separation::{self, ProgressSink, SeparationEvent, SeparationRequest};

pub const SEPARATION_PROGRESS_EVENT: &str = "separation_progress";

impl<R: Runtime> ProgressSink for AppHandle<R> {
    fn publish(&self, event: &SeparationEvent) {
        self.emit(SEPARATION_PROGRESS_EVENT, event).unwrap_or_else(|e| {
            warn!("Emit error: {}", e);
        });
    }
}

#[tauri::command]
pub async fn select_file(window: Window) -> DialogSelection {
    dialogs::pick_audio_file(&window).await
}

#[tauri::command]
pub async fn select_folder(window: Window) -> DialogSelection {
    dialogs::pick_output_folder(&window).await
}

#[tauri::command]
pub async fn separate_track(
    params: SeparationRequest,
    app: AppHandle,
    ctx: State<'_, AppContext>,
) -> Result<Map<String, Value>, ShellError> {
    separation::run_separation(&ctx.separation, &ctx.jobs, &params, &app).await
}

/// `job_id` of `None` cancels every running separation.
#[tauri::command]
pub fn cancel_separation(job_id: Option<u64>, ctx: State<'_, AppContext>) -> usize {
    ctx.jobs.cancel(job_id)
}

#[tauri::command]
pub async fn get_audio_metadata(
    file_path: String,
    ctx: State<'_, AppContext>,
) -> Result<AudioMetadata, ShellError> {
    ctx.prober.probe(&file_path).await
}
