use rfd::AsyncFileDialog;
use serde::Serialize;
use std::path::Path;
use tauri::Window;

pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "m4a"];

/// Shape of a native open dialog result: cancelled, or the chosen paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogSelection {
    pub canceled: bool,
    pub file_paths: Vec<String>,
}

impl DialogSelection {
    pub fn from_pick(picked: Option<&Path>) -> Self {
        match picked {
            Some(path) => Self {
                canceled: false,
                file_paths: vec![path.display().to_string()],
            },
            None => Self {
                canceled: true,
                file_paths: Vec::new(),
            },
        }
    }
}

pub async fn pick_audio_file(parent: &Window) -> DialogSelection {
    let picked = AsyncFileDialog::new()
        .set_parent(parent)
        .add_filter("Audio", AUDIO_EXTENSIONS)
        .pick_file()
        .await;

    DialogSelection::from_pick(picked.as_ref().map(|f| f.path()))
}

pub async fn pick_output_folder(parent: &Window) -> DialogSelection {
    let picked = AsyncFileDialog::new()
        .set_parent(parent)
        .set_title("Escolha pasta para salvar")
        .pick_folder()
        .await;

    DialogSelection::from_pick(picked.as_ref().map(|f| f.path()))
}
